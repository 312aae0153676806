//! The composition engine: one layout document in, one raster image out.
//!
//! The engine hard-fails only on structurally invalid documents. Every
//! recoverable per-element failure is recorded as a diagnostic and the
//! element is skipped, so callers always get the best-effort composition
//! plus the list of what went missing.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    composition::model::{Element, FigureElement, ImageElement, LayoutDocument, TextAlign, TextElement},
    fonts::resolver::{FontResolver, RenderableFont},
    foundation::{
        color::{Rgba8, parse_color},
        error::{DiagnosticStage, FeedforgeResult, FeedforgeError, RenderDiagnostic},
        geometry::{CropBox, Placement},
    },
    render::{
        effects,
        fetch::ImageFetcher,
        prepare::{PreparedElements, PreparedSource, prepare},
        raster,
        text::{TextBrushRgba8, TextLayoutEngine, draw_glyph_runs},
    },
};

/// Best-effort composition result.
pub struct RenderedImage {
    pub image: image::RgbaImage,
    /// Elements that were skipped, in document order.
    pub diagnostics: Vec<RenderDiagnostic>,
}

pub struct CompositionEngine {
    fonts: Arc<FontResolver>,
    fetcher: Arc<dyn ImageFetcher>,
}

impl CompositionEngine {
    pub fn new(fonts: Arc<FontResolver>, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self { fonts, fetcher }
    }

    /// Render `document` to a straight-alpha RGBA image.
    pub async fn render(&self, document: &LayoutDocument) -> FeedforgeResult<RenderedImage> {
        document.validate()?;
        let prepared = prepare(document, &self.fonts, self.fetcher.as_ref()).await?;
        compose(document, prepared)
    }
}

/// Pure CPU compose pass over prepared sources.
fn compose(document: &LayoutDocument, prepared: PreparedElements) -> FeedforgeResult<RenderedImage> {
    let width = raster::surface_dim(document.width)?;
    let height = raster::surface_dim(document.height)?;
    debug!(width, height, "composing canvas");

    let mut ctx = vello_cpu::RenderContext::new(width, height);
    let canvas_rect = vello_cpu::kurbo::Rect::new(0.0, 0.0, f64::from(width), f64::from(height));

    let canvas_bg = document
        .background
        .as_deref()
        .and_then(parse_color)
        .unwrap_or(Rgba8::WHITE);
    fill_canvas(&mut ctx, &canvas_rect, canvas_bg);

    let mut diagnostics = prepared.diagnostics.clone();
    let mut text_engine = TextLayoutEngine::new();

    for (page_idx, page) in document.pages.iter().enumerate() {
        if let Some(bg) = page.background.as_deref() {
            match parse_color(bg) {
                Some(color) => fill_canvas(&mut ctx, &canvas_rect, color),
                None => warn!(page = page_idx, bg, "unparseable page background, keeping previous"),
            }
        }

        for (child_idx, element) in page.children.iter().enumerate() {
            if !element.frame().visible {
                debug!(id = element.id(), "element not visible, skipping");
                continue;
            }

            let outcome = match element {
                Element::Figure(figure) => draw_figure(&mut ctx, figure),
                Element::Image(image_el) => match prepared.get(page_idx, child_idx) {
                    Some(PreparedSource::Image(source)) => draw_image(&mut ctx, image_el, source),
                    // Fetch already recorded a diagnostic for this one.
                    _ => continue,
                },
                Element::Text(text) => match prepared.get(page_idx, child_idx) {
                    Some(PreparedSource::Font(font)) => {
                        draw_text(&mut ctx, &mut text_engine, text, font)
                    }
                    _ => continue,
                },
            };

            if let Err(e) = outcome {
                warn!(
                    id = element.id(),
                    kind = element.kind_name(),
                    error = %e,
                    "element skipped"
                );
                diagnostics.push(RenderDiagnostic::new(
                    element.id().map(str::to_string),
                    DiagnosticStage::Draw,
                    e.to_string(),
                ));
            }
        }
    }

    ctx.flush();
    let mut pixmap = vello_cpu::Pixmap::new(width, height);
    ctx.render_to_pixmap(&mut pixmap);

    Ok(RenderedImage {
        image: raster::pixmap_to_rgba(&pixmap, u32::from(width), u32::from(height)),
        diagnostics,
    })
}

fn fill_canvas(
    ctx: &mut vello_cpu::RenderContext,
    canvas_rect: &vello_cpu::kurbo::Rect,
    color: Rgba8,
) {
    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_paint(raster::color_paint(color));
    ctx.fill_rect(canvas_rect);
}

/// Blit a premultiplied pixmap 1:1 at `(x, y)`.
fn blit_pixmap(
    ctx: &mut vello_cpu::RenderContext,
    pixmap: vello_cpu::Pixmap,
    x: f64,
    y: f64,
    opacity: f32,
) {
    let (width, height) = (f64::from(pixmap.width()), f64::from(pixmap.height()));
    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_transform(raster::affine_to_cpu(kurbo::Affine::translate((x, y))));
    ctx.set_paint(raster::pixmap_paint(pixmap));

    if opacity < 1.0 {
        ctx.push_opacity_layer(opacity);
    }
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, width, height));
    if opacity < 1.0 {
        ctx.pop_layer();
    }
}

fn draw_figure(ctx: &mut vello_cpu::RenderContext, figure: &FigureElement) -> FeedforgeResult<()> {
    let frame = &figure.frame;
    let (w, h) = (frame.width.unwrap_or(0.0), frame.height.unwrap_or(0.0));
    let fill = parse_color(&figure.fill).ok_or_else(|| {
        FeedforgeError::validation(format!("unparseable figure fill '{}'", figure.fill))
    })?;

    let placement = Placement::resolve(w, h, w, h, frame.crop())?;
    let target_w = raster::surface_dim(placement.target_w)?;
    let target_h = raster::surface_dim(placement.target_h)?;

    let path = figure_path(figure, &placement);
    let mut scratch = vello_cpu::RenderContext::new(target_w, target_h);
    scratch.set_paint(raster::color_paint(fill));
    scratch.fill_path(&raster::bezpath_to_cpu(&path));
    scratch.flush();

    let mut pixmap = vello_cpu::Pixmap::new(target_w, target_h);
    scratch.render_to_pixmap(&mut pixmap);

    let visible = match placement.crop {
        Some(c) => {
            let (bytes, w, h) = raster::crop_premul_bytes(
                pixmap.data_as_u8_slice(),
                u32::from(target_w),
                u32::from(target_h),
                c.x,
                c.y,
                c.width,
                c.height,
            )?;
            raster::pixmap_from_premul_bytes(&bytes, w, h)?
        }
        None => pixmap,
    };
    blit_pixmap(ctx, visible, frame.x, frame.y, 1.0);
    Ok(())
}

fn figure_path(figure: &FigureElement, placement: &Placement) -> kurbo::BezPath {
    use crate::composition::model::FigureKind;
    use kurbo::Shape as _;

    let (w, h) = (placement.target_w, placement.target_h);
    match figure.sub_type {
        FigureKind::Ellipse => {
            kurbo::Ellipse::new((w / 2.0, h / 2.0), (w / 2.0, h / 2.0), 0.0).to_path(0.1)
        }
        FigureKind::Rect if figure.corner_radius > 0.0 => {
            kurbo::RoundedRect::new(0.0, 0.0, w, h, figure.corner_radius * placement.scale)
                .to_path(0.1)
        }
        FigureKind::Rect => kurbo::Rect::new(0.0, 0.0, w, h).to_path(0.1),
    }
}

fn draw_image(
    ctx: &mut vello_cpu::RenderContext,
    element: &ImageElement,
    source: &image::RgbaImage,
) -> FeedforgeResult<()> {
    let frame = &element.frame;
    let (final_w, final_h) = (frame.width.unwrap_or(0.0), frame.height.unwrap_or(0.0));

    let flipped = effects::apply_flips(source.clone(), element.flip_x, element.flip_y);
    let (natural_w, natural_h) = flipped.dimensions();
    let placement = Placement::resolve(
        f64::from(natural_w),
        f64::from(natural_h),
        final_w,
        final_h,
        frame.crop(),
    )?;

    // One resample pass only; the crop then selects scaled pixels.
    let target_w = (placement.target_w.round().max(1.0)) as u32;
    let target_h = (placement.target_h.round().max(1.0)) as u32;
    let scaled = image::imageops::resize(
        &flipped,
        target_w,
        target_h,
        image::imageops::FilterType::Lanczos3,
    );

    let mut visible = match placement.crop {
        Some(c) => crop_rgba(&scaled, c),
        None => scaled,
    };
    visible = effects::apply_effects(visible, element);
    effects::round_corners(&mut visible, element.corner_radius)?;

    let pixmap = raster::pixmap_from_rgba(&visible)?;
    blit_pixmap(
        ctx,
        pixmap,
        frame.x,
        frame.y,
        element.opacity.clamp(0.0, 1.0) as f32,
    );
    Ok(())
}

fn crop_rgba(img: &image::RgbaImage, c: CropBox) -> image::RgbaImage {
    let (w, h) = img.dimensions();
    let x0 = (c.x.round().max(0.0) as u32).min(w.saturating_sub(1));
    let y0 = (c.y.round().max(0.0) as u32).min(h.saturating_sub(1));
    let crop_w = (c.width.round() as u32).clamp(1, w - x0);
    let crop_h = (c.height.round() as u32).clamp(1, h - y0);
    image::imageops::crop_imm(img, x0, y0, crop_w, crop_h).to_image()
}

fn draw_text(
    ctx: &mut vello_cpu::RenderContext,
    text_engine: &mut TextLayoutEngine,
    element: &TextElement,
    font: &RenderableFont,
) -> FeedforgeResult<()> {
    let fill = parse_color(&element.fill).unwrap_or_else(|| {
        warn!(fill = element.fill.as_str(), "unparseable text fill, using black");
        Rgba8::BLACK
    });
    let brush = TextBrushRgba8 {
        r: fill.r,
        g: fill.g,
        b: fill.b,
        a: fill.a,
    };

    let max_width = element.frame.width.map(|w| w as f32);
    let layout = text_engine.layout(
        &element.text,
        font,
        brush,
        max_width,
        element.align,
        element.line_height as f32,
    )?;

    // Where the glyph box actually starts after alignment.
    let content_w = f64::from(layout.width());
    let origin_x = match (element.align, element.frame.width) {
        (TextAlign::Center, Some(w)) => element.frame.x + (w - content_w) / 2.0,
        (TextAlign::Right, Some(w)) => element.frame.x + w - content_w,
        _ => element.frame.x,
    };
    let origin_y = element.frame.y;

    if let Some(bg) = &element.background {
        use kurbo::Shape as _;
        match parse_color(&bg.color) {
            Some(color) => {
                let box_w = content_w + 2.0 * bg.padding;
                let box_h = f64::from(layout.height()) + 2.0 * bg.padding;
                let shape =
                    kurbo::RoundedRect::new(0.0, 0.0, box_w, box_h, bg.corner_radius).to_path(0.1);
                ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
                ctx.set_transform(raster::affine_to_cpu(kurbo::Affine::translate((
                    origin_x - bg.padding,
                    origin_y - bg.padding,
                ))));
                ctx.set_paint(raster::color_paint(color));
                ctx.fill_path(&raster::bezpath_to_cpu(&shape));
            }
            None => warn!(
                color = bg.color.as_str(),
                "unparseable text background color, skipping background"
            ),
        }
    }

    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
    // Glyph positions already carry the alignment offset inside the layout
    // box, so the transform anchors the unaligned element origin.
    ctx.set_transform(raster::affine_to_cpu(kurbo::Affine::translate((
        element.frame.x,
        element.frame.y,
    ))));
    draw_glyph_runs(ctx, &layout, font.data.as_ref().clone());
    Ok(())
}
