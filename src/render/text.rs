//! Text shaping and glyph drawing.
//!
//! Layouts are built with Parley from the resolved font payload; glyph
//! runs are filled through the CPU rasterizer. The measured layout box
//! drives the optional rounded background behind the glyphs.

use std::borrow::Cow;

use crate::{
    composition::model::TextAlign,
    fonts::resolver::RenderableFont,
    foundation::error::{FeedforgeError, FeedforgeResult},
};

/// RGBA8 brush color carried through Parley styles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrushRgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Stateful helper owning the Parley contexts for one compose pass.
pub struct TextLayoutEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrushRgba8>,
}

impl Default for TextLayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextLayoutEngine {
    pub fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
        }
    }

    /// Shape and lay out `text` with the resolved font, breaking lines at
    /// `max_width` when present. Alignment needs a container width; with
    /// no width the run stays start-aligned.
    pub fn layout(
        &mut self,
        text: &str,
        font: &RenderableFont,
        brush: TextBrushRgba8,
        max_width: Option<f32>,
        align: TextAlign,
        line_height: f32,
    ) -> FeedforgeResult<parley::Layout<TextBrushRgba8>> {
        if !font.size.is_finite() || font.size <= 0.0 {
            return Err(FeedforgeError::validation(
                "font size must be finite and > 0",
            ));
        }

        let families = self.font_ctx.collection.register_fonts(
            parley::fontique::Blob::from(font.data.as_ref().clone()),
            None,
        );
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            FeedforgeError::validation("no font families registered from font bytes")
        })?;
        let family_name = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| FeedforgeError::validation("registered font family has no name"))?
            .to_string();

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(Cow::Owned(family_name)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(font.size));
        builder.push_default(parley::style::StyleProperty::LineHeight(
            parley::style::LineHeight::FontSizeRelative(line_height),
        ));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(text);
        if let Some(w) = max_width {
            layout.break_all_lines(Some(w));
            layout.align(
                Some(w),
                match align {
                    TextAlign::Left => parley::Alignment::Start,
                    TextAlign::Center => parley::Alignment::Center,
                    TextAlign::Right => parley::Alignment::End,
                },
                parley::AlignmentOptions::default(),
            );
        } else {
            layout.break_all_lines(None);
        }

        Ok(layout)
    }
}

/// Fill every glyph run of `layout` into `ctx` using the font payload the
/// layout was shaped with. The caller sets the canvas transform first.
pub fn draw_glyph_runs(
    ctx: &mut vello_cpu::RenderContext,
    layout: &parley::Layout<TextBrushRgba8>,
    font_bytes: Vec<u8>,
) {
    let font_data =
        vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(font_bytes), 0);

    for line in layout.lines() {
        for item in line.items() {
            let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                continue;
            };

            let brush = run.style().brush;
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                brush.r, brush.g, brush.b, brush.a,
            ));

            let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                id: g.id,
                x: g.x,
                y: g.y,
            });
            ctx.glyph_run(&font_data)
                .font_size(run.run().font_size())
                .fill_glyphs(glyphs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::resolver::{FontOrigin, RenderableFont};
    use std::sync::Arc;

    fn system_font(size: f32) -> Option<RenderableFont> {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        let id = db.faces().next().map(|f| f.id)?;
        let data = db.with_face_data(id, |data, _| data.to_vec())?;
        Some(RenderableFont {
            family: "system".to_string(),
            variant: "regular".to_string(),
            size,
            data: Arc::new(data),
            origin: FontOrigin::SystemDefault,
        })
    }

    #[test]
    fn rejects_unusable_font_bytes() {
        let mut engine = TextLayoutEngine::new();
        let font = RenderableFont {
            family: "bogus".to_string(),
            variant: "regular".to_string(),
            size: 20.0,
            data: Arc::new(vec![0, 1, 2, 3]),
            origin: FontOrigin::Bundled,
        };
        assert!(
            engine
                .layout("hi", &font, TextBrushRgba8::default(), None, TextAlign::Left, 1.2)
                .is_err()
        );
    }

    #[test]
    fn measures_a_nonempty_box_with_a_real_font() {
        // Environment-dependent: only runs where system fonts exist.
        let Some(font) = system_font(32.0) else {
            return;
        };
        let mut engine = TextLayoutEngine::new();
        let layout = engine
            .layout(
                "Hello layout",
                &font,
                TextBrushRgba8 {
                    r: 255,
                    g: 255,
                    b: 255,
                    a: 255,
                },
                Some(400.0),
                TextAlign::Center,
                1.2,
            )
            .unwrap();
        assert!(layout.width() > 0.0);
        assert!(layout.height() > 0.0);
        assert!(layout.width() <= 400.0 + f32::EPSILON);
    }

    #[test]
    fn wrapping_increases_height() {
        let Some(font) = system_font(24.0) else {
            return;
        };
        let mut engine = TextLayoutEngine::new();
        let text = "a few words that will definitely need to wrap somewhere";
        let wide = engine
            .layout(text, &font, TextBrushRgba8::default(), Some(10_000.0), TextAlign::Left, 1.2)
            .unwrap();
        let narrow = engine
            .layout(text, &font, TextBrushRgba8::default(), Some(120.0), TextAlign::Left, 1.2)
            .unwrap();
        assert!(narrow.height() > wide.height());
    }
}
