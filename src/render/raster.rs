//! Pixmap and paint plumbing between the `image` crate, `kurbo`, and the
//! CPU rasterizer. Rasterization works in premultiplied RGBA8 end to end;
//! straight alpha only exists at the decode and PNG-encode boundaries.

use std::{io::Cursor, sync::Arc};

use anyhow::Context as _;

use crate::foundation::{
    color::Rgba8,
    error::{FeedforgeError, FeedforgeResult},
};

pub fn surface_dim(v: f64) -> FeedforgeResult<u16> {
    let rounded = v.round();
    if !(rounded >= 1.0) || rounded > f64::from(u16::MAX) {
        return Err(FeedforgeError::validation(format!(
            "surface dimension {v} exceeds the raster limit"
        )));
    }
    Ok(rounded as u16)
}

/// Straight-alpha RGBA8 image -> premultiplied pixmap.
pub fn pixmap_from_rgba(rgba: &image::RgbaImage) -> FeedforgeResult<vello_cpu::Pixmap> {
    let (width, height) = rgba.dimensions();
    let w = surface_dim(f64::from(width))?;
    let h = surface_dim(f64::from(height))?;

    let mut may_have_opacities = false;
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for px in rgba.as_raw().chunks_exact(4) {
        let a = px[3];
        may_have_opacities |= a != 255;
        let premul = Rgba8 {
            r: px[0],
            g: px[1],
            b: px[2],
            a,
        }
        .premultiplied();
        pixels.push(vello_cpu::peniko::color::PremulRgba8 {
            r: premul[0],
            g: premul[1],
            b: premul[2],
            a,
        });
    }

    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}

/// Premultiplied row-major bytes -> pixmap.
pub fn pixmap_from_premul_bytes(
    rgba8_premul: &[u8],
    width: u32,
    height: u32,
) -> FeedforgeResult<vello_cpu::Pixmap> {
    let w = surface_dim(f64::from(width))?;
    let h = surface_dim(f64::from(height))?;
    if rgba8_premul.len() != width as usize * height as usize * 4 {
        return Err(FeedforgeError::validation(
            "premultiplied byte length mismatch",
        ));
    }

    let mut may_have_opacities = false;
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for px in rgba8_premul.chunks_exact(4) {
        let a = px[3];
        may_have_opacities |= a != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8 {
            r: px[0],
            g: px[1],
            b: px[2],
            a,
        });
    }

    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}

/// Wrap a pixmap as an image paint for 1:1 blits.
pub fn pixmap_paint(pixmap: vello_cpu::Pixmap) -> vello_cpu::Image {
    vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    }
}

pub fn color_paint(color: Rgba8) -> vello_cpu::peniko::Color {
    vello_cpu::peniko::Color::from_rgba8(color.r, color.g, color.b, color.a)
}

pub fn affine_to_cpu(a: kurbo::Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn point_to_cpu(p: kurbo::Point) -> vello_cpu::kurbo::Point {
    vello_cpu::kurbo::Point::new(p.x, p.y)
}

pub fn bezpath_to_cpu(path: &kurbo::BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(point_to_cpu(p)),
            PathEl::LineTo(p) => out.line_to(point_to_cpu(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(point_to_cpu(p1), point_to_cpu(p2)),
            PathEl::CurveTo(p1, p2, p3) => {
                out.curve_to(point_to_cpu(p1), point_to_cpu(p2), point_to_cpu(p3));
            }
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

/// Crop a premultiplied pixel buffer in place, clamping the window to the
/// buffer bounds. Returns the cropped bytes and their dimensions.
pub fn crop_premul_bytes(
    bytes: &[u8],
    width: u32,
    height: u32,
    crop_x: f64,
    crop_y: f64,
    crop_w: f64,
    crop_h: f64,
) -> FeedforgeResult<(Vec<u8>, u32, u32)> {
    let x0 = (crop_x.round().max(0.0) as u32).min(width.saturating_sub(1));
    let y0 = (crop_y.round().max(0.0) as u32).min(height.saturating_sub(1));
    let w = (crop_w.round() as u32).clamp(1, width - x0);
    let h = (crop_h.round() as u32).clamp(1, height - y0);

    if bytes.len() != width as usize * height as usize * 4 {
        return Err(FeedforgeError::validation("crop source length mismatch"));
    }

    let mut out = Vec::with_capacity(w as usize * h as usize * 4);
    for row in y0..y0 + h {
        let start = (row as usize * width as usize + x0 as usize) * 4;
        out.extend_from_slice(&bytes[start..start + w as usize * 4]);
    }
    Ok((out, w, h))
}

/// Premultiplied pixmap contents -> straight-alpha RGBA8 image.
pub fn pixmap_to_rgba(pixmap: &vello_cpu::Pixmap, width: u32, height: u32) -> image::RgbaImage {
    let data = pixmap.data_as_u8_slice();
    let mut out = Vec::with_capacity(data.len());
    for px in data.chunks_exact(4) {
        let a = px[3];
        if a == 0 {
            out.extend_from_slice(&[0, 0, 0, 0]);
            continue;
        }
        let unpremul = |c: u8| -> u8 {
            (((u32::from(c) * 255) + u32::from(a) / 2) / u32::from(a)).min(255) as u8
        };
        out.extend_from_slice(&[unpremul(px[0]), unpremul(px[1]), unpremul(px[2]), a]);
    }
    image::RgbaImage::from_raw(width, height, out)
        .expect("pixmap byte length matches its dimensions")
}

/// Encode a straight-alpha image as PNG bytes.
pub fn encode_png(image: &image::RgbaImage) -> FeedforgeResult<Vec<u8>> {
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .context("encode png")?;
    Ok(buf)
}
