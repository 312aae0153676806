//! Per-image decorations applied after scaling and cropping.
//!
//! All operations take and return straight-alpha RGBA8. Channel math
//! mirrors the blur/brightness/sepia/grayscale set the layout documents
//! already use in the wild.

use crate::composition::model::ImageElement;
use crate::foundation::error::FeedforgeResult;
use crate::render::raster;

/// Apply the element's effect switches in a fixed order: blur, brightness,
/// sepia, grayscale. Opacity and corner rounding are handled separately at
/// the blit.
pub fn apply_effects(mut img: image::RgbaImage, element: &ImageElement) -> image::RgbaImage {
    if element.blur_enabled && element.blur_radius > 0.0 {
        img = image::imageops::blur(&img, element.blur_radius as f32);
    }
    if element.brightness_enabled && element.brightness != 0.0 {
        brighten_in_place(&mut img, element.brightness);
    }
    if element.sepia_enabled {
        sepia_in_place(&mut img);
    }
    if element.grayscale_enabled {
        grayscale_in_place(&mut img);
    }
    img
}

pub fn apply_flips(img: image::RgbaImage, flip_x: bool, flip_y: bool) -> image::RgbaImage {
    let img = if flip_x {
        image::imageops::flip_horizontal(&img)
    } else {
        img
    };
    if flip_y {
        image::imageops::flip_vertical(&img)
    } else {
        img
    }
}

/// Multiplicative brightness: each color channel scaled by `1 + amount`.
fn brighten_in_place(img: &mut image::RgbaImage, amount: f64) {
    let factor = (1.0 + amount).max(0.0);
    for px in img.pixels_mut() {
        for c in &mut px.0[..3] {
            *c = ((f64::from(*c) * factor).round()).clamp(0.0, 255.0) as u8;
        }
    }
}

fn sepia_in_place(img: &mut image::RgbaImage) {
    for px in img.pixels_mut() {
        let [r, g, b, _] = px.0.map(f64::from);
        px.0[0] = (0.393 * r + 0.769 * g + 0.189 * b).min(255.0) as u8;
        px.0[1] = (0.349 * r + 0.686 * g + 0.168 * b).min(255.0) as u8;
        px.0[2] = (0.272 * r + 0.534 * g + 0.131 * b).min(255.0) as u8;
    }
}

fn grayscale_in_place(img: &mut image::RgbaImage) {
    for px in img.pixels_mut() {
        let [r, g, b, _] = px.0.map(f64::from);
        let luma = (0.299 * r + 0.587 * g + 0.114 * b).round().min(255.0) as u8;
        px.0[0] = luma;
        px.0[1] = luma;
        px.0[2] = luma;
    }
}

/// Multiply the alpha channel by a rounded-rectangle coverage mask.
pub fn round_corners(img: &mut image::RgbaImage, radius: f64) -> FeedforgeResult<()> {
    if radius <= 0.0 {
        return Ok(());
    }
    let (width, height) = img.dimensions();
    let w = raster::surface_dim(f64::from(width))?;
    let h = raster::surface_dim(f64::from(height))?;

    let mut ctx = vello_cpu::RenderContext::new(w, h);
    let shape = kurbo::RoundedRect::new(0.0, 0.0, f64::from(width), f64::from(height), radius);
    ctx.set_paint(raster::color_paint(crate::foundation::color::Rgba8::WHITE));
    ctx.fill_path(&raster::bezpath_to_cpu(&kurbo::Shape::to_path(&shape, 0.1)));
    ctx.flush();

    let mut mask = vello_cpu::Pixmap::new(w, h);
    ctx.render_to_pixmap(&mut mask);
    let mask_bytes = mask.data_as_u8_slice();

    for (px, mask_px) in (**img).chunks_exact_mut(4).zip(mask_bytes.chunks_exact(4)) {
        let coverage = u16::from(mask_px[3]);
        px[3] = ((u16::from(px[3]) * coverage + 127) / 255) as u8;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element_with(f: impl FnOnce(&mut ImageElement)) -> ImageElement {
        let mut e: ImageElement = serde_json::from_value(serde_json::json!({
            "type": "image", "src": "https://x/y.png", "width": 4, "height": 4
        }))
        .map(|el: crate::composition::model::Element| match el {
            crate::composition::model::Element::Image(i) => i,
            _ => unreachable!(),
        })
        .unwrap();
        f(&mut e);
        e
    }

    #[test]
    fn brightness_scales_color_channels_only() {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([100, 50, 0, 200]));
        let e = element_with(|e| {
            e.brightness_enabled = true;
            e.brightness = 0.5;
        });
        let out = apply_effects(img, &e);
        assert_eq!(out.get_pixel(0, 0).0, [150, 75, 0, 200]);
    }

    #[test]
    fn grayscale_leaves_alpha_untouched() {
        let img = image::RgbaImage::from_pixel(1, 1, image::Rgba([255, 0, 0, 77]));
        let e = element_with(|e| e.grayscale_enabled = true);
        let out = apply_effects(img, &e);
        let px = out.get_pixel(0, 0).0;
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
        assert_eq!(px[3], 77);
    }

    #[test]
    fn flips_mirror_pixels() {
        let mut img = image::RgbaImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgba([1, 0, 0, 255]));
        img.put_pixel(1, 0, image::Rgba([2, 0, 0, 255]));
        let flipped = apply_flips(img, true, false);
        assert_eq!(flipped.get_pixel(0, 0).0[0], 2);
        assert_eq!(flipped.get_pixel(1, 0).0[0], 1);
    }

    #[test]
    fn round_corners_clears_corner_alpha_but_keeps_center() {
        let mut img = image::RgbaImage::from_pixel(32, 32, image::Rgba([10, 10, 10, 255]));
        round_corners(&mut img, 12.0).unwrap();
        assert_eq!(img.get_pixel(0, 0).0[3], 0);
        assert_eq!(img.get_pixel(16, 16).0[3], 255);
    }

    #[test]
    fn zero_radius_is_a_no_op() {
        let mut img = image::RgbaImage::from_pixel(4, 4, image::Rgba([1, 2, 3, 255]));
        round_corners(&mut img, 0.0).unwrap();
        assert_eq!(img.get_pixel(0, 0).0[3], 255);
    }
}
