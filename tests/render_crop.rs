//! Pixel-level checks of the scale-then-crop contract through the public
//! engine API.

use std::{io::Cursor, sync::Arc};

use feedforge::{
    CompositionEngine, FontResolver, LayoutDocument, MemoryImageFetcher, MemoryObjectStore,
    NullFontProvider,
};

fn engine(fetcher: MemoryImageFetcher) -> CompositionEngine {
    let fonts = FontResolver::new(
        Arc::new(MemoryObjectStore::new()),
        Arc::new(NullFontProvider),
        None,
    );
    CompositionEngine::new(Arc::new(fonts), Arc::new(fetcher))
}

fn encode(img: image::RgbaImage) -> Vec<u8> {
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn assert_px(img: &image::RgbaImage, x: u32, y: u32, expected: [u8; 4]) {
    let actual = img.get_pixel(x, y).0;
    for (a, b) in actual.iter().zip(expected) {
        assert!(
            a.abs_diff(b) <= 2,
            "pixel ({x},{y}) was {actual:?}, expected {expected:?}"
        );
    }
}

/// Left half red, right half blue.
fn two_tone_source() -> Vec<u8> {
    let mut img = image::RgbaImage::new(100, 50);
    for (x, _, px) in img.enumerate_pixels_mut() {
        *px = if x < 50 {
            image::Rgba([255, 0, 0, 255])
        } else {
            image::Rgba([0, 0, 255, 255])
        };
    }
    encode(img)
}

#[tokio::test]
async fn width_constrained_crop_selects_the_right_region() {
    // cropX 0.5 with cropWidth 0.5: the visible window is exactly the
    // blue right half of the scaled source.
    let fetcher = MemoryImageFetcher::new().with_source("https://cdn/two-tone.png", two_tone_source());
    let doc: LayoutDocument = serde_json::from_value(serde_json::json!({
        "width": 60, "height": 60, "background": "#ffffff",
        "pages": [{"children": [{
            "type": "image", "x": 0, "y": 0, "width": 50, "height": 50,
            "src": "https://cdn/two-tone.png",
            "cropX": 0.5, "cropY": 0.0, "cropWidth": 0.5, "cropHeight": 1.0
        }]}]
    }))
    .unwrap();

    let rendered = engine(fetcher).render(&doc).await.unwrap();
    assert!(rendered.diagnostics.is_empty());

    // Inside the crop window: blue, never red.
    assert_px(&rendered.image, 10, 25, [0, 0, 255, 255]);
    assert_px(&rendered.image, 45, 25, [0, 0, 255, 255]);
    // Outside the element box the canvas shows through.
    assert_px(&rendered.image, 55, 55, [255, 255, 255, 255]);
}

#[tokio::test]
async fn uncropped_image_keeps_its_aspect_ratio() {
    // A 100x50 source in a 60x60 box scales to 60x30: no distortion, and
    // the area below the fitted image stays background.
    let fetcher = MemoryImageFetcher::new().with_source("https://cdn/two-tone.png", two_tone_source());
    let doc: LayoutDocument = serde_json::from_value(serde_json::json!({
        "width": 60, "height": 60, "background": "#ffffff",
        "pages": [{"children": [{
            "type": "image", "x": 0, "y": 0, "width": 60, "height": 60,
            "src": "https://cdn/two-tone.png"
        }]}]
    }))
    .unwrap();

    let rendered = engine(fetcher).render(&doc).await.unwrap();
    assert!(rendered.diagnostics.is_empty());

    assert_px(&rendered.image, 10, 15, [255, 0, 0, 255]);
    assert_px(&rendered.image, 50, 15, [0, 0, 255, 255]);
    assert_px(&rendered.image, 30, 45, [255, 255, 255, 255]);
}

#[tokio::test]
async fn height_constrained_crop_selects_the_bottom_band() {
    // Top half green, bottom half black, cropY 0.5 / cropHeight 0.5.
    let mut img = image::RgbaImage::new(40, 80);
    for (_, y, px) in img.enumerate_pixels_mut() {
        *px = if y < 40 {
            image::Rgba([0, 255, 0, 255])
        } else {
            image::Rgba([0, 0, 0, 255])
        };
    }
    let fetcher = MemoryImageFetcher::new().with_source("https://cdn/bands.png", encode(img));

    let doc: LayoutDocument = serde_json::from_value(serde_json::json!({
        "width": 50, "height": 50, "background": "#ffffff",
        "pages": [{"children": [{
            "type": "image", "x": 0, "y": 0, "width": 20, "height": 40,
            "src": "https://cdn/bands.png",
            "cropX": 0.0, "cropY": 0.5, "cropWidth": 1.0, "cropHeight": 0.5
        }]}]
    }))
    .unwrap();

    let rendered = engine(fetcher).render(&doc).await.unwrap();
    assert!(rendered.diagnostics.is_empty());

    // target_h = 40 / 0.5 = 80, crop starts at the black band.
    assert_px(&rendered.image, 10, 10, [0, 0, 0, 255]);
    assert_px(&rendered.image, 10, 35, [0, 0, 0, 255]);
    assert_px(&rendered.image, 45, 45, [255, 255, 255, 255]);
}
