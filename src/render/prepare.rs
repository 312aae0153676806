//! Front-loaded I/O for one compose pass.
//!
//! Every image fetch/decode and every font resolution happens here, before
//! any drawing, so the compose loop itself is deterministic and I/O-free.
//! A failed image source becomes a diagnostic and the element is skipped;
//! font resolution degrades through the resolver's tier chain instead of
//! failing.

use std::collections::HashMap;

use tracing::debug;

use crate::{
    composition::model::{Element, LayoutDocument},
    fonts::resolver::{FontResolver, RenderableFont},
    foundation::error::{DiagnosticStage, FeedforgeResult, RenderDiagnostic},
    render::fetch::{ImageFetcher, decode_rgba},
};

/// Prepared per-element source data.
pub enum PreparedSource {
    Image(image::RgbaImage),
    Font(RenderableFont),
}

/// Prepared sources keyed by `(page_index, child_index)`.
pub struct PreparedElements {
    sources: HashMap<(usize, usize), PreparedSource>,
    /// Failures recorded while preparing; the matching elements have no
    /// entry in `sources` and will be skipped by the compose loop.
    pub diagnostics: Vec<RenderDiagnostic>,
}

impl PreparedElements {
    pub fn get(&self, page: usize, child: usize) -> Option<&PreparedSource> {
        self.sources.get(&(page, child))
    }
}

pub async fn prepare(
    document: &LayoutDocument,
    fonts: &FontResolver,
    fetcher: &dyn ImageFetcher,
) -> FeedforgeResult<PreparedElements> {
    let mut sources = HashMap::new();
    let mut diagnostics = Vec::new();

    for (page_idx, page) in document.pages.iter().enumerate() {
        for (child_idx, element) in page.children.iter().enumerate() {
            if !element.frame().visible {
                continue;
            }
            match element {
                Element::Image(img) => {
                    let fetched = match fetcher.fetch(&img.src).await {
                        Ok(bytes) => decode_rgba(&bytes),
                        Err(e) => Err(e),
                    };
                    match fetched {
                        Ok(decoded) => {
                            debug!(
                                src = img.src.as_str(),
                                width = decoded.width(),
                                height = decoded.height(),
                                "prepared image source"
                            );
                            sources.insert(
                                (page_idx, child_idx),
                                PreparedSource::Image(decoded),
                            );
                        }
                        Err(e) => diagnostics.push(RenderDiagnostic::new(
                            img.frame.id.clone(),
                            DiagnosticStage::Fetch,
                            format!("image source '{}' unavailable: {e}", img.src),
                        )),
                    }
                }
                Element::Text(text) => {
                    if text.text.is_empty() {
                        continue;
                    }
                    let font = fonts
                        .resolve(&text.font_family, &text.font_variant, text.font_size as f32)
                        .await?;
                    sources.insert((page_idx, child_idx), PreparedSource::Font(font));
                }
                Element::Figure(_) => {}
            }
        }
    }

    Ok(PreparedElements {
        sources,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fonts::{provider::NullFontProvider, resolver::FontResolver},
        render::fetch::MemoryImageFetcher,
        store::object::MemoryObjectStore,
    };
    use std::{io::Cursor, io::Write as _, sync::Arc};

    fn png_fixture() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn doc() -> LayoutDocument {
        serde_json::from_value(serde_json::json!({
            "pages": [{"children": [
                {"type": "image", "id": "ok", "width": 2, "height": 2,
                 "src": "https://cdn/ok.png"},
                {"type": "image", "id": "broken", "width": 2, "height": 2,
                 "src": "https://cdn/broken.png"},
                {"type": "text", "id": "label", "text": "hi"}
            ]}]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn failed_sources_become_diagnostics_not_errors() {
        let bundled = {
            let mut f = tempfile::NamedTempFile::new().unwrap();
            f.write_all(b"font-bytes").unwrap();
            f
        };
        let fonts = FontResolver::new(
            Arc::new(MemoryObjectStore::new()),
            Arc::new(NullFontProvider),
            Some(bundled.path().to_path_buf()),
        );
        let fetcher = MemoryImageFetcher::new().with_source("https://cdn/ok.png", png_fixture());

        let prepared = prepare(&doc(), &fonts, &fetcher).await.unwrap();

        assert!(matches!(
            prepared.get(0, 0),
            Some(PreparedSource::Image(_))
        ));
        assert!(prepared.get(0, 1).is_none());
        assert!(matches!(prepared.get(0, 2), Some(PreparedSource::Font(_))));
        assert_eq!(prepared.diagnostics.len(), 1);
        assert_eq!(prepared.diagnostics[0].element_id.as_deref(), Some("broken"));
    }
}
