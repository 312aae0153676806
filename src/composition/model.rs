//! The layout document model.
//!
//! A document is an ordered sequence of pages, each an ordered sequence of
//! typed elements. Order is painter's order: later elements draw over
//! earlier ones. The element union is closed; unknown `type` tags fail
//! decoding up front rather than deep inside rendering.

use crate::foundation::{
    error::{FeedforgeError, FeedforgeResult},
    geometry::CropSpec,
};

fn default_canvas_side() -> f64 {
    1080.0
}

fn default_true() -> bool {
    true
}

fn default_font_family() -> String {
    "Arial".to_string()
}

fn default_font_variant() -> String {
    "regular".to_string()
}

fn default_font_size() -> f64 {
    20.0
}

fn default_text_fill() -> String {
    "#000000".to_string()
}

fn default_figure_fill() -> String {
    "black".to_string()
}

fn default_line_height() -> f64 {
    1.2
}

fn default_opacity() -> f64 {
    1.0
}

fn default_blur_radius() -> f64 {
    10.0
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDocument {
    #[serde(default = "default_canvas_side")]
    pub width: f64,
    #[serde(default = "default_canvas_side")]
    pub height: f64,
    /// Canvas background color; white when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    pub pages: Vec<Page>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Page background; repaints the full canvas when parseable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default)]
    pub children: Vec<Element>,
}

/// Closed element union, discriminated by the `type` field.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    Text(TextElement),
    Image(ImageElement),
    Figure(FigureElement),
}

impl Element {
    pub fn frame(&self) -> &Frame {
        match self {
            Element::Text(e) => &e.frame,
            Element::Image(e) => &e.frame,
            Element::Figure(e) => &e.frame,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.frame().id.as_deref()
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Element::Text(_) => "text",
            Element::Image(_) => "image",
            Element::Figure(_) => "figure",
        }
    }
}

/// Common positional contract shared by every element kind.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_height: Option<f64>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomProps>,
}

impl Frame {
    /// The crop rectangle, present only when all four components are set.
    pub fn crop(&self) -> Option<CropSpec> {
        Some(CropSpec {
            x: self.crop_x?,
            y: self.crop_y?,
            width: self.crop_width?,
            height: self.crop_height?,
        })
    }
}

/// Designer-attached metadata; `variable` binds the element to a field
/// mapping during template expansion.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomProps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBackground {
    pub color: String,
    #[serde(default)]
    pub padding: f64,
    #[serde(default)]
    pub corner_radius: f64,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
    #[serde(flatten)]
    pub frame: Frame,
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    /// Single weight/style token, e.g. "regular", "italic", "700italic".
    #[serde(default = "default_font_variant")]
    pub font_variant: String,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
    #[serde(default = "default_text_fill")]
    pub fill: String,
    #[serde(default)]
    pub align: TextAlign,
    #[serde(default = "default_line_height")]
    pub line_height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<TextBackground>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageElement {
    #[serde(flatten)]
    pub frame: Frame,
    pub src: String,
    #[serde(default)]
    pub corner_radius: f64,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default)]
    pub flip_x: bool,
    #[serde(default)]
    pub flip_y: bool,
    #[serde(default)]
    pub blur_enabled: bool,
    #[serde(default = "default_blur_radius")]
    pub blur_radius: f64,
    #[serde(default)]
    pub brightness_enabled: bool,
    #[serde(default)]
    pub brightness: f64,
    #[serde(default)]
    pub grayscale_enabled: bool,
    #[serde(default)]
    pub sepia_enabled: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FigureKind {
    #[default]
    Rect,
    Ellipse,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FigureElement {
    #[serde(flatten)]
    pub frame: Frame,
    #[serde(default)]
    pub sub_type: FigureKind,
    #[serde(default = "default_figure_fill")]
    pub fill: String,
    #[serde(default)]
    pub corner_radius: f64,
}

impl LayoutDocument {
    /// Parse a document from raw JSON, rejecting unknown element shapes.
    pub fn from_json(value: serde_json::Value) -> FeedforgeResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| FeedforgeError::validation(format!("invalid layout document: {e}")))
    }

    /// Structural validation gate run before any rendering work.
    pub fn validate(&self) -> FeedforgeResult<()> {
        if !(self.width > 0.0) || !(self.height > 0.0) {
            return Err(FeedforgeError::validation(
                "canvas width/height must be > 0",
            ));
        }
        if self.width > f64::from(u16::MAX) || self.height > f64::from(u16::MAX) {
            return Err(FeedforgeError::validation(format!(
                "canvas {}x{} exceeds the raster surface limit",
                self.width, self.height
            )));
        }

        for (page_idx, page) in self.pages.iter().enumerate() {
            for (child_idx, element) in page.children.iter().enumerate() {
                Self::validate_element(element).map_err(|e| {
                    FeedforgeError::validation(format!(
                        "page {page_idx}, child {child_idx}: {e}"
                    ))
                })?;
            }
        }
        Ok(())
    }

    fn validate_element(element: &Element) -> FeedforgeResult<()> {
        let frame = element.frame();
        for (name, dim) in [("width", frame.width), ("height", frame.height)] {
            if let Some(v) = dim
                && (!v.is_finite() || v < 0.0)
            {
                return Err(FeedforgeError::validation(format!(
                    "{name} must be non-negative, got {v}"
                )));
            }
        }
        if let Some(crop) = frame.crop() {
            crop.validate()?;
        }

        match element {
            Element::Image(e) => {
                if e.src.trim().is_empty() {
                    return Err(FeedforgeError::validation("image src must be non-empty"));
                }
                Self::require_box(frame, "image")
            }
            Element::Figure(_) => Self::require_box(frame, "figure"),
            Element::Text(_) => Ok(()),
        }
    }

    fn require_box(frame: &Frame, kind: &str) -> FeedforgeResult<()> {
        match (frame.width, frame.height) {
            (Some(w), Some(h)) if w > 0.0 && h > 0.0 => Ok(()),
            _ => Err(FeedforgeError::validation(format!(
                "{kind} elements require positive width and height"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> LayoutDocument {
        serde_json::from_value(serde_json::json!({
            "width": 1080,
            "height": 1080,
            "background": "#ffffff",
            "pages": [{
                "children": [
                    {
                        "type": "figure",
                        "id": "bg-panel",
                        "x": 0, "y": 0, "width": 1080, "height": 400,
                        "fill": "#102030",
                        "cornerRadius": 12
                    },
                    {
                        "type": "image",
                        "id": "hero",
                        "x": 40, "y": 40, "width": 500, "height": 500,
                        "src": "https://cdn.example.com/p.png",
                        "cropX": 0.1, "cropY": 0.0,
                        "cropWidth": 0.8, "cropHeight": 1.0,
                        "custom": {"variable": "product_image"}
                    },
                    {
                        "type": "text",
                        "id": "title",
                        "x": 60, "y": 600, "width": 900,
                        "text": "Hello",
                        "fontFamily": "Raleway",
                        "fontVariant": "700",
                        "fontSize": 48,
                        "fill": "#ff0000",
                        "align": "center",
                        "background": {"color": "#00000080", "padding": 8, "cornerRadius": 6},
                        "custom": {"variable": "title"}
                    }
                ]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn json_roundtrip_preserves_elements() {
        let doc = sample_doc();
        let s = serde_json::to_string(&doc).unwrap();
        let de: LayoutDocument = serde_json::from_str(&s).unwrap();
        assert_eq!(doc, de);
        assert_eq!(de.pages[0].children.len(), 3);
        assert_eq!(de.pages[0].children[1].kind_name(), "image");
    }

    #[test]
    fn defaults_are_applied() {
        let doc: LayoutDocument = serde_json::from_value(serde_json::json!({
            "pages": [{"children": [{"type": "text", "text": "hi"}]}]
        }))
        .unwrap();
        assert_eq!(doc.width, 1080.0);
        let Element::Text(t) = &doc.pages[0].children[0] else {
            panic!("expected text");
        };
        assert_eq!(t.font_family, "Arial");
        assert_eq!(t.font_variant, "regular");
        assert_eq!(t.font_size, 20.0);
        assert_eq!(t.align, TextAlign::Left);
        assert!(t.frame.visible);
    }

    #[test]
    fn unknown_element_type_is_rejected() {
        let res: Result<LayoutDocument, _> = serde_json::from_value(serde_json::json!({
            "pages": [{"children": [{"type": "hologram", "x": 0, "y": 0}]}]
        }));
        assert!(res.is_err());
    }

    #[test]
    fn partial_crop_is_treated_as_absent() {
        let doc: LayoutDocument = serde_json::from_value(serde_json::json!({
            "pages": [{"children": [{
                "type": "image", "src": "https://x/y.png",
                "width": 10, "height": 10, "cropX": 0.5
            }]}]
        }))
        .unwrap();
        assert!(doc.pages[0].children[0].frame().crop().is_none());
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn validate_rejects_negative_sizes_and_bad_crops() {
        let mut doc = sample_doc();
        assert!(doc.validate().is_ok());

        let Element::Figure(f) = &mut doc.pages[0].children[0] else {
            panic!("expected figure");
        };
        f.frame.width = Some(-4.0);
        assert!(doc.validate().is_err());

        let mut doc = sample_doc();
        let Element::Image(i) = &mut doc.pages[0].children[1] else {
            panic!("expected image");
        };
        i.frame.crop_width = Some(1.5);
        assert!(doc.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_figure_box() {
        let doc: LayoutDocument = serde_json::from_value(serde_json::json!({
            "pages": [{"children": [{"type": "figure", "x": 1, "y": 2}]}]
        }))
        .unwrap();
        assert!(doc.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_canvas() {
        let doc: LayoutDocument = serde_json::from_value(serde_json::json!({
            "width": 0, "pages": []
        }))
        .unwrap();
        assert!(doc.validate().is_err());
    }
}
