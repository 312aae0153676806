//! Crop/scale placement math.
//!
//! All arithmetic is pure `f64`; rounding to device pixels happens at the
//! rasterization boundary, never here. A source with natural dimensions
//! `(w, h)` is scaled exactly once to `(target_w, target_h)` and the
//! normalized crop rectangle is then expressed in that target space.

use crate::foundation::error::{FeedforgeError, FeedforgeResult};

/// Normalized crop rectangle, each component in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropSpec {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropSpec {
    pub fn validate(&self) -> FeedforgeResult<()> {
        for (name, v) in [
            ("cropX", self.x),
            ("cropY", self.y),
            ("cropWidth", self.width),
            ("cropHeight", self.height),
        ] {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(FeedforgeError::validation(format!(
                    "{name} must be within [0, 1], got {v}"
                )));
            }
        }
        if self.width == 0.0 || self.height == 0.0 {
            return Err(FeedforgeError::validation(
                "crop width/height must be > 0",
            ));
        }
        Ok(())
    }

    /// True when neither axis narrows the visible region.
    pub fn is_full(&self) -> bool {
        self.width >= 1.0 && self.height >= 1.0
    }
}

/// Crop window in scaled-target pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Resolved scale/crop placement for one element.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    /// Scaled source width before cropping.
    pub target_w: f64,
    /// Scaled source height before cropping.
    pub target_h: f64,
    /// Uniform scale factor applied to the source.
    pub scale: f64,
    /// Crop window in target space; `None` means full display.
    pub crop: Option<CropBox>,
}

impl Placement {
    /// Resolve placement for a source of natural size `(w, h)` into a
    /// destination box `(final_w, final_h)` under an optional crop.
    ///
    /// With `crop_width < 1` the width axis constrains the scale; with
    /// `crop_height < 1` the height axis does. When both narrow the
    /// region and the destination box is square, the larger of the two
    /// independently computed targets wins so both constraints stay
    /// satisfiable. Without a crop the source is fit inside the box,
    /// preserving aspect ratio.
    pub fn resolve(
        w: f64,
        h: f64,
        final_w: f64,
        final_h: f64,
        crop: Option<CropSpec>,
    ) -> FeedforgeResult<Placement> {
        if !(w > 0.0) || !(h > 0.0) {
            return Err(FeedforgeError::validation(format!(
                "source dimensions must be positive, got {w}x{h}"
            )));
        }
        if !(final_w > 0.0) || !(final_h > 0.0) {
            return Err(FeedforgeError::validation(format!(
                "element dimensions must be positive, got {final_w}x{final_h}"
            )));
        }

        let Some(spec) = crop.filter(|c| !c.is_full()) else {
            return Ok(Self::fit_within(w, h, final_w, final_h));
        };
        spec.validate()?;

        let width_constrained = spec.width < 1.0;
        let height_constrained = spec.height < 1.0;
        let square_box = (final_w - final_h).abs() < f64::EPSILON;

        let (target_w, target_h, scale) = if width_constrained && height_constrained && square_box {
            // Both axes narrow a square box: take the larger candidate
            // target so each axis still covers its crop window.
            let from_width = final_w / spec.width;
            let from_height = final_h / spec.height;
            let side = from_width.max(from_height);
            (side, side, side / w.max(h))
        } else if width_constrained {
            let target_w = final_w / spec.width;
            let scale = target_w / w;
            (target_w, h * scale, scale)
        } else {
            let target_h = final_h / spec.height;
            let scale = target_h / h;
            (w * scale, target_h, scale)
        };

        Ok(Placement {
            target_w,
            target_h,
            scale,
            crop: Some(CropBox {
                x: target_w * spec.x,
                y: target_h * spec.y,
                width: target_w * spec.width,
                height: target_h * spec.height,
            }),
        })
    }

    /// Scale to fit inside the box, preserving the source aspect ratio.
    fn fit_within(w: f64, h: f64, final_w: f64, final_h: f64) -> Placement {
        let source_aspect = w / h;
        let box_aspect = final_w / final_h;

        let scale = if source_aspect > box_aspect {
            final_w / w
        } else {
            final_h / h
        };

        Placement {
            target_w: w * scale,
            target_h: h * scale,
            scale,
            crop: None,
        }
    }
}
