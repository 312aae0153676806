//! Template expansion: one layout document per product record.
//!
//! Expansion never fails for an individual product. A product that matches
//! no field mapping simply yields an untouched copy of the base template.

use serde_json::Value;
use tracing::{debug, warn};

use crate::composition::model::{Element, LayoutDocument};

/// One field-mapping definition: binds a template variable label to a
/// product column.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct FieldMapping {
    /// Variable label matched against `custom.variable` on elements.
    pub label: String,
    /// Product column to read; empty/absent means the mapping is inert.
    pub product_map: Option<String>,
}

/// A product row with arbitrary columns.
pub type ProductRecord = serde_json::Map<String, Value>;

/// One expanded per-product document.
#[derive(Clone, Debug)]
pub struct ExpandedDocument {
    /// Stringified product `id` column, when the record has one.
    pub product_id: Option<String>,
    pub document: LayoutDocument,
}

/// Expand `template` over `products`, rewriting bound elements from the
/// product columns named by `fields`.
pub fn expand(
    template: &LayoutDocument,
    fields: &[FieldMapping],
    products: &[ProductRecord],
) -> Vec<ExpandedDocument> {
    products
        .iter()
        .map(|product| {
            let mut document = template.clone();
            apply_product(&mut document, fields, product);
            ExpandedDocument {
                product_id: product.get("id").map(stringify),
                document,
            }
        })
        .collect()
}

/// Rewrite the bindable elements of the document's first page in place.
fn apply_product(document: &mut LayoutDocument, fields: &[FieldMapping], product: &ProductRecord) {
    let Some(page) = document.pages.first_mut() else {
        return;
    };

    for element in &mut page.children {
        let Some(variable) = element
            .frame()
            .custom
            .as_ref()
            .and_then(|c| c.variable.clone())
        else {
            continue;
        };

        let Some(column) = fields
            .iter()
            .find(|f| f.label == variable)
            .and_then(|f| f.product_map.as_deref())
            .filter(|c| !c.is_empty())
        else {
            debug!(variable = variable.as_str(), "no usable field mapping, element passes through");
            continue;
        };

        let value = match product.get(column) {
            Some(v) if !v.is_null() => v,
            _ => {
                warn!(
                    variable = variable.as_str(),
                    column, "product column absent or null, leaving element unmodified"
                );
                continue;
            }
        };

        match element {
            Element::Text(text) => {
                text.text = stringify(value);
            }
            Element::Image(image) => {
                let Value::String(src) = value else {
                    warn!(variable = variable.as_str(), column, "image source value is not a string, skipping");
                    continue;
                };
                if src.trim().is_empty() {
                    warn!(variable = variable.as_str(), column, "image source value is empty, skipping");
                    continue;
                }
                if !(src.starts_with("http://") || src.starts_with("https://")) {
                    warn!(
                        variable = variable.as_str(),
                        column,
                        src = src.as_str(),
                        "image source is not an http(s) URL, skipping"
                    );
                    continue;
                }
                image.src = src.clone();
            }
            Element::Figure(_) => {
                debug!(variable = variable.as_str(), "figure elements have no bindable content");
            }
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
