//! Read-side relational access for the process phase: the base template,
//! the field-mapping definitions, and the owner's product records.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use sqlx::Row as _;

use crate::{
    composition::expand::{FieldMapping, ProductRecord},
    foundation::error::{FeedforgeError, FeedforgeResult},
};

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fetch the raw template JSON owned by `subject_id`.
    async fn fetch_template(
        &self,
        subject_id: &str,
        template_id: &str,
    ) -> FeedforgeResult<serde_json::Value>;

    async fn fetch_fields(&self) -> FeedforgeResult<Vec<FieldMapping>>;

    async fn fetch_products(&self, subject_id: &str) -> FeedforgeResult<Vec<ProductRecord>>;
}

fn db_err(e: sqlx::Error) -> FeedforgeError {
    FeedforgeError::storage(e.to_string())
}

/// Postgres-backed catalog.
pub struct PgCatalogStore {
    pool: sqlx::PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn fetch_template(
        &self,
        subject_id: &str,
        template_id: &str,
    ) -> FeedforgeResult<serde_json::Value> {
        let row = sqlx::query(
            "SELECT template_json FROM user_templates WHERE subject_id = $1 AND id = $2",
        )
        .bind(subject_id)
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let row = row.ok_or_else(|| {
            FeedforgeError::data_fetch(format!(
                "template '{template_id}' not found for subject '{subject_id}'"
            ))
        })?;
        let template: serde_json::Value = row.try_get("template_json").map_err(db_err)?;
        if template.is_null() {
            return Err(FeedforgeError::data_fetch(format!(
                "template '{template_id}' has empty template_json"
            )));
        }
        Ok(template)
    }

    async fn fetch_fields(&self) -> FeedforgeResult<Vec<FieldMapping>> {
        let rows = sqlx::query("SELECT label_name, product_map FROM template_fields")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(FieldMapping {
                    label: row.try_get("label_name").map_err(db_err)?,
                    product_map: row.try_get("product_map").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn fetch_products(&self, subject_id: &str) -> FeedforgeResult<Vec<ProductRecord>> {
        // Product columns are user-defined; row_to_json keeps the store
        // schema-agnostic about them.
        let rows = sqlx::query(
            "SELECT row_to_json(p)::jsonb AS record FROM products p WHERE p.subject_id = $1",
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                let value: serde_json::Value = row.try_get("record").map_err(db_err)?;
                match value {
                    serde_json::Value::Object(map) => Ok(map),
                    other => Err(FeedforgeError::data_fetch(format!(
                        "product row decoded to non-object JSON: {other}"
                    ))),
                }
            })
            .collect()
    }
}

/// In-memory catalog for tests and offline runs.
#[derive(Default)]
pub struct MemoryCatalogStore {
    templates: Mutex<HashMap<(String, String), serde_json::Value>>,
    fields: Mutex<Vec<FieldMapping>>,
    products: Mutex<HashMap<String, Vec<ProductRecord>>>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_template(&self, subject_id: &str, template_id: &str, json: serde_json::Value) {
        self.templates
            .lock()
            .expect("catalog lock poisoned")
            .insert((subject_id.to_string(), template_id.to_string()), json);
    }

    pub fn insert_field(&self, label: &str, product_map: Option<&str>) {
        self.fields
            .lock()
            .expect("catalog lock poisoned")
            .push(FieldMapping {
                label: label.to_string(),
                product_map: product_map.map(str::to_string),
            });
    }

    pub fn insert_product(&self, subject_id: &str, record: ProductRecord) {
        self.products
            .lock()
            .expect("catalog lock poisoned")
            .entry(subject_id.to_string())
            .or_default()
            .push(record);
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn fetch_template(
        &self,
        subject_id: &str,
        template_id: &str,
    ) -> FeedforgeResult<serde_json::Value> {
        self.templates
            .lock()
            .expect("catalog lock poisoned")
            .get(&(subject_id.to_string(), template_id.to_string()))
            .cloned()
            .ok_or_else(|| {
                FeedforgeError::data_fetch(format!(
                    "template '{template_id}' not found for subject '{subject_id}'"
                ))
            })
    }

    async fn fetch_fields(&self) -> FeedforgeResult<Vec<FieldMapping>> {
        Ok(self.fields.lock().expect("catalog lock poisoned").clone())
    }

    async fn fetch_products(&self, subject_id: &str) -> FeedforgeResult<Vec<ProductRecord>> {
        Ok(self
            .products
            .lock()
            .expect("catalog lock poisoned")
            .get(subject_id)
            .cloned()
            .unwrap_or_default())
    }
}
