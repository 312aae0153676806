//! Remote font provider seam.
//!
//! The provider is queried by family and answers with the variants it
//! hosts and where to download them. Only an exact variant match is ever
//! used downstream; the provider does not participate in fuzzy matching.

use std::collections::HashMap;

use anyhow::Context as _;
use async_trait::async_trait;
use tracing::debug;

use crate::foundation::error::{FeedforgeError, FeedforgeResult};

/// One downloadable variant of a family.
#[derive(Clone, Debug)]
pub struct FontVariantRef {
    /// Normalized variant token, e.g. "regular", "700italic".
    pub variant: String,
    pub url: String,
}

/// Provider listing for one family.
#[derive(Clone, Debug)]
pub struct FamilyListing {
    pub family: String,
    pub variants: Vec<FontVariantRef>,
}

impl FamilyListing {
    pub fn variant_url(&self, variant: &str) -> Option<&str> {
        self.variants
            .iter()
            .find(|v| v.variant == variant)
            .map(|v| v.url.as_str())
    }
}

#[async_trait]
pub trait FontProvider: Send + Sync {
    /// Look a family up; `Ok(None)` when the provider does not host it.
    async fn lookup(&self, family: &str) -> FeedforgeResult<Option<FamilyListing>>;

    /// Download a variant payload from a URL returned by `lookup`.
    async fn fetch(&self, url: &str) -> FeedforgeResult<Vec<u8>>;
}

/// Webfonts-API-shaped HTTP provider, keyed by an API credential.
pub struct HttpFontProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(serde::Deserialize)]
struct WebfontsResponse {
    #[serde(default)]
    items: Vec<WebfontsItem>,
}

#[derive(serde::Deserialize)]
struct WebfontsItem {
    family: String,
    #[serde(default)]
    files: HashMap<String, String>,
}

impl HttpFontProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl FontProvider for HttpFontProvider {
    async fn lookup(&self, family: &str) -> FeedforgeResult<Option<FamilyListing>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("key", self.api_key.as_str()), ("family", family)])
            .send()
            .await
            .with_context(|| format!("query font provider for family '{family}'"))?;

        if !response.status().is_success() {
            return Err(FeedforgeError::storage(format!(
                "font provider returned {} for family '{family}'",
                response.status()
            )));
        }

        let body: WebfontsResponse = response
            .json()
            .await
            .with_context(|| "decode font provider response")?;

        // Provider family matching is case-insensitive; variants come back
        // already tokenized in the `files` map.
        let wanted = family.to_ascii_lowercase();
        let Some(item) = body
            .items
            .into_iter()
            .find(|i| i.family.to_ascii_lowercase() == wanted)
        else {
            debug!(family, "font provider does not host family");
            return Ok(None);
        };

        let variants = item
            .files
            .into_iter()
            .map(|(variant, url)| FontVariantRef {
                variant: variant.to_ascii_lowercase(),
                url,
            })
            .collect();
        Ok(Some(FamilyListing {
            family: item.family,
            variants,
        }))
    }

    async fn fetch(&self, url: &str) -> FeedforgeResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("download font payload from '{url}'"))?;
        if !response.status().is_success() {
            return Err(FeedforgeError::storage(format!(
                "font download returned {} for '{url}'",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .with_context(|| "read font payload body")?;
        Ok(bytes.to_vec())
    }
}

/// In-memory provider fake for tests and offline rendering.
#[derive(Default)]
pub struct StaticFontProvider {
    families: HashMap<String, FamilyListing>,
    payloads: HashMap<String, Vec<u8>>,
}

impl StaticFontProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variant payload under a synthetic URL.
    pub fn with_variant(mut self, family: &str, variant: &str, bytes: Vec<u8>) -> Self {
        let family_lower = family.to_ascii_lowercase();
        let url = format!("static://{family_lower}/{variant}");
        self.families
            .entry(family_lower.clone())
            .or_insert_with(|| FamilyListing {
                family: family.to_string(),
                variants: Vec::new(),
            })
            .variants
            .push(FontVariantRef {
                variant: variant.to_ascii_lowercase(),
                url: url.clone(),
            });
        self.payloads.insert(url, bytes);
        self
    }
}

#[async_trait]
impl FontProvider for StaticFontProvider {
    async fn lookup(&self, family: &str) -> FeedforgeResult<Option<FamilyListing>> {
        Ok(self.families.get(&family.to_ascii_lowercase()).cloned())
    }

    async fn fetch(&self, url: &str) -> FeedforgeResult<Vec<u8>> {
        self.payloads
            .get(url)
            .cloned()
            .ok_or_else(|| FeedforgeError::storage(format!("unknown font payload url '{url}'")))
    }
}

/// Provider that hosts nothing; used when no credential is configured.
pub struct NullFontProvider;

#[async_trait]
impl FontProvider for NullFontProvider {
    async fn lookup(&self, _family: &str) -> FeedforgeResult<Option<FamilyListing>> {
        Ok(None)
    }

    async fn fetch(&self, url: &str) -> FeedforgeResult<Vec<u8>> {
        Err(FeedforgeError::storage(format!(
            "null font provider cannot fetch '{url}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_lists_and_fetches() {
        let provider = StaticFontProvider::new()
            .with_variant("Raleway", "regular", vec![1])
            .with_variant("Raleway", "700", vec![2]);

        let listing = provider.lookup("raleway").await.unwrap().unwrap();
        assert_eq!(listing.variants.len(), 2);
        let url = listing.variant_url("700").unwrap().to_string();
        assert_eq!(provider.fetch(&url).await.unwrap(), vec![2]);
        assert!(listing.variant_url("900").is_none());

        assert!(provider.lookup("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn null_provider_hosts_nothing() {
        assert!(NullFontProvider.lookup("anything").await.unwrap().is_none());
        assert!(NullFontProvider.fetch("static://x").await.is_err());
    }
}
