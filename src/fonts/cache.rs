//! Process-local ephemeral font cache.
//!
//! The cache is owned by the resolver instance that created it — there is
//! no process-wide singleton — and may be empty on a cold start. Payloads
//! are immutable once inserted; eviction only happens when the process
//! goes away.

use std::{collections::HashMap, sync::Arc, sync::Mutex};

/// Normalized `(family, variant)` font identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FontKey {
    family: String,
    variant: String,
}

impl FontKey {
    /// Normalize a raw family/variant pair. Families are lowercased with
    /// whitespace stripped; "normal" and the empty variant both map to
    /// "regular".
    pub fn new(family: &str, variant: &str) -> Self {
        let family = family
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let variant = match variant.trim().to_ascii_lowercase() {
            v if v.is_empty() || v == "normal" => "regular".to_string(),
            v => v,
        };
        Self { family, variant }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Durable-store key for this font payload.
    pub fn object_key(&self) -> String {
        format!("fonts/{}-{}.ttf", self.family, self.variant)
    }
}

impl std::fmt::Display for FontKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.family, self.variant)
    }
}

/// Ephemeral byte cache keyed by [`FontKey`].
#[derive(Default)]
pub struct FontCache {
    entries: Mutex<HashMap<FontKey, Arc<Vec<u8>>>>,
}

impl FontCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &FontKey) -> Option<Arc<Vec<u8>>> {
        self.entries
            .lock()
            .expect("font cache lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: FontKey, bytes: Arc<Vec<u8>>) {
        self.entries
            .lock()
            .expect("font cache lock poisoned")
            .insert(key, bytes);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("font cache lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
