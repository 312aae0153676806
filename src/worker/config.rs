//! Worker configuration carried into constructors; no globals.

use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Postgres connection string for the job/catalog stores.
    pub database_url: String,
    /// Root of the object store holding rendered outputs.
    pub output_store_root: PathBuf,
    /// Root of the object store holding the durable font cache.
    pub font_store_root: PathBuf,
    /// Fallback font shipped with the deployment.
    pub bundled_font_path: Option<PathBuf>,
    /// Remote font provider endpoint; `None` disables the provider tier.
    pub font_provider_url: Option<String>,
    /// API credential for the remote font provider.
    pub font_provider_key: Option<String>,
}
