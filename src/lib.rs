//! Feedforge renders marketing images from JSON layout templates plus
//! per-product data, driven by a work queue, tracking every render job
//! through a persisted state machine.
//!
//! # Pipeline overview
//!
//! 1. **Process**: a queue message names a template and an outfeed; the
//!    template is expanded into one [`LayoutDocument`] per product and one
//!    `PROCESSED` job row plus one generate message per document.
//! 2. **Claim**: a generate message claims its job through an atomic
//!    conditional state transition, so duplicate delivery renders at most
//!    once.
//! 3. **Render**: the [`CompositionEngine`] front-loads all I/O (image
//!    fetches, font resolution) and then composes the document in
//!    painter's order on the CPU.
//! 4. **Publish**: the PNG lands in the object store and the job reaches a
//!    terminal state (`GENERATED` or `GENERATION_FAIL`).
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **No I/O in the compose loop**: external I/O is front-loaded during
//!   preparation, so composition is deterministic for a given input.
//! - **Fonts never fail**: [`FontResolver`] degrades through local cache,
//!   durable store, remote provider, bundled fallback, and system font.
//! - **Injectable backends**: every external collaborator (relational
//!   store, object store, queue, token validator, image source, font
//!   provider) sits behind a trait with an in-memory implementation.
#![forbid(unsafe_code)]

pub mod composition;
pub mod fonts;
pub mod foundation;
pub mod render;
pub mod store;
pub mod worker;

pub use composition::expand::{ExpandedDocument, FieldMapping, ProductRecord, expand};
pub use composition::model::{
    CustomProps, Element, FigureElement, FigureKind, Frame, ImageElement, LayoutDocument, Page,
    TextAlign, TextBackground, TextElement,
};
pub use fonts::cache::{FontCache, FontKey};
pub use fonts::provider::{
    FamilyListing, FontProvider, FontVariantRef, HttpFontProvider, NullFontProvider,
    StaticFontProvider,
};
pub use fonts::resolver::{FontOrigin, FontResolver, RenderableFont};
pub use foundation::color::{Rgba8, parse_color};
pub use foundation::error::{
    DiagnosticStage, FeedforgeError, FeedforgeResult, RenderDiagnostic,
};
pub use foundation::geometry::{CropBox, CropSpec, Placement};
pub use render::engine::{CompositionEngine, RenderedImage};
pub use render::fetch::{HttpImageFetcher, ImageFetcher, MemoryImageFetcher};
pub use store::catalog::{CatalogStore, MemoryCatalogStore, PgCatalogStore};
pub use store::jobs::{
    ClaimOutcome, Job, JobStatus, JobStore, MemoryJobStore, NewJob, OutfeedSummary, PgJobStore,
};
pub use store::object::{
    FsObjectStore, MemoryObjectStore, ObjectStore, output_object_key,
};
pub use worker::auth::{StaticTokenValidator, TokenValidator};
pub use worker::config::WorkerConfig;
pub use worker::dispatch::{DispatchOutcome, Dispatcher};
pub use worker::message::{
    GenerateRequest, MemoryQueueSink, ProcessRequest, QueueMessage, QueueSink,
};
