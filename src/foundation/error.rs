/// Convenience result type used across feedforge.
pub type FeedforgeResult<T> = Result<T, FeedforgeError>;

/// Top-level error taxonomy used by engine and worker APIs.
///
/// Element-level render failures are deliberately NOT part of this enum:
/// they are collected as [`RenderDiagnostic`] values so one bad element
/// never aborts a whole composition.
#[derive(thiserror::Error, Debug)]
pub enum FeedforgeError {
    /// Structurally invalid layout document (missing fields, negative
    /// sizes, crop values out of range). Fatal for the whole render.
    #[error("validation error: {0}")]
    Validation(String),

    /// Access token rejected during the process phase.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Template, field-mapping, or product lookup failure.
    #[error("data fetch error: {0}")]
    DataFetch(String),

    /// Both the bundled fallback font and the system font source are
    /// unavailable. This is a deployment-integrity bug, never a runtime
    /// condition the resolver recovers from.
    #[error("font error: {0}")]
    Font(String),

    /// Output image upload failure after a successful render.
    #[error("publish error: {0}")]
    Publish(String),

    /// Relational or object storage access failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Failure emitting a follow-up queue message.
    #[error("queue error: {0}")]
    Queue(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FeedforgeError {
    /// Build a [`FeedforgeError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`FeedforgeError::Auth`] value.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Build a [`FeedforgeError::DataFetch`] value.
    pub fn data_fetch(msg: impl Into<String>) -> Self {
        Self::DataFetch(msg.into())
    }

    /// Build a [`FeedforgeError::Font`] value.
    pub fn font(msg: impl Into<String>) -> Self {
        Self::Font(msg.into())
    }

    /// Build a [`FeedforgeError::Publish`] value.
    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    /// Build a [`FeedforgeError::Storage`] value.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Build a [`FeedforgeError::Queue`] value.
    pub fn queue(msg: impl Into<String>) -> Self {
        Self::Queue(msg.into())
    }

    /// Build a [`FeedforgeError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

/// Stage of the render pipeline a recoverable element failure occurred in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticStage {
    /// Fetching or decoding an element's source bytes.
    Fetch,
    /// Crop/scale geometry resolution.
    Geometry,
    /// Drawing the element onto the canvas.
    Draw,
}

/// Recoverable, element-level render failure.
///
/// The compose loop records one of these, skips the element, and keeps
/// going; callers decide whether diagnostics fail the whole job.
#[derive(Clone, Debug)]
pub struct RenderDiagnostic {
    /// Element id from the document, when present.
    pub element_id: Option<String>,
    pub stage: DiagnosticStage,
    pub detail: String,
}

impl RenderDiagnostic {
    pub fn new(element_id: Option<String>, stage: DiagnosticStage, detail: impl Into<String>) -> Self {
        Self {
            element_id,
            stage,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for RenderDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.element_id {
            Some(id) => write!(f, "element '{}': {}", id, self.detail),
            None => write!(f, "element: {}", self.detail),
        }
    }
}
