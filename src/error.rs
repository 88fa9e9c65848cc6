//! Error taxonomy shared by the store, inference client, renderers and wizard.
//!
//! Every variant is recovered at the API boundary (see `routes::http`), where it
//! becomes a status code plus a `{ "error", "message" }` JSON body.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WizardError {
    /// The inference server could not be reached (refused, DNS, timeout).
    #[error("Cannot connect to the model server at {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    /// The server answered but has no such model loaded.
    #[error("Model '{model}' is not available: {message}")]
    Model { model: String, message: String },

    /// Unexpected status or a body we could not parse.
    #[error("Malformed response from model server: {0}")]
    MalformedResponse(String),

    /// A required wizard field is empty.
    #[error("{0}")]
    Validation(String),

    /// Export content is incomplete or could not be encoded.
    #[error("Render error: {0}")]
    Render(String),

    /// File read/write or JSON encoding failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A generation pass is already running.
    #[error("A generation is already in progress")]
    Busy,

    #[error("Not found: {0}")]
    NotFound(String),

    /// Export or dashboard save requested before any successful generation.
    #[error("No generated materials yet; run generation first")]
    MissingResults,

    /// The form was edited, reset or replaced while a pass was running.
    #[error("The inputs changed during generation; generate again")]
    InputsChanged,
}

impl WizardError {
    /// Stable machine-readable tag used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            WizardError::Connection { .. } => "connection",
            WizardError::Model { .. } => "model",
            WizardError::MalformedResponse(_) => "malformed_response",
            WizardError::Validation(_) => "validation",
            WizardError::Render(_) => "render",
            WizardError::Storage(_) => "storage",
            WizardError::Busy => "busy",
            WizardError::NotFound(_) => "not_found",
            WizardError::MissingResults => "missing_results",
            WizardError::InputsChanged => "inputs_changed",
        }
    }
}

impl From<std::io::Error> for WizardError {
    fn from(e: std::io::Error) -> Self {
        WizardError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for WizardError {
    fn from(e: serde_json::Error) -> Self {
        WizardError::Storage(format!("JSON: {e}"))
    }
}

impl From<zip::result::ZipError> for WizardError {
    fn from(e: zip::result::ZipError) -> Self {
        WizardError::Render(format!("archive: {e}"))
    }
}

pub type WizardResult<T> = Result<T, WizardError>;
