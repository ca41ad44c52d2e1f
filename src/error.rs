//! Error types for the harvester

use thiserror::Error;

/// Result type alias for harvester operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the viewer
///
/// Missing or malformed viewer state is never reported through this type:
/// the observers fold it into their reports and the session shows it as
/// "not ready". Only failures of the surface, the sink or the user's input
/// end up here.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to start the viewer backend
    #[error("Viewer initialization failed: {0}")]
    InitializationError(String),

    /// Failed to load the viewer page
    #[error("Failed to load viewer: {0}")]
    LoadError(String),

    /// Failed to execute a script in the viewer page
    #[error("Script execution failed: {0}")]
    ScriptError(String),

    /// A page element could not be encoded
    #[error("Export of {id} failed: {reason}")]
    ExportError { id: String, reason: String },

    /// Delay edit outside the accepted range (seconds)
    #[error("Delay of {0} seconds is outside the 2-20 second range")]
    DelayOutOfRange(f64),

    /// The page counter does not expose a page count
    #[error("Page counter does not report a page count")]
    MissingPageCount,

    /// A sweep was requested while the session is not ready
    #[error("Sweep not allowed: {0}")]
    NotReady(String),

    /// A download href that is not a base64 data URL
    #[error("Invalid data URL: {0}")]
    InvalidDataUrl(String),

    /// Filesystem error while saving a page
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// The session worker thread has exited
    #[error("Harvester worker is no longer running")]
    WorkerGone,

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Failure tied to one page element (gone, not rendered, unencodable)
    /// rather than to the viewer or the sink as a whole
    pub fn is_element_error(&self) -> bool {
        matches!(self, Error::ScriptError(_) | Error::ExportError { .. })
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}
