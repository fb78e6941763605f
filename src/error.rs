//! Error types for the webmail archiver.

use std::path::PathBuf;

/// Top-level error type for an archiving run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Remote state error: {0}")]
    RemoteState(#[from] RemoteStateError),

    #[error("Safety interlock: {0}")]
    Safety(#[from] SafetyError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Archive store error: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    /// Process exit status for this failure class.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Input(_) => 2,
            Self::Auth(_) => 3,
            Self::Safety(_) => 4,
            Self::RemoteState(_) => 5,
            Self::Transport(_) => 6,
            Self::Store(_) => 7,
        }
    }
}

/// Bad operator input, detected before any mutating call.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Invalid bounds {lower}-{upper}: the lower bound must be at least 1 and not above the upper bound")]
    InvalidBounds { lower: u32, upper: u32 },

    #[error("Window {lower}-{upper} is too wide: the bounds may differ by at most {max}")]
    WindowTooWide { lower: u32, upper: u32, max: u32 },

    #[error("No such folder: {folder}")]
    NoSuchFolder {
        folder: String,
        available: Vec<String>,
    },

    #[error("Missing {0}, unable to continue")]
    MissingCredential(&'static str),
}

/// Session acquisition failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Login rejected: {exception}: {info}")]
    Rejected { exception: String, info: String },

    #[error("Login failed with status {status}: {body}")]
    Unexpected { status: u16, body: String },

    #[error("Login succeeded but the backend did not issue a {0} cookie")]
    MissingCookie(&'static str),

    #[error("Session was rejected by the backend: {0}")]
    SessionRejected(String),

    #[error("No usable session cookies and no credentials to log in with")]
    NoCredentials,
}

/// A mutating call whose response lacked the success indicator.
///
/// Local and remote state may now disagree, so these always abort the run.
#[derive(Debug, thiserror::Error)]
pub enum RemoteStateError {
    #[error("Moving message {uid} from {folder} to Trash was not acknowledged: {response}")]
    MoveFailed {
        folder: String,
        uid: u64,
        response: String,
    },

    #[error("Deleting message {uid} from Trash was not acknowledged after {already_deleted} deletions: {response}")]
    DeleteFailed {
        uid: u64,
        already_deleted: usize,
        response: String,
    },
}

/// Destructive actions refused because the local archive suggests uid reuse.
#[derive(Debug, thiserror::Error)]
pub enum SafetyError {
    #[error(
        "Message {uid} in {folder} is already archived at {}; refusing to trash or delete in case the uid was reused",
        path.display()
    )]
    SuspectedUidReuse {
        folder: String,
        uid: u64,
        path: PathBuf,
    },
}

/// HTTP-level failures, surfaced after the bounded retry is exhausted.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Giving up on {url} after {attempts} attempts: {reason}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("Unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No CSRF token marker found on {0}")]
    MissingCsrfToken(String),

    #[error("Invalid base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("IO error while streaming a response: {0}")]
    Io(#[from] std::io::Error),
}

/// Local archive directory failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for the archiver.
pub type Result<T> = std::result::Result<T, Error>;
