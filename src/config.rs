//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::window::Bounds;

/// API endpoint that answers every listing, download, move and delete request.
pub const API_PATH: &str = "/requests/webmail";
/// Endpoint accepting the login form.
pub const LOGIN_POST_PATH: &str = "/requests/guest";
/// Page carrying the CSRF marker for an anonymous visitor.
pub const LOGIN_PAGE_PATH: &str = "/login";
/// Page carrying the CSRF marker for an authenticated session.
pub const WEBMAIL_PAGE_PATH: &str = "/webmail/";
/// Folder that moved messages land in and that the purge phase empties.
pub const TRASH_FOLDER: &str = "Trash";

/// Backend location and transport policy.
#[derive(Debug, Clone)]
pub struct WebmailConfig {
    /// Scheme and host of the webmail backend, without a trailing slash.
    pub base_url: String,
    /// Retries on top of the first attempt for 5xx answers and connect failures.
    pub max_retries: u32,
    /// Base of the exponential backoff between retries.
    pub backoff_factor: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Status codes that are retried rather than surfaced.
    pub retry_statuses: Vec<u16>,
}

impl Default for WebmailConfig {
    fn default() -> Self {
        Self {
            base_url: "https://app.openmailbox.org".to_string(),
            max_retries: 10,
            backoff_factor: Duration::from_secs(1),
            request_timeout: Duration::from_secs(120),
            retry_statuses: vec![500, 502, 504],
        }
    }
}

impl WebmailConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let base_url = std::env::var("WEBMAIL_BASE_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);

        let max_retries: u32 = std::env::var("WEBMAIL_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_retries);

        let backoff_factor = std::env::var("WEBMAIL_BACKOFF_SECS")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(defaults.backoff_factor);

        Self {
            base_url,
            max_retries,
            backoff_factor,
            ..defaults
        }
    }
}

/// What to do when a message's artifact is already on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CollisionPolicy {
    /// Keep the existing artifact and do not download again.
    Skip,
    /// Download again under a `(n)`-suffixed name.
    Disambiguate,
    /// Like `Skip`, but an existing artifact while a destructive action is
    /// pending trips the safety interlock.
    Strict,
}

impl CollisionPolicy {
    /// Resolve the policy a run actually uses.
    ///
    /// With trash or delete pending, an existing artifact must never be taken
    /// as proof that the remote message is the archived one, so `Skip` is
    /// promoted to `Strict`.
    pub fn effective(requested: Option<Self>, destructive: bool) -> Self {
        match (requested, destructive) {
            (Some(Self::Disambiguate), _) => Self::Disambiguate,
            (Some(Self::Skip) | Some(Self::Strict) | None, true) => Self::Strict,
            (Some(policy), false) => policy,
            (None, false) => Self::Skip,
        }
    }
}

impl std::fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Skip => "skip",
            Self::Disambiguate => "disambiguate",
            Self::Strict => "strict",
        };
        write!(f, "{s}")
    }
}

/// Listing order requested from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SortOrder {
    /// Oldest first.
    #[default]
    DateAscending,
    /// Newest first. Never used under auto mode.
    DateDescending,
}

impl SortOrder {
    /// Value of the backend's `order` query parameter.
    pub fn order_param(self) -> &'static str {
        match self {
            Self::DateAscending => "0",
            Self::DateDescending => "1",
        }
    }
}

/// Listing fields echoed in progress notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShowFields {
    pub subject: bool,
    pub sender: bool,
    pub attachment: bool,
}

/// Options for one archiving run.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Folder to archive.
    pub folder: String,
    /// First window to fetch.
    pub bounds: Bounds,
    /// Keep fetching windows until the folder is exhausted.
    pub auto: bool,
    /// Move each archived message to Trash.
    pub trash: bool,
    /// Move each archived message to Trash, then purge Trash at the end.
    pub delete: bool,
    /// Abort (rather than disable destructive actions) on suspected uid reuse.
    pub stop_on_existing: bool,
    /// Explicitly requested collision policy, if any.
    pub collision: Option<CollisionPolicy>,
    /// Directory receiving one `.eml` file per message.
    pub output_dir: PathBuf,
    /// Listing fields to include in progress output.
    pub show: ShowFields,
    /// Listing order for single-window runs.
    pub sort: SortOrder,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            folder: "INBOX".to_string(),
            bounds: Bounds::default(),
            auto: false,
            trash: false,
            delete: false,
            stop_on_existing: true,
            collision: None,
            output_dir: PathBuf::from("emails_output_dir"),
            show: ShowFields::default(),
            sort: SortOrder::DateAscending,
        }
    }
}

impl ArchiveConfig {
    /// Whether any destructive remote action was requested.
    pub fn destructive(&self) -> bool {
        self.trash || self.delete
    }

    /// Collision policy in force at the start of the run.
    pub fn effective_collision(&self) -> CollisionPolicy {
        CollisionPolicy::effective(self.collision, self.destructive())
    }

    /// Listing order actually requested; auto mode needs a stable ascending cursor.
    pub fn effective_sort(&self) -> SortOrder {
        if self.auto {
            SortOrder::DateAscending
        } else {
            self.sort
        }
    }
}
