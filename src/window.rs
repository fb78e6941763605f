//! Bounded-range pages over a folder's message list.
//!
//! The backend refuses ranges whose bounds differ by more than
//! [`MAX_WINDOW_SPAN`]. [`Bounds`] can only be built through a checked
//! constructor, so an over-wide window is rejected before any request is made.

use tracing::debug;

use crate::config::SortOrder;
use crate::error::{InputError, TransportError};
use crate::webmail::{MessageMeta, WebmailApi};

/// Largest allowed `upper - lower`.
pub const MAX_WINDOW_SPAN: u32 = 500;

/// Inclusive, 1-based index range into a folder's listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    lower: u32,
    upper: u32,
}

impl Bounds {
    /// Check `1 <= lower <= upper` and `upper - lower <= MAX_WINDOW_SPAN`.
    pub fn new(lower: u32, upper: u32) -> Result<Self, InputError> {
        if lower == 0 || lower > upper {
            return Err(InputError::InvalidBounds { lower, upper });
        }
        if upper - lower > MAX_WINDOW_SPAN {
            return Err(InputError::WindowTooWide {
                lower,
                upper,
                max: MAX_WINDOW_SPAN,
            });
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> u32 {
        self.lower
    }

    pub fn upper(&self) -> u32 {
        self.upper
    }

    /// Number of listing positions covered.
    pub fn width(&self) -> u32 {
        self.upper - self.lower + 1
    }

    /// Same width, starting `by` positions further on.
    pub fn advanced_by(&self, by: u32) -> Self {
        let lower = self.lower.saturating_add(by);
        Self {
            lower,
            upper: lower.saturating_add(self.upper - self.lower),
        }
    }

    /// Value of the backend's `range` query parameter.
    pub fn range_param(&self) -> String {
        format!("{}-{}", self.lower, self.upper)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            lower: 1,
            upper: MAX_WINDOW_SPAN,
        }
    }
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.lower, self.upper)
    }
}

/// One fetched page of a folder's listing.
#[derive(Debug, Clone)]
pub struct RangeWindow {
    pub folder: String,
    pub bounds: Bounds,
    /// Messages in the order the backend listed them.
    pub messages: Vec<MessageMeta>,
    /// Folder total reported with this page. A stopping hint, not a guarantee.
    pub total: Option<u64>,
}

impl RangeWindow {
    /// Fetch the page covered by `bounds`.
    pub async fn fetch(
        api: &WebmailApi,
        folder: &str,
        bounds: Bounds,
        sort: SortOrder,
    ) -> Result<Self, TransportError> {
        let listing = api.message_list(folder, bounds, sort).await?;
        debug!(
            folder,
            range = %bounds,
            count = listing.partial_list.len(),
            total = ?listing.total,
            "Fetched window"
        );
        Ok(Self {
            folder: folder.to_string(),
            bounds,
            messages: listing.partial_list,
            total: listing.total,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
