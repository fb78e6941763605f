//! Authenticated HTTP session against the webmail backend.
//!
//! Every component that talks to the backend borrows a [`SessionHandle`].
//! Only this module creates sessions, sets cookies or arms the CSRF token;
//! the archiving core treats the handle as an opaque capability.

pub mod auth;
pub mod cache;
pub mod http;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::error::TransportError;

pub use auth::{Acquired, CookiePair, CredentialInput, Credentials, Reuse, SessionProvider};
pub use cache::CookieCache;
pub use http::HttpSession;

/// Query string or form body as ordered key/value pairs.
pub type Params<'a> = [(&'a str, String)];

/// Capability to issue requests on behalf of the authenticated user.
///
/// Calls are strictly sequential; implementations never need to support
/// more than one request in flight.
#[async_trait]
pub trait SessionHandle: Send + Sync {
    /// GET `path` with `query` and return the body as text.
    async fn get_text(&self, path: &str, query: &Params<'_>) -> Result<String, TransportError>;

    /// GET `path` with `query` and stream the raw body into `sink`.
    ///
    /// Returns the number of bytes written.
    async fn download(
        &self,
        path: &str,
        query: &Params<'_>,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, TransportError>;

    /// POST `form` to `path` and return the body as text.
    async fn post_form(&self, path: &str, form: &Params<'_>) -> Result<String, TransportError>;

    /// Obtain the request-forgery token required by mutating calls.
    ///
    /// Must succeed before any move or delete request is issued.
    async fn arm_mutations(&self) -> Result<(), TransportError>;
}
