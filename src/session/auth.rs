//! Session acquisition: reuse cached cookies or log in with credentials.

use std::sync::Arc;

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{CookieCache, HttpSession, SessionHandle};
use crate::config::{LOGIN_PAGE_PATH, LOGIN_POST_PATH, WebmailConfig};
use crate::error::{AuthError, InputError, Result};
use crate::webmail::types::LoginFailure;
use crate::webmail::{CountsReply, MailboxCounts, WebmailApi};

/// The two cookies that carry a webmail session's identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookiePair {
    pub csrftoken: String,
    pub sessionid: String,
}

impl CookiePair {
    /// Same two values, in either order.
    pub fn same_values(&self, other: &CookiePair) -> bool {
        (self.csrftoken == other.csrftoken && self.sessionid == other.sessionid)
            || (self.csrftoken == other.sessionid && self.sessionid == other.csrftoken)
    }
}

impl std::fmt::Debug for CookiePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookiePair")
            .field("csrftoken", &"[REDACTED]")
            .field("sessionid", &"[REDACTED]")
            .finish()
    }
}

/// Login credentials for the webmail account.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub name: String,
    pub domain: String,
    pub password: SecretString,
}

/// Credential parts as the operator supplied them; any may be missing.
#[derive(Debug, Clone, Default)]
pub struct CredentialInput {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub password: Option<SecretString>,
}

impl CredentialInput {
    /// No credential part was given at all.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.domain.is_none() && self.password.is_none()
    }

    /// Complete the credentials, splitting `user@domain` names when no domain
    /// was given.
    pub fn resolve(self) -> std::result::Result<Credentials, InputError> {
        let (name, domain) = match (self.name, self.domain) {
            (Some(name), None) => match name.split_once('@') {
                Some((user, domain)) => (Some(user.to_string()), Some(domain.to_string())),
                None => {
                    return Err(InputError::MissingCredential(
                        "domain (and the name has no @domain part)",
                    ));
                }
            },
            other => other,
        };

        match (name, domain, self.password) {
            (Some(name), Some(domain), Some(password)) => Ok(Credentials {
                name,
                domain,
                password,
            }),
            (None, None, None) => Err(InputError::MissingCredential("account")),
            (_, None, _) => Err(InputError::MissingCredential("domain")),
            (None, _, _) => Err(InputError::MissingCredential("name")),
            (_, _, None) => Err(InputError::MissingCredential("password")),
        }
    }
}

/// Outcome of presenting existing cookies to the backend.
pub enum Reuse {
    Reused {
        session: Arc<HttpSession>,
        counts: MailboxCounts,
    },
    Expired,
}

/// An authenticated session ready for the archiving core.
pub struct Acquired {
    pub session: Arc<HttpSession>,
    pub counts: MailboxCounts,
    /// Whether a fresh login was needed.
    pub logged_in: bool,
}

/// Creates authenticated sessions. The only place session identity is set.
pub struct SessionProvider {
    config: WebmailConfig,
    cache: CookieCache,
}

impl SessionProvider {
    pub fn new(config: WebmailConfig, cache: CookieCache) -> Self {
        Self { config, cache }
    }

    /// Present `cookies` and check whether the backend still honours them.
    pub async fn try_reuse(&self, cookies: &CookiePair) -> Result<Reuse> {
        let session = Arc::new(HttpSession::with_cookies(self.config.clone(), cookies)?);
        match fetch_counts(&session).await? {
            CountsReply::Counts(counts) => Ok(Reuse::Reused { session, counts }),
            CountsReply::Failure { error_info } => {
                info!(%error_info, "Session cookies were not accepted");
                Ok(Reuse::Expired)
            }
        }
    }

    /// Log in with name and password.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<HttpSession> {
        let session = HttpSession::new(self.config.clone())?;
        session.arm_from(LOGIN_PAGE_PATH).await?;

        let form = [
            ("domain", credentials.domain.clone()),
            ("name", credentials.name.clone()),
            ("password", credentials.password.expose_secret().to_string()),
            ("action", "login".to_string()),
        ];
        let (status, body) = session.post_form_with_status(LOGIN_POST_PATH, &form).await?;

        match status {
            StatusCode::OK => Ok(session),
            StatusCode::BAD_REQUEST => {
                let failure: LoginFailure =
                    serde_json::from_str(&body).map_err(|_| AuthError::Unexpected {
                        status: status.as_u16(),
                        body: body.clone(),
                    })?;
                Err(AuthError::Rejected {
                    exception: plain(&failure.exception),
                    info: plain(&failure.error_info),
                }
                .into())
            }
            other => Err(AuthError::Unexpected {
                status: other.as_u16(),
                body,
            }
            .into()),
        }
    }

    /// Reuse `supplied` cookies (or the refreshed pair cached for them),
    /// falling back to a login with `credentials`. A fresh login updates the
    /// cookie cache.
    ///
    /// Partially given credentials are rejected before any request is made.
    /// Having nothing to log in with once reuse fails is an [`AuthError`].
    pub async fn acquire(
        &self,
        supplied: Option<CookiePair>,
        credentials: CredentialInput,
    ) -> Result<Acquired> {
        let credentials = if credentials.is_empty() {
            None
        } else {
            Some(credentials.resolve()?)
        };

        let presented = match self.cache.substitute(supplied.as_ref()).await {
            Some(refreshed) => Some(refreshed),
            None => supplied.clone(),
        };

        if let Some(cookies) = presented {
            match self.try_reuse(&cookies).await? {
                Reuse::Reused { session, counts } => {
                    return Ok(Acquired {
                        session,
                        counts,
                        logged_in: false,
                    });
                }
                Reuse::Expired => warn!("Session cookies have expired"),
            }
        }

        let credentials = credentials.ok_or(AuthError::NoCredentials)?;
        info!(name = %credentials.name, domain = %credentials.domain, "Logging in using name and password");
        let session = Arc::new(self.authenticate(&credentials).await?);

        let issued = session
            .cookie_pair()
            .ok_or(AuthError::MissingCookie("csrftoken/sessionid"))?;
        if let Err(e) = self.cache.store(issued, supplied).await {
            warn!("Could not update cookie cache: {e}");
        }

        match fetch_counts(&session).await? {
            CountsReply::Counts(counts) => Ok(Acquired {
                session,
                counts,
                logged_in: true,
            }),
            CountsReply::Failure { error_info } => {
                Err(AuthError::SessionRejected(plain(&error_info)).into())
            }
        }
    }
}

async fn fetch_counts(session: &Arc<HttpSession>) -> Result<CountsReply> {
    let handle: Arc<dyn SessionHandle> = Arc::clone(session) as Arc<dyn SessionHandle>;
    Ok(WebmailApi::new(handle).counts().await?)
}

/// Render a JSON value without quotes around plain strings.
fn plain(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
