//! reqwest-backed session with a cookie jar and bounded retry.

use std::sync::{Arc, LazyLock, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::{CookiePair, Params, SessionHandle};
use crate::config::{WEBMAIL_PAGE_PATH, WebmailConfig};
use crate::error::TransportError;

/// Header carrying the request-forgery token.
const CSRF_HEADER: &str = "X-CSRFToken";

/// Longest pause between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(120);

static CSRF_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta name="csrf-token" content="(.+?)">"#).expect("CSRF marker pattern is valid")
});

/// Pull the CSRF token out of an HTML page.
pub fn extract_csrf_token(page: &str) -> Option<&str> {
    CSRF_MARKER
        .captures(page)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Pause before retry number `retry` (1-based).
pub(crate) fn backoff_delay(factor: Duration, retry: u32) -> Duration {
    let exp = retry.saturating_sub(1).min(16);
    factor.saturating_mul(1_u32 << exp).min(MAX_BACKOFF)
}

/// Which failures allow a request to be sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    /// Reads: any transient failure.
    Always,
    /// Writes: only failures where the request never reached the backend.
    UnsentOnly,
}

/// HTTP session bound to one webmail backend.
pub struct HttpSession {
    client: reqwest::Client,
    jar: Arc<Jar>,
    base: Url,
    config: WebmailConfig,
    csrf_token: RwLock<Option<SecretString>>,
}

impl HttpSession {
    /// Create an anonymous session.
    pub fn new(config: WebmailConfig) -> Result<Self, TransportError> {
        let base = Url::parse(&config.base_url).map_err(|e| TransportError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;

        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Request {
                url: config.base_url.clone(),
                source: e,
            })?;

        Ok(Self {
            client,
            jar,
            base,
            config,
            csrf_token: RwLock::new(None),
        })
    }

    /// Create a session that presents previously issued cookies.
    pub fn with_cookies(config: WebmailConfig, cookies: &CookiePair) -> Result<Self, TransportError> {
        let session = Self::new(config)?;
        session.jar.add_cookie_str(
            &format!("csrftoken={}; Path=/", cookies.csrftoken),
            &session.base,
        );
        session.jar.add_cookie_str(
            &format!("sessionid={}; Path=/", cookies.sessionid),
            &session.base,
        );
        Ok(session)
    }

    /// Cookies currently held for the backend, if both identity cookies are set.
    pub fn cookie_pair(&self) -> Option<CookiePair> {
        let header = self.jar.cookies(&self.base)?;
        let header = header.to_str().ok()?;

        let mut csrftoken = None;
        let mut sessionid = None;
        for part in header.split(';') {
            match part.trim().split_once('=') {
                Some(("csrftoken", value)) => csrftoken = Some(value.to_string()),
                Some(("sessionid", value)) => sessionid = Some(value.to_string()),
                _ => {}
            }
        }

        Some(CookiePair {
            csrftoken: csrftoken?,
            sessionid: sessionid?,
        })
    }

    /// Scrape the CSRF marker from `path` and attach it to later requests.
    pub async fn arm_from(&self, path: &str) -> Result<(), TransportError> {
        let page = self.get_text(path, &[]).await?;
        let token = extract_csrf_token(&page)
            .ok_or_else(|| TransportError::MissingCsrfToken(path.to_string()))?;
        debug!(path, "Armed CSRF token");

        let mut guard = self
            .csrf_token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(SecretString::from(token.to_string()));
        Ok(())
    }

    /// POST a form and hand back status and body without judging the status.
    pub async fn post_form_with_status(
        &self,
        path: &str,
        form: &Params<'_>,
    ) -> Result<(StatusCode, String), TransportError> {
        let url = self.url(path)?;
        let resp = self
            .send(url.as_str(), Replay::UnsentOnly, || {
                self.client.post(url.clone()).form(form)
            })
            .await?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| TransportError::Request {
            url: url.to_string(),
            source: e,
        })?;
        Ok((status, body))
    }

    fn url(&self, path: &str) -> Result<Url, TransportError> {
        self.base.join(path).map_err(|e| TransportError::InvalidBaseUrl {
            url: format!("{}{path}", self.base),
            reason: e.to_string(),
        })
    }

    fn with_csrf(&self, builder: RequestBuilder) -> RequestBuilder {
        let guard = self
            .csrf_token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.as_ref() {
            Some(token) => builder.header(CSRF_HEADER, token.expose_secret()),
            None => builder,
        }
    }

    /// Send a request, retrying transient failures with backoff.
    ///
    /// Connect failures are always retried. Retry statuses and timeouts are
    /// only retried under [`Replay::Always`]; a mutation may already have been
    /// applied when they occur.
    async fn send<F>(&self, url: &str, replay: Replay, build: F) -> Result<Response, TransportError>
    where
        F: Fn() -> RequestBuilder,
    {
        let replay_after_delivery = replay == Replay::Always;
        let mut retry = 0_u32;
        loop {
            debug!(url, attempt = retry + 1, "HTTP request");
            let reason = match self.with_csrf(build()).send().await {
                Ok(resp)
                    if replay_after_delivery
                        && self.config.retry_statuses.contains(&resp.status().as_u16()) =>
                {
                    format!("status {}", resp.status())
                }
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_connect() || (replay_after_delivery && e.is_timeout()) => {
                    e.to_string()
                }
                Err(e) => {
                    return Err(TransportError::Request {
                        url: url.to_string(),
                        source: e,
                    });
                }
            };

            retry += 1;
            if retry > self.config.max_retries {
                return Err(TransportError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: retry,
                    reason,
                });
            }
            let wait = backoff_delay(self.config.backoff_factor, retry);
            warn!(url, retry, ?wait, %reason, "Retrying request");
            tokio::time::sleep(wait).await;
        }
    }

    async fn get_checked(&self, path: &str, query: &Params<'_>) -> Result<Response, TransportError> {
        let url = self.url(path)?;
        let resp = self
            .send(url.as_str(), Replay::Always, || {
                self.client.get(url.clone()).query(query)
            })
            .await?;
        if !resp.status().is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl SessionHandle for HttpSession {
    async fn get_text(&self, path: &str, query: &Params<'_>) -> Result<String, TransportError> {
        let resp = self.get_checked(path, query).await?;
        let url = resp.url().to_string();
        resp.text()
            .await
            .map_err(|e| TransportError::Request { url, source: e })
    }

    async fn download(
        &self,
        path: &str,
        query: &Params<'_>,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, TransportError> {
        let resp = self.get_checked(path, query).await?;
        let url = resp.url().to_string();

        let mut written = 0_u64;
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| TransportError::Request {
                url: url.clone(),
                source: e,
            })?;
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;
        Ok(written)
    }

    async fn post_form(&self, path: &str, form: &Params<'_>) -> Result<String, TransportError> {
        let (status, body) = self.post_form_with_status(path, form).await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                url: path.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(body)
    }

    async fn arm_mutations(&self) -> Result<(), TransportError> {
        self.arm_from(WEBMAIL_PAGE_PATH).await
    }
}
