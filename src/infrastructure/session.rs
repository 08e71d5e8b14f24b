//! Authenticated remote sessions
//!
//! A [`SessionWorker`] owns one logged-in cookie jar and its own request quota.
//! Exclusive use is expressed through `&mut self`: a session handed to a task
//! cannot be handed to a second one until it is given back to the pool.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use once_cell::sync::Lazy;
use reqwest::{
    Client, StatusCode,
    header::{HeaderMap, HeaderValue, USER_AGENT},
};
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::infrastructure::config::{RemoteConfig, SessionCredentials};

const LOGIN_PATH: &str = "login.php";
const MAINTENANCE_PAGE: &str = "maint.php";
const MAINTENANCE_MARKERS: [&str; 3] = ["nightly maintenance", "rollover", "down for maintenance"];

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("static selector"));

/// Errors raised by a remote session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid remote address: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid session settings: {0}")]
    InvalidSettings(String),

    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {path} returned HTTP {status}")]
    Status { path: String, status: StatusCode },

    #[error("login rejected for {username}")]
    LoginRejected { username: String },

    #[error("session {label} was logged out")]
    LoggedOut { label: String },
}

/// Legacy (pre-NS13) ascension history of a player
#[must_use]
pub fn legacy_history_path(player_id: i64) -> String {
    format!("ascensionhistory.php?back=other&who={player_id}&prens13=1")
}

/// Modern (post-NS13) ascension history of a player
#[must_use]
pub fn modern_history_path(player_id: i64) -> String {
    format!("ascensionhistory.php?back=other&who={player_id}")
}

/// Whether a response was served by the nightly blackout instead of the requested page.
///
/// Decided by the response shape only: a redirect to the maintenance page, or
/// a document whose `<title>` announces maintenance. Body text is never
/// searched, since player names appear there.
#[must_use]
pub fn is_maintenance_page(final_url: &Url, body: &str) -> bool {
    if final_url.path().ends_with(MAINTENANCE_PAGE) {
        return true;
    }
    let document = Html::parse_document(body);
    document.select(&TITLE).next().is_some_and(|title| {
        let title = title.text().collect::<String>().to_lowercase();
        MAINTENANCE_MARKERS.iter().any(|marker| title.contains(marker))
    })
}

/// One authenticated connection to the remote source
#[async_trait]
pub trait Session: Send {
    /// Name used in logs
    fn label(&self) -> &str;

    /// Authenticated GET of a page relative to the remote base URL
    async fn fetch_text(&mut self, path: &str) -> Result<String, SessionError>;

    /// Whether the most recent fetch landed inside the daily blackout window
    fn is_maintenance_window(&self) -> bool;

    /// Fetch that waits out the blackout window.
    ///
    /// Sleeps `retry_interval` and refetches for as long as the window lasts,
    /// with no backoff and no attempt limit. Transport errors are returned.
    async fn fetch_text_maintenance_safe(
        &mut self,
        path: &str,
        retry_interval: Duration,
    ) -> Result<String, SessionError> {
        loop {
            let text = self.fetch_text(path).await?;
            if !self.is_maintenance_window() {
                return Ok(text);
            }
            warn!(
                "🌙 {} hit the maintenance window fetching {}, retrying in {:?}",
                self.label(),
                path,
                retry_interval
            );
            tokio::time::sleep(retry_interval).await;
        }
    }
}

/// `reqwest` backed session with a cookie store and a per-session rate limit
pub struct SessionWorker {
    label: String,
    client: Client,
    base_url: Url,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    maintenance_retry: Duration,
    in_maintenance: bool,
}

impl SessionWorker {
    /// Unauthenticated session; use [`SessionWorker::login`] for a usable one
    pub fn new(remote: &RemoteConfig, label: impl Into<String>) -> Result<Self, SessionError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&remote.user_agent)
                .map_err(|e| SessionError::InvalidSettings(format!("user agent: {e}")))?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(remote.request_timeout_seconds))
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .build()
            .map_err(|source| SessionError::Transport {
                path: String::new(),
                source,
            })?;

        let quota = Quota::per_second(
            NonZeroU32::new(remote.max_requests_per_second)
                .ok_or_else(|| SessionError::InvalidSettings("rate limit must be greater than 0".to_string()))?,
        );

        Ok(Self {
            label: label.into(),
            client,
            base_url: Url::parse(&remote.base_url)?,
            rate_limiter: RateLimiter::direct(quota),
            maintenance_retry: remote.maintenance_retry_interval(),
            in_maintenance: false,
        })
    }

    /// Opens a session and logs in, waiting out the maintenance window if needed
    pub async fn login(remote: &RemoteConfig, credentials: &SessionCredentials) -> Result<Self, SessionError> {
        let mut worker = Self::new(remote, credentials.username.clone())?;
        let url = worker.base_url.join(LOGIN_PATH)?;
        let form = [
            ("loginname", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
            ("loggingin", "Yup."),
            ("secure", "0"),
            ("submitbutton", "Log In"),
        ];

        loop {
            worker.rate_limiter.until_ready().await;
            let response = worker
                .client
                .post(url.clone())
                .form(&form)
                .send()
                .await
                .map_err(|source| SessionError::Transport {
                    path: LOGIN_PATH.to_string(),
                    source,
                })?;
            let final_url = response.url().clone();
            let body = response.text().await.map_err(|source| SessionError::Transport {
                path: LOGIN_PATH.to_string(),
                source,
            })?;

            if is_maintenance_page(&final_url, &body) {
                warn!("🌙 Login for {} blocked by maintenance, retrying in {:?}", worker.label, worker.maintenance_retry);
                tokio::time::sleep(worker.maintenance_retry).await;
                continue;
            }
            if final_url.path().ends_with(LOGIN_PATH) {
                return Err(SessionError::LoginRejected {
                    username: credentials.username.clone(),
                });
            }

            info!("🔑 Session {} logged in", worker.label);
            return Ok(worker);
        }
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl Session for SessionWorker {
    fn label(&self) -> &str {
        &self.label
    }

    async fn fetch_text(&mut self, path: &str) -> Result<String, SessionError> {
        let url = self.base_url.join(path)?;
        self.rate_limiter.until_ready().await;

        debug!("{} fetching {}", self.label, url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| SessionError::Transport {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        let final_url = response.url().clone();
        let body = response.text().await.map_err(|source| SessionError::Transport {
            path: path.to_string(),
            source,
        })?;

        self.in_maintenance = is_maintenance_page(&final_url, &body);
        if self.in_maintenance {
            return Ok(body);
        }
        if !status.is_success() {
            return Err(SessionError::Status {
                path: path.to_string(),
                status,
            });
        }
        if final_url.path().ends_with(LOGIN_PATH) {
            return Err(SessionError::LoggedOut {
                label: self.label.clone(),
            });
        }

        debug!("{} fetched {} ({} bytes)", self.label, path, body.len());
        Ok(body)
    }

    fn is_maintenance_window(&self) -> bool {
        self.in_maintenance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays canned pages; `true` marks a maintenance response
    struct ScriptedSession {
        responses: VecDeque<(String, bool)>,
        in_maintenance: bool,
        fetches: usize,
    }

    #[async_trait]
    impl Session for ScriptedSession {
        fn label(&self) -> &str {
            "scripted"
        }

        async fn fetch_text(&mut self, _path: &str) -> Result<String, SessionError> {
            self.fetches += 1;
            let (body, maintenance) = self.responses.pop_front().unwrap_or_default();
            self.in_maintenance = maintenance;
            Ok(body)
        }

        fn is_maintenance_window(&self) -> bool {
            self.in_maintenance
        }
    }

    #[tokio::test(start_paused = true)]
    async fn maintenance_safe_fetch_waits_out_the_window() {
        let mut session = ScriptedSession {
            responses: VecDeque::from(vec![
                ("rollover".to_string(), true),
                ("rollover".to_string(), true),
                ("history".to_string(), false),
            ]),
            in_maintenance: false,
            fetches: 0,
        };

        let started = tokio::time::Instant::now();
        let text = session
            .fetch_text_maintenance_safe("ascensionhistory.php", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(text, "history");
        assert_eq!(session.fetches, 3);
        assert_eq!(started.elapsed(), Duration::from_secs(120));
    }

    #[test]
    fn maintenance_detected_from_redirect_or_title() {
        let maint = Url::parse("https://www.kingdomofloathing.com/maint.php").unwrap();
        assert!(is_maintenance_page(&maint, ""));

        let history = Url::parse("https://www.kingdomofloathing.com/ascensionhistory.php?who=1").unwrap();
        assert!(is_maintenance_page(
            &history,
            "<html><head><title>Nightly Maintenance</title></head><body>back soon</body></html>"
        ));
        assert!(is_maintenance_page(
            &history,
            "<html><head><title>The Kingdom of Loathing: Rollover</title></head></html>"
        ));
        assert!(!is_maintenance_page(&history, "<table><tr><td>1</td></tr></table>"));
    }

    #[test]
    fn player_names_never_look_like_maintenance() {
        let history = Url::parse("https://www.kingdomofloathing.com/ascensionhistory.php?who=123").unwrap();
        let page = "<html><head><title>Ascension History</title></head><body>\
                    <a href=\"showplayer.php?who=123\">RolloverRick</a> \
                    <a href=\"showplayer.php?who=9\">Down For Maintenance</a>\
                    <table><tr><td>1</td></tr></table></body></html>";
        assert!(!is_maintenance_page(&history, page));
    }

    #[test]
    fn history_paths() {
        assert_eq!(legacy_history_path(42), "ascensionhistory.php?back=other&who=42&prens13=1");
        assert_eq!(modern_history_path(42), "ascensionhistory.php?back=other&who=42");
    }

    #[test]
    fn zero_rate_limit_is_rejected() {
        let remote = RemoteConfig {
            max_requests_per_second: 0,
            ..RemoteConfig::default()
        };
        assert!(matches!(
            SessionWorker::new(&remote, "bot"),
            Err(SessionError::InvalidSettings(_))
        ));
    }

    #[test]
    fn relative_paths_join_base_url() {
        let worker = SessionWorker::new(&RemoteConfig::default(), "bot").unwrap();
        let joined = worker.base_url().join(&modern_history_path(7)).unwrap();
        assert_eq!(joined.path(), "/ascensionhistory.php");
        assert_eq!(joined.query(), Some("back=other&who=7"));
    }
}
