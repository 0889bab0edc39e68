//! Live channel telemetry and the app token it needs.
//!
//! `TelemetrySource` answers "which of these logins are live right now"; channels
//! that are offline are simply absent. `HelixTelemetry` implements it against the
//! Twitch Helix API with an app access token from `ClientCredentials`.
//! Failures are returned as-is; there is no retry here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::{normalize_login, TwitchCredentials};
use crate::cooldown::parse_timestamp;
use crate::error::{Result, ScoutError};

pub const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
pub const HELIX_BASE_URL: &str = "https://api.twitch.tv/helix";

/// Helix accepts at most 100 `user_login`/`login` parameters per request.
const HELIX_BATCH: usize = 100;
/// Refresh the app token this long before Twitch says it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// One live stream on the watch-list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveChannelStatus {
    pub login: String,
    pub display_name: String,
    pub title: String,
    pub game: String,
    pub viewer_count: u64,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// A bearer token valid for Helix calls.
    async fn bearer_token(&self) -> Result<String>;
    /// Drop any cached token (e.g. after a 401).
    fn invalidate(&self) {}
}

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch_live(&self, logins: &[String]) -> Result<Vec<LiveChannelStatus>>;
    fn name(&self) -> &'static str;
}

fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("raid-scout/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(15))
        .build()
}

// ------------------------------------------------------------
// App access token (client credentials grant)
// ------------------------------------------------------------

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

pub struct ClientCredentials {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<CachedToken>>,
}

impl ClientCredentials {
    pub fn new(creds: &TwitchCredentials) -> Result<Self> {
        Self::with_token_url(creds, TOKEN_URL)
    }

    pub fn with_token_url(creds: &TwitchCredentials, token_url: impl Into<String>) -> Result<Self> {
        let http = http_client().map_err(|e| ScoutError::Auth(e.to_string()))?;
        Ok(Self {
            http,
            token_url: token_url.into(),
            client_id: creds.client_id.clone(),
            client_secret: creds.client_secret.clone(),
            cached: Mutex::new(None),
        })
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.cached.lock().ok()?;
        guard
            .as_ref()
            .filter(|c| Instant::now() < c.expires_at)
            .map(|c| c.token.clone())
    }
}

#[async_trait]
impl CredentialProvider for ClientCredentials {
    async fn bearer_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        #[derive(Deserialize)]
        struct TokenResp {
            access_token: String,
            #[serde(default)]
            expires_in: u64,
        }

        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| ScoutError::Auth(format!("token endpoint unreachable: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ScoutError::Auth(format!(
                "token endpoint returned {status}"
            )));
        }
        let body: TokenResp = resp
            .json()
            .await
            .map_err(|e| ScoutError::Auth(format!("token response: {e}")))?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        if let Ok(mut g) = self.cached.lock() {
            *g = Some(CachedToken {
                token: body.access_token.clone(),
                expires_at: Instant::now() + lifetime,
            });
        }
        debug!(target: "telemetry", expires_in = body.expires_in, "fetched app access token");
        Ok(body.access_token)
    }

    fn invalidate(&self) {
        if let Ok(mut g) = self.cached.lock() {
            *g = None;
        }
    }
}

/// Fixed token, for tests and pre-issued tokens.
pub struct StaticToken(pub String);

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn bearer_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

// ------------------------------------------------------------
// Helix streams + users
// ------------------------------------------------------------

pub struct HelixTelemetry {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    credentials: Arc<dyn CredentialProvider>,
}

#[derive(Deserialize)]
struct HelixPage<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct HelixStream {
    #[serde(default)]
    user_login: String,
    #[serde(default)]
    user_name: String,
    #[serde(default)]
    game_name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    viewer_count: u64,
    #[serde(default)]
    started_at: String,
}

#[derive(Deserialize)]
struct HelixUser {
    login: String,
    #[serde(default)]
    profile_image_url: String,
}

impl HelixTelemetry {
    pub fn new(client_id: impl Into<String>, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let http = http_client().map_err(|e| ScoutError::Telemetry(e.to_string()))?;
        Ok(Self {
            http,
            base_url: HELIX_BASE_URL.to_string(),
            client_id: client_id.into(),
            credentials,
        })
    }

    /// Helix client with a `ClientCredentials` token provider.
    pub fn from_credentials(creds: &TwitchCredentials) -> Result<Self> {
        let provider = Arc::new(ClientCredentials::new(creds)?);
        Self::new(creds.client_id.clone(), provider)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get_page<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
        values: &[String],
        token: &str,
    ) -> Result<Vec<T>> {
        let mut query: Vec<(&str, &str)> = values.iter().map(|v| (key, v.as_str())).collect();
        // `users` has no paging parameter.
        if path == "streams" {
            query.push(("first", "100"));
        }

        let resp = self
            .http
            .get(format!("{}/{}", self.base_url, path))
            .header("Client-Id", &self.client_id)
            .bearer_auth(token)
            .query(&query)
            .send()
            .await
            .map_err(|e| ScoutError::Telemetry(format!("GET {path}: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.credentials.invalidate();
            return Err(ScoutError::Auth(format!("helix rejected token on {path}")));
        }
        if !status.is_success() {
            return Err(ScoutError::Telemetry(format!("GET {path} returned {status}")));
        }
        let page: HelixPage<T> = resp
            .json()
            .await
            .map_err(|e| ScoutError::Telemetry(format!("GET {path}: malformed response: {e}")))?;
        Ok(page.data)
    }
}

#[async_trait]
impl TelemetrySource for HelixTelemetry {
    async fn fetch_live(&self, logins: &[String]) -> Result<Vec<LiveChannelStatus>> {
        let wanted: Vec<String> = logins
            .iter()
            .map(|l| normalize_login(l))
            .filter(|l| !l.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let token = self.credentials.bearer_token().await?;

        let mut live = Vec::new();
        for batch in wanted.chunks(HELIX_BATCH) {
            let streams: Vec<HelixStream> =
                self.get_page("streams", "user_login", batch, &token).await?;
            for s in streams {
                let login = normalize_login(&s.user_login);
                let Some(started_at) = parse_timestamp(&s.started_at) else {
                    warn!(target: "telemetry", %login, started_at = %s.started_at, "stream without a usable start time; skipped");
                    continue;
                };
                live.push(LiveChannelStatus {
                    display_name: if s.user_name.is_empty() {
                        login.clone()
                    } else {
                        s.user_name
                    },
                    login,
                    title: s.title.replace('\n', " "),
                    game: s.game_name,
                    viewer_count: s.viewer_count,
                    started_at,
                    avatar_url: None,
                });
            }
        }

        if live.is_empty() {
            return Ok(live);
        }

        let live_logins: Vec<String> = live.iter().map(|s| s.login.clone()).collect();
        let mut avatars = BTreeMap::new();
        for batch in live_logins.chunks(HELIX_BATCH) {
            let users: Vec<HelixUser> = self.get_page("users", "login", batch, &token).await?;
            for u in users {
                if !u.profile_image_url.is_empty() {
                    avatars.insert(normalize_login(&u.login), u.profile_image_url);
                }
            }
        }
        for s in &mut live {
            s.avatar_url = avatars.get(&s.login).cloned();
        }

        debug!(target: "telemetry", requested = wanted.len(), live = live.len(), "helix refresh");
        Ok(live)
    }

    fn name(&self) -> &'static str {
        "helix"
    }
}

// ------------------------------------------------------------
// Fixed telemetry (tests, dry runs)
// ------------------------------------------------------------

/// Returns a preset live set, filtered to the requested logins.
#[derive(Debug, Default)]
pub struct StaticTelemetry {
    live: Mutex<Vec<LiveChannelStatus>>,
    failure: Mutex<Option<String>>,
}

impl StaticTelemetry {
    pub fn new(live: Vec<LiveChannelStatus>) -> Self {
        Self {
            live: Mutex::new(live),
            failure: Mutex::new(None),
        }
    }

    pub fn set_live(&self, live: Vec<LiveChannelStatus>) {
        if let Ok(mut g) = self.live.lock() {
            *g = live;
        }
    }

    /// Make subsequent fetches fail with a telemetry error (`None` to recover).
    pub fn set_failure(&self, message: Option<&str>) {
        if let Ok(mut g) = self.failure.lock() {
            *g = message.map(str::to_string);
        }
    }
}

#[async_trait]
impl TelemetrySource for StaticTelemetry {
    async fn fetch_live(&self, logins: &[String]) -> Result<Vec<LiveChannelStatus>> {
        if let Some(msg) = self.failure.lock().ok().and_then(|g| g.clone()) {
            return Err(ScoutError::Telemetry(msg));
        }
        let wanted: BTreeSet<String> = logins.iter().map(|l| normalize_login(l)).collect();
        let live = self
            .live
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|s| wanted.contains(&normalize_login(&s.login)))
            .collect();
        Ok(live)
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
