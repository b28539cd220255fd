//! Public client surface + builder.
//! Internals are split into `constants` (UA, endpoints, alarm names) and `retry` (backoff curves).

mod constants;
pub mod retry;

pub use constants::{
    DEFAULT_FILENAME, DEFAULT_REFRESH_RATE, MAX_REFRESH_RATE, REFRESH_ALARM, RETRY_ALARM,
};
pub(crate) use constants::{
    ACCESS_TOKEN_HEADER, DEFAULT_TIMEOUT_SECS, DEVELOPMENT_BASE, PRODUCTION_BASE,
};
pub use retry::{Backoff, error_delay, parse_retry_after, rate_limit_delay};

use crate::core::{Environment, TrmnlError};
use constants::{DEVICES_PATH, DISPLAY_PATH, LOGIN_PATH, USER_AGENT};
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// HTTP client for the TRMNL display and device endpoints.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct TrmnlClient {
    http: Client,
    base: Url,
    environment: Environment,
}

impl Default for TrmnlClient {
    fn default() -> Self {
        Self::builder().build().expect("default client")
    }
}

impl TrmnlClient {
    /// Create a new builder.
    pub fn builder() -> TrmnlClientBuilder {
        TrmnlClientBuilder::default()
    }

    /// The environment this client was built for.
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Base URL every endpoint is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Where display clients send users that have not configured a key yet.
    pub fn login_url(&self) -> Result<Url, TrmnlError> {
        Ok(self.base.join(LOGIN_PATH)?)
    }

    /* -------- internal getters used by other modules -------- */

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn display_url(&self) -> Result<Url, TrmnlError> {
        Ok(self.base.join(DISPLAY_PATH)?)
    }

    pub(crate) fn devices_url(&self) -> Result<Url, TrmnlError> {
        Ok(self.base.join(DEVICES_PATH)?)
    }
}

/* ----------------------- Builder ----------------------- */

#[derive(Default)]
pub struct TrmnlClientBuilder {
    user_agent: Option<String>,
    environment: Option<Environment>,
    base_url: Option<Url>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl TrmnlClientBuilder {
    /// Override the User-Agent.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Pick the production or development host. Default: production.
    pub fn environment(mut self, env: Environment) -> Self {
        self.environment = Some(env);
        self
    }

    /// Override the base URL (e.g., `http://127.0.0.1:8080/`). Takes precedence over
    /// [`environment`](Self::environment).
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Set a global request timeout (overall). Default: 30s.
    pub fn timeout(mut self, dur: Duration) -> Self {
        self.timeout = Some(dur);
        self
    }

    /// Set a connect timeout. Default: none.
    pub fn connect_timeout(mut self, dur: Duration) -> Self {
        self.connect_timeout = Some(dur);
        self
    }

    pub fn build(self) -> Result<TrmnlClient, TrmnlError> {
        let environment = self.environment.unwrap_or_default();
        let base = match self.base_url {
            Some(url) => url,
            None => Url::parse(environment.base_url())?,
        };

        let mut httpb = reqwest::Client::builder()
            .user_agent(self.user_agent.as_deref().unwrap_or(USER_AGENT))
            .timeout(
                self.timeout
                    .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            );

        if let Some(ct) = self.connect_timeout {
            httpb = httpb.connect_timeout(ct);
        }

        let http = httpb.build()?;

        Ok(TrmnlClient {
            http,
            base,
            environment,
        })
    }
}
