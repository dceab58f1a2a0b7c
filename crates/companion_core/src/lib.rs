use std::sync::Arc;

use reqwest::Client;
use shared::{
    domain::WorldId,
    error::ApiError,
    protocol::{LoginRequest, LoginResponse},
};
use tracing::info;

pub mod avatar;
pub mod commands;
pub mod error;
pub mod pursuit;
pub mod session;
pub mod transport;

pub use avatar::{AvatarState, FollowState, Identity, Pose};
pub use error::CompanionError;
pub use pursuit::PursuitParams;
pub use session::{run_worlds, WorldOutcome, WorldReport};
pub use transport::{ChannelKind, WorldChannel, WorldConnector, WsConnector};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub ws_url: String,
    pub http_url: String,
    pub credentials: Credentials,
    pub worlds: Vec<WorldId>,
    pub identity: Identity,
    pub spawn: Pose,
    pub pursuit: PursuitParams,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8080".into(),
            http_url: "http://localhost:8080".into(),
            credentials: Credentials {
                username: "user#3".into(),
                password: "user#3".into(),
            },
            worlds: vec![WorldId(1)],
            identity: Identity::default(),
            spawn: Pose::default(),
            pursuit: PursuitParams::default(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), CompanionError> {
        if self.worlds.is_empty() {
            return Err(CompanionError::Config("no worlds configured".into()));
        }
        if !(self.http_url.starts_with("http://") || self.http_url.starts_with("https://")) {
            return Err(CompanionError::Config(format!(
                "http url must start with http:// or https://, got '{}'",
                self.http_url
            )));
        }
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(CompanionError::Config(format!(
                "websocket url must start with ws:// or wss://, got '{}'",
                self.ws_url
            )));
        }
        Ok(())
    }

    /// Fresh avatar for one world; every world gets its own copy.
    pub fn avatar_template(&self) -> AvatarState {
        AvatarState::new(self.identity, self.spawn)
    }
}

pub struct CompanionClient {
    http: Client,
    config: ClientConfig,
}

impl CompanionClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `POST {http_url}/api/login`, returning the bearer token.
    pub async fn login(&self) -> Result<String, CompanionError> {
        let url = format!("{}/api/login", self.config.http_url.trim_end_matches('/'));
        let res = self
            .http
            .post(&url)
            .json(&LoginRequest {
                username: self.config.credentials.username.clone(),
                password: self.config.credentials.password.clone(),
            })
            .send()
            .await
            .map_err(|err| CompanionError::Authentication(format!("{url}: {err}")))?;

        let status = res.status();
        if !status.is_success() {
            let detail = res
                .json::<ApiError>()
                .await
                .map(|body| body.message)
                .unwrap_or_default();
            return Err(CompanionError::Authentication(if detail.is_empty() {
                format!("login rejected with status {status}")
            } else {
                format!("login rejected with status {status}: {detail}")
            }));
        }

        let body: LoginResponse = res.json().await.map_err(|err| {
            CompanionError::Authentication(format!("invalid login response: {err}"))
        })?;
        match body.token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(CompanionError::Authentication(
                "login response did not contain a token".into(),
            )),
        }
    }

    /// Worlds to join. The platform has no world directory yet, so this is the
    /// configured list.
    pub async fn fetch_world_ids(&self, _token: &str) -> Vec<WorldId> {
        self.config.worlds.clone()
    }

    /// Logs in and runs every world until all of them have settled.
    pub async fn run(&self) -> Result<Vec<WorldReport>, CompanionError> {
        self.config.validate()?;
        let token = self.login().await?;
        info!(
            username = %self.config.credentials.username,
            "logged in"
        );
        let worlds = self.fetch_world_ids(&token).await;
        let connector: Arc<dyn WorldConnector> =
            Arc::new(WsConnector::new(self.config.ws_url.clone(), token));
        Ok(run_worlds(
            connector,
            &worlds,
            &self.config.avatar_template(),
            self.config.pursuit,
        )
        .await)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
