//! Chat and state channels: an in-process message queue per direction, fed by
//! a WebSocket pump in production and by the test harness otherwise.

use std::fmt;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::domain::WorldId;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::CompanionError;

const CHANNEL_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Chat,
    State,
}

impl ChannelKind {
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::State => "state",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// One direction-paired channel scoped to a world. `recv` yields payloads in
/// arrival order and `None` once the peer has gone away.
pub struct WorldChannel {
    world: WorldId,
    kind: ChannelKind,
    inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<String>,
}

/// Far side of an in-memory [`WorldChannel`].
pub struct ChannelPeer {
    pub to_client: mpsc::Sender<String>,
    pub from_client: mpsc::Receiver<String>,
}

impl WorldChannel {
    pub fn new(
        world: WorldId,
        kind: ChannelKind,
        inbound: mpsc::Receiver<String>,
        outbound: mpsc::Sender<String>,
    ) -> Self {
        Self {
            world,
            kind,
            inbound,
            outbound,
        }
    }

    pub fn pair(world: WorldId, kind: ChannelKind) -> (Self, ChannelPeer) {
        let (to_client, inbound) = mpsc::channel(CHANNEL_QUEUE_DEPTH);
        let (outbound, from_client) = mpsc::channel(CHANNEL_QUEUE_DEPTH);
        (
            Self::new(world, kind, inbound, outbound),
            ChannelPeer {
                to_client,
                from_client,
            },
        )
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    pub async fn send(&self, payload: String) -> Result<(), CompanionError> {
        self.outbound
            .send(payload)
            .await
            .map_err(|_| CompanionError::ChannelClosed {
                world: self.world,
                channel: self.kind,
            })
    }
}

#[async_trait]
pub trait WorldConnector: Send + Sync {
    async fn connect(
        &self,
        world: WorldId,
        kind: ChannelKind,
    ) -> Result<WorldChannel, CompanionError>;
}

/// Opens channels at `{ws_url}/api/worlds/{world}/ws/{chat|state}?token=..`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    ws_url: String,
    token: String,
}

impl WsConnector {
    pub fn new(ws_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            token: token.into(),
        }
    }

    pub fn channel_url(&self, world: WorldId, kind: ChannelKind) -> Result<Url, CompanionError> {
        let base = self.ws_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/api/worlds/{world}/ws/{kind}")).map_err(
            |err| CompanionError::Config(format!("invalid websocket url '{base}': {err}")),
        )?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(CompanionError::Config(format!(
                "websocket url must start with ws:// or wss://, got '{base}'"
            )));
        }
        url.query_pairs_mut().append_pair("token", &self.token);
        Ok(url)
    }
}

#[async_trait]
impl WorldConnector for WsConnector {
    async fn connect(
        &self,
        world: WorldId,
        kind: ChannelKind,
    ) -> Result<WorldChannel, CompanionError> {
        let url = self.channel_url(world, kind)?;
        let (ws_stream, _) = connect_async(url.as_str()).await.map_err(|err| {
            CompanionError::Connection {
                world,
                channel: kind,
                reason: err.to_string(),
            }
        })?;
        info!(world_id = world.0, channel = %kind, "websocket connected");

        let (mut writer, mut reader) = ws_stream.split();
        let (in_tx, inbound) = mpsc::channel(CHANNEL_QUEUE_DEPTH);
        let (outbound, mut out_rx) = mpsc::channel::<String>(CHANNEL_QUEUE_DEPTH);

        // Reader and writer run as separate tasks: a full inbound queue must
        // never stop outbound payloads from draining.
        tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(world_id = world.0, channel = %kind, "dropping non-utf8 frame: {err}");
                            continue;
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        warn!(world_id = world.0, channel = %kind, "websocket receive failed: {err}");
                        break;
                    }
                };
                if in_tx.send(text).await.is_err() {
                    break;
                }
            }
            debug!(world_id = world.0, channel = %kind, "websocket reader finished");
        });

        tokio::spawn(async move {
            while let Some(payload) = out_rx.recv().await {
                if let Err(err) = writer.send(Message::Text(payload)).await {
                    warn!(world_id = world.0, channel = %kind, "websocket send failed: {err}");
                    return;
                }
            }
            let _ = writer.close().await;
            debug!(world_id = world.0, channel = %kind, "websocket writer finished");
        });

        Ok(WorldChannel::new(world, kind, inbound, outbound))
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
