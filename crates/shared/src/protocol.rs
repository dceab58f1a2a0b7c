use serde::{Deserialize, Serialize};

use crate::domain::{AvatarId, EntityId, EntityType, Role, UpdateType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// One line received on a world's chat channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub name: String,
    #[serde(default)]
    pub msg: String,
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl ChatEvent {
    pub fn is_admin(&self) -> bool {
        self.role.as_ref().is_some_and(Role::is_admin)
    }
}

/// Another entity's pose as delivered in a state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPose {
    pub entity_id: EntityId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A full state-channel tick: every other entity the server knows about.
pub type WorldSnapshot = Vec<EntityPose>;

/// The bot's own pose, published once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarUpdate {
    pub entity_type: EntityType,
    pub update_type: UpdateType,
    pub entity_id: EntityId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
    pub avatar_id: AvatarId,
}
