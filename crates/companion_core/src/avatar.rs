//! The bot's own record in a world: identity, pose and follow target.

use shared::{
    domain::{AvatarId, EntityId, EntityType, UpdateType},
    protocol::AvatarUpdate,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl Pose {
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
        }
    }

    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.z, self.yaw, self.pitch, self.roll]
            .iter()
            .all(|v| v.is_finite())
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            x: 6.916,
            y: 0.03,
            z: 3211.1782,
            yaw: 300.0,
            pitch: 0.0,
            roll: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    /// Opaque avatar/data-block value published with every pose.
    pub avatar_id: AvatarId,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            entity_type: EntityType::User,
            entity_id: EntityId(3),
            avatar_id: AvatarId(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowState {
    Idle,
    Following(EntityId),
}

/// Owned by exactly one world session; commands and pursuit take `&mut` to it.
#[derive(Debug, Clone, PartialEq)]
pub struct AvatarState {
    pub target_id: EntityId,
    pub pose: Pose,
    pub identity: Identity,
}

impl AvatarState {
    pub fn new(identity: Identity, pose: Pose) -> Self {
        Self {
            target_id: EntityId::NONE,
            pose,
            identity,
        }
    }

    pub fn follow_state(&self) -> FollowState {
        if self.target_id.is_none() {
            FollowState::Idle
        } else {
            FollowState::Following(self.target_id)
        }
    }

    pub fn is_following(&self) -> bool {
        !self.target_id.is_none()
    }

    pub fn to_update(&self) -> AvatarUpdate {
        AvatarUpdate {
            entity_type: self.identity.entity_type,
            update_type: UpdateType::Moving,
            entity_id: self.identity.entity_id,
            x: self.pose.x,
            y: self.pose.y,
            z: self.pose.z,
            yaw: self.pose.yaw,
            pitch: self.pose.pitch,
            roll: self.pose.roll,
            avatar_id: self.identity.avatar_id,
        }
    }
}

impl Default for AvatarState {
    fn default() -> Self {
        Self::new(Identity::default(), Pose::default())
    }
}
