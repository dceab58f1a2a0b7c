use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(WorldId);
id_newtype!(EntityId);
id_newtype!(AvatarId);

impl EntityId {
    /// Follow target value meaning "not following anyone".
    pub const NONE: EntityId = EntityId(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EntityType {
    Unknown = 0,
    User = 1,
    Object = 2,
}

impl From<EntityType> for u8 {
    fn from(value: EntityType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for EntityType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::User),
            2 => Ok(Self::Object),
            other => Err(format!("unknown entity type {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum UpdateType {
    Unknown = 0,
    Joining = 1,
    Leaving = 2,
    Moving = 3,
    Teleporting = 4,
}

impl From<UpdateType> for u8 {
    fn from(value: UpdateType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for UpdateType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Joining),
            2 => Ok(Self::Leaving),
            3 => Ok(Self::Moving),
            4 => Ok(Self::Teleporting),
            other => Err(format!("unknown update type {other}")),
        }
    }
}

/// Chat role tag. Opaque apart from the `admin` value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    pub const ADMIN: &'static str = "admin";

    pub fn is_admin(&self) -> bool {
        self.0 == Self::ADMIN
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
