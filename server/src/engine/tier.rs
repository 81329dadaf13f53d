use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::catalog::Capabilities;
use crate::error::AccessError;

/// Permission tier within a server. Ordered by rank: `Member < Moderator < Master < Owner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "members")]
    Member,
    #[serde(rename = "moderators")]
    Moderator,
    #[serde(rename = "masters")]
    Master,
    #[serde(rename = "owners")]
    Owner,
}

impl Tier {
    /// Highest rank first.
    pub const ALL: [Tier; 4] = [Tier::Owner, Tier::Master, Tier::Moderator, Tier::Member];

    /// Tiers whose capabilities follow the server's permission settings.
    pub const CONFIGURABLE: [Tier; 3] = [Tier::Master, Tier::Moderator, Tier::Member];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Owner => "owners",
            Tier::Master => "masters",
            Tier::Moderator => "moderators",
            Tier::Member => "members",
        }
    }

    /// Capability required to remove a user of this tier from a server.
    /// Owners can never be removed.
    pub fn delete_capability(self) -> Option<Capabilities> {
        match self {
            Tier::Owner => None,
            Tier::Master => Some(Capabilities::DELETE_MASTERS_FROM_SERVER),
            Tier::Moderator => Some(Capabilities::DELETE_MODERATORS_FROM_SERVER),
            Tier::Member => Some(Capabilities::DELETE_MEMBERS_FROM_SERVER),
        }
    }

    /// Capability required to move a user into or out of this tier.
    pub fn edit_group_capability(self) -> Option<Capabilities> {
        match self {
            Tier::Owner => None,
            Tier::Master => Some(Capabilities::EDIT_MASTERS_GROUP),
            Tier::Moderator => Some(Capabilities::EDIT_MODERATORS_GROUP),
            Tier::Member => Some(Capabilities::EDIT_MEMBERS_GROUP),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owners" => Ok(Tier::Owner),
            "masters" => Ok(Tier::Master),
            "moderators" => Ok(Tier::Moderator),
            "members" => Ok(Tier::Member),
            other => Err(AccessError::Invalid(format!("unknown tier '{other}'"))),
        }
    }
}
