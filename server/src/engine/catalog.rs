use bitflags::bitflags;
use serde::Serialize;

use crate::error::{AccessError, AccessResult};

bitflags! {
    /// Capability bitfield for tier roles and direct user grants.
    /// Stored as `i64` in SQLite (cast to/from `u64`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u64 {
        // ── Server ──
        const CREATE_ROOM_IN_SERVER         = 1 << 0;
        const SEND_MESSAGES_IN_SERVER       = 1 << 1;
        const DELETE_MASTERS_FROM_SERVER    = 1 << 2;
        const DELETE_MODERATORS_FROM_SERVER = 1 << 3;
        const DELETE_MEMBERS_FROM_SERVER    = 1 << 4;
        const DELETE_USER_FROM_SERVER       = 1 << 5;
        const EDIT_PERMISSIONS_IN_SERVER    = 1 << 6;
        const EDIT_MASTERS_GROUP            = 1 << 7;
        const EDIT_MODERATORS_GROUP         = 1 << 8;
        const EDIT_MEMBERS_GROUP            = 1 << 9;
        const EDIT_ROOMS_IN_SERVER          = 1 << 10;

        // ── Room ──
        const DISPLAY_PRIVATE_ROOM_DATA     = 1 << 16;

        // ── Message ──
        const DELETE_MESSAGE_FROM_SERVER    = 1 << 20;

        // ── Invite ──
        const SEND_INVITATION               = 1 << 24;

        // ── User (direct grants) ──
        const CHANGE_USER_GROUP             = 1 << 28;
        const FRIENDS_SEE_PROFILE           = 1 << 29;
        const EVERYONE_SEE_PROFILE          = 1 << 30;
    }
}

impl Capabilities {
    /// Decode a bitfield read from the database, dropping unknown bits.
    pub fn from_db(bits: i64) -> Self {
        Self::from_bits_truncate(bits as u64)
    }

    /// Encode for storage in an `INTEGER` column.
    pub fn to_db(self) -> i64 {
        self.bits() as i64
    }
}

/// Entity type a capability applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityScope {
    Server,
    Room,
    Message,
    User,
    Invite,
}

/// One catalog entry.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityDef {
    pub codename: &'static str,
    pub flag: Capabilities,
    pub scope: EntityScope,
    pub description: &'static str,
}

const fn def(
    codename: &'static str,
    flag: Capabilities,
    scope: EntityScope,
    description: &'static str,
) -> CapabilityDef {
    CapabilityDef {
        codename,
        flag,
        scope,
        description,
    }
}

/// The closed set of capabilities known to the system.
pub const CATALOG: &[CapabilityDef] = &[
    def(
        "create_room_in_server",
        Capabilities::CREATE_ROOM_IN_SERVER,
        EntityScope::Server,
        "Can create room in server",
    ),
    def(
        "send_messages_in_server",
        Capabilities::SEND_MESSAGES_IN_SERVER,
        EntityScope::Server,
        "Can send messages in server",
    ),
    def(
        "delete_masters_from_server",
        Capabilities::DELETE_MASTERS_FROM_SERVER,
        EntityScope::Server,
        "Can delete users in masters tier",
    ),
    def(
        "delete_moderators_from_server",
        Capabilities::DELETE_MODERATORS_FROM_SERVER,
        EntityScope::Server,
        "Can delete users in moderators tier",
    ),
    def(
        "delete_members_from_server",
        Capabilities::DELETE_MEMBERS_FROM_SERVER,
        EntityScope::Server,
        "Can delete users in members tier",
    ),
    def(
        "delete_user_from_server",
        Capabilities::DELETE_USER_FROM_SERVER,
        EntityScope::Server,
        "Can delete user from server",
    ),
    def(
        "edit_permissions_in_server",
        Capabilities::EDIT_PERMISSIONS_IN_SERVER,
        EntityScope::Server,
        "Can modify tier permissions",
    ),
    def(
        "edit_masters_group",
        Capabilities::EDIT_MASTERS_GROUP,
        EntityScope::Server,
        "Can change masters tier",
    ),
    def(
        "edit_moderators_group",
        Capabilities::EDIT_MODERATORS_GROUP,
        EntityScope::Server,
        "Can change moderators tier",
    ),
    def(
        "edit_members_group",
        Capabilities::EDIT_MEMBERS_GROUP,
        EntityScope::Server,
        "Can change members tier",
    ),
    def(
        "edit_rooms_in_server",
        Capabilities::EDIT_ROOMS_IN_SERVER,
        EntityScope::Server,
        "Can change rooms data in server",
    ),
    def(
        "display_private_room_data",
        Capabilities::DISPLAY_PRIVATE_ROOM_DATA,
        EntityScope::Room,
        "Can see private room details",
    ),
    def(
        "delete_message_from_server",
        Capabilities::DELETE_MESSAGE_FROM_SERVER,
        EntityScope::Message,
        "Can delete message from server",
    ),
    def(
        "send_invitation",
        Capabilities::SEND_INVITATION,
        EntityScope::Invite,
        "Can send server invitations",
    ),
    def(
        "change_user_group",
        Capabilities::CHANGE_USER_GROUP,
        EntityScope::User,
        "Can change users tier",
    ),
    def(
        "friends_see_profile",
        Capabilities::FRIENDS_SEE_PROFILE,
        EntityScope::User,
        "Friends can see user profile",
    ),
    def(
        "everyone_see_profile",
        Capabilities::EVERYONE_SEE_PROFILE,
        EntityScope::User,
        "Everyone can see user profile",
    ),
];

/// Resolve a capability codename. Unknown names are an error, never a silent empty set.
pub fn capability(name: &str) -> AccessResult<Capabilities> {
    CATALOG
        .iter()
        .find(|d| d.codename == name)
        .map(|d| d.flag)
        .ok_or_else(|| AccessError::not_found("capability", name))
}

/// Resolve a list of codenames into one bitfield.
pub fn resolve_all<S: AsRef<str>>(names: &[S]) -> AccessResult<Capabilities> {
    names.iter().try_fold(Capabilities::empty(), |acc, name| {
        Ok(acc | capability(name.as_ref())?)
    })
}

/// Catalog entry for a single capability bit.
pub fn lookup(flag: Capabilities) -> Option<&'static CapabilityDef> {
    CATALOG.iter().find(|d| d.flag == flag)
}

/// Entity scope of a single capability bit.
pub fn scope_of(flag: Capabilities) -> Option<EntityScope> {
    lookup(flag).map(|d| d.scope)
}

/// Codenames of every capability set in `caps`, in catalog order.
pub fn codenames(caps: Capabilities) -> Vec<&'static str> {
    CATALOG
        .iter()
        .filter(|d| caps.contains(d.flag))
        .map(|d| d.codename)
        .collect()
}

/// Serialize a capability set as its list of codenames.
pub fn serialize_codenames<S: serde::Serializer>(
    caps: &Capabilities,
    s: S,
) -> Result<S::Ok, S::Error> {
    s.collect_seq(codenames(*caps))
}
