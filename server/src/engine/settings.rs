use serde::{Deserialize, Serialize};
use sqlx::SqliteExecutor;

use super::catalog::Capabilities;
use super::tier::Tier;
use crate::db::queries::settings as q;
use crate::error::{AccessError, AccessResult};

/// A single toggle in the server's permission settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Setting {
    Allowed,
    Forbidden,
}

impl Setting {
    pub fn is_allowed(self) -> bool {
        self == Setting::Allowed
    }
}

/// Settings fields, without their tier prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingField {
    CreateRoom,
    SendInvitation,
    DeleteUser,
    DeleteMessages,
    SendMessages,
    CanSeePrivateRooms,
    CanEditUsersGroup,
    CanEditRooms,
}

/// Per-server toggles from which the masters, moderators and members tier
/// capabilities are derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PermissionSettings {
    pub masters_create_room: Setting,
    pub masters_send_invitation: Setting,
    pub masters_delete_user: Setting,
    pub masters_delete_messages: Setting,
    pub masters_send_messages: Setting,
    pub masters_can_see_private_rooms: Setting,
    pub masters_can_edit_users_group: Setting,
    pub masters_can_edit_rooms: Setting,

    pub moderators_create_room: Setting,
    pub moderators_send_invitation: Setting,
    pub moderators_delete_user: Setting,
    pub moderators_delete_messages: Setting,
    pub moderators_send_messages: Setting,
    pub moderators_can_see_private_rooms: Setting,
    pub moderators_can_edit_rooms: Setting,

    pub members_create_room: Setting,
    pub members_send_invitation: Setting,
    pub members_delete_messages: Setting,
    pub members_send_messages: Setting,
    pub members_can_see_private_rooms: Setting,
}

impl Default for PermissionSettings {
    fn default() -> Self {
        use Setting::{Allowed, Forbidden};
        Self {
            masters_create_room: Forbidden,
            masters_send_invitation: Allowed,
            masters_delete_user: Allowed,
            masters_delete_messages: Allowed,
            masters_send_messages: Allowed,
            masters_can_see_private_rooms: Forbidden,
            masters_can_edit_users_group: Forbidden,
            masters_can_edit_rooms: Allowed,

            moderators_create_room: Forbidden,
            moderators_send_invitation: Allowed,
            moderators_delete_user: Allowed,
            moderators_delete_messages: Allowed,
            moderators_send_messages: Allowed,
            moderators_can_see_private_rooms: Forbidden,
            moderators_can_edit_rooms: Forbidden,

            members_create_room: Forbidden,
            members_send_invitation: Allowed,
            members_delete_messages: Forbidden,
            members_send_messages: Allowed,
            members_can_see_private_rooms: Forbidden,
        }
    }
}

impl PermissionSettings {
    /// The fields governing one tier. Owners have none.
    pub fn tier_settings(&self, tier: Tier) -> Vec<(SettingField, Setting)> {
        use SettingField::*;
        match tier {
            Tier::Owner => Vec::new(),
            Tier::Master => vec![
                (CreateRoom, self.masters_create_room),
                (SendInvitation, self.masters_send_invitation),
                (DeleteUser, self.masters_delete_user),
                (DeleteMessages, self.masters_delete_messages),
                (SendMessages, self.masters_send_messages),
                (CanSeePrivateRooms, self.masters_can_see_private_rooms),
                (CanEditUsersGroup, self.masters_can_edit_users_group),
                (CanEditRooms, self.masters_can_edit_rooms),
            ],
            Tier::Moderator => vec![
                (CreateRoom, self.moderators_create_room),
                (SendInvitation, self.moderators_send_invitation),
                (DeleteUser, self.moderators_delete_user),
                (DeleteMessages, self.moderators_delete_messages),
                (SendMessages, self.moderators_send_messages),
                (CanSeePrivateRooms, self.moderators_can_see_private_rooms),
                (CanEditRooms, self.moderators_can_edit_rooms),
            ],
            Tier::Member => vec![
                (CreateRoom, self.members_create_room),
                (SendInvitation, self.members_send_invitation),
                (DeleteMessages, self.members_delete_messages),
                (SendMessages, self.members_send_messages),
                (CanSeePrivateRooms, self.members_can_see_private_rooms),
            ],
        }
    }
}

/// Capabilities a settings field controls for a tier.
pub fn field_capabilities(tier: Tier, field: SettingField) -> Capabilities {
    match field {
        SettingField::CreateRoom => Capabilities::CREATE_ROOM_IN_SERVER,
        SettingField::SendInvitation => Capabilities::SEND_INVITATION,
        SettingField::DeleteUser => match tier {
            Tier::Master => {
                Capabilities::DELETE_USER_FROM_SERVER
                    | Capabilities::DELETE_MODERATORS_FROM_SERVER
                    | Capabilities::DELETE_MEMBERS_FROM_SERVER
            }
            Tier::Moderator => {
                Capabilities::DELETE_USER_FROM_SERVER | Capabilities::DELETE_MEMBERS_FROM_SERVER
            }
            Tier::Owner | Tier::Member => Capabilities::empty(),
        },
        SettingField::DeleteMessages => Capabilities::DELETE_MESSAGE_FROM_SERVER,
        SettingField::SendMessages => Capabilities::SEND_MESSAGES_IN_SERVER,
        SettingField::CanSeePrivateRooms => Capabilities::DISPLAY_PRIVATE_ROOM_DATA,
        SettingField::CanEditUsersGroup => {
            Capabilities::EDIT_MODERATORS_GROUP | Capabilities::EDIT_MEMBERS_GROUP
        }
        SettingField::CanEditRooms => Capabilities::EDIT_ROOMS_IN_SERVER,
    }
}

/// Load a server's settings. `NotFound` when none are stored.
pub async fn get_settings<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
) -> AccessResult<PermissionSettings> {
    let raw = q::get_settings(ex, server_id)
        .await?
        .ok_or_else(|| AccessError::not_found("permission settings", server_id))?;
    serde_json::from_str(&raw).map_err(|e| {
        AccessError::Inconsistent(format!("stored settings for {server_id} are unreadable: {e}"))
    })
}

pub(crate) fn encode(settings: &PermissionSettings) -> AccessResult<String> {
    serde_json::to_string(settings)
        .map_err(|e| AccessError::Invalid(format!("settings not serializable: {e}")))
}

/// Store default settings unless the server already has some.
pub async fn insert_default_if_missing<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
) -> AccessResult<bool> {
    let json = encode(&PermissionSettings::default())?;
    Ok(q::insert_settings_if_missing(ex, server_id, &json).await?)
}

pub async fn store_settings<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
    settings: &PermissionSettings,
) -> AccessResult<()> {
    q::upsert_settings(ex, server_id, &encode(settings)?).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = PermissionSettings::default();
        assert_eq!(s.masters_create_room, Setting::Forbidden);
        assert_eq!(s.masters_can_edit_rooms, Setting::Allowed);
        assert_eq!(s.moderators_can_edit_rooms, Setting::Forbidden);
        assert_eq!(s.members_delete_messages, Setting::Forbidden);
        assert_eq!(s.members_send_messages, Setting::Allowed);
    }

    #[test]
    fn test_tier_settings_sizes() {
        let s = PermissionSettings::default();
        assert!(s.tier_settings(Tier::Owner).is_empty());
        assert_eq!(s.tier_settings(Tier::Master).len(), 8);
        assert_eq!(s.tier_settings(Tier::Moderator).len(), 7);
        assert_eq!(s.tier_settings(Tier::Member).len(), 5);
    }

    #[test]
    fn test_delete_user_fan_out() {
        assert_eq!(
            field_capabilities(Tier::Master, SettingField::DeleteUser),
            Capabilities::DELETE_USER_FROM_SERVER
                | Capabilities::DELETE_MODERATORS_FROM_SERVER
                | Capabilities::DELETE_MEMBERS_FROM_SERVER
        );
        assert_eq!(
            field_capabilities(Tier::Moderator, SettingField::DeleteUser),
            Capabilities::DELETE_USER_FROM_SERVER | Capabilities::DELETE_MEMBERS_FROM_SERVER
        );
        // Nobody's settings can hand out the right to remove masters
        for tier in Tier::CONFIGURABLE {
            for (field, _) in PermissionSettings::default().tier_settings(tier) {
                assert!(
                    !field_capabilities(tier, field)
                        .contains(Capabilities::DELETE_MASTERS_FROM_SERVER)
                );
            }
        }
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(PermissionSettings::default()).unwrap();
        assert_eq!(json["masters_delete_user"], "Allowed");
        assert_eq!(json["members_create_room"], "Forbidden");

        // Missing fields fall back to defaults
        let partial: PermissionSettings =
            serde_json::from_str(r#"{"members_create_room":"Allowed"}"#).unwrap();
        assert_eq!(partial.members_create_room, Setting::Allowed);
        assert_eq!(partial.masters_send_messages, Setting::Allowed);

        let parse = serde_json::from_str::<PermissionSettings>;
        assert!(parse(r#"{"members_create_room":"Maybe"}"#).is_err());
        assert!(parse(r#"{"owners_create_room":"Allowed"}"#).is_err());
    }
}
