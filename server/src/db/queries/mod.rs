pub mod friends;
pub mod invites;
pub mod messages;
pub mod notifications;
pub mod roles;
pub mod rooms;
pub mod servers;
pub mod settings;
pub mod users;
