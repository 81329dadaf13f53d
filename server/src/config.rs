use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Top-level server configuration, loaded from guildhall.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub provisioning: ProvisioningSection,
    pub policy: PolicySection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub web_address: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            web_address: "0.0.0.0:8080".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: "sqlite:guildhall.db?mode=rwc".into(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvisioningSection {
    /// Extra attempts after a transient storage failure while provisioning a new server.
    pub retries: u32,
    /// Name of the room created alongside every new server.
    pub default_room_name: String,
}

impl Default for ProvisioningSection {
    fn default() -> Self {
        Self {
            retries: 3,
            default_room_name: "general".into(),
        }
    }
}

/// Delete bundles: the capability codenames a tier must hold in full before
/// it may remove anyone, and whose victim capabilities say whom it may remove.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    pub owners_delete: Vec<String>,
    pub masters_delete: Vec<String>,
    pub moderators_delete: Vec<String>,
    pub members_delete: Vec<String>,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            owners_delete: vec![
                "delete_masters_from_server".into(),
                "delete_moderators_from_server".into(),
                "delete_members_from_server".into(),
            ],
            masters_delete: vec![
                "delete_moderators_from_server".into(),
                "delete_members_from_server".into(),
            ],
            moderators_delete: vec!["delete_members_from_server".into()],
            members_delete: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file. Falls back to defaults if the file doesn't exist.
    /// Environment variables override TOML values.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {path}"))?;
            Self::from_toml(&contents)
                .with_context(|| format!("failed to parse config file {path}"))?
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("WEB_ADDRESS") {
            self.server.web_address = v;
        }
        if let Ok(v) = std::env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = std::env::var("DATABASE_MAX_CONNECTIONS")
            && let Ok(n) = v.parse()
        {
            self.database.max_connections = n;
        }
        if let Ok(v) = std::env::var("PROVISIONING_RETRIES")
            && let Ok(n) = v.parse()
        {
            self.provisioning.retries = n;
        }
        if let Ok(v) = std::env::var("DEFAULT_ROOM_NAME") {
            self.provisioning.default_room_name = v;
        }
    }
}
