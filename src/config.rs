use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
};

use serde::Deserialize;

use crate::{error::ConfigError, fetch::PageMode, labels::LabelRule};

pub const CONFIG_ENV: &str = "FLEX_PROXY_CONFIG";
pub const PORT_ENV: &str = "PORT";

/// Keys of the aggregated profile that are computed rather than configured
pub const DERIVED_FIELDS: &[&str] = &[
    "rap",
    "collectibleCount",
    "badgeCount",
    "accountAgeDays",
    "inventory",
    "inventoryCounts",
    "ownsAllowlisted",
    "labels",
    "status",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub port: u16,
    /// Every service lives at `https://{service}.{domain}`
    pub domain: String,
    /// Routes every service through `{gateway}/{service}` instead of its own host
    pub gateway: Option<String>,
    pub request_timeout_secs: u64,
    pub max_pages: usize,
    /// Page failure handling inside `/full`, the single listing endpoints are always strict
    pub page_mode: PageMode,
    pub resources: Vec<ResourceSpec>,
    pub inventory: InventorySpec,
    pub allowlist: Vec<u64>,
    pub labels: Vec<LabelRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceSpec {
    pub name: String,
    pub service: String,
    pub path: String,
    #[serde(default)]
    pub paged: bool,
    #[serde(default)]
    pub extract: Extract,
    /// Nests the value under this key in the aggregated profile
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

/// How a resource's value is taken out of the upstream body, and what it
/// falls back to when the call fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extract {
    #[default]
    Body,
    Count,
    Data,
    FirstImageUrl,
}

/// Resources the derived fields are computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Profile,
    Collectibles,
    Badges,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InventorySpec {
    pub service: String,
    pub path: String,
    /// asset type id -> category name
    pub categories: BTreeMap<u32, String>,
}

impl Default for InventorySpec {
    fn default() -> Self {
        let categories = [
            (2, "TShirt"),
            (8, "Hat"),
            (11, "Shirt"),
            (12, "Pants"),
            (18, "Face"),
            (19, "Gear"),
            (41, "HairAccessory"),
            (42, "FaceAccessory"),
            (43, "NeckAccessory"),
            (44, "ShoulderAccessory"),
            (45, "FrontAccessory"),
            (46, "BackAccessory"),
            (47, "WaistAccessory"),
        ]
        .into_iter()
        .map(|(id, name)| (id, name.to_string()))
        .collect();

        Self {
            service: "inventory".to_string(),
            path: "/v2/users/{id}/inventory/{asset_type}?limit=100&sortOrder=Asc".to_string(),
            categories,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 3000,
            domain: "roblox.com".to_string(),
            gateway: None,
            request_timeout_secs: 10,
            max_pages: 50,
            page_mode: PageMode::Lenient,
            resources: default_resources(),
            inventory: InventorySpec::default(),
            allowlist: Vec::new(),
            labels: crate::labels::default_rules(),
        }
    }
}

fn resource(name: &str, service: &str, path: &str, extract: Extract) -> ResourceSpec {
    ResourceSpec {
        name: name.to_string(),
        service: service.to_string(),
        path: path.to_string(),
        paged: false,
        extract,
        group: None,
        role: None,
    }
}

fn default_resources() -> Vec<ResourceSpec> {
    let social = |name: &str, path: &str| ResourceSpec {
        group: Some("social".to_string()),
        ..resource(name, "friends", path, Extract::Count)
    };

    vec![
        ResourceSpec {
            role: Some(Role::Profile),
            ..resource("user", "users", "/v1/users/{id}", Extract::Body)
        },
        resource("avatar", "avatar", "/v1/users/{id}/avatar", Extract::Body),
        social("followers", "/v1/users/{id}/followers/count"),
        social("following", "/v1/users/{id}/followings/count"),
        social("friends", "/v1/users/{id}/friends/count"),
        resource("groups", "groups", "/v1/users/{id}/groups/roles", Extract::Data),
        resource(
            "headshot",
            "thumbnails",
            "/v1/users/avatar-headshot?userIds={id}&size=420x420&format=Png&isCircular=false",
            Extract::FirstImageUrl,
        ),
        resource(
            "favorites",
            "games",
            "/v2/users/{id}/favorite/games?limit=50",
            Extract::Data,
        ),
        ResourceSpec {
            paged: true,
            role: Some(Role::Collectibles),
            ..resource(
                "collectibles",
                "inventory",
                "/v1/users/{id}/assets/collectibles?sortOrder=Asc&limit=100",
                Extract::Data,
            )
        },
        ResourceSpec {
            paged: true,
            role: Some(Role::Badges),
            ..resource(
                "badges",
                "badges",
                "/v1/users/{id}/badges?limit=100&sortOrder=Asc",
                Extract::Data,
            )
        },
    ]
}

impl Settings {
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_yaml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects names that would overwrite each other in the aggregated profile
    /// or in its `status` map
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for spec in &self.resources {
            if DERIVED_FIELDS.contains(&spec.name.as_str()) {
                return Err(ConfigError::Conflict(format!(
                    "resource {:?} shadows a computed field",
                    spec.name
                )));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(ConfigError::Conflict(format!(
                    "resource {:?} is defined twice",
                    spec.name
                )));
            }
        }

        for group in self.resources.iter().filter_map(|r| r.group.as_deref()) {
            if DERIVED_FIELDS.contains(&group) {
                return Err(ConfigError::Conflict(format!(
                    "group {group:?} shadows a computed field"
                )));
            }
            if names.contains(group) {
                return Err(ConfigError::Conflict(format!(
                    "group {group:?} has the same name as a resource"
                )));
            }
        }

        let mut categories = HashSet::new();
        for name in self.inventory.categories.values() {
            if !categories.insert(name.as_str()) {
                return Err(ConfigError::Conflict(format!(
                    "inventory category {name:?} is mapped twice"
                )));
            }
        }

        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&raw)
    }

    /// Loads the file named by `FLEX_PROXY_CONFIG` (or the defaults) and
    /// applies the `PORT` override
    pub async fn from_env() -> Result<Self, ConfigError> {
        let mut settings = match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                tracing::info!(?path, "Loading config file");
                Self::load(Path::new(&path)).await?
            }
            None => {
                tracing::info!("{CONFIG_ENV} not set, using defaults");
                Self::default()
            }
        };

        if let Ok(raw) = std::env::var(PORT_ENV) {
            settings.port = raw.trim().parse().map_err(|_| ConfigError::Port(raw))?;
        }

        Ok(settings)
    }

    pub fn base_url(&self, service: &str) -> String {
        match &self.gateway {
            Some(gateway) => format!("{}/{}", gateway.trim_end_matches('/'), service),
            None => format!("https://{}.{}", service, self.domain),
        }
    }

    pub fn resource_url(&self, spec: &ResourceSpec, id: &str) -> String {
        format!("{}{}", self.base_url(&spec.service), spec.path.replace("{id}", id))
    }

    pub fn inventory_url(&self, id: &str, asset_type: u32) -> String {
        let path = self
            .inventory
            .path
            .replace("{id}", id)
            .replace("{asset_type}", &asset_type.to_string());

        format!("{}{}", self.base_url(&self.inventory.service), path)
    }

    pub fn resource_with_role(&self, role: Role) -> Option<&ResourceSpec> {
        self.resources.iter().find(|r| r.role == Some(role))
    }

    pub fn category_name(&self, asset_type: u32) -> Option<&str> {
        self.inventory.categories.get(&asset_type).map(String::as_str)
    }
}

/// Re-reads the settings whenever the process receives `SIGHUP`. A broken
/// file is logged and the previous settings stay active.
#[cfg(unix)]
pub async fn reload_on_hangup(settings: std::sync::Arc<arc_swap::ArcSwap<Settings>>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Installing SIGHUP handler {:?}", e);
            return;
        }
    };

    while hangup.recv().await.is_some() {
        tracing::info!("Reloading config");

        match Settings::from_env().await {
            Ok(loaded) => {
                if loaded.port != settings.load().port {
                    tracing::warn!("Port changes only apply after a restart");
                }
                settings.store(std::sync::Arc::new(loaded));
            }
            Err(e) => {
                tracing::error!("Reloading config: {}", e);
            }
        }
    }
}
