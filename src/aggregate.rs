use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::Arc,
};

use serde_json::{json, Map, Value};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::{
    config::{Extract, ResourceSpec, Role, Settings},
    error::AppError,
    fetch::{self, Client},
    labels::{self, LabelInput},
    value,
};

/// Raw upstream results for one subject. `None` marks a failed fetch.
#[derive(Debug, Default)]
pub struct Gathered {
    /// Indexed like [`Settings::resources`]
    pub resources: Vec<Option<Value>>,
    /// asset type id -> items
    pub inventory: BTreeMap<u32, Option<Vec<Value>>>,
    /// Paginated resources whose listing ended early
    pub partial: BTreeSet<String>,
    /// Inventory categories whose listing ended early
    pub partial_inventory: BTreeSet<u32>,
}

enum Branch {
    Resource(usize, Option<Value>, bool),
    Inventory(u32, Option<Vec<Value>>, bool),
}

/// Loads one resource, and whether it was loaded completely. Paginated
/// resources are wrapped as `{"data": [...]}` so every extraction rule sees
/// the same shape.
async fn load_resource(
    client: &Client,
    spec: &ResourceSpec,
    url: &str,
    settings: &Settings,
) -> (Option<Value>, bool) {
    if !spec.paged {
        return (client.safe_fetch(&spec.name, url).await, true);
    }

    match client
        .fetch_listing(
            &spec.name,
            |cursor| fetch::with_cursor(url, cursor),
            settings.page_mode,
            settings.max_pages,
        )
        .await
    {
        Ok(listing) => (Some(json!({ "data": listing.items })), listing.complete),
        Err(e) => {
            tracing::warn!("Loading pages failed: {}", e);
            (None, true)
        }
    }
}

/// Fetches every configured resource and inventory category concurrently.
/// A failing or panicking branch only leaves its own slot empty.
#[tracing::instrument(skip(client, settings))]
pub async fn gather(client: &Client, settings: Arc<Settings>, id: &str) -> Gathered {
    let mut tasks = JoinSet::new();

    for (idx, spec) in settings.resources.iter().enumerate() {
        let client = client.clone();
        let settings = settings.clone();
        let url = settings.resource_url(spec, id);
        let span = tracing::info_span!("resource", name = %spec.name);

        tasks.spawn(
            async move {
                let spec = &settings.resources[idx];
                let (value, complete) = load_resource(&client, spec, &url, &settings).await;
                Branch::Resource(idx, value, complete)
            }
            .instrument(span),
        );
    }

    for (&asset_type, category) in settings.inventory.categories.iter() {
        let client = client.clone();
        let settings = settings.clone();
        let url = settings.inventory_url(id, asset_type);
        let span = tracing::info_span!("inventory", %category, asset_type);
        let resource = format!("inventory:{category}");

        tasks.spawn(
            async move {
                let loaded = client
                    .fetch_listing(
                        &resource,
                        |cursor| fetch::with_cursor(&url, cursor),
                        settings.page_mode,
                        settings.max_pages,
                    )
                    .await;

                match loaded {
                    Ok(listing) => {
                        Branch::Inventory(asset_type, Some(listing.items), listing.complete)
                    }
                    Err(e) => {
                        tracing::warn!("Loading inventory failed: {}", e);
                        Branch::Inventory(asset_type, None, true)
                    }
                }
            }
            .instrument(span),
        );
    }

    let mut gathered = Gathered {
        resources: vec![None; settings.resources.len()],
        inventory: settings
            .inventory
            .categories
            .keys()
            .map(|&asset_type| (asset_type, None))
            .collect(),
        ..Default::default()
    };

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Branch::Resource(idx, value, complete)) => {
                if !complete {
                    gathered.partial.insert(settings.resources[idx].name.clone());
                }
                gathered.resources[idx] = value;
            }
            Ok(Branch::Inventory(asset_type, items, complete)) => {
                if !complete {
                    gathered.partial_inventory.insert(asset_type);
                }
                gathered.inventory.insert(asset_type, items);
            }
            Err(e) => {
                tracing::error!("Fetch task died: {:?}", e);
            }
        }
    }

    gathered
}

/// Takes a resource's value out of its upstream body, or its safe default
pub fn extract(rule: Extract, body: Option<&Value>) -> Value {
    match rule {
        Extract::Body => body.cloned().unwrap_or(Value::Null),
        Extract::Count => body
            .and_then(|b| b.get("count"))
            .filter(|c| c.is_number())
            .cloned()
            .unwrap_or_else(|| json!(0)),
        Extract::Data => body
            .and_then(|b| b.get("data"))
            .filter(|d| d.is_array())
            .cloned()
            .unwrap_or_else(|| json!([])),
        Extract::FirstImageUrl => body
            .and_then(|b| b.pointer("/data/0/imageUrl"))
            .filter(|u| u.is_string())
            .cloned()
            .unwrap_or(Value::Null),
    }
}

fn status(loaded: bool, partial: bool) -> Value {
    let status = match (loaded, partial) {
        (false, _) => "failed",
        (true, true) => "partial",
        (true, false) => "ok",
    };
    Value::from(status)
}

fn data_items(body: Option<&Value>) -> &[Value] {
    body.and_then(|b| b.get("data"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

impl Gathered {
    fn by_role(&self, settings: &Settings, role: Role) -> Option<Option<&Value>> {
        let idx = settings.resources.iter().position(|r| r.role == Some(role))?;
        Some(self.resources.get(idx).and_then(Option::as_ref))
    }

    /// Builds the combined profile. Fails only when the profile resource
    /// itself could not be loaded.
    pub fn assemble(
        &self,
        settings: &Settings,
        id: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Value, AppError> {
        let profile = self.by_role(settings, Role::Profile);
        if let Some(None) = profile {
            return Err(AppError::UnknownUser(id.to_string()));
        }
        let profile = profile.flatten();

        let mut out = Map::new();
        let mut statuses = Map::new();

        for (spec, raw) in settings.resources.iter().zip(self.resources.iter()) {
            let value = extract(spec.extract, raw.as_ref());
            statuses.insert(
                spec.name.clone(),
                status(raw.is_some(), self.partial.contains(&spec.name)),
            );

            let target = match &spec.group {
                Some(group) => {
                    let entry = out
                        .entry(group.clone())
                        .or_insert_with(|| Value::Object(Map::new()));
                    match entry.as_object_mut() {
                        Some(map) => map,
                        None => {
                            return Err(AppError::Internal(format!(
                                "group {group:?} collides with a resource name"
                            )))
                        }
                    }
                }
                None => &mut out,
            };
            target.insert(spec.name.clone(), value);
        }

        let mut inventory = Map::new();
        let mut inventory_status = Map::new();
        let mut category_counts = BTreeMap::new();
        for (asset_type, items) in self.inventory.iter() {
            let Some(category) = settings.category_name(*asset_type) else {
                continue;
            };

            inventory_status.insert(
                category.to_string(),
                status(
                    items.is_some(),
                    self.partial_inventory.contains(asset_type),
                ),
            );

            let items = items.as_deref().unwrap_or(&[]);
            category_counts.insert(category.to_string(), items.len());
            inventory.insert(category.to_string(), Value::from(items.to_vec()));
        }
        if !settings.inventory.categories.is_empty() {
            statuses.insert("inventory".to_string(), Value::Object(inventory_status));
        }

        let collectibles = data_items(self.by_role(settings, Role::Collectibles).flatten());
        let badges = data_items(self.by_role(settings, Role::Badges).flatten());

        let total_value = value::total_value(collectibles);

        let allowlist: HashSet<u64> = settings.allowlist.iter().copied().collect();
        let owns_allowlisted = value::owns_any(
            collectibles.iter().chain(
                self.inventory
                    .values()
                    .flat_map(|items| items.iter().flatten()),
            ),
            &allowlist,
        );

        let account_age_days = profile
            .and_then(|p| p.get("created"))
            .and_then(Value::as_str)
            .and_then(|created| labels::account_age_days(created, now));

        let input = LabelInput {
            account_age_days,
            total_value,
            collectible_count: collectibles.len(),
            badge_count: badges.len(),
            category_counts: Some(&category_counts),
            owns_allowlisted,
        };
        let labels = labels::assign_labels(&input, &settings.labels);

        out.insert("rap".to_string(), Value::from(total_value));
        out.insert("collectibleCount".to_string(), Value::from(collectibles.len()));
        out.insert("badgeCount".to_string(), Value::from(badges.len()));
        out.insert(
            "accountAgeDays".to_string(),
            account_age_days.map_or(Value::Null, Value::from),
        );
        out.insert("inventory".to_string(), Value::Object(inventory));
        out.insert(
            "inventoryCounts".to_string(),
            serde_json::to_value(&category_counts)
                .map_err(|e| AppError::Internal(e.to_string()))?,
        );
        out.insert("ownsAllowlisted".to_string(), Value::from(owns_allowlisted));
        out.insert("labels".to_string(), Value::from(labels));
        out.insert("status".to_string(), Value::Object(statuses));

        Ok(Value::Object(out))
    }
}
