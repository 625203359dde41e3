use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    aggregate,
    config::{Role, Settings},
    error::{AppError, StartupError},
    fetch::{self, Client, PageMode},
    metrics::Metrics,
    value,
};

#[derive(Clone)]
pub struct AppState {
    pub client: Client,
    pub settings: Arc<ArcSwap<Settings>>,
    pub registry: prometheus::Registry,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(settings: Settings, registry: prometheus::Registry) -> Result<Self, StartupError> {
        let metrics = Metrics::new(&registry)?;
        let client = Client::new(
            std::time::Duration::from_secs(settings.request_timeout_secs),
            metrics.clone(),
        )?;

        Ok(Self {
            client,
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            registry,
            metrics,
        })
    }

    fn answer(&self, endpoint: &str, result: Result<Value, AppError>) -> Result<Json<Value>, AppError> {
        match &result {
            Ok(_) => self.metrics.answered(endpoint, StatusCode::OK),
            Err(e) if e.is_client_error() => {
                tracing::warn!("Rejected /{}: {}", endpoint, e);
                self.metrics.answered(endpoint, e.status());
            }
            Err(e) => {
                tracing::error!("Error in /{}: {}", endpoint, e);
                self.metrics.answered(endpoint, e.status());
            }
        }

        result.map(Json)
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_origin(Any);

    Router::new()
        .route("/", get(root))
        .route("/full/:id", get(full))
        .route("/collectibles/:id", get(collectibles))
        .route("/badges/:id", get(badges))
        .route("/items/:id/:asset_type_id", get(items))
        .route("/metrics", get(metrics))
        .layer(cors)
        .with_state(state)
}

fn subject(id: String) -> Result<String, AppError> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::InvalidId(id));
    }

    Ok(id)
}

async fn root() -> &'static str {
    "Flex Proxy running"
}

#[tracing::instrument(skip(state))]
async fn full(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, AppError> {
    let result = full_profile(&state, id).await;
    state.answer("full", result)
}

async fn full_profile(state: &AppState, id: String) -> Result<Value, AppError> {
    let id = subject(id)?;
    let settings = state.settings.load_full();

    let gathered = aggregate::gather(&state.client, settings.clone(), &id).await;
    gathered.assemble(&settings, &id, chrono::Utc::now())
}

/// Strictly paginated listing of a single resource
async fn listing(state: &AppState, role: Role, id: &str) -> Result<Vec<Value>, AppError> {
    let settings = state.settings.load_full();
    let spec = settings
        .resource_with_role(role)
        .ok_or_else(|| AppError::Internal(format!("no {role:?} resource configured")))?;
    let url = settings.resource_url(spec, id);

    let items = state
        .client
        .fetch_paged(
            &spec.name,
            |cursor| fetch::with_cursor(&url, cursor),
            PageMode::Strict,
            settings.max_pages,
        )
        .await?;

    Ok(items)
}

#[tracing::instrument(skip(state))]
async fn collectibles(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let result = collectibles_summary(&state, id).await;
    state.answer("collectibles", result)
}

async fn collectibles_summary(state: &AppState, id: String) -> Result<Value, AppError> {
    let id = subject(id)?;
    let items = listing(state, Role::Collectibles, &id).await?;
    let rap = value::total_value(&items);

    Ok(json!({ "count": items.len(), "rap": rap, "collectibles": items }))
}

#[tracing::instrument(skip(state))]
async fn badges(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, AppError> {
    let result = badges_summary(&state, id).await;
    state.answer("badges", result)
}

async fn badges_summary(state: &AppState, id: String) -> Result<Value, AppError> {
    let id = subject(id)?;
    let items = listing(state, Role::Badges, &id).await?;

    Ok(json!({ "count": items.len(), "badges": items }))
}

#[tracing::instrument(skip(state))]
async fn items(
    State(state): State<AppState>,
    Path((id, asset_type_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let result = inventory_items(&state, id, asset_type_id).await;
    state.answer("items", result)
}

async fn inventory_items(
    state: &AppState,
    id: String,
    asset_type_id: String,
) -> Result<Value, AppError> {
    let id = subject(id)?;
    let asset_type: u32 = asset_type_id
        .parse()
        .map_err(|_| AppError::InvalidAssetType(asset_type_id))?;

    let settings = state.settings.load_full();
    let url = settings.inventory_url(&id, asset_type);
    let category = settings.category_name(asset_type).map(str::to_owned);
    let resource = match &category {
        Some(c) => format!("inventory:{c}"),
        None => format!("inventory:{asset_type}"),
    };

    let items = state
        .client
        .fetch_paged(
            &resource,
            |cursor| fetch::with_cursor(&url, cursor),
            PageMode::Strict,
            settings.max_pages,
        )
        .await?;

    Ok(json!({
        "assetTypeId": asset_type,
        "category": category,
        "count": items.len(),
        "items": items,
    }))
}

#[tracing::instrument(skip(state))]
async fn metrics(State(state): State<AppState>) -> String {
    tracing::trace!("Getting metrics");

    let encoder = prometheus::TextEncoder::new();
    let metrics_families = state.registry.gather();
    match encoder.encode_to_string(&metrics_families) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("Encoding Metrics {:?}", e);

            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_ids_are_numeric() {
        assert_eq!(subject("156".to_string()).unwrap(), "156");
        assert!(matches!(subject("".to_string()), Err(AppError::InvalidId(_))));
        assert!(matches!(subject("12a".to_string()), Err(AppError::InvalidId(_))));
        assert!(matches!(subject("-1".to_string()), Err(AppError::InvalidId(_))));
    }
}
