#![allow(dead_code)]

use std::{
    collections::HashMap,
    net::TcpListener,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::IntoResponse,
    Json, Router,
};
use serde_json::Value;

/// Canned upstream that answers by path and `cursor` query parameter
#[derive(Default)]
pub struct Fixture {
    pages: HashMap<(String, String), (StatusCode, Value)>,
    delays: HashMap<String, Duration>,
    hits: Mutex<Vec<String>>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(self, path: &str, body: Value) -> Self {
        self.page(path, "", body)
    }

    pub fn page(mut self, path: &str, cursor: &str, body: Value) -> Self {
        self.pages
            .insert((path.to_string(), cursor.to_string()), (StatusCode::OK, body));
        self
    }

    pub fn fail(mut self, path: &str, cursor: &str, status: StatusCode) -> Self {
        self.pages.insert(
            (path.to_string(), cursor.to_string()),
            (status, serde_json::json!({ "errors": [{ "code": 0, "message": "nope" }] })),
        );
        self
    }

    /// Answers `path` with `body` only after `delay`
    pub fn slow(mut self, path: &str, body: Value, delay: Duration) -> Self {
        self.delays.insert(path.to_string(), delay);
        self.json(path, body)
    }

    /// Starts serving on an ephemeral port and returns the base url
    pub fn serve(self) -> (String, Arc<Fixture>) {
        let fixture = Arc::new(self);

        let app = Router::new()
            .fallback(respond)
            .with_state(fixture.clone());

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service());
        tokio::spawn(server);

        (format!("http://{addr}"), fixture)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.as_str() == path)
            .count()
    }
}

async fn respond(
    State(fixture): State<Arc<Fixture>>,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let path = uri.path().to_string();
    fixture.hits.lock().unwrap().push(path.clone());

    if let Some(delay) = fixture.delays.get(&path) {
        tokio::time::sleep(*delay).await;
    }

    let cursor = query.get("cursor").cloned().unwrap_or_default();
    match fixture.pages.get(&(path, cursor)) {
        Some((status, body)) => (*status, Json(body.clone())),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "errors": [{ "code": 404, "message": "NotFound" }] })),
        ),
    }
}

pub fn client() -> flex_proxy::Client {
    flex_proxy::Client::new(
        std::time::Duration::from_secs(5),
        flex_proxy::Metrics::unregistered(),
    )
    .unwrap()
}
