use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Failure of a single upstream call
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("sending request: {0}")]
    Request(#[source] reqwest::Error),

    #[error("non success status {0}")]
    Status(reqwest::StatusCode),

    #[error("decoding body: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("building url {0}")]
    Url(String),

    #[error("upstream reported errors: {0}")]
    Upstream(serde_json::Value),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid port {0:?}")]
    Port(String),

    #[error("conflicting names in config: {0}")]
    Conflict(String),
}

#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("registering metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("building http client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("starting runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("serving: {0}")]
    Server(String),
}

/// Errors that escape a handler and end up as the response
#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid user id {0:?}")]
    InvalidId(String),

    #[error("invalid asset type {0:?}")]
    InvalidAssetType(String),

    #[error("user {0} not found")]
    UnknownUser(String),

    #[error("upstream failure: {0}")]
    Upstream(#[from] FetchError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidId(_) | AppError::InvalidAssetType(_) | AppError::UnknownUser(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Upstream(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The caller asked for something that cannot be answered, nothing broke on our side
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
