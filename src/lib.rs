//! Read-only proxy that combines a gaming platform's public profile, social,
//! inventory and badge APIs into a single JSON document per user.
//!
//! Every request fans out to all configured upstream resources at once. A
//! failing resource is replaced by its safe default (`null`, `0` or `[]`) and
//! flagged in the `status` map instead of failing the whole response.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod fetch;
pub mod labels;
pub mod metrics;
pub mod routes;
pub mod value;

pub use config::Settings;
pub use fetch::{Client, PageMode};
pub use metrics::Metrics;
pub use routes::{router, AppState};
