//! Shared application state handed to every route handler.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use memcore::config::HttpConfig;
use pipeline::InProcessOrchestrator;
use search::SearchClient;

pub struct AppState {
  pub orchestrator: Arc<InProcessOrchestrator>,
  pub search: Arc<SearchClient>,
  pub http_config: HttpConfig,
  pub started_at: DateTime<Utc>,
}

impl AppState {
  pub fn new(orchestrator: Arc<InProcessOrchestrator>, search: Arc<SearchClient>, http_config: HttpConfig) -> Self {
    Self { orchestrator, search, http_config, started_at: Utc::now() }
  }

  pub fn uptime_secs(&self) -> i64 {
    (Utc::now() - self.started_at).num_seconds()
  }
}
