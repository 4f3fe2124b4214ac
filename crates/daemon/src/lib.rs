//! HTTP surface for the ingestion/retrieval service: upload, status,
//! index/document deletion, ask and search, backed by an in-process
//! `Orchestrator` and `SearchClient`.

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod routes;
pub mod state;
pub mod types;

pub use bootstrap::build;
pub use error::DaemonError;
pub use state::AppState;

use actix_web::{App, HttpServer, web};

/// Bind and run the HTTP server until shut down. `state` is shared across
/// every worker thread behind an `Arc` (actix clones `web::Data` cheaply).
pub async fn serve(state: AppState, bind: &str) -> std::io::Result<()> {
  let data = web::Data::new(state);
  HttpServer::new(move || App::new().app_data(data.clone()).configure(routes::configure)).bind(bind)?.run().await
}
