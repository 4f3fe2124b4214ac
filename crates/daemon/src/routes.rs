//! Route handlers for the HTTP surface.

use actix_multipart::Multipart;
use actix_web::{HttpRequest, HttpResponse, web};
use futures::StreamExt;
use memcore::{FileDescriptor, Tags};
use search::AskOptions;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::check as check_auth;
use crate::error::DaemonError;
use crate::state::AppState;
use crate::types::{
  AskRequest, DataPipelineStatus, DocumentQuery, IndexQuery, SearchRequest, UploadAccepted, UploadStatusQuery,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
  cfg
    .route("/", web::get().to(liveness))
    .route("/health", web::get().to(health))
    .route("/upload", web::post().to(upload))
    .route("/upload-status", web::get().to(upload_status))
    .route("/indexes", web::get().to(list_indexes))
    .route("/indexes", web::delete().to(delete_index))
    .route("/documents", web::delete().to(delete_document))
    .route("/ask", web::post().to(ask))
    .route("/search", web::post().to(search));
}

async fn liveness(state: web::Data<AppState>) -> HttpResponse {
  HttpResponse::Ok().json(serde_json::json!({
    "service": "ccmemory",
    "version": env!("CARGO_PKG_VERSION"),
    "uptime_secs": state.uptime_secs(),
  }))
}

async fn health() -> HttpResponse {
  HttpResponse::Ok().finish()
}

struct ParsedUpload {
  index: String,
  document_id: String,
  tags: Tags,
  steps: Option<Vec<String>>,
  files: Vec<(FileDescriptor, Vec<u8>)>,
}

async fn parse_upload(mut payload: Multipart) -> Result<ParsedUpload, DaemonError> {
  let mut index = None;
  let mut document_id = None;
  let mut tag_pairs = Vec::new();
  let mut steps = None;
  let mut files = Vec::new();

  while let Some(item) = payload.next().await {
    let mut field = item.map_err(|e| DaemonError::BadRequest(e.to_string()))?;
    let disposition = field.content_disposition().cloned();
    let name = disposition.as_ref().and_then(|cd| cd.get_name()).unwrap_or_default().to_string();
    let filename = disposition.as_ref().and_then(|cd| cd.get_filename()).map(|s| s.to_string());
    let mime_type = field.content_type().map(|m| m.essence_str().to_string());

    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
      let chunk = chunk.map_err(|e| DaemonError::BadRequest(e.to_string()))?;
      bytes.extend_from_slice(&chunk);
    }

    if let Some(filename) = filename {
      let mime_type = mime_type.unwrap_or_else(|| extract::mime_for_name(&filename).to_string());
      files.push((FileDescriptor::new(filename, &bytes, mime_type), bytes));
      continue;
    }

    let value = String::from_utf8(bytes).map_err(|e| DaemonError::BadRequest(e.to_string()))?;
    match name.as_str() {
      "index" => index = Some(value),
      "documentId" => document_id = Some(value),
      "tags" | "tags[]" => {
        if let Some((k, v)) = value.split_once('=') {
          tag_pairs.push((k.to_string(), v.to_string()));
        }
      }
      "steps" | "steps[]" => steps.get_or_insert_with(Vec::new).push(value),
      _ => {}
    }
  }

  let index = index.ok_or_else(|| DaemonError::BadRequest("missing 'index' field".to_string()))?;
  if files.is_empty() {
    return Err(DaemonError::BadRequest("upload must include at least one file".to_string()));
  }

  let tags = Tags::from_pairs(tag_pairs)?;
  let document_id = document_id.unwrap_or_else(|| Uuid::new_v4().to_string());

  Ok(ParsedUpload { index, document_id, tags, steps, files })
}

async fn upload(req: HttpRequest, state: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, DaemonError> {
  check_auth(&req, &state.http_config)?;
  let parsed = parse_upload(payload).await?;
  let steps = parsed.steps.unwrap_or_else(|| pipeline::handlers::DEFAULT_STEPS.iter().map(|s| s.to_string()).collect());

  let index = parsed.index.clone();
  let document_id = parsed.document_id.clone();
  let orchestrator = state.orchestrator.clone();

  tokio::spawn(async move {
    if let Err(err) =
      orchestrator.import_document(&parsed.index, &parsed.document_id, parsed.tags, steps, parsed.files).await
    {
      warn!(index = %parsed.index, document_id = %parsed.document_id, %err, "background ingestion failed");
    } else {
      info!(index = %index, document_id = %document_id, "background ingestion completed");
    }
  });

  Ok(HttpResponse::Accepted().json(UploadAccepted {
    document_id: parsed.document_id,
    index: parsed.index,
    message: "upload accepted, poll /upload-status for progress".to_string(),
  }))
}

async fn upload_status(
  req: HttpRequest,
  state: web::Data<AppState>,
  query: web::Query<UploadStatusQuery>,
) -> Result<HttpResponse, DaemonError> {
  check_auth(&req, &state.http_config)?;
  let pipeline = state.orchestrator.read_pipeline_status(&query.index, &query.document_id).await?;
  match pipeline {
    Some(p) => Ok(HttpResponse::Ok().json(DataPipelineStatus::from(&p))),
    None => Err(DaemonError::NotFound { item_type: "pipeline", id: format!("{}/{}", query.index, query.document_id) }),
  }
}

async fn list_indexes(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, DaemonError> {
  check_auth(&req, &state.http_config)?;
  let indexes = state.search.list_indexes().await?;
  Ok(HttpResponse::Ok().json(indexes))
}

async fn delete_index(
  req: HttpRequest,
  state: web::Data<AppState>,
  query: web::Query<IndexQuery>,
) -> Result<HttpResponse, DaemonError> {
  check_auth(&req, &state.http_config)?;
  let orchestrator = state.orchestrator.clone();
  let index = query.index.clone();
  tokio::spawn(async move {
    if let Err(err) = orchestrator.start_index_deletion(&index).await {
      warn!(index = %index, %err, "background index deletion failed");
    }
  });
  Ok(HttpResponse::Accepted().finish())
}

async fn delete_document(
  req: HttpRequest,
  state: web::Data<AppState>,
  query: web::Query<DocumentQuery>,
) -> Result<HttpResponse, DaemonError> {
  check_auth(&req, &state.http_config)?;
  let orchestrator = state.orchestrator.clone();
  let index = query.index.clone();
  let document_id = query.document_id.clone();
  tokio::spawn(async move {
    if let Err(err) = orchestrator.start_document_deletion(&index, &document_id).await {
      warn!(index = %index, document_id = %document_id, %err, "background document deletion failed");
    }
  });
  Ok(HttpResponse::Accepted().finish())
}

async fn ask(req: HttpRequest, state: web::Data<AppState>, body: web::Json<AskRequest>) -> Result<HttpResponse, DaemonError> {
  check_auth(&req, &state.http_config)?;
  let mut options = AskOptions::default();
  if let Some(min_relevance) = body.min_relevance {
    options.min_relevance = min_relevance;
  }
  let answer = state.search.ask(&body.index, &body.question, &body.filters, &options).await?;
  Ok(HttpResponse::Ok().json(answer))
}

async fn search(
  req: HttpRequest,
  state: web::Data<AppState>,
  body: web::Json<SearchRequest>,
) -> Result<HttpResponse, DaemonError> {
  check_auth(&req, &state.http_config)?;
  let min_relevance = body.min_relevance.unwrap_or(0.0);
  let limit = body.limit.unwrap_or(100);
  let result = state.search.search(&body.index, &body.query, &body.filters, min_relevance, limit).await?;
  Ok(HttpResponse::Ok().json(result))
}
