//! Optional bearer-like access-key check on the configured header.
//!
//! Auth is disabled entirely when no access keys are configured (the
//! default, for local/dev use). Once at least one key is configured, the
//! header is required and must match one of the configured keys — up to
//! two, so a key can be rotated without a downtime window.

use actix_web::HttpRequest;

use crate::error::DaemonError;
use memcore::config::HttpConfig;

pub fn check(req: &HttpRequest, config: &HttpConfig) -> Result<(), DaemonError> {
  if config.access_keys.is_empty() {
    return Ok(());
  }

  let header_value = req
    .headers()
    .get(&config.access_key_header)
    .and_then(|v| v.to_str().ok())
    .ok_or_else(|| DaemonError::MissingAuth(config.access_key_header.clone()))?;

  let presented = header_value.strip_prefix("Bearer ").unwrap_or(header_value);
  if config.access_keys.iter().any(|k| k == presented) {
    Ok(())
  } else {
    Err(DaemonError::InvalidAuth)
  }
}
