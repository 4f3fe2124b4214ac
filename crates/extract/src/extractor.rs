//! Per-MIME-type text extractors. Every extractor turns raw bytes into
//! plain text that the partitioner can chunk; none of them do layout
//! analysis beyond what their format trivially gives for free.

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
  #[error("unsupported mime type: {0}")]
  UnsupportedMime(String),
  #[error("content is not valid UTF-8: {0}")]
  InvalidUtf8(#[from] std::string::FromUtf8Error),
  #[error("malformed content: {0}")]
  Malformed(String),
}

pub trait Extractor: Send + Sync {
  fn supports(&self, mime_type: &str) -> bool;
  fn extract(&self, content: &[u8]) -> Result<String, ExtractError>;
}

#[derive(Debug, Default)]
pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
  fn supports(&self, mime_type: &str) -> bool {
    matches!(mime_type, "text/plain" | "text/plain-markdown")
  }

  fn extract(&self, content: &[u8]) -> Result<String, ExtractError> {
    Ok(String::from_utf8(content.to_vec())?)
  }
}

#[derive(Debug, Default)]
pub struct JsonExtractor;

impl Extractor for JsonExtractor {
  fn supports(&self, mime_type: &str) -> bool {
    mime_type == "application/json"
  }

  fn extract(&self, content: &[u8]) -> Result<String, ExtractError> {
    let text = String::from_utf8(content.to_vec())?;
    let value: serde_json::Value =
      serde_json::from_str(&text).map_err(|e| ExtractError::Malformed(e.to_string()))?;
    serde_json::to_string_pretty(&value).map_err(|e| ExtractError::Malformed(e.to_string()))
  }
}

/// Strips tags and collapses whitespace. Not a real HTML parser: good
/// enough for extracting readable text, not for preserving structure.
#[derive(Debug, Default)]
pub struct HtmlExtractor;

impl Extractor for HtmlExtractor {
  fn supports(&self, mime_type: &str) -> bool {
    mime_type == "text/html"
  }

  fn extract(&self, content: &[u8]) -> Result<String, ExtractError> {
    let html = String::from_utf8(content.to_vec())?;
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut in_script_or_style = false;
    let mut tag_buf = String::new();

    for c in html.chars() {
      match c {
        '<' => {
          in_tag = true;
          tag_buf.clear();
        }
        '>' if in_tag => {
          in_tag = false;
          let lower = tag_buf.to_lowercase();
          if lower.starts_with("script") || lower.starts_with("style") {
            in_script_or_style = !lower.starts_with('/');
          } else if lower.starts_with("/script") || lower.starts_with("/style") {
            in_script_or_style = false;
          }
        }
        _ if in_tag => tag_buf.push(c),
        _ if in_script_or_style => {}
        _ => text.push(c),
      }
    }

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(collapsed)
  }
}

/// Placeholder for formats that require a dedicated decoder (PDF, DOCX,
/// image OCR). Always fails with `UnsupportedMime`; wiring in a real
/// decoder is future work, not part of this pipeline's scope.
#[derive(Debug)]
pub struct UnsupportedExtractor {
  mime_types: Vec<String>,
}

impl UnsupportedExtractor {
  pub fn new(mime_types: Vec<String>) -> Self {
    Self { mime_types }
  }
}

impl Extractor for UnsupportedExtractor {
  fn supports(&self, mime_type: &str) -> bool {
    self.mime_types.iter().any(|m| m == mime_type)
  }

  fn extract(&self, _content: &[u8]) -> Result<String, ExtractError> {
    Err(ExtractError::UnsupportedMime(self.mime_types.first().cloned().unwrap_or_default()))
  }
}

/// Dispatches to the first registered extractor that supports a MIME type.
pub struct ExtractorRegistry {
  extractors: Vec<Box<dyn Extractor>>,
}

impl Default for ExtractorRegistry {
  fn default() -> Self {
    Self {
      extractors: vec![
        Box::new(PlainTextExtractor),
        Box::new(JsonExtractor),
        Box::new(HtmlExtractor),
        Box::new(UnsupportedExtractor::new(vec![
          "application/pdf".to_string(),
          "application/vnd.openxmlformats-officedocument.wordprocessingml.document".to_string(),
          "image/png".to_string(),
          "image/jpeg".to_string(),
        ])),
      ],
    }
  }
}

impl ExtractorRegistry {
  pub fn extract(&self, mime_type: &str, content: &[u8]) -> Result<String, ExtractError> {
    self
      .extractors
      .iter()
      .find(|e| e.supports(mime_type))
      .ok_or_else(|| ExtractError::UnsupportedMime(mime_type.to_string()))?
      .extract(content)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strips_tags_and_scripts() {
    let html = b"<html><head><style>.a{}</style></head><body><p>Hello <b>world</b></p><script>evil()</script></body></html>";
    let extracted = HtmlExtractor.extract(html).unwrap();
    assert_eq!(extracted, "Hello world");
  }

  #[test]
  fn registry_dispatches_by_mime() {
    let registry = ExtractorRegistry::default();
    assert_eq!(registry.extract("text/plain", b"hi").unwrap(), "hi");
    assert!(matches!(registry.extract("application/pdf", b"%PDF"), Err(ExtractError::UnsupportedMime(_))));
  }

  #[test]
  fn json_extractor_pretty_prints() {
    let registry = ExtractorRegistry::default();
    let extracted = registry.extract("application/json", br#"{"a":1}"#).unwrap();
    assert!(extracted.contains('\n'));
  }
}
