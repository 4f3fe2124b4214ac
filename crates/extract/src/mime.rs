//! Extension-to-MIME lookup for uploaded files. Content sniffing is out of
//! scope; the file name's extension is authoritative.

const MIME_MAP: &[(&str, &str)] = &[
  ("txt", "text/plain"),
  ("md", "text/plain-markdown"),
  ("markdown", "text/plain-markdown"),
  ("json", "application/json"),
  ("html", "text/html"),
  ("htm", "text/html"),
  ("pdf", "application/pdf"),
  ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
  ("png", "image/png"),
  ("jpg", "image/jpeg"),
  ("jpeg", "image/jpeg"),
];

/// Guess a MIME type from a file name's extension, defaulting to
/// `application/octet-stream` when the extension is unknown or absent.
pub fn mime_for_name(name: &str) -> &'static str {
  let ext = name.rsplit('.').next().unwrap_or("").to_lowercase();
  MIME_MAP
    .iter()
    .find(|(known_ext, _)| *known_ext == ext)
    .map(|(_, mime)| *mime)
    .unwrap_or("application/octet-stream")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn recognizes_known_extensions() {
    assert_eq!(mime_for_name("report.PDF"), "application/pdf");
    assert_eq!(mime_for_name("notes.md"), "text/plain-markdown");
  }

  #[test]
  fn falls_back_for_unknown_extensions() {
    assert_eq!(mime_for_name("archive.zip"), "application/octet-stream");
    assert_eq!(mime_for_name("no-extension"), "application/octet-stream");
  }
}
