//! Token counting, shared by the partitioner (chunk sizing) and the search
//! client (prompt budgeting) so both agree on what "a token" is.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

fn encoder() -> &'static CoreBPE {
  static ENCODER: OnceLock<CoreBPE> = OnceLock::new();
  ENCODER.get_or_init(|| tiktoken_rs::cl100k_base().expect("cl100k_base ships its own vocabulary"))
}

pub fn count_tokens(text: &str) -> usize {
  encoder().encode_with_special_tokens(text).len()
}

/// Truncate `text` to at most `max_tokens` tokens, returning the original
/// string unchanged if it already fits.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
  let tokens = encoder().encode_with_special_tokens(text);
  if tokens.len() <= max_tokens {
    return text.to_string();
  }
  encoder().decode(tokens[..max_tokens].to_vec()).unwrap_or_default()
}
