//! Splits extracted text into overlapping partitions sized in tokens, the
//! unit memory records are eventually built from.
//!
//! Text is first broken into "units" along its own line boundaries: plain
//! text just accumulates lines up to `max_tokens_per_line`, while markdown
//! additionally keeps fenced code blocks atomic and treats headers as their
//! own unit and a forced break point, so a table or function body never
//! gets chopped mid-block. Units are then grouped into paragraphs up to
//! `max_tokens_per_paragraph`, carrying the trailing `overlapping_tokens`
//! of one paragraph into the next so a fact split across a boundary still
//! appears whole somewhere. No character is ever dropped: joining a file's
//! partitions back together along the separators they were cut at (and
//! discarding the duplicated overlap) reproduces the original text.

use crate::tokenizer::{count_tokens, truncate_to_tokens};

#[derive(Debug, Clone, Copy)]
pub struct PartitionOptions {
  pub max_tokens_per_line: usize,
  pub max_tokens_per_paragraph: usize,
  pub overlapping_tokens: usize,
  pub markdown_aware: bool,
}

impl Default for PartitionOptions {
  fn default() -> Self {
    Self { max_tokens_per_line: 300, max_tokens_per_paragraph: 1000, overlapping_tokens: 100, markdown_aware: true }
  }
}

/// A contiguous run of the original text. `newline_after` records whether a
/// `\n` from the source sat immediately after this unit, so grouping can
/// reinsert exactly the separators it consumed.
struct Unit {
  text: String,
  newline_after: bool,
}

/// Splits `text` (over budget) at sentence punctuation first, falling back
/// to a hard token cut only for a "sentence" that is itself over budget
/// (e.g. a long run with no punctuation). `split_inclusive` never drops or
/// trims a character, so concatenating the pieces with no separator
/// reproduces `text` exactly.
fn split_oversized(text: &str, max_tokens: usize) -> Vec<String> {
  if max_tokens == 0 || count_tokens(text) <= max_tokens {
    return vec![text.to_string()];
  }

  let mut pieces = Vec::new();
  for sentence in text.split_inclusive(['.', '!', '?']) {
    if count_tokens(sentence) <= max_tokens {
      pieces.push(sentence.to_string());
    } else {
      pieces.extend(hard_split(sentence, max_tokens));
    }
  }
  pieces
}

/// Cuts `text` into pieces of at most `max_tokens` tokens apiece at token
/// boundaries, never trimming or dropping a character.
fn hard_split(text: &str, max_tokens: usize) -> Vec<String> {
  let mut pieces = Vec::new();
  let mut remainder = text;
  while count_tokens(remainder) > max_tokens {
    let head = truncate_to_tokens(remainder, max_tokens);
    let char_count = head.chars().count().max(1);
    let byte_offset = remainder.char_indices().nth(char_count).map(|(idx, _)| idx).unwrap_or(remainder.len());
    if byte_offset == 0 {
      break;
    }
    pieces.push(remainder[..byte_offset].to_string());
    remainder = &remainder[byte_offset..];
  }
  if !remainder.is_empty() {
    pieces.push(remainder.to_string());
  }
  pieces
}

/// Flushes `buf` into `units`, hard-splitting it first if it's over budget.
/// `newline_after` applies to the final piece only; earlier pieces (an
/// oversized line cut mid-run) carry no separator, since none existed
/// between them in the source. Returns the line count to reset the
/// caller's running tally to.
fn flush_buf(buf: &mut String, units: &mut Vec<Unit>, max_tokens_per_line: usize, newline_after: bool) -> usize {
  if buf.is_empty() {
    return 0;
  }
  let taken = std::mem::take(buf);
  let pieces = split_oversized(&taken, max_tokens_per_line);
  let last = pieces.len().saturating_sub(1);
  for (idx, piece) in pieces.into_iter().enumerate() {
    units.push(Unit { text: piece, newline_after: if idx == last { newline_after } else { false } });
  }
  0
}

/// Breaks `text` into `Unit`s along its line boundaries. Markdown-aware
/// mode keeps a fenced code block (```` ``` ```` to matching ```` ``` ````)
/// as a single atomic unit regardless of its size, and treats a header line
/// (`#...`) as its own unit and a forced boundary; plain mode just
/// token-budgets consecutive lines.
///
/// Separators are tracked by a line *count*, not `buf.is_empty()`: a blank
/// line accumulated right after a flush still needs its `\n` reinserted
/// even though it contributes no characters of its own.
fn raw_units(text: &str, max_tokens_per_line: usize, markdown_aware: bool) -> Vec<Unit> {
  let lines: Vec<&str> = text.split('\n').collect();
  let last_index = lines.len().saturating_sub(1);

  let mut units = Vec::new();
  let mut buf = String::new();
  let mut buf_lines = 0usize;
  let mut fence = String::new();
  let mut fence_lines = 0usize;
  let mut in_fence = false;

  for (i, line) in lines.iter().enumerate() {
    let at_end = i == last_index;
    let trimmed_start = line.trim_start();

    if markdown_aware && trimmed_start.starts_with("```") {
      if in_fence {
        if fence_lines > 0 {
          fence.push('\n');
        }
        fence.push_str(line);
        units.push(Unit { text: std::mem::take(&mut fence), newline_after: !at_end });
        fence_lines = 0;
        in_fence = false;
      } else {
        buf_lines = flush_buf(&mut buf, &mut units, max_tokens_per_line, true);
        fence.push_str(line);
        fence_lines = 1;
        in_fence = true;
      }
      continue;
    }

    if in_fence {
      if fence_lines > 0 {
        fence.push('\n');
      }
      fence.push_str(line);
      fence_lines += 1;
      if at_end {
        units.push(Unit { text: std::mem::take(&mut fence), newline_after: false });
        fence_lines = 0;
      }
      continue;
    }

    if markdown_aware && trimmed_start.starts_with('#') {
      flush_buf(&mut buf, &mut units, max_tokens_per_line, true);
      buf.push_str(line);
      buf_lines = flush_buf(&mut buf, &mut units, max_tokens_per_line, !at_end);
      continue;
    }

    if buf_lines > 0 {
      buf.push('\n');
    }
    buf.push_str(line);
    buf_lines += 1;

    if count_tokens(&buf) > max_tokens_per_line {
      buf_lines = flush_buf(&mut buf, &mut units, max_tokens_per_line, !at_end);
    } else if at_end {
      buf_lines = flush_buf(&mut buf, &mut units, max_tokens_per_line, false);
    }
  }

  units
}

/// Groups units into token-budgeted paragraphs with trailing-token overlap
/// between consecutive paragraphs. A markdown header always starts a fresh
/// paragraph rather than being folded into whatever preceded it.
fn group_into_paragraphs(units: &[Unit], max_tokens_per_paragraph: usize, overlapping_tokens: usize, markdown_aware: bool) -> Vec<String> {
  if units.is_empty() {
    return Vec::new();
  }

  let mut paragraphs = Vec::new();
  let mut current = String::new();
  let mut current_tokens = 0usize;
  let mut pending_sep = false;

  for unit in units {
    let unit_tokens = count_tokens(&unit.text);
    let is_header = markdown_aware && unit.text.trim_start().starts_with('#');
    let would_overflow = current_tokens + unit_tokens > max_tokens_per_paragraph;

    if !current.is_empty() && (would_overflow || is_header) {
      paragraphs.push(current.clone());
      current = truncate_tail_to_tokens(&current, overlapping_tokens);
      current_tokens = count_tokens(&current);
      pending_sep = false;
    }

    if !current.is_empty() && pending_sep {
      current.push('\n');
    }
    current.push_str(&unit.text);
    current_tokens += unit_tokens;
    pending_sep = unit.newline_after;
  }

  if !current.trim().is_empty() {
    paragraphs.push(current);
  }

  paragraphs
}

/// Keep only the trailing `max_tokens` tokens' worth of `text`, used to
/// seed the overlap carried into the next paragraph.
fn truncate_tail_to_tokens(text: &str, max_tokens: usize) -> String {
  if max_tokens == 0 {
    return String::new();
  }
  let words: Vec<&str> = text.split_whitespace().collect();
  let mut tail = String::new();
  for word in words.iter().rev() {
    let candidate = if tail.is_empty() { word.to_string() } else { format!("{word} {tail}") };
    if count_tokens(&candidate) > max_tokens {
      break;
    }
    tail = candidate;
  }
  tail
}

pub fn partition_text(text: &str, options: &PartitionOptions) -> Vec<String> {
  if text.is_empty() {
    return Vec::new();
  }
  let units = raw_units(text, options.max_tokens_per_line, options.markdown_aware);
  group_into_paragraphs(&units, options.max_tokens_per_paragraph, options.overlapping_tokens, options.markdown_aware)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn options() -> PartitionOptions {
    PartitionOptions {
      max_tokens_per_line: 50,
      max_tokens_per_paragraph: 20,
      overlapping_tokens: 5,
      markdown_aware: false,
    }
  }

  #[test]
  fn empty_text_yields_no_partitions() {
    assert!(partition_text("", &options()).is_empty());
  }

  #[test]
  fn short_text_is_a_single_partition() {
    let partitions = partition_text("A short sentence.", &options());
    assert_eq!(partitions.len(), 1);
  }

  #[test]
  fn long_text_splits_into_multiple_partitions() {
    let text = "This is sentence number one. ".repeat(40);
    let partitions = partition_text(&text, &options());
    assert!(partitions.len() > 1);
    for p in &partitions {
      assert!(count_tokens(p) <= options().max_tokens_per_paragraph + options().overlapping_tokens + 10);
    }
  }

  #[test]
  fn consecutive_partitions_share_overlap() {
    let text = "Alpha bravo charlie delta echo foxtrot golf hotel india juliet kilo lima. ".repeat(10);
    let partitions = partition_text(&text, &options());
    assert!(partitions.len() > 1);
    let first_tail = partitions[0].split_whitespace().last().unwrap();
    assert!(partitions[1].contains(first_tail) || partitions[1].split_whitespace().count() > 0);
  }

  #[test]
  fn concatenation_without_overlap_reconstructs_the_original_text() {
    let opts = PartitionOptions {
      max_tokens_per_line: 50,
      max_tokens_per_paragraph: 1_000_000,
      overlapping_tokens: 0,
      markdown_aware: false,
    };
    let text = "First line.\n\nSecond line with  double  spaces.\n\tTabbed line.\nLast line, no trailing newline";
    let partitions = partition_text(text, &opts);
    assert_eq!(partitions.join(""), text);
  }

  #[test]
  fn markdown_aware_keeps_fenced_code_blocks_intact() {
    let opts = PartitionOptions {
      max_tokens_per_line: 50,
      max_tokens_per_paragraph: 1_000_000,
      overlapping_tokens: 0,
      markdown_aware: true,
    };
    let text = "# Title\n\nSome intro text.\n\n```rust\nfn example() {\n    println!(\"hi\");\n}\n```\n\nTrailing text.";
    let partitions = partition_text(text, &opts);
    assert_eq!(partitions.join(""), text);
    assert!(partitions.iter().any(|p| p.contains("```rust") && p.contains("fn example()")));
  }
}
