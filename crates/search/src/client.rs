//! `SearchClient`: embeds a query, ranks against a `VectorStore`, and (for
//! `ask`) packs the results into a token-budgeted prompt for a
//! `TextGenerator`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use db::{ScoredRecord, VectorStore};
use embedding::EmbeddingProvider;
use extract::count_tokens;
use futures::StreamExt;
use llm::{ContentModerator, GenerationRequest, StreamState, TextGenerator};
use memcore::{Citation, CitationPartition, TAG_DOCUMENT_ID, TAG_FILE_ID};
use uuid::Uuid;

use crate::error::SearchError;
use crate::types::{IndexDetails, MemoryAnswer, ResultKind, SearchResult, TokenUsage};

const DEFAULT_ANSWER_PROMPT: &str =
  "Facts:\n{{$facts}}\n\nGiven only the facts above, answer the following question.\nIf the answer isn't in the facts, reply exactly with: {{$notFound}}\n\nQuestion: {{$input}}";
const DEFAULT_FACT_TEMPLATE: &str = "==== [File:{{$source}}; Relevance:{{$relevance}}]:\n{{$content}}\n";
const DEFAULT_EMPTY_ANSWER: &str = "INFO NOT FOUND";

pub struct AskOptions {
  pub min_relevance: f32,
  pub max_matches_count: usize,
  pub max_ask_prompt_size: usize,
  pub answer_max_tokens: usize,
  pub temperature: f32,
  pub top_p: f32,
}

impl Default for AskOptions {
  fn default() -> Self {
    Self {
      min_relevance: 0.0,
      max_matches_count: 100,
      max_ask_prompt_size: 4096,
      answer_max_tokens: 1024,
      temperature: 0.0,
      top_p: 1.0,
    }
  }
}

pub struct SearchClient {
  vector_store: Arc<dyn VectorStore>,
  embedder: Arc<dyn EmbeddingProvider>,
  generator: Arc<dyn TextGenerator>,
  moderator: Arc<dyn ContentModerator>,
  moderate_answers: bool,
}

impl SearchClient {
  pub fn new(
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn TextGenerator>,
    moderator: Arc<dyn ContentModerator>,
    moderate_answers: bool,
  ) -> Self {
    Self { vector_store, embedder, generator, moderator, moderate_answers }
  }

  pub async fn list_indexes(&self) -> Result<Vec<IndexDetails>, SearchError> {
    Ok(self.vector_store.list_indexes().await?.into_iter().map(|name| IndexDetails { name }).collect())
  }

  /// If `query` is empty and filters are present, degrade to a filter-only
  /// listing (an all-zero query vector so relevance ranking is a no-op and
  /// every match above `min_relevance=0` is returned in storage order).
  pub async fn search(
    &self,
    index: &str,
    query: &str,
    filters: &[(String, String)],
    min_relevance: f32,
    limit: usize,
  ) -> Result<SearchResult, SearchError> {
    let scored = if query.trim().is_empty() && !filters.is_empty() {
      let zero_vector = vec![0.0f32; self.embedder.dimensions()];
      self.vector_store.search(index, &zero_vector, limit, filters, 0.0).await?
    } else {
      let query_vector = self.embedder.embed(query).await?;
      self.vector_store.search(index, &query_vector, limit, filters, min_relevance).await?
    };

    if scored.is_empty() {
      return Ok(SearchResult::empty(query, "no matches found"));
    }

    let citations = group_into_citations(index, &scored);
    Ok(SearchResult { query: query.to_string(), results: citations, no_result: false, no_result_reason: None })
  }

  pub async fn ask(
    &self,
    index: &str,
    question: &str,
    filters: &[(String, String)],
    options: &AskOptions,
  ) -> Result<MemoryAnswer, SearchError> {
    let mut answer = None;
    let mut stream = self.ask_stream(index, question, filters, options).await?;
    while let Some(next) = stream.next().await {
      answer = Some(next?);
    }
    Ok(answer.expect("ask_stream always yields at least one snapshot"))
  }

  /// Streaming `Ask`: yields progressive `MemoryAnswer` snapshots, each a
  /// superset of the text so far, `Append`-tagged until the final one,
  /// which carries the full text and `Reset`.
  pub async fn ask_stream(
    &self,
    index: &str,
    question: &str,
    filters: &[(String, String)],
    options: &AskOptions,
  ) -> Result<futures::stream::BoxStream<'static, Result<MemoryAnswer, SearchError>>, SearchError> {
    let question = ensure_trailing_question_mark(question);

    let base_tokens = count_tokens(DEFAULT_ANSWER_PROMPT) + count_tokens(&question) + options.answer_max_tokens;
    let budget = options.max_ask_prompt_size.saturating_sub(base_tokens);

    let query_vector = self.embedder.embed(&question).await?;
    let scored =
      self.vector_store.search(index, &query_vector, options.max_matches_count, filters, options.min_relevance).await?;

    if scored.is_empty() {
      let snapshot = MemoryAnswer::no_facts(question, DEFAULT_EMPTY_ANSWER);
      return Ok(Box::pin(futures::stream::once(async move { Ok(snapshot) })));
    }

    let (facts, citations, used_any) = pack_facts(&scored, index, budget);
    if !used_any {
      let snapshot = MemoryAnswer::insufficient_tokens(question, DEFAULT_EMPTY_ANSWER);
      return Ok(Box::pin(futures::stream::once(async move { Ok(snapshot) })));
    }

    let prompt = DEFAULT_ANSWER_PROMPT
      .replace("{{$facts}}", &facts)
      .replace("{{$input}}", &question)
      .replace("{{$notFound}}", DEFAULT_EMPTY_ANSWER);
    let prompt_tokens = count_tokens(&prompt);

    let request = GenerationRequest {
      prompt,
      system_prompt: None,
      max_tokens: options.answer_max_tokens,
      temperature: options.temperature,
      top_p: options.top_p,
    };

    let generator = self.generator.clone();
    let moderator = self.moderator.clone();
    let moderate_answers = self.moderate_answers;

    let token_stream = generator.generate_stream(request).await?;
    let stream = token_stream.scan(String::new(), move |accumulated, chunk| {
      let citations = citations.clone();
      let question = question.clone();
      let moderator = moderator.clone();
      async move {
        let chunk = match chunk {
          Ok(chunk) => chunk,
          Err(err) => return Some(Err(SearchError::from(err))),
        };
        accumulated.push_str(&chunk.text);

        if chunk.state != StreamState::Reset {
          // Intermediate snapshot: provisional text, no moderation pass yet.
          return Some(Ok(MemoryAnswer {
            question: question.clone(),
            text: accumulated.clone(),
            result_kind: ResultKind::Success,
            citations,
            token_usage: TokenUsage { prompt_tokens, completion_tokens: count_tokens(accumulated) },
            stream_state: StreamState::Append,
          }));
        }

        Some(final_snapshot(&question, accumulated, citations, prompt_tokens, moderate_answers, moderator.as_ref()).await)
      }
    });

    Ok(Box::pin(stream))
  }
}

async fn final_snapshot(
  question: &str,
  accumulated: &str,
  citations: Vec<Citation>,
  prompt_tokens: usize,
  moderate_answers: bool,
  moderator: &dyn ContentModerator,
) -> Result<MemoryAnswer, SearchError> {
  let trimmed = accumulated.trim();
  if trimmed.is_empty() || equal_modulo_punctuation(trimmed, DEFAULT_EMPTY_ANSWER) {
    return Ok(MemoryAnswer::no_facts(question, DEFAULT_EMPTY_ANSWER));
  }

  if moderate_answers {
    let verdict = moderator.moderate(trimmed).await?;
    if !verdict.is_safe {
      return Ok(MemoryAnswer::unsafe_answer(question, "This answer was withheld by content moderation.", citations));
    }
  }

  Ok(MemoryAnswer {
    question: question.to_string(),
    text: accumulated.to_string(),
    result_kind: ResultKind::Success,
    citations,
    token_usage: TokenUsage { prompt_tokens, completion_tokens: count_tokens(accumulated) },
    stream_state: StreamState::Reset,
  })
}

fn ensure_trailing_question_mark(question: &str) -> String {
  let trimmed = question.trim();
  if trimmed.ends_with('?') { trimmed.to_string() } else { format!("{trimmed}?") }
}

fn equal_modulo_punctuation(a: &str, b: &str) -> bool {
  let strip = |s: &str| s.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase();
  strip(a) == strip(b)
}

/// Render facts in descending relevance order until one doesn't fit the
/// remaining token budget, then stop (never skip-and-continue). Returns the
/// rendered fact block, the citations for everything that made it in, and
/// whether at least one fact was used.
fn pack_facts(scored: &[ScoredRecord], index: &str, budget: usize) -> (String, Vec<Citation>, bool) {
  let mut facts = String::new();
  let mut remaining = budget;
  let mut seen_content = HashSet::new();
  let mut used = Vec::new();

  for hit in scored {
    let text = hit.record.payload.get("text").and_then(|v| v.as_str()).unwrap_or_default();
    if text.is_empty() || !seen_content.insert(content_hash(text)) {
      continue;
    }

    let source = hit.record.payload.get("file_name").and_then(|v| v.as_str()).unwrap_or("unknown");
    let fact = DEFAULT_FACT_TEMPLATE
      .replace("{{$source}}", source)
      .replace("{{$relevance}}", &format!("{:.3}", hit.relevance))
      .replace("{{$content}}", text);

    if count_tokens(&fact) > remaining {
      break;
    }

    remaining = remaining.saturating_sub(count_tokens(&fact));
    facts.push_str(&fact);
    used.push(hit.clone());
  }

  let citations = group_into_citations(index, &used);
  let used_any = !used.is_empty();
  (facts, citations, used_any)
}

fn content_hash(text: &str) -> u64 {
  use std::hash::{Hash, Hasher};
  let mut hasher = std::collections::hash_map::DefaultHasher::new();
  text.hash(&mut hasher);
  hasher.finish()
}

/// Group scored records by `(index, documentId, fileId)` into `Citation`
/// rows, each carrying the matching partitions in descending relevance
/// order (the order `scored` is already sorted in).
fn group_into_citations(index: &str, scored: &[ScoredRecord]) -> Vec<Citation> {
  let mut citations: Vec<Citation> = Vec::new();

  for (i, hit) in scored.iter().enumerate() {
    let document_id = hit.record.tags.values(TAG_DOCUMENT_ID).first().cloned().unwrap_or_default();
    let file_id = hit
      .record
      .tags
      .values(TAG_FILE_ID)
      .first()
      .and_then(|s| Uuid::parse_str(s).ok())
      .unwrap_or(Uuid::nil());
    let source_name = hit.record.payload.get("file_name").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
    let partition_number =
      hit.record.payload.get("partition_number").and_then(|v| v.as_u64()).unwrap_or(i as u64) as usize;
    let text = hit.record.payload.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string();

    let partition = CitationPartition {
      text,
      relevance: hit.relevance,
      partition_number,
      section_number: 0,
      last_update: Utc::now(),
      tags: hit.record.tags.clone(),
    };

    if let Some(existing) =
      citations.iter_mut().find(|c| c.index == index && c.document_id == document_id && c.file_id == file_id)
    {
      existing.partitions.push(partition);
    } else {
      citations.push(Citation {
        index: index.to_string(),
        document_id,
        file_id,
        link: format!("{index}/{document_id}/{source_name}"),
        source_name,
        source_url: None,
        content_type: "text/plain".to_string(),
        partitions: vec![partition],
      });
    }
  }

  citations
}
