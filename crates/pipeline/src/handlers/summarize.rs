use std::sync::Arc;

use async_trait::async_trait;
use db::ContentStore;
use extract::{PartitionOptions, count_tokens, partition_text};
use futures::StreamExt;
use llm::{GenerationRequest, TextGenerator};
use memcore::{ArtifactType, DataPipeline, GeneratedFileDescriptor};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::HandlerError;
use crate::handler::Handler;

pub const STEP_NAME: &str = "summarize";

const SUMMARY_SYSTEM_PROMPT: &str = "Summarize the given document concisely, preserving key facts.";

/// Below this many tokens a document is already short enough that
/// summarizing it would only lose information; it's passed through as-is.
const SKIP_BELOW_TOKENS: usize = 50;

pub struct SummarizeHandler {
  content_store: Arc<dyn ContentStore>,
  generator: Arc<dyn TextGenerator>,
  summary_max_tokens: usize,
}

impl SummarizeHandler {
  pub fn new(content_store: Arc<dyn ContentStore>, generator: Arc<dyn TextGenerator>, summary_max_tokens: usize) -> Self {
    Self { content_store, generator, summary_max_tokens }
  }

  /// Iteratively re-summarizes `text` paragraph-by-paragraph until it fits
  /// in `summary_max_tokens`, per the documented algorithm: split into
  /// `summary_max_tokens/2`-token paragraphs, stream each through the
  /// generator, recount, and fail if the result hasn't shrunk after the
  /// first pass (a runaway generator could otherwise loop forever).
  async fn summarize(&self, text: &str) -> Result<(String, bool), HandlerError> {
    let original_tokens = count_tokens(text);
    if original_tokens < SKIP_BELOW_TOKENS {
      return Ok((text.to_string(), true));
    }

    let paragraph_budget = (self.summary_max_tokens / 2).max(1);
    let options = PartitionOptions {
      max_tokens_per_line: paragraph_budget,
      max_tokens_per_paragraph: paragraph_budget,
      overlapping_tokens: paragraph_budget / 10,
      markdown_aware: false,
    };

    let mut current = text.to_string();
    let mut current_tokens = original_tokens;
    let mut iteration = 0usize;

    loop {
      let paragraphs = partition_text(&current, &options);
      let mut buffer = String::new();

      for paragraph in &paragraphs {
        let request = GenerationRequest {
          prompt: paragraph.clone(),
          system_prompt: Some(SUMMARY_SYSTEM_PROMPT.to_string()),
          max_tokens: self.summary_max_tokens,
          temperature: 0.0,
          top_p: 1.0,
        };
        let mut stream = self.generator.generate_stream(request).await?;
        while let Some(chunk) = stream.next().await {
          buffer.push_str(&chunk?.text);
        }
      }

      let new_tokens = count_tokens(&buffer);
      if iteration > 0 && new_tokens >= current_tokens {
        return Err(HandlerError::SummaryNotShrinking);
      }

      current = buffer;
      current_tokens = new_tokens;
      iteration += 1;

      if current_tokens <= self.summary_max_tokens {
        break;
      }
    }

    Ok((current, false))
  }
}

#[async_trait]
impl Handler for SummarizeHandler {
  fn step_name(&self) -> &'static str {
    STEP_NAME
  }

  async fn invoke(
    &self,
    mut pipeline: DataPipeline,
    cancel: CancellationToken,
  ) -> Result<(bool, DataPipeline), HandlerError> {
    for file_index in 0..pipeline.files.len() {
      let pending: Vec<(uuid::Uuid, String)> = pipeline.files[file_index]
        .artifacts_of_type(ArtifactType::ExtractedText)
        .filter(|a| !a.already_processed_by(STEP_NAME))
        .map(|a| (a.file.id, a.name().to_string()))
        .collect();

      for (parent_id, artifact_name) in pending {
        if cancel.is_cancelled() {
          return Err(HandlerError::Cancelled);
        }

        let content = self
          .content_store
          .read_file(&pipeline.index, &pipeline.document_id, &artifact_name)
          .await
          .map_err(HandlerError::Db)?;
        let text = String::from_utf8_lossy(&content).into_owned();

        let (summary, skipped) = self.summarize(&text).await?;
        debug!(artifact = %artifact_name, skipped, "summarized extracted text");

        let summary_name = format!("{parent_id}.summary.txt");
        self
          .content_store
          .write_file(&pipeline.index, &pipeline.document_id, &summary_name, summary.as_bytes())
          .await
          .map_err(HandlerError::Db)?;

        let artifact = GeneratedFileDescriptor::new(
          summary_name,
          summary.as_bytes(),
          "text/plain",
          parent_id,
          ArtifactType::SyntheticData,
        );
        pipeline.files[file_index].record_artifact(artifact);

        if let Some(extracted) = pipeline.files[file_index].generated_files.get_mut(&artifact_name) {
          extracted.mark_processed_by(STEP_NAME);
        }
      }
    }

    Ok((true, pipeline))
  }
}
