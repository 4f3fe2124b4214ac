//! In-process FIFO queue per pipeline step, standing in for a real message
//! broker when the queue-backed orchestrator runs without one configured.
//!
//! Each step gets its own queue. A dequeued message is invisible to other
//! consumers for `visibility_timeout`; if nobody acks it in that window, a
//! background sweep makes it visible again. A message that fails
//! `max_attempts` times lands in the dead-letter list instead of being
//! requeued again.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
  pub index: String,
  pub document_id: String,
  pub attempts: u32,
}

impl QueueMessage {
  pub fn new(index: impl Into<String>, document_id: impl Into<String>) -> Self {
    Self { index: index.into(), document_id: document_id.into(), attempts: 0 }
  }
}

struct InFlight {
  message: QueueMessage,
  visible_at: Instant,
}

struct StepQueue {
  ready: VecDeque<QueueMessage>,
  in_flight: Vec<InFlight>,
  dead_letter: Vec<QueueMessage>,
}

impl StepQueue {
  fn new() -> Self {
    Self { ready: VecDeque::new(), in_flight: Vec::new(), dead_letter: Vec::new() }
  }

  /// Move any in-flight message whose visibility timeout elapsed back onto
  /// the ready queue.
  fn reap_expired(&mut self) {
    let now = Instant::now();
    let mut expired = Vec::new();
    self.in_flight.retain(|entry| {
      if entry.visible_at <= now {
        expired.push(entry.message.clone());
        false
      } else {
        true
      }
    });
    for message in expired {
      self.ready.push_back(message);
    }
  }
}

/// A handle returned by `dequeue`, acked or nacked by the caller once the
/// step's handler has run.
pub struct Lease {
  pub message: QueueMessage,
}

#[derive(Clone)]
pub struct QueueAdapter {
  step: Arc<Mutex<StepQueue>>,
  notify: Arc<Notify>,
  visibility_timeout: Duration,
  max_attempts: u32,
}

impl QueueAdapter {
  pub fn new(visibility_timeout: Duration, max_attempts: u32) -> Self {
    Self {
      step: Arc::new(Mutex::new(StepQueue::new())),
      notify: Arc::new(Notify::new()),
      visibility_timeout,
      max_attempts,
    }
  }

  pub async fn enqueue(&self, message: QueueMessage) {
    self.step.lock().await.ready.push_back(message);
    self.notify.notify_one();
  }

  /// Wait for and lease the next ready message, hiding it from other
  /// consumers for `visibility_timeout`.
  pub async fn dequeue(&self) -> Lease {
    loop {
      {
        let mut queue = self.step.lock().await;
        queue.reap_expired();
        if let Some(message) = queue.ready.pop_front() {
          queue.in_flight.push(InFlight { message: message.clone(), visible_at: Instant::now() + self.visibility_timeout });
          return Lease { message };
        }
      }
      self.notify.notified().await;
    }
  }

  pub async fn ack(&self, message: &QueueMessage) {
    let mut queue = self.step.lock().await;
    queue.in_flight.retain(|entry| entry.message.document_id != message.document_id || entry.message.index != message.index);
  }

  /// Report a failed processing attempt. Requeues with an incremented
  /// attempt count, or moves to the dead-letter list past `max_attempts`.
  pub async fn nack(&self, mut message: QueueMessage) {
    let mut queue = self.step.lock().await;
    queue.in_flight.retain(|entry| entry.message.document_id != message.document_id || entry.message.index != message.index);

    message.attempts += 1;
    if message.attempts >= self.max_attempts {
      warn!(index = %message.index, document_id = %message.document_id, attempts = message.attempts, "message moved to dead letter");
      queue.dead_letter.push(message);
    } else {
      queue.ready.push_back(message);
      drop(queue);
      self.notify.notify_one();
    }
  }

  pub async fn dead_letters(&self) -> Vec<QueueMessage> {
    self.step.lock().await.dead_letter.clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn enqueue_then_dequeue_round_trips() {
    let queue = QueueAdapter::new(Duration::from_secs(30), 5);
    queue.enqueue(QueueMessage::new("idx", "doc1")).await;
    let lease = queue.dequeue().await;
    assert_eq!(lease.message.document_id, "doc1");
    queue.ack(&lease.message).await;
  }

  #[tokio::test]
  async fn nack_requeues_until_max_attempts_then_dead_letters() {
    let queue = QueueAdapter::new(Duration::from_secs(30), 2);
    queue.enqueue(QueueMessage::new("idx", "doc1")).await;

    let lease = queue.dequeue().await;
    queue.nack(lease.message).await;

    let lease = queue.dequeue().await;
    assert_eq!(lease.message.attempts, 1);
    queue.nack(lease.message).await;

    assert_eq!(queue.dead_letters().await.len(), 1);
  }

  #[tokio::test]
  async fn expired_in_flight_message_becomes_visible_again() {
    let queue = QueueAdapter::new(Duration::from_millis(10), 5);
    queue.enqueue(QueueMessage::new("idx", "doc1")).await;
    let lease = queue.dequeue().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    // simulate a sweep by dequeuing again without acking the first lease
    drop(lease);
    let lease = queue.dequeue().await;
    assert_eq!(lease.message.document_id, "doc1");
  }
}
