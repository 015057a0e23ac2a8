//! Work queue, cancellation, and progress events for batch runs.
//!
//! std::sync::mpsc channels carry work items to the OCR pool and progress
//! events back to whoever is driving the run.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};

/// One screenshot queued for OCR.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub path: PathBuf,
    /// Position in the batch (0-based), used to match results back up
    pub index: usize,
}

/// Creates the unbounded work queue feeding the OCR pool.
pub fn create_work_queue() -> (Sender<WorkItem>, Receiver<WorkItem>) {
    channel()
}

/// Shared cancellation flag. Cloning hands out another handle to the same
/// flag; workers poll it between items.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Counters reported at the end of a batch run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BatchSummary {
    pub total_files: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub new_questions: usize,
    pub duplicate_questions: usize,
    pub llm_answered: usize,
    pub llm_failed: usize,
}

/// Progress events emitted while a batch runs.
#[derive(Debug)]
pub enum BatchEvent {
    /// Free-form status line
    Status(String),
    /// Files handled so far out of the batch total
    Progress { current: usize, total: usize },
    /// One file finished OCR and parsing
    OcrResult {
        path: PathBuf,
        question_id: Option<i64>,
        success: bool,
    },
    /// One question received an LLM answer
    ApiResult { question_id: i64, answer: String },
    /// A non-fatal failure; the batch continues
    Error(String),
    /// The batch finished
    Complete(BatchSummary),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_queue_preserves_order() {
        let (sender, receiver) = create_work_queue();
        for i in 0..3 {
            sender
                .send(WorkItem {
                    path: PathBuf::from(format!("shot_{}.png", i)),
                    index: i,
                })
                .expect("send failed");
        }
        drop(sender);

        let indices: Vec<usize> = receiver.iter().map(|item| item.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
