//! OCR worker pool.
//!
//! A small pool of threads pulls screenshots off the shared work queue and
//! runs the extraction cascade on each, sending outcomes back over a results
//! channel. OCR dominates batch runtime, so it gets the parallelism while
//! parsing and storage stay sequential in the runner.

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::Result;
use log::{debug, info};

use super::queue::{CancelToken, WorkItem};
use crate::ocr::{self, ExtractionOutcome};
use crate::preprocess::EnhancementLevel;

/// OCR parameters shared by every worker in a batch.
#[derive(Clone, Debug)]
pub struct OcrSettings {
    pub level: EnhancementLevel,
    pub psm: u8,
    pub oem: u8,
    pub language: String,
}

/// Outcome of one file's OCR, matched to its batch position.
#[derive(Debug)]
pub struct OcrTaskResult {
    pub index: usize,
    pub path: PathBuf,
    pub outcome: Result<ExtractionOutcome>,
}

/// Worker count for this machine, capped at four. Past that the Tesseract
/// subprocesses start competing for memory rather than finishing faster.
pub fn pool_size() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(4)
}

pub struct OcrPool {
    handles: Vec<JoinHandle<()>>,
}

impl OcrPool {
    /// Waits for every worker to finish. Workers exit when the work queue
    /// closes or the cancel token fires.
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

/// Spawns `workers` threads sharing one work queue.
pub fn spawn_pool(
    receiver: Receiver<WorkItem>,
    results: Sender<OcrTaskResult>,
    workers: usize,
    settings: OcrSettings,
    cancel: CancelToken,
) -> OcrPool {
    let receiver = Arc::new(Mutex::new(receiver));
    let handles = (0..workers.max(1))
        .map(|worker_id| {
            let receiver = Arc::clone(&receiver);
            let results = results.clone();
            let settings = settings.clone();
            let cancel = cancel.clone();
            thread::spawn(move || worker_loop(worker_id, receiver, results, settings, cancel))
        })
        .collect();
    OcrPool { handles }
}

fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<Receiver<WorkItem>>>,
    results: Sender<OcrTaskResult>,
    settings: OcrSettings,
    cancel: CancelToken,
) {
    debug!("OCR worker {} started", worker_id);
    loop {
        if cancel.is_cancelled() {
            info!("OCR worker {} cancelled", worker_id);
            break;
        }

        let item = {
            let guard = match receiver.lock() {
                Ok(guard) => guard,
                Err(_) => break,
            };
            guard.recv()
        };
        let Ok(item) = item else {
            // Queue closed, no more work
            break;
        };

        debug!("OCR worker {}: processing {}", worker_id, item.path.display());
        let outcome = ocr::extract_from_path(
            &item.path,
            settings.level,
            settings.psm,
            settings.oem,
            &settings.language,
        );
        let result = OcrTaskResult {
            index: item.index,
            path: item.path,
            outcome,
        };
        if results.send(result).is_err() {
            // Runner went away, stop working
            break;
        }
    }
    debug!("OCR worker {} finished", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::queue::create_work_queue;
    use std::sync::mpsc::channel;

    fn settings() -> OcrSettings {
        OcrSettings {
            level: EnhancementLevel::Light,
            psm: 6,
            oem: 3,
            language: "eng".to_string(),
        }
    }

    #[test]
    fn test_pool_exits_when_queue_closes() {
        let (sender, receiver) = create_work_queue();
        let (results, _results_rx) = channel();
        let pool = spawn_pool(receiver, results, 2, settings(), CancelToken::new());

        drop(sender);
        pool.join();
    }

    #[test]
    fn test_cancelled_pool_leaves_queue_untouched() {
        let (sender, receiver) = create_work_queue();
        let (results, results_rx) = channel();
        let cancel = CancelToken::new();
        cancel.cancel();

        let pool = spawn_pool(receiver, results, 2, settings(), cancel);
        sender
            .send(WorkItem {
                path: PathBuf::from("shot.png"),
                index: 0,
            })
            .unwrap();
        drop(sender);
        pool.join();

        assert!(results_rx.try_recv().is_err());
    }

    #[test]
    fn test_pool_size_is_bounded() {
        let size = pool_size();
        assert!(size >= 1 && size <= 4);
    }
}
