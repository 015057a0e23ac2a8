//! Batch orchestration.
//!
//! Drives a whole folder through the pipeline: scan and order the files,
//! fan OCR out to the worker pool, then sequentially parse, deduplicate,
//! and store each result in capture order. Optionally follows up with LLM
//! queries for questions that still lack answers, and writes a results
//! file into the input folder.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{RecvTimeoutError, Sender, channel};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Local;
use log::{info, warn};

use super::files;
use super::queue::{BatchEvent, BatchSummary, CancelToken, WorkItem, create_work_queue};
use super::worker::{self, OcrSettings, OcrTaskResult};
use crate::config;
use crate::llm::LlmClient;
use crate::ocr;
use crate::parse;
use crate::store::QuestionStore;

/// How long the sequential loop waits for a pooled OCR result before
/// running the extraction inline.
const RESULT_WAIT: Duration = Duration::from_secs(2);
const RESULT_POLL: Duration = Duration::from_millis(200);

#[derive(Clone, Debug)]
pub struct BatchOptions {
    pub folder: PathBuf,
    pub settings: OcrSettings,
    /// Query the LLM for unanswered questions after OCR finishes
    pub query_llm: bool,
}

fn send(events: &Sender<BatchEvent>, event: BatchEvent) {
    // A dropped listener must not stop the batch
    let _ = events.send(event);
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Runs a full batch. Emits [`BatchEvent`]s while working and finishes with
/// `Complete` carrying the same summary it returns.
pub fn run_batch(
    options: &BatchOptions,
    store: &QuestionStore,
    events: &Sender<BatchEvent>,
    cancel: &CancelToken,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    let files = files::list_image_files(&options.folder)?;
    summary.total_files = files.len();
    send(
        events,
        BatchEvent::Status(format!(
            "Found {} image file(s) in {}",
            files.len(),
            options.folder.display()
        )),
    );

    // Skip files whose question is already stored; a store error just means
    // the file gets processed again
    let mut pending: Vec<PathBuf> = Vec::new();
    for path in files {
        let name = file_name(&path);
        match store.is_file_processed(&name) {
            Ok(true) => {
                summary.skipped += 1;
                send(events, BatchEvent::Status(format!("Skipping {} (already processed)", name)));
            }
            Ok(false) => pending.push(path),
            Err(e) => {
                warn!("Processed check failed for {}: {}", name, e);
                pending.push(path);
            }
        }
    }

    let (work_tx, work_rx) = create_work_queue();
    let (result_tx, result_rx) = channel();
    let pool = worker::spawn_pool(
        work_rx,
        result_tx,
        worker::pool_size(),
        options.settings.clone(),
        cancel.clone(),
    );
    for (index, path) in pending.iter().enumerate() {
        let _ = work_tx.send(WorkItem {
            path: path.clone(),
            index,
        });
    }
    drop(work_tx);

    let mut ready: HashMap<usize, OcrTaskResult> = HashMap::new();
    let mut results_text = String::new();

    for (index, path) in pending.iter().enumerate() {
        if cancel.is_cancelled() {
            send(events, BatchEvent::Status("Batch cancelled".to_string()));
            break;
        }
        let name = file_name(path);

        // Wait briefly for the pool, then fall back to inline extraction so
        // one stuck worker cannot stall the whole batch
        let started = Instant::now();
        while !ready.contains_key(&index) && started.elapsed() < RESULT_WAIT {
            match result_rx.recv_timeout(RESULT_POLL) {
                Ok(result) => {
                    ready.insert(result.index, result);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        let outcome = match ready.remove(&index) {
            Some(result) => result.outcome,
            None => {
                warn!("OCR result for {} not ready, extracting inline", name);
                ocr::extract_from_path(
                    path,
                    options.settings.level,
                    options.settings.psm,
                    options.settings.oem,
                    &options.settings.language,
                )
            }
        };

        match outcome {
            Ok(extraction) if extraction.success => {
                let parsed = parse::parse_extracted_text(&extraction.text);
                if !parsed.is_complete() {
                    warn!("{}: parse incomplete, storing with missing slots", name);
                }
                results_text.push_str(&format!(
                    "=== {} ===\n{}\n\n{}\n\n",
                    name,
                    parsed.format_display(),
                    extraction.annotation()
                ));

                // A storage failure loses this item, not the batch
                match store.upsert_question(&parsed, &name) {
                    Ok(upsert) => {
                        summary.processed += 1;
                        if upsert.newly_inserted {
                            summary.new_questions += 1;
                        } else {
                            summary.duplicate_questions += 1;
                        }
                        send(
                            events,
                            BatchEvent::OcrResult {
                                path: path.clone(),
                                question_id: Some(upsert.question_id),
                                success: true,
                            },
                        );
                    }
                    Err(e) => {
                        summary.failed += 1;
                        send(events, BatchEvent::Error(format!("{}: storage failed: {}", name, e)));
                    }
                }
            }
            Ok(extraction) => {
                summary.failed += 1;
                results_text.push_str(&format!("=== {} ===\n{}\n\n", name, extraction.text));
                send(
                    events,
                    BatchEvent::OcrResult {
                        path: path.clone(),
                        question_id: None,
                        success: false,
                    },
                );
            }
            Err(e) => {
                summary.failed += 1;
                send(events, BatchEvent::Error(format!("{}: {}", name, e)));
            }
        }

        send(
            events,
            BatchEvent::Progress {
                current: summary.skipped + summary.processed + summary.failed,
                total: summary.total_files,
            },
        );
    }

    pool.join();

    if options.query_llm && !cancel.is_cancelled() {
        run_llm_phase(store, events, cancel, &mut summary)?;
    }

    if !results_text.is_empty() {
        match write_results_file(&options.folder, &results_text, &summary) {
            Ok(path) => send(
                events,
                BatchEvent::Status(format!("Results written to {}", path.display())),
            ),
            Err(e) => send(events, BatchEvent::Error(format!("Results file: {}", e))),
        }
    }

    send(events, BatchEvent::Complete(summary));
    Ok(summary)
}

/// Queries the LLM for every stored question still missing an answer, with
/// linear backoff between retries.
fn run_llm_phase(
    store: &QuestionStore,
    events: &Sender<BatchEvent>,
    cancel: &CancelToken,
    summary: &mut BatchSummary,
) -> Result<()> {
    let api = config::get_config().api.clone();
    let max_retries = api.max_retries;
    let client = LlmClient::new(api)?;

    let questions = store.get_questions_missing_llm_results()?;
    send(
        events,
        BatchEvent::Status(format!("Querying LLM for {} question(s)", questions.len())),
    );

    for question in questions {
        if cancel.is_cancelled() {
            break;
        }

        let mut answered = false;
        for attempt in 0..=max_retries {
            if attempt > 0 {
                std::thread::sleep(Duration::from_secs(u64::from(attempt) * 2));
            }
            match client.query(&question.question_text, &question.options, &[]) {
                Ok(answer) if !answer.answer.is_empty() => {
                    if let Err(e) = store.update_llm_results(
                        question.id,
                        &answer.answer,
                        &answer.justification,
                        &answer.explanations,
                        &answer.references,
                    ) {
                        warn!("Could not store LLM answer for question {}: {}", question.id, e);
                    }
                    send(
                        events,
                        BatchEvent::ApiResult {
                            question_id: question.id,
                            answer: answer.answer,
                        },
                    );
                    answered = true;
                    break;
                }
                Ok(_) => {
                    warn!("LLM gave no answer letter for question {}", question.id);
                }
                Err(e) => {
                    warn!(
                        "LLM query failed for question {} (attempt {}): {}",
                        question.id,
                        attempt + 1,
                        e
                    );
                }
            }
        }

        if answered {
            summary.llm_answered += 1;
        } else {
            summary.llm_failed += 1;
            send(
                events,
                BatchEvent::Error(format!("No LLM answer for question {}", question.id)),
            );
        }
    }

    Ok(())
}

/// Writes the per-file results and the summary into
/// `Results_<timestamp>.txt` inside the input folder.
fn write_results_file(folder: &Path, body: &str, summary: &BatchSummary) -> Result<PathBuf> {
    let path = folder.join(format!(
        "Results_{}.txt",
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    let footer = format!(
        "=== Summary ===\nTotal files: {}\nProcessed: {}\nSkipped: {}\nFailed: {}\n\
         New questions: {}\nDuplicates: {}\n",
        summary.total_files,
        summary.processed,
        summary.skipped,
        summary.failed,
        summary.new_questions,
        summary.duplicate_questions
    );
    std::fs::write(&path, format!("{}{}", body, footer))?;
    info!("Results written to {}", path.display());
    Ok(path)
}
