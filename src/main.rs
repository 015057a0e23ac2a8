//! quizscan: extracts multiple-choice questions from exam screenshots.
//!
//! Each image is preprocessed, read with Tesseract, parsed into a question
//! with A-D options, and deduplicated into a local SQLite store. Stored
//! questions can then be sent to an OpenAI-compatible endpoint for answers.

mod batch;
mod config;
mod llm;
mod ocr;
mod parse;
mod paths;
mod preprocess;
mod store;

use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::thread;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use log::info;

use batch::{BatchEvent, BatchOptions, CancelToken, OcrSettings};
use preprocess::EnhancementLevel;
use store::QuestionStore;

#[derive(Parser)]
#[command(name = "quizscan", version, about = "Exam question extraction from screenshots")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process a folder of screenshots into the question store
    Process {
        /// Input folder; defaults to the last folder used
        folder: Option<PathBuf>,
        /// Enhancement level: None, Light, Medium, Heavy, Adaptive, Super
        #[arg(long)]
        enhancement: Option<String>,
        /// Tesseract page segmentation mode
        #[arg(long)]
        psm: Option<u8>,
        /// Tesseract engine mode
        #[arg(long)]
        oem: Option<u8>,
        /// OCR language
        #[arg(long)]
        lang: Option<String>,
        /// Query the LLM for unanswered questions afterwards
        #[arg(long)]
        ask: bool,
    },
    /// Run OCR on a single image and print the result without storing it
    Ocr {
        image: PathBuf,
        #[arg(long)]
        enhancement: Option<String>,
        #[arg(long)]
        psm: Option<u8>,
        #[arg(long)]
        oem: Option<u8>,
        #[arg(long)]
        lang: Option<String>,
    },
    /// List stored questions
    List,
    /// Show one question in full
    Show { id: i64 },
    /// Edit a stored question's text or options
    Edit {
        id: i64,
        /// Replacement question text
        #[arg(long)]
        question: Option<String>,
        /// Replacement option as LETTER=TEXT, repeatable
        #[arg(long = "option", value_name = "LETTER=TEXT")]
        options: Vec<String>,
    },
    /// Delete a question and free its source files for reprocessing
    Delete { id: i64 },
    /// Forget a processed source file so the next run rescans it
    Forget { filename: String },
    /// Query the LLM for answers (all unanswered questions, or specific ids)
    Ask { ids: Vec<i64> },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    paths::ensure_directories()?;
    config::init_config();

    let cli = Cli::parse();
    match cli.command {
        Command::Process {
            folder,
            enhancement,
            psm,
            oem,
            lang,
            ask,
        } => cmd_process(folder, ocr_settings(enhancement, psm, oem, lang), ask),
        Command::Ocr {
            image,
            enhancement,
            psm,
            oem,
            lang,
        } => cmd_ocr(&image, ocr_settings(enhancement, psm, oem, lang)),
        Command::List => cmd_list(),
        Command::Show { id } => cmd_show(id),
        Command::Edit {
            id,
            question,
            options,
        } => cmd_edit(id, question, &options),
        Command::Delete { id } => cmd_delete(id),
        Command::Forget { filename } => cmd_forget(&filename),
        Command::Ask { ids } => cmd_ask(&ids),
    }
}

/// Merges CLI overrides over the configured OCR defaults.
fn ocr_settings(
    enhancement: Option<String>,
    psm: Option<u8>,
    oem: Option<u8>,
    lang: Option<String>,
) -> OcrSettings {
    let defaults = &config::get_config().ocr;
    OcrSettings {
        level: EnhancementLevel::from_name(&enhancement.unwrap_or_else(|| defaults.enhancement.clone())),
        psm: psm.unwrap_or(defaults.psm),
        oem: oem.unwrap_or(defaults.oem),
        language: lang.unwrap_or_else(|| defaults.language.clone()),
    }
}

fn cmd_process(folder: Option<PathBuf>, settings: OcrSettings, ask: bool) -> Result<()> {
    let last_folder = &config::get_config().last_folder;
    let folder = match folder {
        Some(folder) => folder,
        None if !last_folder.is_empty() => PathBuf::from(last_folder),
        None => return Err(anyhow!("No folder given and no previous folder on record")),
    };

    let store = QuestionStore::open_default()?;
    let options = BatchOptions {
        folder: folder.clone(),
        settings,
        query_llm: ask,
    };

    let (events_tx, events_rx) = channel();
    let printer = thread::spawn(move || {
        for event in events_rx {
            print_event(&event);
        }
    });

    let cancel = CancelToken::new();
    let result = batch::run_batch(&options, &store, &events_tx, &cancel);
    drop(events_tx);
    let _ = printer.join();
    result?;

    let mut updated = config::get_config().clone();
    updated.last_folder = folder.to_string_lossy().to_string();
    config::save_config(&updated)?;
    Ok(())
}

fn print_event(event: &BatchEvent) {
    match event {
        BatchEvent::Status(message) => println!("{}", message),
        BatchEvent::Progress { current, total } => println!("[{}/{}]", current, total),
        BatchEvent::OcrResult {
            path,
            question_id,
            success,
        } => match question_id {
            Some(id) if *success => println!("  {} -> question {}", path.display(), id),
            _ => println!("  {} -> no text detected", path.display()),
        },
        BatchEvent::ApiResult {
            question_id,
            answer,
        } => println!("  question {} answered: {}", question_id, answer),
        BatchEvent::Error(message) => eprintln!("  error: {}", message),
        BatchEvent::Complete(summary) => {
            println!(
                "\nDone. {} processed, {} skipped, {} failed ({} new, {} duplicate)",
                summary.processed,
                summary.skipped,
                summary.failed,
                summary.new_questions,
                summary.duplicate_questions
            );
            if summary.llm_answered + summary.llm_failed > 0 {
                println!(
                    "LLM: {} answered, {} failed",
                    summary.llm_answered, summary.llm_failed
                );
            }
        }
    }
}

fn cmd_ocr(image: &PathBuf, settings: OcrSettings) -> Result<()> {
    let outcome = ocr::extract_from_path(
        image,
        settings.level,
        settings.psm,
        settings.oem,
        &settings.language,
    )?;
    println!("{}", outcome.text);
    println!("\n{}", outcome.annotation());
    if outcome.success {
        let parsed = parse::parse_extracted_text(&outcome.text);
        println!("\n--- Parsed ---\n{}", parsed.format_display());
    }
    Ok(())
}

fn cmd_list() -> Result<()> {
    let store = QuestionStore::open_default()?;
    let questions = store.get_all_questions()?;
    if questions.is_empty() {
        println!("No questions stored.");
        return Ok(());
    }
    for question in &questions {
        let answer = if question.llm_answer.is_empty() {
            "-".to_string()
        } else {
            question.llm_answer.clone()
        };
        println!(
            "{:>4}  [{}]  {}",
            question.id, answer, question.question_text
        );
    }
    println!("\n{} question(s)", questions.len());
    Ok(())
}

fn cmd_show(id: i64) -> Result<()> {
    let store = QuestionStore::open_default()?;
    let question = store.get_question_by_id(id)?;

    println!("Question {}: {}", question.id, question.question_text);
    for (letter, text) in &question.options {
        println!("  {}. {}", letter, text);
    }
    println!(
        "\nFirst seen: {}\nLast seen:  {}",
        question.first_seen_date, question.last_seen_date
    );
    let files = store.get_files_for_question(question.id)?;
    if !files.is_empty() {
        println!("Source files: {}", files.join(", "));
    }
    if !question.llm_answer.is_empty() {
        println!("\nLLM answer: {}", question.llm_answer);
        println!("Justification: {}", question.llm_justification);
        println!("Explanations:\n{}", question.llm_explanations);
        for (i, reference) in question.references.iter().enumerate() {
            if !reference.document.is_empty() {
                println!(
                    "Source {}: {}; Section: {}; Page: {}",
                    i + 1,
                    reference.document,
                    reference.section,
                    reference.page
                );
            }
        }
    }
    Ok(())
}

fn cmd_edit(id: i64, question: Option<String>, options: &[String]) -> Result<()> {
    let store = QuestionStore::open_default()?;
    let current = store.get_question_by_id(id)?;

    let question_text = question.unwrap_or(current.question_text);
    let mut replacements = Vec::new();
    for option in options {
        let (letter, text) = option
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected LETTER=TEXT, got '{}'", option))?;
        let letter = letter.trim().to_uppercase();
        if !matches!(letter.as_str(), "A" | "B" | "C" | "D") {
            return Err(anyhow!("Option letter must be A-D, got '{}'", letter));
        }
        replacements.push((letter, text.trim().to_string()));
    }

    store.update_question_and_options(id, &question_text, &replacements)?;
    info!("Question {} updated", id);
    cmd_show(id)
}

fn cmd_delete(id: i64) -> Result<()> {
    let store = QuestionStore::open_default()?;
    store.delete_question(id)?;
    println!("Question {} deleted; its source files can be reprocessed.", id);
    Ok(())
}

fn cmd_forget(filename: &str) -> Result<()> {
    let store = QuestionStore::open_default()?;
    store.mark_file_unprocessed(filename)?;
    println!("{} will be rescanned on the next run.", filename);
    Ok(())
}

fn cmd_ask(ids: &[i64]) -> Result<()> {
    let store = QuestionStore::open_default()?;
    let api = config::get_config().api.clone();
    let max_retries = api.max_retries;
    let client = llm::LlmClient::new(api)?;

    let questions = if ids.is_empty() {
        store.get_questions_missing_llm_results()?
    } else {
        let mut selected = Vec::new();
        for id in ids {
            selected.push(store.get_question_by_id(*id)?);
        }
        selected
    };

    if questions.is_empty() {
        println!("Nothing to ask: all stored questions have answers.");
        return Ok(());
    }

    let mut answered = 0usize;
    for question in &questions {
        if store.has_llm_results(question.id)? {
            println!("Question {} already answered, skipping.", question.id);
            continue;
        }

        let mut stored = false;
        for attempt in 0..=max_retries {
            if attempt > 0 {
                std::thread::sleep(std::time::Duration::from_secs(u64::from(attempt) * 2));
            }
            match client.query(&question.question_text, &question.options, &[]) {
                Ok(answer) if !answer.answer.is_empty() => {
                    store.update_llm_results(
                        question.id,
                        &answer.answer,
                        &answer.justification,
                        &answer.explanations,
                        &answer.references,
                    )?;
                    println!("Question {} answered: {}", question.id, answer.answer);
                    stored = true;
                    break;
                }
                Ok(_) => eprintln!("Question {}: response had no answer letter", question.id),
                Err(e) => eprintln!(
                    "Question {} attempt {} failed: {}",
                    question.id,
                    attempt + 1,
                    e
                ),
            }
        }
        if stored {
            answered += 1;
        }
    }

    println!("\n{}/{} question(s) answered.", answered, questions.len());
    Ok(())
}
