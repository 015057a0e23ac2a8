//! Persistent question storage.

pub mod db;

pub use db::{QuestionRecord, QuestionStore, SourceRef, UpsertOutcome, compute_hash};
