//! SQLite question store.
//!
//! Three tables: `questions` keyed by a hash of the normalized question
//! text, `options` holding the A-D answers per question, and `source_files`
//! recording which screenshots have been processed. The normalized hash is
//! what makes re-runs idempotent: the same question captured twice lands on
//! one row with an updated last-seen date.

use anyhow::{Result, anyhow};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

use crate::parse::{LETTERS, ParsedQuestion};
use crate::paths;

/// Stable 16-hex digest of a string. Fixed seeds keep the value identical
/// across runs; the database depends on that for deduplication.
pub fn compute_hash(text: &str) -> String {
    let state = ahash::RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    );
    format!("{:016x}", state.hash_one(text))
}

/// Lowercases and collapses whitespace so OCR spacing noise does not split
/// one question into several rows.
pub fn normalize_question(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn now_string() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// The file ledger is keyed by basename, so callers may pass either a bare
/// filename or a full path.
fn file_basename(filename: &str) -> &str {
    Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename)
}

/// One document reference returned by the LLM.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceRef {
    pub document: String,
    pub section: String,
    pub page: String,
}

/// A stored question row with its options and LLM fields.
#[derive(Clone, Debug)]
pub struct QuestionRecord {
    pub id: i64,
    pub question_text: String,
    pub question_hash: String,
    pub first_seen_date: String,
    pub last_seen_date: String,
    pub llm_answer: String,
    pub llm_justification: String,
    pub llm_explanations: String,
    pub references: [SourceRef; 3],
    /// (letter, text) pairs in A-D order
    pub options: Vec<(String, String)>,
}

/// Result of storing a parsed question.
#[derive(Clone, Copy, Debug)]
pub struct UpsertOutcome {
    pub question_id: i64,
    pub newly_inserted: bool,
}

pub struct QuestionStore {
    conn: Connection,
}

impl QuestionStore {
    /// Opens (and initializes) the store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens the store at the default data-directory location.
    pub fn open_default() -> Result<Self> {
        paths::ensure_directories()?;
        Self::open(&paths::get_db_path())
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS questions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question_text TEXT NOT NULL,
                question_hash TEXT NOT NULL UNIQUE,
                first_seen_date TEXT NOT NULL,
                last_seen_date TEXT NOT NULL,
                llm_answer TEXT NOT NULL DEFAULT '',
                llm_justification TEXT NOT NULL DEFAULT '',
                llm_explanations TEXT NOT NULL DEFAULT '',
                src1_filename TEXT NOT NULL DEFAULT '',
                src1_section TEXT NOT NULL DEFAULT '',
                src1_page TEXT NOT NULL DEFAULT '',
                src2_filename TEXT NOT NULL DEFAULT '',
                src2_section TEXT NOT NULL DEFAULT '',
                src2_page TEXT NOT NULL DEFAULT '',
                src3_filename TEXT NOT NULL DEFAULT '',
                src3_section TEXT NOT NULL DEFAULT '',
                src3_page TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS options (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question_id INTEGER NOT NULL REFERENCES questions(id),
                option_letter TEXT NOT NULL,
                option_text TEXT NOT NULL,
                UNIQUE(question_id, option_letter)
            );
            CREATE TABLE IF NOT EXISTS source_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question_id INTEGER NOT NULL REFERENCES questions(id),
                filename TEXT NOT NULL,
                filename_hash TEXT NOT NULL UNIQUE,
                processed_date TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Stores a parsed question, deduplicating on the normalized text hash.
    ///
    /// A repeat sighting updates `last_seen_date` and rewrites the options;
    /// the source file is linked either way.
    pub fn upsert_question(&self, parsed: &ParsedQuestion, filename: &str) -> Result<UpsertOutcome> {
        let hash = compute_hash(&normalize_question(&parsed.question));
        let now = now_string();

        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM questions WHERE question_hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;

        self.conn.execute(
            "INSERT INTO questions (question_text, question_hash, first_seen_date, last_seen_date)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(question_hash) DO UPDATE SET last_seen_date = ?3",
            params![parsed.question, hash, now],
        )?;
        let question_id: i64 = self.conn.query_row(
            "SELECT id FROM questions WHERE question_hash = ?1",
            params![hash],
            |row| row.get(0),
        )?;

        for (letter, option) in LETTERS.iter().zip(&parsed.options) {
            self.conn.execute(
                "INSERT OR REPLACE INTO options (question_id, option_letter, option_text)
                 VALUES (?1, ?2, ?3)",
                params![question_id, letter.to_string(), option.display_text()],
            )?;
        }

        let basename = file_basename(filename);
        self.conn.execute(
            "INSERT OR IGNORE INTO source_files (question_id, filename, filename_hash, processed_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![question_id, basename, compute_hash(basename), now],
        )?;

        Ok(UpsertOutcome {
            question_id,
            newly_inserted: existing.is_none(),
        })
    }

    /// True when the file was already processed and its question still
    /// exists. Deleting the question makes the file eligible again.
    pub fn is_file_processed(&self, filename: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM source_files sf
             JOIN questions q ON q.id = sf.question_id
             WHERE sf.filename_hash = ?1",
            params![compute_hash(file_basename(filename))],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn load_record(&self, row: &rusqlite::Row<'_>) -> rusqlite::Result<QuestionRecord> {
        Ok(QuestionRecord {
            id: row.get(0)?,
            question_text: row.get(1)?,
            question_hash: row.get(2)?,
            first_seen_date: row.get(3)?,
            last_seen_date: row.get(4)?,
            llm_answer: row.get(5)?,
            llm_justification: row.get(6)?,
            llm_explanations: row.get(7)?,
            references: [
                SourceRef {
                    document: row.get(8)?,
                    section: row.get(9)?,
                    page: row.get(10)?,
                },
                SourceRef {
                    document: row.get(11)?,
                    section: row.get(12)?,
                    page: row.get(13)?,
                },
                SourceRef {
                    document: row.get(14)?,
                    section: row.get(15)?,
                    page: row.get(16)?,
                },
            ],
            options: Vec::new(),
        })
    }

    const RECORD_COLUMNS: &'static str = "id, question_text, question_hash, first_seen_date, \
        last_seen_date, llm_answer, llm_justification, llm_explanations, \
        src1_filename, src1_section, src1_page, \
        src2_filename, src2_section, src2_page, \
        src3_filename, src3_section, src3_page";

    fn attach_options(&self, record: &mut QuestionRecord) -> Result<()> {
        let mut stmt = self.conn.prepare(
            "SELECT option_letter, option_text FROM options
             WHERE question_id = ?1 ORDER BY option_letter",
        )?;
        let rows = stmt.query_map(params![record.id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            record.options.push(row?);
        }
        Ok(())
    }

    /// All stored questions with options, oldest first.
    pub fn get_all_questions(&self) -> Result<Vec<QuestionRecord>> {
        let sql = format!("SELECT {} FROM questions ORDER BY id", Self::RECORD_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| self.load_record(row))?;
        let mut records = Vec::new();
        for row in rows {
            let mut record = row?;
            self.attach_options(&mut record)?;
            records.push(record);
        }
        Ok(records)
    }

    pub fn get_question_by_id(&self, id: i64) -> Result<QuestionRecord> {
        let sql = format!(
            "SELECT {} FROM questions WHERE id = ?1",
            Self::RECORD_COLUMNS
        );
        let mut record = self
            .conn
            .query_row(&sql, params![id], |row| self.load_record(row))
            .optional()?
            .ok_or_else(|| anyhow!("No question with id {}", id))?;
        self.attach_options(&mut record)?;
        Ok(record)
    }

    /// Questions with at least one blank LLM field.
    pub fn get_questions_missing_llm_results(&self) -> Result<Vec<QuestionRecord>> {
        let sql = format!(
            "SELECT {} FROM questions
             WHERE llm_answer = '' OR llm_justification = '' OR llm_explanations = ''
             ORDER BY id",
            Self::RECORD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| self.load_record(row))?;
        let mut records = Vec::new();
        for row in rows {
            let mut record = row?;
            self.attach_options(&mut record)?;
            records.push(record);
        }
        Ok(records)
    }

    /// True only when all three LLM fields hold text.
    pub fn has_llm_results(&self, id: i64) -> Result<bool> {
        let (answer, justification, explanations): (String, String, String) =
            self.conn.query_row(
                "SELECT llm_answer, llm_justification, llm_explanations
                 FROM questions WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
        Ok(!answer.trim().is_empty()
            && !justification.trim().is_empty()
            && !explanations.trim().is_empty())
    }

    /// Replaces question text and options after a manual edit.
    ///
    /// The hash is left alone on purpose: a reprocessed screenshot of the
    /// original wording must still land on this row instead of creating a
    /// duplicate.
    pub fn update_question_and_options(
        &self,
        id: i64,
        question_text: &str,
        options: &[(String, String)],
    ) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE questions SET question_text = ?2 WHERE id = ?1",
            params![id, question_text],
        )?;
        if updated == 0 {
            return Err(anyhow!("No question with id {}", id));
        }
        for (letter, text) in options {
            self.conn.execute(
                "INSERT OR REPLACE INTO options (question_id, option_letter, option_text)
                 VALUES (?1, ?2, ?3)",
                params![id, letter, text],
            )?;
        }
        Ok(())
    }

    /// Stores an LLM answer set. References are padded to three entries.
    pub fn update_llm_results(
        &self,
        id: i64,
        answer: &str,
        justification: &str,
        explanations: &str,
        references: &[SourceRef],
    ) -> Result<()> {
        let mut padded: Vec<SourceRef> = references.iter().take(3).cloned().collect();
        padded.resize(3, SourceRef::default());

        let updated = self.conn.execute(
            "UPDATE questions SET
                llm_answer = ?2, llm_justification = ?3, llm_explanations = ?4,
                src1_filename = ?5, src1_section = ?6, src1_page = ?7,
                src2_filename = ?8, src2_section = ?9, src2_page = ?10,
                src3_filename = ?11, src3_section = ?12, src3_page = ?13
             WHERE id = ?1",
            params![
                id,
                answer,
                justification,
                explanations,
                padded[0].document,
                padded[0].section,
                padded[0].page,
                padded[1].document,
                padded[1].section,
                padded[1].page,
                padded[2].document,
                padded[2].section,
                padded[2].page,
            ],
        )?;
        if updated == 0 {
            return Err(anyhow!("No question with id {}", id));
        }
        Ok(())
    }

    /// Deletes a question, its options, and its source-file links, so the
    /// screenshots become eligible for reprocessing.
    pub fn delete_question(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM options WHERE question_id = ?1", params![id])?;
        self.conn
            .execute("DELETE FROM source_files WHERE question_id = ?1", params![id])?;
        let deleted = self
            .conn
            .execute("DELETE FROM questions WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(anyhow!("No question with id {}", id));
        }
        Ok(())
    }

    /// Filenames of the screenshots that contributed to a question.
    pub fn get_files_for_question(&self, question_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT filename FROM source_files WHERE question_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![question_id], |row| row.get::<_, String>(0))?;
        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    /// Drops the processed marker for one file without touching questions.
    pub fn mark_file_unprocessed(&self, filename: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM source_files WHERE filename_hash = ?1",
            params![compute_hash(file_basename(filename))],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::OptionSlot;
    use tempfile::tempdir;

    fn sample_question(text: &str) -> ParsedQuestion {
        ParsedQuestion {
            question: text.to_string(),
            options: [
                OptionSlot::Detected("one".to_string()),
                OptionSlot::Detected("two".to_string()),
                OptionSlot::Detected("three".to_string()),
                OptionSlot::NotDetected,
            ],
        }
    }

    fn open_store(dir: &tempfile::TempDir) -> QuestionStore {
        QuestionStore::open(&dir.path().join("test.db")).unwrap()
    }

    #[test]
    fn test_hash_is_stable_and_normalized() {
        let a = compute_hash(&normalize_question("What  is\nthe MTU?"));
        let b = compute_hash(&normalize_question("what is the mtu?"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_upsert_deduplicates_on_normalized_text() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let first = store
            .upsert_question(&sample_question("What is the MTU?"), "shot_1.png")
            .unwrap();
        assert!(first.newly_inserted);

        let second = store
            .upsert_question(&sample_question("what  is the MTU?"), "shot_2.png")
            .unwrap();
        assert!(!second.newly_inserted);
        assert_eq!(first.question_id, second.question_id);

        let all = store.get_all_questions().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].options.len(), 4);
        assert_eq!(all[0].options[3].1, crate::parse::NOT_DETECTED);

        assert!(store.is_file_processed("shot_1.png").unwrap());
        assert!(store.is_file_processed("shot_2.png").unwrap());
        assert_eq!(
            store.get_files_for_question(first.question_id).unwrap(),
            vec!["shot_1.png", "shot_2.png"]
        );
    }

    #[test]
    fn test_delete_resets_processed_files() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let outcome = store
            .upsert_question(&sample_question("Why?"), "shot.png")
            .unwrap();
        assert!(store.is_file_processed("shot.png").unwrap());

        store.delete_question(outcome.question_id).unwrap();
        assert!(!store.is_file_processed("shot.png").unwrap());
        assert!(store.get_all_questions().unwrap().is_empty());
    }

    #[test]
    fn test_llm_results_require_all_fields() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let id = store
            .upsert_question(&sample_question("Which?"), "a.png")
            .unwrap()
            .question_id;

        assert!(!store.has_llm_results(id).unwrap());

        store
            .update_llm_results(id, "B", "because", "", &[])
            .unwrap();
        assert!(!store.has_llm_results(id).unwrap());

        let refs = vec![SourceRef {
            document: "guide.pdf".to_string(),
            section: "3.1".to_string(),
            page: "42".to_string(),
        }];
        store
            .update_llm_results(id, "B", "because", "details", &refs)
            .unwrap();
        assert!(store.has_llm_results(id).unwrap());

        let record = store.get_question_by_id(id).unwrap();
        assert_eq!(record.references[0].document, "guide.pdf");
        assert_eq!(record.references[1], SourceRef::default());
        assert!(store.get_questions_missing_llm_results().unwrap().is_empty());
    }

    #[test]
    fn test_edit_keeps_dedup_hash() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let id = store
            .upsert_question(&sample_question("What is OSPF?"), "a.png")
            .unwrap()
            .question_id;

        store
            .update_question_and_options(
                id,
                "What is OSPF (fixed)?",
                &[("A".to_string(), "a link-state protocol".to_string())],
            )
            .unwrap();

        // Reprocessing the original wording still lands on the same row
        let again = store
            .upsert_question(&sample_question("What is OSPF?"), "b.png")
            .unwrap();
        assert!(!again.newly_inserted);
        assert_eq!(again.question_id, id);
    }

    #[test]
    fn test_mark_file_unprocessed() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store
            .upsert_question(&sample_question("When?"), "shot.png")
            .unwrap();

        store.mark_file_unprocessed("shot.png").unwrap();
        assert!(!store.is_file_processed("shot.png").unwrap());
    }

    #[test]
    fn test_file_ledger_keyed_by_basename() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store
            .upsert_question(&sample_question("When?"), "scans/run1/shot.png")
            .unwrap();

        assert!(store.is_file_processed("shot.png").unwrap());
        assert!(store.is_file_processed("other/dir/shot.png").unwrap());

        store.mark_file_unprocessed("scans/shot.png").unwrap();
        assert!(!store.is_file_processed("shot.png").unwrap());
    }
}
