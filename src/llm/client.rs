//! Chat-completion client for answer generation.
//!
//! Talks to an OpenAI-compatible endpoint (LM Studio by default), asking for
//! the correct letter, a justification, per-option explanations, and up to
//! three document references in a fixed plain-text format that
//! [`parse_response_content`] extracts with regexes.

use anyhow::{Result, anyhow};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ApiConfig;
use crate::store::SourceRef;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    document_ids: Option<&'a [String]>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

/// Parsed answer fields from one LLM response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LlmAnswer {
    pub answer: String,
    pub justification: String,
    pub explanations: String,
    pub references: Vec<SourceRef>,
}

static ANSWER: Lazy<Regex> = Lazy::new(|| Regex::new(r"Answer:\s*([A-D])").unwrap());
static JUSTIFICATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)Justification:(.*?)(?:Explanations:|A:|B:|C:|D:|$)").unwrap());
static EXPLANATIONS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)Explanations:(.*?)(?:Source References|$)").unwrap());
static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*\d+\.\s*Document Name:\s*(.*?);\s*Section:\s*(.*?);\s*Page:\s*(.*?)$")
        .unwrap()
});

/// Builds the fixed-format prompt for one question.
pub fn build_prompt(question_text: &str, options: &[(String, String)]) -> String {
    let mut prompt = format!(
        "Given the following multiple choice question, provide the correct answer, \
         a detailed justification for the correct answer, and an explanation for why \
         each incorrect option is incorrect.\n\nQuestion: {}\n",
        question_text
    );
    for (letter, text) in options {
        prompt.push_str(&format!("{}: {}\n", letter, text));
    }
    prompt.push_str(
        "\nFormat your response as:\n\
         Answer: <letter>\n\
         Justification: <text>\n\
         Explanations:\nA: <reason>\nB: <reason>\nC: <reason>\nD: <reason>\n\
         Source References (up to 3):\n\
         1. Document Name: <name>; Section: <section>; Page: <number>\n\
         2. Document Name: <name>; Section: <section>; Page: <number>\n\
         3. Document Name: <name>; Section: <section>; Page: <number>\n",
    );
    prompt
}

/// Extracts the structured fields from the response text. Sections the model
/// skipped come back empty; references are padded to three entries.
pub fn parse_response_content(content: &str) -> LlmAnswer {
    let answer = ANSWER
        .captures(content)
        .map(|c| c[1].to_string())
        .unwrap_or_default();
    let justification = JUSTIFICATION
        .captures(content)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default();
    let explanations = EXPLANATIONS
        .captures(content)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default();

    let mut references: Vec<SourceRef> = REFERENCE
        .captures_iter(content)
        .take(3)
        .map(|c| SourceRef {
            document: c[1].trim().to_string(),
            section: c[2].trim().to_string(),
            page: c[3].trim().to_string(),
        })
        .collect();
    references.resize(3, SourceRef::default());

    LlmAnswer {
        answer,
        justification,
        explanations,
        references,
    }
}

pub struct LlmClient {
    client: reqwest::blocking::Client,
    config: ApiConfig,
}

impl LlmClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Sends one question to the endpoint and parses the answer fields.
    ///
    /// `document_ids` restricts retrieval-augmented endpoints to known
    /// documents; an empty slice omits the field entirely.
    pub fn query(
        &self,
        question_text: &str,
        options: &[(String, String)],
        document_ids: &[String],
    ) -> Result<LlmAnswer> {
        let prompt = build_prompt(question_text, options);
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: self.config.temperature,
            stream: false,
            max_tokens: (self.config.max_tokens > 0).then_some(self.config.max_tokens),
            document_ids: (!document_ids.is_empty()).then_some(document_ids),
        };

        let mut builder = self.client.post(&self.config.endpoint).json(&request);
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }

        let response = builder.send()?.error_for_status()?;
        let body: ChatResponse = response.json()?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");
        if content.is_empty() {
            return Err(anyhow!("LLM response missing content"));
        }

        Ok(parse_response_content(content))
    }
}
