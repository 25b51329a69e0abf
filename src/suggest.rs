// src/suggest.rs

//! Destination suggestions from a language model
//!
//! The planner only sees the `Suggester` trait: a batch of file records in,
//! per-file destination strings and an overall confidence out. The core
//! runs fine with no suggester at all — every failure here degrades to
//! rule-based planning, it never fails a scan.
//!
//! `HttpSuggester` talks to an Ollama-style chat endpoint with a primary
//! and a fallback model. Responses must parse strictly; anything else is a
//! semantic failure (E002).

use crate::config::Config;
use crate::scan::FileRecord;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// At most this many records are sent per suggestion request
pub const BATCH_LIMIT: usize = 20;

const SYSTEM_PROMPT: &str = "You are a file organization assistant. \
Given a list of files, suggest a destination folder for each, using the \
4-level structure Type/Context/Time/Smart (e.g. Documents/Work/2024/Acme). \
Only output folders relative to the organization base directory. \
Respond with strict JSON only.";

/// One per-file destination suggestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    /// File name the suggestion applies to
    pub file: String,
    /// Destination folder relative to the base directory
    pub destination: String,
    #[serde(default)]
    pub reasoning: Option<String>,
    /// Per-file confidence 0-100
    #[serde(default)]
    pub confidence: Option<u8>,
}

/// A parsed suggestion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionBatch {
    pub suggestions: Vec<Suggestion>,
    /// Overall confidence 0-100
    pub overall_confidence: u8,
}

/// Opaque destination-suggestion collaborator
pub trait Suggester: Send + Sync {
    /// Suggest destinations for a batch of records
    fn suggest(&self, records: &[FileRecord]) -> Result<SuggestionBatch>;
}

/// Render the user prompt for a batch of records
pub fn build_prompt(records: &[FileRecord]) -> String {
    let mut out = String::from(
        "Suggest a destination folder for each of these files.\n\nFiles:\n",
    );
    for record in records.iter().take(BATCH_LIMIT) {
        out.push_str(&format!(
            "- {} (type: {}, detected: {}, category: {})\n",
            record.file_name(),
            record.doc_type,
            record.categories.kind,
            record.categories.context,
        ));
    }
    out.push_str(
        "\nRespond in JSON: {\"suggestions\": [{\"file\": \"name\", \
         \"destination\": \"Type/Context\", \"confidence\": 85}], \
         \"overall_confidence\": 90}",
    );
    out
}

/// Parse a strict JSON suggestion response
pub fn parse_response(raw: &str) -> Result<SuggestionBatch> {
    let batch: SuggestionBatch = serde_json::from_str(raw).map_err(|e| Error::Suggester {
        reason: format!("unparseable response: {e}"),
    })?;
    if batch.overall_confidence > 100 {
        return Err(Error::Suggester {
            reason: format!(
                "overall_confidence out of range: {}",
                batch.overall_confidence
            ),
        });
    }
    Ok(batch)
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    format: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Suggester backed by an Ollama-style `/api/chat` endpoint
pub struct HttpSuggester {
    endpoint: String,
    model: String,
    fallback_model: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpSuggester {
    pub fn new(endpoint: String, model: String, fallback_model: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::SuggesterUnreachable {
                endpoint: endpoint.clone(),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            endpoint,
            model,
            fallback_model,
            client,
        })
    }

    /// Build from `ai.models.ollama.*`; None when no endpoint is configured
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let endpoint = config.get_str("ai.models.ollama.endpoint", "");
        if endpoint.is_empty() {
            return Ok(None);
        }
        let model = config.get_str("ai.models.ollama.model", "llama3.3");
        let fallback = config.get_str("ai.models.ollama.fallback_model", "");
        let timeout = config.get_u64("ai.models.ollama.timeout", 30);

        Ok(Some(Self::new(
            endpoint,
            model,
            (!fallback.is_empty()).then_some(fallback),
            Duration::from_secs(timeout),
        )?))
    }

    fn chat(&self, model: &str, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            stream: false,
            format: "json",
        };

        let url = format!("{}/api/chat", self.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .map_err(|e| self.classify(e))?;

        if !response.status().is_success() {
            return Err(Error::Suggester {
                reason: format!("endpoint returned HTTP {}", response.status()),
            });
        }

        let body: ChatResponse = response.json().map_err(|e| Error::Suggester {
            reason: format!("malformed chat response: {e}"),
        })?;
        Ok(body.message.content)
    }

    /// Timeouts are semantic failures (E002); refused connections are E001
    fn classify(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Suggester {
                reason: format!("request timed out: {err}"),
            }
        } else {
            Error::SuggesterUnreachable {
                endpoint: self.endpoint.clone(),
                source: Some(Box::new(err)),
            }
        }
    }
}

impl Suggester for HttpSuggester {
    fn suggest(&self, records: &[FileRecord]) -> Result<SuggestionBatch> {
        let prompt = build_prompt(records);

        let content = match self.chat(&self.model, &prompt) {
            Ok(content) => content,
            Err(primary_err) => match &self.fallback_model {
                Some(fallback) if primary_err.is_recoverable() => {
                    warn!(
                        "Primary model '{}' failed ({}), trying '{}'",
                        self.model,
                        primary_err.code(),
                        fallback
                    );
                    self.chat(fallback, &prompt)?
                }
                _ => return Err(primary_err),
            },
        };

        debug!("Suggester returned {} bytes", content.len());
        parse_response(&content)
    }
}
