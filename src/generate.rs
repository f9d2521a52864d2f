//! AI-assisted task generation.
//!
//! [`TaskGenerator`] asks a local inference server to break a goal into
//! tasks. Models answer in free text, so the reply is searched for the first
//! balanced JSON object, which must look like `{"tasks": [{"text": "..."}]}`.
//! [`merge_generated_tasks`] then appends only the genuinely new tasks.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Task;

/// Longest task label accepted from a generator, in characters.
pub const MAX_TASK_TEXT_LEN: usize = 70;

const SYSTEM_PROMPT: &str = "You are an expedition planner. Break the user's goal into \
concrete, ordered tasks that lead from the first step to the goal itself. Reply with JSON \
only, in the form {\"tasks\": [{\"text\": \"...\"}]}. Keep every task under 60 characters.";

/// Task generation errors. All of them are recoverable by retrying.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Inference request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Inference server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Inference server returned an empty reply")]
    EmptyReply,

    #[error("No JSON object found in the reply")]
    NoJson,

    #[error("Reply JSON is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl GenerateError {
    /// Short message suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Http(_) | Self::Status { .. } => {
                "Couldn't reach the task generator. Is it running?"
            }
            Self::EmptyReply | Self::NoJson | Self::Malformed(_) => {
                "The task generator gave an unexpected answer. Try again."
            }
        }
    }
}

// ============================================================
// Reply parsing
// ============================================================

/// Return the first balanced `{...}` substring of `text`.
///
/// Braces inside JSON strings are ignored, including escaped quotes.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(&text[start..]) {
            return Some(&text[start..start + end]);
        }
        search_from = start + 1;
    }
    None
}

/// Byte length of the balanced object that `s` starts with.
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Deserialize)]
struct GeneratedPlan {
    #[serde(default)]
    tasks: Vec<GeneratedTask>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeneratedTask {
    Object { text: String },
    Plain(String),
}

impl GeneratedTask {
    fn into_text(self) -> String {
        match self {
            Self::Object { text } | Self::Plain(text) => text,
        }
    }
}

/// Pull task labels out of a free-text model reply.
pub fn parse_generated_tasks(reply: &str) -> Result<Vec<String>, GenerateError> {
    let json = extract_json_object(reply).ok_or(GenerateError::NoJson)?;
    let plan: GeneratedPlan = serde_json::from_str(json)?;
    Ok(plan.tasks.into_iter().map(GeneratedTask::into_text).collect())
}

// ============================================================
// Merging
// ============================================================

/// Collapse runs of whitespace to single spaces and trim.
pub fn normalize_task_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Comparison key: normalized and lowercased.
pub fn dedup_key(text: &str) -> String {
    normalize_task_text(text).to_lowercase()
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect::<String>().trim_end().to_string()
}

/// Append generated tasks that are not already present.
///
/// Blank entries and duplicates (against existing tasks or earlier entries of
/// the same batch, ignoring case and whitespace) are skipped. At most `cap`
/// tasks are appended. Returns the appended tasks.
pub fn merge_generated_tasks(existing: &mut Vec<Task>, generated: Vec<String>, cap: usize) -> Vec<Task> {
    let mut seen: HashSet<String> = existing.iter().map(|t| dedup_key(&t.text)).collect();
    let mut added = Vec::new();

    for text in generated {
        if added.len() >= cap {
            break;
        }
        let normalized = normalize_task_text(&text);
        if normalized.is_empty() {
            continue;
        }
        // Compare the full text; a stored task may also be a cut-down copy.
        let stored = truncate_chars(&normalized, MAX_TASK_TEXT_LEN);
        let full_key = normalized.to_lowercase();
        let stored_key = stored.to_lowercase();
        if seen.contains(&full_key) || seen.contains(&stored_key) {
            continue;
        }
        seen.insert(full_key);
        seen.insert(stored_key);
        let task = Task::new(stored);
        existing.push(task.clone());
        added.push(task);
    }

    added
}

// ============================================================
// Inference client
// ============================================================

/// What to ask the generator for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub goal: String,
    /// The user's standing instructions for generation.
    pub guidance: String,
    /// Tasks already on the mountain, to avoid repeats.
    pub existing: Vec<String>,
    pub count: usize,
}

impl GenerationRequest {
    fn user_prompt(&self) -> String {
        let mut prompt = format!(
            "Goal: {}\nCreate {} tasks to reach it.",
            self.goal.trim(),
            self.count
        );
        if !self.guidance.trim().is_empty() {
            prompt.push_str(&format!("\nInstructions: {}", self.guidance.trim()));
        }
        if !self.existing.is_empty() {
            prompt.push_str("\nAlready planned (do not repeat):");
            for text in &self.existing {
                prompt.push_str(&format!("\n- {}", text));
            }
        }
        prompt
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Accepts chat replies (`message.content`), completion replies
/// (`response`) and OpenAI-style `choices`.
#[derive(Debug, Deserialize)]
struct ChatReply {
    message: Option<ChatMessage>,
    response: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl ChatReply {
    fn into_content(self) -> Option<String> {
        self.message
            .map(|m| m.content)
            .or(self.response)
            .or_else(|| self.choices.into_iter().next().map(|c| c.message.content))
            .filter(|c| !c.trim().is_empty())
    }
}

/// HTTP client for the local inference server.
#[derive(Debug, Clone)]
pub struct TaskGenerator {
    endpoint: String,
    model: String,
    client: Client,
}

impl TaskGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerateError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            model: model.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Ask for tasks and return their labels, unmerged.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Vec<String>, GenerateError> {
        let body = ChatRequest {
            model: &self.model,
            stream: false,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user_prompt(),
                },
            ],
        };

        tracing::debug!("Requesting {} tasks from {}", request.count, self.endpoint);
        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatReply = response.json().await?;
        let content = reply.into_content().ok_or(GenerateError::EmptyReply)?;
        parse_generated_tasks(&content)
    }
}
