//! Minimal Ollama client for our use-cases.
//!
//! We call `/api/generate` for variant bodies, `/api/chat` for refinement turns
//! and `/api/tags` to test the connection. Responses are requested unstreamed.
//! Calls are instrumented and log model names, latencies and response sizes
//! (not contents).

use std::time::{Duration, Instant};

use reqwest::{header::USER_AGENT, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::Preferences;
use crate::domain::ConversationTurn;
use crate::error::{WizardError, WizardResult};
use crate::util::trunc_for_log;

const GENERATE_MAX_TOKENS: u32 = 4096;
const CHAT_MAX_TOKENS: u32 = 2048;
const TEMPERATURE: f32 = 0.7;

#[derive(Clone, Debug)]
pub struct OllamaClient {
  client: reqwest::Client,
  pub endpoint: String,
  pub model: String,
}

impl OllamaClient {
  pub fn new(endpoint: &str, model: &str) -> WizardResult<Self> {
    // Model loads on first use can take minutes.
    let client = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(10))
      .timeout(Duration::from_secs(300))
      .build()
      .map_err(|e| WizardError::Connection { endpoint: endpoint.to_string(), message: e.to_string() })?;
    Ok(Self {
      client,
      endpoint: endpoint.trim_end_matches('/').to_string(),
      model: model.to_string(),
    })
  }

  pub fn from_preferences(prefs: &Preferences) -> WizardResult<Self> {
    Self::new(&prefs.ollama_endpoint, &prefs.ollama_model)
  }

  fn connection_error(&self, e: reqwest::Error) -> WizardError {
    error!(target: "generation", endpoint = %self.endpoint, error = %e, "Failed to reach Ollama");
    let message = if e.is_timeout() {
      "request timed out; the model may still be loading".to_string()
    } else if e.is_connect() {
      "server not reachable; start it with 'ollama serve'".to_string()
    } else {
      e.to_string()
    };
    WizardError::Connection { endpoint: self.endpoint.clone(), message }
  }

  /// Map a non-success status to the error taxonomy. A bare 404 only means
  /// a missing model on the model-bound endpoints (`generate`, `chat`).
  async fn status_error(&self, res: reqwest::Response, model_call: bool) -> WizardError {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    let msg = extract_ollama_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
    error!(target: "generation", %status, error = %msg, "Ollama returned an error status");

    let lower = msg.to_lowercase();
    let model_missing = (model_call && status == StatusCode::NOT_FOUND)
      || (lower.contains("model") && (lower.contains("not found") || lower.contains("not loaded")));
    if model_missing {
      return WizardError::Model {
        model: self.model.clone(),
        message: format!("pull it with 'ollama pull {}'", self.model),
      };
    }
    WizardError::MalformedResponse(format!("HTTP {}: {}", status, msg))
  }

  /// Names of the models installed on the server.
  #[instrument(level = "info", skip(self), fields(endpoint = %self.endpoint))]
  pub async fn list_models(&self) -> WizardResult<Vec<String>> {
    let url = format!("{}/api/tags", self.endpoint);
    let res = self.client.get(&url)
      .header(USER_AGENT, "udl-wizard-backend/0.1")
      .timeout(Duration::from_secs(10))
      .send().await.map_err(|e| self.connection_error(e))?;
    if !res.status().is_success() {
      return Err(self.status_error(res, false).await);
    }
    let body: TagsResponse = res.json().await
      .map_err(|e| WizardError::MalformedResponse(format!("tags: {e}")))?;
    Ok(body.models.into_iter().map(|m| m.name).collect())
  }

  /// Single completion for one variant.
  #[instrument(level = "info", skip(self, prompt, system), fields(model = %self.model, prompt_len = prompt.len(), system_len = system.len()))]
  pub async fn generate(&self, prompt: &str, system: &str) -> WizardResult<String> {
    let url = format!("{}/api/generate", self.endpoint);
    let req = GenerateRequest {
      model: &self.model,
      prompt,
      system: if system.is_empty() { None } else { Some(system) },
      stream: false,
      options: Options { temperature: TEMPERATURE, num_predict: GENERATE_MAX_TOKENS },
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "udl-wizard-backend/0.1")
      .json(&req).send().await.map_err(|e| self.connection_error(e))?;
    if !res.status().is_success() {
      return Err(self.status_error(res, true).await);
    }

    let body: GenerateResponse = res.json().await
      .map_err(|e| WizardError::MalformedResponse(format!("generate: {e}")))?;
    let text = body.response.trim().to_string();
    info!(
      target: "generation",
      elapsed = ?start.elapsed(),
      prompt_tokens = ?body.prompt_eval_count,
      completion_tokens = ?body.eval_count,
      response_len = text.len(),
      "Ollama generate finished"
    );
    if text.is_empty() {
      return Err(WizardError::MalformedResponse("model returned an empty response".into()));
    }
    Ok(text)
  }

  /// One refinement turn: system prompt + prior history + the new message.
  #[instrument(level = "info", skip(self, system, history, message), fields(model = %self.model, history_len = history.len(), message_len = message.len()))]
  pub async fn converse(
    &self,
    system: &str,
    history: &[ConversationTurn],
    message: &str,
  ) -> WizardResult<String> {
    let url = format!("{}/api/chat", self.endpoint);
    let mut messages = Vec::with_capacity(history.len() + 2);
    if !system.is_empty() {
      messages.push(ChatMessage { role: "system", content: system });
    }
    messages.extend(history.iter().map(|t| ChatMessage { role: t.role.as_str(), content: &t.text }));
    messages.push(ChatMessage { role: "user", content: message });

    let req = ChatRequest {
      model: &self.model,
      messages,
      stream: false,
      options: Options { temperature: TEMPERATURE, num_predict: CHAT_MAX_TOKENS },
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "udl-wizard-backend/0.1")
      .json(&req).send().await.map_err(|e| self.connection_error(e))?;
    if !res.status().is_success() {
      return Err(self.status_error(res, true).await);
    }

    let body: ChatResponse = res.json().await
      .map_err(|e| WizardError::MalformedResponse(format!("chat: {e}")))?;
    let text = body.message.content.trim().to_string();
    info!(target: "generation", elapsed = ?start.elapsed(), reply_len = text.len(), "Ollama chat finished");
    if text.is_empty() {
      return Err(WizardError::MalformedResponse("model returned an empty reply".into()));
    }
    Ok(text)
  }
}

// --- Ollama DTOs ---

#[derive(Serialize)]
struct Options {
  temperature: f32,
  num_predict: u32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
  model: &'a str,
  prompt: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  system: Option<&'a str>,
  stream: bool,
  options: Options,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
  model: &'a str,
  messages: Vec<ChatMessage<'a>>,
  stream: bool,
  options: Options,
}

#[derive(Serialize)]
struct ChatMessage<'a> { role: &'a str, content: &'a str }

#[derive(Deserialize)]
struct GenerateResponse {
  response: String,
  #[serde(default)] prompt_eval_count: Option<u32>,
  #[serde(default)] eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse { message: ChatResponseMessage }
#[derive(Deserialize)]
struct ChatResponseMessage { #[serde(default)] content: String }

#[derive(Deserialize)]
struct TagsResponse { #[serde(default)] models: Vec<TagModel> }
#[derive(Deserialize)]
struct TagModel { name: String }

/// Ollama reports failures as `{"error": "..."}`.
fn extract_ollama_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EObj { error: String }
  serde_json::from_str::<EObj>(body).ok().map(|e| e.error)
}
