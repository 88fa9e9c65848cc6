//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. Most requests get a single JSON reply; generation
//! (and a `next` that reaches the last step) first streams progress events.
//!
//! Replies are written to any `Sink<Message>`; the live socket is one.

use std::future::Future;
use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use base64::Engine;
use futures::{Sink, SinkExt};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error, info, instrument};

use crate::error::WizardError;
use crate::logic;
use crate::protocol::{ClientWsMessage, GenerationProgress, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "udl_wizard", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "udl_wizard", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let result = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "udl_wizard", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state, &mut socket).await
          }
          Err(e) => {
            let reply = ServerWsMessage::Error { error: "invalid_request".into(), message: format!("Invalid JSON: {}", e) };
            send(&mut socket, &reply).await
          }
        };
        if let Err(e) = result {
          error!(target: "udl_wizard", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "udl_wizard", "WebSocket disconnected");
}

async fn send<S>(sink: &mut S, msg: &ServerWsMessage) -> Result<(), axum::Error>
where
  S: Sink<Message, Error = axum::Error> + Unpin,
{
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "error": "storage", "message": format!("Serialization error: {}", e) }).to_string()
  });
  sink.send(Message::Text(out)).await
}

fn error_msg(e: &WizardError) -> ServerWsMessage {
  ServerWsMessage::Error { error: e.kind().to_string(), message: e.to_string() }
}

/// Drive `work` to completion while relaying its progress events.
async fn with_progress<S, T>(
  sink: &mut S,
  rx: &mut UnboundedReceiver<GenerationProgress>,
  work: impl Future<Output = T>,
) -> Result<T, axum::Error>
where
  S: Sink<Message, Error = axum::Error> + Unpin,
{
  tokio::pin!(work);
  loop {
    tokio::select! {
      out = &mut work => {
        while let Ok(progress) = rx.try_recv() {
          send(sink, &ServerWsMessage::Progress { progress }).await?;
        }
        return Ok(out);
      }
      Some(progress) = rx.recv() => {
        send(sink, &ServerWsMessage::Progress { progress }).await?;
      }
    }
  }
}

#[instrument(level = "info", skip(state, sink))]
async fn handle_client_ws<S>(msg: ClientWsMessage, state: &AppState, sink: &mut S) -> Result<(), axum::Error>
where
  S: Sink<Message, Error = axum::Error> + Unpin,
{
  let reply = match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::View => ServerWsMessage::View { view: logic::view(state).await },

    ClientWsMessage::UpdateFields { fields } => {
      ServerWsMessage::View { view: logic::update_fields(state, fields).await }
    }

    ClientWsMessage::Next => {
      let (tx, mut rx) = mpsc::unbounded_channel();
      match with_progress(sink, &mut rx, logic::next_step(state, Some(&tx))).await? {
        Ok(view) => ServerWsMessage::View { view },
        Err(e) => error_msg(&e),
      }
    }

    ClientWsMessage::Back => ServerWsMessage::View { view: logic::previous_step(state).await },

    ClientWsMessage::Generate => {
      let (tx, mut rx) = mpsc::unbounded_channel();
      match with_progress(sink, &mut rx, logic::generate(state, Some(&tx))).await? {
        Ok(materials) => {
          info!(target: "generation", "WS generation delivered");
          ServerWsMessage::Generated { materials }
        }
        Err(e) => error_msg(&e),
      }
    }

    ClientWsMessage::StartConversation => match logic::start_conversation(state).await {
      Ok((reply, conversation)) => ServerWsMessage::Conversation { reply, conversation },
      Err(e) => error_msg(&e),
    },

    ClientWsMessage::ConversationMessage { text } => match logic::send_message(state, &text).await {
      Ok((reply, conversation)) => ServerWsMessage::Conversation { reply, conversation },
      Err(e) => error_msg(&e),
    },

    ClientWsMessage::Export { format, variant } => match logic::render_current(state, format, variant).await {
      Ok((file_name, bytes)) => {
        info!(target: "export", %file_name, size = bytes.len(), "WS export delivered");
        ServerWsMessage::ExportFile {
          file_name,
          mime_type: format.mime_type().to_string(),
          data_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
      }
      Err(e) => error_msg(&e),
    },
  };
  send(sink, &reply).await
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;

  use futures::channel::mpsc as frames;
  use futures::StreamExt;
  use serde_json::Value;

  use crate::domain::Field;
  use crate::export::ExportFormat;
  use crate::state::tests::test_state;

  const BODY: &str = r###"{"response": "## Introduction\nLet's learn.\n## Activities\n- Practice", "done": true}"###;

  async fn ready_state(server: &mut mockito::ServerGuard) -> (tempfile::TempDir, AppState, mockito::Mock) {
    let mock = server
      .mock("POST", "/api/generate")
      .with_status(200)
      .with_body(BODY)
      .expect(5)
      .create_async()
      .await;
    let (dir, state) = test_state(&server.url());
    let fields = BTreeMap::from([
      (Field::LearningObjective, "fractions".to_string()),
      (Field::GradeLevel, "4".to_string()),
      (Field::StudentNeeds, "reading support".to_string()),
    ]);
    logic::update_fields(&state, fields).await;
    (dir, state, mock)
  }

  /// Run each message through the dispatcher and collect every frame sent.
  async fn exchange(state: &AppState, messages: Vec<ClientWsMessage>) -> Vec<Value> {
    let (tx, rx) = frames::unbounded::<Message>();
    let mut sink = tx.sink_map_err(|e| axum::Error::new(e));
    for msg in messages {
      handle_client_ws(msg, state, &mut sink).await.expect("sink open");
    }
    drop(sink);
    rx.filter_map(|m| async move {
      match m {
        Message::Text(text) => serde_json::from_str(&text).ok(),
        _ => None,
      }
    })
    .collect()
    .await
  }

  #[tokio::test]
  async fn generate_streams_progress_before_the_result() {
    let mut server = mockito::Server::new_async().await;
    let (_dir, state, mock) = ready_state(&mut server).await;

    let out = exchange(&state, vec![ClientWsMessage::Generate]).await;
    mock.assert_async().await;
    assert_eq!(out.len(), 11);
    assert!(out[..10].iter().all(|f| f["type"] == "progress"));
    assert_eq!(out[0]["progress"]["stage"], "started");
    assert_eq!(out[0]["progress"]["index"], 1);
    assert_eq!(out[9]["progress"]["stage"], "finished");
    assert_eq!(out[9]["progress"]["index"], 5);
    assert_eq!(out[10]["type"], "generated");
    assert_eq!(out[10]["materials"]["variants"].as_object().map(|v| v.len()), Some(5));
  }

  #[tokio::test]
  async fn export_needs_results_then_returns_base64_file() {
    let mut server = mockito::Server::new_async().await;
    let (_dir, state, _mock) = ready_state(&mut server).await;
    let export = || ClientWsMessage::Export { format: ExportFormat::Pdf, variant: None };

    let out = exchange(&state, vec![ClientWsMessage::Ping, export(), ClientWsMessage::Generate, export()]).await;
    assert_eq!(out[0]["type"], "pong");
    assert_eq!(out[1]["type"], "error");
    assert_eq!(out[1]["error"], "missing_results");

    let file = out.last().expect("export frame");
    assert_eq!(file["type"], "export_file");
    assert_eq!(file["file_name"], "UDL_AllVersions_fractions.pdf");
    assert_eq!(file["mime_type"], "application/pdf");
    let data = file["data_base64"].as_str().expect("payload");
    let bytes = base64::engine::general_purpose::STANDARD.decode(data).expect("base64");
    assert!(bytes.starts_with(b"%PDF-"));
  }
}
