//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Assignment, ConversationTurn, Field, GenerationResult, Variant, WizardState};
use crate::export::ExportFormat;
use crate::wizard::Step;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    View,
    UpdateFields {
        fields: BTreeMap<Field, String>,
    },
    Next,
    Back,
    Generate,
    StartConversation,
    ConversationMessage {
        text: String,
    },
    Export {
        format: ExportFormat,
        #[serde(default)]
        variant: Option<Variant>,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    View {
        view: WizardView,
    },
    /// One per variant start and finish during a generation pass.
    Progress {
        progress: GenerationProgress,
    },
    Generated {
        materials: GenerationResult,
    },
    Conversation {
        reply: String,
        conversation: Vec<ConversationTurn>,
    },
    ExportFile {
        file_name: String,
        mime_type: String,
        data_base64: String,
    },
    Error {
        error: String,
        message: String,
    },
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Started,
    Finished,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationProgress {
    pub variant: Variant,
    /// 1-based position in the pass.
    pub index: usize,
    pub total: usize,
    pub stage: ProgressStage,
}

/// Everything a frontend needs to draw the current wizard screen.
#[derive(Clone, Debug, Serialize)]
pub struct WizardView {
    pub step: Step,
    pub step_number: usize,
    pub total_steps: usize,
    pub title: &'static str,
    pub required: &'static [Field],
    pub form: WizardState,
    pub materials: Option<GenerationResult>,
    pub generating: bool,
    pub autosave_available: bool,
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct FieldsIn {
    pub fields: BTreeMap<Field, String>,
}

#[derive(Debug, Deserialize)]
pub struct GotoIn {
    /// 1-based step number.
    pub step: usize,
}

#[derive(Deserialize)]
pub struct MessageIn {
    pub text: String,
}

#[derive(Serialize)]
pub struct ConversationOut {
    pub reply: String,
    pub conversation: Vec<ConversationTurn>,
}

#[derive(Debug, Deserialize)]
pub struct ExportIn {
    pub format: ExportFormat,
    #[serde(default)]
    pub variant: Option<Variant>,
    /// Defaults to the save location from preferences.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

#[derive(Serialize)]
pub struct ExportOut {
    pub path: PathBuf,
    pub file_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SettingsTestIn {
    #[serde(default)]
    pub ollama_endpoint: Option<String>,
    #[serde(default)]
    pub ollama_model: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ConnectionReport {
    pub endpoint: String,
    pub model: String,
    pub models: Vec<String>,
    pub model_available: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveAssignmentIn {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub q: Option<String>,
}

/// Dashboard list row; the full record is served by the detail endpoint.
#[derive(Debug, Serialize)]
pub struct AssignmentSummary {
    pub id: Uuid,
    pub name: String,
    pub learning_objective: String,
    pub grade_level: String,
    pub subject: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Assignment> for AssignmentSummary {
    fn from(a: &Assignment) -> Self {
        Self {
            id: a.id,
            name: a.name.clone(),
            learning_objective: a.form.learning_objective.clone(),
            grade_level: a.form.grade_level.clone(),
            subject: a.form.subject.clone(),
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

#[derive(Deserialize)]
pub struct RenameIn {
    pub name: String,
}

#[derive(Deserialize)]
pub struct TemplateIn {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorOut {
    pub error: String,
    pub message: String,
}
