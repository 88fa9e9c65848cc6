//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs its parameters and basic result info.
//! Errors leave through `ApiError`, which maps each kind to a status code.

use std::sync::Arc;

use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::Preferences;
use crate::domain::{Assignment, GenerationResult, Reflections, Template};
use crate::error::WizardError;
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;

/// `WizardError` at the HTTP boundary.
#[derive(Debug)]
pub struct ApiError(pub WizardError);

impl From<WizardError> for ApiError {
  fn from(e: WizardError) -> Self {
    Self(e)
  }
}

pub fn status_for(e: &WizardError) -> StatusCode {
  match e {
    WizardError::Connection { .. } => StatusCode::SERVICE_UNAVAILABLE,
    WizardError::Model { .. } | WizardError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
    WizardError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
    WizardError::Busy | WizardError::MissingResults | WizardError::InputsChanged => StatusCode::CONFLICT,
    WizardError::NotFound(_) => StatusCode::NOT_FOUND,
    WizardError::Render(_) | WizardError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = status_for(&self.0);
    warn!(target: "udl_wizard", %status, kind = self.0.kind(), error = %self.0, "Request failed");
    let body = ErrorOut { error: self.0.kind().to_string(), message: self.0.to_string() };
    (status, Json(body)).into_response()
  }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true, version: env!("CARGO_PKG_VERSION") })
}

// ---------- Wizard ----------

#[instrument(level = "info", skip(state))]
pub async fn http_wizard_view(State(state): State<Arc<AppState>>) -> Json<WizardView> {
  Json(logic::view(&state).await)
}

#[instrument(level = "info", skip(state, body), fields(count = body.fields.len()))]
pub async fn http_wizard_fields(
  State(state): State<Arc<AppState>>,
  Json(body): Json<FieldsIn>,
) -> Json<WizardView> {
  Json(logic::update_fields(&state, body.fields).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_wizard_next(State(state): State<Arc<AppState>>) -> ApiResult<WizardView> {
  let view = logic::next_step(&state, None).await?;
  info!(target: "wizard", step = view.step_number, "HTTP next");
  Ok(Json(view))
}

#[instrument(level = "info", skip(state))]
pub async fn http_wizard_back(State(state): State<Arc<AppState>>) -> Json<WizardView> {
  Json(logic::previous_step(&state).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_wizard_goto(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GotoIn>,
) -> ApiResult<WizardView> {
  Ok(Json(logic::go_to_step(&state, body.step, None).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_wizard_reset(State(state): State<Arc<AppState>>) -> Json<WizardView> {
  Json(logic::reset(&state).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_wizard_restore(State(state): State<Arc<AppState>>) -> ApiResult<WizardView> {
  Ok(Json(logic::restore_autosave(&state).await?))
}

// ---------- Generation / conversation / export ----------

#[instrument(level = "info", skip(state))]
pub async fn http_generate(State(state): State<Arc<AppState>>) -> ApiResult<GenerationResult> {
  Ok(Json(logic::generate(&state, None).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_conversation_start(State(state): State<Arc<AppState>>) -> ApiResult<ConversationOut> {
  let (reply, conversation) = logic::start_conversation(&state).await?;
  Ok(Json(ConversationOut { reply, conversation }))
}

#[instrument(level = "info", skip(state, body), fields(text_len = body.text.len()))]
pub async fn http_conversation_message(
  State(state): State<Arc<AppState>>,
  Json(body): Json<MessageIn>,
) -> ApiResult<ConversationOut> {
  let (reply, conversation) = logic::send_message(&state, &body.text).await?;
  Ok(Json(ConversationOut { reply, conversation }))
}

fn export_out(path: std::path::PathBuf) -> ExportOut {
  let file_name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  ExportOut { path, file_name }
}

#[instrument(level = "info", skip(state))]
pub async fn http_export(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ExportIn>,
) -> ApiResult<ExportOut> {
  let path = logic::export_current(&state, body.format, body.variant, body.directory).await?;
  Ok(Json(export_out(path)))
}

// ---------- Settings ----------

#[instrument(level = "info", skip(state))]
pub async fn http_settings_get(State(state): State<Arc<AppState>>) -> Json<Preferences> {
  Json(state.preferences().await)
}

#[instrument(level = "info", skip(state, prefs))]
pub async fn http_settings_put(
  State(state): State<Arc<AppState>>,
  Json(prefs): Json<Preferences>,
) -> ApiResult<Preferences> {
  Ok(Json(logic::update_settings(&state, prefs).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_settings_test(
  State(state): State<Arc<AppState>>,
  body: Option<Json<SettingsTestIn>>,
) -> ApiResult<ConnectionReport> {
  let body = body.map(|Json(b)| b).unwrap_or_default();
  Ok(Json(logic::test_connection(&state, body.ollama_endpoint, body.ollama_model).await?))
}

// ---------- Dashboard ----------

#[instrument(level = "info", skip(state))]
pub async fn http_assignments_list(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ListQuery>,
) -> Json<Vec<AssignmentSummary>> {
  let rows = state.store.list_assignments(q.q.as_deref());
  Json(rows.iter().map(AssignmentSummary::from).collect())
}

#[instrument(level = "info", skip(state))]
pub async fn http_assignments_save(
  State(state): State<Arc<AppState>>,
  body: Option<Json<SaveAssignmentIn>>,
) -> Result<(StatusCode, Json<Assignment>), ApiError> {
  let body = body.map(|Json(b)| b).unwrap_or_default();
  let assignment = logic::save_to_dashboard(&state, body.name).await?;
  Ok((StatusCode::CREATED, Json(assignment)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_assignment_get(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> ApiResult<Assignment> {
  Ok(Json(state.store.get_assignment(id)?))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_assignment_reflections(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<Reflections>,
) -> ApiResult<Assignment> {
  Ok(Json(state.store.update_reflections(id, body)?))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_assignment_rename(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<RenameIn>,
) -> ApiResult<Assignment> {
  Ok(Json(state.store.rename_assignment(id, &body.name)?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_assignment_delete(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  state.store.delete_assignment(id)?;
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(state))]
pub async fn http_assignment_load(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> ApiResult<WizardView> {
  Ok(Json(logic::load_assignment(&state, id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_assignment_export(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ExportIn>,
) -> ApiResult<ExportOut> {
  let path = logic::export_assignment(&state, id, body.format, body.variant, body.directory).await?;
  Ok(Json(export_out(path)))
}

// ---------- Templates ----------

#[instrument(level = "info", skip(state))]
pub async fn http_templates_list(State(state): State<Arc<AppState>>) -> Json<Vec<Template>> {
  Json(state.store.list_templates())
}

#[instrument(level = "info", skip(state, body), fields(name = %body.name))]
pub async fn http_templates_save(
  State(state): State<Arc<AppState>>,
  Json(body): Json<TemplateIn>,
) -> Result<(StatusCode, Json<Template>), ApiError> {
  let template = logic::save_template(&state, &body.name).await?;
  Ok((StatusCode::CREATED, Json(template)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_template_apply(
  State(state): State<Arc<AppState>>,
  Path(name): Path<String>,
) -> ApiResult<WizardView> {
  Ok(Json(logic::apply_template(&state, &name).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_template_delete(
  State(state): State<Arc<AppState>>,
  Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
  state.store.delete_template(&name)?;
  Ok(StatusCode::NO_CONTENT)
}
