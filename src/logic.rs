//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Building prompts from the wizard inputs
//!   - The all-or-nothing generation pass over the five variants
//!   - Refinement conversation turns (bounded transcript)
//!   - Field updates with autosave, navigation, reset and restore
//!   - Dashboard save/load, export to disk, settings and templates

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{Preferences, Prompts};
use crate::domain::{
  Assignment, ConversationTurn, Field, GenerationResult, Role, Template, Variant, WizardState,
};
use crate::error::{WizardError, WizardResult};
use crate::export::{self, ExportContent, ExportFormat};
use crate::ollama::OllamaClient;
use crate::protocol::{ConnectionReport, GenerationProgress, ProgressStage, WizardView};
use crate::state::{AppState, Generated, Session};
use crate::util::{fill_template, or_placeholder};
use crate::wizard::{validate_for_generation, Step, Transition};

const NOT_SPECIFIED: &str = "Not specified";
const NOT_YET_PROVIDED: &str = "Not yet provided";
const UNTITLED: &str = "Untitled Assignment";

// ---------- Prompts ----------

/// Labelled lines for the non-empty fields, each on its own line.
fn context_lines(state: &WizardState, fields: &[(Field, &str)]) -> String {
  fields
    .iter()
    .filter(|(f, _)| !state.get(*f).trim().is_empty())
    .map(|(f, label)| format!("{}: {}\n", label, state.get(*f).trim()))
    .collect()
}

/// System and user prompt for one variant.
pub fn generation_prompts(prompts: &Prompts, state: &WizardState, variant: Variant) -> (String, String) {
  let udl = context_lines(state, &[
    (Field::Engagement, "Engagement Strategies"),
    (Field::Representation, "Representation Methods"),
    (Field::Expression, "Expression Options"),
  ]);
  let resources = context_lines(state, &[
    (Field::Platforms, "Available Platforms"),
    (Field::Resources, "Available Resources"),
  ]);
  let interests = context_lines(state, &[
    (Field::Interests, "Student Interests"),
    (Field::InterestsEvidence, "How interests were gathered"),
  ]);

  let objective = or_placeholder(&state.learning_objective, NOT_SPECIFIED);
  let grade = or_placeholder(&state.grade_level, NOT_SPECIFIED);
  let subject = or_placeholder(&state.subject, NOT_SPECIFIED);
  let needs = or_placeholder(&state.student_needs, NOT_SPECIFIED);

  let system = fill_template(&prompts.generation_system_template, &[
    ("variant_instructions", prompts.variant_instructions(variant)),
    ("learning_objective", objective),
    ("grade_level", grade),
    ("subject", subject),
    ("student_needs", needs),
    ("udl_context", udl.as_str()),
    ("resources_context", resources.as_str()),
    ("interests_context", interests.as_str()),
  ]);
  let user = fill_template(&prompts.generation_user_template, &[
    ("variant_name", variant.display_name()),
    ("learning_objective", objective),
    ("grade_level", grade),
    ("subject", subject),
    ("student_needs", needs),
  ]);
  (system, user)
}

fn or_missing(value: &str) -> &str {
  or_placeholder(value, NOT_YET_PROVIDED)
}

pub fn conversation_system_prompt(prompts: &Prompts, state: &WizardState) -> String {
  fill_template(&prompts.conversation_system_template, &[
    ("learning_objective", or_missing(&state.learning_objective)),
    ("grade_level", or_missing(&state.grade_level)),
    ("subject", or_missing(&state.subject)),
    ("student_needs", or_missing(&state.student_needs)),
    ("engagement", or_missing(&state.engagement)),
    ("representation", or_missing(&state.representation)),
    ("expression", or_missing(&state.expression)),
    ("platforms", or_missing(&state.platforms)),
    ("resources", or_missing(&state.resources)),
    ("interests", or_missing(&state.interests)),
  ])
}

// ---------- View / autosave ----------

fn view_of(state: &AppState, session: &Session) -> WizardView {
  let step = session.wizard.step();
  WizardView {
    step,
    step_number: step.number(),
    total_steps: Step::ALL.len(),
    title: step.title(),
    required: step.required_fields(),
    form: session.wizard.state().clone(),
    materials: session.materials.as_ref().map(|g| g.result.clone()),
    generating: state.is_generating(),
    autosave_available: state.store.load_autosave().is_some(),
  }
}

pub async fn view(state: &AppState) -> WizardView {
  let session = state.session.lock().await;
  view_of(state, &session)
}

/// Persist the form if enabled; a blank form removes the autosave file.
/// Failures are logged, never returned.
async fn autosave(state: &AppState, form: &WizardState) {
  if !state.prefs.read().await.auto_save_enabled {
    return;
  }
  let written = if form.is_blank() {
    state.store.clear_autosave()
  } else {
    state.store.save_autosave(form)
  };
  if let Err(e) = written {
    warn!(target: "store", error = %e, "Autosave failed");
  }
}

#[instrument(level = "info", skip(state, fields), fields(count = fields.len()))]
pub async fn update_fields(state: &AppState, fields: BTreeMap<Field, String>) -> WizardView {
  let mut session = state.session.lock().await;
  for (field, value) in fields {
    session.wizard.state_mut().set(field, value);
  }
  autosave(state, session.wizard.state()).await;
  view_of(state, &session)
}

// ---------- Navigation ----------

/// Apply a transition; arriving on the last step starts generation.
async fn after_transition(
  state: &AppState,
  transition: Transition,
  progress: Option<&UnboundedSender<GenerationProgress>>,
) -> WizardResult<WizardView> {
  if transition == Transition::ReadyToGenerate {
    generate(state, progress).await?;
  }
  Ok(view(state).await)
}

pub async fn next_step(
  state: &AppState,
  progress: Option<&UnboundedSender<GenerationProgress>>,
) -> WizardResult<WizardView> {
  let transition = state.session.lock().await.wizard.advance()?;
  after_transition(state, transition, progress).await
}

pub async fn previous_step(state: &AppState) -> WizardView {
  let mut session = state.session.lock().await;
  session.wizard.back();
  view_of(state, &session)
}

pub async fn go_to_step(
  state: &AppState,
  number: usize,
  progress: Option<&UnboundedSender<GenerationProgress>>,
) -> WizardResult<WizardView> {
  let target = Step::from_number(number).ok_or_else(|| {
    WizardError::Validation(format!("Step must be between 1 and {}.", Step::ALL.len()))
  })?;
  let transition = state.session.lock().await.wizard.go_to(target)?;
  after_transition(state, transition, progress).await
}

/// Empty form at step 1 with the default grade; the autosave file is removed.
#[instrument(level = "info", skip(state))]
pub async fn reset(state: &AppState) -> WizardView {
  let grade = state.prefs.read().await.default_grade_level.clone();
  let mut session = state.session.lock().await;
  session.wizard.reset(&grade);
  session.materials = None;
  if let Err(e) = state.store.clear_autosave() {
    warn!(target: "store", error = %e, "Could not clear autosave");
  }
  view_of(state, &session)
}

#[instrument(level = "info", skip(state))]
pub async fn restore_autosave(state: &AppState) -> WizardResult<WizardView> {
  let form = state
    .store
    .load_autosave()
    .ok_or_else(|| WizardError::NotFound("autosaved form".into()))?;
  let mut session = state.session.lock().await;
  session.wizard.load(form);
  session.materials = None;
  info!(target: "wizard", "Autosaved form restored");
  Ok(view_of(state, &session))
}

// ---------- Generation ----------

/// Generate all five variants from a snapshot of the current inputs.
///
/// Calls run one at a time without holding the session lock. The first
/// failure aborts the pass and nothing is kept; only a complete result
/// replaces the session's materials. If the inputs were changed while the
/// pass ran, the result is dropped with `InputsChanged`.
#[instrument(level = "info", skip(state, progress))]
pub async fn generate(
  state: &AppState,
  progress: Option<&UnboundedSender<GenerationProgress>>,
) -> WizardResult<GenerationResult> {
  let _guard = state.begin_generation()?;
  let form = state.session.lock().await.wizard.state().clone();
  validate_for_generation(&form)?;
  let client = state.client().await;

  let total = Variant::ALL.len();
  let mut bodies = BTreeMap::new();
  for (i, variant) in Variant::ALL.into_iter().enumerate() {
    let report = |stage| {
      if let Some(tx) = progress {
        // Receiver gone means the socket closed; the pass still completes.
        let _ = tx.send(GenerationProgress { variant, index: i + 1, total, stage });
      }
    };
    report(ProgressStage::Started);
    let (system, user) = generation_prompts(&state.prompts, &form, variant);
    let body = client.generate(&user, &system).await.map_err(|e| {
      error!(target: "generation", %variant, error = %e, "Variant failed; discarding pass");
      e
    })?;
    debug!(target: "generation", %variant, len = body.len(), "Variant generated");
    bodies.insert(variant, body);
    report(ProgressStage::Finished);
  }

  let result = GenerationResult::complete(bodies, &client.model)?;
  let mut session = state.session.lock().await;
  if !session.wizard.state().same_inputs(&form) {
    warn!(target: "generation", "Inputs changed during the pass; discarding result");
    return Err(WizardError::InputsChanged);
  }
  session.materials = Some(Generated { form, result: result.clone() });
  info!(target: "generation", model = %client.model, "Generation pass complete");
  Ok(result)
}

// ---------- Conversation ----------

/// Fresh refinement conversation: the opening request and the model's reply
/// replace any previous transcript.
#[instrument(level = "info", skip(state))]
pub async fn start_conversation(state: &AppState) -> WizardResult<(String, Vec<ConversationTurn>)> {
  let form = state.session.lock().await.wizard.state().clone();
  let system = conversation_system_prompt(&state.prompts, &form);
  let opening = state.prompts.conversation_opening.clone();
  let reply = state.client().await.converse(&system, &[], &opening).await?;

  let cap = state.prefs.read().await.max_conversation_turns;
  let mut session = state.session.lock().await;
  let form = session.wizard.state_mut();
  form.conversation.clear();
  form.push_turn(ConversationTurn { role: Role::User, text: opening }, cap);
  form.push_turn(ConversationTurn { role: Role::Assistant, text: reply.clone() }, cap);
  let transcript = form.conversation.clone();
  autosave(state, session.wizard.state()).await;
  Ok((reply, transcript))
}

#[instrument(level = "info", skip(state, text), fields(text_len = text.len()))]
pub async fn send_message(state: &AppState, text: &str) -> WizardResult<(String, Vec<ConversationTurn>)> {
  let text = text.trim();
  if text.is_empty() {
    return Err(WizardError::Validation("Message cannot be empty.".into()));
  }
  let form = state.session.lock().await.wizard.state().clone();
  let system = conversation_system_prompt(&state.prompts, &form);
  let reply = state.client().await.converse(&system, &form.conversation, text).await?;

  let cap = state.prefs.read().await.max_conversation_turns;
  let mut session = state.session.lock().await;
  let form = session.wizard.state_mut();
  form.push_turn(ConversationTurn { role: Role::User, text: text.to_string() }, cap);
  form.push_turn(ConversationTurn { role: Role::Assistant, text: reply.clone() }, cap);
  let transcript = form.conversation.clone();
  autosave(state, session.wizard.state()).await;
  Ok((reply, transcript))
}

// ---------- Dashboard ----------

fn default_assignment_name(form: &WizardState) -> String {
  let objective = form.learning_objective.trim();
  if objective.is_empty() {
    UNTITLED.to_string()
  } else {
    objective.chars().take(50).collect::<String>().trim().to_string()
  }
}

#[instrument(level = "info", skip(state))]
pub async fn save_to_dashboard(state: &AppState, name: Option<String>) -> WizardResult<Assignment> {
  let Generated { form, result } = state
    .session
    .lock()
    .await
    .materials
    .clone()
    .ok_or(WizardError::MissingResults)?;
  let name = name
    .map(|n| n.trim().to_string())
    .filter(|n| !n.is_empty())
    .unwrap_or_else(|| default_assignment_name(&form));
  let assignment = Assignment::new(name, form, result);
  state.store.insert_assignment(&assignment)?;
  info!(target: "store", id = %assignment.id, name = %assignment.name, "Assignment saved to dashboard");
  Ok(assignment)
}

/// Copy a saved assignment's inputs into the wizard. The stored record is
/// not touched; results must be regenerated or re-saved explicitly.
#[instrument(level = "info", skip(state))]
pub async fn load_assignment(state: &AppState, id: Uuid) -> WizardResult<WizardView> {
  let assignment = state.store.get_assignment(id)?;
  let mut session = state.session.lock().await;
  session.wizard.load(assignment.form.clone());
  session.materials = None;
  autosave(state, session.wizard.state()).await;
  Ok(view_of(state, &session))
}

// ---------- Export ----------

async fn export_dir(state: &AppState, directory: Option<PathBuf>) -> PathBuf {
  match directory {
    Some(dir) if !dir.as_os_str().is_empty() => dir,
    _ => state.prefs.read().await.default_save_path.clone(),
  }
}

fn write_export(
  dir: &Path,
  format: ExportFormat,
  form: &WizardState,
  materials: &GenerationResult,
  variant: Option<Variant>,
) -> WizardResult<PathBuf> {
  let content = ExportContent { form, materials, variant };
  export::export_to_dir(dir, format, &content)
}

#[instrument(level = "info", skip(state))]
pub async fn export_current(
  state: &AppState,
  format: ExportFormat,
  variant: Option<Variant>,
  directory: Option<PathBuf>,
) -> WizardResult<PathBuf> {
  let dir = export_dir(state, directory).await;
  let session = state.session.lock().await;
  let generated = session.materials.as_ref().ok_or(WizardError::MissingResults)?;
  write_export(&dir, format, &generated.form, &generated.result, variant)
}

#[instrument(level = "info", skip(state))]
pub async fn export_assignment(
  state: &AppState,
  id: Uuid,
  format: ExportFormat,
  variant: Option<Variant>,
  directory: Option<PathBuf>,
) -> WizardResult<PathBuf> {
  let assignment = state.store.get_assignment(id)?;
  let dir = export_dir(state, directory).await;
  write_export(&dir, format, &assignment.form, &assignment.materials, variant)
}

/// Rendered bytes of the current results plus their file name.
pub async fn render_current(
  state: &AppState,
  format: ExportFormat,
  variant: Option<Variant>,
) -> WizardResult<(String, Vec<u8>)> {
  let session = state.session.lock().await;
  let generated = session.materials.as_ref().ok_or(WizardError::MissingResults)?;
  let content = ExportContent { form: &generated.form, materials: &generated.result, variant };
  let bytes = export::render(format, &content)?;
  Ok((export::file_name(format, &content), bytes))
}

// ---------- Settings ----------

/// Save preferences and rebuild the client from them.
#[instrument(level = "info", skip(state, prefs))]
pub async fn update_settings(state: &AppState, prefs: Preferences) -> WizardResult<Preferences> {
  let prefs = prefs.normalized();
  let client = OllamaClient::from_preferences(&prefs)?;
  state.store.save_preferences(&prefs)?;
  *state.client.write().await = client;
  *state.prefs.write().await = prefs.clone();
  info!(target: "udl_wizard", endpoint = %prefs.ollama_endpoint, model = %prefs.ollama_model, "Settings updated");
  Ok(prefs)
}

/// List installed models at the given (or saved) endpoint and check the
/// chosen model is among them. Nothing is persisted.
#[instrument(level = "info", skip(state))]
pub async fn test_connection(
  state: &AppState,
  endpoint: Option<String>,
  model: Option<String>,
) -> WizardResult<ConnectionReport> {
  let saved = state.preferences().await;
  let candidate = Preferences {
    ollama_endpoint: endpoint.unwrap_or(saved.ollama_endpoint.clone()),
    ollama_model: model.unwrap_or(saved.ollama_model.clone()),
    ..saved
  }
  .normalized();
  let client = OllamaClient::from_preferences(&candidate)?;
  let models = client.list_models().await?;
  let wanted = &candidate.ollama_model;
  // Tags carry a ":latest" style suffix the user usually omits.
  let model_available = models
    .iter()
    .any(|m| m == wanted || m.split(':').next() == Some(wanted.as_str()));
  Ok(ConnectionReport {
    endpoint: candidate.ollama_endpoint,
    model: candidate.ollama_model,
    models,
    model_available,
  })
}

// ---------- Templates ----------

/// Save the current inputs (without the transcript) under `name`.
#[instrument(level = "info", skip(state))]
pub async fn save_template(state: &AppState, name: &str) -> WizardResult<Template> {
  let name = name.trim();
  if name.is_empty() {
    return Err(WizardError::Validation("Template name cannot be empty.".into()));
  }
  let mut form = state.session.lock().await.wizard.state().clone();
  form.conversation.clear();
  let template = Template { name: name.to_string(), form };
  state.store.save_template(template.clone())?;
  Ok(template)
}

#[instrument(level = "info", skip(state))]
pub async fn apply_template(state: &AppState, name: &str) -> WizardResult<WizardView> {
  let template = state.store.get_template(name)?;
  let mut session = state.session.lock().await;
  session.wizard.load(template.form);
  session.materials = None;
  autosave(state, session.wizard.state()).await;
  Ok(view_of(state, &session))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::state::tests::test_state;
  use mockito::Matcher;

  const BODY: &str = r###"{"response": "## Introduction\nLet's learn.\n## Activities\n- Practice", "done": true}"###;

  async fn mock_generate(server: &mut mockito::ServerGuard, hits: usize) -> mockito::Mock {
    server
      .mock("POST", "/api/generate")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(BODY)
      .expect(hits)
      .create_async()
      .await
  }

  async fn fill_fractions(state: &AppState) {
    let fields = BTreeMap::from([
      (Field::LearningObjective, "fractions".to_string()),
      (Field::GradeLevel, "4".to_string()),
      (Field::StudentNeeds, "reading support".to_string()),
    ]);
    update_fields(state, fields).await;
  }

  #[test]
  fn optional_context_lines_only_when_present() {
    let prompts = Prompts::default();
    let mut form = WizardState {
      learning_objective: "fractions".into(),
      grade_level: "4".into(),
      student_needs: "reading support".into(),
      ..Default::default()
    };
    let (system, user) = generation_prompts(&prompts, &form, Variant::Scaffolded);
    assert!(system.contains("STEP-BY-STEP SCAFFOLDED"));
    assert!(system.contains("- Subject: Not specified"));
    assert!(!system.contains("Engagement Strategies"));
    assert!(user.contains("Step-by-Step Scaffolded learning materials"));

    form.engagement = "choice boards".into();
    form.interests = "soccer".into();
    let (system, _) = generation_prompts(&prompts, &form, Variant::Scaffolded);
    assert!(system.contains("Engagement Strategies: choice boards"));
    assert!(system.contains("Student Interests: soccer"));
    assert!(!system.contains("Available Platforms"));
  }

  #[test]
  fn conversation_prompt_marks_missing_inputs() {
    let form = WizardState { learning_objective: "fractions".into(), ..Default::default() };
    let system = conversation_system_prompt(&Prompts::default(), &form);
    assert!(system.contains("- Learning Objective: fractions"));
    assert!(system.contains("- Platforms: Not yet provided"));
  }

  #[tokio::test]
  async fn fractions_scenario_yields_five_variants() {
    let mut server = mockito::Server::new_async().await;
    let mock = mock_generate(&mut server, 5).await;
    let (_dir, state) = test_state(&server.url());
    fill_fractions(&state).await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let result = generate(&state, Some(&tx)).await.expect("generation");
    mock.assert_async().await;

    let keys: Vec<Variant> = result.variants.keys().copied().collect();
    assert_eq!(keys, Variant::ALL.to_vec());
    assert!(result.variants.values().all(|b| !b.trim().is_empty()));

    drop(tx);
    let mut events = Vec::new();
    while let Some(e) = rx.recv().await {
      events.push(e);
    }
    assert_eq!(events.len(), 10);
    assert_eq!(events[9], GenerationProgress { variant: Variant::Scaffolded, index: 5, total: 5, stage: ProgressStage::Finished });
    assert!(state.session.lock().await.materials.is_some());
  }

  #[tokio::test]
  async fn server_down_leaves_state_and_dashboard_untouched() {
    let (_dir, state) = test_state("http://127.0.0.1:1");
    fill_fractions(&state).await;
    let before = state.session.lock().await.wizard.state().clone();

    let err = generate(&state, None).await.unwrap_err();
    assert!(matches!(err, WizardError::Connection { .. }), "got {err:?}");
    assert_eq!(state.session.lock().await.wizard.state(), &before);
    assert!(state.session.lock().await.materials.is_none());
    assert!(state.store.list_assignments(None).is_empty());
    assert_eq!(save_to_dashboard(&state, None).await.unwrap_err(), WizardError::MissingResults);
    assert!(!state.is_generating());
  }

  #[tokio::test]
  async fn mid_pass_failure_discards_partial_results() {
    let mut server = mockito::Server::new_async().await;
    let mut mocks = Vec::new();
    for name in [r"Simplified \(Below", r"On-Level \(Grade"] {
      let mock = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::Regex(name.to_string()))
        .with_status(200)
        .with_body(BODY)
        .create_async()
        .await;
      mocks.push(mock);
    }
    let _failing = server
      .mock("POST", "/api/generate")
      .match_body(Matcher::Regex(r"Enriched \(Above".to_string()))
      .with_status(500)
      .with_body(r#"{"error": "out of memory"}"#)
      .create_async()
      .await;

    let (_dir, state) = test_state(&server.url());
    fill_fractions(&state).await;
    let err = generate(&state, None).await.unwrap_err();
    assert!(matches!(err, WizardError::MalformedResponse(ref m) if m.contains("out of memory")));
    assert!(state.session.lock().await.materials.is_none());
  }

  #[tokio::test]
  async fn edits_during_a_pass_discard_its_result() {
    use std::io::Write;
    use std::time::Duration;

    let mut server = mockito::Server::new_async().await;
    let _slow = server
      .mock("POST", "/api/generate")
      .with_status(200)
      .with_chunked_body(|w| {
        std::thread::sleep(Duration::from_millis(150));
        w.write_all(BODY.as_bytes())
      })
      .create_async()
      .await;
    let (_dir, state) = test_state(&server.url());
    fill_fractions(&state).await;

    let edit = async {
      tokio::time::sleep(Duration::from_millis(100)).await;
      update_fields(&state, BTreeMap::from([(Field::LearningObjective, "photosynthesis".to_string())])).await;
    };
    let (outcome, _) = tokio::join!(generate(&state, None), edit);
    assert_eq!(outcome.unwrap_err(), WizardError::InputsChanged);
    assert!(state.session.lock().await.materials.is_none());
    assert_eq!(save_to_dashboard(&state, None).await.unwrap_err(), WizardError::MissingResults);
    assert!(!state.is_generating());
  }

  #[tokio::test]
  async fn saved_results_stay_paired_with_their_inputs() {
    let mut server = mockito::Server::new_async().await;
    let _mock = mock_generate(&mut server, 5).await;
    let (_dir, state) = test_state(&server.url());
    fill_fractions(&state).await;
    generate(&state, None).await.unwrap();

    update_fields(&state, BTreeMap::from([(Field::LearningObjective, "decimals".to_string())])).await;
    let saved = save_to_dashboard(&state, None).await.unwrap();
    assert_eq!(saved.name, "fractions");
    assert_eq!(saved.form.learning_objective, "fractions");

    let (name, _) = render_current(&state, ExportFormat::Docx, None).await.unwrap();
    assert_eq!(name, "UDL_AllVersions_fractions.docx");
  }

  #[tokio::test]
  async fn concurrent_generation_is_busy() {
    let (_dir, state) = test_state("http://127.0.0.1:1");
    fill_fractions(&state).await;
    let _held = state.begin_generation().unwrap();
    assert_eq!(generate(&state, None).await.unwrap_err(), WizardError::Busy);
  }

  #[tokio::test]
  async fn generation_requires_steps_one_and_two() {
    let (_dir, state) = test_state("http://127.0.0.1:1");
    let err = generate(&state, None).await.unwrap_err();
    assert!(matches!(err, WizardError::Validation(_)));
  }

  #[tokio::test]
  async fn reaching_last_step_triggers_generation() {
    let mut server = mockito::Server::new_async().await;
    let mock = mock_generate(&mut server, 5).await;
    let (_dir, state) = test_state(&server.url());
    fill_fractions(&state).await;

    let view = go_to_step(&state, 6, None).await.unwrap();
    assert_eq!(view.step, Step::Conversation);
    assert!(view.materials.is_none());

    let view = next_step(&state, None).await.unwrap();
    assert_eq!(view.step, Step::Generate);
    assert!(view.materials.is_some());
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn loading_and_regenerating_keeps_stored_assignment() {
    let mut server = mockito::Server::new_async().await;
    let _mock = mock_generate(&mut server, 10).await;
    let (_dir, state) = test_state(&server.url());
    fill_fractions(&state).await;
    generate(&state, None).await.unwrap();
    let saved = save_to_dashboard(&state, None).await.unwrap();
    assert_eq!(saved.name, "fractions");

    reset(&state).await;
    let view = load_assignment(&state, saved.id).await.unwrap();
    assert_eq!(view.step, Step::Objective);
    assert_eq!(view.form.learning_objective, "fractions");

    update_fields(&state, BTreeMap::from([(Field::LearningObjective, "decimals".to_string())])).await;
    generate(&state, None).await.unwrap();

    assert_eq!(state.store.get_assignment(saved.id).unwrap(), saved);
    assert_eq!(state.store.list_assignments(None).len(), 1);
  }

  #[tokio::test]
  async fn autosave_round_trips_and_reset_clears_it() {
    let (_dir, state) = test_state("http://127.0.0.1:1");
    fill_fractions(&state).await;
    let form = state.session.lock().await.wizard.state().clone();
    assert_eq!(state.store.load_autosave(), Some(form.clone()));

    let view = reset(&state).await;
    assert!(view.form.is_blank());
    assert!(!view.autosave_available);

    state.store.save_autosave(&form).unwrap();
    let view = restore_autosave(&state).await.unwrap();
    assert_eq!(view.form, form);
  }

  #[tokio::test]
  async fn clearing_every_field_removes_autosave() {
    let (_dir, state) = test_state("http://127.0.0.1:1");
    update_fields(&state, BTreeMap::from([(Field::LearningObjective, "fractions".to_string())])).await;
    assert!(state.store.load_autosave().is_some());

    let view = update_fields(&state, BTreeMap::from([(Field::LearningObjective, String::new())])).await;
    assert!(view.form.is_blank());
    assert!(state.store.load_autosave().is_none());
    assert!(!view.autosave_available);
    assert!(matches!(restore_autosave(&state).await, Err(WizardError::NotFound(_))));
  }

  #[tokio::test]
  async fn autosave_respects_preference() {
    let (_dir, state) = test_state("http://127.0.0.1:1");
    let prefs = Preferences { auto_save_enabled: false, ..state.preferences().await };
    update_settings(&state, prefs).await.unwrap();
    fill_fractions(&state).await;
    assert!(state.store.load_autosave().is_none());
  }

  #[tokio::test]
  async fn conversation_is_bounded_by_preference() {
    let mut server = mockito::Server::new_async().await;
    let _chat = server
      .mock("POST", "/api/chat")
      .with_status(200)
      .with_body(r#"{"message": {"role": "assistant", "content": "What do they enjoy?"}}"#)
      .expect(3)
      .create_async()
      .await;
    let (_dir, state) = test_state(&server.url());
    let prefs = Preferences { max_conversation_turns: 4, ..state.preferences().await };
    update_settings(&state, prefs).await.unwrap();

    let (reply, transcript) = start_conversation(&state).await.unwrap();
    assert_eq!(reply, "What do they enjoy?");
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].text, Prompts::default().conversation_opening);

    send_message(&state, "soccer").await.unwrap();
    let (_, transcript) = send_message(&state, "and music").await.unwrap();
    assert_eq!(transcript.len(), 4);
    assert_eq!(transcript[0].text, "soccer");
    assert_eq!(transcript[3].role, Role::Assistant);

    assert!(matches!(send_message(&state, "   ").await, Err(WizardError::Validation(_))));
  }

  #[tokio::test]
  async fn export_uses_default_save_path() {
    let mut server = mockito::Server::new_async().await;
    let _mock = mock_generate(&mut server, 5).await;
    let (dir, state) = test_state(&server.url());
    assert_eq!(
      export_current(&state, ExportFormat::Docx, None, None).await.unwrap_err(),
      WizardError::MissingResults
    );
    fill_fractions(&state).await;
    generate(&state, None).await.unwrap();

    let path = export_current(&state, ExportFormat::Docx, None, None).await.unwrap();
    assert!(path.starts_with(dir.path().join("exports")));
    assert!(path.ends_with("UDL_AllVersions_fractions.docx"));

    let saved = save_to_dashboard(&state, Some("  Week 3  ".into())).await.unwrap();
    assert_eq!(saved.name, "Week 3");
    let other = dir.path().join("elsewhere");
    let path = export_assignment(&state, saved.id, ExportFormat::Xlsx, Some(Variant::Visual), Some(other.clone()))
      .await
      .unwrap();
    assert!(path.starts_with(&other));

    let (name, bytes) = render_current(&state, ExportFormat::Pdf, Some(Variant::Enriched)).await.unwrap();
    assert_eq!(name, "UDL_enriched_fractions.pdf");
    assert!(bytes.starts_with(b"%PDF-"));
  }

  #[tokio::test]
  async fn connection_test_matches_tagged_models() {
    let mut server = mockito::Server::new_async().await;
    let _tags = server
      .mock("GET", "/api/tags")
      .with_status(200)
      .with_body(r#"{"models": [{"name": "llama3.2:latest"}]}"#)
      .create_async()
      .await;
    let (_dir, state) = test_state("http://127.0.0.1:1");

    let report = test_connection(&state, Some(format!("{}/", server.url())), None).await.unwrap();
    assert!(report.model_available);
    assert_eq!(report.endpoint, server.url());

    let report = test_connection(&state, Some(server.url()), Some("mistral".into())).await.unwrap();
    assert!(!report.model_available);
    // Nothing saved.
    assert_eq!(state.preferences().await.ollama_endpoint, "http://127.0.0.1:1");
  }

  #[tokio::test]
  async fn templates_drop_transcript_and_reload_inputs() {
    let (_dir, state) = test_state("http://127.0.0.1:1");
    fill_fractions(&state).await;
    state.session.lock().await.wizard.state_mut().conversation.push(ConversationTurn {
      role: Role::User,
      text: "hi".into(),
    });
    assert!(matches!(save_template(&state, " ").await, Err(WizardError::Validation(_))));
    let template = save_template(&state, "Grade 4 math").await.unwrap();
    assert!(template.form.conversation.is_empty());

    reset(&state).await;
    let view = apply_template(&state, "Grade 4 math").await.unwrap();
    assert_eq!(view.form.learning_objective, "fractions");
    assert_eq!(apply_template(&state, "nope").await.unwrap_err().kind(), "not_found");
  }
}
