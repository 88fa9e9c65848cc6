//! Content model: wizard inputs, differentiated variants, saved assignments.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{WizardError, WizardResult};

/// The five differentiated renderings produced for every objective.
/// Declaration order is the generation and export order.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Variant {
  Simplified,
  #[serde(rename = "On-Level")]
  OnLevel,
  Enriched,
  Visual,
  Scaffolded,
}

impl Variant {
  pub const ALL: [Variant; 5] = [
    Variant::Simplified,
    Variant::OnLevel,
    Variant::Enriched,
    Variant::Visual,
    Variant::Scaffolded,
  ];

  /// Short tag, identical to the serialized name.
  pub fn as_str(&self) -> &'static str {
    match self {
      Variant::Simplified => "Simplified",
      Variant::OnLevel => "On-Level",
      Variant::Enriched => "Enriched",
      Variant::Visual => "Visual",
      Variant::Scaffolded => "Scaffolded",
    }
  }

  /// Heading used in prompts and exported documents.
  pub fn display_name(&self) -> &'static str {
    match self {
      Variant::Simplified => "Simplified (Below Grade Level)",
      Variant::OnLevel => "On-Level (Grade Appropriate)",
      Variant::Enriched => "Enriched (Above Grade Level)",
      Variant::Visual => "Visual-Heavy",
      Variant::Scaffolded => "Step-by-Step Scaffolded",
    }
  }

  /// Lowercase key for file names and spreadsheet tabs.
  pub fn file_key(&self) -> &'static str {
    match self {
      Variant::Simplified => "simplified",
      Variant::OnLevel => "on_level",
      Variant::Enriched => "enriched",
      Variant::Visual => "visual_heavy",
      Variant::Scaffolded => "scaffolded",
    }
  }
}

impl std::fmt::Display for Variant {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Every editable wizard input. Used by the update API and by the
/// required-field table in `wizard`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Field {
  LearningObjective,
  GradeLevel,
  Subject,
  StudentNeeds,
  Engagement,
  Representation,
  Expression,
  Platforms,
  Resources,
  Interests,
  InterestsEvidence,
}

impl Field {
  pub const ALL: [Field; 11] = [
    Field::LearningObjective, Field::GradeLevel, Field::Subject, Field::StudentNeeds,
    Field::Engagement, Field::Representation, Field::Expression, Field::Platforms,
    Field::Resources, Field::Interests, Field::InterestsEvidence,
  ];

  pub fn label(&self) -> &'static str {
    match self {
      Field::LearningObjective => "learning objective",
      Field::GradeLevel => "grade level",
      Field::Subject => "subject",
      Field::StudentNeeds => "student needs",
      Field::Engagement => "engagement strategies",
      Field::Representation => "representation methods",
      Field::Expression => "expression options",
      Field::Platforms => "platforms",
      Field::Resources => "resources",
      Field::Interests => "student interests",
      Field::InterestsEvidence => "how interests were gathered",
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Assistant,
}

impl Role {
  pub fn as_str(&self) -> &'static str {
    match self {
      Role::User => "user",
      Role::Assistant => "assistant",
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
  pub role: Role,
  pub text: String,
}

/// Inputs collected across the seven wizard steps.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WizardState {
  // Step 1
  #[serde(default)] pub learning_objective: String,
  #[serde(default)] pub grade_level: String,
  #[serde(default)] pub subject: String,
  // Step 2
  #[serde(default)] pub student_needs: String,
  // Step 3 (UDL notes)
  #[serde(default)] pub engagement: String,
  #[serde(default)] pub representation: String,
  #[serde(default)] pub expression: String,
  // Step 4
  #[serde(default)] pub platforms: String,
  #[serde(default)] pub resources: String,
  // Step 5
  #[serde(default)] pub interests: String,
  #[serde(default)] pub interests_evidence: String,
  // Step 6
  #[serde(default)] pub conversation: Vec<ConversationTurn>,
}

impl WizardState {
  pub fn get(&self, field: Field) -> &str {
    match field {
      Field::LearningObjective => &self.learning_objective,
      Field::GradeLevel => &self.grade_level,
      Field::Subject => &self.subject,
      Field::StudentNeeds => &self.student_needs,
      Field::Engagement => &self.engagement,
      Field::Representation => &self.representation,
      Field::Expression => &self.expression,
      Field::Platforms => &self.platforms,
      Field::Resources => &self.resources,
      Field::Interests => &self.interests,
      Field::InterestsEvidence => &self.interests_evidence,
    }
  }

  pub fn set(&mut self, field: Field, value: String) {
    let slot = match field {
      Field::LearningObjective => &mut self.learning_objective,
      Field::GradeLevel => &mut self.grade_level,
      Field::Subject => &mut self.subject,
      Field::StudentNeeds => &mut self.student_needs,
      Field::Engagement => &mut self.engagement,
      Field::Representation => &mut self.representation,
      Field::Expression => &mut self.expression,
      Field::Platforms => &mut self.platforms,
      Field::Resources => &mut self.resources,
      Field::Interests => &mut self.interests,
      Field::InterestsEvidence => &mut self.interests_evidence,
    };
    *slot = value;
  }

  /// True when nothing has been entered (autosave skips blank states).
  pub fn is_blank(&self) -> bool {
    self.conversation.is_empty() && Field::ALL.iter().all(|f| self.get(*f).trim().is_empty())
  }

  /// Same field values, ignoring the conversation transcript.
  pub fn same_inputs(&self, other: &WizardState) -> bool {
    Field::ALL.iter().all(|f| self.get(*f) == other.get(*f))
  }

  /// Append a conversation turn, dropping the oldest turns beyond `cap`.
  pub fn push_turn(&mut self, turn: ConversationTurn, cap: usize) {
    self.conversation.push(turn);
    if cap > 0 && self.conversation.len() > cap {
      let excess = self.conversation.len() - cap;
      self.conversation.drain(..excess);
    }
  }
}

/// All five variant bodies from one generation pass.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationResult {
  pub variants: BTreeMap<Variant, String>,
  pub generated_at: DateTime<Utc>,
  #[serde(default)] pub model: String,
}

impl GenerationResult {
  /// Build a result only when every variant is present.
  pub fn complete(variants: BTreeMap<Variant, String>, model: &str) -> WizardResult<Self> {
    let result = Self { variants, generated_at: Utc::now(), model: model.to_string() };
    result.ensure_complete()?;
    Ok(result)
  }

  pub fn get(&self, variant: Variant) -> Option<&str> {
    self.variants.get(&variant).map(String::as_str)
  }

  pub fn missing_variants(&self) -> Vec<Variant> {
    Variant::ALL.iter().copied().filter(|v| !self.variants.contains_key(v)).collect()
  }

  pub fn ensure_complete(&self) -> WizardResult<()> {
    let missing = self.missing_variants();
    if missing.is_empty() {
      return Ok(());
    }
    let names: Vec<&str> = missing.iter().map(Variant::as_str).collect();
    Err(WizardError::Render(format!("missing variants: {}", names.join(", "))))
  }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reflections {
  #[serde(default)] pub worked_well: String,
  #[serde(default)] pub did_not_work: String,
  #[serde(default)] pub could_improve: String,
}

/// A dashboard entry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
  pub id: Uuid,
  pub name: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub form: WizardState,
  pub materials: GenerationResult,
  #[serde(default)] pub reflections: Reflections,
}

impl Assignment {
  pub fn new(name: String, form: WizardState, materials: GenerationResult) -> Self {
    let now = Utc::now();
    Self {
      id: Uuid::new_v4(),
      name,
      created_at: now,
      updated_at: now,
      form,
      materials,
      reflections: Reflections::default(),
    }
  }

  /// Case-insensitive match against the fields shown in the dashboard list.
  pub fn matches(&self, query: &str) -> bool {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
      return true;
    }
    [&self.name, &self.form.learning_objective, &self.form.subject, &self.form.grade_level]
      .iter()
      .any(|s| s.to_lowercase().contains(&q))
  }
}

/// Named set of wizard inputs saved for reuse.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Template {
  pub name: String,
  pub form: WizardState,
}
