//! Configuration: user preferences (JSON, via the store) and prompt texts (TOML).
//!
//! Preferences are loaded once at startup and saved whenever the settings API
//! changes them. Prompts have built-in defaults; a TOML file named by
//! `WIZARD_PROMPTS_PATH` may override any subset of them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::domain::Variant;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.2";
pub const DEFAULT_CONVERSATION_CAP: usize = 50;

/// Persisted as `preferences.json`. Missing keys take their defaults.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Preferences {
  pub ollama_endpoint: String,
  pub ollama_model: String,
  pub default_save_path: PathBuf,
  pub default_grade_level: String,
  pub auto_save_enabled: bool,
  pub max_conversation_turns: usize,
}

impl Default for Preferences {
  fn default() -> Self {
    let save_path = dirs::desktop_dir()
      .or_else(|| dirs::home_dir().map(|h| h.join("Desktop")))
      .unwrap_or_else(|| PathBuf::from("."));
    Self {
      ollama_endpoint: DEFAULT_ENDPOINT.into(),
      ollama_model: DEFAULT_MODEL.into(),
      default_save_path: save_path,
      default_grade_level: String::new(),
      auto_save_enabled: true,
      max_conversation_turns: DEFAULT_CONVERSATION_CAP,
    }
  }
}

impl Preferences {
  /// Trim the endpoint and fall back to defaults for blank values.
  pub fn normalized(mut self) -> Self {
    let endpoint = self.ollama_endpoint.trim().trim_end_matches('/').to_string();
    self.ollama_endpoint = if endpoint.is_empty() { DEFAULT_ENDPOINT.into() } else { endpoint };
    let model = self.ollama_model.trim().to_string();
    self.ollama_model = if model.is_empty() { DEFAULT_MODEL.into() } else { model };
    self.default_grade_level = self.default_grade_level.trim().to_string();
    self
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptConfig {
  #[serde(default)]
  pub prompts: Prompts,
}

/// Prompt texts used by the generation and conversation calls.
/// `{placeholders}` are filled with `util::fill_template`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub generation_system_template: String,
  pub generation_user_template: String,
  pub conversation_system_template: String,
  pub conversation_opening: String,
  // Per-variant instructions
  pub simplified_instructions: String,
  pub on_level_instructions: String,
  pub enriched_instructions: String,
  pub visual_instructions: String,
  pub scaffolded_instructions: String,
}

impl Prompts {
  pub fn variant_instructions(&self, variant: Variant) -> &str {
    match variant {
      Variant::Simplified => &self.simplified_instructions,
      Variant::OnLevel => &self.on_level_instructions,
      Variant::Enriched => &self.enriched_instructions,
      Variant::Visual => &self.visual_instructions,
      Variant::Scaffolded => &self.scaffolded_instructions,
    }
  }
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      generation_system_template: "You are an expert educational content creator specializing in Universal Design for Learning (UDL) principles and differentiated instruction.

{variant_instructions}

LEARNING CONTEXT:
- Learning Objective: {learning_objective}
- Grade Level: {grade_level}
- Subject: {subject}
- Student Needs: {student_needs}
{udl_context}{resources_context}{interests_context}
OUTPUT FORMAT:
Create comprehensive learning materials with the following sections:
1. **Introduction** - Hook and learning objective in student-friendly language
2. **Key Concepts** - Main ideas and vocabulary
3. **Instruction** - Teaching content and explanations
4. **Activities** - Practice opportunities and exercises
5. **Assessment** - How students can demonstrate understanding
6. **Accommodations** - Specific supports for this version

Make the content engaging, relevant, and aligned with the learning objective.
Incorporate student interests where natural and appropriate.
Ensure accessibility and WCAG 2.1 AA compliance considerations.".into(),
      generation_user_template: "Please create {variant_name} learning materials for the following:

Learning Objective: {learning_objective}
Grade Level: {grade_level}
Subject: {subject}
Student Needs: {student_needs}

Create comprehensive, engaging materials following the format specified.".into(),
      conversation_system_template: "You are an experienced instructional design consultant helping a teacher create differentiated learning materials using Universal Design for Learning (UDL) principles.

Current information provided:
- Learning Objective: {learning_objective}
- Grade Level: {grade_level}
- Subject: {subject}
- Student Needs: {student_needs}
- UDL Engagement: {engagement}
- UDL Representation: {representation}
- UDL Expression: {expression}
- Platforms: {platforms}
- Resources: {resources}
- Student Interests: {interests}

Your role:
1. Ask clarifying questions to better understand their needs
2. Offer suggestions to improve the learning materials
3. Help them think about differentiation strategies
4. Provide UDL-aligned recommendations
5. Be supportive and collaborative

Keep responses concise and focused. Ask one or two questions at a time.".into(),
      conversation_opening: "I'm creating differentiated learning materials. Based on what I've provided so far, please ask me clarifying questions or offer suggestions to improve the materials. Keep your response concise.".into(),
      simplified_instructions: "You are creating a SIMPLIFIED version (Below Grade Level) of learning materials.
- Use basic vocabulary appropriate for students 1-2 grade levels below
- Provide more scaffolding and support
- Break concepts into smaller, manageable chunks
- Use concrete examples and visual cues
- Include sentence starters and word banks
- Reduce cognitive load while maintaining learning objectives".into(),
      on_level_instructions: "You are creating an ON-LEVEL version (Grade-Appropriate) of learning materials.
- Use grade-appropriate vocabulary
- Provide balanced support and challenge
- Include clear explanations with examples
- Maintain standard expectations for the grade level
- Include opportunities for practice and application".into(),
      enriched_instructions: "You are creating an ENRICHED version (Above Grade Level) of learning materials.
- Use advanced vocabulary and complex sentence structures
- Encourage deeper analysis and critical thinking
- Include extension activities and challenges
- Provide opportunities for independent exploration
- Connect to broader concepts and real-world applications
- Reduce scaffolding to encourage independent thinking".into(),
      visual_instructions: "You are creating a VISUAL-HEAVY version of learning materials.
- Minimize text and maximize visual explanations
- Describe images, diagrams, and graphic organizers that should be included
- Use bullet points and numbered lists extensively
- Include visual cues and icons for key concepts
- Suggest charts, infographics, and visual representations
- Format for easy scanning and visual processing".into(),
      scaffolded_instructions: "You are creating a STEP-BY-STEP SCAFFOLDED version of learning materials.
- Break down every task into explicit, numbered steps
- Provide checkpoints and progress markers
- Include explicit instructions for each action
- Add \"I do, We do, You do\" structure where appropriate
- Include self-monitoring checklists
- Provide clear success criteria for each step".into(),
    }
  }
}

/// Attempt to load prompt overrides from WIZARD_PROMPTS_PATH. On any parsing/IO error, returns None.
pub fn load_prompt_config_from_env() -> Option<PromptConfig> {
  let path = std::env::var("WIZARD_PROMPTS_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<PromptConfig>(&s) {
      Ok(cfg) => {
        info!(target: "udl_wizard", %path, "Loaded prompt overrides (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "udl_wizard", %path, error = %e, "Failed to parse TOML prompt config");
        None
      }
    },
    Err(e) => {
      error!(target: "udl_wizard", %path, error = %e, "Failed to read TOML prompt config file");
      None
    }
  }
}
