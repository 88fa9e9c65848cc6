//! Seven-step wizard as an explicit state machine.
//!
//! Forward moves are gated by a table of required fields per step; backward
//! moves never are. Landing on the final step tells the caller to start a
//! generation pass.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::{Field, WizardState};
use crate::error::{WizardError, WizardResult};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Objective,
    Needs,
    Udl,
    Resources,
    Interests,
    Conversation,
    Generate,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::Objective,
        Step::Needs,
        Step::Udl,
        Step::Resources,
        Step::Interests,
        Step::Conversation,
        Step::Generate,
    ];

    /// 1-based position shown to the user.
    pub fn number(self) -> usize {
        self.index() + 1
    }

    fn index(self) -> usize {
        Step::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }

    pub fn from_number(n: usize) -> Option<Step> {
        n.checked_sub(1).and_then(|i| Step::ALL.get(i).copied())
    }

    pub fn next(self) -> Option<Step> {
        Step::ALL.get(self.index() + 1).copied()
    }

    pub fn prev(self) -> Option<Step> {
        self.index().checked_sub(1).map(|i| Step::ALL[i])
    }

    pub fn title(self) -> &'static str {
        match self {
            Step::Objective => "Define Your Learning Objective",
            Step::Needs => "Describe Student Learning Needs",
            Step::Udl => "Universal Design for Learning",
            Step::Resources => "Available Resources",
            Step::Interests => "Student Interests",
            Step::Conversation => "Refine with AI",
            Step::Generate => "Generate Materials",
        }
    }

    pub fn required_fields(self) -> &'static [Field] {
        REQUIRED_FIELDS
            .iter()
            .find(|(s, _)| *s == self)
            .map(|(_, fields)| *fields)
            .unwrap_or(&[])
    }
}

/// Steps absent from this table have no required input.
const REQUIRED_FIELDS: &[(Step, &[Field])] = &[
    (Step::Objective, &[Field::LearningObjective, Field::GradeLevel]),
    (Step::Needs, &[Field::StudentNeeds]),
];

/// Result of a successful navigation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Moved(Step),
    /// Arrived on the final step; the caller must start generation.
    ReadyToGenerate,
    /// Already at the boundary; nothing changed.
    Stayed(Step),
}

/// Check the required fields of one step.
pub fn validate_step(step: Step, state: &WizardState) -> WizardResult<()> {
    match step.required_fields().iter().find(|f| state.get(**f).trim().is_empty()) {
        Some(field) => Err(WizardError::Validation(format!(
            "Step {} ({}): please provide the {}.",
            step.number(),
            step.title(),
            field.label()
        ))),
        None => Ok(()),
    }
}

/// Check every step that gates generation.
pub fn validate_for_generation(state: &WizardState) -> WizardResult<()> {
    Step::ALL.iter().try_for_each(|s| validate_step(*s, state))
}

#[derive(Clone, Debug, Default)]
pub struct WizardController {
    step: Step,
    state: WizardState,
}

impl WizardController {
    /// Fresh wizard with the default grade pre-filled.
    pub fn new(default_grade: &str) -> Self {
        let mut state = WizardState::default();
        state.grade_level = default_grade.trim().to_string();
        Self { step: Step::default(), state }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut WizardState {
        &mut self.state
    }

    #[instrument(level = "debug", skip(self), fields(step = ?self.step))]
    pub fn advance(&mut self) -> WizardResult<Transition> {
        let current = self.step;
        validate_step(current, &self.state)?;
        match current.next() {
            Some(next) => Ok(self.enter(next)),
            None => Ok(Transition::Stayed(current)),
        }
    }

    pub fn back(&mut self) -> Transition {
        match self.step.prev() {
            Some(prev) => self.enter(prev),
            None => Transition::Stayed(self.step),
        }
    }

    /// Jump to any step. Forward jumps validate every step being left behind.
    #[instrument(level = "debug", skip(self), fields(from = ?self.step))]
    pub fn go_to(&mut self, target: Step) -> WizardResult<Transition> {
        let current = self.step;
        if target == current {
            return Ok(Transition::Stayed(current));
        }
        if target > current {
            for step in Step::ALL.iter().filter(|s| **s >= current && **s < target) {
                validate_step(*step, &self.state)?;
            }
        }
        Ok(self.enter(target))
    }

    fn enter(&mut self, step: Step) -> Transition {
        debug!(target: "wizard", from = ?self.step, to = ?step, "Step change");
        self.step = step;
        if step == Step::Generate {
            Transition::ReadyToGenerate
        } else {
            Transition::Moved(step)
        }
    }

    /// Replace the inputs with a copy and return to the first step.
    pub fn load(&mut self, state: WizardState) {
        self.state = state;
        self.step = Step::default();
    }

    pub fn reset(&mut self, default_grade: &str) {
        *self = Self::new(default_grade);
    }
}
