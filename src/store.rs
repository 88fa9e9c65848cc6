//! JSON persistence for preferences, the autosaved wizard form, saved
//! assignments and form templates.
//!
//! Every write replaces the whole file. Missing or unreadable files load as
//! their defaults so a corrupt file never blocks startup.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::Preferences;
use crate::domain::{Assignment, Reflections, Template, WizardState};
use crate::error::{WizardError, WizardResult};

pub const PREFERENCES_FILE: &str = "preferences.json";
pub const AUTOSAVE_FILE: &str = "form_autosave.json";
pub const ASSIGNMENTS_FILE: &str = "assignments.json";
pub const TEMPLATES_FILE: &str = "templates.json";

#[derive(Clone, Debug)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Store rooted at `dir`, created if absent.
    pub fn new(dir: impl Into<PathBuf>) -> WizardResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The per-user store under `~/.udl-wizard`.
    pub fn in_home() -> WizardResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| WizardError::Storage("cannot determine home directory".into()))?;
        Self::new(home.join(".udl-wizard"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn load_json<T: DeserializeOwned + Default>(&self, file: &str) -> T {
        let path = self.path(file);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return T::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "store", path = %path.display(), error = %e, "Unparsable JSON file; using defaults");
                T::default()
            }
        }
    }

    fn save_json<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> WizardResult<()> {
        let path = self.path(file);
        let body = serde_json::to_string_pretty(value)?;
        fs::write(&path, body)
            .map_err(|e| WizardError::Storage(format!("{}: {e}", path.display())))?;
        debug!(target: "store", path = %path.display(), "JSON file written");
        Ok(())
    }

    // Preferences

    pub fn load_preferences(&self) -> Preferences {
        self.load_json::<Preferences>(PREFERENCES_FILE).normalized()
    }

    pub fn save_preferences(&self, prefs: &Preferences) -> WizardResult<()> {
        self.save_json(PREFERENCES_FILE, prefs)
    }

    // Autosave

    pub fn load_autosave(&self) -> Option<WizardState> {
        let state: Option<WizardState> = self.load_json(AUTOSAVE_FILE);
        state.filter(|s| !s.is_blank())
    }

    pub fn save_autosave(&self, state: &WizardState) -> WizardResult<()> {
        self.save_json(AUTOSAVE_FILE, state)
    }

    pub fn clear_autosave(&self) -> WizardResult<()> {
        match fs::remove_file(self.path(AUTOSAVE_FILE)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // Assignments

    pub fn load_assignments(&self) -> Vec<Assignment> {
        self.load_json(ASSIGNMENTS_FILE)
    }

    fn save_assignments(&self, assignments: &[Assignment]) -> WizardResult<()> {
        self.save_json(ASSIGNMENTS_FILE, assignments)
    }

    #[instrument(level = "info", skip(self, assignment), fields(id = %assignment.id, name = %assignment.name))]
    pub fn insert_assignment(&self, assignment: &Assignment) -> WizardResult<()> {
        let mut all = self.load_assignments();
        all.push(assignment.clone());
        self.save_assignments(&all)
    }

    pub fn get_assignment(&self, id: Uuid) -> WizardResult<Assignment> {
        self.load_assignments()
            .into_iter()
            .find(|a| a.id == id)
            .ok_or_else(|| WizardError::NotFound(format!("assignment {id}")))
    }

    /// Most recently updated first, optionally filtered by a search string.
    pub fn list_assignments(&self, query: Option<&str>) -> Vec<Assignment> {
        let mut all: Vec<Assignment> = self
            .load_assignments()
            .into_iter()
            .filter(|a| query.map_or(true, |q| a.matches(q)))
            .collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        all
    }

    fn modify_assignment(
        &self,
        id: Uuid,
        edit: impl FnOnce(&mut Assignment),
    ) -> WizardResult<Assignment> {
        let mut all = self.load_assignments();
        let slot = all
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| WizardError::NotFound(format!("assignment {id}")))?;
        edit(slot);
        slot.updated_at = Utc::now();
        let updated = slot.clone();
        self.save_assignments(&all)?;
        Ok(updated)
    }

    #[instrument(level = "info", skip(self, reflections))]
    pub fn update_reflections(&self, id: Uuid, reflections: Reflections) -> WizardResult<Assignment> {
        self.modify_assignment(id, |a| a.reflections = reflections)
    }

    #[instrument(level = "info", skip(self))]
    pub fn rename_assignment(&self, id: Uuid, name: &str) -> WizardResult<Assignment> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WizardError::Validation("Assignment name cannot be empty.".into()));
        }
        self.modify_assignment(id, |a| a.name = name.to_string())
    }

    #[instrument(level = "info", skip(self))]
    pub fn delete_assignment(&self, id: Uuid) -> WizardResult<()> {
        let mut all = self.load_assignments();
        let before = all.len();
        all.retain(|a| a.id != id);
        if all.len() == before {
            return Err(WizardError::NotFound(format!("assignment {id}")));
        }
        self.save_assignments(&all)
    }

    // Templates

    pub fn list_templates(&self) -> Vec<Template> {
        self.load_json(TEMPLATES_FILE)
    }

    /// Insert or replace by name.
    pub fn save_template(&self, template: Template) -> WizardResult<()> {
        let mut all = self.list_templates();
        match all.iter_mut().find(|t| t.name == template.name) {
            Some(slot) => *slot = template,
            None => all.push(template),
        }
        self.save_json(TEMPLATES_FILE, &all)
    }

    pub fn get_template(&self, name: &str) -> WizardResult<Template> {
        self.list_templates()
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| WizardError::NotFound(format!("template '{name}'")))
    }

    pub fn delete_template(&self, name: &str) -> WizardResult<()> {
        let mut all = self.list_templates();
        let before = all.len();
        all.retain(|t| t.name != name);
        if all.len() == before {
            return Err(WizardError::NotFound(format!("template '{name}'")));
        }
        self.save_json(TEMPLATES_FILE, &all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConversationTurn, GenerationResult, Role, Variant};
    use std::collections::BTreeMap;

    fn store() -> (tempfile::TempDir, JsonStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path().join("wizard")).expect("store");
        (dir, store)
    }

    fn sample_state() -> WizardState {
        let mut state = WizardState {
            learning_objective: "Compare fractions with unlike denominators".into(),
            grade_level: "3-5".into(),
            student_needs: "Two ELL students; one student needs reading support".into(),
            engagement: "Choice boards".into(),
            interests: "Soccer, baking".into(),
            ..Default::default()
        };
        state.push_turn(ConversationTurn { role: Role::User, text: "Hi".into() }, 10);
        state.push_turn(ConversationTurn { role: Role::Assistant, text: "Hello! ✓".into() }, 10);
        state
    }

    fn sample_assignment(name: &str) -> Assignment {
        let variants: BTreeMap<Variant, String> =
            Variant::ALL.iter().map(|v| (*v, format!("## Intro\n{v} text"))).collect();
        let materials = GenerationResult::complete(variants, "llama3.2").unwrap();
        Assignment::new(name.into(), sample_state(), materials)
    }

    #[test]
    fn autosave_round_trip_reproduces_state() {
        let (_dir, store) = store();
        let state = sample_state();
        store.save_autosave(&state).unwrap();
        assert_eq!(store.load_autosave(), Some(state));
    }

    #[test]
    fn clearing_autosave_is_idempotent() {
        let (_dir, store) = store();
        store.save_autosave(&sample_state()).unwrap();
        store.clear_autosave().unwrap();
        store.clear_autosave().unwrap();
        assert_eq!(store.load_autosave(), None);
    }

    #[test]
    fn corrupt_files_load_as_defaults() {
        let (_dir, store) = store();
        fs::write(store.dir().join(PREFERENCES_FILE), "{ not json").unwrap();
        fs::write(store.dir().join(ASSIGNMENTS_FILE), "[1, 2").unwrap();
        assert_eq!(store.load_preferences(), Preferences::default());
        assert!(store.load_assignments().is_empty());
    }

    #[test]
    fn preferences_round_trip() {
        let (_dir, store) = store();
        let prefs = Preferences {
            ollama_model: "mistral".into(),
            default_grade_level: "6-8".into(),
            ..Default::default()
        };
        store.save_preferences(&prefs).unwrap();
        assert_eq!(store.load_preferences(), prefs);
    }

    #[test]
    fn assignment_lifecycle() {
        let (_dir, store) = store();
        let first = sample_assignment("First");
        let second = sample_assignment("Second");
        store.insert_assignment(&first).unwrap();
        store.insert_assignment(&second).unwrap();

        let reflections = Reflections {
            worked_well: "Visual version landed".into(),
            ..Default::default()
        };
        let updated = store.update_reflections(first.id, reflections.clone()).unwrap();
        assert_eq!(updated.reflections, reflections);

        // The edited one is now the most recent.
        let listed = store.list_assignments(None);
        assert_eq!(listed[0].id, first.id);

        let renamed = store.rename_assignment(second.id, "  Renamed ").unwrap();
        assert_eq!(renamed.name, "Renamed");
        assert_eq!(store.list_assignments(Some("renamed")).len(), 1);

        store.delete_assignment(first.id).unwrap();
        assert!(matches!(store.get_assignment(first.id), Err(WizardError::NotFound(_))));
        assert!(matches!(store.delete_assignment(first.id), Err(WizardError::NotFound(_))));
        assert_eq!(store.load_assignments().len(), 1);
    }

    #[test]
    fn rename_rejects_blank_names() {
        let (_dir, store) = store();
        let a = sample_assignment("Keep");
        store.insert_assignment(&a).unwrap();
        assert!(matches!(store.rename_assignment(a.id, "   "), Err(WizardError::Validation(_))));
        assert_eq!(store.get_assignment(a.id).unwrap().name, "Keep");
    }

    #[test]
    fn templates_replace_by_name() {
        let (_dir, store) = store();
        let mut form = sample_state();
        store.save_template(Template { name: "Math".into(), form: form.clone() }).unwrap();
        form.subject = "Math".into();
        store.save_template(Template { name: "Math".into(), form: form.clone() }).unwrap();

        let all = store.list_templates();
        assert_eq!(all.len(), 1);
        assert_eq!(store.get_template("Math").unwrap().form.subject, "Math");

        store.delete_template("Math").unwrap();
        assert!(store.list_templates().is_empty());
    }
}
