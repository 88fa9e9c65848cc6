//! Application state: the JSON store, user preferences, the Ollama client,
//! prompt texts and the single wizard session.
//!
//! Preferences are loaded once at startup and replaced through the settings
//! API. The session lives behind an async mutex; generation runs outside it
//! and is serialized by an atomic flag instead.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};

use crate::config::{load_prompt_config_from_env, Preferences, Prompts};
use crate::domain::{GenerationResult, WizardState};
use crate::error::{WizardError, WizardResult};
use crate::ollama::OllamaClient;
use crate::store::JsonStore;
use crate::wizard::WizardController;

/// A complete result and the inputs it was generated from.
#[derive(Clone, Debug)]
pub struct Generated {
    pub form: WizardState,
    pub result: GenerationResult,
}

/// The one wizard a local user works in, plus the materials produced for it.
#[derive(Debug, Default)]
pub struct Session {
    pub wizard: WizardController,
    pub materials: Option<Generated>,
}

pub struct AppState {
    pub store: JsonStore,
    pub prefs: RwLock<Preferences>,
    pub client: RwLock<OllamaClient>,
    pub prompts: Prompts,
    pub session: Mutex<Session>,
    generating: AtomicBool,
}

impl AppState {
    /// Build state from the home-directory store and env prompt overrides.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> WizardResult<Self> {
        let prompts = load_prompt_config_from_env()
            .map(|c| c.prompts)
            .unwrap_or_default();
        Self::with_store(JsonStore::in_home()?, prompts)
    }

    pub fn with_store(store: JsonStore, prompts: Prompts) -> WizardResult<Self> {
        let prefs = store.load_preferences();
        let client = OllamaClient::from_preferences(&prefs)?;
        info!(
            target: "udl_wizard",
            store = %store.dir().display(),
            endpoint = %prefs.ollama_endpoint,
            model = %prefs.ollama_model,
            "Application state ready"
        );
        if store.load_autosave().is_some() {
            info!(target: "store", "Autosaved form available for restore");
        }

        let session = Session {
            wizard: WizardController::new(&prefs.default_grade_level),
            materials: None,
        };
        Ok(Self {
            store,
            prefs: RwLock::new(prefs),
            client: RwLock::new(client),
            prompts,
            session: Mutex::new(session),
            generating: AtomicBool::new(false),
        })
    }

    pub async fn preferences(&self) -> Preferences {
        self.prefs.read().await.clone()
    }

    /// Snapshot of the current client; a settings change mid-call does not
    /// affect requests already in flight.
    pub async fn client(&self) -> OllamaClient {
        self.client.read().await.clone()
    }

    /// Claim the single generation slot, or fail with `Busy`.
    pub fn begin_generation(&self) -> WizardResult<GenerationGuard<'_>> {
        if self
            .generating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(target: "generation", "Generation requested while another is running");
            return Err(WizardError::Busy);
        }
        Ok(GenerationGuard { flag: &self.generating })
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::Acquire)
    }
}

/// Releases the generation slot when dropped, including on error paths.
pub struct GenerationGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for GenerationGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// State over a temp store pointed at `endpoint`.
    pub(crate) fn test_state(endpoint: &str) -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path().join("store")).expect("store");
        let prefs = Preferences {
            ollama_endpoint: endpoint.into(),
            ollama_model: "llama3.2".into(),
            default_save_path: dir.path().join("exports"),
            ..Default::default()
        };
        store.save_preferences(&prefs).expect("prefs");
        let state = AppState::with_store(store, Prompts::default()).expect("state");
        (dir, state)
    }

    #[test]
    fn second_generation_slot_is_refused_until_released() {
        let (_dir, state) = test_state("http://127.0.0.1:1");
        let guard = state.begin_generation().unwrap();
        assert!(state.is_generating());
        assert_eq!(state.begin_generation().err(), Some(WizardError::Busy));
        drop(guard);
        assert!(!state.is_generating());
        assert!(state.begin_generation().is_ok());
    }

    #[tokio::test]
    async fn startup_applies_default_grade() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path()).unwrap();
        let prefs = Preferences { default_grade_level: "6-8".into(), ..Default::default() };
        store.save_preferences(&prefs).unwrap();
        let state = AppState::with_store(store, Prompts::default()).unwrap();
        assert_eq!(state.session.lock().await.wizard.state().grade_level, "6-8");
    }
}
