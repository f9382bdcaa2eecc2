//! Application state and model selection
//!
//! Small bits of state that outlive a session (currently just the last model
//! the user chatted with) live in `state.json` next to the chat store.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::store::StoreError;

/// File name used inside a data directory
pub const STATE_FILE: &str = "state.json";

/// Persisted application state
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppState {
    /// Model used for the most recent generation
    pub last_used_model: Option<String>,
}

/// `state.json` on disk
#[derive(Clone, Debug)]
pub struct AppStateFile {
    path: PathBuf,
}

impl AppStateFile {
    /// State file inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(STATE_FILE),
        }
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the state; a missing or unreadable file yields the default
    pub async fn load(&self) -> AppState {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring corrupt state file");
                AppState::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppState::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Could not read state file");
                AppState::default()
            }
        }
    }

    /// Write the state
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] if the file cannot be written.
    pub async fn save(&self, state: &AppState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        crate::store::write_atomic(&self.path, &bytes).await
    }

    /// Record the model just used
    ///
    /// # Errors
    ///
    /// See [`AppStateFile::save`].
    pub async fn remember_model(&self, model: &str) -> Result<(), StoreError> {
        let mut state = self.load().await;
        if state.last_used_model.as_deref() == Some(model) {
            return Ok(());
        }
        state.last_used_model = Some(model.to_string());
        self.save(&state).await
    }
}

/// Pick the model to chat with
///
/// The last-used model if it is still installed, then the configured default
/// if installed, then the first installed model. `None` when nothing is
/// installed.
#[must_use]
pub fn select_model(
    available: &[String],
    last_used: Option<&str>,
    configured_default: Option<&str>,
) -> Option<String> {
    let installed = |name: &str| available.iter().any(|m| m == name);

    last_used
        .filter(|m| installed(m))
        .or_else(|| configured_default.filter(|m| installed(m)))
        .map(String::from)
        .or_else(|| available.first().cloned())
}
