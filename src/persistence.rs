use std::env;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use tokio::fs;

use crate::model::game::GameState;

/// File-backed snapshot store: one JSON document per game id. With no data
/// directory configured all operations are no-ops, so a quick local run
/// needs no setup.
pub struct SnapshotStore {
    root: Option<PathBuf>,
}

impl SnapshotStore {
    /// Initialize from the QUIZPIN_DATA_DIR environment variable.
    pub fn from_env() -> Self {
        match env::var("QUIZPIN_DATA_DIR") {
            Ok(dir) if !dir.is_empty() => Self::at(PathBuf::from(dir)),
            _ => {
                warn!("QUIZPIN_DATA_DIR not set, snapshot persistence disabled");
                SnapshotStore { root: None }
            }
        }
    }

    pub fn at(root: PathBuf) -> Self {
        info!("Snapshot persistence enabled at {}", root.display());
        SnapshotStore { root: Some(root) }
    }

    pub fn disabled() -> Self {
        SnapshotStore { root: None }
    }

    fn snapshot_path(&self, game_id: &str) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(format!("{game_id}.json")))
    }

    /// Write the full snapshot for one game. The write goes through a
    /// temporary file so a crash never leaves a half-written snapshot.
    pub async fn save(&self, game_id: &str, state: &GameState) -> Result<()> {
        let Some(path) = self.snapshot_path(game_id) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let body = serde_json::to_vec(state)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &body)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to move snapshot into {}", path.display()))?;
        Ok(())
    }

    /// Load the snapshot for one game. Returns Ok(None) if no snapshot
    /// exists (or persistence is disabled).
    pub async fn load(&self, game_id: &str) -> Result<Option<GameState>> {
        let Some(path) = self.snapshot_path(game_id) else {
            return Ok(None);
        };
        match fs::read(&path).await {
            Ok(bytes) => {
                let state = serde_json::from_slice(&bytes).map_err(|e| {
                    warn!("Failed to deserialize snapshot for game {game_id}: {e}");
                    anyhow!("This saved game is no longer compatible with the current server version")
                })?;
                info!("Loaded snapshot for game {game_id}");
                Ok(Some(state))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("failed to read snapshot for game {game_id}"))
            }
        }
    }
}
