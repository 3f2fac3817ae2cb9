use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::task::Task;

pub const DEFAULT_STORAGE_KEY: &str = "todos";

/// A durable key-value slot that survives process restarts.
pub trait Slot {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct MemorySlot {
    entries: HashMap<String, String>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let mut slot = Self::new();
        slot.entries.insert(key.to_string(), value.to_string());
        slot
    }
}

impl Slot for MemorySlot {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One JSON file per key inside a data directory.
#[derive(Debug, Clone)]
pub struct FileSlot {
    pub data_dir: PathBuf,
}

impl FileSlot {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened file slot");
        Ok(Self { data_dir })
    }

    /// Keys name a file directly inside `data_dir`; anything that could
    /// step outside it is refused.
    pub fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") {
            return Err(anyhow!("invalid storage key: {key:?}"));
        }
        Ok(self.data_dir.join(format!("{key}.json")))
    }
}

impl Slot for FileSlot {
    #[tracing::instrument(skip(self))]
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            debug!(file = %path.display(), "slot file absent");
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Ok(Some(raw))
    }

    #[tracing::instrument(skip(self, value))]
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        debug!(file = %path.display(), bytes = value.len(), "writing slot atomically");

        let mut temp = NamedTempFile::new_in(&self.data_dir)?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }
}

/// The browser's `window.localStorage`.
#[cfg(all(feature = "web", target_arch = "wasm32"))]
#[derive(Debug, Clone, Default)]
pub struct LocalStorageSlot;

#[cfg(all(feature = "web", target_arch = "wasm32"))]
impl LocalStorageSlot {
    fn storage() -> anyhow::Result<web_sys::Storage> {
        web_sys::window()
            .and_then(|window| window.local_storage().ok().flatten())
            .ok_or_else(|| anyhow!("local storage is not available"))
    }
}

#[cfg(all(feature = "web", target_arch = "wasm32"))]
impl Slot for LocalStorageSlot {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Self::storage()?
            .get_item(key)
            .map_err(|err| anyhow!("failed reading local storage key {key}: {err:?}"))
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        Self::storage()?
            .set_item(key, value)
            .map_err(|err| anyhow!("failed writing local storage key {key}: {err:?}"))
    }
}

/// Translates between the in-memory task list and its serialized form in a
/// [`Slot`].
#[derive(Debug, Clone)]
pub struct TaskPersistence<S> {
    slot: S,
    key: String,
}

impl<S: Slot> TaskPersistence<S> {
    pub fn new(slot: S) -> Self {
        Self::with_key(slot, DEFAULT_STORAGE_KEY)
    }

    pub fn with_key(slot: S, key: &str) -> Self {
        Self {
            slot,
            key: key.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn slot(&self) -> &S {
        &self.slot
    }

    pub fn slot_mut(&mut self) -> &mut S {
        &mut self.slot
    }

    /// Absent, unreadable and malformed data all read as an empty list.
    #[tracing::instrument(skip(self), fields(key = %self.key))]
    pub fn load(&self) -> Vec<Task> {
        let raw = match self.slot.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("no saved tasks");
                return Vec::new();
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(error = %message, "failed reading saved tasks; starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Task>>(&raw) {
            Ok(mut tasks) => {
                drop_duplicate_ids(&mut tasks);
                debug!(count = tasks.len(), "loaded tasks");
                tasks
            }
            Err(err) => {
                warn!(error = %err, "saved tasks are malformed; starting empty");
                Vec::new()
            }
        }
    }

    #[tracing::instrument(skip(self, tasks), fields(key = %self.key, count = tasks.len()))]
    pub fn save(&mut self, tasks: &[Task]) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(tasks).context("failed to serialize tasks")?;
        self.slot
            .set(&self.key, &serialized)
            .with_context(|| format!("failed to save slot {}", self.key))
    }

    pub fn into_slot(self) -> S {
        self.slot
    }
}

/// Ids must be unique for toggle and remove to address one task. The first
/// occurrence wins.
fn drop_duplicate_ids(tasks: &mut Vec<Task>) {
    let mut seen = HashSet::new();
    tasks.retain(|task| {
        let first = seen.insert(task.id.clone());
        if !first {
            warn!(id = %task.id, text = %task.text, "dropping saved task with duplicate id");
        }
        first
    });
}
