mod atomic_io;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::json::decode_json;

pub const SAVE_VERSION: u32 = 1;

/// On-disk layout: `{ "version": 1, "state": { ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveEnvelope {
    pub version: u32,
    pub state: Value,
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("failed to encode save slot {slot}: {source}")]
    Encode {
        slot: u32,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write save file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Slot-addressed persistence for JSON game state.
///
/// `load` never fails: missing, unreadable, corrupt or incompatible saves
/// are all reported as `None`.
pub trait SaveStore {
    fn save(&self, slot: u32, state: &Value) -> Result<(), SaveError>;
    fn load(&self, slot: u32) -> Option<Value>;

    fn has_save(&self, slot: u32) -> bool {
        self.load(slot).is_some()
    }
}

/// Reads the `state` object out of an encoded envelope.
pub fn decode_envelope(slot: u32, raw: &str) -> Option<Value> {
    let envelope: SaveEnvelope = match decode_json(raw) {
        Ok(envelope) => envelope,
        Err(error) => {
            warn!(slot, error = %error, "save_corrupt_ignored");
            return None;
        }
    };
    if envelope.version != SAVE_VERSION {
        warn!(
            slot,
            expected = SAVE_VERSION,
            found = envelope.version,
            "save_version_mismatch_ignored"
        );
        return None;
    }
    if !envelope.state.is_object() {
        warn!(slot, "save_state_not_an_object_ignored");
        return None;
    }
    Some(envelope.state)
}

pub fn encode_envelope(slot: u32, state: &Value) -> Result<String, SaveError> {
    let envelope = SaveEnvelope {
        version: SAVE_VERSION,
        state: state.clone(),
    };
    serde_json::to_string_pretty(&envelope).map_err(|source| SaveError::Encode { slot, source })
}

/// Inserts `key` into the stored state without touching other keys.
pub fn merge_state(existing: Option<Value>, key: &str, value: Value) -> Value {
    let mut state = match existing {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    state.insert(key.to_string(), value);
    Value::Object(state)
}

/// One JSON file per slot under `dir`.
#[derive(Debug, Clone)]
pub struct FileSaveStore {
    dir: PathBuf,
}

impl FileSaveStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, slot: u32) -> PathBuf {
        self.dir.join(format!("save_{slot}.json"))
    }
}

impl SaveStore for FileSaveStore {
    fn save(&self, slot: u32, state: &Value) -> Result<(), SaveError> {
        let encoded = encode_envelope(slot, state)?;
        let path = self.path_for(slot);
        atomic_io::write_text_atomic(&path, &encoded)
            .map_err(|source| SaveError::Write { path: path.clone(), source })?;
        debug!(slot, path = %path.display(), "save_written");
        Ok(())
    }

    fn load(&self, slot: u32) -> Option<Value> {
        let path = self.path_for(slot);
        match fs::read_to_string(&path) {
            Ok(raw) => decode_envelope(slot, &raw),
            Err(error) if error.kind() == io::ErrorKind::NotFound => None,
            Err(error) => {
                warn!(slot, path = %path.display(), error = %error, "save_read_failed");
                None
            }
        }
    }
}

/// Keeps encoded saves in memory.
#[derive(Debug, Default)]
pub struct MemorySaveStore {
    slots: RefCell<HashMap<u32, String>>,
}

impl MemorySaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw text as if it had been written by another build.
    pub fn insert_raw(&self, slot: u32, raw: impl Into<String>) {
        self.slots.borrow_mut().insert(slot, raw.into());
    }

    pub fn raw(&self, slot: u32) -> Option<String> {
        self.slots.borrow().get(&slot).cloned()
    }
}

impl SaveStore for MemorySaveStore {
    fn save(&self, slot: u32, state: &Value) -> Result<(), SaveError> {
        let encoded = encode_envelope(slot, state)?;
        self.slots.borrow_mut().insert(slot, encoded);
        Ok(())
    }

    fn load(&self, slot: u32) -> Option<Value> {
        let raw = self.slots.borrow().get(&slot).cloned()?;
        decode_envelope(slot, &raw)
    }
}
