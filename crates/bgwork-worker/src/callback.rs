//! Callback handle persistence and resolution.
//!
//! The application persists one opaque handle for its background dispatcher.
//! At dispatch time the worker reads it back and resolves it to the entry point
//! the runtime should execute.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::WorkerError;
use crate::protocol::CALLBACK_DISPATCHER_HANDLE_KEY;

/// Opaque, persisted reference to a script entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackHandle(pub i64);

impl fmt::Display for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptor of an executable script entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackInformation {
    pub callback_name: String,
    pub callback_class_name: String,
    pub callback_library_path: String,
}

impl CallbackInformation {
    pub fn new(
        callback_name: impl Into<String>,
        callback_class_name: impl Into<String>,
        callback_library_path: impl Into<String>,
    ) -> Self {
        Self {
            callback_name: callback_name.into(),
            callback_class_name: callback_class_name.into(),
            callback_library_path: callback_library_path.into(),
        }
    }
}

/// Maps a handle to an entry point. Read-only, callable from any thread.
pub trait CallbackResolver: Send + Sync {
    fn lookup(&self, handle: CallbackHandle) -> Option<CallbackInformation>;
}

/// Read-only access to the persisted dispatcher handle.
pub trait CallbackHandleStore: Send + Sync {
    /// The stored handle, or `None` if the application never registered one.
    fn callback_handle(&self) -> Result<Option<CallbackHandle>, WorkerError>;
}

/// Read the stored handle and resolve it.
pub fn resolve_callback(
    store: &dyn CallbackHandleStore,
    resolver: &dyn CallbackResolver,
) -> Result<(CallbackHandle, CallbackInformation), WorkerError> {
    let handle = store.callback_handle()?.ok_or_else(|| {
        WorkerError::MissingCallbackHandle(CALLBACK_DISPATCHER_HANDLE_KEY.to_string())
    })?;

    match resolver.lookup(handle) {
        Some(info) => {
            debug!(handle = %handle, callback = %info.callback_name, "Resolved callback handle");
            Ok((handle, info))
        }
        None => {
            error!(handle = %handle, "Failed to resolve callback for handle");
            Err(WorkerError::UnresolvedCallback(handle.0))
        }
    }
}

/// In-process registry of entry points.
#[derive(Debug, Default)]
pub struct InMemoryCallbackRegistry {
    entries: RwLock<HashMap<CallbackHandle, CallbackInformation>>,
}

impl InMemoryCallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the entry point behind `handle`.
    pub fn register(&self, handle: CallbackHandle, info: CallbackInformation) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, info);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CallbackResolver for InMemoryCallbackRegistry {
    fn lookup(&self, handle: CallbackHandle) -> Option<CallbackInformation> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
    }
}

/// Handle store kept in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct InMemoryCallbackStore {
    handle: RwLock<Option<CallbackHandle>>,
}

impl InMemoryCallbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handle(handle: CallbackHandle) -> Self {
        Self {
            handle: RwLock::new(Some(handle)),
        }
    }

    pub fn set(&self, handle: Option<CallbackHandle>) {
        *self.handle.write().unwrap_or_else(PoisonError::into_inner) = handle;
    }
}

impl CallbackHandleStore for InMemoryCallbackStore {
    fn callback_handle(&self) -> Result<Option<CallbackHandle>, WorkerError> {
        Ok(*self.handle.read().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Handle store backed by a JSON preferences file.
///
/// The file is a flat JSON object; the handle lives under
/// [`CALLBACK_DISPATCHER_HANDLE_KEY`]. It is re-read on every lookup so a
/// handle written by the application after startup is picked up. A missing
/// file means no handle was stored.
#[derive(Debug, Clone)]
pub struct JsonFileCallbackStore {
    path: PathBuf,
}

impl JsonFileCallbackStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl CallbackHandleStore for JsonFileCallbackStore {
    fn callback_handle(&self) -> Result<Option<CallbackHandle>, WorkerError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(WorkerError::Store(format!(
                    "failed to read {}: {err}",
                    self.path.display()
                )));
            }
        };

        let prefs: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&contents)
            .map_err(|err| {
                WorkerError::Store(format!("failed to parse {}: {err}", self.path.display()))
            })?;

        match prefs.get(CALLBACK_DISPATCHER_HANDLE_KEY) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => value.as_i64().map(|raw| Some(CallbackHandle(raw))).ok_or_else(|| {
                WorkerError::Store(format!(
                    "'{CALLBACK_DISPATCHER_HANDLE_KEY}' is not an integer handle: {value}"
                ))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dispatcher() -> CallbackInformation {
        CallbackInformation::new("callbackDispatcher", "", "package:app/main.dart")
    }

    #[test]
    fn test_resolve_registered_handle() {
        let registry = InMemoryCallbackRegistry::new();
        registry.register(CallbackHandle(7), dispatcher());
        let store = InMemoryCallbackStore::with_handle(CallbackHandle(7));

        let (handle, info) = resolve_callback(&store, &registry).unwrap();
        assert_eq!(handle, CallbackHandle(7));
        assert_eq!(info, dispatcher());
    }

    #[test]
    fn test_unknown_and_missing_handles() {
        let registry = InMemoryCallbackRegistry::new();
        let store = InMemoryCallbackStore::new();

        let err = resolve_callback(&store, &registry).unwrap_err();
        assert!(matches!(err, WorkerError::MissingCallbackHandle(_)));

        store.set(Some(CallbackHandle(99)));
        let err = resolve_callback(&store, &registry).unwrap_err();
        assert!(matches!(err, WorkerError::UnresolvedCallback(99)));
        assert!(err.is_resolution_error());
    }

    #[test]
    fn test_json_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let store = JsonFileCallbackStore::new(&path);

        assert_eq!(store.callback_handle().unwrap(), None);

        std::fs::write(
            &path,
            json!({ CALLBACK_DISPATCHER_HANDLE_KEY: 1234, "unrelated": "x" }).to_string(),
        )
        .unwrap();
        assert_eq!(store.callback_handle().unwrap(), Some(CallbackHandle(1234)));

        std::fs::write(&path, json!({ "unrelated": "x" }).to_string()).unwrap();
        assert_eq!(store.callback_handle().unwrap(), None);
    }

    #[test]
    fn test_json_file_store_rejects_bad_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let store = JsonFileCallbackStore::new(&path);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(store.callback_handle(), Err(WorkerError::Store(_))));

        std::fs::write(&path, json!({ CALLBACK_DISPATCHER_HANDLE_KEY: "abc" }).to_string())
            .unwrap();
        assert!(matches!(store.callback_handle(), Err(WorkerError::Store(_))));
    }
}
