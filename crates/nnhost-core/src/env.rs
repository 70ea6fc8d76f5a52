use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::backend::{Backend, BackendCtxId, BackendGraphId, BackendSet, BackendTag};
use crate::errno::Errno;
use crate::registry::ModelRegistry;

/// One graph table entry: the tag it was loaded through plus the backend's
/// own id for it. Later operations on the index dispatch to the same backend
/// without re-specifying it.
#[derive(Debug, Clone, Copy)]
pub struct Graph {
    pub tag: BackendTag,
    pub raw: BackendGraphId,
}

/// One execution-context table entry.
#[derive(Debug, Clone, Copy)]
pub struct ExecContext {
    pub tag: BackendTag,
    pub raw: BackendCtxId,
}

// A poisoned lock only means some other call panicked mid-operation; the
// tables themselves stay consistent because entries are appended whole and
// never mutated, so recover the guard instead of propagating the panic.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// The only state shared across guest calls: the backend capability set, the
/// named-model registry, two append-only handle tables, and the model cache.
///
/// Tables are monotonic. Entries are never removed or reused, so an index
/// once handed out stays valid for the process lifetime and a stale index
/// can only fail the `index < len` check, never dangle. Each table and the
/// cache has its own mutex; appends and index validation happen under the
/// owning lock, and every lock is released before backend dispatch.
pub struct NnEnv {
    backends: BackendSet,
    registry: ModelRegistry,
    graphs: Mutex<Vec<Graph>>,
    contexts: Mutex<Vec<ExecContext>>,
    models: Mutex<BTreeMap<String, u32>>,
}

impl NnEnv {
    pub fn new(backends: BackendSet, registry: ModelRegistry) -> Self {
        NnEnv {
            backends,
            registry,
            graphs: Mutex::new(Vec::new()),
            contexts: Mutex::new(Vec::new()),
            models: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn graph_count(&self) -> u32 {
        lock(&self.graphs).len() as u32
    }

    pub fn context_count(&self) -> u32 {
        lock(&self.contexts).len() as u32
    }

    pub(crate) fn capability(&self, tag: BackendTag) -> Result<&dyn Backend, Errno> {
        self.backends.capability(tag)
    }

    pub(crate) fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub(crate) fn push_graph(&self, graph: Graph) -> u32 {
        let mut graphs = lock(&self.graphs);
        graphs.push(graph);
        (graphs.len() - 1) as u32
    }

    pub(crate) fn graph(&self, index: u32) -> Result<Graph, Errno> {
        lock(&self.graphs)
            .get(index as usize)
            .copied()
            .ok_or(Errno::InvalidArgument)
    }

    pub(crate) fn push_context(&self, ctx: ExecContext) -> u32 {
        let mut contexts = lock(&self.contexts);
        contexts.push(ctx);
        (contexts.len() - 1) as u32
    }

    pub(crate) fn context(&self, index: u32) -> Result<ExecContext, Errno> {
        lock(&self.contexts)
            .get(index as usize)
            .copied()
            .ok_or(Errno::InvalidArgument)
    }

    pub(crate) fn cached_model(&self, name: &str) -> Option<u32> {
        lock(&self.models).get(name).copied()
    }

    /// First writer wins: a later insert for the same name leaves the cache
    /// unchanged. Returns the index the cache now records for `name`.
    pub(crate) fn record_model(&self, name: &str, index: u32) -> u32 {
        let mut models = lock(&self.models);
        *models.entry(name.to_string()).or_insert(index)
    }
}
