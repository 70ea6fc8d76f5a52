//! Deterministic loopback backend.
//!
//! `load` concatenates the builder blobs in order into a "model"; `compute`
//! copies the staged input to the output slot unchanged. There is no math
//! and no model format, which makes it the reference capability
//! implementation and the workhorse for exercising the dispatch surface in
//! tests.

use std::sync::{Mutex, MutexGuard};

use nnhost_core::{Backend, BackendCtxId, BackendGraphId, Device, Errno, Tensor};

#[derive(Debug)]
struct EchoGraph {
    model: Vec<u8>,
    device: Device,
    config: Option<Vec<u8>>,
}

#[derive(Debug)]
struct EchoContext {
    graph: usize,
    input: Option<Vec<u8>>,
    output: Vec<u8>,
}

/// All state is instance-owned; the core only ever sees the minted ids.
#[derive(Debug, Default)]
pub struct EchoBackend {
    graphs: Mutex<Vec<EchoGraph>>,
    contexts: Mutex<Vec<EchoContext>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl EchoBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bytes the graph was built from, for assertions in tests.
    pub fn model_bytes(&self, graph: BackendGraphId) -> Option<Vec<u8>> {
        lock(&self.graphs)
            .get(graph.0 as usize)
            .map(|g| g.model.clone())
    }

    pub fn graph_device(&self, graph: BackendGraphId) -> Option<Device> {
        lock(&self.graphs).get(graph.0 as usize).map(|g| g.device)
    }

    pub fn graph_config(&self, graph: BackendGraphId) -> Option<Vec<u8>> {
        lock(&self.graphs)
            .get(graph.0 as usize)
            .and_then(|g| g.config.clone())
    }
}

impl Backend for EchoBackend {
    fn load(
        &self,
        builders: &[&[u8]],
        device: Device,
        config: Option<&[u8]>,
    ) -> Result<BackendGraphId, Errno> {
        let mut model = Vec::new();
        for b in builders {
            model.extend_from_slice(b);
        }
        let mut graphs = lock(&self.graphs);
        graphs.push(EchoGraph {
            model,
            device,
            config: config.map(|c| c.to_vec()),
        });
        Ok(BackendGraphId((graphs.len() - 1) as u64))
    }

    fn init_execution_context(&self, graph: BackendGraphId) -> Result<BackendCtxId, Errno> {
        if lock(&self.graphs).get(graph.0 as usize).is_none() {
            return Err(Errno::InvalidArgument);
        }
        let mut contexts = lock(&self.contexts);
        contexts.push(EchoContext {
            graph: graph.0 as usize,
            input: None,
            output: Vec::new(),
        });
        Ok(BackendCtxId((contexts.len() - 1) as u64))
    }

    fn set_input(&self, ctx: BackendCtxId, _index: u32, tensor: &Tensor<'_>) -> Result<(), Errno> {
        let mut contexts = lock(&self.contexts);
        let ctx = contexts
            .get_mut(ctx.0 as usize)
            .ok_or(Errno::InvalidArgument)?;
        ctx.input = Some(tensor.data.to_vec());
        Ok(())
    }

    fn compute(&self, ctx: BackendCtxId) -> Result<(), Errno> {
        let mut contexts = lock(&self.contexts);
        let ctx = contexts
            .get_mut(ctx.0 as usize)
            .ok_or(Errno::InvalidArgument)?;
        // Computing with nothing staged is a backend-surfaced runtime error.
        let input = ctx.input.as_ref().ok_or(Errno::RuntimeError)?;
        ctx.output = input.clone();
        Ok(())
    }

    fn get_output(&self, ctx: BackendCtxId, _index: u32, out: &mut [u8]) -> Result<u32, Errno> {
        let contexts = lock(&self.contexts);
        let ctx = contexts.get(ctx.0 as usize).ok_or(Errno::InvalidArgument)?;
        if ctx.output.len() > out.len() {
            return Err(Errno::RuntimeError);
        }
        out[..ctx.output.len()].copy_from_slice(&ctx.output);
        Ok(ctx.output.len() as u32)
    }
}
