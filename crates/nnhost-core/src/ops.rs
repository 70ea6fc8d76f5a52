//! The guest-facing operation surface.
//!
//! Validation order mirrors the wire contract: output destinations are
//! vetted before any work, device and tag codes before any backend dispatch,
//! and no raw offset is interpreted outside [`GuestMemory`]. Every failure
//! is logged with the field or index that failed; the guest observes only
//! the status code.

use sha2::{Digest as _, Sha256};

use crate::backend::{BackendTag, Device};
use crate::env::{ExecContext, Graph, NnEnv};
use crate::errno::Errno;
use crate::memory::GuestMemory;
use crate::tensor::{decode_builders, decode_tensor};

/// Build a graph from a guest-supplied builder array and append it to the
/// graph table. The new graph index is written to `graph_id_ptr`.
pub fn load(
    env: &NnEnv,
    mem: &mut GuestMemory<'_>,
    builders_ptr: u32,
    builders_len: u32,
    raw_tag: u32,
    raw_device: u32,
    graph_id_ptr: u32,
) -> Result<(), Errno> {
    mem.check(graph_id_ptr, 4).map_err(|e| {
        log::error!("load: graph id destination {graph_id_ptr:#x} is out of bounds");
        e
    })?;
    let device = Device::from_raw(raw_device).map_err(|e| {
        log::error!("load: unknown device {raw_device}");
        e
    })?;
    log::debug!("load: using device {device}");

    let builders = decode_builders(mem, builders_ptr, builders_len)?;
    let tag = BackendTag::from_raw(raw_tag).map_err(|e| {
        log::error!("load: unknown backend tag {raw_tag}");
        e
    })?;

    let graph_id = env.capability(tag)?.load(&builders, device, None)?;
    log_builder_digest(tag, &builders);
    let index = env.push_graph(Graph { tag, raw: graph_id });
    mem.write_u32(graph_id_ptr, index)
}

/// Resolve a registered model by name, building it on first use. A cache hit
/// performs no backend work at all.
pub fn load_by_name(
    env: &NnEnv,
    mem: &mut GuestMemory<'_>,
    name_ptr: u32,
    name_len: u32,
    graph_id_ptr: u32,
) -> Result<(), Errno> {
    mem.check(graph_id_ptr, 4).map_err(|e| {
        log::error!("load_by_name: graph id destination {graph_id_ptr:#x} is out of bounds");
        e
    })?;
    let name = decode_name(mem, name_ptr, name_len)?;
    let index = get_or_build(env, &name, None)?;
    mem.write_u32(graph_id_ptr, index)
}

/// Like [`load_by_name`], with a raw configuration blob forwarded to the
/// backend on a cache miss. A hit ignores the config entirely.
pub fn load_by_name_with_config(
    env: &NnEnv,
    mem: &mut GuestMemory<'_>,
    name_ptr: u32,
    name_len: u32,
    config_ptr: u32,
    config_len: u32,
    graph_id_ptr: u32,
) -> Result<(), Errno> {
    mem.check(graph_id_ptr, 4).map_err(|e| {
        log::error!(
            "load_by_name_with_config: graph id destination {graph_id_ptr:#x} is out of bounds"
        );
        e
    })?;
    let name = decode_name(mem, name_ptr, name_len)?;
    let config = mem
        .bytes(config_ptr, config_len)
        .map_err(|e| {
            log::error!("model {name:?}: config at {config_ptr:#x}+{config_len} is out of bounds");
            e
        })?
        .to_vec();
    let index = get_or_build(env, &name, Some(&config))?;
    mem.write_u32(graph_id_ptr, index)
}

/// Create an execution context against an existing graph index.
pub fn init_execution_context(
    env: &NnEnv,
    mem: &mut GuestMemory<'_>,
    graph_index: u32,
    ctx_id_ptr: u32,
) -> Result<(), Errno> {
    let graph = env.graph(graph_index).map_err(|e| {
        log::error!("init_execution_context: graph {graph_index} does not exist");
        e
    })?;
    mem.check(ctx_id_ptr, 4).map_err(|e| {
        log::error!("init_execution_context: context destination {ctx_id_ptr:#x} is out of bounds");
        e
    })?;
    let raw = env.capability(graph.tag)?.init_execution_context(graph.raw)?;
    let index = env.push_context(ExecContext {
        tag: graph.tag,
        raw,
    });
    mem.write_u32(ctx_id_ptr, index)
}

/// Stage the tensor described by the record at `tensor_ptr` as input slot
/// `input_index` of an execution context.
pub fn set_input(
    env: &NnEnv,
    mem: &GuestMemory<'_>,
    ctx_index: u32,
    input_index: u32,
    tensor_ptr: u32,
) -> Result<(), Errno> {
    let ctx = env.context(ctx_index).map_err(|e| {
        log::error!("set_input: execution context {ctx_index} does not exist");
        e
    })?;
    let tensor = decode_tensor(mem, tensor_ptr)?;
    env.capability(ctx.tag)?
        .set_input(ctx.raw, input_index, &tensor)
}

/// Run inference on a context whose inputs have been staged.
pub fn compute(env: &NnEnv, ctx_index: u32) -> Result<(), Errno> {
    let ctx = env.context(ctx_index).map_err(|e| {
        log::error!("compute: execution context {ctx_index} does not exist");
        e
    })?;
    env.capability(ctx.tag)?.compute(ctx.raw)
}

/// Copy output slot `output_index` into the guest buffer at `out_ptr` and
/// write the produced byte count to `bytes_written_ptr`. The whole declared
/// capacity is validated before dispatch; keeping the output within it is
/// the backend's obligation.
pub fn get_output(
    env: &NnEnv,
    mem: &mut GuestMemory<'_>,
    ctx_index: u32,
    output_index: u32,
    out_ptr: u32,
    out_max: u32,
    bytes_written_ptr: u32,
) -> Result<(), Errno> {
    let ctx = env.context(ctx_index).map_err(|e| {
        log::error!("get_output: execution context {ctx_index} does not exist");
        e
    })?;
    mem.check(bytes_written_ptr, 4).map_err(|e| {
        log::error!(
            "get_output: bytes-written destination {bytes_written_ptr:#x} is out of bounds"
        );
        e
    })?;
    let out = mem.bytes_mut(out_ptr, out_max).map_err(|e| {
        log::error!("get_output: output buffer at {out_ptr:#x}+{out_max} is out of bounds");
        e
    })?;
    let written = env.capability(ctx.tag)?.get_output(ctx.raw, output_index, out)?;
    mem.write_u32(bytes_written_ptr, written)
}

fn decode_name(mem: &GuestMemory<'_>, name_ptr: u32, name_len: u32) -> Result<String, Errno> {
    let bytes = mem.bytes(name_ptr, name_len).map_err(|e| {
        log::error!("model name at {name_ptr:#x}+{name_len} is out of bounds");
        e
    })?;
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => {
            log::error!("model name is not valid utf-8");
            Err(Errno::InvalidArgument)
        }
    }
}

fn get_or_build(env: &NnEnv, name: &str, config: Option<&[u8]>) -> Result<u32, Errno> {
    if let Some(index) = env.cached_model(name) {
        return Ok(index);
    }
    let Some(model) = env.registry().get(name) else {
        log::error!("no registered model named {name:?}");
        return Err(Errno::InvalidArgument);
    };

    let mut blobs: Vec<Vec<u8>> = Vec::with_capacity(model.builders.len());
    for path in &model.builders {
        match std::fs::read(path) {
            Ok(b) => blobs.push(b),
            Err(e) => {
                log::error!("model {name:?}: read {}: {e}", path.display());
                return Err(Errno::RuntimeError);
            }
        }
    }
    let builders: Vec<&[u8]> = blobs.iter().map(|b| b.as_slice()).collect();

    let graph_id = env
        .capability(model.tag)?
        .load(&builders, model.device, config)?;
    log_builder_digest(model.tag, &builders);
    let index = env.push_graph(Graph {
        tag: model.tag,
        raw: graph_id,
    });
    let recorded = env.record_model(name, index);
    if recorded != index {
        log::debug!("model {name:?}: lost a build race, cache kept graph {recorded}");
    }
    Ok(index)
}

fn log_builder_digest(tag: BackendTag, builders: &[&[u8]]) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let mut h = Sha256::new();
    let mut total = 0usize;
    for b in builders {
        h.update(b);
        total += b.len();
    }
    log::debug!(
        "loaded {} builder(s) for {tag}, {total} bytes, sha256:{:x}",
        builders.len(),
        h.finalize()
    );
}
