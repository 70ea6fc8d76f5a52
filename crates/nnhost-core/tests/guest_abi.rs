use std::sync::Arc;

use nnhost_backend_echo::EchoBackend;
use nnhost_core::{
    compute, get_output, init_execution_context, load, raw_status, set_input, BackendGraphId,
    BackendSet, BackendTag, Errno, GuestMemory, ModelRegistry, NnEnv,
};

/// A fake guest linear memory with a bump allocator, so tests can place
/// blobs and records at arbitrary offsets the way a real guest would.
struct GuestHeap {
    mem: Vec<u8>,
    next: u32,
}

impl GuestHeap {
    fn new(size: usize) -> Self {
        GuestHeap {
            mem: vec![0u8; size],
            next: 16,
        }
    }

    fn alloc(&mut self, bytes: &[u8]) -> u32 {
        let at = self.next;
        let end = at as usize + bytes.len();
        self.mem[at as usize..end].copy_from_slice(bytes);
        self.next = (end as u32 + 3) & !3;
        at
    }

    fn alloc_u32s(&mut self, vals: &[u32]) -> u32 {
        let mut bytes = Vec::with_capacity(vals.len() * 4);
        for v in vals {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        self.alloc(&bytes)
    }

    /// Zeroed scratch space for out-params and output buffers.
    fn reserve(&mut self, len: u32) -> u32 {
        let at = self.next;
        self.next = (at + len + 3) & !3;
        assert!((self.next as usize) <= self.mem.len(), "heap exhausted");
        at
    }

    fn read_u32(&self, at: u32) -> u32 {
        let b = &self.mem[at as usize..at as usize + 4];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    /// Write builder blobs and the record array; returns the array offset.
    fn builder_array(&mut self, blobs: &[&[u8]]) -> u32 {
        let mut records = Vec::with_capacity(blobs.len() * 2);
        for blob in blobs {
            let ptr = self.alloc(blob);
            records.push(ptr);
            records.push(blob.len() as u32);
        }
        self.alloc_u32s(&records)
    }

    /// Write dims, data, and the 20-byte tensor record; returns the record
    /// offset.
    fn tensor_record(&mut self, dims: &[u32], tensor_type: u32, data: &[u8]) -> u32 {
        let dim_ptr = self.alloc_u32s(dims);
        let data_ptr = self.alloc(data);
        self.alloc_u32s(&[
            dim_ptr,
            dims.len() as u32,
            tensor_type,
            data_ptr,
            data.len() as u32,
        ])
    }
}

const GGML: u32 = 6;

fn echo_env() -> (NnEnv, Arc<EchoBackend>) {
    let echo = Arc::new(EchoBackend::new());
    let backends = BackendSet::new().with(BackendTag::Ggml, echo.clone());
    (NnEnv::new(backends, ModelRegistry::new()), echo)
}

#[test]
fn end_to_end_load_compute_get_output() {
    let (env, echo) = echo_env();
    let mut heap = GuestHeap::new(4096);

    let builders = heap.builder_array(&[b"model-bytes".as_slice()]);
    let graph_out = heap.reserve(4);
    let mut mem = GuestMemory::new(&mut heap.mem);
    load(&env, &mut mem, builders, 1, GGML, 0, graph_out).unwrap();
    drop(mem);
    assert_eq!(heap.read_u32(graph_out), 0);
    assert_eq!(echo.model_bytes(BackendGraphId(0)).unwrap(), b"model-bytes");

    let ctx_out = heap.reserve(4);
    let mut mem = GuestMemory::new(&mut heap.mem);
    init_execution_context(&env, &mut mem, 0, ctx_out).unwrap();
    drop(mem);
    assert_eq!(heap.read_u32(ctx_out), 0);

    let input = [7u8; 12];
    let record = heap.tensor_record(&[1, 3], 1, &input);
    let mem = GuestMemory::new(&mut heap.mem);
    assert_eq!(raw_status(set_input(&env, &mem, 0, 0, record)), 0);
    drop(mem);

    assert_eq!(raw_status(compute(&env, 0)), 0);

    let out_buf = heap.reserve(64);
    let written_out = heap.reserve(4);
    let mut mem = GuestMemory::new(&mut heap.mem);
    get_output(&env, &mut mem, 0, 0, out_buf, 64, written_out).unwrap();
    drop(mem);

    let written = heap.read_u32(written_out);
    assert!(written <= 64);
    assert_eq!(written, 12);
    assert_eq!(
        &heap.mem[out_buf as usize..out_buf as usize + 12],
        &input[..]
    );
}

#[test]
fn out_of_bounds_builders_fail_before_any_backend_call() {
    let (env, echo) = echo_env();
    let mut heap = GuestHeap::new(256);

    // Record claims a blob that overruns the memory.
    let records = heap.alloc_u32s(&[200, 100]);
    let graph_out = heap.reserve(4);
    let mut mem = GuestMemory::new(&mut heap.mem);
    assert_eq!(
        load(&env, &mut mem, records, 1, GGML, 0, graph_out).err(),
        Some(Errno::InvalidArgument)
    );
    drop(mem);

    // Record array itself out of bounds.
    let mut mem = GuestMemory::new(&mut heap.mem);
    assert_eq!(
        load(&env, &mut mem, 250, 4, GGML, 0, graph_out).err(),
        Some(Errno::InvalidArgument)
    );
    drop(mem);

    assert_eq!(env.graph_count(), 0);
    assert!(echo.model_bytes(BackendGraphId(0)).is_none());
}

#[test]
fn out_of_bounds_graph_id_destination_fails_first() {
    let (env, _echo) = echo_env();
    let mut heap = GuestHeap::new(256);
    let builders = heap.builder_array(&[b"x".as_slice()]);
    let mut mem = GuestMemory::new(&mut heap.mem);
    assert_eq!(
        load(&env, &mut mem, builders, 1, GGML, 0, 254).err(),
        Some(Errno::InvalidArgument)
    );
    drop(mem);
    assert_eq!(env.graph_count(), 0);
}

#[test]
fn unknown_device_codes_are_rejected_without_dispatch() {
    let (env, echo) = echo_env();
    let mut heap = GuestHeap::new(256);
    let builders = heap.builder_array(&[b"x".as_slice()]);
    let graph_out = heap.reserve(4);
    for raw_device in [3u32, 17, u32::MAX] {
        let mut mem = GuestMemory::new(&mut heap.mem);
        assert_eq!(
            load(&env, &mut mem, builders, 1, GGML, raw_device, graph_out).err(),
            Some(Errno::InvalidArgument)
        );
    }
    assert_eq!(env.graph_count(), 0);
    assert!(echo.model_bytes(BackendGraphId(0)).is_none());
}

#[test]
fn unknown_tensor_type_codes_are_rejected() {
    let (env, _echo) = echo_env();
    let mut heap = GuestHeap::new(1024);

    let builders = heap.builder_array(&[b"m".as_slice()]);
    let graph_out = heap.reserve(4);
    let ctx_out = heap.reserve(4);
    let mut mem = GuestMemory::new(&mut heap.mem);
    load(&env, &mut mem, builders, 1, GGML, 0, graph_out).unwrap();
    init_execution_context(&env, &mut mem, 0, ctx_out).unwrap();
    drop(mem);

    let record = heap.tensor_record(&[1], 4, b"abcd");
    let mem = GuestMemory::new(&mut heap.mem);
    assert_eq!(
        set_input(&env, &mem, 0, 0, record).err(),
        Some(Errno::InvalidArgument)
    );
}

#[test]
fn backend_tags_outside_the_compiled_set_fail_uniformly() {
    let (env, _echo) = echo_env();
    let mut heap = GuestHeap::new(512);
    let builders = heap.builder_array(&[b"x".as_slice()]);
    let graph_out = heap.reserve(4);

    // Tag 99 is outside the ABI tag space; tag 0 (openvino) and tag 5
    // (autodetect) decode but have no compiled-in capability here. All are
    // the same failure to the guest.
    for raw_tag in [99u32, 0, 5] {
        let mut mem = GuestMemory::new(&mut heap.mem);
        assert_eq!(
            load(&env, &mut mem, builders, 1, raw_tag, 0, graph_out).err(),
            Some(Errno::InvalidEncoding)
        );
    }
    assert_eq!(env.graph_count(), 0);
}

#[test]
fn handle_indices_stay_valid_and_past_end_fails() {
    let (env, _echo) = echo_env();
    let mut heap = GuestHeap::new(2048);

    let builders = heap.builder_array(&[b"first".as_slice()]);
    let builders2 = heap.builder_array(&[b"second".as_slice()]);
    let graph_out = heap.reserve(4);
    let ctx_out = heap.reserve(4);
    let mut mem = GuestMemory::new(&mut heap.mem);
    load(&env, &mut mem, builders, 1, GGML, 0, graph_out).unwrap();
    assert_eq!(mem.read_u32(graph_out).unwrap(), 0);
    load(&env, &mut mem, builders2, 1, GGML, 0, graph_out).unwrap();
    assert_eq!(mem.read_u32(graph_out).unwrap(), 1);

    assert_eq!(
        init_execution_context(&env, &mut mem, 2, ctx_out).err(),
        Some(Errno::InvalidArgument)
    );
    init_execution_context(&env, &mut mem, 0, ctx_out).unwrap();
    drop(mem);
    assert_eq!(heap.read_u32(ctx_out), 0);

    // The first graph index keeps working after later appends.
    let mut mem = GuestMemory::new(&mut heap.mem);
    init_execution_context(&env, &mut mem, 0, ctx_out).unwrap();
    assert_eq!(mem.read_u32(ctx_out).unwrap(), 1);
}

#[test]
fn get_output_one_past_end_is_invalid_without_dispatch() {
    let (env, _echo) = echo_env();
    let mut heap = GuestHeap::new(512);
    let out_buf = heap.reserve(64);
    let written_out = heap.reserve(4);
    let mut mem = GuestMemory::new(&mut heap.mem);
    assert_eq!(
        get_output(&env, &mut mem, 0, 0, out_buf, 64, written_out).err(),
        Some(Errno::InvalidArgument)
    );
    assert_eq!(raw_status(compute(&env, 0)), Errno::InvalidArgument.raw());
}

#[test]
fn builder_order_and_content_reach_the_backend_intact() {
    let (env, echo) = echo_env();
    let mut heap = GuestHeap::new(1024);

    // Distinct sizes (4, 8, 2) at whatever offsets the heap hands out.
    let blobs: [&[u8]; 3] = [b"aaaa", b"bbbbbbbb", b"cc"];
    let builders = heap.builder_array(&blobs);
    let graph_out = heap.reserve(4);
    let mut mem = GuestMemory::new(&mut heap.mem);
    load(&env, &mut mem, builders, 3, GGML, 0, graph_out).unwrap();
    drop(mem);

    assert_eq!(echo.model_bytes(BackendGraphId(0)).unwrap(), b"aaaabbbbbbbbcc");
}

#[test]
fn backend_errors_pass_through_unswallowed() {
    let (env, _echo) = echo_env();
    let mut heap = GuestHeap::new(1024);

    let builders = heap.builder_array(&[b"m".as_slice()]);
    let graph_out = heap.reserve(4);
    let ctx_out = heap.reserve(4);
    let mut mem = GuestMemory::new(&mut heap.mem);
    load(&env, &mut mem, builders, 1, GGML, 0, graph_out).unwrap();
    init_execution_context(&env, &mut mem, 0, ctx_out).unwrap();
    drop(mem);

    // compute with no staged input is the echo backend's runtime error.
    assert_eq!(compute(&env, 0).err(), Some(Errno::RuntimeError));

    let record = heap.tensor_record(&[8], 2, &[9u8; 8]);
    let mem = GuestMemory::new(&mut heap.mem);
    set_input(&env, &mem, 0, 0, record).unwrap();
    drop(mem);
    compute(&env, 0).unwrap();

    // Output larger than the declared capacity is the backend's error too.
    let out_buf = heap.reserve(4);
    let written_out = heap.reserve(4);
    let mut mem = GuestMemory::new(&mut heap.mem);
    assert_eq!(
        get_output(&env, &mut mem, 0, 0, out_buf, 4, written_out).err(),
        Some(Errno::RuntimeError)
    );
}
