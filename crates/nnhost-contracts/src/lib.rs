//! Shared, version-pinned guest ABI numbers.
//!
//! These constants are the single source of truth for every value that
//! crosses the guest boundary: status codes, device and tensor-type codes,
//! backend tags, and the fixed wire-record sizes. Changing any of them is an
//! ABI break for existing guests.

/// Status codes returned to the guest. Nothing else ever crosses the
/// boundary on failure.
pub const STATUS_SUCCESS: u32 = 0;
pub const STATUS_INVALID_ARGUMENT: u32 = 1;
pub const STATUS_INVALID_ENCODING: u32 = 2;
pub const STATUS_MISSING_MEMORY: u32 = 3;
pub const STATUS_BUSY: u32 = 4;
pub const STATUS_RUNTIME_ERROR: u32 = 5;

/// Execution device selectors accepted by `load`.
pub const DEVICE_CPU: u32 = 0;
pub const DEVICE_GPU: u32 = 1;
pub const DEVICE_TPU: u32 = 2;

/// Tensor element-type codes. Unrecognized codes are rejected, never
/// defaulted.
pub const TENSOR_TYPE_F16: u32 = 0;
pub const TENSOR_TYPE_F32: u32 = 1;
pub const TENSOR_TYPE_U8: u32 = 2;
pub const TENSOR_TYPE_I32: u32 = 3;

/// Backend tag space known to the guest ABI. Only a subset has a compiled-in
/// capability at any given build; the rest are uniformly rejected at
/// dispatch.
pub const BACKEND_OPENVINO: u32 = 0;
pub const BACKEND_ONNX: u32 = 1;
pub const BACKEND_TENSORFLOW: u32 = 2;
pub const BACKEND_PYTORCH: u32 = 3;
pub const BACKEND_TENSORFLOW_LITE: u32 = 4;
pub const BACKEND_AUTODETECT: u32 = 5;
pub const BACKEND_GGML: u32 = 6;

/// Builder record: `| blob ptr: u32 LE | blob len: u32 LE |`.
pub const BUILDER_RECORD_BYTES: u32 = 8;

/// Tensor record:
/// `| dim ptr | dim count | tensor type | data ptr | data len |`, u32 LE each.
pub const TENSOR_RECORD_BYTES: u32 = 20;

/// Schema version for the named-model manifest accepted via `NN_HOST_MODELS`.
pub const MODEL_MANIFEST_SCHEMA_VERSION: &str = "nnhost.models@0.1.0";
