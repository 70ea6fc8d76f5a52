//! Host-side trust boundary for guest-requested inference.
//!
//! A sandboxed guest hands this crate numeric handles and (offset, length)
//! pairs relative to its own linear memory. Every referenced region is
//! bounds-checked before a single byte of it is interpreted; validated
//! requests are then dispatched to the compiled-in inference backend named by
//! the tag recorded on the handle. The only state shared across calls lives
//! in [`NnEnv`]: two append-only handle tables and the named-model cache.
//!
//! Resolving the guest memory instance itself is the embedder's job; an
//! absent instance is an infrastructure fault that never reaches these
//! operations. Everything past that point reports failure as a status code
//! from the closed [`Errno`] set; nothing here panics or unwinds across the
//! operation surface, and the guest never sees host-side diagnostics.

mod backend;
mod env;
mod errno;
mod memory;
mod ops;
mod registry;
mod tensor;

pub use backend::{Backend, BackendCtxId, BackendGraphId, BackendSet, BackendTag, Device};
pub use env::{ExecContext, Graph, NnEnv};
pub use errno::{raw_status, Errno};
pub use memory::GuestMemory;
pub use ops::{
    compute, get_output, init_execution_context, load, load_by_name, load_by_name_with_config,
    set_input,
};
pub use registry::{ModelRegistry, RegisteredModel, ENV_MODELS_MANIFEST, ENV_PRELOAD};
pub use tensor::{decode_builders, decode_tensor, Tensor, TensorType};
