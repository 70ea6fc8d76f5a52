use std::fmt;

use nnhost_contracts as abi;

/// Domain-level failure reported to the guest. Success is not a variant: an
/// operation that completes returns `Ok`, and [`raw_status`] flattens the
/// result to the wire code. Backends report their own failures through this
/// same closed set; the core passes them through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    InvalidArgument,
    InvalidEncoding,
    MissingMemory,
    Busy,
    RuntimeError,
}

impl Errno {
    pub fn raw(self) -> u32 {
        match self {
            Errno::InvalidArgument => abi::STATUS_INVALID_ARGUMENT,
            Errno::InvalidEncoding => abi::STATUS_INVALID_ENCODING,
            Errno::MissingMemory => abi::STATUS_MISSING_MEMORY,
            Errno::Busy => abi::STATUS_BUSY,
            Errno::RuntimeError => abi::STATUS_RUNTIME_ERROR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Errno::InvalidArgument => "invalid-argument",
            Errno::InvalidEncoding => "invalid-encoding",
            Errno::MissingMemory => "missing-memory",
            Errno::Busy => "busy",
            Errno::RuntimeError => "runtime-error",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flatten an operation result to the status code written back to the guest.
pub fn raw_status(res: Result<(), Errno>) -> u32 {
    match res {
        Ok(()) => abi::STATUS_SUCCESS,
        Err(e) => e.raw(),
    }
}
