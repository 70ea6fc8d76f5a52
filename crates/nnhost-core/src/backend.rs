use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use nnhost_contracts as abi;

use crate::errno::Errno;
use crate::tensor::Tensor;

/// The backend tag space known to the guest ABI, fixed at build time. Raw
/// values outside this set fail to decode; tags inside the set but without a
/// compiled-in capability are rejected uniformly at dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendTag {
    OpenVino,
    Onnx,
    Tensorflow,
    PyTorch,
    TensorflowLite,
    Autodetect,
    Ggml,
}

impl BackendTag {
    pub fn from_raw(raw: u32) -> Result<BackendTag, Errno> {
        match raw {
            abi::BACKEND_OPENVINO => Ok(BackendTag::OpenVino),
            abi::BACKEND_ONNX => Ok(BackendTag::Onnx),
            abi::BACKEND_TENSORFLOW => Ok(BackendTag::Tensorflow),
            abi::BACKEND_PYTORCH => Ok(BackendTag::PyTorch),
            abi::BACKEND_TENSORFLOW_LITE => Ok(BackendTag::TensorflowLite),
            abi::BACKEND_AUTODETECT => Ok(BackendTag::Autodetect),
            abi::BACKEND_GGML => Ok(BackendTag::Ggml),
            _ => Err(Errno::InvalidEncoding),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            BackendTag::OpenVino => abi::BACKEND_OPENVINO,
            BackendTag::Onnx => abi::BACKEND_ONNX,
            BackendTag::Tensorflow => abi::BACKEND_TENSORFLOW,
            BackendTag::PyTorch => abi::BACKEND_PYTORCH,
            BackendTag::TensorflowLite => abi::BACKEND_TENSORFLOW_LITE,
            BackendTag::Autodetect => abi::BACKEND_AUTODETECT,
            BackendTag::Ggml => abi::BACKEND_GGML,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackendTag::OpenVino => "openvino",
            BackendTag::Onnx => "onnx",
            BackendTag::Tensorflow => "tensorflow",
            BackendTag::PyTorch => "pytorch",
            BackendTag::TensorflowLite => "tensorflowlite",
            BackendTag::Autodetect => "autodetect",
            BackendTag::Ggml => "ggml",
        }
    }
}

impl fmt::Display for BackendTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct UnknownNameError {
    what: &'static str,
    value: String,
}

impl fmt::Display for UnknownNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} {:?}", self.what, self.value)
    }
}

impl std::error::Error for UnknownNameError {}

impl FromStr for BackendTag {
    type Err = UnknownNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openvino" => Ok(BackendTag::OpenVino),
            "onnx" => Ok(BackendTag::Onnx),
            "tensorflow" => Ok(BackendTag::Tensorflow),
            "pytorch" => Ok(BackendTag::PyTorch),
            "tensorflowlite" | "tflite" => Ok(BackendTag::TensorflowLite),
            "autodetect" => Ok(BackendTag::Autodetect),
            "ggml" => Ok(BackendTag::Ggml),
            other => Err(UnknownNameError {
                what: "backend",
                value: other.to_string(),
            }),
        }
    }
}

/// Execution device selector. Validated before any backend is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
    Gpu,
    Tpu,
}

impl Device {
    pub fn from_raw(raw: u32) -> Result<Device, Errno> {
        match raw {
            abi::DEVICE_CPU => Ok(Device::Cpu),
            abi::DEVICE_GPU => Ok(Device::Gpu),
            abi::DEVICE_TPU => Ok(Device::Tpu),
            _ => Err(Errno::InvalidArgument),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            Device::Cpu => abi::DEVICE_CPU,
            Device::Gpu => abi::DEVICE_GPU,
            Device::Tpu => abi::DEVICE_TPU,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Gpu => "gpu",
            Device::Tpu => "tpu",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = UnknownNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "gpu" => Ok(Device::Gpu),
            "tpu" => Ok(Device::Tpu),
            other => Err(UnknownNameError {
                what: "device",
                value: other.to_string(),
            }),
        }
    }
}

/// Opaque graph id minted by a backend; meaningful only to the backend that
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendGraphId(pub u64);

/// Opaque execution-context id minted by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCtxId(pub u64);

/// One inference-engine capability. All state behind the minted ids is owned
/// by the implementation; the core holds nothing but the ids and the tag.
/// Failures are reported through the same closed [`Errno`] set the guest
/// sees, and the core passes them through unchanged.
pub trait Backend: Send + Sync {
    /// Build a graph from the ordered builder blobs. `config` carries the raw
    /// configuration supplied by load-by-name-with-config, if any.
    fn load(
        &self,
        builders: &[&[u8]],
        device: Device,
        config: Option<&[u8]>,
    ) -> Result<BackendGraphId, Errno>;

    fn init_execution_context(&self, graph: BackendGraphId) -> Result<BackendCtxId, Errno>;

    fn set_input(&self, ctx: BackendCtxId, index: u32, tensor: &Tensor<'_>) -> Result<(), Errno>;

    fn compute(&self, ctx: BackendCtxId) -> Result<(), Errno>;

    /// Write output tensor bytes into `out` and return the byte count. The
    /// backend must fail rather than write past `out.len()`.
    fn get_output(&self, ctx: BackendCtxId, index: u32, out: &mut [u8]) -> Result<u32, Errno>;
}

/// The compiled-in capability set: one optional slot per tag that can carry
/// one. Resolution is a single closed match; a tag without a capability is
/// logged and rejected with `invalid-encoding`, identically at every dispatch
/// site. Deliberately not an open-ended registry.
#[derive(Default)]
pub struct BackendSet {
    openvino: Option<Arc<dyn Backend>>,
    onnx: Option<Arc<dyn Backend>>,
    tensorflow: Option<Arc<dyn Backend>>,
    pytorch: Option<Arc<dyn Backend>>,
    tensorflow_lite: Option<Arc<dyn Backend>>,
    ggml: Option<Arc<dyn Backend>>,
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tag: BackendTag, backend: Arc<dyn Backend>) -> Self {
        let slot = match tag {
            BackendTag::OpenVino => &mut self.openvino,
            BackendTag::Onnx => &mut self.onnx,
            BackendTag::Tensorflow => &mut self.tensorflow,
            BackendTag::PyTorch => &mut self.pytorch,
            BackendTag::TensorflowLite => &mut self.tensorflow_lite,
            BackendTag::Ggml => &mut self.ggml,
            BackendTag::Autodetect => {
                log::warn!("backend tag {tag} cannot carry a capability; ignored");
                return self;
            }
        };
        *slot = Some(backend);
        self
    }

    pub(crate) fn capability(&self, tag: BackendTag) -> Result<&dyn Backend, Errno> {
        let slot = match tag {
            BackendTag::OpenVino => self.openvino.as_deref(),
            BackendTag::Onnx => self.onnx.as_deref(),
            BackendTag::Tensorflow => self.tensorflow.as_deref(),
            BackendTag::PyTorch => self.pytorch.as_deref(),
            BackendTag::TensorflowLite => self.tensorflow_lite.as_deref(),
            BackendTag::Ggml => self.ggml.as_deref(),
            BackendTag::Autodetect => None,
        };
        match slot {
            Some(b) => Ok(b),
            None => {
                log::error!("no compiled-in backend for tag {} ({tag})", tag.raw());
                Err(Errno::InvalidEncoding)
            }
        }
    }
}
