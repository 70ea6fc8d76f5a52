use std::fmt;

use nnhost_contracts as abi;

use crate::errno::Errno;
use crate::memory::GuestMemory;

/// Tensor element types recognized by the guest ABI. Decoding is closed:
/// any other code is a construction error, never a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorType {
    F16,
    F32,
    U8,
    I32,
}

impl TensorType {
    pub fn from_raw(raw: u32) -> Result<TensorType, Errno> {
        match raw {
            abi::TENSOR_TYPE_F16 => Ok(TensorType::F16),
            abi::TENSOR_TYPE_F32 => Ok(TensorType::F32),
            abi::TENSOR_TYPE_U8 => Ok(TensorType::U8),
            abi::TENSOR_TYPE_I32 => Ok(TensorType::I32),
            _ => Err(Errno::InvalidArgument),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            TensorType::F16 => abi::TENSOR_TYPE_F16,
            TensorType::F32 => abi::TENSOR_TYPE_F32,
            TensorType::U8 => abi::TENSOR_TYPE_U8,
            TensorType::I32 => abi::TENSOR_TYPE_I32,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TensorType::F16 => "f16",
            TensorType::F32 => "f32",
            TensorType::U8 => "u8",
            TensorType::I32 => "i32",
        }
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully validated guest tensor. `data` borrows guest memory and must not
/// outlive the call that decoded it.
#[derive(Debug)]
pub struct Tensor<'m> {
    pub dimensions: Vec<u32>,
    pub tensor_type: TensorType,
    pub data: &'m [u8],
}

fn u32_at(b: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]])
}

/// Decode the fixed 20-byte tensor record at `record_ptr`:
/// `| dim ptr | dim count | tensor type | data ptr | data len |`, u32 LE each.
/// Field order is part of the guest ABI.
pub fn decode_tensor<'m>(mem: &'m GuestMemory<'_>, record_ptr: u32) -> Result<Tensor<'m>, Errno> {
    let record = mem
        .bytes(record_ptr, abi::TENSOR_RECORD_BYTES)
        .map_err(|e| {
            log::error!("tensor record at {record_ptr:#x} is out of bounds");
            e
        })?;
    let dim_ptr = u32_at(record, 0);
    let dim_count = u32_at(record, 4);
    let raw_type = u32_at(record, 8);
    let data_ptr = u32_at(record, 12);
    let data_len = u32_at(record, 16);

    let dimensions = mem.u32_array(dim_ptr, dim_count).map_err(|e| {
        log::error!("tensor dimension array at {dim_ptr:#x} x{dim_count} is out of bounds");
        e
    })?;
    let data = mem.bytes(data_ptr, data_len).map_err(|e| {
        log::error!("tensor data at {data_ptr:#x}+{data_len} is out of bounds");
        e
    })?;
    let tensor_type = TensorType::from_raw(raw_type).map_err(|e| {
        log::error!("unknown tensor type {raw_type}");
        e
    })?;

    Ok(Tensor {
        dimensions,
        tensor_type,
        data,
    })
}

/// Decode `count` consecutive 8-byte builder records at `base_ptr`, each
/// `| blob ptr | blob len |` u32 LE, and resolve every referenced blob.
/// Record order is preserved exactly; the first invalid record or blob fails
/// the whole call.
pub fn decode_builders<'m>(
    mem: &'m GuestMemory<'_>,
    base_ptr: u32,
    count: u32,
) -> Result<Vec<&'m [u8]>, Errno> {
    let total = count
        .checked_mul(abi::BUILDER_RECORD_BYTES)
        .ok_or(Errno::InvalidArgument)?;
    let records = mem.bytes(base_ptr, total).map_err(|e| {
        log::error!("builder record array at {base_ptr:#x} x{count} is out of bounds");
        e
    })?;

    let mut builders: Vec<&[u8]> = Vec::with_capacity(count as usize);
    for (i, rec) in records
        .chunks_exact(abi::BUILDER_RECORD_BYTES as usize)
        .enumerate()
    {
        let ptr = u32_at(rec, 0);
        let len = u32_at(rec, 4);
        let blob = mem.bytes(ptr, len).map_err(|e| {
            log::error!("builder[{i}] blob at {ptr:#x}+{len} is out of bounds");
            e
        })?;
        builders.push(blob);
    }
    Ok(builders)
}
