//! Constant buffer staging and packing
//!
//! Each constant buffer owns a staging byte region sized by the container's
//! declared layout. Packing materializes current parameter values into the
//! staging bytes at the offsets the effect compiler chose. A buffer is only
//! repacked when some referenced parameter's state key moved past the key
//! recorded at the last pack, so clean buffers cost one comparison per draw.

use std::sync::Arc;

use crate::container::ConstantBufferLayout;
use crate::parameter::{EffectParameter, ParamCell};

/// Packed staging copy of one constant buffer, owned per effect instance.
#[derive(Debug)]
pub struct ConstantBuffer {
    name: Arc<str>,
    /// `(root parameter index, byte offset)` pairs from the container.
    offsets: Vec<(u32, u16)>,
    staging: Vec<u8>,
    /// Largest referenced state key at the last pack; `None` forces a pack.
    last_packed: Option<u64>,
}

impl ConstantBuffer {
    pub(crate) fn from_layout(layout: &ConstantBufferLayout) -> Self {
        Self {
            name: Arc::clone(&layout.name),
            offsets: layout.offsets.clone(),
            staging: vec![0u8; layout.size_bytes as usize],
            last_packed: None,
        }
    }

    /// Staging copy for a cloned instance: bytes carry over, but the clone
    /// repacks on first use against its own parameter tree.
    pub(crate) fn clone_for_instance(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            offsets: self.offsets.clone(),
            staging: self.staging.clone(),
            last_packed: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current packed bytes. Only meaningful after [`pack`](Self::pack).
    pub fn bytes(&self) -> &[u8] {
        &self.staging
    }

    /// Refresh the staging bytes from current parameter values.
    ///
    /// Returns true if the buffer was repacked and should be re-uploaded.
    /// `parameters` is the owning instance's root parameter list; the
    /// layout's indices point into it.
    pub fn pack(&mut self, parameters: &[EffectParameter]) -> bool {
        let mut max_key = 0u64;
        for &(index, _) in &self.offsets {
            if let Some(param) = parameters.get(index as usize) {
                max_key = max_key.max(param.max_state_key());
            }
        }
        if let Some(last) = self.last_packed
            && last >= max_key
        {
            return false;
        }

        for &(index, offset) in &self.offsets {
            if let Some(param) = parameters.get(index as usize) {
                write_parameter(&mut self.staging, offset as usize, param);
            }
        }
        self.last_packed = Some(max_key);
        true
    }
}

/// Serialize one parameter subtree into the staging bytes starting at
/// `offset`. Array elements and struct members are written sequentially;
/// object cells occupy no constant buffer space. Returns the bytes written.
fn write_parameter(out: &mut [u8], offset: usize, param: &EffectParameter) -> usize {
    if !param.elements().is_empty() {
        let mut written = 0;
        for element in param.elements() {
            written += write_parameter(out, offset + written, element);
        }
        return written;
    }
    if !param.struct_members().is_empty() {
        let mut written = 0;
        for member in param.struct_members() {
            written += write_parameter(out, offset + written, member);
        }
        return written;
    }

    match param.cell() {
        ParamCell::Int(d) => write_bytes(out, offset, bytemuck::cast_slice(d)),
        ParamCell::Float(d) => write_bytes(out, offset, bytemuck::cast_slice(d)),
        ParamCell::Str(bytes) => write_bytes(out, offset, bytes),
        ParamCell::Texture(_) | ParamCell::None => 0,
    }
}

/// Bounded copy: a layout that overruns its declared size is clamped rather
/// than trusted.
fn write_bytes(out: &mut [u8], offset: usize, src: &[u8]) -> usize {
    if offset >= out.len() {
        return 0;
    }
    let len = src.len().min(out.len() - offset);
    out[offset..offset + len].copy_from_slice(&src[..len]);
    len
}
