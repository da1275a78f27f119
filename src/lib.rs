//! Nether-FX: compiled shader effect runtime
//!
//! This crate decodes the compiled effect container format produced by the
//! offline shader toolchain and turns it into live, mutable effect
//! instances: a typed parameter tree, technique/pass metadata with baked
//! render state, and per-instance constant buffer staging ready for upload.
//!
//! # Key Features
//!
//! - **One decode per effect**: containers are decoded once per device and
//!   keyed by their embedded effect key; later loads clone from the
//!   canonical copy
//! - **Typed parameter store**: scalar, vector, matrix, string, and texture
//!   accessors that validate the declared shape on every call
//! - **Change tracking**: every mutation stamps a monotonically increasing
//!   state key, so constant buffers repack only when something they
//!   reference actually moved
//! - **Backend agnostic**: GPU work goes through the [`GpuBackend`] trait;
//!   the runtime never owns device objects
//!
//! # Container Overview
//!
//! A container holds:
//! - Header with signature, format version, shader profile, and effect key
//! - Constant buffer layouts (sizes plus parameter offset tables)
//! - Opaque shader bytecode blobs
//! - A recursive parameter tree with initial values
//! - Techniques and passes referencing shaders and render state blocks
//!
//! # Usage
//!
//! ```ignore
//! use nether_fx::{Effect, EffectCache, ShaderProfile};
//!
//! let mut cache = EffectCache::new(ShaderProfile::OpenGl);
//! let bytes = std::fs::read("sprite.nfxb").unwrap();
//! let mut effect = Effect::from_bytes(&mut cache, &bytes).unwrap();
//!
//! effect.parameter_mut("DiffuseColor").unwrap()
//!     .set_vec4(glam::Vec4::ONE).unwrap();
//!
//! // Per draw:
//! effect.apply(&mut backend);
//! effect.apply_pass(0, &mut backend).unwrap();
//! ```

mod backend;
mod constant_buffer;
mod container;
mod dual_texture;
mod effect;
mod error;
mod parameter;
mod reader;
mod states;

pub use backend::{GpuBackend, ShaderHandle, ShaderStage, Texture, TextureHandle, TextureKind};
pub use constant_buffer::ConstantBuffer;
pub use container::{ConstantBufferLayout, FxHeader, Pass, ShaderBlob, Technique, read_header};
pub use dual_texture::DualTextureEffect;
pub use effect::{Effect, EffectCache, EffectCore};
pub use error::FxError;
pub use parameter::{EffectAnnotations, EffectParameter, ParameterClass, ParameterType};
pub use states::{
    Blend, BlendFunction, BlendStateBlock, ColorWriteChannels, CompareFunction, CullMode,
    DepthStencilStateBlock, FillMode, RasterizerStateBlock, StencilOperation,
};

// =============================================================================
// Constants
// =============================================================================

/// Container signature, little-endian `"NFXB"`
pub const FX_MAGIC: u32 = u32::from_le_bytes(*b"NFXB");

/// Container format version this runtime reads. Older versions are stale
/// toolchain output and are rejected rather than half-decoded.
pub const FX_VERSION: u8 = 10;

// =============================================================================
// Shader Profile
// =============================================================================

/// Target shader platform a container was compiled for.
///
/// A device only accepts containers matching its own profile; the byte
/// layout is identical but the embedded bytecode is not portable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ShaderProfile {
    OpenGl = 0,
    DirectX = 1,
}

impl ShaderProfile {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ShaderProfile::OpenGl),
            1 => Some(ShaderProfile::DirectX),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_bytes() {
        assert_eq!(FX_MAGIC.to_le_bytes(), *b"NFXB");
    }

    #[test]
    fn test_profile_from_u8() {
        assert_eq!(ShaderProfile::from_u8(0), Some(ShaderProfile::OpenGl));
        assert_eq!(ShaderProfile::from_u8(1), Some(ShaderProfile::DirectX));
        assert_eq!(ShaderProfile::from_u8(2), None);
    }
}
