//! GPU backend seam
//!
//! The effect runtime never issues draw calls or owns GPU objects. Everything
//! device-facing goes through [`GpuBackend`]: shader blob loading, render
//! state application, and constant buffer upload. Backends are expected to
//! live on the thread that owns the device context.

use crate::states::{BlendStateBlock, DepthStencilStateBlock, RasterizerStateBlock};

/// Handle to a loaded shader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub u32);

impl ShaderHandle {
    /// Invalid/null shader handle
    pub const INVALID: ShaderHandle = ShaderHandle(0);
}

/// Handle to a texture owned by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

impl TextureHandle {
    /// Invalid/null texture handle
    pub const INVALID: TextureHandle = TextureHandle(0);
}

/// Pipeline stage a shader blob targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

/// Texture dimensionality declared by an effect parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    Texture1D,
    Texture2D,
    Texture3D,
    TextureCube,
}

/// A texture reference held by an object-typed effect parameter.
///
/// The runtime stores and returns these; it never dereferences the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Texture {
    pub handle: TextureHandle,
    pub kind: TextureKind,
}

/// Device-facing consumer of decoded effect state.
///
/// [`Effect::apply`](crate::Effect::apply) uploads dirty constant buffers and
/// [`Effect::apply_pass`](crate::Effect::apply_pass) binds a pass's shaders
/// and render state through this trait immediately before a draw.
pub trait GpuBackend {
    /// Load an opaque shader bytecode blob, returning a handle for later
    /// binding. Called lazily, once per blob per effect instance; backends
    /// that want cross-instance sharing can key on the bytecode.
    fn load_shader(&mut self, stage: ShaderStage, bytecode: &[u8]) -> ShaderHandle;

    /// Bind the vertex/pixel shader pair for the next draw. Either handle
    /// may be absent when the pass does not override that stage.
    fn bind_shaders(&mut self, vertex: Option<ShaderHandle>, pixel: Option<ShaderHandle>);

    fn apply_blend_state(&mut self, state: &BlendStateBlock);

    fn apply_depth_stencil_state(&mut self, state: &DepthStencilStateBlock);

    fn apply_rasterizer_state(&mut self, state: &RasterizerStateBlock);

    /// Upload a freshly packed constant buffer. `index` is the buffer's
    /// position in the container's constant buffer list.
    fn upload_constant_buffer(&mut self, index: usize, bytes: &[u8]);
}
