//! Effect instances, the device cache, and the clone model
//!
//! Decoding a container is the expensive path, so it happens once per unique
//! effect key per device: the first sight of a key produces a canonical
//! [`EffectCore`] that owns the immutable data (shader blobs, technique and
//! pass metadata, constant buffer layouts, initial parameter values). Every
//! [`Effect`] handed to callers is a lightweight overlay over that core: its
//! own parameter cells, its own constant buffer staging, its own current
//! technique. Cloning an effect costs only the mutable state.

use std::sync::Arc;

use hashbrown::HashMap;

use crate::backend::{GpuBackend, ShaderHandle, ShaderStage};
use crate::constant_buffer::ConstantBuffer;
use crate::container::{self, ShaderBlob, Technique};
use crate::error::FxError;
use crate::parameter::EffectParameter;
use crate::{FxHeader, ShaderProfile};

// =============================================================================
// Canonical Core
// =============================================================================

/// The decoded, immutable half of an effect: shared by the cache and every
/// instance, freed exactly once when the last reference drops.
#[derive(Debug)]
pub struct EffectCore {
    pub effect_key: i32,
    pub(crate) layouts: Vec<container::ConstantBufferLayout>,
    pub(crate) shaders: Vec<ShaderBlob>,
    /// Canonical parameter tree holding the container's initial values.
    pub(crate) parameters: Vec<EffectParameter>,
    pub(crate) techniques: Vec<Technique>,
}

// =============================================================================
// Device Cache
// =============================================================================

/// Per-device cache of canonical effects, keyed by the container's embedded
/// effect key. Lives as long as the device context; not internally locked -
/// use it from the thread that owns the device.
pub struct EffectCache {
    profile: ShaderProfile,
    effects: HashMap<i32, Arc<EffectCore>>,
}

impl EffectCache {
    pub fn new(profile: ShaderProfile) -> Self {
        Self {
            profile,
            effects: HashMap::new(),
        }
    }

    pub fn profile(&self) -> ShaderProfile {
        self.profile
    }

    /// Number of distinct canonical effects seen by this device.
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Drop all canonical entries. Live instances keep their cores alive;
    /// the shared data is freed when the last of them goes away.
    pub fn clear(&mut self) {
        self.effects.clear();
    }

    /// Look up or decode the canonical core for a byte stream.
    fn acquire(&mut self, bytes: &[u8]) -> Result<Arc<EffectCore>, FxError> {
        let header = container::read_header(bytes, self.profile)?;
        if let Some(core) = self.effects.get(&header.effect_key) {
            tracing::trace!(effect_key = header.effect_key, "effect cache hit");
            return Ok(Arc::clone(core));
        }

        let decoded = container::decode(bytes, self.profile)?;
        let core = Arc::new(EffectCore {
            effect_key: decoded.effect_key,
            layouts: decoded.layouts,
            shaders: decoded.shaders,
            parameters: decoded.parameters,
            techniques: decoded.techniques,
        });
        self.effects.insert(header.effect_key, Arc::clone(&core));
        Ok(core)
    }
}

// =============================================================================
// Effect Instance
// =============================================================================

/// A live effect: shared immutable core plus independently owned parameter
/// values, constant buffer staging, and technique selection.
pub struct Effect {
    core: Arc<EffectCore>,
    parameters: Vec<EffectParameter>,
    constant_buffers: Vec<ConstantBuffer>,
    /// Lazily resolved backend handles, one slot per shader blob.
    shader_handles: Vec<Option<ShaderHandle>>,
    current_technique: usize,
}

impl Effect {
    /// Construct an effect from compiled container bytes.
    ///
    /// The first time a given effect key is seen by `cache` the body is
    /// fully decoded and registered; afterwards only the header is read.
    /// Either way the caller gets a fresh instance cloned from the
    /// canonical data.
    pub fn from_bytes(cache: &mut EffectCache, bytes: &[u8]) -> Result<Effect, FxError> {
        let core = cache.acquire(bytes)?;
        Ok(Self::from_core(core))
    }

    /// Validate a container header and extract its effect key without
    /// touching a cache.
    pub fn read_header(bytes: &[u8], profile: ShaderProfile) -> Result<FxHeader, FxError> {
        container::read_header(bytes, profile)
    }

    fn from_core(core: Arc<EffectCore>) -> Effect {
        let parameters = core.parameters.iter().map(|p| p.deep_clone()).collect();
        let constant_buffers = core
            .layouts
            .iter()
            .map(ConstantBuffer::from_layout)
            .collect();
        let shader_handles = vec![None; core.shaders.len()];
        Effect {
            core,
            parameters,
            constant_buffers,
            shader_handles,
            current_technique: 0,
        }
    }

    /// Duplicate this instance: immutable data stays shared, parameter
    /// values and constant buffer staging are deep-copied, and the current
    /// technique carries over by position.
    pub fn clone_effect(&self) -> Effect {
        Effect {
            core: Arc::clone(&self.core),
            parameters: self.parameters.iter().map(|p| p.deep_clone()).collect(),
            constant_buffers: self
                .constant_buffers
                .iter()
                .map(|cb| cb.clone_for_instance())
                .collect(),
            shader_handles: vec![None; self.core.shaders.len()],
            current_technique: self.current_technique,
        }
    }

    /// Content key embedded in the container this effect was decoded from.
    pub fn effect_key(&self) -> i32 {
        self.core.effect_key
    }

    // =========================================================================
    // Parameters
    // =========================================================================

    /// Root parameter nodes, in container order.
    pub fn parameters(&self) -> &[EffectParameter] {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut [EffectParameter] {
        &mut self.parameters
    }

    /// Position of a root parameter by name.
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name() == name)
    }

    pub fn parameter(&self, name: &str) -> Result<&EffectParameter, FxError> {
        self.parameters
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| FxError::UnknownParameter(name.to_string()))
    }

    pub fn parameter_mut(&mut self, name: &str) -> Result<&mut EffectParameter, FxError> {
        self.parameters
            .iter_mut()
            .find(|p| p.name() == name)
            .ok_or_else(|| FxError::UnknownParameter(name.to_string()))
    }

    // =========================================================================
    // Techniques
    // =========================================================================

    pub fn techniques(&self) -> &[Technique] {
        &self.core.techniques
    }

    pub fn current_technique_index(&self) -> usize {
        self.current_technique
    }

    pub fn current_technique(&self) -> &Technique {
        &self.core.techniques[self.current_technique]
    }

    pub fn set_current_technique(&mut self, index: usize) -> Result<(), FxError> {
        if index >= self.core.techniques.len() {
            return Err(FxError::IndexOutOfRange("technique"));
        }
        self.current_technique = index;
        Ok(())
    }

    // =========================================================================
    // Apply
    // =========================================================================

    /// Constant buffer staging copies, in container order.
    pub fn constant_buffers(&self) -> &[ConstantBuffer] {
        &self.constant_buffers
    }

    /// Pre-draw recompute hook. A plain effect has nothing derived to
    /// refresh; wrappers like [`DualTextureEffect`](crate::DualTextureEffect)
    /// flush their dirty state here before delegating to
    /// [`apply`](Self::apply).
    pub fn on_apply(&mut self) {}

    /// Pack and upload every constant buffer whose referenced parameters
    /// changed since the last pack. Call once per draw, after any derived
    /// recompute step and before [`apply_pass`](Self::apply_pass).
    pub fn apply(&mut self, backend: &mut dyn GpuBackend) {
        for (index, cb) in self.constant_buffers.iter_mut().enumerate() {
            if cb.pack(&self.parameters) {
                backend.upload_constant_buffer(index, cb.bytes());
            }
        }
    }

    /// Bind one pass of the current technique: its shader pair and any
    /// baked render state blocks.
    pub fn apply_pass(
        &mut self,
        pass_index: usize,
        backend: &mut dyn GpuBackend,
    ) -> Result<(), FxError> {
        let core = Arc::clone(&self.core);
        let technique = core
            .techniques
            .get(self.current_technique)
            .ok_or(FxError::IndexOutOfRange("technique"))?;
        let pass = technique
            .passes
            .get(pass_index)
            .ok_or(FxError::IndexOutOfRange("pass"))?;

        let vertex = match pass.vertex_shader {
            Some(i) => Some(self.shader_handle(i as usize, ShaderStage::Vertex, backend)?),
            None => None,
        };
        let pixel = match pass.pixel_shader {
            Some(i) => Some(self.shader_handle(i as usize, ShaderStage::Pixel, backend)?),
            None => None,
        };
        backend.bind_shaders(vertex, pixel);

        if let Some(blend) = &pass.blend {
            backend.apply_blend_state(blend);
        }
        if let Some(depth_stencil) = &pass.depth_stencil {
            backend.apply_depth_stencil_state(depth_stencil);
        }
        if let Some(rasterizer) = &pass.rasterizer {
            backend.apply_rasterizer_state(rasterizer);
        }
        Ok(())
    }

    fn shader_handle(
        &mut self,
        index: usize,
        stage: ShaderStage,
        backend: &mut dyn GpuBackend,
    ) -> Result<ShaderHandle, FxError> {
        let blob = self
            .core
            .shaders
            .get(index)
            .ok_or(FxError::IndexOutOfRange("shader"))?;
        if let Some(handle) = self.shader_handles[index] {
            return Ok(handle);
        }
        let handle = backend.load_shader(stage, &blob.bytecode);
        self.shader_handles[index] = Some(handle);
        Ok(handle)
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("effect_key", &self.core.effect_key)
            .field("parameters", &self.parameters.len())
            .field("techniques", &self.core.techniques.len())
            .field("current_technique", &self.current_technique)
            .finish()
    }
}
