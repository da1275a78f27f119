//! Built-in dual texture effect
//!
//! A derived effect that blends two texture layers with optional vertex
//! color and fog. All public setters are cheap field writes that mark a
//! dirty bit; the derived quantities (combined world-view-projection, fog
//! vector, packed diffuse, technique index) are recomputed at most once per
//! draw, in [`DualTextureEffect::on_apply`], and only for the bits that
//! actually moved.

use glam::{Mat4, Vec3, Vec4};

use crate::backend::{GpuBackend, Texture};
use crate::effect::{Effect, EffectCache};
use crate::error::FxError;
use crate::parameter::EffectParameter;

// =============================================================================
// Dirty Flags
// =============================================================================

pub(crate) const DIRTY_WORLD_VIEW_PROJ: u32 = 1 << 0;
pub(crate) const DIRTY_FOG: u32 = 1 << 1;
pub(crate) const DIRTY_FOG_ENABLE: u32 = 1 << 2;
pub(crate) const DIRTY_MATERIAL_COLOR: u32 = 1 << 3;
pub(crate) const DIRTY_SHADER_INDEX: u32 = 1 << 4;
pub(crate) const DIRTY_ALL: u32 = DIRTY_WORLD_VIEW_PROJ
    | DIRTY_FOG
    | DIRTY_FOG_ENABLE
    | DIRTY_MATERIAL_COLOR
    | DIRTY_SHADER_INDEX;

// =============================================================================
// Shared Recompute Helpers
// =============================================================================

/// Recompute the combined transform and fog vector parameters for whatever
/// subset of `dirty` needs it, returning the cleared flag set and the cached
/// world-view product for later fog-only updates.
///
/// Shared by every derived effect that carries the standard transform + fog
/// parameter pair.
pub(crate) fn set_world_view_proj_and_fog(
    dirty: u32,
    world: Mat4,
    view: Mat4,
    projection: Mat4,
    world_view: &mut Mat4,
    fog_enabled: bool,
    fog_start: f32,
    fog_end: f32,
    world_view_proj_param: &mut EffectParameter,
    fog_vector_param: &mut EffectParameter,
) -> Result<u32, FxError> {
    let mut dirty = dirty;

    if dirty & DIRTY_WORLD_VIEW_PROJ != 0 {
        *world_view = view * world;
        world_view_proj_param.set_matrix(projection * *world_view)?;
        dirty &= !DIRTY_WORLD_VIEW_PROJ;
    }

    if fog_enabled {
        if dirty & (DIRTY_FOG | DIRTY_FOG_ENABLE) != 0 {
            set_fog_vector(*world_view, fog_start, fog_end, fog_vector_param)?;
            dirty &= !(DIRTY_FOG | DIRTY_FOG_ENABLE);
        }
    } else if dirty & DIRTY_FOG_ENABLE != 0 {
        // Zero fog vector keeps the fog-less shader permutations honest even
        // if a stale technique briefly samples it.
        fog_vector_param.set_vec4(Vec4::ZERO)?;
        dirty &= !(DIRTY_FOG | DIRTY_FOG_ENABLE);
    }

    Ok(dirty)
}

/// Derive the fog vector from the world-view transform: view-space depth
/// remapped so the shader gets fog intensity from a single dot product.
pub(crate) fn set_fog_vector(
    world_view: Mat4,
    fog_start: f32,
    fog_end: f32,
    fog_vector_param: &mut EffectParameter,
) -> Result<(), FxError> {
    if fog_start == fog_end {
        // Degenerate range: fully fogged.
        return fog_vector_param.set_vec4(Vec4::new(0.0, 0.0, 0.0, 1.0));
    }

    let scale = 1.0 / (fog_start - fog_end);
    let depth_row = world_view.row(2);
    fog_vector_param.set_vec4(Vec4::new(
        depth_row.x * scale,
        depth_row.y * scale,
        depth_row.z * scale,
        (depth_row.w + fog_start) * scale,
    ))
}

// =============================================================================
// DualTextureEffect
// =============================================================================

/// Positions of the parameters the effect writes during recompute, resolved
/// once against the owning instance's parameter list.
#[derive(Debug, Clone, Copy)]
struct ParamSlots {
    texture: usize,
    texture2: usize,
    diffuse_color: usize,
    fog_color: usize,
    fog_vector: usize,
    world_view_proj: usize,
}

impl ParamSlots {
    fn resolve(effect: &Effect) -> Result<ParamSlots, FxError> {
        let slot = |name: &str| {
            effect
                .parameter_index(name)
                .ok_or_else(|| FxError::UnknownParameter(name.to_string()))
        };
        Ok(ParamSlots {
            texture: slot("Texture")?,
            texture2: slot("Texture2")?,
            diffuse_color: slot("DiffuseColor")?,
            fog_color: slot("FogColor")?,
            fog_vector: slot("FogVector")?,
            world_view_proj: slot("WorldViewProj")?,
        })
    }
}

/// Two-layer texture blend effect with fog and optional per-vertex color.
pub struct DualTextureEffect {
    effect: Effect,
    slots: ParamSlots,
    dirty: u32,

    world: Mat4,
    view: Mat4,
    projection: Mat4,
    /// Cached `view * world`, valid whenever the transform bit is clean.
    world_view: Mat4,

    diffuse_color: Vec3,
    alpha: f32,

    fog_enabled: bool,
    fog_start: f32,
    fog_end: f32,

    vertex_color_enabled: bool,
}

impl DualTextureEffect {
    /// Build from compiled container bytes via the device cache.
    pub fn from_bytes(cache: &mut EffectCache, bytes: &[u8]) -> Result<Self, FxError> {
        Self::from_effect(Effect::from_bytes(cache, bytes)?)
    }

    /// Wrap an already-constructed instance. The container must expose the
    /// standard dual texture parameter set.
    pub fn from_effect(effect: Effect) -> Result<Self, FxError> {
        let slots = ParamSlots::resolve(&effect)?;
        Ok(DualTextureEffect {
            effect,
            slots,
            dirty: DIRTY_ALL,
            world: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            world_view: Mat4::IDENTITY,
            diffuse_color: Vec3::ONE,
            alpha: 1.0,
            fog_enabled: false,
            fog_start: 0.0,
            fog_end: 1.0,
            vertex_color_enabled: false,
        })
    }

    /// Duplicate the effect, its own parameter values included. The clone's
    /// parameter slots are re-resolved against its own cloned collection and
    /// everything is marked dirty so the first draw recomputes from the
    /// copied fields.
    pub fn clone_effect(&self) -> Result<DualTextureEffect, FxError> {
        let effect = self.effect.clone_effect();
        let slots = ParamSlots::resolve(&effect)?;
        Ok(DualTextureEffect {
            effect,
            slots,
            dirty: DIRTY_ALL,
            world: self.world,
            view: self.view,
            projection: self.projection,
            world_view: self.world_view,
            diffuse_color: self.diffuse_color,
            alpha: self.alpha,
            fog_enabled: self.fog_enabled,
            fog_start: self.fog_start,
            fog_end: self.fog_end,
            vertex_color_enabled: self.vertex_color_enabled,
        })
    }

    pub fn effect(&self) -> &Effect {
        &self.effect
    }

    pub fn effect_mut(&mut self) -> &mut Effect {
        &mut self.effect
    }

    // =========================================================================
    // Transform
    // =========================================================================

    pub fn world(&self) -> Mat4 {
        self.world
    }

    pub fn set_world(&mut self, value: Mat4) {
        self.world = value;
        self.dirty |= DIRTY_WORLD_VIEW_PROJ | DIRTY_FOG;
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn set_view(&mut self, value: Mat4) {
        self.view = value;
        self.dirty |= DIRTY_WORLD_VIEW_PROJ | DIRTY_FOG;
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn set_projection(&mut self, value: Mat4) {
        self.projection = value;
        self.dirty |= DIRTY_WORLD_VIEW_PROJ;
    }

    // =========================================================================
    // Material
    // =========================================================================

    pub fn diffuse_color(&self) -> Vec3 {
        self.diffuse_color
    }

    pub fn set_diffuse_color(&mut self, value: Vec3) {
        self.diffuse_color = value;
        self.dirty |= DIRTY_MATERIAL_COLOR;
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn set_alpha(&mut self, value: f32) {
        self.alpha = value;
        self.dirty |= DIRTY_MATERIAL_COLOR;
    }

    // =========================================================================
    // Fog
    // =========================================================================

    pub fn fog_enabled(&self) -> bool {
        self.fog_enabled
    }

    pub fn set_fog_enabled(&mut self, value: bool) {
        if self.fog_enabled != value {
            self.fog_enabled = value;
            self.dirty |= DIRTY_FOG_ENABLE | DIRTY_SHADER_INDEX;
        }
    }

    pub fn fog_start(&self) -> f32 {
        self.fog_start
    }

    pub fn set_fog_start(&mut self, value: f32) {
        self.fog_start = value;
        self.dirty |= DIRTY_FOG;
    }

    pub fn fog_end(&self) -> f32 {
        self.fog_end
    }

    pub fn set_fog_end(&mut self, value: f32) {
        self.fog_end = value;
        self.dirty |= DIRTY_FOG;
    }

    /// Fog color writes straight through to its parameter; nothing derived
    /// depends on it.
    pub fn set_fog_color(&mut self, value: Vec3) -> Result<(), FxError> {
        self.effect.parameters_mut()[self.slots.fog_color].set_vec3(value)
    }

    pub fn fog_color(&self) -> Result<Vec3, FxError> {
        self.effect.parameters()[self.slots.fog_color].get_vec3()
    }

    // =========================================================================
    // Textures
    // =========================================================================

    pub fn set_texture(&mut self, value: Texture) -> Result<(), FxError> {
        self.effect.parameters_mut()[self.slots.texture].set_texture(value)
    }

    pub fn set_texture2(&mut self, value: Texture) -> Result<(), FxError> {
        self.effect.parameters_mut()[self.slots.texture2].set_texture(value)
    }

    pub fn texture(&self) -> Result<Option<Texture>, FxError> {
        self.effect.parameters()[self.slots.texture].get_texture_2d()
    }

    pub fn texture2(&self) -> Result<Option<Texture>, FxError> {
        self.effect.parameters()[self.slots.texture2].get_texture_2d()
    }

    // =========================================================================
    // Vertex Color
    // =========================================================================

    pub fn vertex_color_enabled(&self) -> bool {
        self.vertex_color_enabled
    }

    pub fn set_vertex_color_enabled(&mut self, value: bool) {
        if self.vertex_color_enabled != value {
            self.vertex_color_enabled = value;
            self.dirty |= DIRTY_SHADER_INDEX;
        }
    }

    // =========================================================================
    // Recompute
    // =========================================================================

    /// Flush pending field changes into the underlying parameters. Each
    /// dirty bit is handled once and cleared; parameters whose bits are
    /// clean are not touched and keep their state keys.
    pub fn on_apply(&mut self) -> Result<(), FxError> {
        let params = self.effect.parameters_mut();

        // Transform and fog share the cached world-view product.
        let (wvp, fog) = if self.slots.world_view_proj < self.slots.fog_vector {
            let (head, tail) = params.split_at_mut(self.slots.fog_vector);
            (&mut head[self.slots.world_view_proj], &mut tail[0])
        } else {
            let (head, tail) = params.split_at_mut(self.slots.world_view_proj);
            (&mut tail[0], &mut head[self.slots.fog_vector])
        };
        self.dirty = set_world_view_proj_and_fog(
            self.dirty,
            self.world,
            self.view,
            self.projection,
            &mut self.world_view,
            self.fog_enabled,
            self.fog_start,
            self.fog_end,
            wvp,
            fog,
        )?;

        if self.dirty & DIRTY_MATERIAL_COLOR != 0 {
            let diffuse = self.diffuse_color * self.alpha;
            self.effect.parameters_mut()[self.slots.diffuse_color]
                .set_vec4(Vec4::new(diffuse.x, diffuse.y, diffuse.z, self.alpha))?;
            self.dirty &= !DIRTY_MATERIAL_COLOR;
        }

        if self.dirty & DIRTY_SHADER_INDEX != 0 {
            let mut index = 0;
            if !self.fog_enabled {
                index += 1;
            }
            if self.vertex_color_enabled {
                index += 2;
            }
            self.effect.set_current_technique(index)?;
            self.dirty &= !DIRTY_SHADER_INDEX;
        }

        Ok(())
    }

    /// Recompute derived values, then pack and upload dirty constant
    /// buffers. Call once per draw before binding a pass.
    pub fn apply(&mut self, backend: &mut dyn GpuBackend) -> Result<(), FxError> {
        self.on_apply()?;
        self.effect.apply(backend);
        Ok(())
    }

    pub fn apply_pass(
        &mut self,
        pass_index: usize,
        backend: &mut dyn GpuBackend,
    ) -> Result<(), FxError> {
        self.effect.apply_pass(pass_index, backend)
    }
}

impl std::fmt::Debug for DualTextureEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualTextureEffect")
            .field("effect_key", &self.effect.effect_key())
            .field("dirty", &self.dirty)
            .field("fog_enabled", &self.fog_enabled)
            .field("vertex_color_enabled", &self.vertex_color_enabled)
            .finish()
    }
}
