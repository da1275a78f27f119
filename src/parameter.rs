//! Effect parameter tree and typed value store
//!
//! Parameters form a recursive tree: arrays carry `elements`, structures
//! carry `struct_members`, and leaves own a typed cell holding the current
//! value. Structural metadata (name, semantic, class/type, shape) is shared
//! between clones via `Arc`; cells are always owned per instance.
//!
//! Every successful setter stamps the parameter with a process-wide
//! monotonically increasing state key, which consumers use for cheap
//! change detection (see [`crate::constant_buffer`]).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use smallvec::SmallVec;

use crate::backend::Texture;
use crate::error::FxError;

/// Next state key handed out when any parameter is mutated.
///
/// Atomic so that effect caches on different device threads still produce
/// globally comparable keys.
static NEXT_STATE_KEY: AtomicU64 = AtomicU64::new(1);

/// Largest fixed cell shape (4x4 matrix); bigger values spill to the heap.
const INLINE_CELL_UNITS: usize = 16;

// =============================================================================
// Class / Type Tags
// =============================================================================

/// Structural class of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ParameterClass {
    Scalar = 0,
    Vector = 1,
    Matrix = 2,
    Object = 3,
    Struct = 4,
}

impl ParameterClass {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ParameterClass::Scalar),
            1 => Some(ParameterClass::Vector),
            2 => Some(ParameterClass::Matrix),
            3 => Some(ParameterClass::Object),
            4 => Some(ParameterClass::Struct),
            _ => None,
        }
    }
}

/// Element type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ParameterType {
    Bool = 0,
    Int32 = 1,
    Single = 2,
    String = 3,
    Texture = 4,
    Texture1D = 5,
    Texture2D = 6,
    Texture3D = 7,
    TextureCube = 8,
    Void = 9,
}

impl ParameterType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ParameterType::Bool),
            1 => Some(ParameterType::Int32),
            2 => Some(ParameterType::Single),
            3 => Some(ParameterType::String),
            4 => Some(ParameterType::Texture),
            5 => Some(ParameterType::Texture1D),
            6 => Some(ParameterType::Texture2D),
            7 => Some(ParameterType::Texture3D),
            8 => Some(ParameterType::TextureCube),
            9 => Some(ParameterType::Void),
            _ => None,
        }
    }

    /// True for any texture kind, including the untyped `Texture`.
    pub fn is_texture(self) -> bool {
        matches!(
            self,
            ParameterType::Texture
                | ParameterType::Texture1D
                | ParameterType::Texture2D
                | ParameterType::Texture3D
                | ParameterType::TextureCube
        )
    }
}

// =============================================================================
// Annotations
// =============================================================================

/// Annotation list attached to parameters, techniques, and passes.
///
/// The container serializes only a count; annotation bodies are never
/// written by the compiler. The declared count is retained but no content
/// exists, so the list always reads as empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectAnnotations {
    declared: u32,
}

impl EffectAnnotations {
    pub(crate) fn new(declared: u32) -> Self {
        Self { declared }
    }

    /// Count the compiler declared in the container.
    pub fn declared_len(&self) -> u32 {
        self.declared
    }

    /// Always true: annotation bodies are not serialized.
    pub fn is_empty(&self) -> bool {
        true
    }
}

// =============================================================================
// Value Cells
// =============================================================================

/// Typed storage for a leaf parameter's current value.
///
/// A node owns a numeric or string cell iff it is a leaf (no elements, no
/// struct members) and its type is representable in a constant buffer.
/// Texture leaves hold a backend reference instead; everything else is
/// `None`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ParamCell {
    None,
    /// Bool and Int32 storage units
    Int(SmallVec<[i32; INLINE_CELL_UNITS]>),
    /// Single storage units
    Float(SmallVec<[f32; INLINE_CELL_UNITS]>),
    /// UTF-8 bytes; reallocated on every string set
    Str(Vec<u8>),
    /// Texture reference, bypassing the raw-cell path
    Texture(Option<Texture>),
}

// =============================================================================
// EffectParameter
// =============================================================================

/// One node of the parameter tree.
pub struct EffectParameter {
    class: ParameterClass,
    ty: ParameterType,
    name: Arc<str>,
    semantic: Arc<str>,
    annotations: EffectAnnotations,
    row_count: u8,
    column_count: u8,
    elements: Vec<EffectParameter>,
    struct_members: Vec<EffectParameter>,
    cell: ParamCell,
    state_key: u64,
}

impl EffectParameter {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        class: ParameterClass,
        ty: ParameterType,
        name: Arc<str>,
        semantic: Arc<str>,
        annotations: EffectAnnotations,
        row_count: u8,
        column_count: u8,
        elements: Vec<EffectParameter>,
        struct_members: Vec<EffectParameter>,
        cell: ParamCell,
    ) -> Self {
        let mut param = Self {
            class,
            ty,
            name,
            semantic,
            annotations,
            row_count,
            column_count,
            elements,
            struct_members,
            cell,
            state_key: 0,
        };
        param.advance_state();
        param
    }

    /// Deep copy for cloning an effect instance: structural metadata is
    /// shared, cells and child nodes are duplicated, and the copy gets a
    /// fresh state key.
    pub(crate) fn deep_clone(&self) -> EffectParameter {
        let mut param = EffectParameter {
            class: self.class,
            ty: self.ty,
            name: Arc::clone(&self.name),
            semantic: Arc::clone(&self.semantic),
            annotations: self.annotations,
            row_count: self.row_count,
            column_count: self.column_count,
            elements: self.elements.iter().map(|e| e.deep_clone()).collect(),
            struct_members: self.struct_members.iter().map(|m| m.deep_clone()).collect(),
            cell: self.cell.clone(),
            state_key: 0,
        };
        param.advance_state();
        param
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn semantic(&self) -> &str {
        &self.semantic
    }

    pub fn class(&self) -> ParameterClass {
        self.class
    }

    pub fn parameter_type(&self) -> ParameterType {
        self.ty
    }

    pub fn annotations(&self) -> &EffectAnnotations {
        &self.annotations
    }

    pub fn row_count(&self) -> u8 {
        self.row_count
    }

    pub fn column_count(&self) -> u8 {
        self.column_count
    }

    /// Array element nodes (empty unless the parameter is an array).
    pub fn elements(&self) -> &[EffectParameter] {
        &self.elements
    }

    pub fn elements_mut(&mut self) -> &mut [EffectParameter] {
        &mut self.elements
    }

    /// Structure member nodes (empty unless the parameter is a struct).
    pub fn struct_members(&self) -> &[EffectParameter] {
        &self.struct_members
    }

    pub fn struct_members_mut(&mut self) -> &mut [EffectParameter] {
        &mut self.struct_members
    }

    /// State key stamped at the last mutation. Strictly increasing across
    /// all parameters process-wide.
    pub fn state_key(&self) -> u64 {
        self.state_key
    }

    /// Largest state key in this node's subtree (elements and members
    /// advance their own keys when mutated directly).
    pub(crate) fn max_state_key(&self) -> u64 {
        let mut key = self.state_key;
        for e in &self.elements {
            key = key.max(e.max_state_key());
        }
        for m in &self.struct_members {
            key = key.max(m.max_state_key());
        }
        key
    }

    pub(crate) fn cell(&self) -> &ParamCell {
        &self.cell
    }

    fn advance_state(&mut self) {
        self.state_key = NEXT_STATE_KEY.fetch_add(1, Ordering::Relaxed);
    }

    fn mismatch(&self, accessed: &'static str) -> FxError {
        FxError::TypeMismatch {
            name: self.name.to_string(),
            declared: format!("{:?} {:?}", self.class, self.ty),
            accessed,
        }
    }

    /// Storage units declared by the shape (rows * columns).
    fn unit_count(&self) -> usize {
        self.row_count as usize * self.column_count as usize
    }

    // =========================================================================
    // Scalar Accessors
    // =========================================================================

    pub fn get_bool(&self) -> Result<bool, FxError> {
        if self.class != ParameterClass::Scalar || self.ty != ParameterType::Bool {
            return Err(self.mismatch("bool"));
        }
        match &self.cell {
            ParamCell::Int(d) if !d.is_empty() => Ok(d[0] != 0),
            _ => Err(self.mismatch("bool")),
        }
    }

    pub fn set_bool(&mut self, value: bool) -> Result<(), FxError> {
        if self.class != ParameterClass::Scalar || self.ty != ParameterType::Bool {
            return Err(self.mismatch("bool"));
        }
        match &mut self.cell {
            ParamCell::Int(d) if !d.is_empty() => {
                d[0] = value as i32;
                self.advance_state();
                Ok(())
            }
            _ => Err(self.mismatch("bool")),
        }
    }

    pub fn get_i32(&self) -> Result<i32, FxError> {
        if self.class != ParameterClass::Scalar || self.ty != ParameterType::Int32 {
            return Err(self.mismatch("i32"));
        }
        match &self.cell {
            ParamCell::Int(d) if !d.is_empty() => Ok(d[0]),
            _ => Err(self.mismatch("i32")),
        }
    }

    pub fn set_i32(&mut self, value: i32) -> Result<(), FxError> {
        // Integer writes to a float-typed parameter coerce.
        if self.ty == ParameterType::Single {
            return self.set_f32(value as f32);
        }
        if self.class != ParameterClass::Scalar || self.ty != ParameterType::Int32 {
            return Err(self.mismatch("i32"));
        }
        match &mut self.cell {
            ParamCell::Int(d) if !d.is_empty() => {
                d[0] = value;
                self.advance_state();
                Ok(())
            }
            _ => Err(self.mismatch("i32")),
        }
    }

    pub fn get_f32(&self) -> Result<f32, FxError> {
        if self.class != ParameterClass::Scalar || self.ty != ParameterType::Single {
            return Err(self.mismatch("f32"));
        }
        match &self.cell {
            ParamCell::Float(d) if !d.is_empty() => Ok(d[0]),
            _ => Err(self.mismatch("f32")),
        }
    }

    pub fn set_f32(&mut self, value: f32) -> Result<(), FxError> {
        if self.ty != ParameterType::Single {
            return Err(self.mismatch("f32"));
        }
        match &mut self.cell {
            ParamCell::Float(d) if !d.is_empty() => {
                d[0] = value;
                self.advance_state();
                Ok(())
            }
            _ => Err(self.mismatch("f32")),
        }
    }

    // =========================================================================
    // Vector Accessors
    // =========================================================================

    fn check_vector(&self, units: usize, accessed: &'static str) -> Result<(), FxError> {
        if self.class != ParameterClass::Vector
            || self.ty != ParameterType::Single
            || self.unit_count() < units
        {
            return Err(self.mismatch(accessed));
        }
        match &self.cell {
            ParamCell::Float(d) if d.len() >= units => Ok(()),
            _ => Err(self.mismatch(accessed)),
        }
    }

    fn float_slice(&self) -> &[f32] {
        match &self.cell {
            ParamCell::Float(d) => d,
            _ => &[],
        }
    }

    pub fn get_vec2(&self) -> Result<Vec2, FxError> {
        self.check_vector(2, "Vec2")?;
        let d = self.float_slice();
        Ok(Vec2::new(d[0], d[1]))
    }

    pub fn set_vec2(&mut self, value: Vec2) -> Result<(), FxError> {
        self.check_vector(2, "Vec2")?;
        if let ParamCell::Float(d) = &mut self.cell {
            d[0] = value.x;
            d[1] = value.y;
        }
        self.advance_state();
        Ok(())
    }

    pub fn get_vec3(&self) -> Result<Vec3, FxError> {
        self.check_vector(3, "Vec3")?;
        let d = self.float_slice();
        Ok(Vec3::new(d[0], d[1], d[2]))
    }

    pub fn set_vec3(&mut self, value: Vec3) -> Result<(), FxError> {
        self.check_vector(3, "Vec3")?;
        if let ParamCell::Float(d) = &mut self.cell {
            d[0] = value.x;
            d[1] = value.y;
            d[2] = value.z;
        }
        self.advance_state();
        Ok(())
    }

    pub fn get_vec4(&self) -> Result<Vec4, FxError> {
        self.check_vector(4, "Vec4")?;
        let d = self.float_slice();
        Ok(Vec4::new(d[0], d[1], d[2], d[3]))
    }

    pub fn set_vec4(&mut self, value: Vec4) -> Result<(), FxError> {
        self.check_vector(4, "Vec4")?;
        if let ParamCell::Float(d) = &mut self.cell {
            d[0] = value.x;
            d[1] = value.y;
            d[2] = value.z;
            d[3] = value.w;
        }
        self.advance_state();
        Ok(())
    }

    pub fn get_quat(&self) -> Result<Quat, FxError> {
        self.check_vector(4, "Quat")?;
        let d = self.float_slice();
        Ok(Quat::from_xyzw(d[0], d[1], d[2], d[3]))
    }

    pub fn set_quat(&mut self, value: Quat) -> Result<(), FxError> {
        self.check_vector(4, "Quat")?;
        if let ParamCell::Float(d) = &mut self.cell {
            d[0] = value.x;
            d[1] = value.y;
            d[2] = value.z;
            d[3] = value.w;
        }
        self.advance_state();
        Ok(())
    }

    // =========================================================================
    // Matrix Accessors
    // =========================================================================

    fn check_matrix(&self, accessed: &'static str) -> Result<(), FxError> {
        if self.class != ParameterClass::Matrix || self.ty != ParameterType::Single {
            return Err(self.mismatch(accessed));
        }
        match &self.cell {
            ParamCell::Float(d) if d.len() == self.unit_count() => Ok(()),
            _ => Err(self.mismatch(accessed)),
        }
    }

    /// Read back a 4x4 matrix from its column-major GPU layout.
    ///
    /// Sub-4x4 shapes are write-only, matching the container compiler's
    /// usage.
    pub fn get_matrix(&self) -> Result<Mat4, FxError> {
        self.check_matrix("Mat4")?;
        if self.row_count != 4 || self.column_count != 4 {
            return Err(self.mismatch("Mat4"));
        }
        let d = self.float_slice();
        let mut cols = [0.0f32; 16];
        cols.copy_from_slice(&d[..16]);
        Ok(Mat4::from_cols_array(&cols))
    }

    /// Write a matrix transposed into the cell.
    ///
    /// HLSL-style constant buffers expect column-major storage, so each of
    /// the six supported shapes copies row-major source elements into
    /// transposed destination slots with its own fixed mapping. Cell layouts
    /// for sub-4x4 shapes are irregular, hence no generic loop.
    pub fn set_matrix(&mut self, value: Mat4) -> Result<(), FxError> {
        self.check_matrix("Mat4")?;
        let (r0, r1, r2, r3) = (value.row(0), value.row(1), value.row(2), value.row(3));
        let shape = (self.row_count, self.column_count);
        let ParamCell::Float(d) = &mut self.cell else {
            return Err(self.mismatch("Mat4"));
        };
        match shape {
            (4, 4) => {
                d[0] = r0.x;
                d[1] = r1.x;
                d[2] = r2.x;
                d[3] = r3.x;

                d[4] = r0.y;
                d[5] = r1.y;
                d[6] = r2.y;
                d[7] = r3.y;

                d[8] = r0.z;
                d[9] = r1.z;
                d[10] = r2.z;
                d[11] = r3.z;

                d[12] = r0.w;
                d[13] = r1.w;
                d[14] = r2.w;
                d[15] = r3.w;
            }
            (4, 3) => {
                d[0] = r0.x;
                d[1] = r1.x;
                d[2] = r2.x;
                d[3] = r3.x;

                d[4] = r0.y;
                d[5] = r1.y;
                d[6] = r2.y;
                d[7] = r3.y;

                d[8] = r0.z;
                d[9] = r1.z;
                d[10] = r2.z;
                d[11] = r3.z;
            }
            (4, 2) => {
                d[0] = r0.x;
                d[1] = r1.x;
                d[2] = r2.x;
                d[3] = r3.x;

                d[4] = r0.y;
                d[5] = r1.y;
                d[6] = r2.y;
                d[7] = r3.y;
            }
            (3, 4) => {
                d[0] = r0.x;
                d[1] = r1.x;
                d[2] = r2.x;

                d[3] = r0.y;
                d[4] = r1.y;
                d[5] = r2.y;

                d[6] = r0.z;
                d[7] = r1.z;
                d[8] = r2.z;

                d[9] = r0.w;
                d[10] = r1.w;
                d[11] = r2.w;
            }
            (3, 3) => {
                d[0] = r0.x;
                d[1] = r1.x;
                d[2] = r2.x;

                d[3] = r0.y;
                d[4] = r1.y;
                d[5] = r2.y;

                d[6] = r0.z;
                d[7] = r1.z;
                d[8] = r2.z;
            }
            (3, 2) => {
                d[0] = r0.x;
                d[1] = r1.x;
                d[2] = r2.x;

                d[3] = r0.y;
                d[4] = r1.y;
                d[5] = r2.y;
            }
            _ => return Err(FxError::NotImplemented("matrix shape")),
        }
        self.advance_state();
        Ok(())
    }

    /// Write a matrix untransposed, for callers whose source is already
    /// column-major. Same six shapes as [`set_matrix`](Self::set_matrix)
    /// with row-major destination slots.
    pub fn set_matrix_transpose(&mut self, value: Mat4) -> Result<(), FxError> {
        self.check_matrix("Mat4")?;
        let (r0, r1, r2, r3) = (value.row(0), value.row(1), value.row(2), value.row(3));
        let shape = (self.row_count, self.column_count);
        let ParamCell::Float(d) = &mut self.cell else {
            return Err(self.mismatch("Mat4"));
        };
        match shape {
            (4, 4) => {
                d[0] = r0.x;
                d[1] = r0.y;
                d[2] = r0.z;
                d[3] = r0.w;

                d[4] = r1.x;
                d[5] = r1.y;
                d[6] = r1.z;
                d[7] = r1.w;

                d[8] = r2.x;
                d[9] = r2.y;
                d[10] = r2.z;
                d[11] = r2.w;

                d[12] = r3.x;
                d[13] = r3.y;
                d[14] = r3.z;
                d[15] = r3.w;
            }
            (4, 3) => {
                d[0] = r0.x;
                d[1] = r0.y;
                d[2] = r0.z;

                d[3] = r1.x;
                d[4] = r1.y;
                d[5] = r1.z;

                d[6] = r2.x;
                d[7] = r2.y;
                d[8] = r2.z;

                d[9] = r3.x;
                d[10] = r3.y;
                d[11] = r3.z;
            }
            (4, 2) => {
                d[0] = r0.x;
                d[1] = r0.y;

                d[2] = r1.x;
                d[3] = r1.y;

                d[4] = r2.x;
                d[5] = r2.y;

                d[6] = r3.x;
                d[7] = r3.y;
            }
            (3, 4) => {
                d[0] = r0.x;
                d[1] = r0.y;
                d[2] = r0.z;
                d[3] = r0.w;

                d[4] = r1.x;
                d[5] = r1.y;
                d[6] = r1.z;
                d[7] = r1.w;

                d[8] = r2.x;
                d[9] = r2.y;
                d[10] = r2.z;
                d[11] = r2.w;
            }
            (3, 3) => {
                d[0] = r0.x;
                d[1] = r0.y;
                d[2] = r0.z;

                d[3] = r1.x;
                d[4] = r1.y;
                d[5] = r1.z;

                d[6] = r2.x;
                d[7] = r2.y;
                d[8] = r2.z;
            }
            (3, 2) => {
                d[0] = r0.x;
                d[1] = r0.y;

                d[2] = r1.x;
                d[3] = r1.y;

                d[4] = r2.x;
                d[5] = r2.y;
            }
            _ => return Err(FxError::NotImplemented("matrix shape")),
        }
        self.advance_state();
        Ok(())
    }

    // =========================================================================
    // String / Texture Accessors
    // =========================================================================

    pub fn get_string(&self) -> Result<String, FxError> {
        if self.class != ParameterClass::Object || self.ty != ParameterType::String {
            return Err(self.mismatch("string"));
        }
        match &self.cell {
            ParamCell::Str(bytes) => String::from_utf8(bytes.clone()).map_err(|_| FxError::InvalidString),
            _ => Err(self.mismatch("string")),
        }
    }

    /// Replace the string value. String cells are not fixed-size: the cell
    /// is reallocated to the UTF-8 byte length of the new value.
    pub fn set_string(&mut self, value: &str) -> Result<(), FxError> {
        if self.class != ParameterClass::Object || self.ty != ParameterType::String {
            return Err(self.mismatch("string"));
        }
        self.cell = ParamCell::Str(value.as_bytes().to_vec());
        self.advance_state();
        Ok(())
    }

    pub fn get_texture(&self) -> Result<Option<Texture>, FxError> {
        if self.class != ParameterClass::Object || !self.ty.is_texture() {
            return Err(self.mismatch("texture"));
        }
        match &self.cell {
            ParamCell::Texture(t) => Ok(*t),
            _ => Err(self.mismatch("texture")),
        }
    }

    pub fn get_texture_2d(&self) -> Result<Option<Texture>, FxError> {
        if self.ty != ParameterType::Texture2D {
            return Err(self.mismatch("texture 2D"));
        }
        self.get_texture()
    }

    pub fn get_texture_3d(&self) -> Result<Option<Texture>, FxError> {
        if self.ty != ParameterType::Texture3D {
            return Err(self.mismatch("texture 3D"));
        }
        self.get_texture()
    }

    pub fn get_texture_cube(&self) -> Result<Option<Texture>, FxError> {
        if self.ty != ParameterType::TextureCube {
            return Err(self.mismatch("texture cube"));
        }
        self.get_texture()
    }

    pub fn set_texture(&mut self, value: Texture) -> Result<(), FxError> {
        if !self.ty.is_texture() {
            return Err(self.mismatch("texture"));
        }
        self.cell = ParamCell::Texture(Some(value));
        self.advance_state();
        Ok(())
    }

    // =========================================================================
    // Array Accessors
    // =========================================================================

    fn check_elements(&self, len: usize, accessed: &'static str) -> Result<(), FxError> {
        if self.elements.is_empty() {
            return Err(self.mismatch(accessed));
        }
        if len > self.elements.len() {
            return Err(FxError::IndexOutOfRange(accessed));
        }
        Ok(())
    }

    pub fn get_bool_array(&self) -> Result<Vec<bool>, FxError> {
        Err(FxError::NotImplemented("bool array get"))
    }

    pub fn set_bool_array(&mut self, _value: &[bool]) -> Result<(), FxError> {
        Err(FxError::NotImplemented("bool array set"))
    }

    pub fn get_quat_array(&self) -> Result<Vec<Quat>, FxError> {
        Err(FxError::NotImplemented("quaternion array get"))
    }

    pub fn set_quat_array(&mut self, _value: &[Quat]) -> Result<(), FxError> {
        Err(FxError::NotImplemented("quaternion array set"))
    }

    /// Flatten the current value to `f32` units.
    ///
    /// Arrays place each element at a stride of the declared rows*cols
    /// units, zero-padding any gap. A vector leaf yields exactly two units
    /// and a matrix leaf yields 16 zero-padded units, both historical
    /// behaviors the content pipeline depends on.
    pub fn get_f32_array(&self) -> Result<Vec<f32>, FxError> {
        if !self.elements.is_empty() {
            let stride = self.unit_count();
            let mut out = vec![0.0f32; stride * self.elements.len()];
            for (i, e) in self.elements.iter().enumerate() {
                let values = e.get_f32_array()?;
                let n = values.len().min(stride);
                out[i * stride..i * stride + n].copy_from_slice(&values[..n]);
            }
            return Ok(out);
        }
        match self.class {
            ParameterClass::Scalar => Ok(vec![self.get_f32()?]),
            ParameterClass::Vector => {
                self.check_vector(2, "f32 array")?;
                let d = self.float_slice();
                Ok(vec![d[0], d[1]])
            }
            ParameterClass::Matrix => {
                self.check_matrix("f32 array")?;
                let d = self.float_slice();
                let mut out = vec![0.0f32; 16];
                let n = d.len().min(16);
                out[..n].copy_from_slice(&d[..n]);
                Ok(out)
            }
            _ => Err(FxError::NotImplemented("f32 array get on this class")),
        }
    }

    pub fn set_f32_array(&mut self, value: &[f32]) -> Result<(), FxError> {
        self.check_elements(value.len(), "f32 array")?;
        for (element, v) in self.elements.iter_mut().zip(value) {
            element.set_f32(*v)?;
        }
        self.advance_state();
        Ok(())
    }

    /// Flatten to `i32` units with the same per-element stride rule as
    /// [`get_f32_array`](Self::get_f32_array).
    pub fn get_i32_array(&self) -> Result<Vec<i32>, FxError> {
        if !self.elements.is_empty() {
            let stride = self.unit_count();
            let mut out = vec![0i32; stride * self.elements.len()];
            for (i, e) in self.elements.iter().enumerate() {
                let values = e.get_i32_array()?;
                let n = values.len().min(stride);
                out[i * stride..i * stride + n].copy_from_slice(&values[..n]);
            }
            return Ok(out);
        }
        match self.class {
            ParameterClass::Scalar => Ok(vec![self.get_i32()?]),
            _ => Err(FxError::NotImplemented("i32 array get on this class")),
        }
    }

    pub fn set_i32_array(&mut self, value: &[i32]) -> Result<(), FxError> {
        self.check_elements(value.len(), "i32 array")?;
        for (element, v) in self.elements.iter_mut().zip(value) {
            element.set_i32(*v)?;
        }
        self.advance_state();
        Ok(())
    }

    pub fn get_vec2_array(&self) -> Result<Vec<Vec2>, FxError> {
        if self.class != ParameterClass::Vector || self.ty != ParameterType::Single {
            return Err(self.mismatch("Vec2 array"));
        }
        if self.elements.is_empty() {
            return Err(FxError::NotImplemented("Vec2 array get without elements"));
        }
        self.elements.iter().map(|e| e.get_vec2()).collect()
    }

    pub fn set_vec2_array(&mut self, value: &[Vec2]) -> Result<(), FxError> {
        self.check_elements(value.len(), "Vec2 array")?;
        for (element, v) in self.elements.iter_mut().zip(value) {
            element.set_vec2(*v)?;
        }
        self.advance_state();
        Ok(())
    }

    pub fn get_vec3_array(&self) -> Result<Vec<Vec3>, FxError> {
        if self.class != ParameterClass::Vector || self.ty != ParameterType::Single {
            return Err(self.mismatch("Vec3 array"));
        }
        if self.elements.is_empty() {
            return Err(FxError::NotImplemented("Vec3 array get without elements"));
        }
        self.elements.iter().map(|e| e.get_vec3()).collect()
    }

    pub fn set_vec3_array(&mut self, value: &[Vec3]) -> Result<(), FxError> {
        self.check_elements(value.len(), "Vec3 array")?;
        for (element, v) in self.elements.iter_mut().zip(value) {
            element.set_vec3(*v)?;
        }
        self.advance_state();
        Ok(())
    }

    pub fn get_vec4_array(&self) -> Result<Vec<Vec4>, FxError> {
        if self.class != ParameterClass::Vector || self.ty != ParameterType::Single {
            return Err(self.mismatch("Vec4 array"));
        }
        if self.elements.is_empty() {
            return Err(FxError::NotImplemented("Vec4 array get without elements"));
        }
        self.elements.iter().map(|e| e.get_vec4()).collect()
    }

    pub fn set_vec4_array(&mut self, value: &[Vec4]) -> Result<(), FxError> {
        self.check_elements(value.len(), "Vec4 array")?;
        for (element, v) in self.elements.iter_mut().zip(value) {
            element.set_vec4(*v)?;
        }
        self.advance_state();
        Ok(())
    }

    pub fn get_matrix_array(&self) -> Result<Vec<Mat4>, FxError> {
        if self.class != ParameterClass::Matrix || self.ty != ParameterType::Single {
            return Err(self.mismatch("Mat4 array"));
        }
        self.elements.iter().map(|e| e.get_matrix()).collect()
    }

    pub fn set_matrix_array(&mut self, value: &[Mat4]) -> Result<(), FxError> {
        if self.class != ParameterClass::Matrix || self.ty != ParameterType::Single {
            return Err(self.mismatch("Mat4 array"));
        }
        self.check_elements(value.len(), "Mat4 array")?;
        for (element, v) in self.elements.iter_mut().zip(value) {
            element.set_matrix(*v)?;
        }
        self.advance_state();
        Ok(())
    }
}

impl std::fmt::Debug for EffectParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectParameter")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("type", &self.ty)
            .field("rows", &self.row_count)
            .field("columns", &self.column_count)
            .field("elements", &self.elements.len())
            .field("struct_members", &self.struct_members.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{TextureHandle, TextureKind};
    use smallvec::smallvec;

    fn leaf(
        class: ParameterClass,
        ty: ParameterType,
        rows: u8,
        cols: u8,
        cell: ParamCell,
    ) -> EffectParameter {
        EffectParameter::new(
            class,
            ty,
            Arc::from("P"),
            Arc::from(""),
            EffectAnnotations::default(),
            rows,
            cols,
            Vec::new(),
            Vec::new(),
            cell,
        )
    }

    fn scalar_f32() -> EffectParameter {
        leaf(
            ParameterClass::Scalar,
            ParameterType::Single,
            1,
            1,
            ParamCell::Float(smallvec![0.0]),
        )
    }

    fn vector_f32(cols: u8) -> EffectParameter {
        leaf(
            ParameterClass::Vector,
            ParameterType::Single,
            1,
            cols,
            ParamCell::Float(smallvec![0.0; cols as usize]),
        )
    }

    fn matrix_f32(rows: u8, cols: u8) -> EffectParameter {
        leaf(
            ParameterClass::Matrix,
            ParameterType::Single,
            rows,
            cols,
            ParamCell::Float(smallvec![0.0; (rows * cols) as usize]),
        )
    }

    fn array_of(count: usize, make: impl Fn() -> EffectParameter) -> EffectParameter {
        let template = make();
        EffectParameter::new(
            template.class(),
            template.parameter_type(),
            Arc::from("A"),
            Arc::from(""),
            EffectAnnotations::default(),
            template.row_count(),
            template.column_count(),
            (0..count).map(|_| make()).collect(),
            Vec::new(),
            ParamCell::None,
        )
    }

    /// Source matrix with distinct entries: element (row r, col c) = r*10 + c.
    fn probe_matrix() -> Mat4 {
        Mat4::from_cols_array_2d(&[
            [0.0, 10.0, 20.0, 30.0],
            [1.0, 11.0, 21.0, 31.0],
            [2.0, 12.0, 22.0, 32.0],
            [3.0, 13.0, 23.0, 33.0],
        ])
    }

    fn raw_floats(p: &EffectParameter) -> Vec<f32> {
        match p.cell() {
            ParamCell::Float(d) => d.to_vec(),
            _ => panic!("expected float cell"),
        }
    }

    #[test]
    fn test_scalar_roundtrip() {
        let mut p = scalar_f32();
        p.set_f32(4.25).unwrap();
        assert_eq!(p.get_f32().unwrap(), 4.25);
    }

    #[test]
    fn test_scalar_int_coerces_to_float() {
        let mut p = scalar_f32();
        p.set_i32(3).unwrap();
        assert_eq!(p.get_f32().unwrap(), 3.0);
    }

    #[test]
    fn test_bool_roundtrip() {
        let mut p = leaf(
            ParameterClass::Scalar,
            ParameterType::Bool,
            1,
            1,
            ParamCell::Int(smallvec![0]),
        );
        assert!(!p.get_bool().unwrap());
        p.set_bool(true).unwrap();
        assert!(p.get_bool().unwrap());
    }

    #[test]
    fn test_type_mismatch_never_reinterprets() {
        let mut p = scalar_f32();
        p.set_f32(1.0).unwrap();
        assert!(matches!(p.get_i32(), Err(FxError::TypeMismatch { .. })));
        assert!(matches!(p.get_bool(), Err(FxError::TypeMismatch { .. })));
        assert!(matches!(p.get_vec3(), Err(FxError::TypeMismatch { .. })));
        assert!(matches!(p.get_matrix(), Err(FxError::TypeMismatch { .. })));
        assert!(matches!(
            p.set_bool(true),
            Err(FxError::TypeMismatch { .. })
        ));
        // A failed set leaves the value untouched
        assert_eq!(p.get_f32().unwrap(), 1.0);
    }

    #[test]
    fn test_vector_roundtrips() {
        let mut p = vector_f32(2);
        p.set_vec2(Vec2::new(1.0, 2.0)).unwrap();
        assert_eq!(p.get_vec2().unwrap(), Vec2::new(1.0, 2.0));

        let mut p = vector_f32(3);
        p.set_vec3(Vec3::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(p.get_vec3().unwrap(), Vec3::new(1.0, 2.0, 3.0));

        let mut p = vector_f32(4);
        p.set_vec4(Vec4::new(1.0, 2.0, 3.0, 4.0)).unwrap();
        assert_eq!(p.get_vec4().unwrap(), Vec4::new(1.0, 2.0, 3.0, 4.0));

        let q = Quat::from_xyzw(0.1, 0.2, 0.3, 0.9);
        let mut p = vector_f32(4);
        p.set_quat(q).unwrap();
        assert_eq!(p.get_quat().unwrap(), q);
    }

    #[test]
    fn test_vector_dimension_checked() {
        let mut p = vector_f32(2);
        assert!(matches!(
            p.set_vec4(Vec4::ONE),
            Err(FxError::TypeMismatch { .. })
        ));
        assert!(matches!(p.get_vec3(), Err(FxError::TypeMismatch { .. })));
    }

    #[test]
    fn test_matrix_4x4_writes_column_major() {
        let mut p = matrix_f32(4, 4);
        let m = probe_matrix();
        p.set_matrix(m).unwrap();
        // Cell holds the transpose: columns of the source, laid out flat.
        assert_eq!(raw_floats(&p), m.to_cols_array().to_vec());
        // Read-back through the GPU-layout interpretation round-trips.
        assert_eq!(p.get_matrix().unwrap(), m);
    }

    #[test]
    fn test_matrix_shapes_write_leading_columns() {
        let m = probe_matrix();
        // Each (rows, cols) shape stores the first `cols` columns, each
        // truncated to `rows` entries.
        for (rows, cols) in [(4u8, 3u8), (4, 2), (3, 4), (3, 3), (3, 2)] {
            let mut p = matrix_f32(rows, cols);
            p.set_matrix(m).unwrap();
            let d = raw_floats(&p);
            assert_eq!(d.len(), (rows * cols) as usize);
            for c in 0..cols as usize {
                for r in 0..rows as usize {
                    let expected = (r * 10 + c) as f32;
                    assert_eq!(d[c * rows as usize + r], expected, "shape {rows}x{cols}");
                }
            }
        }
    }

    #[test]
    fn test_matrix_transpose_writes_leading_rows() {
        let m = probe_matrix();
        for (rows, cols) in [(4u8, 4u8), (4, 3), (4, 2), (3, 4), (3, 3), (3, 2)] {
            let mut p = matrix_f32(rows, cols);
            p.set_matrix_transpose(m).unwrap();
            let d = raw_floats(&p);
            for r in 0..rows as usize {
                for c in 0..cols as usize {
                    let expected = (r * 10 + c) as f32;
                    assert_eq!(d[r * cols as usize + c], expected, "shape {rows}x{cols}");
                }
            }
        }
    }

    #[test]
    fn test_matrix_transpose_equivalence() {
        // For square shapes, set_matrix(m) and set_matrix_transpose(m^T)
        // must produce identical cells.
        let m = probe_matrix();
        for (rows, cols) in [(4u8, 4u8), (3, 3)] {
            let mut a = matrix_f32(rows, cols);
            let mut b = matrix_f32(rows, cols);
            a.set_matrix(m).unwrap();
            b.set_matrix_transpose(m.transpose()).unwrap();
            assert_eq!(raw_floats(&a), raw_floats(&b), "shape {rows}x{cols}");
        }
    }

    #[test]
    fn test_matrix_unsupported_shape() {
        let mut p = matrix_f32(2, 2);
        assert_eq!(
            p.set_matrix(Mat4::IDENTITY),
            Err(FxError::NotImplemented("matrix shape"))
        );
    }

    #[test]
    fn test_string_reallocates() {
        let mut p = leaf(
            ParameterClass::Object,
            ParameterType::String,
            0,
            0,
            ParamCell::Str(b"initial".to_vec()),
        );
        assert_eq!(p.get_string().unwrap(), "initial");
        p.set_string("a much longer replacement value").unwrap();
        assert_eq!(p.get_string().unwrap(), "a much longer replacement value");
        p.set_string("").unwrap();
        assert_eq!(p.get_string().unwrap(), "");
    }

    #[test]
    fn test_texture_reference() {
        let mut p = leaf(
            ParameterClass::Object,
            ParameterType::Texture2D,
            0,
            0,
            ParamCell::Texture(None),
        );
        assert_eq!(p.get_texture_2d().unwrap(), None);

        let tex = Texture {
            handle: TextureHandle(7),
            kind: TextureKind::Texture2D,
        };
        p.set_texture(tex).unwrap();
        assert_eq!(p.get_texture_2d().unwrap(), Some(tex));
        assert!(matches!(
            p.get_texture_cube(),
            Err(FxError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_texture_rejected_on_non_texture_type() {
        let mut p = scalar_f32();
        let tex = Texture {
            handle: TextureHandle(1),
            kind: TextureKind::Texture2D,
        };
        assert!(matches!(
            p.set_texture(tex),
            Err(FxError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_array_setters_dispatch_to_elements() {
        let mut p = array_of(3, scalar_f32);
        p.set_f32_array(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(p.get_f32_array().unwrap(), vec![1.0, 2.0, 3.0]);

        let mut p = array_of(2, || vector_f32(3));
        p.set_vec3_array(&[Vec3::X, Vec3::Z]).unwrap();
        assert_eq!(p.get_vec3_array().unwrap(), vec![Vec3::X, Vec3::Z]);
    }

    #[test]
    fn test_array_setter_requires_elements() {
        let mut p = scalar_f32();
        assert!(matches!(
            p.set_f32_array(&[1.0]),
            Err(FxError::TypeMismatch { .. })
        ));

        let mut p = array_of(2, scalar_f32);
        assert_eq!(
            p.set_f32_array(&[1.0, 2.0, 3.0]),
            Err(FxError::IndexOutOfRange("f32 array"))
        );
    }

    #[test]
    fn test_array_setter_stamps_parent() {
        let mut p = array_of(2, scalar_f32);
        let before = p.state_key();
        p.set_f32_array(&[5.0, 6.0]).unwrap();
        assert!(p.state_key() > before);
        assert!(p.max_state_key() >= p.state_key());
    }

    #[test]
    fn test_matrix_array() {
        let mut p = array_of(2, || matrix_f32(4, 4));
        let m0 = probe_matrix();
        let m1 = probe_matrix().transpose();
        p.set_matrix_array(&[m0, m1]).unwrap();
        assert_eq!(p.get_matrix_array().unwrap(), vec![m0, m1]);
    }

    #[test]
    fn test_unimplemented_accessors_surface_errors() {
        let mut p = array_of(2, scalar_f32);
        assert!(matches!(
            p.get_bool_array(),
            Err(FxError::NotImplemented(_))
        ));
        assert!(matches!(
            p.set_bool_array(&[true]),
            Err(FxError::NotImplemented(_))
        ));
        assert!(matches!(
            p.get_quat_array(),
            Err(FxError::NotImplemented(_))
        ));
        assert!(matches!(
            p.set_quat_array(&[Quat::IDENTITY]),
            Err(FxError::NotImplemented(_))
        ));

        let p = vector_f32(2);
        assert!(matches!(
            p.get_vec2_array(),
            Err(FxError::NotImplemented(_))
        ));
    }

    #[test]
    fn test_f32_array_strides_vector_elements() {
        let mut p = array_of(2, || vector_f32(4));
        p.set_vec4_array(&[
            Vec4::new(1.0, 2.0, 3.0, 4.0),
            Vec4::new(5.0, 6.0, 7.0, 8.0),
        ])
        .unwrap();
        // Each element occupies a full rows*cols stride; the vector leaf's
        // two-unit flatten leaves the rest zeroed.
        assert_eq!(
            p.get_f32_array().unwrap(),
            vec![1.0, 2.0, 0.0, 0.0, 5.0, 6.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_vector_leaf_f32_array_returns_two_units() {
        // Historical quirk: a vector leaf flattens to exactly two units
        // regardless of its declared width.
        let mut p = vector_f32(4);
        p.set_vec4(Vec4::new(1.0, 2.0, 3.0, 4.0)).unwrap();
        assert_eq!(p.get_f32_array().unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_state_keys_strictly_increase() {
        let mut a = scalar_f32();
        let mut b = scalar_f32();
        let k0 = a.state_key();
        a.set_f32(1.0).unwrap();
        let k1 = a.state_key();
        b.set_f32(2.0).unwrap();
        let k2 = b.state_key();
        a.set_f32(3.0).unwrap();
        let k3 = a.state_key();
        assert!(k0 < k1 && k1 < k2 && k2 < k3);
    }

    #[test]
    fn test_deep_clone_isolates_values() {
        let mut a = vector_f32(3);
        a.set_vec3(Vec3::ONE).unwrap();
        let mut b = a.deep_clone();
        assert_eq!(b.get_vec3().unwrap(), Vec3::ONE);
        assert_ne!(a.state_key(), b.state_key());

        let a_key = a.state_key();
        b.set_vec3(Vec3::ZERO).unwrap();
        assert_eq!(a.get_vec3().unwrap(), Vec3::ONE);
        assert_eq!(a.state_key(), a_key);
    }

    #[test]
    fn test_failed_set_does_not_advance_state() {
        let mut p = scalar_f32();
        let key = p.state_key();
        assert!(p.set_bool(true).is_err());
        assert_eq!(p.state_key(), key);
    }
}
