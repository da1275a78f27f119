//! Fixed-function render state blocks
//!
//! A pass may carry blend, depth-stencil, and rasterizer state blocks that
//! the effect compiler baked into the container. The runtime only decodes
//! and hands them to the GPU backend; it never interprets them.
//!
//! Each block is serialized behind a one-byte presence flag with a fixed
//! field list (see [`crate::container`]).

use crate::error::FxError;

// =============================================================================
// Field Enums
// =============================================================================

/// Blend factor applied to source or destination color/alpha
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Blend {
    One = 0,
    Zero = 1,
    SourceColor = 2,
    InverseSourceColor = 3,
    SourceAlpha = 4,
    InverseSourceAlpha = 5,
    DestinationColor = 6,
    InverseDestinationColor = 7,
    DestinationAlpha = 8,
    InverseDestinationAlpha = 9,
    BlendFactor = 10,
    InverseBlendFactor = 11,
    SourceAlphaSaturation = 12,
}

impl Blend {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Blend::One),
            1 => Some(Blend::Zero),
            2 => Some(Blend::SourceColor),
            3 => Some(Blend::InverseSourceColor),
            4 => Some(Blend::SourceAlpha),
            5 => Some(Blend::InverseSourceAlpha),
            6 => Some(Blend::DestinationColor),
            7 => Some(Blend::InverseDestinationColor),
            8 => Some(Blend::DestinationAlpha),
            9 => Some(Blend::InverseDestinationAlpha),
            10 => Some(Blend::BlendFactor),
            11 => Some(Blend::InverseBlendFactor),
            12 => Some(Blend::SourceAlphaSaturation),
            _ => None,
        }
    }
}

/// How source and destination blend factors are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlendFunction {
    Add = 0,
    Subtract = 1,
    ReverseSubtract = 2,
    Min = 3,
    Max = 4,
}

impl BlendFunction {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(BlendFunction::Add),
            1 => Some(BlendFunction::Subtract),
            2 => Some(BlendFunction::ReverseSubtract),
            3 => Some(BlendFunction::Min),
            4 => Some(BlendFunction::Max),
            _ => None,
        }
    }
}

/// Comparison function for depth and stencil tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompareFunction {
    Always = 0,
    Never = 1,
    Less = 2,
    LessEqual = 3,
    Equal = 4,
    GreaterEqual = 5,
    Greater = 6,
    NotEqual = 7,
}

impl CompareFunction {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompareFunction::Always),
            1 => Some(CompareFunction::Never),
            2 => Some(CompareFunction::Less),
            3 => Some(CompareFunction::LessEqual),
            4 => Some(CompareFunction::Equal),
            5 => Some(CompareFunction::GreaterEqual),
            6 => Some(CompareFunction::Greater),
            7 => Some(CompareFunction::NotEqual),
            _ => None,
        }
    }
}

/// Operation applied to the stencil buffer on test outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StencilOperation {
    Keep = 0,
    Zero = 1,
    Replace = 2,
    Increment = 3,
    Decrement = 4,
    IncrementSaturation = 5,
    DecrementSaturation = 6,
    Invert = 7,
}

impl StencilOperation {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(StencilOperation::Keep),
            1 => Some(StencilOperation::Zero),
            2 => Some(StencilOperation::Replace),
            3 => Some(StencilOperation::Increment),
            4 => Some(StencilOperation::Decrement),
            5 => Some(StencilOperation::IncrementSaturation),
            6 => Some(StencilOperation::DecrementSaturation),
            7 => Some(StencilOperation::Invert),
            _ => None,
        }
    }
}

/// Face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CullMode {
    None = 0,
    Clockwise = 1,
    CounterClockwise = 2,
}

impl CullMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CullMode::None),
            1 => Some(CullMode::Clockwise),
            2 => Some(CullMode::CounterClockwise),
            _ => None,
        }
    }
}

/// Triangle fill mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FillMode {
    Solid = 0,
    WireFrame = 1,
}

impl FillMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(FillMode::Solid),
            1 => Some(FillMode::WireFrame),
            _ => None,
        }
    }
}

/// Per-channel color write mask (bit flags)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorWriteChannels(pub u8);

impl ColorWriteChannels {
    pub const NONE: ColorWriteChannels = ColorWriteChannels(0);
    pub const RED: ColorWriteChannels = ColorWriteChannels(1);
    pub const GREEN: ColorWriteChannels = ColorWriteChannels(2);
    pub const BLUE: ColorWriteChannels = ColorWriteChannels(4);
    pub const ALPHA: ColorWriteChannels = ColorWriteChannels(8);
    pub const ALL: ColorWriteChannels = ColorWriteChannels(15);

    pub fn from_u8(value: u8) -> Option<Self> {
        if value <= Self::ALL.0 {
            Some(ColorWriteChannels(value))
        } else {
            None
        }
    }
}

// =============================================================================
// State Blocks
// =============================================================================

/// Blend state baked into a pass.
///
/// Field order matches the serialized layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendStateBlock {
    pub alpha_blend_function: BlendFunction,
    pub alpha_destination_blend: Blend,
    pub alpha_source_blend: Blend,
    /// RGBA constant blend factor
    pub blend_factor: [u8; 4],
    pub color_blend_function: BlendFunction,
    pub color_destination_blend: Blend,
    pub color_source_blend: Blend,
    /// Write masks for render targets 0-3
    pub color_write_channels: [ColorWriteChannels; 4],
    pub multi_sample_mask: i32,
}

/// Depth-stencil state baked into a pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilStateBlock {
    pub ccw_stencil_depth_buffer_fail: StencilOperation,
    pub ccw_stencil_fail: StencilOperation,
    pub ccw_stencil_function: CompareFunction,
    pub ccw_stencil_pass: StencilOperation,
    pub depth_buffer_enable: bool,
    pub depth_buffer_function: CompareFunction,
    pub depth_buffer_write_enable: bool,
    pub reference_stencil: i32,
    pub stencil_depth_buffer_fail: StencilOperation,
    pub stencil_enable: bool,
    pub stencil_fail: StencilOperation,
    pub stencil_function: CompareFunction,
    pub stencil_mask: i32,
    pub stencil_pass: StencilOperation,
    pub stencil_write_mask: i32,
    pub two_sided_stencil_mode: bool,
}

/// Rasterizer state baked into a pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerStateBlock {
    pub cull_mode: CullMode,
    pub depth_bias: f32,
    pub fill_mode: FillMode,
    pub multi_sample_anti_alias: bool,
    pub scissor_test_enable: bool,
    pub slope_scale_depth_bias: f32,
}

/// Map an out-of-range enum byte to a decode error for the named field.
pub(crate) fn state_field<T>(field: &'static str, value: u8, parsed: Option<T>) -> Result<T, FxError> {
    parsed.ok_or(FxError::InvalidStateField(field, value))
}
