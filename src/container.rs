//! Effect container decoder
//!
//! Decodes a compiled `.nfx` effect container into its structural parts:
//! constant buffer layouts, opaque shader blobs, the parameter tree, and the
//! technique/pass list with baked render state blocks.
//!
//! # Layout
//! ```text
//! 0x00: signature u32        must equal FX_MAGIC
//! 0x04: version u8           must equal FX_VERSION exactly
//! 0x05: profile u8           must match the runtime's shader profile
//! 0x06: effect_key i32       opaque content key used for caching
//! 0x0A: body                 cbuffers, shaders, parameters, techniques
//! var:  tail u32             must repeat FX_MAGIC
//! ```
//!
//! Strings are u16 length-prefixed UTF-8. All integers little-endian.
//! The trailing signature guards against decoder/encoder field-count
//! disagreements: if any field was mis-read the cursor will not land on it.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::FxError;
use crate::parameter::{
    EffectAnnotations, EffectParameter, ParamCell, ParameterClass, ParameterType,
};
use crate::reader::ByteReader;
use crate::states::{
    Blend, BlendFunction, BlendStateBlock, ColorWriteChannels, CompareFunction, CullMode,
    DepthStencilStateBlock, FillMode, RasterizerStateBlock, StencilOperation, state_field,
};
use crate::{FX_MAGIC, FX_VERSION, ShaderProfile};

/// Deepest parameter nesting the decoder accepts. Effect compilers emit
/// flat or shallowly nested trees; anything past this is malformed input,
/// not content.
const MAX_PARAMETER_DEPTH: usize = 16;

// =============================================================================
// Structural Types
// =============================================================================

/// Validated container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FxHeader {
    pub version: u8,
    pub profile: u8,
    /// Opaque content key; identifies the container for caching only.
    pub effect_key: i32,
    /// Byte offset where the body begins.
    pub header_size: usize,
}

/// Mapping of root parameters into one packed constant buffer.
#[derive(Debug, Clone)]
pub struct ConstantBufferLayout {
    pub name: Arc<str>,
    pub size_bytes: u16,
    /// `(root parameter index, byte offset)` pairs.
    pub offsets: Vec<(u32, u16)>,
}

/// Opaque compiled shader bytecode. The runtime never inspects it.
#[derive(Debug, Clone)]
pub struct ShaderBlob {
    pub bytecode: Vec<u8>,
}

/// A named rendering recipe: an ordered list of passes.
#[derive(Debug, Clone)]
pub struct Technique {
    pub name: Arc<str>,
    pub annotations: EffectAnnotations,
    pub passes: Vec<Pass>,
}

/// One pass of a technique: a shader pair plus optional baked render state.
#[derive(Debug, Clone)]
pub struct Pass {
    pub name: Arc<str>,
    pub annotations: EffectAnnotations,
    /// Index into the container's shader blob list, absent when the pass
    /// does not override the stage.
    pub vertex_shader: Option<u32>,
    pub pixel_shader: Option<u32>,
    pub blend: Option<BlendStateBlock>,
    pub depth_stencil: Option<DepthStencilStateBlock>,
    pub rasterizer: Option<RasterizerStateBlock>,
}

/// Fully decoded container body.
#[derive(Debug)]
pub(crate) struct DecodedContainer {
    pub effect_key: i32,
    pub layouts: Vec<ConstantBufferLayout>,
    pub shaders: Vec<ShaderBlob>,
    pub parameters: Vec<EffectParameter>,
    pub techniques: Vec<Technique>,
}

// =============================================================================
// Header
// =============================================================================

/// Validate the fixed header and extract the effect key without decoding
/// the body. The cache uses this as a cheap probe before deciding whether
/// a full decode is needed.
pub fn read_header(bytes: &[u8], profile: ShaderProfile) -> Result<FxHeader, FxError> {
    let mut r = ByteReader::new(bytes);

    let signature = r.read_u32()?;
    if signature != FX_MAGIC {
        return Err(FxError::InvalidContainer);
    }

    let version = r.read_u8()?;
    if version < FX_VERSION {
        return Err(FxError::StaleContainer(version));
    }
    if version > FX_VERSION {
        return Err(FxError::UnsupportedContainer(version));
    }

    let found = r.read_u8()?;
    if found != profile as u8 {
        return Err(FxError::ProfileMismatch {
            expected: profile as u8,
            found,
        });
    }

    let effect_key = r.read_i32()?;

    Ok(FxHeader {
        version,
        profile: found,
        effect_key,
        header_size: r.position(),
    })
}

// =============================================================================
// Body
// =============================================================================

/// Decode a full container, header included.
pub(crate) fn decode(bytes: &[u8], profile: ShaderProfile) -> Result<DecodedContainer, FxError> {
    let header = read_header(bytes, profile)?;
    let mut r = ByteReader::new(&bytes[header.header_size..]);

    let layouts = read_constant_buffer_layouts(&mut r)?;
    let shaders = read_shaders(&mut r)?;
    let parameters = read_parameters(&mut r, 0)?;
    let techniques = read_techniques(&mut r)?;

    // Tail check: the encoder repeats the signature after the last
    // technique. Anything else means the two sides disagreed on a field.
    let tail = r.read_u32()?;
    if tail != FX_MAGIC {
        return Err(FxError::CorruptContainer);
    }

    tracing::debug!(
        effect_key = header.effect_key,
        constant_buffers = layouts.len(),
        shaders = shaders.len(),
        parameters = parameters.len(),
        techniques = techniques.len(),
        "decoded effect container"
    );

    Ok(DecodedContainer {
        effect_key: header.effect_key,
        layouts,
        shaders,
        parameters,
        techniques,
    })
}

fn read_constant_buffer_layouts(
    r: &mut ByteReader<'_>,
) -> Result<Vec<ConstantBufferLayout>, FxError> {
    // Counts come from the wire: cap every preallocation by the bytes
    // actually left so an overdeclared count fails at the first short read
    // instead of reserving gigabytes.
    let count = r.read_u32()? as usize;
    let mut layouts = Vec::with_capacity(count.min(r.remaining()));
    for _ in 0..count {
        let name: Arc<str> = Arc::from(r.read_str()?);
        let size_bytes = r.read_u16()?;
        let pair_count = r.read_u32()? as usize;
        let mut offsets = Vec::with_capacity(pair_count.min(r.remaining()));
        for _ in 0..pair_count {
            let parameter_index = r.read_u32()?;
            let byte_offset = r.read_u16()?;
            offsets.push((parameter_index, byte_offset));
        }
        layouts.push(ConstantBufferLayout {
            name,
            size_bytes,
            offsets,
        });
    }
    Ok(layouts)
}

fn read_shaders(r: &mut ByteReader<'_>) -> Result<Vec<ShaderBlob>, FxError> {
    let count = r.read_u32()? as usize;
    let mut shaders = Vec::with_capacity(count.min(r.remaining()));
    for _ in 0..count {
        let len = r.read_u32()? as usize;
        let bytecode = r.read_bytes(len)?.to_vec();
        shaders.push(ShaderBlob { bytecode });
    }
    Ok(shaders)
}

/// Annotation bodies are not serialized: the count is read and retained,
/// but the list is always empty. Intentionally incomplete; do not invent
/// annotation semantics here.
fn read_annotations(r: &mut ByteReader<'_>) -> Result<EffectAnnotations, FxError> {
    let count = r.read_u32()?;
    Ok(EffectAnnotations::new(count))
}

fn read_parameters(r: &mut ByteReader<'_>, depth: usize) -> Result<Vec<EffectParameter>, FxError> {
    let count = r.read_u32()? as usize;
    let mut parameters = Vec::with_capacity(count.min(r.remaining()));
    for _ in 0..count {
        parameters.push(read_parameter(r, depth)?);
    }
    Ok(parameters)
}

fn read_parameter(r: &mut ByteReader<'_>, depth: usize) -> Result<EffectParameter, FxError> {
    if depth >= MAX_PARAMETER_DEPTH {
        return Err(FxError::ParameterTreeTooDeep);
    }
    let class_raw = r.read_u8()?;
    let class = ParameterClass::from_u8(class_raw)
        .ok_or(FxError::InvalidStateField("parameter class", class_raw))?;
    let ty_raw = r.read_u8()?;
    let ty = ParameterType::from_u8(ty_raw)
        .ok_or(FxError::InvalidStateField("parameter type", ty_raw))?;
    let name: Arc<str> = Arc::from(r.read_str()?);
    let semantic: Arc<str> = Arc::from(r.read_str()?);
    let annotations = read_annotations(r)?;
    let row_count = r.read_u8()?;
    let column_count = r.read_u8()?;

    let elements = read_parameters(r, depth + 1)?;
    let struct_members = read_parameters(r, depth + 1)?;

    // A node gets a value cell iff it is a leaf and its type is one that
    // lands in a constant buffer. Texture leaves hold a reference instead;
    // everything else carries no payload.
    let is_leaf = elements.is_empty() && struct_members.is_empty();
    let units = row_count as usize * column_count as usize;
    let cell = if !is_leaf {
        ParamCell::None
    } else {
        match ty {
            ParameterType::Bool | ParameterType::Int32 => {
                let mut data = SmallVec::with_capacity(units);
                for _ in 0..units {
                    data.push(r.read_i32()?);
                }
                ParamCell::Int(data)
            }
            ParameterType::Single => {
                let mut data = SmallVec::with_capacity(units);
                for _ in 0..units {
                    data.push(r.read_f32()?);
                }
                ParamCell::Float(data)
            }
            ParameterType::String => {
                // String cells are sized by the encoded value, not the
                // row/column shape.
                ParamCell::Str(r.read_str()?.as_bytes().to_vec())
            }
            _ if ty.is_texture() => ParamCell::Texture(None),
            _ => ParamCell::None,
        }
    };

    Ok(EffectParameter::new(
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
    ))
}

fn read_techniques(r: &mut ByteReader<'_>) -> Result<Vec<Technique>, FxError> {
    let count = r.read_u32()? as usize;
    let mut techniques = Vec::with_capacity(count.min(r.remaining()));
    for _ in 0..count {
        let name: Arc<str> = Arc::from(r.read_str()?);
        let annotations = read_annotations(r)?;
        let passes = read_passes(r)?;
        techniques.push(Technique {
            name,
            annotations,
            passes,
        });
    }
    Ok(techniques)
}

fn read_passes(r: &mut ByteReader<'_>) -> Result<Vec<Pass>, FxError> {
    let count = r.read_u32()? as usize;
    let mut passes = Vec::with_capacity(count.min(r.remaining()));
    for _ in 0..count {
        let name: Arc<str> = Arc::from(r.read_str()?);
        let annotations = read_annotations(r)?;

        // Negative index means the pass does not bind that stage.
        let vertex_shader = u32::try_from(r.read_i32()?).ok();
        let pixel_shader = u32::try_from(r.read_i32()?).ok();

        let blend = if r.read_bool()? {
            Some(read_blend_state(r)?)
        } else {
            None
        };
        let depth_stencil = if r.read_bool()? {
            Some(read_depth_stencil_state(r)?)
        } else {
            None
        };
        let rasterizer = if r.read_bool()? {
            Some(read_rasterizer_state(r)?)
        } else {
            None
        };

        passes.push(Pass {
            name,
            annotations,
            vertex_shader,
            pixel_shader,
            blend,
            depth_stencil,
            rasterizer,
        });
    }
    Ok(passes)
}

fn read_blend_state(r: &mut ByteReader<'_>) -> Result<BlendStateBlock, FxError> {
    let alpha_blend_function = read_blend_function(r, "alpha_blend_function")?;
    let alpha_destination_blend = read_blend(r, "alpha_destination_blend")?;
    let alpha_source_blend = read_blend(r, "alpha_source_blend")?;
    let blend_factor = [r.read_u8()?, r.read_u8()?, r.read_u8()?, r.read_u8()?];
    let color_blend_function = read_blend_function(r, "color_blend_function")?;
    let color_destination_blend = read_blend(r, "color_destination_blend")?;
    let color_source_blend = read_blend(r, "color_source_blend")?;
    let mut color_write_channels = [ColorWriteChannels::ALL; 4];
    for channels in &mut color_write_channels {
        let raw = r.read_u8()?;
        *channels = state_field(
            "color_write_channels",
            raw,
            ColorWriteChannels::from_u8(raw),
        )?;
    }
    let multi_sample_mask = r.read_i32()?;

    Ok(BlendStateBlock {
        alpha_blend_function,
        alpha_destination_blend,
        alpha_source_blend,
        blend_factor,
        color_blend_function,
        color_destination_blend,
        color_source_blend,
        color_write_channels,
        multi_sample_mask,
    })
}

fn read_depth_stencil_state(r: &mut ByteReader<'_>) -> Result<DepthStencilStateBlock, FxError> {
    Ok(DepthStencilStateBlock {
        ccw_stencil_depth_buffer_fail: read_stencil_op(r, "ccw_stencil_depth_buffer_fail")?,
        ccw_stencil_fail: read_stencil_op(r, "ccw_stencil_fail")?,
        ccw_stencil_function: read_compare(r, "ccw_stencil_function")?,
        ccw_stencil_pass: read_stencil_op(r, "ccw_stencil_pass")?,
        depth_buffer_enable: r.read_bool()?,
        depth_buffer_function: read_compare(r, "depth_buffer_function")?,
        depth_buffer_write_enable: r.read_bool()?,
        reference_stencil: r.read_i32()?,
        stencil_depth_buffer_fail: read_stencil_op(r, "stencil_depth_buffer_fail")?,
        stencil_enable: r.read_bool()?,
        stencil_fail: read_stencil_op(r, "stencil_fail")?,
        stencil_function: read_compare(r, "stencil_function")?,
        stencil_mask: r.read_i32()?,
        stencil_pass: read_stencil_op(r, "stencil_pass")?,
        stencil_write_mask: r.read_i32()?,
        two_sided_stencil_mode: r.read_bool()?,
    })
}

fn read_rasterizer_state(r: &mut ByteReader<'_>) -> Result<RasterizerStateBlock, FxError> {
    let raw = r.read_u8()?;
    let cull_mode = state_field("cull_mode", raw, CullMode::from_u8(raw))?;
    let depth_bias = r.read_f32()?;
    let raw = r.read_u8()?;
    let fill_mode = state_field("fill_mode", raw, FillMode::from_u8(raw))?;
    Ok(RasterizerStateBlock {
        cull_mode,
        depth_bias,
        fill_mode,
        multi_sample_anti_alias: r.read_bool()?,
        scissor_test_enable: r.read_bool()?,
        slope_scale_depth_bias: r.read_f32()?,
    })
}

fn read_blend(r: &mut ByteReader<'_>, field: &'static str) -> Result<Blend, FxError> {
    let raw = r.read_u8()?;
    state_field(field, raw, Blend::from_u8(raw))
}

fn read_blend_function(
    r: &mut ByteReader<'_>,
    field: &'static str,
) -> Result<BlendFunction, FxError> {
    let raw = r.read_u8()?;
    state_field(field, raw, BlendFunction::from_u8(raw))
}

fn read_compare(r: &mut ByteReader<'_>, field: &'static str) -> Result<CompareFunction, FxError> {
    let raw = r.read_u8()?;
    state_field(field, raw, CompareFunction::from_u8(raw))
}

fn read_stencil_op(r: &mut ByteReader<'_>, field: &'static str) -> Result<StencilOperation, FxError> {
    let raw = r.read_u8()?;
    state_field(field, raw, StencilOperation::from_u8(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_str(buf: &mut Vec<u8>, s: &str) {
        buf.extend_from_slice(&(s.len() as u16).to_le_bytes());
        buf.extend_from_slice(s.as_bytes());
    }

    /// Minimal container: no cbuffers, no shaders, one f32 scalar parameter,
    /// one technique with one bare pass.
    fn minimal_container() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&FX_MAGIC.to_le_bytes());
        buf.push(FX_VERSION);
        buf.push(ShaderProfile::OpenGl as u8);
        buf.extend_from_slice(&0x5EED_i32.to_le_bytes());

        buf.extend_from_slice(&0u32.to_le_bytes()); // constant buffers
        buf.extend_from_slice(&0u32.to_le_bytes()); // shaders

        buf.extend_from_slice(&1u32.to_le_bytes()); // parameters
        buf.push(ParameterClass::Scalar as u8);
        buf.push(ParameterType::Single as u8);
        write_str(&mut buf, "Brightness");
        write_str(&mut buf, "");
        buf.extend_from_slice(&0u32.to_le_bytes()); // annotations
        buf.push(1); // rows
        buf.push(1); // columns
        buf.extend_from_slice(&0u32.to_le_bytes()); // elements
        buf.extend_from_slice(&0u32.to_le_bytes()); // struct members
        buf.extend_from_slice(&0.5f32.to_le_bytes()); // initial value

        buf.extend_from_slice(&1u32.to_le_bytes()); // techniques
        write_str(&mut buf, "Default");
        buf.extend_from_slice(&0u32.to_le_bytes()); // annotations
        buf.extend_from_slice(&1u32.to_le_bytes()); // passes
        write_str(&mut buf, "P0");
        buf.extend_from_slice(&0u32.to_le_bytes()); // annotations
        buf.extend_from_slice(&(-1i32).to_le_bytes()); // vertex shader
        buf.extend_from_slice(&(-1i32).to_le_bytes()); // pixel shader
        buf.push(0); // no blend state
        buf.push(0); // no depth-stencil state
        buf.push(0); // no rasterizer state

        buf.extend_from_slice(&FX_MAGIC.to_le_bytes()); // tail
        buf
    }

    #[test]
    fn test_read_header() {
        let buf = minimal_container();
        let header = read_header(&buf, ShaderProfile::OpenGl).unwrap();
        assert_eq!(header.version, FX_VERSION);
        assert_eq!(header.effect_key, 0x5EED);
        assert_eq!(header.header_size, 10);
        // Header reads are deterministic and comparable as whole values.
        assert_eq!(header, read_header(&buf, ShaderProfile::OpenGl).unwrap());
    }

    #[test]
    fn test_decode_minimal() {
        let buf = minimal_container();
        let decoded = decode(&buf, ShaderProfile::OpenGl).unwrap();
        assert_eq!(decoded.effect_key, 0x5EED);
        assert!(decoded.layouts.is_empty());
        assert!(decoded.shaders.is_empty());
        assert_eq!(decoded.parameters.len(), 1);
        assert_eq!(decoded.parameters[0].name(), "Brightness");
        assert_eq!(decoded.parameters[0].get_f32().unwrap(), 0.5);
        assert_eq!(decoded.techniques.len(), 1);
        assert_eq!(&*decoded.techniques[0].name, "Default");
        assert_eq!(decoded.techniques[0].passes.len(), 1);
        let pass = &decoded.techniques[0].passes[0];
        assert_eq!(pass.vertex_shader, None);
        assert_eq!(pass.pixel_shader, None);
        assert!(pass.blend.is_none());
    }

    #[test]
    fn test_bad_signature() {
        let mut buf = minimal_container();
        buf[0] ^= 0xFF;
        assert_eq!(
            read_header(&buf, ShaderProfile::OpenGl),
            Err(FxError::InvalidContainer)
        );
    }

    #[test]
    fn test_version_must_match_exactly() {
        let mut buf = minimal_container();
        buf[4] = FX_VERSION - 1;
        assert_eq!(
            read_header(&buf, ShaderProfile::OpenGl),
            Err(FxError::StaleContainer(FX_VERSION - 1))
        );

        buf[4] = FX_VERSION + 1;
        assert_eq!(
            read_header(&buf, ShaderProfile::OpenGl),
            Err(FxError::UnsupportedContainer(FX_VERSION + 1))
        );
    }

    #[test]
    fn test_profile_mismatch() {
        let buf = minimal_container();
        assert_eq!(
            read_header(&buf, ShaderProfile::DirectX),
            Err(FxError::ProfileMismatch {
                expected: ShaderProfile::DirectX as u8,
                found: ShaderProfile::OpenGl as u8,
            })
        );
    }

    #[test]
    fn test_corrupt_tail() {
        let mut buf = minimal_container();
        let len = buf.len();
        buf[len - 1] ^= 0xFF;
        assert_eq!(
            decode(&buf, ShaderProfile::OpenGl).unwrap_err(),
            FxError::CorruptContainer
        );
    }

    #[test]
    fn test_truncated_body() {
        let buf = minimal_container();
        let truncated = &buf[..buf.len() - 8];
        assert_eq!(
            decode(truncated, ShaderProfile::OpenGl).unwrap_err(),
            FxError::UnexpectedEof
        );
    }

    #[test]
    fn test_deeply_nested_parameters_rejected() {
        // A chain of single-element array nodes deeper than the decoder's
        // bound must surface an error, not recurse without limit.
        let mut buf = Vec::new();
        buf.extend_from_slice(&FX_MAGIC.to_le_bytes());
        buf.push(FX_VERSION);
        buf.push(ShaderProfile::OpenGl as u8);
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // constant buffers
        buf.extend_from_slice(&0u32.to_le_bytes()); // shaders

        buf.extend_from_slice(&1u32.to_le_bytes()); // parameters
        for _ in 0..(MAX_PARAMETER_DEPTH * 2) {
            buf.push(ParameterClass::Scalar as u8);
            buf.push(ParameterType::Single as u8);
            write_str(&mut buf, "N");
            write_str(&mut buf, "");
            buf.extend_from_slice(&0u32.to_le_bytes()); // annotations
            buf.push(1); // rows
            buf.push(1); // columns
            buf.extend_from_slice(&1u32.to_le_bytes()); // one nested element
        }

        assert_eq!(
            decode(&buf, ShaderProfile::OpenGl).unwrap_err(),
            FxError::ParameterTreeTooDeep
        );
    }

    #[test]
    fn test_overdeclared_counts_fail_cleanly() {
        // A count field claiming billions of entries with no bytes behind
        // it must fail at the first short read.
        let mut buf = Vec::new();
        buf.extend_from_slice(&FX_MAGIC.to_le_bytes());
        buf.push(FX_VERSION);
        buf.push(ShaderProfile::OpenGl as u8);
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.extend_from_slice(&u32::MAX.to_le_bytes()); // constant buffers

        assert_eq!(
            decode(&buf, ShaderProfile::OpenGl).unwrap_err(),
            FxError::UnexpectedEof
        );
    }

    #[test]
    fn test_annotation_count_read_but_empty() {
        let mut buf = minimal_container();
        // Patch the technique's annotation count to a non-zero value; the
        // decoder must still treat the list as empty and the tail must
        // still line up (annotation bodies occupy no bytes).
        let needle = {
            let mut n = vec![7u8, 0u8];
            n.extend_from_slice(b"Default");
            n
        };
        let pos = buf
            .windows(needle.len())
            .position(|w| w == needle)
            .unwrap();
        let count_at = pos + needle.len();
        buf[count_at..count_at + 4].copy_from_slice(&3u32.to_le_bytes());

        let decoded = decode(&buf, ShaderProfile::OpenGl).unwrap();
        let annotations = decoded.techniques[0].annotations;
        assert_eq!(annotations.declared_len(), 3);
        assert!(annotations.is_empty());
    }
}
