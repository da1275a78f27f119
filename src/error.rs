//! Effect runtime error types

/// Errors produced while decoding an effect container or accessing
/// parameter values.
///
/// All of these are contract violations: load-time failures never yield a
/// partially usable effect, and accessor failures indicate the caller asked
/// for a type the container did not declare. There is no retry path.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FxError {
    /// Leading signature does not match [`FX_MAGIC`](crate::FX_MAGIC)
    #[error("not an NFX effect container")]
    InvalidContainer,

    /// Container version is older than the runtime requires
    #[error("effect container version {0} is stale and must be rebuilt")]
    StaleContainer(u8),

    /// Container version is newer than the runtime supports
    #[error("effect container version {0} requires a newer runtime")]
    UnsupportedContainer(u8),

    /// Container was compiled for a different shader profile
    #[error("effect was built for profile {found}, runtime expects {expected}")]
    ProfileMismatch { expected: u8, found: u8 },

    /// Trailing signature check failed after the technique list
    #[error("effect container tail mismatch (decoder/encoder disagreement)")]
    CorruptContainer,

    /// Parameter tree recursion exceeded the decoder's nesting bound
    #[error("effect parameter tree is nested too deeply")]
    ParameterTreeTooDeep,

    /// Input ended before the declared structure was fully read
    #[error("unexpected end of effect container")]
    UnexpectedEof,

    /// A serialized string was not valid UTF-8
    #[error("invalid UTF-8 in effect container string")]
    InvalidString,

    /// An enum field in a render state block had an out-of-range value
    #[error("invalid {0} value {1} in render state block")]
    InvalidStateField(&'static str, u8),

    /// A typed accessor was called against a parameter of a different
    /// declared class/type
    #[error("type mismatch on parameter '{name}': declared {declared}, accessed as {accessed}")]
    TypeMismatch {
        name: String,
        declared: String,
        accessed: &'static str,
    },

    /// Array accessor given more values than the parameter has elements,
    /// or a technique/pass index out of range
    #[error("index out of range: {0}")]
    IndexOutOfRange(&'static str),

    /// Named parameter lookup failed
    #[error("no parameter named '{0}'")]
    UnknownParameter(String),

    /// Accessor combination with no defined behavior; kept as an explicit
    /// error instead of inventing semantics
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}
