use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = GpbError> = std::result::Result<T, E>;

/// Error conditions raised while decoding GPB bundles or their XML dialect.
///
/// Every variant aborts the whole load; there is no partial recovery.
#[derive(Debug, Error)]
pub enum GpbError {
    #[error("failed to open {}: {source}", path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("I/O error while {what}: {source}")]
    Io {
        what: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("bundle signature {found:02x?} is not a GPB signature")]
    BadSignature { found: [u8; 9] },
    #[error("unsupported bundle version {major}.{minor} (requires {required_major}.{required_minor})")]
    UnsupportedVersion {
        major: u8,
        minor: u8,
        required_major: u8,
        required_minor: u8,
    },
    #[error("reference table entry {index} is corrupt: {reason}")]
    CorruptRefTable { index: u32, reason: String },
    #[error("unexpected end of stream at offset {offset} while reading {what}")]
    Truncated { what: &'static str, offset: u64 },
    #[error("string at offset {offset} declares {length} bytes, over the {max} byte limit")]
    CorruptString { offset: u64, length: u32, max: u32 },
    #[error("object '{id}' has type {found} (expected {expected})")]
    TypeMismatch { id: String, expected: u32, found: u32 },
    #[error("no object with id '{0}' in bundle")]
    UnknownObject(String),
    #[error("bundle contains no scene objects")]
    NoScene,
    #[error("no reference id registered for offset {offset}")]
    MissingId { offset: u64 },
    #[error("node '{id}' has unknown node type {value}")]
    UnknownNodeType { id: String, value: u32 },
    #[error("node '{id}' nests deeper than {max} levels")]
    NodeTooDeep { id: String, max: usize },
    #[error("node '{id}' appears inside its own subtree")]
    CyclicNode { id: String },
    #[error("unsupported camera type {0}")]
    UnknownCameraType(u8),
    #[error("unsupported light type {0}")]
    UnknownLightType(u8),
    #[error("unsupported xref '{0}' (only local '#id' references are resolved)")]
    UnsupportedXref(String),
    #[error("mesh data declares no vertex elements")]
    NoVertexElements,
    #[error("vertex element {index} has zero components")]
    BadVertexElement { index: u32 },
    #[error("mesh data declares zero vertex bytes")]
    EmptyVertexData,
    #[error("{byte_count} vertex bytes is not a multiple of the {stride} byte stride")]
    MisalignedVertexData { byte_count: u32, stride: u32 },
    #[error("mesh part {part} uses unsupported index format {value:#06x}")]
    BadIndexFormat { part: u32, value: u32 },
    #[error("blend shape {index} is malformed: {reason}")]
    BadBlendShape { index: u32, reason: &'static str },
    #[error("mesh skin is malformed: {0}")]
    BadSkin(String),
    #[error("failed to restore stream position {position} after a side trip")]
    SeekRestoreFailed {
        position: u64,
        #[source]
        source: io::Error,
    },
    #[error("XML syntax error: {0}")]
    Xml(#[from] xml::reader::Error),
    #[error("mesh '{mesh}': index token '{token}' is not an integer")]
    BadIndexToken { mesh: String, token: String },
    #[error("mesh '{mesh}': float token '{token}' could not be parsed")]
    BadFloatToken { mesh: String, token: String },
    #[error("mesh '{mesh}': bounds field '{field}' is malformed")]
    BadBounds { mesh: String, field: &'static str },
    #[error("mesh '{mesh}': {count} {what} do not fit a 32-bit count")]
    CountOverflow {
        mesh: String,
        what: &'static str,
        count: usize,
    },
    #[error("mesh '{mesh}': {positions} positions, {normals} normals, {texcoords} texcoords")]
    AttributeCountMismatch {
        mesh: String,
        positions: usize,
        normals: usize,
        texcoords: usize,
    },
}

impl GpbError {
    /// Maps an I/O failure, turning early EOF into [`GpbError::Truncated`].
    pub(crate) fn from_io(source: io::Error, what: &'static str, offset: u64) -> Self {
        if source.kind() == io::ErrorKind::UnexpectedEof {
            GpbError::Truncated { what, offset }
        } else {
            GpbError::Io { what, source }
        }
    }
}
