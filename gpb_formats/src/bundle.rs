use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use log::debug;
use memmap2::Mmap;
use serde::Serialize;

use crate::error::{GpbError, Result};
use crate::loader;
use crate::mesh::MeshData;
use crate::reference::{ObjectType, Reference, ReferenceTable};
use crate::scene::Scene;
use crate::stream::BundleStream;

/// Signature of a plain bundle ("«GPB»\r\n\x1A\n").
pub const PLAIN_SIGNATURE: [u8; 9] = *b"\xABGPB\xBB\r\n\x1A\n";

/// Signature of an extended bundle, which adds blend shapes to every mesh.
pub const EXTENDED_SIGNATURE: [u8; 9] = *b"\xABGPB\xBB\r\n\x1B\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Variant {
    Plain,
    Extended,
}

impl Variant {
    fn from_signature(signature: &[u8; 9]) -> Option<Self> {
        if *signature == PLAIN_SIGNATURE {
            Some(Variant::Plain)
        } else if *signature == EXTENDED_SIGNATURE {
            Some(Variant::Extended)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    /// Oldest layout the decoder understands.
    pub const REQUIRED: Version = Version::new(1, 2);

    /// First version whose models carry a vertex-animation-cache flag.
    pub const VERTEX_ANIMATION_CACHE: Version = Version::new(9, 1);

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Single comparable value used for feature gates.
    pub fn ordinal(self) -> u32 {
        u32::from(self.major) * 0xFF + u32::from(self.minor)
    }

    /// Each field is compared on its own, so 5.0 fails a 1.2 requirement.
    pub fn is_supported(self) -> bool {
        !(self.major < Self::REQUIRED.major || self.minor < Self::REQUIRED.minor)
    }

    pub fn at_least(self, other: Version) -> bool {
        self.ordinal() >= other.ordinal()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// An opened bundle: header, reference table and the stream they index.
///
/// The stream cursor is shared by every decode step, so one bundle serves one
/// load at a time.
#[derive(Debug)]
pub struct Bundle<R> {
    pub(crate) path: Option<PathBuf>,
    pub(crate) stream: BundleStream<R>,
    pub(crate) version: Version,
    pub(crate) variant: Variant,
    pub(crate) references: ReferenceTable,
}

impl Bundle<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut bundle = Self::from_stream(BundleStream::open(path)?)?;
        bundle.path = Some(path.to_path_buf());
        Ok(bundle)
    }
}

impl Bundle<Cursor<Mmap>> {
    pub fn open_mapped<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut bundle = Self::from_stream(BundleStream::open_mapped(path)?)?;
        bundle.path = Some(path.to_path_buf());
        Ok(bundle)
    }
}

impl<R: Read + Seek> Bundle<R> {
    /// Reads the header from an already-open stream.
    pub fn from_reader(reader: R) -> Result<Self> {
        Self::from_stream(BundleStream::new(reader)?)
    }

    fn from_stream(mut stream: BundleStream<R>) -> Result<Self> {
        stream.seek_to(0)?;
        let raw = stream.read_bytes(PLAIN_SIGNATURE.len(), "bundle signature")?;
        let mut signature = [0u8; 9];
        signature.copy_from_slice(&raw);
        let variant = Variant::from_signature(&signature)
            .ok_or(GpbError::BadSignature { found: signature })?;

        let version = Version::new(
            stream.read_u8("bundle major version")?,
            stream.read_u8("bundle minor version")?,
        );
        if !version.is_supported() {
            return Err(GpbError::UnsupportedVersion {
                major: version.major,
                minor: version.minor,
                required_major: Version::REQUIRED.major,
                required_minor: Version::REQUIRED.minor,
            });
        }

        let references = ReferenceTable::read(&mut stream)?;
        debug!(
            "opened {variant:?} bundle v{version} with {} references ({} bytes)",
            references.len(),
            stream.len()
        );

        Ok(Self {
            path: None,
            stream,
            version,
            variant,
            references,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn is_extended(&self) -> bool {
        self.variant == Variant::Extended
    }

    pub fn references(&self) -> &ReferenceTable {
        &self.references
    }

    pub fn find(&self, id: &str) -> Option<&Reference> {
        self.references.find(id)
    }

    /// Positions the stream at object `id`, which must have `object_type`.
    pub fn seek_to(&mut self, id: &str, object_type: ObjectType) -> Result<&Reference> {
        let reference = locate(&self.references, id, object_type)?;
        self.stream.seek_to(u64::from(reference.offset))?;
        Ok(reference)
    }

    /// Positions the stream at the first object of `object_type`, if any.
    pub fn seek_to_first_type(&mut self, object_type: ObjectType) -> Result<Option<&Reference>> {
        let Some(reference) = self.references.find_first_of_type(object_type) else {
            return Ok(None);
        };
        self.stream.seek_to(u64::from(reference.offset))?;
        Ok(Some(reference))
    }

    pub fn id_at_current_offset(&mut self) -> Result<Option<&str>> {
        let offset = self.stream.position()?;
        Ok(self.references.id_at_offset(offset))
    }

    /// Like [`Bundle::id_at_current_offset`], but a missing id is an error.
    pub(crate) fn require_current_id(&mut self) -> Result<String> {
        let offset = self.stream.position()?;
        self.references
            .id_at_offset(offset)
            .map(str::to_owned)
            .ok_or(GpbError::MissingId { offset })
    }

    /// Decodes mesh `id` as a side trip; the cursor is restored afterwards.
    pub fn load_mesh(&mut self, id: &str) -> Result<MeshData> {
        let extended = self.is_extended();
        let references = &self.references;
        self.stream.with_restored_position(|stream| {
            let reference = locate(references, id, ObjectType::Mesh)?;
            stream.seek_to(u64::from(reference.offset))?;
            debug!("loading mesh '{id}' at offset {}", reference.offset);
            MeshData::read(stream, extended)
        })
    }

    /// Decodes scene `id`, or the first scene in the bundle.
    pub fn load_scene(&mut self, id: Option<&str>) -> Result<Scene> {
        loader::load_scene(self, id)
    }
}

/// Opens `path` and decodes its first scene.
pub fn load_scene<P: AsRef<Path>>(path: P) -> Result<Scene> {
    Bundle::open(path)?.load_scene(None)
}

fn locate<'a>(references: &'a ReferenceTable, id: &str, object_type: ObjectType) -> Result<&'a Reference> {
    let reference = references
        .find(id)
        .ok_or_else(|| GpbError::UnknownObject(id.to_string()))?;
    if reference.object_type != object_type {
        return Err(GpbError::TypeMismatch {
            id: id.to_string(),
            expected: object_type.raw(),
            found: reference.object_type.raw(),
        });
    }
    Ok(reference)
}
