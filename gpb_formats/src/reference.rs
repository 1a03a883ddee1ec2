use std::fmt;
use std::io::{Read, Seek};

use serde::Serialize;

use crate::error::{GpbError, Result};
use crate::stream::BundleStream;

/// Object type tags stored in the reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectType {
    Scene,
    Node,
    Animations,
    Animation,
    AnimationChannel,
    Model,
    Material,
    Effect,
    Camera,
    Light,
    Mesh,
    MeshPart,
    MeshSkin,
    Font,
    Other(u32),
}

impl ObjectType {
    pub fn from_raw(value: u32) -> Self {
        match value {
            1 => ObjectType::Scene,
            2 => ObjectType::Node,
            3 => ObjectType::Animations,
            4 => ObjectType::Animation,
            5 => ObjectType::AnimationChannel,
            10 => ObjectType::Model,
            16 => ObjectType::Material,
            18 => ObjectType::Effect,
            32 => ObjectType::Camera,
            33 => ObjectType::Light,
            34 => ObjectType::Mesh,
            35 => ObjectType::MeshPart,
            36 => ObjectType::MeshSkin,
            128 => ObjectType::Font,
            other => ObjectType::Other(other),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            ObjectType::Scene => 1,
            ObjectType::Node => 2,
            ObjectType::Animations => 3,
            ObjectType::Animation => 4,
            ObjectType::AnimationChannel => 5,
            ObjectType::Model => 10,
            ObjectType::Material => 16,
            ObjectType::Effect => 18,
            ObjectType::Camera => 32,
            ObjectType::Light => 33,
            ObjectType::Mesh => 34,
            ObjectType::MeshPart => 35,
            ObjectType::MeshSkin => 36,
            ObjectType::Font => 128,
            ObjectType::Other(value) => value,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectType::Other(value) => write!(f, "type {value}"),
            known => write!(f, "{known:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub id: String,
    pub object_type: ObjectType,
    pub offset: u32,
}

/// Random-access index of `(id, type, offset)` triples from the bundle header.
///
/// Lookups are linear scans; bundles hold few objects relative to their
/// mesh payloads. Ids are not required to be unique, the first match wins.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReferenceTable {
    entries: Vec<Reference>,
}

impl ReferenceTable {
    pub fn new(entries: Vec<Reference>) -> Self {
        Self { entries }
    }

    pub(crate) fn read<R: Read + Seek>(stream: &mut BundleStream<R>) -> Result<Self> {
        let count = stream
            .read_u32("reference count")
            .map_err(|err| corrupt(0, err))?;

        // Each entry is at least 12 bytes; refuse counts the file cannot hold.
        let remaining = stream.len().saturating_sub(stream.position()?);
        if u64::from(count) * 12 > remaining {
            return Err(GpbError::CorruptRefTable {
                index: 0,
                reason: format!("{count} references cannot fit in {remaining} bytes"),
            });
        }

        let mut entries = Vec::with_capacity(count as usize);
        for index in 0..count {
            let id = stream
                .read_string("reference id")
                .map_err(|err| corrupt(index, err))?;
            if id.is_empty() {
                return Err(GpbError::CorruptRefTable {
                    index,
                    reason: "empty id".to_string(),
                });
            }
            let object_type = stream
                .read_u32("reference type")
                .map_err(|err| corrupt(index, err))?;
            let offset = stream
                .read_u32("reference offset")
                .map_err(|err| corrupt(index, err))?;
            entries.push(Reference {
                id,
                object_type: ObjectType::from_raw(object_type),
                offset,
            });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reference> {
        self.entries.iter()
    }

    /// Case-sensitive exact id match.
    pub fn find(&self, id: &str) -> Option<&Reference> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn find_first_of_type(&self, object_type: ObjectType) -> Option<&Reference> {
        self.entries
            .iter()
            .find(|entry| entry.object_type == object_type)
    }

    pub fn of_type(&self, object_type: ObjectType) -> impl Iterator<Item = &Reference> {
        self.entries
            .iter()
            .filter(move |entry| entry.object_type == object_type)
    }

    /// Reverse lookup used to recover ids during recursive decoding.
    pub fn id_at_offset(&self, offset: u64) -> Option<&str> {
        if offset == 0 {
            return None;
        }
        self.entries
            .iter()
            .find(|entry| u64::from(entry.offset) == offset && !entry.id.is_empty())
            .map(|entry| entry.id.as_str())
    }
}

fn corrupt(index: u32, err: GpbError) -> GpbError {
    GpbError::CorruptRefTable {
        index,
        reason: err.to_string(),
    }
}
