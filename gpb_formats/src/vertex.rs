use std::io::{Read, Seek};

use serde::Serialize;

use crate::error::{GpbError, Result};
use crate::stream::BundleStream;

/// Every vertex attribute component in a bundle is a 32-bit float.
pub const COMPONENT_SIZE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum VertexUsage {
    Position,
    Normal,
    Color,
    Tangent,
    Binormal,
    BlendWeights,
    BlendIndices,
    TexCoord(u8),
    Other(u32),
}

impl VertexUsage {
    pub fn from_raw(value: u32) -> Self {
        match value {
            1 => VertexUsage::Position,
            2 => VertexUsage::Normal,
            3 => VertexUsage::Color,
            4 => VertexUsage::Tangent,
            5 => VertexUsage::Binormal,
            6 => VertexUsage::BlendWeights,
            7 => VertexUsage::BlendIndices,
            8..=15 => VertexUsage::TexCoord((value - 8) as u8),
            other => VertexUsage::Other(other),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            VertexUsage::Position => 1,
            VertexUsage::Normal => 2,
            VertexUsage::Color => 3,
            VertexUsage::Tangent => 4,
            VertexUsage::Binormal => 5,
            VertexUsage::BlendWeights => 6,
            VertexUsage::BlendIndices => 7,
            VertexUsage::TexCoord(slot) => 8 + u32::from(slot),
            VertexUsage::Other(value) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VertexElement {
    pub usage: VertexUsage,
    pub components: u32,
}

impl VertexElement {
    pub fn new(usage: VertexUsage, components: u32) -> Self {
        Self { usage, components }
    }

    pub fn byte_size(&self) -> u32 {
        self.components.saturating_mul(COMPONENT_SIZE)
    }
}

/// Ordered per-vertex attribute layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VertexFormat {
    elements: Vec<VertexElement>,
}

impl VertexFormat {
    pub fn new(elements: Vec<VertexElement>) -> Self {
        Self { elements }
    }

    pub(crate) fn read<R: Read + Seek>(stream: &mut BundleStream<R>) -> Result<Self> {
        let count = stream.read_u32("vertex element count")?;
        if count == 0 {
            return Err(GpbError::NoVertexElements);
        }
        let mut elements = Vec::new();
        for index in 0..count {
            let usage = stream.read_u32("vertex usage")?;
            let components = stream.read_u32("vertex size")?;
            if components == 0 {
                return Err(GpbError::BadVertexElement { index });
            }
            elements.push(VertexElement::new(VertexUsage::from_raw(usage), components));
        }
        Ok(Self { elements })
    }

    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    /// Bytes per vertex.
    pub fn stride(&self) -> u32 {
        self.elements
            .iter()
            .fold(0u32, |stride, element| stride.saturating_add(element.byte_size()))
    }

    /// Byte offset of the first element with `usage`, if present.
    pub fn offset_of(&self, usage: VertexUsage) -> Option<(u32, VertexElement)> {
        let mut offset = 0;
        for element in &self.elements {
            if element.usage == usage {
                return Some((offset, *element));
            }
            offset = offset.saturating_add(element.byte_size());
        }
        None
    }
}
