use std::collections::BTreeMap;
use std::io::{Read, Seek};

use log::{debug, warn};
use serde::Serialize;

use crate::error::{GpbError, Result};
use crate::stream::BundleStream;
use crate::vertex::{VertexFormat, VertexUsage};

/// Index element encodings, tagged with the GL type codes the exporter writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IndexFormat {
    Index8,
    Index16,
    Index32,
}

impl IndexFormat {
    pub const INDEX8: u32 = 0x1401;
    pub const INDEX16: u32 = 0x1403;
    pub const INDEX32: u32 = 0x1405;

    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            Self::INDEX8 => Some(IndexFormat::Index8),
            Self::INDEX16 => Some(IndexFormat::Index16),
            Self::INDEX32 => Some(IndexFormat::Index32),
            _ => None,
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            IndexFormat::Index8 => Self::INDEX8,
            IndexFormat::Index16 => Self::INDEX16,
            IndexFormat::Index32 => Self::INDEX32,
        }
    }

    /// Bytes per index.
    pub fn width(self) -> usize {
        match self {
            IndexFormat::Index8 => 1,
            IndexFormat::Index16 => 2,
            IndexFormat::Index32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PrimitiveType {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
    Other(u32),
}

impl PrimitiveType {
    pub fn from_raw(value: u32) -> Self {
        match value {
            0 => PrimitiveType::Points,
            1 => PrimitiveType::Lines,
            3 => PrimitiveType::LineStrip,
            4 => PrimitiveType::Triangles,
            5 => PrimitiveType::TriangleStrip,
            other => PrimitiveType::Other(other),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            PrimitiveType::Points => 0,
            PrimitiveType::Lines => 1,
            PrimitiveType::LineStrip => 3,
            PrimitiveType::Triangles => 4,
            PrimitiveType::TriangleStrip => 5,
            PrimitiveType::Other(value) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BoundingSphere {
    pub center: [f32; 3],
    pub radius: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshPart {
    pub primitive_type: PrimitiveType,
    pub index_format: IndexFormat,
    pub index_count: u32,
    pub index_data: Vec<u8>,
}

impl MeshPart {
    fn read<R: Read + Seek>(stream: &mut BundleStream<R>, part: u32) -> Result<Self> {
        let primitive_type = PrimitiveType::from_raw(stream.read_u32("primitive type")?);
        let raw_format = stream.read_u32("index format")?;
        let byte_count = stream.read_u32("index byte count")?;
        let index_format = IndexFormat::from_raw(raw_format).ok_or(GpbError::BadIndexFormat {
            part,
            value: raw_format,
        })?;
        let index_count = byte_count / index_format.width() as u32;
        let index_data = stream.read_bytes(byte_count as usize, "index data")?;
        Ok(Self {
            primitive_type,
            index_format,
            index_count,
            index_data,
        })
    }

    /// Decodes the raw index buffer, widening every entry to `u32`.
    pub fn indices(&self) -> Vec<u32> {
        let bytes = &self.index_data;
        match self.index_format {
            IndexFormat::Index8 => bytes.iter().map(|&b| u32::from(b)).collect(),
            IndexFormat::Index16 => bytes
                .chunks_exact(2)
                .map(|c| u32::from(u16::from_le_bytes([c[0], c[1]])))
                .collect(),
            IndexFormat::Index32 => bytes
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        }
    }
}

/// Named per-vertex deltas layered over the base mesh.
///
/// `deltas` holds `indices.len() * 3` floats, doubled when normals are
/// present; the layout inside that block is left to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendShape {
    pub name: String,
    pub has_normals: bool,
    pub indices: Vec<u32>,
    pub deltas: Vec<f32>,
}

/// First index that points past the vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidIndex {
    pub part: usize,
    pub position: usize,
    pub index: u32,
    pub vertex_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub vertex_format: VertexFormat,
    pub vertex_count: u32,
    pub vertex_data: Vec<u8>,
    pub bounding_box: BoundingBox,
    pub bounding_sphere: BoundingSphere,
    pub parts: Vec<MeshPart>,
    pub blend_shapes: BTreeMap<String, BlendShape>,
}

impl MeshData {
    /// Decodes a MESH object at the current stream position.
    ///
    /// The blend-shape block is only present in extended bundles.
    pub(crate) fn read<R: Read + Seek>(stream: &mut BundleStream<R>, extended: bool) -> Result<Self> {
        let vertex_format = VertexFormat::read(stream)?;
        let stride = vertex_format.stride();

        let byte_count = stream.read_u32("vertex byte count")?;
        if byte_count == 0 {
            return Err(GpbError::EmptyVertexData);
        }
        if byte_count % stride != 0 {
            return Err(GpbError::MisalignedVertexData { byte_count, stride });
        }
        let vertex_count = byte_count / stride;
        let vertex_data = stream.read_bytes(byte_count as usize, "vertex data")?;

        let bounding_box = BoundingBox {
            min: stream.read_vec3("bounding box")?,
            max: stream.read_vec3("bounding box")?,
        };
        let bounding_sphere = BoundingSphere {
            center: stream.read_vec3("bounding sphere")?,
            radius: stream.read_f32("bounding sphere radius")?,
        };

        let part_count = stream.read_u32("mesh part count")?;
        let mut parts = Vec::new();
        for part in 0..part_count {
            parts.push(MeshPart::read(stream, part)?);
        }

        let blend_shapes = if extended {
            read_blend_shapes(stream)?
        } else {
            BTreeMap::new()
        };

        debug!(
            "decoded mesh: {vertex_count} vertices, stride {stride}, {} parts, {} blend shapes",
            parts.len(),
            blend_shapes.len()
        );

        Ok(Self {
            vertex_format,
            vertex_count,
            vertex_data,
            bounding_box,
            bounding_sphere,
            parts,
            blend_shapes,
        })
    }

    pub fn stride(&self) -> u32 {
        self.vertex_format.stride()
    }

    /// Extracts one attribute for every vertex as a flat float list.
    pub fn attribute(&self, usage: VertexUsage) -> Option<Vec<f32>> {
        let (offset, element) = self.vertex_format.offset_of(usage)?;
        let stride = self.stride() as usize;
        if stride == 0 {
            return None;
        }
        let offset = offset as usize;
        let width = element.byte_size() as usize;
        let mut values = Vec::with_capacity(self.vertex_count as usize * element.components as usize);
        for vertex in self.vertex_data.chunks_exact(stride) {
            values.extend(
                vertex[offset..offset + width]
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            );
        }
        Some(values)
    }

    /// Positions as xyz triples; `None` unless the format has 3+ position components.
    pub fn positions(&self) -> Option<Vec<[f32; 3]>> {
        let (_, element) = self.vertex_format.offset_of(VertexUsage::Position)?;
        if element.components < 3 {
            return None;
        }
        let components = element.components as usize;
        let flat = self.attribute(VertexUsage::Position)?;
        Some(
            flat.chunks_exact(components)
                .map(|p| [p[0], p[1], p[2]])
                .collect(),
        )
    }

    /// Validation pass over every part; decoding does not check index ranges.
    pub fn first_invalid_index(&self) -> Option<InvalidIndex> {
        self.parts.iter().enumerate().find_map(|(part, mesh_part)| {
            mesh_part
                .indices()
                .into_iter()
                .enumerate()
                .find(|&(_, index)| index >= self.vertex_count)
                .map(|(position, index)| InvalidIndex {
                    part,
                    position,
                    index,
                    vertex_count: self.vertex_count,
                })
        })
    }
}

fn read_blend_shapes<R: Read + Seek>(
    stream: &mut BundleStream<R>,
) -> Result<BTreeMap<String, BlendShape>> {
    let count = stream.read_u32("blend shape count")?;
    let mut shapes = BTreeMap::new();
    for index in 0..count {
        let name_length = stream.read_u32("blend shape name length")?;
        if name_length == 0 {
            return Err(GpbError::BadBlendShape {
                index,
                reason: "empty name",
            });
        }
        let raw_name = stream.read_bytes(name_length as usize, "blend shape name")?;
        // Names are NUL-terminated inside their declared length.
        let end = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
        let name = String::from_utf8_lossy(&raw_name[..end]).into_owned();

        let vertex_count = stream.read_u32("blend shape vertex count")?;
        let indices = stream.read_u32_array(vertex_count, "blend shape indices")?;
        let has_normals = stream.read_bool32("blend shape normal flag")?;
        let vectors = if has_normals { 2 } else { 1 };
        let deltas = stream.read_f32_array(
            u64::from(vertex_count) * vectors * 3,
            "blend shape deltas",
        )?;

        let shape = BlendShape {
            name: name.clone(),
            has_normals,
            indices,
            deltas,
        };
        if shapes.insert(name.clone(), shape).is_some() {
            warn!("blend shape '{name}' appears twice; keeping the later entry");
        }
    }
    Ok(shapes)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn push_u32(data: &mut Vec<u8>, value: u32) {
        data.extend_from_slice(&value.to_le_bytes());
    }

    fn push_f32s(data: &mut Vec<u8>, values: &[f32]) {
        for value in values {
            data.extend_from_slice(&value.to_le_bytes());
        }
    }

    /// Position-only triangle with one INDEX16 part.
    fn triangle_mesh() -> Vec<u8> {
        let mut data = Vec::new();
        push_u32(&mut data, 1);
        push_u32(&mut data, 1); // POSITION
        push_u32(&mut data, 3);
        push_u32(&mut data, 36);
        push_f32s(&mut data, &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        push_f32s(&mut data, &[0.0, 0.0, 0.0, 1.0, 1.0, 0.0]);
        push_f32s(&mut data, &[0.5, 0.5, 0.0, 0.75]);
        push_u32(&mut data, 1);
        push_u32(&mut data, 4); // TRIANGLES
        push_u32(&mut data, IndexFormat::INDEX16);
        push_u32(&mut data, 6);
        for index in [0u16, 1, 2] {
            data.extend_from_slice(&index.to_le_bytes());
        }
        data
    }

    fn decode(data: Vec<u8>, extended: bool) -> Result<MeshData> {
        let mut stream = BundleStream::new(Cursor::new(data))?;
        MeshData::read(&mut stream, extended)
    }

    #[test]
    fn decodes_position_only_triangle() {
        let mesh = decode(triangle_mesh(), false).unwrap();
        assert_eq!(mesh.stride(), 12);
        assert_eq!(mesh.vertex_count, 3);
        assert_eq!(mesh.vertex_count * mesh.stride(), mesh.vertex_data.len() as u32);
        assert_eq!(mesh.bounding_sphere.radius, 0.75);
        assert_eq!(mesh.parts.len(), 1);
        assert_eq!(mesh.parts[0].index_count, 3);
        assert_eq!(mesh.parts[0].primitive_type, PrimitiveType::Triangles);
        assert_eq!(mesh.parts[0].indices(), vec![0, 1, 2]);
        assert_eq!(mesh.positions().unwrap()[1], [1.0, 0.0, 0.0]);
        assert!(mesh.first_invalid_index().is_none());
        assert!(mesh.blend_shapes.is_empty());
    }

    #[test]
    fn rejects_vertex_bytes_not_divisible_by_stride() {
        let mut data = triangle_mesh();
        data[12..16].copy_from_slice(&35u32.to_le_bytes());
        let err = decode(data, false).unwrap_err();
        assert!(matches!(
            err,
            GpbError::MisalignedVertexData {
                byte_count: 35,
                stride: 12
            }
        ));
    }

    #[test]
    fn rejects_zero_vertex_bytes() {
        let mut data = triangle_mesh();
        data[12..16].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(decode(data, false), Err(GpbError::EmptyVertexData)));
    }

    #[test]
    fn rejects_zero_component_element() {
        let mut data = triangle_mesh();
        data[8..12].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            decode(data, false),
            Err(GpbError::BadVertexElement { index: 0 })
        ));
    }

    #[test]
    fn rejects_empty_vertex_format() {
        let mut data = Vec::new();
        push_u32(&mut data, 0);
        assert!(matches!(decode(data, false), Err(GpbError::NoVertexElements)));
    }

    #[test]
    fn index_format_codes_map_to_widths() {
        assert_eq!(IndexFormat::from_raw(0x1401).map(IndexFormat::width), Some(1));
        assert_eq!(IndexFormat::from_raw(0x1403).map(IndexFormat::width), Some(2));
        assert_eq!(IndexFormat::from_raw(0x1405).map(IndexFormat::width), Some(4));
        assert_eq!(IndexFormat::from_raw(16), None);
        assert_eq!(IndexFormat::from_raw(0x1404), None);
    }

    #[test]
    fn unknown_index_format_fails_the_mesh() {
        let mut data = triangle_mesh();
        let format_at = data.len() - 6 - 8;
        data[format_at..format_at + 4].copy_from_slice(&0x1404u32.to_le_bytes());
        let err = decode(data, false).unwrap_err();
        assert!(matches!(
            err,
            GpbError::BadIndexFormat {
                part: 0,
                value: 0x1404
            }
        ));
    }

    #[test]
    fn reports_out_of_range_indices_on_request() {
        let mut data = triangle_mesh();
        let last = data.len() - 2;
        data[last..].copy_from_slice(&7u16.to_le_bytes());
        let mesh = decode(data, false).unwrap();
        let invalid = mesh.first_invalid_index().unwrap();
        assert_eq!((invalid.part, invalid.position, invalid.index), (0, 2, 7));
    }

    fn push_blend_shape(data: &mut Vec<u8>, name: &str, has_normals: bool) {
        push_u32(data, name.len() as u32 + 1);
        data.extend_from_slice(name.as_bytes());
        data.push(0);
        push_u32(data, 2);
        push_u32(data, 0);
        push_u32(data, 2);
        push_u32(data, u32::from(has_normals));
        let floats = if has_normals { 12 } else { 6 };
        push_f32s(data, &vec![0.25; floats]);
    }

    #[test]
    fn extended_meshes_carry_blend_shapes() {
        let mut data = triangle_mesh();
        push_u32(&mut data, 2);
        push_blend_shape(&mut data, "blink", false);
        push_blend_shape(&mut data, "smile", true);

        let mesh = decode(data, true).unwrap();
        assert_eq!(mesh.blend_shapes.len(), 2);
        let smile = &mesh.blend_shapes["smile"];
        assert!(smile.has_normals);
        assert_eq!(smile.indices, vec![0, 2]);
        assert_eq!(smile.deltas.len(), 12);
        assert_eq!(mesh.blend_shapes["blink"].deltas.len(), 6);
    }

    #[test]
    fn duplicate_blend_shape_names_keep_the_last() {
        let mut data = triangle_mesh();
        push_u32(&mut data, 2);
        push_blend_shape(&mut data, "blink", false);
        push_blend_shape(&mut data, "blink", true);
        let mesh = decode(data, true).unwrap();
        assert_eq!(mesh.blend_shapes.len(), 1);
        assert!(mesh.blend_shapes["blink"].has_normals);
    }

    #[test]
    fn truncated_blend_shape_fails_whole_mesh() {
        let mut data = triangle_mesh();
        push_u32(&mut data, 1);
        push_blend_shape(&mut data, "blink", true);
        data.truncate(data.len() - 4);
        assert!(matches!(decode(data, true), Err(GpbError::Truncated { .. })));
    }

    #[test]
    fn blend_shape_name_must_not_be_empty() {
        let mut data = triangle_mesh();
        push_u32(&mut data, 1);
        push_u32(&mut data, 0);
        assert!(matches!(
            decode(data, true),
            Err(GpbError::BadBlendShape { index: 0, .. })
        ));
    }

    #[test]
    fn plain_meshes_have_no_blend_shape_block() {
        let mut data = triangle_mesh();
        push_u32(&mut data, 0xffff_ffff);
        let mut stream = BundleStream::new(Cursor::new(data)).unwrap();
        let mesh = MeshData::read(&mut stream, false).unwrap();
        assert!(mesh.blend_shapes.is_empty());
        assert_eq!(stream.read_u32("trailer").unwrap(), 0xffff_ffff);
    }
}
