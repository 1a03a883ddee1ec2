//! Decoder for the XML dump of a bundle's meshes.
//!
//! Meshes are the `Mesh` children of the `root` document element. Vertex
//! attributes live in one text blob where a `// position`, `// normal` or
//! `// texCoord` marker line announces the values on the following line.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use log::{debug, trace};
use serde::Serialize;
use xml::reader::{EventReader, ParserConfig, XmlEvent};

use crate::error::{GpbError, Result};
use crate::mesh::{BoundingBox, BoundingSphere, IndexFormat, MeshData, MeshPart, PrimitiveType};
use crate::vertex::{VertexElement, VertexFormat, VertexUsage};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct XmlBounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
    pub center: [f32; 3],
    pub radius: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct XmlMesh {
    pub id: String,
    /// Layout declared by the document. Informational; the attribute lists
    /// below are what the `vertices` blob actually contained.
    pub vertex_elements: Vec<VertexElement>,
    pub declared_vertex_count: Option<usize>,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub texcoords: Vec<[f32; 2]>,
    pub bounds: XmlBounds,
    pub primitive_type: Option<PrimitiveType>,
    pub indices: Vec<u32>,
}

impl XmlMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Repacks the mesh into the binary loader's interleaved layout.
    ///
    /// Normals and texcoords are optional, but when present there must be one
    /// per position.
    pub fn to_mesh_data(&self) -> Result<MeshData> {
        let count = self.positions.len();
        if count == 0 {
            return Err(GpbError::EmptyVertexData);
        }
        let has_normals = !self.normals.is_empty();
        let has_texcoords = !self.texcoords.is_empty();
        if (has_normals && self.normals.len() != count)
            || (has_texcoords && self.texcoords.len() != count)
        {
            return Err(GpbError::AttributeCountMismatch {
                mesh: self.id.clone(),
                positions: count,
                normals: self.normals.len(),
                texcoords: self.texcoords.len(),
            });
        }

        let mut elements = vec![VertexElement::new(VertexUsage::Position, 3)];
        if has_normals {
            elements.push(VertexElement::new(VertexUsage::Normal, 3));
        }
        if has_texcoords {
            elements.push(VertexElement::new(VertexUsage::TexCoord(0), 2));
        }
        let vertex_format = VertexFormat::new(elements);
        let vertex_count = self.count_u32("vertices", count)?;
        let index_count = self.count_u32("indices", self.indices.len())?;

        let mut vertex_data = Vec::with_capacity(count * vertex_format.stride() as usize);
        for (vertex, position) in self.positions.iter().enumerate() {
            push_floats(&mut vertex_data, position);
            if has_normals {
                push_floats(&mut vertex_data, &self.normals[vertex]);
            }
            if has_texcoords {
                push_floats(&mut vertex_data, &self.texcoords[vertex]);
            }
        }

        let mut index_data = Vec::with_capacity(self.indices.len() * 4);
        for index in &self.indices {
            index_data.extend_from_slice(&index.to_le_bytes());
        }
        let part = MeshPart {
            primitive_type: self.primitive_type.unwrap_or(PrimitiveType::Triangles),
            index_format: IndexFormat::Index32,
            index_count,
            index_data,
        };

        Ok(MeshData {
            vertex_format,
            vertex_count,
            vertex_data,
            bounding_box: BoundingBox {
                min: self.bounds.min,
                max: self.bounds.max,
            },
            bounding_sphere: BoundingSphere {
                center: self.bounds.center,
                radius: self.bounds.radius,
            },
            parts: vec![part],
            blend_shapes: BTreeMap::new(),
        })
    }

    fn count_u32(&self, what: &'static str, count: usize) -> Result<u32> {
        u32::try_from(count).map_err(|_| GpbError::CountOverflow {
            mesh: self.id.clone(),
            what,
            count,
        })
    }
}

fn push_floats(out: &mut Vec<u8>, values: &[f32]) {
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Vec<XmlMesh>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| GpbError::NotFound {
        path: path.to_path_buf(),
        source,
    })?;
    parse_reader(BufReader::new(file))
}

pub fn parse_str(text: &str) -> Result<Vec<XmlMesh>> {
    parse_reader(text.as_bytes())
}

/// Parses every `/root/Mesh` element in document order.
pub fn parse_reader<R: Read>(reader: R) -> Result<Vec<XmlMesh>> {
    let config = ParserConfig::new()
        .trim_whitespace(false)
        .whitespace_to_characters(true)
        .cdata_to_characters(true)
        .coalesce_characters(true);
    let events = EventReader::new_with_config(reader, config);

    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut current: Option<MeshBuilder> = None;
    let mut meshes = Vec::new();

    for event in events {
        match event? {
            XmlEvent::StartElement {
                name, attributes, ..
            } => {
                path.push(name.local_name);
                text.clear();
                let attribute = |key: &str| {
                    attributes
                        .iter()
                        .find(|attr| attr.name.local_name == key)
                        .map(|attr| attr.value.clone())
                };
                match element_path(&path).as_slice() {
                    ["root", "Mesh"] => {
                        current = Some(MeshBuilder::new(attribute("id").unwrap_or_default()));
                    }
                    ["root", "Mesh", "vertices"] => {
                        if let Some(builder) = current.as_mut() {
                            builder.mesh.declared_vertex_count =
                                attribute("count").and_then(|count| count.trim().parse().ok());
                        }
                    }
                    ["root", "Mesh", "MeshPart"] => {
                        if let Some(builder) = current.as_mut() {
                            builder.parts_seen += 1;
                        }
                    }
                    _ => {}
                }
            }
            XmlEvent::Characters(chunk) => {
                if current.is_some() {
                    text.push_str(&chunk);
                }
            }
            XmlEvent::EndElement { .. } => {
                if path.len() == 2 && path[0] == "root" && path[1] == "Mesh" {
                    if let Some(builder) = current.take() {
                        meshes.push(builder.finish()?);
                    }
                } else if let Some(builder) = current.as_mut() {
                    match element_path(&path).as_slice() {
                        ["root", "Mesh", "VertexElement", "usage"] => {
                            builder.pending_usage = Some(text.trim().to_string());
                        }
                        ["root", "Mesh", "VertexElement", "size"] => {
                            builder.pending_size = Some(text.trim().to_string());
                        }
                        ["root", "Mesh", "VertexElement"] => builder.finish_vertex_element(),
                        ["root", "Mesh", "vertices"] => builder.read_vertices(&text)?,
                        ["root", "Mesh", "bounds", field] => builder.read_bound(field, &text)?,
                        // Only the first part is kept.
                        ["root", "Mesh", "MeshPart", "indices"] if builder.parts_seen == 1 => {
                            builder.read_indices(&text)?;
                        }
                        ["root", "Mesh", "MeshPart", "primitiveType"] if builder.parts_seen == 1 => {
                            builder.mesh.primitive_type = parse_primitive_type(text.trim());
                        }
                        _ => {}
                    }
                }
                path.pop();
                text.clear();
            }
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }

    debug!("parsed {} xml meshes", meshes.len());
    Ok(meshes)
}

fn element_path(path: &[String]) -> Vec<&str> {
    path.iter().map(String::as_str).collect()
}

struct MeshBuilder {
    mesh: XmlMesh,
    parts_seen: usize,
    pending_usage: Option<String>,
    pending_size: Option<String>,
    min: Option<[f32; 3]>,
    max: Option<[f32; 3]>,
    center: Option<[f32; 3]>,
    radius: Option<f32>,
}

impl MeshBuilder {
    fn new(id: String) -> Self {
        Self {
            mesh: XmlMesh {
                id,
                ..XmlMesh::default()
            },
            parts_seen: 0,
            pending_usage: None,
            pending_size: None,
            min: None,
            max: None,
            center: None,
            radius: None,
        }
    }

    fn finish_vertex_element(&mut self) {
        let usage = self.pending_usage.take();
        let size = self.pending_size.take();
        let element = usage
            .as_deref()
            .and_then(parse_usage)
            .zip(size.as_deref().and_then(|size| size.parse::<u32>().ok()));
        match element {
            Some((usage, components)) => {
                self.mesh.vertex_elements.push(VertexElement::new(usage, components));
            }
            None => debug!(
                "mesh '{}': ignoring vertex element {usage:?}/{size:?}",
                self.mesh.id
            ),
        }
    }

    fn read_vertices(&mut self, text: &str) -> Result<()> {
        if let Some(count) = self.mesh.declared_vertex_count {
            self.mesh.positions.reserve(count);
        }
        let mut lines = text.lines();
        let mut skipped = 0usize;
        while let Some(line) = lines.next() {
            let marker = line.trim_start();
            if marker.starts_with("// position") {
                let values = self.floats::<3>(lines.next())?;
                self.mesh.positions.push(values);
            } else if marker.starts_with("// normal") {
                let values = self.floats::<3>(lines.next())?;
                self.mesh.normals.push(values);
            } else if marker.starts_with("// texCoord") {
                let values = self.floats::<2>(lines.next())?;
                self.mesh.texcoords.push(values);
            } else if !marker.is_empty() {
                skipped += 1;
            }
        }
        if skipped > 0 {
            trace!("mesh '{}': skipped {skipped} unrecognised vertex lines", self.mesh.id);
        }
        if let Some(declared) = self.mesh.declared_vertex_count {
            if declared != self.mesh.positions.len() {
                debug!(
                    "mesh '{}': declared {declared} vertices, found {}",
                    self.mesh.id,
                    self.mesh.positions.len()
                );
            }
        }
        Ok(())
    }

    /// First `N` floats of the line following a marker.
    fn floats<const N: usize>(&self, line: Option<&str>) -> Result<[f32; N]> {
        let mut tokens = line.unwrap_or_default().split_whitespace();
        let mut values = [0.0f32; N];
        for value in &mut values {
            let token = tokens.next().ok_or_else(|| GpbError::BadFloatToken {
                mesh: self.mesh.id.clone(),
                token: String::new(),
            })?;
            *value = self.parse_float(token)?;
        }
        Ok(values)
    }

    fn parse_float(&self, token: &str) -> Result<f32> {
        f32::from_str(token).map_err(|_| GpbError::BadFloatToken {
            mesh: self.mesh.id.clone(),
            token: token.to_string(),
        })
    }

    fn read_bound(&mut self, field: &str, text: &str) -> Result<()> {
        match field {
            "min" => self.min = Some(self.vec3("min", text)?),
            "max" => self.max = Some(self.vec3("max", text)?),
            "center" => self.center = Some(self.vec3("center", text)?),
            "radius" => {
                let mut tokens = text.split_whitespace();
                match (tokens.next(), tokens.next()) {
                    (Some(token), None) => self.radius = Some(self.parse_float(token)?),
                    _ => return Err(self.bad_bounds("radius")),
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn vec3(&self, field: &'static str, text: &str) -> Result<[f32; 3]> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let [x, y, z] = tokens.as_slice() else {
            return Err(self.bad_bounds(field));
        };
        Ok([self.parse_float(x)?, self.parse_float(y)?, self.parse_float(z)?])
    }

    fn bad_bounds(&self, field: &'static str) -> GpbError {
        GpbError::BadBounds {
            mesh: self.mesh.id.clone(),
            field,
        }
    }

    fn read_indices(&mut self, text: &str) -> Result<()> {
        for token in text.split_whitespace() {
            let index = token.parse::<u32>().map_err(|_| GpbError::BadIndexToken {
                mesh: self.mesh.id.clone(),
                token: token.to_string(),
            })?;
            self.mesh.indices.push(index);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<XmlMesh> {
        self.mesh.bounds = XmlBounds {
            min: self.min.ok_or_else(|| self.bad_bounds("min"))?,
            max: self.max.ok_or_else(|| self.bad_bounds("max"))?,
            center: self.center.ok_or_else(|| self.bad_bounds("center"))?,
            radius: self.radius.ok_or_else(|| self.bad_bounds("radius"))?,
        };
        trace!(
            "xml mesh '{}': {} vertices, {} indices",
            self.mesh.id,
            self.mesh.positions.len(),
            self.mesh.indices.len()
        );
        Ok(self.mesh)
    }
}

/// Accepts both the symbolic names the exporter writes and raw usage codes.
fn parse_usage(text: &str) -> Option<VertexUsage> {
    let usage = match text {
        "POSITION" => VertexUsage::Position,
        "NORMAL" => VertexUsage::Normal,
        "COLOR" => VertexUsage::Color,
        "TANGENT" => VertexUsage::Tangent,
        "BINORMAL" => VertexUsage::Binormal,
        "BLENDWEIGHTS" => VertexUsage::BlendWeights,
        "BLENDINDICES" => VertexUsage::BlendIndices,
        other => match other.strip_prefix("TEXCOORD") {
            Some(slot) => VertexUsage::TexCoord(slot.parse().ok().filter(|&slot: &u8| slot < 8)?),
            None => VertexUsage::from_raw(other.parse().ok()?),
        },
    };
    Some(usage)
}

fn parse_primitive_type(text: &str) -> Option<PrimitiveType> {
    match text {
        "POINTS" => Some(PrimitiveType::Points),
        "LINES" => Some(PrimitiveType::Lines),
        "LINE_STRIP" => Some(PrimitiveType::LineStrip),
        "TRIANGLES" => Some(PrimitiveType::Triangles),
        "TRIANGLE_STRIP" => Some(PrimitiveType::TriangleStrip),
        other => other.parse().ok().map(PrimitiveType::from_raw),
    }
}
