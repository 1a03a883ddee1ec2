//! Byte-level writer for GPB fixtures.
//!
//! Objects are appended to a body buffer and registered with `mark`; the
//! reference table is laid out in `finish`, once every id is known, and each
//! body offset is shifted past it.

#![allow(dead_code)]

use std::io::Write;

use tempfile::NamedTempFile;

pub const PLAIN: [u8; 9] = *b"\xABGPB\xBB\r\n\x1A\n";
pub const EXTENDED: [u8; 9] = *b"\xABGPB\xBB\r\n\x1B\n";

pub const SCENE: u32 = 1;
pub const NODE: u32 = 2;
pub const ANIMATIONS: u32 = 3;
pub const MESH: u32 = 34;

pub const NODE_PLAIN: u32 = 1;
pub const NODE_JOINT: u32 = 2;

pub const INDEX16: u32 = 0x1403;
pub const TRIANGLES: u32 = 4;

pub const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

pub struct BundleBuilder {
    signature: [u8; 9],
    version: (u8, u8),
    refs: Vec<(String, u32, usize)>,
    body: Vec<u8>,
}

impl BundleBuilder {
    pub fn plain() -> Self {
        Self::with_signature(PLAIN)
    }

    pub fn extended() -> Self {
        Self::with_signature(EXTENDED)
    }

    fn with_signature(signature: [u8; 9]) -> Self {
        Self {
            signature,
            version: (1, 2),
            refs: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn version(mut self, major: u8, minor: u8) -> Self {
        self.version = (major, minor);
        self
    }

    pub fn is_extended(&self) -> bool {
        self.signature == EXTENDED
    }

    /// Registers `id` at the current end of the body.
    pub fn mark(&mut self, id: &str, object_type: u32) -> &mut Self {
        self.refs.push((id.to_string(), object_type, self.body.len()));
        self
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.body.push(value);
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.body.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn f32s(&mut self, values: &[f32]) -> &mut Self {
        for value in values {
            self.body.extend_from_slice(&value.to_le_bytes());
        }
        self
    }

    pub fn string(&mut self, value: &str) -> &mut Self {
        self.u32(value.len() as u32);
        self.body.extend_from_slice(value.as_bytes());
        self
    }

    pub fn scene_start(&mut self, id: &str, root_count: u32) -> &mut Self {
        self.mark(id, SCENE).u32(root_count)
    }

    pub fn scene_end(&mut self, camera_xref: &str, ambient: [f32; 3]) -> &mut Self {
        self.string(camera_xref).f32s(&ambient)
    }

    /// Node header up to and including the child count.
    pub fn node_start(&mut self, id: &str, node_type: u32, child_count: u32) -> &mut Self {
        self.node_start_with(id, node_type, &IDENTITY, child_count)
    }

    pub fn node_start_with(
        &mut self,
        id: &str,
        node_type: u32,
        transform: &[f32; 16],
        child_count: u32,
    ) -> &mut Self {
        self.mark(id, NODE)
            .u32(node_type)
            .f32s(transform)
            .string("")
            .u32(child_count)
    }

    /// Camera, light and model blocks all absent.
    pub fn node_end(&mut self) -> &mut Self {
        self.u8(0).u8(0).string("")
    }

    /// A childless plain node with nothing attached.
    pub fn leaf(&mut self, id: &str) -> &mut Self {
        self.node_start(id, NODE_PLAIN, 0).node_end()
    }

    /// Camera and light absent, then a model block for `mesh_id`.
    pub fn node_end_with_model(&mut self, mesh_id: &str, materials: &[&str]) -> &mut Self {
        self.u8(0).u8(0).string(&format!("#{mesh_id}"));
        if self.version >= (9, 1) {
            self.u8(0);
        }
        self.u8(0).materials(materials)
    }

    pub fn materials(&mut self, materials: &[&str]) -> &mut Self {
        self.u32(materials.len() as u32);
        for material in materials {
            self.string(material);
        }
        self
    }

    /// Skin block with identity bind shape and bind poses.
    pub fn skin(&mut self, joints: &[&str]) -> &mut Self {
        self.f32s(&IDENTITY).u32(joints.len() as u32);
        for joint in joints {
            self.string(&format!("#{joint}"));
        }
        self.u32(joints.len() as u32 * 16);
        for _ in joints {
            self.f32s(&IDENTITY);
        }
        self
    }

    /// Position-only triangle with one INDEX16 triangle list. Extended
    /// bundles get an empty blend-shape block.
    pub fn triangle_mesh(&mut self, id: &str) -> &mut Self {
        self.triangle_mesh_body(id);
        if self.is_extended() {
            self.u32(0);
        }
        self
    }

    pub fn triangle_mesh_body(&mut self, id: &str) -> &mut Self {
        self.mark(id, MESH)
            .u32(1)
            .u32(1)
            .u32(3)
            .u32(36)
            .f32s(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
            .f32s(&[0.0, 0.0, 0.0, 1.0, 1.0, 0.0])
            .f32s(&[0.5, 0.5, 0.0, 0.75])
            .u32(1)
            .u32(TRIANGLES)
            .u32(INDEX16)
            .u32(6);
        for index in [0u16, 1, 2] {
            self.body.extend_from_slice(&index.to_le_bytes());
        }
        self
    }

    /// One blend shape touching every vertex of the triangle.
    pub fn blend_shape(&mut self, name: &str, has_normals: bool) -> &mut Self {
        self.u32(name.len() as u32 + 1);
        self.body.extend_from_slice(name.as_bytes());
        self.body.push(0);
        self.u32(3).u32(0).u32(1).u32(2).u32(u32::from(has_normals));
        let floats = if has_normals { 18 } else { 9 };
        self.f32s(&vec![0.1; floats])
    }

    pub fn finish(&self) -> Vec<u8> {
        let header_len = self.signature.len()
            + 2
            + 4
            + self
                .refs
                .iter()
                .map(|(id, _, _)| 4 + id.len() + 8)
                .sum::<usize>();

        let mut data = self.signature.to_vec();
        data.push(self.version.0);
        data.push(self.version.1);
        data.extend_from_slice(&(self.refs.len() as u32).to_le_bytes());
        for (id, object_type, body_offset) in &self.refs {
            data.extend_from_slice(&(id.len() as u32).to_le_bytes());
            data.extend_from_slice(id.as_bytes());
            data.extend_from_slice(&object_type.to_le_bytes());
            data.extend_from_slice(&((header_len + body_offset) as u32).to_le_bytes());
        }
        assert_eq!(data.len(), header_len);
        data.extend_from_slice(&self.body);
        data
    }

    pub fn write_temp(&self) -> NamedTempFile {
        write_temp(&self.finish())
    }
}

pub fn write_temp(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(bytes).expect("write fixture");
    file.flush().expect("flush fixture");
    file
}
