use std::io::{Read, Seek};
use std::ops::Index;

use glam::{Mat4, Quat, Vec3};
use serde::Serialize;

use crate::animation::Animation;
use crate::error::{GpbError, Result};
use crate::mesh::MeshData;
use crate::stream::BundleStream;

/// Index of a node inside its owning [`Scene`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeHandle(pub(crate) usize);

impl NodeHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeType {
    Node,
    /// Skin binding target; structurally identical to a plain node.
    Joint,
}

impl NodeType {
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            1 => Some(NodeType::Node),
            2 => Some(NodeType::Joint),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Camera {
    Perspective {
        aspect_ratio: f32,
        near_plane: f32,
        far_plane: f32,
        field_of_view: f32,
    },
    Orthographic {
        aspect_ratio: f32,
        near_plane: f32,
        far_plane: f32,
        zoom_x: f32,
        zoom_y: f32,
    },
}

impl Camera {
    /// Reads a camera block; a zero type byte means no camera.
    pub(crate) fn read<R: Read + Seek>(stream: &mut BundleStream<R>) -> Result<Option<Self>> {
        let kind = stream.read_u8("camera type")?;
        if kind == 0 {
            return Ok(None);
        }
        let aspect_ratio = stream.read_f32("camera aspect ratio")?;
        let near_plane = stream.read_f32("camera near plane")?;
        let far_plane = stream.read_f32("camera far plane")?;
        let camera = match kind {
            1 => Camera::Perspective {
                aspect_ratio,
                near_plane,
                far_plane,
                field_of_view: stream.read_f32("camera field of view")?,
            },
            2 => Camera::Orthographic {
                aspect_ratio,
                near_plane,
                far_plane,
                zoom_x: stream.read_f32("camera zoom x")?,
                zoom_y: stream.read_f32("camera zoom y")?,
            },
            other => return Err(GpbError::UnknownCameraType(other)),
        };
        Ok(Some(camera))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Light {
    Directional {
        color: [f32; 3],
    },
    Point {
        color: [f32; 3],
        range: f32,
    },
    Spot {
        color: [f32; 3],
        range: f32,
        inner_angle: f32,
        outer_angle: f32,
    },
}

impl Light {
    /// Reads a light block; a zero type byte means no light.
    pub(crate) fn read<R: Read + Seek>(stream: &mut BundleStream<R>) -> Result<Option<Self>> {
        let kind = stream.read_u8("light type")?;
        if kind == 0 {
            return Ok(None);
        }
        let color = stream.read_vec3("light color")?;
        let light = match kind {
            1 => Light::Directional { color },
            2 => Light::Point {
                color,
                range: stream.read_f32("point light range")?,
            },
            3 => Light::Spot {
                color,
                range: stream.read_f32("spot light range")?,
                inner_angle: stream.read_f32("spot light inner angle")?,
                outer_angle: stream.read_f32("spot light outer angle")?,
            },
            other => return Err(GpbError::UnknownLightType(other)),
        };
        Ok(Some(light))
    }
}

/// Skin binding attached to a model.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshSkin {
    pub bind_shape: [f32; 16],
    /// Joint node ids in binding order, xref prefix removed.
    pub joint_ids: Vec<String>,
    /// One inverse bind pose per joint, or empty when the file omits them.
    pub bind_poses: Vec<[f32; 16]>,
    /// Filled once the whole graph is built; `None` for joints not in the scene.
    pub joints: Vec<Option<NodeHandle>>,
}

impl MeshSkin {
    pub(crate) fn read<R: Read + Seek>(stream: &mut BundleStream<R>) -> Result<Self> {
        let bind_shape = stream.read_matrix("skin bind shape")?;
        let joint_count = read_joint_count(stream)?;
        let mut joint_ids = Vec::new();
        for _ in 0..joint_count {
            let xref = stream.read_string("skin joint xref")?;
            let id = xref.strip_prefix('#').unwrap_or(&xref).to_string();
            joint_ids.push(id);
        }
        let pose_floats = read_bind_pose_count(stream, joint_count)?;
        let mut bind_poses = Vec::new();
        if pose_floats > 0 {
            for _ in 0..joint_count {
                bind_poses.push(stream.read_matrix("skin bind pose")?);
            }
        }
        Ok(Self {
            bind_shape,
            joints: vec![None; joint_ids.len()],
            joint_ids,
            bind_poses,
        })
    }

    pub(crate) fn skip<R: Read + Seek>(stream: &mut BundleStream<R>) -> Result<()> {
        stream.skip(64, "skin bind shape")?;
        let joint_count = read_joint_count(stream)?;
        for _ in 0..joint_count {
            stream.skip_string("skin joint xref")?;
        }
        let pose_floats = read_bind_pose_count(stream, joint_count)?;
        stream.skip(u64::from(pose_floats) * 4, "skin bind poses")
    }
}

fn read_joint_count<R: Read + Seek>(stream: &mut BundleStream<R>) -> Result<u32> {
    let joint_count = stream.read_u32("skin joint count")?;
    if joint_count == 0 {
        return Err(GpbError::BadSkin("skin declares no joints".to_string()));
    }
    Ok(joint_count)
}

fn read_bind_pose_count<R: Read + Seek>(stream: &mut BundleStream<R>, joint_count: u32) -> Result<u32> {
    let pose_floats = stream.read_u32("skin bind pose count")?;
    if pose_floats > 0 && u64::from(pose_floats) != u64::from(joint_count) * 16 {
        return Err(GpbError::BadSkin(format!(
            "{pose_floats} bind pose floats for {joint_count} joints"
        )));
    }
    Ok(pose_floats)
}

/// Drawable attachment of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub mesh_id: String,
    pub mesh: MeshData,
    pub has_vertex_animation_cache: bool,
    pub skin: Option<MeshSkin>,
    pub materials: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub node_type: NodeType,
    /// Local transform as stored in the bundle (column-major).
    pub transform: [f32; 16],
    pub children: Vec<NodeHandle>,
    pub camera: Option<Camera>,
    pub light: Option<Light>,
    pub model: Option<Model>,
}

impl Node {
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_cols_array(&self.transform)
    }

    /// Splits the local transform into scale, rotation and translation.
    pub fn decompose(&self) -> (Vec3, Quat, Vec3) {
        self.matrix().to_scale_rotation_translation()
    }

    pub fn is_joint(&self) -> bool {
        self.node_type == NodeType::Joint
    }
}

/// A decoded scene graph.
///
/// Nodes live in a flat arena; a node shared by several parents appears once
/// in the arena and is referenced by handle from each of them.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub(crate) id: String,
    pub(crate) roots: Vec<NodeHandle>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) active_camera: Option<String>,
    pub(crate) ambient_color: [f32; 3],
    pub(crate) animations: Vec<Animation>,
}

impl Scene {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn roots(&self) -> &[NodeHandle] {
        &self.roots
    }

    /// Every decoded node in decode-completion order (children before parents).
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle.0)
    }

    pub fn find_node(&self, id: &str) -> Option<NodeHandle> {
        self.nodes
            .iter()
            .position(|node| node.id == id)
            .map(NodeHandle)
    }

    /// Id of the active camera node named by the scene, if any.
    pub fn active_camera(&self) -> Option<&str> {
        self.active_camera.as_deref()
    }

    pub fn ambient_color(&self) -> [f32; 3] {
        self.ambient_color
    }

    pub fn animations(&self) -> &[Animation] {
        &self.animations
    }

    pub fn drawables(&self) -> impl Iterator<Item = (NodeHandle, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.model.is_some())
            .map(|(index, node)| (NodeHandle(index), node))
    }

    /// Depth-first walk from the roots; shared nodes are visited once per parent.
    pub fn walk(&self, mut visit: impl FnMut(usize, NodeHandle, &Node)) {
        let mut pending: Vec<(usize, NodeHandle)> =
            self.roots.iter().rev().map(|&handle| (0, handle)).collect();
        while let Some((depth, handle)) = pending.pop() {
            let Some(node) = self.get(handle) else {
                continue;
            };
            visit(depth, handle, node);
            pending.extend(node.children.iter().rev().map(|&child| (depth + 1, child)));
        }
    }
}

impl Index<NodeHandle> for Scene {
    type Output = Node;

    fn index(&self, handle: NodeHandle) -> &Node {
        &self.nodes[handle.0]
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn stream(bytes: Vec<u8>) -> BundleStream<Cursor<Vec<u8>>> {
        BundleStream::new(Cursor::new(bytes)).unwrap()
    }

    fn floats(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn absent_blocks_consume_only_the_flag_byte() {
        let mut s = stream(vec![0, 0, 0xaa]);
        assert_eq!(Camera::read(&mut s).unwrap(), None);
        assert_eq!(Light::read(&mut s).unwrap(), None);
        assert_eq!(s.read_u8("tail").unwrap(), 0xaa);
    }

    #[test]
    fn reads_perspective_camera_and_spot_light() {
        let mut data = vec![1];
        data.extend(floats(&[1.5, 0.1, 100.0, 45.0]));
        data.push(3);
        data.extend(floats(&[1.0, 0.5, 0.25, 10.0, 0.2, 0.4]));
        let mut s = stream(data);
        assert_eq!(
            Camera::read(&mut s).unwrap(),
            Some(Camera::Perspective {
                aspect_ratio: 1.5,
                near_plane: 0.1,
                far_plane: 100.0,
                field_of_view: 45.0,
            })
        );
        let light = Light::read(&mut s).unwrap().unwrap();
        assert!(matches!(light, Light::Spot { range, .. } if range == 10.0));
    }

    #[test]
    fn unknown_camera_type_is_rejected() {
        let mut data = vec![7];
        data.extend(floats(&[1.0, 0.1, 10.0]));
        assert!(matches!(
            Camera::read(&mut stream(data)),
            Err(GpbError::UnknownCameraType(7))
        ));
    }

    #[test]
    fn unknown_light_type_is_rejected() {
        let mut data = vec![4];
        data.extend(floats(&[1.0, 1.0, 1.0]));
        assert!(matches!(
            Light::read(&mut stream(data)),
            Err(GpbError::UnknownLightType(4))
        ));
    }

    fn skin_bytes(with_poses: bool) -> Vec<u8> {
        let identity = Mat4::IDENTITY.to_cols_array();
        let mut data = floats(&identity);
        data.extend(2u32.to_le_bytes());
        for xref in ["#hip", "#knee"] {
            data.extend((xref.len() as u32).to_le_bytes());
            data.extend(xref.as_bytes());
        }
        if with_poses {
            data.extend(32u32.to_le_bytes());
            data.extend(floats(&identity));
            data.extend(floats(&identity));
        } else {
            data.extend(0u32.to_le_bytes());
        }
        data.push(0xee);
        data
    }

    #[test]
    fn skin_read_and_skip_consume_the_same_bytes() {
        for with_poses in [true, false] {
            let mut read = stream(skin_bytes(with_poses));
            let skin = MeshSkin::read(&mut read).unwrap();
            assert_eq!(skin.joint_ids, vec!["hip".to_string(), "knee".to_string()]);
            assert_eq!(skin.bind_poses.len(), if with_poses { 2 } else { 0 });

            let mut skipped = stream(skin_bytes(with_poses));
            MeshSkin::skip(&mut skipped).unwrap();
            assert_eq!(read.position().unwrap(), skipped.position().unwrap());
            assert_eq!(skipped.read_u8("tail").unwrap(), 0xee);
        }
    }

    #[test]
    fn mismatched_bind_pose_count_is_bad_skin() {
        let mut data = skin_bytes(true);
        let count_at = 64 + 4 + 8 + 9;
        data[count_at..count_at + 4].copy_from_slice(&16u32.to_le_bytes());
        assert!(matches!(
            MeshSkin::read(&mut stream(data)),
            Err(GpbError::BadSkin(_))
        ));
    }

    #[test]
    fn decompose_recovers_translation() {
        let matrix = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let node = Node {
            id: "n".into(),
            node_type: NodeType::Node,
            transform: matrix.to_cols_array(),
            children: Vec::new(),
            camera: None,
            light: None,
            model: None,
        };
        let (scale, _, translation) = node.decompose();
        assert!((scale - Vec3::ONE).length() < 1e-5);
        assert_eq!(translation, Vec3::new(1.0, 2.0, 3.0));
    }
}
