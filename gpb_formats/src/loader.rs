//! Scene-graph decoding for one load session.
//!
//! Every node id is decoded from the stream at most once per session. Later
//! occurrences of an already-decoded id are skipped byte-for-byte and linked
//! to the existing arena entry instead.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek};

use log::{debug, trace, warn};

use crate::animation::{Animation, read_animations};
use crate::bundle::{Bundle, Version};
use crate::error::{GpbError, Result};
use crate::reference::ObjectType;
use crate::scene::{Camera, Light, MeshSkin, Model, Node, NodeHandle, NodeType, Scene};

/// Nesting limit for node hierarchies.
pub const MAX_NODE_DEPTH: usize = 256;

pub(crate) fn load_scene<R: Read + Seek>(bundle: &mut Bundle<R>, id: Option<&str>) -> Result<Scene> {
    match id {
        Some(id) => {
            bundle.seek_to(id, ObjectType::Scene)?;
        }
        None => {
            bundle
                .seek_to_first_type(ObjectType::Scene)?
                .ok_or(GpbError::NoScene)?;
        }
    }
    let scene_id = bundle.require_current_id()?;
    debug!("loading scene '{scene_id}'");

    let mut session = SceneLoader::new(bundle);

    let child_count = session.bundle.stream.read_u32("scene child count")?;
    let mut roots = Vec::new();
    for _ in 0..child_count {
        roots.push(session.read_child(0)?);
    }

    // Informational only; the camera node is not looked up.
    let camera_xref = session.bundle.stream.read_string("active camera xref")?;
    let active_camera = camera_xref
        .strip_prefix('#')
        .filter(|id| !id.is_empty())
        .map(str::to_owned);

    let ambient_color = [
        session.bundle.stream.read_f32("ambient red")?,
        session.bundle.stream.read_f32("ambient green")?,
        session.bundle.stream.read_f32("ambient blue")?,
    ];

    let animations = session.read_animation_objects()?;
    session.resolve_joint_references();

    let SceneLoader { nodes, .. } = session;
    debug!(
        "scene '{scene_id}': {} roots, {} nodes, {} animations",
        roots.len(),
        nodes.len(),
        animations.len()
    );

    Ok(Scene {
        id: scene_id,
        roots,
        nodes,
        active_camera,
        ambient_color,
        animations,
    })
}

struct SceneLoader<'a, R> {
    bundle: &'a mut Bundle<R>,
    nodes: Vec<Node>,
    decoded: HashMap<String, NodeHandle>,
    /// Ids whose subtree is still being decoded.
    open: HashSet<String>,
}

impl<'a, R: Read + Seek> SceneLoader<'a, R> {
    fn new(bundle: &'a mut Bundle<R>) -> Self {
        Self {
            bundle,
            nodes: Vec::new(),
            decoded: HashMap::new(),
            open: HashSet::new(),
        }
    }

    /// Decodes the node at the cursor, or skips it if its id was seen before.
    fn read_child(&mut self, depth: usize) -> Result<NodeHandle> {
        let id = self.bundle.require_current_id()?;
        if depth >= MAX_NODE_DEPTH {
            return Err(GpbError::NodeTooDeep {
                id,
                max: MAX_NODE_DEPTH,
            });
        }
        if self.open.contains(&id) {
            return Err(GpbError::CyclicNode { id });
        }
        if let Some(&existing) = self.decoded.get(&id) {
            trace!("node '{id}' already decoded; skipping its bytes");
            self.skip_node(depth)?;
            return Ok(existing);
        }
        self.read_node(id, depth)
    }

    fn read_node(&mut self, id: String, depth: usize) -> Result<NodeHandle> {
        trace!("reading node '{id}' at depth {depth}");
        let stream = &mut self.bundle.stream;
        let raw_type = stream.read_u32("node type")?;
        let node_type = NodeType::from_raw(raw_type).ok_or_else(|| GpbError::UnknownNodeType {
            id: id.clone(),
            value: raw_type,
        })?;
        let transform = stream.read_matrix("node transform")?;
        // The parent id duplicates the ownership already expressed by nesting.
        stream.skip_string("node parent id")?;

        let child_count = stream.read_u32("node child count")?;
        self.open.insert(id.clone());
        let mut children = Vec::new();
        for _ in 0..child_count {
            children.push(self.read_child(depth + 1)?);
        }
        self.open.remove(&id);

        let camera = Camera::read(&mut self.bundle.stream)?;
        let light = Light::read(&mut self.bundle.stream)?;
        let model = self.read_model()?;

        let handle = NodeHandle(self.nodes.len());
        self.decoded.entry(id.clone()).or_insert(handle);
        self.nodes.push(Node {
            id,
            node_type,
            transform,
            children,
            camera,
            light,
            model,
        });
        Ok(handle)
    }

    /// Walks a node's bytes exactly as [`Self::read_node`] would, building nothing.
    fn skip_node(&mut self, depth: usize) -> Result<()> {
        let id = self.bundle.require_current_id()?;
        if depth >= MAX_NODE_DEPTH {
            return Err(GpbError::NodeTooDeep {
                id,
                max: MAX_NODE_DEPTH,
            });
        }
        let stream = &mut self.bundle.stream;
        stream.read_u32("node type")?;
        stream.skip(64, "node transform")?;
        stream.skip_string("node parent id")?;
        let child_count = stream.read_u32("node child count")?;
        for _ in 0..child_count {
            self.skip_node(depth + 1)?;
        }
        Camera::read(&mut self.bundle.stream)?;
        Light::read(&mut self.bundle.stream)?;
        self.skip_model()
    }

    fn read_model(&mut self) -> Result<Option<Model>> {
        let xref = self.bundle.stream.read_string("model mesh xref")?;
        let Some(mesh_id) = local_xref(&xref)? else {
            return Ok(None);
        };
        let mesh = self.bundle.load_mesh(mesh_id)?;

        let stream = &mut self.bundle.stream;
        let has_vertex_animation_cache =
            if self.bundle.version.at_least(Version::VERTEX_ANIMATION_CACHE) {
                stream.read_u8("model vertex animation cache flag")? != 0
            } else {
                false
            };
        let skin = if stream.read_u8("model skin flag")? != 0 {
            Some(MeshSkin::read(stream)?)
        } else {
            None
        };
        let material_count = stream.read_u32("model material count")?;
        let mut materials = Vec::new();
        for _ in 0..material_count {
            materials.push(stream.read_string("model material name")?);
        }

        Ok(Some(Model {
            mesh_id: mesh_id.to_string(),
            mesh,
            has_vertex_animation_cache,
            skin,
            materials,
        }))
    }

    fn skip_model(&mut self) -> Result<()> {
        let xref = self.bundle.stream.read_string("model mesh xref")?;
        if local_xref(&xref)?.is_none() {
            return Ok(());
        }
        let stream = &mut self.bundle.stream;
        if self.bundle.version.at_least(Version::VERTEX_ANIMATION_CACHE) {
            stream.read_u8("model vertex animation cache flag")?;
        }
        if stream.read_u8("model skin flag")? != 0 {
            MeshSkin::skip(stream)?;
        }
        let material_count = stream.read_u32("model material count")?;
        for _ in 0..material_count {
            stream.skip_string("model material name")?;
        }
        Ok(())
    }

    /// Seeks to and decodes every ANIMATIONS object in the reference table.
    fn read_animation_objects(&mut self) -> Result<Vec<Animation>> {
        let offsets: Vec<u32> = self
            .bundle
            .references
            .of_type(ObjectType::Animations)
            .map(|reference| reference.offset)
            .collect();
        let mut animations = Vec::new();
        for offset in offsets {
            self.bundle.stream.seek_to(u64::from(offset))?;
            animations.extend(read_animations(&mut self.bundle.stream)?);
        }
        Ok(animations)
    }

    /// Maps every skin's joint ids onto the nodes decoded in this session.
    fn resolve_joint_references(&mut self) {
        let decoded = &self.decoded;
        for node in &mut self.nodes {
            let Some(skin) = node.model.as_mut().and_then(|model| model.skin.as_mut()) else {
                continue;
            };
            for (slot, joint_id) in skin.joints.iter_mut().zip(&skin.joint_ids) {
                *slot = decoded.get(joint_id).copied();
                if slot.is_none() {
                    warn!("skin on node '{}' references unknown joint '{joint_id}'", node.id);
                }
            }
        }
    }
}

/// Splits a `#id` xref. An empty xref means "no object"; external
/// `file#id` forms are not resolved.
fn local_xref(xref: &str) -> Result<Option<&str>> {
    if xref.is_empty() {
        return Ok(None);
    }
    match xref.strip_prefix('#') {
        Some(id) if !id.is_empty() => Ok(Some(id)),
        _ => Err(GpbError::UnsupportedXref(xref.to_string())),
    }
}
