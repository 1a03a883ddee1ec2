//! Convert a GPB bundle's scene into a JSON description.
//! Nodes are listed in arena order and refer to their children by index.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gpb_formats::{
    Animation, Bundle, Camera, IndexFormat, Light, MeshData, MeshPart, Model, Node, NodeType,
    PrimitiveType, Scene, VertexElement, Version,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input GPB bundle to convert
    #[arg(long)]
    input: PathBuf,

    /// Output JSON file path
    #[arg(long)]
    output: PathBuf,

    /// Scene id to export instead of the first scene
    #[arg(long)]
    scene: Option<String>,

    /// Pretty-print the JSON output
    #[arg(long, default_value_t = false)]
    pretty: bool,

    /// Include decoded vertex positions and indices
    #[arg(long, default_value_t = false)]
    vertices: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut bundle = Bundle::open(&args.input)
        .with_context(|| format!("opening {}", args.input.display()))?;
    let version = bundle.version();
    let scene = bundle.load_scene(args.scene.as_deref())?;
    let export = ExportScene::new(&scene, version, args.vertices);

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(&args.output)?;
    let mut writer = BufWriter::new(file);
    if args.pretty {
        serde_json::to_writer_pretty(&mut writer, &export)?;
    } else {
        serde_json::to_writer(&mut writer, &export)?;
    }
    writer.flush()?;

    Ok(())
}

#[derive(Debug, Serialize)]
struct ExportScene<'a> {
    id: &'a str,
    version: Version,
    ambient_color: [f32; 3],
    active_camera: Option<&'a str>,
    roots: Vec<usize>,
    nodes: Vec<ExportNode<'a>>,
    animations: &'a [Animation],
}

impl<'a> ExportScene<'a> {
    fn new(scene: &'a Scene, version: Version, vertices: bool) -> Self {
        ExportScene {
            id: scene.id(),
            version,
            ambient_color: scene.ambient_color(),
            active_camera: scene.active_camera(),
            roots: scene.roots().iter().map(|handle| handle.index()).collect(),
            nodes: scene
                .nodes()
                .iter()
                .map(|node| ExportNode::new(node, vertices))
                .collect(),
            animations: scene.animations(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ExportNode<'a> {
    id: &'a str,
    node_type: NodeType,
    transform: [f32; 16],
    translation: [f32; 3],
    rotation: [f32; 4],
    scale: [f32; 3],
    children: Vec<usize>,
    camera: Option<Camera>,
    light: Option<Light>,
    model: Option<ExportModel<'a>>,
}

impl<'a> ExportNode<'a> {
    fn new(node: &'a Node, vertices: bool) -> Self {
        let (scale, rotation, translation) = node.decompose();
        ExportNode {
            id: &node.id,
            node_type: node.node_type,
            transform: node.transform,
            translation: translation.to_array(),
            rotation: rotation.to_array(),
            scale: scale.to_array(),
            children: node.children.iter().map(|child| child.index()).collect(),
            camera: node.camera,
            light: node.light,
            model: node
                .model
                .as_ref()
                .map(|model| ExportModel::new(model, vertices)),
        }
    }
}

#[derive(Debug, Serialize)]
struct ExportModel<'a> {
    mesh_id: &'a str,
    materials: &'a [String],
    has_vertex_animation_cache: bool,
    joints: Option<Vec<ExportJoint<'a>>>,
    mesh: ExportMesh<'a>,
}

impl<'a> ExportModel<'a> {
    fn new(model: &'a Model, vertices: bool) -> Self {
        let joints = model.skin.as_ref().map(|skin| {
            skin.joint_ids
                .iter()
                .zip(&skin.joints)
                .map(|(id, handle)| ExportJoint {
                    id,
                    node: handle.map(|handle| handle.index()),
                })
                .collect()
        });
        ExportModel {
            mesh_id: &model.mesh_id,
            materials: &model.materials,
            has_vertex_animation_cache: model.has_vertex_animation_cache,
            joints,
            mesh: ExportMesh::new(&model.mesh, vertices),
        }
    }
}

#[derive(Debug, Serialize)]
struct ExportJoint<'a> {
    id: &'a str,
    node: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ExportMesh<'a> {
    vertex_format: &'a [VertexElement],
    vertex_count: u32,
    bounds_min: [f32; 3],
    bounds_max: [f32; 3],
    sphere_center: [f32; 3],
    sphere_radius: f32,
    parts: Vec<ExportPart>,
    blend_shapes: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    positions: Option<Vec<[f32; 3]>>,
}

impl<'a> ExportMesh<'a> {
    fn new(mesh: &'a MeshData, vertices: bool) -> Self {
        ExportMesh {
            vertex_format: mesh.vertex_format.elements(),
            vertex_count: mesh.vertex_count,
            bounds_min: mesh.bounding_box.min,
            bounds_max: mesh.bounding_box.max,
            sphere_center: mesh.bounding_sphere.center,
            sphere_radius: mesh.bounding_sphere.radius,
            parts: mesh
                .parts
                .iter()
                .map(|part| ExportPart::new(part, vertices))
                .collect(),
            blend_shapes: mesh.blend_shapes.keys().map(String::as_str).collect(),
            positions: if vertices { mesh.positions() } else { None },
        }
    }
}

#[derive(Debug, Serialize)]
struct ExportPart {
    primitive_type: PrimitiveType,
    index_format: IndexFormat,
    index_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    indices: Option<Vec<u32>>,
}

impl ExportPart {
    fn new(part: &MeshPart, vertices: bool) -> Self {
        ExportPart {
            primitive_type: part.primitive_type,
            index_format: part.index_format,
            index_count: part.index_count,
            indices: vertices.then(|| part.indices()),
        }
    }
}
