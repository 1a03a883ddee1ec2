use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use clap::Parser;
use gpb_formats::{Bundle, Node, Scene, XmlMesh, parse_xml_file};
use log::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Print the contents of a GPB bundle or XML mesh dump")]
struct Args {
    /// Bundle (.gpb) or XML mesh (.xml) file
    path: PathBuf,

    /// Scene id to load instead of the first scene
    #[arg(long)]
    scene: Option<String>,

    /// Print the reference table
    #[arg(long, default_value_t = false)]
    refs: bool,

    /// Reload whenever the file's modification time changes
    #[arg(long, default_value_t = false)]
    watch: bool,

    /// Poll interval for --watch
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if !args.watch {
        return dump(&args);
    }

    let interval = Duration::from_millis(args.interval_ms);
    let mut last_seen: Option<SystemTime> = None;
    loop {
        let modified = modified_time(&args.path);
        if modified.is_some() && modified != last_seen {
            last_seen = modified;
            info!("loading {}", args.path.display());
            // A broken intermediate save must not end the watch.
            if let Err(err) = dump(&args) {
                warn!("{}: {err:#}", args.path.display());
            }
        }
        thread::sleep(interval);
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

fn dump(args: &Args) -> Result<()> {
    let is_xml = args
        .path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
    if is_xml {
        let meshes = parse_xml_file(&args.path)
            .with_context(|| format!("parsing {}", args.path.display()))?;
        print_xml_meshes(&args.path, &meshes);
        return Ok(());
    }

    let mut bundle = Bundle::open(&args.path)
        .with_context(|| format!("opening {}", args.path.display()))?;
    println!(
        "{}: {:?} bundle v{}, {} references",
        args.path.display(),
        bundle.variant(),
        bundle.version(),
        bundle.references().len()
    );
    if args.refs {
        for reference in bundle.references().iter() {
            println!(
                "{id:<40} {ty:<12} {offset:>10}",
                id = reference.id,
                ty = reference.object_type.to_string(),
                offset = reference.offset
            );
        }
    }

    let scene = bundle
        .load_scene(args.scene.as_deref())
        .with_context(|| format!("loading scene from {}", args.path.display()))?;
    print_scene(&scene);
    Ok(())
}

fn print_scene(scene: &Scene) {
    println!(
        "scene '{}': {} roots, {} nodes, ambient {:?}, camera {}",
        scene.id(),
        scene.roots().len(),
        scene.nodes().len(),
        scene.ambient_color(),
        scene.active_camera().unwrap_or("-")
    );
    scene.walk(|depth, _, node| {
        println!("{:indent$}{}", "", describe(node), indent = depth * 2);
    });
    for animation in scene.animations() {
        println!(
            "animation '{}': {} channels",
            animation.id,
            animation.channels.len()
        );
    }
}

fn describe(node: &Node) -> String {
    let mut line = format!("{} [{:?}]", node.id, node.node_type);
    if let Some(camera) = &node.camera {
        line.push_str(&format!(" camera={camera:?}"));
    }
    if let Some(light) = &node.light {
        line.push_str(&format!(" light={light:?}"));
    }
    if let Some(model) = &node.model {
        let mesh = &model.mesh;
        line.push_str(&format!(
            " mesh={} vertices={} stride={} parts={}",
            model.mesh_id,
            mesh.vertex_count,
            mesh.stride(),
            mesh.parts.len()
        ));
        if !mesh.blend_shapes.is_empty() {
            line.push_str(&format!(" blend_shapes={}", mesh.blend_shapes.len()));
        }
        if let Some(skin) = &model.skin {
            line.push_str(&format!(" joints={}", skin.joint_ids.len()));
        }
        if let Some(invalid) = mesh.first_invalid_index() {
            line.push_str(&format!(
                " (part {} index {} = {} out of range)",
                invalid.part, invalid.position, invalid.index
            ));
        }
    }
    line
}

fn print_xml_meshes(path: &Path, meshes: &[XmlMesh]) {
    println!("{}: {} meshes", path.display(), meshes.len());
    for mesh in meshes {
        println!(
            "{id:<40} vertices={vertices:>6} normals={normals:>6} texcoords={texcoords:>6} indices={indices:>6} radius={radius}",
            id = mesh.id,
            vertices = mesh.vertex_count(),
            normals = mesh.normals.len(),
            texcoords = mesh.texcoords.len(),
            indices = mesh.indices.len(),
            radius = mesh.bounds.radius
        );
    }
}
