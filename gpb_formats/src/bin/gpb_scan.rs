use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::Parser;
use gpb_formats::{Bundle, GpbError, Scene};
use log::warn;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(author, version, about = "Load every GPB bundle under a directory and report failures")]
struct Args {
    /// Directory to search recursively
    root: PathBuf,

    /// Read bundles through a memory map instead of buffered reads
    #[arg(long, default_value_t = false)]
    mapped: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut loaded = 0usize;
    let mut failed = 0usize;
    for entry in WalkDir::new(&args.root).into_iter() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("failed to traverse {}: {err}", args.root.display());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let is_bundle = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gpb"));
        if !is_bundle {
            continue;
        }

        match load(entry.path(), args.mapped) {
            Ok(scene) => {
                loaded += 1;
                println!(
                    "ok    {path} scene={id} nodes={nodes} models={models}",
                    path = entry.path().display(),
                    id = scene.id(),
                    nodes = scene.nodes().len(),
                    models = scene.drawables().count()
                );
            }
            Err(err) => {
                failed += 1;
                println!("FAIL  {}: {err}", entry.path().display());
            }
        }
    }

    println!("{loaded} loaded, {failed} failed");
    if failed > 0 {
        bail!("{failed} bundles failed to load");
    }
    Ok(())
}

fn load(path: &Path, mapped: bool) -> Result<Scene, GpbError> {
    if mapped {
        Bundle::open_mapped(path)?.load_scene(None)
    } else {
        Bundle::open(path)?.load_scene(None)
    }
}
