pub mod animation;
pub mod bundle;
pub mod error;
mod loader;
pub mod mesh;
pub mod reference;
pub mod scene;
pub mod stream;
pub mod vertex;
pub mod xml_mesh;

pub use animation::{Animation, AnimationChannel};
pub use bundle::{Bundle, Variant, Version, load_scene};
pub use error::{GpbError, Result};
pub use loader::MAX_NODE_DEPTH;
pub use mesh::{BlendShape, IndexFormat, MeshData, MeshPart, PrimitiveType};
pub use reference::{ObjectType, Reference, ReferenceTable};
pub use scene::{Camera, Light, MeshSkin, Model, Node, NodeHandle, NodeType, Scene};
pub use vertex::{VertexElement, VertexFormat, VertexUsage};
pub use xml_mesh::{XmlMesh, parse_file as parse_xml_file};
