mod support;

use gpb_formats::{GpbError, VertexUsage, parse_xml_file};
use support::write_temp;

const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root>
  <Mesh id="quad_half">
    <vertices count="2">
// position
-1.0 0.0 0.0
// normal
0.0 1.0 0.0
// texCoord
0.0 0.0
// position
1.0 0.0 0.0
// normal
0.0 1.0 0.0
// texCoord
1.0 0.0
    </vertices>
    <bounds>
      <min>-1 0 0</min>
      <max>1 0 0</max>
      <center>0 0 0</center>
      <radius>1</radius>
    </bounds>
    <MeshPart>
      <indices count="3">0 1 0</indices>
    </MeshPart>
    <MeshPart>
      <indices count="1">1</indices>
    </MeshPart>
  </Mesh>
  <Mesh id="point">
    <vertices count="1">
// position
0 0 0
    </vertices>
    <bounds>
      <min>0 0 0</min>
      <max>0 0 0</max>
      <center>0 0 0</center>
      <radius>0</radius>
    </bounds>
    <MeshPart>
      <indices count="1">0</indices>
    </MeshPart>
  </Mesh>
</root>
"#;

#[test]
fn parses_meshes_from_disk_in_document_order() {
    let file = write_temp(DOCUMENT.as_bytes());
    let meshes = parse_xml_file(file.path()).unwrap();
    assert_eq!(meshes.len(), 2);

    let first = &meshes[0];
    assert_eq!(first.id, "quad_half");
    assert_eq!(first.positions.len(), 2);
    assert_eq!(first.normals.len(), 2);
    assert_eq!(first.texcoords.len(), 2);
    assert_eq!(first.indices, vec![0, 1, 0]);
    assert_eq!(first.bounds.min, [-1.0, 0.0, 0.0]);
    assert!(first.primitive_type.is_none());

    assert_eq!(meshes[1].id, "point");
    assert!(meshes[1].normals.is_empty());
}

#[test]
fn converted_mesh_matches_binary_layout() {
    let file = write_temp(DOCUMENT.as_bytes());
    let meshes = parse_xml_file(file.path()).unwrap();

    let point = meshes[1].to_mesh_data().unwrap();
    assert_eq!(point.stride(), 12);
    assert_eq!(point.vertex_count, 1);

    let quad = meshes[0].to_mesh_data().unwrap();
    assert_eq!(quad.vertex_count * quad.stride(), quad.vertex_data.len() as u32);
    assert_eq!(
        quad.attribute(VertexUsage::Normal).unwrap(),
        vec![0.0, 1.0, 0.0, 0.0, 1.0, 0.0]
    );
    assert_eq!(quad.bounding_sphere.radius, 1.0);
}

#[test]
fn bad_index_token_fails_the_parse() {
    let file = write_temp(DOCUMENT.replace("0 1 0", "0 1 -").as_bytes());
    assert!(matches!(
        parse_xml_file(file.path()),
        Err(GpbError::BadIndexToken { ref mesh, .. }) if mesh == "quad_half"
    ));
}
