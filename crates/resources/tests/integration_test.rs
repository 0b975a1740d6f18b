use ember_resources::{load_gltf_meshes, load_gltf_scene};

// Exercises the full glTF import path against a real asset. Skipped when
// the asset directory is not checked out.
#[test]
fn test_load_gltf_meshes_from_file() {
    let model_path = "../../assets/models/basicmesh.glb";

    if !std::path::Path::new(model_path).exists() {
        eprintln!("Skipping test: model file not found at {model_path}");
        return;
    }

    let meshes = load_gltf_meshes(model_path).expect("failed to load test model");
    assert!(!meshes.is_empty());

    for mesh in &meshes {
        assert!(!mesh.vertices.is_empty(), "mesh '{}' has no vertices", mesh.name);
        assert!(!mesh.indices.is_empty(), "mesh '{}' has no indices", mesh.name);
        assert!(!mesh.surfaces.is_empty(), "mesh '{}' has no surfaces", mesh.name);

        // Every surface range must stay inside the index array, and every
        // index must reference a real vertex.
        for surface in &mesh.surfaces {
            let end = surface.start_index as usize + surface.count as usize;
            assert!(end <= mesh.indices.len());
        }
        for &index in &mesh.indices {
            assert!((index as usize) < mesh.vertices.len());
        }
    }
}

#[test]
fn test_load_gltf_scene_indices_are_consistent() {
    let model_path = "../../assets/models/basicmesh.glb";

    if !std::path::Path::new(model_path).exists() {
        eprintln!("Skipping test: model file not found at {model_path}");
        return;
    }

    let scene = load_gltf_scene(model_path).expect("failed to load test scene");
    assert!(!scene.nodes.is_empty());
    assert!(!scene.top_nodes.is_empty());

    // Every cross-reference must resolve: node children, mesh links,
    // material indices on surfaces, and texture refs on materials.
    for node in &scene.nodes {
        for &child in &node.children {
            assert!(child < scene.nodes.len());
        }
        if let Some(mesh) = node.mesh {
            assert!(mesh < scene.meshes.len());
        }
    }
    for &top in &scene.top_nodes {
        assert!(top < scene.nodes.len());
    }
    for mesh in &scene.meshes {
        for surface in &mesh.surfaces {
            if let Some(material) = surface.material_index {
                assert!(material < scene.materials.len());
            }
        }
    }
    for material in &scene.materials {
        for texture in [material.color_texture, material.metal_rough_texture]
            .into_iter()
            .flatten()
        {
            assert!(texture.image < scene.images.len());
        }
    }
}
