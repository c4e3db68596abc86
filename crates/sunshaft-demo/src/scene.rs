//! Occluder scene for the demo: a row of pillars under a lintel, between the
//! camera and the sun.

use glam::Vec3;
use sunshaft_render::OccluderMesh;

/// Corner positions and triangle indices of an axis-aligned box.
pub fn cuboid_geometry(center: Vec3, half_extents: Vec3) -> ([[f32; 3]; 8], [u16; 36]) {
    let mut positions = [[0.0; 3]; 8];
    for (i, corner) in positions.iter_mut().enumerate() {
        let sign = Vec3::new(
            if i & 1 == 0 { -1.0 } else { 1.0 },
            if i & 2 == 0 { -1.0 } else { 1.0 },
            if i & 4 == 0 { -1.0 } else { 1.0 },
        );
        *corner = (center + sign * half_extents).to_array();
    }
    #[rustfmt::skip]
    let indices = [
        0, 2, 1, 1, 2, 3, // -z
        4, 5, 6, 5, 7, 6, // +z
        0, 1, 4, 1, 5, 4, // -y
        2, 6, 3, 3, 6, 7, // +y
        0, 4, 2, 2, 4, 6, // -x
        1, 3, 5, 3, 7, 5, // +x
    ];
    (positions, indices)
}

fn cuboid(device: &wgpu::Device, label: &str, center: Vec3, half_extents: Vec3) -> OccluderMesh {
    let (positions, indices) = cuboid_geometry(center, half_extents);
    OccluderMesh::new(device, label, &positions, &indices)
}

/// Five pillars and a lintel, centred on the z axis a few units ahead of the origin.
pub fn build_scene(device: &wgpu::Device) -> Vec<OccluderMesh> {
    let mut meshes: Vec<OccluderMesh> = (-2..=2)
        .map(|i| {
            cuboid(
                device,
                "pillar",
                Vec3::new(i as f32 * 1.6, 2.0, 4.0),
                Vec3::new(0.25, 2.0, 0.25),
            )
        })
        .collect();
    meshes.push(cuboid(
        device,
        "lintel",
        Vec3::new(0.0, 4.25, 4.0),
        Vec3::new(3.6, 0.25, 0.4),
    ));
    meshes.push(cuboid(
        device,
        "ground",
        Vec3::new(0.0, -0.5, 10.0),
        Vec3::new(50.0, 0.5, 50.0),
    ));
    tracing::debug!(count = meshes.len(), "Built occluder scene");
    meshes
}
