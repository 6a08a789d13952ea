use std::f32::consts::FRAC_PI_2;

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use super::ArenaBounds;
use crate::plugins::physics::*;

const WALL_THICKNESS: f32 = 1.;

/// Spawn the square walled floor of a level under `parent`.
/// The ground top sits at y = 0, the walls enclose `[-half_extent, half_extent]` on X and Z.
pub fn spawn_arena(
    parent: &mut ChildBuilder,
    bounds: &ArenaBounds,
    ground_color: Color,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
) {
    let half_len = bounds.half_extent;
    let height = bounds.wall_height;

    let ground_material = materials.add(StandardMaterial {
        base_color: ground_color,
        perceptual_roughness: 0.9,
        ..default()
    });
    let wall_material = materials.add(StandardMaterial {
        base_color: ground_color * 0.6,
        perceptual_roughness: 0.8,
        ..default()
    });

    let wall_mesh = meshes.add(
        shape::Box {
            min_x: -half_len,
            max_x: half_len,
            min_y: -height / 2.,
            max_y: height / 2.,
            min_z: -WALL_THICKNESS / 2.,
            max_z: WALL_THICKNESS / 2.,
        }
        .into(),
    );
    let ground_half_len = half_len + WALL_THICKNESS;
    let ground_mesh = meshes.add(
        shape::Box {
            min_x: -ground_half_len,
            max_x: ground_half_len,
            min_y: -WALL_THICKNESS / 2.,
            max_y: WALL_THICKNESS / 2.,
            min_z: -ground_half_len,
            max_z: ground_half_len,
        }
        .into(),
    );

    parent.spawn((
        PbrBundle {
            mesh: ground_mesh,
            material: ground_material,
            transform: Transform::from_xyz(0., -WALL_THICKNESS / 2., 0.),
            ..default()
        },
        Name::from("Ground"),
        RigidBody::Fixed,
        Collider::cuboid(ground_half_len, WALL_THICKNESS / 2., ground_half_len),
        CollisionGroups::new(GROUND_GROUP, ALL_GROUPS),
    ));

    for i in 0..4 {
        let mut transform = Transform::from_xyz(0., height / 2., -(half_len + WALL_THICKNESS / 2.));
        transform.rotate_around(
            Vec3::new(0., height / 2., 0.),
            Quat::from_axis_angle(Vec3::Y, i as f32 * FRAC_PI_2),
        );
        parent.spawn((
            PbrBundle {
                mesh: wall_mesh.clone(),
                material: wall_material.clone(),
                transform,
                ..default()
            },
            Name::from(format!("Wall_{}", i)),
            RigidBody::Fixed,
            Collider::cuboid(half_len, height / 2., WALL_THICKNESS / 2.),
            CollisionGroups::new(WALLS_GROUP, ALL_GROUPS),
        ));
    }
}
