//! Reflected beam puzzle: emitters shine on player-rotated mirrors, and every beam bounced
//! into the capture prism counts towards unlocking the level exit.

use bevy::prelude::*;
use bevy_prototype_debug_lines::DebugLines;
use bevy_rapier3d::prelude::*;

pub mod solver;

pub use solver::{compute_reflected_beam, BeamResult};

use super::{
    levels::PuzzleDef,
    mirror::{MirrorLabels, MirrorPad, MirrorState},
    physics::*,
};

#[derive(Debug)]
pub struct BeamPlugin;

impl Plugin for BeamPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CaptureAggregate>()
            .add_startup_system(load_puzzle_assets)
            .add_system(
                solve_beams
                    .label(BeamLabels::SolveBeams)
                    .after(MirrorLabels::RotateMirrors),
            )
            .add_system(draw_beams.after(BeamLabels::SolveBeams));
    }
}

#[derive(Debug, SystemLabel)]
pub enum BeamLabels {
    SolveBeams,
}

const BEAM_COLOR: Color = Color::rgb(0., 1., 1.);
const CAPTURED_BEAM_COLOR: Color = Color::rgb(0.7, 1., 1.);

/// Fixed beam source, paired with the mirror it shines on.
#[derive(Debug, Clone, Component)]
pub struct Emitter {
    pub origin: Vec3,
    pub direction: Vec3,
    pub mirror: Entity,
}

/// Volume the reflected beams must reach.
#[derive(Debug, Clone, Copy, Component)]
pub struct CaptureSphere {
    pub center: Vec3,
    pub radius: f32,
}

/// Latest solver output for an emitter, used for drawing.
#[derive(Debug, Default, Component)]
pub struct BeamTrace(pub BeamResult);

/// Number of emitters whose beam currently reaches the capture sphere.
#[derive(Debug, Default, Resource)]
pub struct CaptureAggregate {
    count: u32,
    emitters: u32,
}

impl CaptureAggregate {
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn emitters(&self) -> u32 {
        self.emitters
    }

    /// Store a new evaluation, returning whether it differs from the previous one.
    pub(crate) fn record(&mut self, count: u32, emitters: u32) -> bool {
        let changed = self.count != count || self.emitters != emitters;
        self.count = count;
        self.emitters = emitters;
        changed
    }
}

#[derive(Debug, Default, Resource)]
pub struct PuzzleResources {
    mirror_mesh: Handle<Mesh>,
    mirror_material: Handle<StandardMaterial>,
    pad_mesh: Handle<Mesh>,
    pad_material: Handle<StandardMaterial>,
    emitter_mesh: Handle<Mesh>,
    emitter_material: Handle<StandardMaterial>,
    prism_mesh: Handle<Mesh>,
    prism_material: Handle<StandardMaterial>,
}

const MIRROR_HALF_EXTENTS: Vec3 = Vec3::new(1., 2., 0.05);
const PAD_HALF_EXTENTS: Vec3 = Vec3::new(0.7, 0.15, 0.7);

fn load_puzzle_assets(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let box_mesh = |half: Vec3| -> Mesh {
        shape::Box {
            min_x: -half.x,
            max_x: half.x,
            min_y: -half.y,
            max_y: half.y,
            min_z: -half.z,
            max_z: half.z,
        }
        .into()
    };

    commands.insert_resource(PuzzleResources {
        mirror_mesh: meshes.add(box_mesh(MIRROR_HALF_EXTENTS)),
        mirror_material: materials.add(StandardMaterial {
            base_color: Color::rgb(0.8, 0.85, 0.9),
            perceptual_roughness: 0.05,
            metallic: 1.,
            ..default()
        }),
        pad_mesh: meshes.add(box_mesh(PAD_HALF_EXTENTS)),
        pad_material: materials.add(StandardMaterial {
            base_color: Color::rgb(0.2, 0.6, 0.3),
            emissive: Color::rgb(0.05, 0.2, 0.1),
            ..default()
        }),
        emitter_mesh: meshes.add(
            shape::UVSphere {
                radius: 0.2,
                sectors: 12,
                stacks: 12,
            }
            .into(),
        ),
        emitter_material: materials.add(StandardMaterial {
            base_color: BEAM_COLOR,
            emissive: BEAM_COLOR,
            unlit: true,
            ..default()
        }),
        prism_mesh: meshes.add(box_mesh(Vec3::new(0.3, 1.5, 0.3))),
        prism_material: materials.add(StandardMaterial {
            base_color: Color::rgba(0.6, 0.8, 1., 0.7),
            alpha_mode: AlphaMode::Blend,
            perceptual_roughness: 0.1,
            ..default()
        }),
    });
}

/// Spawn the mirrors, pads, emitters and capture prism of a puzzle under the level root.
pub fn spawn_puzzle(
    parent: &mut ChildBuilder,
    puzzle: &PuzzleDef,
    default_capture_radius: f32,
    puzzle_res: &PuzzleResources,
) {
    let capture = CaptureSphere {
        center: Vec3::from_array(puzzle.capture_center),
        radius: puzzle.capture_radius.unwrap_or(default_capture_radius),
    };
    // The prism stands on the ground, its middle at the capture height.
    parent.spawn((
        PbrBundle {
            mesh: puzzle_res.prism_mesh.clone(),
            material: puzzle_res.prism_material.clone(),
            transform: Transform::from_translation(capture.center),
            ..default()
        },
        Name::from("Capture prism"),
        capture,
    ));

    for (i, station) in puzzle.stations.iter().enumerate() {
        let mirror_state = MirrorState::new(
            Vec3::from_array(station.mirror.position),
            station.mirror.initial_degrees,
        );
        let mirror = parent
            .spawn((
                SpatialBundle::from_transform(
                    Transform::from_translation(mirror_state.position)
                        .with_rotation(mirror_state.rotation()),
                ),
                RigidBody::KinematicPositionBased,
                Name::from(format!("Mirror_{}", i)),
                mirror_state.clone(),
            ))
            .with_children(|mirror_root| {
                mirror_root.spawn((
                    PbrBundle {
                        mesh: puzzle_res.mirror_mesh.clone(),
                        material: puzzle_res.mirror_material.clone(),
                        transform: Transform::from_xyz(0., MIRROR_HALF_EXTENTS.y, 0.),
                        ..default()
                    },
                    Collider::cuboid(
                        MIRROR_HALF_EXTENTS.x,
                        MIRROR_HALF_EXTENTS.y,
                        MIRROR_HALF_EXTENTS.z,
                    ),
                    CollisionGroups::new(WALLS_GROUP, ALL_GROUPS),
                ));
            })
            .id();

        let pad_position = mirror_state.position
            + Vec3::from_array(station.pad_offset)
            + Vec3::Y * PAD_HALF_EXTENTS.y;
        parent.spawn((
            PbrBundle {
                mesh: puzzle_res.pad_mesh.clone(),
                material: puzzle_res.pad_material.clone(),
                transform: Transform::from_translation(pad_position),
                ..default()
            },
            Name::from(format!("Mirror pad_{}", i)),
            RigidBody::Fixed,
            Collider::cuboid(PAD_HALF_EXTENTS.x, PAD_HALF_EXTENTS.y, PAD_HALF_EXTENTS.z),
            Sensor,
            ActiveEvents::COLLISION_EVENTS,
            CollisionGroups::new(MIRROR_PAD_GROUP, PLAYER_GROUP),
            MirrorPad {
                mirror,
                occupied: false,
            },
        ));

        let origin = Vec3::from_array(station.emitter.origin);
        parent.spawn((
            PbrBundle {
                mesh: puzzle_res.emitter_mesh.clone(),
                material: puzzle_res.emitter_material.clone(),
                transform: Transform::from_translation(origin),
                ..default()
            },
            Name::from(format!("Emitter_{}", i)),
            Emitter {
                origin,
                direction: Vec3::from_array(station.emitter.direction),
                mirror,
            },
            BeamTrace::default(),
        ));
    }
}

/// Trace every emitter against its mirror and the capture sphere, then update the capture
/// count. All beams of a frame see the same mirror states.
fn solve_beams(
    mut aggregate: ResMut<CaptureAggregate>,
    capture_query: Query<&CaptureSphere>,
    mirrors_query: Query<&MirrorState>,
    mut emitters_query: Query<(&Emitter, &mut BeamTrace)>,
) {
    let capture = capture_query.get_single().ok().copied();
    let mut count = 0;
    let mut emitters = 0;

    for (emitter, mut trace) in &mut emitters_query {
        emitters += 1;
        let result = match (capture, mirrors_query.get(emitter.mirror)) {
            (Some(capture), Ok(mirror)) => compute_reflected_beam(
                emitter.origin,
                emitter.direction,
                mirror.position,
                mirror.normal(),
                capture.center,
                capture.radius,
            ),
            _ => BeamResult::default(),
        };
        if result.hit {
            count += 1;
        }
        trace.0 = result;
    }

    // Only touch the resource on change, so readers can rely on change detection.
    if aggregate.count() != count || aggregate.emitters() != emitters {
        aggregate.record(count, emitters);
        if emitters > 0 {
            info!("Beams captured: {}/{}", count, emitters);
        }
    }
}

fn draw_beams(mut lines: ResMut<DebugLines>, traces_query: Query<&BeamTrace>) {
    for trace in &traces_query {
        for (i, segment) in trace.0.segments.iter().enumerate() {
            let color = if trace.0.hit && i == 1 {
                CAPTURED_BEAM_COLOR
            } else {
                BEAM_COLOR
            };
            lines.line_colored(segment.start, segment.end, 0., color);
        }
    }
}
