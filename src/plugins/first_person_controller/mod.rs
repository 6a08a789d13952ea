//! This module contains the first person controller plugin.
//!
//! The controller walks, sprints and jumps on a dynamic rapier body, and can be switched to a
//! fly mode which ignores gravity and level geometry.

use std::f32::consts::FRAC_PI_2;

use bevy::{prelude::*, reflect::FromReflect, render::camera::Projection};
use bevy_rapier3d::prelude::*;
use euclid::Angle;
use leafwing_input_manager::prelude::*;

use super::{
    input::{default_input_map, Actions},
    physics::*,
    settings::{GameSettings, PlayerSettings},
    transition::{TransitionController, TransitionEvent, TransitionLabels},
};

#[derive(Debug)]
/// First person controller plugin, which registers the required systems to use the first person
/// controller also provided by this module.
pub struct FirstPersonControllerPlugin;

impl Plugin for FirstPersonControllerPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<FirstPersonCamera>()
            .add_system(spawn_controller.label(FirstPersonLabels::SpawnControllers))
            .add_system(process_controller_inputs.label(FirstPersonLabels::ProcessInputs))
            .add_system(
                place_player_on_swap
                    .label(FirstPersonLabels::PlacePlayer)
                    .after(TransitionLabels::Advance),
            )
            .add_system(catch_fallen_player.after(FirstPersonLabels::PlacePlayer));
    }
}

#[derive(Debug, SystemLabel)]
/// Labels for the first person controller systems.
pub enum FirstPersonLabels {
    SpawnControllers,
    ProcessInputs,
    PlacePlayer,
}

pub const PLAYER_HEIGHT: f32 = 1.8;
pub const PLAYER_RADIUS: f32 = 0.4;
pub const EYE_HEIGHT: f32 = 1.25;
/// Vertical speed under which the player counts as grounded and may jump.
const GROUNDED_VERTICAL_SPEED: f32 = 0.5;

#[derive(Debug, Component)]
/// First person controller component.
pub struct FirstPersonController {
    pub theta: Angle<f32>,
    pub phi: Angle<f32>,
    pub camera_anchor: Entity,
    pub flying: bool,
}

#[derive(Debug, Default, Component, Reflect, FromReflect)]
#[reflect(Component)]
/// Marker component for first person cameras
pub struct FirstPersonCamera;

#[derive(Debug, Component, Default)]
pub struct FirstPersonControllerSpawner;

#[derive(Debug, Bundle, Default)]
pub struct FirstPersonControllerBundle {
    #[bundle]
    pub spatial: SpatialBundle,
    pub spawner: FirstPersonControllerSpawner,
}

impl FirstPersonControllerBundle {
    pub fn at(position: Vec3) -> Self {
        FirstPersonControllerBundle {
            spatial: SpatialBundle::from_transform(Transform::from_translation(position)),
            spawner: FirstPersonControllerSpawner,
        }
    }
}

fn walking_groups() -> CollisionGroups {
    CollisionGroups::new(PLAYER_GROUP, ALL_GROUPS)
}

/// Only the mirror pads still see the player while flying.
fn flying_groups() -> CollisionGroups {
    CollisionGroups::new(PLAYER_GROUP, MIRROR_PAD_GROUP)
}

fn spawn_controller(
    mut commands: Commands,
    spawners_query: Query<Entity, With<FirstPersonControllerSpawner>>,
) {
    for id in &spawners_query {
        const CAMERA_OFFSET: Vec3 = Vec3::new(0., EYE_HEIGHT - PLAYER_HEIGHT / 2., 0.);

        let camera = commands
            .spawn((
                Camera3dBundle {
                    projection: Projection::Perspective(PerspectiveProjection {
                        fov: std::f32::consts::FRAC_PI_3,
                        near: 0.1,
                        far: 1000.,
                        ..default()
                    }),
                    ..default()
                },
                Name::from("Player camera"),
                FirstPersonCamera,
            ))
            .id();

        let camera_anchor = commands
            .spawn((
                SpatialBundle::from_transform(Transform::from_translation(CAMERA_OFFSET)),
                Name::from("Camera anchor"),
            ))
            .add_child(camera)
            .id();

        commands
            .entity(id)
            .insert(InputManagerBundle {
                action_state: ActionState::default(),
                input_map: default_input_map(),
            })
            .insert((
                RigidBody::Dynamic,
                Collider::capsule_y(PLAYER_HEIGHT / 2. - PLAYER_RADIUS, PLAYER_RADIUS),
                LockedAxes::ROTATION_LOCKED,
                Velocity::default(),
                GravityScale(1.),
                Ccd::enabled(),
                ActiveEvents::COLLISION_EVENTS,
                walking_groups(),
                Name::from("Player"),
                FirstPersonController {
                    theta: Angle::zero(),
                    phi: Angle::zero(),
                    camera_anchor,
                    flying: false,
                },
            ))
            .add_child(camera_anchor)
            .remove::<FirstPersonControllerSpawner>();

        info!("Player controller spawned");
    }
}

/// -1, 0 or 1 depending on which of two opposed inputs is held.
fn axis(positive: bool, negative: bool) -> f32 {
    match (positive, negative) {
        (true, false) => 1.,
        (false, true) => -1.,
        _ => 0.,
    }
}

/// Horizontal velocity for the given facing and held directions. Diagonals are not faster.
fn planar_velocity(forward: Vec3, left: Vec3, forward_axis: f32, left_axis: f32, speed: f32) -> Vec3 {
    let direction = forward * forward_axis + left * left_axis;
    let direction = Vec3::new(direction.x, 0., direction.z).normalize_or_zero();
    direction * speed
}

fn process_controller_inputs(
    settings: Res<GameSettings>,
    mut player_query: Query<(
        &ActionState<Actions>,
        &mut FirstPersonController,
        &mut Velocity,
        &mut GravityScale,
        &mut CollisionGroups,
        &mut Transform,
    )>,
    mut anchor_query: Query<&mut Transform, Without<FirstPersonController>>,
) {
    let PlayerSettings {
        speed,
        fly_speed,
        sprint_multiplier,
        jump_velocity,
        mouse_sensitivity,
    } = settings.player.clone();

    for (input_state, mut controller, mut velocity, mut gravity, mut groups, mut transform) in
        &mut player_query
    {
        if input_state.just_pressed(Actions::ToggleFly) {
            controller.flying = !controller.flying;
            if controller.flying {
                gravity.0 = 0.;
                *groups = flying_groups();
            } else {
                gravity.0 = 1.;
                *groups = walking_groups();
            }
            info!("Fly mode {}", if controller.flying { "on" } else { "off" });
        }

        let forward_axis = axis(
            input_state.pressed(Actions::Forward),
            input_state.pressed(Actions::Backwards),
        );
        let left_axis = axis(
            input_state.pressed(Actions::StrafeLeft),
            input_state.pressed(Actions::StrafeRight),
        );

        if controller.flying {
            let planar = planar_velocity(
                transform.forward(),
                transform.left(),
                forward_axis,
                left_axis,
                fly_speed,
            );
            let vertical = axis(
                input_state.pressed(Actions::FlyUp),
                input_state.pressed(Actions::FlyDown),
            ) * fly_speed;
            velocity.linvel = Vec3::new(planar.x, vertical, planar.z);
        } else {
            let k = if input_state.pressed(Actions::Sprint) {
                sprint_multiplier
            } else {
                1.
            };
            let planar = planar_velocity(
                transform.forward(),
                transform.left(),
                forward_axis,
                left_axis,
                speed * k,
            );
            let mut vertical = velocity.linvel.y;
            if input_state.just_pressed(Actions::Jump) && vertical.abs() < GROUNDED_VERTICAL_SPEED {
                vertical = jump_velocity;
            }
            velocity.linvel = Vec3::new(planar.x, vertical, planar.z);
        }

        // Yaw turns the player root, pitch only the camera anchor, so the body stays upright.
        if let Some(mouse_movement) = input_state.axis_pair(Actions::Aim) {
            controller.theta += Angle::radians(mouse_movement.x() * mouse_sensitivity);
            controller.phi += Angle::radians(mouse_movement.y() * mouse_sensitivity);
            controller.phi.radians = controller.phi.radians.clamp(-FRAC_PI_2, FRAC_PI_2);

            transform.rotation = Quat::from_rotation_y(-controller.theta.radians);
            if let Ok(mut anchor_transform) = anchor_query.get_mut(controller.camera_anchor) {
                anchor_transform.rotation = Quat::from_axis_angle(Vec3::X, -controller.phi.radians);
            }
        }
        velocity.angvel = Vec3::ZERO;
    }
}

pub(crate) fn place_player(transform: &mut Transform, velocity: &mut Velocity, position: Vec3) {
    transform.translation = position;
    *velocity = Velocity::zero();
}

/// Move the player to the new spawn while the screen is black.
fn place_player_on_swap(
    mut transitions: EventReader<TransitionEvent>,
    mut player_query: Query<(&mut Transform, &mut Velocity), With<FirstPersonController>>,
) {
    for event in transitions.iter() {
        if let TransitionEvent::Swapped { spawn, .. } = event {
            for (mut transform, mut velocity) in &mut player_query {
                place_player(&mut transform, &mut velocity, *spawn);
            }
        }
    }
}

fn catch_fallen_player(
    controller: Res<TransitionController>,
    mut player_query: Query<(&mut Transform, &mut Velocity), With<FirstPersonController>>,
) {
    for (mut transform, mut velocity) in &mut player_query {
        if transform.translation.y < KILL_PLANE_HEIGHT {
            warn!(
                "Player fell out of level {}, back to spawn",
                controller.level_id()
            );
            place_player(&mut transform, &mut velocity, controller.spawn_position());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{levels::LevelId, transition::TransitionTiming};

    #[test]
    fn test_opposed_inputs_cancel_out() {
        assert_eq!(axis(true, true), 0.);
        assert_eq!(axis(false, false), 0.);
        assert_eq!(axis(true, false), 1.);
        assert_eq!(axis(false, true), -1.);
    }

    #[test]
    fn test_diagonal_is_not_faster() {
        let v = planar_velocity(Vec3::NEG_Z, Vec3::NEG_X, 1., 1., 5.);
        assert!((v.length() - 5.).abs() < 1e-5);
        assert_eq!(v.y, 0.);
    }

    #[test]
    fn test_no_input_no_motion() {
        let v = planar_velocity(Vec3::NEG_Z, Vec3::NEG_X, 0., 0., 5.);
        assert_eq!(v, Vec3::ZERO);
    }

    fn player_app() -> (App, Entity) {
        let mut app = App::new();
        app.add_event::<TransitionEvent>()
            .insert_resource(TransitionController::new(
                LevelId(1),
                Vec3::new(0., 1.6, 22.),
                TransitionTiming::default(),
            ))
            .add_system(place_player_on_swap)
            .add_system(catch_fallen_player);
        let anchor = app.world.spawn_empty().id();
        let player = app
            .world
            .spawn((
                Transform::from_xyz(3., 1., 3.),
                Velocity::linear(Vec3::new(1., -2., 0.)),
                FirstPersonController {
                    theta: Angle::zero(),
                    phi: Angle::zero(),
                    camera_anchor: anchor,
                    flying: false,
                },
            ))
            .id();
        (app, player)
    }

    #[test]
    fn test_player_moved_to_spawn_on_swap() {
        let (mut app, player) = player_app();
        let spawn = Vec3::new(0., 1.6, -25.);
        app.world
            .resource_mut::<Events<TransitionEvent>>()
            .send(TransitionEvent::Swapped {
                token: 1,
                level: LevelId(2),
                spawn,
            });
        app.update();

        assert_eq!(app.world.get::<Transform>(player).unwrap().translation, spawn);
        assert_eq!(app.world.get::<Velocity>(player).unwrap().linvel, Vec3::ZERO);
    }

    #[test]
    fn test_fallen_player_returns_to_spawn() {
        let (mut app, player) = player_app();
        app.world.get_mut::<Transform>(player).unwrap().translation.y = KILL_PLANE_HEIGHT - 1.;
        app.update();

        assert_eq!(
            app.world.get::<Transform>(player).unwrap().translation,
            Vec3::new(0., 1.6, 22.)
        );
    }
}
