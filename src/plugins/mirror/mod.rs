//! Rotatable mirrors of the beam puzzle, and the floor pads used to turn them.

use std::time::Duration;

use bevy::{prelude::*, reflect::FromReflect};
use bevy_rapier3d::prelude::*;
use euclid::Angle;
use leafwing_input_manager::prelude::*;

use super::{
    first_person_controller::FirstPersonController, input::Actions, settings::GameSettings,
};

#[derive(Debug)]
pub struct MirrorPlugin;

impl Plugin for MirrorPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<MirrorState>()
            .init_resource::<RotateCooldown>()
            .add_system(track_pad_occupancy.label(MirrorLabels::TrackPads))
            .add_system(
                rotate_mirrors
                    .label(MirrorLabels::RotateMirrors)
                    .after(MirrorLabels::TrackPads),
            )
            .add_system(sync_mirror_transforms.after(MirrorLabels::RotateMirrors));
    }
}

#[derive(Debug, SystemLabel)]
pub enum MirrorLabels {
    TrackPads,
    RotateMirrors,
}

/// Mirror base position and rotation about the vertical axis. At 0° the reflective face
/// points towards +Z.
#[derive(Debug, Default, Clone, Component, Reflect, FromReflect)]
#[reflect(Component)]
pub struct MirrorState {
    pub position: Vec3,
    angle_degrees: f32,
}

impl MirrorState {
    pub fn new(position: Vec3, angle_degrees: f32) -> MirrorState {
        MirrorState {
            position,
            angle_degrees: angle_degrees.rem_euclid(360.),
        }
    }

    /// Current angle, in `[0, 360)` degrees.
    pub fn angle_degrees(&self) -> f32 {
        self.angle_degrees
    }

    pub fn angle(&self) -> Angle<f32> {
        Angle::degrees(self.angle_degrees)
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_rotation_y(self.angle().radians)
    }

    pub fn normal(&self) -> Vec3 {
        self.rotation().mul_vec3(Vec3::Z)
    }

    pub fn rotate(&mut self, step_degrees: f32) {
        self.angle_degrees = (self.angle_degrees + step_degrees).rem_euclid(360.);
    }
}

/// Floor pad which lets the player standing on it rotate the linked mirror.
#[derive(Debug, Component)]
pub struct MirrorPad {
    pub mirror: Entity,
    pub occupied: bool,
}

/// Rate limits rotations, so holding or bouncing the key only turns the mirror once.
#[derive(Debug, Default, Resource)]
pub struct RotateCooldown {
    ready_at: Duration,
}

impl RotateCooldown {
    pub fn try_trigger(&mut self, now: Duration, cooldown: Duration) -> bool {
        if now < self.ready_at {
            return false;
        }
        self.ready_at = now + cooldown;
        true
    }
}

fn track_pad_occupancy(
    mut collisions: EventReader<CollisionEvent>,
    player_query: Query<Entity, With<FirstPersonController>>,
    mut pads_query: Query<&mut MirrorPad>,
) {
    let player = match player_query.get_single() {
        Ok(player) => player,
        Err(_) => return,
    };
    for collision in collisions.iter() {
        let (collider_a, collider_b, occupied) = match collision {
            CollisionEvent::Started(a, b, _flags) => (*a, *b, true),
            CollisionEvent::Stopped(a, b, _flags) => (*a, *b, false),
        };
        let pad_entity = if collider_a == player {
            collider_b
        } else if collider_b == player {
            collider_a
        } else {
            continue;
        };
        if let Ok(mut pad) = pads_query.get_mut(pad_entity) {
            debug!("Player {} mirror pad {:?}", if occupied { "entered" } else { "left" }, pad_entity);
            pad.occupied = occupied;
        }
    }
}

fn rotate_mirrors(
    time: Res<Time>,
    settings: Res<GameSettings>,
    mut cooldown: ResMut<RotateCooldown>,
    player_query: Query<&ActionState<Actions>, With<FirstPersonController>>,
    pads_query: Query<&MirrorPad>,
    mut mirrors_query: Query<&mut MirrorState>,
) {
    let pressed = player_query
        .get_single()
        .map_or(false, |actions| actions.just_pressed(Actions::Interact));
    if !pressed {
        return;
    }
    let mut occupied_pads = pads_query.iter().filter(|pad| pad.occupied).peekable();
    if occupied_pads.peek().is_none() {
        return;
    }
    if !cooldown.try_trigger(time.elapsed(), settings.mirror.rotate_cooldown()) {
        return;
    }
    for pad in occupied_pads {
        if let Ok(mut mirror) = mirrors_query.get_mut(pad.mirror) {
            mirror.rotate(settings.mirror.rotation_step_degrees);
            info!("Mirror rotated to {}°", mirror.angle_degrees());
        }
    }
}

fn sync_mirror_transforms(
    mut mirrors_query: Query<(&MirrorState, &mut Transform), Changed<MirrorState>>,
) {
    for (mirror, mut transform) in &mut mirrors_query {
        transform.translation = mirror.position;
        transform.rotation = mirror.rotation();
    }
}
