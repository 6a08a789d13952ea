use bevy::prelude::*;
use bevy_rapier3d::prelude::{Group, RapierConfiguration, TimestepMode};

pub const WALLS_GROUP: Group = Group::GROUP_1;
pub const GROUND_GROUP: Group = Group::GROUP_2;
pub const PLAYER_GROUP: Group = Group::GROUP_3;
pub const MIRROR_PAD_GROUP: Group = Group::GROUP_4;
pub const ALL_GROUPS: Group = Group::ALL;

/// Below this height the player fell out of the arena and is put back on the spawn.
pub const KILL_PLANE_HEIGHT: f32 = -20.;

#[derive(Debug)]
pub struct PhysicsPlugin;

impl Plugin for PhysicsPlugin {
    fn build(&self, app: &mut App) {
        app.add_startup_system(configure_rapier);
    }
}

fn configure_rapier(mut config: ResMut<RapierConfiguration>) {
    // Substeps keep the player from tunnelling through thin mirror slabs at sprint speed
    config.timestep_mode = TimestepMode::Variable {
        max_dt: 1. / 20.,
        time_scale: 1.,
        substeps: 4,
    }
}
