use std::f32::consts::*;

use bevy::prelude::*;
use bevy_prototype_debug_lines::DebugLinesPlugin;
use bevy_rapier3d::prelude::*;
use iyes_loopless::prelude::*;

use crate::plugins::*;

use super::{
    levels::LevelRegistry,
    settings::GameSettings,
    transition::{TransitionController, TransitionTiming},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameState {
    /// A level is being spawned.
    Loading,
    InGame,
}

#[derive(Debug)]
/// Main game plugin, responsible for loading the other game plugins and bootstrapping the game.
pub struct GamePlugin;

impl Plugin for GamePlugin {
    fn build(&self, app: &mut App) {
        let settings = match app.world.get_resource::<GameSettings>() {
            Some(settings) => settings.clone(),
            None => {
                let settings = GameSettings::load();
                app.insert_resource(settings.clone());
                settings
            }
        };

        app.add_plugins(DefaultPlugins.set(WindowPlugin {
            window: WindowDescriptor {
                title: settings.window.title.clone(),
                width: settings.window.width,
                height: settings.window.height,
                ..default()
            },
            ..default()
        }));

        #[cfg(feature = "devel")]
        {
            app.add_plugins(debug::DeveloperPlugins);
        }

        let registry = match LevelRegistry::embedded() {
            Ok(registry) => registry,
            Err(e) => {
                error!("Invalid level registry: {}", e);
                panic!("Invalid level registry: {}", e);
            }
        };
        let start = registry.start_level();
        info!("Starting in level {} \"{}\"", start.id, start.name);
        app.insert_resource(TransitionController::new(
            start.id,
            start.spawn_position(),
            TransitionTiming::from(&settings),
        ));
        app.insert_resource(registry);

        app.add_loopless_state(GameState::Loading);

        app.add_plugin(RapierPhysicsPlugin::<NoUserData>::default());
        app.add_plugin(DebugLinesPlugin::default());
        app.add_plugin(physics::PhysicsPlugin);
        app.add_plugin(input::InputPlugin);
        app.add_plugin(first_person_controller::FirstPersonControllerPlugin);
        app.add_plugin(transition::TransitionPlugin);
        app.add_plugin(levels::LevelsPlugin);
        app.add_plugin(portal::PortalPlugin);
        app.add_plugin(mirror::MirrorPlugin);
        app.add_plugin(beam::BeamPlugin);
        app.add_plugin(audio::AmbientAudioPlugin);
        app.add_plugin(hud::HudPlugin);
        app.add_plugin(lore::LorePlugin);

        app.add_startup_system(setup);
    }
}

/// Lighting shared by every level.
fn setup(mut commands: Commands) {
    commands.insert_resource(AmbientLight {
        color: Color::WHITE,
        brightness: 0.3,
    });

    commands.spawn((
        DirectionalLightBundle {
            directional_light: DirectionalLight {
                color: Color::ANTIQUE_WHITE,
                illuminance: 20_000.,
                shadows_enabled: true,
                ..default()
            },
            transform: Transform {
                translation: Vec3::Y * 5.,
                rotation: Quat::from_euler(EulerRot::YXZ, FRAC_PI_4, -FRAC_PI_4, 0.),
                scale: Vec3::ONE,
            },
            ..default()
        },
        Name::from("Sun"),
    ));
}
