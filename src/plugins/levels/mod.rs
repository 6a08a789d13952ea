//! Level instantiation.
//!
//! The [`LevelManager`] spawns the level the [`TransitionController`] points at: once at
//! startup, then each time a transition swaps levels. The player entity survives level swaps.

use bevy::prelude::*;
use iyes_loopless::prelude::*;
use thiserror::Error;

mod arena;
mod registry;

pub use registry::*;

use super::{
    beam::{spawn_puzzle, PuzzleResources},
    first_person_controller::FirstPersonControllerBundle,
    game::GameState,
    portal::{spawn_portal, PortalResources},
    settings::GameSettings,
    transition::{TransitionController, TransitionEvent, TransitionLabels},
};

#[derive(Debug)]
pub struct LevelsPlugin;

impl Plugin for LevelsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LevelManager>()
            .add_startup_system(LevelManager::request_start_level)
            .add_enter_system(GameState::Loading, LevelManager::check_pending_spawn)
            .add_system(
                LevelManager::swap_level_on_transition
                    .label(LevelLabels::RequestSwap)
                    .after(TransitionLabels::Advance),
            )
            .add_system(
                LevelManager::spawn_level_system
                    .run_in_state(GameState::Loading)
                    .label(LevelLabels::SpawnLevel)
                    .after(LevelLabels::RequestSwap),
            );
    }
}

#[derive(Debug, SystemLabel)]
pub enum LevelLabels {
    RequestSwap,
    SpawnLevel,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpawnError {
    #[error("level {requested} requested while level {pending} is being spawned")]
    AlreadySpawning { pending: LevelId, requested: LevelId },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum SpawnState {
    #[default]
    Idle,
    Pending(LevelId),
}

/// Root entity of the instantiated level, everything level specific is parented to it.
#[derive(Debug, Component)]
pub struct LevelRoot(pub LevelId);

/// The level currently instantiated in the world.
#[derive(Debug, Clone, Resource)]
pub struct CurrentLevel {
    pub id: LevelId,
    pub name: String,
}

#[derive(Debug, Default, Resource)]
pub struct LevelManager {
    spawn_state: SpawnState,
    level_root: Option<Entity>,
    player_entity: Option<Entity>,
}

impl LevelManager {
    pub fn is_spawning(&self) -> bool {
        self.spawn_state != SpawnState::Idle
    }

    /// Queue `level` for spawning. The caller switches the game to [`GameState::Loading`].
    pub fn instantiate_level(&mut self, level: LevelId) -> Result<(), SpawnError> {
        if let SpawnState::Pending(pending) = self.spawn_state {
            return Err(SpawnError::AlreadySpawning {
                pending,
                requested: level,
            });
        }
        debug!("Level {} spawn pending", level);
        self.spawn_state = SpawnState::Pending(level);
        Ok(())
    }

    fn request(&mut self, commands: &mut Commands, level: LevelId) {
        match self.instantiate_level(level) {
            Ok(()) => commands.insert_resource(NextState(GameState::Loading)),
            Err(e) => error!("Cannot spawn level: {}", e),
        }
    }

    pub(crate) fn request_start_level(
        mut commands: Commands,
        mut level_manager: ResMut<LevelManager>,
        controller: Res<TransitionController>,
    ) {
        level_manager.request(&mut commands, controller.level_id());
    }

    pub(crate) fn check_pending_spawn(level_manager: Res<LevelManager>) {
        if !level_manager.is_spawning() {
            error!(
                "Level manager in unexpected state {:?} during state transition",
                level_manager.spawn_state
            );
        }
    }

    pub(crate) fn swap_level_on_transition(
        mut commands: Commands,
        mut level_manager: ResMut<LevelManager>,
        mut transitions: EventReader<TransitionEvent>,
    ) {
        for event in transitions.iter() {
            if let TransitionEvent::Swapped { level, .. } = event {
                level_manager.request(&mut commands, *level);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn spawn_level_system(
        mut commands: Commands,
        mut level_manager: ResMut<LevelManager>,
        registry: Res<LevelRegistry>,
        settings: Res<GameSettings>,
        controller: Res<TransitionController>,
        portal_res: Res<PortalResources>,
        puzzle_res: Res<PuzzleResources>,
        mut meshes: ResMut<Assets<Mesh>>,
        mut materials: ResMut<Assets<StandardMaterial>>,
    ) {
        let id = match level_manager.spawn_state {
            SpawnState::Pending(id) => id,
            SpawnState::Idle => return,
        };
        level_manager.spawn_state = SpawnState::Idle;
        commands.insert_resource(NextState(GameState::InGame));

        let level = match registry.get(id) {
            Some(level) => level,
            None => {
                error!("Level {} is not in the registry, keeping the current one", id);
                return;
            }
        };

        if let Some(level_root) = level_manager.level_root.take() {
            info!("Despawning previous level");
            commands.entity(level_root).despawn_recursive();
        }

        let level_root = commands
            .spawn((
                SpatialBundle::default(),
                Name::from(level.name.clone()),
                LevelRoot(id),
            ))
            .with_children(|parent| {
                arena::spawn_arena(
                    parent,
                    &level.bounds,
                    level.ground_color(),
                    &mut meshes,
                    &mut materials,
                );
                for portal in &level.portals {
                    spawn_portal(
                        parent,
                        portal,
                        settings.portal.default_capture_radius,
                        &portal_res,
                    );
                }
                if let Some(puzzle) = &level.puzzle {
                    spawn_puzzle(parent, puzzle, settings.beam.capture_radius, &puzzle_res);
                }
            })
            .id();
        level_manager.level_root = Some(level_root);

        commands.insert_resource(ClearColor(level.sky_color()));
        commands.insert_resource(CurrentLevel {
            id,
            name: level.name.clone(),
        });

        if level_manager.player_entity.is_none() {
            let player = commands
                .spawn(FirstPersonControllerBundle::at(controller.spawn_position()))
                .id();
            level_manager.player_entity = Some(player);
        }

        info!("Level {} \"{}\" spawned", id, level.name);
    }
}

#[cfg(test)]
mod tests {
    use bevy::asset::AssetPlugin;

    use super::*;
    use crate::plugins::{
        beam::Emitter, first_person_controller::FirstPersonControllerSpawner, portal::Portal,
        transition::TransitionTiming,
    };

    #[test]
    fn test_second_request_is_rejected_while_pending() {
        let mut manager = LevelManager::default();
        assert!(manager.instantiate_level(LevelId(2)).is_ok());
        assert_eq!(
            manager.instantiate_level(LevelId(3)),
            Err(SpawnError::AlreadySpawning {
                pending: LevelId(2),
                requested: LevelId(3)
            })
        );
    }

    fn level_app() -> App {
        let registry = LevelRegistry::embedded().unwrap();
        let start = registry.start_level();
        let controller = TransitionController::new(
            start.id,
            start.spawn_position(),
            TransitionTiming::default(),
        );

        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .add_plugin(AssetPlugin::default())
            .add_asset::<Mesh>()
            .add_asset::<StandardMaterial>()
            .add_loopless_state(GameState::Loading)
            .insert_resource(registry)
            .insert_resource(controller)
            .insert_resource(GameSettings::default())
            .init_resource::<PortalResources>()
            .init_resource::<PuzzleResources>()
            .init_resource::<LevelManager>()
            .add_system(LevelManager::spawn_level_system.run_in_state(GameState::Loading));
        app
    }

    fn count<C: Component>(app: &mut App) -> usize {
        app.world.query::<&C>().iter(&app.world).count()
    }

    #[test]
    fn test_spawn_start_level_and_swap() {
        let mut app = level_app();
        app.world
            .resource_mut::<LevelManager>()
            .instantiate_level(LevelId(1))
            .unwrap();
        app.update();

        assert_eq!(app.world.resource::<CurrentLevel>().id, LevelId(1));
        assert_eq!(count::<LevelRoot>(&mut app), 1);
        assert_eq!(count::<Portal>(&mut app), 1);
        assert_eq!(count::<FirstPersonControllerSpawner>(&mut app), 1);
        assert!(!app.world.resource::<LevelManager>().is_spawning());

        app.world
            .resource_mut::<LevelManager>()
            .instantiate_level(LevelId(3))
            .unwrap();
        app.insert_resource(NextState(GameState::Loading));
        app.update();

        assert_eq!(app.world.resource::<CurrentLevel>().name, "Re-evaluation");
        assert_eq!(count::<LevelRoot>(&mut app), 1);
        assert_eq!(count::<Portal>(&mut app), 1);
        assert_eq!(count::<Emitter>(&mut app), 2);
        // The player is kept across levels.
        assert_eq!(count::<FirstPersonControllerSpawner>(&mut app), 1);
    }
}
