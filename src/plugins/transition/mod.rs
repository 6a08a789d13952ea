//! Portal-driven level transitions.
//!
//! The [`TransitionController`] resource is the single owner of the current level id, the
//! current spawn position and the transition phase. Every other system only reads it, or
//! reacts to the [`TransitionEvent`]s it emits.

use std::time::Duration;

use bevy::prelude::*;
use iyes_loopless::prelude::*;

mod overlay;

use super::{
    first_person_controller::FirstPersonCamera,
    game::GameState,
    levels::LevelId,
    portal::Portal,
    settings::GameSettings,
};

#[derive(Debug)]
pub struct TransitionPlugin;

impl Plugin for TransitionPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<TransitionEvent>()
            .add_startup_system(overlay::spawn_fade_overlay)
            .add_system(advance_transition.label(TransitionLabels::Advance))
            .add_system(
                detect_portal_entry
                    .run_in_state(GameState::InGame)
                    .label(TransitionLabels::DetectPortalEntry)
                    .after(TransitionLabels::Advance),
            )
            .add_system(overlay::update_fade_overlay.after(TransitionLabels::DetectPortalEntry));
    }
}

#[derive(Debug, SystemLabel)]
pub enum TransitionLabels {
    Advance,
    DetectPortalEntry,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionPhase {
    #[default]
    Idle,
    FadingOut,
    /// Level and spawn are being replaced. Never observable between two ticks.
    Swapping,
    FadingIn,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransitionEvent {
    Started {
        token: u64,
        target_level: LevelId,
    },
    /// The authoritative level and spawn were replaced.
    Swapped {
        token: u64,
        level: LevelId,
        spawn: Vec3,
    },
    Finished {
        token: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionTiming {
    pub fade_out: Duration,
    pub fade_in: Duration,
}

impl Default for TransitionTiming {
    fn default() -> Self {
        TransitionTiming {
            fade_out: Duration::from_millis(1000),
            fade_in: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingTarget {
    level: LevelId,
    spawn: Vec3,
}

#[derive(Debug, Resource)]
pub struct TransitionController {
    phase: TransitionPhase,
    level: LevelId,
    spawn: Vec3,
    token: u64,
    phase_started: Duration,
    pending: Option<PendingTarget>,
    timing: TransitionTiming,
}

impl TransitionController {
    pub fn new(level: LevelId, spawn: Vec3, timing: TransitionTiming) -> TransitionController {
        TransitionController {
            phase: TransitionPhase::Idle,
            level,
            spawn,
            token: 0,
            phase_started: Duration::ZERO,
            pending: None,
            timing,
        }
    }

    pub fn level_id(&self) -> LevelId {
        self.level
    }

    pub fn spawn_position(&self) -> Vec3 {
        self.spawn
    }

    pub fn phase(&self) -> TransitionPhase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == TransitionPhase::Idle
    }

    /// Token of the latest accepted transition, 0 if none was ever started.
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Return the first enabled portal the player is strictly inside of.
    /// Always `None` while a transition is in flight.
    pub fn check_proximity<'a, I>(&self, player_position: Vec3, portals: I) -> Option<&'a Portal>
    where
        I: IntoIterator<Item = &'a Portal>,
    {
        if !self.is_idle() {
            return None;
        }
        portals
            .into_iter()
            .find(|portal| portal.contains(player_position))
    }

    /// Start a transition through `portal`. Returns whether it was accepted; a transition
    /// already in flight makes this a no-op.
    pub fn enter_portal(&mut self, portal: &Portal, now: Duration) -> bool {
        if !self.is_idle() {
            debug!(
                "Ignoring portal {} while transition {} is in flight",
                portal.display_label(),
                self.token
            );
            return false;
        }
        self.token += 1;
        self.phase = TransitionPhase::FadingOut;
        self.phase_started = now;
        self.pending = Some(PendingTarget {
            level: portal.target_level,
            spawn: portal.target_spawn,
        });
        true
    }

    /// Advance the phases up to `now`. Deadlines are anchored on the scheduled phase start,
    /// so a late tick still swaps at `start + fade_out` and finishes at
    /// `start + fade_out + fade_in`.
    pub fn tick(&mut self, now: Duration) -> Vec<TransitionEvent> {
        let mut events = Vec::new();

        if self.phase == TransitionPhase::FadingOut
            && now.saturating_sub(self.phase_started) >= self.timing.fade_out
        {
            self.phase = TransitionPhase::Swapping;
            if let Some(target) = self.pending.take() {
                self.level = target.level;
                self.spawn = target.spawn;
            }
            self.phase_started += self.timing.fade_out;
            self.phase = TransitionPhase::FadingIn;
            events.push(TransitionEvent::Swapped {
                token: self.token,
                level: self.level,
                spawn: self.spawn,
            });
        }

        if self.phase == TransitionPhase::FadingIn
            && now.saturating_sub(self.phase_started) >= self.timing.fade_in
        {
            self.phase = TransitionPhase::Idle;
            self.phase_started += self.timing.fade_in;
            events.push(TransitionEvent::Finished { token: self.token });
        }

        events
    }

    /// Opacity of the fade overlay at `now`, in `[0, 1]`.
    pub fn fade_alpha(&self, now: Duration) -> f32 {
        let elapsed = now.saturating_sub(self.phase_started);
        match self.phase {
            TransitionPhase::Idle => 0.,
            TransitionPhase::Swapping => 1.,
            TransitionPhase::FadingOut => ramp(elapsed, self.timing.fade_out),
            TransitionPhase::FadingIn => 1. - ramp(elapsed, self.timing.fade_in),
        }
    }
}

fn ramp(elapsed: Duration, total: Duration) -> f32 {
    if total.is_zero() {
        return 1.;
    }
    (elapsed.as_secs_f32() / total.as_secs_f32()).clamp(0., 1.)
}

impl From<&GameSettings> for TransitionTiming {
    fn from(settings: &GameSettings) -> Self {
        TransitionTiming {
            fade_out: settings.transition.fade_out(),
            fade_in: settings.transition.fade_in(),
        }
    }
}

fn advance_transition(
    time: Res<Time>,
    mut controller: ResMut<TransitionController>,
    mut events: EventWriter<TransitionEvent>,
) {
    if controller.is_idle() {
        return;
    }
    for event in controller.tick(time.elapsed()) {
        match event {
            TransitionEvent::Swapped { level, spawn, .. } => {
                info!("Transition swapped to level {} at {}", level, spawn)
            }
            TransitionEvent::Finished { token } => info!("Transition {} finished", token),
            TransitionEvent::Started { .. } => {}
        }
        events.send(event);
    }
}

/// Check the player against every portal of the current level, using a single position
/// snapshot for the whole frame.
fn detect_portal_entry(
    time: Res<Time>,
    mut controller: ResMut<TransitionController>,
    mut events: EventWriter<TransitionEvent>,
    camera_query: Query<&GlobalTransform, With<FirstPersonCamera>>,
    portal_query: Query<&Portal>,
) {
    if !controller.is_idle() {
        return;
    }
    if let Ok(camera) = camera_query.get_single() {
        let player_position = camera.translation();
        let entered = controller
            .check_proximity(player_position, &portal_query)
            .cloned();
        if let Some(portal) = entered {
            if controller.enter_portal(&portal, time.elapsed()) {
                info!(
                    "Entering portal \"{}\" towards level {}",
                    portal.display_label(),
                    portal.target_level
                );
                events.send(TransitionEvent::Started {
                    token: controller.token(),
                    target_level: portal.target_level,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bevy::ecs::event::ManualEventReader;

    use super::*;

    const D1: Duration = Duration::from_millis(1000);
    const D2: Duration = Duration::from_millis(1000);

    fn controller() -> TransitionController {
        TransitionController::new(
            LevelId(1),
            Vec3::new(0., 1.6, 0.),
            TransitionTiming {
                fade_out: D1,
                fade_in: D2,
            },
        )
    }

    fn portal_at(position: Vec3, target: u32, target_spawn: Vec3) -> Portal {
        Portal {
            position,
            capture_radius: 2.,
            target_level: LevelId(target),
            target_spawn,
            label: None,
            enabled: true,
        }
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_proximity_is_strict() {
        let controller = controller();
        let portal = portal_at(Vec3::ZERO, 2, Vec3::ZERO);
        let portals = [portal];

        assert!(controller
            .check_proximity(Vec3::new(1.99, 0., 0.), &portals)
            .is_some());
        assert!(controller
            .check_proximity(Vec3::new(2., 0., 0.), &portals)
            .is_none());
        assert!(controller
            .check_proximity(Vec3::new(0., 0., 5.), &portals)
            .is_none());
    }

    #[test]
    fn test_proximity_uses_3d_distance() {
        let controller = controller();
        let portals = [portal_at(Vec3::ZERO, 2, Vec3::ZERO)];
        // Within 2 units horizontally, but too high above.
        assert!(controller
            .check_proximity(Vec3::new(1., 1.8, 0.), &portals)
            .is_none());
    }

    #[test]
    fn test_proximity_skips_disabled_portals() {
        let controller = controller();
        let mut disabled = portal_at(Vec3::ZERO, 2, Vec3::ZERO);
        disabled.enabled = false;
        let enabled = portal_at(Vec3::new(1., 0., 0.), 3, Vec3::ZERO);
        let portals = [disabled, enabled];

        let found = controller.check_proximity(Vec3::new(0.5, 0., 0.), &portals);
        assert_eq!(found.map(|p| p.target_level), Some(LevelId(3)));
    }

    #[test]
    fn test_proximity_returns_first_match() {
        let controller = controller();
        let portals = [
            portal_at(Vec3::ZERO, 2, Vec3::ZERO),
            portal_at(Vec3::new(0.5, 0., 0.), 3, Vec3::ZERO),
        ];
        let found = controller.check_proximity(Vec3::new(0.25, 0., 0.), &portals);
        assert_eq!(found.map(|p| p.target_level), Some(LevelId(2)));
    }

    #[test]
    fn test_proximity_suppressed_mid_transition() {
        let mut controller = controller();
        let portals = [portal_at(Vec3::ZERO, 2, Vec3::ZERO)];
        assert!(controller.enter_portal(&portals[0], ms(0)));
        assert!(controller.check_proximity(Vec3::ZERO, &portals).is_none());
    }

    #[test]
    fn test_transition_timing() {
        let mut controller = controller();
        let spawn = Vec3::new(0., 1.6, 30.);
        let portal = portal_at(Vec3::ZERO, 2, spawn);
        let start = ms(5_000);

        assert!(controller.enter_portal(&portal, start));
        assert_eq!(controller.phase(), TransitionPhase::FadingOut);

        assert!(controller.tick(start + ms(999)).is_empty());
        assert_eq!(controller.phase(), TransitionPhase::FadingOut);
        assert_eq!(controller.level_id(), LevelId(1));

        let events = controller.tick(start + D1);
        assert_eq!(
            events,
            vec![TransitionEvent::Swapped {
                token: 1,
                level: LevelId(2),
                spawn
            }]
        );
        assert_eq!(controller.phase(), TransitionPhase::FadingIn);
        assert_eq!(controller.level_id(), LevelId(2));
        assert_eq!(controller.spawn_position(), spawn);

        assert!(controller.tick(start + D1 + ms(999)).is_empty());
        assert_eq!(controller.phase(), TransitionPhase::FadingIn);

        let events = controller.tick(start + D1 + D2);
        assert_eq!(events, vec![TransitionEvent::Finished { token: 1 }]);
        assert!(controller.is_idle());
    }

    #[test]
    fn test_late_tick_applies_both_steps() {
        let mut controller = controller();
        let portal = portal_at(Vec3::ZERO, 3, Vec3::ONE);
        controller.enter_portal(&portal, ms(0));

        let events = controller.tick(ms(10_000));
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], TransitionEvent::Swapped { .. }));
        assert!(matches!(events[1], TransitionEvent::Finished { .. }));
        assert!(controller.is_idle());
        assert_eq!(controller.level_id(), LevelId(3));
    }

    #[test]
    fn test_reentrant_enter_is_rejected() {
        let mut controller = controller();
        let first = portal_at(Vec3::ZERO, 2, Vec3::new(0., 1.6, 30.));
        let second = portal_at(Vec3::ZERO, 3, Vec3::new(9., 9., 9.));

        assert!(controller.enter_portal(&first, ms(0)));
        assert!(!controller.enter_portal(&second, ms(1)));
        assert_eq!(controller.token(), 1);

        controller.tick(ms(1000));
        // Still in flight while fading in.
        assert!(!controller.enter_portal(&second, ms(1500)));
        controller.tick(ms(2000));

        assert!(controller.is_idle());
        assert_eq!(controller.level_id(), LevelId(2));
        assert_eq!(controller.spawn_position(), Vec3::new(0., 1.6, 30.));
    }

    #[test]
    fn test_level_changes_once_per_transition() {
        let mut controller = controller();
        let portal = portal_at(Vec3::ZERO, 2, Vec3::ZERO);
        controller.enter_portal(&portal, ms(0));
        controller.enter_portal(&portal, ms(0));

        let swaps = (0..=40)
            .flat_map(|frame| controller.tick(ms(frame * 100)))
            .filter(|e| matches!(e, TransitionEvent::Swapped { .. }))
            .count();
        assert_eq!(swaps, 1);
    }

    #[test]
    fn test_new_transition_after_finish() {
        let mut controller = controller();
        let there = portal_at(Vec3::ZERO, 2, Vec3::ZERO);
        let back = portal_at(Vec3::ZERO, 1, Vec3::ONE);

        controller.enter_portal(&there, ms(0));
        controller.tick(ms(2000));
        assert!(controller.enter_portal(&back, ms(2500)));
        assert_eq!(controller.token(), 2);
        controller.tick(ms(4500));
        assert_eq!(controller.level_id(), LevelId(1));
        assert!(controller.is_idle());
    }

    #[test]
    fn test_fade_alpha_follows_phases() {
        let mut controller = controller();
        assert_eq!(controller.fade_alpha(ms(0)), 0.);

        controller.enter_portal(&portal_at(Vec3::ZERO, 2, Vec3::ZERO), ms(0));
        assert!((controller.fade_alpha(ms(500)) - 0.5).abs() < 1e-6);

        controller.tick(ms(1000));
        assert!((controller.fade_alpha(ms(1000)) - 1.).abs() < 1e-6);
        assert!((controller.fade_alpha(ms(1750)) - 0.25).abs() < 1e-6);

        controller.tick(ms(2000));
        assert_eq!(controller.fade_alpha(ms(2000)), 0.);
    }

    fn transition_app(state: GameState) -> App {
        let mut app = App::new();
        app.add_event::<TransitionEvent>()
            .insert_resource(Time::default())
            .insert_resource(controller())
            .add_loopless_state(state)
            .add_system(advance_transition.label(TransitionLabels::Advance))
            .add_system(
                detect_portal_entry
                    .run_in_state(GameState::InGame)
                    .after(TransitionLabels::Advance),
            );
        app.world.spawn((
            FirstPersonCamera,
            GlobalTransform::from_translation(Vec3::new(0.5, 1.6, -30.)),
        ));
        app.world.spawn(portal_at(
            Vec3::new(0., 1., -30.),
            2,
            Vec3::new(0., 1.6, 22.),
        ));
        app
    }

    /// Run one frame at `millis` after startup and return the events it sent.
    fn frame_at(
        app: &mut App,
        reader: &mut ManualEventReader<TransitionEvent>,
        millis: u64,
    ) -> Vec<TransitionEvent> {
        let startup = app.world.resource::<Time>().startup();
        app.world
            .resource_mut::<Time>()
            .update_with_instant(startup + ms(millis));
        app.update();
        let events = app.world.resource::<Events<TransitionEvent>>();
        reader.iter(events).copied().collect()
    }

    #[test]
    fn test_portal_entry_starts_then_swaps() {
        let mut app = transition_app(GameState::InGame);
        let mut reader = ManualEventReader::default();

        assert_eq!(
            frame_at(&mut app, &mut reader, 100),
            vec![TransitionEvent::Started {
                token: 1,
                target_level: LevelId(2)
            }]
        );
        // Still standing in the portal, but a transition is in flight.
        assert!(frame_at(&mut app, &mut reader, 600).is_empty());
        assert_eq!(
            frame_at(&mut app, &mut reader, 1100),
            vec![TransitionEvent::Swapped {
                token: 1,
                level: LevelId(2),
                spawn: Vec3::new(0., 1.6, 22.)
            }]
        );
        assert!(frame_at(&mut app, &mut reader, 1500).is_empty());
        assert_eq!(app.world.resource::<TransitionController>().token(), 1);
    }

    #[test]
    fn test_no_portal_entry_while_loading() {
        let mut app = transition_app(GameState::Loading);
        let mut reader = ManualEventReader::default();

        assert!(frame_at(&mut app, &mut reader, 100).is_empty());
        assert!(app.world.resource::<TransitionController>().is_idle());
    }
}
