//! Lore scroll: a panel with background text about the current level, opened with `P`.

use bevy::prelude::*;
use leafwing_input_manager::prelude::*;

use super::{
    first_person_controller::FirstPersonController,
    hud::UiFonts,
    input::Actions,
    levels::{CurrentLevel, LevelId, LevelLabels, LevelRegistry, LoreDef},
    transition::{TransitionController, TransitionEvent, TransitionLabels},
};

pub const LORE_HINT: &str = "Press P to read about this world";

#[derive(Debug)]
pub struct LorePlugin;

impl Plugin for LorePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LoreScroll>()
            .add_startup_system(spawn_lore_ui)
            .add_system(
                close_lore_on_transition
                    .label(LoreLabels::CloseOnTransition)
                    .after(TransitionLabels::DetectPortalEntry),
            )
            .add_system(
                toggle_lore
                    .label(LoreLabels::Toggle)
                    .after(LoreLabels::CloseOnTransition),
            )
            .add_system(sync_lore_visibility.after(LoreLabels::Toggle))
            .add_system(update_lore_text.after(LevelLabels::SpawnLevel));
    }
}

#[derive(Debug, SystemLabel)]
pub enum LoreLabels {
    CloseOnTransition,
    Toggle,
}

#[derive(Debug, Default, Resource)]
pub struct LoreScroll {
    open: bool,
}

impl LoreScroll {
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Flip the scroll. Ignored while a transition is in flight.
    pub fn toggle(&mut self, transition_idle: bool) -> bool {
        if !transition_idle {
            return false;
        }
        self.open = !self.open;
        true
    }

    pub fn close(&mut self) {
        self.open = false;
    }
}

/// Lore of `level`, or of the start level when it has none.
pub fn lore_for(registry: &LevelRegistry, level: LevelId) -> Option<&LoreDef> {
    registry
        .get(level)
        .and_then(|level| level.lore.as_ref())
        .or_else(|| registry.start_level().lore.as_ref())
}

#[derive(Debug, Component)]
struct LorePanel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Component)]
enum LoreText {
    Title,
    Body,
    Attribution,
}

fn lore_section(lore: Option<&LoreDef>, part: LoreText) -> String {
    let lore = match lore {
        Some(lore) => lore,
        None => return String::new(),
    };
    match part {
        LoreText::Title => lore.title.clone(),
        LoreText::Body => lore.body.clone(),
        LoreText::Attribution => lore.attribution.clone().unwrap_or_default(),
    }
}

fn spawn_lore_ui(mut commands: Commands, fonts: Res<UiFonts>) {
    let ink = Color::rgb(0.23, 0.16, 0.08);

    commands.spawn((
        TextBundle::from_section(
            LORE_HINT,
            TextStyle {
                font: fonts.text.clone(),
                font_size: 20.,
                color: Color::rgba(1., 1., 1., 0.8),
            },
        )
        .with_style(Style {
            position_type: PositionType::Absolute,
            position: UiRect {
                bottom: Val::Px(12.),
                right: Val::Px(16.),
                ..default()
            },
            ..default()
        }),
        Name::from("Lore hint"),
    ));

    let text = |part: LoreText, font_size: f32, color: Color| {
        (
            TextBundle::from_section(
                "",
                TextStyle {
                    font: fonts.text.clone(),
                    font_size,
                    color,
                },
            )
            .with_style(Style {
                max_size: Size::new(Val::Px(680.), Val::Undefined),
                margin: UiRect::all(Val::Px(8.)),
                ..default()
            }),
            part,
        )
    };

    commands
        .spawn((
            NodeBundle {
                style: Style {
                    position_type: PositionType::Absolute,
                    position: UiRect {
                        left: Val::Percent(20.),
                        right: Val::Percent(20.),
                        top: Val::Percent(10.),
                        ..default()
                    },
                    // Bevy UI lays columns out bottom up.
                    flex_direction: FlexDirection::ColumnReverse,
                    padding: UiRect::all(Val::Px(24.)),
                    ..default()
                },
                background_color: Color::rgba(0.96, 0.91, 0.8, 0.95).into(),
                visibility: Visibility { is_visible: false },
                z_index: ZIndex::Global(10),
                ..default()
            },
            Name::from("Lore scroll"),
            LorePanel,
        ))
        .with_children(|panel| {
            panel.spawn(text(LoreText::Title, 34., ink));
            panel.spawn(text(LoreText::Body, 20., ink));
            panel.spawn(text(LoreText::Attribution, 16., Color::rgb(0.45, 0.36, 0.24)));
        });
}

fn close_lore_on_transition(
    mut transitions: EventReader<TransitionEvent>,
    mut scroll: ResMut<LoreScroll>,
) {
    let started = transitions
        .iter()
        .any(|event| matches!(event, TransitionEvent::Started { .. }));
    if started && scroll.is_open() {
        debug!("Closing the lore scroll for a transition");
        scroll.close();
    }
}

fn toggle_lore(
    controller: Res<TransitionController>,
    mut scroll: ResMut<LoreScroll>,
    player_query: Query<&ActionState<Actions>, With<FirstPersonController>>,
) {
    let actions = match player_query.get_single() {
        Ok(actions) => actions,
        Err(_) => return,
    };
    if actions.just_pressed(Actions::CloseLore) {
        if scroll.is_open() {
            scroll.close();
        }
    } else if actions.just_pressed(Actions::ToggleLore) {
        scroll.toggle(controller.is_idle());
    }
}

fn sync_lore_visibility(
    scroll: Res<LoreScroll>,
    mut panel_query: Query<&mut Visibility, With<LorePanel>>,
) {
    if !scroll.is_changed() {
        return;
    }
    for mut visibility in &mut panel_query {
        visibility.is_visible = scroll.is_open();
    }
}

fn update_lore_text(
    current_level: Option<Res<CurrentLevel>>,
    registry: Res<LevelRegistry>,
    mut text_query: Query<(&mut Text, &LoreText)>,
) {
    let current_level = match current_level {
        Some(level) if level.is_changed() => level,
        _ => return,
    };
    let lore = lore_for(&registry, current_level.id);
    for (mut text, part) in &mut text_query {
        text.sections[0].value = lore_section(lore, *part);
    }
}

#[cfg(test)]
mod tests {
    use euclid::Angle;

    use super::*;
    use crate::plugins::{portal::Portal, transition::TransitionTiming};

    #[test]
    fn test_toggle_ignored_while_transitioning() {
        let mut scroll = LoreScroll::default();
        assert!(!scroll.toggle(false));
        assert!(!scroll.is_open());

        assert!(scroll.toggle(true));
        assert!(scroll.is_open());
        assert!(scroll.toggle(true));
        assert!(!scroll.is_open());
    }

    #[test]
    fn test_lore_falls_back_to_start_level() {
        let registry = LevelRegistry::from_json(
            r#"{ "start_level": 1, "levels": [
                { "id": 1, "name": "First", "spawn": [0, 1.6, 0],
                  "bounds": { "half_extent": 10, "wall_height": 5 },
                  "lore": { "title": "Origins", "body": "Once upon a time." } },
                { "id": 2, "name": "Second", "spawn": [0, 1.6, 0],
                  "bounds": { "half_extent": 10, "wall_height": 5 } }
            ] }"#,
        )
        .unwrap();

        let lore = lore_for(&registry, LevelId(2)).unwrap();
        assert_eq!(lore.title, "Origins");
        assert_eq!(lore_section(Some(lore), LoreText::Attribution), "");
        assert_eq!(lore_section(None, LoreText::Title), "");
    }

    #[test]
    fn test_embedded_levels_have_their_own_lore() {
        let registry = LevelRegistry::embedded().unwrap();
        let titles: Vec<_> = (1..=3)
            .map(|id| lore_for(&registry, LevelId(id)).unwrap().title.as_str())
            .collect();
        assert_eq!(titles[2], "Synthesis");
        assert_ne!(titles[0], titles[1]);
    }

    fn lore_app() -> (App, Entity) {
        let mut app = App::new();
        app.add_event::<TransitionEvent>()
            .init_resource::<LoreScroll>()
            .insert_resource(TransitionController::new(
                LevelId(1),
                Vec3::ZERO,
                TransitionTiming::default(),
            ))
            .add_system(close_lore_on_transition.label(LoreLabels::CloseOnTransition))
            .add_system(toggle_lore.after(LoreLabels::CloseOnTransition));
        let anchor = app.world.spawn_empty().id();
        let player = app
            .world
            .spawn((
                ActionState::<Actions>::default(),
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

    fn press(app: &mut App, player: Entity, action: Actions) {
        let mut actions = app.world.get_mut::<ActionState<Actions>>(player).unwrap();
        actions.release(action);
        actions.press(action);
    }

    #[test]
    fn test_scroll_toggles_and_closes_on_escape() {
        let (mut app, player) = lore_app();
        press(&mut app, player, Actions::ToggleLore);
        app.update();
        assert!(app.world.resource::<LoreScroll>().is_open());

        press(&mut app, player, Actions::CloseLore);
        app.update();
        assert!(!app.world.resource::<LoreScroll>().is_open());
    }

    #[test]
    fn test_scroll_closes_when_transition_starts() {
        let (mut app, player) = lore_app();
        app.world.resource_mut::<LoreScroll>().toggle(true);

        let portal = Portal {
            position: Vec3::ZERO,
            capture_radius: 2.,
            target_level: LevelId(2),
            target_spawn: Vec3::ZERO,
            label: None,
            enabled: true,
        };
        app.world
            .resource_mut::<TransitionController>()
            .enter_portal(&portal, std::time::Duration::ZERO);
        app.world
            .resource_mut::<Events<TransitionEvent>>()
            .send(TransitionEvent::Started {
                token: 1,
                target_level: LevelId(2),
            });
        app.update();
        assert!(!app.world.resource::<LoreScroll>().is_open());

        // Cannot be reopened mid-transition.
        press(&mut app, player, Actions::ToggleLore);
        app.update();
        assert!(!app.world.resource::<LoreScroll>().is_open());
    }
}
