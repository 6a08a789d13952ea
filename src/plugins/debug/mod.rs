//! Developer tooling: scene editor, state overlay, floor grid and a few inspection keys.
//!
//! Keys: Shift+L logs the player position, I inspects what is under the crosshair, T
//! teleports there, Shift+G toggles the grid and Shift+H the help panel. P belongs to the
//! lore scroll, whatever the modifiers.

use std::collections::VecDeque;

use bevy::{app::PluginGroupBuilder, prelude::*};
use bevy_inspector_egui_rapier::InspectableRapierPlugin;
use bevy_prototype_debug_lines::DebugLines;
use bevy_rapier3d::prelude::*;

use super::{
    beam::CaptureAggregate,
    first_person_controller::{
        place_player, FirstPersonCamera, FirstPersonController, PLAYER_HEIGHT,
    },
    hud::UiFonts,
    levels::{CurrentLevel, LevelRegistry},
    transition::TransitionController,
};

#[derive(Debug)]
/// Development plugins intended for debug builds use.
pub struct DeveloperPlugins;

impl PluginGroup for DeveloperPlugins {
    fn build(self) -> PluginGroupBuilder {
        PluginGroupBuilder::start::<Self>()
            .add(bevy_editor_pls::prelude::EditorPlugin)
            .add(InspectableRapierPlugin)
            .add(DebugOverlayPlugin)
    }
}

#[derive(Debug)]
pub struct DebugOverlayPlugin;

impl Plugin for DebugOverlayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ShowGrid>()
            .init_resource::<ShowHelp>()
            .init_resource::<DebugLog>()
            .init_resource::<CrosshairTarget>()
            .add_startup_system(spawn_overlay)
            .add_system(find_crosshair_target.label(DebugLabels::Crosshair))
            .add_system(debug_keys.after(DebugLabels::Crosshair))
            .add_system(update_overlay.after(DebugLabels::Crosshair))
            .add_system(draw_grid);
    }
}

#[derive(Debug, SystemLabel)]
enum DebugLabels {
    Crosshair,
}

#[derive(Debug, Default, Resource)]
struct ShowGrid(bool);

#[derive(Debug, Default, Resource)]
struct ShowHelp(bool);

const LOG_HISTORY: usize = 5;
const INSPECT_RANGE: f32 = 200.;
const GRID_SPACING: f32 = 2.;

const HELP: &str = "Shift+L  log position\n\
                    T        teleport to crosshair\n\
                    I        inspect crosshair\n\
                    Shift+G  toggle grid\n\
                    Shift+H  toggle help";

/// Last few debug messages, newest last.
#[derive(Debug, Default, Resource)]
struct DebugLog {
    entries: VecDeque<String>,
}

impl DebugLog {
    fn push(&mut self, entry: String) {
        info!("{}", entry);
        self.entries.push_back(entry);
        while self.entries.len() > LOG_HISTORY {
            self.entries.pop_front();
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CrosshairHit {
    name: String,
    distance: f32,
    point: Vec3,
}

#[derive(Debug, Default, Resource)]
struct CrosshairTarget(Option<CrosshairHit>);

#[derive(Debug, Component)]
struct DebugOverlayText;

fn format_position(position: Vec3) -> String {
    format!(
        "position={{[{:.2}, {:.2}, {:.2}]}}",
        position.x, position.y, position.z
    )
}

fn format_hit(hit: &CrosshairHit) -> String {
    format!(
        "{} @ [{:.2}, {:.2}, {:.2}]",
        hit.name, hit.point.x, hit.point.y, hit.point.z
    )
}

/// Where to put the player body so that its feet rest on `point`.
fn teleport_target(point: Vec3) -> Vec3 {
    point + Vec3::Y * (PLAYER_HEIGHT / 2. + 0.05)
}

fn overlay_text(
    status: &str,
    target: Option<&CrosshairHit>,
    log: &DebugLog,
    help: bool,
) -> String {
    let mut text = format!("DEBUG (Shift+H for help)\n{}\n", status);
    match target {
        Some(hit) => text += &format!("looking at {} ({:.1} m)\n", hit.name, hit.distance),
        None => text += "looking at nothing\n",
    }
    if !log.entries.is_empty() {
        text += "recent logs:\n";
        for entry in &log.entries {
            text += entry;
            text += "\n";
        }
    }
    if help {
        text += HELP;
    }
    text
}

fn spawn_overlay(mut commands: Commands, fonts: Res<UiFonts>) {
    commands.spawn((
        TextBundle::from_section(
            "",
            TextStyle {
                font: fonts.mono.clone(),
                font_size: 16.,
                color: Color::YELLOW,
            },
        )
        .with_style(Style {
            position_type: PositionType::Absolute,
            position: UiRect {
                top: Val::Px(12.),
                right: Val::Px(16.),
                ..default()
            },
            ..default()
        }),
        Name::from("Debug overlay"),
        DebugOverlayText,
    ));
}

/// Closest named entity, walking up from `entity` through its parents.
fn entity_name(entity: Entity, names: &Query<&Name>, parents: &Query<&Parent>) -> String {
    let mut current = Some(entity);
    while let Some(entity) = current {
        if let Ok(name) = names.get(entity) {
            return name.to_string();
        }
        current = parents.get(entity).ok().map(|parent| parent.get());
    }
    format!("{:?}", entity)
}

fn find_crosshair_target(
    rapier_context: Res<RapierContext>,
    mut target: ResMut<CrosshairTarget>,
    camera_query: Query<&GlobalTransform, With<FirstPersonCamera>>,
    player_query: Query<Entity, With<FirstPersonController>>,
    names: Query<&Name>,
    parents: Query<&Parent>,
) {
    let camera = match camera_query.get_single() {
        Ok(camera) => camera,
        Err(_) => return,
    };
    let mut filter = QueryFilter::default().exclude_sensors();
    if let Ok(player) = player_query.get_single() {
        filter = filter.exclude_collider(player);
    }
    let origin = camera.translation();
    let direction = camera.forward();
    target.0 = rapier_context
        .cast_ray(origin, direction, INSPECT_RANGE, true, filter)
        .map(|(entity, distance)| CrosshairHit {
            name: entity_name(entity, &names, &parents),
            distance,
            point: origin + direction * distance,
        });
}

fn debug_keys(
    keys: Res<Input<KeyCode>>,
    target: Res<CrosshairTarget>,
    mut log: ResMut<DebugLog>,
    mut show_grid: ResMut<ShowGrid>,
    mut show_help: ResMut<ShowHelp>,
    mut player_query: Query<(&mut Transform, &mut Velocity), With<FirstPersonController>>,
) {
    let shift = keys.pressed(KeyCode::LShift) || keys.pressed(KeyCode::RShift);
    if shift && keys.just_pressed(KeyCode::G) {
        show_grid.0 = !show_grid.0;
    }
    if shift && keys.just_pressed(KeyCode::H) {
        show_help.0 = !show_help.0;
    }
    if shift && keys.just_pressed(KeyCode::L) {
        if let Ok((transform, _)) = player_query.get_single() {
            log.push(format_position(transform.translation));
        }
    }
    if keys.just_pressed(KeyCode::I) {
        match &target.0 {
            Some(hit) => log.push(format_hit(hit)),
            None => log.push("nothing under the crosshair".to_owned()),
        }
    }
    if keys.just_pressed(KeyCode::T) {
        let hit = match &target.0 {
            Some(hit) => hit,
            None => {
                log.push("teleport: nothing under the crosshair".to_owned());
                return;
            }
        };
        if let Ok((mut transform, mut velocity)) = player_query.get_single_mut() {
            let destination = teleport_target(hit.point);
            place_player(&mut transform, &mut velocity, destination);
            log.push(format!("teleport {}", format_position(destination)));
        }
    }
}

fn update_overlay(
    controller: Res<TransitionController>,
    aggregate: Res<CaptureAggregate>,
    target: Res<CrosshairTarget>,
    log: Res<DebugLog>,
    show_help: Res<ShowHelp>,
    player_query: Query<(&Transform, &FirstPersonController)>,
    mut text_query: Query<&mut Text, With<DebugOverlayText>>,
) {
    let (position, flying) = player_query
        .get_single()
        .map_or((Vec3::ZERO, false), |(t, c)| (t.translation, c.flying));
    let status = format!(
        "level {} | {:?} #{} | beams {}/{}\npos {:.1} {:.1} {:.1}{}",
        controller.level_id(),
        controller.phase(),
        controller.token(),
        aggregate.count(),
        aggregate.emitters(),
        position.x,
        position.y,
        position.z,
        if flying { " | fly" } else { "" },
    );
    let overlay = overlay_text(&status, target.0.as_ref(), &log, show_help.0);
    for mut text in &mut text_query {
        text.sections[0].value = overlay.clone();
    }
}

fn draw_grid(
    show_grid: Res<ShowGrid>,
    current_level: Option<Res<CurrentLevel>>,
    registry: Res<LevelRegistry>,
    mut lines: ResMut<DebugLines>,
) {
    if !show_grid.0 {
        return;
    }
    let half = match current_level.and_then(|level| registry.get(level.id)) {
        Some(level) => level.bounds.half_extent,
        None => return,
    };
    let color = Color::rgba(1., 1., 1., 0.3);
    let steps = (2. * half / GRID_SPACING) as i32;
    for i in 0..=steps {
        let offset = -half + i as f32 * GRID_SPACING;
        lines.line_colored(
            Vec3::new(offset, 0.01, -half),
            Vec3::new(offset, 0.01, half),
            0.,
            color,
        );
        lines.line_colored(
            Vec3::new(-half, 0.01, offset),
            Vec3::new(half, 0.01, offset),
            0.,
            color,
        );
    }
}
