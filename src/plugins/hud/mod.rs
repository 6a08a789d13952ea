use bevy::{asset::LoadState, prelude::*};

use super::{
    beam::CaptureAggregate,
    levels::{CurrentLevel, LevelDef, LevelLabels, LevelRegistry},
};

/// Fonts are not part of the repository, drop them under `assets/fonts/`.
pub const TEXT_FONT: &str = "fonts/FiraSans-Bold.ttf";
pub const MONO_FONT: &str = "fonts/FiraMono-Medium.ttf";

#[derive(Debug)]
pub struct HudPlugin;

impl Plugin for HudPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<UiFonts>()
            .add_startup_system(spawn_hud)
            .add_system(warn_missing_fonts)
            .add_system(update_level_name.after(LevelLabels::SpawnLevel))
            .add_system(update_beam_status.after(LevelLabels::SpawnLevel));
    }
}

/// Font handles shared by every text on screen.
#[derive(Debug, Resource)]
pub struct UiFonts {
    pub text: Handle<Font>,
    pub mono: Handle<Font>,
}

impl FromWorld for UiFonts {
    fn from_world(world: &mut World) -> Self {
        let asset_server = world.resource::<AssetServer>();
        UiFonts {
            text: asset_server.load(TEXT_FONT),
            mono: asset_server.load(MONO_FONT),
        }
    }
}

impl UiFonts {
    /// Paths of the fonts which failed to load, given the load state of each handle.
    pub fn failed<F>(&self, load_state: F) -> Vec<&'static str>
    where
        F: Fn(&Handle<Font>) -> LoadState,
    {
        [(&self.text, TEXT_FONT), (&self.mono, MONO_FONT)]
            .into_iter()
            .filter(|(handle, _)| load_state(handle) == LoadState::Failed)
            .map(|(_, path)| path)
            .collect()
    }
}

/// Text does not render without its font, say so once instead of showing a silent HUD.
fn warn_missing_fonts(
    asset_server: Res<AssetServer>,
    fonts: Res<UiFonts>,
    mut reported: Local<bool>,
) {
    if *reported {
        return;
    }
    let failed = fonts.failed(|handle| asset_server.get_load_state(handle));
    if !failed.is_empty() {
        warn!(
            "Missing fonts {:?} under assets/, on-screen text will not be drawn",
            failed
        );
        *reported = true;
    }
}

#[derive(Debug, Component)]
struct LevelNameText;

#[derive(Debug, Component)]
struct BeamStatusText;

fn spawn_hud(mut commands: Commands, fonts: Res<UiFonts>) {
    let style = TextStyle {
        font: fonts.text.clone(),
        font_size: 28.,
        color: Color::WHITE,
    };

    commands.spawn((
        TextBundle::from_section("", style.clone()).with_style(Style {
            position_type: PositionType::Absolute,
            position: UiRect {
                top: Val::Px(12.),
                left: Val::Px(16.),
                ..default()
            },
            ..default()
        }),
        Name::from("Level name"),
        LevelNameText,
    ));
    commands.spawn((
        TextBundle::from_section("", style).with_style(Style {
            position_type: PositionType::Absolute,
            position: UiRect {
                bottom: Val::Px(12.),
                left: Val::Px(16.),
                ..default()
            },
            ..default()
        }),
        Name::from("Beam status"),
        BeamStatusText,
    ));
}

/// Captures needed to open the level exit, if the level has a puzzle.
fn required_captures(level: &LevelDef) -> Option<u32> {
    let puzzle = level.puzzle.as_ref()?;
    let gated = level
        .portals
        .iter()
        .filter_map(|portal| portal.gate.map(|gate| gate.required_captures))
        .max();
    Some(gated.unwrap_or(puzzle.stations.len() as u32))
}

fn beam_status(captured: u32, required: u32) -> String {
    format!("Beams aligned {}/{}", captured, required)
}

fn update_level_name(
    current_level: Option<Res<CurrentLevel>>,
    mut text_query: Query<&mut Text, With<LevelNameText>>,
) {
    let current_level = match current_level {
        Some(level) if level.is_changed() => level,
        _ => return,
    };
    for mut text in &mut text_query {
        text.sections[0].value = current_level.name.clone();
    }
}

fn update_beam_status(
    current_level: Option<Res<CurrentLevel>>,
    registry: Res<LevelRegistry>,
    aggregate: Res<CaptureAggregate>,
    mut text_query: Query<&mut Text, With<BeamStatusText>>,
) {
    let current_level = match current_level {
        Some(level) => level,
        None => return,
    };
    if !current_level.is_changed() && !aggregate.is_changed() {
        return;
    }
    let status = registry
        .get(current_level.id)
        .and_then(required_captures)
        .map(|required| beam_status(aggregate.count(), required))
        .unwrap_or_default();
    for mut text in &mut text_query {
        text.sections[0].value = status.clone();
    }
}
