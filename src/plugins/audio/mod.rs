//! Looping ambient track of the current level.

use bevy::{audio::AudioSink, prelude::*};

use super::{
    levels::{CurrentLevel, LevelDef, LevelRegistry},
    settings::GameSettings,
};

#[derive(Debug)]
pub struct AmbientAudioPlugin;

impl Plugin for AmbientAudioPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<AmbientTrack>()
            .add_system(switch_ambient_track);
    }
}

#[derive(Debug, Default, Resource)]
struct AmbientTrack {
    path: Option<String>,
    sink: Option<Handle<AudioSink>>,
}

/// Track of `level`, or the start level's one when the level has none.
fn ambient_track_for<'a>(level: &'a LevelDef, registry: &'a LevelRegistry) -> Option<&'a str> {
    level
        .ambient
        .as_deref()
        .or_else(|| registry.start_level().ambient.as_deref())
}

fn switch_ambient_track(
    current_level: Option<Res<CurrentLevel>>,
    registry: Res<LevelRegistry>,
    settings: Res<GameSettings>,
    asset_server: Res<AssetServer>,
    audio: Res<Audio>,
    audio_sinks: Res<Assets<AudioSink>>,
    mut track: ResMut<AmbientTrack>,
) {
    let current_level = match current_level {
        Some(level) if level.is_changed() => level,
        _ => return,
    };
    let path = registry
        .get(current_level.id)
        .and_then(|level| ambient_track_for(level, &registry));
    if path == track.path.as_deref() {
        return;
    }

    if let Some(sink) = track.sink.take().and_then(|sink| audio_sinks.get(&sink)) {
        sink.stop();
    }
    track.path = path.map(str::to_owned);

    if let Some(path) = path {
        info!("Playing ambient track {}", path);
        let weak = audio.play_with_settings(
            asset_server.load(path),
            PlaybackSettings::LOOP.with_volume(settings.audio.ambient_volume),
        );
        track.sink = Some(audio_sinks.get_handle(weak));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::levels::LevelId;

    #[test]
    fn test_each_level_has_its_track() {
        let registry = LevelRegistry::embedded().unwrap();
        let machine = registry.get(LevelId(2)).unwrap();
        assert_eq!(
            ambient_track_for(machine, &registry),
            Some("audio/machine.ogg")
        );
    }

    #[test]
    fn test_silent_level_falls_back_to_start_track() {
        let registry = LevelRegistry::embedded().unwrap();
        let mut level = registry.get(LevelId(3)).unwrap().clone();
        level.ambient = None;
        assert_eq!(
            ambient_track_for(&level, &registry),
            Some("audio/pastoral.ogg")
        );
    }
}
