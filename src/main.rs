#![allow(clippy::type_complexity)]

use bevy::prelude::*;

mod plugins;

fn main() {
    App::new()
        .insert_resource(plugins::settings::GameSettings::load())
        .add_plugin(plugins::game::GamePlugin)
        .run();
}
