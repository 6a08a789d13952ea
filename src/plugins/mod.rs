#[cfg(feature = "devel")]
pub mod debug;

pub mod audio;
pub mod beam;
pub mod first_person_controller;
pub mod game;
pub mod hud;
pub mod input;
pub mod levels;
pub mod lore;
pub mod mirror;
pub mod physics;
pub mod portal;
pub mod settings;
pub mod transition;
