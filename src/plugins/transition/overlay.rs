//! Full screen black overlay which hides level swaps.

use bevy::prelude::*;

use super::TransitionController;

#[derive(Debug, Default, Component)]
pub struct FadeOverlay;

pub(super) fn spawn_fade_overlay(mut commands: Commands) {
    commands.spawn((
        NodeBundle {
            style: Style {
                position_type: PositionType::Absolute,
                position: UiRect {
                    left: Val::Px(0.),
                    top: Val::Px(0.),
                    ..default()
                },
                size: Size::new(Val::Percent(100.), Val::Percent(100.)),
                ..default()
            },
            background_color: Color::rgba(0., 0., 0., 0.).into(),
            z_index: ZIndex::Global(100),
            ..default()
        },
        Name::from("Fade overlay"),
        FadeOverlay,
    ));
}

pub(super) fn update_fade_overlay(
    time: Res<Time>,
    controller: Res<TransitionController>,
    mut overlay_query: Query<&mut BackgroundColor, With<FadeOverlay>>,
) {
    let alpha = controller.fade_alpha(time.elapsed());
    for mut color in &mut overlay_query {
        if color.0.a() != alpha {
            color.0.set_a(alpha);
        }
    }
}
