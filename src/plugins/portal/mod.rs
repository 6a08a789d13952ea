use std::f32::consts::FRAC_PI_2;

use bevy::prelude::*;

use super::{
    beam::{BeamLabels, CaptureAggregate},
    first_person_controller::FirstPersonCamera,
    hud::UiFonts,
    levels::{LevelId, PortalDef},
};

/// Height of the floating label above the portal center.
pub const LABEL_HEIGHT: f32 = 2.;

#[derive(Debug)]
pub struct PortalPlugin;

impl Plugin for PortalPlugin {
    fn build(&self, app: &mut App) {
        app.add_startup_system(load_portal_assets)
            .add_system(
                update_portal_gates
                    .label(PortalLabels::UpdateGates)
                    .after(BeamLabels::SolveBeams),
            )
            .add_system(sync_portal_visibility.after(PortalLabels::UpdateGates))
            .add_system(spin_portal_discs)
            .add_system(spawn_portal_labels)
            .add_system(place_portal_labels.after(PortalLabels::UpdateGates));
    }
}

#[derive(Debug, SystemLabel)]
pub enum PortalLabels {
    UpdateGates,
}

#[derive(Debug, Default, Resource)]
pub struct PortalResources {
    ring_mesh: Handle<Mesh>,
    disc_mesh: Handle<Mesh>,
    ring_material: Handle<StandardMaterial>,
    disc_material: Handle<StandardMaterial>,
}

/// Trigger volume linking the current level to another one.
#[derive(Debug, Clone, Component)]
pub struct Portal {
    pub position: Vec3,
    pub capture_radius: f32,
    pub target_level: LevelId,
    pub target_spawn: Vec3,
    pub label: Option<String>,
    pub enabled: bool,
}

impl Portal {
    pub fn from_def(def: &PortalDef, default_capture_radius: f32) -> Portal {
        Portal {
            position: Vec3::from_array(def.position),
            capture_radius: def.capture_radius.unwrap_or(default_capture_radius),
            target_level: def.target_level,
            target_spawn: Vec3::from_array(def.target_spawn),
            label: def.label.clone(),
            // Gated portals start closed until the first gate evaluation.
            enabled: def.gate.is_none(),
        }
    }

    /// Whether `point` is strictly inside the capture radius of an enabled portal.
    pub fn contains(&self, point: Vec3) -> bool {
        self.enabled && self.position.distance(point) < self.capture_radius
    }

    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("To Level {}", self.target_level))
    }
}

/// Ties a portal `enabled` flag to the puzzle capture count.
#[derive(Debug, Clone, Copy, Component)]
pub struct PortalGate {
    pub required_captures: u32,
    pub latch: bool,
    unlocked: bool,
}

impl PortalGate {
    pub fn new(required_captures: u32, latch: bool) -> PortalGate {
        PortalGate {
            required_captures,
            latch,
            unlocked: false,
        }
    }

    /// Whether the gated portal is open for the given capture count.
    pub fn evaluate(&mut self, captures: u32) -> bool {
        let open = captures >= self.required_captures;
        if self.latch {
            self.unlocked |= open;
            self.unlocked
        } else {
            open
        }
    }
}

#[derive(Debug, Default, Component)]
struct PortalDisc;

/// Screen-space text naming the destination of a portal.
#[derive(Debug, Component)]
pub struct PortalLabel {
    pub portal: Entity,
}

pub fn label_anchor(portal_translation: Vec3) -> Vec3 {
    portal_translation + Vec3::Y * LABEL_HEIGHT
}

fn load_portal_assets(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let ring_mesh = meshes.add(
        shape::Torus {
            radius: 1.5,
            ring_radius: 0.1,
            subdivisions_segments: 32,
            subdivisions_sides: 16,
        }
        .into(),
    );
    let disc_mesh = meshes.add(
        shape::Circle {
            radius: 1.4,
            vertices: 32,
        }
        .into(),
    );
    let ring_material = materials.add(StandardMaterial {
        base_color: Color::rgb(0.27, 0.27, 0.27),
        perceptual_roughness: 0.2,
        metallic: 0.8,
        ..default()
    });
    let disc_material = materials.add(StandardMaterial {
        base_color: Color::rgba(0., 0.53, 1., 0.6),
        unlit: true,
        alpha_mode: AlphaMode::Blend,
        double_sided: true,
        cull_mode: None,
        ..default()
    });

    commands.insert_resource(PortalResources {
        ring_mesh,
        disc_mesh,
        ring_material,
        disc_material,
    });
}

/// Spawn a portal as a child of the level root.
pub fn spawn_portal(
    parent: &mut ChildBuilder,
    def: &PortalDef,
    default_capture_radius: f32,
    portal_res: &PortalResources,
) -> Entity {
    let portal = Portal::from_def(def, default_capture_radius);
    let name = Name::from(format!("Portal ({})", portal.display_label()));
    let mut entity = parent.spawn((
        SpatialBundle {
            transform: Transform::from_translation(portal.position),
            visibility: Visibility {
                is_visible: portal.enabled,
            },
            ..default()
        },
        name,
    ));
    if let Some(gate) = def.gate {
        entity.insert(PortalGate::new(gate.required_captures, gate.latch));
    }
    entity.insert(portal);
    entity.with_children(|portal_root| {
        portal_root.spawn(PbrBundle {
            mesh: portal_res.ring_mesh.clone(),
            material: portal_res.ring_material.clone(),
            transform: Transform::from_rotation(Quat::from_rotation_x(FRAC_PI_2)),
            ..default()
        });
        portal_root.spawn((
            PbrBundle {
                mesh: portal_res.disc_mesh.clone(),
                material: portal_res.disc_material.clone(),
                ..default()
            },
            PortalDisc,
        ));
    });
    entity.id()
}

pub(crate) fn update_portal_gates(
    aggregate: Res<CaptureAggregate>,
    mut gates_query: Query<(&mut Portal, &mut PortalGate)>,
) {
    for (mut portal, mut gate) in &mut gates_query {
        let open = gate.evaluate(aggregate.count());
        if portal.enabled != open {
            info!(
                "Portal \"{}\" is now {}",
                portal.display_label(),
                if open { "open" } else { "closed" }
            );
            portal.enabled = open;
        }
    }
}

fn sync_portal_visibility(mut portals_query: Query<(&Portal, &mut Visibility), Changed<Portal>>) {
    for (portal, mut visibility) in &mut portals_query {
        visibility.is_visible = portal.enabled;
    }
}

fn spin_portal_discs(time: Res<Time>, mut discs_query: Query<&mut Transform, With<PortalDisc>>) {
    for mut transform in &mut discs_query {
        transform.rotation *= Quat::from_rotation_z(time.delta_seconds());
    }
}

fn spawn_portal_labels(
    mut commands: Commands,
    fonts: Res<UiFonts>,
    portals_query: Query<(Entity, &Portal), Added<Portal>>,
) {
    for (entity, portal) in &portals_query {
        commands.spawn((
            TextBundle::from_section(
                portal.display_label(),
                TextStyle {
                    font: fonts.text.clone(),
                    font_size: 24.,
                    color: Color::WHITE,
                },
            )
            .with_style(Style {
                position_type: PositionType::Absolute,
                ..default()
            }),
            Name::from(format!("Portal label ({})", portal.display_label())),
            PortalLabel { portal: entity },
        ))
        .insert(Visibility { is_visible: false });
    }
}

/// Project every label above its portal. Labels follow the portal visibility and are
/// despawned along with it.
fn place_portal_labels(
    mut commands: Commands,
    camera_query: Query<(&Camera, &GlobalTransform), With<FirstPersonCamera>>,
    portals_query: Query<(&Portal, &GlobalTransform)>,
    mut labels_query: Query<(Entity, &PortalLabel, &Node, &mut Style, &mut Visibility)>,
) {
    let camera = camera_query.get_single().ok();
    for (entity, label, node, mut style, mut visibility) in &mut labels_query {
        let (portal, portal_transform) = match portals_query.get(label.portal) {
            Ok(portal) => portal,
            Err(_) => {
                commands.entity(entity).despawn_recursive();
                continue;
            }
        };
        let anchor = label_anchor(portal_transform.translation());
        let screen_position = camera
            .filter(|_| portal.enabled)
            .and_then(|(camera, camera_transform)| {
                camera.world_to_viewport(camera_transform, anchor)
            });
        match screen_position {
            Some(position) => {
                // Viewport coordinates start at the bottom left, like UI positions.
                style.position.left = Val::Px(position.x - node.size().x / 2.);
                style.position.bottom = Val::Px(position.y);
                if !visibility.is_visible {
                    visibility.is_visible = true;
                }
            }
            None => {
                if visibility.is_visible {
                    visibility.is_visible = false;
                }
            }
        }
    }
}
