use std::collections::HashSet;

use bevy::prelude::*;
use bevy_egui::EguiContexts;

use crate::entity::{EntityId, EntityKind, MoveIntents, ObjectKind, TankEntity};
use crate::persistence;
use crate::scenario::Scenario;
use crate::state::SimState;

// Unit sphere squashed into a fish shape, long axis on local +X.
pub const FISH_PROPORTIONS: Vec3 = Vec3::new(0.5, 0.2, 0.12);

#[derive(Component, Debug, Clone, Copy)]
pub struct TankVisual {
    pub id: EntityId,
}

#[derive(Component)]
pub struct TankShell;

pub fn visual_scale(entity: &TankEntity) -> Vec3 {
    let shape = match &entity.kind {
        EntityKind::Cichlid(_) => FISH_PROPORTIONS,
        EntityKind::Player(_) => Vec3::splat(0.5),
        EntityKind::Environment(ObjectKind::Plant) => Vec3::new(0.3, 3.0, 0.3),
        EntityKind::Environment(ObjectKind::Pot) => Vec3::new(2.5, 5.0, 2.5),
    };
    entity.body.scale * shape
}

fn base_color(entity: &TankEntity) -> Color {
    match &entity.kind {
        EntityKind::Cichlid(fish) => {
            let [r, g, b] = fish.color.rgb();
            Color::linear_rgb(r, g, b)
        }
        EntityKind::Player(_) => Color::srgb(0.9, 0.9, 0.95),
        EntityKind::Environment(ObjectKind::Plant) => Color::srgb(0.15, 0.6, 0.2),
        EntityKind::Environment(ObjectKind::Pot) => Color::srgb(0.7, 0.35, 0.2),
    }
}

fn glow_color(glowing: bool) -> LinearRgba {
    if glowing {
        LinearRgba::rgb(4.0, 3.2, 0.0)
    } else {
        LinearRgba::BLACK
    }
}

/// Replaces or rescales the scenario when the panel asks for it, then
/// clears every visual so they are rebuilt from the new state.
pub fn rebuild_system(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut state: ResMut<SimState>,
    mut scenario: ResMut<Scenario>,
    visuals: Query<Entity, Or<(With<TankVisual>, With<TankShell>)>>,
) {
    if state.rebuild_requested {
        let mut fresh = Scenario::new(state.tank, state.grid_size, state.seed);
        fresh.populate(state.fish_count, state.plant_count, state.pot_count);
        *scenario = fresh;
        state.status = format!("New {} tank", state.tank.name());
    } else if state.load_requested {
        match persistence::load(&state.scenario_path) {
            Ok(loaded) => {
                *scenario = loaded;
                state.tank = scenario.tank();
                state.grid_size = scenario.grid().size();
                state.seed = scenario.seed();
                state.status = format!("Loaded {}", state.scenario_path);
            }
            Err(err) => {
                warn!("Could not load {}: {err}", state.scenario_path);
                state.status = format!("Load failed: {err}");
                state.load_requested = false;
                return;
            }
        }
    } else if state.resize_requested {
        let mut resized = Ok(());
        if scenario.tank() != state.tank {
            resized = scenario.set_tank(state.tank);
        }
        if resized.is_ok() && scenario.grid().size() != state.grid_size {
            resized = scenario.set_grid_size(state.grid_size);
        }
        if let Err(err) = resized {
            warn!("Tank resize failed: {err}");
            state.status = format!("Resize failed: {err}");
        }
    } else {
        return;
    }
    state.rebuild_requested = false;
    state.load_requested = false;
    state.resize_requested = false;

    if state.player_enabled {
        scenario.add_player();
    }

    for entity in visuals.iter() {
        commands.entity(entity).despawn();
    }

    info!(
        "Rebuilding tank visuals for {} entities...",
        scenario.entities().count()
    );

    let bounds = scenario.grid().bounds();
    commands.spawn((
        Mesh3d(meshes.add(Cuboid::from_size(bounds.size()))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgba(0.4, 0.7, 0.9, 0.12),
            alpha_mode: AlphaMode::Blend,
            cull_mode: None,
            ..default()
        })),
        Transform::from_translation(bounds.center()),
        TankShell,
    ));
    commands.spawn((
        Mesh3d(meshes.add(Cuboid::new(bounds.size().x, 0.2, bounds.size().z))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb(0.76, 0.7, 0.5),
            perceptual_roughness: 0.9,
            ..default()
        })),
        Transform::from_xyz(bounds.center().x, bounds.min.y - 0.1, bounds.center().z),
        TankShell,
    ));
}

pub fn spawn_visuals_system(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    scenario: Res<Scenario>,
    visuals: Query<&TankVisual>,
) {
    let shown: HashSet<_> = visuals.iter().map(|visual| visual.id).collect();
    let mut spawned_count = 0;
    for entity in scenario.entities().filter(|entity| !shown.contains(&entity.id)) {
        let mesh = match entity.kind {
            EntityKind::Environment(_) => meshes.add(Cylinder::new(1.0, 1.0)),
            _ => meshes.add(Sphere::new(1.0)),
        };
        commands.spawn((
            Mesh3d(mesh),
            MeshMaterial3d(materials.add(StandardMaterial {
                base_color: base_color(entity),
                metallic: 0.1,
                perceptual_roughness: 0.6,
                ..default()
            })),
            Transform {
                translation: entity.body.translation,
                rotation: entity.body.rotation,
                scale: visual_scale(entity),
            },
            TankVisual { id: entity.id },
        ));
        spawned_count += 1;
    }
    if spawned_count > 0 {
        info!("Spawned {} tank visuals.", spawned_count);
    }
}

pub fn tick_system(time: Res<Time>, mut state: ResMut<SimState>, mut scenario: ResMut<Scenario>) {
    let tpf = state.scaled_delta(time.delta_secs());
    if tpf <= 0.0 {
        return;
    }
    state.last_report = scenario.tick(tpf);
}

pub fn sync_system(
    mut commands: Commands,
    mut materials: ResMut<Assets<StandardMaterial>>,
    scenario: Res<Scenario>,
    mut query: Query<(
        Entity,
        &TankVisual,
        &mut Transform,
        &MeshMaterial3d<StandardMaterial>,
    )>,
) {
    for (visual_entity, visual, mut transform, mat_handle) in query.iter_mut() {
        let Some(entity) = scenario.entity(visual.id) else {
            commands.entity(visual_entity).despawn();
            continue;
        };
        transform.translation = entity.body.translation;
        transform.rotation = entity.body.rotation;
        transform.scale = visual_scale(entity);

        let Some(fish) = entity.as_cichlid() else {
            continue;
        };
        let glow = glow_color(fish.glowing);
        let stale = materials
            .get(&mat_handle.0)
            .is_some_and(|mat| mat.emissive != glow);
        if stale && let Some(mat) = materials.get_mut(&mat_handle.0) {
            mat.emissive = glow;
        }
    }
}

pub fn player_intents(keys: &ButtonInput<KeyCode>) -> MoveIntents {
    let held = |codes: [KeyCode; 2]| keys.any_pressed(codes);
    MoveIntents {
        forward: held([KeyCode::ArrowUp, KeyCode::KeyW]),
        backward: held([KeyCode::ArrowDown, KeyCode::KeyS]),
        ascend: keys.pressed(KeyCode::KeyQ),
        descend: keys.pressed(KeyCode::KeyE),
        turn_left: held([KeyCode::ArrowLeft, KeyCode::KeyA]),
        turn_right: held([KeyCode::ArrowRight, KeyCode::KeyD]),
        sprint: held([KeyCode::ShiftLeft, KeyCode::ShiftRight]),
    }
}

pub fn input_system(
    keys: Res<ButtonInput<KeyCode>>,
    mut contexts: EguiContexts,
    mut state: ResMut<SimState>,
    mut scenario: ResMut<Scenario>,
) {
    if contexts
        .ctx_mut()
        .is_ok_and(|ctx| ctx.wants_keyboard_input())
    {
        return;
    }

    scenario.set_player_intents(player_intents(&keys));
    let locks = scenario.wall_locks();
    scenario.set_player_locks(locks);

    if keys.just_pressed(KeyCode::KeyP) {
        let id = scenario.add_object(ObjectKind::Pot);
        state.status = format!("Added pot {id}");
    }
    if keys.just_pressed(KeyCode::KeyL) {
        let id = scenario.add_object(ObjectKind::Plant);
        state.status = format!("Added plant {id}");
    }
    if keys.just_pressed(KeyCode::KeyK) {
        let id = scenario.add_random_fish();
        state.status = format!("Added fish {id}");
    }
    if keys.just_pressed(KeyCode::Delete)
        && let Some(removed) = scenario.remove_last_fish()
    {
        state.status = format!("Removed {}", removed.name);
    }
}

pub fn save_system(mut state: ResMut<SimState>, scenario: Res<Scenario>) {
    if !state.save_requested {
        return;
    }
    state.save_requested = false;
    state.status = match persistence::save(&scenario, &state.scenario_path) {
        Ok(path) => format!("Saved {}", path.display()),
        Err(err) => {
            warn!("Could not save {}: {err}", state.scenario_path);
            format!("Save failed: {err}")
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Body, PlayerControl, Sex};

    #[test]
    fn keys_map_to_intents() {
        let mut keys = ButtonInput::<KeyCode>::default();
        keys.press(KeyCode::KeyW);
        keys.press(KeyCode::ShiftRight);
        keys.press(KeyCode::ArrowLeft);
        let intents = player_intents(&keys);
        assert!(intents.forward && intents.sprint && intents.turn_left);
        assert!(!intents.backward && !intents.ascend && !intents.turn_right);
    }

    #[test]
    fn visuals_scale_with_the_body() {
        let mut player = TankEntity {
            id: EntityId(1),
            name: "Player".into(),
            body: Body::at(Vec3::ZERO),
            size: 1.0,
            speed: 1.0,
            sex: Sex::Male,
            kind: EntityKind::Player(PlayerControl::default()),
        };
        assert_eq!(visual_scale(&player), Vec3::splat(0.5));
        player.body.scale = Vec3::splat(2.0);
        assert_eq!(visual_scale(&player), Vec3::ONE);
        assert_eq!(glow_color(false), LinearRgba::BLACK);
    }
}
