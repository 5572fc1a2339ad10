use bevy::prelude::*;
use bevy_egui::{EguiPlugin, EguiPrimaryContextPass};
use bevy_panorbit_camera::PanOrbitCameraPlugin;

mod avoidance;
mod behavior;
mod entity;
mod error;
mod grid;
mod movement;
mod persistence;
mod relationship;
mod scenario;
mod spatial;
mod state;
mod systems;
mod ui;

fn main() {
    let state = state::SimState::default();
    let scenario = scenario::Scenario::new(state.tank, state.grid_size, state.seed);

    App::new()
        .add_plugins((
            DefaultPlugins.set(WindowPlugin {
                primary_window: Some(Window {
                    title: "Cichlid Tank".into(),
                    fit_canvas_to_parent: true,
                    prevent_default_event_handling: false,
                    ..default()
                }),
                ..default()
            }),
            EguiPlugin::default(),
            PanOrbitCameraPlugin,
        ))
        .insert_resource(state)
        .insert_resource(scenario)
        .add_systems(Startup, ui::setup_scene)
        .add_systems(EguiPrimaryContextPass, ui::ui_system)
        .add_systems(
            Update,
            (
                systems::input_system,
                systems::rebuild_system,
                systems::save_system,
                systems::tick_system,
                systems::spawn_visuals_system,
                systems::sync_system,
            )
                .chain(),
        )
        .run();
}
