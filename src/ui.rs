use crate::entity::{ObjectKind, Sex};
use crate::scenario::{Scenario, TankType};
use crate::state::SimState;
use bevy::prelude::*;
use bevy_egui::{EguiContexts, egui};
use bevy_panorbit_camera::PanOrbitCamera;

pub fn setup_scene(mut commands: Commands, state: Res<SimState>) {
    // Lighting
    commands.spawn((
        DirectionalLight {
            illuminance: 10000.0,
            ..default()
        },
        Transform {
            translation: Vec3::new(10.0, 30.0, 10.0),
            rotation: Quat::from_rotation_x(-std::f32::consts::PI / 4.),
            ..default()
        },
    ));

    // Camera, looking at the middle of the water column
    let focus = Vec3::new(0.0, state.tank.dimensions().y / 2.0, 0.0);
    commands.spawn((
        Transform::from_xyz(0.0, focus.y + 15.0, 50.0).looking_at(focus, Vec3::Y),
        PanOrbitCamera {
            focus,
            button_orbit: MouseButton::Right,
            button_pan: MouseButton::Middle,
            ..default()
        },
    ));
}

pub fn ui_system(
    mut contexts: EguiContexts,
    mut state: ResMut<SimState>,
    mut scenario: ResMut<Scenario>,
) {
    if let Ok(ctx) = contexts.ctx_mut() {
        egui::Window::new("Tank Controls").show(ctx, |ui| {
            ui.label("Tank");

            let mut tank = state.tank;
            egui::ComboBox::from_label("Preset")
                .selected_text(tank.name())
                .show_ui(ui, |ui| {
                    for preset in TankType::ALL {
                        ui.selectable_value(&mut tank, preset, preset.name());
                    }
                });
            if tank != state.tank {
                state.tank = tank;
                state.resize_requested = true;
            }

            let mut grid_size = state.grid_size;
            if ui
                .add(egui::Slider::new(&mut grid_size, 2..=20).text("Grid Size"))
                .changed()
            {
                state.grid_size = grid_size;
                state.resize_requested = true;
            }

            ui.add(egui::Slider::new(&mut state.fish_count, 0..=40).text("Fish"));
            ui.add(egui::Slider::new(&mut state.plant_count, 0..=10).text("Plants"));
            ui.add(egui::Slider::new(&mut state.pot_count, 0..=10).text("Pots"));
            ui.horizontal(|ui| {
                ui.label("Seed");
                ui.add(egui::DragValue::new(&mut state.seed));
            });
            ui.checkbox(&mut state.player_enabled, "Player");

            if ui.button("New Tank").clicked() {
                state.rebuild_requested = true;
            }

            ui.separator();
            ui.label("Time");
            ui.add(egui::Slider::new(&mut state.time_scale, 0.0..=4.0).text("Time Scale"));
            ui.checkbox(&mut state.paused, "Paused");

            ui.separator();
            ui.horizontal(|ui| {
                if ui.button("Add Fish").clicked() {
                    scenario.add_random_fish();
                }
                if ui.button("Add Plant").clicked() {
                    scenario.add_object(ObjectKind::Plant);
                }
                if ui.button("Add Pot").clicked() {
                    scenario.add_object(ObjectKind::Pot);
                }
                if ui.button("Remove Fish").clicked() {
                    scenario.remove_last_fish();
                }
            });

            ui.separator();
            ui.horizontal(|ui| {
                ui.label("File");
                ui.text_edit_singleline(&mut state.scenario_path);
            });
            ui.horizontal(|ui| {
                if ui.button("Save").clicked() {
                    state.save_requested = true;
                }
                if ui.button("Load").clicked() {
                    state.load_requested = true;
                }
            });
            if !state.status.is_empty() {
                ui.label(state.status.as_str());
            }
            let report = state.last_report;
            ui.label(format!(
                "Frame {} ({:.1}s) | {} fish updated | {} pairs measured | {} faults",
                report.frame,
                scenario.clock().elapsed(),
                report.updated,
                report.relationships,
                report.faults
            ));
            ui.label(format!("{} collision proxies", scenario.space().len()));

            ui.separator();
            egui::ScrollArea::vertical()
                .max_height(240.0)
                .show(ui, |ui| {
                    egui::Grid::new("fish_grid").striped(true).show(ui, |ui| {
                        ui.label("Name");
                        ui.label("Size");
                        ui.label("Speed");
                        ui.label("Sex");
                        ui.label("Behavior");
                        ui.end_row();

                        for fish in scenario.fish() {
                            let Some(cichlid) = fish.as_cichlid() else {
                                continue;
                            };
                            let behavior = fish.behavior().unwrap_or_default();
                            let behavior = egui::RichText::new(behavior.to_string());
                            ui.label(&fish.name);
                            ui.label(cichlid.size_class.name());
                            ui.label(format!("{:.2}", fish.speed));
                            ui.label(match fish.sex {
                                Sex::Male => "M",
                                Sex::Female => "F",
                            });
                            if cichlid.glowing {
                                ui.label(behavior.color(egui::Color32::GOLD));
                            } else {
                                ui.label(behavior);
                            }
                            ui.end_row();
                        }
                    });
                });
        });
    }
}
