use bevy::prelude::*;

use crate::grid::DEFAULT_GRID_SIZE;
use crate::scenario::{TankType, TickReport};

#[derive(Resource)]
pub struct SimState {
    pub tank: TankType,
    pub grid_size: usize,
    pub fish_count: usize,
    pub plant_count: usize,
    pub pot_count: usize,
    pub seed: u64,
    pub time_scale: f32,
    pub paused: bool,
    pub player_enabled: bool,
    pub scenario_path: String,
    pub rebuild_requested: bool,
    pub resize_requested: bool,
    pub save_requested: bool,
    pub load_requested: bool,
    pub status: String,
    pub last_report: TickReport,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            tank: TankType::default(),
            grid_size: DEFAULT_GRID_SIZE,
            fish_count: 8,
            plant_count: 3,
            pot_count: 2,
            seed: 42,
            time_scale: 1.0,
            paused: false,
            player_enabled: true,
            scenario_path: "tank.cichlid".to_string(),
            rebuild_requested: true,
            resize_requested: false,
            save_requested: false,
            load_requested: false,
            status: String::new(),
            last_report: TickReport::default(),
        }
    }
}

impl SimState {
    pub fn scaled_delta(&self, delta: f32) -> f32 {
        if self.paused {
            0.0
        } else {
            delta * self.time_scale.max(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pausing_stops_the_clock() {
        let mut state = SimState {
            time_scale: 2.0,
            ..SimState::default()
        };
        assert_eq!(state.scaled_delta(0.5), 1.0);
        state.paused = true;
        assert_eq!(state.scaled_delta(0.5), 0.0);
    }
}
