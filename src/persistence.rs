use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use bevy::log::info;
use bevy::math::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::entity::{Body, CichlidColor, EntityKind, ObjectKind, SizeClass, TankEntity};
use crate::error::PersistError;
use crate::grid::DEFAULT_GRID_SIZE;
use crate::scenario::{Scenario, TankType};

pub const SCENARIO_VERSION: u32 = 1;
pub const SCENARIO_EXTENSION: &str = "cichlid";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformRecord {
    /// Quaternion as `[x, y, z, w]`.
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
    pub translation: [f32; 3],
}

impl From<&Body> for TransformRecord {
    fn from(body: &Body) -> Self {
        Self {
            rotation: body.rotation.to_array(),
            scale: body.scale.to_array(),
            translation: body.translation.to_array(),
        }
    }
}

impl From<TransformRecord> for Body {
    fn from(record: TransformRecord) -> Self {
        Body {
            translation: Vec3::from_array(record.translation),
            rotation: Quat::from_array(record.rotation),
            scale: Vec3::from_array(record.scale),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FishRecord {
    #[serde(flatten)]
    pub transform: TransformRecord,
    pub size: SizeClass,
    pub color: CichlidColor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioFile {
    pub version: u32,
    pub tank: TankType,
    #[serde(default = "default_grid_size")]
    pub grid_size: usize,
    #[serde(default)]
    pub seed: u64,
    pub fish: Vec<FishRecord>,
    pub plants: Vec<TransformRecord>,
    pub pots: Vec<TransformRecord>,
}

fn default_grid_size() -> usize {
    DEFAULT_GRID_SIZE
}

impl ScenarioFile {
    pub fn capture(scenario: &Scenario) -> Self {
        let mut file = Self {
            version: SCENARIO_VERSION,
            tank: scenario.tank(),
            grid_size: scenario.grid().size(),
            seed: scenario.seed(),
            fish: Vec::new(),
            plants: Vec::new(),
            pots: Vec::new(),
        };
        for entity in scenario.entities() {
            file.record(entity);
        }
        file
    }

    fn record(&mut self, entity: &TankEntity) {
        let transform = TransformRecord::from(&entity.body);
        match &entity.kind {
            EntityKind::Cichlid(fish) => self.fish.push(FishRecord {
                transform,
                size: fish.size_class,
                color: fish.color,
            }),
            EntityKind::Environment(ObjectKind::Plant) => self.plants.push(transform),
            EntityKind::Environment(ObjectKind::Pot) => self.pots.push(transform),
            EntityKind::Player(_) => {}
        }
    }

    /// Builds a fresh scenario from the stored records. Fish resume from
    /// their stored transforms with new behaviour state.
    pub fn restore(&self) -> Result<Scenario, PersistError> {
        if self.version != SCENARIO_VERSION {
            return Err(PersistError::UnknownVersion(self.version));
        }
        let mut scenario = Scenario::new(self.tank, self.grid_size, self.seed);
        for plant in &self.plants {
            scenario.restore_object(ObjectKind::Plant, Body::from(*plant));
        }
        for pot in &self.pots {
            scenario.restore_object(ObjectKind::Pot, Body::from(*pot));
        }
        for fish in &self.fish {
            scenario.restore_fish(fish.size, fish.color, Body::from(fish.transform));
        }
        Ok(scenario)
    }
}

/// `path` with the scenario extension, added when missing.
pub fn scenario_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.extension().is_some_and(|ext| ext == SCENARIO_EXTENSION) {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(SCENARIO_EXTENSION);
        PathBuf::from(name)
    }
}

/// Writes the scenario next to its destination, then renames it into
/// place. Returns the path actually written.
pub fn save(scenario: &Scenario, path: impl AsRef<Path>) -> Result<PathBuf, PersistError> {
    let path = scenario_path(path);
    let json = serde_json::to_string_pretty(&ScenarioFile::capture(scenario))?;
    let staging = path.with_extension(format!("{SCENARIO_EXTENSION}.tmp"));
    let staged = File::create(&staging).and_then(|mut file| {
        file.write_all(json.as_bytes())?;
        file.sync_all()
    });
    if let Err(err) = staged.and_then(|()| fs::rename(&staging, &path)) {
        let _ = fs::remove_file(&staging);
        return Err(err.into());
    }
    info!("Saved {} fish to {}", scenario.fish_count(), path.display());
    Ok(path)
}

pub fn load(path: impl AsRef<Path>) -> Result<Scenario, PersistError> {
    let path = scenario_path(path);
    let json = fs::read_to_string(&path)?;
    let file: ScenarioFile = serde_json::from_str(&json)?;
    let scenario = file.restore()?;
    info!(
        "Loaded {} fish into a {} tank from {}",
        scenario.fish_count(),
        scenario.tank().name(),
        path.display()
    );
    Ok(scenario)
}
