use std::fmt;

use bevy::math::{Quat, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::grid::{GridIndex, NavigationGrid};
use crate::movement::MODEL_ALIGNMENT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SizeClass {
    #[default]
    Small,
    Medium,
    Large,
}

impl SizeClass {
    pub const ALL: [SizeClass; 3] = [SizeClass::Small, SizeClass::Medium, SizeClass::Large];

    pub fn length_inches(self) -> f32 {
        match self {
            SizeClass::Small => 2.0,
            SizeClass::Medium => 2.51969,
            SizeClass::Large => 3.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SizeClass::Small => "Small (2in)",
            SizeClass::Medium => "Medium (2.51969in)",
            SizeClass::Large => "Large (3in)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CichlidColor {
    #[default]
    Black,
    Blue,
    Default,
    BlueFin,
    BrightWhite,
    VibrantBlue,
}

impl CichlidColor {
    pub const ALL: [CichlidColor; 6] = [
        CichlidColor::Black,
        CichlidColor::Blue,
        CichlidColor::Default,
        CichlidColor::BlueFin,
        CichlidColor::BrightWhite,
        CichlidColor::VibrantBlue,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CichlidColor::Black => "Black",
            CichlidColor::Blue => "Blue",
            CichlidColor::Default => "Default",
            CichlidColor::BlueFin => "Blue Fins",
            CichlidColor::BrightWhite => "Bright White",
            CichlidColor::VibrantBlue => "Vibrant Blue",
        }
    }

    pub fn rgb(self) -> [f32; 3] {
        match self {
            CichlidColor::Black => [0.06, 0.06, 0.08],
            CichlidColor::Blue => [0.1, 0.2, 0.8],
            CichlidColor::Default => [0.85, 0.85, 0.85],
            CichlidColor::BlueFin => [0.3, 0.4, 0.9],
            CichlidColor::BrightWhite => [1.0, 1.0, 1.0],
            CichlidColor::VibrantBlue => [0.0, 0.45, 1.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    #[default]
    Idle,
    Attack,
    Hide,
    Run,
    Dart,
    Loiter,
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Behavior::Idle => "idle",
            Behavior::Attack => "attack",
            Behavior::Hide => "hide",
            Behavior::Run => "run",
            Behavior::Dart => "dart",
            Behavior::Loiter => "loiter",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Plant,
    Pot,
}

impl ObjectKind {
    pub fn proxy_radius(self) -> f32 {
        match self {
            ObjectKind::Plant => 1.5,
            ObjectKind::Pot => 2.5,
        }
    }
}

pub trait Movable {
    fn translation(&self) -> Vec3;
    fn rotation(&self) -> Quat;
    fn bounding_radius(&self) -> f32;
}

/// Visual transform of an entity. `rotation` includes the model alignment
/// offset; use [`Body::heading`] for the direction of travel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Body {
    pub fn at(translation: Vec3) -> Self {
        Self {
            translation,
            rotation: MODEL_ALIGNMENT,
            scale: Vec3::ONE,
        }
    }

    pub fn heading(&self) -> Quat {
        self.rotation * MODEL_ALIGNMENT.inverse()
    }

    pub fn forward(&self) -> Vec3 {
        self.heading() * Vec3::Z
    }
}

/// Per-fish steering state. Target and shelter are ids into the scenario
/// registry, never owning references.
#[derive(Debug, Clone)]
pub struct Cichlid {
    pub size_class: SizeClass,
    pub color: CichlidColor,
    pub behavior: Behavior,
    /// Equal to the fish's own id when it has no target.
    pub target: EntityId,
    pub target_aggression: f64,
    pub shelter: Option<EntityId>,
    pub cell: GridIndex,
    pub destination: Vec3,
    pub at_destination: bool,
    pub has_destination: bool,
    pub collision_detected: bool,
    pub glowing: bool,
    pub idle_timer: f32,
    pub idle_phase: f32,
    pub last_decision: f32,
    pub dwell: f32,
    pub original_speed: f32,
}

impl Cichlid {
    pub fn new(
        id: EntityId,
        size_class: SizeClass,
        color: CichlidColor,
        grid: &NavigationGrid,
        speed: f32,
        rng: &mut impl Rng,
    ) -> Self {
        let size = grid.size();
        let cell = GridIndex::new(
            rng.gen_range(0..size),
            rng.gen_range(0..size),
            rng.gen_range(0..size),
        );
        Self {
            size_class,
            color,
            behavior: Behavior::Idle,
            target: id,
            target_aggression: 0.0,
            shelter: None,
            cell,
            destination: grid.point(cell),
            at_destination: false,
            has_destination: false,
            collision_detected: false,
            glowing: false,
            idle_timer: rng.r#gen::<f32>(),
            idle_phase: 90.0,
            last_decision: 0.0,
            dwell: rng.gen_range(0.0..10.0),
            original_speed: speed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveIntents {
    pub forward: bool,
    pub backward: bool,
    pub ascend: bool,
    pub descend: bool,
    pub turn_left: bool,
    pub turn_right: bool,
    pub sprint: bool,
}

/// Set by the input collaborator when the player presses against a wall;
/// each flag pushes the player back along its axis for one update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MovementLocks {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub forward: bool,
    pub backward: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PlayerControl {
    pub intents: MoveIntents,
    pub locks: MovementLocks,
}

#[derive(Debug, Clone)]
pub enum EntityKind {
    Cichlid(Box<Cichlid>),
    Player(PlayerControl),
    Environment(ObjectKind),
}

#[derive(Debug, Clone)]
pub struct TankEntity {
    pub id: EntityId,
    pub name: String,
    pub body: Body,
    // Display length in inches.
    pub size: f32,
    pub speed: f32,
    pub sex: Sex,
    pub kind: EntityKind,
}

impl TankEntity {
    pub fn as_cichlid(&self) -> Option<&Cichlid> {
        match &self.kind {
            EntityKind::Cichlid(fish) => Some(fish),
            _ => None,
        }
    }

    pub fn as_cichlid_mut(&mut self) -> Option<&mut Cichlid> {
        match &mut self.kind {
            EntityKind::Cichlid(fish) => Some(fish),
            _ => None,
        }
    }

    pub fn is_fish(&self) -> bool {
        matches!(self.kind, EntityKind::Cichlid(_))
    }

    pub fn is_player(&self) -> bool {
        matches!(self.kind, EntityKind::Player(_))
    }

    pub fn object_kind(&self) -> Option<ObjectKind> {
        match self.kind {
            EntityKind::Environment(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn behavior(&self) -> Option<Behavior> {
        self.as_cichlid().map(|fish| fish.behavior)
    }
}

impl Movable for TankEntity {
    fn translation(&self) -> Vec3 {
        self.body.translation
    }

    fn rotation(&self) -> Quat {
        self.body.rotation
    }

    fn bounding_radius(&self) -> f32 {
        match self.kind {
            EntityKind::Environment(kind) => kind.proxy_radius() * self.body.scale.max_element(),
            _ => self.size / 2.0,
        }
    }
}
