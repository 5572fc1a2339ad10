use std::collections::BTreeMap;
use std::f32::consts::FRAC_PI_2;

use bevy::log::{info, warn};
use bevy::math::{Quat, Vec3};
use bevy::prelude::Resource;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::behavior::{self, Surroundings};
use crate::entity::{
    Body, Cichlid, CichlidColor, EntityId, EntityKind, Movable, MoveIntents, MovementLocks,
    ObjectKind, PlayerControl, Sex, SizeClass, TankEntity,
};
use crate::error::SimError;
use crate::grid::NavigationGrid;
use crate::movement::MODEL_ALIGNMENT;
use crate::relationship::Tick;
use crate::spatial::SphereSpace;

pub const PLAYER_FORWARD_RATE: f32 = 6.0;
pub const PLAYER_BACKWARD_RATE: f32 = 2.4;
pub const PLAYER_TURN_RATE: f32 = FRAC_PI_2;
pub const PLAYER_LOCK_PUSH: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TankType {
    TenGallon,
    TwentyGallon,
    #[default]
    FiftyGallon,
    HundredGallon,
}

impl TankType {
    pub const ALL: [TankType; 4] = [
        TankType::TenGallon,
        TankType::TwentyGallon,
        TankType::FiftyGallon,
        TankType::HundredGallon,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TankType::TenGallon => "10 gallon",
            TankType::TwentyGallon => "20 gallon",
            TankType::FiftyGallon => "50 gallon",
            TankType::HundredGallon => "100 gallon",
        }
    }

    /// Interior width, height and depth in inches.
    pub fn dimensions(self) -> Vec3 {
        match self {
            TankType::TenGallon => Vec3::new(20.0, 12.0, 10.0),
            TankType::TwentyGallon => Vec3::new(24.0, 16.0, 12.0),
            TankType::FiftyGallon => Vec3::new(36.0, 19.0, 18.0),
            TankType::HundredGallon => Vec3::new(60.0, 21.0, 18.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimClock {
    elapsed: f32,
    frame: u64,
}

impl SimClock {
    pub fn advance(&mut self, tpf: f32) {
        self.elapsed += tpf.max(0.0);
        self.frame += 1;
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub frame: u64,
    pub updated: usize,
    pub faults: usize,
    // Relationship pairs measured (and discarded) this tick.
    pub relationships: usize,
}

#[derive(Resource)]
pub struct Scenario {
    tank: TankType,
    grid: NavigationGrid,
    entities: BTreeMap<EntityId, TankEntity>,
    /// Fish in update order.
    roster: Vec<EntityId>,
    player: Option<EntityId>,
    space: SphereSpace,
    rng: ChaCha8Rng,
    clock: SimClock,
    seed: u64,
    next_id: u64,
}

impl Scenario {
    pub fn new(tank: TankType, grid_size: usize, seed: u64) -> Self {
        let dims = tank.dimensions();
        Self {
            tank,
            grid: NavigationGrid::build(dims.x, dims.y, dims.z, grid_size),
            entities: BTreeMap::new(),
            roster: Vec::new(),
            player: None,
            space: SphereSpace::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            clock: SimClock::default(),
            seed,
            next_id: 1,
        }
    }

    pub fn populate(&mut self, fish: usize, plants: usize, pots: usize) {
        for _ in 0..plants {
            self.add_object(ObjectKind::Plant);
        }
        for _ in 0..pots {
            self.add_object(ObjectKind::Pot);
        }
        for _ in 0..fish {
            self.add_random_fish();
        }
        info!(
            "Populated {} with {} fish, {} plants and {} pots",
            self.tank.name(),
            fish,
            plants,
            pots
        );
    }

    pub fn tank(&self) -> TankType {
        self.tank
    }

    pub fn grid(&self) -> &NavigationGrid {
        &self.grid
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn clock(&self) -> SimClock {
        self.clock
    }

    pub fn space(&self) -> &SphereSpace {
        &self.space
    }

    pub fn entity(&self, id: EntityId) -> Option<&TankEntity> {
        self.entities.get(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &TankEntity> {
        self.entities.values()
    }

    pub fn fish(&self) -> impl Iterator<Item = &TankEntity> {
        self.roster.iter().filter_map(|id| self.entities.get(id))
    }

    pub fn fish_count(&self) -> usize {
        self.roster.len()
    }

    pub fn player_id(&self) -> Option<EntityId> {
        self.player
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    fn insert(&mut self, entity: TankEntity) -> EntityId {
        let id = entity.id;
        self.space
            .attach(id, entity.translation(), entity.bounding_radius());
        if entity.is_fish() {
            self.roster.push(id);
        }
        self.entities.insert(id, entity);
        id
    }

    pub fn add_fish(&mut self, size_class: SizeClass, color: CichlidColor) -> EntityId {
        let id = self.allocate_id();
        let speed = self.rng.gen_range(1.5..3.5);
        let sex = if self.rng.gen_bool(0.5) {
            Sex::Male
        } else {
            Sex::Female
        };
        let state = Cichlid::new(id, size_class, color, &self.grid, speed, &mut self.rng);
        let length = size_class.length_inches();
        let body = Body {
            translation: state.destination,
            rotation: MODEL_ALIGNMENT,
            scale: Vec3::splat(length),
        };
        self.insert(TankEntity {
            id,
            name: format!("Cichlid {}", id.0),
            body,
            size: length,
            speed,
            sex,
            kind: EntityKind::Cichlid(Box::new(state)),
        })
    }

    pub fn add_random_fish(&mut self) -> EntityId {
        let size = SizeClass::ALL[self.rng.gen_range(0..SizeClass::ALL.len())];
        let color = CichlidColor::ALL[self.rng.gen_range(0..CichlidColor::ALL.len())];
        self.add_fish(size, color)
    }

    /// Adds a fish at a stored transform. Behaviour state starts fresh,
    /// with the fish's current cell derived from its position.
    pub fn restore_fish(&mut self, size_class: SizeClass, color: CichlidColor, body: Body) -> EntityId {
        let id = self.add_fish(size_class, color);
        let bounds = self.grid.bounds();
        let cell = self.grid.nearest_index(bounds.clamp(body.translation));
        let destination = self.grid.point(cell);
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.body = Body {
                translation: bounds.clamp(body.translation),
                ..body
            };
            if let Some(fish) = entity.as_cichlid_mut() {
                fish.cell = cell;
                fish.destination = destination;
            }
            self.space.move_to(id, entity.body.translation);
        }
        id
    }

    pub fn add_object(&mut self, kind: ObjectKind) -> EntityId {
        let bounds = self.grid.bounds();
        let radius = kind.proxy_radius();
        let x = self.rng.gen_range(bounds.min.x + radius..=bounds.max.x - radius);
        let z = self.rng.gen_range(bounds.min.z + radius..=bounds.max.z - radius);
        self.restore_object(kind, Body::at(Vec3::new(x, bounds.min.y + radius, z)))
    }

    pub fn restore_object(&mut self, kind: ObjectKind, body: Body) -> EntityId {
        let id = self.allocate_id();
        let label = match kind {
            ObjectKind::Plant => "Plant",
            ObjectKind::Pot => "Pot",
        };
        self.insert(TankEntity {
            id,
            name: format!("{label} {}", id.0),
            body: Body {
                translation: self.grid.bounds().clamp(body.translation),
                ..body
            },
            size: kind.proxy_radius() * 2.0,
            speed: 0.0,
            sex: Sex::Male,
            kind: EntityKind::Environment(kind),
        })
    }

    /// Adds the player at the tank centre, or returns the existing one.
    pub fn add_player(&mut self) -> EntityId {
        if let Some(id) = self.player {
            return id;
        }
        let id = self.allocate_id();
        self.player = Some(id);
        self.insert(TankEntity {
            id,
            name: "Player".to_string(),
            body: Body::at(self.grid.bounds().center()),
            size: 1.0,
            speed: 1.0,
            sex: Sex::Male,
            kind: EntityKind::Player(PlayerControl::default()),
        })
    }

    /// Releases the entity's collision proxy, then hands the entity back.
    pub fn remove(&mut self, id: EntityId) -> Option<TankEntity> {
        if !self.entities.contains_key(&id) {
            return None;
        }
        self.space.detach(id);
        self.roster.retain(|other| *other != id);
        if self.player == Some(id) {
            self.player = None;
        }
        self.entities.remove(&id)
    }

    pub fn remove_last_fish(&mut self) -> Option<TankEntity> {
        let id = *self.roster.last()?;
        self.remove(id)
    }

    pub fn set_player_intents(&mut self, intents: MoveIntents) {
        if let Some(EntityKind::Player(control)) = self
            .player
            .and_then(|id| self.entities.get_mut(&id))
            .map(|player| &mut player.kind)
        {
            control.intents = intents;
        }
    }

    pub fn set_player_locks(&mut self, locks: MovementLocks) {
        if let Some(EntityKind::Player(control)) = self
            .player
            .and_then(|id| self.entities.get_mut(&id))
            .map(|player| &mut player.kind)
        {
            control.locks = locks;
        }
    }

    pub fn wall_locks(&self) -> MovementLocks {
        let Some(player) = self.player.and_then(|id| self.entities.get(&id)) else {
            return MovementLocks::default();
        };
        let bounds = self.grid.bounds();
        let reach = player.bounding_radius();
        let p = player.translation();
        MovementLocks {
            up: p.y >= bounds.max.y - reach,
            down: p.y <= bounds.min.y + reach,
            left: p.x <= bounds.min.x + reach,
            right: p.x >= bounds.max.x - reach,
            forward: p.z <= bounds.min.z + reach,
            backward: p.z >= bounds.max.z - reach,
        }
    }

    /// Swaps in a new tank. The grid is rebuilt and every entity is pulled
    /// back inside; fish keep their (clamped) cells and head for them anew.
    pub fn set_tank(&mut self, tank: TankType) -> Result<(), SimError> {
        self.resize(tank, self.grid.size())
    }

    pub fn set_grid_size(&mut self, size: usize) -> Result<(), SimError> {
        self.resize(self.tank, size)
    }

    fn resize(&mut self, tank: TankType, size: usize) -> Result<(), SimError> {
        self.tank = tank;
        let dims = self.tank.dimensions();
        self.grid = NavigationGrid::build(dims.x, dims.y, dims.z, size);
        let bounds = self.grid.bounds();
        let size = self.grid.size();

        for entity in self.entities.values_mut() {
            entity.body.translation = bounds.clamp(entity.body.translation);
            if let EntityKind::Environment(kind) = entity.kind {
                entity.body.translation.y = bounds.min.y + kind.proxy_radius();
            }
            if let Some(fish) = entity.as_cichlid_mut() {
                fish.cell = fish.cell.clamped(size);
                fish.destination =
                    self.grid
                        .at(fish.cell.x as i64, fish.cell.y as i64, fish.cell.z as i64)?;
                fish.at_destination = false;
                fish.has_destination = false;
            }
            self.space.move_to(entity.id, entity.body.translation);
        }
        info!("Tank resized to {} with a {size}^3 grid", self.tank.name());
        Ok(())
    }

    /// Advances the simulation by `tpf` seconds: the player first, then
    /// every fish in roster order. A fish whose update fails is skipped
    /// without disturbing the others.
    pub fn tick(&mut self, tpf: f32) -> TickReport {
        self.clock.advance(tpf);
        let mut tick = Tick::begin(self.clock.frame());

        if let Some(player) = self.player {
            self.update_player(player, tpf);
        }

        let roster = self.roster.clone();
        let mut faults = 0;
        for id in &roster {
            if let Err(err) = self.update_fish(*id, &mut tick, tpf) {
                warn!("fish {id} skipped this tick: {err}");
                faults += 1;
            }
        }

        TickReport {
            frame: tick.number(),
            updated: roster.len() - faults,
            faults,
            relationships: tick.finish(),
        }
    }

    fn update_fish(&mut self, id: EntityId, tick: &mut Tick, tpf: f32) -> Result<(), SimError> {
        let mut entity = self
            .entities
            .remove(&id)
            .ok_or(SimError::MissingEntity(id))?;
        let mut world = Surroundings {
            others: &mut self.entities,
            space: &self.space,
            grid: &self.grid,
            rng: &mut self.rng,
            now: self.clock.elapsed(),
        };
        let result = behavior::update_fish(&mut entity, &mut world, tick, tpf);
        self.space.move_to(id, entity.body.translation);
        self.entities.insert(id, entity);
        result
    }

    fn update_player(&mut self, id: EntityId, tpf: f32) {
        let bounds = self.grid.bounds();
        let Some(player) = self.entities.get_mut(&id) else {
            return;
        };
        let EntityKind::Player(control) = &mut player.kind else {
            return;
        };
        let intents = control.intents;
        let locks = control.locks;
        control.locks = MovementLocks::default();
        control.intents.turn_left = false;
        control.intents.turn_right = false;

        let mut heading = player.body.heading();
        if intents.turn_left {
            heading = Quat::from_rotation_y(PLAYER_TURN_RATE * tpf) * heading;
        }
        if intents.turn_right {
            heading = Quat::from_rotation_y(-PLAYER_TURN_RATE * tpf) * heading;
        }

        let mut rate = if intents.forward {
            PLAYER_FORWARD_RATE
        } else if intents.backward {
            -PLAYER_BACKWARD_RATE
        } else {
            0.0
        };
        if intents.sprint {
            rate *= 2.0;
        }

        let old = player.body.translation;
        let mut next = old + heading * Vec3::Z * rate * tpf;
        if intents.ascend {
            next.y += PLAYER_FORWARD_RATE * tpf;
        }
        if intents.descend {
            next.y -= PLAYER_FORWARD_RATE * tpf;
        }

        if locks.up {
            next.y = old.y - PLAYER_LOCK_PUSH;
        }
        if locks.down {
            next.y = old.y + PLAYER_LOCK_PUSH;
        }
        if locks.left {
            next.x = old.x + PLAYER_LOCK_PUSH;
        }
        if locks.right {
            next.x = old.x - PLAYER_LOCK_PUSH;
        }
        if locks.forward {
            next.z = old.z + PLAYER_LOCK_PUSH;
        }
        if locks.backward {
            next.z = old.z - PLAYER_LOCK_PUSH;
        }

        player.body.translation = bounds.clamp(next);
        player.body.rotation = heading * MODEL_ALIGNMENT;
        self.space.move_to(id, player.body.translation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stocked(seed: u64) -> Scenario {
        let mut scenario = Scenario::new(TankType::FiftyGallon, 10, seed);
        scenario.populate(6, 2, 1);
        scenario.add_player();
        scenario
    }

    #[test]
    fn every_fish_relationship_is_measured_once_per_tick() {
        let mut scenario = Scenario::new(TankType::FiftyGallon, 10, 4);
        scenario.populate(3, 0, 0);
        let report = scenario.tick(0.016);
        assert_eq!(report.updated, 3);
        assert_eq!(report.faults, 0);
        assert_eq!(report.relationships, 6);
    }

    #[test]
    fn fish_stay_inside_the_grid_and_tank() {
        let mut scenario = stocked(21);
        let bounds = scenario.grid().bounds();
        let size = scenario.grid().size();
        for _ in 0..600 {
            scenario.tick(1.0 / 30.0);
            for fish in scenario.fish() {
                let state = fish.as_cichlid().unwrap();
                assert!(state.cell.x < size && state.cell.y < size && state.cell.z < size);
                let p = fish.translation();
                assert!(p.cmpge(bounds.min - 0.01).all() && p.cmple(bounds.max + 0.01).all());
            }
        }
    }

    #[test]
    fn same_seed_same_tank() {
        let mut a = stocked(99);
        let mut b = stocked(99);
        for _ in 0..120 {
            a.tick(1.0 / 60.0);
            b.tick(1.0 / 60.0);
        }
        let positions = |s: &Scenario| s.fish().map(|f| f.translation()).collect::<Vec<_>>();
        assert_eq!(positions(&a), positions(&b));
    }

    #[test]
    fn broken_registration_does_not_stop_the_tick() {
        let mut scenario = Scenario::new(TankType::TenGallon, 10, 8);
        scenario.populate(2, 0, 0);
        scenario.roster.insert(0, EntityId(999));
        let before = scenario.clock().elapsed();
        let report = scenario.tick(0.5);
        assert_eq!(report.faults, 1);
        assert_eq!(report.updated, 2);
        assert!(scenario.clock().elapsed() > before);
    }

    #[test]
    fn removal_releases_the_collision_proxy() {
        let mut scenario = stocked(3);
        let id = scenario.fish().next().unwrap().id;
        let proxies = scenario.space().len();
        let removed = scenario.remove(id).unwrap();
        assert_eq!(removed.id, id);
        assert!(!scenario.space().is_attached(id));
        assert_eq!(scenario.space().len(), proxies - 1);
        assert!(scenario.fish().all(|fish| fish.id != id));
        assert!(scenario.remove(id).is_none());
        scenario.tick(0.1);

        let newest = scenario.fish().last().unwrap().id;
        assert_eq!(scenario.remove_last_fish().unwrap().id, newest);
        assert_eq!(scenario.fish_count(), 4);
    }

    #[test]
    fn resizing_pulls_everything_into_the_new_tank() {
        let mut scenario = Scenario::new(TankType::HundredGallon, 10, 12);
        scenario.populate(8, 2, 2);
        for _ in 0..30 {
            scenario.tick(0.1);
        }
        scenario.set_tank(TankType::TenGallon).unwrap();
        let grid = scenario.grid().clone();
        let bounds = grid.bounds();
        for entity in scenario.entities() {
            let p = entity.translation();
            assert!(p.cmpge(bounds.min).all() && p.cmple(bounds.max).all());
            if let Some(fish) = entity.as_cichlid() {
                assert_eq!(fish.destination, grid.point(fish.cell));
            }
        }

        scenario.set_grid_size(4).unwrap();
        for fish in scenario.fish() {
            let cell = fish.as_cichlid().unwrap().cell;
            assert!(cell.x < 4 && cell.y < 4 && cell.z < 4);
        }
    }

    #[test]
    fn walls_lock_the_player_in() {
        let mut scenario = Scenario::new(TankType::TenGallon, 10, 1);
        assert_eq!(scenario.wall_locks(), MovementLocks::default());
        let id = scenario.add_player();
        assert_eq!(scenario.wall_locks(), MovementLocks::default());

        scenario.set_player_intents(MoveIntents {
            ascend: true,
            ..MoveIntents::default()
        });
        for _ in 0..20 {
            scenario.tick(0.25);
        }
        let top = scenario.grid().bounds().max.y;
        assert_eq!(scenario.entity(id).unwrap().translation().y, top);
        let locks = scenario.wall_locks();
        assert!(locks.up && !locks.down);
    }

    #[test]
    fn player_moves_forward_and_respects_locks() {
        let mut scenario = Scenario::new(TankType::FiftyGallon, 10, 1);
        let id = scenario.add_player();
        let start = scenario.entity(id).unwrap().translation();

        scenario.set_player_intents(MoveIntents {
            forward: true,
            ..MoveIntents::default()
        });
        scenario.tick(0.5);
        let moved = scenario.entity(id).unwrap().translation();
        assert!((moved.distance(start) - PLAYER_FORWARD_RATE * 0.5).abs() < 1e-4);

        scenario.set_player_locks(MovementLocks {
            up: true,
            ..MovementLocks::default()
        });
        scenario.tick(0.5);
        let pushed = scenario.entity(id).unwrap().translation();
        assert!((pushed.y - (moved.y - PLAYER_LOCK_PUSH)).abs() < 1e-5);
        let EntityKind::Player(control) = &scenario.entity(id).unwrap().kind else {
            panic!("player kind changed");
        };
        assert_eq!(control.locks, MovementLocks::default());
    }
}
