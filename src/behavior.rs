use std::collections::BTreeMap;
use std::f32::consts::FRAC_PI_4;

use bevy::log::debug;
use bevy::math::Vec3;
use rand::Rng;

use crate::avoidance;
use crate::entity::{Behavior, Cichlid, EntityId, EntityKind, Movable, ObjectKind, TankEntity};
use crate::error::SimError;
use crate::grid::{GridIndex, NavigationGrid};
use crate::movement::{self, avoid_cell, chase_cell};
use crate::relationship::{AGGRESSION_THRESHOLD, Tick, aggression_between};
use crate::spatial::SpatialQuery;

/// How far past a plant a hiding fish aims, in world units.
pub const OBJECT_DISTANCE: f32 = 30.0;
pub const DWELL_SECONDS: f32 = 4.0;
pub const ATTACK_DWELL_SECONDS: f32 = 15.0;

pub struct Surroundings<'a, S, R> {
    /// Every entity except the one being updated.
    pub others: &'a mut BTreeMap<EntityId, TankEntity>,
    pub space: &'a S,
    pub grid: &'a NavigationGrid,
    pub rng: &'a mut R,
    pub now: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Steer {
    Wander,
    Toward(GridIndex),
    // Stay put and bob.
    Hold,
}

fn cichlid_mut(entity: &mut TankEntity) -> Result<(&mut Cichlid, &mut f32), SimError> {
    let id = entity.id;
    match &mut entity.kind {
        EntityKind::Cichlid(fish) => Ok((&mut **fish, &mut entity.speed)),
        _ => Err(SimError::NotAFish(id)),
    }
}

fn cichlid(entity: &TankEntity) -> Result<&Cichlid, SimError> {
    entity.as_cichlid().ok_or(SimError::NotAFish(entity.id))
}

pub fn decide(
    id: EntityId,
    fish: &mut Cichlid,
    speed: &mut f32,
    now: f32,
    rng: &mut impl Rng,
) -> bool {
    if now < fish.last_decision + fish.dwell {
        return false;
    }
    *speed = fish.original_speed;
    if *speed == 0.0 {
        *speed = 1.0;
    }
    fish.last_decision = now;
    fish.dwell = rng.gen_range(0.0..DWELL_SECONDS);
    fish.target_aggression = 0.0;
    fish.target = id;

    let next = loop {
        let candidate = match rng.gen_range(0..4) {
            0 => Behavior::Attack,
            1 => Behavior::Hide,
            2 => Behavior::Dart,
            _ => Behavior::Loiter,
        };
        if candidate == Behavior::Attack || candidate != fish.behavior {
            break candidate;
        }
    };
    *speed *= rng.gen_range(1.0..2.0);
    if next == Behavior::Attack {
        fish.dwell = rng.gen_range(0.0..ATTACK_DWELL_SECONDS);
    }
    fish.behavior = next;
    debug!("fish {id} changed behavior to {next}");
    true
}

/// Highest aggression towards any other fish, if it clears both the
/// threshold and `floor`.
pub fn find_target<S: SpatialQuery, R: Rng>(
    subject: &TankEntity,
    floor: f64,
    world: &mut Surroundings<'_, S, R>,
    tick: &mut Tick,
) -> Option<(EntityId, f64)> {
    let mut best: Option<(EntityId, f64)> = None;
    for other in world.others.values().filter(|other| other.is_fish()) {
        let relation = tick
            .relationships()
            .evaluate(subject, other, world.space, &mut *world.rng);
        let score = aggression_between(subject, other, relation);
        let current = best.map_or(floor, |(_, score)| score);
        if score > current && score > AGGRESSION_THRESHOLD {
            best = Some((other.id, score));
        }
    }
    best
}

/// Interest a fish has in an object as cover. Constant until objects
/// differ in how good they are to hide behind.
pub fn shelter_score(_object: &TankEntity) -> f64 {
    1.0
}

pub fn find_shelter(others: &BTreeMap<EntityId, TankEntity>) -> Option<EntityId> {
    let mut shelter = None;
    for object in others.values().filter(|other| other.object_kind().is_some()) {
        if shelter_score(object) > 0.0 {
            shelter = Some(object.id);
        }
    }
    shelter
}

/// Coordinate on one axis `distance` beyond the shelter, on the side away
/// from the threat.
pub fn hide_coordinate(shelter: f32, threat: f32, distance: f32) -> f32 {
    if threat > shelter {
        shelter - distance
    } else {
        shelter + distance
    }
}

/// Where to hide, if the shelter sits within 45 degrees of the line to the
/// threat and is nearer than it.
pub fn hide_cell(
    position: Vec3,
    threat: Vec3,
    shelter: Vec3,
    kind: ObjectKind,
    grid: &NavigationGrid,
) -> Option<GridIndex> {
    let to_threat = threat - position;
    let to_shelter = shelter - position;
    if to_threat.length_squared() == 0.0 || to_shelter.length_squared() == 0.0 {
        return None;
    }
    if to_threat.angle_between(to_shelter) >= FRAC_PI_4
        || to_shelter.length() >= to_threat.length()
    {
        return None;
    }
    let point = match kind {
        ObjectKind::Pot => shelter,
        ObjectKind::Plant => Vec3::new(
            hide_coordinate(shelter.x, threat.x, OBJECT_DISTANCE),
            hide_coordinate(shelter.y, threat.y, OBJECT_DISTANCE),
            hide_coordinate(shelter.z, threat.z, OBJECT_DISTANCE),
        ),
    };
    Some(grid.nearest_index(grid.bounds().clamp(point)))
}

fn steer<S: SpatialQuery, R: Rng>(
    subject: &TankEntity,
    fish: &Cichlid,
    world: &mut Surroundings<'_, S, R>,
) -> Steer {
    let position = subject.translation();
    let size = world.grid.size();
    let target = (fish.target != subject.id)
        .then(|| world.others.get(&fish.target))
        .flatten()
        .map(|target| target.translation());

    match fish.behavior {
        Behavior::Attack => {
            if fish.target_aggression <= AGGRESSION_THRESHOLD {
                return Steer::Wander;
            }
            let rng = &mut *world.rng;
            let Some(prey) = world.others.get_mut(&fish.target) else {
                return Steer::Wander;
            };
            let prey_position = prey.translation();
            let prey_speed = &mut prey.speed;
            let EntityKind::Cichlid(prey_state) = &mut prey.kind else {
                return Steer::Wander;
            };
            if fish.target_aggression <= prey_state.target_aggression {
                return Steer::Wander;
            }
            prey_state.behavior = Behavior::Run;
            prey_state.target = subject.id;
            *prey_speed = subject.speed * rng.r#gen::<f32>();
            debug!("fish {} chases fish {}", subject.id, fish.target);
            Steer::Toward(chase_cell(fish.cell, size, position, prey_position))
        }
        Behavior::Hide => {
            let shelter = fish.shelter.and_then(|id| world.others.get(&id));
            let (Some(threat), Some(shelter)) = (target, shelter) else {
                return Steer::Wander;
            };
            let Some(kind) = shelter.object_kind() else {
                return Steer::Wander;
            };
            hide_cell(position, threat, shelter.translation(), kind, world.grid)
                .map_or(Steer::Wander, Steer::Toward)
        }
        Behavior::Run | Behavior::Dart => target
            .map(|threat| Steer::Toward(avoid_cell(fish.cell, size, position, threat)))
            .unwrap_or(Steer::Wander),
        Behavior::Loiter => Steer::Hold,
        Behavior::Idle => Steer::Wander,
    }
}

/// Runs one tick for the fish `entity`, which must not be in
/// `world.others`.
pub fn update_fish<S: SpatialQuery, R: Rng>(
    entity: &mut TankEntity,
    world: &mut Surroundings<'_, S, R>,
    tick: &mut Tick,
    tpf: f32,
) -> Result<(), SimError> {
    let id = entity.id;

    if cichlid(entity)?.at_destination {
        let grid = world.grid;
        let rng = &mut *world.rng;
        let body = &mut entity.body;
        let EntityKind::Cichlid(fish) = &mut entity.kind else {
            return Err(SimError::NotAFish(id));
        };
        if !fish.has_destination {
            fish.idle_timer = rng.r#gen::<f32>();
            fish.cell = movement::next_cell(fish.cell, grid.size(), rng);
            fish.destination = grid.point(fish.cell);
            fish.has_destination = true;
        }
        if fish.idle_timer > 0.0 {
            fish.idle_timer -= tpf;
            movement::hover(body, &mut fish.idle_phase, tpf);
        } else {
            fish.at_destination = false;
        }
        return Ok(());
    }

    {
        let (fish, speed) = cichlid_mut(entity)?;
        fish.has_destination = false;
        decide(id, fish, speed, world.now, &mut *world.rng);
    }

    // Forget references to entities that have left the tank.
    {
        let others = &*world.others;
        let (fish, _) = cichlid_mut(entity)?;
        if fish.target != id && !others.contains_key(&fish.target) {
            fish.target = id;
            fish.target_aggression = 0.0;
        }
    }

    let floor = cichlid(entity)?.target_aggression;
    let found = find_target(entity, floor, world, tick);
    let shelter = find_shelter(world.others);
    {
        let (fish, _) = cichlid_mut(entity)?;
        if let Some((target, score)) = found {
            fish.target = target;
            fish.target_aggression = score;
        }
        fish.shelter = shelter;
        if fish.collision_detected && fish.behavior != Behavior::Run {
            fish.behavior = Behavior::Run;
            debug!("fish {id} changed behavior to {} after a collision", Behavior::Run);
        }
    }

    let mut fish = cichlid(entity)?.clone();
    let mut plan = steer(entity, &fish, world);
    // Avoidance looks along the path the plan is about to take.
    if let Steer::Toward(cell) = plan {
        fish.cell = cell.clamped(world.grid.size());
        fish.destination = world.grid.point(fish.cell);
    }

    let overlapping = world.space.overlapping(id);
    let avoidance = if overlapping.is_empty() {
        None
    } else {
        Some(avoidance::avoid(
            entity,
            &fish,
            &overlapping,
            world.others,
            world.space,
            world.grid.size(),
            tpf,
        ))
    };
    if let Some(cell) = avoidance.and_then(|avoidance| avoidance.deflect_to) {
        plan = Steer::Toward(cell);
    }

    let grid = world.grid;
    let body = &mut entity.body;
    let speed = entity.speed;
    let EntityKind::Cichlid(fish) = &mut entity.kind else {
        return Err(SimError::NotAFish(id));
    };
    let fish_in_path = avoidance.is_some_and(|avoidance| avoidance.fish_in_path);
    fish.collision_detected = fish_in_path;
    fish.glowing = fish_in_path;

    match plan {
        Steer::Hold => {
            movement::hover(body, &mut fish.idle_phase, tpf);
            fish.at_destination = true;
        }
        Steer::Toward(cell) => {
            fish.cell = cell.clamped(grid.size());
            fish.destination = grid.point(fish.cell);
        }
        Steer::Wander => {}
    }
    if plan != Steer::Hold {
        let moved = movement::move_toward(*body, fish.destination, speed, tpf);
        *body = moved.body;
        if moved.arrived {
            fish.at_destination = true;
        }
    }
    Ok(())
}
