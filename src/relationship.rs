use std::collections::HashMap;
use std::f32::consts::TAU;

use bevy::math::Vec3;
use rand::Rng;

use crate::entity::{EntityId, Movable, TankEntity};
use crate::spatial::{Hit, SpatialQuery};

pub const DISTANCE_WEIGHT: f64 = 1.005;
pub const SIZE_WEIGHT: f64 = 1.002;
pub const SPEED_WEIGHT: f64 = 1.0;
pub const AGGRESSION_THRESHOLD: f64 = 1.998;

/// One centre ray plus this many rays from the sampling ring.
pub const RING_RAYS: usize = 50;
pub const RING_RADIUS: f32 = 0.001;
pub const MAX_VISIBILITY: u32 = 2 * (RING_RAYS as u32 + 1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Relationship {
    pub range: f64,
    /// 0 (fully blocked) to [`MAX_VISIBILITY`] (clear), always even.
    pub visibility: u32,
}

/// Aggression of a subject towards an opponent. Pure in its inputs and
/// non-decreasing in `visibility`.
pub fn aggression(
    range: f64,
    visibility: u32,
    size_ratio: f64,
    speed_ratio: f64,
    sexes_differ: bool,
) -> f64 {
    let mut base =
        (1.0 / range) * DISTANCE_WEIGHT + size_ratio * SIZE_WEIGHT + speed_ratio * SPEED_WEIGHT;
    if sexes_differ {
        base *= 2.0;
    }
    let scaled = base * f64::from(visibility);
    2.0 - 1.0 / scaled
}

pub fn aggression_between(subject: &TankEntity, opponent: &TankEntity, relation: Relationship) -> f64 {
    aggression(
        relation.range,
        relation.visibility,
        f64::from(subject.size) / f64::from(opponent.size),
        f64::from(subject.speed) / f64::from(opponent.speed),
        subject.sex != opponent.sex,
    )
}

fn ray_sees(hits: &[Hit], subject: EntityId, object: EntityId) -> bool {
    match hits.first() {
        None => true,
        Some(hit) if hit.entity == object => true,
        Some(hit) if hit.entity == subject => hits
            .iter()
            .find(|hit| hit.entity != subject)
            .is_none_or(|hit| hit.entity == object),
        Some(_) => false,
    }
}

/// Casts the centre ray and [`RING_RAYS`] rays from a thin ring around the
/// subject, all parallel to the line of sight, and scores how many of them
/// reach the object.
pub fn visibility(
    space: &impl SpatialQuery,
    subject: EntityId,
    from: Vec3,
    object: EntityId,
    to: Vec3,
    rng: &mut impl Rng,
) -> u32 {
    let view = to - from;
    let Some(axis) = view.try_normalize() else {
        return MAX_VISIBILITY;
    };
    let (u, v) = axis.any_orthonormal_pair();

    let mut seen = u32::from(ray_sees(&space.cast(from, view), subject, object));
    for _ in 0..RING_RAYS {
        let angle = rng.gen_range(0.0..TAU);
        let radius = rng.gen_range(0.0..=RING_RADIUS);
        let origin = from + (u * angle.cos() + v * angle.sin()) * radius;
        if ray_sees(&space.cast(origin, view), subject, object) {
            seen += 1;
        }
    }
    seen * 2
}

#[derive(Debug, Default)]
pub struct RelationshipCache {
    entries: HashMap<(EntityId, EntityId), Relationship>,
}

impl RelationshipCache {
    pub fn evaluate(
        &mut self,
        subject: &TankEntity,
        object: &TankEntity,
        space: &impl SpatialQuery,
        rng: &mut impl Rng,
    ) -> Relationship {
        *self
            .entries
            .entry((subject.id, object.id))
            .or_insert_with(|| Relationship {
                range: f64::from(subject.translation().distance(object.translation())),
                visibility: visibility(
                    space,
                    subject.id,
                    subject.translation(),
                    object.id,
                    object.translation(),
                    rng,
                ),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug)]
pub struct Tick {
    number: u64,
    relationships: RelationshipCache,
}

impl Tick {
    pub fn begin(number: u64) -> Self {
        Self {
            number,
            relationships: RelationshipCache::default(),
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn relationships(&mut self) -> &mut RelationshipCache {
        &mut self.relationships
    }

    /// Ends the frame, discarding every relationship measured in it.
    /// Returns how many pairs were measured.
    pub fn finish(self) -> usize {
        self.relationships.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Body, EntityKind, ObjectKind, Sex};
    use crate::spatial::SphereSpace;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rock(id: u64, at: Vec3) -> TankEntity {
        TankEntity {
            id: EntityId(id),
            name: format!("rock {id}"),
            body: Body::at(at),
            size: 2.0,
            speed: 1.0,
            sex: Sex::Male,
            kind: EntityKind::Environment(ObjectKind::Pot),
        }
    }

    #[test]
    fn worked_example_exceeds_threshold() {
        // range 1, size term 2, speed 2 vs 1, differing sexes, full visibility
        let score = aggression(1.0, 102, 2.0, 2.0, true);
        let expected = 2.0 - 1.0 / (5.009 * 2.0 * 102.0);
        assert!((score - expected).abs() < 1e-9);
        assert!(score > AGGRESSION_THRESHOLD);
        assert!((score - 1.999).abs() < 1e-3);
    }

    #[test]
    fn blocked_sight_gives_no_aggression() {
        assert!(aggression(1.0, 0, 1.0, 1.0, false) < AGGRESSION_THRESHOLD);
    }

    #[test]
    fn clear_tank_is_fully_visible() {
        let mut space = SphereSpace::new();
        space.attach(EntityId(1), Vec3::ZERO, 1.0);
        space.attach(EntityId(2), Vec3::new(6.0, 0.0, 0.0), 1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let score = visibility(
            &space,
            EntityId(1),
            Vec3::ZERO,
            EntityId(2),
            Vec3::new(6.0, 0.0, 0.0),
            &mut rng,
        );
        assert_eq!(score, MAX_VISIBILITY);
    }

    #[test]
    fn obstacle_in_between_blocks_sight() {
        let mut space = SphereSpace::new();
        space.attach(EntityId(1), Vec3::ZERO, 1.0);
        space.attach(EntityId(2), Vec3::new(10.0, 0.0, 0.0), 1.0);
        space.attach(EntityId(3), Vec3::new(5.0, 0.0, 0.0), 2.0);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let score = visibility(
            &space,
            EntityId(1),
            Vec3::ZERO,
            EntityId(2),
            Vec3::new(10.0, 0.0, 0.0),
            &mut rng,
        );
        assert_eq!(score, 0);
    }

    #[test]
    fn cache_serves_repeat_lookups_within_a_tick() {
        let a = rock(1, Vec3::ZERO);
        let mut b = rock(2, Vec3::new(3.0, 4.0, 0.0));
        let mut space = SphereSpace::new();
        space.attach(a.id, a.translation(), 1.0);
        space.attach(b.id, b.translation(), 1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let mut tick = Tick::begin(1);
        let first = tick.relationships().evaluate(&a, &b, &space, &mut rng);
        assert!((first.range - 5.0).abs() < 1e-6);

        b.body.translation = Vec3::new(30.0, 0.0, 0.0);
        let second = tick.relationships().evaluate(&a, &b, &space, &mut rng);
        assert_eq!(first, second);
        assert_eq!(tick.finish(), 1);

        let mut next = Tick::begin(2);
        assert_eq!(next.relationships().len(), 0);
        let fresh = next.relationships().evaluate(&a, &b, &space, &mut rng);
        assert!((fresh.range - 30.0).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn aggression_never_drops_with_visibility(
            range in 0.1f64..50.0,
            low in 0u32..=51,
            high in 0u32..=51,
            size_ratio in 0.5f64..2.0,
            speed_ratio in 0.2f64..5.0,
            differ in any::<bool>(),
        ) {
            let (low, high) = (low.min(high) * 2, low.max(high) * 2);
            let a = aggression(range, low, size_ratio, speed_ratio, differ);
            let b = aggression(range, high, size_ratio, speed_ratio, differ);
            prop_assert!(b >= a);
            prop_assert_eq!(a, aggression(range, low, size_ratio, speed_ratio, differ));
        }

        #[test]
        fn visibility_is_even_and_bounded(
            seed in any::<u64>(),
            ox in -10.0f32..10.0,
            oy in -10.0f32..10.0,
            blocker in proptest::option::of(-10.0f32..10.0),
        ) {
            let mut space = SphereSpace::new();
            let target = Vec3::new(ox, oy, 3.0);
            space.attach(EntityId(1), Vec3::ZERO, 1.0);
            space.attach(EntityId(2), target, 1.0);
            if let Some(x) = blocker {
                space.attach(EntityId(3), Vec3::new(x, 0.0, 1.5), 1.0);
            }
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let score = visibility(&space, EntityId(1), Vec3::ZERO, EntityId(2), target, &mut rng);
            prop_assert!(score <= MAX_VISIBILITY);
            prop_assert_eq!(score % 2, 0);
        }
    }
}
