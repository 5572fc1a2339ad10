use std::f32::consts::FRAC_1_SQRT_2;

use bevy::math::{Mat3, Quat, Vec3};
use rand::Rng;

use crate::entity::Body;
use crate::grid::GridIndex;

/// Quarter turn about +Y between the fish mesh and its direction of travel.
pub const MODEL_ALIGNMENT: Quat = Quat::from_xyzw(0.0, FRAC_1_SQRT_2, 0.0, FRAC_1_SQRT_2);

pub const ARRIVAL_EPSILON: f32 = 0.01;
pub const HOVER_AMPLITUDE: f32 = 1.0e-4;
pub const WANDER_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Movement {
    pub body: Body,
    pub arrived: bool,
}

/// Rotation whose local +Z points along `direction`, keeping +Y up.
pub fn facing(direction: Vec3) -> Quat {
    let forward = direction.normalize_or_zero();
    if forward == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    let right = Vec3::Y.cross(forward);
    if right.length_squared() < 1.0e-8 {
        return Quat::from_rotation_arc(Vec3::Z, forward);
    }
    let right = right.normalize();
    let up = forward.cross(right);
    Quat::from_mat3(&Mat3::from_cols(right, up, forward))
}

pub fn has_arrived(position: Vec3, destination: Vec3) -> bool {
    (position - destination)
        .abs()
        .cmplt(Vec3::splat(ARRIVAL_EPSILON))
        .all()
}

/// Turns to face `destination` and advances `speed * tpf` along the new
/// heading. The step never carries the body past its destination.
pub fn move_toward(body: Body, destination: Vec3, speed: f32, tpf: f32) -> Movement {
    let offset = destination - body.translation;
    let heading = match offset.try_normalize() {
        Some(direction) => facing(direction),
        None => body.heading(),
    };
    let step = (speed * tpf).max(0.0).min(offset.length());
    let translation = body.translation + heading * Vec3::Z * step;

    Movement {
        body: Body {
            translation,
            rotation: heading * MODEL_ALIGNMENT,
            scale: body.scale,
        },
        arrived: has_arrived(translation, destination),
    }
}

pub fn hover(body: &mut Body, phase: &mut f32, tpf: f32) {
    *phase += tpf * 2.0;
    body.translation.y += phase.sin() * HOVER_AMPLITUDE;
}

/// Random-walk step on one axis. `toward_far` moves up the axis unless the
/// index is within [`WANDER_LIMIT`] of the top, in which case it reflects
/// down; otherwise moves down unless within the limit of zero.
pub fn next_index_with(current: usize, size: usize, toward_far: bool, step: usize) -> usize {
    let max = size.saturating_sub(1);
    let current = current.min(max);
    let next = if toward_far {
        if current + WANDER_LIMIT >= size {
            current.saturating_sub(step)
        } else {
            current + step
        }
    } else if current <= WANDER_LIMIT {
        current + step
    } else {
        current - step
    };
    next.min(max)
}

pub fn next_index(current: usize, size: usize, rng: &mut impl Rng) -> usize {
    let toward_far = rng.gen_bool(0.5);
    let step = rng.gen_range(1..=WANDER_LIMIT);
    next_index_with(current, size, toward_far, step)
}

pub fn next_cell(cell: GridIndex, size: usize, rng: &mut impl Rng) -> GridIndex {
    GridIndex::new(
        next_index(cell.x, size, rng),
        next_index(cell.y, size, rng),
        next_index(cell.z, size, rng),
    )
}

fn step_up(index: usize, size: usize) -> usize {
    if index + 1 < size {
        index + 1
    } else {
        index.min(size.saturating_sub(1))
    }
}

fn step_down(index: usize, size: usize) -> usize {
    index.saturating_sub(1).min(size.saturating_sub(1))
}

pub fn chase_step(index: usize, size: usize, position: f32, target: f32) -> usize {
    if target > position {
        step_up(index, size)
    } else {
        step_down(index, size)
    }
}

pub fn avoid_step(index: usize, size: usize, position: f32, threat: f32) -> usize {
    if position > threat {
        step_up(index, size)
    } else {
        step_down(index, size)
    }
}

pub fn chase_cell(cell: GridIndex, size: usize, position: Vec3, target: Vec3) -> GridIndex {
    GridIndex::new(
        chase_step(cell.x, size, position.x, target.x),
        chase_step(cell.y, size, position.y, target.y),
        chase_step(cell.z, size, position.z, target.z),
    )
}

pub fn avoid_cell(cell: GridIndex, size: usize, position: Vec3, threat: Vec3) -> GridIndex {
    GridIndex::new(
        avoid_step(cell.x, size, position.x, threat.x),
        avoid_step(cell.y, size, position.y, threat.y),
        avoid_step(cell.z, size, position.z, threat.z),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn wander_reflects_at_the_far_edge() {
        assert_eq!(next_index_with(8, 10, true, 5), 3);
        assert_eq!(next_index_with(2, 10, true, 5), 7);
    }

    #[test]
    fn wander_toward_near_edge_offsets_the_index() {
        assert_eq!(next_index_with(3, 10, false, 2), 5);
        assert_eq!(next_index_with(9, 10, false, 4), 5);
    }

    #[test]
    fn facing_points_local_z_along_direction() {
        for direction in [Vec3::X, Vec3::NEG_Z, Vec3::new(1.0, 2.0, -3.0), Vec3::Y] {
            let forward = facing(direction) * Vec3::Z;
            assert!(forward.distance(direction.normalize()) < 1e-5);
        }
    }

    #[test]
    fn move_toward_advances_along_the_heading() {
        let body = Body::at(Vec3::ZERO);
        let moved = move_toward(body, Vec3::new(10.0, 0.0, 0.0), 2.0, 0.5);
        assert!(moved.body.translation.distance(Vec3::X) < 1e-5);
        assert!(!moved.arrived);
        assert!(moved.body.forward().distance(Vec3::X) < 1e-5);
    }

    #[test]
    fn move_toward_stops_on_the_destination() {
        let body = Body::at(Vec3::ZERO);
        let destination = Vec3::new(0.3, -0.2, 0.1);
        let moved = move_toward(body, destination, 5.0, 1.0);
        assert!(moved.arrived);
        assert!(has_arrived(moved.body.translation, destination));
    }

    #[test]
    fn arrival_requires_every_axis_within_epsilon() {
        let target = Vec3::new(1.0, 1.0, 1.0);
        assert!(has_arrived(Vec3::new(1.009, 0.991, 1.0), target));
        assert!(!has_arrived(Vec3::new(1.0, 1.0, 1.011), target));
        assert!(!has_arrived(Vec3::new(1.0101, 1.0, 1.0), target));
    }

    #[test]
    fn hover_only_moves_vertically() {
        let mut body = Body::at(Vec3::new(1.0, 2.0, 3.0));
        let mut phase = 90.0;
        hover(&mut body, &mut phase, 0.25);
        assert_eq!(phase, 90.5);
        assert_eq!(body.translation.x, 1.0);
        assert!((body.translation.y - 2.0).abs() <= HOVER_AMPLITUDE);
    }

    proptest! {
        #[test]
        fn grid_steps_stay_in_range(
            size in 1usize..32,
            index in 0usize..32,
            position in -50.0f32..50.0,
            reference in -50.0f32..50.0,
            toward_far in any::<bool>(),
            step in 1usize..=WANDER_LIMIT,
            seed in any::<u64>(),
        ) {
            let index = index % size;
            prop_assert!(next_index_with(index, size, toward_far, step) < size);
            prop_assert!(chase_step(index, size, position, reference) < size);
            prop_assert!(avoid_step(index, size, position, reference) < size);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            prop_assert!(next_index(index, size, &mut rng) < size);
        }

        #[test]
        fn arrival_matches_per_axis_deltas(
            dx in -0.05f32..0.05,
            dy in -0.05f32..0.05,
            dz in -0.05f32..0.05,
        ) {
            let expected = dx.abs() < ARRIVAL_EPSILON
                && dy.abs() < ARRIVAL_EPSILON
                && dz.abs() < ARRIVAL_EPSILON;
            prop_assert_eq!(has_arrived(Vec3::new(dx, dy, dz), Vec3::ZERO), expected);
        }
    }
}
