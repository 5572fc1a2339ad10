use std::collections::BTreeMap;

use bevy::math::Vec3;

use crate::entity::{Cichlid, EntityId, Movable, TankEntity};
use crate::grid::GridIndex;
use crate::movement::avoid_cell;
use crate::spatial::SpatialQuery;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Avoidance {
    pub deflect_to: Option<GridIndex>,
    /// A fish lies on the path to the destination. Drives the alarm glow
    /// and forces the next decision to `Run`.
    pub fish_in_path: bool,
}

/// Looks at everything overlapping `entity`. The player is always steered
/// around; other fish only when the path from the next position to the
/// destination runs through one of them.
pub fn avoid(
    entity: &TankEntity,
    fish: &Cichlid,
    overlapping: &[EntityId],
    others: &BTreeMap<EntityId, TankEntity>,
    space: &impl SpatialQuery,
    grid_size: usize,
    tpf: f32,
) -> Avoidance {
    let position = entity.translation();
    let next_position = position + entity.body.forward() * entity.speed * tpf;

    let mut player = None;
    let mut obstacles = Vec::new();
    for other in overlapping.iter().filter_map(|id| others.get(id)) {
        if other.is_player() {
            player.get_or_insert(other.translation());
        } else if other.is_fish() {
            obstacles.push(other.id);
        }
    }

    let blocked_at = if obstacles.is_empty() {
        None
    } else {
        space
            .cast_among(next_position, fish.destination - next_position, &obstacles)
            .map(|hit| hit.point)
    };

    let threat: Option<Vec3> = player.or(blocked_at);
    Avoidance {
        deflect_to: threat.map(|point| avoid_cell(fish.cell, grid_size, position, point)),
        fish_in_path: blocked_at.is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Body, CichlidColor, EntityKind, PlayerControl, Sex, SizeClass};
    use crate::grid::NavigationGrid;
    use crate::spatial::SphereSpace;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn fish(id: u64, at: Vec3, grid: &NavigationGrid) -> TankEntity {
        let mut rng = ChaCha8Rng::seed_from_u64(id);
        TankEntity {
            id: EntityId(id),
            name: format!("fish {id}"),
            body: Body::at(at),
            size: 2.0,
            speed: 2.0,
            sex: Sex::Female,
            kind: EntityKind::Cichlid(Box::new(Cichlid::new(
                EntityId(id),
                SizeClass::Small,
                CichlidColor::Black,
                grid,
                2.0,
                &mut rng,
            ))),
        }
    }

    fn setup() -> (NavigationGrid, TankEntity, Cichlid) {
        let grid = NavigationGrid::build(36.0, 19.0, 18.0, 10);
        let subject = fish(1, grid.point(GridIndex::new(5, 5, 5)), &grid);
        let mut state = subject.as_cichlid().unwrap().clone();
        state.cell = GridIndex::new(5, 5, 5);
        state.destination = grid.point(GridIndex::new(9, 5, 5));
        (grid, subject, state)
    }

    #[test]
    fn fish_on_the_path_causes_deflection() {
        let (grid, subject, state) = setup();
        let blocker = fish(2, subject.translation() + Vec3::new(1.5, 0.0, 0.0), &grid);
        let mut space = SphereSpace::new();
        space.attach(subject.id, subject.translation(), 1.0);
        space.attach(blocker.id, blocker.translation(), 1.0);
        let others = BTreeMap::from([(blocker.id, blocker)]);

        let result = avoid(&subject, &state, &[EntityId(2)], &others, &space, 10, 0.016);
        assert!(result.fish_in_path);
        // obstruction lies on +x, so the deflection steps down that axis
        assert_eq!(result.deflect_to.map(|cell| cell.x), Some(4));
    }

    #[test]
    fn fish_off_the_path_is_ignored() {
        let (grid, subject, state) = setup();
        let bystander = fish(2, subject.translation() + Vec3::new(0.0, 0.0, -1.5), &grid);
        let mut space = SphereSpace::new();
        space.attach(subject.id, subject.translation(), 1.0);
        space.attach(bystander.id, bystander.translation(), 1.0);
        let others = BTreeMap::from([(bystander.id, bystander)]);

        let result = avoid(&subject, &state, &[EntityId(2)], &others, &space, 10, 0.016);
        assert!(!result.fish_in_path);
        assert_eq!(result.deflect_to, None);
    }

    #[test]
    fn player_contact_always_deflects() {
        let (_grid, subject, state) = setup();
        let player = TankEntity {
            id: EntityId(9),
            name: "Player".into(),
            body: Body::at(subject.translation() + Vec3::new(0.0, 1.0, 0.0)),
            size: 1.0,
            speed: 1.0,
            sex: Sex::Male,
            kind: EntityKind::Player(PlayerControl::default()),
        };
        let space = SphereSpace::new();
        let others = BTreeMap::from([(player.id, player)]);

        let result = avoid(&subject, &state, &[EntityId(9)], &others, &space, 10, 0.016);
        assert!(!result.fish_in_path);
        let cell = result.deflect_to.unwrap();
        assert_eq!(cell.y, 4);
    }
}
