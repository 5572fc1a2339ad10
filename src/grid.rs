use bevy::math::Vec3;
use thiserror::Error;

pub const DEFAULT_GRID_SIZE: usize = 10;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GridError {
    #[error("grid index {index:?} is outside a grid of size {size}")]
    OutOfRange { index: [i64; 3], size: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GridIndex {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl GridIndex {
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    pub fn clamped(self, size: usize) -> Self {
        let max = size.saturating_sub(1);
        Self::new(self.x.min(max), self.y.min(max), self.z.min(max))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    /// Interior centred on the origin in x/z, resting on y = 0.
    pub fn from_dimensions(width: f32, height: f32, depth: f32) -> Self {
        Self {
            min: Vec3::new(-width / 2.0, 0.0, -depth / 2.0),
            max: Vec3::new(width / 2.0, height, depth / 2.0),
        }
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) / 2.0
    }

    pub fn clamp(&self, point: Vec3) -> Vec3 {
        point.clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone)]
pub struct NavigationGrid {
    size: usize,
    bounds: Bounds,
    points: Vec<Vec3>,
}

impl NavigationGrid {
    /// Samples `size` cell centres per axis across the interior. A size of
    /// zero is bumped to one so the grid always has at least one cell.
    pub fn build(width: f32, height: f32, depth: f32, size: usize) -> Self {
        let size = size.max(1);
        let bounds = Bounds::from_dimensions(width, height, depth);
        let step = bounds.size() / size as f32;

        let mut points = Vec::with_capacity(size * size * size);
        for ix in 0..size {
            for iy in 0..size {
                for iz in 0..size {
                    let offset = Vec3::new(ix as f32 + 0.5, iy as f32 + 0.5, iz as f32 + 0.5);
                    points.push(bounds.min + offset * step);
                }
            }
        }

        Self {
            size,
            bounds,
            points,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn at(&self, ix: i64, iy: i64, iz: i64) -> Result<Vec3, GridError> {
        let size = self.size as i64;
        let in_range = |i: i64| (0..size).contains(&i);
        if !(in_range(ix) && in_range(iy) && in_range(iz)) {
            return Err(GridError::OutOfRange {
                index: [ix, iy, iz],
                size: self.size,
            });
        }
        let (ix, iy, iz) = (ix as usize, iy as usize, iz as usize);
        Ok(self.points[(ix * self.size + iy) * self.size + iz])
    }

    /// World point of an internally generated index. Out-of-range
    /// components are clamped rather than reported.
    pub fn point(&self, index: GridIndex) -> Vec3 {
        let index = index.clamped(self.size);
        self.points[(index.x * self.size + index.y) * self.size + index.z]
    }

    pub fn nearest_index(&self, point: Vec3) -> GridIndex {
        let step = self.bounds.size() / self.size as f32;
        let relative = (point - self.bounds.min) / step;
        let axis = |v: f32| {
            if v.is_finite() && v > 0.0 {
                (v.floor() as usize).min(self.size - 1)
            } else {
                0
            }
        };
        GridIndex::new(axis(relative.x), axis(relative.y), axis(relative.z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_points_lie_inside_the_interior() {
        let grid = NavigationGrid::build(36.0, 19.0, 18.0, 10);
        let bounds = grid.bounds();
        for ix in 0..10 {
            for iy in 0..10 {
                for iz in 0..10 {
                    let p = grid.at(ix, iy, iz).unwrap();
                    assert!(p.cmpge(bounds.min).all() && p.cmple(bounds.max).all());
                }
            }
        }
    }

    #[test]
    fn points_increase_with_index() {
        let grid = NavigationGrid::build(20.0, 12.0, 10.0, 5);
        let a = grid.at(1, 1, 1).unwrap();
        let b = grid.at(2, 3, 4).unwrap();
        assert!(b.x > a.x && b.y > a.y && b.z > a.z);
    }

    #[test]
    fn out_of_range_is_reported() {
        let grid = NavigationGrid::build(20.0, 12.0, 10.0, 10);
        assert_eq!(
            grid.at(10, 0, 0),
            Err(GridError::OutOfRange {
                index: [10, 0, 0],
                size: 10
            })
        );
        assert!(grid.at(0, -1, 0).is_err());
    }

    #[test]
    fn point_clamps_stray_indices() {
        let grid = NavigationGrid::build(20.0, 12.0, 10.0, 4);
        assert_eq!(
            grid.point(GridIndex::new(9, 9, 9)),
            grid.at(3, 3, 3).unwrap()
        );
    }

    #[test]
    fn nearest_index_round_trips_cell_centres() {
        let grid = NavigationGrid::build(36.0, 19.0, 18.0, 10);
        let index = GridIndex::new(2, 7, 5);
        assert_eq!(grid.nearest_index(grid.point(index)), index);
        assert_eq!(
            grid.nearest_index(Vec3::splat(1000.0)),
            GridIndex::new(9, 9, 9)
        );
        assert_eq!(
            grid.nearest_index(Vec3::splat(-1000.0)),
            GridIndex::new(0, 0, 0)
        );
    }
}
