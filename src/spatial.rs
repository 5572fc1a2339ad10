use std::collections::BTreeMap;

use bevy::math::Vec3;

use crate::entity::EntityId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub entity: EntityId,
    pub distance: f32,
    pub point: Vec3,
}

pub trait SpatialQuery {
    /// Every other proxy currently intersecting the proxy of `id`.
    fn overlapping(&self, id: EntityId) -> Vec<EntityId>;

    /// All proxies struck by the ray, nearest first. A ray starting inside
    /// a proxy strikes it where it exits.
    fn cast(&self, origin: Vec3, direction: Vec3) -> Vec<Hit>;

    fn cast_among(&self, origin: Vec3, direction: Vec3, candidates: &[EntityId]) -> Option<Hit> {
        self.cast(origin, direction)
            .into_iter()
            .find(|hit| candidates.contains(&hit.entity))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SphereProxy {
    center: Vec3,
    radius: f32,
}

/// Bounding-sphere proxies keyed by entity. A proxy is attached when its
/// entity is created and must be detached before the entity is dropped.
#[derive(Debug, Default, Clone)]
pub struct SphereSpace {
    proxies: BTreeMap<EntityId, SphereProxy>,
}

impl SphereSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if `id` already had a proxy; the old one is replaced.
    pub fn attach(&mut self, id: EntityId, center: Vec3, radius: f32) -> bool {
        self.proxies
            .insert(id, SphereProxy { center, radius })
            .is_none()
    }

    pub fn detach(&mut self, id: EntityId) -> bool {
        self.proxies.remove(&id).is_some()
    }

    #[cfg(test)]
    pub fn is_attached(&self, id: EntityId) -> bool {
        self.proxies.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn move_to(&mut self, id: EntityId, center: Vec3) {
        if let Some(proxy) = self.proxies.get_mut(&id) {
            proxy.center = center;
        }
    }
}

fn ray_sphere(origin: Vec3, direction: Vec3, proxy: &SphereProxy) -> Option<f32> {
    let offset = origin - proxy.center;
    let b = offset.dot(direction);
    let c = offset.length_squared() - proxy.radius * proxy.radius;
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let root = discriminant.sqrt();
    let (near, far) = (-b - root, -b + root);
    if far < 0.0 {
        None
    } else if near >= 0.0 {
        Some(near)
    } else {
        Some(far)
    }
}

impl SpatialQuery for SphereSpace {
    fn overlapping(&self, id: EntityId) -> Vec<EntityId> {
        let Some(own) = self.proxies.get(&id) else {
            return Vec::new();
        };
        self.proxies
            .iter()
            .filter(|(other, proxy)| {
                **other != id
                    && own.center.distance_squared(proxy.center)
                        < (own.radius + proxy.radius).powi(2)
            })
            .map(|(other, _)| *other)
            .collect()
    }

    fn cast(&self, origin: Vec3, direction: Vec3) -> Vec<Hit> {
        let direction = direction.normalize_or_zero();
        if direction == Vec3::ZERO {
            return Vec::new();
        }
        let mut hits: Vec<Hit> = self
            .proxies
            .iter()
            .filter_map(|(id, proxy)| {
                ray_sphere(origin, direction, proxy).map(|distance| Hit {
                    entity: *id,
                    distance,
                    point: origin + direction * distance,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }
}
