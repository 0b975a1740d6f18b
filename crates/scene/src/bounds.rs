//! Axis-aligned bounds for mesh surfaces.

use glam::Vec3;

/// Bounding volume of a mesh surface: an AABB plus a bounding sphere
/// radius, both in mesh-local space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    /// Center of the AABB.
    pub origin: Vec3,
    /// Half-size along each axis.
    pub extents: Vec3,
    /// Radius of the sphere enclosing the AABB.
    pub radius: f32,
}

impl Bounds {
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        let extents = (max - min) / 2.0;
        Self {
            origin: (max + min) / 2.0,
            extents,
            radius: extents.length(),
        }
    }

    /// Bounds of a set of vertex positions. Empty input collapses to a
    /// point at the origin.
    pub fn from_positions(positions: impl IntoIterator<Item = Vec3>) -> Self {
        let mut iter = positions.into_iter();
        let Some(first) = iter.next() else {
            return Self::from_min_max(Vec3::ZERO, Vec3::ZERO);
        };

        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Self::from_min_max(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_min_max() {
        let bounds = Bounds::from_min_max(Vec3::new(-1.0, -2.0, -3.0), Vec3::new(3.0, 2.0, 1.0));
        assert_eq!(bounds.origin, Vec3::new(1.0, 0.0, -1.0));
        assert_eq!(bounds.extents, Vec3::new(2.0, 2.0, 2.0));
        assert!((bounds.radius - (12.0_f32).sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_from_positions() {
        let bounds = Bounds::from_positions([
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(1.0, 4.0, 0.0),
        ]);
        assert_eq!(bounds.origin, Vec3::new(1.0, 2.0, 0.0));
        assert_eq!(bounds.extents, Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_empty_positions_collapse_to_origin() {
        let bounds = Bounds::from_positions(std::iter::empty());
        assert_eq!(bounds.origin, Vec3::ZERO);
        assert_eq!(bounds.radius, 0.0);
    }

    #[test]
    fn test_single_point_has_zero_radius() {
        let bounds = Bounds::from_positions([Vec3::new(5.0, 5.0, 5.0)]);
        assert_eq!(bounds.origin, Vec3::new(5.0, 5.0, 5.0));
        assert_eq!(bounds.radius, 0.0);
    }
}
