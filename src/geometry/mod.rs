//! # Geometry Module
//!
//! Spherical shells bounding a propagation sector.

use crate::types::Vec3;

/// Intersections closer than this (cm) count as the start point
const SURFACE_TOLERANCE: f64 = 1e-8;

/// Spherical shell between `inner_radius` and `radius` around `center`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Center (cm)
    pub center: Vec3,
    /// Outer radius (cm)
    pub radius: f64,
    /// Inner radius (cm), zero for a full sphere
    pub inner_radius: f64,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f64) -> Self {
        Self { center, radius: radius.max(0.0), inner_radius: 0.0 }
    }

    pub fn shell(center: Vec3, radius: f64, inner_radius: f64) -> Self {
        let radius = radius.max(0.0);
        Self { center, radius, inner_radius: inner_radius.clamp(0.0, radius) }
    }

    pub fn is_inside(&self, position: &Vec3) -> bool {
        let r = (*position - self.center).mag();
        r <= self.radius && r >= self.inner_radius
    }

    /// Path length (cm) from `position` along `direction` to the next
    /// border of the shell; zero outside the shell or without a crossing
    pub fn distance_to_border(&self, position: &Vec3, direction: &Vec3) -> f64 {
        if !self.is_inside(position) {
            return 0.0;
        }
        let outer = Self::ray_sphere(position, direction, &self.center, self.radius);
        let inner = if self.inner_radius > 0.0 {
            Self::ray_sphere(position, direction, &self.center, self.inner_radius)
        } else {
            None
        };
        match (outer, inner) {
            (Some(o), Some(i)) => o.min(i),
            (Some(o), None) => o,
            (None, Some(i)) => i,
            (None, None) => 0.0,
        }
    }

    /// First positive ray parameter hitting the sphere `radius` at `center`
    fn ray_sphere(position: &Vec3, direction: &Vec3, center: &Vec3, radius: f64) -> Option<f64> {
        let oc = *position - *center;
        let a = direction.mag_squared();
        let b = 2.0 * oc.dot(direction);
        let c = oc.mag_squared() - radius * radius;
        Self::solve_quadratic(a, b, c)
    }

    fn solve_quadratic(a: f64, b: f64, c: f64) -> Option<f64> {
        if a.abs() < 1e-12 {
            return None;
        }
        let discriminant = b * b - 4.0 * a * c;
        if discriminant < 0.0 {
            return None;
        }

        let sqrt_d = discriminant.sqrt();
        let t1 = (-b - sqrt_d) / (2.0 * a);
        let t2 = (-b + sqrt_d) / (2.0 * a);

        if t1 > SURFACE_TOLERANCE {
            Some(t1)
        } else if t2 > SURFACE_TOLERANCE {
            Some(t2)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance_from_center() {
        let sphere = Sphere::new(Vec3::zero(), 100.0);
        assert_relative_eq!(sphere.distance_to_border(&Vec3::zero(), &Vec3::unit_z()), 100.0);
        let diagonal = Vec3::new(1.0, 1.0, 1.0).normalize();
        assert_relative_eq!(sphere.distance_to_border(&Vec3::zero(), &diagonal), 100.0, max_relative = 1e-12);
    }

    #[test]
    fn test_distance_off_center() {
        let sphere = Sphere::new(Vec3::zero(), 10.0);
        let start = Vec3::new(0.0, 0.0, -6.0);
        assert_relative_eq!(sphere.distance_to_border(&start, &Vec3::unit_z()), 16.0, max_relative = 1e-12);
        assert_relative_eq!(sphere.distance_to_border(&start, &-Vec3::unit_z()), 4.0, max_relative = 1e-12);
        // chord through x = 6
        let side = Vec3::new(6.0, 0.0, 0.0);
        assert_relative_eq!(sphere.distance_to_border(&side, &Vec3::unit_z()), 8.0, max_relative = 1e-12);
    }

    #[test]
    fn test_outside_has_no_border() {
        let sphere = Sphere::new(Vec3::zero(), 1.0);
        assert_eq!(sphere.distance_to_border(&Vec3::new(0.0, 0.0, 5.0), &-Vec3::unit_z()), 0.0);
        assert!(!sphere.is_inside(&Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn test_shell_stops_at_inner_surface() {
        let shell = Sphere::shell(Vec3::zero(), 10.0, 2.0);
        let start = Vec3::new(0.0, 0.0, -8.0);
        assert_relative_eq!(shell.distance_to_border(&start, &Vec3::unit_z()), 6.0, max_relative = 1e-12);
        assert!(!shell.is_inside(&Vec3::zero()));
    }
}
