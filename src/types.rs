//! # Core Types
//!
//! Three-vectors for particle positions and directions.

use std::fmt;

use std::f64::consts::PI;

// ============================================================================
// VECTOR TYPES (3D)
// ============================================================================

/// 3D vector for positions (cm) and unit directions
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const fn zero() -> Self {
        Self { x: 0.0, y: 0.0, z: 0.0 }
    }

    pub const fn unit_z() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }

    /// Unit vector from polar angle θ and azimuth φ (rad)
    pub fn from_spherical(theta: f64, phi: f64) -> Self {
        let (sin_t, cos_t) = theta.sin_cos();
        let (sin_p, cos_p) = phi.sin_cos();
        Self::new(sin_t * cos_p, sin_t * sin_p, cos_t)
    }

    pub fn mag_squared(&self) -> f64 {
        self.dot(self)
    }

    pub fn mag(&self) -> f64 {
        self.mag_squared().sqrt()
    }

    /// Unit vector, or zero for a degenerate input
    pub fn normalize(&self) -> Self {
        let m = self.mag();
        if m > 1e-15 {
            *self * (1.0 / m)
        } else {
            Self::zero()
        }
    }

    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Rotate this direction by polar angle cosine `mu` around itself,
    /// with azimuth `phi` measured in the local frame.
    pub fn deflect(&self, mu: f64, phi: f64) -> Self {
        let mu = mu.clamp(-1.0, 1.0);
        let sin_theta = (1.0 - mu * mu).sqrt();
        let (sin_p, cos_p) = phi.sin_cos();
        let (u, v, w) = (self.x, self.y, self.z);

        let rotated = if w.abs() < 0.999 {
            let a = (1.0 - w * w).sqrt();
            Self::new(
                mu * u + sin_theta * (u * w * cos_p - v * sin_p) / a,
                mu * v + sin_theta * (v * w * cos_p + u * sin_p) / a,
                mu * w - sin_theta * cos_p * a,
            )
        } else {
            // Nearly parallel to z
            Self::new(sin_theta * cos_p, sin_theta * sin_p, mu * w.signum())
        };

        rotated.normalize()
    }

    /// Angle between two directions (rad)
    pub fn angle_to(&self, other: &Self) -> f64 {
        let denom = self.mag() * other.mag();
        if denom <= 0.0 {
            return 0.0;
        }
        (self.dot(other) / denom).clamp(-1.0, 1.0).acos()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Azimuth drawn from a uniform variate in [0, 1)
    pub fn azimuth(u: f64) -> f64 {
        2.0 * PI * u
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl std::ops::Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, s: f64) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

impl std::ops::Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl std::ops::AddAssign for Vec3 {
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
        self.z += other.z;
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4}, {:.4})", self.x, self.y, self.z)
    }
}
