//! Spatial primitives shared between the scheduler and device backends
//!
//! Positions use a right-handed coordinate system matching the playback
//! device convention: +x right, +y up, -z forward (into the scene).

use serde::{Deserialize, Serialize};

/// A 3D position or direction vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// Origin / zero vector
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Vec3 { x, y, z }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Vec3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn length(&self) -> f32 {
        self.distance(&Vec3::ZERO)
    }

    pub fn dot(&self, other: &Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Unit vector in this direction, or zero for a (near-)zero vector.
    pub fn normalized(&self) -> Vec3 {
        let len = self.length();
        if len <= f32::EPSILON {
            Vec3::ZERO
        } else {
            Vec3::new(self.x / len, self.y / len, self.z / len)
        }
    }

    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Default for Vec3 {
    fn default() -> Self {
        Vec3::ZERO
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from(v: [f32; 3]) -> Self {
        Vec3::new(v[0], v[1], v[2])
    }
}

/// Listener orientation: an up vector and a look-at direction.
///
/// Mirrors the two-vector orientation convention of spatial playback APIs
/// (up + at handed over in one call).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub up: Vec3,
    pub at: Vec3,
}

impl Default for Orientation {
    /// Upright listener facing -z
    fn default() -> Self {
        Orientation {
            up: Vec3::new(0.0, 1.0, 0.0),
            at: Vec3::new(0.0, 0.0, -1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_distance() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 4.0, 0.0);
        assert_eq!(a.distance(&b), 5.0);
    }

    #[test]
    fn test_vec3_cross_follows_right_hand_rule() {
        let at = Vec3::new(0.0, 0.0, -1.0);
        let up = Vec3::new(0.0, 1.0, 0.0);
        // Listener facing -z with +y up has +x to the right
        assert_eq!(at.cross(&up), Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_vec3_normalized_zero_is_zero() {
        assert_eq!(Vec3::ZERO.normalized(), Vec3::ZERO);
    }

    #[test]
    fn test_vec3_normalized_has_unit_length() {
        let v = Vec3::new(3.0, 4.0, 0.0).normalized();
        assert!((v.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_vec3_from_array() {
        let v: Vec3 = [1.0, -0.5, -1.0].into();
        assert_eq!(v, Vec3::new(1.0, -0.5, -1.0));
    }

    #[test]
    fn test_default_orientation_faces_forward() {
        let o = Orientation::default();
        assert_eq!(o.up, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(o.at, Vec3::new(0.0, 0.0, -1.0));
    }
}
