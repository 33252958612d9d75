use std::f32::consts::PI;

use bevy::prelude::*;

use super::pair::{PortalId, PortalPair};

/// Below this, extents and normals are treated as degenerate.
pub const GEOMETRY_EPSILON: f32 = 1e-6;

/// Rigid transform taking a pose expressed in world space near `from` to the pose it has after
/// going through `from` and coming out of `to`.
///
/// The pose is expressed in the local frame of `from`, turned half a revolution around the
/// portal up axis so that walking into `from` means walking away from `to`, then brought back
/// to world space through `to`.
pub fn portal_to_portal(from: &Transform, to: &Transform) -> Transform {
    let flip = Mat4::from_rotation_y(PI);
    let mut transfer =
        Transform::from_matrix(to.compute_matrix() * flip * from.compute_matrix().inverse());
    transfer.rotation = transfer.rotation.normalize();
    transfer
}

/// Pose of `pose` once it went through portal `through` of the pair.
///
/// The rotation is renormalised, the recursive views chain this once per level.
pub fn teleport(pose: &Transform, through: PortalId, pair: &PortalPair) -> Transform {
    let mut out = pair.transfer(through).mul_transform(*pose);
    out.rotation = out.rotation.normalize();
    out
}

/// Rotate a velocity vector (linear or angular) through portal `through`.
pub fn teleport_direction(direction: Vec3, through: PortalId, pair: &PortalPair) -> Vec3 {
    pair.transfer(through).rotation.mul_vec3(direction)
}

/// Homogeneous plane of the portal surface, with the normal pointing out of the host wall.
/// Points with `plane.dot(p.extend(1.)) >= 0` are in front of the portal.
///
/// Returns `None` when the portal orientation is degenerate, in which case nothing should be
/// clipped.
pub fn surface_plane(portal: &Transform) -> Option<Vec4> {
    let normal = portal.rotation.mul_vec3(Vec3::Z);
    if !normal.is_finite() || normal.length_squared() < GEOMETRY_EPSILON {
        return None;
    }
    let normal = normal.normalize();
    Some(normal.extend(-normal.dot(portal.translation)))
}

/// Signed distance of `point` to the portal surface, positive in front of it.
pub fn signed_distance(portal: &Transform, point: Vec3) -> Option<f32> {
    surface_plane(portal).map(|plane| plane.dot(point.extend(1.)))
}

/// Oriented box around a portal surface, used to decide whether a body is going through it.
#[derive(Debug, Clone, Copy, PartialEq, Reflect, FromReflect)]
pub struct TriggerVolume {
    pub center: Vec3,
    pub rotation: Quat,
    pub half_extents: Vec3,
}

impl TriggerVolume {
    /// Box spanning the portal quad, `depth` thick and centered on the surface.
    pub fn around(portal: &Transform, width: f32, height: f32, depth: f32) -> TriggerVolume {
        TriggerVolume {
            center: portal.translation,
            rotation: portal.rotation,
            half_extents: Vec3::new(width, height, depth) / 2.,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        !self.half_extents.is_finite()
            || self.half_extents.min_element() < GEOMETRY_EPSILON
            || !self.rotation.is_normalized()
    }

    /// Degenerate volumes contain nothing.
    pub fn contains(&self, point: Vec3) -> bool {
        if self.is_degenerate() {
            return false;
        }
        let local = self.rotation.inverse().mul_vec3(point - self.center);
        local.abs().cmple(self.half_extents).all()
    }

    /// World space corners, bottom face first.
    pub fn corners(&self) -> [Vec3; 8] {
        let h = self.half_extents;
        [
            Vec3::new(-h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, h.z),
            Vec3::new(-h.x, -h.y, h.z),
            Vec3::new(-h.x, h.y, -h.z),
            Vec3::new(h.x, h.y, -h.z),
            Vec3::new(h.x, h.y, h.z),
            Vec3::new(-h.x, h.y, h.z),
        ]
        .map(|corner| self.center + self.rotation.mul_vec3(corner))
    }
}
