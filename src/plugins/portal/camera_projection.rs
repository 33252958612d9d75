use std::f32::consts::FRAC_PI_4;

use bevy::{prelude::*, render::camera::CameraProjection};

/// Distance of the regular near plane, matching bevy's perspective default.
pub const DEFAULT_NEAR: f32 = 0.1;

/// Camera projection which allows for an oblique near clipping plane, used for rendering portal virtual cameras.
#[derive(Debug, Component, Clone, Reflect)]
#[reflect(Component)]
pub struct PortalCameraProjection {
    pub fov: f32,
    pub aspect_ratio: f32,
    pub far: f32,
    /// Near plane in camera space. Only what is in front of it is rendered.
    #[reflect(ignore)]
    pub near: Vec4,
}

impl Default for PortalCameraProjection {
    fn default() -> Self {
        PortalCameraProjection {
            fov: FRAC_PI_4,
            aspect_ratio: 16. / 9.,
            far: 1000.,
            near: default_near_plane(),
        }
    }
}

pub fn default_near_plane() -> Vec4 {
    Vec4::from((Vec3::NEG_Z, -DEFAULT_NEAR))
}

impl PortalCameraProjection {
    /// Clip at `plane`, given in world space, as seen from a camera at `camera`.
    ///
    /// The oblique near plane only works when the camera is behind the plane; otherwise there is
    /// nothing between the camera and the plane to discard and the regular near plane is used.
    pub fn clip_at(&mut self, camera: &Transform, plane: Option<Vec4>) {
        self.near = plane
            .map(|plane| camera_space_plane(camera, plane))
            .filter(|near| near.w < 0.)
            .unwrap_or_else(default_near_plane);
    }
}

/// Express a world space plane in the frame of a camera placed at `camera`.
pub fn camera_space_plane(camera: &Transform, plane: Vec4) -> Vec4 {
    // Inverse transpose of the view matrix = inverse inverse transpose of camera matrix = transpose
    let near = camera.compute_matrix().transpose() * plane;
    near * near.truncate().length_recip()
}

/// Replace the near plane of a reverse-Z projection with `clip`, a camera space plane.
///
/// Math adapted from https://www.terathon.com/lengyel/Lengyel-Oblique.pdf for a depth range
/// where the near plane is at depth 1 and infinity at depth 0.
pub fn oblique_projection(projection: Mat4, clip: Vec4) -> Mat4 {
    let m4 = projection.row(3);
    let corner = Vec4::new(clip.x.signum(), clip.y.signum(), 0., 1.);
    let q = projection.inverse() * corner;
    let a = m4.dot(q) / clip.dot(q);
    let new_m3 = m4 - a * clip;

    let mut oblique = projection;
    oblique.x_axis.z = new_m3.x;
    oblique.y_axis.z = new_m3.y;
    oblique.z_axis.z = new_m3.z;
    oblique.w_axis.z = new_m3.w;
    oblique
}

impl CameraProjection for PortalCameraProjection {
    fn get_projection_matrix(&self) -> Mat4 {
        let projection = Mat4::perspective_infinite_reverse_rh(self.fov, self.aspect_ratio, DEFAULT_NEAR);
        oblique_projection(projection, self.near)
    }

    fn update(&mut self, width: f32, height: f32) {
        self.aspect_ratio = width / height;
    }

    fn far(&self) -> f32 {
        self.far
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(m: Mat4, p: Vec3) -> Vec4 {
        m * p.extend(1.)
    }

    #[test]
    fn default_near_plane_is_the_regular_projection() {
        let projection = PortalCameraProjection::default();
        let regular = Mat4::perspective_infinite_reverse_rh(FRAC_PI_4, 16. / 9., DEFAULT_NEAR);
        assert!(projection.get_projection_matrix().abs_diff_eq(regular, 1e-4));
    }

    #[test]
    fn perpendicular_plane_moves_the_near_plane() {
        let base = Mat4::perspective_infinite_reverse_rh(FRAC_PI_4, 1.5, DEFAULT_NEAR);
        let oblique = oblique_projection(base, Vec4::new(0., 0., -1., -5.));
        let expected = Mat4::perspective_infinite_reverse_rh(FRAC_PI_4, 1.5, 5.);
        assert!(oblique.abs_diff_eq(expected, 1e-4));
    }

    #[test]
    fn tilted_plane_is_the_near_plane() {
        let base = Mat4::perspective_infinite_reverse_rh(FRAC_PI_4, 1.5, DEFAULT_NEAR);
        let normal = Vec3::new(0.3, 0.2, -1.).normalize();
        let point = Vec3::new(0., 0., -4.);
        let plane = normal.extend(-normal.dot(point));
        let oblique = oblique_projection(base, plane);

        let on_plane = clip(oblique, point);
        assert!((on_plane.z - on_plane.w).abs() < 1e-4);

        // In front of the plane: within the depth range.
        let kept = clip(oblique, Vec3::new(0., 0., -12.));
        assert!(kept.z >= 0. && kept.z <= kept.w);

        // Between the camera and the plane: beyond the near plane.
        let culled = clip(oblique, Vec3::new(0., 0., -1.));
        assert!(culled.z > culled.w);
    }

    #[test]
    fn planes_follow_the_camera() {
        let camera = Transform::from_xyz(0., 0., 3.);
        let plane = Vec4::new(0., 0., 1., 5.);
        let near = camera_space_plane(&camera, plane);
        assert!(near.abs_diff_eq(Vec4::new(0., 0., 1., 8.), 1e-5));
    }

    #[test]
    fn camera_in_front_of_the_plane_keeps_the_regular_near() {
        let camera = Transform::IDENTITY;
        let mut projection = PortalCameraProjection::default();

        // Plane behind the camera, camera on the kept side.
        projection.clip_at(&camera, Some(Vec4::new(0., 0., -1., 5.)));
        assert_eq!(projection.near, default_near_plane());

        // Plane ahead, camera behind it.
        projection.clip_at(&camera, Some(Vec4::new(0., 0., -1., -5.)));
        assert!(projection.near.abs_diff_eq(Vec4::new(0., 0., -1., -5.), 1e-5));

        projection.clip_at(&camera, None);
        assert_eq!(projection.near, default_near_plane());
    }
}
