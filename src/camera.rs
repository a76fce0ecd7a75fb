use glam::Vec3;

use crate::volume::Bounds;

/// Perspective camera looking at a volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub focal_point: Vec3,
    pub view_up: Vec3,
    /// Vertical field of view in degrees.
    pub view_angle: f32,
}

impl Camera {
    /// Frame `bounds` so the whole box is visible, looking down `-z` with `+y`
    /// up. The distance is chosen so the bounding sphere fits the view angle.
    pub fn fit_to_bounds(bounds: &Bounds, view_angle: f32) -> Self {
        let focal_point = bounds.center();
        let radius = (bounds.extent().length() * 0.5).max(f32::EPSILON);
        let half_angle = (view_angle.to_radians() * 0.5).max(f32::EPSILON);
        let distance = radius / half_angle.sin();
        Self {
            position: focal_point + Vec3::Z * distance,
            focal_point,
            view_up: Vec3::Y,
            view_angle,
        }
    }

    pub fn direction_of_projection(&self) -> Vec3 {
        (self.focal_point - self.position).normalize()
    }

    /// Per-frame ray setup for a `width` by `height` image.
    pub fn rays(&self, width: u32, height: u32) -> RayBasis {
        let forward = self.direction_of_projection();
        let right = forward.cross(self.view_up).normalize();
        let up = right.cross(forward);
        RayBasis {
            origin: self.position,
            forward,
            right,
            up,
            tan_half_fov: (self.view_angle.to_radians() * 0.5).tan(),
            aspect: width as f32 / height.max(1) as f32,
            width,
            height,
        }
    }
}

/// Orthonormal camera frame used to generate one ray per pixel.
#[derive(Debug, Clone, Copy)]
pub struct RayBasis {
    pub origin: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub tan_half_fov: f32,
    pub aspect: f32,
    pub width: u32,
    pub height: u32,
}

impl RayBasis {
    /// Direction through the centre of pixel `(column, row)`, row 0 at the top.
    #[inline]
    pub fn direction(&self, column: u32, row: u32) -> Vec3 {
        let ndc_x = ((column as f32 + 0.5) / self.width as f32) * 2.0 - 1.0;
        let ndc_y = 1.0 - ((row as f32 + 0.5) / self.height as f32) * 2.0;
        (self.forward
            + self.right * (ndc_x * self.tan_half_fov * self.aspect)
            + self.up * (ndc_y * self.tan_half_fov))
            .normalize()
    }
}
