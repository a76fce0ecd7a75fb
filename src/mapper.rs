use image::RgbaImage;

use crate::camera::Camera;
use crate::enums::Interpolation;
use crate::error::Result;
use crate::transfer_function::LookupTable;
use crate::volume::VolumeDataset;

/// Upper bound on samples taken along a single ray.
pub const MAX_STEPS_PER_RAY: u32 = 1 << 16;

/// Appearance of a volume: tabulated transfer function plus sampling mode.
#[derive(Debug, Clone)]
pub struct VolumeProperty {
    pub lookup_table: LookupTable,
    pub interpolation: Interpolation,
    pub background: [f32; 3],
    /// Rays stop once accumulated opacity reaches this value.
    pub termination_opacity: f32,
}

/// Converts a scalar field plus a [`VolumeProperty`] into pixels.
///
/// A mapper owns whatever resources it needs for its surface. Changing the
/// sample distance must not touch the uploaded scalars.
pub trait VolumeMapper {
    fn dataset(&self) -> &VolumeDataset;

    fn sample_distance(&self) -> f32;

    fn set_sample_distance(&mut self, distance: f32);

    fn render(&mut self, camera: &Camera) -> Result<RgbaImage>;

    /// Free surface-side resources. Rendering afterwards is an error.
    fn release(&mut self);
}

/// Opacity of a stop given per unit length, corrected for the actual step.
#[inline]
pub(crate) fn corrected_opacity(alpha: f32, step: f32) -> f32 {
    1.0 - (1.0 - alpha.clamp(0.0, 1.0)).powf(step)
}

#[inline]
pub(crate) fn to_rgba8(rgb: [f32; 3]) -> [u8; 4] {
    let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
    [channel(rgb[0]), channel(rgb[1]), channel(rgb[2]), 255]
}
