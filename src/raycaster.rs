use glam::Vec3;
use image::RgbaImage;
use log::debug;
use ndarray::ArrayView3;
use rayon::prelude::*;
use web_time::Instant;

use crate::camera::{Camera, RayBasis};
use crate::error::{Result, ViewerError};
use crate::interpolator::Interpolator;
use crate::mapper::{MAX_STEPS_PER_RAY, VolumeMapper, VolumeProperty, corrected_opacity, to_rgba8};
use crate::npy::Elements;
use crate::volume::{Bounds, VolumeDataset};

/// Ray-casting volume mapper running on the CPU, one rayon task per row.
pub struct CpuRaycaster {
    dataset: VolumeDataset,
    property: VolumeProperty,
    sample_distance: f32,
    width: u32,
    height: u32,
    released: bool,
}

impl CpuRaycaster {
    pub fn new(
        dataset: VolumeDataset,
        property: VolumeProperty,
        sample_distance: f32,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            dataset,
            property,
            sample_distance,
            width,
            height,
            released: false,
        }
    }

    fn cast<T>(&self, volume: &ArrayView3<'_, T>, rays: &RayBasis) -> Vec<u8>
    where
        T: Copy + Into<f32> + Sync,
    {
        let bounds = self.dataset.bounds();
        (0..rays.height)
            .into_par_iter()
            .flat_map(|row| {
                (0..rays.width)
                    .flat_map(|column| {
                        self.march(volume, &bounds, rays.origin, rays.direction(column, row))
                    })
                    .collect::<Vec<u8>>()
            })
            .collect()
    }

    /// Front-to-back compositing along one ray.
    fn march<T>(
        &self,
        volume: &ArrayView3<'_, T>,
        bounds: &Bounds,
        origin: Vec3,
        direction: Vec3,
    ) -> [u8; 4]
    where
        T: Copy + Into<f32>,
    {
        let VolumeProperty {
            lookup_table,
            interpolation,
            background,
            termination_opacity,
        } = &self.property;
        let step = self.sample_distance;
        let mut color = Vec3::ZERO;
        let mut alpha = 0.0f32;

        if let Some((near, far)) = bounds.intersect(origin, direction) {
            let mut t = near + 0.5 * step;
            let mut steps = 0;
            while t < far && alpha < *termination_opacity && steps < MAX_STEPS_PER_RAY {
                let p = origin + direction * t;
                let value = Interpolator::sample(volume, p.z, p.y, p.x, *interpolation);
                let [r, g, b, a] = lookup_table.lookup(value);
                let weight = (1.0 - alpha) * corrected_opacity(a, step);
                color += Vec3::new(r, g, b) * weight;
                alpha += weight;
                t += step;
                steps += 1;
            }
        }

        let out = color + Vec3::from_array(*background) * (1.0 - alpha);
        to_rgba8(out.to_array())
    }
}

impl VolumeMapper for CpuRaycaster {
    fn dataset(&self) -> &VolumeDataset {
        &self.dataset
    }

    fn sample_distance(&self) -> f32 {
        self.sample_distance
    }

    fn set_sample_distance(&mut self, distance: f32) {
        self.sample_distance = distance;
    }

    fn render(&mut self, camera: &Camera) -> Result<RgbaImage> {
        if self.released {
            return Err(ViewerError::Render("mapper has been released".into()));
        }
        let started = Instant::now();
        let rays = camera.rays(self.width, self.height);
        let pixels = match self.dataset.scalars() {
            Elements::Float32(values) => self.cast(&self.dataset.view(values)?, &rays),
            Elements::UInt8(values) => self.cast(&self.dataset.view(values)?, &rays),
        };
        debug!(
            "cpu ray cast {}x{} at sample distance {} in {:?}",
            self.width,
            self.height,
            self.sample_distance,
            started.elapsed()
        );
        RgbaImage::from_raw(self.width, self.height, pixels)
            .ok_or_else(|| ViewerError::Render("frame size does not match surface".into()))
    }

    fn release(&mut self) {
        self.released = true;
    }
}
