use ndarray::ArrayView3;

use crate::enums::Interpolation;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Sample a `(z, y, x)` volume at a continuous voxel coordinate, where
    /// voxel `i` is centred on `i + 0.5`.
    #[inline]
    pub(crate) fn sample<T>(
        volume: &ArrayView3<T>,
        z: f32,
        y: f32,
        x: f32,
        interpolation: Interpolation,
    ) -> f32
    where
        T: Copy + Into<f32>,
    {
        let (depth, height, width) = volume.dim();
        // Shift to sample centres and clamp to the outermost centres.
        let z = (z - 0.5).clamp(0.0, (depth - 1) as f32);
        let y = (y - 0.5).clamp(0.0, (height - 1) as f32);
        let x = (x - 0.5).clamp(0.0, (width - 1) as f32);

        match interpolation {
            Interpolation::Nearest => {
                volume[[z.round() as usize, y.round() as usize, x.round() as usize]].into()
            }
            Interpolation::Linear => Self::trilinear_interpolate(volume, z, y, x),
        }
    }

    #[inline]
    pub(crate) fn trilinear_interpolate<T>(volume: &ArrayView3<T>, z: f32, y: f32, x: f32) -> f32
    where
        T: Copy + Into<f32>,
    {
        let (depth, height, width) = volume.dim();

        let z0 = z.floor() as usize;
        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let z1 = (z0 + 1).min(depth - 1);
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dz = z - z0 as f32;
        let dy = y - y0 as f32;
        let dx = x - x0 as f32;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;
        let one_minus_dz = 1.0 - dz;

        let at = |k: usize, j: usize, i: usize| -> f32 { volume[[k, j, i]].into() };

        let c00 = at(z0, y0, x0).mul_add(one_minus_dx, at(z0, y0, x1) * dx);
        let c01 = at(z0, y1, x0).mul_add(one_minus_dx, at(z0, y1, x1) * dx);
        let c10 = at(z1, y0, x0).mul_add(one_minus_dx, at(z1, y0, x1) * dx);
        let c11 = at(z1, y1, x0).mul_add(one_minus_dx, at(z1, y1, x1) * dx);

        let c0 = c00.mul_add(one_minus_dy, c01 * dy);
        let c1 = c10.mul_add(one_minus_dy, c11 * dy);

        c0.mul_add(one_minus_dz, c1 * dz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn ramp() -> Array3<u8> {
        // Values grow along x only.
        Array3::from_shape_fn((2, 2, 2), |(_, _, x)| (x * 100) as u8)
    }

    #[test]
    fn voxel_centres_return_stored_values() {
        let data = ramp();
        let view = data.view();
        for interpolation in [Interpolation::Linear, Interpolation::Nearest] {
            assert_eq!(Interpolator::sample(&view, 0.5, 0.5, 0.5, interpolation), 0.0);
            assert_eq!(Interpolator::sample(&view, 1.5, 1.5, 1.5, interpolation), 100.0);
        }
    }

    #[test]
    fn linear_blends_between_centres() {
        let data = ramp();
        let value = Interpolator::sample(&data.view(), 1.0, 1.0, 1.0, Interpolation::Linear);
        assert!((value - 50.0).abs() < 1e-4);
    }

    #[test]
    fn nearest_snaps_to_a_voxel() {
        let data = ramp();
        let value = Interpolator::sample(&data.view(), 1.0, 1.0, 1.2, Interpolation::Nearest);
        assert_eq!(value, 100.0);
    }

    #[test]
    fn coordinates_outside_are_clamped() {
        let data = ramp();
        let view = data.view();
        assert_eq!(Interpolator::sample(&view, -4.0, 0.0, -1.0, Interpolation::Linear), 0.0);
        assert_eq!(Interpolator::sample(&view, 9.0, 9.0, 9.0, Interpolation::Linear), 100.0);
    }

    #[test]
    fn single_slice_volumes_are_sampled() {
        let data = Array3::from_shape_vec((1, 1, 2), vec![0.0f32, 1.0]).unwrap();
        let value = Interpolator::sample(&data.view(), 0.5, 0.5, 1.0, Interpolation::Linear);
        assert!((value - 0.5).abs() < 1e-6);
    }
}
