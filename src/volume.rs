use std::sync::{Arc, OnceLock};

use glam::Vec3;
use log::debug;
use ndarray::ArrayView3;
use rayon::prelude::*;

use crate::enums::Dtype;
use crate::error::{Result, ViewerError};
use crate::npy::{DecodedArray, Elements};

/// Axis-aligned box occupied by a volume in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Intersect a ray with the box, returning the entry and exit distances.
    pub fn intersect(&self, origin: Vec3, direction: Vec3) -> Option<(f32, f32)> {
        let inv = direction.recip();
        let t0 = (self.min - origin) * inv;
        let t1 = (self.max - origin) * inv;
        let near = t0.min(t1).max_element().max(0.0);
        let far = t0.max(t1).min_element();
        (near < far).then_some((near, far))
    }
}

struct VolumeInner {
    dimensions: (usize, usize, usize),
    scalars: Elements,
    value_range: OnceLock<(f64, f64)>,
}

/// A single-component scalar volume.
///
/// Cloning is cheap and shares the scalar field, so the dataset handed to a
/// render session and the one kept by a caller are the same object.
#[derive(Clone)]
pub struct VolumeDataset {
    inner: Arc<VolumeInner>,
}

impl std::fmt::Debug for VolumeDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeDataset")
            .field("dimensions", &self.inner.dimensions)
            .field("dtype", &self.inner.scalars.dtype())
            .finish()
    }
}

impl VolumeDataset {
    /// Create a dataset from dimensions in `(x, y, z)` order.
    pub fn new(dimensions: (usize, usize, usize), scalars: Elements) -> Result<Self> {
        let (x, y, z) = dimensions;
        let expected = x.checked_mul(y).and_then(|xy| xy.checked_mul(z));
        if expected != Some(scalars.len()) {
            return Err(ViewerError::Shape(format!(
                "dimensions {:?} do not match {} scalars",
                dimensions,
                scalars.len()
            )));
        }
        Ok(Self {
            inner: Arc::new(VolumeInner {
                dimensions,
                scalars,
                value_range: OnceLock::new(),
            }),
        })
    }

    /// Get the dimensions of the volume (x, y, z)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.inner.dimensions
    }

    pub fn scalars(&self) -> &Elements {
        &self.inner.scalars
    }

    pub fn dtype(&self) -> Dtype {
        self.inner.scalars.dtype()
    }

    pub fn len(&self) -> usize {
        self.inner.scalars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.scalars.is_empty()
    }

    /// True when both handles refer to the same scalar field.
    pub fn same_as(&self, other: &VolumeDataset) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Voxel `i` along an axis covers `[i, i + 1)`, so a single slice still
    /// has unit thickness.
    pub fn bounds(&self) -> Bounds {
        let (x, y, z) = self.inner.dimensions;
        Bounds {
            min: Vec3::ZERO,
            max: Vec3::new(x as f32, y as f32, z as f32),
        }
    }

    /// Minimum and maximum scalar, computed on first use.
    ///
    /// NaN and infinite samples are ignored. A field without any finite sample
    /// reports `(0, 0)`.
    pub fn value_range(&self) -> (f64, f64) {
        *self.inner.value_range.get_or_init(|| {
            let range = match &self.inner.scalars {
                Elements::Float32(values) => scan_range(values),
                Elements::UInt8(values) => scan_range(values),
            };
            debug!("scanned value range {range:?}");
            range
        })
    }

    /// View the scalars as a `(z, y, x)` array.
    pub(crate) fn view<'a, T>(&self, values: &'a [T]) -> Result<ArrayView3<'a, T>> {
        let (x, y, z) = self.inner.dimensions;
        ArrayView3::from_shape((z, y, x), values).map_err(|e| ViewerError::Shape(e.to_string()))
    }
}

fn scan_range<T>(values: &[T]) -> (f64, f64)
where
    T: Copy + Into<f64> + Sync,
{
    let (min, max) = values
        .par_iter()
        .map(|&v| v.into())
        .filter(|v: &f64| v.is_finite())
        .fold(
            || (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), v| (lo.min(v), hi.max(v)),
        )
        .reduce(
            || (f64::INFINITY, f64::NEG_INFINITY),
            |a, b| (a.0.min(b.0), a.1.max(b.1)),
        );
    if min > max { (0.0, 0.0) } else { (min, max) }
}

pub struct VolumeBuilder;

impl VolumeBuilder {
    /// Map a decoded array onto a volume.
    ///
    /// A `(z, y, x)` shape gives dimensions `(x, y, z)`, a `(y, x)` shape gives
    /// `(x, y, 1)`. The element buffer is moved into the dataset untouched and
    /// the value range is left for the first consumer to compute.
    pub fn build(array: DecodedArray) -> Result<VolumeDataset> {
        let dimensions = match *array.shape() {
            [z, y, x] => (x, y, z),
            [y, x] => (x, y, 1),
            ref shape => {
                return Err(ViewerError::Shape(format!(
                    "{:?} has {} dimensions, expected 2 or 3",
                    shape,
                    shape.len()
                )));
            }
        };
        debug!("building volume {:?} from shape {:?}", dimensions, array.shape());
        VolumeDataset::new(dimensions, array.elements)
    }
}
