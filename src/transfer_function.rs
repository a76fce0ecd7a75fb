//! Mapping from scalar intensity to colour and opacity.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub value: f64,
    pub rgb: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpacityStop {
    pub value: f64,
    pub alpha: f32,
}

/// Piecewise-linear colour and opacity functions over scalar values.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferFunction {
    color_stops: Vec<ColorStop>,
    opacity_stops: Vec<OpacityStop>,
}

impl TransferFunction {
    /// Stops are sorted by scalar value. Values outside the stops take the
    /// nearest end stop.
    pub fn new(mut color_stops: Vec<ColorStop>, mut opacity_stops: Vec<OpacityStop>) -> Self {
        color_stops.sort_by(|a, b| a.value.total_cmp(&b.value));
        opacity_stops.sort_by(|a, b| a.value.total_cmp(&b.value));
        Self {
            color_stops,
            opacity_stops,
        }
    }

    /// Black and transparent at `min`, white and opaque at `max`.
    ///
    /// A plain linear grey ramp. It makes no attempt at perceptual tuning.
    pub fn grayscale_ramp((min, max): (f64, f64)) -> Self {
        Self::new(
            vec![
                ColorStop {
                    value: min,
                    rgb: [0.0, 0.0, 0.0],
                },
                ColorStop {
                    value: max,
                    rgb: [1.0, 1.0, 1.0],
                },
            ],
            vec![
                OpacityStop {
                    value: min,
                    alpha: 0.0,
                },
                OpacityStop {
                    value: max,
                    alpha: 1.0,
                },
            ],
        )
    }

    pub fn color_stops(&self) -> &[ColorStop] {
        &self.color_stops
    }

    pub fn opacity_stops(&self) -> &[OpacityStop] {
        &self.opacity_stops
    }

    pub fn color(&self, value: f64) -> [f32; 3] {
        let Some((lo, hi, t)) = bracket(&self.color_stops, |s| s.value, value) else {
            return [0.0; 3];
        };
        let (a, b) = (self.color_stops[lo].rgb, self.color_stops[hi].rgb);
        [
            lerp(a[0], b[0], t),
            lerp(a[1], b[1], t),
            lerp(a[2], b[2], t),
        ]
    }

    pub fn opacity(&self, value: f64) -> f32 {
        let Some((lo, hi, t)) = bracket(&self.opacity_stops, |s| s.value, value) else {
            return 0.0;
        };
        lerp(self.opacity_stops[lo].alpha, self.opacity_stops[hi].alpha, t)
    }

    /// Tabulate the function as RGBA over `range` with `size` entries.
    pub fn lookup_table(&self, range: (f64, f64), size: usize) -> LookupTable {
        let size = size.max(2);
        let (min, max) = range;
        let entries = (0..size)
            .map(|i| {
                let value = min + (max - min) * i as f64 / (size - 1) as f64;
                let [r, g, b] = self.color(value);
                [r, g, b, self.opacity(value)]
            })
            .collect();
        LookupTable { min, max, entries }
    }
}

/// Index pair and blend factor for `value` among sorted stops.
///
/// NaN takes the first stop.
fn bracket<S>(stops: &[S], key: impl Fn(&S) -> f64, value: f64) -> Option<(usize, usize, f32)> {
    let last = stops.len().checked_sub(1)?;
    if last == 0 || value.is_nan() || value <= key(&stops[0]) {
        return Some((0, 0, 0.0));
    }
    if value >= key(&stops[last]) {
        return Some((last, last, 0.0));
    }
    let hi = stops.partition_point(|s| key(s) <= value).clamp(1, last);
    let lo = hi - 1;
    let span = key(&stops[hi]) - key(&stops[lo]);
    let t = if span > 0.0 {
        (value - key(&stops[lo])) / span
    } else {
        0.0
    };
    Some((lo, hi, t as f32))
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    (b - a).mul_add(t, a)
}

/// Tabulated transfer function shared by the CPU and GPU mappers.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTable {
    min: f64,
    max: f64,
    entries: Vec<[f32; 4]>,
}

impl LookupTable {
    pub fn entries(&self) -> &[[f32; 4]] {
        &self.entries
    }

    /// Position of `value` within the table range, in `[0, 1]`. NaN maps to 0.
    #[inline]
    pub fn normalize(&self, value: f32) -> f32 {
        let span = self.max - self.min;
        if span <= 0.0 || value.is_nan() {
            return 0.0;
        }
        (((value as f64 - self.min) / span) as f32).clamp(0.0, 1.0)
    }

    /// Colour and opacity at `value`, blended between the two nearest entries.
    #[inline]
    pub fn lookup(&self, value: f32) -> [f32; 4] {
        let last = self.entries.len().saturating_sub(1);
        let position = self.normalize(value) * last as f32;
        let lo = (position.floor() as usize).min(last);
        let hi = (lo + 1).min(last);
        let t = position - lo as f32;
        let (a, b) = (self.entries[lo], self.entries[hi]);
        [
            lerp(a[0], b[0], t),
            lerp(a[1], b[1], t),
            lerp(a[2], b[2], t),
            lerp(a[3], b[3], t),
        ]
    }
}
