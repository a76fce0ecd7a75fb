//! Render settings passed explicitly into the pipeline.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::enums::Interpolation;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Background colour as linear RGB in `[0, 1]`.
    pub background: [f32; 3],
    /// Sample distance used for the first frame of each session.
    pub sample_distance: f32,
    pub interpolation: Interpolation,
    /// Vertical field of view of the auto-fitted camera.
    pub view_angle_degrees: f32,
    /// Number of entries the transfer function is tabulated into.
    pub lut_size: usize,
    pub termination_opacity: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            background: [0.1, 0.1, 0.1],
            sample_distance: 1.0,
            interpolation: Interpolation::Linear,
            view_angle_degrees: 30.0,
            lut_size: 256,
            termination_opacity: 0.99,
        }
    }
}

impl RenderSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }
}
