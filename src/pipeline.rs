//! Render sessions: surface, camera, mapper and transfer function for one
//! loaded volume.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::RgbaImage;
use log::{debug, info, warn};

use crate::camera::Camera;
use crate::config::RenderSettings;
use crate::enums::Processor;
use crate::error::{Result, ViewerError};
use crate::gpu_raycaster::GpuRaycaster;
use crate::mapper::{VolumeMapper, VolumeProperty};
use crate::raycaster::CpuRaycaster;
use crate::transfer_function::TransferFunction;
use crate::volume::VolumeDataset;

/// Sample distance used when the caller supplies an unusable value.
pub const DEFAULT_SAMPLE_DISTANCE: f32 = 1.0;

/// The container a session renders into.
///
/// A target without pixel area is treated as not attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceTarget {
    pub width: u32,
    pub height: u32,
}

impl SurfaceTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_attached(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

fn is_valid_sample_distance(distance: f32) -> bool {
    distance.is_finite() && distance > 0.0
}

/// A live render of one dataset. Exclusively owns its mapper resources.
pub struct RenderSession {
    dataset: VolumeDataset,
    transfer_function: TransferFunction,
    camera: Camera,
    surface: SurfaceTarget,
    mapper: Box<dyn VolumeMapper>,
    frame: Option<RgbaImage>,
    render_count: u64,
    live_sessions: Arc<AtomicUsize>,
    released: bool,
}

impl RenderSession {
    pub fn dataset(&self) -> &VolumeDataset {
        &self.dataset
    }

    pub fn transfer_function(&self) -> &TransferFunction {
        &self.transfer_function
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn surface(&self) -> SurfaceTarget {
        self.surface
    }

    pub fn sample_distance(&self) -> f32 {
        self.mapper.sample_distance()
    }

    /// The most recent frame.
    pub fn frame(&self) -> Option<&RgbaImage> {
        self.frame.as_ref()
    }

    pub fn render_count(&self) -> u64 {
        self.render_count
    }

    fn render(&mut self) -> Result<()> {
        let frame = self.mapper.render(&self.camera)?;
        self.frame = Some(frame);
        self.render_count += 1;
        Ok(())
    }

    fn teardown(&mut self) {
        if !self.released {
            self.mapper.release();
            self.frame = None;
            self.released = true;
            self.live_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        if !self.released {
            warn!("render session dropped without release");
            self.teardown();
        }
    }
}

/// Builds and drives render sessions.
pub struct RenderingPipeline {
    settings: RenderSettings,
    processor: Processor,
    live_sessions: Arc<AtomicUsize>,
}

impl RenderingPipeline {
    pub fn new(settings: RenderSettings, processor: Processor) -> Self {
        Self {
            settings,
            processor,
            live_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Sessions created and not yet released.
    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::SeqCst)
    }

    /// Set up a session for `dataset` on `container` and render the first frame.
    ///
    /// A non-finite or non-positive `initial_sample_distance` falls back to
    /// [`DEFAULT_SAMPLE_DISTANCE`].
    ///
    /// # Errors
    ///
    /// * [`ViewerError::MissingContainer`] if the container has no area
    /// * [`ViewerError::EmptyVolume`] if the dataset holds no scalars
    pub fn initialize(
        &self,
        dataset: VolumeDataset,
        container: &SurfaceTarget,
        initial_sample_distance: f32,
    ) -> Result<RenderSession> {
        if !container.is_attached() {
            return Err(ViewerError::MissingContainer);
        }
        if dataset.is_empty() {
            return Err(ViewerError::EmptyVolume);
        }
        let sample_distance = if is_valid_sample_distance(initial_sample_distance) {
            initial_sample_distance
        } else {
            warn!(
                "invalid sample distance {initial_sample_distance}, using {DEFAULT_SAMPLE_DISTANCE}"
            );
            DEFAULT_SAMPLE_DISTANCE
        };

        let camera = Camera::fit_to_bounds(&dataset.bounds(), self.settings.view_angle_degrees);
        let range = dataset.value_range();
        let transfer_function = TransferFunction::grayscale_ramp(range);
        let property = VolumeProperty {
            lookup_table: transfer_function.lookup_table(range, self.settings.lut_size),
            interpolation: self.settings.interpolation,
            background: self.settings.background,
            termination_opacity: self.settings.termination_opacity,
        };

        let mapper: Box<dyn VolumeMapper> = match &self.processor {
            Processor::CPU => Box::new(CpuRaycaster::new(
                dataset.clone(),
                property,
                sample_distance,
                container.width,
                container.height,
            )),
            Processor::GPU(wgpu) => Box::new(GpuRaycaster::new(
                wgpu,
                dataset.clone(),
                property,
                sample_distance,
                container.width,
                container.height,
            )?),
        };

        self.live_sessions.fetch_add(1, Ordering::SeqCst);
        let mut session = RenderSession {
            dataset,
            transfer_function,
            camera,
            surface: *container,
            mapper,
            frame: None,
            render_count: 0,
            live_sessions: Arc::clone(&self.live_sessions),
            released: false,
        };
        info!(
            "initialized session for volume {:?} with range {:?} on {}x{}",
            session.dataset.dim(),
            range,
            container.width,
            container.height
        );
        session.render()?;
        Ok(session)
    }

    /// Change the sample distance and re-render. Only the mapper parameter
    /// changes; the dataset and its uploaded scalars stay as they are.
    ///
    /// Non-finite or non-positive values are ignored.
    pub fn update_sample_distance(&self, session: &mut RenderSession, distance: f32) -> Result<()> {
        if session.released {
            return Err(ViewerError::Render("session has been released".into()));
        }
        if !is_valid_sample_distance(distance) {
            warn!("ignoring invalid sample distance {distance}");
            return Ok(());
        }
        debug!("sample distance {} -> {}", session.sample_distance(), distance);
        session.mapper.set_sample_distance(distance);
        session.render()
    }

    /// Dispose of the session's surface and mapper resources.
    pub fn release(&self, mut session: RenderSession) {
        info!("releasing session for volume {:?}", session.dataset.dim());
        session.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npy::Elements;

    fn pipeline() -> RenderingPipeline {
        RenderingPipeline::new(RenderSettings::default(), Processor::CPU)
    }

    fn ramp_volume() -> VolumeDataset {
        let values: Vec<u8> = (0..=255).collect();
        VolumeDataset::new((16, 16, 1), Elements::UInt8(values)).unwrap()
    }

    #[test]
    fn initialize_renders_a_first_frame() {
        let pipeline = pipeline();
        let session = pipeline
            .initialize(ramp_volume(), &SurfaceTarget::new(24, 16), 0.5)
            .unwrap();

        assert_eq!(session.render_count(), 1);
        assert_eq!(session.sample_distance(), 0.5);
        assert_eq!(session.frame().unwrap().dimensions(), (24, 16));
        assert_eq!(pipeline.live_sessions(), 1);
        pipeline.release(session);
        assert_eq!(pipeline.live_sessions(), 0);
    }

    #[test]
    fn default_transfer_function_spans_value_range() {
        let session = pipeline()
            .initialize(ramp_volume(), &SurfaceTarget::new(8, 8), 1.0)
            .unwrap();
        let tf = session.transfer_function();

        let colors = tf.color_stops();
        assert_eq!(colors.first().unwrap().value, 0.0);
        assert_eq!(colors.last().unwrap().value, 255.0);
        let opacities = tf.opacity_stops();
        assert_eq!(opacities.first().unwrap().value, 0.0);
        assert_eq!(opacities.last().unwrap().value, 255.0);
    }

    #[test]
    fn invalid_initial_sample_distance_falls_back() {
        let pipeline = pipeline();
        for distance in [f32::NAN, f32::INFINITY, 0.0, -2.0] {
            let session = pipeline
                .initialize(ramp_volume(), &SurfaceTarget::new(4, 4), distance)
                .unwrap();
            assert_eq!(session.sample_distance(), DEFAULT_SAMPLE_DISTANCE);
            pipeline.release(session);
        }
    }

    #[test]
    fn detached_container_is_rejected() {
        let pipeline = pipeline();
        let result = pipeline.initialize(ramp_volume(), &SurfaceTarget::new(0, 32), 1.0);
        assert!(matches!(result, Err(ViewerError::MissingContainer)));
        assert_eq!(pipeline.live_sessions(), 0);
    }

    #[test]
    fn empty_volume_is_rejected() {
        let empty = VolumeDataset::new((0, 4, 4), Elements::Float32(Vec::new())).unwrap();
        let result = pipeline().initialize(empty, &SurfaceTarget::new(8, 8), 1.0);
        assert!(matches!(result, Err(ViewerError::EmptyVolume)));
    }

    #[test]
    fn repeated_updates_keep_the_dataset() {
        let pipeline = pipeline();
        let dataset = ramp_volume();
        let mut session = pipeline
            .initialize(dataset.clone(), &SurfaceTarget::new(8, 8), 1.0)
            .unwrap();
        let before = session.dataset().scalars().clone();

        for i in 0..50 {
            let distance = 0.25 + (i % 7) as f32 * 0.5;
            pipeline.update_sample_distance(&mut session, distance).unwrap();
            assert_eq!(session.sample_distance(), distance);
        }

        assert!(session.dataset().same_as(&dataset));
        assert_eq!(session.dataset().scalars(), &before);
        assert_eq!(session.render_count(), 51);
        assert_eq!(pipeline.live_sessions(), 1);
    }

    #[test]
    fn invalid_update_keeps_current_distance() {
        let pipeline = pipeline();
        let mut session = pipeline
            .initialize(ramp_volume(), &SurfaceTarget::new(8, 8), 2.0)
            .unwrap();
        pipeline.update_sample_distance(&mut session, f32::NAN).unwrap();
        assert_eq!(session.sample_distance(), 2.0);
        assert_eq!(session.render_count(), 1);
    }

    #[test]
    fn infinite_samples_do_not_break_initialize() {
        let bytes = crate::npy::encode(
            &[2, 2],
            &Elements::Float32(vec![0.0, 1.0, f32::INFINITY, 2.0]),
        )
        .unwrap();
        let dataset = crate::volume::VolumeBuilder::build(crate::npy::decode(&bytes).unwrap())
            .unwrap();

        let pipeline = pipeline();
        let session = pipeline
            .initialize(dataset, &SurfaceTarget::new(8, 8), 1.0)
            .unwrap();
        assert_eq!(session.dataset().value_range(), (0.0, 2.0));
        let colors = session.transfer_function().color_stops();
        assert_eq!(colors.last().unwrap().value, 2.0);
        assert_eq!(session.frame().unwrap().dimensions(), (8, 8));
        pipeline.release(session);
    }

    #[test]
    fn dropping_a_session_releases_it() {
        let pipeline = pipeline();
        let session = pipeline
            .initialize(ramp_volume(), &SurfaceTarget::new(8, 8), 1.0)
            .unwrap();
        drop(session);
        assert_eq!(pipeline.live_sessions(), 0);
    }
}
