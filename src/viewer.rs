//! One-shot load pipeline with cancel-and-replace sequencing.
//!
//! Every load takes a [`LoadTicket`] before its bytes are acquired. When the
//! bytes arrive, only the ticket of the most recently started load may
//! replace the current session; results carrying older tickets are dropped.

use log::{debug, info};

use crate::error::Result;
use crate::npy::DecodedArray;
use crate::pipeline::{RenderSession, RenderingPipeline, SurfaceTarget};
use crate::volume::VolumeBuilder;
use crate::volume_loader::{InputSource, VolumeLoader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The load replaced the active session.
    Rendered,
    /// A newer load was started first, the result was thrown away.
    Discarded,
}

pub struct Viewer {
    pipeline: RenderingPipeline,
    container: SurfaceTarget,
    sample_distance: f32,
    generation: u64,
    session: Option<RenderSession>,
    session_generation: Option<u64>,
}

impl Viewer {
    pub fn new(pipeline: RenderingPipeline, container: SurfaceTarget) -> Self {
        let sample_distance = pipeline.settings().sample_distance;
        Self {
            pipeline,
            container,
            sample_distance,
            generation: 0,
            session: None,
            session_generation: None,
        }
    }

    pub fn pipeline(&self) -> &RenderingPipeline {
        &self.pipeline
    }

    pub fn session(&self) -> Option<&RenderSession> {
        self.session.as_ref()
    }

    /// Generation of the load the active session came from.
    pub fn session_generation(&self) -> Option<u64> {
        self.session_generation
    }

    /// Start a load. Any load started earlier becomes stale.
    pub fn begin_load(&mut self) -> LoadTicket {
        self.generation += 1;
        debug!("load {} started", self.generation);
        LoadTicket {
            generation: self.generation,
        }
    }

    pub fn is_current(&self, ticket: LoadTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Complete a load started with `ticket`.
    ///
    /// Stale tickets are discarded whatever their result. For the current
    /// ticket, decode and build errors are returned before anything is
    /// rendered and the active session stays as it is. Otherwise the active
    /// session is released before the new one is initialised.
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<DecodedArray>,
    ) -> Result<LoadOutcome> {
        if !self.is_current(ticket) {
            info!(
                "discarding load {} superseded by load {}",
                ticket.generation, self.generation
            );
            return Ok(LoadOutcome::Discarded);
        }

        let dataset = VolumeBuilder::build(result?)?;

        if let Some(previous) = self.session.take() {
            self.session_generation = None;
            self.pipeline.release(previous);
        }
        let session = self
            .pipeline
            .initialize(dataset, &self.container, self.sample_distance)?;
        self.session = Some(session);
        self.session_generation = Some(ticket.generation);
        Ok(LoadOutcome::Rendered)
    }

    /// Acquire, decode and display `source`.
    ///
    /// The viewer stays mutably borrowed until the load completes, so calls to
    /// `load` cannot overlap. A caller that must start a new load while an
    /// older one is still in flight, such as a UI replacing the file, should
    /// pair [`Viewer::begin_load`] with [`Viewer::finish_load`] and drive
    /// [`VolumeLoader::load`] itself. The older result is then discarded.
    pub async fn load(&mut self, source: &InputSource) -> Result<LoadOutcome> {
        let ticket = self.begin_load();
        let result = VolumeLoader::load(source).await;
        self.finish_load(ticket, result)
    }

    /// Sample distance control. Applies to the live session and to the first
    /// frame of later loads.
    pub fn set_sample_distance(&mut self, distance: f32) -> Result<()> {
        if distance.is_finite() && distance > 0.0 {
            self.sample_distance = distance;
        }
        match self.session.as_mut() {
            Some(session) => self.pipeline.update_sample_distance(session, distance),
            None => Ok(()),
        }
    }

    /// Release the active session, if any.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            self.pipeline.release(session);
        }
        self.session_generation = None;
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.close();
    }
}
