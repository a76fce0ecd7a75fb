//! # npy-volume
//!
//! Decode NumPy `.npy` arrays into scalar volumes and ray-cast them.
//!
//! A load runs in one pass: the bytes of a file or URL are read, decoded
//! into a typed and shaped array, mapped onto a volume and handed to a
//! render session. The session owns a volume mapper, an auto-fitted camera
//! and a grayscale transfer function spanning the value range of the data.
//! The sample distance of a live session can be changed as often as needed
//! without touching the scalars.
//!
//! Supported inputs are `float32` (`f4`) and `uint8` (`u1`) arrays with a
//! `(y, x)` or `(z, y, x)` shape. A 2D array becomes a single-slice volume.
//!
//! The mapper runs either on the CPU, parallelised with rayon, or on the GPU
//! as a wgpu compute shader.
//!
//! # Examples
//!
//! ## Rendering a file
//!
//! ```no_run
//! # use npy_volume::{InputSource, Processor, RenderSettings, RenderingPipeline, SurfaceTarget, Viewer};
//! # async fn run() -> Result<(), npy_volume::ViewerError> {
//! let pipeline = RenderingPipeline::new(RenderSettings::default(), Processor::CPU);
//! let mut viewer = Viewer::new(pipeline, SurfaceTarget::new(512, 512));
//! viewer.load(&InputSource::File("volume.npy".into())).await?;
//! viewer.set_sample_distance(0.5)?;
//! if let Some(frame) = viewer.session().and_then(|s| s.frame()) {
//!     frame.save("volume.png").expect("should have written the frame");
//! }
//! # Ok(())
//! # }
//! ```

pub mod camera;
pub mod config;
pub mod enums;
pub mod error;
pub mod gpu_raycaster;
mod interpolator;
pub mod mapper;
pub mod npy;
pub mod pipeline;
pub mod raycaster;
pub mod transfer_function;
pub mod viewer;
pub mod volume;
pub mod volume_loader;

pub use config::RenderSettings;
pub use enums::{ByteOrder, Dtype, Interpolation, Processor};
pub use error::ViewerError;
pub use gpu_raycaster::WGPU;
pub use npy::{DecodedArray, Elements, NpyHeader};
pub use pipeline::{RenderSession, RenderingPipeline, SurfaceTarget};
pub use transfer_function::TransferFunction;
pub use viewer::{LoadOutcome, LoadTicket, Viewer};
pub use volume::{VolumeBuilder, VolumeDataset};
pub use volume_loader::{InputSource, VolumeLoader};
