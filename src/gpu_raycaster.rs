use half::f16;
use image::RgbaImage;
use log::{debug, info};
use rayon::prelude::*;
use std::borrow::Cow;
use web_time::Instant;
use wgpu::{PollType, util::DeviceExt};

use crate::camera::Camera;
use crate::enums::Interpolation;
use crate::error::{Result, ViewerError};
use crate::mapper::{MAX_STEPS_PER_RAY, VolumeMapper, VolumeProperty};
use crate::npy::Elements;
use crate::volume::VolumeDataset;

const WORKGROUP_SIZE: u32 = 8;

pub struct WGPU {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl WGPU {
    /// Request the default adapter and a device with its full limits.
    pub async fn request() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .map_err(|e| ViewerError::Gpu(format!("no compatible adapter: {e}")))?;
        info!("using adapter {:?}", adapter.get_info().name);
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("npy-volume device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                ..Default::default()
            })
            .await
            .map_err(|e| ViewerError::Gpu(format!("failed to request device: {e}")))?;
        Ok(Self { device, queue })
    }
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Uniforms {
    eye: [f32; 4],
    forward: [f32; 4],
    right: [f32; 4],
    up: [f32; 4],
    extent: [f32; 4],
    background: [f32; 4],
    output_width: u32,
    output_height: u32,
    sample_distance: f32,
    tan_half_fov: f32,
    aspect: f32,
    lut_size: u32,
    termination_opacity: f32,
    max_steps: u32,
}

const _: () = assert!(std::mem::size_of::<Uniforms>() == 128);

struct GpuResources {
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    volume_texture: wgpu::Texture,
    lut_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    output_buffer: wgpu::Buffer,
    staging_buffer: wgpu::Buffer,
}

/// Ray-casting volume mapper running as a wgpu compute shader.
///
/// The scalars are normalised against the value range and uploaded once into
/// a 3D `R16Float` texture. Each render only rewrites the uniform buffer.
pub struct GpuRaycaster {
    device: wgpu::Device,
    queue: wgpu::Queue,
    dataset: VolumeDataset,
    property: VolumeProperty,
    sample_distance: f32,
    width: u32,
    height: u32,
    resources: Option<GpuResources>,
}

/// Texture extent of the volume and byte size of the frame buffer, if both
/// fit within the device limits.
fn check_limits(
    limits: &wgpu::Limits,
    (x, y, z): (usize, usize, usize),
    width: u32,
    height: u32,
) -> Result<((u32, u32, u32), u64)> {
    let max_dim = limits.max_texture_dimension_3d;
    let extent = match (u32::try_from(x), u32::try_from(y), u32::try_from(z)) {
        (Ok(x), Ok(y), Ok(z)) if x.max(y).max(z) <= max_dim => (x, y, z),
        _ => {
            return Err(ViewerError::Gpu(format!(
                "volume {x}x{y}x{z} exceeds the 3D texture limit of {max_dim}"
            )));
        }
    };

    let output_size = u64::from(width) * u64::from(height) * std::mem::size_of::<u32>() as u64;
    let max_output = limits
        .max_buffer_size
        .min(u64::from(limits.max_storage_buffer_binding_size));
    if output_size > max_output {
        return Err(ViewerError::Gpu(format!(
            "{width}x{height} frame needs {output_size} bytes, the device allows {max_output}"
        )));
    }
    Ok((extent, output_size))
}

impl GpuRaycaster {
    pub fn new(
        wgpu: &WGPU,
        dataset: VolumeDataset,
        property: VolumeProperty,
        sample_distance: f32,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let WGPU { device, queue } = wgpu;
        let ((x, y, z), output_size) =
            check_limits(&device.limits(), dataset.dim(), width, height)?;

        let started = Instant::now();
        let lut = &property.lookup_table;
        let texels: Vec<f16> = match dataset.scalars() {
            Elements::Float32(values) => values
                .par_iter()
                .map(|&v| f16::from_f32(lut.normalize(v)))
                .collect(),
            Elements::UInt8(values) => values
                .par_iter()
                .map(|&v| f16::from_f32(lut.normalize(v as f32)))
                .collect(),
        };

        let texture_size = wgpu::Extent3d {
            width: x,
            height: y,
            depth_or_array_layers: z,
        };
        let volume_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Volume 3D Texture"),
            size: texture_size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::R16Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfoBase {
                texture: &volume_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(x * std::mem::size_of::<f16>() as u32),
                rows_per_image: Some(y),
            },
            texture_size,
        );
        let volume_view = volume_texture.create_view(&wgpu::TextureViewDescriptor::default());
        debug!("uploaded {} texels in {:?}", texels.len(), started.elapsed());

        let filter = match property.interpolation {
            Interpolation::Linear => wgpu::FilterMode::Linear,
            Interpolation::Nearest => wgpu::FilterMode::Nearest,
        };
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Volume Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let lut_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Transfer Function LUT"),
            contents: bytemuck::cast_slice(lut.entries()),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Raycast Uniforms"),
            size: std::mem::size_of::<Uniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Buffer"),
            size: output_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Staging Buffer"),
            size: output_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Volume Raycast Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("shaders/raycast.wgsl"))),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Volume Raycast Bind Group Layout"),
            entries: &[
                // 3D texture
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D3,
                        multisampled: false,
                    },
                    count: None,
                },
                // Sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                // Transfer function
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Output pixels
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Volume Raycast Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&volume_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: lut_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: output_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Volume Raycast Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Volume Raycast Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Ok(Self {
            device: device.clone(),
            queue: queue.clone(),
            dataset,
            property,
            sample_distance,
            width,
            height,
            resources: Some(GpuResources {
                pipeline,
                bind_group,
                volume_texture,
                lut_buffer,
                uniform_buffer,
                output_buffer,
                staging_buffer,
            }),
        })
    }

    fn uniforms(&self, camera: &Camera) -> Uniforms {
        let rays = camera.rays(self.width, self.height);
        let extent = self.dataset.bounds().extent();
        let [r, g, b] = self.property.background;
        Uniforms {
            eye: rays.origin.extend(1.0).to_array(),
            forward: rays.forward.extend(0.0).to_array(),
            right: rays.right.extend(0.0).to_array(),
            up: rays.up.extend(0.0).to_array(),
            extent: extent.extend(0.0).to_array(),
            background: [r, g, b, 1.0],
            output_width: self.width,
            output_height: self.height,
            sample_distance: self.sample_distance,
            tan_half_fov: rays.tan_half_fov,
            aspect: rays.aspect,
            lut_size: self.property.lookup_table.entries().len() as u32,
            termination_opacity: self.property.termination_opacity,
            max_steps: MAX_STEPS_PER_RAY,
        }
    }
}

impl VolumeMapper for GpuRaycaster {
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
        let resources = self
            .resources
            .as_ref()
            .ok_or_else(|| ViewerError::Render("mapper has been released".into()))?;
        let started = Instant::now();

        self.queue.write_buffer(
            &resources.uniform_buffer,
            0,
            bytemuck::bytes_of(&self.uniforms(camera)),
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Volume Raycast Encoder"),
            });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Volume Raycast Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&resources.pipeline);
            compute_pass.set_bind_group(0, &resources.bind_group, &[]);
            compute_pass.dispatch_workgroups(
                self.width.div_ceil(WORKGROUP_SIZE),
                self.height.div_ceil(WORKGROUP_SIZE),
                1,
            );
        }
        encoder.copy_buffer_to_buffer(
            &resources.output_buffer,
            0,
            &resources.staging_buffer,
            0,
            resources.output_buffer.size(),
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = resources.staging_buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| ViewerError::Gpu(e.to_string()))?;
        futures::executor::block_on(receiver)
            .map_err(|e| ViewerError::Gpu(e.to_string()))?
            .map_err(|e| ViewerError::Gpu(e.to_string()))?;

        let pixels: Vec<u8> = {
            let data = buffer_slice.get_mapped_range();
            let packed: &[u32] = bytemuck::cast_slice(&data);
            packed.iter().flat_map(|p| p.to_le_bytes()).collect()
        };
        resources.staging_buffer.unmap();

        debug!(
            "gpu ray cast {}x{} at sample distance {} in {:?}",
            self.width,
            self.height,
            self.sample_distance,
            started.elapsed()
        );
        RgbaImage::from_raw(self.width, self.height, pixels)
            .ok_or_else(|| ViewerError::Render("frame size does not match surface".into()))
    }

    fn release(&mut self) {
        if let Some(resources) = self.resources.take() {
            resources.volume_texture.destroy();
            resources.lut_buffer.destroy();
            resources.uniform_buffer.destroy();
            resources.output_buffer.destroy();
            resources.staging_buffer.destroy();
        }
    }
}
