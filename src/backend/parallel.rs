//! Parallel backend: wgpu compute kernels over the packed pixel buffer.
//!
//! The device, shader module and pipelines are created once when the backend
//! is constructed. Each call uploads the pixels, runs one kernel (two for
//! blur, separated by a pass boundary), reads the result back and writes it
//! into [`Surface::pixels`] only after the readback succeeded.

use crate::backend::{Backend, BackendKind, BackendMetadata};
use crate::core::error::{GpuError, TransformError};
use crate::core::gpu::{self, shaders, GpuDevice, KernelParams};
use crate::core::transform::{BlurArea, Surface, TransformOutput};
use pollster::block_on;
use std::borrow::Cow;
use wgpu::util::DeviceExt;

/// Which compiled kernel a call runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kernel {
    Swap,
    Gray,
    Emboss,
    Blur { radius: u32 },
}

struct Pipelines {
    swap: wgpu::ComputePipeline,
    gray: wgpu::ComputePipeline,
    emboss: wgpu::ComputePipeline,
    blur_horizontal: wgpu::ComputePipeline,
    blur_vertical: wgpu::ComputePipeline,
}

/// Runs every transform as a GPU compute kernel.
pub struct ParallelBackend {
    gpu: GpuDevice,
    layout: wgpu::BindGroupLayout,
    pipelines: Pipelines,
}

impl ParallelBackend {
    /// Initialize the GPU and compile all kernels.
    ///
    /// Fails with [`GpuError::NotAvailable`] when no adapter is present.
    pub fn new() -> Result<Self, TransformError> {
        let gpu = GpuDevice::new()?;
        let device = gpu.device();

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("imgtrans-kernels"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(shaders::IMAGE_KERNELS)),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("imgtrans-layout"),
            entries: &[
                gpu::storage_entry(0, true),
                gpu::storage_entry(1, false),
                gpu::uniform_entry(2),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("imgtrans-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = |entry_point: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        let pipelines = Pipelines {
            swap: pipeline(shaders::SWAP_ENTRY),
            gray: pipeline(shaders::GRAY_ENTRY),
            emboss: pipeline(shaders::EMBOSS_ENTRY),
            blur_horizontal: pipeline(shaders::BLUR_HORIZONTAL_ENTRY),
            blur_vertical: pipeline(shaders::BLUR_VERTICAL_ENTRY),
        };

        Ok(Self {
            gpu,
            layout,
            pipelines,
        })
    }

    /// Static metadata, available without an instance.
    pub fn describe() -> BackendMetadata {
        BackendMetadata::new(BackendKind::Parallel, "wgpu compute kernels on the pixel buffer")
    }

    /// Name of the adapter the kernels run on.
    pub fn adapter_name(&self) -> &str {
        self.gpu.adapter_name()
    }

    fn bind(&self, src: &wgpu::Buffer, dst: &wgpu::Buffer, params: &wgpu::Buffer) -> wgpu::BindGroup {
        self.gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("imgtrans-bind-group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: src.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: dst.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
            ],
        })
    }

    fn execute(&self, surface: &mut Surface, kernel: Kernel) -> Result<TransformOutput, TransformError> {
        if surface.pixels.is_empty() {
            return Ok(TransformOutput::array());
        }

        let (width, height) = (surface.width(), surface.height());
        let len = surface.pixels.len();
        let pixel_bytes = (len * std::mem::size_of::<u32>()) as wgpu::BufferAddress;
        // Blur keeps four u32 channel sums per pixel between its passes.
        let scratch_bytes = pixel_bytes * 4;

        self.gpu.check_binding_size(match kernel {
            Kernel::Blur { .. } => scratch_bytes,
            _ => pixel_bytes,
        })?;
        let groups = self.gpu.workgroups(width, height)?;

        let device = self.gpu.device();
        let queue = self.gpu.queue();
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let input = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("imgtrans-input"),
            contents: bytemuck::cast_slice(surface.pixels.pixels()),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });
        let output = gpu::create_storage_buffer(device, pixel_bytes, "imgtrans-output");
        let readback = gpu::create_readback_buffer(device, pixel_bytes, "imgtrans-readback");
        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("imgtrans-params"),
            contents: bytemuck::bytes_of(&KernelParams {
                width,
                height,
                radius: match kernel {
                    Kernel::Blur { radius } => radius,
                    _ => 0,
                },
                _pad: 0,
            }),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let timer = self.gpu.timer();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("imgtrans-encoder"),
        });

        match kernel {
            Kernel::Blur { .. } => {
                let scratch = gpu::create_storage_buffer(device, scratch_bytes, "imgtrans-blur-sums");
                let horizontal = self.bind(&input, &scratch, &params);
                let vertical = self.bind(&scratch, &output, &params);
                gpu::dispatch(
                    &mut encoder,
                    &self.pipelines.blur_horizontal,
                    &horizontal,
                    groups,
                    timer.as_ref().map(|t| t.pass_writes(true, false)),
                );
                gpu::dispatch(
                    &mut encoder,
                    &self.pipelines.blur_vertical,
                    &vertical,
                    groups,
                    timer.as_ref().map(|t| t.pass_writes(false, true)),
                );
            }
            single => {
                let pipeline = match single {
                    Kernel::Swap => &self.pipelines.swap,
                    Kernel::Gray => &self.pipelines.gray,
                    _ => &self.pipelines.emboss,
                };
                let bind_group = self.bind(&input, &output, &params);
                gpu::dispatch(
                    &mut encoder,
                    pipeline,
                    &bind_group,
                    groups,
                    timer.as_ref().map(|t| t.pass_writes(true, true)),
                );
            }
        }

        encoder.copy_buffer_to_buffer(&output, 0, &readback, 0, pixel_bytes);
        if let Some(timer) = &timer {
            timer.resolve(&mut encoder);
        }
        queue.submit(Some(encoder.finish()));

        if let Some(err) = block_on(device.pop_error_scope()) {
            return Err(GpuError::Execution(err.to_string()).into());
        }

        let pixels: Vec<u32> = gpu::read_buffer(device, &readback, len)?;
        let elapsed = match &timer {
            Some(timer) => Some(timer.elapsed(device)?),
            None => None,
        };

        surface.pixels.pixels_mut().copy_from_slice(&pixels);
        log::debug!("{:?} kernel on {}x{} took {:?} on device", kernel, width, height, elapsed);
        Ok(TransformOutput::array().with_device_elapsed(elapsed))
    }
}

impl Backend for ParallelBackend {
    fn metadata(&self) -> BackendMetadata {
        Self::describe()
    }

    fn swap(&self, surface: &mut Surface) -> Result<TransformOutput, TransformError> {
        self.execute(surface, Kernel::Swap)
    }

    fn gray(&self, surface: &mut Surface) -> Result<TransformOutput, TransformError> {
        self.execute(surface, Kernel::Gray)
    }

    fn blur(&self, surface: &mut Surface, area: BlurArea) -> Result<TransformOutput, TransformError> {
        self.execute(surface, Kernel::Blur { radius: area.radius() })
    }

    fn emboss(&self, surface: &mut Surface) -> Result<TransformOutput, TransformError> {
        self.execute(surface, Kernel::Emboss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SequentialBackend;
    use crate::core::pixel::PixelBuffer;
    use crate::core::transform::{Status, Transform, NOT_MEASURED};
    use image::{Rgba, RgbaImage};

    fn backend() -> Option<ParallelBackend> {
        match ParallelBackend::new() {
            Ok(backend) => Some(backend),
            Err(err) => {
                eprintln!("skipping GPU test: {}", err);
                None
            }
        }
    }

    fn noisy(width: u32, height: u32) -> Surface {
        Surface::from_image(RgbaImage::from_fn(width, height, |x, y| {
            let v = x.wrapping_mul(2654435761).wrapping_add(y.wrapping_mul(40503));
            Rgba([v as u8, (v >> 8) as u8, (v >> 16) as u8, (v >> 24) as u8])
        }))
    }

    #[test]
    fn test_describe_implements_everything() {
        let metadata = ParallelBackend::describe();
        assert_eq!(metadata.kind, BackendKind::Parallel);
        assert_eq!(metadata.implements.len(), 4);
    }

    #[test]
    fn test_matches_sequential() {
        let Some(parallel) = backend() else { return };

        for transform in [
            Transform::Swap,
            Transform::Gray,
            Transform::Emboss,
            Transform::Blur { area: BlurArea::new(1).unwrap() },
            Transform::Blur { area: BlurArea::new(5).unwrap() },
            Transform::Blur { area: BlurArea::DEFAULT },
        ] {
            let mut expected = noisy(37, 21);
            let mut actual = expected.clone();

            SequentialBackend.apply(transform, &mut expected).unwrap();
            let output = parallel.apply(transform, &mut actual).unwrap();

            assert_eq!(output.status, Status::Array);
            assert_eq!(actual.pixels, expected.pixels, "{} differs", transform);
        }
    }

    #[test]
    fn test_device_time_reported_or_sentinel() {
        let Some(parallel) = backend() else { return };

        let mut surface = noisy(16, 16);
        let output = parallel.swap(&mut surface).unwrap();
        if parallel.gpu.supports_timestamps() {
            assert!(output.device_elapsed.is_some());
        } else {
            assert_eq!(output.device_elapsed_micros(), NOT_MEASURED);
        }
    }

    #[test]
    fn test_empty_image() {
        let Some(parallel) = backend() else { return };

        let mut surface = Surface::from_pixels(PixelBuffer::new(0, 0));
        let output = parallel.gray(&mut surface).unwrap();
        assert_eq!(output.status, Status::Array);
        assert!(surface.pixels.is_empty());
    }
}
