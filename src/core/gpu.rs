//! GPU compute infrastructure.
//!
//! Wraps a wgpu device and queue together with the buffer, binding and
//! readback helpers the parallel backend builds its kernels from. Images
//! travel to the device as packed `u32` pixels in the same layout as
//! [`PixelBuffer`](crate::core::pixel::PixelBuffer).

use crate::core::error::GpuError;
use bytemuck::{cast_slice, Pod, Zeroable};
use pollster::block_on;
use std::sync::mpsc;
use std::time::Duration;

/// Side length of the square workgroup every kernel is compiled with.
pub const WORKGROUP_SIZE: u32 = 16;

/// Uniform block shared by all kernels.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct KernelParams {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Blur radius; zero for the other kernels.
    pub radius: u32,
    /// Keeps the block 16 bytes.
    pub _pad: u32,
}

/// An initialized GPU device.
pub struct GpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    info: wgpu::AdapterInfo,
    timestamps: bool,
}

impl GpuDevice {
    /// Acquire the high-performance adapter and open a device on it.
    ///
    /// Timestamp queries are requested when the adapter offers them.
    pub fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter = block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or(GpuError::NotAvailable)?;

        let timestamps = adapter.features().contains(wgpu::Features::TIMESTAMP_QUERY);
        let required_features = if timestamps {
            wgpu::Features::TIMESTAMP_QUERY
        } else {
            wgpu::Features::empty()
        };

        let (device, queue) = block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("imgtrans-device"),
                required_features,
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|err| GpuError::DeviceInit(err.to_string()))?;

        let info = adapter.get_info();
        log::info!("Using GPU adapter '{}' ({:?})", info.name, info.backend);
        if !timestamps {
            log::warn!("Adapter '{}' has no timestamp queries; device time will not be measured", info.name);
        }

        Ok(Self {
            device,
            queue,
            info,
            timestamps,
        })
    }

    /// The logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// The submission queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Name reported by the adapter.
    pub fn adapter_name(&self) -> &str {
        &self.info.name
    }

    /// Whether device-side timing is available.
    pub fn supports_timestamps(&self) -> bool {
        self.timestamps
    }

    /// Fail early when a storage binding would exceed the device limit.
    pub fn check_binding_size(&self, bytes: u64) -> Result<(), GpuError> {
        let limits = self.device.limits();
        let limit = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
        if bytes > limit {
            return Err(GpuError::BufferTooLarge {
                required: bytes,
                limit,
            });
        }
        Ok(())
    }

    /// Workgroup grid covering a `width x height` image.
    pub fn workgroups(&self, width: u32, height: u32) -> Result<(u32, u32), GpuError> {
        let groups = (
            width.div_ceil(WORKGROUP_SIZE).max(1),
            height.div_ceil(WORKGROUP_SIZE).max(1),
        );
        let limit = self.device.limits().max_compute_workgroups_per_dimension;
        if groups.0 > limit || groups.1 > limit {
            return Err(GpuError::Execution(format!(
                "{}x{} image needs {}x{} workgroups, device allows {} per dimension",
                width, height, groups.0, groups.1, limit
            )));
        }
        Ok(groups)
    }

    /// Create a begin/end timestamp pair, if the device supports it.
    pub fn timer(&self) -> Option<GpuTimer> {
        self.timestamps.then(|| GpuTimer::new(&self.device, &self.queue))
    }
}

/// A pair of timestamp queries bracketing a sequence of compute passes.
pub struct GpuTimer {
    query_set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    readback: wgpu::Buffer,
    period_ns: f32,
}

impl GpuTimer {
    const QUERY_BYTES: u64 = 2 * std::mem::size_of::<u64>() as u64;

    fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("imgtrans-timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count: 2,
        });
        let resolve = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("imgtrans-timestamps-resolve"),
            size: Self::QUERY_BYTES,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback = create_readback_buffer(device, Self::QUERY_BYTES, "imgtrans-timestamps-readback");

        Self {
            query_set,
            resolve,
            readback,
            period_ns: queue.get_timestamp_period(),
        }
    }

    /// Timestamp writes for one pass; `first` and `last` mark the bracket ends.
    pub fn pass_writes(&self, first: bool, last: bool) -> wgpu::ComputePassTimestampWrites<'_> {
        wgpu::ComputePassTimestampWrites {
            query_set: &self.query_set,
            beginning_of_pass_write_index: first.then_some(0),
            end_of_pass_write_index: last.then_some(1),
        }
    }

    /// Record query resolution into `encoder`, after the last timed pass.
    pub fn resolve(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.resolve_query_set(&self.query_set, 0..2, &self.resolve, 0);
        encoder.copy_buffer_to_buffer(&self.resolve, 0, &self.readback, 0, Self::QUERY_BYTES);
    }

    /// Read the elapsed time once the submission has completed.
    pub fn elapsed(&self, device: &wgpu::Device) -> Result<Duration, GpuError> {
        let ticks: Vec<u64> = read_buffer(device, &self.readback, 2)?;
        let delta = ticks[1].saturating_sub(ticks[0]);
        Ok(Duration::from_nanos((delta as f64 * self.period_ns as f64) as u64))
    }
}

// ============================================================================
// Buffer and binding helpers
// ============================================================================

/// Storage buffer binding visible to compute shaders.
pub fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Uniform buffer binding visible to compute shaders.
pub fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Storage buffer that can also be copied to and from.
pub fn create_storage_buffer(
    device: &wgpu::Device,
    size: wgpu::BufferAddress,
    label: &str,
) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Mappable buffer for reading results on the host.
pub fn create_readback_buffer(
    device: &wgpu::Device,
    size: wgpu::BufferAddress,
    label: &str,
) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Record one compute pass over a `groups` grid.
pub fn dispatch(
    encoder: &mut wgpu::CommandEncoder,
    pipeline: &wgpu::ComputePipeline,
    bind_group: &wgpu::BindGroup,
    groups: (u32, u32),
    timestamp_writes: Option<wgpu::ComputePassTimestampWrites<'_>>,
) {
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some("imgtrans-pass"),
        timestamp_writes,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.dispatch_workgroups(groups.0, groups.1, 1);
}

/// Map a readback buffer and copy out `expected_len` elements.
pub fn read_buffer<T: Pod>(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
    expected_len: usize,
) -> Result<Vec<T>, GpuError> {
    let slice = buffer.slice(..);
    let (sender, receiver) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    match receiver.recv() {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return Err(GpuError::Execution(err.to_string())),
        Err(err) => return Err(GpuError::Execution(err.to_string())),
    }
    let data = slice.get_mapped_range();
    let values: Vec<T> = cast_slice(&data).to_vec();
    drop(data);
    buffer.unmap();
    if values.len() != expected_len {
        return Err(GpuError::Execution("unexpected readback length".to_string()));
    }
    Ok(values)
}

/// WGSL sources.
pub mod shaders {
    /// Entry point of the swap kernel.
    pub const SWAP_ENTRY: &str = "swap_main";
    /// Entry point of the grayscale kernel.
    pub const GRAY_ENTRY: &str = "gray_main";
    /// Entry point of the emboss kernel.
    pub const EMBOSS_ENTRY: &str = "emboss_main";
    /// First blur pass: per-channel row sums.
    pub const BLUR_HORIZONTAL_ENTRY: &str = "blur_horizontal";
    /// Second blur pass: column sums and division.
    pub const BLUR_VERTICAL_ENTRY: &str = "blur_vertical";

    /// Per-pixel kernels over packed RGBA (`r` in the low byte).
    ///
    /// The blur runs as two passes: the horizontal pass writes four `u32`
    /// channel sums per pixel into `dst`, the vertical pass reads them back
    /// through `src` and divides by the in-bounds window size.
    pub const IMAGE_KERNELS: &str = r#"
struct Params {
    width: u32,
    height: u32,
    radius: u32,
    _pad: u32,
};

@group(0) @binding(0)
var<storage, read> src: array<u32>;

@group(0) @binding(1)
var<storage, read_write> dst: array<u32>;

@group(0) @binding(2)
var<uniform> params: Params;

fn channel(p: u32, c: u32) -> u32 {
    return (p >> (c * 8u)) & 0xffu;
}

fn pack(r: u32, g: u32, b: u32, a: u32) -> u32 {
    return r | (g << 8u) | (b << 16u) | (a << 24u);
}

fn window_lo(pos: u32) -> u32 {
    return select(0u, pos - params.radius, pos >= params.radius);
}

fn window_hi(pos: u32, len: u32) -> u32 {
    return min(pos + params.radius, len - 1u);
}

@compute @workgroup_size(16, 16, 1)
fn swap_main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.width || id.y >= params.height) {
        return;
    }
    let idx = id.y * params.width + id.x;
    let p = src[idx];
    dst[idx] = pack(channel(p, 0u), channel(p, 2u), channel(p, 1u), channel(p, 3u));
}

@compute @workgroup_size(16, 16, 1)
fn gray_main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.width || id.y >= params.height) {
        return;
    }
    let idx = id.y * params.width + id.x;
    let p = src[idx];
    let l = (21u * channel(p, 0u) + 72u * channel(p, 1u) + 7u * channel(p, 2u)) / 100u;
    dst[idx] = pack(l, l, l, channel(p, 3u));
}

@compute @workgroup_size(16, 16, 1)
fn emboss_main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.width || id.y >= params.height) {
        return;
    }
    let idx = id.y * params.width + id.x;
    let ahead = src[min(id.y + 1u, params.height - 1u) * params.width + min(id.x + 1u, params.width - 1u)];
    let behind = src[(max(id.y, 1u) - 1u) * params.width + (max(id.x, 1u) - 1u)];

    var rgb = array<u32, 3>(0u, 0u, 0u);
    for (var c = 0u; c < 3u; c = c + 1u) {
        let v = 128 + i32(channel(ahead, c)) - i32(channel(behind, c));
        rgb[c] = u32(clamp(v, 0, 255));
    }
    dst[idx] = pack(rgb[0], rgb[1], rgb[2], channel(src[idx], 3u));
}

@compute @workgroup_size(16, 16, 1)
fn blur_horizontal(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.width || id.y >= params.height) {
        return;
    }
    let row = id.y * params.width;
    var sums = vec4<u32>(0u);
    for (var x = window_lo(id.x); x <= window_hi(id.x, params.width); x = x + 1u) {
        let p = src[row + x];
        sums = sums + vec4<u32>(channel(p, 0u), channel(p, 1u), channel(p, 2u), channel(p, 3u));
    }
    let base = (row + id.x) * 4u;
    dst[base] = sums.x;
    dst[base + 1u] = sums.y;
    dst[base + 2u] = sums.z;
    dst[base + 3u] = sums.w;
}

@compute @workgroup_size(16, 16, 1)
fn blur_vertical(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.width || id.y >= params.height) {
        return;
    }
    let lo = window_lo(id.y);
    let hi = window_hi(id.y, params.height);
    var sums = vec4<u32>(0u);
    for (var y = lo; y <= hi; y = y + 1u) {
        let base = (y * params.width + id.x) * 4u;
        sums = sums + vec4<u32>(src[base], src[base + 1u], src[base + 2u], src[base + 3u]);
    }
    let span_x = window_hi(id.x, params.width) - window_lo(id.x) + 1u;
    let count = span_x * (hi - lo + 1u);
    let avg = sums / vec4<u32>(count);
    dst[id.y * params.width + id.x] = pack(avg.x, avg.y, avg.z, avg.w);
}
"#;
}
