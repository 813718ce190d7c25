// gpu/context.rs — the compute context: adapter, device, queue, kernels.
//
// Responsibilities:
//   - Enumerate adapters on the requested backends and select the first
//     non-CPU one.
//   - Pick the thread-group size every kernel is compiled with, validated
//     against the device's invocation limit.
//   - Compile the kernel library once, up front. After construction the
//     context is immutable and shared by reference (`&ComputeContext`)
//     with every buffer and dispatcher that uses it.
//
// ADAPTER SELECTION:
// `request_adapter` may hand back a software rasterizer (llvmpipe, WARP)
// even when real hardware is present. We enumerate explicitly, prefer real
// GPUs, and only fall back to a CPU adapter when nothing else exists.
//
// ERROR SCOPES:
// wgpu reports validation and out-of-memory failures through an uncaptured
// error handler that panics by default. Every call that can fail on the
// device side runs inside `capture_errors`, which turns those failures into
// a value the caller maps onto `Error`.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock, PoisonError};

use crate::error::{Error, Result};
use crate::gpu::library::{Kernel, KernelLibrary};

/// Thread-group size used when the config does not request one.
const DEFAULT_THREADS_PER_GROUP: u32 = 256;

/// Where the WGSL kernel sources come from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KernelSource {
    /// Sources compiled into the binary.
    #[default]
    Embedded,
    /// A `mvs_kernels/` directory next to the running executable.
    Colocated,
    /// An explicit directory of `.wgsl` files.
    Directory(PathBuf),
}

/// Directory name searched next to the executable by `KernelSource::Colocated`.
pub const COLOCATED_KERNEL_DIR: &str = "mvs_kernels";

/// Options for [`ComputeContext::new`].
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Backends to enumerate adapters on.
    pub backends: wgpu::Backends,
    /// Threads per group for every kernel. `None` picks the smaller of 256
    /// and the device limit.
    pub threads_per_group: Option<u32>,
    pub kernel_source: KernelSource,
    /// Request SHADER_INT64 / SHADER_F64 when the adapter has them, which
    /// enables `uniform_random_int64` and `uniform_random_double`.
    pub enable_64bit_kernels: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            backends: wgpu::Backends::PRIMARY,
            threads_per_group: None,
            kernel_source: KernelSource::Embedded,
            enable_64bit_kernels: true,
        }
    }
}

/// Cached adapter information for logging and debugging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// Device, queue and compiled kernel library.
///
/// # Field drop order
/// Struct fields drop top to bottom. The kernel pipelines go first and
/// `_instance` last, so the backend instance outlives every object created
/// from it.
pub struct ComputeContext {
    library: KernelLibrary,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: AdapterInfo,
    threads_per_group: u32,
    _instance: wgpu::Instance,
}

impl ComputeContext {
    /// Create a context with the given configuration.
    ///
    /// # Errors
    /// `NoAdapter` when no adapter exists on the requested backends,
    /// `DeviceRequest` when the device cannot be created,
    /// `WorkgroupTooLarge` for an oversized `threads_per_group`, and
    /// `KernelLibraryIo` / `KernelCompile` when the kernel library cannot be
    /// loaded.
    pub fn new(config: ContextConfig) -> Result<Self> {
        pollster::block_on(Self::init_async(config))
    }

    /// The process-wide context, created with `ContextConfig::default()` on
    /// first use and kept until the process exits.
    ///
    /// A failed initialisation is not cached; the next call tries again.
    pub fn shared() -> Result<&'static ComputeContext> {
        static SHARED: OnceLock<ComputeContext> = OnceLock::new();
        static INIT: Mutex<()> = Mutex::new(());

        if let Some(ctx) = SHARED.get() {
            return Ok(ctx);
        }
        let _guard = INIT.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ctx) = SHARED.get() {
            return Ok(ctx);
        }
        let ctx = ComputeContext::new(ContextConfig::default())?;
        Ok(SHARED.get_or_init(|| ctx))
    }

    async fn init_async(config: ContextConfig) -> Result<Self> {
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
                | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        } else {
            wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: config.backends,
            flags,
            ..Default::default()
        });

        let adapters = instance.enumerate_adapters(config.backends);
        for a in &adapters {
            let info = a.get_info();
            log::info!("compute adapter: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
        }

        // Real hardware first; a software adapter only as a last resort.
        let mut adapters = adapters;
        adapters.sort_by_key(|a| adapter_rank(a.get_info().device_type));
        let adapter = adapters.into_iter().next().ok_or(Error::NoAdapter)?;

        let raw_info = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            vendor: raw_info.vendor,
            device: raw_info.device,
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };
        if raw_info.device_type == wgpu::DeviceType::Cpu {
            log::warn!("using software adapter {adapter_info}; kernels will be slow");
        }

        let supported = adapter.limits();
        let threads_per_group = select_threads_per_group(&supported, config.threads_per_group)?;

        let required_features = if config.enable_64bit_kernels {
            adapter.features() & (wgpu::Features::SHADER_INT64 | wgpu::Features::SHADER_F64)
        } else {
            wgpu::Features::empty()
        };

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("mvs-gpu"),
                    required_features,
                    required_limits: limits_for_adapter(&supported, threads_per_group),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;

        let library = KernelLibrary::build(
            &device,
            &config.kernel_source,
            threads_per_group,
            device.features(),
        )?;
        log::info!(
            "compute context ready: {adapter_info}, {} kernels, {threads_per_group} threads per group",
            library.len(),
        );

        Ok(ComputeContext {
            library,
            device,
            queue,
            adapter_info,
            threads_per_group,
            _instance: instance,
        })
    }

    /// Threads per group every kernel in the library was compiled with.
    pub fn threads_per_group(&self) -> u32 {
        self.threads_per_group
    }

    /// Look up a compiled kernel by its full name, e.g. `"rotate_float"`.
    pub fn kernel(&self, name: &str) -> Option<&Kernel> {
        self.library.get(name)
    }

    pub fn library(&self) -> &KernelLibrary {
        &self.library
    }

    /// Run `f` with validation and out-of-memory error scopes pushed, and
    /// return its result together with the first device error it raised.
    pub(crate) fn capture_errors<R>(&self, f: impl FnOnce() -> R) -> (R, Option<wgpu::Error>) {
        capture_errors(&self.device, f)
    }

    /// Block until all submitted work has finished.
    pub(crate) fn wait_idle(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }
}

impl fmt::Display for ComputeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ComputeContext {{ adapter: {}, kernels: {}, threads per group: {} }}",
            self.adapter_info,
            self.library.len(),
            self.threads_per_group
        )
    }
}

pub(crate) fn capture_errors<R>(
    device: &wgpu::Device,
    f: impl FnOnce() -> R,
) -> (R, Option<wgpu::Error>) {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let out = f();
    let validation = pollster::block_on(device.pop_error_scope());
    let oom = pollster::block_on(device.pop_error_scope());
    (out, validation.or(oom))
}

// ============================================================
// Selection helpers
// ============================================================

/// Lower is better.
fn adapter_rank(device_type: wgpu::DeviceType) -> u8 {
    match device_type {
        wgpu::DeviceType::DiscreteGpu => 0,
        wgpu::DeviceType::IntegratedGpu => 1,
        wgpu::DeviceType::VirtualGpu | wgpu::DeviceType::Other => 2,
        wgpu::DeviceType::Cpu => 3,
    }
}

/// wgpu defaults, except that storage buffers may be as large as the
/// adapter allows (depth/probability volumes for large images exceed the
/// 128 MiB default binding size) and thread groups as large as requested.
fn limits_for_adapter(supported: &wgpu::Limits, threads_per_group: u32) -> wgpu::Limits {
    let defaults = wgpu::Limits::default();
    wgpu::Limits {
        max_storage_buffer_binding_size: supported.max_storage_buffer_binding_size,
        max_buffer_size: supported.max_buffer_size,
        max_compute_invocations_per_workgroup: defaults
            .max_compute_invocations_per_workgroup
            .max(threads_per_group),
        max_compute_workgroup_size_x: defaults.max_compute_workgroup_size_x.max(threads_per_group),
        ..defaults
    }
}

/// Kernels dispatch groups of `(n, 1, 1)` threads, so `n` is bounded by both
/// the total invocation limit and the x-dimension limit.
fn select_threads_per_group(limits: &wgpu::Limits, requested: Option<u32>) -> Result<u32> {
    let max = limits
        .max_compute_invocations_per_workgroup
        .min(limits.max_compute_workgroup_size_x);
    match requested.filter(|&n| n > 0) {
        Some(n) if n > max => Err(Error::WorkgroupTooLarge { requested: n, max }),
        Some(n) => Ok(n),
        None => Ok(DEFAULT_THREADS_PER_GROUP.min(max)),
    }
}

// ============================================================
// Tests
// ============================================================
