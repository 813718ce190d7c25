// gpu/dispatch.rs — bind named arguments to a kernel and run it.
//
// A KernelDispatcher is opened for one kernel, receives each of the
// kernel's parameters exactly once by name, and is consumed by `run`:
//
//   let mut k = KernelDispatcher::open(ctx, "rotate_float")?;
//   k.bind_buffer("input", &src)?;
//   k.bind_buffer("output", &dst)?;
//   k.bind_value("dims", &[h, w, d])?;
//   k.run([h, w, d])?;
//
// Buffers are borrowed for the dispatcher's lifetime. Values are copied
// into small uniform buffers owned by the dispatcher.
//
// `run` launches one thread per element of `extent`. The groups are laid
// out on as many grid axes as the per-axis limit requires, and kernels
// recover their element from the flat invocation index (see index.wgsl),
// so no single axis of `extent` is bounded by that limit. It submits and
// waits, so results are visible to the next transfer or dispatch.

use bytemuck::Pod;
use wgpu::util::DeviceExt;

use crate::element::{kernel_name, KernelElement};
use crate::error::{Error, Result};
use crate::gpu::buffer::DeviceBuffer;
use crate::gpu::context::ComputeContext;
use crate::gpu::library::{Kernel, KernelOp, KernelParam};

/// Uniform buffer sizes are rounded up to this so vec3 and 8-byte scalars
/// meet the binding's minimum size.
const UNIFORM_ALIGN: usize = 16;

enum Bound<'a> {
    Buffer(&'a wgpu::Buffer),
    Value(wgpu::Buffer),
}

impl Bound<'_> {
    fn buffer(&self) -> &wgpu::Buffer {
        match self {
            Bound::Buffer(b) => b,
            Bound::Value(b) => b,
        }
    }
}

/// A single pending kernel launch.
pub struct KernelDispatcher<'a> {
    ctx: &'a ComputeContext,
    kernel: &'a Kernel,
    bound: Vec<Option<Bound<'a>>>,
}

impl<'a> KernelDispatcher<'a> {
    /// Open the kernel called `name`.
    pub fn open(ctx: &'a ComputeContext, name: &str) -> Result<Self> {
        let kernel = ctx
            .kernel(name)
            .ok_or_else(|| Error::KernelNotFound(name.to_string()))?;
        let bound = kernel.params().iter().map(|_| None).collect();
        Ok(KernelDispatcher { ctx, kernel, bound })
    }

    /// Open the variant of `op` compiled for `T`.
    pub fn open_for<T: KernelElement>(ctx: &'a ComputeContext, op: KernelOp) -> Result<Self> {
        Self::open(ctx, &kernel_name::<T>(op.name()))
    }

    pub fn kernel(&self) -> &Kernel {
        self.kernel
    }

    /// Bind a device buffer to the parameter `name`.
    pub fn bind_buffer<T: crate::element::Element>(
        &mut self,
        name: &str,
        buffer: &'a DeviceBuffer<'_, T>,
    ) -> Result<()> {
        let slot = self.slot(name, true)?;
        self.bound[slot] = Some(Bound::Buffer(buffer.raw()));
        Ok(())
    }

    /// Bind a small inline value (a scalar or a short array) to `name`.
    pub fn bind_value<V: Pod>(&mut self, name: &str, value: &[V]) -> Result<()> {
        let slot = self.slot(name, false)?;
        let contents = uniform_bytes(bytemuck::cast_slice(value));
        let buffer = self
            .ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(name),
                contents: &contents,
                usage: wgpu::BufferUsages::UNIFORM,
            });
        self.bound[slot] = Some(Bound::Value(buffer));
        Ok(())
    }

    /// Launch over `extent = [x, y, z]` and wait for completion.
    ///
    /// # Errors
    /// `KernelArgument` if a parameter is unbound or the extent has more
    /// elements than one launch can address, `Dispatch` if the device
    /// rejects the launch.
    pub fn run(self, extent: [u32; 3]) -> Result<()> {
        let name = self.kernel.name();
        let params = self.kernel.params();

        let mut entries = Vec::with_capacity(params.len());
        for (param, bound) in params.iter().zip(&self.bound) {
            let bound = bound.as_ref().ok_or_else(|| Error::KernelArgument {
                kernel: name.to_string(),
                detail: format!("parameter `{}` was never bound", param.name),
            })?;
            entries.push(wgpu::BindGroupEntry {
                binding: param.binding,
                resource: bound.buffer().as_entire_binding(),
            });
        }

        if extent.contains(&0) {
            log::trace!("{name}: empty extent {extent:?}, nothing to do");
            return Ok(());
        }
        let max = self.ctx.device.limits().max_compute_workgroups_per_dimension;
        let groups = workgroup_grid(extent, self.kernel.threads_per_group(), max).ok_or_else(
            || Error::KernelArgument {
                kernel: name.to_string(),
                detail: format!("extent {extent:?} exceeds what one launch can address"),
            },
        )?;

        let device = &self.ctx.device;
        let ((), error) = self.ctx.capture_errors(|| {
            let pipeline = self.kernel.pipeline();
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(name),
                layout: &pipeline.get_bind_group_layout(0),
                entries: &entries,
            });

            let mut encoder =
                device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(name) });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(name),
                    timestamp_writes: None,
                });
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
            }
            self.ctx.queue.submit(std::iter::once(encoder.finish()));
        });

        if let Some(e) = error {
            return Err(Error::Dispatch { kernel: name.to_string(), message: e.to_string() });
        }
        self.ctx.wait_idle();
        log::trace!("{name}: dispatched {groups:?} groups for extent {extent:?}");
        Ok(())
    }

    fn slot(&self, name: &str, buffer: bool) -> Result<usize> {
        let kernel = self.kernel.name();
        let params = self.kernel.params();
        let slot = find_param(params, name).ok_or_else(|| Error::KernelArgument {
            kernel: kernel.to_string(),
            detail: format!("no parameter named `{name}`"),
        })?;
        let param = &params[slot];
        if param.kind.is_buffer() != buffer {
            let expected = if param.kind.is_buffer() { "a buffer" } else { "a value" };
            return Err(Error::KernelArgument {
                kernel: kernel.to_string(),
                detail: format!("parameter `{name}` expects {expected}"),
            });
        }
        if self.bound[slot].is_some() {
            return Err(Error::KernelArgument {
                kernel: kernel.to_string(),
                detail: format!("parameter `{name}` is already bound"),
            });
        }
        Ok(slot)
    }
}

fn find_param(params: &[KernelParam], name: &str) -> Option<usize> {
    params.iter().position(|p| p.name == name)
}

/// Grid of groups giving every element of `extent` its own thread, with no
/// axis above `max_per_dim`. Filled x first, then y, then z.
///
/// `None` if the element count does not fit a u32 flat index or the groups
/// do not fit the grid.
pub(crate) fn workgroup_grid(
    extent: [u32; 3],
    threads_per_group: u32,
    max_per_dim: u32,
) -> Option<[u32; 3]> {
    let elements = extent.iter().map(|&e| u64::from(e)).product::<u64>();
    let groups = elements.div_ceil(u64::from(threads_per_group));
    let max = u64::from(max_per_dim.max(1));

    let x = groups.min(max);
    let rest = groups.div_ceil(x.max(1));
    let y = rest.min(max);
    let z = rest.div_ceil(y.max(1));

    // The padded thread count must stay addressable as well.
    let threads = x * y * z * u64::from(threads_per_group);
    if elements > u64::from(u32::MAX) || z > max || threads > 1 << 32 {
        return None;
    }
    Some([x as u32, y as u32, z as u32])
}

fn uniform_bytes(raw: &[u8]) -> Vec<u8> {
    let len = raw.len().max(1).next_multiple_of(UNIFORM_ALIGN);
    let mut out = vec![0u8; len];
    out[..raw.len()].copy_from_slice(raw);
    out
}
