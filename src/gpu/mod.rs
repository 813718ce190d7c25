// gpu/mod.rs — wgpu compute layer.
//
// One ComputeContext per process (or per test) owns the device, the queue
// and the compiled kernel library. Everything else borrows it:
//
//   ComputeContext ──► KernelLibrary ──► Kernel (one pipeline per entry point)
//        │
//        ├─► DeviceBuffer<T>   typed (width, height, depth) device arrays
//        ├─► PrngSeedBuffer    per-pixel generator state
//        └─► KernelDispatcher  bind named arguments, dispatch, wait
//
// All calls are synchronous. The host-side `Mat` is the reference every
// kernel is validated against element-for-element.

pub mod buffer;
pub mod context;
pub mod dispatch;
pub mod library;
pub mod prng;

pub use buffer::DeviceBuffer;
pub use context::{AdapterInfo, ComputeContext, ContextConfig, KernelSource};
pub use dispatch::KernelDispatcher;
pub use library::{Kernel, KernelLibrary, KernelOp, KernelParam, ParamKind};
pub use prng::PrngSeedBuffer;
