// error.rs — crate-wide error type.
//
// Every failure in the GPU layer is a configuration or resource error that
// aborts the enclosing processing stage. Nothing here is retried; callers
// propagate with `?` and give up on the current reference view.

use std::path::PathBuf;

/// Errors from context creation, kernel dispatch, and device transfers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No compute adapter was found on any of the requested backends.
    #[error("no suitable compute adapter found")]
    NoAdapter,

    /// wgpu refused to create the logical device.
    #[error("device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// Requested thread-group size exceeds the device's invocation limit.
    #[error("thread-group size {requested} exceeds device limit of {max} invocations")]
    WorkgroupTooLarge { requested: u32, max: u32 },

    /// A kernel source file could not be read.
    #[error("failed to read kernel source {path}: {source}")]
    KernelLibraryIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A core kernel module failed shader validation or pipeline creation.
    #[error("kernel module `{module}` failed to compile: {message}")]
    KernelCompile { module: String, message: String },

    /// The requested kernel is not part of the compiled library.
    #[error("kernel `{0}` not found in the kernel library")]
    KernelNotFound(String),

    /// A kernel parameter was unknown, of the wrong kind, bound twice, or
    /// missing at dispatch time.
    #[error("kernel `{kernel}`: {detail}")]
    KernelArgument { kernel: String, detail: String },

    /// Device memory could not be obtained.
    #[error("device allocation of {bytes} bytes failed: {message}")]
    Allocation { bytes: u64, message: String },

    /// The device rejected a dispatch.
    #[error("dispatch of `{kernel}` failed: {message}")]
    Dispatch { kernel: String, message: String },

    /// Mapping a staging buffer for readback failed.
    #[error("device readback failed: {0}")]
    Readback(#[from] wgpu::BufferAsyncError),

    /// Two buffers that must agree in shape do not.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (u32, u32, u32),
        actual: (u32, u32, u32),
    },

    /// A host slice or pitch does not describe the rows being transferred.
    #[error("invalid host layout: {0}")]
    HostLayout(String),

    /// A value range with `min >= max` (or a NaN bound).
    #[error("invalid value range: min must be strictly below max")]
    InvalidRange,

    /// A sparse consistency list ended in the middle of a record.
    #[error("malformed consistency list: truncated record at offset {offset}")]
    MalformedConsistency { offset: usize },
}

/// Shorthand used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
