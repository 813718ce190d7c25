// gpu/buffer.rs — typed 3-D arrays in device memory.
//
// LAYOUT
// ──────
// A DeviceBuffer<T> holds width × height × depth elements, depth outermost,
// tightly packed:
//
//   index(row, col, slice) = (slice * height + row) * width + col
//
// which is exactly the layout of `Mat<T>`. The wgpu buffer is rounded up to
// a whole number of 32-bit words (kernels address it as array<u32>), so an
// i8 buffer of 3 elements occupies 4 bytes on the device.
//
// HOST PITCH
// ──────────
// Host slices may carry padding at the end of each row. Transfers take the
// row pitch in bytes and move `height * depth` rows of `width` elements:
//
//   host (pitch = 5 elements, width = 3):   device:
//     [a b c _ _]                             [a b c d e f ...]
//     [d e f _ _]
//     ...
//
// Padding in the host slice is never read on upload and never written on
// readback.
//
// SYNCHRONISATION
// ───────────────
// Every method blocks until the device has finished, so after any call the
// buffer contents are what the call says they are.

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::mem::size_of;

use crate::element::{element_bits, Element, KernelElement};
use crate::error::{Error, Result};
use crate::gpu::context::ComputeContext;
use crate::gpu::dispatch::KernelDispatcher;
use crate::gpu::library::KernelOp;
use crate::gpu::prng::PrngSeedBuffer;
use crate::mat::Mat;

/// A `(width, height, depth)` array of `T` in device memory.
///
/// Owns its wgpu buffer; dropping the `DeviceBuffer` releases the memory.
pub struct DeviceBuffer<'ctx, T: Element> {
    ctx: &'ctx ComputeContext,
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    depth: u32,
    _marker: PhantomData<T>,
}

impl<'ctx, T: Element> DeviceBuffer<'ctx, T> {
    /// Allocate an uninitialised buffer.
    ///
    /// # Errors
    /// `Allocation` if the device cannot provide the memory (out of memory,
    /// or larger than the device's buffer size limit).
    pub fn new(ctx: &'ctx ComputeContext, width: u32, height: u32, depth: u32) -> Result<Self> {
        let bytes = device_size::<T>(width, height, depth);
        let label = format!("DeviceBuffer<{}> {width}×{height}×{depth}", T::TYPE_NAME);

        let (buffer, error) = ctx.capture_errors(|| {
            ctx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&label),
                size: bytes,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        if let Some(e) = error {
            return Err(Error::Allocation { bytes, message: e.to_string() });
        }

        log::debug!("allocated {label} ({bytes} bytes)");
        Ok(DeviceBuffer {
            ctx,
            buffer,
            width,
            height,
            depth,
            _marker: PhantomData,
        })
    }

    /// Allocate a single-slice buffer.
    pub fn new_2d(ctx: &'ctx ComputeContext, width: u32, height: u32) -> Result<Self> {
        Self::new(ctx, width, height, 1)
    }

    /// Allocate a buffer shaped like `mat` and upload its contents.
    pub fn from_mat(ctx: &'ctx ComputeContext, mat: &Mat<T>) -> Result<Self> {
        let (w, h, d) = mat_dims(mat)?;
        let mut buffer = Self::new(ctx, w, h, d)?;
        buffer.copy_to_device(mat.as_slice(), w as usize * size_of::<T>())?;
        Ok(buffer)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// `(width, height, depth)`.
    #[inline]
    pub fn shape(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.depth)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize * self.depth as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn context(&self) -> &'ctx ComputeContext {
        self.ctx
    }

    /// The underlying wgpu buffer, for binding to custom pipelines.
    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    // -----------------------------------------------------------------------
    // Transfers
    // -----------------------------------------------------------------------

    /// Upload `height * depth` rows of `width` elements from `host`, whose
    /// rows start `pitch` bytes apart.
    ///
    /// # Errors
    /// `HostLayout` if `pitch` is not a whole number of elements, is shorter
    /// than a row, or `host` ends before the last row.
    pub fn copy_to_device(&mut self, host: &[T], pitch: usize) -> Result<()> {
        let rows = self.rows();
        let width = self.width as usize;
        let pitch_elems = host_span::<T>(host.len(), width, rows, pitch)?;

        let mut bytes = Vec::with_capacity(self.buffer.size() as usize);
        for row in 0..rows {
            let start = row * pitch_elems;
            bytes.extend_from_slice(bytemuck::cast_slice(&host[start..start + width]));
        }
        // wgpu copies whole words.
        bytes.resize(bytes.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize), 0);

        if !bytes.is_empty() {
            self.ctx.queue.write_buffer(&self.buffer, 0, &bytes);
            self.ctx.queue.submit(std::iter::empty());
            self.ctx.wait_idle();
        }
        Ok(())
    }

    /// Download into `host`, whose rows start `pitch` bytes apart.
    ///
    /// # Errors
    /// `HostLayout` as for `copy_to_device`; `Readback` if the staging
    /// buffer cannot be mapped.
    pub fn copy_to_host(&self, host: &mut [T], pitch: usize) -> Result<()> {
        let rows = self.rows();
        let width = self.width as usize;
        let pitch_elems = host_span::<T>(host.len(), width, rows, pitch)?;
        if self.is_empty() {
            return Ok(());
        }

        let size = self.buffer.size();
        let staging = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("DeviceBuffer::copy_to_host"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("DeviceBuffer::copy_to_host"),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &staging, 0, size);
        self.ctx.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver outlives the poll below.
            let _ = sender.send(result);
        });
        self.ctx.wait_idle();
        receiver.recv().map_err(|_| Error::Dispatch {
            kernel: "copy_to_host".to_string(),
            message: "map callback never fired".to_string(),
        })??;

        {
            let mapped = slice.get_mapped_range();
            let row_bytes = width * size_of::<T>();
            for row in 0..rows {
                let src = &mapped[row * row_bytes..(row + 1) * row_bytes];
                let start = row * pitch_elems;
                // Copy through the host slice: the mapped range is not
                // guaranteed to be aligned for T.
                bytemuck::cast_slice_mut::<T, u8>(&mut host[start..start + width])
                    .copy_from_slice(src);
            }
        }
        staging.unmap();
        Ok(())
    }

    /// Download into a new `Mat`.
    pub fn to_mat(&self) -> Result<Mat<T>> {
        let (w, h, d) = self.shape();
        let mut mat = Mat::new(w as usize, h as usize, d as usize);
        self.copy_to_host(mat.as_mut_slice(), w as usize * size_of::<T>())?;
        Ok(mat)
    }

    /// Set every byte to zero.
    pub fn clear(&mut self) -> Result<()> {
        let ctx = self.ctx;
        let ((), error) = ctx.capture_errors(|| {
            let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("DeviceBuffer::clear"),
            });
            encoder.clear_buffer(&self.buffer, 0, None);
            ctx.queue.submit(std::iter::once(encoder.finish()));
        });
        if let Some(e) = error {
            return Err(Error::Dispatch { kernel: "clear".to_string(), message: e.to_string() });
        }
        ctx.wait_idle();
        Ok(())
    }

    /// `[width, height, depth]`, the `dims` value every kernel takes.
    pub(crate) fn dims(&self) -> [u32; 3] {
        [self.width, self.height, self.depth]
    }

    fn rows(&self) -> usize {
        self.height as usize * self.depth as usize
    }
}

// ---------------------------------------------------------------------------
// Kernel operations
// ---------------------------------------------------------------------------

impl<'ctx, T: KernelElement> DeviceBuffer<'ctx, T> {
    /// Set every pixel's depth vector to `values`: element `(row, col, d)`
    /// becomes `values[d]`.
    ///
    /// # Errors
    /// `ShapeMismatch` if `values.len() != depth`.
    pub fn fill_with_vector(&mut self, values: &[T]) -> Result<()> {
        if values.len() != self.depth as usize {
            return Err(Error::ShapeMismatch {
                expected: (self.depth, 1, 1),
                actual: (values.len() as u32, 1, 1),
            });
        }
        let ctx = self.ctx;
        let mut aux = DeviceBuffer::<T>::new(ctx, self.depth, 1, 1)?;
        aux.copy_to_device(values, 0)?;

        let dims = self.dims();
        let mut k = KernelDispatcher::open_for::<T>(ctx, KernelOp::FillWithVector)?;
        k.bind_buffer("output", self)?;
        k.bind_buffer("values", &aux)?;
        k.bind_value("dims", &dims)?;
        k.run(dims)
    }

    /// Set every element to `value`.
    pub fn fill_with_scalar(&mut self, value: T) -> Result<()> {
        let dims = self.dims();
        let mut k = KernelDispatcher::open_for::<T>(self.ctx, KernelOp::FillWithScalar)?;
        k.bind_buffer("output", self)?;
        k.bind_value("dims", &dims)?;
        k.bind_value("value", &element_bits(value))?;
        k.run(dims)
    }

    /// Fill with values drawn uniformly from `[min, max)`, advancing the
    /// per-pixel generator state in `seeds`.
    ///
    /// # Errors
    /// `InvalidRange` unless `min < max`, `ShapeMismatch` if `seeds` is not
    /// `(width, height, 1)`, `KernelNotFound` for 64-bit types on devices
    /// without 64-bit shader support.
    pub fn fill_with_random_numbers(
        &mut self,
        min: T,
        max: T,
        seeds: &mut PrngSeedBuffer<'_>,
    ) -> Result<()> {
        if min.partial_cmp(&max) != Some(Ordering::Less) {
            return Err(Error::InvalidRange);
        }
        let expected = (self.width, self.height, 1);
        if seeds.shape() != expected {
            return Err(Error::ShapeMismatch { expected, actual: seeds.shape() });
        }

        let dims = self.dims();
        let mut k = KernelDispatcher::open_for::<T>(self.ctx, KernelOp::UniformRandom)?;
        k.bind_buffer("output", self)?;
        k.bind_buffer("random_state", seeds.buffer())?;
        k.bind_value("dims", &dims)?;
        k.bind_value("min_value", &[min.to_scalar()])?;
        k.bind_value("max_value", &[max.to_scalar()])?;
        k.run([self.width, self.height, 1])
    }

    /// Write the transpose into `output`, which must be `(height, width, depth)`.
    pub fn transpose(&self, output: &mut DeviceBuffer<'_, T>) -> Result<()> {
        self.geometric(KernelOp::Transpose, output, (self.height, self.width, self.depth))
    }

    /// Mirror every row into `output`, which must have this buffer's shape.
    pub fn flip_horizontal(&self, output: &mut DeviceBuffer<'_, T>) -> Result<()> {
        self.geometric(KernelOp::FlipHorizontal, output, self.shape())
    }

    /// Rotate 90° counter-clockwise into `output`, which must be
    /// `(height, width, depth)`. Element `(row, col)` moves to
    /// `(width - 1 - col, row)`.
    pub fn rotate(&self, output: &mut DeviceBuffer<'_, T>) -> Result<()> {
        self.geometric(KernelOp::Rotate, output, (self.height, self.width, self.depth))
    }

    fn geometric(
        &self,
        op: KernelOp,
        output: &mut DeviceBuffer<'_, T>,
        expected: (u32, u32, u32),
    ) -> Result<()> {
        if output.shape() != expected {
            return Err(Error::ShapeMismatch { expected, actual: output.shape() });
        }
        let dims = output.dims();
        let mut k = KernelDispatcher::open_for::<T>(self.ctx, op)?;
        k.bind_buffer("input", self)?;
        k.bind_buffer("output", output)?;
        k.bind_value("dims", &dims)?;
        k.run(dims)
    }
}

impl<T: Element> Drop for DeviceBuffer<'_, T> {
    fn drop(&mut self) {
        self.buffer.destroy();
    }
}

impl<T: Element> std::fmt::Debug for DeviceBuffer<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("type", &T::TYPE_NAME)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("depth", &self.depth)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Device allocation size: whole words, never zero.
fn device_size<T>(width: u32, height: u32, depth: u32) -> u64 {
    let bytes = width as u64 * height as u64 * depth as u64 * size_of::<T>() as u64;
    bytes.next_multiple_of(4).max(4)
}

/// Validate a host slice for a transfer of `rows` rows of `width` elements
/// and return the pitch in elements.
///
/// The pitch is only meaningful between rows, so a single-row transfer
/// accepts any pitch (including 0).
fn host_span<T>(len: usize, width: usize, rows: usize, pitch: usize) -> Result<usize> {
    let elem = size_of::<T>();
    if rows <= 1 {
        if len < rows * width {
            return Err(Error::HostLayout(format!(
                "host slice holds {len} elements, a row needs {width}"
            )));
        }
        return Ok(width);
    }
    if pitch % elem != 0 {
        return Err(Error::HostLayout(format!(
            "pitch {pitch} is not a multiple of the element size {elem}"
        )));
    }
    let pitch_elems = pitch / elem;
    if pitch_elems < width {
        return Err(Error::HostLayout(format!(
            "pitch of {pitch_elems} elements is shorter than a row of {width}"
        )));
    }
    let needed = (rows - 1) * pitch_elems + width;
    if len < needed {
        return Err(Error::HostLayout(format!(
            "host slice holds {len} elements, {rows} rows at this pitch need {needed}"
        )));
    }
    Ok(pitch_elems)
}

fn mat_dims<T: Copy + Default>(mat: &Mat<T>) -> Result<(u32, u32, u32)> {
    let (w, h, d) = mat.shape();
    let to_u32 = |v: usize| {
        u32::try_from(v).map_err(|_| Error::HostLayout(format!("dimension {v} exceeds u32")))
    };
    Ok((to_u32(w)?, to_u32(h)?, to_u32(d)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_size_rounds_to_words() {
        assert_eq!(device_size::<i8>(3, 1, 1), 4);
        assert_eq!(device_size::<i8>(5, 1, 1), 8);
        assert_eq!(device_size::<i16>(3, 1, 1), 8);
        assert_eq!(device_size::<f32>(3, 2, 2), 48);
        assert_eq!(device_size::<f64>(1, 1, 1), 8);
    }

    #[test]
    fn test_device_size_never_zero() {
        assert_eq!(device_size::<f32>(0, 4, 4), 4);
    }

    #[test]
    fn test_host_span_tight() {
        assert_eq!(host_span::<f32>(12, 3, 4, 12).unwrap(), 3);
    }

    #[test]
    fn test_host_span_padded_rows() {
        // pitch 5 elements, last row needs only its width
        assert_eq!(host_span::<i16>(5 * 3 + 3, 3, 4, 10).unwrap(), 5);
        assert!(matches!(host_span::<i16>(5 * 3 + 2, 3, 4, 10), Err(Error::HostLayout(_))));
    }

    #[test]
    fn test_host_span_rejects_bad_pitch() {
        // not a whole number of f32
        assert!(matches!(host_span::<f32>(100, 3, 2, 13), Err(Error::HostLayout(_))));
        // shorter than a row
        assert!(matches!(host_span::<f32>(100, 3, 2, 8), Err(Error::HostLayout(_))));
    }

    #[test]
    fn test_host_span_single_row_ignores_pitch() {
        assert_eq!(host_span::<f64>(3, 3, 1, 0).unwrap(), 3);
        assert!(host_span::<f64>(2, 3, 1, 0).is_err());
    }

    #[test]
    fn test_mat_dims() {
        let m: Mat<u8> = Mat::new(4, 3, 2);
        assert_eq!(mat_dims(&m).unwrap(), (4, 3, 2));
    }
}
