// gpu/prng.rs — per-pixel random generator state.
//
// One u32 of PCG state per pixel, seeded on the host. The uniform_random
// kernels read a pixel's state, draw `depth` values from it, and store the
// advanced state, so a PrngSeedBuffer used for several fills keeps producing
// fresh numbers.

use std::ops::Deref;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Result;
use crate::gpu::buffer::DeviceBuffer;
use crate::gpu::context::ComputeContext;

/// A `(width, height)` device buffer of generator states.
pub struct PrngSeedBuffer<'ctx> {
    inner: DeviceBuffer<'ctx, u32>,
}

impl<'ctx> PrngSeedBuffer<'ctx> {
    /// Seed from operating-system entropy.
    pub fn new(ctx: &'ctx ComputeContext, width: u32, height: u32) -> Result<Self> {
        Self::from_rng(ctx, width, height, &mut StdRng::from_entropy())
    }

    /// Seed from `rng`, for reproducible runs.
    pub fn from_rng(
        ctx: &'ctx ComputeContext,
        width: u32,
        height: u32,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        let seeds: Vec<u32> = (0..width as usize * height as usize)
            .map(|_| rng.gen())
            .collect();
        let mut inner = DeviceBuffer::new_2d(ctx, width, height)?;
        inner.copy_to_device(&seeds, width as usize * std::mem::size_of::<u32>())?;
        log::debug!("seeded {width}×{height} generator states");
        Ok(PrngSeedBuffer { inner })
    }

    pub fn buffer(&self) -> &DeviceBuffer<'ctx, u32> {
        &self.inner
    }
}

impl<'ctx> Deref for PrngSeedBuffer<'ctx> {
    type Target = DeviceBuffer<'ctx, u32>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
