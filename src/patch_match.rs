// patch_match.rs — per-reference-view stereo state.
//
// PatchMatch owns the device volumes a patch-match optimisation works on
// for one reference image of `width × height` pixels and N source images:
//
//   depth            (w, h, 1)  f32   current depth hypothesis
//   normal           (w, h, 3)  f32   current normal hypothesis
//   prev_sel_prob    (w, h, N)  f32   source-image selection probability
//                                     from the previous sweep
//   consistency_mask (w, h, N)  u8    which sources passed the geometric
//                                     consistency test
//
// plus one generator state per pixel. `run` puts the volumes into the state
// a sweep starts from; the sweeps themselves operate on the buffers through
// the `*_mut` accessors. The map accessors copy a volume back to the host.

use crate::consistency;
use crate::error::{Error, Result};
use crate::gpu::{ComputeContext, DeviceBuffer, PrngSeedBuffer};
use crate::maps::{DepthMap, NormalMap};
use crate::mat::Mat;

/// Tunable parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchMatchOptions {
    /// Lower bound of the depth search range.
    pub depth_min: f32,
    /// Upper bound (exclusive) of the depth search range.
    pub depth_max: f32,
    /// Selection probability every source image starts with, in [0, 1].
    pub init_sel_prob: f32,
}

impl Default for PatchMatchOptions {
    fn default() -> Self {
        PatchMatchOptions {
            depth_min: 0.1,
            depth_max: 100.0,
            init_sel_prob: 0.5,
        }
    }
}

impl PatchMatchOptions {
    /// # Errors
    /// `InvalidRange` unless `depth_min < depth_max` (both finite) and
    /// `init_sel_prob` lies in `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        let depth_ok = self.depth_min.is_finite()
            && self.depth_max.is_finite()
            && self.depth_min < self.depth_max;
        if !depth_ok || !(0.0..=1.0).contains(&self.init_sel_prob) {
            return Err(Error::InvalidRange);
        }
        Ok(())
    }
}

/// The reference view and the source views it is matched against.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Problem {
    pub ref_image_idx: i32,
    /// Global image ids; slice `d` of the per-source volumes belongs to
    /// `src_image_idxs[d]`.
    pub src_image_idxs: Vec<i32>,
    pub width: u32,
    pub height: u32,
}

impl Problem {
    pub fn num_src_images(&self) -> u32 {
        self.src_image_idxs.len() as u32
    }
}

pub struct PatchMatch<'ctx> {
    options: PatchMatchOptions,
    problem: Problem,
    depth: DeviceBuffer<'ctx, f32>,
    normal: DeviceBuffer<'ctx, f32>,
    prev_sel_prob: DeviceBuffer<'ctx, f32>,
    consistency_mask: DeviceBuffer<'ctx, u8>,
    seeds: PrngSeedBuffer<'ctx>,
}

impl<'ctx> PatchMatch<'ctx> {
    /// Allocate the state for `problem`. Contents are undefined until `run`.
    pub fn new(
        ctx: &'ctx ComputeContext,
        options: PatchMatchOptions,
        problem: Problem,
    ) -> Result<Self> {
        options.validate()?;
        let (w, h, n) = (problem.width, problem.height, problem.num_src_images());

        let depth = DeviceBuffer::new_2d(ctx, w, h)?;
        let normal = DeviceBuffer::new(ctx, w, h, 3)?;
        let prev_sel_prob = DeviceBuffer::new(ctx, w, h, n)?;
        let consistency_mask = DeviceBuffer::new(ctx, w, h, n)?;
        let seeds = PrngSeedBuffer::new(ctx, w, h)?;

        log::info!(
            "patch match state for image {}: {w}×{h}, {n} source images",
            problem.ref_image_idx
        );
        Ok(PatchMatch {
            options,
            problem,
            depth,
            normal,
            prev_sel_prob,
            consistency_mask,
            seeds,
        })
    }

    /// Initialise the state: random depths in `[depth_min, depth_max)`,
    /// fronto-parallel normals facing the camera, uniform selection
    /// probabilities and an empty consistency mask.
    pub fn run(&mut self) -> Result<()> {
        let PatchMatchOptions { depth_min, depth_max, init_sel_prob } = self.options;
        self.depth
            .fill_with_random_numbers(depth_min, depth_max, &mut self.seeds)?;
        self.normal.fill_with_vector(&[0.0, 0.0, -1.0])?;
        self.prev_sel_prob.fill_with_scalar(init_sel_prob)?;
        self.consistency_mask.clear()?;
        log::debug!("patch match state for image {} initialised", self.problem.ref_image_idx);
        Ok(())
    }

    pub fn options(&self) -> &PatchMatchOptions {
        &self.options
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    // --- Host readback ---

    pub fn depth_map(&self) -> Result<DepthMap> {
        Ok(DepthMap::new(
            self.depth.to_mat()?,
            self.options.depth_min,
            self.options.depth_max,
        ))
    }

    pub fn normal_map(&self) -> Result<NormalMap> {
        Ok(NormalMap::new(self.normal.to_mat()?))
    }

    pub fn sel_prob_map(&self) -> Result<Mat<f32>> {
        self.prev_sel_prob.to_mat()
    }

    /// The consistency mask in sparse form, see [`consistency::encode`].
    pub fn consistent_image_idxs(&self) -> Result<Vec<i32>> {
        let mask = self.consistency_mask.to_mat()?;
        Ok(consistency::encode(&mask, &self.problem.src_image_idxs))
    }

    // --- Device state for the optimisation sweeps ---

    pub fn depth_buffer_mut(&mut self) -> &mut DeviceBuffer<'ctx, f32> {
        &mut self.depth
    }

    pub fn normal_buffer_mut(&mut self) -> &mut DeviceBuffer<'ctx, f32> {
        &mut self.normal
    }

    pub fn sel_prob_buffer_mut(&mut self) -> &mut DeviceBuffer<'ctx, f32> {
        &mut self.prev_sel_prob
    }

    pub fn consistency_mask_mut(&mut self) -> &mut DeviceBuffer<'ctx, u8> {
        &mut self.consistency_mask
    }

    pub fn seeds_mut(&mut self) -> &mut PrngSeedBuffer<'ctx> {
        &mut self.seeds
    }
}
