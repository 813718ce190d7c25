// mvs-gpu: GPU data layer for patch-match multi-view stereo
//
// Device buffers, kernel dispatch and per-pixel random state for the
// depth/normal/selection-probability volumes of a patch-match stereo solver,
// plus the host-side matrices and sparse consistency encoding the solver
// hands back to its caller.
//
// The propagation sweeps themselves run outside this crate; `PatchMatch`
// owns their state and initialises it.

pub mod consistency;
pub mod element;
pub mod error;
pub mod gpu;
pub mod maps;
pub mod mat;
pub mod patch_match;

pub use element::{Element, KernelElement};
pub use error::{Error, Result};
pub use maps::{DepthMap, NormalMap};
pub use mat::Mat;
pub use patch_match::{PatchMatch, PatchMatchOptions, Problem};
