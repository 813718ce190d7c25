// gpu/library.rs — the compiled kernel library.
//
// Kernels live in WGSL modules, one module per operation (plus small shared
// snippets). Every module is compiled once when the ComputeContext is built
// and each entry point becomes a compute pipeline keyed by its name:
//
//   "<operation>_<suffix>"      e.g. "transpose_int8", "uniform_random_float"
//
// A module is assembled from its includes followed by its own body, and the
// `{{WG_SIZE}}` placeholder is replaced with the context's thread-group size
// (naga does not accept `override` expressions in @workgroup_size).
//
// Each operation has a fixed, named parameter list (`KernelOp::params`). The
// binding index of every parameter is part of the WGSL source and of that
// list, and nowhere else: KernelDispatcher binds by name.
//
// Modules that need optional device features (64-bit integer and float
// arithmetic) are skipped when the device lacks the feature; their kernels
// are simply absent and opening them reports KernelNotFound.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::element::KERNEL_SUFFIXES;
use crate::error::{Error, Result};
use crate::gpu::context::{capture_errors, KernelSource, COLOCATED_KERNEL_DIR};

// ---------------------------------------------------------------------------
// Operations and their signatures
// ---------------------------------------------------------------------------

/// The operations the library provides kernels for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelOp {
    FillWithVector,
    FillWithScalar,
    UniformRandom,
    Transpose,
    FlipHorizontal,
    Rotate,
}

/// How a kernel parameter is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Device buffer the kernel only reads.
    ReadBuffer,
    /// Device buffer the kernel writes.
    ReadWriteBuffer,
    /// Small inline value (scalar or short array), passed as a uniform.
    Value,
}

impl ParamKind {
    pub fn is_buffer(self) -> bool {
        !matches!(self, ParamKind::Value)
    }

    /// Whether a kernel may write through this parameter.
    pub fn is_writable(self) -> bool {
        matches!(self, ParamKind::ReadWriteBuffer)
    }
}

/// One named kernel parameter and the binding slot it occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelParam {
    pub name: &'static str,
    pub binding: u32,
    pub kind: ParamKind,
}

const fn param(name: &'static str, binding: u32, kind: ParamKind) -> KernelParam {
    KernelParam { name, binding, kind }
}

const GEOMETRIC_PARAMS: &[KernelParam] = &[
    param("input", 0, ParamKind::ReadBuffer),
    param("output", 1, ParamKind::ReadWriteBuffer),
    param("dims", 2, ParamKind::Value),
];

const FILL_WITH_VECTOR_PARAMS: &[KernelParam] = &[
    param("output", 0, ParamKind::ReadWriteBuffer),
    param("values", 1, ParamKind::ReadBuffer),
    param("dims", 2, ParamKind::Value),
];

const FILL_WITH_SCALAR_PARAMS: &[KernelParam] = &[
    param("output", 0, ParamKind::ReadWriteBuffer),
    param("dims", 1, ParamKind::Value),
    param("value", 2, ParamKind::Value),
];

const UNIFORM_RANDOM_PARAMS: &[KernelParam] = &[
    param("output", 0, ParamKind::ReadWriteBuffer),
    param("random_state", 1, ParamKind::ReadWriteBuffer),
    param("dims", 2, ParamKind::Value),
    param("min_value", 3, ParamKind::Value),
    param("max_value", 4, ParamKind::Value),
];

impl KernelOp {
    pub const ALL: [KernelOp; 6] = [
        KernelOp::FillWithVector,
        KernelOp::FillWithScalar,
        KernelOp::UniformRandom,
        KernelOp::Transpose,
        KernelOp::FlipHorizontal,
        KernelOp::Rotate,
    ];

    /// Operation name, the prefix of every kernel name for this operation.
    pub fn name(self) -> &'static str {
        match self {
            KernelOp::FillWithVector => "fill_with_vector",
            KernelOp::FillWithScalar => "fill_with_scalar",
            KernelOp::UniformRandom => "uniform_random",
            KernelOp::Transpose => "transpose",
            KernelOp::FlipHorizontal => "flip_horizontal",
            KernelOp::Rotate => "rotate",
        }
    }

    /// The operation's parameters, in binding order.
    pub fn params(self) -> &'static [KernelParam] {
        match self {
            KernelOp::FillWithVector => FILL_WITH_VECTOR_PARAMS,
            KernelOp::FillWithScalar => FILL_WITH_SCALAR_PARAMS,
            KernelOp::UniformRandom => UNIFORM_RANDOM_PARAMS,
            KernelOp::Transpose | KernelOp::FlipHorizontal | KernelOp::Rotate => GEOMETRIC_PARAMS,
        }
    }
}

// ---------------------------------------------------------------------------
// Module table
// ---------------------------------------------------------------------------

struct ModuleDef {
    file: &'static str,
    includes: &'static [&'static str],
    op: KernelOp,
    suffixes: &'static [&'static str],
    /// Device features the module needs. Modules with requirements are
    /// optional: skipped when unsupported, tolerated when they fail.
    features: wgpu::Features,
}

const STORE: &str = "store.wgsl";
const LOAD: &str = "load.wgsl";
const RANDOM: &str = "random.wgsl";
const INDEX: &str = "index.wgsl";

const MODULES: &[ModuleDef] = &[
    ModuleDef {
        file: "fill_with_vector.wgsl",
        includes: &[INDEX, STORE, LOAD],
        op: KernelOp::FillWithVector,
        suffixes: &KERNEL_SUFFIXES,
        features: wgpu::Features::empty(),
    },
    ModuleDef {
        file: "fill_with_scalar.wgsl",
        includes: &[INDEX, STORE],
        op: KernelOp::FillWithScalar,
        suffixes: &KERNEL_SUFFIXES,
        features: wgpu::Features::empty(),
    },
    ModuleDef {
        file: "transpose.wgsl",
        includes: &[INDEX, STORE, LOAD],
        op: KernelOp::Transpose,
        suffixes: &KERNEL_SUFFIXES,
        features: wgpu::Features::empty(),
    },
    ModuleDef {
        file: "flip_horizontal.wgsl",
        includes: &[INDEX, STORE, LOAD],
        op: KernelOp::FlipHorizontal,
        suffixes: &KERNEL_SUFFIXES,
        features: wgpu::Features::empty(),
    },
    ModuleDef {
        file: "rotate.wgsl",
        includes: &[INDEX, STORE, LOAD],
        op: KernelOp::Rotate,
        suffixes: &KERNEL_SUFFIXES,
        features: wgpu::Features::empty(),
    },
    ModuleDef {
        file: "uniform_random_int.wgsl",
        includes: &[INDEX, STORE, RANDOM],
        op: KernelOp::UniformRandom,
        suffixes: &["int8", "int16", "int32"],
        features: wgpu::Features::empty(),
    },
    ModuleDef {
        file: "uniform_random_float.wgsl",
        includes: &[INDEX, STORE, RANDOM],
        op: KernelOp::UniformRandom,
        suffixes: &["float"],
        features: wgpu::Features::empty(),
    },
    ModuleDef {
        file: "uniform_random_int64.wgsl",
        includes: &[INDEX, RANDOM],
        op: KernelOp::UniformRandom,
        suffixes: &["int64"],
        features: wgpu::Features::SHADER_INT64,
    },
    ModuleDef {
        file: "uniform_random_double.wgsl",
        includes: &[INDEX, RANDOM],
        op: KernelOp::UniformRandom,
        suffixes: &["double"],
        features: wgpu::Features::SHADER_F64,
    },
];

fn embedded_source(file: &str) -> Option<&'static str> {
    let src = match file {
        "store.wgsl" => include_str!("../shaders/store.wgsl"),
        "load.wgsl" => include_str!("../shaders/load.wgsl"),
        "random.wgsl" => include_str!("../shaders/random.wgsl"),
        "index.wgsl" => include_str!("../shaders/index.wgsl"),
        "fill_with_vector.wgsl" => include_str!("../shaders/fill_with_vector.wgsl"),
        "fill_with_scalar.wgsl" => include_str!("../shaders/fill_with_scalar.wgsl"),
        "transpose.wgsl" => include_str!("../shaders/transpose.wgsl"),
        "flip_horizontal.wgsl" => include_str!("../shaders/flip_horizontal.wgsl"),
        "rotate.wgsl" => include_str!("../shaders/rotate.wgsl"),
        "uniform_random_int.wgsl" => include_str!("../shaders/uniform_random_int.wgsl"),
        "uniform_random_float.wgsl" => include_str!("../shaders/uniform_random_float.wgsl"),
        "uniform_random_int64.wgsl" => include_str!("../shaders/uniform_random_int64.wgsl"),
        "uniform_random_double.wgsl" => include_str!("../shaders/uniform_random_double.wgsl"),
        _ => return None,
    };
    Some(src)
}

impl KernelSource {
    /// Read one WGSL file.
    fn read(&self, file: &str) -> Result<Cow<'static, str>> {
        match self {
            KernelSource::Embedded => embedded_source(file).map(Cow::Borrowed).ok_or_else(|| {
                Error::KernelLibraryIo {
                    path: file.into(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no embedded source"),
                }
            }),
            KernelSource::Colocated => read_file(&colocated_kernel_dir()?, file),
            KernelSource::Directory(dir) => read_file(dir, file),
        }
    }
}

/// `COLOCATED_KERNEL_DIR` next to the running executable.
fn colocated_kernel_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(|source| Error::KernelLibraryIo {
        path: "<current executable>".into(),
        source,
    })?;
    Ok(exe
        .parent()
        .map(|p| p.join(COLOCATED_KERNEL_DIR))
        .unwrap_or_else(|| COLOCATED_KERNEL_DIR.into()))
}

fn read_file(dir: &Path, file: &str) -> Result<Cow<'static, str>> {
    let path = dir.join(file);
    std::fs::read_to_string(&path)
        .map(Cow::Owned)
        .map_err(|source| Error::KernelLibraryIo { path, source })
}

/// Concatenate a module's includes and body and specialise the thread-group
/// size.
fn assemble(source: &KernelSource, def: &ModuleDef, threads_per_group: u32) -> Result<String> {
    let mut wgsl = String::new();
    for part in def.includes.iter().chain(std::iter::once(&def.file)) {
        wgsl.push_str(&source.read(part)?);
        wgsl.push('\n');
    }
    Ok(wgsl.replace("{{WG_SIZE}}", &threads_per_group.to_string()))
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

/// A compiled kernel: one compute pipeline plus what dispatch needs to know.
pub struct Kernel {
    name: String,
    op: KernelOp,
    pipeline: wgpu::ComputePipeline,
    threads_per_group: u32,
}

impl Kernel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> KernelOp {
        self.op
    }

    pub fn params(&self) -> &'static [KernelParam] {
        self.op.params()
    }

    pub fn pipeline(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }

    /// Threads per group this kernel was compiled with.
    pub fn threads_per_group(&self) -> u32 {
        self.threads_per_group
    }
}

/// All kernels, keyed by name.
pub struct KernelLibrary {
    kernels: HashMap<String, Kernel>,
}

impl KernelLibrary {
    pub(crate) fn build(
        device: &wgpu::Device,
        source: &KernelSource,
        threads_per_group: u32,
        features: wgpu::Features,
    ) -> Result<Self> {
        let mut kernels = HashMap::new();

        for def in MODULES {
            let optional = !def.features.is_empty();
            if !features.contains(def.features) {
                log::info!("skipping {}: device lacks {:?}", def.file, def.features);
                continue;
            }

            let wgsl = assemble(source, def, threads_per_group)?;
            let (compiled, error) = capture_errors(device, || compile_module(device, def, wgsl));

            match error {
                None => {
                    for (name, pipeline) in compiled {
                        kernels.insert(
                            name.clone(),
                            Kernel { name, op: def.op, pipeline, threads_per_group },
                        );
                    }
                }
                Some(e) if optional => {
                    log::warn!("optional kernel module {} failed to compile: {e}", def.file);
                }
                Some(e) => {
                    return Err(Error::KernelCompile {
                        module: def.file.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        log::debug!("kernel library: {} pipelines", kernels.len());
        Ok(KernelLibrary { kernels })
    }

    pub fn get(&self, name: &str) -> Option<&Kernel> {
        self.kernels.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kernels.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    /// Kernel names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.kernels.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn compile_module(
    device: &wgpu::Device,
    def: &ModuleDef,
    wgsl: String,
) -> Vec<(String, wgpu::ComputePipeline)> {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(def.file),
        source: wgpu::ShaderSource::Wgsl(wgsl.into()),
    });

    entry_points(def)
        .into_iter()
        .map(|name| {
            // Layout derived from the entry point: each module's bindings
            // are exactly the operation's parameter list.
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&name),
                layout: None,
                module: &module,
                entry_point: &name,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });
            (name, pipeline)
        })
        .collect()
}

fn entry_points(def: &ModuleDef) -> Vec<String> {
    def.suffixes
        .iter()
        .map(|suffix| format!("{}_{suffix}", def.op.name()))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_op_and_suffix_has_a_module() {
        let provided: HashSet<String> = MODULES.iter().flat_map(entry_points).collect();
        for op in KernelOp::ALL {
            for suffix in KERNEL_SUFFIXES {
                let name = format!("{}_{suffix}", op.name());
                assert!(provided.contains(&name), "no module provides {name}");
            }
        }
        assert_eq!(provided.len(), KernelOp::ALL.len() * KERNEL_SUFFIXES.len());
    }

    #[test]
    fn test_embedded_sources_exist() {
        for def in MODULES {
            for file in def.includes.iter().chain(std::iter::once(&def.file)) {
                assert!(embedded_source(file).is_some(), "{file} is not embedded");
            }
        }
    }

    #[test]
    fn test_entry_points_present_in_source() {
        for def in MODULES {
            let wgsl = assemble(&KernelSource::Embedded, def, 64).unwrap();
            for name in entry_points(def) {
                assert!(
                    wgsl.contains(&format!("fn {name}(")),
                    "{} does not define {name}",
                    def.file
                );
            }
        }
    }

    #[test]
    fn test_workgroup_placeholder_replaced() {
        for def in MODULES {
            let wgsl = assemble(&KernelSource::Embedded, def, 128).unwrap();
            assert!(!wgsl.contains("{{WG_SIZE}}"), "{} kept a placeholder", def.file);
            assert!(wgsl.contains("@workgroup_size(128)"));
        }
    }

    #[test]
    fn test_bindings_declared_in_source() {
        for def in MODULES {
            let wgsl = embedded_source(def.file).unwrap();
            for p in def.op.params() {
                let decl = format!("@binding({})", p.binding);
                assert!(wgsl.contains(&decl), "{} is missing {decl} for `{}`", def.file, p.name);
            }
            let unused = format!("@binding({})", def.op.params().len());
            assert!(!wgsl.contains(&unused), "{} declares an extra binding", def.file);
        }
    }

    #[test]
    fn test_param_bindings_are_positional() {
        for op in KernelOp::ALL {
            for (i, p) in op.params().iter().enumerate() {
                assert_eq!(p.binding as usize, i, "{}::{}", op.name(), p.name);
            }
        }
    }

    #[test]
    fn test_directory_source_matches_embedded() {
        let shaders = concat!(env!("CARGO_MANIFEST_DIR"), "/src/shaders");
        let source = KernelSource::Directory(shaders.into());
        for def in MODULES {
            assert_eq!(
                assemble(&source, def, 64).unwrap(),
                assemble(&KernelSource::Embedded, def, 64).unwrap(),
                "{} differs on disk",
                def.file
            );
        }
    }

    #[test]
    fn test_colocated_dir_is_next_to_executable() {
        let exe = std::env::current_exe().unwrap();
        assert_eq!(
            colocated_kernel_dir().unwrap(),
            exe.parent().unwrap().join(COLOCATED_KERNEL_DIR)
        );
    }

    #[test]
    fn test_colocated_source_reads_from_kernel_dir() {
        // Test binaries have no kernel directory beside them.
        let dir = colocated_kernel_dir().unwrap();
        if dir.exists() {
            return;
        }
        match KernelSource::Colocated.read("transpose.wgsl") {
            Err(Error::KernelLibraryIo { path, .. }) => assert_eq!(path, dir.join("transpose.wgsl")),
            other => panic!("expected KernelLibraryIo, got {other:?}"),
        }
    }

    #[test]
    fn test_random_float_kernels_interpolate() {
        let float = embedded_source("uniform_random_float.wgsl").unwrap();
        assert!(float.contains("min_value * (1.0 - u) + max_value * u"));
        let double = embedded_source("uniform_random_double.wgsl").unwrap();
        assert!(double.contains("min_value * (1.0lf - u) + max_value * u"));
        assert!(!float.contains("max_value - min_value)"));
        assert!(!double.contains("max_value - min_value)"));
    }

    #[test]
    fn test_kernels_use_flat_index() {
        for def in MODULES {
            assert!(def.includes.contains(&INDEX), "{} does not include {INDEX}", def.file);
            let wgsl = embedded_source(def.file).unwrap();
            assert!(!wgsl.contains("gid.y"), "{} indexes by grid axis", def.file);
            assert_eq!(
                wgsl.matches("@builtin(num_workgroups)").count(),
                def.suffixes.len(),
                "{}",
                def.file
            );
        }
    }

    #[test]
    fn test_directory_source_missing_file() {
        let source = KernelSource::Directory("/nonexistent/mvs-kernels".into());
        let err = source.read("transpose.wgsl").unwrap_err();
        assert!(matches!(err, Error::KernelLibraryIo { .. }));
    }
}
