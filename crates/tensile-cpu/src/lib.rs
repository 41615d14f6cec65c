//! Native CPU execution for tensile functions.
//!
//! The path from graph to result: run the lowering pipeline, generate one C
//! translation unit, hand it to the system C compiler as a shared object,
//! load that object, and call its entry point through a flat array of buffer
//! pointers. [`ExternalFunction`] owns the compile-once state and
//! [`CallFrame`] owns the per-invocation buffers.

pub mod codegen;

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io;
use std::os::raw::c_void;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::Arc;

use libloading::Library;
use thiserror::Error;
use tensile::passes::GraphValidationError;
use tensile::{
    assign_slots, profiling, DType, Function, GraphError, Literal, PassManager, Shape,
    SlotAssignment, ValueType,
};

pub use crate::codegen::{
    generate_unit, CodeUnit, CodegenDispatchError, CodegenError, ENTRY_SYMBOL,
};

/// ABI of the generated entry point: one flat array of slot base pointers,
/// parameters first, then results, then temporaries. A nonzero return is a
/// failure.
pub type Entrypoint = unsafe extern "C" fn(*const *mut c_void) -> i32;

/// Dense host memory for one tensor value, packed little-endian in row-major
/// element order.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseBuffer {
    ty: ValueType,
    bytes: Vec<u8>,
}

impl DenseBuffer {
    pub fn zeroed(ty: ValueType) -> Result<Self, GraphError> {
        let byte_len = ty
            .byte_len()
            .ok_or_else(|| GraphError::OversizedType { ty: ty.clone() })?;
        let bytes = vec![0u8; byte_len];
        Ok(Self { ty, bytes })
    }

    pub fn from_literal(literal: &Literal) -> Self {
        Self {
            ty: literal.ty.clone(),
            bytes: literal.bytes.to_vec(),
        }
    }

    pub fn from_f32(shape: impl Into<Shape>, values: &[f32]) -> Result<Self, GraphError> {
        Ok(Self::from_literal(&Literal::from_f32(shape, values)?))
    }

    pub fn from_f64(shape: impl Into<Shape>, values: &[f64]) -> Result<Self, GraphError> {
        Ok(Self::from_literal(&Literal::from_f64(shape, values)?))
    }

    pub fn from_i32(shape: impl Into<Shape>, values: &[i32]) -> Result<Self, GraphError> {
        Ok(Self::from_literal(&Literal::from_i32(shape, values)?))
    }

    pub fn from_i64(shape: impl Into<Shape>, values: &[i64]) -> Result<Self, GraphError> {
        Ok(Self::from_literal(&Literal::from_i64(shape, values)?))
    }

    pub fn ty(&self) -> &ValueType {
        &self.ty
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Elements as `f32`. The buffer must hold `F32` data.
    pub fn f32_values(&self) -> Vec<f32> {
        assert_eq!(self.ty.dtype, DType::F32, "buffer holds {}", self.ty);
        self.bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Elements as `f64`. The buffer must hold `F64` data.
    pub fn f64_values(&self) -> Vec<f64> {
        assert_eq!(self.ty.dtype, DType::F64, "buffer holds {}", self.ty);
        self.bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect()
    }

    /// Elements as `i32`. The buffer must hold `I32` data.
    pub fn i32_values(&self) -> Vec<i32> {
        assert_eq!(self.ty.dtype, DType::I32, "buffer holds {}", self.ty);
        self.bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Elements as `i64`. The buffer must hold `I64` data.
    pub fn i64_values(&self) -> Vec<i64> {
        assert_eq!(self.ty.dtype, DType::I64, "buffer holds {}", self.ty);
        self.bytes
            .chunks_exact(8)
            .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect()
    }
}

/// Failures from the artifact store, the external C compiler, and the
/// dynamic loader.
#[derive(Debug, Error)]
pub enum CompileToolchainError {
    #[error("failed to run `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` exited with {status}:\n{stderr}")]
    Compiler {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("failed to write artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to load compiled library {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("compiled library exports no `{symbol}` symbol: {source}")]
    MissingSymbol {
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },
}

/// Any failure on the way from a function value to a loaded entry point.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Validation(#[from] GraphValidationError),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
    #[error(transparent)]
    Toolchain(#[from] CompileToolchainError),
}

/// Per-call failures raised by [`CallFrame::call`].
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("expected {expected} input buffers, got {got}")]
    InputArity { expected: usize, got: usize },
    #[error("expected {expected} output buffers, got {got}")]
    OutputArity { expected: usize, got: usize },
    #[error("input {index} is {got}, the parameter expects {expected}")]
    InputType {
        index: usize,
        expected: ValueType,
        got: ValueType,
    },
    #[error("output {index} is {got}, the result expects {expected}")]
    OutputType {
        index: usize,
        expected: ValueType,
        got: ValueType,
    },
    #[error("entry point returned nonzero status {status}")]
    EntryStatus { status: i32 },
}

fn toolchain_command() -> String {
    std::env::var("TENSILE_CC")
        .or_else(|_| std::env::var("CC"))
        .unwrap_or_else(|_| "cc".to_string())
}

fn artifact_dir() -> PathBuf {
    match std::env::var_os("TENSILE_ARTIFACT_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::temp_dir().join("tensile"),
    }
}

fn lib_ext() -> &'static str {
    if cfg!(target_os = "macos") {
        ".dylib"
    } else if cfg!(target_os = "windows") {
        ".dll"
    } else {
        ".so"
    }
}

/// Stable hash of the generated source, used to key on-disk artifacts.
fn source_fingerprint(source: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    hasher.finish()
}

fn compile_c(src: &Path, out: &Path) -> Result<(), CompileToolchainError> {
    let command = toolchain_command();
    let mut cmd = Command::new(&command);
    if cfg!(target_os = "macos") {
        cmd.arg("-dynamiclib");
    } else {
        cmd.arg("-shared");
    }
    cmd.arg("-fPIC");
    cmd.arg("-O2");
    cmd.arg("-o").arg(out).arg(src);
    cmd.arg("-lm");
    let output = cmd.output().map_err(|source| CompileToolchainError::Io {
        command: command.clone(),
        source,
    })?;
    if !output.status.success() {
        return Err(CompileToolchainError::Compiler {
            command,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}

struct CompiledUnit {
    _lib: Library,
    entry: Entrypoint,
}

/// Writes the generated source to the artifact directory, compiles it to a
/// shared object, loads it, and resolves the entry symbol.
///
/// Artifacts are named `<name>_<fingerprint>`, so two functions that share a
/// name but differ in body never share a path. An artifact that already
/// exists was built from identical source; the write and the compiler run
/// are skipped.
fn load_unit(name: &str, unit: &CodeUnit) -> Result<CompiledUnit, CompileToolchainError> {
    let dir = artifact_dir();
    fs::create_dir_all(&dir).map_err(|source| CompileToolchainError::Artifact {
        path: dir.clone(),
        source,
    })?;
    let fingerprint = source_fingerprint(&unit.source);
    let src_path = dir.join(format!("{name}_{fingerprint:016x}.c"));
    let lib_path = dir.join(format!("{name}_{fingerprint:016x}{}", lib_ext()));
    if !lib_path.exists() {
        fs::write(&src_path, &unit.source).map_err(|source| CompileToolchainError::Artifact {
            path: src_path.clone(),
            source,
        })?;
        let _t = profiling::phase("cc");
        compile_c(&src_path, &lib_path)?;
    }
    let _t = profiling::phase("load");
    let lib = unsafe { Library::new(&lib_path) }.map_err(|source| CompileToolchainError::Load {
        path: lib_path.clone(),
        source,
    })?;
    let entry = unsafe { lib.get::<Entrypoint>(unit.symbol.as_bytes()) }
        .map(|symbol| *symbol)
        .map_err(|source| CompileToolchainError::MissingSymbol {
            symbol: unit.symbol,
            source,
        })?;
    Ok(CompiledUnit { _lib: lib, entry })
}

struct Compiled {
    slots: SlotAssignment,
    source: String,
    unit: Arc<CompiledUnit>,
}

/// A function together with its compiled native form.
///
/// Compilation runs at most once per value; later calls reuse the loaded
/// unit. Compiling takes `&mut self`, so two compilations of the same value
/// cannot race by construction.
pub struct ExternalFunction {
    function: Function,
    compiled: Option<Compiled>,
}

impl ExternalFunction {
    pub fn new(function: Function) -> Self {
        Self {
            function,
            compiled: None,
        }
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn name(&self) -> &str {
        self.function.name()
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    /// Generated C source, available once compilation has run.
    pub fn source(&self) -> Option<&str> {
        self.compiled.as_ref().map(|c| c.source.as_str())
    }

    /// Slot table of the compiled unit, available once compilation has run.
    pub fn slots(&self) -> Option<&SlotAssignment> {
        self.compiled.as_ref().map(|c| &c.slots)
    }

    /// Runs the lowering pipeline, generates C, invokes the toolchain, and
    /// loads the artifact. A second call is a no-op.
    pub fn compile(&mut self) -> Result<(), CompileError> {
        if self.compiled.is_some() {
            return Ok(());
        }
        let cx = {
            let _t = profiling::phase("pipeline");
            PassManager::with_default_passes().run(&mut self.function)?
        };
        let slots = {
            let _t = profiling::phase("slots");
            assign_slots(&self.function, cx.order())?
        };
        let unit = {
            let _t = profiling::phase("codegen");
            codegen::generate_unit(&self.function, cx.order(), &slots)?
        };
        let loaded = load_unit(self.function.name(), &unit)?;
        self.compiled = Some(Compiled {
            slots,
            source: unit.source,
            unit: Arc::new(loaded),
        });
        Ok(())
    }

    /// Compiles on first use and builds a frame with freshly allocated
    /// temporaries.
    pub fn make_call_frame(&mut self) -> Result<CallFrame, CompileError> {
        self.compile()?;
        let compiled = self
            .compiled
            .as_ref()
            .expect("compile() populates the unit");
        Ok(CallFrame::new(compiled)?)
    }
}

/// Reusable invocation state for one compiled function.
///
/// The frame owns one buffer per temporary slot, allocated when the frame is
/// made and reused by every call. Callers keep ownership of input and output
/// buffers. `call` takes `&mut self`; a frame cannot be invoked twice
/// concurrently.
pub struct CallFrame {
    unit: Arc<CompiledUnit>,
    input_tys: Vec<ValueType>,
    output_tys: Vec<ValueType>,
    temporaries: Vec<DenseBuffer>,
}

impl CallFrame {
    fn new(compiled: &Compiled) -> Result<Self, GraphError> {
        let slots = &compiled.slots;
        let views = slots.views();
        let input_tys = views[..slots.n_inputs()]
            .iter()
            .map(|view| view.ty.clone())
            .collect();
        let output_tys = views[slots.n_inputs()..slots.n_inputs() + slots.n_outputs()]
            .iter()
            .map(|view| view.ty.clone())
            .collect();
        let temporaries = slots
            .temporaries()
            .iter()
            .map(|view| DenseBuffer::zeroed(view.ty.clone()))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            unit: Arc::clone(&compiled.unit),
            input_tys,
            output_tys,
            temporaries,
        })
    }

    pub fn n_inputs(&self) -> usize {
        self.input_tys.len()
    }

    pub fn n_outputs(&self) -> usize {
        self.output_tys.len()
    }

    /// Runs the compiled function over the given buffers.
    ///
    /// Inputs are read-only; outputs are written in place. Buffer counts and
    /// value types must match the function's parameters and results exactly.
    pub fn call(
        &mut self,
        inputs: &[&DenseBuffer],
        outputs: &mut [DenseBuffer],
    ) -> Result<(), FrameError> {
        if inputs.len() != self.input_tys.len() {
            return Err(FrameError::InputArity {
                expected: self.input_tys.len(),
                got: inputs.len(),
            });
        }
        if outputs.len() != self.output_tys.len() {
            return Err(FrameError::OutputArity {
                expected: self.output_tys.len(),
                got: outputs.len(),
            });
        }
        for (index, (buffer, expected)) in inputs.iter().zip(&self.input_tys).enumerate() {
            if buffer.ty != *expected {
                return Err(FrameError::InputType {
                    index,
                    expected: expected.clone(),
                    got: buffer.ty.clone(),
                });
            }
        }
        for (index, (buffer, expected)) in outputs.iter().zip(&self.output_tys).enumerate() {
            if buffer.ty != *expected {
                return Err(FrameError::OutputType {
                    index,
                    expected: expected.clone(),
                    got: buffer.ty.clone(),
                });
            }
        }

        let mut slots: Vec<*mut c_void> =
            Vec::with_capacity(inputs.len() + outputs.len() + self.temporaries.len());
        for buffer in inputs {
            slots.push(buffer.bytes.as_ptr() as *mut c_void);
        }
        for buffer in outputs.iter_mut() {
            slots.push(buffer.bytes.as_mut_ptr().cast());
        }
        for buffer in self.temporaries.iter_mut() {
            slots.push(buffer.bytes.as_mut_ptr().cast());
        }

        // Every pointer in `slots` stays valid for the whole invocation; the
        // entry only writes through non-parameter slots.
        let status = unsafe { (self.unit.entry)(slots.as_ptr()) };
        if status != 0 {
            return Err(FrameError::EntryStatus { status });
        }
        Ok(())
    }
}
