//! Code generation backend interface
//!
//! Options and errors shared by every build of the crate. The actual LLVM
//! code generator lives in [`super::llvm`] and is only compiled with the
//! `llvm` feature; without it the entry points here report
//! [`BackendError::Unavailable`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use super::types::Module;

/// Optimization level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    None,
    Less,
    #[default]
    Default,
    Aggressive,
}

impl OptLevel {
    /// Map a numeric `-O` level
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(OptLevel::None),
            1 => Some(OptLevel::Less),
            2 => Some(OptLevel::Default),
            3 => Some(OptLevel::Aggressive),
            _ => None,
        }
    }

    /// New pass manager pipeline for this level
    pub fn pipeline(&self) -> &'static str {
        match self {
            OptLevel::None => "default<O0>",
            OptLevel::Less => "default<O1>",
            OptLevel::Default => "default<O2>",
            OptLevel::Aggressive => "default<O3>",
        }
    }
}

impl FromStr for OptLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim_start_matches("-O")
            .parse::<u8>()
            .ok()
            .and_then(OptLevel::from_level)
            .ok_or_else(|| format!("invalid optimization level `{}` (expected 0-3)", s))
    }
}

/// What kind of file the backend writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Assembly,
    Object,
    /// Compile and discard
    Null,
}

impl OutputKind {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputKind::Assembly => "s",
            OutputKind::Object => "o",
            OutputKind::Null => "null",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutputKind::Assembly => "assembly",
            OutputKind::Object => "object",
            OutputKind::Null => "null",
        };
        write!(f, "{}", s)
    }
}

/// Backend errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("failed to look up target: {0}")]
    Target(String),

    #[error("could not create target machine for {0}")]
    TargetMachine(String),

    #[error("failed to write {}: {message}", path.display())]
    Output { path: PathBuf, message: String },

    #[error("cannot write {0} output to a file")]
    UnsupportedOutputKind(OutputKind),

    #[error("module verification failed: {0}")]
    Verify(String),

    #[error("code generation failed: {0}")]
    Codegen(String),

    #[error("built without LLVM support (rebuild with `--features llvm`)")]
    Unavailable,
}

/// Whether this build can generate native code
pub fn llvm_available() -> bool {
    cfg!(feature = "llvm")
}

/// Resolve where an output of `kind` for `module_name` is written
///
/// Without an explicit path a file `<module>-<pid>.<ext>` in the system
/// temporary directory is used.
pub fn output_path(module_name: &str, kind: OutputKind, output: Option<&Path>) -> Result<PathBuf, BackendError> {
    if kind == OutputKind::Null {
        return Err(BackendError::UnsupportedOutputKind(kind));
    }
    Ok(match output {
        Some(path) => path.to_path_buf(),
        None => std::env::temp_dir().join(format!("{}-{}.{}", module_name, std::process::id(), kind.extension())),
    })
}

/// Compile `module` to native code and write it out, returning the path
/// written
pub fn emit(module: &Module, opt: OptLevel, kind: OutputKind, output: Option<&Path>) -> Result<PathBuf, BackendError> {
    #[cfg(feature = "llvm")]
    {
        super::llvm::emit_module(module, opt, kind, output)
    }

    #[cfg(not(feature = "llvm"))]
    {
        output_path(&module.name, kind, output)?;
        let _ = opt;
        Err(BackendError::Unavailable)
    }
}

/// Render `module` as textual LLVM IR
pub fn llvm_ir(module: &Module) -> Result<String, BackendError> {
    #[cfg(feature = "llvm")]
    {
        super::llvm::module_to_llvm_ir(module)
    }

    #[cfg(not(feature = "llvm"))]
    {
        let _ = module;
        Err(BackendError::Unavailable)
    }
}
