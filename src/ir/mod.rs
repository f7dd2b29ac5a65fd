//! Intermediate Representation
//!
//! A small SSA-form IR sitting between the AST and native code:
//! - Built from the parsed program by [`lower`]
//! - Executed directly by [`Interpreter`]
//! - Translated to LLVM by the backend when the `llvm` feature is enabled

// Note: instr must come before types to avoid circular deps
mod instr;
mod types;
mod builder;
mod lower;
mod backend;
mod interp;
#[cfg(feature = "llvm")]
mod llvm;

// Re-export in logical order
pub use instr::*;
pub use types::*;
pub use builder::*;
pub use lower::*;
pub use backend::*;
pub use interp::*;
#[cfg(feature = "llvm")]
pub use llvm::*;
