//! IR Instructions
//!
//! Instruction and terminator definitions.

use super::types::{BlockId, Constant, IrType, VReg};
use std::fmt;

/// An instruction in the IR
#[derive(Debug, Clone)]
pub struct Instruction {
    /// Result register (None for void instructions)
    pub result: Option<VReg>,
    /// The instruction kind
    pub kind: InstrKind,
}

impl Instruction {
    pub fn new(result: Option<VReg>, kind: InstrKind) -> Self {
        Self { result, kind }
    }
}

/// Kinds of instructions
#[derive(Debug, Clone)]
pub enum InstrKind {
    // ============ Constants ============
    /// Load a constant value
    Const(Constant),

    // ============ Arithmetic ============
    // All arithmetic wraps on overflow.
    /// Integer addition
    Add(VReg, VReg),
    /// Integer subtraction
    Sub(VReg, VReg),
    /// Integer multiplication
    Mul(VReg, VReg),
    /// Unsigned integer division
    UDiv(VReg, VReg),

    // ============ Comparison ============
    /// Integer comparison, yields `i1`
    ICmp(CmpOp, VReg, VReg),

    // ============ Conversions ============
    /// Zero extend
    ZExt(VReg, IrType),

    // ============ Function Calls ============
    /// Call a function by name
    Call {
        func: String,
        args: Vec<VReg>,
    },

    // ============ Misc ============
    /// Phi node for SSA form
    Phi(Vec<(VReg, BlockId)>),
    /// Reference to a global (returns pointer to global)
    GlobalRef(String),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Signed greater than
    Sgt,
    /// Unsigned less than
    Ult,
    /// Unsigned greater than
    Ugt,
}

impl CmpOp {
    /// Evaluate the comparison on two 32-bit values
    pub fn evaluate(&self, a: i32, b: i32) -> bool {
        match self {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Sgt => a > b,
            CmpOp::Ult => (a as u32) < (b as u32),
            CmpOp::Ugt => (a as u32) > (b as u32),
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmpOp::Eq => write!(f, "eq"),
            CmpOp::Ne => write!(f, "ne"),
            CmpOp::Sgt => write!(f, "sgt"),
            CmpOp::Ult => write!(f, "ult"),
            CmpOp::Ugt => write!(f, "ugt"),
        }
    }
}

/// Block terminators
#[derive(Debug, Clone)]
pub enum Terminator {
    /// Return from function
    Ret(Option<VReg>),
    /// Unconditional branch
    Br(BlockId),
    /// Conditional branch
    CondBr {
        cond: VReg,
        then_block: BlockId,
        else_block: BlockId,
    },
}

impl Terminator {
    /// Blocks this terminator may transfer control to
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Ret(_) => Vec::new(),
            Terminator::Br(block) => vec![*block],
            Terminator::CondBr { then_block, else_block, .. } => vec![*then_block, *else_block],
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(result) = self.result {
            write!(f, "{} = ", result)?;
        }
        match &self.kind {
            InstrKind::Const(c) => write!(f, "const {}", c),
            InstrKind::Add(a, b) => write!(f, "add {}, {}", a, b),
            InstrKind::Sub(a, b) => write!(f, "sub {}, {}", a, b),
            InstrKind::Mul(a, b) => write!(f, "mul {}, {}", a, b),
            InstrKind::UDiv(a, b) => write!(f, "udiv {}, {}", a, b),
            InstrKind::ICmp(op, a, b) => write!(f, "icmp {} {}, {}", op, a, b),
            InstrKind::ZExt(v, ty) => write!(f, "zext {} to {}", v, ty),
            InstrKind::Call { func, args } => {
                write!(f, "call {}(", func)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            InstrKind::Phi(preds) => {
                write!(f, "phi ")?;
                for (i, (val, block)) in preds.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[{}, {}]", val, block)?;
                }
                Ok(())
            }
            InstrKind::GlobalRef(name) => write!(f, "globalref @{}", name),
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Ret(None) => write!(f, "ret void"),
            Terminator::Ret(Some(v)) => write!(f, "ret {}", v),
            Terminator::Br(block) => write!(f, "br {}", block),
            Terminator::CondBr { cond, then_block, else_block } => {
                write!(f, "br {}, {}, {}", cond, then_block, else_block)
            }
        }
    }
}
