//! IR interpreter
//!
//! Executes a lowered module without native code generation. Used by
//! `rpnc run` and by the test suite to check the meaning of lowered
//! programs. The only external routine understood is `printf`.

use std::collections::HashMap;
use std::io::Write;

use thiserror::Error;
use tracing::trace;

use super::instr::{InstrKind, Terminator};
use super::lower::{MAIN, PRINTF};
use super::types::{BlockId, Constant, Function, Module, VReg};

/// Default maximum call depth.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// Interpreter errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpError {
    #[error("no such function {0}")]
    UnknownFunction(String),

    #[error("{name} expects {expected} arguments, got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("call depth limit of {0} exceeded")]
    CallDepthExceeded(usize),

    #[error("malformed IR in {function}: {message}")]
    Malformed { function: String, message: String },

    #[error("failed to write output: {0}")]
    Io(String),
}

/// A runtime value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i32),
    Bool(bool),
    /// Pointer to the named global
    Global(String),
}

/// Executes functions of one module
pub struct Interpreter<'m> {
    module: &'m Module,
    max_call_depth: usize,
    depth: usize,
    /// Everything printed so far
    output: Vec<u8>,
}

impl<'m> Interpreter<'m> {
    /// Creates an interpreter with the default call depth limit.
    pub fn new(module: &'m Module) -> Self {
        Self::with_call_depth_limit(module, DEFAULT_MAX_CALL_DEPTH)
    }

    /// Creates an interpreter with a custom call depth limit.
    pub fn with_call_depth_limit(module: &'m Module, limit: usize) -> Self {
        Self {
            module,
            max_call_depth: limit,
            depth: 0,
            output: Vec::new(),
        }
    }

    /// Text printed by the program so far
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Call a function by name with integer arguments
    pub fn call(&mut self, name: &str, args: &[i32]) -> Result<i32, InterpError> {
        let args = args.iter().copied().map(Value::Int).collect();
        let value = self.invoke(name, args)?;
        self.expect_int(name, value)
    }

    /// Run the synthesized entry routine, copying its output to `out`
    pub fn run_main(&mut self, out: &mut impl Write) -> Result<i32, InterpError> {
        let start = self.output.len();
        let status = self.call(MAIN, &[]);
        out.write_all(&self.output[start..])
            .and_then(|_| out.flush())
            .map_err(|e| InterpError::Io(e.to_string()))?;
        status
    }

    fn invoke(&mut self, name: &str, args: Vec<Value>) -> Result<Value, InterpError> {
        let module = self.module;
        let func = module
            .function(name)
            .ok_or_else(|| InterpError::UnknownFunction(name.to_string()))?;

        if func.is_external {
            return self.call_external(func, args);
        }
        if func.arity() != args.len() {
            return Err(InterpError::Arity {
                name: name.to_string(),
                expected: func.arity(),
                found: args.len(),
            });
        }
        if self.depth >= self.max_call_depth {
            return Err(InterpError::CallDepthExceeded(self.max_call_depth));
        }

        self.depth += 1;
        let result = self.execute(func, args);
        self.depth -= 1;
        result
    }

    fn execute(&mut self, func: &'m Function, args: Vec<Value>) -> Result<Value, InterpError> {
        let malformed = |message: String| InterpError::Malformed {
            function: func.name.clone(),
            message,
        };

        let mut regs: HashMap<VReg, Value> = func.params.iter().map(|(v, _)| *v).zip(args).collect();
        let mut block = func
            .entry_block()
            .ok_or_else(|| malformed("function has no blocks".to_string()))?;
        let mut prev: Option<BlockId> = None;

        loop {
            trace!(function = %func.name, block = %block.id, "entering block");

            // Phis read their inputs simultaneously on block entry
            let phi_count = block
                .instructions
                .iter()
                .take_while(|i| matches!(i.kind, InstrKind::Phi(_)))
                .count();
            let mut incoming = Vec::with_capacity(phi_count);
            for instr in &block.instructions[..phi_count] {
                if let (Some(result), InstrKind::Phi(preds)) = (instr.result, &instr.kind) {
                    let (vreg, _) = preds
                        .iter()
                        .find(|(_, from)| Some(*from) == prev)
                        .ok_or_else(|| malformed(format!("phi {} has no edge from the previous block", result)))?;
                    incoming.push((result, read(&regs, *vreg).map_err(&malformed)?));
                }
            }
            regs.extend(incoming);

            for instr in &block.instructions[phi_count..] {
                let value = match &instr.kind {
                    InstrKind::Const(Constant::I32(n)) => Value::Int(*n),
                    InstrKind::Const(Constant::String(_)) => {
                        return Err(malformed("string constants must be globals".to_string()));
                    }
                    InstrKind::Add(a, b) => {
                        Value::Int(int(&regs, *a).map_err(&malformed)?.wrapping_add(int(&regs, *b).map_err(&malformed)?))
                    }
                    InstrKind::Sub(a, b) => {
                        Value::Int(int(&regs, *a).map_err(&malformed)?.wrapping_sub(int(&regs, *b).map_err(&malformed)?))
                    }
                    InstrKind::Mul(a, b) => {
                        Value::Int(int(&regs, *a).map_err(&malformed)?.wrapping_mul(int(&regs, *b).map_err(&malformed)?))
                    }
                    InstrKind::UDiv(a, b) => {
                        let lhs = int(&regs, *a).map_err(&malformed)? as u32;
                        let rhs = int(&regs, *b).map_err(&malformed)? as u32;
                        if rhs == 0 {
                            return Err(InterpError::DivisionByZero);
                        }
                        Value::Int((lhs / rhs) as i32)
                    }
                    InstrKind::ICmp(op, a, b) => {
                        let (lhs, rhs) = (int(&regs, *a).map_err(&malformed)?, int(&regs, *b).map_err(&malformed)?);
                        Value::Bool(op.evaluate(lhs, rhs))
                    }
                    InstrKind::ZExt(v, _) => Value::Int(int(&regs, *v).map_err(&malformed)?),
                    InstrKind::Call { func: callee, args } => {
                        let args = args
                            .iter()
                            .map(|arg| read(&regs, *arg))
                            .collect::<Result<Vec<_>, _>>()
                            .map_err(&malformed)?;
                        self.invoke(callee, args)?
                    }
                    InstrKind::GlobalRef(name) => Value::Global(name.clone()),
                    InstrKind::Phi(_) => {
                        return Err(malformed("phi after the start of a block".to_string()));
                    }
                };
                if let Some(result) = instr.result {
                    regs.insert(result, value);
                }
            }

            let next = match &block.terminator {
                Some(Terminator::Ret(Some(v))) => return read(&regs, *v).map_err(&malformed),
                Some(Terminator::Ret(None)) => return Ok(Value::Int(0)),
                Some(Terminator::Br(target)) => *target,
                Some(Terminator::CondBr { cond, then_block, else_block }) => {
                    if int(&regs, *cond).map_err(&malformed)? != 0 {
                        *then_block
                    } else {
                        *else_block
                    }
                }
                None => return Err(malformed(format!("block {} has no terminator", block.id))),
            };

            prev = Some(block.id);
            block = func
                .block(next)
                .ok_or_else(|| malformed(format!("branch to unknown block {}", next)))?;
        }
    }

    fn call_external(&mut self, func: &Function, args: Vec<Value>) -> Result<Value, InterpError> {
        if func.name != PRINTF {
            return Err(InterpError::UnknownFunction(func.name.clone()));
        }

        let mut args = args.into_iter();
        let format = match args.next() {
            Some(Value::Global(name)) => match self.module.global(&name).and_then(|g| g.init.as_ref()) {
                Some(Constant::String(text)) => text.clone(),
                _ => {
                    return Err(InterpError::Malformed {
                        function: PRINTF.to_string(),
                        message: format!("@{} is not a string constant", name),
                    });
                }
            },
            _ => {
                return Err(InterpError::Arity {
                    name: PRINTF.to_string(),
                    expected: 1,
                    found: 0,
                })
            }
        };

        let text = render_printf(&format, args);
        self.output.extend_from_slice(text.as_bytes());
        Ok(Value::Int(text.len() as i32))
    }

    fn expect_int(&self, name: &str, value: Value) -> Result<i32, InterpError> {
        match value {
            Value::Int(n) => Ok(n),
            Value::Bool(b) => Ok(b as i32),
            Value::Global(global) => Err(InterpError::Malformed {
                function: name.to_string(),
                message: format!("returned pointer to @{}", global),
            }),
        }
    }
}

fn read(regs: &HashMap<VReg, Value>, vreg: VReg) -> Result<Value, String> {
    regs.get(&vreg).cloned().ok_or_else(|| format!("use of undefined value {}", vreg))
}

fn int(regs: &HashMap<VReg, Value>, vreg: VReg) -> Result<i32, String> {
    match read(regs, vreg)? {
        Value::Int(n) => Ok(n),
        Value::Bool(b) => Ok(b as i32),
        Value::Global(name) => Err(format!("{} holds pointer @{}, not an integer", vreg, name)),
    }
}

/// Expand `%d` and `%%` directives; other directives are copied verbatim
fn render_printf(format: &str, args: impl Iterator<Item = Value>) -> String {
    let mut args = args;
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('d') => {
                chars.next();
                match args.next() {
                    Some(Value::Int(n)) => out.push_str(&n.to_string()),
                    Some(Value::Bool(b)) => out.push_str(if b { "1" } else { "0" }),
                    Some(Value::Global(name)) => out.push_str(&format!("@{}", name)),
                    None => out.push_str("%d"),
                }
            }
            Some('%') => {
                chars.next();
                out.push('%');
            }
            _ => out.push('%'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrBuilder, IrType};

    #[test]
    fn test_render_printf() {
        let args = vec![Value::Int(-3), Value::Bool(true)];
        assert_eq!(render_printf("%d and %d%%\n", args.into_iter()), "-3 and 1%\n");
        assert_eq!(render_printf("%x %d", std::iter::empty()), "%x %d");
    }

    #[test]
    fn test_call_and_arity() {
        let mut builder = IrBuilder::new("test");
        let (params, _) = builder.start_function("IIi", vec![IrType::I32, IrType::I32], IrType::I32);
        let diff = builder.sub(params[0], params[1]);
        builder.ret(Some(diff));
        let module = builder.finish();

        let mut interp = Interpreter::new(&module);
        assert_eq!(interp.call("IIi", &[10, 4]), Ok(6));
        assert_eq!(
            interp.call("IIi", &[1]),
            Err(InterpError::Arity { name: "IIi".into(), expected: 2, found: 1 })
        );
        assert_eq!(interp.call("III", &[]), Err(InterpError::UnknownFunction("III".into())));
    }

    #[test]
    fn test_unsigned_division() {
        let mut builder = IrBuilder::new("test");
        let (params, _) = builder.start_function("IIi", vec![IrType::I32, IrType::I32], IrType::I32);
        let quotient = builder.udiv(params[0], params[1]);
        builder.ret(Some(quotient));
        let module = builder.finish();

        let mut interp = Interpreter::new(&module);
        assert_eq!(interp.call("IIi", &[7, 2]), Ok(3));
        assert_eq!(interp.call("IIi", &[-2, 2]), Ok(i32::MAX));
        assert_eq!(interp.call("IIi", &[1, 0]), Err(InterpError::DivisionByZero));
    }

    #[test]
    fn test_call_depth_limit() {
        let mut builder = IrBuilder::new("test");
        builder.start_function("IIi", vec![], IrType::I32);
        let result = builder.call("IIi", vec![]);
        builder.ret(Some(result));
        let module = builder.finish();

        let mut interp = Interpreter::with_call_depth_limit(&module, 16);
        assert_eq!(interp.call("IIi", &[]), Err(InterpError::CallDepthExceeded(16)));
    }

    #[test]
    fn test_missing_terminator_is_malformed() {
        let mut builder = IrBuilder::new("test");
        builder.start_function("IIi", vec![], IrType::I32);
        builder.const_i32(1);
        let module = builder.finish();

        let err = Interpreter::new(&module).call("IIi", &[]).unwrap_err();
        assert!(matches!(err, InterpError::Malformed { ref function, .. } if function == "IIi"));
    }

    #[test]
    fn test_printf_writes_output() {
        let mut builder = IrBuilder::new("test");
        let format = builder.add_string_constant("value=%d\n");
        builder.declare_external_vararg(PRINTF, vec![IrType::Ptr], IrType::I32);
        builder.start_function(MAIN, vec![], IrType::I32);
        let ptr = builder.global_string_ptr(&format);
        let value = builder.const_i32(42);
        builder.call(PRINTF, vec![ptr, value]);
        let zero = builder.const_i32(0);
        builder.ret(Some(zero));
        let module = builder.finish();

        let mut interp = Interpreter::new(&module);
        let mut out = Vec::new();
        assert_eq!(interp.run_main(&mut out), Ok(0));
        assert_eq!(String::from_utf8(out).unwrap(), "value=42\n");
        assert_eq!(interp.output(), b"value=42\n");
    }
}
