//! AST to IR Lowering
//!
//! Converts a parsed program to IR. The lowerer is a [`Visitor`]: every
//! RPN expression gets its own operand stack, literals and variables push
//! onto it, and operators and calls pop their operands from it.
//!
//! Beyond the user's functions the lowered module contains:
//! - `__rpn_pow`, emitted only when a program exponentiates;
//! - an external declaration of `printf`;
//! - `main`, which prints the result of the entry point and returns 0.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, trace};

use crate::ast::{
    CallExpr, DeclExpr, Function, IfExpr, IntExpr, OpExpr, Operator, Program, RpnExpr, VarExpr, Visitor,
};
use crate::span::Location;
use crate::ENTRY_POINT;

use super::builder::IrBuilder;
use super::instr::CmpOp;
use super::types::{IrType, Module, VReg};

/// Name of the synthesized exponentiation helper
pub const POW_HELPER: &str = "__rpn_pow";
/// Name of the external print routine
pub const PRINTF: &str = "printf";
/// Name of the synthesized entry routine
pub const MAIN: &str = "main";
/// Format string passed to `printf` by `main`
pub const PRINT_FORMAT: &str = "%d\n";

/// Lowering errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LowerError {
    #[error("function {name} is already defined")]
    DuplicateFunction { name: String, location: Location },

    #[error("no such function {name}")]
    UnknownFunction { name: String, location: Location },

    #[error("no such variable {name}")]
    UnknownVariable { name: String, location: Location },

    #[error("not enough items on stack for {op}")]
    StackUnderflow { op: Operator, location: Location },

    #[error("not enough items on stack to call function {name}: expected {expected}, found {found}")]
    NotEnoughArguments {
        name: String,
        expected: usize,
        found: usize,
        location: Location,
    },

    #[error("too many items after RPN expression ({count} left on the stack)")]
    TooManyItems { count: usize, location: Location },

    #[error("no items after RPN expression")]
    NoItems { location: Location },

    #[error("expression outside of an RPN expression")]
    NoOperandStack { location: Location },

    #[error("no entry point {} defined", ENTRY_POINT)]
    MissingEntryPoint { location: Location },

    #[error("entry point {} must not take parameters", ENTRY_POINT)]
    EntryPointParameters { location: Location },
}

impl LowerError {
    pub fn location(&self) -> Location {
        match self {
            LowerError::DuplicateFunction { location, .. }
            | LowerError::UnknownFunction { location, .. }
            | LowerError::UnknownVariable { location, .. }
            | LowerError::StackUnderflow { location, .. }
            | LowerError::NotEnoughArguments { location, .. }
            | LowerError::TooManyItems { location, .. }
            | LowerError::NoItems { location }
            | LowerError::NoOperandStack { location }
            | LowerError::MissingEntryPoint { location }
            | LowerError::EntryPointParameters { location } => *location,
        }
    }
}

/// Lowering result
pub type LowerResult<T> = Result<T, LowerError>;

/// Lowers AST to IR
pub struct Lowerer {
    builder: IrBuilder,
    /// Variables of the function being lowered
    env: HashMap<String, VReg>,
    /// Operand stacks, innermost RPN expression last
    frames: Vec<Vec<VReg>>,
    /// Whether any operator needed the exponentiation helper
    uses_pow: bool,
}

impl Lowerer {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            builder: IrBuilder::new(module_name),
            env: HashMap::new(),
            frames: Vec::new(),
            uses_pow: false,
        }
    }

    /// Lower a whole program into a module
    pub fn lower_program(mut self, program: &Program) -> LowerResult<Module> {
        program.accept(&mut self)?;
        Ok(self.builder.finish())
    }

    /// Innermost operand stack; only [`Lowerer::lower_rpn`] opens one
    fn frame(&mut self, location: Location) -> LowerResult<&mut Vec<VReg>> {
        self.frames.last_mut().ok_or(LowerError::NoOperandStack { location })
    }

    fn push(&mut self, value: VReg, location: Location) -> LowerResult<()> {
        self.frame(location)?.push(value);
        Ok(())
    }

    /// Lower an RPN expression on a fresh operand stack and return the
    /// single value it leaves behind
    fn lower_rpn(&mut self, rpn: &RpnExpr) -> LowerResult<VReg> {
        self.frames.push(Vec::new());
        let result = rpn.accept(self);
        let frame = self.frames.pop().unwrap_or_default();
        result?;

        match frame.as_slice() {
            [value] => Ok(*value),
            [] => Err(LowerError::NoItems { location: rpn.location() }),
            _ => Err(LowerError::TooManyItems {
                count: frame.len(),
                location: rpn.location(),
            }),
        }
    }

    fn lower_operator(&mut self, op: Operator, lhs: VReg, rhs: VReg) -> VReg {
        let compare = |lowerer: &mut Self, cmp: CmpOp| {
            let flag = lowerer.builder.icmp(cmp, lhs, rhs);
            lowerer.builder.zext(flag, IrType::I32)
        };

        match op {
            Operator::Plus => self.builder.add(lhs, rhs),
            Operator::Minus => self.builder.sub(lhs, rhs),
            Operator::Times => self.builder.mul(lhs, rhs),
            Operator::Div => self.builder.udiv(lhs, rhs),
            Operator::Exp => {
                self.uses_pow = true;
                self.builder.call(POW_HELPER, vec![lhs, rhs])
            }
            Operator::Gt => compare(self, CmpOp::Ugt),
            Operator::Lt => compare(self, CmpOp::Ult),
            Operator::Eq => compare(self, CmpOp::Eq),
            Operator::Neq => compare(self, CmpOp::Ne),
        }
    }

    /// `__rpn_pow(base, exponent)`: multiply 1 by `base`, `exponent` times
    fn emit_pow_helper(&mut self) {
        let (params, entry) = self.builder.start_function(POW_HELPER, vec![IrType::I32, IrType::I32], IrType::I32);
        let (base, exponent) = (params[0], params[1]);

        let one = self.builder.const_i32(1);
        let zero = self.builder.const_i32(0);
        let header = self.builder.create_block();
        let body = self.builder.create_block();
        let exit = self.builder.create_block();
        self.builder.br(header);

        self.builder.start_block(header, "loop");
        let result = self.builder.phi(vec![(one, entry)]);
        let counter = self.builder.phi(vec![(exponent, entry)]);
        let more = self.builder.icmp(CmpOp::Sgt, counter, zero);
        self.builder.cond_br(more, body, exit);

        self.builder.start_block(body, "body");
        let product = self.builder.mul(result, base);
        let remaining = self.builder.sub(counter, one);
        self.builder.br(header);
        self.builder.add_phi_incoming(result, product, body);
        self.builder.add_phi_incoming(counter, remaining, body);

        self.builder.start_block(exit, "exit");
        self.builder.ret(Some(result));
        self.builder.finish_function();
    }

    /// `main`: print the entry point's result and return 0
    fn emit_entry(&mut self, program: &Program) -> LowerResult<()> {
        let entry = program
            .function(ENTRY_POINT)
            .ok_or(LowerError::MissingEntryPoint { location: program.location() })?;
        if entry.arity() != 0 {
            return Err(LowerError::EntryPointParameters { location: entry.location() });
        }

        let format = self.builder.add_string_constant(PRINT_FORMAT);
        self.builder.declare_external_vararg(PRINTF, vec![IrType::Ptr], IrType::I32);

        self.builder.start_function(MAIN, vec![], IrType::I32);
        let result = self.builder.call(ENTRY_POINT, vec![]);
        let format_ptr = self.builder.global_string_ptr(&format);
        self.builder.call(PRINTF, vec![format_ptr, result]);
        let status = self.builder.const_i32(0);
        self.builder.ret(Some(status));
        self.builder.finish_function();
        Ok(())
    }
}

impl Visitor for Lowerer {
    type Output = LowerResult<()>;

    fn visit_program(&mut self, program: &Program) -> LowerResult<()> {
        for function in program.functions() {
            function.accept(self)?;
        }
        if self.uses_pow {
            self.emit_pow_helper();
        }
        self.emit_entry(program)?;
        debug!(module = %program.name(), functions = self.builder.module().functions.len(), "lowered program");
        Ok(())
    }

    fn visit_function(&mut self, function: &Function) -> LowerResult<()> {
        if self.builder.function(function.name()).is_some() {
            return Err(LowerError::DuplicateFunction {
                name: function.name().to_string(),
                location: function.location(),
            });
        }

        let (params, _) = self.builder.start_function(function.name(), vec![IrType::I32; function.arity()], IrType::I32);
        self.env.clear();
        for (param, vreg) in function.params().iter().zip(params) {
            self.env.insert(param.name().to_string(), vreg);
        }

        let value = self.lower_rpn(function.body())?;
        self.builder.ret(Some(value));
        self.builder.finish_function();

        debug!(function = %function.name(), arity = function.arity(), "lowered function");
        Ok(())
    }

    fn visit_var(&mut self, var: &VarExpr) -> LowerResult<()> {
        let value = *self.env.get(var.name()).ok_or_else(|| LowerError::UnknownVariable {
            name: var.name().to_string(),
            location: var.location(),
        })?;
        self.push(value, var.location())
    }

    fn visit_rpn(&mut self, rpn: &RpnExpr) -> LowerResult<()> {
        for expr in rpn.exprs() {
            expr.accept(self)?;
        }
        Ok(())
    }

    fn visit_int(&mut self, int: &IntExpr) -> LowerResult<()> {
        let value = self.builder.const_i32(int.value());
        self.push(value, int.location())
    }

    fn visit_call(&mut self, call: &CallExpr) -> LowerResult<()> {
        let arity = match self.builder.function(call.callee()) {
            Some(callee) => callee.arity(),
            None => {
                return Err(LowerError::UnknownFunction {
                    name: call.callee().to_string(),
                    location: call.location(),
                });
            }
        };

        let frame = self.frame(call.location())?;
        if frame.len() < arity {
            return Err(LowerError::NotEnoughArguments {
                name: call.callee().to_string(),
                expected: arity,
                found: frame.len(),
                location: call.location(),
            });
        }
        // The last value pushed becomes the last argument
        let split = frame.len() - arity;
        let args = frame.split_off(split);

        trace!(callee = %call.callee(), ?args, "lowering call");
        let result = self.builder.call(call.callee(), args);
        self.push(result, call.location())
    }

    fn visit_decl(&mut self, decl: &DeclExpr) -> LowerResult<()> {
        let value = self.lower_rpn(decl.init())?;
        // A later declaration of the same name replaces the earlier binding
        self.env.insert(decl.name().to_string(), value);
        self.push(value, decl.location())
    }

    fn visit_op(&mut self, op: &OpExpr) -> LowerResult<()> {
        let frame = self.frame(op.location())?;
        if frame.len() < 2 {
            return Err(LowerError::StackUnderflow {
                op: op.op(),
                location: op.location(),
            });
        }
        let split = frame.len() - 2;
        let operands = frame.split_off(split);
        let (lhs, rhs) = (operands[0], operands[1]);

        let result = self.lower_operator(op.op(), lhs, rhs);
        self.push(result, op.location())
    }

    fn visit_if(&mut self, if_expr: &IfExpr) -> LowerResult<()> {
        let cond = self.lower_rpn(if_expr.condition())?;
        let zero = self.builder.const_i32(0);
        let flag = self.builder.icmp(CmpOp::Ne, cond, zero);

        let then_block = self.builder.create_block();
        let else_block = self.builder.create_block();
        let merge_block = self.builder.create_block();

        self.builder.cond_br(flag, then_block, else_block);

        // Then branch
        self.builder.start_block(then_block, "then");
        let then_val = self.lower_rpn(if_expr.then_branch())?;
        let then_exit = self.builder.current_block_id().unwrap_or(then_block);
        self.builder.br(merge_block);

        // Else branch
        self.builder.start_block(else_block, "else");
        let else_val = self.lower_rpn(if_expr.else_branch())?;
        let else_exit = self.builder.current_block_id().unwrap_or(else_block);
        self.builder.br(merge_block);

        // Merge block with phi
        self.builder.start_block(merge_block, "ifcont");
        let value = self.builder.phi(vec![(then_val, then_exit), (else_val, else_exit)]);
        self.push(value, if_expr.location())
    }
}

/// Lower a program into a module named after it
pub fn lower(program: &Program) -> LowerResult<Module> {
    Lowerer::new(program.name()).lower_program(program)
}

/// Print IR module in human-readable form
pub fn print_module(module: &Module) -> String {
    let mut output = String::new();
    output.push_str(&format!("module {}\n\n", module.name));

    for global in &module.globals {
        let kind = if global.is_const { "const" } else { "global" };
        match &global.init {
            Some(init) => output.push_str(&format!("@{} = {} {} {}\n", global.name, kind, global.ty, init)),
            None => output.push_str(&format!("@{} = {} {}\n", global.name, kind, global.ty)),
        }
    }
    if !module.globals.is_empty() {
        output.push('\n');
    }

    for func in &module.functions {
        if func.is_external {
            output.push_str(&format!("declare {} ", func.name));
        } else {
            output.push_str(&format!("define {} ", func.name));
        }

        output.push('(');
        for (i, (vreg, ty)) in func.params.iter().enumerate() {
            if i > 0 {
                output.push_str(", ");
            }
            if func.is_external {
                output.push_str(&format!("{}", ty));
            } else {
                output.push_str(&format!("{} {}", ty, vreg));
            }
        }
        if func.is_vararg {
            output.push_str(", ...");
        }
        output.push_str(&format!(") -> {}", func.ret_type));

        if func.is_external {
            output.push_str("\n\n");
            continue;
        }

        output.push_str(" {\n");
        for block in &func.blocks {
            match &block.label {
                Some(label) => output.push_str(&format!("  {}: ; {}\n", block.id, label)),
                None => output.push_str(&format!("  {}:\n", block.id)),
            }
            for instr in &block.instructions {
                output.push_str(&format!("    {}\n", instr));
            }
            if let Some(ref term) = block.terminator {
                output.push_str(&format!("    {}\n", term));
            }
        }
        output.push_str("}\n\n");
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, IntExpr};
    use crate::ir::{BlockId, InstrKind, Terminator};
    use crate::parser::parse;

    fn lower_source(source: &str) -> LowerResult<Module> {
        let program = parse(source, "test").expect("source should parse");
        lower(&program)
    }

    fn calls_in<'m>(module: &'m Module, function: &str) -> Vec<(&'m str, Vec<VReg>)> {
        module
            .function(function)
            .unwrap()
            .blocks
            .iter()
            .flat_map(|b| &b.instructions)
            .filter_map(|i| match &i.kind {
                InstrKind::Call { func, args } => Some((func.as_str(), args.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_module_layout() {
        let module = lower_source("li1I l1iI lI1i IIII 111 1111 llli l1ii l1Ii").unwrap();
        let names: Vec<_> = module.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["IIII", PRINTF, MAIN]);

        let printf = module.function(PRINTF).unwrap();
        assert!(printf.is_external && printf.is_vararg);
        assert_eq!(module.globals.len(), 1);

        let main_calls = calls_in(&module, MAIN);
        assert_eq!(main_calls[0].0, ENTRY_POINT);
        assert_eq!(main_calls[1].0, PRINTF);
        assert_eq!(main_calls[1].1.len(), 2);
    }

    #[test]
    fn test_call_arguments_bind_in_push_order() {
        let source = "li1I l1iI
            lI1i IIi li1l ii iI lil1 ii iI llii l1ii
            lI1i IIII 11111 11 IIi l1ii
        l1Ii";
        let module = lower_source(source).unwrap();
        let entry = module.function(ENTRY_POINT).unwrap();
        let consts: Vec<VReg> = entry.blocks[0]
            .instructions
            .iter()
            .filter(|i| matches!(i.kind, InstrKind::Const(_)))
            .filter_map(|i| i.result)
            .collect();
        let calls = calls_in(&module, ENTRY_POINT);
        assert_eq!(calls, vec![("IIi", consts)]);
    }

    #[test]
    fn test_self_recursion_resolves() {
        let source = "li1I l1iI
            lI1i IIi li1l ii lil1 l1i1 li1l ii l1ii lil1 ii 11 llii IIi l1ii l1il 1 l1ii l1ii
            lI1i IIII 1111 IIi l1ii
        l1Ii";
        let module = lower_source(source).unwrap();
        assert!(calls_in(&module, "IIi").iter().any(|(name, _)| *name == "IIi"));
    }

    #[test]
    fn test_unknown_function() {
        let err = lower_source("li1I l1iI lI1i IIII IIi l1ii l1Ii").unwrap_err();
        assert_eq!(err, LowerError::UnknownFunction { name: "IIi".into(), location: Location::new(20, 1, 21) });

        // callees must be defined before use
        let err = lower_source("li1I l1iI lI1i IIII IIi l1ii lI1i IIi 1 l1ii l1Ii").unwrap_err();
        assert!(matches!(err, LowerError::UnknownFunction { .. }));
    }

    #[test]
    fn test_duplicate_function() {
        let err = lower_source("li1I l1iI lI1i IIII 1 l1ii lI1i IIII 11 l1ii l1Ii").unwrap_err();
        assert!(matches!(err, LowerError::DuplicateFunction { ref name, .. } if name == "IIII"));
        assert_eq!(err.location().column, 28);
    }

    #[test]
    fn test_unknown_variable() {
        let err = lower_source("li1I l1iI lI1i IIII ii l1ii l1Ii").unwrap_err();
        assert_eq!(err.to_string(), "no such variable ii");
    }

    #[test]
    fn test_variable_scope_is_per_function() {
        let source = "li1I l1iI
            lI1i IIi li1l ii lil1 ii l1ii
            lI1i IIII ii l1ii
        l1Ii";
        assert!(matches!(lower_source(source), Err(LowerError::UnknownVariable { .. })));
    }

    #[test]
    fn test_stack_discipline_errors() {
        let err = lower_source("li1I l1iI lI1i IIII 11 llli l1ii l1Ii").unwrap_err();
        assert!(matches!(err, LowerError::StackUnderflow { op: Operator::Plus, .. }));

        let err = lower_source("li1I l1iI lI1i IIII 11 111 l1ii l1Ii").unwrap_err();
        assert!(err.to_string().starts_with("too many items after RPN expression"));

        let err = lower_source("li1I l1iI lI1i IIi li1l ii lil1 ii l1ii lI1i IIII IIi l1ii l1Ii").unwrap_err();
        assert!(matches!(err, LowerError::NotEnoughArguments { expected: 1, found: 0, .. }));
    }

    #[test]
    fn test_empty_body_reports_no_items() {
        let location = Location::new(3, 1, 4);
        let body = RpnExpr::new(vec![], location);
        let program = Program::new("test", vec![Function::new(ENTRY_POINT, vec![], body, location)], location);
        assert_eq!(lower(&program).unwrap_err(), LowerError::NoItems { location });
    }

    #[test]
    fn test_entry_point_checks() {
        let body = RpnExpr::new(vec![Expr::Int(IntExpr::new(1, Location::default()))], Location::default());
        let program = Program::new("test", vec![Function::new("IIi", vec![], body.clone(), Location::default())], Location::default());
        assert!(matches!(lower(&program), Err(LowerError::MissingEntryPoint { .. })));

        let params = vec![VarExpr::new("ii", Location::default())];
        let program = Program::new("test", vec![Function::new(ENTRY_POINT, params, body, Location::default())], Location::default());
        assert!(matches!(lower(&program), Err(LowerError::EntryPointParameters { .. })));
    }

    #[test]
    fn test_pow_helper_only_when_used() {
        let plain = lower_source("li1I l1iI lI1i IIII 111 1111 llli l1ii l1Ii").unwrap();
        assert!(plain.function(POW_HELPER).is_none());

        let module = lower_source("li1I l1iI lI1i IIII 111 1111 liii 111 liii l1ii l1Ii").unwrap();
        let count = module.functions.iter().filter(|f| f.name == POW_HELPER).count();
        assert_eq!(count, 1);
        assert_eq!(module.function(POW_HELPER).unwrap().blocks.len(), 4);
    }

    #[test]
    fn test_pow_helper_loops_from_its_own_entry() {
        // A user function before the helper moves its entry block off BlockId(0)
        let source = "li1I l1iI
            lI1i IIi li1l ii lil1 ii ii liil l1ii
            lI1i IIII 11 111 liii IIi l1ii
        l1Ii";
        let module = lower_source(source).unwrap();
        let helper = module.function(POW_HELPER).unwrap();
        let entry = helper.blocks[0].id;
        assert_eq!(helper.blocks[0].label.as_deref(), Some("entry"));
        assert_ne!(entry, BlockId(0));

        let header = &helper.blocks[1];
        for instr in &header.instructions {
            if let InstrKind::Phi(preds) = &instr.kind {
                assert_eq!(preds[0].1, entry);
                assert_eq!(preds[1].1, helper.blocks[2].id);
            }
        }
    }

    #[test]
    fn test_expression_outside_rpn_is_an_error() {
        let location = Location::new(7, 1, 8);
        let mut lowerer = Lowerer::new("test");
        let err = IntExpr::new(1, location).accept(&mut lowerer).unwrap_err();
        assert_eq!(err, LowerError::NoOperandStack { location });
        assert_eq!(err.location(), location);
    }

    #[test]
    fn test_conditional_joins_with_phi() {
        let module =
            lower_source("li1I l1iI lI1i IIII l1i1 li1l 11 l1ii lil1 111 l1ii l1il 1111 l1ii l1ii l1Ii").unwrap();
        let entry = module.function(ENTRY_POINT).unwrap();
        let labels: Vec<_> = entry.blocks.iter().filter_map(|b| b.label.as_deref()).collect();
        assert_eq!(labels, vec!["entry", "then", "else", "ifcont"]);

        let join = &entry.blocks[3];
        assert!(matches!(&join.instructions[0].kind, InstrKind::Phi(preds) if preds.len() == 2));
        assert!(matches!(join.terminator, Some(Terminator::Ret(Some(_)))));
    }

    #[test]
    fn test_comparisons_are_zero_extended() {
        let module = lower_source("li1I l1iI lI1i IIII 111 11 ll1i l1ii l1Ii").unwrap();
        let instrs = &module.function(ENTRY_POINT).unwrap().blocks[0].instructions;
        assert!(matches!(instrs[2].kind, InstrKind::ICmp(CmpOp::Ugt, _, _)));
        assert!(matches!(instrs[3].kind, InstrKind::ZExt(_, IrType::I32)));
    }

    #[test]
    fn test_print_module() {
        let module = lower_source("li1I l1iI lI1i IIII 111 1111 llli l1ii l1Ii").unwrap();
        let text = print_module(&module);
        assert!(text.starts_with("module test\n"));
        assert!(text.contains("define IIII () -> i32 {"));
        assert!(text.contains("declare printf (ptr, ...) -> i32"));
        assert!(text.contains("add %0, %1"));
        assert!(text.contains("call IIII()"));
    }
}
