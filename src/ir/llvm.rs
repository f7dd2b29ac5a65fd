//! LLVM Backend
//!
//! Converts IR to LLVM IR using inkwell and writes object or assembly files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use inkwell::basic_block::BasicBlock as LLVMBasicBlock;
use inkwell::builder::{Builder, BuilderError};
use inkwell::context::Context;
use inkwell::module::{Linkage, Module as LLVMModule};
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::{CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine};
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum};
use inkwell::values::{BasicMetadataValueEnum, BasicValue, BasicValueEnum, PhiValue};
use inkwell::{AddressSpace, IntPredicate, OptimizationLevel};
use tracing::debug;

use super::backend::{output_path, BackendError, OptLevel, OutputKind};
use super::{BasicBlock, BlockId, CmpOp, Constant, Function, Global, InstrKind, Instruction, IrType, Module, Terminator, VReg};

impl From<BuilderError> for BackendError {
    fn from(err: BuilderError) -> Self {
        BackendError::Codegen(err.to_string())
    }
}

/// LLVM code generator for one module
pub struct LlvmBackend<'ctx> {
    name: String,
    context: &'ctx Context,
    module: LLVMModule<'ctx>,
    builder: Builder<'ctx>,
    /// Map from VReg to LLVM values
    values: HashMap<VReg, BasicValueEnum<'ctx>>,
    /// Map from block IDs to LLVM blocks
    blocks: HashMap<BlockId, LLVMBasicBlock<'ctx>>,
    /// Phi nodes whose incoming edges are added once the whole function exists
    pending_phis: Vec<(PhiValue<'ctx>, Vec<(VReg, BlockId)>)>,
}

impl<'ctx> LlvmBackend<'ctx> {
    pub fn new(context: &'ctx Context, module_name: &str) -> Self {
        Self {
            name: module_name.to_string(),
            context,
            module: context.create_module(module_name),
            builder: context.create_builder(),
            values: HashMap::new(),
            blocks: HashMap::new(),
            pending_phis: Vec::new(),
        }
    }

    /// Translate an IR module to LLVM IR
    pub fn compile_module(&mut self, ir_module: &Module) -> Result<(), BackendError> {
        for global in &ir_module.globals {
            self.declare_global(global);
        }

        // Declare everything first so calls may refer forward
        for func in &ir_module.functions {
            self.declare_function(func);
        }

        for func in &ir_module.functions {
            if !func.is_external {
                self.compile_function(func)?;
            }
        }
        Ok(())
    }

    fn declare_global(&mut self, global: &Global) {
        match &global.init {
            Some(Constant::String(s)) => {
                let value = self.context.const_string(s.as_bytes(), true);
                let global_val = self.module.add_global(value.get_type(), None, &global.name);
                global_val.set_initializer(&value);
                global_val.set_constant(global.is_const);
                global_val.set_linkage(Linkage::Private);
                global_val.set_unnamed_addr(true);
            }
            Some(constant) => {
                let value = self.compile_constant(constant);
                let global_val = self.module.add_global(value.get_type(), None, &global.name);
                global_val.set_initializer(&value);
                global_val.set_constant(global.is_const);
            }
            None => {
                if let Some(ty) = self.convert_type(global.ty) {
                    self.module.add_global(ty, None, &global.name);
                }
            }
        }
    }

    /// Declare a function (creates the function signature)
    fn declare_function(&mut self, func: &Function) {
        let param_types: Vec<BasicMetadataTypeEnum<'ctx>> = func
            .params
            .iter()
            .filter_map(|(_, ty)| self.convert_type(*ty).map(|t| t.into()))
            .collect();

        let fn_type = match self.convert_type(func.ret_type) {
            Some(ty) => ty.fn_type(&param_types, func.is_vararg),
            None => self.context.void_type().fn_type(&param_types, func.is_vararg),
        };

        self.module.add_function(&func.name, fn_type, None);
    }

    /// Compile a function body
    fn compile_function(&mut self, func: &Function) -> Result<(), BackendError> {
        self.values.clear();
        self.blocks.clear();
        self.pending_phis.clear();

        let llvm_fn = self
            .module
            .get_function(&func.name)
            .ok_or_else(|| BackendError::Codegen(format!("function {} was not declared", func.name)))?;

        // Create all basic blocks first
        for block in &func.blocks {
            let default_label = block.id.to_string();
            let label = block.label.as_deref().unwrap_or(&default_label);
            let llvm_block = self.context.append_basic_block(llvm_fn, label);
            self.blocks.insert(block.id, llvm_block);
        }

        // Store parameter values
        for (i, (vreg, _)) in func.params.iter().enumerate() {
            let param = llvm_fn
                .get_nth_param(i as u32)
                .ok_or_else(|| BackendError::Codegen(format!("{} has no parameter {}", func.name, i)))?;
            self.values.insert(*vreg, param);
        }

        for block in &func.blocks {
            self.compile_block(block)?;
        }

        // Back edges refer to values defined after the phi
        for (phi, preds) in std::mem::take(&mut self.pending_phis) {
            for (vreg, block_id) in preds {
                let value = self.value(vreg)?;
                let block = self.block(block_id)?;
                phi.add_incoming(&[(&value as &dyn BasicValue<'ctx>, block)]);
            }
        }

        debug!(function = %func.name, blocks = func.blocks.len(), "generated LLVM function");
        Ok(())
    }

    fn compile_block(&mut self, block: &BasicBlock) -> Result<(), BackendError> {
        let llvm_block = self.block(block.id)?;
        self.builder.position_at_end(llvm_block);

        for instr in &block.instructions {
            self.compile_instruction(instr)?;
        }

        match &block.terminator {
            Some(term) => self.compile_terminator(term),
            None => Err(BackendError::Codegen(format!("block {} has no terminator", block.id))),
        }
    }

    /// Compile a single instruction
    fn compile_instruction(&mut self, instr: &Instruction) -> Result<(), BackendError> {
        let value: Option<BasicValueEnum<'ctx>> = match &instr.kind {
            InstrKind::Const(c) => Some(self.compile_constant(c)),

            // Arithmetic
            InstrKind::Add(a, b) => {
                let (lhs, rhs) = (self.int(*a)?, self.int(*b)?);
                Some(self.builder.build_int_add(lhs, rhs, "add")?.into())
            }
            InstrKind::Sub(a, b) => {
                let (lhs, rhs) = (self.int(*a)?, self.int(*b)?);
                Some(self.builder.build_int_sub(lhs, rhs, "sub")?.into())
            }
            InstrKind::Mul(a, b) => {
                let (lhs, rhs) = (self.int(*a)?, self.int(*b)?);
                Some(self.builder.build_int_mul(lhs, rhs, "mul")?.into())
            }
            InstrKind::UDiv(a, b) => {
                let (lhs, rhs) = (self.int(*a)?, self.int(*b)?);
                Some(self.builder.build_int_unsigned_div(lhs, rhs, "udiv")?.into())
            }

            // Comparison
            InstrKind::ICmp(op, a, b) => {
                let (lhs, rhs) = (self.int(*a)?, self.int(*b)?);
                Some(self.builder.build_int_compare(convert_cmp_op(*op), lhs, rhs, "icmp")?.into())
            }

            // Conversions
            InstrKind::ZExt(v, ty) => {
                let val = self.int(*v)?;
                let target = self
                    .convert_type(*ty)
                    .filter(|t| t.is_int_type())
                    .ok_or_else(|| BackendError::Codegen(format!("cannot zero extend to {}", ty)))?
                    .into_int_type();
                Some(self.builder.build_int_z_extend(val, target, "zext")?.into())
            }

            // Function calls
            InstrKind::Call { func, args } => {
                let llvm_fn = self
                    .module
                    .get_function(func)
                    .ok_or_else(|| BackendError::Codegen(format!("call to undeclared function {}", func)))?;
                let args = args
                    .iter()
                    .map(|arg| self.value(*arg).map(BasicMetadataValueEnum::from))
                    .collect::<Result<Vec<_>, _>>()?;
                let call = self.builder.build_call(llvm_fn, &args, "call")?;
                call.try_as_basic_value().left()
            }

            InstrKind::Phi(preds) => {
                let ty = preds
                    .iter()
                    .find_map(|(vreg, _)| self.values.get(vreg))
                    .map(|v| v.get_type())
                    .unwrap_or_else(|| self.context.i32_type().into());
                let phi = self.builder.build_phi(ty, "phi")?;
                self.pending_phis.push((phi, preds.clone()));
                Some(phi.as_basic_value())
            }

            InstrKind::GlobalRef(name) => {
                let global = self
                    .module
                    .get_global(name)
                    .ok_or_else(|| BackendError::Codegen(format!("reference to undeclared global {}", name)))?;
                Some(global.as_pointer_value().into())
            }
        };

        if let (Some(result), Some(value)) = (instr.result, value) {
            self.values.insert(result, value);
        }
        Ok(())
    }

    fn compile_terminator(&mut self, term: &Terminator) -> Result<(), BackendError> {
        match term {
            Terminator::Ret(None) => {
                self.builder.build_return(None)?;
            }
            Terminator::Ret(Some(v)) => {
                let val = self.value(*v)?;
                self.builder.build_return(Some(&val))?;
            }
            Terminator::Br(block) => {
                let target = self.block(*block)?;
                self.builder.build_unconditional_branch(target)?;
            }
            Terminator::CondBr { cond, then_block, else_block } => {
                let cond_val = self.int(*cond)?;
                let then_bb = self.block(*then_block)?;
                let else_bb = self.block(*else_block)?;
                self.builder.build_conditional_branch(cond_val, then_bb, else_bb)?;
            }
        }
        Ok(())
    }

    /// Convert a constant to LLVM value
    fn compile_constant(&self, constant: &Constant) -> BasicValueEnum<'ctx> {
        match constant {
            Constant::I32(n) => self.context.i32_type().const_int(*n as u64, true).into(),
            Constant::String(s) => self.context.const_string(s.as_bytes(), true).into(),
        }
    }

    /// Convert IR type to LLVM type
    fn convert_type(&self, ty: IrType) -> Option<BasicTypeEnum<'ctx>> {
        match ty {
            IrType::Void => None,
            IrType::Bool => Some(self.context.bool_type().into()),
            IrType::I8 => Some(self.context.i8_type().into()),
            IrType::I32 => Some(self.context.i32_type().into()),
            IrType::Ptr => Some(self.context.ptr_type(AddressSpace::default()).into()),
        }
    }

    fn value(&self, vreg: VReg) -> Result<BasicValueEnum<'ctx>, BackendError> {
        self.values
            .get(&vreg)
            .copied()
            .ok_or_else(|| BackendError::Codegen(format!("use of undefined value {}", vreg)))
    }

    fn int(&self, vreg: VReg) -> Result<inkwell::values::IntValue<'ctx>, BackendError> {
        match self.value(vreg)? {
            BasicValueEnum::IntValue(v) => Ok(v),
            _ => Err(BackendError::Codegen(format!("{} is not an integer", vreg))),
        }
    }

    fn block(&self, id: BlockId) -> Result<LLVMBasicBlock<'ctx>, BackendError> {
        self.blocks
            .get(&id)
            .copied()
            .ok_or_else(|| BackendError::Codegen(format!("branch to unknown block {}", id)))
    }

    /// Get the LLVM IR as a string
    pub fn llvm_ir(&self) -> String {
        self.module.print_to_string().to_string()
    }

    /// Verify the module
    pub fn verify(&self) -> Result<(), BackendError> {
        self.module.verify().map_err(|e| BackendError::Verify(e.to_string()))
    }

    /// Optimize and write the module, returning the path written
    ///
    /// Without `output` the file goes to the temporary directory.
    pub fn emit(&self, opt: OptLevel, kind: OutputKind, output: Option<&Path>) -> Result<PathBuf, BackendError> {
        let path = output_path(&self.name, kind, output)?;
        let file_type = match kind {
            OutputKind::Assembly => FileType::Assembly,
            OutputKind::Object => FileType::Object,
            OutputKind::Null => return Err(BackendError::UnsupportedOutputKind(kind)),
        };

        let target_machine = create_target_machine(opt)?;
        self.module
            .run_passes(opt.pipeline(), &target_machine, PassBuilderOptions::create())
            .map_err(|e| BackendError::Codegen(e.to_string()))?;

        target_machine
            .write_to_file(&self.module, file_type, &path)
            .map_err(|e| BackendError::Output {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        debug!(path = %path.display(), %kind, ?opt, "wrote output");
        Ok(path)
    }
}

fn create_target_machine(opt: OptLevel) -> Result<TargetMachine, BackendError> {
    Target::initialize_native(&InitializationConfig::default()).map_err(BackendError::Target)?;

    let target_triple = TargetMachine::get_default_triple();
    let target = Target::from_triple(&target_triple).map_err(|e| BackendError::Target(e.to_string()))?;

    let opt_level = match opt {
        OptLevel::None => OptimizationLevel::None,
        OptLevel::Less => OptimizationLevel::Less,
        OptLevel::Default => OptimizationLevel::Default,
        OptLevel::Aggressive => OptimizationLevel::Aggressive,
    };

    target
        .create_target_machine(
            &target_triple,
            "generic",
            "",
            opt_level,
            RelocMode::PIC, // Use PIC for PIE executables
            CodeModel::Default,
        )
        .ok_or_else(|| BackendError::TargetMachine(target_triple.as_str().to_string_lossy().into_owned()))
}

/// Convert comparison operator to LLVM int predicate
fn convert_cmp_op(op: CmpOp) -> IntPredicate {
    match op {
        CmpOp::Eq => IntPredicate::EQ,
        CmpOp::Ne => IntPredicate::NE,
        CmpOp::Sgt => IntPredicate::SGT,
        CmpOp::Ult => IntPredicate::ULT,
        CmpOp::Ugt => IntPredicate::UGT,
    }
}

/// Compile, verify and write `ir_module`, returning the path written
pub fn emit_module(ir_module: &Module, opt: OptLevel, kind: OutputKind, output: Option<&Path>) -> Result<PathBuf, BackendError> {
    let context = Context::create();
    let mut backend = LlvmBackend::new(&context, &ir_module.name);
    backend.compile_module(ir_module)?;
    backend.verify()?;
    backend.emit(opt, kind, output)
}

/// Compile and verify `ir_module`, returning its textual LLVM IR
pub fn module_to_llvm_ir(ir_module: &Module) -> Result<String, BackendError> {
    let context = Context::create();
    let mut backend = LlvmBackend::new(&context, &ir_module.name);
    backend.compile_module(ir_module)?;
    backend.verify()?;
    Ok(backend.llvm_ir())
}
