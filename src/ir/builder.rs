//! IR Builder
//!
//! Helper for constructing IR instructions and basic blocks.

use super::instr::{CmpOp, InstrKind, Instruction, Terminator};
use super::types::{BasicBlock, BlockId, Constant, Function, Global, IrType, Module, VReg};

/// Builder for constructing IR
pub struct IrBuilder {
    /// Next virtual register ID
    next_vreg: u32,
    /// Next block ID
    next_block: u32,
    /// Next string constant ID
    next_string: u32,
    /// Current module being built
    module: Module,
    /// Current function being built
    current_fn: Option<Function>,
    /// Current block being built
    current_block: Option<BasicBlock>,
}

impl IrBuilder {
    /// Create a new IR builder
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            next_vreg: 0,
            next_block: 0,
            next_string: 0,
            module: Module::new(module_name),
            current_fn: None,
            current_block: None,
        }
    }

    /// Finish building and return the module
    pub fn finish(mut self) -> Module {
        // Finalize any remaining function
        self.finish_function();
        self.module
    }

    /// The module built so far (finished functions only)
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Create a fresh virtual register
    pub fn fresh_vreg(&mut self) -> VReg {
        let vreg = VReg(self.next_vreg);
        self.next_vreg += 1;
        vreg
    }

    /// Create a fresh block ID
    pub fn fresh_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        id
    }

    // ============ Function Building ============

    /// Start building a new function, returning its parameter vregs and
    /// the id of its entry block
    pub fn start_function(
        &mut self,
        name: impl Into<String>,
        params: Vec<IrType>,
        ret_type: IrType,
    ) -> (Vec<VReg>, BlockId) {
        self.finish_function();

        // Create parameter vregs
        let param_vregs: Vec<(VReg, IrType)> = params
            .into_iter()
            .map(|ty| (self.fresh_vreg(), ty))
            .collect();
        let vregs: Vec<VReg> = param_vregs.iter().map(|(v, _)| *v).collect();

        self.current_fn = Some(Function::new(name, param_vregs, ret_type));

        // Create entry block
        let entry = self.fresh_block();
        self.current_block = Some(BasicBlock::new(entry).with_label("entry"));

        (vregs, entry)
    }

    /// Finish the current function
    pub fn finish_function(&mut self) {
        if let Some(block) = self.current_block.take() {
            if let Some(ref mut func) = self.current_fn {
                func.blocks.push(block);
            }
        }
        if let Some(func) = self.current_fn.take() {
            self.module.functions.push(func);
        }
    }

    /// Name of the function under construction
    pub fn current_function_name(&self) -> Option<&str> {
        self.current_fn.as_ref().map(|f| f.name.as_str())
    }

    /// Look up a function, finished or under construction
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.current_fn
            .as_ref()
            .filter(|f| f.name == name)
            .or_else(|| self.module.function(name))
    }

    /// Declare an external variadic function
    pub fn declare_external_vararg(&mut self, name: impl Into<String>, params: Vec<IrType>, ret_type: IrType) {
        let mut func = Function::new(name, vec![], ret_type);
        func.is_external = true;
        func.is_vararg = true;
        // Store param types without vregs for external functions
        func.params = params.into_iter().map(|ty| (VReg(0), ty)).collect();
        self.module.functions.push(func);
    }

    /// Add a NUL-terminated string constant, returning its global name
    pub fn add_string_constant(&mut self, value: &str) -> String {
        let name = format!(".str.{}", self.next_string);
        self.next_string += 1;

        self.module.globals.push(Global {
            name: name.clone(),
            ty: IrType::I8,
            init: Some(Constant::String(value.to_string())),
            is_const: true,
        });

        name
    }

    /// Emit a global string reference (pointer to the first byte)
    pub fn global_string_ptr(&mut self, global_name: &str) -> VReg {
        self.emit_with_result(InstrKind::GlobalRef(global_name.to_string()))
    }

    // ============ Block Building ============

    /// Create a new block and return its ID
    pub fn create_block(&mut self) -> BlockId {
        self.fresh_block()
    }

    /// Start building a block (finishes current block first)
    pub fn start_block(&mut self, id: BlockId, label: &str) {
        if let Some(block) = self.current_block.take() {
            if let Some(ref mut func) = self.current_fn {
                func.blocks.push(block);
            }
        }
        self.current_block = Some(BasicBlock::new(id).with_label(label));
    }

    /// Get the current block ID
    pub fn current_block_id(&self) -> Option<BlockId> {
        self.current_block.as_ref().map(|b| b.id)
    }

    // ============ Instruction Emission ============

    fn emit(&mut self, result: Option<VReg>, kind: InstrKind) -> Option<VReg> {
        if let Some(ref mut block) = self.current_block {
            block.instructions.push(Instruction::new(result, kind));
        }
        result
    }

    fn emit_with_result(&mut self, kind: InstrKind) -> VReg {
        let result = self.fresh_vreg();
        self.emit(Some(result), kind);
        result
    }

    // ============ Constants ============

    /// Emit an i32 constant
    pub fn const_i32(&mut self, value: i32) -> VReg {
        self.emit_with_result(InstrKind::Const(Constant::I32(value)))
    }

    // ============ Arithmetic ============

    pub fn add(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::Add(a, b))
    }

    pub fn sub(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::Sub(a, b))
    }

    pub fn mul(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::Mul(a, b))
    }

    pub fn udiv(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::UDiv(a, b))
    }

    // ============ Comparison ============

    pub fn icmp(&mut self, op: CmpOp, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::ICmp(op, a, b))
    }

    // ============ Conversions ============

    pub fn zext(&mut self, v: VReg, ty: IrType) -> VReg {
        self.emit_with_result(InstrKind::ZExt(v, ty))
    }

    // ============ Calls ============

    pub fn call(&mut self, func: impl Into<String>, args: Vec<VReg>) -> VReg {
        self.emit_with_result(InstrKind::Call {
            func: func.into(),
            args,
        })
    }

    // ============ SSA ============

    pub fn phi(&mut self, preds: Vec<(VReg, BlockId)>) -> VReg {
        self.emit_with_result(InstrKind::Phi(preds))
    }

    /// Add an incoming edge to a phi emitted earlier in the current function
    ///
    /// Returns false if `phi` does not name a phi node of this function.
    pub fn add_phi_incoming(&mut self, phi: VReg, value: VReg, block: BlockId) -> bool {
        let finished = self.current_fn.iter_mut().flat_map(|f| f.blocks.iter_mut());
        for candidate in self.current_block.iter_mut().chain(finished) {
            for instr in &mut candidate.instructions {
                if instr.result == Some(phi) {
                    if let InstrKind::Phi(preds) = &mut instr.kind {
                        preds.push((value, block));
                        return true;
                    }
                    return false;
                }
            }
        }
        false
    }

    // ============ Terminators ============

    pub fn ret(&mut self, value: Option<VReg>) {
        if let Some(ref mut block) = self.current_block {
            block.terminator = Some(Terminator::Ret(value));
        }
    }

    pub fn br(&mut self, target: BlockId) {
        if let Some(ref mut block) = self.current_block {
            block.terminator = Some(Terminator::Br(target));
        }
    }

    pub fn cond_br(&mut self, cond: VReg, then_block: BlockId, else_block: BlockId) {
        if let Some(ref mut block) = self.current_block {
            block.terminator = Some(Terminator::CondBr {
                cond,
                then_block,
                else_block,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_with_params() {
        let mut builder = IrBuilder::new("test");
        let (params, _) = builder.start_function("IIi", vec![IrType::I32, IrType::I32], IrType::I32);
        let sum = builder.add(params[0], params[1]);
        builder.ret(Some(sum));
        assert_eq!(builder.current_function_name(), Some("IIi"));
        assert_eq!(builder.function("IIi").map(Function::arity), Some(2));

        let module = builder.finish();
        let func = module.function("IIi").unwrap();
        assert_eq!(func.params.len(), 2);
        assert_eq!(func.blocks.len(), 1);
        assert_eq!(func.blocks[0].label.as_deref(), Some("entry"));
        assert!(matches!(func.blocks[0].terminator, Some(Terminator::Ret(Some(v))) if v == sum));
    }

    #[test]
    fn test_vregs_unique_across_functions() {
        let mut builder = IrBuilder::new("test");
        let (a, a_entry) = builder.start_function("IIi", vec![IrType::I32], IrType::I32);
        builder.ret(Some(a[0]));
        let (b, b_entry) = builder.start_function("IIl", vec![IrType::I32], IrType::I32);
        assert_ne!(a[0], b[0]);
        assert_ne!(a_entry, b_entry);
        assert_eq!(builder.current_block_id(), Some(b_entry));
        builder.ret(Some(b[0]));

        let module = builder.finish();
        assert_eq!(module.functions.len(), 2);
    }

    #[test]
    fn test_add_phi_incoming_to_finished_block() {
        let mut builder = IrBuilder::new("test");
        let (_, entry) = builder.start_function("IIII", vec![], IrType::I32);
        let init = builder.const_i32(1);
        let header = builder.create_block();
        builder.br(header);

        builder.start_block(header, "loop");
        let phi = builder.phi(vec![(init, entry)]);
        let exit = builder.create_block();
        builder.br(exit);

        builder.start_block(exit, "exit");
        assert!(builder.add_phi_incoming(phi, phi, header));
        assert!(!builder.add_phi_incoming(init, phi, header));
        builder.ret(Some(phi));

        let module = builder.finish();
        let block = module.function("IIII").unwrap().block(header).unwrap();
        match &block.instructions[0].kind {
            InstrKind::Phi(preds) => assert_eq!(preds, &vec![(init, entry), (phi, header)]),
            other => panic!("expected phi, got {other:?}"),
        }
    }

    #[test]
    fn test_string_constants() {
        let mut builder = IrBuilder::new("test");
        let first = builder.add_string_constant("%d\n");
        let second = builder.add_string_constant("x");
        assert_ne!(first, second);

        builder.declare_external_vararg("printf", vec![IrType::Ptr], IrType::I32);
        let module = builder.finish();
        assert_eq!(module.global(&first).and_then(|g| g.init.clone()), Some(Constant::String("%d\n".into())));
        let printf = module.function("printf").unwrap();
        assert!(printf.is_external && printf.is_vararg);
    }
}
