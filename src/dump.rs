//! AST dumper
//!
//! Renders a parsed program as an indented S-expression, one node per
//! line, for `rpnc parse` and `--emit-ast`.

use crate::ast::*;

const INDENT: usize = 2;

/// Visitor that accumulates the rendered tree
#[derive(Debug, Default)]
pub struct AstDumper {
    out: String,
    depth: usize,
}

impl AstDumper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the dumper and return the rendered text
    pub fn finish(mut self) -> String {
        self.out.push('\n');
        self.out
    }

    fn open(&mut self, label: &str) {
        if !self.out.is_empty() {
            self.out.push('\n');
        }
        self.out.push_str(&" ".repeat(self.depth * INDENT));
        self.out.push('(');
        self.out.push_str(label);
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth -= 1;
        self.out.push(')');
    }

    fn leaf(&mut self, label: &str) {
        self.open(label);
        self.close();
    }
}

impl Visitor for AstDumper {
    type Output = ();

    fn visit_program(&mut self, program: &Program) {
        self.open(&format!("Program {}", program.name()));
        for function in program.functions() {
            function.accept(self);
        }
        self.close();
    }

    fn visit_function(&mut self, function: &Function) {
        self.open(&format!("Function {}", function.name()));
        for param in function.params() {
            param.accept(self);
        }
        function.body().accept(self);
        self.close();
    }

    fn visit_var(&mut self, var: &VarExpr) {
        self.leaf(&format!("Var {}", var.name()));
    }

    fn visit_rpn(&mut self, rpn: &RpnExpr) {
        self.open("Rpn");
        for expr in rpn.exprs() {
            expr.accept(self);
        }
        self.close();
    }

    fn visit_int(&mut self, int: &IntExpr) {
        self.leaf(&format!("Int {}", int.value()));
    }

    fn visit_call(&mut self, call: &CallExpr) {
        self.leaf(&format!("Call {}", call.callee()));
    }

    fn visit_decl(&mut self, decl: &DeclExpr) {
        self.open(&format!("Decl {}", decl.name()));
        decl.init().accept(self);
        self.close();
    }

    fn visit_op(&mut self, op: &OpExpr) {
        self.leaf(&format!("Op {}", op.op()));
    }

    fn visit_if(&mut self, if_expr: &IfExpr) {
        self.open("If");
        if_expr.condition().accept(self);
        if_expr.then_branch().accept(self);
        if_expr.else_branch().accept(self);
        self.close();
    }
}

/// Render `program` as an indented tree
pub fn dump_ast(program: &Program) -> String {
    let mut dumper = AstDumper::new();
    program.accept(&mut dumper);
    dumper.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_dump_addition() {
        let program = parse("li1I l1iI lI1i IIII 111 1111 llli l1ii l1Ii", "demo").unwrap();
        let expected = "\
(Program demo
  (Function IIII
    (Rpn
      (Int 2)
      (Int 3)
      (Op PLUS))))
";
        assert_eq!(dump_ast(&program), expected);
    }

    #[test]
    fn test_dump_params_decl_and_if() {
        let source = "li1I l1iI \
            lI1i IIi li1l ii lil1 liI1 iI lIi1 ii l1ii l1i1 li1l iI l1ii lil1 11 l1ii l1il 1 l1ii l1ii \
            lI1i IIII 111 IIi l1ii \
            l1Ii";
        let program = parse(source, "demo").unwrap();
        let expected = "\
(Program demo
  (Function IIi
    (Var ii)
    (Rpn
      (Decl iI
        (Rpn
          (Var ii)))
      (If
        (Rpn
          (Var iI))
        (Rpn
          (Int 1))
        (Rpn
          (Int 0)))))
  (Function IIII
    (Rpn
      (Int 2)
      (Call IIi))))
";
        assert_eq!(dump_ast(&program), expected);
    }
}
