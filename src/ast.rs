//! Abstract Syntax Tree (AST)
//!
//! The AST represents the structure of a program after parsing. Each node
//! owns its children outright and records the location of its first token.
//! Passes over the tree implement [`Visitor`] and are driven through the
//! `accept` method every node exposes.

use crate::span::Location;
use crate::token::TokenKind;
use std::fmt;

/// A complete program (compilation unit)
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    name: String,
    functions: Vec<Function>,
    location: Location,
}

impl Program {
    pub fn new(name: impl Into<String>, functions: Vec<Function>, location: Location) -> Self {
        Self { name: name.into(), functions, location }
    }

    /// Program name, taken from the source file stem
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Functions in source order
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn location(&self) -> Location {
        self.location
    }

    /// Find a function by name
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn accept<V: Visitor>(&self, visitor: &mut V) -> V::Output {
        visitor.visit_program(self)
    }
}

/// Function definition: `lI1i IIi li1l ii iI lil1 ... l1ii`
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    name: String,
    params: Vec<VarExpr>,
    body: RpnExpr,
    location: Location,
}

impl Function {
    pub fn new(name: impl Into<String>, params: Vec<VarExpr>, body: RpnExpr, location: Location) -> Self {
        Self { name: name.into(), params, body, location }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[VarExpr] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn body(&self) -> &RpnExpr {
        &self.body
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn accept<V: Visitor>(&self, visitor: &mut V) -> V::Output {
        visitor.visit_function(self)
    }
}

/// A non-empty sequence of elements evaluated in reverse-Polish order,
/// terminated by `SEMI` in the source
#[derive(Debug, Clone, PartialEq)]
pub struct RpnExpr {
    exprs: Vec<Expr>,
    location: Location,
}

impl RpnExpr {
    pub fn new(exprs: Vec<Expr>, location: Location) -> Self {
        Self { exprs, location }
    }

    pub fn exprs(&self) -> &[Expr] {
        &self.exprs
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn accept<V: Visitor>(&self, visitor: &mut V) -> V::Output {
        visitor.visit_rpn(self)
    }
}

/// An element of an RPN expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Integer literal
    Int(IntExpr),
    /// Variable reference
    Var(VarExpr),
    /// Function call, arguments taken from the operand stack
    Call(CallExpr),
    /// Variable declaration with an initializer
    Decl(DeclExpr),
    /// Binary operator, operands taken from the operand stack
    Op(OpExpr),
    /// Conditional
    If(IfExpr),
}

impl Expr {
    pub fn location(&self) -> Location {
        match self {
            Expr::Int(e) => e.location,
            Expr::Var(e) => e.location,
            Expr::Call(e) => e.location,
            Expr::Decl(e) => e.location,
            Expr::Op(e) => e.location,
            Expr::If(e) => e.location,
        }
    }

    pub fn accept<V: Visitor>(&self, visitor: &mut V) -> V::Output {
        match self {
            Expr::Int(e) => visitor.visit_int(e),
            Expr::Var(e) => visitor.visit_var(e),
            Expr::Call(e) => visitor.visit_call(e),
            Expr::Decl(e) => visitor.visit_decl(e),
            Expr::Op(e) => visitor.visit_op(e),
            Expr::If(e) => visitor.visit_if(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntExpr {
    value: i32,
    location: Location,
}

impl IntExpr {
    pub fn new(value: i32, location: Location) -> Self {
        Self { value, location }
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn accept<V: Visitor>(&self, visitor: &mut V) -> V::Output {
        visitor.visit_int(self)
    }
}

/// A variable; also used for function parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarExpr {
    name: String,
    location: Location,
}

impl VarExpr {
    pub fn new(name: impl Into<String>, location: Location) -> Self {
        Self { name: name.into(), location }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn accept<V: Visitor>(&self, visitor: &mut V) -> V::Output {
        visitor.visit_var(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallExpr {
    callee: String,
    location: Location,
}

impl CallExpr {
    pub fn new(callee: impl Into<String>, location: Location) -> Self {
        Self { callee: callee.into(), location }
    }

    pub fn callee(&self) -> &str {
        &self.callee
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn accept<V: Visitor>(&self, visitor: &mut V) -> V::Output {
        visitor.visit_call(self)
    }
}

/// Declaration: `liI1 ii lIi1 <rpn>`
#[derive(Debug, Clone, PartialEq)]
pub struct DeclExpr {
    name: String,
    init: RpnExpr,
    location: Location,
}

impl DeclExpr {
    pub fn new(name: impl Into<String>, init: RpnExpr, location: Location) -> Self {
        Self { name: name.into(), init, location }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn init(&self) -> &RpnExpr {
        &self.init
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn accept<V: Visitor>(&self, visitor: &mut V) -> V::Output {
        visitor.visit_decl(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpExpr {
    op: Operator,
    location: Location,
}

impl OpExpr {
    pub fn new(op: Operator, location: Location) -> Self {
        Self { op, location }
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn accept<V: Visitor>(&self, visitor: &mut V) -> V::Output {
        visitor.visit_op(self)
    }
}

/// Conditional: `l1i1 li1l <cond> lil1 <then> l1il <else>`
#[derive(Debug, Clone, PartialEq)]
pub struct IfExpr {
    condition: RpnExpr,
    then_branch: RpnExpr,
    else_branch: RpnExpr,
    location: Location,
}

impl IfExpr {
    pub fn new(condition: RpnExpr, then_branch: RpnExpr, else_branch: RpnExpr, location: Location) -> Self {
        Self { condition, then_branch, else_branch, location }
    }

    pub fn condition(&self) -> &RpnExpr {
        &self.condition
    }

    pub fn then_branch(&self) -> &RpnExpr {
        &self.then_branch
    }

    pub fn else_branch(&self) -> &RpnExpr {
        &self.else_branch
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn accept<V: Visitor>(&self, visitor: &mut V) -> V::Output {
        visitor.visit_if(self)
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Plus,
    Minus,
    Times,
    Div,
    Exp,
    Gt,
    Lt,
    Eq,
    Neq,
}

impl Operator {
    pub fn from_token(kind: TokenKind) -> Option<Operator> {
        match kind {
            TokenKind::Plus => Some(Operator::Plus),
            TokenKind::Minus => Some(Operator::Minus),
            TokenKind::Times => Some(Operator::Times),
            TokenKind::Div => Some(Operator::Div),
            TokenKind::Exp => Some(Operator::Exp),
            TokenKind::Gt => Some(Operator::Gt),
            TokenKind::Lt => Some(Operator::Lt),
            TokenKind::Eq => Some(Operator::Eq),
            TokenKind::Neq => Some(Operator::Neq),
            _ => None,
        }
    }

    pub fn token_kind(&self) -> TokenKind {
        match self {
            Operator::Plus => TokenKind::Plus,
            Operator::Minus => TokenKind::Minus,
            Operator::Times => TokenKind::Times,
            Operator::Div => TokenKind::Div,
            Operator::Exp => TokenKind::Exp,
            Operator::Gt => TokenKind::Gt,
            Operator::Lt => TokenKind::Lt,
            Operator::Eq => TokenKind::Eq,
            Operator::Neq => TokenKind::Neq,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token_kind())
    }
}

/// Double-dispatch visitor over the closed set of node kinds
pub trait Visitor {
    type Output;

    fn visit_program(&mut self, program: &Program) -> Self::Output;
    fn visit_function(&mut self, function: &Function) -> Self::Output;
    fn visit_var(&mut self, var: &VarExpr) -> Self::Output;
    fn visit_rpn(&mut self, rpn: &RpnExpr) -> Self::Output;
    fn visit_int(&mut self, int: &IntExpr) -> Self::Output;
    fn visit_call(&mut self, call: &CallExpr) -> Self::Output;
    fn visit_decl(&mut self, decl: &DeclExpr) -> Self::Output;
    fn visit_op(&mut self, op: &OpExpr) -> Self::Output;
    fn visit_if(&mut self, if_expr: &IfExpr) -> Self::Output;
}
