//! Parser
//!
//! A recursive descent parser that converts tokens into an AST. Every rule
//! needs at most one token of lookahead, which the lexer caches. The first
//! error aborts the parse.

use crate::ast::*;
use crate::lexer::{LexError, Lexer};
use crate::span::Location;
use crate::token::{Token, TokenKind};
use crate::ENTRY_POINT;
use thiserror::Error;
use tracing::debug;

/// Parser errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        expected: TokenKind,
        found: TokenKind,
        location: Location,
    },

    #[error("expected expression, found {found}")]
    ExpectedExpression { found: TokenKind, location: Location },

    #[error("expected non-empty expression")]
    EmptyExpression { location: Location },

    #[error("no entry point {} defined", ENTRY_POINT)]
    MissingEntryPoint { location: Location },

    #[error("expressions nested deeper than {limit} levels")]
    NestingTooDeep { limit: usize, location: Location },

    #[error(transparent)]
    Lex(#[from] LexError),
}

impl ParseError {
    pub fn location(&self) -> Location {
        match self {
            ParseError::UnexpectedToken { location, .. }
            | ParseError::ExpectedExpression { location, .. }
            | ParseError::EmptyExpression { location }
            | ParseError::MissingEntryPoint { location }
            | ParseError::NestingTooDeep { location, .. } => *location,
            ParseError::Lex(err) => err.location(),
        }
    }
}

/// Parse result
pub type ParseResult<T> = Result<T, ParseError>;

/// Default limit on nested RPN expressions
pub const DEFAULT_MAX_NESTING: usize = 256;

/// The parser
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    /// Name given to the parsed program
    name: String,
    /// RPN expressions currently open
    depth: usize,
    max_nesting: usize,
}

impl<'src> Parser<'src> {
    /// Create a new parser
    pub fn new(source: &'src str, name: impl Into<String>) -> Self {
        Self {
            lexer: Lexer::new(source),
            name: name.into(),
            depth: 0,
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }

    /// Set the maximum nesting depth of RPN expressions
    pub fn with_max_nesting(mut self, limit: usize) -> Self {
        self.max_nesting = limit;
        self
    }

    /// Get the source code
    pub fn source(&self) -> &'src str {
        self.lexer.source()
    }

    /// Kind of the next token, without consuming it
    fn peek_kind(&mut self) -> ParseResult<TokenKind> {
        Ok(self.lexer.peek()?.kind)
    }

    fn advance(&mut self) -> ParseResult<Token> {
        Ok(self.lexer.next_token()?)
    }

    /// Consume token if it matches, otherwise error
    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        let token = self.advance()?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(ParseError::UnexpectedToken {
                expected: kind,
                found: token.kind,
                location: token.location,
            })
        }
    }

    /// Consume an identifier token of the given kind and return its name
    fn expect_name(&mut self, kind: TokenKind) -> ParseResult<(String, Location)> {
        let token = self.expect(kind)?;
        let name = match token.name() {
            Some(name) => name.to_string(),
            None => token.text(self.source()).to_string(),
        };
        Ok((name, token.location))
    }

    // ============ Top-level parsing ============

    /// Parse a complete program
    ///
    /// `Program := PROGRAM LBRACE Function* RBRACE END`
    pub fn parse_program(&mut self) -> ParseResult<Program> {
        let start = self.expect(TokenKind::Program)?;
        self.expect(TokenKind::LBrace)?;

        let mut functions = Vec::new();
        while self.peek_kind()? == TokenKind::Function {
            functions.push(self.parse_function()?);
        }

        let close = self.expect(TokenKind::RBrace)?;
        if !functions.iter().any(|f| f.name() == ENTRY_POINT) {
            return Err(ParseError::MissingEntryPoint { location: close.location });
        }
        self.expect(TokenKind::End)?;

        debug!(program = %self.name, functions = functions.len(), "parsed program");
        Ok(Program::new(self.name.clone(), functions, start.location))
    }

    /// `Function := FUNCTION fid ( LPAREN VarId* RPAREN )? RPNExpr`
    fn parse_function(&mut self) -> ParseResult<Function> {
        let start = self.expect(TokenKind::Function)?;
        let (name, _) = self.expect_name(TokenKind::FnId)?;

        let mut params = Vec::new();
        if self.peek_kind()? == TokenKind::LParen {
            self.advance()?;
            while self.peek_kind()? == TokenKind::VarId {
                let (param, location) = self.expect_name(TokenKind::VarId)?;
                params.push(VarExpr::new(param, location));
            }
            self.expect(TokenKind::RParen)?;
        }

        let body = self.parse_rpn()?;
        debug!(function = %name, arity = params.len(), "parsed function");
        Ok(Function::new(name, params, body, start.location))
    }

    // ============ Expressions ============

    /// `RPNExpr := (IntLit | CallExpr | DeclExpr | VarExpr | IfExpr | OpTok)+ SEMI`
    ///
    /// Declarations and conditionals nest further expressions; nesting
    /// beyond the parser's limit is an error.
    pub fn parse_rpn(&mut self) -> ParseResult<RpnExpr> {
        let location = self.lexer.peek()?.location;
        if self.depth >= self.max_nesting {
            return Err(ParseError::NestingTooDeep {
                limit: self.max_nesting,
                location,
            });
        }

        self.depth += 1;
        let result = self.parse_rpn_elements(location);
        self.depth -= 1;
        result
    }

    fn parse_rpn_elements(&mut self, location: Location) -> ParseResult<RpnExpr> {
        let mut exprs = Vec::new();

        loop {
            let token = self.lexer.peek()?;
            let (kind, token_location) = (token.kind, token.location);

            let expr = match kind {
                TokenKind::Semi => {
                    self.advance()?;
                    if exprs.is_empty() {
                        return Err(ParseError::EmptyExpression { location: token_location });
                    }
                    return Ok(RpnExpr::new(exprs, location));
                }
                TokenKind::Num => {
                    let token = self.advance()?;
                    Expr::Int(IntExpr::new(token.int_value().unwrap_or_default(), token.location))
                }
                TokenKind::VarId => {
                    let (name, location) = self.expect_name(TokenKind::VarId)?;
                    Expr::Var(VarExpr::new(name, location))
                }
                TokenKind::FnId => {
                    let (name, location) = self.expect_name(TokenKind::FnId)?;
                    Expr::Call(CallExpr::new(name, location))
                }
                TokenKind::Var => Expr::Decl(self.parse_decl()?),
                TokenKind::If => Expr::If(self.parse_if()?),
                _ => match Operator::from_token(kind) {
                    Some(op) => {
                        self.advance()?;
                        Expr::Op(OpExpr::new(op, token_location))
                    }
                    None => {
                        return Err(ParseError::ExpectedExpression {
                            found: kind,
                            location: token_location,
                        });
                    }
                },
            };
            exprs.push(expr);
        }
    }

    /// `DeclExpr := VAR vid ASSIGN RPNExpr`
    fn parse_decl(&mut self) -> ParseResult<DeclExpr> {
        let start = self.expect(TokenKind::Var)?;
        let (name, _) = self.expect_name(TokenKind::VarId)?;
        self.expect(TokenKind::Assign)?;
        let init = self.parse_rpn()?;
        Ok(DeclExpr::new(name, init, start.location))
    }

    /// `IfExpr := IF LPAREN RPNExpr RPAREN RPNExpr ELSE RPNExpr`
    fn parse_if(&mut self) -> ParseResult<IfExpr> {
        let start = self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let condition = self.parse_rpn()?;
        self.expect(TokenKind::RParen)?;
        let then_branch = self.parse_rpn()?;
        self.expect(TokenKind::Else)?;
        let else_branch = self.parse_rpn()?;
        Ok(IfExpr::new(condition, then_branch, else_branch, start.location))
    }
}

/// Parse source code into a program with the given name
pub fn parse(source: &str, name: &str) -> ParseResult<Program> {
    Parser::new(source, name).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        match parse(source, "test") {
            Ok(program) => program,
            Err(err) => panic!("parse error: {err} at {}", err.location()),
        }
    }

    fn body(program: &Program, name: &str) -> Vec<Expr> {
        program.function(name).unwrap().body().exprs().to_vec()
    }

    #[test]
    fn test_minimal_program() {
        let program = parse_ok("li1I l1iI lI1i IIII 111 1111 llli l1ii l1Ii");
        assert_eq!(program.name(), "test");
        assert_eq!(program.functions().len(), 1);

        let exprs = body(&program, "IIII");
        assert_eq!(exprs.len(), 3);
        assert!(matches!(&exprs[0], Expr::Int(e) if e.value() == 2));
        assert!(matches!(&exprs[1], Expr::Int(e) if e.value() == 3));
        assert!(matches!(&exprs[2], Expr::Op(e) if e.op() == Operator::Plus));
    }

    #[test]
    fn test_function_with_params() {
        let source = "li1I l1iI
            lI1i IIi li1l ii iI lil1 ii iI llii l1ii
            lI1i IIII 11 IIi l1ii
        l1Ii";
        let program = parse_ok(source);
        assert_eq!(program.functions().len(), 2);

        let sub = &program.functions()[0];
        assert_eq!(sub.name(), "IIi");
        let params: Vec<_> = sub.params().iter().map(VarExpr::name).collect();
        assert_eq!(params, vec!["ii", "iI"]);
        assert_eq!(sub.params()[1].location(), Location::new(39, 2, 30));

        let exprs = body(&program, "IIII");
        assert!(matches!(&exprs[1], Expr::Call(c) if c.callee() == "IIi"));
    }

    #[test]
    fn test_empty_parameter_list() {
        let program = parse_ok("li1I l1iI lI1i IIII li1l lil1 1 l1ii l1Ii");
        assert_eq!(program.functions()[0].arity(), 0);
    }

    #[test]
    fn test_declaration() {
        let program = parse_ok("li1I l1iI lI1i IIII liI1 ii lIi1 111 l1ii ii ii liil l1ii l1Ii");
        let exprs = body(&program, "IIII");
        assert_eq!(exprs.len(), 3);
        match &exprs[0] {
            Expr::Decl(decl) => {
                assert_eq!(decl.name(), "ii");
                assert_eq!(decl.init().exprs().len(), 1);
            }
            other => panic!("expected declaration, got {other:?}"),
        }
    }

    #[test]
    fn test_conditional() {
        let program = parse_ok("li1I l1iI lI1i IIII l1i1 li1l 11 l1ii lil1 111 l1ii l1il 1111 l1ii l1ii l1Ii");
        let exprs = body(&program, "IIII");
        assert_eq!(exprs.len(), 1);
        match &exprs[0] {
            Expr::If(if_expr) => {
                assert!(matches!(&if_expr.condition().exprs()[0], Expr::Int(e) if e.value() == 1));
                assert!(matches!(&if_expr.then_branch().exprs()[0], Expr::Int(e) if e.value() == 2));
                assert!(matches!(&if_expr.else_branch().exprs()[0], Expr::Int(e) if e.value() == 3));
            }
            other => panic!("expected conditional, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_entry_point_reported_at_closing_brace() {
        let err = parse("li1I l1iI l1Ii", "test").unwrap_err();
        assert_eq!(err, ParseError::MissingEntryPoint { location: Location::new(10, 1, 11) });

        let err = parse("li1I l1iI lI1i IIi 1 l1ii l1Ii", "test").unwrap_err();
        assert!(matches!(err, ParseError::MissingEntryPoint { .. }));
    }

    #[test]
    fn test_empty_expression() {
        let err = parse("li1I l1iI lI1i IIII l1ii l1Ii", "test").unwrap_err();
        assert_eq!(err, ParseError::EmptyExpression { location: Location::new(20, 1, 21) });
        assert_eq!(err.to_string(), "expected non-empty expression");
    }

    #[test]
    fn test_expected_expression() {
        let err = parse("li1I l1iI lI1i IIII 11 l1iI l1ii l1Ii", "test").unwrap_err();
        assert_eq!(
            err,
            ParseError::ExpectedExpression { found: TokenKind::LBrace, location: Location::new(23, 1, 24) }
        );
    }

    #[test]
    fn test_unexpected_token_names_expected_kind() {
        let err = parse("l1iI", "test").unwrap_err();
        assert_eq!(err.to_string(), "expected PROGRAM, found LBRACE");
        assert_eq!(err.location(), Location::new(0, 1, 1));

        // unterminated body runs into the end of input
        let err = parse("li1I l1iI lI1i IIII 11", "test").unwrap_err();
        assert!(matches!(err, ParseError::ExpectedExpression { found: TokenKind::End, .. }));
    }

    #[test]
    fn test_trailing_input_rejected() {
        let err = parse("li1I l1iI lI1i IIII 1 l1ii l1Ii 11", "test").unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnexpectedToken { expected: TokenKind::End, found: TokenKind::Num, .. }
        ));
    }

    #[test]
    fn test_lex_errors_propagate() {
        let err = parse("li1I l1iI lI1i IIII 11x l1ii l1Ii", "test").unwrap_err();
        assert!(matches!(err, ParseError::Lex(LexError::ExpectedUnits { found: 'x', .. })));
        assert_eq!(err.location().column, 23);
    }

    fn nested_decls(depth: usize) -> String {
        format!(
            "li1I l1iI lI1i IIII {}1 {}l1Ii",
            "liI1 ii lIi1 ".repeat(depth),
            "l1ii ".repeat(depth + 1)
        )
    }

    #[test]
    fn test_nesting_up_to_limit() {
        // The function body is the first level
        let program = parse_ok(&nested_decls(DEFAULT_MAX_NESTING - 1));
        assert_eq!(body(&program, "IIII").len(), 1);
    }

    #[test]
    fn test_deep_nesting_rejected() {
        for depth in [DEFAULT_MAX_NESTING, 10_000] {
            let err = parse(&nested_decls(depth), "test").unwrap_err();
            assert!(matches!(err, ParseError::NestingTooDeep { limit: DEFAULT_MAX_NESTING, .. }));
        }
    }

    #[test]
    fn test_custom_nesting_limit() {
        let source = "li1I l1iI lI1i IIII l1i1 li1l 1 l1ii lil1 11 l1ii l1il 1 l1ii l1ii l1Ii";
        let err = Parser::new(source, "test").with_max_nesting(1).parse_program().unwrap_err();
        assert!(matches!(err, ParseError::NestingTooDeep { limit: 1, .. }));
        assert_eq!(err.location().column, 31);
        assert!(Parser::new(source, "test").with_max_nesting(2).parse_program().is_ok());
    }
}
