//! Parser for the restricted C dialect
//!
//! Declarations and statements use plain recursive descent; expressions use
//! a Pratt parser over prefix/infix parselets with the standard C precedence
//! table. The parser keeps one mutable cursor, `current_scope`, and every
//! method that moves it restores it before returning. Semantic checks run as
//! constructs finish parsing: type compatibility, label placement and
//! uniqueness, goto resolution, and the shape of `main`.

use std::collections::{HashMap, HashSet};

use stackc_core::{Number, NumberType};
use tracing::debug;

use crate::ast::{
    Ast, BinaryOp, DefId, Definition, ExprId, ExprKind, Expression, Label, PostfixOp, ScopeId,
    Statement, StmtId, StmtKind, UnaryOp, VarType, unify,
};
use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind, TokenValue};

const PREFIX_PRECEDENCE: u8 = 14;
const ASSIGNMENT_PRECEDENCE: u8 = 2;

/// A parsed translation unit: the arena plus the global scope, whose entries
/// are the built-in types and every top-level definition.
#[derive(Debug)]
pub struct ParsedProgram {
    pub ast: Ast,
    pub namespace: ScopeId,
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    ast: Ast,
    namespace: ScopeId,
    current_scope: ScopeId,
    pointer_size: u16,
}

/// Parse a whole source text with the default configuration.
pub fn parse(source: &str) -> Result<ParsedProgram, CompileError> {
    Parser::new(source, &CompilerConfig::default()).parse()
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, config: &CompilerConfig) -> Parser<'a> {
        let mut ast = Ast::new();
        let namespace = ast.add_scope(None, None);
        let builtins: [(&str, VarType); 7] = [
            ("char", VarType::Basic(NumberType::Uint8)),
            ("short", VarType::Basic(NumberType::Sint16)),
            ("int", VarType::Basic(NumberType::Sint32)),
            ("long", VarType::Basic(NumberType::Sint64)),
            ("float", VarType::Basic(NumberType::Fp32)),
            ("double", VarType::Basic(NumberType::Fp64)),
            ("void", VarType::Void),
        ];
        for (name, ty) in builtins {
            let def = ast.add_def(Definition::Type {
                name: name.to_string(),
                ty,
            });
            ast.define(namespace, def, Span::default())
                .expect("builtin type names are unique");
        }
        Parser {
            lexer: Lexer::new(source),
            ast,
            namespace,
            current_scope: namespace,
            pointer_size: config.pointer_size,
        }
    }

    pub fn parse(mut self) -> Result<ParsedProgram, CompileError> {
        while !self.lexer.check_current(TokenKind::EndOfFile) {
            self.parse_namespace_member()?;
        }
        self.validate_main()?;
        debug!("parse complete");
        Ok(ParsedProgram {
            ast: self.ast,
            namespace: self.namespace,
        })
    }

    // ----- Declarations -----

    fn parse_namespace_member(&mut self) -> Result<(), CompileError> {
        let current = self.lexer.current()?.clone();
        let construct = match current.kind {
            TokenKind::Struct => Some("struct"),
            TokenKind::Typedef => Some("typedef"),
            TokenKind::Union => Some("union"),
            _ => None,
        };
        if let Some(construct) = construct {
            return Err(CompileError::Unimplemented {
                construct,
                span: current.span,
            });
        }

        let is_const = self.lexer.consume_if_matches(TokenKind::Const)?.is_some();
        let ty = self.parse_type()?;
        let name = self.lexer.consume(TokenKind::Identifier)?;
        if self.lexer.check_current(TokenKind::LeftParen) {
            self.parse_function_definition(name, ty)
        } else {
            self.parse_global_variable(name, ty, is_const)
        }
    }

    fn parse_function_definition(
        &mut self,
        name: Token,
        return_type: VarType,
    ) -> Result<(), CompileError> {
        let function = self.ast.add_def(Definition::Function {
            name: name.text().to_string(),
            return_type,
            parameters: Vec::new(),
            body: None,
            span: name.span,
        });
        self.ast.define(self.namespace, function, name.span)?;

        // Parameters live in the function body's scope, ahead of its
        // statements, so references inside the body resolve.
        let body_scope = self.ast.add_scope(Some(self.namespace), Some(function));
        self.lexer.consume(TokenKind::LeftParen)?;
        let mut parameters = Vec::new();
        if !self.lexer.check_current(TokenKind::RightParen) {
            loop {
                let is_const = self.lexer.consume_if_matches(TokenKind::Const)?.is_some();
                let ty = self.parse_type()?;
                let param_name = self.lexer.consume(TokenKind::Identifier)?;
                if ty.size_in_bytes() == 0 {
                    return Err(CompileError::LanguageViolation {
                        message: format!(
                            "parameter '{}' cannot have type void",
                            param_name.text()
                        ),
                        span: Some(param_name.span),
                    });
                }
                let parameter = self.ast.add_def(Definition::Variable {
                    name: param_name.text().to_string(),
                    is_const,
                    ty,
                    initializer: None,
                    span: param_name.span,
                });
                self.ast.define(body_scope, parameter, param_name.span)?;
                parameters.push(parameter);
                if self.lexer.consume_if_matches(TokenKind::Comma)?.is_none() {
                    break;
                }
            }
        }
        self.lexer.consume(TokenKind::RightParen)?;
        if let Definition::Function { parameters: p, .. } = self.ast.def_mut(function) {
            *p = parameters;
        }

        let previous = self.current_scope;
        self.current_scope = body_scope;
        let body = self.parse_compound_with_scope(body_scope, false);
        self.current_scope = previous;
        let body = body?;

        if let Definition::Function { body: slot, .. } = self.ast.def_mut(function) {
            *slot = Some(body);
        }
        self.validate_labels(function, body)?;
        self.resolve_gotos(body)?;
        Ok(())
    }

    fn parse_global_variable(
        &mut self,
        name: Token,
        ty: VarType,
        is_const: bool,
    ) -> Result<(), CompileError> {
        if ty.size_in_bytes() == 0 {
            return Err(CompileError::LanguageViolation {
                message: format!("variable '{}' cannot have type void", name.text()),
                span: Some(name.span),
            });
        }
        let initializer = if self.lexer.consume_if_matches(TokenKind::Assign)?.is_some() {
            let expr = self.parse_expression(0)?;
            let expr_ty = self.ast.expr(expr).ty.clone();
            if !(expr_ty == ty || expr_ty.can_be_converted_to(&ty)) {
                return Err(CompileError::LanguageViolation {
                    message: format!(
                        "cannot initialize '{}' of type {} with a value of type {}",
                        name.text(),
                        ty,
                        expr_ty
                    ),
                    span: Some(self.ast.expr(expr).span),
                });
            }
            Some(expr)
        } else {
            None
        };
        self.lexer.consume(TokenKind::Semicolon)?;
        let def = self.ast.add_def(Definition::Variable {
            name: name.text().to_string(),
            is_const,
            ty,
            initializer,
            span: name.span,
        });
        self.ast.define(self.namespace, def, name.span)
    }

    // ----- Statements -----

    fn parse_compound_statement(&mut self) -> Result<StmtId, CompileError> {
        let scope = self.ast.add_scope(Some(self.current_scope), None);
        self.parse_compound_with_scope(scope, false)
    }

    fn parse_compound_with_scope(
        &mut self,
        scope: ScopeId,
        synthetic: bool,
    ) -> Result<StmtId, CompileError> {
        let open = self.lexer.consume(TokenKind::LeftBrace)?;
        let previous = self.current_scope;
        self.current_scope = scope;
        let mut statements = Vec::new();
        let result = loop {
            if self.lexer.check_current(TokenKind::RightBrace) {
                break Ok(());
            }
            if self.lexer.check_current(TokenKind::EndOfFile) {
                break Err(CompileError::UnexpectedToken {
                    expected: TokenKind::RightBrace.to_string(),
                    found: self.lexer.current()?.clone(),
                });
            }
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => break Err(err),
            }
        };
        self.current_scope = previous;
        result?;
        let close = self.lexer.consume(TokenKind::RightBrace)?;

        let block = self.ast.add_stmt(Statement {
            labels: Vec::new(),
            parent: None,
            span: open.span.merge(close.span),
            kind: StmtKind::Compound {
                scope,
                statements: statements.clone(),
                synthetic,
            },
        });
        for stmt in statements {
            self.ast.stmt_mut(stmt).parent = Some(block);
        }
        Ok(block)
    }

    /// The body of a control construct: a compound statement, or a single
    /// statement wrapped in a synthetic compound so it gets its own scope.
    fn parse_embedded_statement(&mut self) -> Result<StmtId, CompileError> {
        if self.lexer.check_current(TokenKind::LeftBrace) {
            return self.parse_compound_statement();
        }
        let scope = self.ast.add_scope(Some(self.current_scope), None);
        let previous = self.current_scope;
        self.current_scope = scope;
        let inner = self.parse_statement();
        self.current_scope = previous;
        let inner = inner?;
        let block = self.ast.add_stmt(Statement {
            labels: Vec::new(),
            parent: None,
            span: self.ast.stmt(inner).span,
            kind: StmtKind::Compound {
                scope,
                statements: vec![inner],
                synthetic: true,
            },
        });
        self.ast.stmt_mut(inner).parent = Some(block);
        Ok(block)
    }

    fn parse_statement(&mut self) -> Result<StmtId, CompileError> {
        let labels = self.parse_labels()?;
        let stmt = match self.lexer.current()?.kind {
            TokenKind::LeftBrace => self.parse_compound_statement()?,
            TokenKind::Return => self.parse_return_statement()?,
            TokenKind::If => self.parse_if_statement()?,
            TokenKind::Switch => self.parse_switch_statement()?,
            TokenKind::While => self.parse_while_statement()?,
            TokenKind::Do => self.parse_do_statement()?,
            TokenKind::For => self.parse_for_statement()?,
            TokenKind::Goto => self.parse_goto_statement()?,
            TokenKind::Semicolon => {
                let token = self.lexer.move_next()?;
                self.ast.add_stmt(Statement {
                    labels: Vec::new(),
                    parent: None,
                    span: token.span,
                    kind: StmtKind::Empty,
                })
            }
            _ => {
                if self.starts_type_specifier()? {
                    self.parse_declaration_statement()?
                } else {
                    self.parse_expression_statement()?
                }
            }
        };
        if !labels.is_empty() {
            self.ast.stmt_mut(stmt).labels = labels;
        }
        Ok(stmt)
    }

    /// Greedily parse the labels ahead of a statement: `case <expr> :`,
    /// `default :`, and `<identifier> :`.
    fn parse_labels(&mut self) -> Result<Vec<Label>, CompileError> {
        let mut labels = Vec::new();
        loop {
            if self.lexer.check_current(TokenKind::Case) {
                self.lexer.move_next()?;
                let expr = self.parse_expression(0)?;
                self.lexer.consume(TokenKind::Colon)?;
                labels.push(Label::Case(expr));
            } else if self.lexer.check_current(TokenKind::Default) {
                self.lexer.move_next()?;
                self.lexer.consume(TokenKind::Colon)?;
                labels.push(Label::Default);
            } else if self.lexer.check_current(TokenKind::Identifier)
                && self.lexer.check_next(TokenKind::Colon)
            {
                let token = self.lexer.move_next()?;
                self.lexer.consume(TokenKind::Colon)?;
                labels.push(Label::Goto(token.text().to_string()));
            } else {
                return Ok(labels);
            }
        }
    }

    fn parse_return_statement(&mut self) -> Result<StmtId, CompileError> {
        let keyword = self.lexer.consume(TokenKind::Return)?;
        let value = if self.lexer.check_current(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression(0)?)
        };
        self.lexer.consume(TokenKind::Semicolon)?;

        let function = self.ast.enclosing_function(self.current_scope).ok_or(
            CompileError::LanguageViolation {
                message: "'return' outside of a function".to_string(),
                span: Some(keyword.span),
            },
        )?;
        if let Some(expr) = value {
            let (return_type, function_name) = match self.ast.def(function) {
                Definition::Function {
                    return_type, name, ..
                } => (return_type.clone(), name.clone()),
                _ => unreachable!("scope owners are functions"),
            };
            let expr_ty = self.ast.expr(expr).ty.clone();
            let compatible = return_type != VarType::Void
                && (expr_ty == return_type || expr_ty.can_be_converted_to(&return_type));
            if !compatible {
                return Err(CompileError::LanguageViolation {
                    message: format!(
                        "cannot return a value of type {} from '{}' returning {}",
                        expr_ty, function_name, return_type
                    ),
                    span: Some(self.ast.expr(expr).span),
                });
            }
        }
        Ok(self.ast.add_stmt(Statement {
            labels: Vec::new(),
            parent: None,
            span: keyword.span,
            kind: StmtKind::Return { value },
        }))
    }

    fn parse_condition(&mut self) -> Result<ExprId, CompileError> {
        self.lexer.consume(TokenKind::LeftParen)?;
        let condition = self.parse_expression(0)?;
        self.expect_basic(condition, "a condition")?;
        self.lexer.consume(TokenKind::RightParen)?;
        Ok(condition)
    }

    fn parse_if_statement(&mut self) -> Result<StmtId, CompileError> {
        let keyword = self.lexer.consume(TokenKind::If)?;
        let condition = self.parse_condition()?;
        let then_body = self.parse_embedded_statement()?;
        let else_body = if self.lexer.consume_if_matches(TokenKind::Else)?.is_some() {
            Some(self.parse_embedded_statement()?)
        } else {
            None
        };
        let stmt = self.ast.add_stmt(Statement {
            labels: Vec::new(),
            parent: None,
            span: keyword.span,
            kind: StmtKind::If {
                condition,
                then_body,
                else_body,
            },
        });
        self.ast.stmt_mut(then_body).parent = Some(stmt);
        if let Some(else_body) = else_body {
            self.ast.stmt_mut(else_body).parent = Some(stmt);
        }
        Ok(stmt)
    }

    fn parse_switch_statement(&mut self) -> Result<StmtId, CompileError> {
        let keyword = self.lexer.consume(TokenKind::Switch)?;
        let value = self.parse_condition()?;
        let body = self.parse_embedded_statement()?;
        let stmt = self.ast.add_stmt(Statement {
            labels: Vec::new(),
            parent: None,
            span: keyword.span,
            kind: StmtKind::Switch { value, body },
        });
        self.ast.stmt_mut(body).parent = Some(stmt);
        Ok(stmt)
    }

    fn parse_while_statement(&mut self) -> Result<StmtId, CompileError> {
        let keyword = self.lexer.consume(TokenKind::While)?;
        let condition = self.parse_condition()?;
        let body = self.parse_embedded_statement()?;
        let stmt = self.ast.add_stmt(Statement {
            labels: Vec::new(),
            parent: None,
            span: keyword.span,
            kind: StmtKind::While { condition, body },
        });
        self.ast.stmt_mut(body).parent = Some(stmt);
        Ok(stmt)
    }

    fn parse_do_statement(&mut self) -> Result<StmtId, CompileError> {
        let keyword = self.lexer.consume(TokenKind::Do)?;
        let body = self.parse_embedded_statement()?;
        self.lexer.consume(TokenKind::While)?;
        let condition = self.parse_condition()?;
        self.lexer.consume(TokenKind::Semicolon)?;
        let stmt = self.ast.add_stmt(Statement {
            labels: Vec::new(),
            parent: None,
            span: keyword.span,
            kind: StmtKind::DoWhile { body, condition },
        });
        self.ast.stmt_mut(body).parent = Some(stmt);
        Ok(stmt)
    }

    fn parse_for_statement(&mut self) -> Result<StmtId, CompileError> {
        let keyword = self.lexer.consume(TokenKind::For)?;
        self.lexer.consume(TokenKind::LeftParen)?;
        let initializer = if self.lexer.check_current(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression(0)?)
        };
        self.lexer.consume(TokenKind::Semicolon)?;
        let condition = if self.lexer.check_current(TokenKind::Semicolon) {
            None
        } else {
            let condition = self.parse_expression(0)?;
            self.expect_basic(condition, "a condition")?;
            Some(condition)
        };
        self.lexer.consume(TokenKind::Semicolon)?;
        let update = if self.lexer.check_current(TokenKind::RightParen) {
            None
        } else {
            Some(self.parse_expression(0)?)
        };
        self.lexer.consume(TokenKind::RightParen)?;
        let body = self.parse_embedded_statement()?;
        let stmt = self.ast.add_stmt(Statement {
            labels: Vec::new(),
            parent: None,
            span: keyword.span,
            kind: StmtKind::For {
                initializer,
                condition,
                update,
                body,
            },
        });
        self.ast.stmt_mut(body).parent = Some(stmt);
        Ok(stmt)
    }

    fn parse_goto_statement(&mut self) -> Result<StmtId, CompileError> {
        let keyword = self.lexer.consume(TokenKind::Goto)?;
        let label = self.lexer.consume(TokenKind::Identifier)?;
        self.lexer.consume(TokenKind::Semicolon)?;
        Ok(self.ast.add_stmt(Statement {
            labels: Vec::new(),
            parent: None,
            span: keyword.span.merge(label.span),
            kind: StmtKind::Goto {
                label: label.text().to_string(),
                target: None,
            },
        }))
    }

    fn parse_declaration_statement(&mut self) -> Result<StmtId, CompileError> {
        let is_const = self.lexer.consume_if_matches(TokenKind::Const)?.is_some();
        let ty = self.parse_type()?;
        let name = self.lexer.consume(TokenKind::Identifier)?;
        if ty.size_in_bytes() == 0 {
            return Err(CompileError::LanguageViolation {
                message: format!("variable '{}' cannot have type void", name.text()),
                span: Some(name.span),
            });
        }
        let variable = self.ast.add_def(Definition::Variable {
            name: name.text().to_string(),
            is_const,
            ty: ty.clone(),
            initializer: None,
            span: name.span,
        });
        self.ast.define(self.current_scope, variable, name.span)?;

        // An initializer lowers into an assignment expression on the freshly
        // declared variable.
        let initializer = if self.lexer.consume_if_matches(TokenKind::Assign)?.is_some() {
            let target = self.ast.add_expr(Expression {
                ty: ty.clone(),
                span: name.span,
                kind: ExprKind::Variable {
                    definition: variable,
                },
            });
            let value = self.parse_expression(ASSIGNMENT_PRECEDENCE - 1)?;
            let value_ty = self.ast.expr(value).ty.clone();
            if !(value_ty == ty || value_ty.can_be_converted_to(&ty)) {
                return Err(CompileError::LanguageViolation {
                    message: format!(
                        "cannot initialize '{}' of type {} with a value of type {}",
                        name.text(),
                        ty,
                        value_ty
                    ),
                    span: Some(self.ast.expr(value).span),
                });
            }
            let span = name.span.merge(self.ast.expr(value).span);
            Some(self.ast.add_expr(Expression {
                ty,
                span,
                kind: ExprKind::Assignment {
                    target,
                    operator: None,
                    value,
                },
            }))
        } else {
            None
        };
        self.lexer.consume(TokenKind::Semicolon)?;
        Ok(self.ast.add_stmt(Statement {
            labels: Vec::new(),
            parent: None,
            span: name.span,
            kind: StmtKind::Declaration {
                variable,
                initializer,
            },
        }))
    }

    fn parse_expression_statement(&mut self) -> Result<StmtId, CompileError> {
        let expr = self.parse_expression(0)?;
        self.lexer.consume(TokenKind::Semicolon)?;
        Ok(self.ast.add_stmt(Statement {
            labels: Vec::new(),
            parent: None,
            span: self.ast.expr(expr).span,
            kind: StmtKind::Expression { expr },
        }))
    }

    // ----- Types -----

    fn starts_type_specifier(&self) -> Result<bool, CompileError> {
        let current = self.lexer.current()?;
        Ok(match current.kind {
            TokenKind::Const
            | TokenKind::Signed
            | TokenKind::Unsigned
            | TokenKind::Char
            | TokenKind::Short
            | TokenKind::Int
            | TokenKind::Long
            | TokenKind::Float
            | TokenKind::Double
            | TokenKind::Void => true,
            TokenKind::Identifier => matches!(
                self.ast
                    .look_up(self.current_scope, current.text())
                    .map(|def| self.ast.def(def)),
                Some(Definition::Type { .. })
            ),
            _ => false,
        })
    }

    /// A type specifier followed by zero or more `*`, each wrapping the type
    /// in a pointer of the configured size.
    fn parse_type(&mut self) -> Result<VarType, CompileError> {
        let mut ty = self.parse_type_specifier()?;
        while self.lexer.consume_if_matches(TokenKind::Star)?.is_some() {
            ty = VarType::Pointer {
                target: Box::new(ty),
                size_in_bytes: self.pointer_size,
            };
        }
        Ok(ty)
    }

    fn parse_type_specifier(&mut self) -> Result<VarType, CompileError> {
        let current = self.lexer.current()?.clone();
        match current.kind {
            TokenKind::Signed
            | TokenKind::Unsigned
            | TokenKind::Char
            | TokenKind::Short
            | TokenKind::Int
            | TokenKind::Long => self.parse_multiword_specifier(),
            TokenKind::Float | TokenKind::Double | TokenKind::Void | TokenKind::Identifier => {
                let token = self.lexer.move_next()?;
                match self
                    .ast
                    .look_up(self.current_scope, token.text())
                    .map(|def| self.ast.def(def))
                {
                    Some(Definition::Type { ty, .. }) => Ok(ty.clone()),
                    Some(_) => Err(CompileError::LanguageViolation {
                        message: format!("'{}' does not name a type", token.text()),
                        span: Some(token.span),
                    }),
                    None => Err(CompileError::UndefinedName {
                        name: token.text().to_string(),
                        span: token.span,
                    }),
                }
            }
            _ => Err(CompileError::UnexpectedToken {
                expected: "a type specifier".to_string(),
                found: current,
            }),
        }
    }

    /// The C89 multi-word grammar: optional `signed`/`unsigned` combined
    /// with `char`/`short`/`int`/`long` (plus `short int`/`long int`).
    fn parse_multiword_specifier(&mut self) -> Result<VarType, CompileError> {
        let mut signedness: Option<bool> = None;
        let mut base: Option<TokenKind> = None;
        loop {
            let current = self.lexer.current()?.clone();
            match current.kind {
                TokenKind::Signed | TokenKind::Unsigned => {
                    if signedness.is_some() {
                        return Err(CompileError::LanguageViolation {
                            message: "duplicate signedness specifier".to_string(),
                            span: Some(current.span),
                        });
                    }
                    signedness = Some(current.kind == TokenKind::Unsigned);
                    self.lexer.move_next()?;
                }
                TokenKind::Char | TokenKind::Short | TokenKind::Long => {
                    if base.is_some() {
                        return Err(CompileError::LanguageViolation {
                            message: "invalid type specifier combination".to_string(),
                            span: Some(current.span),
                        });
                    }
                    base = Some(current.kind);
                    self.lexer.move_next()?;
                }
                TokenKind::Int => {
                    match base {
                        None => base = Some(TokenKind::Int),
                        // `short int` and `long int` keep their width.
                        Some(TokenKind::Short) | Some(TokenKind::Long) => {}
                        Some(_) => {
                            return Err(CompileError::LanguageViolation {
                                message: "invalid type specifier combination".to_string(),
                                span: Some(current.span),
                            });
                        }
                    }
                    self.lexer.move_next()?;
                }
                _ => break,
            }
        }
        let unsigned = signedness == Some(true);
        let ty = match base {
            // Plain `char` is the unsigned byte type; only `signed char` is
            // signed.
            Some(TokenKind::Char) => {
                if signedness == Some(false) {
                    NumberType::Sint8
                } else {
                    NumberType::Uint8
                }
            }
            Some(TokenKind::Short) => {
                if unsigned {
                    NumberType::Uint16
                } else {
                    NumberType::Sint16
                }
            }
            Some(TokenKind::Long) => {
                if unsigned {
                    NumberType::Uint64
                } else {
                    NumberType::Sint64
                }
            }
            _ => {
                if unsigned {
                    NumberType::Uint32
                } else {
                    NumberType::Sint32
                }
            }
        };
        Ok(VarType::Basic(ty))
    }

    // ----- Expressions (Pratt) -----

    fn parse_expression(&mut self, precedence: u8) -> Result<ExprId, CompileError> {
        let current = self.lexer.current()?.clone();
        let Some(prefix) = prefix_parselet(current.kind) else {
            return Err(CompileError::UnexpectedToken {
                expected: "an expression".to_string(),
                found: current,
            });
        };
        let mut left = self.parse_prefix(prefix)?;
        loop {
            let kind = self.lexer.current()?.kind;
            let Some(parselet) = infix_parselet(kind) else {
                break;
            };
            if parselet.precedence() <= precedence {
                break;
            }
            left = self.parse_infix(parselet, left)?;
        }
        Ok(left)
    }

    fn parse_prefix(&mut self, parselet: PrefixParselet) -> Result<ExprId, CompileError> {
        match parselet {
            PrefixParselet::Literal => {
                let token = self.lexer.move_next()?;
                let (value, ty) = match token.value {
                    TokenValue::Int { value, ty } => {
                        let number = if ty.interpretation() == stackc_core::Interpretation::Signed {
                            Number::Signed(value as i64)
                        } else {
                            Number::Unsigned(value)
                        };
                        (number, ty)
                    }
                    TokenValue::Float { value, ty } => (Number::Float(value), ty),
                    TokenValue::Char(code) => (Number::Unsigned(code as u64), NumberType::Uint8),
                    _ => {
                        return Err(CompileError::UnexpectedToken {
                            expected: "an expression".to_string(),
                            found: token,
                        });
                    }
                };
                Ok(self.ast.add_expr(Expression {
                    ty: VarType::Basic(ty),
                    span: token.span,
                    kind: ExprKind::NumberLiteral { value },
                }))
            }
            PrefixParselet::Name => {
                let token = self.lexer.move_next()?;
                let definition = self
                    .ast
                    .look_up(self.current_scope, token.text())
                    .ok_or_else(|| CompileError::UndefinedName {
                        name: token.text().to_string(),
                        span: token.span,
                    })?;
                let ty = match self.ast.def(definition) {
                    Definition::Variable { ty, .. } => ty.clone(),
                    // Function names only make sense as call targets; the
                    // call parselet reads the definition, not this type.
                    Definition::Function { .. } => VarType::Void,
                    Definition::Type { .. } => {
                        return Err(CompileError::LanguageViolation {
                            message: format!("'{}' is a type, not a value", token.text()),
                            span: Some(token.span),
                        });
                    }
                };
                Ok(self.ast.add_expr(Expression {
                    ty,
                    span: token.span,
                    kind: ExprKind::Variable { definition },
                }))
            }
            PrefixParselet::Operator(operator) => {
                let token = self.lexer.move_next()?;
                let operand = self.parse_expression(PREFIX_PRECEDENCE - 1)?;
                let ty = match operator {
                    UnaryOp::Plus | UnaryOp::Minus => {
                        self.expect_basic(operand, "a unary operand")?;
                        self.ast.expr(operand).ty.clone()
                    }
                    UnaryOp::BitwiseNot => {
                        self.expect_integer(operand, "operand of '~'")?;
                        self.ast.expr(operand).ty.clone()
                    }
                    UnaryOp::LogicalNot => {
                        self.expect_basic(operand, "operand of '!'")?;
                        VarType::Basic(NumberType::Uint8)
                    }
                    UnaryOp::Increment | UnaryOp::Decrement => {
                        self.expect_assignable(operand)?;
                        self.ast.expr(operand).ty.clone()
                    }
                };
                let span = token.span.merge(self.ast.expr(operand).span);
                Ok(self.ast.add_expr(Expression {
                    ty,
                    span,
                    kind: ExprKind::Prefix { operator, operand },
                }))
            }
            PrefixParselet::Group => {
                let open = self.lexer.move_next()?;
                if self.starts_type_specifier()? {
                    // A C cast: `(type) expr`.
                    let target = self.parse_type()?;
                    self.lexer.consume(TokenKind::RightParen)?;
                    let operand = self.parse_expression(PREFIX_PRECEDENCE - 1)?;
                    let operand_ty = self.ast.expr(operand).ty.clone();
                    if target.basic().is_none() || operand_ty.basic().is_none() {
                        return Err(CompileError::LanguageViolation {
                            message: format!(
                                "cannot cast a value of type {} to {}",
                                operand_ty, target
                            ),
                            span: Some(open.span),
                        });
                    }
                    let span = open.span.merge(self.ast.expr(operand).span);
                    Ok(self.ast.add_expr(Expression {
                        ty: target,
                        span,
                        kind: ExprKind::Cast { operand },
                    }))
                } else {
                    let inner = self.parse_expression(0)?;
                    self.lexer.consume(TokenKind::RightParen)?;
                    Ok(inner)
                }
            }
        }
    }

    fn parse_infix(
        &mut self,
        parselet: InfixParselet,
        left: ExprId,
    ) -> Result<ExprId, CompileError> {
        match parselet {
            InfixParselet::Binary {
                operator,
                precedence,
            } => {
                let token = self.lexer.move_next()?;
                let right = self.parse_expression(precedence)?;
                let ty = self.infix_result_type(operator, left, right, token.span)?;
                let span = self.ast.expr(left).span.merge(self.ast.expr(right).span);
                Ok(self.ast.add_expr(Expression {
                    ty,
                    span,
                    kind: ExprKind::Infix {
                        operator,
                        left,
                        right,
                    },
                }))
            }
            InfixParselet::Assignment { operator } => {
                self.lexer.move_next()?;
                self.expect_assignable(left)?;
                let value = self.parse_expression(ASSIGNMENT_PRECEDENCE - 1)?;
                let target_ty = self.ast.expr(left).ty.clone();
                let value_ty = self.ast.expr(value).ty.clone();
                if let Some(op) = operator {
                    self.infix_result_type(op, left, value, self.ast.expr(left).span)?;
                } else if !(value_ty == target_ty || value_ty.can_be_converted_to(&target_ty)) {
                    return Err(CompileError::LanguageViolation {
                        message: format!(
                            "cannot assign a value of type {} to a target of type {}",
                            value_ty, target_ty
                        ),
                        span: Some(self.ast.expr(value).span),
                    });
                }
                let span = self.ast.expr(left).span.merge(self.ast.expr(value).span);
                Ok(self.ast.add_expr(Expression {
                    ty: target_ty,
                    span,
                    kind: ExprKind::Assignment {
                        target: left,
                        operator,
                        value,
                    },
                }))
            }
            InfixParselet::Ternary => {
                self.lexer.move_next()?;
                self.expect_basic(left, "a condition")?;
                let then_value = self.parse_expression(ASSIGNMENT_PRECEDENCE - 1)?;
                self.lexer.consume(TokenKind::Colon)?;
                let else_value = self.parse_expression(ASSIGNMENT_PRECEDENCE - 1)?;
                let then_ty = self.ast.expr(then_value).ty.clone();
                let else_ty = self.ast.expr(else_value).ty.clone();
                let ty = unify(&then_ty, &else_ty).ok_or_else(|| {
                    CompileError::LanguageViolation {
                        message: format!(
                            "ternary branches have incompatible types {} and {}",
                            then_ty, else_ty
                        ),
                        span: Some(self.ast.expr(then_value).span),
                    }
                })?;
                let span = self.ast.expr(left).span.merge(self.ast.expr(else_value).span);
                Ok(self.ast.add_expr(Expression {
                    ty,
                    span,
                    kind: ExprKind::Ternary {
                        condition: left,
                        then_value,
                        else_value,
                    },
                }))
            }
            InfixParselet::Call => {
                let open = self.lexer.move_next()?;
                let function = match &self.ast.expr(left).kind {
                    ExprKind::Variable { definition }
                        if matches!(self.ast.def(*definition), Definition::Function { .. }) =>
                    {
                        *definition
                    }
                    _ => {
                        return Err(CompileError::LanguageViolation {
                            message: "only functions can be called".to_string(),
                            span: Some(open.span),
                        });
                    }
                };
                let mut arguments = Vec::new();
                if !self.lexer.check_current(TokenKind::RightParen) {
                    loop {
                        arguments.push(self.parse_expression(ASSIGNMENT_PRECEDENCE - 1)?);
                        if self.lexer.consume_if_matches(TokenKind::Comma)?.is_none() {
                            break;
                        }
                    }
                }
                let close = self.lexer.consume(TokenKind::RightParen)?;

                let (name, return_type, parameters) = match self.ast.def(function) {
                    Definition::Function {
                        name,
                        return_type,
                        parameters,
                        ..
                    } => (name.clone(), return_type.clone(), parameters.clone()),
                    _ => unreachable!("checked above"),
                };
                if arguments.len() != parameters.len() {
                    return Err(CompileError::LanguageViolation {
                        message: format!(
                            "'{}' takes {} argument(s), but {} were given",
                            name,
                            parameters.len(),
                            arguments.len()
                        ),
                        span: Some(open.span.merge(close.span)),
                    });
                }
                for (&argument, &parameter) in arguments.iter().zip(&parameters) {
                    let argument_ty = self.ast.expr(argument).ty.clone();
                    let parameter_ty = match self.ast.def(parameter) {
                        Definition::Variable { ty, .. } => ty.clone(),
                        _ => unreachable!("parameters are variables"),
                    };
                    if !(argument_ty == parameter_ty
                        || argument_ty.can_be_converted_to(&parameter_ty))
                    {
                        return Err(CompileError::LanguageViolation {
                            message: format!(
                                "argument of type {} cannot be passed to a parameter of type {}",
                                argument_ty, parameter_ty
                            ),
                            span: Some(self.ast.expr(argument).span),
                        });
                    }
                }
                let span = self.ast.expr(left).span.merge(close.span);
                Ok(self.ast.add_expr(Expression {
                    ty: return_type,
                    span,
                    kind: ExprKind::Call {
                        function,
                        arguments,
                    },
                }))
            }
            InfixParselet::Subscript => {
                let open = self.lexer.move_next()?;
                self.parse_expression(0)?;
                self.lexer.consume(TokenKind::RightBracket)?;
                Err(CompileError::LanguageViolation {
                    message: "subscripts are reserved, but arrays are not part of this dialect"
                        .to_string(),
                    span: Some(open.span),
                })
            }
            InfixParselet::Postfix(operator) => {
                let token = self.lexer.move_next()?;
                self.expect_assignable(left)?;
                let ty = self.ast.expr(left).ty.clone();
                let span = self.ast.expr(left).span.merge(token.span);
                Ok(self.ast.add_expr(Expression {
                    ty,
                    span,
                    kind: ExprKind::Postfix {
                        operator,
                        operand: left,
                    },
                }))
            }
        }
    }

    fn infix_result_type(
        &self,
        operator: BinaryOp,
        left: ExprId,
        right: ExprId,
        at: Span,
    ) -> Result<VarType, CompileError> {
        let left_ty = self.ast.expr(left).ty.clone();
        let right_ty = self.ast.expr(right).ty.clone();
        let unified = || {
            unify(&left_ty, &right_ty).ok_or_else(|| CompileError::LanguageViolation {
                message: format!(
                    "operand types {} and {} are incompatible",
                    left_ty, right_ty
                ),
                span: Some(at),
            })
        };
        match operator {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let ty = unified()?;
                self.expect_basic_type(&ty, at)?;
                Ok(ty)
            }
            BinaryOp::BitAnd | BinaryOp::BitXor | BinaryOp::BitOr => {
                let ty = unified()?;
                self.expect_integer_type(&ty, at)?;
                Ok(ty)
            }
            BinaryOp::Shl | BinaryOp::Shr => {
                self.expect_integer_type(&left_ty, at)?;
                self.expect_integer_type(&right_ty, at)?;
                Ok(left_ty)
            }
            BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::Eq
            | BinaryOp::Ne => {
                let ty = unified()?;
                self.expect_basic_type(&ty, at)?;
                Ok(VarType::Basic(NumberType::Uint8))
            }
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                self.expect_basic_type(&left_ty, at)?;
                self.expect_basic_type(&right_ty, at)?;
                Ok(VarType::Basic(NumberType::Uint8))
            }
        }
    }

    // ----- Semantic helpers -----

    fn expect_basic(&self, expr: ExprId, what: &str) -> Result<NumberType, CompileError> {
        let expr = self.ast.expr(expr);
        expr.ty.basic().ok_or_else(|| CompileError::LanguageViolation {
            message: format!("{} must have a basic type, found {}", what, expr.ty),
            span: Some(expr.span),
        })
    }

    fn expect_integer(&self, expr: ExprId, what: &str) -> Result<NumberType, CompileError> {
        let ty = self.expect_basic(expr, what)?;
        if !ty.is_integer() {
            return Err(CompileError::LanguageViolation {
                message: format!("{} must have an integer type, found {}", what, ty),
                span: Some(self.ast.expr(expr).span),
            });
        }
        Ok(ty)
    }

    fn expect_basic_type(&self, ty: &VarType, at: Span) -> Result<(), CompileError> {
        if ty.basic().is_none() {
            return Err(CompileError::LanguageViolation {
                message: format!("operands must have basic types, found {}", ty),
                span: Some(at),
            });
        }
        Ok(())
    }

    fn expect_integer_type(&self, ty: &VarType, at: Span) -> Result<(), CompileError> {
        match ty.basic() {
            Some(number) if number.is_integer() => Ok(()),
            _ => Err(CompileError::LanguageViolation {
                message: format!("operands must have integer types, found {}", ty),
                span: Some(at),
            }),
        }
    }

    /// The target of an assignment or increment: a non-const, basic-typed
    /// variable reference.
    fn expect_assignable(&self, expr: ExprId) -> Result<(), CompileError> {
        let expression = self.ast.expr(expr);
        let definition = match &expression.kind {
            ExprKind::Variable { definition } => *definition,
            _ => {
                return Err(CompileError::LanguageViolation {
                    message: "expression is not assignable".to_string(),
                    span: Some(expression.span),
                });
            }
        };
        match self.ast.def(definition) {
            Definition::Variable { is_const: true, name, .. } => {
                Err(CompileError::LanguageViolation {
                    message: format!("cannot assign to constant '{}'", name),
                    span: Some(expression.span),
                })
            }
            Definition::Variable { ty, .. } if ty.basic().is_none() => {
                Err(CompileError::LanguageViolation {
                    message: "only variables of basic type can be assigned".to_string(),
                    span: Some(expression.span),
                })
            }
            Definition::Variable { .. } => Ok(()),
            _ => Err(CompileError::LanguageViolation {
                message: "expression is not assignable".to_string(),
                span: Some(expression.span),
            }),
        }
    }

    // ----- Function-level validation -----

    fn validate_labels(&self, function: DefId, body: StmtId) -> Result<(), CompileError> {
        let function_name = self.ast.def(function).name().to_string();
        let mut seen = HashSet::new();
        for stmt in self.ast.labeled_statements(body) {
            for label in &self.ast.stmt(stmt).labels {
                match label {
                    Label::Goto(name) => {
                        if !seen.insert(name.clone()) {
                            return Err(CompileError::LanguageViolation {
                                message: format!(
                                    "label '{}' is defined more than once in '{}'",
                                    name, function_name
                                ),
                                span: Some(self.ast.stmt(stmt).span),
                            });
                        }
                    }
                    Label::Case(expr) => {
                        let switch = self.enclosing_switch(stmt).ok_or_else(|| {
                            CompileError::LanguageViolation {
                                message: "'case' label outside of a switch statement".to_string(),
                                span: Some(self.ast.stmt(stmt).span),
                            }
                        })?;
                        let value = match &self.ast.stmt(switch).kind {
                            StmtKind::Switch { value, .. } => *value,
                            _ => unreachable!("enclosing_switch returns switches"),
                        };
                        let value_ty = &self.ast.expr(value).ty;
                        let case_ty = &self.ast.expr(*expr).ty;
                        if case_ty != value_ty {
                            return Err(CompileError::LanguageViolation {
                                message: format!(
                                    "case label type {} does not match the switch value type {}",
                                    case_ty, value_ty
                                ),
                                span: Some(self.ast.expr(*expr).span),
                            });
                        }
                    }
                    Label::Default => {
                        if self.enclosing_switch(stmt).is_none() {
                            return Err(CompileError::LanguageViolation {
                                message: "'default' label outside of a switch statement"
                                    .to_string(),
                                span: Some(self.ast.stmt(stmt).span),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn enclosing_switch(&self, stmt: StmtId) -> Option<StmtId> {
        self.ast
            .statement_ancestors(stmt)
            .into_iter()
            .find(|&ancestor| matches!(self.ast.stmt(ancestor).kind, StmtKind::Switch { .. }))
    }

    /// Bind every goto to its labeled statement. Forward references are the
    /// point of this pass: targets may be labeled only later in the body.
    fn resolve_gotos(&mut self, body: StmtId) -> Result<(), CompileError> {
        let statements = self.ast.recursive_statements(body);
        let mut targets: HashMap<String, StmtId> = HashMap::new();
        for &stmt in &statements {
            for label in &self.ast.stmt(stmt).labels {
                if let Label::Goto(name) = label {
                    targets.insert(name.clone(), stmt);
                }
            }
        }
        for &stmt in &statements {
            let label = match &self.ast.stmt(stmt).kind {
                StmtKind::Goto { label, .. } => label.clone(),
                _ => continue,
            };
            let target = *targets.get(&label).ok_or_else(|| {
                CompileError::LanguageViolation {
                    message: format!("goto target '{}' is not defined in this function", label),
                    span: Some(self.ast.stmt(stmt).span),
                }
            })?;
            if let StmtKind::Goto { target: slot, .. } = &mut self.ast.stmt_mut(stmt).kind {
                *slot = Some(target);
            }
        }
        Ok(())
    }

    fn validate_main(&self) -> Result<(), CompileError> {
        let main = self.ast.look_up(self.namespace, "main").ok_or_else(|| {
            CompileError::LanguageViolation {
                message: "the program defines no 'main' function".to_string(),
                span: None,
            }
        })?;
        match self.ast.def(main) {
            Definition::Function {
                return_type,
                parameters,
                span,
                ..
            } => {
                if *return_type != VarType::Basic(NumberType::Sint32) {
                    return Err(CompileError::LanguageViolation {
                        message: "'main' must return int".to_string(),
                        span: Some(*span),
                    });
                }
                if !parameters.is_empty() {
                    return Err(CompileError::LanguageViolation {
                        message: "'main' must take no parameters".to_string(),
                        span: Some(*span),
                    });
                }
                Ok(())
            }
            _ => Err(CompileError::LanguageViolation {
                message: "'main' must be a function".to_string(),
                span: None,
            }),
        }
    }
}

// ----- Parselet tables -----

enum PrefixParselet {
    Literal,
    Name,
    Operator(UnaryOp),
    /// `(`: grouping, or a cast when a type specifier follows.
    Group,
}

enum InfixParselet {
    Binary { operator: BinaryOp, precedence: u8 },
    Assignment { operator: Option<BinaryOp> },
    Ternary,
    Call,
    Subscript,
    Postfix(PostfixOp),
}

impl InfixParselet {
    fn precedence(&self) -> u8 {
        match self {
            InfixParselet::Binary { precedence, .. } => *precedence,
            InfixParselet::Assignment { .. } | InfixParselet::Ternary => ASSIGNMENT_PRECEDENCE,
            InfixParselet::Call | InfixParselet::Subscript | InfixParselet::Postfix(_) => 15,
        }
    }
}

fn prefix_parselet(kind: TokenKind) -> Option<PrefixParselet> {
    match kind {
        TokenKind::IntLiteral | TokenKind::FloatLiteral | TokenKind::CharLiteral => {
            Some(PrefixParselet::Literal)
        }
        TokenKind::Identifier => Some(PrefixParselet::Name),
        TokenKind::Plus => Some(PrefixParselet::Operator(UnaryOp::Plus)),
        TokenKind::Minus => Some(PrefixParselet::Operator(UnaryOp::Minus)),
        TokenKind::Bang => Some(PrefixParselet::Operator(UnaryOp::LogicalNot)),
        TokenKind::Tilde => Some(PrefixParselet::Operator(UnaryOp::BitwiseNot)),
        TokenKind::Increment => Some(PrefixParselet::Operator(UnaryOp::Increment)),
        TokenKind::Decrement => Some(PrefixParselet::Operator(UnaryOp::Decrement)),
        TokenKind::LeftParen => Some(PrefixParselet::Group),
        _ => None,
    }
}

fn infix_parselet(kind: TokenKind) -> Option<InfixParselet> {
    let binary = |operator, precedence| Some(InfixParselet::Binary {
        operator,
        precedence,
    });
    match kind {
        TokenKind::Star => binary(BinaryOp::Mul, 12),
        TokenKind::Slash => binary(BinaryOp::Div, 12),
        TokenKind::Percent => binary(BinaryOp::Mod, 12),
        TokenKind::Plus => binary(BinaryOp::Add, 11),
        TokenKind::Minus => binary(BinaryOp::Sub, 11),
        TokenKind::Shl => binary(BinaryOp::Shl, 10),
        TokenKind::Shr => binary(BinaryOp::Shr, 10),
        TokenKind::Less => binary(BinaryOp::Lt, 9),
        TokenKind::LessEqual => binary(BinaryOp::Le, 9),
        TokenKind::Greater => binary(BinaryOp::Gt, 9),
        TokenKind::GreaterEqual => binary(BinaryOp::Ge, 9),
        TokenKind::EqualEqual => binary(BinaryOp::Eq, 8),
        TokenKind::BangEqual => binary(BinaryOp::Ne, 8),
        TokenKind::Ampersand => binary(BinaryOp::BitAnd, 7),
        TokenKind::Caret => binary(BinaryOp::BitXor, 6),
        TokenKind::Pipe => binary(BinaryOp::BitOr, 5),
        TokenKind::AmpAmp => binary(BinaryOp::LogicalAnd, 4),
        TokenKind::PipePipe => binary(BinaryOp::LogicalOr, 3),
        TokenKind::Assign => Some(InfixParselet::Assignment { operator: None }),
        TokenKind::PlusAssign => Some(InfixParselet::Assignment {
            operator: Some(BinaryOp::Add),
        }),
        TokenKind::MinusAssign => Some(InfixParselet::Assignment {
            operator: Some(BinaryOp::Sub),
        }),
        TokenKind::StarAssign => Some(InfixParselet::Assignment {
            operator: Some(BinaryOp::Mul),
        }),
        TokenKind::SlashAssign => Some(InfixParselet::Assignment {
            operator: Some(BinaryOp::Div),
        }),
        TokenKind::PercentAssign => Some(InfixParselet::Assignment {
            operator: Some(BinaryOp::Mod),
        }),
        TokenKind::ShlAssign => Some(InfixParselet::Assignment {
            operator: Some(BinaryOp::Shl),
        }),
        TokenKind::ShrAssign => Some(InfixParselet::Assignment {
            operator: Some(BinaryOp::Shr),
        }),
        TokenKind::AmpAssign => Some(InfixParselet::Assignment {
            operator: Some(BinaryOp::BitAnd),
        }),
        TokenKind::CaretAssign => Some(InfixParselet::Assignment {
            operator: Some(BinaryOp::BitXor),
        }),
        TokenKind::PipeAssign => Some(InfixParselet::Assignment {
            operator: Some(BinaryOp::BitOr),
        }),
        TokenKind::Question => Some(InfixParselet::Ternary),
        TokenKind::LeftParen => Some(InfixParselet::Call),
        TokenKind::LeftBracket => Some(InfixParselet::Subscript),
        TokenKind::Increment => Some(InfixParselet::Postfix(PostfixOp::Increment)),
        TokenKind::Decrement => Some(InfixParselet::Postfix(PostfixOp::Decrement)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> ParsedProgram {
        parse(source).expect("program parses")
    }

    fn parse_err(source: &str) -> CompileError {
        parse(source).expect_err("program is rejected")
    }

    fn function_body(program: &ParsedProgram, name: &str) -> StmtId {
        let def = program
            .ast
            .look_up(program.namespace, name)
            .expect("function exists");
        match program.ast.def(def) {
            Definition::Function { body, .. } => body.expect("body parsed"),
            other => panic!("expected a function, got {:?}", other),
        }
    }

    #[test]
    fn test_minimal_program() {
        let program = parse_ok("int main() { return 0; }");
        assert!(program.ast.look_up(program.namespace, "main").is_some());
    }

    #[test]
    fn test_global_variable_with_initializer() {
        let program = parse_ok("int x = 5; int main() { return 0; }");
        let x = program.ast.look_up(program.namespace, "x").expect("x defined");
        match program.ast.def(x) {
            Definition::Variable {
                ty, initializer, ..
            } => {
                assert_eq!(*ty, VarType::Basic(NumberType::Sint32));
                let init = initializer.expect("initializer stored");
                assert_eq!(
                    program.ast.expr(init).kind,
                    ExprKind::NumberLiteral {
                        value: Number::Signed(5)
                    }
                );
            }
            other => panic!("expected a variable, got {:?}", other),
        }
    }

    #[test]
    fn test_builtin_types_are_in_scope() {
        let program = parse_ok("int main() { return 0; }");
        for name in ["char", "short", "int", "long", "float", "double", "void"] {
            assert!(program.ast.look_up(program.namespace, name).is_some(), "{}", name);
        }
    }

    #[test]
    fn test_goto_forward_reference_is_bound() {
        let program = parse_ok("void f() { goto a; a: return; } int main() { return 0; }");
        let body = function_body(&program, "f");
        let statements = program.ast.recursive_statements(body);
        let goto = statements
            .iter()
            .find_map(|&stmt| match &program.ast.stmt(stmt).kind {
                StmtKind::Goto { target, .. } => Some(target),
                _ => None,
            })
            .expect("goto statement exists");
        let target = goto.expect("goto resolved");
        assert!(matches!(
            program.ast.stmt(target).kind,
            StmtKind::Return { value: None }
        ));
        assert_eq!(
            program.ast.stmt(target).labels,
            vec![Label::Goto("a".to_string())]
        );
    }

    #[test]
    fn test_duplicate_label_is_a_violation() {
        let err = parse_err("void f() { a: ; a: ; } int main() { return 0; }");
        assert!(
            matches!(&err, CompileError::LanguageViolation { message, .. }
                if message.contains("label 'a'")),
            "{:?}",
            err
        );
    }

    #[test]
    fn test_unresolved_goto_is_a_violation() {
        let err = parse_err("void f() { goto nowhere; } int main() { return 0; }");
        assert!(matches!(&err, CompileError::LanguageViolation { message, .. }
            if message.contains("nowhere")));
    }

    #[test]
    fn test_case_outside_switch_is_a_violation() {
        let err = parse_err("int main() { case 1: return 0; }");
        assert!(matches!(&err, CompileError::LanguageViolation { message, .. }
            if message.contains("'case'")));
    }

    #[test]
    fn test_case_label_type_must_match_switch_value() {
        parse_ok("int main() { int x = 0; switch (x) { case 1: ; } return 0; }");
        let err =
            parse_err("int main() { int x = 0; switch (x) { case 1.5: ; } return 0; }");
        assert!(matches!(&err, CompileError::LanguageViolation { message, .. }
            if message.contains("case label type")));
    }

    #[test]
    fn test_struct_is_unimplemented() {
        let err = parse_err("struct point { int x; };");
        assert!(matches!(
            err,
            CompileError::Unimplemented {
                construct: "struct",
                ..
            }
        ));
    }

    #[test]
    fn test_main_is_required_and_checked() {
        assert!(matches!(
            parse_err("int helper() { return 0; }"),
            CompileError::LanguageViolation { message, .. } if message.contains("no 'main'")
        ));
        assert!(matches!(
            parse_err("void main() { return; }"),
            CompileError::LanguageViolation { message, .. } if message.contains("return int")
        ));
        assert!(matches!(
            parse_err("int main(int argc) { return 0; }"),
            CompileError::LanguageViolation { message, .. } if message.contains("no parameters")
        ));
    }

    #[test]
    fn test_return_type_must_convert() {
        let err = parse_err("int main() { return 1.5; }");
        assert!(matches!(&err, CompileError::LanguageViolation { message, .. }
            if message.contains("cannot return")));
        // Narrowing is allowed: sint64 converts to sint32.
        parse_ok("int main() { return 5l; }");
    }

    #[test]
    fn test_undefined_name() {
        let err = parse_err("int main() { return missing; }");
        assert!(matches!(err, CompileError::UndefinedName { name, .. } if name == "missing"));
    }

    #[test]
    fn test_name_collision_in_one_scope() {
        let err = parse_err("int main() { int x = 1; int x = 2; return x; }");
        assert!(matches!(err, CompileError::NameCollision { name, .. } if name == "x"));
        // Shadowing in a nested scope is fine.
        parse_ok("int main() { int x = 1; { int x = 2; x; } return x; }");
    }

    #[test]
    fn test_assignment_to_const_is_rejected() {
        let err = parse_err("int main() { const int x = 1; x = 2; return x; }");
        assert!(matches!(&err, CompileError::LanguageViolation { message, .. }
            if message.contains("constant 'x'")));
    }

    #[test]
    fn test_missing_semicolon_is_an_unexpected_token() {
        let err = parse_err("int main() { return 0 }");
        assert!(matches!(&err, CompileError::UnexpectedToken { expected, .. }
            if expected.contains(';')));
    }

    #[test]
    fn test_single_statement_bodies_get_synthetic_compounds() {
        let program = parse_ok("int main() { if (1) return 1; return 0; }");
        let body = function_body(&program, "main");
        let if_stmt = program
            .ast
            .recursive_statements(body)
            .into_iter()
            .find(|&stmt| matches!(program.ast.stmt(stmt).kind, StmtKind::If { .. }))
            .expect("if statement");
        match &program.ast.stmt(if_stmt).kind {
            StmtKind::If { then_body, .. } => match &program.ast.stmt(*then_body).kind {
                StmtKind::Compound { synthetic, statements, .. } => {
                    assert!(*synthetic);
                    assert_eq!(statements.len(), 1);
                }
                other => panic!("expected a compound body, got {:?}", other),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_pointer_types_parse_with_configured_size() {
        let program = parse_ok("int* p; int main() { return 0; }");
        let p = program.ast.look_up(program.namespace, "p").expect("p defined");
        match program.ast.def(p) {
            Definition::Variable { ty, .. } => {
                assert_eq!(
                    *ty,
                    VarType::Pointer {
                        target: Box::new(VarType::Basic(NumberType::Sint32)),
                        size_in_bytes: 4,
                    }
                );
            }
            other => panic!("expected a variable, got {:?}", other),
        }
    }

    #[test]
    fn test_multiword_type_specifiers() {
        let program = parse_ok(
            "unsigned int a; unsigned char b; signed char c; short int d; \
             unsigned long e; int main() { return 0; }",
        );
        let ty_of = |name: &str| match program.ast.def(
            program.ast.look_up(program.namespace, name).expect(name),
        ) {
            Definition::Variable { ty, .. } => ty.clone(),
            _ => panic!("not a variable"),
        };
        assert_eq!(ty_of("a"), VarType::Basic(NumberType::Uint32));
        assert_eq!(ty_of("b"), VarType::Basic(NumberType::Uint8));
        assert_eq!(ty_of("c"), VarType::Basic(NumberType::Sint8));
        assert_eq!(ty_of("d"), VarType::Basic(NumberType::Sint16));
        assert_eq!(ty_of("e"), VarType::Basic(NumberType::Uint64));
    }

    #[test]
    fn test_precedence_shapes_the_tree() {
        // 2 + 3 * 4 parses as 2 + (3 * 4).
        let program = parse_ok("int main() { return 2 + 3 * 4; }");
        let body = function_body(&program, "main");
        let ret = program
            .ast
            .recursive_statements(body)
            .into_iter()
            .find_map(|stmt| match program.ast.stmt(stmt).kind {
                StmtKind::Return { value: Some(expr) } => Some(expr),
                _ => None,
            })
            .expect("return value");
        match &program.ast.expr(ret).kind {
            ExprKind::Infix {
                operator: BinaryOp::Add,
                right,
                ..
            } => {
                assert!(matches!(
                    program.ast.expr(*right).kind,
                    ExprKind::Infix {
                        operator: BinaryOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("expected addition at the top, got {:?}", other),
        }
    }

    #[test]
    fn test_assignment_is_right_associative() {
        parse_ok("int main() { int a = 0; int b = 0; a = b = 3; return a; }");
    }

    #[test]
    fn test_call_arity_and_types_are_checked() {
        let err = parse_err(
            "int add(int a, int b) { return a + b; } int main() { return add(1); }",
        );
        assert!(matches!(&err, CompileError::LanguageViolation { message, .. }
            if message.contains("argument(s)")));
        let err = parse_err(
            "int square(int a) { return a * a; } int main() { return square(1.5); }",
        );
        assert!(matches!(&err, CompileError::LanguageViolation { message, .. }
            if message.contains("parameter")));
    }

    #[test]
    fn test_comparison_has_byte_type() {
        let program = parse_ok("int main() { char c = 1 < 2; return 0; }");
        drop(program);
    }

    #[test]
    fn test_incompatible_operands_are_rejected() {
        let err = parse_err("int main() { unsigned int u; return 1 + u; }");
        assert!(matches!(&err, CompileError::LanguageViolation { message, .. }
            if message.contains("incompatible")));
    }
}
