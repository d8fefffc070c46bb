//! Abstract syntax tree
//!
//! Every node lives in one owning arena ([`Ast`]) and nodes reference each
//! other through stable integer handles, so parent links and forward
//! references (goto targets) are plain index operations instead of shared
//! ownership cycles.

use stackc_core::{Number, NumberType};

use crate::scope::Scope;
use crate::token::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// The type of a variable, parameter, or expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarType {
    /// A C scalar type mapped 1-to-1 to a number type.
    Basic(NumberType),
    Void,
    /// Reserved: pointers parse and occupy storage, but no pointer operation
    /// is part of the dialect.
    Pointer {
        target: Box<VarType>,
        size_in_bytes: u16,
    },
}

impl VarType {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            VarType::Basic(ty) => ty.size_in_bytes(),
            VarType::Void => 0,
            VarType::Pointer { size_in_bytes, .. } => *size_in_bytes as usize,
        }
    }

    pub fn basic(&self) -> Option<NumberType> {
        match self {
            VarType::Basic(ty) => Some(*ty),
            _ => None,
        }
    }

    /// Implicit conversion is defined only between two basic types: same
    /// number-type family, and the source at least as wide as the
    /// destination. All other pairs are incompatible.
    pub fn can_be_converted_to(&self, other: &VarType) -> bool {
        match (self, other) {
            (VarType::Basic(from), VarType::Basic(to)) => {
                from.interpretation() == to.interpretation()
                    && from.size_in_bytes() >= to.size_in_bytes()
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for VarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarType::Basic(ty) => write!(f, "{}", ty),
            VarType::Void => write!(f, "void"),
            VarType::Pointer { target, .. } => write!(f, "{}*", target),
        }
    }
}

/// The common type two operands meet at, if any.
pub(crate) fn unify(a: &VarType, b: &VarType) -> Option<VarType> {
    if a == b {
        Some(a.clone())
    } else if a.can_be_converted_to(b) {
        Some(b.clone())
    } else if b.can_be_converted_to(a) {
        Some(a.clone())
    } else {
        None
    }
}

/// A named entity in some scope.
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    /// A type name (the builtins, in the global scope).
    Type { name: String, ty: VarType },
    Variable {
        name: String,
        is_const: bool,
        ty: VarType,
        initializer: Option<ExprId>,
        span: Span,
    },
    Function {
        name: String,
        return_type: VarType,
        parameters: Vec<DefId>,
        /// Filled in after the body parses, so recursive calls resolve.
        body: Option<StmtId>,
        span: Span,
    },
}

impl Definition {
    pub fn name(&self) -> &str {
        match self {
            Definition::Type { name, .. }
            | Definition::Variable { name, .. }
            | Definition::Function { name, .. } => name,
        }
    }
}

/// A statement label. Labels attach to the statement that follows them.
#[derive(Debug, Clone, PartialEq)]
pub enum Label {
    Case(ExprId),
    Default,
    Goto(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub labels: Vec<Label>,
    pub parent: Option<StmtId>,
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// A `{…}` block with its own scope. `synthetic` marks blocks the parser
    /// wrapped around single-statement bodies of control constructs.
    Compound {
        scope: ScopeId,
        statements: Vec<StmtId>,
        synthetic: bool,
    },
    If {
        condition: ExprId,
        then_body: StmtId,
        else_body: Option<StmtId>,
    },
    Switch {
        value: ExprId,
        body: StmtId,
    },
    While {
        condition: ExprId,
        body: StmtId,
    },
    DoWhile {
        body: StmtId,
        condition: ExprId,
    },
    For {
        initializer: Option<ExprId>,
        condition: Option<ExprId>,
        update: Option<ExprId>,
        body: StmtId,
    },
    Return {
        value: Option<ExprId>,
    },
    Goto {
        label: String,
        /// Bound by the fixup pass after the function body parses.
        target: Option<StmtId>,
    },
    Expression {
        expr: ExprId,
    },
    /// A lone `;`, the carrier for labels with no statement of their own.
    Empty,
    /// A local variable declaration. The initializer, when present, is the
    /// assignment expression the declaration lowers to.
    Declaration {
        variable: DefId,
        initializer: Option<ExprId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    LogicalNot,
    BitwiseNot,
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostfixOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    LogicalAnd,
    LogicalOr,
}

/// An expression with its resolved value type.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub ty: VarType,
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    NumberLiteral {
        value: Number,
    },
    Variable {
        definition: DefId,
    },
    /// `target op= value`; `operator` is `None` for plain assignment.
    Assignment {
        target: ExprId,
        operator: Option<BinaryOp>,
        value: ExprId,
    },
    Prefix {
        operator: UnaryOp,
        operand: ExprId,
    },
    Postfix {
        operator: PostfixOp,
        operand: ExprId,
    },
    Infix {
        operator: BinaryOp,
        left: ExprId,
        right: ExprId,
    },
    Ternary {
        condition: ExprId,
        then_value: ExprId,
        else_value: ExprId,
    },
    Call {
        function: DefId,
        arguments: Vec<ExprId>,
    },
    /// Reserved: parses, but arrays are not part of the dialect.
    Subscript {
        target: ExprId,
        index: ExprId,
    },
    /// `(type) operand`; the target type is the expression's own type.
    Cast {
        operand: ExprId,
    },
}

/// The owning arena for definitions, statements, expressions, and scopes.
#[derive(Debug, Default)]
pub struct Ast {
    defs: Vec<Definition>,
    stmts: Vec<Statement>,
    exprs: Vec<Expression>,
    pub(crate) scopes: Vec<Scope>,
}

impl Ast {
    pub fn new() -> Ast {
        Ast::default()
    }

    pub fn add_def(&mut self, def: Definition) -> DefId {
        self.defs.push(def);
        DefId(self.defs.len() as u32 - 1)
    }

    pub fn def(&self, id: DefId) -> &Definition {
        &self.defs[id.0 as usize]
    }

    pub fn def_mut(&mut self, id: DefId) -> &mut Definition {
        &mut self.defs[id.0 as usize]
    }

    pub fn add_stmt(&mut self, stmt: Statement) -> StmtId {
        self.stmts.push(stmt);
        StmtId(self.stmts.len() as u32 - 1)
    }

    pub fn stmt(&self, id: StmtId) -> &Statement {
        &self.stmts[id.0 as usize]
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Statement {
        &mut self.stmts[id.0 as usize]
    }

    pub fn add_expr(&mut self, expr: Expression) -> ExprId {
        self.exprs.push(expr);
        ExprId(self.exprs.len() as u32 - 1)
    }

    pub fn expr(&self, id: ExprId) -> &Expression {
        &self.exprs[id.0 as usize]
    }

    /// Direct child statements of a statement.
    pub fn stmt_children(&self, id: StmtId) -> Vec<StmtId> {
        match &self.stmt(id).kind {
            StmtKind::Compound { statements, .. } => statements.clone(),
            StmtKind::If {
                then_body,
                else_body,
                ..
            } => {
                let mut children = vec![*then_body];
                children.extend(else_body);
                children
            }
            StmtKind::Switch { body, .. }
            | StmtKind::While { body, .. }
            | StmtKind::DoWhile { body, .. }
            | StmtKind::For { body, .. } => vec![*body],
            _ => Vec::new(),
        }
    }

    /// All statements of a subtree in preorder, including the root.
    pub fn recursive_statements(&self, id: StmtId) -> Vec<StmtId> {
        let mut result = Vec::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            result.push(current);
            let mut children = self.stmt_children(current);
            children.reverse();
            pending.extend(children);
        }
        result
    }

    /// The statements of a subtree that carry at least one label.
    pub fn labeled_statements(&self, id: StmtId) -> Vec<StmtId> {
        self.recursive_statements(id)
            .into_iter()
            .filter(|&stmt| !self.stmt(stmt).labels.is_empty())
            .collect()
    }

    /// Walk the parent chain upward, nearest ancestor first.
    pub fn statement_ancestors(&self, id: StmtId) -> Vec<StmtId> {
        let mut ancestors = Vec::new();
        let mut current = self.stmt(id).parent;
        while let Some(stmt) = current {
            ancestors.push(stmt);
            current = self.stmt(stmt).parent;
        }
        ancestors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_requires_same_family_and_narrowing() {
        let sint32 = VarType::Basic(NumberType::Sint32);
        let sint16 = VarType::Basic(NumberType::Sint16);
        let uint32 = VarType::Basic(NumberType::Uint32);
        let fp64 = VarType::Basic(NumberType::Fp64);
        let fp32 = VarType::Basic(NumberType::Fp32);

        assert!(sint32.can_be_converted_to(&sint32));
        assert!(sint32.can_be_converted_to(&sint16));
        assert!(!sint16.can_be_converted_to(&sint32));
        assert!(!sint32.can_be_converted_to(&uint32));
        assert!(fp64.can_be_converted_to(&fp32));
        assert!(!fp64.can_be_converted_to(&sint32));
    }

    #[test]
    fn test_nothing_converts_to_or_from_void_and_pointers() {
        let int = VarType::Basic(NumberType::Sint32);
        let pointer = VarType::Pointer {
            target: Box::new(int.clone()),
            size_in_bytes: 4,
        };
        assert!(!int.can_be_converted_to(&VarType::Void));
        assert!(!pointer.can_be_converted_to(&pointer.clone()));
        assert!(!pointer.can_be_converted_to(&int));
    }

    #[test]
    fn test_unify_picks_the_common_type() {
        let long = VarType::Basic(NumberType::Sint64);
        let int = VarType::Basic(NumberType::Sint32);
        assert_eq!(unify(&int, &int), Some(int.clone()));
        // Narrowing is the legal implicit direction, so mixed operands meet
        // at the narrower type.
        assert_eq!(unify(&long, &int), Some(int.clone()));
        assert_eq!(unify(&int, &VarType::Basic(NumberType::Uint32)), None);
    }

    #[test]
    fn test_ancestors_and_traversal() {
        let mut ast = Ast::new();
        let scope = ast.add_scope(None, None);
        let inner = ast.add_stmt(Statement {
            labels: vec![Label::Goto("a".to_string())],
            parent: None,
            span: Span::default(),
            kind: StmtKind::Return { value: None },
        });
        let block = ast.add_stmt(Statement {
            labels: Vec::new(),
            parent: None,
            span: Span::default(),
            kind: StmtKind::Compound {
                scope,
                statements: vec![inner],
                synthetic: false,
            },
        });
        ast.stmt_mut(inner).parent = Some(block);

        assert_eq!(ast.recursive_statements(block), vec![block, inner]);
        assert_eq!(ast.labeled_statements(block), vec![inner]);
        assert_eq!(ast.statement_ancestors(inner), vec![block]);
    }
}
