//! Lexical scopes
//!
//! A scope is an ordered identifier-to-definition mapping with a parent
//! link. Lookup walks parents; the global scope (the namespace) has none and
//! is where unresolved names finally fail. Scopes are the only construct
//! mutated after construction.

use crate::ast::{Ast, DefId, ScopeId};
use crate::error::CompileError;
use crate::token::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    /// The function definition this scope belongs to, if any. Return
    /// statements find their enclosing function through this.
    pub owner: Option<DefId>,
    entries: Vec<(String, DefId)>,
}

impl Scope {
    /// Entries in definition order.
    pub fn entries(&self) -> &[(String, DefId)] {
        &self.entries
    }
}

impl Ast {
    pub fn add_scope(&mut self, parent: Option<ScopeId>, owner: Option<DefId>) -> ScopeId {
        self.scopes.push(Scope {
            parent,
            owner,
            entries: Vec::new(),
        });
        ScopeId(self.scopes.len() as u32 - 1)
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    /// Add a definition to a scope. Identifiers within a single scope are
    /// unique; redefining one is a name collision.
    pub fn define(&mut self, scope: ScopeId, def: DefId, span: Span) -> Result<(), CompileError> {
        let name = self.def(def).name().to_string();
        let entries = &mut self.scopes[scope.0 as usize].entries;
        if entries.iter().any(|(existing, _)| *existing == name) {
            return Err(CompileError::NameCollision { name, span });
        }
        entries.push((name, def));
        Ok(())
    }

    /// Resolve a name, walking parent scopes up to the namespace.
    pub fn look_up(&self, scope: ScopeId, name: &str) -> Option<DefId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = self.scope(id);
            if let Some((_, def)) = scope.entries.iter().find(|(entry, _)| entry == name) {
                return Some(*def);
            }
            current = scope.parent;
        }
        None
    }

    /// The function owning the nearest enclosing function scope.
    pub fn enclosing_function(&self, scope: ScopeId) -> Option<DefId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = self.scope(id);
            if let Some(owner) = scope.owner {
                return Some(owner);
            }
            current = scope.parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Definition, VarType};
    use stackc_core::NumberType;

    fn variable(name: &str) -> Definition {
        Definition::Variable {
            name: name.to_string(),
            is_const: false,
            ty: VarType::Basic(NumberType::Sint32),
            initializer: None,
            span: Span::default(),
        }
    }

    #[test]
    fn test_define_then_look_up() {
        let mut ast = Ast::new();
        let scope = ast.add_scope(None, None);
        let def = ast.add_def(variable("x"));
        ast.define(scope, def, Span::default()).unwrap();
        assert_eq!(ast.look_up(scope, "x"), Some(def));
    }

    #[test]
    fn test_redefinition_is_a_collision() {
        let mut ast = Ast::new();
        let scope = ast.add_scope(None, None);
        let first = ast.add_def(variable("x"));
        let second = ast.add_def(variable("x"));
        ast.define(scope, first, Span::default()).unwrap();
        let err = ast.define(scope, second, Span::default()).unwrap_err();
        assert!(matches!(err, CompileError::NameCollision { name, .. } if name == "x"));
    }

    #[test]
    fn test_look_up_walks_parents_and_shadows() {
        let mut ast = Ast::new();
        let outer = ast.add_scope(None, None);
        let inner = ast.add_scope(Some(outer), None);
        let outer_x = ast.add_def(variable("x"));
        let outer_y = ast.add_def(variable("y"));
        let inner_x = ast.add_def(variable("x"));
        ast.define(outer, outer_x, Span::default()).unwrap();
        ast.define(outer, outer_y, Span::default()).unwrap();
        ast.define(inner, inner_x, Span::default()).unwrap();

        assert_eq!(ast.look_up(inner, "x"), Some(inner_x));
        assert_eq!(ast.look_up(inner, "y"), Some(outer_y));
        assert_eq!(ast.look_up(outer, "x"), Some(outer_x));
        assert_eq!(ast.look_up(inner, "z"), None);
    }
}
