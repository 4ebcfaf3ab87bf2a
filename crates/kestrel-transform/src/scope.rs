//! Lexical context of a closure site: visible locals and enclosing instances.

use crate::error::{ClosureError, Result};
use kestrel_diagnostics::Span;
use kestrel_hir::{CompilationUnit, Field, Method, Param, TypeDecl, TypeKind};
use kestrel_types::{ClassId, FieldId, LocalId, MethodId, Type};

/// A local visible at some point of a body
#[derive(Debug, Clone)]
pub struct LocalInfo {
    pub id: LocalId,
    pub name: String,
    pub ty: Type,
    pub effectively_final: bool,
}

impl From<&Param> for LocalInfo {
    fn from(param: &Param) -> Self {
        Self {
            id: param.id,
            name: param.name.clone(),
            ty: param.ty.clone(),
            effectively_final: param.effectively_final,
        }
    }
}

/// Stack of visible locals; blocks record a mark and reset to it on exit
#[derive(Debug, Default)]
pub struct Scope {
    locals: Vec<LocalInfo>,
}

impl Scope {
    pub fn declare(&mut self, local: LocalInfo) {
        self.locals.push(local);
    }

    pub fn mark(&self) -> usize {
        self.locals.len()
    }

    pub fn reset(&mut self, mark: usize) {
        self.locals.truncate(mark);
    }

    pub fn lookup(&self, id: LocalId) -> Option<&LocalInfo> {
        self.locals.iter().rev().find(|l| l.id == id)
    }
}

/// Where a site sits: its enclosing type, static-ness and visible locals
pub struct SiteContext<'a> {
    pub unit: &'a CompilationUnit,
    /// Type that lexically contains the site
    pub class: ClassId,
    /// Enclosing-instance chain; empty in a static context
    pub chain: &'a [ClassId],
    pub scope: &'a Scope,
    pub span: Span,
}

impl<'a> SiteContext<'a> {
    pub fn decl(&self, id: ClassId) -> Result<&'a TypeDecl> {
        self.unit
            .decl(id)
            .ok_or_else(|| ClosureError::unresolvable(self.span, format!("unknown type #{}", id.0)))
    }

    pub fn method(&self, id: MethodId) -> Result<&'a Method> {
        self.unit.method(id).ok_or_else(|| {
            ClosureError::unresolvable(
                self.span,
                format!("unknown method #{} of {}", id.index, self.unit.class_name(id.class)),
            )
        })
    }

    pub fn field(&self, id: FieldId) -> Result<&'a Field> {
        self.unit.field(id).ok_or_else(|| {
            ClosureError::invalid_capture(
                self.span,
                format!("unknown field #{} of {}", id.index, self.unit.class_name(id.class)),
            )
        })
    }

    fn require_instance(&self, what: &str) -> Result<()> {
        if self.chain.is_empty() {
            return Err(ClosureError::invalid_capture(
                self.span,
                format!("{} needs an enclosing instance, but the site is in a static context", what),
            ));
        }
        Ok(())
    }

    /// Depth of `this` (None) or `Q.this`. An interface qualifier
    /// (`Iface.super`) names the innermost instance.
    pub fn this_depth(&self, qualifier: Option<ClassId>) -> Result<u32> {
        self.require_instance("`this`")?;
        let Some(class) = qualifier else {
            return Ok(0);
        };
        if self.decl(class)?.is_interface {
            return Ok(0);
        }
        self.chain
            .iter()
            .position(|c| *c == class)
            .map(|d| d as u32)
            .ok_or_else(|| {
                ClosureError::invalid_capture(
                    self.span,
                    format!("`{}.this` is not an enclosing instance here", self.unit.class_name(class)),
                )
            })
    }

    /// Innermost enclosing instance that inherits members of `owner`.
    pub fn member_depth(&self, owner: ClassId) -> Result<u32> {
        self.require_instance(&format!("member of {}", self.unit.class_name(owner)))?;
        self.chain
            .iter()
            .position(|c| self.unit.is_subclass(*c, owner))
            .map(|d| d as u32)
            .ok_or_else(|| {
                ClosureError::invalid_capture(
                    self.span,
                    format!(
                        "no enclosing instance of {} is reachable from {}",
                        self.unit.class_name(owner),
                        self.unit.qualified_path(self.class)
                    ),
                )
            })
    }

    /// Enclosing-instance depth to pass when creating `class` without an
    /// explicit outer instance, or None when it takes none.
    pub fn creation_outer_depth(&self, class: ClassId) -> Result<Option<u32>> {
        let decl = self.decl(class)?;
        match decl.outer {
            Some(outer) if !decl.is_static && decl.kind != TypeKind::TopLevel => {
                self.member_depth(outer).map(Some)
            }
            _ => Ok(None),
        }
    }
}
