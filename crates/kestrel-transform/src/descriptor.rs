//! Analysis results for one closure site.

use kestrel_diagnostics::Span;
use kestrel_hir::{Param, Stmt};
use kestrel_types::{ClassId, ClassType, FieldId, LocalId, MethodId, Type};

/// One piece of state a closure needs
#[derive(Debug, Clone, PartialEq)]
pub enum CapturedBinding {
    /// Effectively-final local or parameter, copied at site evaluation
    Local { id: LocalId, name: String, ty: Type },
    /// Enclosing instance `depth` levels out, held by reference
    EnclosingInstance { depth: u32, class: ClassId },
    /// Field read through an enclosing instance (never snapshotted)
    OuterField { depth: u32, field: FieldId },
    /// Type whose implementation a super-qualified call must run
    SuperDispatchContext { declaring_type: ClassId },
    /// Receiver of a bound method reference, evaluated once at the site
    BoundReceiver { ty: Type },
}

/// Storage slot of a capturing closure, one adapter field each
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Local { id: LocalId, name: String, ty: Type },
    Instance { depth: u32, class: ClassId },
    Receiver { ty: Type },
}

impl Slot {
    pub fn field_name(&self) -> String {
        match self {
            Slot::Local { name, .. } => format!("val${}", name),
            Slot::Instance { depth, .. } => format!("this${}", depth),
            Slot::Receiver { .. } => "receiver$".to_string(),
        }
    }

    pub fn ty(&self) -> Type {
        match self {
            Slot::Local { ty, .. } | Slot::Receiver { ty } => ty.clone(),
            Slot::Instance { class, .. } => Type::class(*class),
        }
    }
}

/// The resolved single abstract method of a target type
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionalInterfaceDescriptor {
    /// Intersection member (or the target itself) that supplies the method
    pub interface: ClassType,
    /// The abstract method as declared
    pub method: MethodId,
    pub name: String,
    /// Parameter types instantiated at the target's type arguments
    pub params: Vec<Type>,
    pub return_type: Type,
    pub throws: Vec<Type>,
    /// Signature an implementation must declare to be dispatched to
    pub erased_params: Vec<Type>,
    pub erased_return: Type,
    /// Remaining intersection members (marker or default-method interfaces)
    pub markers: Vec<ClassType>,
}

impl FunctionalInterfaceDescriptor {
    pub fn returns_value(&self) -> bool {
        !self.return_type.is_void()
    }
}

/// How a method reference reaches its target
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceForm {
    /// `Type::staticMember`
    Static { method: MethodId },
    /// `Type::instanceMember`; first SAM argument is the receiver
    UnboundInstance { method: MethodId, receiver_ty: Type },
    /// `expr::instanceMember` / `this::instanceMember`
    BoundInstance { method: MethodId, receiver: BoundReceiver },
    /// `Type::new` / `Elem[]::new`
    Constructor(ConstructorTarget),
    /// `super::m` and its qualified forms
    Super {
        method: MethodId,
        declaring_type: ClassId,
        depth: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundReceiver {
    /// `this` or `Outer.this`
    Instance { depth: u32 },
    /// Any other expression, null-checked when the site is evaluated
    Expr { ty: Type },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstructorTarget {
    Class {
        class: ClassType,
        /// None selects the implicit no-argument constructor
        ctor: Option<MethodId>,
        /// Enclosing-instance depth threaded into an inner class
        outer_depth: Option<u32>,
    },
    Array { element: Type },
}

impl ReferenceForm {
    pub fn label(&self) -> &'static str {
        match self {
            ReferenceForm::Static { .. } => "static",
            ReferenceForm::UnboundInstance { .. } => "unbound",
            ReferenceForm::BoundInstance { .. } => "bound",
            ReferenceForm::Constructor(_) => "constructor",
            ReferenceForm::Super { .. } => "super",
        }
    }
}

/// Everything the emitter needs to materialize one site
#[derive(Debug, Clone)]
pub struct ClosureDescriptor {
    pub identity: String,
    pub adapter: ClassId,
    /// Type that lexically contains the site
    pub enclosing: ClassId,
    pub span: Span,
    pub bindings: Vec<CapturedBinding>,
    pub slots: Vec<Slot>,
    pub sam: FunctionalInterfaceDescriptor,
    /// Parameters of the synthesized implementation (erased types)
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

impl ClosureDescriptor {
    /// Non-empty bindings, including a lone super-dispatch context
    pub fn capturing(&self) -> bool {
        !self.bindings.is_empty()
    }

    pub fn super_dispatch(&self) -> Option<ClassId> {
        self.bindings.iter().find_map(|b| match b {
            CapturedBinding::SuperDispatchContext { declaring_type } => Some(*declaring_type),
            _ => None,
        })
    }
}
