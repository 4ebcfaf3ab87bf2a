//! Adapter emission.
//!
//! Materializes a [`ClosureDescriptor`] as a synthesized adapter type and
//! produces the expression that replaces the closure site.

use crate::descriptor::{ClosureDescriptor, Slot};
use crate::options::SingletonPolicy;
use kestrel_hir::{
    AdapterInfo, CaptureKind, CompilationUnit, Expr, Field, Instantiation, Method, MethodKind, TypeDecl, TypeKind,
};

/// Build the adapter type for one site.
///
/// Capturing adapters are allocated at every evaluation of the site and hold
/// one final field per slot. Non-capturing adapters have no fields and are
/// shared through a singleton created according to `policy`.
pub fn emit_adapter(unit: &CompilationUnit, descriptor: &ClosureDescriptor, policy: SingletonPolicy) -> TypeDecl {
    let sam = &descriptor.sam;
    let mut decl = TypeDecl::new(descriptor.adapter, descriptor.identity.clone(), TypeKind::Adapter);
    decl.is_static = true;
    decl.outer = Some(unit.nearest_named(descriptor.enclosing));
    decl.span = descriptor.span;
    decl.interfaces = std::iter::once(sam.interface.clone())
        .chain(sam.markers.iter().cloned())
        .collect();

    decl.fields = descriptor
        .slots
        .iter()
        .map(|slot| Field {
            name: slot.field_name(),
            ty: slot.ty(),
            is_static: false,
            is_final: true,
            init: None,
        })
        .collect();

    decl.methods.push(Method {
        name: sam.name.clone(),
        type_params: Vec::new(),
        params: descriptor.params.clone(),
        return_type: sam.erased_return.clone(),
        throws: sam.throws.clone(),
        kind: MethodKind::Method,
        is_static: false,
        is_abstract: false,
        is_default: false,
        is_varargs: false,
        body: Some(descriptor.body.clone()),
        span: descriptor.span,
    });

    let instantiation = if descriptor.capturing() {
        Instantiation::PerEvaluation
    } else {
        policy.instantiation()
    };
    decl.adapter = Some(AdapterInfo {
        site: descriptor.span,
        enclosing: descriptor.enclosing,
        functional_interface: sam.interface.clone(),
        sam: sam.name.clone(),
        markers: sam.markers.clone(),
        captures: descriptor.slots.iter().map(capture_kind).collect(),
        super_dispatch: descriptor.super_dispatch(),
        instantiation,
    });
    decl
}

fn capture_kind(slot: &Slot) -> CaptureKind {
    match slot {
        Slot::Local { id, name, .. } => CaptureKind::Local {
            id: *id,
            name: name.clone(),
        },
        Slot::Instance { depth, .. } => CaptureKind::EnclosingInstance { depth: *depth },
        Slot::Receiver { .. } => CaptureKind::BoundReceiver,
    }
}

/// Expression evaluated in place of the closure site. `captures` holds the
/// slot initializers in slot order.
pub fn replacement(descriptor: &ClosureDescriptor, captures: Vec<Expr>) -> Expr {
    if descriptor.capturing() {
        Expr::NewClosure {
            adapter: descriptor.adapter,
            captures,
        }
    } else {
        Expr::ClosureSingleton {
            adapter: descriptor.adapter,
        }
    }
}
