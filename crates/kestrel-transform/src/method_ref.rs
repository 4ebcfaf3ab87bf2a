//! Method-reference resolution.
//!
//! Classifies `Q::m` and `Q::new` into a [`ReferenceForm`] and picks the one
//! member the adapter body will call. Overloads are tried in three phases
//! (strict, loose, variadic); the first phase with an applicable member
//! decides, and the most specific member of that phase wins.

use crate::bridge::{applicable, more_specific, ArgMode, Phase};
use crate::descriptor::{BoundReceiver, ConstructorTarget, FunctionalInterfaceDescriptor, ReferenceForm};
use crate::error::{ClosureError, Result};
use crate::scope::SiteContext;
use kestrel_hir::{type_bindings, Expr, MethodRefExpr, RefMember, RefQualifier};
use kestrel_types::{ClassId, ClassType, MethodId, Type};
use log::trace;

/// A resolved reference and the signature the adapter must call through
#[derive(Debug, Clone)]
pub struct Resolved {
    pub form: ReferenceForm,
    /// Parameters of the target, instantiated at the qualifier's type arguments
    pub params: Vec<Type>,
    pub mode: ArgMode,
    /// Static type of the call's value; `Void` when it produces none
    pub result: Type,
}

struct Candidate {
    method: MethodId,
    params: Vec<Type>,
    result: Type,
}

pub fn resolve(
    cx: &SiteContext<'_>,
    reference: &MethodRefExpr,
    sam: &FunctionalInterfaceDescriptor,
) -> Result<Resolved> {
    let resolved = match (&reference.member, &reference.qualifier) {
        (RefMember::New, RefQualifier::Type(ty)) => resolve_constructor(cx, ty, sam)?,
        (RefMember::New, _) => {
            return Err(ClosureError::unresolvable(
                cx.span,
                "constructor references need a type qualifier",
            ))
        }
        (RefMember::Method(name), RefQualifier::Type(ty)) => {
            resolve_type_member(cx, ty, name, &reference.type_args, sam)?
        }
        (RefMember::Method(name), RefQualifier::Expr { expr, ty }) => {
            resolve_bound(cx, expr, ty, name, &reference.type_args, sam)?
        }
        (RefMember::Method(name), RefQualifier::Super { qualifier }) => {
            resolve_super(cx, *qualifier, name, &reference.type_args, sam)?
        }
    };
    trace!(
        "method reference resolved as {} with {} parameter(s)",
        resolved.form.label(),
        resolved.params.len()
    );
    Ok(resolved)
}

fn class_of(cx: &SiteContext<'_>, ty: &Type) -> Result<ClassType> {
    ty.as_class().cloned().ok_or_else(|| {
        ClosureError::unresolvable(
            cx.span,
            format!("{} has no members to reference", cx.unit.type_name(ty)),
        )
    })
}

/// Parameter and result types of `method` seen through `receiver`.
fn instantiate(cx: &SiteContext<'_>, method: MethodId, receiver: &ClassType, type_args: &[Type]) -> Result<Candidate> {
    let decl = cx.decl(method.class)?;
    let declared = cx.method(method)?;
    let mut bindings = cx
        .unit
        .as_super(receiver, method.class)
        .map(|owner| type_bindings(&decl.type_params, &owner.args))
        .unwrap_or_default();
    bindings.extend(type_bindings(&declared.type_params, type_args));
    Ok(Candidate {
        method,
        params: declared.params.iter().map(|p| p.ty.substitute(&bindings)).collect(),
        result: declared.return_type.substitute(&bindings),
    })
}

fn candidates(
    cx: &SiteContext<'_>,
    owner: &ClassType,
    name: &str,
    type_args: &[Type],
    keep: impl Fn(&kestrel_hir::Method) -> bool,
) -> Result<Vec<Candidate>> {
    let mut out = Vec::new();
    for id in cx.unit.find_methods(owner.id, name) {
        if keep(cx.method(id)?) {
            out.push(instantiate(cx, id, owner, type_args)?);
        }
    }
    Ok(out)
}

/// Index and argument mode of the most specific candidate applicable in `phase`.
fn pick(cx: &SiteContext<'_>, candidates: &[Candidate], args: &[Type], phase: Phase) -> Result<Option<(usize, ArgMode)>> {
    let mut hits = Vec::new();
    for (index, candidate) in candidates.iter().enumerate() {
        let method = cx.method(candidate.method)?;
        if let Some(mode) = applicable(cx.unit, method, &candidate.params, args, phase) {
            hits.push((index, mode));
        }
    }
    if hits.len() <= 1 {
        return Ok(hits.pop());
    }
    let best = hits.iter().position(|(i, _)| {
        hits.iter()
            .all(|(j, _)| i == j || more_specific(cx.unit, &candidates[*i].params, &candidates[*j].params))
    });
    match best {
        Some(position) => Ok(Some(hits.swap_remove(position))),
        None => Err(ClosureError::unresolvable(
            cx.span,
            format!(
                "reference to `{}` is ambiguous between {} overloads",
                method_name(cx, candidates[hits[0].0].method),
                hits.len()
            ),
        )),
    }
}

fn method_name(cx: &SiteContext<'_>, id: MethodId) -> String {
    cx.unit.method(id).map(|m| m.name.clone()).unwrap_or_default()
}

fn describe_args(cx: &SiteContext<'_>, args: &[Type]) -> String {
    let names: Vec<_> = args.iter().map(|a| cx.unit.type_name(a)).collect();
    format!("({})", names.join(", "))
}

fn no_member(cx: &SiteContext<'_>, owner: ClassId, name: &str) -> ClosureError {
    ClosureError::unresolvable(
        cx.span,
        format!("{} has no method named `{}`", cx.unit.class_name(owner), name),
    )
}

fn no_overload(cx: &SiteContext<'_>, owner: ClassId, name: &str, args: &[Type]) -> ClosureError {
    ClosureError::arity(
        cx.span,
        format!(
            "no `{}` of {} accepts {}",
            name,
            cx.unit.class_name(owner),
            describe_args(cx, args)
        ),
    )
}

/// Run the phases over candidates receiving all SAM arguments.
fn select<'c>(cx: &SiteContext<'_>, list: &'c [Candidate], args: &[Type]) -> Result<Option<(&'c Candidate, ArgMode)>> {
    for phase in Phase::ALL {
        if let Some((index, mode)) = pick(cx, list, args, phase)? {
            return Ok(Some((&list[index], mode)));
        }
    }
    Ok(None)
}

fn resolve_constructor(cx: &SiteContext<'_>, ty: &Type, sam: &FunctionalInterfaceDescriptor) -> Result<Resolved> {
    if let Type::Array(element) = ty {
        let length = Type::int();
        let [arg] = sam.params.as_slice() else {
            return Err(ClosureError::arity(
                cx.span,
                format!(
                    "array constructor takes one length argument, {} supplies {}",
                    sam.name,
                    sam.params.len()
                ),
            ));
        };
        if !cx.unit.is_loosely_assignable(arg, &length) {
            return Err(ClosureError::arity(
                cx.span,
                format!("array length cannot be taken from {}", cx.unit.type_name(arg)),
            ));
        }
        return Ok(Resolved {
            form: ReferenceForm::Constructor(ConstructorTarget::Array {
                element: (**element).clone(),
            }),
            params: vec![length],
            mode: ArgMode::Fixed,
            result: ty.clone(),
        });
    }

    let class = class_of(cx, ty)?;
    let decl = cx.decl(class.id)?;
    if decl.is_interface || decl.is_abstract {
        return Err(ClosureError::unresolvable(
            cx.span,
            format!("{} cannot be instantiated", cx.unit.class_name(class.id)),
        ));
    }
    let outer_depth = cx.creation_outer_depth(class.id)?;
    let result = Type::Class(class.clone());

    let bindings = type_bindings(&decl.type_params, &class.args);
    let ctors: Vec<Candidate> = decl
        .constructors()
        .map(|(id, ctor)| Candidate {
            method: id,
            params: ctor.params.iter().map(|p| p.ty.substitute(&bindings)).collect(),
            result: result.clone(),
        })
        .collect();

    if ctors.is_empty() {
        if !sam.params.is_empty() {
            return Err(ClosureError::arity(
                cx.span,
                format!(
                    "{} only has the implicit no-argument constructor, {} supplies {} argument(s)",
                    cx.unit.class_name(class.id),
                    sam.name,
                    sam.params.len()
                ),
            ));
        }
        return Ok(Resolved {
            form: ReferenceForm::Constructor(ConstructorTarget::Class {
                class,
                ctor: None,
                outer_depth,
            }),
            params: Vec::new(),
            mode: ArgMode::Fixed,
            result,
        });
    }

    let Some((chosen, mode)) = select(cx, &ctors, &sam.params)? else {
        return Err(no_overload(cx, class.id, "constructor", &sam.params));
    };
    Ok(Resolved {
        form: ReferenceForm::Constructor(ConstructorTarget::Class {
            class,
            ctor: Some(chosen.method),
            outer_depth,
        }),
        params: chosen.params.clone(),
        mode,
        result,
    })
}

/// `Type::m`: either a static member taking every SAM argument, or an
/// instance member invoked on the first one.
fn resolve_type_member(
    cx: &SiteContext<'_>,
    ty: &Type,
    name: &str,
    type_args: &[Type],
    sam: &FunctionalInterfaceDescriptor,
) -> Result<Resolved> {
    let owner = class_of(cx, ty)?;
    let statics = candidates(cx, &owner, name, type_args, |m| m.is_static)?;
    let instances = candidates(cx, &owner, name, type_args, |m| !m.is_static)?;
    if statics.is_empty() && instances.is_empty() {
        return Err(no_member(cx, owner.id, name));
    }

    let unbound_args = match sam.params.split_first() {
        Some((first, rest)) if cx.unit.is_loosely_assignable(first, ty) => Some(rest),
        _ => None,
    };

    for phase in Phase::ALL {
        let as_static = pick(cx, &statics, &sam.params, phase)?;
        let as_unbound = match unbound_args {
            Some(rest) => pick(cx, &instances, rest, phase)?,
            None => None,
        };
        match (as_static, as_unbound) {
            (Some(_), Some(_)) => {
                return Err(ClosureError::unresolvable(
                    cx.span,
                    format!(
                        "`{}::{}` matches both a static and an instance method",
                        cx.unit.type_name(ty),
                        name
                    ),
                ))
            }
            (Some((index, mode)), None) => {
                let chosen = &statics[index];
                return Ok(Resolved {
                    form: ReferenceForm::Static { method: chosen.method },
                    params: chosen.params.clone(),
                    mode,
                    result: chosen.result.clone(),
                });
            }
            (None, Some((index, mode))) => {
                let chosen = &instances[index];
                return Ok(Resolved {
                    form: ReferenceForm::UnboundInstance {
                        method: chosen.method,
                        receiver_ty: ty.clone(),
                    },
                    params: chosen.params.clone(),
                    mode,
                    result: chosen.result.clone(),
                });
            }
            (None, None) => {}
        }
    }
    Err(no_overload(cx, owner.id, name, &sam.params))
}

/// `expr::m`; `this::m` and `Outer.this::m` reuse the enclosing instance.
fn resolve_bound(
    cx: &SiteContext<'_>,
    expr: &Expr,
    ty: &Type,
    name: &str,
    type_args: &[Type],
    sam: &FunctionalInterfaceDescriptor,
) -> Result<Resolved> {
    let owner = class_of(cx, ty)?;
    let list = candidates(cx, &owner, name, type_args, |m| !m.is_static)?;
    if list.is_empty() {
        return Err(no_member(cx, owner.id, name));
    }
    let receiver = match expr {
        Expr::This { qualifier } => BoundReceiver::Instance {
            depth: cx.this_depth(*qualifier)?,
        },
        _ => BoundReceiver::Expr { ty: ty.clone() },
    };
    let Some((chosen, mode)) = select(cx, &list, &sam.params)? else {
        return Err(no_overload(cx, owner.id, name, &sam.params));
    };
    Ok(Resolved {
        form: ReferenceForm::BoundInstance {
            method: chosen.method,
            receiver,
        },
        params: chosen.params.clone(),
        mode,
        result: chosen.result.clone(),
    })
}

/// `super::m`, `Outer.super::m` and `Iface.super::m`.
fn resolve_super(
    cx: &SiteContext<'_>,
    qualifier: Option<ClassId>,
    name: &str,
    type_args: &[Type],
    sam: &FunctionalInterfaceDescriptor,
) -> Result<Resolved> {
    let depth = cx.this_depth(qualifier)?;
    let innermost = cx.chain[0];
    let start = match qualifier {
        Some(iface) if cx.decl(iface)?.is_interface => cx
            .decl(innermost)?
            .interfaces
            .iter()
            .find(|i| i.id == iface)
            .cloned()
            .unwrap_or_else(|| ClassType::raw(iface)),
        _ => {
            let class = cx.chain[depth as usize];
            cx.decl(class)?.superclass.clone().ok_or_else(|| {
                ClosureError::unresolvable(
                    cx.span,
                    format!("{} has no superclass to reference", cx.unit.class_name(class)),
                )
            })?
        }
    };

    let list = candidates(cx, &start, name, type_args, |m| !m.is_static && !m.is_abstract)?;
    if list.is_empty() {
        return Err(no_member(cx, start.id, name));
    }
    let Some((chosen, mode)) = select(cx, &list, &sam.params)? else {
        return Err(no_overload(cx, start.id, name, &sam.params));
    };
    Ok(Resolved {
        form: ReferenceForm::Super {
            method: chosen.method,
            declaring_type: chosen.method.class,
            depth,
        },
        params: chosen.params.clone(),
        mode,
        result: chosen.result.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::scope::Scope;
    use kestrel_diagnostics::Span;
    use kestrel_hir::build::{MethodDef, UnitBuilder};
    use kestrel_hir::CompilationUnit;
    use kestrel_types::PrimitiveKind;

    fn sam(params: Vec<Type>, return_type: Type) -> FunctionalInterfaceDescriptor {
        FunctionalInterfaceDescriptor {
            interface: ClassType::raw(ClassId(0)),
            method: MethodId {
                class: ClassId(0),
                index: 0,
            },
            name: "apply".to_string(),
            erased_params: params.clone(),
            params,
            erased_return: return_type.clone(),
            return_type,
            throws: vec![],
            markers: vec![],
        }
    }

    fn reference(qualifier: RefQualifier, member: RefMember) -> MethodRefExpr {
        MethodRefExpr {
            qualifier,
            member,
            type_args: vec![],
            target: Type::Object,
            span: Span::DUMMY,
        }
    }

    fn site<'a>(unit: &'a CompilationUnit, class: ClassId, chain: &'a [ClassId], scope: &'a Scope) -> SiteContext<'a> {
        SiteContext {
            unit,
            class,
            chain,
            scope,
            span: Span::DUMMY,
        }
    }

    #[test]
    fn test_static_and_unbound_forms() {
        let mut b = UnitBuilder::new("Refs");
        let text = b.class("Text");
        let s = b.local("s", Type::class(text));
        b.method(text, MethodDef::new("parse").static_().params(vec![s]).returns(Type::int()));
        b.method(text, MethodDef::new("length").returns(Type::int()));
        let unit = b.finish();
        let scope = Scope::default();
        let cx = site(&unit, text, &[], &scope);

        let parse = reference(RefQualifier::Type(Type::class(text)), RefMember::Method("parse".into()));
        let resolved = resolve(&cx, &parse, &sam(vec![Type::class(text)], Type::Boxed(PrimitiveKind::Int))).unwrap();
        assert_eq!(resolved.form.label(), "static");
        assert_eq!(resolved.result, Type::int());

        let length = reference(RefQualifier::Type(Type::class(text)), RefMember::Method("length".into()));
        let resolved = resolve(&cx, &length, &sam(vec![Type::class(text)], Type::int())).unwrap();
        assert!(matches!(resolved.form, ReferenceForm::UnboundInstance { .. }));
        assert!(resolved.params.is_empty());
    }

    #[test]
    fn test_static_and_instance_both_applicable_is_ambiguous() {
        let mut b = UnitBuilder::new("Refs");
        let text = b.class("Text");
        let s = b.local("s", Type::class(text));
        b.method(text, MethodDef::new("size").static_().params(vec![s]).returns(Type::int()));
        b.method(text, MethodDef::new("size").returns(Type::int()));
        let unit = b.finish();
        let scope = Scope::default();
        let cx = site(&unit, text, &[], &scope);

        let size = reference(RefQualifier::Type(Type::class(text)), RefMember::Method("size".into()));
        let err = resolve(&cx, &size, &sam(vec![Type::class(text)], Type::int())).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnresolvableReference);

        let missing = reference(RefQualifier::Type(Type::class(text)), RefMember::Method("nope".into()));
        let err = resolve(&cx, &missing, &sam(vec![], Type::int())).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnresolvableReference);

        let err = resolve(&cx, &size, &sam(vec![Type::int(), Type::int()], Type::int())).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IncompatibleArity);
    }

    #[test]
    fn test_strict_phase_wins_over_boxing() {
        let mut b = UnitBuilder::new("Refs");
        let util = b.class("Util");
        let boxed = b.local("v", Type::Boxed(PrimitiveKind::Int));
        let wide = b.local("v", Type::Primitive(PrimitiveKind::Long));
        b.method(util, MethodDef::new("show").static_().params(vec![boxed]));
        let by_widening = b.method(util, MethodDef::new("show").static_().params(vec![wide]));
        let unit = b.finish();
        let scope = Scope::default();
        let cx = site(&unit, util, &[], &scope);

        let show = reference(RefQualifier::Type(Type::class(util)), RefMember::Method("show".into()));
        let resolved = resolve(&cx, &show, &sam(vec![Type::int()], Type::Void)).unwrap();
        assert_eq!(resolved.form, ReferenceForm::Static { method: by_widening });

        let err = resolve(&cx, &show, &sam(vec![Type::Object], Type::Void)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IncompatibleArity);
    }

    #[test]
    fn test_super_reference_targets_superclass_implementation() {
        let mut b = UnitBuilder::new("Refs");
        let top = b.class("Top");
        let top_name = b.method(top, MethodDef::new("name").returns(Type::String).body(vec![]));
        let middle = b.class("Middle");
        b.extends(middle, ClassType::raw(top));
        b.method(middle, MethodDef::new("name").returns(Type::String).body(vec![]));
        let unit = b.finish();
        let scope = Scope::default();
        let chain = [middle];
        let cx = site(&unit, middle, &chain, &scope);

        let reference = reference(RefQualifier::Super { qualifier: None }, RefMember::Method("name".into()));
        let resolved = resolve(&cx, &reference, &sam(vec![], Type::String)).unwrap();
        assert_eq!(
            resolved.form,
            ReferenceForm::Super {
                method: top_name,
                declaring_type: top,
                depth: 0
            }
        );

        let err = resolve(&site(&unit, middle, &[], &scope), &reference, &sam(vec![], Type::String)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidCapture);
    }

    #[test]
    fn test_constructor_forms() {
        let mut b = UnitBuilder::new("Refs");
        let outer = b.class("Outer");
        let inner = b.member_class(outer, "Inner", false);
        let plain = b.class("Plain");
        let n = b.local("n", Type::int());
        let ctor = b.method(plain, MethodDef::constructor().params(vec![n]));
        let unit = b.finish();
        let scope = Scope::default();
        let chain = [outer];
        let cx = site(&unit, outer, &chain, &scope);

        let inner_new = reference(RefQualifier::Type(Type::class(inner)), RefMember::New);
        let resolved = resolve(&cx, &inner_new, &sam(vec![], Type::Object)).unwrap();
        assert_eq!(
            resolved.form,
            ReferenceForm::Constructor(ConstructorTarget::Class {
                class: ClassType::raw(inner),
                ctor: None,
                outer_depth: Some(0)
            })
        );

        let plain_new = reference(RefQualifier::Type(Type::class(plain)), RefMember::New);
        let resolved = resolve(&cx, &plain_new, &sam(vec![Type::Boxed(PrimitiveKind::Int)], Type::Object)).unwrap();
        assert!(matches!(
            resolved.form,
            ReferenceForm::Constructor(ConstructorTarget::Class { ctor: Some(c), outer_depth: None, .. }) if c == ctor
        ));

        let array_new = reference(RefQualifier::Type(Type::array(Type::String)), RefMember::New);
        let resolved = resolve(&cx, &array_new, &sam(vec![Type::Boxed(PrimitiveKind::Int)], Type::Object)).unwrap();
        assert_eq!(resolved.params, vec![Type::int()]);
        let err = resolve(&cx, &array_new, &sam(vec![], Type::Object)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IncompatibleArity);
    }
}
