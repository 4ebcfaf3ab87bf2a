//! Functional-interface resolution.
//!
//! Finds the single abstract method a closure must implement. Abstract
//! redeclarations of public `Object` methods never count, an abstract method
//! overridden by a default in a subinterface is retired, and methods that
//! agree on name and parameters, as seen from the target type, are the same
//! method.

use crate::descriptor::FunctionalInterfaceDescriptor;
use crate::error::{ClosureError, Result};
use kestrel_diagnostics::Span;
use kestrel_hir::{type_bindings, CompilationUnit, MethodKind};
use kestrel_types::{ClassType, MethodId, Type};
use std::collections::HashSet;

struct Candidate {
    /// Index of the intersection member it was reached from
    member: usize,
    /// Declaring interface, instantiated along the path from the member
    owner: ClassType,
    method: MethodId,
    is_default: bool,
    /// Declared erasure, the signature an adapter implements
    erased: Vec<Type>,
    /// Erased parameters after instantiating `owner`; `Sink<String>.accept(T)`
    /// and `accept(String)` agree here
    signature: Vec<Type>,
}

pub fn resolve(unit: &CompilationUnit, target: &Type, span: Span) -> Result<FunctionalInterfaceDescriptor> {
    let members = interface_members(unit, target, span)?;

    let mut candidates = Vec::new();
    for (index, member) in members.iter().enumerate() {
        collect_methods(unit, member, index, &mut candidates);
    }

    let abstract_methods: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| !c.is_default)
        .filter(|c| !is_object_method(unit, c))
        .filter(|c| !is_retired(unit, c, &candidates))
        .collect();

    let mut signatures: Vec<(String, Vec<Type>)> = Vec::new();
    for candidate in &abstract_methods {
        let name = method_name(unit, candidate.method);
        let key = (name, candidate.signature.clone());
        if !signatures.contains(&key) {
            signatures.push(key);
        }
    }

    let target_name = unit.type_name(target);
    let chosen = match (signatures.len(), abstract_methods.first()) {
        (1, Some(chosen)) => *chosen,
        (0, _) | (_, None) => {
            return Err(ClosureError::missing_sam(
                span,
                format!("{} has no abstract method to implement", target_name),
            ))
        }
        (n, _) => {
            let names: Vec<_> = signatures.iter().map(|(name, _)| name.as_str()).collect();
            return Err(ClosureError::missing_sam(
                span,
                format!(
                    "{} has {} abstract methods ({}), expected exactly one",
                    target_name,
                    n,
                    names.join(", ")
                ),
            ));
        }
    };

    let method = unit
        .method(chosen.method)
        .ok_or_else(|| ClosureError::missing_sam(span, "dangling method id"))?;
    let bindings = unit
        .decl(chosen.owner.id)
        .map(|d| type_bindings(&d.type_params, &chosen.owner.args))
        .unwrap_or_default();
    let scope = unit.method_type_params(chosen.method);

    let interface = members[chosen.member].clone();
    let markers = members
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != chosen.member)
        .map(|(_, m)| m.clone())
        .collect();

    Ok(FunctionalInterfaceDescriptor {
        interface,
        method: chosen.method,
        name: method.name.clone(),
        params: method.params.iter().map(|p| p.ty.substitute(&bindings)).collect(),
        return_type: method.return_type.substitute(&bindings),
        throws: method.throws.iter().map(|t| t.substitute(&bindings)).collect(),
        erased_params: chosen.erased.clone(),
        erased_return: method.return_type.erasure(&scope),
        markers,
    })
}

/// Interface types named by the target; `Object` members of an
/// intersection are dropped.
fn interface_members(unit: &CompilationUnit, target: &Type, span: Span) -> Result<Vec<ClassType>> {
    let listed: Vec<&Type> = match target {
        Type::Intersection(members) => members.iter().collect(),
        other => vec![other],
    };
    let mut members = Vec::new();
    for ty in listed {
        match ty {
            Type::Object if matches!(target, Type::Intersection(_)) => {}
            Type::Class(class) if unit.decl(class.id).map_or(false, |d| d.is_interface) => {
                members.push(class.clone())
            }
            other => {
                return Err(ClosureError::missing_sam(
                    span,
                    format!("{} is not a functional interface", unit.type_name(other)),
                ))
            }
        }
    }
    if members.is_empty() {
        return Err(ClosureError::missing_sam(
            span,
            format!("{} names no interface", unit.type_name(target)),
        ));
    }
    Ok(members)
}

/// Breadth-first over the superinterfaces of `member`, instantiating
/// type arguments on the way.
fn collect_methods(unit: &CompilationUnit, member: &ClassType, index: usize, out: &mut Vec<Candidate>) {
    let mut seen = HashSet::new();
    let mut queue = std::collections::VecDeque::from([member.clone()]);
    while let Some(owner) = queue.pop_front() {
        if !seen.insert(owner.id) {
            continue;
        }
        let Some(decl) = unit.decl(owner.id) else {
            continue;
        };
        let bindings = type_bindings(&decl.type_params, &owner.args);
        for (i, method) in decl.methods.iter().enumerate() {
            if method.is_static || method.kind != MethodKind::Method {
                continue;
            }
            if !method.is_abstract && !method.is_default {
                continue;
            }
            let id = MethodId {
                class: owner.id,
                index: i as u32,
            };
            out.push(Candidate {
                member: index,
                owner: owner.clone(),
                method: id,
                is_default: method.is_default,
                erased: unit.erased_params(id),
                signature: instantiated_signature(unit, id, &bindings),
            });
        }
        queue.extend(unit.direct_supertypes(&owner));
    }
}

fn instantiated_signature(unit: &CompilationUnit, id: MethodId, bindings: &[(String, Type)]) -> Vec<Type> {
    let scope = unit.method_type_params(id);
    unit.method(id)
        .map(|m| m.params.iter().map(|p| p.ty.substitute(bindings).erasure(&scope)).collect())
        .unwrap_or_default()
}

fn method_name(unit: &CompilationUnit, id: MethodId) -> String {
    unit.method(id).map(|m| m.name.clone()).unwrap_or_default()
}

/// `equals(Object)`, `hashCode()` and `toString()` are implemented by every object.
fn is_object_method(unit: &CompilationUnit, candidate: &Candidate) -> bool {
    let name = method_name(unit, candidate.method);
    match (name.as_str(), candidate.erased.as_slice()) {
        ("equals", [Type::Object]) => true,
        ("hashCode", []) | ("toString", []) => true,
        _ => false,
    }
}

/// An abstract method is retired by a default with the same signature
/// declared in one of its subinterfaces.
fn is_retired(unit: &CompilationUnit, candidate: &Candidate, all: &[Candidate]) -> bool {
    let name = method_name(unit, candidate.method);
    all.iter().any(|other| {
        other.is_default
            && other.owner.id != candidate.owner.id
            && unit.is_subclass(other.owner.id, candidate.owner.id)
            && other.signature == candidate.signature
            && method_name(unit, other.method) == name
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use kestrel_hir::build::{MethodDef, UnitBuilder};
    use kestrel_types::{ClassId, PrimitiveKind, TypeParam};

    #[test]
    fn test_generic_sam_through_inheritance() {
        let mut b = UnitBuilder::new("Sam");
        let bifunction = b.interface("BiFunction");
        b.type_params(bifunction, &["T", "U", "R"]);
        let (t, u, r) = (b.local("t", Type::type_var("T")), b.local("u", Type::type_var("U")), Type::type_var("R"));
        b.method(bifunction, MethodDef::new("apply").params(vec![t, u]).returns(r));
        let operator = b.interface("BinaryOperator");
        b.type_params(operator, &["T"]);
        let tv = Type::type_var("T");
        b.implements(operator, ClassType::new(bifunction, vec![tv.clone(), tv.clone(), tv]));
        let unit = b.finish();

        let integer = Type::Boxed(PrimitiveKind::Int);
        let target = Type::generic(operator, vec![integer.clone()]);
        let sam = resolve(&unit, &target, Span::DUMMY).unwrap();
        assert_eq!(sam.name, "apply");
        assert_eq!(sam.params, vec![integer.clone(), integer.clone()]);
        assert_eq!(sam.return_type, integer);
        assert_eq!(sam.erased_params, vec![Type::Object, Type::Object]);
        assert_eq!(sam.erased_return, Type::Object);
    }

    #[test]
    fn test_object_methods_and_defaults_do_not_count() {
        let mut b = UnitBuilder::new("Sam");
        let base = b.interface("Base");
        b.method(base, MethodDef::new("first"));
        b.method(base, MethodDef::new("second"));
        let derived = b.interface("Derived");
        b.implements(derived, ClassType::raw(base));
        b.method(derived, MethodDef::new("first").default_().body(vec![]));
        let other = b.local("other", Type::Object);
        b.method(derived, MethodDef::new("equals").params(vec![other]).returns(Type::boolean()));
        b.method(derived, MethodDef::new("toString").returns(Type::String));
        let unit = b.finish();

        let sam = resolve(&unit, &Type::class(derived), Span::DUMMY).unwrap();
        assert_eq!(sam.name, "second");
        assert_eq!(sam.interface.id, derived);
    }

    #[test]
    fn test_intersection_records_markers() {
        let mut b = UnitBuilder::new("Sam");
        let runnable = b.interface("Runnable");
        b.method(runnable, MethodDef::new("run"));
        let serializable = b.interface("Serializable");
        let unit = b.finish();

        let target = Type::Intersection(vec![Type::class(serializable), Type::class(runnable)]);
        let sam = resolve(&unit, &target, Span::DUMMY).unwrap();
        assert_eq!(sam.interface.id, runnable);
        assert_eq!(sam.markers, vec![ClassType::raw(serializable)]);
    }

    #[test]
    fn test_two_abstract_methods_is_an_error() {
        let mut b = UnitBuilder::new("Sam");
        let iface = b.interface("Two");
        b.method(iface, MethodDef::new("a"));
        b.method(iface, MethodDef::new("b"));
        let class = b.class("NotAnInterface");
        let unit = b.finish();

        let err = resolve(&unit, &Type::class(iface), Span::DUMMY).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AmbiguousOrMissingSam);
        let err = resolve(&unit, &Type::class(class), Span::DUMMY).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AmbiguousOrMissingSam);
    }

    #[test]
    fn test_bounded_type_variable_erases_to_bound() {
        let mut b = UnitBuilder::new("Sam");
        let iface = b.interface("Sink");
        b.decl(iface).type_params = vec![TypeParam {
            name: "N".to_string(),
            bound: Some(Type::String),
        }];
        let value = b.local("value", Type::type_var("N"));
        b.method(iface, MethodDef::new("accept").params(vec![value]));
        let unit = b.finish();

        let sam = resolve(&unit, &Type::class(iface), Span::DUMMY).unwrap();
        assert_eq!(sam.erased_params, vec![Type::String]);
        assert_eq!(sam.params, vec![Type::type_var("N")]);
    }

    fn string_sink(b: &mut UnitBuilder) -> ClassId {
        let sink = b.interface("Sink");
        b.type_params(sink, &["T"]);
        let t = b.local("t", Type::type_var("T"));
        b.method(sink, MethodDef::new("accept").params(vec![t]));
        sink
    }

    #[test]
    fn test_redeclared_generic_method_is_one_method() {
        let mut b = UnitBuilder::new("Sam");
        let sink = string_sink(&mut b);
        let strings = b.interface("StrSink");
        b.implements(strings, ClassType::new(sink, vec![Type::String]));
        let s = b.local("s", Type::String);
        b.method(strings, MethodDef::new("accept").params(vec![s]));
        let unit = b.finish();

        let sam = resolve(&unit, &Type::class(strings), Span::DUMMY).unwrap();
        assert_eq!(sam.name, "accept");
        assert_eq!(sam.method.class, strings);
        assert_eq!(sam.params, vec![Type::String]);
        assert_eq!(sam.erased_params, vec![Type::String]);
    }

    #[test]
    fn test_default_retires_instantiated_generic_method() {
        let mut b = UnitBuilder::new("Sam");
        let sink = string_sink(&mut b);
        let closing = b.interface("ClosingSink");
        b.implements(closing, ClassType::new(sink, vec![Type::String]));
        let s = b.local("s", Type::String);
        b.method(closing, MethodDef::new("accept").params(vec![s]).default_().body(vec![]));
        b.method(closing, MethodDef::new("close"));
        let unit = b.finish();

        let sam = resolve(&unit, &Type::class(closing), Span::DUMMY).unwrap();
        assert_eq!(sam.name, "close");

        // A default for a different instantiation retires nothing.
        let mut b = UnitBuilder::new("Sam");
        let sink = string_sink(&mut b);
        let mixed = b.interface("IntDefaultSink");
        b.implements(mixed, ClassType::new(sink, vec![Type::String]));
        let n = b.local("n", Type::Boxed(PrimitiveKind::Int));
        b.method(mixed, MethodDef::new("accept").params(vec![n]).default_().body(vec![]));
        let unit = b.finish();

        let sam = resolve(&unit, &Type::class(mixed), Span::DUMMY).unwrap();
        assert_eq!(sam.method.class, sink);
        assert_eq!(sam.params, vec![Type::String]);
    }
}
