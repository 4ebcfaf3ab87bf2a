//! Bridge and adaptation glue between a SAM signature and a target signature.
//!
//! Handles primitive/boxed representation changes, variadic packing and
//! casts for erasure mismatches.

use kestrel_hir::{CompilationUnit, Expr, Method, Stmt};
use kestrel_types::{PrimitiveKind, Type};

/// Convert a value of static type `from` so it can be used where `to` is expected.
pub fn adapt_value(unit: &CompilationUnit, expr: Expr, from: &Type, to: &Type) -> Expr {
    if from == to || to.is_void() || from.is_void() {
        return expr;
    }
    match (from, to) {
        (Type::Primitive(a), Type::Primitive(b)) => convert(expr, *a, *b),
        (Type::Primitive(source), _) => {
            let kind = match to {
                Type::Boxed(wrapper) => *wrapper,
                _ => *source,
            };
            Expr::Box {
                expr: Box::new(convert(expr, *source, kind)),
                kind,
            }
        }
        (_, Type::Primitive(target)) => {
            let (value, kind) = match from {
                Type::Boxed(kind) => (expr, *kind),
                _ => (
                    Expr::Cast {
                        expr: Box::new(expr),
                        ty: Type::Boxed(*target),
                    },
                    *target,
                ),
            };
            let unboxed = Expr::Unbox {
                expr: Box::new(value),
                kind,
            };
            convert(unboxed, kind, *target)
        }
        _ if unit.is_assignable(from, to) => expr,
        _ => Expr::Cast {
            expr: Box::new(expr),
            ty: to.clone(),
        },
    }
}

fn convert(expr: Expr, from: PrimitiveKind, to: PrimitiveKind) -> Expr {
    if from == to {
        expr
    } else {
        Expr::Convert {
            expr: Box::new(expr),
            to,
        }
    }
}

/// How arguments are passed to a resolved target
#[derive(Debug, Clone, PartialEq)]
pub enum ArgMode {
    /// One argument per parameter
    Fixed,
    /// Arguments from `fixed` on are packed into an array of `element`
    Variadic { fixed: usize, element: Type },
}

/// Applicability phases, tried in order until one yields candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Identity and widening only
    Strict,
    /// Boxing and unboxing allowed
    Loose,
    /// Variable-arity invocation
    Variadic,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Strict, Phase::Loose, Phase::Variadic];
}

/// Whether `args` can be passed to a method whose (instantiated) parameter
/// types are `params`, and how.
pub fn applicable(
    unit: &CompilationUnit,
    method: &Method,
    params: &[Type],
    args: &[Type],
    phase: Phase,
) -> Option<ArgMode> {
    let fits = |from: &Type, to: &Type| match phase {
        Phase::Strict => unit.is_assignable(from, to),
        Phase::Loose | Phase::Variadic => unit.is_loosely_assignable(from, to),
    };
    match phase {
        Phase::Strict | Phase::Loose => {
            let ok = args.len() == params.len() && args.iter().zip(params).all(|(a, p)| fits(a, p));
            ok.then_some(ArgMode::Fixed)
        }
        Phase::Variadic => {
            if !method.is_varargs {
                return None;
            }
            let (last, prefix) = params.split_last()?;
            let element = last.element_type()?;
            if args.len() < prefix.len() {
                return None;
            }
            let (head, tail) = args.split_at(prefix.len());
            let ok = head.iter().zip(prefix).all(|(a, p)| fits(a, p))
                && tail.iter().all(|a| fits(a, element));
            ok.then(|| ArgMode::Variadic {
                fixed: prefix.len(),
                element: element.clone(),
            })
        }
    }
}

/// True when every parameter of `a` is assignable to the matching one of `b`.
pub fn more_specific(unit: &CompilationUnit, a: &[Type], b: &[Type]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| unit.is_assignable(x, y))
}

/// Adapt typed arguments to the target parameters, packing a variadic tail.
pub fn build_arguments(
    unit: &CompilationUnit,
    args: Vec<(Expr, Type)>,
    params: &[Type],
    mode: &ArgMode,
) -> Vec<Expr> {
    match mode {
        ArgMode::Fixed => args
            .into_iter()
            .zip(params)
            .map(|((expr, ty), param)| adapt_value(unit, expr, &ty, param))
            .collect(),
        ArgMode::Variadic { fixed, element } => {
            let mut args = args.into_iter();
            let mut out: Vec<Expr> = args
                .by_ref()
                .take(*fixed)
                .zip(params)
                .map(|((expr, ty), param)| adapt_value(unit, expr, &ty, param))
                .collect();
            let values = args
                .map(|(expr, ty)| adapt_value(unit, expr, &ty, element))
                .collect();
            out.push(Expr::ArrayLiteral {
                element: element.clone(),
                values,
            });
            out
        }
    }
}

/// Wrap a computed result into the statements of a SAM implementation.
/// `result` is the static type of `value`; `instantiated` and `erased` are
/// the SAM return types. Returns None when a value is required but the
/// target produces none.
pub fn return_value(
    unit: &CompilationUnit,
    value: Expr,
    result: &Type,
    instantiated: &Type,
    erased: &Type,
) -> Option<Vec<Stmt>> {
    if instantiated.is_void() {
        return Some(vec![Stmt::Expr(value)]);
    }
    if result.is_void() {
        return None;
    }
    let value = adapt_value(unit, value, result, instantiated);
    Some(vec![Stmt::Return(Some(adapt_value(unit, value, instantiated, erased)))])
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_hir::build::{int, MethodDef, UnitBuilder};

    #[test]
    fn test_adapt_boxes_and_unboxes() {
        let unit = UnitBuilder::new("Bridge").finish();
        let boxed = adapt_value(&unit, int(1), &Type::int(), &Type::Object);
        assert_eq!(
            boxed,
            Expr::Box {
                expr: Box::new(int(1)),
                kind: PrimitiveKind::Int
            }
        );

        let unboxed = adapt_value(&unit, Expr::Null, &Type::Object, &Type::Primitive(PrimitiveKind::Long));
        assert_eq!(
            unboxed,
            Expr::Unbox {
                expr: Box::new(Expr::Cast {
                    expr: Box::new(Expr::Null),
                    ty: Type::Boxed(PrimitiveKind::Long)
                }),
                kind: PrimitiveKind::Long
            }
        );

        let widened = adapt_value(&unit, int(2), &Type::int(), &Type::Boxed(PrimitiveKind::Long));
        assert_eq!(
            widened,
            Expr::Box {
                expr: Box::new(Expr::Convert {
                    expr: Box::new(int(2)),
                    to: PrimitiveKind::Long
                }),
                kind: PrimitiveKind::Long
            }
        );
    }

    #[test]
    fn test_variadic_applicability_packs_tail() {
        let mut b = UnitBuilder::new("Bridge");
        let class = b.class("C");
        let head = b.local("head", Type::int());
        let rest = b.local("rest", Type::array(Type::Object));
        let id = b.method(class, MethodDef::new("join").static_().varargs().params(vec![head, rest]));
        let unit = b.finish();
        let method = unit.method(id).unwrap();
        let params = vec![Type::int(), Type::array(Type::Object)];

        let args = vec![Type::int(), Type::Object, Type::String];
        assert_eq!(applicable(&unit, method, &params, &args, Phase::Loose), None);
        let mode = applicable(&unit, method, &params, &args, Phase::Variadic).unwrap();
        assert_eq!(
            mode,
            ArgMode::Variadic {
                fixed: 1,
                element: Type::Object
            }
        );

        let passthrough = vec![Type::int(), Type::array(Type::Object)];
        assert_eq!(
            applicable(&unit, method, &params, &passthrough, Phase::Strict),
            Some(ArgMode::Fixed)
        );
    }
}
