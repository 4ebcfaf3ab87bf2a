//! Tree walkers.
//!
//! `walk_*` visit statements and expressions pre-order and let the callback
//! decide whether to descend. `walk_*_mut` visit expressions post-order, so a
//! callback may replace a node without the replacement being revisited.

use crate::ir::{Expr, LambdaBody, Receiver, RefQualifier, Stmt};
use kestrel_types::LocalId;

/// A node reached by an immutable walk
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Stmt(&'a Stmt),
    Expr(&'a Expr),
}

pub fn walk_stmts<'a, F>(stmts: &'a [Stmt], f: &mut F)
where
    F: FnMut(Node<'a>) -> bool,
{
    for stmt in stmts {
        walk_stmt(stmt, f);
    }
}

pub fn walk_stmt<'a, F>(stmt: &'a Stmt, f: &mut F)
where
    F: FnMut(Node<'a>) -> bool,
{
    if !f(Node::Stmt(stmt)) {
        return;
    }
    match stmt {
        Stmt::Let { init, .. } => {
            if let Some(init) = init {
                walk_expr(init, f);
            }
        }
        Stmt::Expr(expr) | Stmt::Throw(expr) => walk_expr(expr, f),
        Stmt::Return(value) => {
            if let Some(value) = value {
                walk_expr(value, f);
            }
        }
        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => {
            walk_expr(condition, f);
            walk_stmts(then_branch, f);
            if let Some(else_branch) = else_branch {
                walk_stmts(else_branch, f);
            }
        }
        Stmt::While { condition, body } => {
            walk_expr(condition, f);
            walk_stmts(body, f);
        }
        Stmt::For {
            init,
            condition,
            update,
            body,
        } => {
            walk_stmts(init, f);
            if let Some(condition) = condition {
                walk_expr(condition, f);
            }
            for expr in update {
                walk_expr(expr, f);
            }
            walk_stmts(body, f);
        }
        Stmt::ForEach { iterable, body, .. } => {
            walk_expr(iterable, f);
            walk_stmts(body, f);
        }
        Stmt::Block(body) => walk_stmts(body, f),
        Stmt::Try {
            body,
            catch,
            finally,
        } => {
            walk_stmts(body, f);
            if let Some(catch) = catch {
                walk_stmts(&catch.body, f);
            }
            if let Some(finally) = finally {
                walk_stmts(finally, f);
            }
        }
        Stmt::Break | Stmt::Continue => {}
    }
}

pub fn walk_expr<'a, F>(expr: &'a Expr, f: &mut F)
where
    F: FnMut(Node<'a>) -> bool,
{
    if !f(Node::Expr(expr)) {
        return;
    }
    match expr {
        Expr::Null
        | Expr::Bool(_)
        | Expr::Int(_)
        | Expr::Long(_)
        | Expr::Double(_)
        | Expr::Char(_)
        | Expr::String(_)
        | Expr::Local(_)
        | Expr::This { .. }
        | Expr::ClosureSingleton { .. } => {}
        Expr::Assign { value, .. } => walk_expr(value, f),
        Expr::FieldGet { receiver, .. } => {
            if let Some(receiver) = receiver {
                walk_expr(receiver, f);
            }
        }
        Expr::FieldSet {
            receiver, value, ..
        } => {
            if let Some(receiver) = receiver {
                walk_expr(receiver, f);
            }
            walk_expr(value, f);
        }
        Expr::Call { receiver, args, .. } => {
            match receiver {
                Receiver::Expr(object) | Receiver::NonVirtual(object) => walk_expr(object, f),
                Receiver::Implicit | Receiver::Static | Receiver::Super { .. } => {}
            }
            for arg in args {
                walk_expr(arg, f);
            }
        }
        Expr::New { outer, args, .. } => {
            if let Some(outer) = outer {
                walk_expr(outer, f);
            }
            for arg in args {
                walk_expr(arg, f);
            }
        }
        Expr::NewArray { length, .. } => walk_expr(length, f),
        Expr::ArrayLiteral { values, .. } => {
            for value in values {
                walk_expr(value, f);
            }
        }
        Expr::ArrayGet { array, index } => {
            walk_expr(array, f);
            walk_expr(index, f);
        }
        Expr::ArraySet {
            array,
            index,
            value,
        } => {
            walk_expr(array, f);
            walk_expr(index, f);
            walk_expr(value, f);
        }
        Expr::Binary { left, right, .. }
        | Expr::Compare { left, right, .. }
        | Expr::Logical { left, right, .. } => {
            walk_expr(left, f);
            walk_expr(right, f);
        }
        Expr::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            walk_expr(condition, f);
            walk_expr(then_expr, f);
            walk_expr(else_expr, f);
        }
        Expr::ArrayLength(inner) | Expr::NullCheck(inner) => walk_expr(inner, f),
        Expr::Unary { operand: inner, .. }
        | Expr::Cast { expr: inner, .. }
        | Expr::InstanceOf { expr: inner, .. }
        | Expr::Box { expr: inner, .. }
        | Expr::Unbox { expr: inner, .. }
        | Expr::Convert { expr: inner, .. } => walk_expr(inner, f),
        Expr::Intrinsic { args, .. } => {
            for arg in args {
                walk_expr(arg, f);
            }
        }
        Expr::Lambda(lambda) => match &lambda.body {
            LambdaBody::Expr(body) => walk_expr(body, f),
            LambdaBody::Block(body) => walk_stmts(body, f),
        },
        Expr::MethodRef(reference) => {
            if let RefQualifier::Expr { expr, .. } = &reference.qualifier {
                walk_expr(expr, f);
            }
        }
        Expr::NewClosure { captures, .. } => {
            for capture in captures {
                walk_expr(capture, f);
            }
        }
    }
}

pub fn walk_stmts_mut<F>(stmts: &mut [Stmt], f: &mut F)
where
    F: FnMut(&mut Expr),
{
    for stmt in stmts {
        walk_stmt_mut(stmt, f);
    }
}

pub fn walk_stmt_mut<F>(stmt: &mut Stmt, f: &mut F)
where
    F: FnMut(&mut Expr),
{
    match stmt {
        Stmt::Let { init, .. } => {
            if let Some(init) = init {
                walk_expr_mut(init, f);
            }
        }
        Stmt::Expr(expr) | Stmt::Throw(expr) => walk_expr_mut(expr, f),
        Stmt::Return(value) => {
            if let Some(value) = value {
                walk_expr_mut(value, f);
            }
        }
        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => {
            walk_expr_mut(condition, f);
            walk_stmts_mut(then_branch, f);
            if let Some(else_branch) = else_branch {
                walk_stmts_mut(else_branch, f);
            }
        }
        Stmt::While { condition, body } => {
            walk_expr_mut(condition, f);
            walk_stmts_mut(body, f);
        }
        Stmt::For {
            init,
            condition,
            update,
            body,
        } => {
            walk_stmts_mut(init, f);
            if let Some(condition) = condition {
                walk_expr_mut(condition, f);
            }
            for expr in update {
                walk_expr_mut(expr, f);
            }
            walk_stmts_mut(body, f);
        }
        Stmt::ForEach { iterable, body, .. } => {
            walk_expr_mut(iterable, f);
            walk_stmts_mut(body, f);
        }
        Stmt::Block(body) => walk_stmts_mut(body, f),
        Stmt::Try {
            body,
            catch,
            finally,
        } => {
            walk_stmts_mut(body, f);
            if let Some(catch) = catch {
                walk_stmts_mut(&mut catch.body, f);
            }
            if let Some(finally) = finally {
                walk_stmts_mut(finally, f);
            }
        }
        Stmt::Break | Stmt::Continue => {}
    }
}

/// Post-order: children first, then `f` on the node itself.
pub fn walk_expr_mut<F>(expr: &mut Expr, f: &mut F)
where
    F: FnMut(&mut Expr),
{
    match expr {
        Expr::Null
        | Expr::Bool(_)
        | Expr::Int(_)
        | Expr::Long(_)
        | Expr::Double(_)
        | Expr::Char(_)
        | Expr::String(_)
        | Expr::Local(_)
        | Expr::This { .. }
        | Expr::ClosureSingleton { .. } => {}
        Expr::Assign { value, .. } => walk_expr_mut(value, f),
        Expr::FieldGet { receiver, .. } => {
            if let Some(receiver) = receiver {
                walk_expr_mut(receiver, f);
            }
        }
        Expr::FieldSet {
            receiver, value, ..
        } => {
            if let Some(receiver) = receiver {
                walk_expr_mut(receiver, f);
            }
            walk_expr_mut(value, f);
        }
        Expr::Call { receiver, args, .. } => {
            match receiver {
                Receiver::Expr(object) | Receiver::NonVirtual(object) => walk_expr_mut(object, f),
                Receiver::Implicit | Receiver::Static | Receiver::Super { .. } => {}
            }
            for arg in args {
                walk_expr_mut(arg, f);
            }
        }
        Expr::New { outer, args, .. } => {
            if let Some(outer) = outer {
                walk_expr_mut(outer, f);
            }
            for arg in args {
                walk_expr_mut(arg, f);
            }
        }
        Expr::NewArray { length, .. } => walk_expr_mut(length, f),
        Expr::ArrayLiteral { values, .. } => {
            for value in values {
                walk_expr_mut(value, f);
            }
        }
        Expr::ArrayGet { array, index } => {
            walk_expr_mut(array, f);
            walk_expr_mut(index, f);
        }
        Expr::ArraySet {
            array,
            index,
            value,
        } => {
            walk_expr_mut(array, f);
            walk_expr_mut(index, f);
            walk_expr_mut(value, f);
        }
        Expr::Binary { left, right, .. }
        | Expr::Compare { left, right, .. }
        | Expr::Logical { left, right, .. } => {
            walk_expr_mut(left, f);
            walk_expr_mut(right, f);
        }
        Expr::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            walk_expr_mut(condition, f);
            walk_expr_mut(then_expr, f);
            walk_expr_mut(else_expr, f);
        }
        Expr::ArrayLength(inner) | Expr::NullCheck(inner) => walk_expr_mut(inner, f),
        Expr::Unary { operand: inner, .. }
        | Expr::Cast { expr: inner, .. }
        | Expr::InstanceOf { expr: inner, .. }
        | Expr::Box { expr: inner, .. }
        | Expr::Unbox { expr: inner, .. }
        | Expr::Convert { expr: inner, .. } => walk_expr_mut(inner, f),
        Expr::Intrinsic { args, .. } => {
            for arg in args {
                walk_expr_mut(arg, f);
            }
        }
        Expr::Lambda(lambda) => match &mut lambda.body {
            LambdaBody::Expr(body) => walk_expr_mut(body, f),
            LambdaBody::Block(body) => walk_stmts_mut(body, f),
        },
        Expr::MethodRef(reference) => {
            if let RefQualifier::Expr { expr, .. } = &mut reference.qualifier {
                walk_expr_mut(expr, f);
            }
        }
        Expr::NewClosure { captures, .. } => {
            for capture in captures {
                walk_expr_mut(capture, f);
            }
        }
    }
    f(expr);
}

/// Direct expression children of `expr`. Lambda bodies are statements of
/// their own and are not included.
pub fn children_mut(expr: &mut Expr) -> Vec<&mut Expr> {
    match expr {
        Expr::Null
        | Expr::Bool(_)
        | Expr::Int(_)
        | Expr::Long(_)
        | Expr::Double(_)
        | Expr::Char(_)
        | Expr::String(_)
        | Expr::Local(_)
        | Expr::This { .. }
        | Expr::ClosureSingleton { .. }
        | Expr::Lambda(_) => Vec::new(),
        Expr::Assign { value, .. } => vec![&mut **value],
        Expr::FieldGet { receiver, .. } => receiver.iter_mut().map(|r| &mut **r).collect(),
        Expr::FieldSet {
            receiver, value, ..
        } => {
            let mut out: Vec<&mut Expr> = receiver.iter_mut().map(|r| &mut **r).collect();
            out.push(&mut **value);
            out
        }
        Expr::Call { receiver, args, .. } => {
            let mut out = Vec::with_capacity(args.len() + 1);
            if let Receiver::Expr(object) | Receiver::NonVirtual(object) = receiver {
                out.push(&mut **object);
            }
            out.extend(args.iter_mut());
            out
        }
        Expr::New { outer, args, .. } => {
            let mut out: Vec<&mut Expr> = outer.iter_mut().map(|o| &mut **o).collect();
            out.extend(args.iter_mut());
            out
        }
        Expr::NewArray { length, .. } => vec![&mut **length],
        Expr::ArrayLiteral { values, .. } => values.iter_mut().collect(),
        Expr::ArrayGet { array, index } => vec![&mut **array, &mut **index],
        Expr::ArraySet {
            array,
            index,
            value,
        } => vec![&mut **array, &mut **index, &mut **value],
        Expr::Binary { left, right, .. }
        | Expr::Compare { left, right, .. }
        | Expr::Logical { left, right, .. } => vec![&mut **left, &mut **right],
        Expr::Conditional {
            condition,
            then_expr,
            else_expr,
        } => vec![&mut **condition, &mut **then_expr, &mut **else_expr],
        Expr::ArrayLength(inner)
        | Expr::NullCheck(inner)
        | Expr::Unary { operand: inner, .. }
        | Expr::Cast { expr: inner, .. }
        | Expr::InstanceOf { expr: inner, .. }
        | Expr::Box { expr: inner, .. }
        | Expr::Unbox { expr: inner, .. }
        | Expr::Convert { expr: inner, .. } => vec![&mut **inner],
        Expr::Intrinsic { args, .. } => args.iter_mut().collect(),
        Expr::MethodRef(reference) => match &mut reference.qualifier {
            RefQualifier::Expr { expr, .. } => vec![&mut **expr],
            RefQualifier::Type(_) | RefQualifier::Super { .. } => Vec::new(),
        },
        Expr::NewClosure { captures, .. } => captures.iter_mut().collect(),
    }
}

/// Pre-order over every statement, including nested statement lists.
/// Lambda bodies are not entered.
pub fn for_each_stmt_mut<F>(stmts: &mut [Stmt], f: &mut F)
where
    F: FnMut(&mut Stmt),
{
    for stmt in stmts {
        f(stmt);
        match stmt {
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                for_each_stmt_mut(then_branch, f);
                if let Some(else_branch) = else_branch {
                    for_each_stmt_mut(else_branch, f);
                }
            }
            Stmt::While { body, .. } | Stmt::ForEach { body, .. } | Stmt::Block(body) => for_each_stmt_mut(body, f),
            Stmt::For { init, body, .. } => {
                for_each_stmt_mut(init, f);
                for_each_stmt_mut(body, f);
            }
            Stmt::Try {
                body,
                catch,
                finally,
            } => {
                for_each_stmt_mut(body, f);
                if let Some(catch) = catch {
                    for_each_stmt_mut(&mut catch.body, f);
                }
                if let Some(finally) = finally {
                    for_each_stmt_mut(finally, f);
                }
            }
            Stmt::Let { .. } | Stmt::Expr(_) | Stmt::Return(_) | Stmt::Throw(_) | Stmt::Break | Stmt::Continue => {}
        }
    }
}

/// Report every local declared in `stmts`, including lambda, foreach and
/// catch parameters.
pub fn declared_locals<F: FnMut(LocalId)>(stmts: &[Stmt], f: &mut F) {
    walk_stmts(stmts, &mut |node| {
        note_declared(node, f);
        true
    });
}

pub fn declared_locals_in_expr<F: FnMut(LocalId)>(expr: &Expr, f: &mut F) {
    walk_expr(expr, &mut |node| {
        note_declared(node, f);
        true
    });
}

fn note_declared<F: FnMut(LocalId)>(node: Node<'_>, f: &mut F) {
    match node {
        Node::Stmt(Stmt::Let { id, .. }) => f(*id),
        Node::Stmt(Stmt::ForEach { var, .. }) => f(var.id),
        Node::Stmt(Stmt::Try {
            catch: Some(catch), ..
        }) => f(catch.param.id),
        Node::Expr(Expr::Lambda(lambda)) => lambda.params.iter().for_each(|p| f(p.id)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::*;
    use crate::ir::Param;
    use kestrel_types::Type;

    #[test]
    fn test_declared_locals_reach_into_lambdas() {
        let x = Param::new(1, "x", Type::int());
        let y = Param::new(2, "y", Type::int());
        let body = vec![let_(&x, int(1)), expr_stmt(lambda(vec![y], local(&x), Type::int(), Type::Object))];
        let mut ids = Vec::new();
        declared_locals(&body, &mut |id| ids.push(id));
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_walk_mut_is_post_order() {
        let mut expr = add(int(1), int(2));
        walk_expr_mut(&mut expr, &mut |e| {
            if let Expr::Int(v) = e {
                *e = Expr::Int(*v * 10);
            }
        });
        assert_eq!(expr, add(int(10), int(20)));
    }

    #[test]
    fn test_children_skip_lambda_bodies() {
        let x = Param::new(1, "x", Type::int());
        let mut expr = add(lambda(vec![], local(&x), Type::int(), Type::Object), int(3));
        let children = children_mut(&mut expr);
        assert_eq!(children.len(), 2);
        assert!(children_mut(children.into_iter().next().unwrap()).is_empty());
    }

    #[test]
    fn test_for_each_stmt_reaches_nested_returns() {
        let mut body = vec![Stmt::If {
            condition: Expr::Bool(true),
            then_branch: vec![ret(int(1))],
            else_branch: Some(vec![Stmt::Block(vec![ret(int(2))])]),
        }];
        let mut returns = 0;
        for_each_stmt_mut(&mut body, &mut |stmt| {
            if let Stmt::Return(Some(value)) = stmt {
                returns += 1;
                *value = int(0);
            }
        });
        assert_eq!(returns, 2);
        assert_eq!(body[0], Stmt::If {
            condition: Expr::Bool(true),
            then_branch: vec![ret(int(0))],
            else_branch: Some(vec![Stmt::Block(vec![ret(int(0))])]),
        });
    }
}
