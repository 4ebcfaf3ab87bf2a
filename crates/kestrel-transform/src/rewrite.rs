//! Tree rewriting for one top-level type and everything nested in it.
//!
//! A [`Lowerer`] owns the naming and numbering state of its partition, so
//! partitions can be lowered independently and in any order. Adapter ids
//! and identities are allocated pre-order (the outer site before the sites
//! nested in its body); bodies are lowered inside-out so that an enclosing
//! closure sees what its inner closures capture.

use crate::bridge::{adapt_value, build_arguments, return_value};
use crate::capture::{self, allocation_args, slot_read, BodyRewriter, CaptureSet};
use crate::descriptor::{BoundReceiver, ClosureDescriptor, ConstructorTarget, FunctionalInterfaceDescriptor, ReferenceForm};
use crate::emit::{emit_adapter, replacement};
use crate::error::{ClosureError, Result};
use crate::identity::IdentityAllocator;
use crate::method_ref;
use crate::options::LoweringOptions;
use crate::sam;
use crate::scope::{LocalInfo, Scope, SiteContext};
use kestrel_diagnostics::Span;
use kestrel_hir::visit::{children_mut, for_each_stmt_mut, walk_expr, walk_stmts, Node};
use kestrel_hir::{
    CompilationUnit, Expr, LambdaBody, LambdaExpr, MethodRefExpr, Param, Receiver, RefQualifier, Stmt, TypeDecl,
    TypeKind,
};
use kestrel_types::{ClassId, LocalId, Type};
use log::{debug, trace};

/// Lowered declarations of one partition
#[derive(Debug)]
pub struct PartitionOutput {
    pub top: ClassId,
    /// Rewritten copies of the partition's declarations
    pub types: Vec<TypeDecl>,
    /// Synthesized adapters, ordered by id
    pub adapters: Vec<TypeDecl>,
}

/// Number of closure sites in `decl`, counting sites nested in other sites.
pub fn count_sites(decl: &TypeDecl) -> usize {
    let mut count = 0;
    let mut visit = |node: Node<'_>| {
        if let Node::Expr(expr) = node {
            if expr.is_closure_site() {
                count += 1;
            }
        }
        true
    };
    for field in &decl.fields {
        if let Some(init) = &field.init {
            walk_expr(init, &mut visit);
        }
    }
    for init in &decl.initializers {
        walk_stmts(&init.body, &mut visit);
    }
    for method in &decl.methods {
        if let Some(body) = &method.body {
            walk_stmts(body, &mut visit);
        }
    }
    count
}

pub struct Lowerer<'a> {
    unit: &'a CompilationUnit,
    options: &'a LoweringOptions,
    identities: IdentityAllocator,
    next_adapter: u32,
    next_local: LocalId,
    adapters: Vec<TypeDecl>,
    /// Type whose members are being lowered
    class: ClassId,
    chain: Vec<ClassId>,
    scope: Scope,
}

impl<'a> Lowerer<'a> {
    pub fn new(unit: &'a CompilationUnit, options: &'a LoweringOptions, first_adapter: u32, first_local: LocalId) -> Self {
        Self {
            unit,
            options,
            identities: IdentityAllocator::new(),
            next_adapter: first_adapter,
            next_local: first_local,
            adapters: Vec::new(),
            class: ClassId(0),
            chain: Vec::new(),
            scope: Scope::default(),
        }
    }

    /// Lower every declaration whose top-level type is `top`, in arena order.
    pub fn lower_partition(mut self, top: ClassId) -> Result<PartitionOutput> {
        let unit = self.unit;
        let mut types = Vec::new();
        for decl in &unit.types {
            if decl.kind == TypeKind::Adapter || unit.top_level(decl.id) != top {
                continue;
            }
            types.push(self.lower_decl(decl)?);
        }
        self.adapters.sort_by_key(|a| a.id);
        Ok(PartitionOutput {
            top,
            types,
            adapters: self.adapters,
        })
    }

    fn enter(&mut self, class: ClassId, is_static: bool) {
        self.class = class;
        self.chain = self.unit.enclosing_instance_chain(class, is_static);
        self.scope = Scope::default();
    }

    fn lower_decl(&mut self, decl: &TypeDecl) -> Result<TypeDecl> {
        let mut lowered = decl.clone();
        for field in &mut lowered.fields {
            if let Some(init) = &mut field.init {
                self.enter(decl.id, field.is_static);
                self.lower_expr(init)?;
            }
        }
        for init in &mut lowered.initializers {
            self.enter(decl.id, init.is_static);
            self.lower_stmts(&mut init.body)?;
        }
        for method in &mut lowered.methods {
            let Some(body) = &mut method.body else {
                continue;
            };
            self.enter(decl.id, method.is_static);
            for param in &method.params {
                self.scope.declare(LocalInfo::from(param));
            }
            self.lower_stmts(body)?;
        }
        Ok(lowered)
    }

    fn lower_block(&mut self, stmts: &mut [Stmt]) -> Result<()> {
        let mark = self.scope.mark();
        let result = self.lower_stmts(stmts);
        self.scope.reset(mark);
        result
    }

    fn lower_stmts(&mut self, stmts: &mut [Stmt]) -> Result<()> {
        for stmt in stmts {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &mut Stmt) -> Result<()> {
        match stmt {
            Stmt::Let {
                id,
                name,
                ty,
                effectively_final,
                init,
            } => {
                if let Some(init) = init {
                    self.lower_expr(init)?;
                }
                self.scope.declare(LocalInfo {
                    id: *id,
                    name: name.clone(),
                    ty: ty.clone(),
                    effectively_final: *effectively_final,
                });
            }
            Stmt::Expr(expr) | Stmt::Throw(expr) => self.lower_expr(expr)?,
            Stmt::Return(value) => {
                if let Some(value) = value {
                    self.lower_expr(value)?;
                }
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.lower_expr(condition)?;
                self.lower_block(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.lower_block(else_branch)?;
                }
            }
            Stmt::While { condition, body } => {
                self.lower_expr(condition)?;
                self.lower_block(body)?;
            }
            Stmt::For {
                init,
                condition,
                update,
                body,
            } => {
                let mark = self.scope.mark();
                self.lower_stmts(init)?;
                if let Some(condition) = condition {
                    self.lower_expr(condition)?;
                }
                for expr in update {
                    self.lower_expr(expr)?;
                }
                self.lower_block(body)?;
                self.scope.reset(mark);
            }
            Stmt::ForEach { var, iterable, body } => {
                self.lower_expr(iterable)?;
                let mark = self.scope.mark();
                self.scope.declare(LocalInfo::from(&*var));
                self.lower_stmts(body)?;
                self.scope.reset(mark);
            }
            Stmt::Block(body) => self.lower_block(body)?,
            Stmt::Try {
                body,
                catch,
                finally,
            } => {
                self.lower_block(body)?;
                if let Some(catch) = catch {
                    let mark = self.scope.mark();
                    self.scope.declare(LocalInfo::from(&catch.param));
                    self.lower_stmts(&mut catch.body)?;
                    self.scope.reset(mark);
                }
                if let Some(finally) = finally {
                    self.lower_block(finally)?;
                }
            }
            Stmt::Break | Stmt::Continue => {}
        }
        Ok(())
    }

    fn lower_expr(&mut self, expr: &mut Expr) -> Result<()> {
        if expr.is_closure_site() {
            let site = std::mem::replace(expr, Expr::Null);
            *expr = match site {
                Expr::Lambda(lambda) => self.lower_lambda(*lambda)?,
                Expr::MethodRef(reference) => self.lower_method_ref(*reference)?,
                other => other,
            };
            return Ok(());
        }
        for child in children_mut(expr) {
            self.lower_expr(child)?;
        }
        Ok(())
    }

    fn allocate(&mut self) -> (ClassId, String) {
        let id = ClassId(self.next_adapter);
        self.next_adapter += 1;
        (id, self.identities.next(self.unit, self.class))
    }

    fn fresh_local(&mut self, name: &str, ty: Type) -> Param {
        let id = self.next_local;
        self.next_local += 1;
        Param::new(id, name, ty)
    }

    fn site(&self, span: Span) -> SiteContext<'_> {
        SiteContext {
            unit: self.unit,
            class: self.class,
            chain: &self.chain,
            scope: &self.scope,
            span,
        }
    }

    fn finish_site(&mut self, descriptor: ClosureDescriptor, captures: Vec<Expr>) -> Expr {
        debug!(
            "lowered {} at {:?}: {} slot(s), {}",
            descriptor.identity,
            descriptor.span,
            descriptor.slots.len(),
            if descriptor.capturing() { "capturing" } else { "singleton" }
        );
        let expr = replacement(&descriptor, captures);
        self.adapters
            .push(emit_adapter(self.unit, &descriptor, self.options.singleton));
        expr
    }

    fn lower_lambda(&mut self, mut lambda: LambdaExpr) -> Result<Expr> {
        let (adapter, identity) = self.allocate();
        let span = lambda.span;
        let sam = sam::resolve(self.unit, &lambda.target, span)?;
        if lambda.params.len() != sam.params.len() {
            return Err(ClosureError::arity(
                span,
                format!(
                    "lambda takes {} parameter(s) but {} takes {}",
                    lambda.params.len(),
                    sam.name,
                    sam.params.len()
                ),
            ));
        }

        let mark = self.scope.mark();
        for param in &lambda.params {
            self.scope.declare(LocalInfo::from(param));
        }
        let lowered = match &mut lambda.body {
            LambdaBody::Expr(body) => self.lower_expr(body),
            LambdaBody::Block(body) => self.lower_stmts(body),
        };
        self.scope.reset(mark);
        lowered?;

        let (set, captures, mut body) = {
            let cx = self.site(span);
            let set = capture::analyze_lambda(&cx, &lambda)?;
            let mut body = lambda_statements(self.unit, &lambda, &sam)?;
            BodyRewriter {
                site: &cx,
                set: &set,
                adapter,
            }
            .rewrite_stmts(&mut body);
            let captures = allocation_args(&cx, &set, None);
            (set, captures, body)
        };

        let mut params = Vec::with_capacity(lambda.params.len());
        let mut prologue = Vec::new();
        for ((param, erased), instantiated) in lambda.params.iter().zip(&sam.erased_params).zip(&sam.params) {
            if param.ty == *erased {
                params.push(param.clone());
                continue;
            }
            let incoming = self.fresh_local(&param.name, erased.clone());
            let value = adapt_value(self.unit, Expr::Local(incoming.id), erased, instantiated);
            prologue.push(Stmt::Let {
                id: param.id,
                name: param.name.clone(),
                ty: param.ty.clone(),
                effectively_final: param.effectively_final,
                init: Some(adapt_value(self.unit, value, instantiated, &param.ty)),
            });
            params.push(incoming);
        }
        prologue.append(&mut body);

        let descriptor = describe(identity, adapter, self.class, span, set, sam, params, prologue);
        Ok(self.finish_site(descriptor, captures))
    }

    fn lower_method_ref(&mut self, mut reference: MethodRefExpr) -> Result<Expr> {
        let (adapter, identity) = self.allocate();
        let span = reference.span;
        let sam = sam::resolve(self.unit, &reference.target, span)?;
        if let RefQualifier::Expr { expr, .. } = &mut reference.qualifier {
            self.lower_expr(expr)?;
        }

        let (resolved, set, captures) = {
            let cx = self.site(span);
            let resolved = method_ref::resolve(&cx, &reference, &sam)?;
            let set = capture::analyze_reference(&cx, &resolved.form);
            let receiver = match (&resolved.form, &reference.qualifier) {
                (
                    ReferenceForm::BoundInstance {
                        receiver: BoundReceiver::Expr { .. },
                        ..
                    },
                    RefQualifier::Expr { expr, .. },
                ) => Some((**expr).clone()),
                _ => None,
            };
            let captures = allocation_args(&cx, &set, receiver);
            (resolved, set, captures)
        };

        let params: Vec<Param> = sam
            .erased_params
            .iter()
            .enumerate()
            .map(|(i, erased)| self.fresh_local(&format!("arg{}", i), erased.clone()))
            .collect();
        let mut args: Vec<(Expr, Type)> = params
            .iter()
            .zip(&sam.erased_params)
            .zip(&sam.params)
            .map(|((param, erased), instantiated)| {
                (
                    adapt_value(self.unit, Expr::Local(param.id), erased, instantiated),
                    instantiated.clone(),
                )
            })
            .collect();

        let slot = |index: Option<usize>| {
            index.map(|s| slot_read(adapter, s)).ok_or_else(|| {
                ClosureError::invalid_capture(span, "reference target has no captured instance to run on")
            })
        };
        let unit = self.unit;
        let call = match &resolved.form {
            ReferenceForm::Static { method } => Expr::Call {
                receiver: Receiver::Static,
                method: *method,
                args: build_arguments(unit, args, &resolved.params, &resolved.mode),
            },
            ReferenceForm::UnboundInstance { method, receiver_ty } => {
                let (first, first_ty) = args.remove(0);
                let receiver = Expr::NullCheck(Box::new(adapt_value(unit, first, &first_ty, receiver_ty)));
                Expr::Call {
                    receiver: Receiver::Expr(Box::new(receiver)),
                    method: *method,
                    args: build_arguments(unit, args, &resolved.params, &resolved.mode),
                }
            }
            ReferenceForm::BoundInstance { method, receiver } => {
                let object = match receiver {
                    BoundReceiver::Instance { depth } => slot(set.instance_slot(*depth))?,
                    BoundReceiver::Expr { .. } => slot(set.receiver_slot())?,
                };
                Expr::Call {
                    receiver: Receiver::Expr(Box::new(object)),
                    method: *method,
                    args: build_arguments(unit, args, &resolved.params, &resolved.mode),
                }
            }
            ReferenceForm::Constructor(ConstructorTarget::Class {
                class,
                ctor,
                outer_depth,
            }) => {
                let outer = match outer_depth {
                    Some(depth) => Some(Box::new(slot(set.instance_slot(*depth))?)),
                    None => None,
                };
                Expr::New {
                    class: class.clone(),
                    ctor: *ctor,
                    outer,
                    args: build_arguments(unit, args, &resolved.params, &resolved.mode),
                }
            }
            ReferenceForm::Constructor(ConstructorTarget::Array { element }) => {
                let mut length = build_arguments(unit, args, &resolved.params, &resolved.mode);
                Expr::NewArray {
                    element: element.clone(),
                    length: Box::new(length.pop().unwrap_or(Expr::Int(0))),
                }
            }
            ReferenceForm::Super { method, depth, .. } => Expr::Call {
                receiver: Receiver::NonVirtual(Box::new(slot(set.instance_slot(*depth))?)),
                method: *method,
                args: build_arguments(unit, args, &resolved.params, &resolved.mode),
            },
        };
        trace!("{} adapter calls {:?}", identity, call);

        let body = return_value(unit, call, &resolved.result, &sam.return_type, &sam.erased_return).ok_or_else(|| {
            ClosureError::arity(
                span,
                format!(
                    "referenced member returns nothing but {} must return {}",
                    sam.name,
                    unit.type_name(&sam.return_type)
                ),
            )
        })?;

        let descriptor = describe(identity, adapter, self.class, span, set, sam, params, body);
        Ok(self.finish_site(descriptor, captures))
    }
}

#[allow(clippy::too_many_arguments)]
fn describe(
    identity: String,
    adapter: ClassId,
    enclosing: ClassId,
    span: Span,
    set: CaptureSet,
    sam: FunctionalInterfaceDescriptor,
    params: Vec<Param>,
    body: Vec<Stmt>,
) -> ClosureDescriptor {
    ClosureDescriptor {
        identity,
        adapter,
        enclosing,
        span,
        bindings: set.bindings,
        slots: set.slots,
        sam,
        params,
        body,
    }
}

/// Statements of the adapter method for a lambda body, with returned values
/// adapted to the erased SAM return type.
fn lambda_statements(unit: &CompilationUnit, lambda: &LambdaExpr, sam: &FunctionalInterfaceDescriptor) -> Result<Vec<Stmt>> {
    let span = lambda.span;
    let no_value = || {
        ClosureError::arity(
            span,
            format!(
                "lambda body has no value but {} must return {}",
                sam.name,
                unit.type_name(&sam.return_type)
            ),
        )
    };
    match &lambda.body {
        LambdaBody::Expr(value) => {
            return_value(unit, value.clone(), &lambda.body_type, &sam.return_type, &sam.erased_return)
                .ok_or_else(no_value)
        }
        LambdaBody::Block(_) if sam.returns_value() && lambda.body_type.is_void() => Err(no_value()),
        LambdaBody::Block(stmts) => {
            let mut body = stmts.clone();
            let mut mismatch = None;
            for_each_stmt_mut(&mut body, &mut |stmt| {
                let Stmt::Return(value) = stmt else {
                    return;
                };
                match (value.take(), sam.returns_value()) {
                    (Some(v), true) => {
                        let v = adapt_value(unit, v, &lambda.body_type, &sam.return_type);
                        *value = Some(adapt_value(unit, v, &sam.return_type, &sam.erased_return));
                    }
                    (None, false) => {}
                    (Some(v), false) => {
                        *value = Some(v);
                        mismatch.get_or_insert("returns a value from a void");
                    }
                    (None, true) => {
                        mismatch.get_or_insert("returns without a value from a value-returning");
                    }
                }
            });
            match mismatch {
                Some(what) => Err(ClosureError::arity(
                    span,
                    format!("lambda {} method {}", what, sam.name),
                )),
                None => Ok(body),
            }
        }
    }
}
