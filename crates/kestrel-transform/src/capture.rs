//! Capture analysis.
//!
//! Walks a closure body and classifies every reference to outer state.
//! Locals declared inside the body are ignored; outer locals must be
//! effectively final and are captured by value; `this`, implicit instance
//! members and inner-class creation capture an enclosing instance by
//! reference; super calls additionally record the dispatch context.
//!
//! Inner closure sites are lowered before their enclosing body is analyzed,
//! so what they need shows up here as the operands of their construction
//! expression and is captured transitively.

use crate::descriptor::{BoundReceiver, CapturedBinding, ConstructorTarget, ReferenceForm, Slot};
use crate::error::{ClosureError, Result};
use crate::scope::SiteContext;
use kestrel_hir::visit::{
    declared_locals, declared_locals_in_expr, walk_expr, walk_expr_mut, walk_stmts, walk_stmts_mut, Node,
};
use kestrel_hir::{Expr, LambdaBody, LambdaExpr, Receiver, Stmt};
use kestrel_types::{ClassId, FieldId, LocalId};
use log::trace;
use std::collections::HashSet;

/// Ordered, de-duplicated captures of one site and the adapter fields that hold them
#[derive(Debug, Clone, Default)]
pub struct CaptureSet {
    pub bindings: Vec<CapturedBinding>,
    pub slots: Vec<Slot>,
}

impl CaptureSet {
    fn add(&mut self, binding: CapturedBinding) {
        if self.bindings.contains(&binding) {
            return;
        }
        trace!("capture {:?}", binding);
        let slot = match &binding {
            CapturedBinding::Local { id, name, ty } => Some(Slot::Local {
                id: *id,
                name: name.clone(),
                ty: ty.clone(),
            }),
            CapturedBinding::EnclosingInstance { depth, class } => Some(Slot::Instance {
                depth: *depth,
                class: *class,
            }),
            CapturedBinding::OuterField { .. } | CapturedBinding::SuperDispatchContext { .. } => None,
            CapturedBinding::BoundReceiver { ty } => Some(Slot::Receiver { ty: ty.clone() }),
        };
        self.bindings.push(binding);
        if let Some(slot) = slot {
            if !self.slots.contains(&slot) {
                self.slots.push(slot);
            }
        }
    }

    fn add_instance(&mut self, site: &SiteContext<'_>, depth: u32) {
        let class = site.chain[depth as usize];
        self.add(CapturedBinding::EnclosingInstance { depth, class });
    }

    fn add_outer_field(&mut self, site: &SiteContext<'_>, depth: u32, field: FieldId) {
        self.add_instance(site, depth);
        self.add(CapturedBinding::OuterField { depth, field });
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn local_slot(&self, id: LocalId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| matches!(s, Slot::Local { id: l, .. } if *l == id))
    }

    pub fn instance_slot(&self, depth: u32) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| matches!(s, Slot::Instance { depth: d, .. } if *d == depth))
    }

    pub fn receiver_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| matches!(s, Slot::Receiver { .. }))
    }
}

/// Read of adapter field `slot` inside the adapter's own method
pub fn slot_read(adapter: ClassId, slot: usize) -> Expr {
    Expr::FieldGet {
        receiver: Some(Box::new(Expr::This { qualifier: None })),
        field: FieldId {
            class: adapter,
            index: slot as u32,
        },
    }
}

/// Analyze a lambda whose inner sites have already been lowered.
pub fn analyze_lambda(site: &SiteContext<'_>, lambda: &LambdaExpr) -> Result<CaptureSet> {
    let mut declared: HashSet<LocalId> = lambda.params.iter().map(|p| p.id).collect();
    match &lambda.body {
        LambdaBody::Expr(expr) => declared_locals_in_expr(expr, &mut |id| {
            declared.insert(id);
        }),
        LambdaBody::Block(stmts) => declared_locals(stmts, &mut |id| {
            declared.insert(id);
        }),
    }

    let mut analyzer = Analyzer {
        site,
        declared: &declared,
        set: CaptureSet::default(),
        error: None,
    };
    match &lambda.body {
        LambdaBody::Expr(expr) => walk_expr(expr, &mut |node| analyzer.visit(node)),
        LambdaBody::Block(stmts) => walk_stmts(stmts, &mut |node| analyzer.visit(node)),
    }
    match analyzer.error {
        Some(err) => Err(err),
        None => Ok(analyzer.set),
    }
}

/// Captures implied by a resolved method reference form.
pub fn analyze_reference(site: &SiteContext<'_>, form: &ReferenceForm) -> CaptureSet {
    let mut set = CaptureSet::default();
    match form {
        ReferenceForm::BoundInstance {
            receiver: BoundReceiver::Instance { depth },
            ..
        } => set.add_instance(site, *depth),
        ReferenceForm::BoundInstance {
            receiver: BoundReceiver::Expr { ty },
            ..
        } => set.add(CapturedBinding::BoundReceiver { ty: ty.clone() }),
        ReferenceForm::Constructor(ConstructorTarget::Class {
            outer_depth: Some(depth),
            ..
        }) => set.add_instance(site, *depth),
        ReferenceForm::Super {
            declaring_type,
            depth,
            ..
        } => {
            set.add_instance(site, *depth);
            set.add(CapturedBinding::SuperDispatchContext {
                declaring_type: *declaring_type,
            });
        }
        ReferenceForm::Static { .. }
        | ReferenceForm::UnboundInstance { .. }
        | ReferenceForm::Constructor(_) => {}
    }
    set
}

struct Analyzer<'s, 'a> {
    site: &'s SiteContext<'a>,
    declared: &'s HashSet<LocalId>,
    set: CaptureSet,
    error: Option<ClosureError>,
}

impl Analyzer<'_, '_> {
    fn visit(&mut self, node: Node<'_>) -> bool {
        if self.error.is_some() {
            return false;
        }
        let Node::Expr(expr) = node else {
            return true;
        };
        if let Err(err) = self.visit_expr(expr) {
            self.error = Some(err);
            return false;
        }
        true
    }

    fn visit_expr(&mut self, expr: &Expr) -> Result<()> {
        let site = self.site;
        match expr {
            Expr::Local(id) if !self.declared.contains(id) => {
                let local = site.scope.lookup(*id).ok_or_else(|| {
                    ClosureError::invalid_capture(
                        site.span,
                        format!("local #{} is not visible from the closure site", id),
                    )
                })?;
                if !local.effectively_final {
                    return Err(ClosureError::invalid_capture(
                        site.span,
                        format!("local `{}` is captured but not effectively final", local.name),
                    ));
                }
                self.set.add(CapturedBinding::Local {
                    id: local.id,
                    name: local.name.clone(),
                    ty: local.ty.clone(),
                });
            }
            Expr::Assign { local, .. } if !self.declared.contains(local) => {
                let name = site
                    .scope
                    .lookup(*local)
                    .map(|l| l.name.clone())
                    .unwrap_or_else(|| format!("#{}", local));
                return Err(ClosureError::invalid_capture(
                    site.span,
                    format!("local `{}` is assigned inside a closure", name),
                ));
            }
            Expr::This { qualifier } => {
                let depth = site.this_depth(*qualifier)?;
                self.set.add_instance(site, depth);
            }
            Expr::FieldGet {
                receiver: None,
                field,
            }
            | Expr::FieldSet {
                receiver: None,
                field,
                ..
            } => {
                if !site.field(*field)?.is_static {
                    let depth = site.member_depth(field.class)?;
                    self.set.add_outer_field(site, depth, *field);
                }
            }
            Expr::Call {
                receiver: Receiver::Implicit,
                method,
                ..
            } => {
                if !site.method(*method)?.is_static {
                    let depth = site.member_depth(method.class)?;
                    self.set.add_instance(site, depth);
                }
            }
            Expr::Call {
                receiver: Receiver::Super { qualifier },
                method,
                ..
            } => {
                let depth = site.this_depth(*qualifier)?;
                self.set.add_instance(site, depth);
                self.set.add(CapturedBinding::SuperDispatchContext {
                    declaring_type: method.class,
                });
            }
            Expr::New {
                class, outer: None, ..
            } => {
                if let Some(depth) = site.creation_outer_depth(class.id)? {
                    self.set.add_instance(site, depth);
                }
            }
            Expr::Lambda(_) | Expr::MethodRef(_) => {
                return Err(ClosureError::invalid_capture(
                    site.span,
                    "nested closure site was not lowered before its enclosing body",
                ));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Redirect every captured reference in a lowered body to the adapter's fields.
pub struct BodyRewriter<'s, 'a> {
    pub site: &'s SiteContext<'a>,
    pub set: &'s CaptureSet,
    pub adapter: ClassId,
}

impl BodyRewriter<'_, '_> {
    fn instance(&self, depth: u32) -> Option<Expr> {
        self.set.instance_slot(depth).map(|s| slot_read(self.adapter, s))
    }

    fn member_instance(&self, owner: ClassId) -> Option<Expr> {
        self.site.member_depth(owner).ok().and_then(|d| self.instance(d))
    }

    fn rewrite(&self, expr: &mut Expr) {
        let site = self.site;
        match expr {
            Expr::Local(id) => {
                if let Some(slot) = self.set.local_slot(*id) {
                    *expr = slot_read(self.adapter, slot);
                }
            }
            Expr::This { qualifier } => {
                if let Some(replacement) = site.this_depth(*qualifier).ok().and_then(|d| self.instance(d)) {
                    *expr = replacement;
                }
            }
            Expr::FieldGet { receiver, field } | Expr::FieldSet { receiver, field, .. } => {
                if receiver.is_none() && site.field(*field).map_or(false, |f| !f.is_static) {
                    *receiver = self.member_instance(field.class).map(Box::new);
                }
            }
            Expr::Call { receiver, method, .. } => match receiver {
                Receiver::Implicit if site.method(*method).map_or(false, |m| !m.is_static) => {
                    if let Some(instance) = self.member_instance(method.class) {
                        *receiver = Receiver::Expr(Box::new(instance));
                    }
                }
                Receiver::Super { qualifier } => {
                    if let Some(instance) = site.this_depth(*qualifier).ok().and_then(|d| self.instance(d)) {
                        *receiver = Receiver::NonVirtual(Box::new(instance));
                    }
                }
                _ => {}
            },
            Expr::New { class, outer, .. } if outer.is_none() => {
                if let Ok(Some(depth)) = site.creation_outer_depth(class.id) {
                    *outer = self.instance(depth).map(Box::new);
                }
            }
            _ => {}
        }
    }

    pub fn rewrite_expr(&self, expr: &mut Expr) {
        walk_expr_mut(expr, &mut |e| self.rewrite(e));
    }

    pub fn rewrite_stmts(&self, stmts: &mut [Stmt]) {
        walk_stmts_mut(stmts, &mut |e| self.rewrite(e));
    }
}

/// Values stored into the adapter fields when the site is evaluated, in slot order.
pub fn allocation_args(site: &SiteContext<'_>, set: &CaptureSet, receiver: Option<Expr>) -> Vec<Expr> {
    let mut receiver = receiver;
    set.slots
        .iter()
        .map(|slot| match slot {
            Slot::Local { id, .. } => Expr::Local(*id),
            Slot::Instance { depth: 0, .. } => Expr::This { qualifier: None },
            Slot::Instance { depth, .. } => Expr::This {
                qualifier: Some(site.chain[*depth as usize]),
            },
            Slot::Receiver { .. } => Expr::NullCheck(Box::new(receiver.take().unwrap_or(Expr::Null))),
        })
        .collect()
}
