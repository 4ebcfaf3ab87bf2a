//! Programmatic construction of resolved trees.
//!
//! Stands in for the front end in tests and tools: declarations go through
//! [`UnitBuilder`], expressions and statements through the free functions.

use crate::ir::*;
use kestrel_diagnostics::Span;
use kestrel_types::{ClassId, ClassType, FieldId, LocalId, MethodId, PrimitiveKind, Type, TypeParam};

/// Builds a [`CompilationUnit`] one declaration at a time
pub struct UnitBuilder {
    unit: CompilationUnit,
    next_local: LocalId,
}

impl UnitBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            unit: CompilationUnit::new(name),
            next_local: 1,
        }
    }

    fn push(&mut self, name: &str, kind: TypeKind, outer: Option<ClassId>, is_static: bool) -> ClassId {
        let id = ClassId(self.unit.types.len() as u32);
        let mut decl = TypeDecl::new(id, name, kind);
        decl.outer = outer;
        decl.is_static = is_static;
        self.unit.types.push(decl);
        id
    }

    pub fn class(&mut self, name: &str) -> ClassId {
        self.push(name, TypeKind::TopLevel, None, true)
    }

    pub fn interface(&mut self, name: &str) -> ClassId {
        let id = self.push(name, TypeKind::TopLevel, None, true);
        self.decl(id).is_interface = true;
        id
    }

    pub fn member_class(&mut self, outer: ClassId, name: &str, is_static: bool) -> ClassId {
        self.push(name, TypeKind::Member, Some(outer), is_static)
    }

    pub fn member_interface(&mut self, outer: ClassId, name: &str) -> ClassId {
        let id = self.push(name, TypeKind::Member, Some(outer), true);
        self.decl(id).is_interface = true;
        id
    }

    /// Local class; declared in a static context when `is_static`.
    pub fn local_class(&mut self, outer: ClassId, name: &str, is_static: bool) -> ClassId {
        self.push(name, TypeKind::Local, Some(outer), is_static)
    }

    pub fn anonymous_class(&mut self, outer: ClassId, ordinal: &str) -> ClassId {
        self.push(ordinal, TypeKind::Anonymous, Some(outer), false)
    }

    pub fn decl(&mut self, id: ClassId) -> &mut TypeDecl {
        &mut self.unit.types[id.index()]
    }

    pub fn extends(&mut self, class: ClassId, superclass: ClassType) {
        self.decl(class).superclass = Some(superclass);
    }

    pub fn implements(&mut self, class: ClassId, iface: ClassType) {
        self.decl(class).interfaces.push(iface);
    }

    pub fn type_params(&mut self, class: ClassId, names: &[&str]) {
        self.decl(class).type_params = names.iter().map(|n| TypeParam::new(*n)).collect();
    }

    pub fn field(&mut self, class: ClassId, name: &str, ty: Type) -> FieldId {
        self.add_field(class, name, ty, false, None)
    }

    pub fn static_field(&mut self, class: ClassId, name: &str, ty: Type, init: Option<Expr>) -> FieldId {
        self.add_field(class, name, ty, true, init)
    }

    pub fn add_field(
        &mut self,
        class: ClassId,
        name: &str,
        ty: Type,
        is_static: bool,
        init: Option<Expr>,
    ) -> FieldId {
        let decl = self.decl(class);
        decl.fields.push(Field {
            name: name.to_string(),
            ty,
            is_static,
            is_final: false,
            init,
        });
        FieldId {
            class,
            index: decl.fields.len() as u32 - 1,
        }
    }

    pub fn set_field_init(&mut self, field: FieldId, init: Expr) {
        self.decl(field.class).fields[field.index as usize].init = Some(init);
    }

    /// Fresh effectively-final local or parameter
    pub fn local(&mut self, name: &str, ty: Type) -> Param {
        let id = self.next_local;
        self.next_local += 1;
        Param::new(id, name, ty)
    }

    /// Fresh local that is reassigned somewhere
    pub fn mutable_local(&mut self, name: &str, ty: Type) -> Param {
        let mut param = self.local(name, ty);
        param.effectively_final = false;
        param
    }

    pub fn method(&mut self, class: ClassId, def: MethodDef) -> MethodId {
        let is_interface = self.decl(class).is_interface;
        let mut method = def.method;
        if is_interface && method.body.is_none() && !method.is_static && method.kind == MethodKind::Method {
            method.is_abstract = true;
        }
        let decl = self.decl(class);
        decl.methods.push(method);
        MethodId {
            class,
            index: decl.methods.len() as u32 - 1,
        }
    }

    pub fn set_body(&mut self, method: MethodId, body: Vec<Stmt>) {
        let m = &mut self.decl(method.class).methods[method.index as usize];
        m.body = Some(body);
        m.is_abstract = false;
    }

    pub fn initializer(&mut self, class: ClassId, is_static: bool, body: Vec<Stmt>) {
        self.decl(class).initializers.push(Initializer { is_static, body });
    }

    pub fn finish(self) -> CompilationUnit {
        self.unit
    }
}

/// Fluent description of a method handed to [`UnitBuilder::method`]
pub struct MethodDef {
    method: Method,
}

impl MethodDef {
    pub fn new(name: &str) -> Self {
        Self {
            method: Method {
                name: name.to_string(),
                type_params: Vec::new(),
                params: Vec::new(),
                return_type: Type::Void,
                throws: Vec::new(),
                kind: MethodKind::Method,
                is_static: false,
                is_abstract: false,
                is_default: false,
                is_varargs: false,
                body: None,
                span: Span::DUMMY,
            },
        }
    }

    pub fn constructor() -> Self {
        let mut def = Self::new("<init>");
        def.method.kind = MethodKind::Constructor;
        def.method.body = Some(Vec::new());
        def
    }

    pub fn params(mut self, params: Vec<Param>) -> Self {
        self.method.params = params;
        self
    }

    pub fn returns(mut self, ty: Type) -> Self {
        self.method.return_type = ty;
        self
    }

    pub fn type_params(mut self, names: &[&str]) -> Self {
        self.method.type_params = names.iter().map(|n| TypeParam::new(*n)).collect();
        self
    }

    pub fn static_(mut self) -> Self {
        self.method.is_static = true;
        self
    }

    pub fn abstract_(mut self) -> Self {
        self.method.is_abstract = true;
        self
    }

    pub fn default_(mut self) -> Self {
        self.method.is_default = true;
        self
    }

    pub fn varargs(mut self) -> Self {
        self.method.is_varargs = true;
        self
    }

    pub fn throws(mut self, ty: Type) -> Self {
        self.method.throws.push(ty);
        self
    }

    pub fn body(mut self, body: Vec<Stmt>) -> Self {
        self.method.body = Some(body);
        self
    }
}

// Expressions

pub fn int(value: i32) -> Expr {
    Expr::Int(value)
}

pub fn string(value: &str) -> Expr {
    Expr::String(value.to_string())
}

pub fn null() -> Expr {
    Expr::Null
}

pub fn local(param: &Param) -> Expr {
    Expr::Local(param.id)
}

pub fn assign(param: &Param, value: Expr) -> Expr {
    Expr::Assign {
        local: param.id,
        value: Box::new(value),
    }
}

pub fn this() -> Expr {
    Expr::This { qualifier: None }
}

pub fn outer_this(class: ClassId) -> Expr {
    Expr::This {
        qualifier: Some(class),
    }
}

/// Unqualified field read (static, or on the implicit instance)
pub fn field(field: FieldId) -> Expr {
    Expr::FieldGet {
        receiver: None,
        field,
    }
}

pub fn get(receiver: Expr, field: FieldId) -> Expr {
    Expr::FieldGet {
        receiver: Some(Box::new(receiver)),
        field,
    }
}

pub fn set_field(receiver: Option<Expr>, field: FieldId, value: Expr) -> Expr {
    Expr::FieldSet {
        receiver: receiver.map(Box::new),
        field,
        value: Box::new(value),
    }
}

pub fn call(receiver: Expr, method: MethodId, args: Vec<Expr>) -> Expr {
    Expr::Call {
        receiver: Receiver::Expr(Box::new(receiver)),
        method,
        args,
    }
}

pub fn call_static(method: MethodId, args: Vec<Expr>) -> Expr {
    Expr::Call {
        receiver: Receiver::Static,
        method,
        args,
    }
}

pub fn call_implicit(method: MethodId, args: Vec<Expr>) -> Expr {
    Expr::Call {
        receiver: Receiver::Implicit,
        method,
        args,
    }
}

pub fn call_super(qualifier: Option<ClassId>, method: MethodId, args: Vec<Expr>) -> Expr {
    Expr::Call {
        receiver: Receiver::Super { qualifier },
        method,
        args,
    }
}

pub fn new_object(class: ClassId, ctor: Option<MethodId>, args: Vec<Expr>) -> Expr {
    Expr::New {
        class: ClassType::raw(class),
        ctor,
        outer: None,
        args,
    }
}

pub fn new_array(element: Type, length: Expr) -> Expr {
    Expr::NewArray {
        element,
        length: Box::new(length),
    }
}

pub fn array_get(array: Expr, index: Expr) -> Expr {
    Expr::ArrayGet {
        array: Box::new(array),
        index: Box::new(index),
    }
}

pub fn array_set(array: Expr, index: Expr, value: Expr) -> Expr {
    Expr::ArraySet {
        array: Box::new(array),
        index: Box::new(index),
        value: Box::new(value),
    }
}

pub fn array_length(array: Expr) -> Expr {
    Expr::ArrayLength(Box::new(array))
}

pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn add(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::Add, left, right)
}

pub fn sub(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::Sub, left, right)
}

pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Expr {
    Expr::Compare {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn cast(expr: Expr, ty: Type) -> Expr {
    Expr::Cast {
        expr: Box::new(expr),
        ty,
    }
}

pub fn box_value(expr: Expr, kind: PrimitiveKind) -> Expr {
    Expr::Box {
        expr: Box::new(expr),
        kind,
    }
}

pub fn unbox(expr: Expr, kind: PrimitiveKind) -> Expr {
    Expr::Unbox {
        expr: Box::new(expr),
        kind,
    }
}

pub fn println(value: Expr) -> Expr {
    Expr::Intrinsic {
        op: Intrinsic::Println,
        args: vec![value],
    }
}

/// Expression-bodied lambda
pub fn lambda(params: Vec<Param>, body: Expr, body_type: Type, target: Type) -> Expr {
    Expr::Lambda(Box::new(LambdaExpr {
        params,
        body: LambdaBody::Expr(body),
        body_type,
        target,
        span: Span::DUMMY,
    }))
}

/// Block-bodied lambda
pub fn lambda_block(params: Vec<Param>, body: Vec<Stmt>, body_type: Type, target: Type) -> Expr {
    Expr::Lambda(Box::new(LambdaExpr {
        params,
        body: LambdaBody::Block(body),
        body_type,
        target,
        span: Span::DUMMY,
    }))
}

fn method_ref(qualifier: RefQualifier, member: RefMember, target: Type) -> Expr {
    Expr::MethodRef(Box::new(MethodRefExpr {
        qualifier,
        member,
        type_args: Vec::new(),
        target,
        span: Span::DUMMY,
    }))
}

/// `Type::name` (static or unbound instance)
pub fn type_ref(qualifier: Type, name: &str, target: Type) -> Expr {
    method_ref(RefQualifier::Type(qualifier), RefMember::Method(name.to_string()), target)
}

/// `expr::name`
pub fn bound_ref(receiver: Expr, receiver_ty: Type, name: &str, target: Type) -> Expr {
    method_ref(
        RefQualifier::Expr {
            expr: Box::new(receiver),
            ty: receiver_ty,
        },
        RefMember::Method(name.to_string()),
        target,
    )
}

/// `Type::new` or `Elem[]::new`
pub fn ctor_ref(qualifier: Type, target: Type) -> Expr {
    method_ref(RefQualifier::Type(qualifier), RefMember::New, target)
}

/// `super::name`, `Outer.super::name` or `Iface.super::name`
pub fn super_ref(qualifier: Option<ClassId>, name: &str, target: Type) -> Expr {
    method_ref(
        RefQualifier::Super { qualifier },
        RefMember::Method(name.to_string()),
        target,
    )
}

/// Attach explicit type arguments to a method reference
pub fn with_type_args(mut expr: Expr, type_args: Vec<Type>) -> Expr {
    if let Expr::MethodRef(reference) = &mut expr {
        reference.type_args = type_args;
    }
    expr
}

/// Attach a source span to a lambda or method reference
pub fn with_span(mut expr: Expr, span: Span) -> Expr {
    match &mut expr {
        Expr::Lambda(lambda) => lambda.span = span,
        Expr::MethodRef(reference) => reference.span = span,
        _ => {}
    }
    expr
}

// Statements

pub fn let_(param: &Param, init: Expr) -> Stmt {
    Stmt::Let {
        id: param.id,
        name: param.name.clone(),
        ty: param.ty.clone(),
        effectively_final: param.effectively_final,
        init: Some(init),
    }
}

pub fn expr_stmt(expr: Expr) -> Stmt {
    Stmt::Expr(expr)
}

pub fn ret(value: Expr) -> Stmt {
    Stmt::Return(Some(value))
}

pub fn for_loop(init: Vec<Stmt>, condition: Expr, update: Vec<Expr>, body: Vec<Stmt>) -> Stmt {
    Stmt::For {
        init,
        condition: Some(condition),
        update,
        body,
    }
}
