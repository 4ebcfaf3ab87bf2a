//! HIR definitions
//!
//! The HIR is the fully resolved, type-checked tree handed over by the front
//! end. Every type declaration lives in one flat arena owned by the
//! [`CompilationUnit`]; nesting is expressed through `outer` links. Lambda and
//! method-reference nodes carry their inferred target type. After closure
//! conversion none of them remain: each is replaced by a [`Expr::NewClosure`]
//! or [`Expr::ClosureSingleton`] node referring to a synthesized adapter type.
//!
//! Local and anonymous class bodies are lowered like any other type body: the
//! locals of the method that declares them are not in scope there. A front end
//! that lets such a body read an outer local must first copy the value into a
//! field of the class (typically through a constructor parameter) and rewrite
//! the read as a field access. A closure site inside the body then captures
//! the class instance, not the outer local.

use kestrel_diagnostics::Span;
use kestrel_types::{ClassId, ClassType, FieldId, LocalId, MethodId, PrimitiveKind, Type, TypeParam};
use serde::{Deserialize, Serialize};

/// One resolved source file (or any unit the front end chooses to lower together)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationUnit {
    pub name: String,
    /// Path of the file the unit was parsed from, for diagnostics
    #[serde(default)]
    pub source_path: Option<String>,
    /// Type arena; `types[i].id == ClassId(i)`
    pub types: Vec<TypeDecl>,
}

/// How a type declaration is nested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    TopLevel,
    /// Declared directly in the body of another type
    Member,
    /// Declared inside a method or initializer body. Outer locals arrive
    /// through fields, never as free `Local` reads.
    Local,
    /// Anonymous class body; same rule for outer locals as `Local`
    Anonymous,
    /// Closure adapter synthesized by closure conversion
    Adapter,
}

impl TypeKind {
    /// Named types own an identity counter; local, anonymous and adapter
    /// types draw from the nearest named type around them.
    pub fn is_named(self) -> bool {
        matches!(self, TypeKind::TopLevel | TypeKind::Member)
    }
}

/// A class or interface declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub id: ClassId,
    /// Simple name (anonymous classes use their ordinal, e.g. "1")
    pub name: String,
    pub kind: TypeKind,
    pub is_interface: bool,
    pub is_abstract: bool,
    /// Instances of a non-static nested type carry an enclosing instance
    pub is_static: bool,
    /// Lexically enclosing type
    pub outer: Option<ClassId>,
    pub type_params: Vec<TypeParam>,
    pub superclass: Option<ClassType>,
    pub interfaces: Vec<ClassType>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub initializers: Vec<Initializer>,
    /// Present only on adapter types
    #[serde(default)]
    pub adapter: Option<AdapterInfo>,
    #[serde(default)]
    pub span: Span,
}

impl TypeDecl {
    pub fn new(id: ClassId, name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            is_interface: false,
            is_abstract: false,
            is_static: kind == TypeKind::TopLevel,
            outer: None,
            type_params: Vec::new(),
            superclass: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            initializers: Vec::new(),
            adapter: None,
            span: Span::DUMMY,
        }
    }

    pub fn constructors(&self) -> impl Iterator<Item = (MethodId, &Method)> {
        let class = self.id;
        self.methods
            .iter()
            .enumerate()
            .filter(|(_, m)| m.kind == MethodKind::Constructor)
            .map(move |(i, m)| (MethodId { class, index: i as u32 }, m))
    }
}

/// A field declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub is_static: bool,
    pub is_final: bool,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodKind {
    Method,
    Constructor,
}

/// A method or constructor declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    /// Method's own type parameters (separate from the declaring type's)
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Param>,
    pub return_type: Type,
    /// Declared checked exception types
    pub throws: Vec<Type>,
    pub kind: MethodKind,
    pub is_static: bool,
    pub is_abstract: bool,
    /// Interface default method
    pub is_default: bool,
    /// Last parameter is an array accepting a variable argument count
    pub is_varargs: bool,
    /// None for abstract methods
    pub body: Option<Vec<Stmt>>,
    #[serde(default)]
    pub span: Span,
}

/// A method, lambda, foreach or catch parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub id: LocalId,
    pub name: String,
    pub ty: Type,
    /// Never reassigned after initialization (final or effectively final)
    pub effectively_final: bool,
}

/// Instance or static initializer block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Initializer {
    pub is_static: bool,
    pub body: Vec<Stmt>,
}

/// Synthesized-adapter metadata recorded by closure conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterInfo {
    /// Span of the lambda or method reference this adapter replaces
    pub site: Span,
    /// Type that lexically contains the site
    pub enclosing: ClassId,
    /// Interface whose single abstract method the adapter implements
    pub functional_interface: ClassType,
    /// Name of the implemented abstract method
    pub sam: String,
    /// Extra marker/default-method interfaces from an intersection target
    pub markers: Vec<ClassType>,
    /// One entry per adapter field, in field order
    pub captures: Vec<CaptureKind>,
    /// Declaring type of a super-qualified target, invoked non-virtually
    pub super_dispatch: Option<ClassId>,
    pub instantiation: Instantiation,
}

/// What an adapter field holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CaptureKind {
    /// Snapshot of an effectively-final local
    Local { id: LocalId, name: String },
    /// Enclosing instance `depth` levels out from the site's type
    EnclosingInstance { depth: u32 },
    /// Receiver of a bound method reference, evaluated once at the site
    BoundReceiver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SingletonInit {
    /// Created on first evaluation of the site
    Lazy,
    /// Created when the program starts
    Eager,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instantiation {
    /// Non-capturing: one shared instance per adapter
    Singleton(SingletonInit),
    /// Capturing: a fresh instance every time the site is evaluated
    PerEvaluation,
}

/// Statement in a method, initializer or lambda body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// Local variable declaration
    Let {
        id: LocalId,
        name: String,
        ty: Type,
        effectively_final: bool,
        init: Option<Expr>,
    },
    Expr(Expr),
    Return(Option<Expr>),
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    /// Basic for loop; `init` declarations are scoped to the loop
    For {
        init: Vec<Stmt>,
        condition: Option<Expr>,
        update: Vec<Expr>,
        body: Vec<Stmt>,
    },
    /// Enhanced for over an array; `var` is a fresh binding per iteration
    ForEach {
        var: Param,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Block(Vec<Stmt>),
    Throw(Expr),
    Try {
        body: Vec<Stmt>,
        catch: Option<CatchClause>,
        finally: Option<Vec<Stmt>>,
    },
    Break,
    Continue,
}

/// Catch clause in a try statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    pub param: Param,
    pub body: Vec<Stmt>,
}

/// Expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    // Literals
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Char(char),
    String(String),

    /// Read of a local or parameter
    Local(LocalId),
    /// Assignment to a local (the value of the expression is the new value)
    Assign {
        local: LocalId,
        value: Box<Expr>,
    },
    /// `this` or `Outer.this`
    This {
        qualifier: Option<ClassId>,
    },
    /// Field read. A missing receiver means the declaring type for static
    /// fields and the (possibly outer) implicit instance otherwise.
    FieldGet {
        receiver: Option<Box<Expr>>,
        field: FieldId,
    },
    FieldSet {
        receiver: Option<Box<Expr>>,
        field: FieldId,
        value: Box<Expr>,
    },
    Call {
        receiver: Receiver,
        method: MethodId,
        args: Vec<Expr>,
    },
    /// Object creation. `ctor` is None for the implicit no-arg constructor;
    /// `outer` is the explicit enclosing instance (`o.new Inner()`).
    New {
        class: ClassType,
        ctor: Option<MethodId>,
        outer: Option<Box<Expr>>,
        args: Vec<Expr>,
    },

    // Arrays
    NewArray {
        element: Type,
        length: Box<Expr>,
    },
    ArrayLiteral {
        element: Type,
        values: Vec<Expr>,
    },
    ArrayGet {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    ArraySet {
        array: Box<Expr>,
        index: Box<Expr>,
        value: Box<Expr>,
    },
    ArrayLength(Box<Expr>),

    // Operators
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },

    // Conversions
    /// Checked reference cast
    Cast {
        expr: Box<Expr>,
        ty: Type,
    },
    InstanceOf {
        expr: Box<Expr>,
        ty: Type,
    },
    /// Primitive to wrapper
    Box {
        expr: Box<Expr>,
        kind: PrimitiveKind,
    },
    /// Wrapper to primitive; faults on null
    Unbox {
        expr: Box<Expr>,
        kind: PrimitiveKind,
    },
    /// Primitive-to-primitive conversion
    Convert {
        expr: Box<Expr>,
        to: PrimitiveKind,
    },
    /// Evaluates to its operand; faults if the operand is null
    NullCheck(Box<Expr>),

    /// Built-in operation with no declared target
    Intrinsic {
        op: Intrinsic,
        args: Vec<Expr>,
    },

    // Closure conversion input
    Lambda(Box<LambdaExpr>),
    MethodRef(Box<MethodRefExpr>),

    // Closure conversion output
    /// Allocate a capturing adapter; `captures` initialize its fields in order
    NewClosure {
        adapter: ClassId,
        captures: Vec<Expr>,
    },
    /// The shared instance of a non-capturing adapter
    ClosureSingleton {
        adapter: ClassId,
    },
}

/// Receiver of a method call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Receiver {
    /// Unqualified call: static, or on the (possibly outer) implicit instance
    Implicit,
    /// Static call through the declaring type
    Static,
    /// Virtual call on an explicit receiver
    Expr(Box<Expr>),
    /// `super.m()` or `Outer.super.m()`. `method` names the implementation
    /// to run; `qualifier` picks the enclosing instance that receives the
    /// call (None for the innermost one, including `Iface.super.m()`).
    Super { qualifier: Option<ClassId> },
    /// Non-virtual call of exactly `method` on the given object
    NonVirtual(Box<Expr>),
}

/// A lambda expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaExpr {
    pub params: Vec<Param>,
    pub body: LambdaBody,
    /// Type of the expression body, or of the returned values of a block body
    /// (`Void` when nothing is returned)
    pub body_type: Type,
    /// Inferred target type (functional interface, possibly an intersection)
    pub target: Type,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LambdaBody {
    Expr(Expr),
    Block(Vec<Stmt>),
}

/// A method reference expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodRefExpr {
    pub qualifier: RefQualifier,
    pub member: RefMember,
    /// Explicit type arguments (`Type::<String>m`)
    #[serde(default)]
    pub type_args: Vec<Type>,
    /// Inferred target type
    pub target: Type,
    #[serde(default)]
    pub span: Span,
}

/// Left-hand side of `::`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RefQualifier {
    /// `Type::m`, `Type::new`, `Elem[]::new`
    Type(Type),
    /// `expr::m` (including `this::m`); `ty` is the static type of `expr`
    Expr { expr: Box<Expr>, ty: Type },
    /// `super::m`, `Outer.super::m` or `Iface.super::m`
    Super { qualifier: Option<ClassId> },
}

/// Right-hand side of `::`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RefMember {
    Method(String),
    New,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intrinsic {
    /// Print the string form of the single argument followed by a newline
    Println,
}

/// Binary arithmetic operators (`Add` concatenates when either side is a string)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

/// Comparison operators (reference identity for `Eq`/`Ne` on objects)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

impl Expr {
    pub fn boxed(self) -> Box<Expr> {
        Box::new(self)
    }

    /// True for lambda and method-reference nodes
    pub fn is_closure_site(&self) -> bool {
        matches!(self, Expr::Lambda(_) | Expr::MethodRef(_))
    }
}

impl Param {
    pub fn new(id: LocalId, name: impl Into<String>, ty: Type) -> Self {
        Self {
            id,
            name: name.into(),
            ty,
            effectively_final: true,
        }
    }
}
