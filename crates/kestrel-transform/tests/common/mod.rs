//! Fixtures shared by the end-to-end lowering tests.

#![allow(dead_code)]

use kestrel_hir::build::{MethodDef, UnitBuilder};
use kestrel_hir::CompilationUnit;
use kestrel_runtime::Interpreter;
use kestrel_transform::rewrite::count_sites;
use kestrel_transform::{convert_closures, LoweringOptions, LoweringSummary};
use kestrel_types::{ClassId, ClassType, MethodId, PrimitiveKind, Type};

/// The functional interfaces most tests target
pub struct Library {
    pub runnable: ClassId,
    pub run: MethodId,
    pub supplier: ClassId,
    pub get: MethodId,
    pub function: ClassId,
    pub apply: MethodId,
    pub bi_function: ClassId,
    pub bi_apply: MethodId,
    pub binary_operator: ClassId,
}

impl Library {
    pub fn supplier_of(&self, ty: Type) -> Type {
        Type::generic(self.supplier, vec![ty])
    }

    pub fn function_of(&self, from: Type, to: Type) -> Type {
        Type::generic(self.function, vec![from, to])
    }

    pub fn binary_operator_of(&self, ty: Type) -> Type {
        Type::generic(self.binary_operator, vec![ty])
    }
}

pub fn library(b: &mut UnitBuilder) -> Library {
    let runnable = b.interface("Runnable");
    let run = b.method(runnable, MethodDef::new("run"));

    let supplier = b.interface("Supplier");
    b.type_params(supplier, &["T"]);
    let get = b.method(supplier, MethodDef::new("get").returns(Type::type_var("T")));

    let function = b.interface("Function");
    b.type_params(function, &["T", "R"]);
    let t = b.local("t", Type::type_var("T"));
    let apply = b.method(
        function,
        MethodDef::new("apply").params(vec![t]).returns(Type::type_var("R")),
    );

    let bi_function = b.interface("BiFunction");
    b.type_params(bi_function, &["T", "U", "R"]);
    let t = b.local("t", Type::type_var("T"));
    let u = b.local("u", Type::type_var("U"));
    let bi_apply = b.method(
        bi_function,
        MethodDef::new("apply").params(vec![t, u]).returns(Type::type_var("R")),
    );

    let binary_operator = b.interface("BinaryOperator");
    b.type_params(binary_operator, &["T"]);
    let t = Type::type_var("T");
    b.implements(
        binary_operator,
        ClassType::new(bi_function, vec![t.clone(), t.clone(), t]),
    );

    Library {
        runnable,
        run,
        supplier,
        get,
        function,
        apply,
        bi_function,
        bi_apply,
        binary_operator,
    }
}

pub fn integer() -> Type {
    Type::Boxed(PrimitiveKind::Int)
}

pub fn lower(unit: &mut CompilationUnit) -> LoweringSummary {
    lower_with(unit, &LoweringOptions::default())
}

pub fn lower_with(unit: &mut CompilationUnit, options: &LoweringOptions) -> LoweringSummary {
    let summary = convert_closures(unit, options).unwrap_or_else(|e| panic!("lowering failed: {}", e));
    assert_eq!(remaining_sites(unit), 0, "closure nodes survived lowering");
    summary
}

pub fn remaining_sites(unit: &CompilationUnit) -> usize {
    unit.types.iter().map(count_sites).sum()
}

/// Run a static no-argument method and return what it printed.
pub fn run(unit: &CompilationUnit, class: &str, method: &str) -> Vec<String> {
    let mut interp = Interpreter::new(unit).unwrap_or_else(|e| panic!("initialization failed: {}", e));
    interp
        .run(class, method, vec![])
        .unwrap_or_else(|e| panic!("{}.{} failed: {}", class, method, e));
    interp.take_output()
}

pub fn adapter_named<'u>(unit: &'u CompilationUnit, name: &str) -> &'u kestrel_hir::TypeDecl {
    unit.types
        .iter()
        .find(|d| d.name == name)
        .unwrap_or_else(|| panic!("no adapter named {}", name))
}
