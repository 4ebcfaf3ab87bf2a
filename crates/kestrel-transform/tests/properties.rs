//! Observable behavior of lowered closures, checked by evaluating the
//! lowered tree.

mod common;

use common::{adapter_named, integer, library, lower, lower_with, run};
use kestrel_hir::build::{
    add, array_get, array_length, array_set, assign, box_value, call, call_static, cast, compare, ctor_ref,
    expr_stmt, field, for_loop, int, lambda, let_, local, new_array, new_object, null, println, ret, set_field,
    string, sub, super_ref, type_ref, MethodDef, UnitBuilder,
};
use kestrel_hir::{CaptureKind, CompareOp, Expr, Instantiation, SingletonInit};
use kestrel_runtime::{Interpreter, RuntimeError};
use kestrel_transform::{LoweringOptions, SingletonPolicy};
use kestrel_types::{ClassType, PrimitiveKind, Type};

#[test]
fn test_non_capturing_site_yields_one_instance_per_site() {
    let mut b = UnitBuilder::new("Singletons");
    let lib = library(&mut b);
    let main = b.class("Main");
    let answer = || lambda(vec![], int(42), Type::int(), lib.supplier_of(integer()));
    let make = b.method(
        main,
        MethodDef::new("make")
            .static_()
            .returns(lib.supplier_of(integer()))
            .body(vec![ret(answer())]),
    );
    let other = b.method(
        main,
        MethodDef::new("other")
            .static_()
            .returns(lib.supplier_of(integer()))
            .body(vec![ret(answer())]),
    );
    b.method(
        main,
        MethodDef::new("main").static_().body(vec![
            expr_stmt(println(compare(
                CompareOp::Eq,
                call_static(make, vec![]),
                call_static(make, vec![]),
            ))),
            expr_stmt(println(compare(
                CompareOp::Eq,
                call_static(make, vec![]),
                call_static(other, vec![]),
            ))),
            expr_stmt(println(call(call_static(make, vec![]), lib.get, vec![]))),
        ]),
    );
    let unit = b.finish();

    let mut lazy = unit.clone();
    let summary = lower(&mut lazy);
    assert_eq!(summary.sites, 2);
    assert_eq!(summary.singletons, 2);
    assert_eq!(summary.capturing, 0);
    assert_eq!(run(&lazy, "Main", "main"), vec!["true", "false", "42"]);

    let mut eager = unit;
    let options = LoweringOptions {
        singleton: SingletonPolicy::Eager,
        ..LoweringOptions::default()
    };
    lower_with(&mut eager, &options);
    let info = adapter_named(&eager, "Main_$Lambda$1").adapter.clone().unwrap();
    assert_eq!(info.instantiation, Instantiation::Singleton(SingletonInit::Eager));
    assert_eq!(run(&eager, "Main", "main"), vec!["true", "false", "42"]);
}

#[test]
fn test_captured_locals_are_snapshots() {
    let mut b = UnitBuilder::new("Snapshots");
    let lib = library(&mut b);
    let main = b.class("Main");
    let supplier = lib.supplier_of(integer());
    let suppliers = b.local("suppliers", Type::array(supplier.clone()));
    let i = b.mutable_local("i", Type::int());
    let v = b.local("v", Type::int());
    let j = b.mutable_local("j", Type::int());

    let fill = for_loop(
        vec![let_(&i, int(0))],
        compare(CompareOp::Lt, local(&i), int(4)),
        vec![assign(&i, add(local(&i), int(1)))],
        vec![
            let_(&v, sub(int(3), local(&i))),
            expr_stmt(array_set(
                local(&suppliers),
                local(&i),
                lambda(vec![], local(&v), Type::int(), supplier.clone()),
            )),
        ],
    );
    let drain = for_loop(
        vec![let_(&j, int(0))],
        compare(CompareOp::Lt, local(&j), int(4)),
        vec![assign(&j, add(local(&j), int(1)))],
        vec![expr_stmt(println(call(
            array_get(local(&suppliers), local(&j)),
            lib.get,
            vec![],
        )))],
    );
    b.method(
        main,
        MethodDef::new("main").static_().body(vec![
            let_(&suppliers, new_array(supplier.clone(), int(4))),
            fill,
            drain,
        ]),
    );
    let mut unit = b.finish();

    let summary = lower(&mut unit);
    assert_eq!(summary.capturing, 1);
    let info = adapter_named(&unit, "Main_$Lambda$1").adapter.clone().unwrap();
    assert_eq!(
        info.captures,
        vec![CaptureKind::Local {
            id: v.id,
            name: "v".to_string()
        }]
    );
    assert_eq!(run(&unit, "Main", "main"), vec!["3", "2", "1", "0"]);
}

#[test]
fn test_captured_instances_see_later_field_writes() {
    let mut b = UnitBuilder::new("Live");
    let lib = library(&mut b);
    let main = b.class("Main");
    let counter = b.class("Counter");
    let count = b.field(counter, "count", Type::int());
    let reader = b.method(
        counter,
        MethodDef::new("reader")
            .returns(lib.supplier_of(integer()))
            .body(vec![ret(lambda(vec![], field(count), Type::int(), lib.supplier_of(integer())))]),
    );
    let c = b.local("c", Type::class(counter));
    let s = b.local("s", lib.supplier_of(integer()));
    b.method(
        main,
        MethodDef::new("main").static_().body(vec![
            let_(&c, new_object(counter, None, vec![])),
            let_(&s, call(local(&c), reader, vec![])),
            expr_stmt(set_field(Some(local(&c)), count, int(5))),
            expr_stmt(println(call(local(&s), lib.get, vec![]))),
            expr_stmt(set_field(Some(local(&c)), count, int(7))),
            expr_stmt(println(call(local(&s), lib.get, vec![]))),
        ]),
    );
    let mut unit = b.finish();

    lower(&mut unit);
    let info = adapter_named(&unit, "Counter_$Lambda$1").adapter.clone().unwrap();
    assert_eq!(info.captures, vec![CaptureKind::EnclosingInstance { depth: 0 }]);
    assert_eq!(info.instantiation, Instantiation::PerEvaluation);
    assert_eq!(run(&unit, "Main", "main"), vec!["5", "7"]);
}

#[test]
fn test_unbound_reference_faults_on_null_receiver() {
    let mut b = UnitBuilder::new("Unbound");
    let lib = library(&mut b);
    let main = b.class("Main");
    let text = b.class("Text");
    b.method(
        text,
        MethodDef::new("length").returns(Type::int()).body(vec![ret(int(3))]),
    );
    let length = || type_ref(Type::class(text), "length", lib.function_of(Type::class(text), integer()));
    b.method(
        main,
        MethodDef::new("main").static_().body(vec![expr_stmt(println(call(
            length(),
            lib.apply,
            vec![new_object(text, None, vec![])],
        )))]),
    );
    b.method(
        main,
        MethodDef::new("broken")
            .static_()
            .body(vec![expr_stmt(println(call(length(), lib.apply, vec![null()])))]),
    );
    let mut unit = b.finish();

    let summary = lower(&mut unit);
    assert_eq!(summary.singletons, 2);
    assert_eq!(run(&unit, "Main", "main"), vec!["3"]);

    let mut interp = Interpreter::new(&unit).unwrap();
    let err = interp.run("Main", "broken", vec![]).unwrap_err();
    assert!(matches!(err, RuntimeError::NullPointer(_)), "got {:?}", err);
}

#[test]
fn test_inner_constructor_reference_threads_enclosing_instance() {
    let mut b = UnitBuilder::new("Inner");
    let lib = library(&mut b);
    let main = b.class("Main");
    let outer = b.class("Outer");
    let id = b.field(outer, "id", Type::int());
    let inner = b.member_class(outer, "Inner", false);
    let outer_id = b.method(
        inner,
        MethodDef::new("outerId").returns(Type::int()).body(vec![ret(field(id))]),
    );
    let factory = b.method(
        outer,
        MethodDef::new("factory")
            .returns(lib.supplier_of(Type::class(inner)))
            .body(vec![ret(ctor_ref(Type::class(inner), lib.supplier_of(Type::class(inner))))]),
    );

    let first = b.local("first", Type::class(outer));
    let second = b.local("second", Type::class(outer));
    let make_first = b.local("makeFirst", lib.supplier_of(Type::class(inner)));
    let make_second = b.local("makeSecond", lib.supplier_of(Type::class(inner)));
    let read = |maker: &kestrel_hir::Param| {
        expr_stmt(println(call(
            cast(call(local(maker), lib.get, vec![]), Type::class(inner)),
            outer_id,
            vec![],
        )))
    };
    b.method(
        main,
        MethodDef::new("main").static_().body(vec![
            let_(&first, new_object(outer, None, vec![])),
            expr_stmt(set_field(Some(local(&first)), id, int(1))),
            let_(&second, new_object(outer, None, vec![])),
            expr_stmt(set_field(Some(local(&second)), id, int(2))),
            let_(&make_first, call(local(&first), factory, vec![])),
            let_(&make_second, call(local(&second), factory, vec![])),
            read(&make_second),
            read(&make_first),
        ]),
    );
    let mut unit = b.finish();

    let summary = lower(&mut unit);
    assert_eq!(summary.capturing, 1);
    let info = adapter_named(&unit, "Outer_$Lambda$1").adapter.clone().unwrap();
    assert_eq!(info.captures, vec![CaptureKind::EnclosingInstance { depth: 0 }]);
    assert_eq!(run(&unit, "Main", "main"), vec!["2", "1"]);
}

#[test]
fn test_super_reference_skips_later_overrides() {
    let mut b = UnitBuilder::new("Super");
    let lib = library(&mut b);
    let main = b.class("Main");
    let top = b.class("A");
    let name = b.method(top, MethodDef::new("name").returns(Type::String).body(vec![ret(string("A"))]));
    let middle = b.class("B");
    b.extends(middle, ClassType::raw(top));
    b.method(middle, MethodDef::new("name").returns(Type::String).body(vec![ret(string("B"))]));
    let via_super = b.method(
        middle,
        MethodDef::new("viaSuper")
            .returns(lib.supplier_of(Type::String))
            .body(vec![ret(super_ref(None, "name", lib.supplier_of(Type::String)))]),
    );
    let bottom = b.class("C");
    b.extends(bottom, ClassType::raw(middle));
    b.method(bottom, MethodDef::new("name").returns(Type::String).body(vec![ret(string("C"))]));

    let c = b.local("c", Type::class(bottom));
    b.method(
        main,
        MethodDef::new("main").static_().body(vec![
            let_(&c, new_object(bottom, None, vec![])),
            expr_stmt(println(call(call(local(&c), via_super, vec![]), lib.get, vec![]))),
            expr_stmt(println(call(
                call(new_object(middle, None, vec![]), via_super, vec![]),
                lib.get,
                vec![],
            ))),
            expr_stmt(println(call(local(&c), name, vec![]))),
            expr_stmt(println(compare(
                CompareOp::Eq,
                call(local(&c), via_super, vec![]),
                call(local(&c), via_super, vec![]),
            ))),
        ]),
    );
    let mut unit = b.finish();

    let summary = lower(&mut unit);
    assert_eq!(summary.capturing, 1);
    let info = adapter_named(&unit, "B_$Lambda$1").adapter.clone().unwrap();
    assert_eq!(info.super_dispatch, Some(top));
    assert_eq!(info.instantiation, Instantiation::PerEvaluation);
    assert_eq!(run(&unit, "Main", "main"), vec!["A", "A", "C", "false"]);
}

#[test]
fn test_variadic_target_packs_trailing_arguments() {
    let mut b = UnitBuilder::new("Varargs");
    let main = b.class("Main");
    let shape = b.interface("IntObjStr");
    let a = b.local("a", Type::int());
    let o = b.local("o", Type::Object);
    let s = b.local("s", Type::String);
    let apply = b.method(
        shape,
        MethodDef::new("apply").params(vec![a, o, s]).returns(Type::String),
    );

    let fmt = b.class("Fmt");
    let first = b.local("first", Type::int());
    let rest = b.local("rest", Type::array(Type::Object));
    let element = |index: i32| array_get(local(&rest), int(index));
    let body = add(
        add(
            add(
                add(
                    add(add(local(&first), string(":")), array_length(local(&rest))),
                    string(":"),
                ),
                element(0),
            ),
            string(","),
        ),
        element(1),
    );
    let join = b.method(
        fmt,
        MethodDef::new("join")
            .static_()
            .varargs()
            .params(vec![first.clone(), rest.clone()])
            .returns(Type::String)
            .body(vec![ret(body)]),
    );

    let packed = Expr::ArrayLiteral {
        element: Type::Object,
        values: vec![box_value(int(22), PrimitiveKind::Int), string("42")],
    };
    b.method(
        main,
        MethodDef::new("main").static_().body(vec![
            expr_stmt(println(call(
                type_ref(Type::class(fmt), "join", Type::class(shape)),
                apply,
                vec![int(12), box_value(int(22), PrimitiveKind::Int), string("42")],
            ))),
            expr_stmt(println(call_static(join, vec![int(12), packed]))),
        ]),
    );
    let mut unit = b.finish();

    lower(&mut unit);
    assert_eq!(run(&unit, "Main", "main"), vec!["12:2:22,42", "12:2:22,42"]);
}

#[test]
fn test_unboxing_a_null_argument_faults() {
    let mut b = UnitBuilder::new("NullUnbox");
    let lib = library(&mut b);
    let main = b.class("Main");
    let util = b.class("Util");
    let n = b.local("n", Type::int());
    b.method(
        util,
        MethodDef::new("inc")
            .static_()
            .params(vec![n.clone()])
            .returns(Type::int())
            .body(vec![ret(add(local(&n), int(1)))]),
    );
    let inc = || type_ref(Type::class(util), "inc", lib.function_of(integer(), integer()));
    b.method(
        main,
        MethodDef::new("main").static_().body(vec![expr_stmt(println(call(
            inc(),
            lib.apply,
            vec![box_value(int(1), PrimitiveKind::Int)],
        )))]),
    );
    b.method(
        main,
        MethodDef::new("broken")
            .static_()
            .body(vec![expr_stmt(println(call(inc(), lib.apply, vec![null()])))]),
    );
    let mut unit = b.finish();

    lower(&mut unit);
    assert_eq!(run(&unit, "Main", "main"), vec!["2"]);

    let mut interp = Interpreter::new(&unit).unwrap();
    let err = interp.run("Main", "broken", vec![]).unwrap_err();
    assert!(matches!(err, RuntimeError::NullPointer(_)), "got {:?}", err);
}

#[test]
fn test_variadic_target_with_no_trailing_arguments_gets_an_empty_array() {
    let mut b = UnitBuilder::new("EmptyVarargs");
    let lib = library(&mut b);
    let main = b.class("Main");
    let util = b.class("Util");
    let rest = b.local("rest", Type::array(Type::Object));
    b.method(
        util,
        MethodDef::new("count")
            .static_()
            .varargs()
            .params(vec![rest.clone()])
            .returns(Type::int())
            .body(vec![ret(array_length(local(&rest)))]),
    );
    b.method(
        main,
        MethodDef::new("main").static_().body(vec![
            expr_stmt(println(call(
                type_ref(Type::class(util), "count", lib.supplier_of(integer())),
                lib.get,
                vec![],
            ))),
            expr_stmt(println(call(
                type_ref(Type::class(util), "count", lib.function_of(Type::String, integer())),
                lib.apply,
                vec![string("x")],
            ))),
        ]),
    );
    let mut unit = b.finish();

    lower(&mut unit);
    assert_eq!(run(&unit, "Main", "main"), vec!["0", "1"]);
}

#[test]
fn test_trailing_array_is_passed_through_to_variadic_target() {
    let mut b = UnitBuilder::new("PassThrough");
    let main = b.class("Main");
    let joiner = b.interface("Joiner");
    let parts = b.local("parts", Type::array(Type::Object));
    let join = b.method(
        joiner,
        MethodDef::new("join").params(vec![parts]).returns(Type::String),
    );
    let fmt = b.class("Fmt");
    let rest = b.local("rest", Type::array(Type::Object));
    b.method(
        fmt,
        MethodDef::new("first")
            .static_()
            .varargs()
            .params(vec![rest.clone()])
            .returns(Type::String)
            .body(vec![ret(add(
                add(array_length(local(&rest)), string(":")),
                array_get(local(&rest), int(0)),
            ))]),
    );
    let values = Expr::ArrayLiteral {
        element: Type::Object,
        values: vec![string("a"), string("b")],
    };
    b.method(
        main,
        MethodDef::new("main").static_().body(vec![expr_stmt(println(call(
            type_ref(Type::class(fmt), "first", Type::class(joiner)),
            join,
            vec![values],
        )))]),
    );
    let mut unit = b.finish();

    lower(&mut unit);
    assert_eq!(run(&unit, "Main", "main"), vec!["2:a"]);
}

#[test]
fn test_deeply_nested_sites_reach_outer_instances() {
    let mut b = UnitBuilder::new("Depth");
    let lib = library(&mut b);
    let main = b.class("Main");
    let x = b.class("X");
    let tag = b.field(x, "tag", Type::int());
    let y = b.member_class(x, "Y", false);
    let z = b.member_class(y, "Z", false);
    let z_tag = b.method(z, MethodDef::new("tag").returns(Type::int()).body(vec![ret(field(tag))]));
    let p = b.member_class(z, "P", false);
    let read = b.method(
        p,
        MethodDef::new("read")
            .returns(lib.supplier_of(integer()))
            .body(vec![ret(lambda(vec![], field(tag), Type::int(), lib.supplier_of(integer())))]),
    );
    let make = b.method(
        p,
        MethodDef::new("make")
            .returns(lib.supplier_of(Type::class(z)))
            .body(vec![ret(ctor_ref(Type::class(z), lib.supplier_of(Type::class(z))))]),
    );

    let inner_of = |class, outer: &kestrel_hir::Param| Expr::New {
        class: ClassType::raw(class),
        ctor: None,
        outer: Some(Box::new(local(outer))),
        args: vec![],
    };
    let (xs, ys, zs, ps) = (
        b.local("x", Type::class(x)),
        b.local("y", Type::class(y)),
        b.local("z", Type::class(z)),
        b.local("p", Type::class(p)),
    );
    b.method(
        main,
        MethodDef::new("main").static_().body(vec![
            let_(&xs, new_object(x, None, vec![])),
            expr_stmt(set_field(Some(local(&xs)), tag, int(9))),
            let_(&ys, inner_of(y, &xs)),
            let_(&zs, inner_of(z, &ys)),
            let_(&ps, inner_of(p, &zs)),
            expr_stmt(println(call(call(local(&ps), read, vec![]), lib.get, vec![]))),
            expr_stmt(println(call(
                cast(call(call(local(&ps), make, vec![]), lib.get, vec![]), Type::class(z)),
                z_tag,
                vec![],
            ))),
        ]),
    );
    let mut unit = b.finish();

    let summary = lower(&mut unit);
    assert_eq!(summary.capturing, 2);
    let mut captures: Vec<CaptureKind> = summary
        .adapters
        .iter()
        .flat_map(|(id, _)| unit.decl(*id).and_then(|d| d.adapter.clone()).unwrap().captures)
        .collect();
    captures.sort_by_key(|c| match c {
        CaptureKind::EnclosingInstance { depth } => *depth,
        _ => u32::MAX,
    });
    assert_eq!(
        captures,
        vec![
            CaptureKind::EnclosingInstance { depth: 2 },
            CaptureKind::EnclosingInstance { depth: 3 },
        ]
    );
    assert_eq!(run(&unit, "Main", "main"), vec!["9", "9"]);
}
