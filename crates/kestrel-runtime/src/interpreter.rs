//! Tree-walking evaluator for lowered compilation units.

use crate::error::{Result, RuntimeError};
use crate::value::{convert, Instance, Num, Object, ObjectRef, Value};
use kestrel_hir::{
    BinaryOp, CompareOp, CompilationUnit, Expr, Instantiation, Intrinsic, LogicalOp, Method, MethodKind, Receiver,
    SingletonInit, Stmt, TypeDecl, TypeKind, UnaryOp,
};
use kestrel_types::{ClassId, FieldId, LocalId, MethodId, Type};
use log::{debug, trace};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

const MAX_CALL_DEPTH: usize = 256;

/// Activation record of one method, initializer or field initializer
#[derive(Default)]
struct Frame {
    this: Option<ObjectRef>,
    locals: HashMap<LocalId, Value>,
}

/// How a statement completed
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Interpreter<'u> {
    unit: &'u CompilationUnit,
    statics: HashMap<FieldId, Value>,
    singletons: HashMap<ClassId, Value>,
    output: Vec<String>,
    depth: usize,
    next_serial: u32,
}

impl<'u> Interpreter<'u> {
    /// Prepare `unit` for evaluation: eager closure singletons are created,
    /// then static fields and static initializers run in declaration order.
    pub fn new(unit: &'u CompilationUnit) -> Result<Self> {
        let mut interp = Self {
            unit,
            statics: HashMap::new(),
            singletons: HashMap::new(),
            output: Vec::new(),
            depth: 0,
            next_serial: 0,
        };

        for decl in &unit.types {
            let eager = matches!(
                decl.adapter.as_ref().map(|a| a.instantiation),
                Some(Instantiation::Singleton(SingletonInit::Eager))
            );
            if eager {
                let instance = interp.allocate(decl.id, None);
                interp.singletons.insert(decl.id, instance);
            }
        }

        for decl in &unit.types {
            for (index, field) in decl.fields.iter().enumerate() {
                if field.is_static {
                    let id = FieldId {
                        class: decl.id,
                        index: index as u32,
                    };
                    interp.statics.insert(id, Value::default_for(&field.ty));
                }
            }
        }
        for decl in &unit.types {
            interp.run_static_init(decl)?;
        }
        debug!(
            "{}: {} static field(s), {} eager singleton(s)",
            unit.name,
            interp.statics.len(),
            interp.singletons.len()
        );
        Ok(interp)
    }

    fn run_static_init(&mut self, decl: &TypeDecl) -> Result<()> {
        let mut frame = Frame::default();
        for (index, field) in decl.fields.iter().enumerate() {
            if let (true, Some(init)) = (field.is_static, &field.init) {
                let value = self.eval(init, &mut frame)?;
                let id = FieldId {
                    class: decl.id,
                    index: index as u32,
                };
                self.statics.insert(id, value);
            }
        }
        for init in decl.initializers.iter().filter(|i| i.is_static) {
            self.exec_block(&init.body, &mut frame)?;
        }
        Ok(())
    }

    /// Lines printed so far
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    pub fn static_field(&self, class: &str, name: &str) -> Option<&Value> {
        let class = self.unit.find_type(class)?;
        let decl = self.unit.decl(class)?;
        let index = decl.fields.iter().position(|f| f.is_static && f.name == name)?;
        self.statics.get(&FieldId {
            class,
            index: index as u32,
        })
    }

    /// Run the static method `class.method` with `args`.
    pub fn run(&mut self, class: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        let id = self
            .unit
            .find_type(class)
            .and_then(|c| self.unit.find_declared_method(c, method))
            .ok_or_else(|| RuntimeError::NoSuchMethod {
                class: class.to_string(),
                name: method.to_string(),
            })?;
        self.invoke(id, None, args)
    }

    /// Dynamically dispatched call of `name` on `receiver`, matching by arity.
    pub fn call(&mut self, receiver: &Value, name: &str, args: Vec<Value>) -> Result<Value> {
        let object = self.non_null(receiver, name)?;
        let class = self.class_of(&object, name)?;
        let arity = args.len();
        let method = self
            .find_implementation(class, &|_: MethodId, m: &Method| m.name == name && m.params.len() == arity)
            .ok_or_else(|| RuntimeError::NoSuchMethod {
                class: self.unit.class_name(class),
                name: name.to_string(),
            })?;
        self.invoke(method, Some(object), args)
    }

    /// Execute exactly `method`, without dynamic dispatch.
    pub fn invoke(&mut self, method: MethodId, this: Option<ObjectRef>, args: Vec<Value>) -> Result<Value> {
        let unit = self.unit;
        let declared = unit.method(method).ok_or_else(|| RuntimeError::invalid("dangling method id"))?;
        let Some(body) = &declared.body else {
            return Err(RuntimeError::NoSuchMethod {
                class: unit.class_name(method.class),
                name: format!("{} (abstract)", declared.name),
            });
        };
        if args.len() != declared.params.len() {
            return Err(RuntimeError::invalid(format!(
                "`{}` takes {} argument(s), {} given",
                declared.name,
                declared.params.len(),
                args.len()
            )));
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::StackOverflow(MAX_CALL_DEPTH));
        }
        trace!("invoke {}.{}", unit.class_name(method.class), declared.name);

        let mut frame = Frame {
            this,
            locals: declared.params.iter().map(|p| p.id).zip(args).collect(),
        };
        self.depth += 1;
        let flow = self.exec_block(body, &mut frame);
        self.depth -= 1;
        match flow? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Void),
        }
    }

    // ---- objects ----

    fn allocate(&mut self, class: ClassId, outer: Option<ObjectRef>) -> Value {
        let mut fields = HashMap::new();
        let mut current = Some(class);
        while let Some(id) = current {
            let Some(decl) = self.unit.decl(id) else {
                break;
            };
            for (index, field) in decl.fields.iter().enumerate() {
                if !field.is_static {
                    let id = FieldId {
                        class: decl.id,
                        index: index as u32,
                    };
                    fields.insert(id, Value::default_for(&field.ty));
                }
            }
            current = decl.superclass.as_ref().map(|s| s.id);
        }
        self.next_serial += 1;
        Value::object(Object::Instance(Instance {
            class,
            serial: self.next_serial,
            fields,
            outer,
        }))
    }

    /// Create an instance: field initializers and instance initializers run
    /// from the root superclass down, then the selected constructor body.
    fn construct(
        &mut self,
        class: ClassId,
        ctor: Option<MethodId>,
        outer: Option<ObjectRef>,
        args: Vec<Value>,
    ) -> Result<Value> {
        let decl = self.decl(class)?;
        if decl.is_interface || decl.is_abstract {
            return Err(RuntimeError::invalid(format!("cannot instantiate {}", decl.name)));
        }
        let value = self.allocate(class, outer);
        let Value::Ref(object) = &value else {
            return Err(RuntimeError::invalid("allocation did not produce an object"));
        };

        let mut lineage = Vec::new();
        let mut current = Some(class);
        while let Some(id) = current {
            let decl = self.decl(id)?;
            lineage.push(decl);
            current = decl.superclass.as_ref().map(|s| s.id);
        }
        let mut frame = Frame {
            this: Some(object.clone()),
            locals: HashMap::new(),
        };
        for decl in lineage.into_iter().rev() {
            for (index, field) in decl.fields.iter().enumerate() {
                if let (false, Some(init)) = (field.is_static, &field.init) {
                    let init = self.eval(init, &mut frame)?;
                    let id = FieldId {
                        class: decl.id,
                        index: index as u32,
                    };
                    self.store_field(object, id, init);
                }
            }
            for init in decl.initializers.iter().filter(|i| !i.is_static) {
                self.exec_block(&init.body, &mut frame)?;
            }
        }

        if let Some(ctor) = ctor {
            self.invoke(ctor, Some(object.clone()), args)?;
        } else if !args.is_empty() {
            return Err(RuntimeError::invalid("implicit constructor takes no arguments"));
        }
        Ok(value)
    }

    fn decl(&self, class: ClassId) -> Result<&'u TypeDecl> {
        self.unit
            .decl(class)
            .ok_or_else(|| RuntimeError::invalid(format!("unknown type #{}", class.0)))
    }

    fn class_of(&self, object: &ObjectRef, what: &str) -> Result<ClassId> {
        match &*object.borrow() {
            Object::Instance(instance) => Ok(instance.class),
            _ => Err(RuntimeError::NoSuchMethod {
                class: "built-in value".to_string(),
                name: what.to_string(),
            }),
        }
    }

    fn non_null(&self, value: &Value, what: &str) -> Result<ObjectRef> {
        match value {
            Value::Ref(object) => Ok(object.clone()),
            Value::Null => Err(RuntimeError::null(format!("`{}` on null", what))),
            other => Err(RuntimeError::invalid(format!("`{}` on a {}", what, other.kind_name()))),
        }
    }

    fn load_field(&self, object: &ObjectRef, field: FieldId) -> Result<Value> {
        match &*object.borrow() {
            Object::Instance(instance) => instance
                .fields
                .get(&field)
                .cloned()
                .ok_or_else(|| RuntimeError::invalid(format!("object has no field {}.{}", field.class.0, field.index))),
            _ => Err(RuntimeError::invalid("field access on a built-in value")),
        }
    }

    fn store_field(&self, object: &ObjectRef, field: FieldId, value: Value) {
        if let Object::Instance(instance) = &mut *object.borrow_mut() {
            instance.fields.insert(field, value);
        }
    }

    /// Walk enclosing-instance links from `this` to the first object that is
    /// a `owner`.
    fn enclosing(&self, frame: &Frame, owner: ClassId) -> Result<ObjectRef> {
        let mut current = frame.this.clone();
        while let Some(object) = current {
            let next = match &*object.borrow() {
                Object::Instance(instance) if self.unit.is_subclass(instance.class, owner) => None,
                Object::Instance(instance) => Some(instance.outer.clone()),
                _ => Some(None),
            };
            match next {
                None => return Ok(object),
                Some(outer) => current = outer,
            }
        }
        Err(RuntimeError::invalid(format!(
            "no enclosing instance of {}",
            self.unit.class_name(owner)
        )))
    }

    fn this_instance(&self, frame: &Frame, qualifier: Option<ClassId>) -> Result<ObjectRef> {
        if let Some(class) = qualifier {
            if !self.decl(class)?.is_interface {
                return self.enclosing(frame, class);
            }
        }
        frame
            .this
            .clone()
            .ok_or_else(|| RuntimeError::invalid("`this` in a static context"))
    }

    fn needs_outer(decl: &TypeDecl) -> bool {
        !decl.is_static && decl.kind != TypeKind::TopLevel && decl.kind != TypeKind::Adapter && decl.outer.is_some()
    }

    // ---- dispatch ----

    /// Implementation of `target` for an object of class `class`: the
    /// superclass chain first, then default methods breadth-first. Methods
    /// match by name and erased parameters, falling back to name and arity.
    fn resolve_virtual(&self, class: ClassId, target: MethodId) -> Option<MethodId> {
        let unit = self.unit;
        let method = unit.method(target)?;
        let erased = unit.erased_params(target);
        let arity = method.params.len();
        self.find_implementation(class, &|id: MethodId, m: &Method| m.name == method.name && unit.erased_params(id) == erased)
            .or_else(|| self.find_implementation(class, &|_: MethodId, m: &Method| m.name == method.name && m.params.len() == arity))
    }

    fn find_implementation(&self, class: ClassId, matches: &dyn Fn(MethodId, &Method) -> bool) -> Option<MethodId> {
        let mut interfaces = VecDeque::new();
        let mut current = Some(class);
        while let Some(id) = current {
            let decl = self.unit.decl(id)?;
            for (index, method) in decl.methods.iter().enumerate() {
                let mid = MethodId {
                    class: id,
                    index: index as u32,
                };
                if method.kind == MethodKind::Method && !method.is_static && method.body.is_some() && matches(mid, method) {
                    return Some(mid);
                }
            }
            interfaces.extend(decl.interfaces.iter().map(|i| i.id));
            current = decl.superclass.as_ref().map(|s| s.id);
        }
        let mut seen = HashSet::new();
        while let Some(id) = interfaces.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            let Some(decl) = self.unit.decl(id) else {
                continue;
            };
            for (index, method) in decl.methods.iter().enumerate() {
                let mid = MethodId {
                    class: id,
                    index: index as u32,
                };
                if method.is_default && matches(mid, method) {
                    return Some(mid);
                }
            }
            interfaces.extend(decl.interfaces.iter().map(|i| i.id));
        }
        None
    }

    fn call_virtual(&mut self, object: ObjectRef, method: MethodId, args: Vec<Value>) -> Result<Value> {
        let name = self.unit.method(method).map(|m| m.name.clone()).unwrap_or_default();
        let class = self.class_of(&object, &name)?;
        let target = self
            .resolve_virtual(class, method)
            .ok_or_else(|| RuntimeError::NoSuchMethod {
                class: self.unit.class_name(class),
                name,
            })?;
        self.invoke(target, Some(object), args)
    }

    // ---- statements ----

    fn exec_block(&mut self, stmts: &[Stmt], frame: &mut Frame) -> Result<Flow> {
        for stmt in stmts {
            match self.exec(stmt, frame)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, frame: &mut Frame) -> Result<Flow> {
        match stmt {
            Stmt::Let { id, ty, init, .. } => {
                let value = match init {
                    Some(init) => self.eval(init, frame)?,
                    None => Value::default_for(ty),
                };
                frame.locals.insert(*id, value);
            }
            Stmt::Expr(expr) => {
                self.eval(expr, frame)?;
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(value) => self.eval(value, frame)?,
                    None => Value::Void,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(condition, frame)?.as_bool()? {
                    return self.exec_block(then_branch, frame);
                } else if let Some(else_branch) = else_branch {
                    return self.exec_block(else_branch, frame);
                }
            }
            Stmt::While { condition, body } => {
                while self.eval(condition, frame)?.as_bool()? {
                    match self.exec_block(body, frame)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::For {
                init,
                condition,
                update,
                body,
            } => {
                if let flow @ Flow::Return(_) = self.exec_block(init, frame)? {
                    return Ok(flow);
                }
                loop {
                    if let Some(condition) = condition {
                        if !self.eval(condition, frame)?.as_bool()? {
                            break;
                        }
                    }
                    match self.exec_block(body, frame)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    for expr in update {
                        self.eval(expr, frame)?;
                    }
                }
            }
            Stmt::ForEach { var, iterable, body } => {
                let array = self.eval(iterable, frame)?;
                let object = self.non_null(&array, "for-each")?;
                let values = match &*object.borrow() {
                    Object::Array { values, .. } => values.clone(),
                    _ => return Err(RuntimeError::invalid("for-each over a non-array")),
                };
                for value in values {
                    frame.locals.insert(var.id, value);
                    match self.exec_block(body, frame)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::Block(body) => return self.exec_block(body, frame),
            Stmt::Throw(expr) => {
                let value = self.eval(expr, frame)?;
                if value.is_null() {
                    return Err(RuntimeError::null("throw null"));
                }
                return Err(RuntimeError::Thrown(value));
            }
            Stmt::Try {
                body,
                catch,
                finally,
            } => {
                let mut outcome = self.exec_block(body, frame);
                let caught = match (&outcome, catch) {
                    (Err(RuntimeError::Thrown(thrown)), Some(catch)) if self.is_instance(thrown, &catch.param.ty) => {
                        Some((thrown.clone(), catch))
                    }
                    _ => None,
                };
                if let Some((thrown, catch)) = caught {
                    debug!("caught {}", thrown.kind_name());
                    frame.locals.insert(catch.param.id, thrown);
                    outcome = self.exec_block(&catch.body, frame);
                }
                if let Some(finally) = finally {
                    match self.exec_block(finally, frame)? {
                        Flow::Normal => {}
                        abrupt => return Ok(abrupt),
                    }
                }
                return outcome;
            }
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    // ---- expressions ----

    fn eval_all(&mut self, exprs: &[Expr], frame: &mut Frame) -> Result<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e, frame)).collect()
    }

    fn eval(&mut self, expr: &Expr, frame: &mut Frame) -> Result<Value> {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(v) => Ok(Value::Int(*v)),
            Expr::Long(v) => Ok(Value::Long(*v)),
            Expr::Double(v) => Ok(Value::Double(*v)),
            Expr::Char(c) => Ok(Value::Char(*c)),
            Expr::String(s) => Ok(Value::string(s)),
            Expr::Local(id) => frame
                .locals
                .get(id)
                .cloned()
                .ok_or_else(|| RuntimeError::invalid(format!("local #{} read before assignment", id))),
            Expr::Assign { local, value } => {
                let value = self.eval(value, frame)?;
                frame.locals.insert(*local, value.clone());
                Ok(value)
            }
            Expr::This { qualifier } => Ok(Value::Ref(self.this_instance(frame, *qualifier)?)),
            Expr::FieldGet { receiver, field } => {
                if let Some(value) = self.statics.get(field) {
                    return Ok(value.clone());
                }
                let object = self.field_owner(receiver.as_deref(), *field, frame)?;
                self.load_field(&object, *field)
            }
            Expr::FieldSet {
                receiver,
                field,
                value,
            } => {
                let is_static = self.statics.contains_key(field);
                let owner = if is_static {
                    None
                } else {
                    Some(self.field_owner(receiver.as_deref(), *field, frame)?)
                };
                let value = self.eval(value, frame)?;
                match owner {
                    Some(object) => self.store_field(&object, *field, value.clone()),
                    None => {
                        self.statics.insert(*field, value.clone());
                    }
                }
                Ok(value)
            }
            Expr::Call { receiver, method, args } => self.eval_call(receiver, *method, args, frame),
            Expr::New {
                class,
                ctor,
                outer,
                args,
            } => {
                let decl = self.decl(class.id)?;
                let outer = match outer {
                    Some(outer) => {
                        let outer = self.eval(outer, frame)?;
                        Some(self.non_null(&outer, "inner class creation")?)
                    }
                    None if Self::needs_outer(decl) => match decl.outer {
                        Some(owner) => Some(self.enclosing(frame, owner)?),
                        None => None,
                    },
                    None => None,
                };
                let args = self.eval_all(args, frame)?;
                self.construct(class.id, *ctor, outer, args)
            }
            Expr::NewArray { element, length } => {
                let length = self.eval(length, frame)?.as_int()?;
                if length < 0 {
                    return Err(RuntimeError::NegativeArraySize(length));
                }
                let values = vec![Value::default_for(element); length as usize];
                Ok(Value::object(Object::Array {
                    element: element.clone(),
                    values,
                }))
            }
            Expr::ArrayLiteral { element, values } => {
                let values = self.eval_all(values, frame)?;
                Ok(Value::object(Object::Array {
                    element: element.clone(),
                    values,
                }))
            }
            Expr::ArrayGet { array, index } => {
                let array = self.eval(array, frame)?;
                let index = self.eval(index, frame)?.as_int()?;
                let object = self.non_null(&array, "array read")?;
                let borrowed = object.borrow();
                match &*borrowed {
                    Object::Array { values, .. } => values
                        .get(usize::try_from(index).unwrap_or(usize::MAX))
                        .cloned()
                        .ok_or(RuntimeError::IndexOutOfBounds {
                            index,
                            length: values.len(),
                        }),
                    _ => Err(RuntimeError::invalid("indexing a non-array")),
                }
            }
            Expr::ArraySet { array, index, value } => {
                let array = self.eval(array, frame)?;
                let index = self.eval(index, frame)?.as_int()?;
                let value = self.eval(value, frame)?;
                let object = self.non_null(&array, "array write")?;
                let mut borrowed = object.borrow_mut();
                match &mut *borrowed {
                    Object::Array { values, .. } => {
                        let length = values.len();
                        let slot = usize::try_from(index)
                            .ok()
                            .and_then(|i| values.get_mut(i))
                            .ok_or(RuntimeError::IndexOutOfBounds { index, length })?;
                        *slot = value.clone();
                        Ok(value)
                    }
                    _ => Err(RuntimeError::invalid("indexing a non-array")),
                }
            }
            Expr::ArrayLength(array) => {
                let array = self.eval(array, frame)?;
                let object = self.non_null(&array, "array length")?;
                let borrowed = object.borrow();
                match &*borrowed {
                    Object::Array { values, .. } => Ok(Value::Int(values.len() as i32)),
                    _ => Err(RuntimeError::invalid("length of a non-array")),
                }
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, frame)?;
                let right = self.eval(right, frame)?;
                self.binary(*op, left, right)
            }
            Expr::Compare { op, left, right } => {
                let left = self.eval(left, frame)?;
                let right = self.eval(right, frame)?;
                compare(*op, &left, &right).map(Value::Bool)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, frame)?.as_bool()?;
                let result = match op {
                    LogicalOp::And => left && self.eval(right, frame)?.as_bool()?,
                    LogicalOp::Or => left || self.eval(right, frame)?.as_bool()?,
                };
                Ok(Value::Bool(result))
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, frame)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.as_bool()?)),
                    UnaryOp::Neg => Ok(match Num::of(&value)? {
                        Num::I(v) => Value::Int(v.wrapping_neg()),
                        Num::L(v) => Value::Long(v.wrapping_neg()),
                        Num::D(v) => Value::Double(-v),
                    }),
                    UnaryOp::BitNot => match Num::of(&value)? {
                        Num::I(v) => Ok(Value::Int(!v)),
                        Num::L(v) => Ok(Value::Long(!v)),
                        Num::D(_) => Err(RuntimeError::invalid("bitwise complement of a double")),
                    },
                }
            }
            Expr::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                if self.eval(condition, frame)?.as_bool()? {
                    self.eval(then_expr, frame)
                } else {
                    self.eval(else_expr, frame)
                }
            }
            Expr::Cast { expr, ty } => {
                let value = self.eval(expr, frame)?;
                if let Some(kind) = ty.primitive() {
                    return convert(&value, kind);
                }
                if value.is_null() || self.is_instance(&value, ty) {
                    Ok(value)
                } else {
                    Err(RuntimeError::ClassCast(format!(
                        "{} cannot be cast to {}",
                        value.kind_name(),
                        self.unit.type_name(ty)
                    )))
                }
            }
            Expr::InstanceOf { expr, ty } => {
                let value = self.eval(expr, frame)?;
                Ok(Value::Bool(!value.is_null() && self.is_instance(&value, ty)))
            }
            Expr::Box { expr, kind } => {
                let value = self.eval(expr, frame)?;
                Ok(Value::boxed(*kind, convert(&value, *kind)?))
            }
            Expr::Unbox { expr, kind } => {
                let value = self.eval(expr, frame)?;
                convert(&value.unboxed()?, *kind)
            }
            Expr::Convert { expr, to } => {
                let value = self.eval(expr, frame)?;
                convert(&value, *to)
            }
            Expr::NullCheck(inner) => {
                let value = self.eval(inner, frame)?;
                if value.is_null() {
                    return Err(RuntimeError::null("receiver is null"));
                }
                Ok(value)
            }
            Expr::Intrinsic { op, args } => match op {
                Intrinsic::Println => {
                    let args = self.eval_all(args, frame)?;
                    let mut line = String::new();
                    for arg in &args {
                        line.push_str(&self.stringify(arg)?);
                    }
                    trace!("println {:?}", line);
                    self.output.push(line);
                    Ok(Value::Void)
                }
            },
            Expr::Lambda(_) | Expr::MethodRef(_) => Err(RuntimeError::UnloweredClosure),
            Expr::NewClosure { adapter, captures } => {
                let captures = self.eval_all(captures, frame)?;
                let value = self.allocate(*adapter, None);
                if let Value::Ref(object) = &value {
                    for (index, capture) in captures.into_iter().enumerate() {
                        let field = FieldId {
                            class: *adapter,
                            index: index as u32,
                        };
                        self.store_field(object, field, capture);
                    }
                }
                Ok(value)
            }
            Expr::ClosureSingleton { adapter } => {
                if let Some(instance) = self.singletons.get(adapter) {
                    return Ok(instance.clone());
                }
                let instance = self.allocate(*adapter, None);
                self.singletons.insert(*adapter, instance.clone());
                Ok(instance)
            }
        }
    }

    fn field_owner(&mut self, receiver: Option<&Expr>, field: FieldId, frame: &mut Frame) -> Result<ObjectRef> {
        match receiver {
            Some(receiver) => {
                let value = self.eval(receiver, frame)?;
                self.non_null(&value, "field access")
            }
            None => self.enclosing(frame, field.class),
        }
    }

    fn eval_call(&mut self, receiver: &Receiver, method: MethodId, args: &[Expr], frame: &mut Frame) -> Result<Value> {
        let unit = self.unit;
        let declared = unit.method(method).ok_or_else(|| RuntimeError::invalid("dangling method id"))?;
        match receiver {
            Receiver::Static => {
                let args = self.eval_all(args, frame)?;
                self.invoke(method, None, args)
            }
            Receiver::Implicit if declared.is_static => {
                let args = self.eval_all(args, frame)?;
                self.invoke(method, None, args)
            }
            Receiver::Implicit => {
                let object = self.enclosing(frame, method.class)?;
                let args = self.eval_all(args, frame)?;
                self.call_virtual(object, method, args)
            }
            Receiver::Expr(object) => {
                let object = self.eval(object, frame)?;
                let object = self.non_null(&object, &declared.name)?;
                let args = self.eval_all(args, frame)?;
                self.call_virtual(object, method, args)
            }
            Receiver::Super { qualifier } => {
                let object = self.this_instance(frame, *qualifier)?;
                let args = self.eval_all(args, frame)?;
                self.invoke(method, Some(object), args)
            }
            Receiver::NonVirtual(object) => {
                let object = self.eval(object, frame)?;
                let object = self.non_null(&object, &declared.name)?;
                let args = self.eval_all(args, frame)?;
                self.invoke(method, Some(object), args)
            }
        }
    }

    fn is_instance(&self, value: &Value, ty: &Type) -> bool {
        match (value, ty) {
            (Value::Null | Value::Void, _) => false,
            (_, Type::Object | Type::TypeVar(_)) => true,
            (_, Type::Intersection(members)) => members.iter().all(|m| self.is_instance(value, m)),
            (Value::Str(_), Type::String) => true,
            (Value::Ref(object), _) => match (&*object.borrow(), ty) {
                (Object::Instance(instance), Type::Class(class)) => self.unit.is_subclass(instance.class, class.id),
                (Object::Boxed { kind, .. }, Type::Boxed(expected)) => kind == expected,
                (Object::Array { .. }, Type::Array(_)) => true,
                _ => false,
            },
            _ => false,
        }
    }

    /// String form used by `println` and concatenation; objects with a
    /// `toString()` implementation are asked for it.
    fn stringify(&mut self, value: &Value) -> Result<String> {
        if let Value::Ref(object) = value {
            let class = match &*object.borrow() {
                Object::Instance(instance) => Some(instance.class),
                _ => None,
            };
            let custom = class.and_then(|class| {
                self.find_implementation(class, &|_: MethodId, m: &Method| m.name == "toString" && m.params.is_empty())
            });
            if let Some(method) = custom {
                let text = self.invoke(method, Some(object.clone()), Vec::new())?;
                return Ok(text.to_string());
            }
            if let Some(class) = class {
                let serial = match &*object.borrow() {
                    Object::Instance(instance) => instance.serial,
                    _ => 0,
                };
                return Ok(format!("{}@{}", self.unit.class_name(class), serial));
            }
        }
        Ok(value.to_string())
    }

    fn binary(&mut self, op: BinaryOp, left: Value, right: Value) -> Result<Value> {
        if op == BinaryOp::Add && (matches!(left, Value::Str(_)) || matches!(right, Value::Str(_))) {
            let text = format!("{}{}", self.stringify(&left)?, self.stringify(&right)?);
            return Ok(Value::Str(Rc::from(text)));
        }
        if let (Value::Bool(a), Value::Bool(b)) = (&left, &right) {
            return match op {
                BinaryOp::BitAnd => Ok(Value::Bool(a & b)),
                BinaryOp::BitOr => Ok(Value::Bool(a | b)),
                BinaryOp::BitXor => Ok(Value::Bool(a ^ b)),
                _ => Err(RuntimeError::invalid(format!("{:?} on booleans", op))),
            };
        }
        let (a, b) = (Num::of(&left)?, Num::of(&right)?);
        if matches!(op, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr) {
            return shift(op, a, b);
        }
        let result = match Num::promote(a, b) {
            (Num::I(x), Num::I(y)) => Num::I(match op {
                BinaryOp::Add => x.wrapping_add(y),
                BinaryOp::Sub => x.wrapping_sub(y),
                BinaryOp::Mul => x.wrapping_mul(y),
                BinaryOp::Div => nonzero(y == 0).map(|_| x.wrapping_div(y))?,
                BinaryOp::Rem => nonzero(y == 0).map(|_| x.wrapping_rem(y))?,
                BinaryOp::BitAnd => x & y,
                BinaryOp::BitOr => x | y,
                BinaryOp::BitXor => x ^ y,
                BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => return shift(op, Num::I(x), b),
            }),
            (Num::L(x), Num::L(y)) => Num::L(match op {
                BinaryOp::Add => x.wrapping_add(y),
                BinaryOp::Sub => x.wrapping_sub(y),
                BinaryOp::Mul => x.wrapping_mul(y),
                BinaryOp::Div => nonzero(y == 0).map(|_| x.wrapping_div(y))?,
                BinaryOp::Rem => nonzero(y == 0).map(|_| x.wrapping_rem(y))?,
                BinaryOp::BitAnd => x & y,
                BinaryOp::BitOr => x | y,
                BinaryOp::BitXor => x ^ y,
                BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => return shift(op, Num::L(x), b),
            }),
            (x, y) => {
                let (x, y) = (x.as_f64(), y.as_f64());
                Num::D(match op {
                    BinaryOp::Add => x + y,
                    BinaryOp::Sub => x - y,
                    BinaryOp::Mul => x * y,
                    BinaryOp::Div => x / y,
                    BinaryOp::Rem => x % y,
                    _ => return Err(RuntimeError::invalid(format!("{:?} on doubles", op))),
                })
            }
        };
        Ok(result.into_value())
    }
}

/// Integer division faults on a zero divisor; `MIN / -1` wraps.
fn nonzero(by_zero: bool) -> Result<()> {
    if by_zero {
        return Err(RuntimeError::Arithmetic("/ by zero".to_string()));
    }
    Ok(())
}

fn shift(op: BinaryOp, value: Num, by: Num) -> Result<Value> {
    let by = by.as_i64();
    match value {
        Num::I(v) => {
            let s = (by & 31) as u32;
            Ok(Value::Int(match op {
                BinaryOp::Shl => v.wrapping_shl(s),
                BinaryOp::Shr => v.wrapping_shr(s),
                _ => ((v as u32) >> s) as i32,
            }))
        }
        Num::L(v) => {
            let s = (by & 63) as u32;
            Ok(Value::Long(match op {
                BinaryOp::Shl => v.wrapping_shl(s),
                BinaryOp::Shr => v.wrapping_shr(s),
                _ => ((v as u64) >> s) as i64,
            }))
        }
        Num::D(_) => Err(RuntimeError::invalid("shift of a double")),
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool> {
    let references = |v: &Value| matches!(v, Value::Ref(_) | Value::Null | Value::Str(_));
    if matches!(op, CompareOp::Eq | CompareOp::Ne) {
        let equal = if (references(left) && references(right)) || matches!((left, right), (Value::Bool(_), Value::Bool(_))) {
            left.same(right)
        } else {
            Num::of(left)?.compare(Num::of(right)?) == Some(Ordering::Equal)
        };
        return Ok(equal == (op == CompareOp::Eq));
    }
    let ordering = Num::of(left)?.compare(Num::of(right)?);
    Ok(match (op, ordering) {
        (_, None) => false,
        (CompareOp::Lt, Some(o)) => o == Ordering::Less,
        (CompareOp::Le, Some(o)) => o != Ordering::Greater,
        (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
        (CompareOp::Ge, Some(o)) => o != Ordering::Less,
        (CompareOp::Eq | CompareOp::Ne, Some(_)) => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_hir::build::{
        add, binary, call, call_static, call_super, compare as cmp, expr_stmt, field, int, lambda, let_, local,
        new_object, null, println, ret, set_field, string, MethodDef, UnitBuilder,
    };
    use kestrel_hir::CatchClause;
    use kestrel_types::ClassType;

    fn lines(interp: &Interpreter<'_>) -> Vec<String> {
        interp.output().to_vec()
    }

    #[test]
    fn test_arithmetic_and_concatenation() {
        let mut b = UnitBuilder::new("Eval");
        let main = b.class("Main");
        let x = b.local("x", Type::int());
        b.method(
            main,
            MethodDef::new("main").static_().body(vec![
                let_(&x, int(7)),
                expr_stmt(println(add(string("x="), binary(BinaryOp::Mul, local(&x), int(6))))),
                expr_stmt(println(binary(BinaryOp::Div, int(-7), int(2)))),
                expr_stmt(println(binary(BinaryOp::UShr, int(-1), int(28)))),
            ]),
        );
        let unit = b.finish();

        let mut interp = Interpreter::new(&unit).unwrap();
        interp.run("Main", "main", vec![]).unwrap();
        assert_eq!(lines(&interp), vec!["x=42", "-3", "15"]);
    }

    #[test]
    fn test_virtual_dispatch_and_super_calls() {
        let mut b = UnitBuilder::new("Eval");
        let main = b.class("Main");
        let a = b.class("A");
        let name = b.method(a, MethodDef::new("name").returns(Type::String).body(vec![ret(string("A"))]));
        let sub = b.class("B");
        b.extends(sub, ClassType::raw(a));
        b.method(
            sub,
            MethodDef::new("name")
                .returns(Type::String)
                .body(vec![ret(add(string("B"), call_super(None, name, vec![])))]),
        );
        b.method(
            main,
            MethodDef::new("main").static_().body(vec![
                expr_stmt(println(call(new_object(sub, None, vec![]), name, vec![]))),
                expr_stmt(println(call(new_object(a, None, vec![]), name, vec![]))),
            ]),
        );
        let unit = b.finish();

        let mut interp = Interpreter::new(&unit).unwrap();
        interp.run("Main", "main", vec![]).unwrap();
        assert_eq!(lines(&interp), vec!["BA", "A"]);
    }

    #[test]
    fn test_inner_instances_reach_their_outer_object() {
        let mut b = UnitBuilder::new("Eval");
        let main = b.class("Main");
        let outer = b.class("Outer");
        let v = b.field(outer, "v", Type::int());
        let inner = b.member_class(outer, "Inner", false);
        let get = b.method(inner, MethodDef::new("get").returns(Type::int()).body(vec![ret(field(v))]));
        let make = b.method(
            outer,
            MethodDef::new("make")
                .returns(Type::class(inner))
                .body(vec![ret(new_object(inner, None, vec![]))]),
        );
        let o = b.local("o", Type::class(outer));
        let explicit = Expr::New {
            class: ClassType::raw(inner),
            ctor: None,
            outer: Some(Box::new(local(&o))),
            args: vec![],
        };
        b.method(
            main,
            MethodDef::new("main").static_().body(vec![
                let_(&o, new_object(outer, None, vec![])),
                expr_stmt(set_field(Some(local(&o)), v, int(5))),
                expr_stmt(println(call(explicit, get, vec![]))),
                expr_stmt(println(call(call(local(&o), make, vec![]), get, vec![]))),
            ]),
        );
        let unit = b.finish();

        let mut interp = Interpreter::new(&unit).unwrap();
        interp.run("Main", "main", vec![]).unwrap();
        assert_eq!(lines(&interp), vec!["5", "5"]);
    }

    #[test]
    fn test_thrown_values_are_caught_and_faults_are_not() {
        let mut b = UnitBuilder::new("Eval");
        let main = b.class("Main");
        let oops = b.class("Oops");
        let e = b.local("e", Type::class(oops));
        let anything = b.local("any", Type::Object);
        b.method(
            main,
            MethodDef::new("main").static_().body(vec![Stmt::Try {
                body: vec![
                    Stmt::Throw(new_object(oops, None, vec![])),
                    expr_stmt(println(string("unreachable"))),
                ],
                catch: Some(CatchClause {
                    param: e,
                    body: vec![expr_stmt(println(string("caught")))],
                }),
                finally: Some(vec![expr_stmt(println(string("finally")))]),
            }]),
        );
        b.method(
            main,
            MethodDef::new("npe").static_().body(vec![Stmt::Try {
                body: vec![expr_stmt(Expr::NullCheck(Box::new(null())))],
                catch: Some(CatchClause {
                    param: anything,
                    body: vec![],
                }),
                finally: None,
            }]),
        );
        b.method(
            main,
            MethodDef::new("div")
                .static_()
                .body(vec![expr_stmt(println(binary(BinaryOp::Div, int(1), int(0))))]),
        );
        let unit = b.finish();

        let mut interp = Interpreter::new(&unit).unwrap();
        interp.run("Main", "main", vec![]).unwrap();
        assert_eq!(lines(&interp), vec!["caught", "finally"]);
        assert!(matches!(interp.run("Main", "npe", vec![]), Err(RuntimeError::NullPointer(_))));
        assert!(matches!(interp.run("Main", "div", vec![]), Err(RuntimeError::Arithmetic(_))));
    }

    #[test]
    fn test_static_initialization_runs_in_order() {
        let mut b = UnitBuilder::new("Eval");
        let main = b.class("Main");
        let count = b.static_field(main, "count", Type::int(), Some(int(3)));
        b.initializer(
            main,
            true,
            vec![expr_stmt(set_field(None, count, add(field(count), int(1))))],
        );
        let unit = b.finish();

        let interp = Interpreter::new(&unit).unwrap();
        assert!(interp.static_field("Main", "count").unwrap().same(&Value::Int(4)));
    }

    #[test]
    fn test_singleton_sites_share_one_instance() {
        let mut b = UnitBuilder::new("Eval");
        let main = b.class("Main");
        let adapter = b.class("Main_$Lambda$1");
        let shared = || Expr::ClosureSingleton { adapter };
        let fresh = || Expr::NewClosure {
            adapter,
            captures: vec![],
        };
        let same = b.method(
            main,
            MethodDef::new("same")
                .static_()
                .returns(Type::boolean())
                .body(vec![ret(cmp(CompareOp::Eq, shared(), shared()))]),
        );
        let distinct = b.method(
            main,
            MethodDef::new("distinct")
                .static_()
                .returns(Type::boolean())
                .body(vec![ret(cmp(CompareOp::Eq, fresh(), fresh()))]),
        );
        b.method(
            main,
            MethodDef::new("unlowered")
                .static_()
                .body(vec![expr_stmt(lambda(vec![], int(1), Type::int(), Type::Object))]),
        );
        b.method(
            main,
            MethodDef::new("main").static_().body(vec![
                expr_stmt(println(call_static(same, vec![]))),
                expr_stmt(println(call_static(distinct, vec![]))),
            ]),
        );
        let unit = b.finish();

        let mut interp = Interpreter::new(&unit).unwrap();
        interp.run("Main", "main", vec![]).unwrap();
        assert_eq!(lines(&interp), vec!["true", "false"]);
        assert!(matches!(
            interp.run("Main", "unlowered", vec![]),
            Err(RuntimeError::UnloweredClosure)
        ));
    }
}
