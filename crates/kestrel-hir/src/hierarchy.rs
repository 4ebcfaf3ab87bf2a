//! Queries over the type arena: lookups, nesting, subtyping and member search.

use crate::ir::{CompilationUnit, Field, Method, TypeDecl, TypeKind};
use kestrel_types::{ClassId, ClassType, FieldId, MethodId, Type, TypeParam};
use std::collections::HashSet;

impl CompilationUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_path: None,
            types: Vec::new(),
        }
    }

    pub fn decl(&self, id: ClassId) -> Option<&TypeDecl> {
        self.types.get(id.index())
    }

    pub fn decl_mut(&mut self, id: ClassId) -> Option<&mut TypeDecl> {
        self.types.get_mut(id.index())
    }

    pub fn method(&self, id: MethodId) -> Option<&Method> {
        self.decl(id.class)?.methods.get(id.index as usize)
    }

    pub fn field(&self, id: FieldId) -> Option<&Field> {
        self.decl(id.class)?.fields.get(id.index as usize)
    }

    /// Find a type by simple name (first match in arena order).
    pub fn find_type(&self, name: &str) -> Option<ClassId> {
        self.types.iter().find(|d| d.name == name).map(|d| d.id)
    }

    /// Find a method by name on one declaration (no supertype search).
    pub fn find_declared_method(&self, class: ClassId, name: &str) -> Option<MethodId> {
        let decl = self.decl(class)?;
        decl.methods
            .iter()
            .position(|m| m.name == name)
            .map(|index| MethodId { class, index: index as u32 })
    }

    /// Largest local id used anywhere in the unit.
    pub fn max_local_id(&self) -> Option<u32> {
        let mut max = None;
        let mut note = |id: u32| max = Some(max.map_or(id, |m: u32| m.max(id)));
        for decl in &self.types {
            for method in &decl.methods {
                method.params.iter().for_each(|p| note(p.id));
                if let Some(body) = &method.body {
                    crate::visit::declared_locals(body, &mut note);
                }
            }
            for field in &decl.fields {
                if let Some(init) = &field.init {
                    crate::visit::declared_locals_in_expr(init, &mut note);
                }
            }
            for init in &decl.initializers {
                crate::visit::declared_locals(&init.body, &mut note);
            }
        }
        max
    }

    /// Top-level type containing `id`.
    pub fn top_level(&self, id: ClassId) -> ClassId {
        let mut current = id;
        while let Some(outer) = self.decl(current).and_then(|d| d.outer) {
            current = outer;
        }
        current
    }

    /// Closest enclosing (or same) type that is a top-level or member type.
    pub fn nearest_named(&self, id: ClassId) -> ClassId {
        let mut current = id;
        while let Some(decl) = self.decl(current) {
            if decl.kind.is_named() {
                return current;
            }
            match decl.outer {
                Some(outer) => current = outer,
                None => break,
            }
        }
        current
    }

    /// Names of the nesting chain joined with `_`, e.g. `Outer_Inner_1`.
    /// Adapter names are already fully qualified.
    pub fn qualified_path(&self, id: ClassId) -> String {
        let Some(decl) = self.decl(id) else {
            return format!("#{}", id.0);
        };
        match (decl.kind, decl.outer) {
            (TypeKind::TopLevel | TypeKind::Adapter, _) | (_, None) => decl.name.clone(),
            (_, Some(outer)) => format!("{}_{}", self.qualified_path(outer), decl.name),
        }
    }

    /// Enclosing-instance chain visible from code in `class`: depth 0 is
    /// `class` itself, depth d+1 is the outer type of depth d, continuing
    /// while the current type carries an enclosing instance. Empty in a
    /// static context.
    pub fn enclosing_instance_chain(&self, class: ClassId, static_context: bool) -> Vec<ClassId> {
        if static_context {
            return Vec::new();
        }
        let mut chain = vec![class];
        let mut current = class;
        while let Some(decl) = self.decl(current) {
            match decl.outer {
                Some(outer) if !decl.is_static && decl.kind != TypeKind::TopLevel => {
                    chain.push(outer);
                    current = outer;
                }
                _ => break,
            }
        }
        chain
    }

    /// Reflexive, transitive subtype test over superclasses and interfaces.
    pub fn is_subclass(&self, sub: ClassId, sup: ClassId) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![sub];
        while let Some(id) = stack.pop() {
            if id == sup {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(decl) = self.decl(id) {
                stack.extend(decl.superclass.iter().map(|s| s.id));
                stack.extend(decl.interfaces.iter().map(|i| i.id));
            }
        }
        false
    }

    /// Direct supertypes of `ty` with its type arguments substituted.
    pub fn direct_supertypes(&self, ty: &ClassType) -> Vec<ClassType> {
        let Some(decl) = self.decl(ty.id) else {
            return Vec::new();
        };
        let bindings = type_bindings(&decl.type_params, &ty.args);
        decl.superclass
            .iter()
            .chain(decl.interfaces.iter())
            .map(|sup| ClassType {
                id: sup.id,
                args: sup.args.iter().map(|a| a.substitute(&bindings)).collect(),
            })
            .collect()
    }

    /// View `ty` as an instantiation of `ancestor`, e.g. `BinaryOperator<Integer>`
    /// as `BiFunction<Integer, Integer, Integer>`.
    pub fn as_super(&self, ty: &ClassType, ancestor: ClassId) -> Option<ClassType> {
        if ty.id == ancestor {
            return Some(ty.clone());
        }
        self.direct_supertypes(ty)
            .iter()
            .find_map(|sup| self.as_super(sup, ancestor))
    }

    /// Type parameters in scope for a method: the declaring type's, then its own.
    pub fn method_type_params(&self, id: MethodId) -> Vec<TypeParam> {
        let mut params = self
            .decl(id.class)
            .map(|d| d.type_params.clone())
            .unwrap_or_default();
        if let Some(method) = self.method(id) {
            params.extend(method.type_params.iter().cloned());
        }
        params
    }

    /// Erased parameter types of a method as declared.
    pub fn erased_params(&self, id: MethodId) -> Vec<Type> {
        let scope = self.method_type_params(id);
        self.method(id)
            .map(|m| m.params.iter().map(|p| p.ty.erasure(&scope)).collect())
            .unwrap_or_default()
    }

    /// Strict assignability: identity, primitive widening, reference widening.
    pub fn is_assignable(&self, from: &Type, to: &Type) -> bool {
        match (from, to) {
            (a, b) if a == b => true,
            (Type::Primitive(a), Type::Primitive(b)) => a.widens_to(*b),
            (Type::Primitive(_), _) | (_, Type::Primitive(_)) => false,
            (Type::Void, _) | (_, Type::Void) => false,
            (_, Type::Intersection(members)) => members.iter().all(|m| self.is_assignable(from, m)),
            (Type::Intersection(members), _) => members.iter().any(|m| self.is_assignable(m, to)),
            (_, Type::Object) | (_, Type::TypeVar(_)) | (Type::Null, _) => true,
            (Type::TypeVar(_), _) => false,
            (Type::Class(a), Type::Class(b)) => self.is_subclass(a.id, b.id),
            (Type::Array(a), Type::Array(b)) => {
                if a.is_primitive() || b.is_primitive() {
                    a == b
                } else {
                    self.is_assignable(a, b)
                }
            }
            _ => false,
        }
    }

    /// Assignability allowing boxing and unboxing conversions.
    pub fn is_loosely_assignable(&self, from: &Type, to: &Type) -> bool {
        if self.is_assignable(from, to) {
            return true;
        }
        match (from, to) {
            (Type::Primitive(kind), _) => self.is_assignable(&Type::Boxed(*kind), to),
            (Type::Boxed(kind), Type::Primitive(target)) => kind.widens_to(*target),
            _ => false,
        }
    }

    /// Every method named `name` visible on `class`: declared ones first,
    /// then inherited ones not overridden by an already-collected method.
    pub fn find_methods(&self, class: ClassId, name: &str) -> Vec<MethodId> {
        let mut found: Vec<MethodId> = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = std::collections::VecDeque::from([class]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            let Some(decl) = self.decl(id) else {
                continue;
            };
            for (index, method) in decl.methods.iter().enumerate() {
                if method.name != name || method.kind != crate::MethodKind::Method {
                    continue;
                }
                let candidate = MethodId { class: id, index: index as u32 };
                let erased = self.erased_params(candidate);
                let overridden = found.iter().any(|f| self.erased_params(*f) == erased);
                if !overridden {
                    found.push(candidate);
                }
            }
            queue.extend(decl.superclass.iter().map(|s| s.id));
            queue.extend(decl.interfaces.iter().map(|i| i.id));
        }
        found
    }

    /// Human-readable type name for messages.
    pub fn type_name(&self, ty: &Type) -> String {
        match ty {
            Type::Class(class) => {
                let base = self.class_name(class.id);
                if class.args.is_empty() {
                    base
                } else {
                    let args: Vec<_> = class.args.iter().map(|a| self.type_name(a)).collect();
                    format!("{}<{}>", base, args.join(", "))
                }
            }
            Type::Array(element) => format!("{}[]", self.type_name(element)),
            Type::Intersection(members) => {
                let names: Vec<_> = members.iter().map(|m| self.type_name(m)).collect();
                names.join(" & ")
            }
            other => other.to_string(),
        }
    }

    pub fn class_name(&self, id: ClassId) -> String {
        self.decl(id)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| format!("#{}", id.0))
    }
}

/// Pair type parameters with arguments. Raw uses (no arguments) bind nothing.
pub fn type_bindings(params: &[TypeParam], args: &[Type]) -> Vec<(String, Type)> {
    if params.len() != args.len() {
        return Vec::new();
    }
    params
        .iter()
        .zip(args)
        .map(|(p, a)| (p.name.clone(), a.clone()))
        .collect()
}
