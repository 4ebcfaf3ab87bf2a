//! Type system for kestrel
//!
//! Defines the type representations shared by the resolved tree, the
//! closure-conversion pass and the reference evaluator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for local variables and parameters
pub type LocalId = u32;

/// Unique identifier for a type declaration (index into the unit's type arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub u32);

impl ClassId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A method or constructor, addressed by its declaring type and position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodId {
    pub class: ClassId,
    pub index: u32,
}

/// A field, addressed by its declaring type and position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId {
    pub class: ClassId,
    pub index: u32,
}

/// Primitive value kinds of the source language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveKind {
    /// Source-level keyword (e.g. "int")
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
        }
    }

    /// Name of the wrapper class (e.g. "Integer")
    pub fn boxed_name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Byte => "Byte",
            PrimitiveKind::Char => "Character",
            PrimitiveKind::Short => "Short",
            PrimitiveKind::Int => "Integer",
            PrimitiveKind::Long => "Long",
            PrimitiveKind::Float => "Float",
            PrimitiveKind::Double => "Double",
        }
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, PrimitiveKind::Boolean)
    }

    /// Identity or widening primitive conversion from `self` to `to`.
    pub fn widens_to(self, to: PrimitiveKind) -> bool {
        use PrimitiveKind::*;
        if self == to {
            return true;
        }
        match self {
            Byte => matches!(to, Short | Int | Long | Float | Double),
            Short | Char => matches!(to, Int | Long | Float | Double),
            Int => matches!(to, Long | Float | Double),
            Long => matches!(to, Float | Double),
            Float => matches!(to, Double),
            Boolean | Double => false,
        }
    }
}

/// Type parameter definition (used in generic types and methods)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeParam {
    /// Name of the type parameter (e.g., "T")
    pub name: String,
    /// Upper bound (e.g., T extends Number)
    pub bound: Option<Type>,
}

impl TypeParam {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bound: None,
        }
    }
}

/// A reference to a declared class or interface with its type arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassType {
    pub id: ClassId,
    pub args: Vec<Type>,
}

impl ClassType {
    pub fn raw(id: ClassId) -> Self {
        Self { id, args: Vec::new() }
    }

    pub fn new(id: ClassId, args: Vec<Type>) -> Self {
        Self { id, args }
    }
}

/// Core type representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    /// No value (method results only)
    Void,
    /// Type of the `null` literal
    Null,
    /// Primitive value
    Primitive(PrimitiveKind),
    /// Wrapper class of a primitive (Integer, Long, ...)
    Boxed(PrimitiveKind),
    /// The root reference type
    Object,
    /// The built-in string type
    String,
    /// A class or interface declared in the compilation unit
    Class(ClassType),
    /// Array with element type
    Array(Box<Type>),
    /// Type parameter reference (e.g., T)
    TypeVar(String),
    /// Intersection type (e.g., Runnable & Serializable), only as a target type
    Intersection(Vec<Type>),
}

impl Type {
    pub fn int() -> Type {
        Type::Primitive(PrimitiveKind::Int)
    }

    pub fn boolean() -> Type {
        Type::Primitive(PrimitiveKind::Boolean)
    }

    pub fn class(id: ClassId) -> Type {
        Type::Class(ClassType::raw(id))
    }

    pub fn generic(id: ClassId, args: Vec<Type>) -> Type {
        Type::Class(ClassType::new(id, args))
    }

    pub fn array(element: Type) -> Type {
        Type::Array(Box::new(element))
    }

    pub fn type_var(name: impl Into<String>) -> Type {
        Type::TypeVar(name.into())
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// Check if this type is a primitive value type
    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Primitive(_))
    }

    /// Check if values of this type are references (nullable)
    pub fn is_reference(&self) -> bool {
        !matches!(self, Type::Void | Type::Primitive(_))
    }

    pub fn primitive(&self) -> Option<PrimitiveKind> {
        match self {
            Type::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Array(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassType> {
        match self {
            Type::Class(class) => Some(class),
            _ => None,
        }
    }

    /// Replace type variables bound in `bindings`.
    pub fn substitute(&self, bindings: &[(String, Type)]) -> Type {
        if bindings.is_empty() {
            return self.clone();
        }
        match self {
            Type::TypeVar(name) => bindings
                .iter()
                .find(|(param, _)| param == name)
                .map(|(_, ty)| ty.clone())
                .unwrap_or_else(|| self.clone()),
            Type::Class(class) => Type::Class(ClassType {
                id: class.id,
                args: class.args.iter().map(|a| a.substitute(bindings)).collect(),
            }),
            Type::Array(element) => Type::Array(Box::new(element.substitute(bindings))),
            Type::Intersection(members) => {
                Type::Intersection(members.iter().map(|m| m.substitute(bindings)).collect())
            }
            _ => self.clone(),
        }
    }

    /// Erase generic information. Type variables erase to the erasure of
    /// their bound in `params`, or to `Object` when unbounded or unknown.
    pub fn erasure(&self, params: &[TypeParam]) -> Type {
        match self {
            Type::TypeVar(name) => params
                .iter()
                .find(|p| &p.name == name)
                .and_then(|p| p.bound.as_ref())
                .filter(|bound| !matches!(bound, Type::TypeVar(b) if b == name))
                .map(|bound| bound.erasure(params))
                .unwrap_or(Type::Object),
            Type::Class(class) => Type::Class(ClassType::raw(class.id)),
            Type::Array(element) => Type::Array(Box::new(element.erasure(params))),
            Type::Intersection(members) => members
                .first()
                .map(|m| m.erasure(params))
                .unwrap_or(Type::Object),
            _ => self.clone(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Null => write!(f, "null"),
            Type::Primitive(kind) => write!(f, "{}", kind.name()),
            Type::Boxed(kind) => write!(f, "{}", kind.boxed_name()),
            Type::Object => write!(f, "Object"),
            Type::String => write!(f, "String"),
            Type::Class(class) => {
                write!(f, "#{}", class.id.0)?;
                if !class.args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in class.args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            Type::Array(element) => write!(f, "{}[]", element),
            Type::TypeVar(name) => write!(f, "{}", name),
            Type::Intersection(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, " & ")?;
                    }
                    write!(f, "{}", member)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widening_follows_primitive_lattice() {
        assert!(PrimitiveKind::Byte.widens_to(PrimitiveKind::Int));
        assert!(PrimitiveKind::Char.widens_to(PrimitiveKind::Long));
        assert!(PrimitiveKind::Int.widens_to(PrimitiveKind::Double));
        assert!(!PrimitiveKind::Int.widens_to(PrimitiveKind::Short));
        assert!(!PrimitiveKind::Char.widens_to(PrimitiveKind::Short));
        assert!(!PrimitiveKind::Boolean.widens_to(PrimitiveKind::Int));
    }

    #[test]
    fn test_substitute_nested_arguments() {
        let list = ClassId(4);
        let ty = Type::generic(list, vec![Type::array(Type::type_var("T"))]);
        let bound = ty.substitute(&[("T".to_string(), Type::String)]);
        assert_eq!(bound, Type::generic(list, vec![Type::array(Type::String)]));
    }

    #[test]
    fn test_erasure_uses_declared_bound() {
        let params = vec![
            TypeParam::new("T"),
            TypeParam {
                name: "N".to_string(),
                bound: Some(Type::Boxed(PrimitiveKind::Int)),
            },
        ];
        assert_eq!(Type::type_var("T").erasure(&params), Type::Object);
        assert_eq!(
            Type::type_var("N").erasure(&params),
            Type::Boxed(PrimitiveKind::Int)
        );
        assert_eq!(
            Type::generic(ClassId(2), vec![Type::String]).erasure(&params),
            Type::class(ClassId(2))
        );
    }

    #[test]
    fn test_display_renders_arrays_and_intersections() {
        let ty = Type::Intersection(vec![Type::class(ClassId(1)), Type::class(ClassId(3))]);
        assert_eq!(ty.to_string(), "#1 & #3");
        assert_eq!(Type::array(Type::int()).to_string(), "int[]");
    }
}
