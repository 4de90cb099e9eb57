/*!
 Class types, builtin types, and the compilation unit that registers them.
*/

use std::{
    cell::{Ref, RefCell},
    collections::HashMap,
    fmt::{Display, Formatter},
    rc::{Rc, Weak},
};

use crate::{error::runtime::RuntimeError, pickle::models::Value, runtime::object::Object};

/// A restore-state procedure registered against a qualified method name
///
/// The procedure receives a fresh instance and the raw payload the parser
/// produced for it; whatever state the instance ends up with is the
/// reconstruction result.
pub type SetStateFn = dyn Fn(&mut Object, Value) -> Result<(), RuntimeError>;

/// Identifies a concrete type: a builtin parsed from a type expression, or a
/// program-defined class
///
/// Class handles compare by reference identity; two handles for the same
/// qualified name within one [`CompilationUnit`] are always the same `Rc`.
#[derive(Debug, Clone)]
pub enum TypeHandle {
    Builtin(BuiltinType),
    Class(Rc<ClassType>),
}

impl PartialEq for TypeHandle {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeHandle::Builtin(first), TypeHandle::Builtin(second)) => first == second,
            (TypeHandle::Class(first), TypeHandle::Class(second)) => Rc::ptr_eq(first, second),
            _ => false,
        }
    }
}

impl Display for TypeHandle {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeHandle::Builtin(builtin) => write!(fmt, "{builtin}"),
            TypeHandle::Class(class) => write!(fmt, "{}", class.name()),
        }
    }
}

/// Builtin types denoted by textual type expressions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltinType {
    Int,
    Float,
    Bool,
    Str,
    NoneType,
    Tensor,
    /// Matches any type; used where element types are not tracked
    Any,
    List(Box<BuiltinType>),
    Dict(Box<BuiltinType>, Box<BuiltinType>),
    Optional(Box<BuiltinType>),
    Tuple(Vec<BuiltinType>),
}

impl Display for BuiltinType {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BuiltinType::Int => write!(fmt, "int"),
            BuiltinType::Float => write!(fmt, "float"),
            BuiltinType::Bool => write!(fmt, "bool"),
            BuiltinType::Str => write!(fmt, "str"),
            BuiltinType::NoneType => write!(fmt, "NoneType"),
            BuiltinType::Tensor => write!(fmt, "Tensor"),
            BuiltinType::Any => write!(fmt, "Any"),
            BuiltinType::List(item) => write!(fmt, "List[{item}]"),
            BuiltinType::Dict(key, value) => write!(fmt, "Dict[{key}, {value}]"),
            BuiltinType::Optional(item) => write!(fmt, "Optional[{item}]"),
            BuiltinType::Tuple(items) => {
                write!(fmt, "Tuple[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(fmt, ", ")?;
                    }
                    write!(fmt, "{item}")?;
                }
                write!(fmt, "]")
            }
        }
    }
}

/// An attribute declared on a class, in slot order
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub ty: TypeHandle,
}

/// A program-defined class type
///
/// Classes start with no attributes; the attribute table is populated lazily
/// as objects of the class are reconstructed, and is append-only. The slot
/// index of each attribute is its position in the table.
pub struct ClassType {
    name: String,
    compilation_unit: Weak<CompilationUnit>,
    is_module: bool,
    attributes: RefCell<Vec<Attribute>>,
}

impl ClassType {
    pub(crate) fn new(
        name: String,
        compilation_unit: Weak<CompilationUnit>,
        is_module: bool,
    ) -> Self {
        Self {
            name,
            compilation_unit,
            is_module,
            attributes: RefCell::new(vec![]),
        }
    }

    /// The fully qualified name of this class
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The final segment of the qualified name
    pub fn unqualified_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Whether this class was forward-declared as a module class
    pub fn is_module(&self) -> bool {
        self.is_module
    }

    pub fn compilation_unit(&self) -> Option<Rc<CompilationUnit>> {
        self.compilation_unit.upgrade()
    }

    /// The declared attributes, in slot order
    pub fn attributes(&self) -> Ref<'_, Vec<Attribute>> {
        self.attributes.borrow()
    }

    /// Declare an attribute if it is new, or verify the declaration if it is
    /// not; returns the attribute's slot index
    pub fn add_or_check_attribute(
        &self,
        name: &str,
        ty: TypeHandle,
    ) -> Result<usize, RuntimeError> {
        let mut attributes = self.attributes.borrow_mut();
        if let Some((index, existing)) = attributes
            .iter()
            .enumerate()
            .find(|(_, attribute)| attribute.name == name)
        {
            if existing.ty == ty {
                return Ok(index);
            }
            return Err(RuntimeError::AttributeConflict(
                self.name.clone(),
                name.to_string(),
            ));
        }
        attributes.push(Attribute {
            name: name.to_string(),
            ty,
        });
        Ok(attributes.len() - 1)
    }
}

impl std::fmt::Debug for ClassType {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("ClassType")
            .field("name", &self.name)
            .field("is_module", &self.is_module)
            .finish()
    }
}

/// Owns the classes and reconstruction methods of one load session
///
/// Objects reconstructed during the session hold a weak back-reference to
/// their unit for method dispatch; the unit must outlive them, which the
/// load entry points guarantee by scoping the unit to the whole load call.
pub struct CompilationUnit {
    classes: RefCell<HashMap<String, Rc<ClassType>>>,
    methods: RefCell<HashMap<String, Rc<SetStateFn>>>,
}

impl CompilationUnit {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            classes: RefCell::new(HashMap::new()),
            methods: RefCell::new(HashMap::new()),
        })
    }

    /// Look up a previously registered class
    pub fn get_class(&self, name: &str) -> Option<Rc<ClassType>> {
        self.classes.borrow().get(name).map(Rc::clone)
    }

    /// Fetch the class registered under `name`, creating and registering a
    /// fresh forward-declared class if it has not been seen yet
    ///
    /// Repeated calls with the same name return the same handle.
    pub fn get_or_create_class(self: &Rc<Self>, name: &str) -> Rc<ClassType> {
        if let Some(existing) = self.classes.borrow().get(name) {
            return Rc::clone(existing);
        }
        let class = Rc::new(ClassType::new(
            name.to_string(),
            Rc::downgrade(self),
            true,
        ));
        self.classes
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&class));
        class
    }

    /// Register a restore-state procedure under a qualified method name,
    /// i.e. `__torch__.LinearModel.__setstate__`
    pub fn register_method<F>(&self, name: &str, method: F)
    where
        F: Fn(&mut Object, Value) -> Result<(), RuntimeError> + 'static,
    {
        self.methods
            .borrow_mut()
            .insert(name.to_string(), Rc::new(method));
    }

    /// Look up a previously registered restore-state procedure
    pub fn find_method(&self, name: &str) -> Option<Rc<SetStateFn>> {
        self.methods.borrow().get(name).map(Rc::clone)
    }
}

impl std::fmt::Debug for CompilationUnit {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("CompilationUnit")
            .field("classes", &self.classes.borrow().len())
            .field("methods", &self.methods.borrow().len())
            .finish()
    }
}

/// A natively-implemented opaque class known outside any compilation unit
#[derive(Clone)]
pub struct CustomClass {
    class: Rc<ClassType>,
    set_state: Rc<SetStateFn>,
}

impl CustomClass {
    pub fn class(&self) -> &Rc<ClassType> {
        &self.class
    }

    pub(crate) fn set_state(&self) -> &Rc<SetStateFn> {
        &self.set_state
    }
}

/// The registry of natively-implemented classes, distinct from any
/// compilation unit's namespace
#[derive(Default)]
pub struct CustomClassRegistry {
    classes: HashMap<String, CustomClass>,
}

impl CustomClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native class and its restore-state procedure under a
    /// qualified name
    pub fn register<F>(&mut self, name: &str, set_state: F)
    where
        F: Fn(&mut Object, Value) -> Result<(), RuntimeError> + 'static,
    {
        let class = Rc::new(ClassType::new(name.to_string(), Weak::new(), false));
        self.classes.insert(
            name.to_string(),
            CustomClass {
                class,
                set_state: Rc::new(set_state),
            },
        );
    }

    pub fn find(&self, name: &str) -> Option<&CustomClass> {
        self.classes.get(name)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::{
        error::runtime::RuntimeError,
        runtime::types::{BuiltinType, CompilationUnit, TypeHandle},
    };

    #[test]
    fn repeated_class_creation_returns_same_handle() {
        let unit = CompilationUnit::new();

        let first = unit.get_or_create_class("__torch__.LinearModel");
        let second = unit.get_or_create_class("__torch__.LinearModel");

        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn created_class_is_module_with_no_attributes() {
        let unit = CompilationUnit::new();

        let class = unit.get_or_create_class("__torch__.LinearModel");

        assert!(class.is_module());
        assert!(class.attributes().is_empty());
        assert_eq!(class.unqualified_name(), "LinearModel");
    }

    #[test]
    fn attribute_declaration_is_append_only() {
        let unit = CompilationUnit::new();
        let class = unit.get_or_create_class("__torch__.LinearModel");

        let first = class
            .add_or_check_attribute("weight", TypeHandle::Builtin(BuiltinType::Tensor))
            .unwrap();
        let second = class
            .add_or_check_attribute("bias", TypeHandle::Builtin(BuiltinType::Tensor))
            .unwrap();
        let repeat = class
            .add_or_check_attribute("weight", TypeHandle::Builtin(BuiltinType::Tensor))
            .unwrap();

        assert_eq!(first, 0);
        assert_eq!(second, 1);
        assert_eq!(repeat, 0);
        assert_eq!(class.attributes().len(), 2);
    }

    #[test]
    fn incompatible_redeclaration_fails() {
        let unit = CompilationUnit::new();
        let class = unit.get_or_create_class("__torch__.LinearModel");

        class
            .add_or_check_attribute("weight", TypeHandle::Builtin(BuiltinType::Tensor))
            .unwrap();
        let result = class.add_or_check_attribute("weight", TypeHandle::Builtin(BuiltinType::Int));

        assert!(matches!(
            result,
            Err(RuntimeError::AttributeConflict(_, _))
        ));
    }

    #[test]
    fn class_handles_from_different_units_are_distinct() {
        let first_unit = CompilationUnit::new();
        let second_unit = CompilationUnit::new();

        let first = TypeHandle::Class(first_unit.get_or_create_class("__torch__.LinearModel"));
        let second = TypeHandle::Class(second_unit.get_or_create_class("__torch__.LinearModel"));

        assert_ne!(first, second);
    }
}
