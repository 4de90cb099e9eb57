/*!
 Data structures used to hold the deserialized value graph.
*/

use std::{cell::RefCell, fmt::Display, rc::Rc};

use crate::runtime::{
    object::Object,
    tensor::{Storage, Tensor},
    types::{BuiltinType, ClassType, TypeHandle},
};

/// The deserialized form of one node in the pickled value graph
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Key/value pairs in insertion order
    Dict(Vec<(Value, Value)>),
    /// Raw bytes read from an auxiliary storage record
    Storage(Storage),
    Tensor(Tensor),
    /// A reconstructed class instance; shared so every reference in the
    /// graph observes the same object
    Object(Rc<RefCell<Object>>),
    /// A resolved class pushed by a global reference, consumed by reduce
    Class(Rc<ClassType>),
    /// A well-known builtin constructor the parser applies itself
    Global(KnownGlobal),
}

/// Builtin constructors that may appear as reduce callees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownGlobal {
    /// `torch._utils._rebuild_tensor_v2`
    RebuildTensor,
    /// `torch._utils._rebuild_parameter`
    RebuildParameter,
    /// `collections.OrderedDict`
    OrderedDict,
}

impl Value {
    /// A short name for the value's shape, used in failure messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Storage(_) => "storage",
            Value::Tensor(_) => "tensor",
            Value::Object(_) => "object",
            Value::Class(_) => "class",
            Value::Global(_) => "global",
        }
    }

    /// The type to declare for an attribute holding this value
    ///
    /// Container element types are not tracked, so collections type as
    /// containers of `Any`.
    pub(crate) fn value_type(&self) -> TypeHandle {
        match self {
            Value::None => TypeHandle::Builtin(BuiltinType::NoneType),
            Value::Bool(_) => TypeHandle::Builtin(BuiltinType::Bool),
            Value::Int(_) => TypeHandle::Builtin(BuiltinType::Int),
            Value::Float(_) => TypeHandle::Builtin(BuiltinType::Float),
            Value::Str(_) => TypeHandle::Builtin(BuiltinType::Str),
            Value::List(_) => {
                TypeHandle::Builtin(BuiltinType::List(Box::new(BuiltinType::Any)))
            }
            Value::Tuple(items) => TypeHandle::Builtin(BuiltinType::Tuple(
                items.iter().map(|_| BuiltinType::Any).collect(),
            )),
            Value::Dict(_) => TypeHandle::Builtin(BuiltinType::Dict(
                Box::new(BuiltinType::Any),
                Box::new(BuiltinType::Any),
            )),
            Value::Storage(_) | Value::Tensor(_) => TypeHandle::Builtin(BuiltinType::Tensor),
            Value::Object(object) => TypeHandle::Class(Rc::clone(object.borrow().class())),
            Value::Class(_) | Value::Global(_) => TypeHandle::Builtin(BuiltinType::Any),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(first), Value::Bool(second)) => first == second,
            (Value::Int(first), Value::Int(second)) => first == second,
            (Value::Float(first), Value::Float(second)) => first == second,
            (Value::Str(first), Value::Str(second)) => first == second,
            (Value::List(first), Value::List(second)) => first == second,
            (Value::Tuple(first), Value::Tuple(second)) => first == second,
            (Value::Dict(first), Value::Dict(second)) => first == second,
            (Value::Storage(first), Value::Storage(second)) => first == second,
            (Value::Tensor(first), Value::Tensor(second)) => first == second,
            (Value::Object(first), Value::Object(second)) => Rc::ptr_eq(first, second),
            (Value::Class(first), Value::Class(second)) => Rc::ptr_eq(first, second),
            (Value::Global(first), Value::Global(second)) => first == second,
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::None => write!(fmt, "None"),
            Value::Bool(value) => write!(fmt, "{value}"),
            Value::Int(value) => write!(fmt, "{value}"),
            Value::Float(value) => write!(fmt, "{value}"),
            Value::Str(value) => write!(fmt, "{value}"),
            Value::List(items) => {
                write!(fmt, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(fmt, ", ")?;
                    }
                    write!(fmt, "{item}")?;
                }
                write!(fmt, "]")
            }
            Value::Tuple(items) => {
                write!(fmt, "(")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(fmt, ", ")?;
                    }
                    write!(fmt, "{item}")?;
                }
                write!(fmt, ")")
            }
            Value::Dict(entries) => {
                write!(fmt, "{{")?;
                for (index, (key, value)) in entries.iter().enumerate() {
                    if index > 0 {
                        write!(fmt, ", ")?;
                    }
                    write!(fmt, "{key}: {value}")?;
                }
                write!(fmt, "}}")
            }
            Value::Storage(storage) => {
                write!(fmt, "storage({}, {} bytes)", storage.dtype, storage.data.len())
            }
            Value::Tensor(tensor) => {
                write!(fmt, "tensor({}, shape {:?})", tensor.dtype, tensor.shape)
            }
            Value::Object(object) => write!(fmt, "object({})", object.borrow().class().name()),
            Value::Class(class) => write!(fmt, "{}", class.name()),
            Value::Global(KnownGlobal::RebuildTensor) => {
                write!(fmt, "torch._utils._rebuild_tensor_v2")
            }
            Value::Global(KnownGlobal::RebuildParameter) => {
                write!(fmt, "torch._utils._rebuild_parameter")
            }
            Value::Global(KnownGlobal::OrderedDict) => write!(fmt, "collections.OrderedDict"),
        }
    }
}
