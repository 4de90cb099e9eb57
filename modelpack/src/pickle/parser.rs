/*!
 Contains logic to interpret the restricted pickle dialect model archives
 use for their value graph.

 The interpreter is deliberately policy-free: everything that needs
 knowledge of the type system or the container goes through the three
 [`LoadHooks`] callbacks, so the same opcode loop serves any embedding.

 Logic referenced from the protocol description located at:
   - [`pickletools`](https://github.com/python/cpython/blob/main/Lib/pickletools.py)
*/

use std::{collections::HashMap, io::Read, rc::Rc};

use crate::{
    error::pickle::PickleError,
    pickle::models::{KnownGlobal, Value},
    runtime::{
        tensor::{Dtype, Storage, Tensor},
        types::{ClassType, TypeHandle},
    },
    util::device::Device,
};

/// Declares the protocol version; must be the first opcode
const PROTO: u8 = 0x80;
/// Terminates the stream, leaving the root value on the stack
const STOP: u8 = b'.';
/// Pushes a marker for variadic opcodes to pop back to
const MARK: u8 = b'(';
const NONE: u8 = b'N';
const NEWTRUE: u8 = 0x88;
const NEWFALSE: u8 = 0x89;
/// A 4-byte little-endian signed integer
const BININT: u8 = b'J';
/// A 1-byte unsigned integer
const BININT1: u8 = b'K';
/// A 2-byte little-endian unsigned integer
const BININT2: u8 = b'M';
/// A variable-width little-endian signed integer
const LONG1: u8 = 0x8a;
/// An 8-byte big-endian float
const BINFLOAT: u8 = b'G';
/// A string of at most 255 bytes
const SHORT_BINSTRING: u8 = b'U';
/// A UTF-8 string with a 4-byte length
const BINUNICODE: u8 = b'X';
const EMPTY_LIST: u8 = b']';
const APPEND: u8 = b'a';
const APPENDS: u8 = b'e';
const EMPTY_DICT: u8 = b'}';
const SETITEM: u8 = b's';
const SETITEMS: u8 = b'u';
const EMPTY_TUPLE: u8 = b')';
const TUPLE: u8 = b't';
const TUPLE1: u8 = 0x85;
const TUPLE2: u8 = 0x86;
const TUPLE3: u8 = 0x87;
/// Stores the top of the stack in a memo slot
const BINPUT: u8 = b'q';
const LONG_BINPUT: u8 = b'r';
/// Pushes a previously memoized value
const BINGET: u8 = b'h';
const LONG_BINGET: u8 = b'j';
/// Pushes a resolved global, i.e. a class or builtin constructor
const GLOBAL: u8 = b'c';
/// Applies the callee below the top of the stack to the payload on top
const REDUCE: u8 = b'R';
/// Pushes the out-of-band value named by the persistent id on the stack
const BINPERSID: u8 = b'Q';

/// The single protocol version this interpreter accepts
const PROTOCOL_VERSION: u8 = 2;

/// The callbacks the interpreter needs from its embedding
pub trait LoadHooks {
    /// Resolve a qualified type name to a live type handle
    fn resolve_type(&mut self, name: &str) -> Result<TypeHandle, PickleError>;

    /// Reconstruct an instance of `class` from its raw payload
    fn build_object(
        &mut self,
        class: &Rc<ClassType>,
        payload: Value,
    ) -> Result<Value, PickleError>;

    /// Fetch the bytes of an auxiliary record scoped to the current archive
    fn read_record(&mut self, name: &str) -> Result<Vec<u8>, PickleError>;
}

/// Interprets one record's opcode stream into a single root value
pub struct ValueReader<R: Read, H: LoadHooks> {
    reader: R,
    hooks: H,
    /// Overrides the storage location recorded in the archive when present
    device: Option<Device>,
    stack: Vec<Value>,
    marks: Vec<usize>,
    memo: HashMap<u32, Value>,
}

impl<R: Read, H: LoadHooks> ValueReader<R, H> {
    pub fn new(reader: R, hooks: H, device: Option<Device>) -> Self {
        Self {
            reader,
            hooks,
            device,
            stack: vec![],
            marks: vec![],
            memo: HashMap::new(),
        }
    }

    /// Run the opcode loop to completion and return the root value
    pub fn parse(mut self) -> Result<Value, PickleError> {
        loop {
            let opcode = self.read_byte()?;
            match opcode {
                PROTO => {
                    let version = self.read_byte()?;
                    if version != PROTOCOL_VERSION {
                        return Err(PickleError::UnsupportedProtocol(version));
                    }
                }
                STOP => return self.pop("STOP"),
                MARK => self.marks.push(self.stack.len()),
                NONE => self.stack.push(Value::None),
                NEWTRUE => self.stack.push(Value::Bool(true)),
                NEWFALSE => self.stack.push(Value::Bool(false)),
                BININT => {
                    let value = i32::from_le_bytes(self.read_array()?);
                    self.stack.push(Value::Int(value as i64));
                }
                BININT1 => {
                    let value = self.read_byte()?;
                    self.stack.push(Value::Int(value as i64));
                }
                BININT2 => {
                    let value = u16::from_le_bytes(self.read_array()?);
                    self.stack.push(Value::Int(value as i64));
                }
                LONG1 => {
                    let value = self.read_long1()?;
                    self.stack.push(Value::Int(value));
                }
                BINFLOAT => {
                    let value = f64::from_be_bytes(self.read_array()?);
                    self.stack.push(Value::Float(value));
                }
                SHORT_BINSTRING => {
                    let length = self.read_byte()? as usize;
                    let value = self.read_string(length)?;
                    self.stack.push(Value::Str(value));
                }
                BINUNICODE => {
                    let length = u32::from_le_bytes(self.read_array()?) as usize;
                    let value = self.read_string(length)?;
                    self.stack.push(Value::Str(value));
                }
                EMPTY_LIST => self.stack.push(Value::List(vec![])),
                APPEND => {
                    let item = self.pop("APPEND")?;
                    self.list_on_top()?.push(item);
                }
                APPENDS => {
                    let items = self.pop_to_mark()?;
                    self.list_on_top()?.extend(items);
                }
                EMPTY_DICT => self.stack.push(Value::Dict(vec![])),
                SETITEM => {
                    let value = self.pop("SETITEM")?;
                    let key = self.pop("SETITEM")?;
                    set_entry(self.dict_on_top()?, key, value);
                }
                SETITEMS => {
                    let mut items = self.pop_to_mark()?.into_iter();
                    let entries = self.dict_on_top()?;
                    while let (Some(key), Some(value)) = (items.next(), items.next()) {
                        set_entry(entries, key, value);
                    }
                }
                EMPTY_TUPLE => self.stack.push(Value::Tuple(vec![])),
                TUPLE => {
                    let items = self.pop_to_mark()?;
                    self.stack.push(Value::Tuple(items));
                }
                TUPLE1 => self.tuple_from_top(1)?,
                TUPLE2 => self.tuple_from_top(2)?,
                TUPLE3 => self.tuple_from_top(3)?,
                BINPUT => {
                    let index = self.read_byte()? as u32;
                    self.memo_put(index)?;
                }
                LONG_BINPUT => {
                    let index = u32::from_le_bytes(self.read_array()?);
                    self.memo_put(index)?;
                }
                BINGET => {
                    let index = self.read_byte()? as u32;
                    self.memo_get(index)?;
                }
                LONG_BINGET => {
                    let index = u32::from_le_bytes(self.read_array()?);
                    self.memo_get(index)?;
                }
                GLOBAL => self.read_global()?,
                REDUCE => self.apply_reduce()?,
                BINPERSID => {
                    let id = self.pop("BINPERSID")?;
                    let storage = self.load_storage(id)?;
                    self.stack.push(storage);
                }
                other => return Err(PickleError::UnknownOpcode(other)),
            }
        }
    }

    /// Resolve a `module\nname\n` pair to a class or builtin constructor
    fn read_global(&mut self) -> Result<(), PickleError> {
        let module = self.read_line()?;
        let name = self.read_line()?;
        let value = match (module.as_str(), name.as_str()) {
            ("torch._utils", "_rebuild_tensor_v2") => Value::Global(KnownGlobal::RebuildTensor),
            ("torch._utils", "_rebuild_parameter") => {
                Value::Global(KnownGlobal::RebuildParameter)
            }
            ("collections", "OrderedDict") => Value::Global(KnownGlobal::OrderedDict),
            _ => {
                let qualified = format!("{module}.{name}");
                match self.hooks.resolve_type(&qualified)? {
                    TypeHandle::Class(class) => Value::Class(class),
                    TypeHandle::Builtin(_) => {
                        return Err(PickleError::UnsupportedGlobal(qualified))
                    }
                }
            }
        };
        self.stack.push(value);
        Ok(())
    }

    fn apply_reduce(&mut self) -> Result<(), PickleError> {
        let payload = self.pop("REDUCE")?;
        let callee = self.pop("REDUCE")?;
        let value = match callee {
            Value::Class(class) => self.hooks.build_object(&class, payload)?,
            Value::Global(KnownGlobal::RebuildTensor) => self.rebuild_tensor(payload)?,
            Value::Global(KnownGlobal::RebuildParameter) => self.rebuild_parameter(payload)?,
            Value::Global(KnownGlobal::OrderedDict) => match payload {
                Value::Tuple(items) if items.is_empty() => Value::Dict(vec![]),
                other => {
                    return Err(PickleError::BadReduce(format!(
                        "unexpected ordered dict arguments {other}"
                    )))
                }
            },
            other => {
                return Err(PickleError::BadReduce(format!(
                    "{} is not callable",
                    other.kind()
                )))
            }
        };
        self.stack.push(value);
        Ok(())
    }

    /// Resolve a persistent id tuple to the storage record it names
    ///
    /// The id has the shape `("storage", type, key, location, numel)`.
    fn load_storage(&mut self, id: Value) -> Result<Value, PickleError> {
        let items = match id {
            Value::Tuple(items) => items,
            other => {
                return Err(PickleError::BadPersistentId(format!(
                    "expected a tuple, got {}",
                    other.kind()
                )))
            }
        };
        let (type_name, key, location, numel) = match items.as_slice() {
            [Value::Str(tag), Value::Str(type_name), Value::Str(key), Value::Str(location), Value::Int(numel)]
                if tag == "storage" =>
            {
                (type_name.clone(), key.clone(), location.clone(), *numel)
            }
            _ => {
                return Err(PickleError::BadPersistentId(
                    "id does not describe a storage".to_string(),
                ))
            }
        };

        let dtype = Dtype::from_storage_name(&type_name).ok_or_else(|| {
            PickleError::BadPersistentId(format!("unknown storage type {type_name}"))
        })?;
        if numel < 0 {
            return Err(PickleError::BadPersistentId(format!(
                "storage {key} declares negative length"
            )));
        }
        let device = match self.device {
            Some(device) => device,
            None => Device::from_location(&location).ok_or_else(|| {
                PickleError::BadPersistentId(format!("unknown storage location {location}"))
            })?,
        };

        let data = self.hooks.read_record(&key)?;
        let needed = numel as usize * dtype.element_size();
        if data.len() < needed {
            return Err(PickleError::BadTensorData(format!(
                "storage {key} holds {} bytes, needs {needed}",
                data.len()
            )));
        }

        Ok(Value::Storage(Storage {
            dtype,
            device,
            data: Rc::new(data),
        }))
    }

    /// Assemble a tensor from `(storage, offset, shape, strides,
    /// requires_grad, hooks)`
    fn rebuild_tensor(&mut self, payload: Value) -> Result<Value, PickleError> {
        let items = match payload {
            Value::Tuple(items) if items.len() >= 5 => items,
            other => {
                return Err(PickleError::BadReduce(format!(
                    "unexpected tensor arguments {other}"
                )))
            }
        };
        let mut items = items.into_iter();
        let storage = match items.next() {
            Some(Value::Storage(storage)) => storage,
            _ => {
                return Err(PickleError::BadReduce(
                    "tensor arguments do not start with a storage".to_string(),
                ))
            }
        };
        let storage_offset = items
            .next()
            .and_then(|value| value.as_int())
            .ok_or_else(|| PickleError::BadReduce("missing storage offset".to_string()))?;
        let shape = int_sequence(items.next(), "tensor shape")?;
        let strides = int_sequence(items.next(), "tensor strides")?;
        let requires_grad = items
            .next()
            .and_then(|value| value.as_bool())
            .unwrap_or(false);

        if storage_offset < 0 {
            return Err(PickleError::BadTensorData(
                "negative storage offset".to_string(),
            ));
        }
        let mut numel: usize = 1;
        for dim in &shape {
            if *dim < 0 {
                return Err(PickleError::BadTensorData(format!(
                    "negative dimension in shape {shape:?}"
                )));
            }
            numel = numel
                .checked_mul(*dim as usize)
                .ok_or_else(|| PickleError::BadTensorData("shape overflows".to_string()))?;
        }
        let needed = (storage_offset as usize + numel) * storage.dtype.element_size();
        if storage.data.len() < needed {
            return Err(PickleError::BadTensorData(format!(
                "storage holds {} bytes, tensor needs {needed}",
                storage.data.len()
            )));
        }

        Ok(Value::Tensor(Tensor::new(
            storage.dtype,
            shape,
            strides,
            storage_offset,
            requires_grad,
            storage.device,
            Rc::clone(&storage.data),
        )))
    }

    /// Unwrap `(tensor, requires_grad, hooks)` into the tensor it carries
    fn rebuild_parameter(&mut self, payload: Value) -> Result<Value, PickleError> {
        let items = match payload {
            Value::Tuple(items) if !items.is_empty() => items,
            other => {
                return Err(PickleError::BadReduce(format!(
                    "unexpected parameter arguments {other}"
                )))
            }
        };
        let mut items = items.into_iter();
        let mut tensor = match items.next() {
            Some(Value::Tensor(tensor)) => tensor,
            _ => {
                return Err(PickleError::BadReduce(
                    "parameter arguments do not start with a tensor".to_string(),
                ))
            }
        };
        if let Some(requires_grad) = items.next().and_then(|value| value.as_bool()) {
            tensor.requires_grad = requires_grad;
        }
        Ok(Value::Tensor(tensor))
    }

    fn tuple_from_top(&mut self, len: usize) -> Result<(), PickleError> {
        if self.stack.len() < len {
            return Err(PickleError::StackUnderflow("TUPLE"));
        }
        let items = self.stack.split_off(self.stack.len() - len);
        self.stack.push(Value::Tuple(items));
        Ok(())
    }

    fn list_on_top(&mut self) -> Result<&mut Vec<Value>, PickleError> {
        match self.stack.last_mut() {
            Some(Value::List(items)) => Ok(items),
            Some(other) => Err(PickleError::UnexpectedValue("list", other.kind().to_string())),
            None => Err(PickleError::StackUnderflow("APPEND")),
        }
    }

    fn dict_on_top(&mut self) -> Result<&mut Vec<(Value, Value)>, PickleError> {
        match self.stack.last_mut() {
            Some(Value::Dict(entries)) => Ok(entries),
            Some(other) => Err(PickleError::UnexpectedValue("dict", other.kind().to_string())),
            None => Err(PickleError::StackUnderflow("SETITEM")),
        }
    }

    fn memo_put(&mut self, index: u32) -> Result<(), PickleError> {
        let top = self
            .stack
            .last()
            .ok_or(PickleError::StackUnderflow("BINPUT"))?
            .clone();
        self.memo.insert(index, top);
        Ok(())
    }

    fn memo_get(&mut self, index: u32) -> Result<(), PickleError> {
        let value = self
            .memo
            .get(&index)
            .cloned()
            .ok_or(PickleError::UnknownMemo(index))?;
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self, opcode: &'static str) -> Result<Value, PickleError> {
        self.stack.pop().ok_or(PickleError::StackUnderflow(opcode))
    }

    fn pop_to_mark(&mut self) -> Result<Vec<Value>, PickleError> {
        let mark = self.marks.pop().ok_or(PickleError::NoMark)?;
        if mark > self.stack.len() {
            return Err(PickleError::NoMark);
        }
        Ok(self.stack.split_off(mark))
    }

    /// Read a variable-width little-endian signed integer
    fn read_long1(&mut self) -> Result<i64, PickleError> {
        let width = self.read_byte()? as usize;
        if width > 8 {
            return Err(PickleError::IntegerTooLarge(width));
        }
        if width == 0 {
            return Ok(0);
        }
        let bytes = self.read_exact_bytes(width)?;
        // Sign-extend from the top bit of the highest byte
        let fill = if bytes[width - 1] & 0x80 != 0 { 0xff } else { 0x00 };
        let mut buf = [fill; 8];
        buf[..width].copy_from_slice(&bytes);
        Ok(i64::from_le_bytes(buf))
    }

    /// Read bytes up to, but not including, a newline
    fn read_line(&mut self) -> Result<String, PickleError> {
        let mut bytes = vec![];
        loop {
            let byte = self.read_byte()?;
            if byte == b'\n' {
                break;
            }
            bytes.push(byte);
        }
        String::from_utf8(bytes).map_err(PickleError::StringParse)
    }

    fn read_string(&mut self, len: usize) -> Result<String, PickleError> {
        String::from_utf8(self.read_exact_bytes(len)?).map_err(PickleError::StringParse)
    }

    fn read_exact_bytes(&mut self, len: usize) -> Result<Vec<u8>, PickleError> {
        let mut bytes = vec![0u8; len];
        self.fill(&mut bytes)?;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], PickleError> {
        let mut bytes = [0u8; N];
        self.fill(&mut bytes)?;
        Ok(bytes)
    }

    fn read_byte(&mut self) -> Result<u8, PickleError> {
        Ok(self.read_array::<1>()?[0])
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<(), PickleError> {
        self.reader.read_exact(buf).map_err(|why| {
            if why.kind() == std::io::ErrorKind::UnexpectedEof {
                return PickleError::UnexpectedEof;
            }
            PickleError::Io(why)
        })
    }
}

/// Insert or overwrite one dict entry, preserving insertion order
fn set_entry(entries: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    if let Some(entry) = entries.iter_mut().find(|entry| entry.0 == key) {
        entry.1 = value;
        return;
    }
    entries.push((key, value));
}

/// Interpret a tuple or list of integers, i.e. a shape or stride sequence
fn int_sequence(value: Option<Value>, what: &str) -> Result<Vec<i64>, PickleError> {
    let items = match value {
        Some(Value::Tuple(items)) | Some(Value::List(items)) => items,
        _ => return Err(PickleError::BadReduce(format!("missing {what}"))),
    };
    items
        .into_iter()
        .map(|item| {
            item.as_int()
                .ok_or_else(|| PickleError::BadReduce(format!("non-integer in {what}")))
        })
        .collect()
}
