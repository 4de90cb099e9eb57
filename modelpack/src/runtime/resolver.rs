/*!
 Maps qualified type names from the pickle stream to live type handles.
*/

use std::rc::Rc;

use crate::{
    error::runtime::RuntimeError,
    runtime::types::{BuiltinType, CompilationUnit, TypeHandle},
};

/// The root namespace under which all program-defined classes live
const RESERVED_NAMESPACE: &str = "__torch__";

/// Decide whether a qualified name denotes a program-defined class
///
/// This is a prefix heuristic, not a structural guarantee: a name could in
/// principle be valid both as a class name and as a type expression. The
/// reserved namespace wins, and the check lives here so a structural type
/// tag can replace it in one place.
pub fn is_reserved_class_name(name: &str) -> bool {
    match name.strip_prefix(RESERVED_NAMESPACE) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}

/// Resolve a qualified name to a type handle
///
/// Reserved-namespace names resolve to class handles on the unit, creating
/// and registering a forward-declared class on first sight. Anything else is
/// parsed as a builtin type expression.
pub fn resolve(
    compilation_unit: &Rc<CompilationUnit>,
    name: &str,
) -> Result<TypeHandle, RuntimeError> {
    if is_reserved_class_name(name) {
        return Ok(TypeHandle::Class(compilation_unit.get_or_create_class(name)));
    }
    parse_type_expression(name).map(TypeHandle::Builtin)
}

/// Parse a textual type expression, i.e. `Dict[str, Tensor]`
pub(crate) fn parse_type_expression(text: &str) -> Result<BuiltinType, RuntimeError> {
    let mut parser = ExpressionParser { text, idx: 0 };
    match parser.parse() {
        Some(parsed) if parser.at_end() => Ok(parsed),
        _ => Err(RuntimeError::TypeResolution(text.to_string())),
    }
}

struct ExpressionParser<'a> {
    text: &'a str,
    idx: usize,
}

impl<'a> ExpressionParser<'a> {
    fn parse(&mut self) -> Option<BuiltinType> {
        match self.identifier()? {
            "int" => Some(BuiltinType::Int),
            "float" => Some(BuiltinType::Float),
            "bool" => Some(BuiltinType::Bool),
            "str" => Some(BuiltinType::Str),
            "NoneType" => Some(BuiltinType::NoneType),
            "Tensor" => Some(BuiltinType::Tensor),
            "Any" => Some(BuiltinType::Any),
            "List" => {
                let item = self.bracketed_items(1)?.pop()?;
                Some(BuiltinType::List(Box::new(item)))
            }
            "Optional" => {
                let item = self.bracketed_items(1)?.pop()?;
                Some(BuiltinType::Optional(Box::new(item)))
            }
            "Dict" => {
                let mut items = self.bracketed_items(2)?;
                let value = items.pop()?;
                let key = items.pop()?;
                Some(BuiltinType::Dict(Box::new(key), Box::new(value)))
            }
            "Tuple" => Some(BuiltinType::Tuple(self.bracketed_items(0)?)),
            _ => None,
        }
    }

    /// Parse `[T, ...]`; `expected` of zero allows any arity
    fn bracketed_items(&mut self, expected: usize) -> Option<Vec<BuiltinType>> {
        self.expect('[')?;
        let mut items = vec![self.parse()?];
        while self.peek() == Some(',') {
            self.idx += 1;
            self.skip_spaces();
            items.push(self.parse()?);
        }
        self.expect(']')?;
        if expected != 0 && items.len() != expected {
            return None;
        }
        Some(items)
    }

    fn identifier(&mut self) -> Option<&'a str> {
        let start = self.idx;
        while self
            .peek()
            .is_some_and(|current| current.is_ascii_alphanumeric() || current == '_')
        {
            self.idx += 1;
        }
        if self.idx == start {
            return None;
        }
        self.text.get(start..self.idx)
    }

    fn expect(&mut self, wanted: char) -> Option<()> {
        if self.peek() == Some(wanted) {
            self.idx += 1;
            return Some(());
        }
        None
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(' ') {
            self.idx += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.idx..].chars().next()
    }

    fn at_end(&self) -> bool {
        self.idx == self.text.len()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::{
        error::runtime::RuntimeError,
        runtime::{
            resolver::{is_reserved_class_name, parse_type_expression, resolve},
            types::{BuiltinType, CompilationUnit, TypeHandle},
        },
    };

    #[test]
    fn reserved_names_are_detected() {
        assert!(is_reserved_class_name("__torch__"));
        assert!(is_reserved_class_name("__torch__.LinearModel"));
        assert!(is_reserved_class_name("__torch__.nested.Block"));
        assert!(!is_reserved_class_name("__torch___.LinearModel"));
        assert!(!is_reserved_class_name("torch.LinearModel"));
        assert!(!is_reserved_class_name("Dict[str, Tensor]"));
    }

    #[test]
    fn resolution_is_idempotent_per_unit() {
        let unit = CompilationUnit::new();

        let first = resolve(&unit, "__torch__.LinearModel").unwrap();
        let second = resolve(&unit, "__torch__.LinearModel").unwrap();

        match (first, second) {
            (TypeHandle::Class(first), TypeHandle::Class(second)) => {
                assert!(Rc::ptr_eq(&first, &second));
            }
            _ => panic!("expected class handles"),
        }
    }

    #[test]
    fn non_reserved_names_parse_as_builtins() {
        let unit = CompilationUnit::new();

        let handle = resolve(&unit, "Dict[str, Tensor]").unwrap();

        assert_eq!(
            handle,
            TypeHandle::Builtin(BuiltinType::Dict(
                Box::new(BuiltinType::Str),
                Box::new(BuiltinType::Tensor)
            ))
        );
    }

    #[test]
    fn can_parse_simple_expressions() {
        assert_eq!(parse_type_expression("int").unwrap(), BuiltinType::Int);
        assert_eq!(
            parse_type_expression("Tensor").unwrap(),
            BuiltinType::Tensor
        );
        assert_eq!(
            parse_type_expression("List[float]").unwrap(),
            BuiltinType::List(Box::new(BuiltinType::Float))
        );
        assert_eq!(
            parse_type_expression("Optional[str]").unwrap(),
            BuiltinType::Optional(Box::new(BuiltinType::Str))
        );
    }

    #[test]
    fn can_parse_nested_expressions() {
        assert_eq!(
            parse_type_expression("Dict[str, List[Tensor]]").unwrap(),
            BuiltinType::Dict(
                Box::new(BuiltinType::Str),
                Box::new(BuiltinType::List(Box::new(BuiltinType::Tensor)))
            )
        );
        assert_eq!(
            parse_type_expression("Tuple[int, float, bool]").unwrap(),
            BuiltinType::Tuple(vec![
                BuiltinType::Int,
                BuiltinType::Float,
                BuiltinType::Bool
            ])
        );
    }

    #[test]
    fn cant_parse_invalid_expressions() {
        assert!(matches!(
            parse_type_expression("Frobnicator"),
            Err(RuntimeError::TypeResolution(_))
        ));
        assert!(matches!(
            parse_type_expression("List[int"),
            Err(RuntimeError::TypeResolution(_))
        ));
        assert!(matches!(
            parse_type_expression("Dict[str]"),
            Err(RuntimeError::TypeResolution(_))
        ));
        assert!(matches!(
            parse_type_expression("int extra"),
            Err(RuntimeError::TypeResolution(_))
        ));
        assert!(matches!(
            parse_type_expression(""),
            Err(RuntimeError::TypeResolution(_))
        ));
    }
}
