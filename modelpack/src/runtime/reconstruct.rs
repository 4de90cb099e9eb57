/*!
 Rebuilds one live object from the raw payload the parser produced for it.

 Which strategy applies is decided per object from the serialized data, not
 from any static type information, so the choice is modeled as an explicit
 [`Strategy`] computed once before any state is touched.
*/

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use crate::{
    error::runtime::RuntimeError,
    pickle::models::Value,
    runtime::{
        object::Object,
        types::{ClassType, CompilationUnit, CustomClass, CustomClassRegistry, SetStateFn},
    },
};

/// The reconstruction strategy selected for one object, in priority order
enum Strategy {
    /// The compilation unit has a registered `__setstate__` for the class
    ContextMethod(Rc<SetStateFn>),
    /// A natively-implemented class outside the unit claims the name
    CustomClass(CustomClass),
    /// No method anywhere; interpret the payload as an attribute mapping
    AttributeDict,
}

fn strategy(
    compilation_unit: &CompilationUnit,
    custom_classes: &CustomClassRegistry,
    class: &ClassType,
) -> Strategy {
    let method_name = format!("{}.__setstate__", class.name());
    if let Some(method) = compilation_unit.find_method(&method_name) {
        return Strategy::ContextMethod(method);
    }
    if let Some(custom) = custom_classes.find(class.name()) {
        return Strategy::CustomClass(custom.clone());
    }
    Strategy::AttributeDict
}

/// Reconstruct an instance of `class` from `payload`
///
/// Method strategies hand the payload to the located procedure whole and
/// return the instance however the procedure left it; their failures
/// propagate uninterpreted. The fallback requires a keyed mapping and
/// declares each key as an attribute on the class as it fills slots.
pub fn reconstruct(
    compilation_unit: &Rc<CompilationUnit>,
    custom_classes: &CustomClassRegistry,
    class: &Rc<ClassType>,
    payload: Value,
) -> Result<Rc<RefCell<Object>>, RuntimeError> {
    match strategy(compilation_unit, custom_classes, class) {
        Strategy::ContextMethod(method) => {
            let mut object = Object::new(Rc::clone(class), Rc::downgrade(compilation_unit), 0);
            method(&mut object, payload)?;
            Ok(Rc::new(RefCell::new(object)))
        }
        Strategy::CustomClass(custom) => {
            let mut object = Object::new(Rc::clone(custom.class()), Weak::new(), 1);
            (custom.set_state())(&mut object, payload)?;
            Ok(Rc::new(RefCell::new(object)))
        }
        Strategy::AttributeDict => {
            let entries = match payload {
                Value::Dict(entries) => entries,
                other => return Err(RuntimeError::PayloadShape(other.kind().to_string())),
            };
            let mut object = Object::new(
                Rc::clone(class),
                Rc::downgrade(compilation_unit),
                entries.len(),
            );
            for (key, value) in entries {
                let name = match &key {
                    Value::Str(name) => name.clone(),
                    other => other.to_string(),
                };
                class.add_or_check_attribute(&name, value.value_type())?;
                object.push_slot(value);
            }
            Ok(Rc::new(RefCell::new(object)))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::{
        error::runtime::RuntimeError,
        pickle::models::Value,
        runtime::{
            reconstruct::reconstruct,
            types::{BuiltinType, CompilationUnit, CustomClassRegistry, TypeHandle},
        },
    };

    fn attribute_payload(entries: Vec<(&str, Value)>) -> Value {
        Value::Dict(
            entries
                .into_iter()
                .map(|(key, value)| (Value::Str(key.to_string()), value))
                .collect(),
        )
    }

    #[test]
    fn context_method_wins_over_valid_mapping() {
        let unit = CompilationUnit::new();
        let custom = CustomClassRegistry::new();
        let class = unit.get_or_create_class("__torch__.LinearModel");
        let invoked = Rc::new(RefCell::new(false));

        let seen = Rc::clone(&invoked);
        unit.register_method("__torch__.LinearModel.__setstate__", move |object, payload| {
            *seen.borrow_mut() = true;
            object.push_slot(payload);
            Ok(())
        });

        let payload = attribute_payload(vec![("weight", Value::Int(1))]);
        let object = reconstruct(&unit, &custom, &class, payload).unwrap();

        assert!(*invoked.borrow());
        assert_eq!(object.borrow().slots().len(), 1);
        // The method owns reconstruction; the fallback must not have declared anything
        assert!(class.attributes().is_empty());
    }

    #[test]
    fn custom_class_wins_when_no_context_method() {
        let unit = CompilationUnit::new();
        let mut custom = CustomClassRegistry::new();
        custom.register("__torch__.torch.classes.quantized.PackedParams", |object, payload| {
            object.push_slot(payload);
            Ok(())
        });
        let class = unit.get_or_create_class("__torch__.torch.classes.quantized.PackedParams");

        let object = reconstruct(&unit, &custom, &class, Value::Int(7)).unwrap();
        let object = object.borrow();

        assert_eq!(object.slots(), &[Value::Int(7)]);
        // The instance belongs to the native class, not the unit's forward declaration
        assert!(!Rc::ptr_eq(object.class(), &class));
    }

    #[test]
    fn fallback_declares_attributes_in_payload_order() {
        let unit = CompilationUnit::new();
        let custom = CustomClassRegistry::new();
        let class = unit.get_or_create_class("__torch__.LinearModel");

        let payload = attribute_payload(vec![
            ("weight", Value::Float(0.5)),
            ("bias", Value::Float(0.1)),
        ]);
        let object = reconstruct(&unit, &custom, &class, payload).unwrap();

        let attributes = class.attributes();
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[0].name, "weight");
        assert_eq!(attributes[1].name, "bias");
        assert_eq!(object.borrow().slots().len(), 2);
        assert_eq!(
            object.borrow().attribute("bias"),
            Some(&Value::Float(0.1))
        );
    }

    #[test]
    fn fallback_accumulates_attribute_unions() {
        let unit = CompilationUnit::new();
        let custom = CustomClassRegistry::new();
        let class = unit.get_or_create_class("__torch__.LinearModel");

        reconstruct(
            &unit,
            &custom,
            &class,
            attribute_payload(vec![("weight", Value::Int(1))]),
        )
        .unwrap();
        reconstruct(
            &unit,
            &custom,
            &class,
            attribute_payload(vec![("weight", Value::Int(2)), ("bias", Value::Int(3))]),
        )
        .unwrap();

        let attributes = class.attributes();
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[0].ty, TypeHandle::Builtin(BuiltinType::Int));
    }

    #[test]
    fn fallback_rejects_incompatible_redeclaration() {
        let unit = CompilationUnit::new();
        let custom = CustomClassRegistry::new();
        let class = unit.get_or_create_class("__torch__.LinearModel");

        reconstruct(
            &unit,
            &custom,
            &class,
            attribute_payload(vec![("weight", Value::Int(1))]),
        )
        .unwrap();
        let result = reconstruct(
            &unit,
            &custom,
            &class,
            attribute_payload(vec![("weight", Value::Str("oops".to_string()))]),
        );

        assert!(matches!(
            result,
            Err(RuntimeError::AttributeConflict(_, _))
        ));
    }

    #[test]
    fn fallback_rejects_non_mapping_payload() {
        let unit = CompilationUnit::new();
        let custom = CustomClassRegistry::new();
        let class = unit.get_or_create_class("__torch__.LinearModel");

        let result = reconstruct(&unit, &custom, &class, Value::Int(5));

        assert!(matches!(result, Err(RuntimeError::PayloadShape(_))));
    }

    #[test]
    fn method_failures_propagate_uninterpreted() {
        let unit = CompilationUnit::new();
        let custom = CustomClassRegistry::new();
        let class = unit.get_or_create_class("__torch__.LinearModel");
        unit.register_method("__torch__.LinearModel.__setstate__", |_, _| {
            Err(RuntimeError::MethodDispatch(
                "bad serialized state".to_string(),
            ))
        });

        let result = reconstruct(&unit, &custom, &class, Value::None);

        match result {
            Err(RuntimeError::MethodDispatch(message)) => {
                assert_eq!(message, "bad serialized state");
            }
            other => panic!("expected method failure, got {other:?}"),
        }
    }
}
