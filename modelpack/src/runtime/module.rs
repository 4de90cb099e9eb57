/*!
 The loaded module: the archive's root object plus the unit it was built
 under.

 The module keeps the compilation unit alive for as long as any of its
 objects can be reached, mirroring the lifetime contract of the load
 session.
*/

use std::{cell::RefCell, rc::Rc};

use crate::{
    pickle::models::Value,
    runtime::{object::Object, tensor::Tensor, types::CompilationUnit},
};

/// A fully deserialized model
pub struct Module {
    object: Rc<RefCell<Object>>,
    compilation_unit: Rc<CompilationUnit>,
}

impl Module {
    pub(crate) fn new(object: Rc<RefCell<Object>>, compilation_unit: Rc<CompilationUnit>) -> Self {
        Self {
            object,
            compilation_unit,
        }
    }

    /// The module's type name, without its namespace qualifier
    pub fn name(&self) -> String {
        self.object.borrow().class().unqualified_name().to_string()
    }

    /// The root object of the deserialized graph
    pub fn root(&self) -> &Rc<RefCell<Object>> {
        &self.object
    }

    pub fn compilation_unit(&self) -> &Rc<CompilationUnit> {
        &self.compilation_unit
    }

    /// Enumerate the module's tensors by attribute name, in declaration
    /// order, descending into submodules with a dotted prefix
    pub fn named_parameters(&self) -> Vec<(String, Tensor)> {
        let mut parameters = vec![];
        collect_parameters(&self.object, "", &mut parameters);
        parameters
    }
}

fn collect_parameters(
    object: &Rc<RefCell<Object>>,
    prefix: &str,
    parameters: &mut Vec<(String, Tensor)>,
) {
    let object = object.borrow();
    let class = object.class();
    for (index, attribute) in class.attributes().iter().enumerate() {
        match object.slot(index) {
            Some(Value::Tensor(tensor)) => {
                parameters.push((format!("{prefix}{}", attribute.name), tensor.clone()));
            }
            Some(Value::Object(child)) => {
                collect_parameters(child, &format!("{prefix}{}.", attribute.name), parameters);
            }
            _ => {}
        }
    }
}
