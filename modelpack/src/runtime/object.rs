/*!
 Live instances of program-defined classes.
*/

use std::rc::{Rc, Weak};

use crate::{
    pickle::models::Value,
    runtime::types::{ClassType, CompilationUnit},
};

/// An instance of a class, holding one value per declared attribute
///
/// Slots are positional; the slot index of an attribute comes from the
/// attribute's position on the owning [`ClassType`]. Slots are only ever
/// appended while an object is being reconstructed.
#[derive(Debug)]
pub struct Object {
    class: Rc<ClassType>,
    compilation_unit: Weak<CompilationUnit>,
    slots: Vec<Value>,
}

impl Object {
    pub(crate) fn new(
        class: Rc<ClassType>,
        compilation_unit: Weak<CompilationUnit>,
        capacity: usize,
    ) -> Self {
        Self {
            class,
            compilation_unit,
            slots: Vec::with_capacity(capacity),
        }
    }

    pub fn class(&self) -> &Rc<ClassType> {
        &self.class
    }

    /// The unit this object was reconstructed under, if it is still alive
    pub fn compilation_unit(&self) -> Option<Rc<CompilationUnit>> {
        self.compilation_unit.upgrade()
    }

    pub fn slots(&self) -> &[Value] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&Value> {
        self.slots.get(index)
    }

    /// Fill the next open slot
    pub fn push_slot(&mut self, value: Value) {
        self.slots.push(value);
    }

    /// Look up a slot value by its declared attribute name
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        let index = self
            .class
            .attributes()
            .iter()
            .position(|attribute| attribute.name == name)?;
        self.slots.get(index)
    }
}
