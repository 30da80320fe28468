//! The slot-map capability shared by every connectable node.
//!
//! A [`SlotMap`] maps `(role, name)` to a [`DataSlot`]; names are unique per
//! role. Steps get one filled in by their kernel, groups expose promotions
//! instead, triggers have none.

use crate::graph::data::DataRef;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::slot::{DataRole, DataSlot, SlotSpec};
use crate::types::{Buffer, DataKind};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct SlotMap {
    slots: BTreeMap<(DataRole, String), DataSlot>,
}

impl SlotMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a slot from a full spec.
    pub fn declare(&mut self, spec: SlotSpec) -> GraphResult<()> {
        let key = (spec.role, spec.name.clone());
        if self.slots.contains_key(&key) {
            return Err(GraphError::duplicate(spec.role, spec.name));
        }
        self.slots.insert(key, DataSlot::from_spec(spec));
        Ok(())
    }

    pub fn declare_input(&mut self, name: impl Into<String>, kind: DataKind) -> GraphResult<()> {
        self.declare(SlotSpec::input(name, kind))
    }

    pub fn declare_optional_input(
        &mut self,
        name: impl Into<String>,
        kind: DataKind,
    ) -> GraphResult<()> {
        self.declare(SlotSpec::input(name, kind).optional())
    }

    pub fn declare_output(&mut self, name: impl Into<String>, initial: Buffer) -> GraphResult<()> {
        self.declare(SlotSpec::output(name, initial))
    }

    pub fn declare_buffer(&mut self, name: impl Into<String>, initial: Buffer) -> GraphResult<()> {
        self.declare(SlotSpec::buffer(name, initial))
    }

    pub fn get(&self, role: DataRole, name: &str) -> GraphResult<&DataSlot> {
        self.slots
            .get(&(role, name.to_string()))
            .ok_or_else(|| GraphError::not_found(format!("{} slot '{}'", role, name)))
    }

    pub fn get_mut(&mut self, role: DataRole, name: &str) -> GraphResult<&mut DataSlot> {
        self.slots
            .get_mut(&(role, name.to_string()))
            .ok_or_else(|| GraphError::not_found(format!("{} slot '{}'", role, name)))
    }

    pub fn contains(&self, role: DataRole, name: &str) -> bool {
        self.slots.contains_key(&(role, name.to_string()))
    }

    /// Data currently behind a slot, if any.
    pub fn data(&self, role: DataRole, name: &str) -> GraphResult<Option<DataRef>> {
        Ok(self.get(role, name)?.data().cloned())
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataSlot> {
        self.slots.values()
    }

    pub fn with_role(&self, role: DataRole) -> impl Iterator<Item = &DataSlot> {
        self.slots.values().filter(move |s| s.role() == role)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &DataSlot> {
        self.with_role(DataRole::Input)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &DataSlot> {
        self.with_role(DataRole::Output)
    }

    pub fn buffers(&self) -> impl Iterator<Item = &DataSlot> {
        self.with_role(DataRole::Buffer)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
