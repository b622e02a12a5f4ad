use super::{VariableResolver, VariableTable};
use crate::error::EvalError;
use std::collections::HashMap;

/// Named scalar slots. Assigning to an unknown name allocates a new slot
/// initialised to zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScalarTable {
    names: Vec<String>,
    values: Vec<f64>,
    index: HashMap<String, usize>,
}

impl ScalarTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, allocating it if needed. Returns its index.
    pub fn set(&mut self, name: &str, value: f64) -> usize {
        let i = self.allocate(name);
        self.values[i] = value;
        i
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.index_of(name).map(|i| self.values[i])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn value(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Name/value pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    fn allocate(&mut self, name: &str) -> usize {
        if let Some(i) = self.index_of(name) {
            return i;
        }
        let i = self.values.len();
        self.names.push(name.to_string());
        self.values.push(0.0);
        self.index.insert(name.to_string(), i);
        i
    }
}

impl<'a> FromIterator<(&'a str, f64)> for ScalarTable {
    fn from_iter<I: IntoIterator<Item = (&'a str, f64)>>(iter: I) -> Self {
        let mut table = ScalarTable::new();
        for (name, value) in iter {
            table.set(name, value);
        }
        table
    }
}

impl VariableResolver for ScalarTable {
    fn resolve_read_index(&mut self, name: &str) -> Option<usize> {
        self.index_of(name)
    }

    fn resolve_assign_index(&mut self, name: &str) -> Option<usize> {
        Some(self.allocate(name))
    }
}

impl<C: ?Sized> VariableTable<C> for ScalarTable {
    fn read(&self, index: usize, _ctx: &C) -> Result<f64, EvalError> {
        self.value(index)
            .ok_or(EvalError::UnboundVariable { index })
    }

    fn read_indexed(&self, index: usize, _subscript: f64, _ctx: &C) -> Result<f64, EvalError> {
        match self.name(index) {
            Some(name) => Err(EvalError::NotSubscriptable {
                variable: name.to_string(),
            }),
            None => Err(EvalError::UnboundVariable { index }),
        }
    }

    fn write(&mut self, index: usize, value: f64, _ctx: &C) -> Result<(), EvalError> {
        let slot = self
            .values
            .get_mut(index)
            .ok_or(EvalError::UnboundVariable { index })?;
        *slot = value;
        Ok(())
    }
}
