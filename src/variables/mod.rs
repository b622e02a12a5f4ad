//! Variable resolution
//!
//! An expression never sees its data directly. At compile time every name is
//! turned into an index through [`VariableResolver`]; at evaluation time that
//! index is read (or written) through [`VariableTable`] together with a
//! caller-owned context. The same compiled expression can therefore run
//! against any backing store and any number of contexts.

pub mod matrix;
pub mod model;
pub mod object;
pub mod scalar;
pub mod table;

pub use matrix::{Matrix, MatrixStore};
pub use model::{EvalContext, ModelVariables};
pub use object::{Accessor, ObjectAccessors};
pub use scalar::ScalarTable;
pub use table::DataTable;

use crate::error::EvalError;

/// Compile-time half of the protocol.
pub trait VariableResolver {
    /// Index for reading `name`; `None` makes the name unknown.
    fn resolve_read_index(&mut self, name: &str) -> Option<usize>;

    /// Index for the first argument of `array(name, subscript)`.
    fn resolve_array_index(&mut self, name: &str) -> Option<usize> {
        self.resolve_read_index(name)
    }

    /// Index for an assignment target. May allocate a new slot.
    fn resolve_assign_index(&mut self, name: &str) -> Option<usize>;
}

/// Run-time half of the protocol, parameterised by the context type.
pub trait VariableTable<C: ?Sized>: VariableResolver {
    fn read(&self, index: usize, ctx: &C) -> Result<f64, EvalError>;

    fn read_indexed(&self, index: usize, subscript: f64, ctx: &C) -> Result<f64, EvalError>;

    fn write(&mut self, index: usize, value: f64, ctx: &C) -> Result<(), EvalError>;
}

/// Convert a 1-based subscript to a 0-based position below `len`.
pub(crate) fn subscript_position(subscript: f64, len: usize) -> Option<usize> {
    if subscript.fract() != 0.0 || !(subscript >= 1.0 && subscript <= len as f64) {
        return None;
    }
    Some(subscript as usize - 1)
}
