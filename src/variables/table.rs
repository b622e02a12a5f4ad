use super::{VariableResolver, VariableTable};
use crate::error::{EvalError, UecError, UecResult};
use crate::types::TableSpec;

/// Columnar numeric data read at a row. The evaluation context is the
/// 0-based row number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    rows: usize,
}

impl DataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a model table, validating column lengths.
    pub fn from_spec(spec: &TableSpec) -> UecResult<Self> {
        let mut table = DataTable::new();
        for (name, values) in &spec.columns {
            table.add_column(name, values.clone())?;
        }
        Ok(table)
    }

    /// Add or replace a column. Every column must have the same length.
    pub fn add_column(&mut self, name: &str, values: Vec<f64>) -> UecResult<usize> {
        if !self.columns.is_empty() && values.len() != self.rows {
            return Err(UecError::Validation(format!(
                "Column '{}' has {} rows, expected {} rows",
                name,
                values.len(),
                self.rows
            )));
        }
        self.rows = values.len();

        if let Some(i) = self.column_index(name) {
            self.columns[i] = values;
            return Ok(i);
        }
        self.names.push(name.to_string());
        self.columns.push(values);
        Ok(self.columns.len() - 1)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.column_index(name).map(|i| self.columns[i].as_slice())
    }

    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn value(&self, column: usize, row: usize) -> Result<f64, EvalError> {
        let values = self
            .columns
            .get(column)
            .ok_or(EvalError::UnboundVariable { index: column })?;
        values.get(row).copied().ok_or_else(|| self.out_of_range(column, row))
    }

    pub fn set_value(&mut self, column: usize, row: usize, value: f64) -> Result<(), EvalError> {
        if column >= self.columns.len() {
            return Err(EvalError::UnboundVariable { index: column });
        }
        if row >= self.columns[column].len() {
            return Err(self.out_of_range(column, row));
        }
        self.columns[column][row] = value;
        Ok(())
    }

    fn out_of_range(&self, column: usize, row: usize) -> EvalError {
        EvalError::CellOutOfRange {
            variable: self.column_name(column).unwrap_or("?").to_string(),
            detail: format!("row {} is outside the table ({} rows)", row, self.rows),
        }
    }
}

impl VariableResolver for DataTable {
    fn resolve_read_index(&mut self, name: &str) -> Option<usize> {
        self.column_index(name)
    }

    /// Unknown targets become new zero-filled columns.
    fn resolve_assign_index(&mut self, name: &str) -> Option<usize> {
        if let Some(i) = self.column_index(name) {
            return Some(i);
        }
        self.names.push(name.to_string());
        self.columns.push(vec![0.0; self.rows]);
        Some(self.columns.len() - 1)
    }
}

impl VariableTable<usize> for DataTable {
    fn read(&self, index: usize, row: &usize) -> Result<f64, EvalError> {
        self.value(index, *row)
    }

    fn read_indexed(&self, index: usize, _subscript: f64, _row: &usize) -> Result<f64, EvalError> {
        Err(EvalError::NotSubscriptable {
            variable: self.column_name(index).unwrap_or("?").to_string(),
        })
    }

    fn write(&mut self, index: usize, value: f64, row: &usize) -> Result<(), EvalError> {
        self.set_value(index, *row, value)
    }
}
