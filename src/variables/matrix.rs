//! Zone-by-zone matrices
//!
//! Zones are numbered from 1. A [`MatrixStore`] holds plain matrices, matrix
//! arrays (`IVT[k]`, members numbered from 1) and matrix collections (each
//! member also readable by its own name). The store is read with an
//! `(orig, dest)` context and applies each entry's [`Orientation`].

use super::{subscript_position, VariableResolver, VariableTable};
use crate::error::{EvalError, UecError, UecResult};
use crate::types::{MatrixSpec, Orientation};
use std::collections::HashMap;

/// A dense square matrix, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    name: String,
    zones: usize,
    values: Vec<f64>,
}

impl Matrix {
    pub fn new(name: impl Into<String>, zones: usize) -> Self {
        Self {
            name: name.into(),
            zones,
            values: vec![0.0; zones * zones],
        }
    }

    /// Build from rows; every row must be as long as there are rows.
    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<f64>>) -> UecResult<Self> {
        let name = name.into();
        let zones = rows.len();
        let mut values = Vec::with_capacity(zones * zones);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != zones {
                return Err(UecError::Validation(format!(
                    "Matrix '{}' row {} has {} values, expected {}",
                    name,
                    i + 1,
                    row.len(),
                    zones
                )));
            }
            values.extend(row);
        }
        Ok(Self {
            name,
            zones,
            values,
        })
    }

    pub fn from_spec(spec: &MatrixSpec) -> UecResult<Self> {
        Self::from_rows(spec.name.clone(), spec.values.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn zones(&self) -> usize {
        self.zones
    }

    fn offset(&self, row: usize, col: usize) -> Option<usize> {
        let valid = |z: usize| (1..=self.zones).contains(&z);
        (valid(row) && valid(col)).then(|| (row - 1) * self.zones + (col - 1))
    }

    /// Cell at 1-based `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.offset(row, col).map(|i| self.values[i])
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) -> bool {
        match self.offset(row, col) {
            Some(i) => {
                self.values[i] = value;
                true
            }
            None => false,
        }
    }

    fn cell(&self, row: usize, col: usize) -> Result<f64, EvalError> {
        self.get(row, col).ok_or_else(|| EvalError::CellOutOfRange {
            variable: self.name.clone(),
            detail: format!("cell ({row}, {col}) is outside {} zones", self.zones),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Matrix,
    /// Member of a collection, `member` is 1-based
    Member { collection: usize, member: usize },
    Array,
    Collection,
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    kind: EntryKind,
    orientation: Orientation,
    /// Indices into `MatrixStore::matrices`
    matrices: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct MatrixStore {
    matrices: Vec<Matrix>,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl MatrixStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_matrix(&mut self, matrix: Matrix, orientation: Orientation) -> UecResult<usize> {
        let name = matrix.name().to_string();
        let m = self.push_matrix(matrix);
        self.push_entry(name, EntryKind::Matrix, orientation, vec![m])
    }

    /// Register `IVT[1]..IVT[n]` under `name`.
    pub fn add_array(
        &mut self,
        name: &str,
        members: Vec<Matrix>,
        orientation: Orientation,
    ) -> UecResult<usize> {
        let indices = members.into_iter().map(|m| self.push_matrix(m)).collect();
        self.push_entry(name.to_string(), EntryKind::Array, orientation, indices)
    }

    /// Register a collection; each member is also readable by its own name.
    pub fn add_collection(
        &mut self,
        name: &str,
        members: Vec<Matrix>,
        orientation: Orientation,
    ) -> UecResult<usize> {
        let collection = self.entries.len();
        let indices: Vec<usize> = members.into_iter().map(|m| self.push_matrix(m)).collect();
        self.push_entry(
            name.to_string(),
            EntryKind::Collection,
            orientation,
            indices.clone(),
        )?;
        for (k, m) in indices.into_iter().enumerate() {
            let member_name = self.matrices[m].name().to_string();
            self.push_entry(
                member_name,
                EntryKind::Member {
                    collection,
                    member: k + 1,
                },
                orientation,
                vec![m],
            )?;
        }
        Ok(collection)
    }

    pub fn entry_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn kind(&self, entry: usize) -> Option<EntryKind> {
        self.entries.get(entry).map(|e| e.kind)
    }

    pub fn orientation(&self, entry: usize) -> Option<Orientation> {
        self.entries.get(entry).map(|e| e.orientation)
    }

    pub fn name(&self, entry: usize) -> Option<&str> {
        self.entries.get(entry).map(|e| e.name.as_str())
    }

    pub fn matrix(&self, name: &str) -> Option<&Matrix> {
        let entry = &self.entries[self.entry_index(name)?];
        match entry.kind {
            EntryKind::Matrix | EntryKind::Member { .. } => {
                entry.matrices.first().map(|&m| &self.matrices[m])
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push_matrix(&mut self, matrix: Matrix) -> usize {
        self.matrices.push(matrix);
        self.matrices.len() - 1
    }

    fn push_entry(
        &mut self,
        name: String,
        kind: EntryKind,
        orientation: Orientation,
        matrices: Vec<usize>,
    ) -> UecResult<usize> {
        if self.index.contains_key(&name) {
            return Err(UecError::Validation(format!(
                "Matrix name '{name}' is defined more than once"
            )));
        }
        let i = self.entries.len();
        self.index.insert(name.clone(), i);
        self.entries.push(Entry {
            name,
            kind,
            orientation,
            matrices,
        });
        Ok(i)
    }

    fn entry(&self, index: usize) -> Result<&Entry, EvalError> {
        self.entries
            .get(index)
            .ok_or(EvalError::UnboundVariable { index })
    }
}

impl VariableResolver for MatrixStore {
    /// Plain matrices and collection members.
    fn resolve_read_index(&mut self, name: &str) -> Option<usize> {
        let i = self.entry_index(name)?;
        matches!(
            self.entries[i].kind,
            EntryKind::Matrix | EntryKind::Member { .. }
        )
        .then_some(i)
    }

    /// Matrix arrays and collections; anything else falls back to a read.
    fn resolve_array_index(&mut self, name: &str) -> Option<usize> {
        let i = self.entry_index(name)?;
        match self.entries[i].kind {
            EntryKind::Array | EntryKind::Collection => Some(i),
            _ => self.resolve_read_index(name),
        }
    }

    fn resolve_assign_index(&mut self, _name: &str) -> Option<usize> {
        None
    }
}

impl VariableTable<(usize, usize)> for MatrixStore {
    fn read(&self, index: usize, ctx: &(usize, usize)) -> Result<f64, EvalError> {
        let entry = self.entry(index)?;
        match (entry.kind, entry.matrices.first()) {
            (EntryKind::Matrix | EntryKind::Member { .. }, Some(&m)) => {
                let (row, col) = entry.orientation.cell(ctx.0, ctx.1);
                self.matrices[m].cell(row, col)
            }
            _ => Err(EvalError::UnboundVariable { index }),
        }
    }

    fn read_indexed(
        &self,
        index: usize,
        subscript: f64,
        ctx: &(usize, usize),
    ) -> Result<f64, EvalError> {
        let entry = self.entry(index)?;
        if !matches!(entry.kind, EntryKind::Array | EntryKind::Collection) {
            return Err(EvalError::NotSubscriptable {
                variable: entry.name.clone(),
            });
        }
        let k = subscript_position(subscript, entry.matrices.len()).ok_or_else(|| {
            EvalError::SubscriptOutOfRange {
                variable: entry.name.clone(),
                subscript,
            }
        })?;
        let (row, col) = entry.orientation.cell(ctx.0, ctx.1);
        self.matrices[entry.matrices[k]].cell(row, col)
    }

    fn write(&mut self, index: usize, _value: f64, _ctx: &(usize, usize)) -> Result<(), EvalError> {
        Err(EvalError::ReadOnly {
            variable: self.entry(index)?.name.clone(),
        })
    }
}
