//! Composite variable table for a whole model
//!
//! [`ModelVariables`] owns every backing store a model can reference and
//! hands out one index per [`VariableBinding`]. Names resolve in this order:
//!
//! 1. `$orig`, `$dest`, `$alt`, `$hh` loop variables
//! 2. `@name` / `@@name` object accessors
//! 3. scalars
//! 4. zone columns (`orig.name`, `dest.name`, bare `name` reads at the origin)
//! 5. household columns
//! 6. alternative columns
//! 7. matrices and collection members
//!
//! Matrix arrays and whole collections only resolve as the first argument of
//! `array()` (or the `NAME[k]` shorthand).

use super::matrix::{EntryKind, Matrix, MatrixStore};
use super::object::ObjectAccessors;
use super::scalar::ScalarTable;
use super::table::DataTable;
use super::{VariableResolver, VariableTable};
use crate::error::{EvalError, UecResult};
use crate::types::{Orientation, UecModel, VariableBinding, VariableCategory};
use std::collections::HashMap;
use std::fmt;

const INTERNAL: [&str; 4] = ["$orig", "$dest", "$alt", "$hh"];

/// Where the current evaluation is: trip zones, household row, alternative
/// and decision-maker. Owned by the caller and passed to every evaluation.
pub struct EvalContext<'a, O = ()> {
    /// 1-based origin zone
    pub orig: Option<usize>,
    /// 1-based destination zone
    pub dest: Option<usize>,
    /// 0-based household row
    pub household: Option<usize>,
    /// 1-based alternative, 0 when no alternative is selected
    pub alternative: usize,
    pub object: Option<&'a O>,
}

impl<'a, O> EvalContext<'a, O> {
    pub fn new() -> Self {
        Self {
            orig: None,
            dest: None,
            household: None,
            alternative: 0,
            object: None,
        }
    }

    pub fn with_zones(mut self, orig: usize, dest: usize) -> Self {
        self.orig = Some(orig);
        self.dest = Some(dest);
        self
    }

    pub fn with_origin(mut self, orig: usize) -> Self {
        self.orig = Some(orig);
        self
    }

    pub fn with_destination(mut self, dest: usize) -> Self {
        self.dest = Some(dest);
        self
    }

    pub fn with_household(mut self, household: usize) -> Self {
        self.household = Some(household);
        self
    }

    pub fn with_alternative(mut self, alternative: usize) -> Self {
        self.alternative = alternative;
        self
    }

    pub fn with_object(mut self, object: &'a O) -> Self {
        self.object = Some(object);
        self
    }
}

impl<O> Default for EvalContext<'_, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> Clone for EvalContext<'_, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<O> Copy for EvalContext<'_, O> {}

impl<O> fmt::Debug for EvalContext<'_, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalContext")
            .field("orig", &self.orig)
            .field("dest", &self.dest)
            .field("household", &self.household)
            .field("alternative", &self.alternative)
            .field("object", &self.object.is_some())
            .finish()
    }
}

/// Every data source of a model behind one [`VariableTable`].
pub struct ModelVariables<O = ()> {
    scalars: ScalarTable,
    zones: DataTable,
    households: DataTable,
    alternatives: DataTable,
    matrices: MatrixStore,
    objects: ObjectAccessors<O>,
    bindings: Vec<VariableBinding>,
    /// `(name, array position)` to binding index
    resolved: HashMap<(String, bool), usize>,
}

impl<O> Default for ModelVariables<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> ModelVariables<O> {
    pub fn new() -> Self {
        Self {
            scalars: ScalarTable::new(),
            zones: DataTable::new(),
            households: DataTable::new(),
            alternatives: DataTable::new(),
            matrices: MatrixStore::new(),
            objects: ObjectAccessors::new(),
            bindings: Vec::new(),
            resolved: HashMap::new(),
        }
    }

    /// Load every data source declared in a model file.
    pub fn from_model(model: &UecModel) -> UecResult<Self> {
        let mut vars = Self::new();
        for (name, value) in &model.scalars {
            vars.scalars.set(name, *value);
        }
        if let Some(spec) = &model.zones {
            vars.zones = DataTable::from_spec(spec)?;
        }
        if let Some(spec) = &model.households {
            vars.households = DataTable::from_spec(spec)?;
        }
        if let Some(spec) = &model.alternatives {
            vars.alternatives = DataTable::from_spec(spec)?;
        }
        for spec in &model.matrices {
            vars.matrices
                .add_matrix(Matrix::from_spec(spec)?, spec.orientation)?;
        }
        for group in &model.matrix_arrays {
            let members = group
                .members
                .iter()
                .map(Matrix::from_spec)
                .collect::<UecResult<Vec<_>>>()?;
            vars.matrices
                .add_array(&group.name, members, group.orientation)?;
        }
        for group in &model.matrix_collections {
            let members = group
                .members
                .iter()
                .map(Matrix::from_spec)
                .collect::<UecResult<Vec<_>>>()?;
            vars.matrices
                .add_collection(&group.name, members, group.orientation)?;
        }
        Ok(vars)
    }

    pub fn with_objects(mut self, objects: ObjectAccessors<O>) -> Self {
        self.objects = objects;
        self
    }

    pub fn set_scalar(&mut self, name: &str, value: f64) -> usize {
        self.scalars.set(name, value)
    }

    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.scalars.get(name)
    }

    pub fn scalars(&self) -> &ScalarTable {
        &self.scalars
    }

    pub fn add_zone_column(&mut self, name: &str, values: Vec<f64>) -> UecResult<usize> {
        self.zones.add_column(name, values)
    }

    pub fn add_household_column(&mut self, name: &str, values: Vec<f64>) -> UecResult<usize> {
        self.households.add_column(name, values)
    }

    pub fn add_alternative_column(&mut self, name: &str, values: Vec<f64>) -> UecResult<usize> {
        self.alternatives.add_column(name, values)
    }

    pub fn zones(&self) -> &DataTable {
        &self.zones
    }

    pub fn households(&self) -> &DataTable {
        &self.households
    }

    pub fn alternatives(&self) -> &DataTable {
        &self.alternatives
    }

    pub fn matrices(&self) -> &MatrixStore {
        &self.matrices
    }

    pub fn matrices_mut(&mut self) -> &mut MatrixStore {
        &mut self.matrices
    }

    pub fn objects_mut(&mut self) -> &mut ObjectAccessors<O> {
        &mut self.objects
    }

    /// Every binding handed out so far, indexed as in compiled programs.
    pub fn bindings(&self) -> &[VariableBinding] {
        &self.bindings
    }

    pub fn binding(&self, index: usize) -> Option<&VariableBinding> {
        self.bindings.get(index)
    }

    fn bind(&mut self, key: (String, bool), binding: VariableBinding) -> usize {
        let i = self.bindings.len();
        self.bindings.push(binding);
        self.resolved.insert(key, i);
        i
    }

    fn lookup(&mut self, name: &str) -> Option<VariableBinding> {
        use VariableCategory as Cat;

        if name.starts_with('$') {
            let slot = INTERNAL.iter().position(|n| *n == name)?;
            return Some(VariableBinding::new(name, Cat::Internal, slot));
        }
        if let Some(rest) = name.strip_prefix("@@") {
            let i = self.objects.index_of(rest)?;
            return Some(VariableBinding::new(name, Cat::Object, i).with_fixed_alternative(0));
        }
        if let Some(rest) = name.strip_prefix('@') {
            let i = self.objects.index_of(rest)?;
            return Some(VariableBinding::new(name, Cat::Object, i));
        }
        if let Some(i) = self.scalars.index_of(name) {
            return Some(VariableBinding::new(name, Cat::Scalar, i));
        }

        let (column, orientation) = if let Some(rest) = name.strip_prefix("orig.") {
            (rest, Orientation::OrigDest)
        } else if let Some(rest) = name.strip_prefix("dest.") {
            (rest, Orientation::DestOrig)
        } else {
            (name, Orientation::OrigDest)
        };
        if let Some(i) = self.zones.column_index(column) {
            return Some(VariableBinding::new(name, Cat::Zone, i).with_orientation(orientation));
        }

        if let Some(i) = self.households.column_index(name) {
            return Some(VariableBinding::new(name, Cat::Household, i));
        }
        if let Some(i) = self.alternatives.column_index(name) {
            return Some(VariableBinding::new(name, Cat::Alternative, i));
        }

        let entry = self.matrices.resolve_read_index(name)?;
        self.matrix_binding(name, entry)
    }

    fn matrix_binding(&self, name: &str, entry: usize) -> Option<VariableBinding> {
        let orientation = self.matrices.orientation(entry)?;
        let binding = match self.matrices.kind(entry)? {
            EntryKind::Matrix => VariableBinding::new(name, VariableCategory::Matrix, entry),
            EntryKind::Member { member, .. } => {
                VariableBinding::new(name, VariableCategory::MatrixCollection, entry)
                    .with_member(member)
            }
            EntryKind::Array => VariableBinding::new(name, VariableCategory::MatrixArray, entry),
            EntryKind::Collection => {
                VariableBinding::new(name, VariableCategory::MatrixCollection, entry)
            }
        };
        Some(binding.with_orientation(orientation))
    }

    fn binding_at(&self, index: usize) -> Result<&VariableBinding, EvalError> {
        self.bindings
            .get(index)
            .ok_or(EvalError::UnboundVariable { index })
    }

    /// Data row for a zone column, from the 1-based zone in the context.
    fn zone_row(binding: &VariableBinding, ctx: &EvalContext<'_, O>) -> Result<usize, EvalError> {
        let (zone, what) = match binding.orientation {
            Some(Orientation::DestOrig) => (ctx.dest, "a destination zone"),
            _ => (ctx.orig, "an origin zone"),
        };
        let zone = zone.ok_or_else(|| EvalError::MissingContext {
            variable: binding.name.clone(),
            what,
        })?;
        zone.checked_sub(1).ok_or_else(|| EvalError::CellOutOfRange {
            variable: binding.name.clone(),
            detail: "zone numbers start at 1".to_string(),
        })
    }

    fn household_row(
        binding: &VariableBinding,
        ctx: &EvalContext<'_, O>,
    ) -> Result<usize, EvalError> {
        ctx.household.ok_or_else(|| EvalError::MissingContext {
            variable: binding.name.clone(),
            what: "a household",
        })
    }

    fn alternative_row(
        binding: &VariableBinding,
        ctx: &EvalContext<'_, O>,
    ) -> Result<usize, EvalError> {
        ctx.alternative
            .checked_sub(1)
            .ok_or_else(|| EvalError::MissingContext {
                variable: binding.name.clone(),
                what: "an alternative",
            })
    }

    fn trip(binding: &VariableBinding, ctx: &EvalContext<'_, O>) -> Result<(usize, usize), EvalError> {
        match (ctx.orig, ctx.dest) {
            (Some(orig), Some(dest)) => Ok((orig, dest)),
            _ => Err(EvalError::MissingContext {
                variable: binding.name.clone(),
                what: "origin and destination zones",
            }),
        }
    }
}

impl<O> VariableResolver for ModelVariables<O> {
    fn resolve_read_index(&mut self, name: &str) -> Option<usize> {
        let key = (name.to_string(), false);
        if let Some(&i) = self.resolved.get(&key) {
            return Some(i);
        }
        let binding = self.lookup(name)?;
        Some(self.bind(key, binding))
    }

    fn resolve_array_index(&mut self, name: &str) -> Option<usize> {
        let key = (name.to_string(), true);
        if let Some(&i) = self.resolved.get(&key) {
            return Some(i);
        }
        match self.matrices.resolve_array_index(name) {
            Some(entry)
                if matches!(
                    self.matrices.kind(entry),
                    Some(EntryKind::Array | EntryKind::Collection)
                ) =>
            {
                let binding = self.matrix_binding(name, entry)?;
                Some(self.bind(key, binding))
            }
            _ => self.resolve_read_index(name),
        }
    }

    /// Writable bindings are reused; unknown names become new scalars.
    /// Matrix names are never reallocated as scalars.
    fn resolve_assign_index(&mut self, name: &str) -> Option<usize> {
        if let Some(i) = self.resolve_read_index(name) {
            return self.bindings[i].is_writable().then_some(i);
        }
        if name.starts_with(&['$', '@'][..])
            || name.contains('.')
            || self.matrices.entry_index(name).is_some()
        {
            return None;
        }
        let slot = self.scalars.resolve_assign_index(name)?;
        let binding = VariableBinding::new(name, VariableCategory::Scalar, slot);
        Some(self.bind((name.to_string(), false), binding))
    }
}

impl<'a, O> VariableTable<EvalContext<'a, O>> for ModelVariables<O> {
    fn read(&self, index: usize, ctx: &EvalContext<'a, O>) -> Result<f64, EvalError> {
        let b = self.binding_at(index)?;
        match b.category {
            VariableCategory::Scalar => self.scalars.read(b.index, &()),
            VariableCategory::Zone => self.zones.read(b.index, &Self::zone_row(b, ctx)?),
            VariableCategory::Household => {
                self.households.read(b.index, &Self::household_row(b, ctx)?)
            }
            VariableCategory::Alternative => {
                self.alternatives.read(b.index, &Self::alternative_row(b, ctx)?)
            }
            VariableCategory::Matrix
            | VariableCategory::MatrixArray
            | VariableCategory::MatrixCollection => {
                self.matrices.read(b.index, &Self::trip(b, ctx)?)
            }
            VariableCategory::Object => {
                let object = ctx.object.ok_or_else(|| EvalError::MissingContext {
                    variable: b.name.clone(),
                    what: "a decision-maker",
                })?;
                let alternative = b.fixed_alternative.unwrap_or(ctx.alternative);
                self.objects
                    .call(b.index, object, alternative)
                    .ok_or(EvalError::UnboundVariable { index })
            }
            VariableCategory::Internal => {
                let value = match b.index {
                    0 => ctx.orig,
                    1 => ctx.dest,
                    2 => Some(ctx.alternative),
                    _ => ctx.household,
                };
                value.map(|v| v as f64).ok_or_else(|| EvalError::MissingContext {
                    variable: b.name.clone(),
                    what: "a value for this loop variable",
                })
            }
        }
    }

    fn read_indexed(
        &self,
        index: usize,
        subscript: f64,
        ctx: &EvalContext<'a, O>,
    ) -> Result<f64, EvalError> {
        let b = self.binding_at(index)?;
        match b.category {
            VariableCategory::Matrix
            | VariableCategory::MatrixArray
            | VariableCategory::MatrixCollection => {
                self.matrices
                    .read_indexed(b.index, subscript, &Self::trip(b, ctx)?)
            }
            _ => Err(EvalError::NotSubscriptable {
                variable: b.name.clone(),
            }),
        }
    }

    fn write(&mut self, index: usize, value: f64, ctx: &EvalContext<'a, O>) -> Result<(), EvalError> {
        let b = self.binding_at(index)?;
        let (category, column) = (b.category, b.index);
        let row = match category {
            VariableCategory::Scalar => 0,
            VariableCategory::Zone => Self::zone_row(b, ctx)?,
            VariableCategory::Household => Self::household_row(b, ctx)?,
            VariableCategory::Alternative => Self::alternative_row(b, ctx)?,
            _ => {
                return Err(EvalError::ReadOnly {
                    variable: b.name.clone(),
                })
            }
        };
        match category {
            VariableCategory::Zone => self.zones.write(column, value, &row),
            VariableCategory::Household => self.households.write(column, value, &row),
            VariableCategory::Alternative => self.alternatives.write(column, value, &row),
            _ => self.scalars.write(column, value, &()),
        }
    }
}
