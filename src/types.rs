use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

//==============================================================================
// Variable Bindings
//==============================================================================

/// Backing store a resolved name reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableCategory {
    Scalar,
    /// Zone data column, read at the origin or destination zone
    Zone,
    /// Household data column, read at the current household row
    Household,
    /// Alternative data column, read at the current alternative
    Alternative,
    Matrix,
    /// Numbered group of matrices, only readable through a subscript
    MatrixArray,
    /// Member of a matrix collection, or the collection itself when subscripted
    MatrixCollection,
    /// `@name` / `@@name` accessor on the decision-maker object
    Object,
    /// Loop variable (`$orig`, `$dest`, `$alt`, `$hh`)
    Internal,
}

/// Which context zone indexes the rows of a matrix.
///
/// `od` reads `matrix[orig][dest]`, `do` reads `matrix[dest][orig]`.
/// Zone columns reuse it to pick their end of the trip: `od` reads at the
/// origin zone, `do` at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    #[serde(rename = "od")]
    OrigDest,
    #[serde(rename = "do")]
    DestOrig,
}

impl Orientation {
    /// Row and column zone for a trip from `orig` to `dest`.
    pub fn cell(self, orig: usize, dest: usize) -> (usize, usize) {
        match self {
            Orientation::OrigDest => (orig, dest),
            Orientation::DestOrig => (dest, orig),
        }
    }
}

/// A name resolved against a composite variable table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableBinding {
    pub name: String,
    pub category: VariableCategory,
    /// Index inside the backend for `category`
    pub index: usize,
    pub orientation: Option<Orientation>,
    /// 1-based member position for collection members
    pub member: Option<usize>,
    /// Alternative passed to an object accessor; `None` means the current one
    pub fixed_alternative: Option<usize>,
}

impl VariableBinding {
    pub fn new(name: impl Into<String>, category: VariableCategory, index: usize) -> Self {
        Self {
            name: name.into(),
            category,
            index,
            orientation: None,
            member: None,
            fixed_alternative: None,
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn with_member(mut self, member: usize) -> Self {
        self.member = Some(member);
        self
    }

    pub fn with_fixed_alternative(mut self, alternative: usize) -> Self {
        self.fixed_alternative = Some(alternative);
        self
    }

    /// Whether an assignment may write through this binding.
    pub fn is_writable(&self) -> bool {
        matches!(
            self.category,
            VariableCategory::Scalar
                | VariableCategory::Zone
                | VariableCategory::Household
                | VariableCategory::Alternative
        )
    }
}

//==============================================================================
// Model File
//==============================================================================

/// Columnar data keyed by column name. Every column has one value per row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    #[serde(default)]
    pub columns: BTreeMap<String, Vec<f64>>,
}

impl TableSpec {
    /// Validate all columns have the same length
    pub fn validate_lengths(&self) -> Result<usize, String> {
        let mut rows = None;
        for (name, values) in &self.columns {
            match rows {
                None => rows = Some(values.len()),
                Some(expected) if expected != values.len() => {
                    return Err(format!(
                        "Column '{}' has {} rows, expected {} rows",
                        name,
                        values.len(),
                        expected
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(rows.unwrap_or(0))
    }
}

/// A square zone-by-zone matrix given as rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixSpec {
    pub name: String,
    #[serde(default)]
    pub orientation: Orientation,
    pub values: Vec<Vec<f64>>,
}

/// A named group of matrices (matrix array or collection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixGroupSpec {
    pub name: String,
    #[serde(default)]
    pub orientation: Orientation,
    pub members: Vec<MatrixSpec>,
}

/// One line of a utility specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UtilityRow {
    #[serde(default)]
    pub description: String,
    /// Row is skipped when the filter evaluates to zero or less
    #[serde(default, deserialize_with = "optional_expression_text")]
    pub filter: Option<String>,
    #[serde(deserialize_with = "expression_text")]
    pub expression: String,
    /// One coefficient per alternative; empty for assignment rows
    #[serde(default)]
    pub coefficients: Vec<f64>,
}

/// A utility expression table: rows of expressions times per-alternative
/// coefficients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UtilitySpec {
    pub name: String,
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub rows: Vec<UtilityRow>,
}

/// A model file: data sources plus the formulas and utilities evaluated
/// against them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UecModel {
    #[serde(default)]
    pub scalars: BTreeMap<String, f64>,
    #[serde(default)]
    pub zones: Option<TableSpec>,
    #[serde(default)]
    pub households: Option<TableSpec>,
    #[serde(default)]
    pub alternatives: Option<TableSpec>,
    #[serde(default)]
    pub matrices: Vec<MatrixSpec>,
    #[serde(default)]
    pub matrix_arrays: Vec<MatrixGroupSpec>,
    #[serde(default)]
    pub matrix_collections: Vec<MatrixGroupSpec>,
    /// Assignment formulas, `name: expression`, evaluated in dependency order
    #[serde(default, deserialize_with = "formula_texts")]
    pub formulas: BTreeMap<String, String>,
    #[serde(default)]
    pub utilities: Vec<UtilitySpec>,
}

/// Expression text that YAML may have parsed as a number (`toll: 1.5`).
#[derive(Deserialize)]
#[serde(untagged)]
enum Text {
    Expression(String),
    Number(f64),
}

impl Text {
    fn into_string(self) -> String {
        match self {
            Text::Expression(s) => s,
            Text::Number(n) => n.to_string(),
        }
    }
}

fn expression_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Text::deserialize(deserializer).map(Text::into_string)
}

fn optional_expression_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Text>::deserialize(deserializer).map(|t| t.map(Text::into_string))
}

fn formula_texts<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Text>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(name, text)| (name, text.into_string()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_cell() {
        assert_eq!(Orientation::OrigDest.cell(1, 2), (1, 2));
        assert_eq!(Orientation::DestOrig.cell(1, 2), (2, 1));
        assert_eq!(Orientation::default(), Orientation::OrigDest);
    }

    #[test]
    fn test_table_lengths() {
        let mut table = TableSpec::default();
        assert_eq!(table.validate_lengths(), Ok(0));
        table.columns.insert("a".to_string(), vec![1.0, 2.0]);
        table.columns.insert("b".to_string(), vec![3.0, 4.0]);
        assert_eq!(table.validate_lengths(), Ok(2));
        table.columns.insert("c".to_string(), vec![5.0]);
        let err = table.validate_lengths().unwrap_err();
        assert!(err.contains("'c'"));
    }

    #[test]
    fn test_numeric_formulas_become_text() {
        let model: UecModel = serde_yaml::from_str("formulas:\n  toll: 1.5\n  n: 2\n").unwrap();
        assert_eq!(model.formulas["toll"], "1.5");
        assert_eq!(model.formulas["n"], "2");

        let row: UtilityRow = serde_yaml::from_str("expression: 1\nfilter: 0\n").unwrap();
        assert_eq!(row.expression, "1");
        assert_eq!(row.filter.as_deref(), Some("0"));
    }

    #[test]
    fn test_binding_writability() {
        assert!(VariableBinding::new("x", VariableCategory::Scalar, 0).is_writable());
        assert!(!VariableBinding::new("m", VariableCategory::Matrix, 0).is_writable());
        assert!(!VariableBinding::new("$orig", VariableCategory::Internal, 0).is_writable());
    }
}
