use crate::core::expression::tokenizer;
use crate::error::{UecError, UecResult};
use crate::types::{TableSpec, UecModel};
use std::collections::HashSet;
use std::path::Path;

/// Parse a UEC model file.
///
/// The file is YAML with optional sections for scalars, zone, household and
/// alternative tables, matrices, matrix arrays, matrix collections, named
/// formulas and utility specifications. Structural problems (ragged tables,
/// duplicate utility names, bad formula names) are reported here; expressions
/// are only compiled later by the calculator.
///
/// # Arguments
/// * `path` - Path to the model YAML file
///
/// # Returns
/// * `Ok(UecModel)` - Successfully parsed model
/// * `Err(UecError)` - IO, YAML or validation error
///
/// # Example
/// ```no_run
/// use uec_expr::parser::parse_model;
/// use std::path::Path;
///
/// let model = parse_model(Path::new("mode_choice.yaml"))?;
/// println!("Utilities: {}", model.utilities.len());
/// # Ok::<(), uec_expr::error::UecError>(())
/// ```
pub fn parse_model(path: &Path) -> UecResult<UecModel> {
    let content = std::fs::read_to_string(path)?;
    parse_model_str(&content)
}

/// Parse a model from YAML text.
pub fn parse_model_str(content: &str) -> UecResult<UecModel> {
    let model: UecModel = serde_yaml::from_str(content)?;
    validate_model(&model)?;
    Ok(model)
}

fn validate_model(model: &UecModel) -> UecResult<()> {
    for (section, table) in [
        ("zones", &model.zones),
        ("households", &model.households),
        ("alternatives", &model.alternatives),
    ] {
        if let Some(table) = table {
            validate_table(section, table)?;
        }
    }

    for name in model.formulas.keys() {
        validate_name("Formula", name)?;
    }

    let mut seen = HashSet::new();
    for utility in &model.utilities {
        validate_name("Utility", &utility.name)?;
        if !seen.insert(utility.name.as_str()) {
            return Err(UecError::Validation(format!(
                "Utility '{}' is defined more than once",
                utility.name
            )));
        }
    }

    Ok(())
}

fn validate_table(section: &str, table: &TableSpec) -> UecResult<()> {
    table
        .validate_lengths()
        .map(|_| ())
        .map_err(|e| UecError::Validation(format!("Table '{section}': {e}")))
}

/// Names must be usable as assignment targets.
fn validate_name(kind: &str, name: &str) -> UecResult<()> {
    let starts_ok = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    if !starts_ok || name.bytes().any(tokenizer::is_delimiter) || name.contains(&['[', ']'][..]) {
        return Err(UecError::Validation(format!(
            "{kind} name '{name}' must start with a letter and contain no operators or spaces"
        )));
    }
    Ok(())
}
