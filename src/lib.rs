//! uec-expr - compiled utility expressions for travel-demand models
//!
//! Formulas such as utility terms and link performance functions are written
//! in a small arithmetic language, compiled once into a flat instruction
//! stream and evaluated many times against scalars, zone, household and
//! alternative tables, zone-by-zone matrices and decision-maker objects.
//!
//! # Features
//!
//! - Precedence-climbing compiler with `NAME[k]` matrix subscripts
//! - Allocation-free evaluator, shareable across threads
//! - Pluggable variable tables through [`variables::VariableResolver`] and
//!   [`variables::VariableTable`]
//! - Optional step-by-step evaluation trace
//! - Utility expression calculator over YAML model files
//!
//! # Example
//!
//! ```no_run
//! use uec_expr::core::ModelCalculator;
//! use uec_expr::parser::parse_model;
//! use uec_expr::variables::EvalContext;
//! use std::path::Path;
//!
//! let model = parse_model(Path::new("mode_choice.yaml"))?;
//! let mut prepared = ModelCalculator::new(model).prepare()?;
//!
//! let results = prepared.run(&EvalContext::new().with_zones(1, 2).with_household(0))?;
//! for utility in &results.utilities {
//!     println!("{}: {:?}", utility.name, utility.utilities);
//! }
//! # Ok::<(), uec_expr::error::UecError>(())
//! ```

pub mod cli;
pub mod core;
pub mod error;
pub mod parser;
pub mod types;
pub mod variables;

// Re-export commonly used types
pub use crate::core::{compile, Expression, ModelCalculator, Uec};
pub use error::{EvalError, SyntaxError, UecError, UecResult};
pub use types::{UecModel, UtilitySpec, VariableBinding, VariableCategory};
