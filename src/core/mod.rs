//! Expression engine, utility calculator and model calculator

pub mod calculator;
pub mod expression;
pub mod uec;

pub use calculator::{ModelCalculator, ModelResults, PreparedModel, UtilityResult};
pub use expression::{compile, Expression};
pub use uec::{AlternativeContext, Uec};
