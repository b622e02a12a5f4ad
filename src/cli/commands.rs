use crate::core::calculator::{ModelCalculator, ModelResults};
use crate::core::expression::{Expression, LogTrace, Program, TextTrace};
use crate::error::{UecError, UecResult};
use crate::parser;
use crate::variables::{EvalContext, ScalarTable};
use anyhow::Context;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

/// Format a number for display, removing unnecessary decimal places
fn format_number(n: f64) -> String {
    if !n.is_finite() {
        return n.to_string();
    }
    if n.abs() >= 1e15 {
        return format!("{n:e}");
    }
    let rounded = (n * 1e6).round() / 1e6;
    format!("{:.6}", rounded)
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Parse a `name=value` pair given to `--set`.
pub fn parse_assignment(s: &str) -> anyhow::Result<(String, f64)> {
    let (name, value) = s
        .split_once('=')
        .with_context(|| format!("expected name=value, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("missing variable name in '{s}'");
    }
    let value: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("invalid number for '{name}'"))?;
    Ok((name.to_string(), value))
}

fn scalar_table(set: &[(String, f64)]) -> ScalarTable {
    let mut table = ScalarTable::new();
    for (name, value) in set {
        table.set(name, *value);
    }
    table
}

fn print_json<T: Serialize>(value: &T) -> UecResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct EvalOutput<'a> {
    expression: &'a str,
    value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    assigned: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    trace: Vec<String>,
}

/// Execute the eval command
pub fn eval(expression: String, set: Vec<(String, f64)>, trace: bool, json: bool) -> UecResult<()> {
    let mut table = scalar_table(&set);
    let compiled = Expression::compile(expression.as_str(), &mut table)
        .map_err(|e| UecError::syntax(&expression, e))?;

    let mut sink = TextTrace::new();
    let value = if trace {
        compiled.solve_traced(&mut table, &(), &mut sink)
    } else {
        compiled.solve_traced(&mut table, &(), &mut LogTrace::new(expression.as_str()))
    }
    .map_err(|e| UecError::eval(&expression, e))?;

    let assigned = compiled.target().and_then(|i| table.name(i));

    if json {
        return print_json(&EvalOutput {
            expression: &expression,
            value,
            assigned,
            trace: sink.into_lines(),
        });
    }

    if trace {
        println!("{}", "Trace:".bold().cyan());
        for line in sink.lines() {
            println!("   {line}");
        }
        println!();
    }
    match assigned {
        Some(name) => println!(
            "{} = {}",
            name.bright_blue(),
            format_number(value).bold().green()
        ),
        None => println!("{}", format_number(value).bold().green()),
    }
    Ok(())
}

#[derive(Serialize)]
struct CompileOutput<'a> {
    expression: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a str>,
    program: &'a Program,
}

/// Execute the compile command - show the instruction listing
pub fn compile(expression: String, set: Vec<(String, f64)>, json: bool) -> UecResult<()> {
    let mut table = scalar_table(&set);
    let compiled = Expression::compile(expression.as_str(), &mut table)
        .map_err(|e| UecError::syntax(&expression, e))?;
    let Some(program) = compiled.program() else {
        return Err(UecError::Validation(format!(
            "'{expression}' did not compile"
        )));
    };
    let target = compiled.target().and_then(|i| table.name(i));

    if json {
        return print_json(&CompileOutput {
            expression: &expression,
            target,
            program,
        });
    }

    println!("{}", "Compiled expression".bold().green());
    println!("   Text: {}", expression.bright_yellow());
    if let Some(name) = target {
        println!("   Assigns: {}", name.bright_blue());
    }
    println!("   Instructions: {}\n", program.len());
    print!("{program}");
    Ok(())
}

/// Execute the run command - evaluate a model at one set of coordinates
pub fn run(
    file: PathBuf,
    orig: Option<usize>,
    dest: Option<usize>,
    household: Option<usize>,
    trace: bool,
    json: bool,
) -> UecResult<()> {
    let model = parser::parse_model(&file)?;
    let mut prepared = ModelCalculator::new(model).prepare()?;

    let ctx = EvalContext {
        orig,
        dest,
        household,
        ..EvalContext::new()
    };

    let mut sink = TextTrace::new();
    let results = if trace {
        prepared.run_traced(&ctx, &mut sink)?
    } else {
        prepared.run_traced(&ctx, &mut LogTrace::new(file.display().to_string()))?
    };

    if json {
        return print_json(&results);
    }

    println!("{}", "UEC - Model results".bold().green());
    println!("   File: {}", file.display());
    if let (Some(o), Some(d)) = (orig, dest) {
        println!("   Trip: {} -> {}", o, d);
    }
    if let Some(h) = household {
        println!("   Household: {h}");
    }
    println!();

    if trace {
        println!("{}", "Trace:".bold().cyan());
        for line in sink.lines() {
            println!("   {line}");
        }
        println!();
    }

    print_results(&results);
    Ok(())
}

fn print_results(results: &ModelResults) {
    if !results.formulas.is_empty() {
        println!("{}", "Formulas:".bold().cyan());
        for (name, value) in &results.formulas {
            println!(
                "   {} = {}",
                name.bright_blue(),
                format_number(*value).bold()
            );
        }
        println!();
    }

    for utility in &results.utilities {
        println!("{} {}", "Utility:".bold().cyan(), utility.name.bright_blue().bold());
        for (alternative, value) in utility.alternatives.iter().zip(&utility.utilities) {
            println!("   {:<16} {}", alternative, format_number(*value).bold().green());
        }
        println!();
    }
}

/// Execute the check command - compile every formula and utility row
pub fn check(files: Vec<PathBuf>) -> UecResult<()> {
    let mut failed = 0;

    for file in &files {
        println!("{} {}", "Checking".bold().green(), file.display());

        let model = match parser::parse_model(file) {
            Ok(model) => model,
            Err(e) => {
                println!("   {} {}", "error:".bold().red(), e);
                failed += 1;
                continue;
            }
        };

        let formulas = model.formulas.len();
        let rows: usize = model.utilities.iter().map(|u| u.rows.len()).sum();
        let problems = ModelCalculator::new(model).check();

        if problems.is_empty() {
            println!(
                "   {} {} formulas, {} utility rows",
                "ok".bold().green(),
                formulas,
                rows
            );
        } else {
            for problem in &problems {
                println!("   {} {}", "error:".bold().red(), problem);
            }
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(UecError::Validation(format!(
            "{failed} of {} model file(s) failed to check",
            files.len()
        )));
    }
    Ok(())
}
