use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uec_expr::cli;
use uec_expr::error::UecResult;

#[derive(Parser)]
#[command(name = "uec")]
#[command(about = "Compile and evaluate utility expressions.")]
#[command(long_about = "uec - utility expression calculator

Expressions are compiled once into a flat instruction stream and evaluated
against scalars, zone/household/alternative tables and zone matrices.

COMMANDS:
  eval     - Evaluate one expression
  compile  - Show the instruction listing of an expression
  run      - Evaluate the formulas and utilities of a model file
  check    - Compile every formula and utility row of model files

EXAMPLES:
  uec eval \"2+3*4\"
  uec eval \"time = ivt * 1.5\" --set ivt=12 --trace
  uec compile \"if(x>0, ln(x), 0)\" --set x=1
  uec run mode_choice.yaml --orig 1 --dest 2 --household 0
  uec check models/*.yaml")]
#[command(version)]
struct Cli {
    /// Log compilation and evaluation details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one expression
    Eval {
        /// Expression text, e.g. "x = a * 2 + 1"
        #[arg(allow_hyphen_values = true)]
        expression: String,

        /// Scalar value available to the expression (repeatable)
        #[arg(short, long = "set", value_name = "NAME=VALUE", value_parser = cli::parse_assignment)]
        set: Vec<(String, f64)>,

        /// Print every evaluation step
        #[arg(short, long)]
        trace: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the instruction listing of an expression
    Compile {
        /// Expression text
        #[arg(allow_hyphen_values = true)]
        expression: String,

        /// Scalar name the expression may reference (repeatable)
        #[arg(short, long = "set", value_name = "NAME=VALUE", value_parser = cli::parse_assignment)]
        set: Vec<(String, f64)>,

        /// Print the program as JSON
        #[arg(long)]
        json: bool,
    },

    #[command(long_about = "Evaluate a model file at one set of coordinates.

Formulas are evaluated in dependency order, then every utility is computed
for each of its alternatives.

Zones are numbered from 1; households are 0-based rows of the households
table. Coordinates can also come from UEC_ORIG, UEC_DEST and UEC_HOUSEHOLD.")]
    /// Evaluate the formulas and utilities of a model file
    Run {
        /// Path to model YAML file
        file: PathBuf,

        /// Origin zone (1-based)
        #[arg(long, env = "UEC_ORIG")]
        orig: Option<usize>,

        /// Destination zone (1-based)
        #[arg(long, env = "UEC_DEST")]
        dest: Option<usize>,

        /// Household row (0-based)
        #[arg(long, env = "UEC_HOUSEHOLD")]
        household: Option<usize>,

        /// Print every evaluation step
        #[arg(short, long)]
        trace: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compile every formula and utility row of model files
    Check {
        /// Path to model YAML file(s)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("uec_expr=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("uec_expr=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> UecResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Eval {
            expression,
            set,
            trace,
            json,
        } => cli::eval(expression, set, trace, json),

        Commands::Compile {
            expression,
            set,
            json,
        } => cli::compile(expression, set, json),

        Commands::Run {
            file,
            orig,
            dest,
            household,
            trace,
            json,
        } => cli::run(file, orig, dest, household, trace, json),

        Commands::Check { files } => cli::check(files),
    }
}
