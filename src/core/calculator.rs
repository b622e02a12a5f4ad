use super::expression::{tokenizer, Expression, NoTrace, TraceSink};
use super::uec::Uec;
use crate::error::{UecError, UecResult};
use crate::types::UecModel;
use crate::variables::{EvalContext, ModelVariables};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

/// Model calculator with formula dependency resolution
pub struct ModelCalculator {
    model: UecModel,
}

impl ModelCalculator {
    #[must_use]
    pub fn new(model: UecModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &UecModel {
        &self.model
    }

    /// Load every data source of the model into a variable table.
    pub fn build_variables(&self) -> UecResult<ModelVariables> {
        ModelVariables::from_model(&self.model)
    }

    /// Formula names in evaluation order
    pub fn formula_order(&self) -> UecResult<Vec<String>> {
        let graph = self.build_dependency_graph()?;

        let order = toposort(&graph, None).map_err(|cycle| {
            let name = graph
                .node_weight(cycle.node_id())
                .cloned()
                .unwrap_or_default();
            UecError::CircularDependency(format!("formula '{name}' depends on itself"))
        })?;

        Ok(order
            .into_iter()
            .filter_map(|idx| graph.node_weight(idx).cloned())
            .collect())
    }

    /// Build dependency graph from the names each formula reads
    fn build_dependency_graph(&self) -> UecResult<DiGraph<String, ()>> {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();

        for name in self.model.formulas.keys() {
            let idx = graph.add_node(name.clone());
            node_indices.insert(name.as_str(), idx);
        }

        for (name, formula) in &self.model.formulas {
            let deps =
                tokenizer::variable_names(formula).map_err(|e| UecError::syntax(formula, e))?;
            for dep in deps {
                if let (Some(&from_idx), Some(&to_idx)) =
                    (node_indices.get(dep.as_str()), node_indices.get(name.as_str()))
                {
                    graph.add_edge(from_idx, to_idx, ());
                }
            }
        }

        Ok(graph)
    }

    /// Compile formulas and utilities against a fresh variable table.
    pub fn prepare(&self) -> UecResult<PreparedModel> {
        let mut variables = self.build_variables()?;
        let order = self.formula_order()?;

        let mut formulas = Vec::with_capacity(order.len());
        for name in order {
            let expression = self.compile_formula(&name, &mut variables)?;
            formulas.push((name, expression));
        }

        let utilities = self
            .model
            .utilities
            .iter()
            .map(|spec| Uec::compile(spec, &mut variables))
            .collect::<UecResult<Vec<_>>>()?;

        info!(
            formulas = formulas.len(),
            utilities = utilities.len(),
            "model prepared"
        );

        Ok(PreparedModel {
            variables,
            formulas,
            utilities,
        })
    }

    /// Compile everything, collecting every problem instead of stopping at
    /// the first one.
    pub fn check(&self) -> Vec<UecError> {
        let mut problems = Vec::new();

        let mut variables = match self.build_variables() {
            Ok(variables) => variables,
            Err(e) => return vec![e],
        };

        match self.formula_order() {
            Ok(order) => {
                for name in order {
                    if let Err(e) = self.compile_formula(&name, &mut variables) {
                        problems.push(e);
                    }
                }
            }
            Err(e) => problems.push(e),
        }

        for spec in &self.model.utilities {
            if let Err(e) = Uec::compile(spec, &mut variables) {
                problems.push(e);
            }
        }

        problems
    }

    fn compile_formula(&self, name: &str, variables: &mut ModelVariables) -> UecResult<Expression> {
        let formula = self.model.formulas.get(name).map_or("", String::as_str);
        let text = format!("{name} = {formula}");
        Expression::compile(text.as_str(), variables).map_err(|e| UecError::syntax(text, e))
    }
}

/// A compiled model ready to run at any coordinates.
pub struct PreparedModel {
    variables: ModelVariables,
    formulas: Vec<(String, Expression)>,
    utilities: Vec<Uec>,
}

impl PreparedModel {
    pub fn variables(&self) -> &ModelVariables {
        &self.variables
    }

    pub fn formulas(&self) -> impl Iterator<Item = (&str, &Expression)> + '_ {
        self.formulas.iter().map(|(n, e)| (n.as_str(), e))
    }

    pub fn utilities(&self) -> &[Uec] {
        &self.utilities
    }

    /// Evaluate formulas in dependency order, then every utility.
    pub fn run(&mut self, ctx: &EvalContext<'_>) -> UecResult<ModelResults> {
        self.run_traced(ctx, &mut NoTrace)
    }

    pub fn run_traced<S>(&mut self, ctx: &EvalContext<'_>, sink: &mut S) -> UecResult<ModelResults>
    where
        S: TraceSink + ?Sized,
    {
        let mut results = ModelResults::default();

        for (name, expression) in &self.formulas {
            let value = expression
                .solve_traced(&mut self.variables, ctx, sink)
                .map_err(|e| UecError::eval(expression.text(), e))?;
            results.formulas.insert(name.clone(), value);
        }

        for uec in &self.utilities {
            let mut utilities = vec![0.0; uec.alternatives().len()];
            uec.solve_traced(&mut self.variables, ctx, &mut utilities, sink)?;
            results.utilities.push(UtilityResult {
                name: uec.name().to_string(),
                alternatives: uec.alternatives().to_vec(),
                utilities,
            });
        }

        info!(
            orig = ?ctx.orig,
            dest = ?ctx.dest,
            household = ?ctx.household,
            utilities = results.utilities.len(),
            "model run complete"
        );

        Ok(results)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelResults {
    pub formulas: BTreeMap<String, f64>,
    pub utilities: Vec<UtilityResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UtilityResult {
    pub name: String,
    pub alternatives: Vec<String>,
    pub utilities: Vec<f64>,
}
