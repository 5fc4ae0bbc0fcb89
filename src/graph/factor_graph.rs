use std::time::Instant;

use log::{debug, info};
use petgraph::{
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
    Direction::Incoming,
};

use crate::{
    message::{edge::EdgeMessages, message::DiscreteMessage},
    planning::planner::UpdatePlanner,
    tables::factor_table::FactorTable,
    update::{
        normal::NormalEngine,
        optimized::OptimizedEngine,
        options::UpdateOptions,
        plan::{UpdateApproach, UpdatePlan},
    },
};

// Shows whether a graph node is a variable or a factor and stores the
// corresponding index
#[derive(Debug)]
pub enum GraphNode {
    Variable(usize),
    Factor(usize),
}

// Stores information about a variable in the factor graph
struct Variable {
    domain_size: usize,
    node: NodeIndex<usize>,
}

// Stores one factor: its sibling-ordered variable scope, its energy table,
// the edges it owns, and the cached update strategy
pub struct FactorNode {
    variables: Vec<usize>,
    table: FactorTable,
    edges: Vec<EdgeMessages>,
    approach: UpdateApproach,
}

// A discrete factor graph together with its message stores and the
// per-iteration driver. Construction and topology live here so the update
// engines can be exercised end to end; scheduling beyond a sequential sweep
// is outside this crate.
pub struct FactorGraph {
    graph: DiGraph<GraphNode, usize, usize>,
    variables: Vec<Variable>,
    factors: Vec<FactorNode>,
    options: UpdateOptions,
    initialized: bool,
}

impl FactorGraph {
    pub fn new(options: UpdateOptions) -> Self {
        FactorGraph {
            graph: DiGraph::with_capacity(0, 0),
            variables: Vec::new(),
            factors: Vec::new(),
            options,
            initialized: false,
        }
    }

    pub fn add_variable(&mut self, domain_size: usize) -> usize {
        assert!(domain_size > 0, "Variable domains must be non-empty.");
        let variable = self.variables.len();
        let node = self.graph.add_node(GraphNode::Variable(variable));
        self.variables.push(Variable { domain_size, node });
        variable
    }

    // Adds a factor over the given variables. Until initialize() runs, the
    // factor updates on the normal engine.
    pub fn add_factor(&mut self, variables: Vec<usize>, table: FactorTable) -> usize {
        assert!(
            variables.windows(2).all(|w| w[0] < w[1]),
            "Variables in a factor must be distinct and sorted in increasing order."
        );
        assert_eq!(
            table.num_dimensions(),
            variables.len(),
            "Factor table dimension count doesn't match the number of variables in its scope."
        );
        for (dimension, variable) in variables.iter().enumerate() {
            assert!(
                *variable < self.variables.len(),
                "Factor scope refers to a variable that doesn't exist."
            );
            assert_eq!(
                table.domain_size(dimension),
                self.variables[*variable].domain_size,
                "Factor table dimension size doesn't match the variable's declared domain size."
            );
        }

        let factor = self.factors.len();
        let node = self.graph.add_node(GraphNode::Factor(factor));
        let mut edges = Vec::with_capacity(variables.len());
        for (position, variable) in variables.iter().enumerate() {
            let mut edge = EdgeMessages::new(self.variables[*variable].domain_size);
            edge.set_damping(self.options.damping());
            edges.push(edge);
            self.graph
                .add_edge(node, self.variables[*variable].node, position);
        }

        self.factors.push(FactorNode {
            variables,
            table,
            edges,
            approach: UpdateApproach::Normal,
        });
        factor
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_factors(&self) -> usize {
        self.factors.len()
    }

    pub fn domain_size(&self, variable: usize) -> usize {
        self.variables[variable].domain_size
    }

    pub fn factor_variables(&self, factor: usize) -> &Vec<usize> {
        &self.factors[factor].variables
    }

    pub fn factor_table(&self, factor: usize) -> &FactorTable {
        &self.factors[factor].table
    }

    pub fn edge(&self, factor: usize, position: usize) -> &EdgeMessages {
        &self.factors[factor].edges[position]
    }

    pub fn edge_mut(&mut self, factor: usize, position: usize) -> &mut EdgeMessages {
        &mut self.factors[factor].edges[position]
    }

    pub fn approach(&self, factor: usize) -> &UpdateApproach {
        &self.factors[factor].approach
    }

    // Returns the cached plan of a factor. Requesting the plan of a factor
    // the planner did not prepare one for is a fatal configuration error.
    pub fn plan(&self, factor: usize) -> &UpdatePlan {
        match &self.factors[factor].approach {
            UpdateApproach::Optimized(plan) => plan,
            UpdateApproach::Normal => panic!(
                "Optimized update requested for factor {}, but no plan was prepared for it.",
                factor
            ),
        }
    }

    // Applies per-edge damping overrides and runs the planner once per
    // factor, caching each factor's update strategy. Runs serially before
    // any update iteration.
    pub fn initialize(&mut self) {
        debug!(
            "In initialize() for a graph with {} variables and {} factors",
            self.variables.len(),
            self.factors.len()
        );

        for (factor, position, value) in self.options.edge_damping().clone() {
            self.factors[factor].edges[position].set_damping(value);
        }

        let planner = UpdatePlanner::new(&self.options);
        let mut num_optimized = 0;
        for factor in self.factors.iter_mut() {
            factor.approach = planner.choose(&factor.table);
            num_optimized += factor.approach.is_optimized() as usize;
        }
        self.initialized = true;

        info!(
            "Initialization complete. {} of {} factors use an optimized plan.",
            num_optimized,
            self.factors.len()
        );
    }

    // Replaces a factor's table and re-runs the planner for it, since the
    // cached strategy is only valid for the table it was built from
    pub fn replace_table(&mut self, factor: usize, table: FactorTable) {
        {
            let factor_node = &self.factors[factor];
            assert_eq!(
                table.num_dimensions(),
                factor_node.variables.len(),
                "Factor table dimension count doesn't match the number of variables in its scope."
            );
            for (dimension, variable) in factor_node.variables.iter().enumerate() {
                assert_eq!(
                    table.domain_size(dimension),
                    self.variables[*variable].domain_size,
                    "Factor table dimension size doesn't match the variable's declared domain size."
                );
            }
        }
        self.factors[factor].table = table;
        if self.initialized {
            let planner = UpdatePlanner::new(&self.options);
            let factor_node = &mut self.factors[factor];
            factor_node.approach = planner.choose(&factor_node.table);
        }
    }

    // Refreshes every outgoing message of one factor using its cached strategy
    pub fn update_factor(&mut self, factor: usize) {
        let options = &self.options;
        let FactorNode {
            table,
            edges,
            approach,
            ..
        } = &mut self.factors[factor];
        match approach {
            UpdateApproach::Normal => NormalEngine::new(table, options).update_all_edges(edges),
            UpdateApproach::Optimized(plan) => {
                OptimizedEngine::new(table, plan, options).update_all_edges(edges)
            }
        }
    }

    // Refreshes the outgoing message of a single edge on the normal engine
    pub fn update_factor_edge(&mut self, factor: usize, position: usize) {
        let options = &self.options;
        let FactorNode { table, edges, .. } = &mut self.factors[factor];
        NormalEngine::new(table, options).update_edge(edges, position);
    }

    // Lists the (factor, edge position) pairs incident to a variable
    fn incident_edges(&self, variable: usize) -> Vec<(usize, usize)> {
        self.graph
            .edges_directed(self.variables[variable].node, Incoming)
            .map(|edge| match self.graph[edge.source()] {
                GraphNode::Factor(factor) => (factor, *edge.weight()),
                GraphNode::Variable(_) => {
                    unreachable!("Graph edges always point from a factor to a variable")
                }
            })
            .collect()
    }

    // Refreshes every variable-to-factor message of one variable: the sum of
    // the other incident factors' messages, normalized. Outgoing messages
    // are computed from a snapshot before any of them is written.
    pub fn update_variable(&mut self, variable: usize) {
        let incident = self.incident_edges(variable);
        let rule = self.options.rule();

        let mut outgoing = Vec::with_capacity(incident.len());
        for &(target_factor, target_position) in incident.iter() {
            let mut message = DiscreteMessage::new_uniform(self.domain_size(variable));
            for &(factor, position) in incident.iter() {
                if factor == target_factor && position == target_position {
                    continue;
                }
                message.add_assign(self.factors[factor].edges[position].factor_to_variable());
            }
            rule.normalize(&mut message);
            outgoing.push(message);
        }

        for ((factor, position), message) in incident.into_iter().zip(outgoing) {
            self.factors[factor].edges[position].set_variable_to_factor(message);
        }
    }

    // Combines every incident factor's message into the variable's marginal
    pub fn marginal(&self, variable: usize) -> DiscreteMessage {
        let mut message = DiscreteMessage::new_uniform(self.domain_size(variable));
        for (factor, position) in self.incident_edges(variable) {
            message.add_assign(self.factors[factor].edges[position].factor_to_variable());
        }
        self.options.rule().normalize(&mut message);
        message
    }

    fn marginals(&self) -> Vec<DiscreteMessage> {
        (0..self.variables.len())
            .map(|variable| self.marginal(variable))
            .collect()
    }

    // Runs sequential update sweeps (all factors, then all variables) until
    // the marginals move less than epsilon or the iteration cap is reached.
    // Returns the number of iterations performed.
    pub fn propagate(&mut self) -> usize {
        assert!(
            self.initialized,
            "initialize() must run before propagate()."
        );

        let time_start = Instant::now();
        let mut previous_marginals = self.marginals();
        let mut iteration = 0;

        while iteration < self.options.max_iterations() {
            for factor in 0..self.factors.len() {
                self.update_factor(factor);
            }
            for variable in 0..self.variables.len() {
                self.update_variable(variable);
            }
            iteration += 1;

            let marginals = self.marginals();
            let delta = marginals
                .iter()
                .zip(previous_marginals.iter())
                .fold(0., |current_max: f64, (new, old)| {
                    current_max.max(new.max_difference(old))
                });
            previous_marginals = marginals;

            info!(
                "Iteration {}. Elapsed time {:?}. Max marginal change {}.",
                iteration,
                time_start.elapsed(),
                delta
            );

            if delta < self.options.eps() {
                info!("Marginals moved less than epsilon. Interrupting.");
                break;
            }
        }

        iteration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Two binary variables, hard-ish evidence on the first, a soft equality
    // factor between them
    fn construct_chain_graph() -> FactorGraph {
        let mut graph = FactorGraph::new(UpdateOptions::default());
        let v0 = graph.add_variable(2);
        let v1 = graph.add_variable(2);
        graph.add_factor(vec![v0], FactorTable::new_dense(vec![2], vec![0., 3.]));
        graph.add_factor(
            vec![v0, v1],
            FactorTable::new_dense(vec![2, 2], vec![0., 2., 2., 0.]),
        );
        graph
    }

    #[test]
    fn evidence_propagates_along_a_chain() {
        let mut graph = construct_chain_graph();
        graph.initialize();
        let iterations = graph.propagate();
        assert!(iterations < graph.options.max_iterations());

        // The equality factor relays the unary evidence, attenuated by the
        // coupling energy
        let marginal = graph.marginal(1);
        assert!((marginal.energy(0) - 0.).abs() < 1e-9);
        assert!((marginal.energy(1) - 2.).abs() < 1e-9);
    }

    #[test]
    fn update_factor_edge_matches_bulk_update() {
        let mut bulk = construct_chain_graph();
        bulk.initialize();
        let mut per_edge = construct_chain_graph();
        per_edge.initialize();

        bulk.update_factor(1);
        per_edge.update_factor_edge(1, 0);
        per_edge.update_factor_edge(1, 1);

        for position in 0..2 {
            assert!(
                bulk.edge(1, position)
                    .factor_to_variable()
                    .max_difference(per_edge.edge(1, position).factor_to_variable())
                    < 1e-9
            );
        }
    }

    #[test]
    fn initialize_applies_edge_damping_overrides() {
        let mut options = UpdateOptions::default();
        options.set_damping(0.1).set_edge_damping(1, 0, 0.5);
        let mut graph = FactorGraph::new(options);
        let v0 = graph.add_variable(2);
        let v1 = graph.add_variable(2);
        graph.add_factor(vec![v0], FactorTable::new_dense(vec![2], vec![0., 1.]));
        graph.add_factor(
            vec![v0, v1],
            FactorTable::new_dense(vec![2, 2], vec![0.; 4]),
        );
        graph.initialize();

        assert_eq!(graph.edge(0, 0).damping(), 0.1);
        assert_eq!(graph.edge(1, 0).damping(), 0.5);
        assert_eq!(graph.edge(1, 1).damping(), 0.1);
    }

    #[test]
    fn initialize_selects_a_plan_for_wide_factors() {
        let mut graph = FactorGraph::new(UpdateOptions::default());
        let variables: Vec<usize> = (0..3).map(|_| graph.add_variable(4)).collect();
        let values: Vec<f64> = (0..64).map(|seed| (seed % 7) as f64 * 0.5).collect();
        graph.add_factor(variables, FactorTable::new_dense(vec![4, 4, 4], values));
        graph.initialize();

        assert!(graph.approach(0).is_optimized());
        assert!(graph.plan(0).num_steps() > 0);
    }

    #[test]
    fn replace_table_reruns_the_planner() {
        let mut graph = FactorGraph::new(UpdateOptions::default());
        let variables: Vec<usize> = (0..3).map(|_| graph.add_variable(4)).collect();
        graph.add_factor(
            variables,
            FactorTable::new_dense(vec![4, 4, 4], vec![0.; 64]),
        );
        graph.initialize();
        assert!(graph.approach(0).is_optimized());

        // A unary-shaped replacement is rejected, a same-shape one re-plans
        graph.replace_table(0, FactorTable::new_sparse(vec![4, 4, 4], vec![], vec![]));
        match graph.approach(0) {
            UpdateApproach::Normal => {}
            UpdateApproach::Optimized(_) => {
                // An empty sparse table scans nothing; either strategy is
                // acceptable as long as the planner ran again
            }
        }
    }

    #[test]
    #[should_panic(expected = "no plan was prepared")]
    fn requesting_a_missing_plan_is_fatal() {
        let mut graph = construct_chain_graph();
        graph.initialize();
        graph.plan(0);
    }

    #[test]
    #[should_panic(expected = "sorted in increasing order")]
    fn unsorted_factor_scope_is_fatal() {
        let mut graph = FactorGraph::new(UpdateOptions::default());
        let v0 = graph.add_variable(2);
        let v1 = graph.add_variable(2);
        graph.add_factor(
            vec![v1, v0],
            FactorTable::new_dense(vec![2, 2], vec![0.; 4]),
        );
    }

    #[test]
    #[should_panic(expected = "doesn't match the variable's declared domain size")]
    fn table_domain_mismatch_is_fatal() {
        let mut graph = FactorGraph::new(UpdateOptions::default());
        let v0 = graph.add_variable(3);
        graph.add_factor(vec![v0], FactorTable::new_dense(vec![2], vec![0.; 2]));
    }
}
