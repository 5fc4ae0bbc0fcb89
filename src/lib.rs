//! Iterative message passing (min-sum / sum-product belief propagation) over
//! discrete factor graphs, with a cost-based planner that decides per factor
//! between naive per-edge updates and a shared-work update plan.

pub mod tables {
    pub mod factor_table;
    pub mod indexing;
}

pub mod message {
    pub mod edge;
    pub mod message;
}

pub mod update {
    pub mod normal;
    pub mod optimized;
    pub mod options;
    pub mod plan;
    pub mod rule;
}

pub mod planning {
    pub mod costs;
    pub mod estimator;
    pub mod planner;
}

pub mod graph {
    pub mod factor_graph;
}

pub use graph::factor_graph::FactorGraph;
pub use message::{edge::EdgeMessages, message::DiscreteMessage};
pub use planning::{
    costs::{CostType, Costs},
    planner::UpdatePlanner,
};
pub use tables::factor_table::FactorTable;
pub use update::{
    normal::NormalEngine,
    optimized::OptimizedEngine,
    options::UpdateOptions,
    plan::{UpdateApproach, UpdatePlan},
    rule::MarginalRule,
};
