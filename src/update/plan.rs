use std::fmt::Display;

use crate::{planning::costs::Costs, tables::indexing::JointIndexer};

// Source of a marginalization step: the factor's own table or an auxiliary
// table produced by an earlier step of the same plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableRef {
    Original,
    Aux(usize),
}

// Storage chosen for an auxiliary table. Sparse auxiliary tables carry the
// projected joint indices precomputed at plan-build time; only the value
// buffer is allocated per update.
pub enum AuxStorage {
    Dense,
    Sparse { joint_indices: Vec<usize> },
}

// Shape of one auxiliary table: the original dimension ids that remain (in
// sibling order), an indexer over their domains, and the chosen storage.
pub struct AuxTableShape {
    pub(crate) dims: Vec<usize>,
    pub(crate) indexer: JointIndexer,
    pub(crate) storage: AuxStorage,
}

impl AuxTableShape {
    pub fn is_sparse(&self) -> bool {
        matches!(self.storage, AuxStorage::Sparse { .. })
    }

    // Number of value slots an update allocates for this table
    pub fn buffer_len(&self) -> usize {
        match &self.storage {
            AuxStorage::Dense => self.indexer.cardinality(),
            AuxStorage::Sparse { joint_indices } => joint_indices.len(),
        }
    }
}

// Folds one incoming message dimension into a source table and removes it,
// producing a smaller auxiliary table.
pub struct MarginalizationStep {
    pub(crate) source: TableRef,
    pub(crate) dim: usize,            // original dimension id being removed
    pub(crate) source_dim_pos: usize, // its position within the source's remaining dims
    pub(crate) output: usize,         // auxiliary table slot written by this step
    // Maps source entry positions to output entry positions when both the
    // source and the output are sparse
    pub(crate) sparse_map: Option<Vec<usize>>,
}

// Writes a finished one-dimensional auxiliary table into an edge's outgoing
// message, normalized and damped exactly as the normal engine does.
pub struct OutputStep {
    pub(crate) source: usize, // auxiliary table slot, one dimension remaining
    pub(crate) edge: usize,
}

// A plan is data consumed by an interpreter loop, not control flow: a flat
// list of tagged steps over a fixed set of auxiliary table shapes.
pub enum PlanStep {
    Marginalize(MarginalizationStep),
    Output(OutputStep),
}

// Precomputed shared-work update for one factor. Built once at
// initialization, read-only afterwards; replaced only if the table changes.
pub struct UpdatePlan {
    pub(crate) steps: Vec<PlanStep>,
    pub(crate) aux_tables: Vec<AuxTableShape>,
    pub(crate) costs: Costs,
}

impl UpdatePlan {
    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn num_aux_tables(&self) -> usize {
        self.aux_tables.len()
    }

    // Estimated execution costs the planner selected this plan on
    pub fn estimated_costs(&self) -> &Costs {
        &self.costs
    }
}

impl Display for UpdatePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for step in self.steps.iter() {
            match step {
                PlanStep::Marginalize(step) => writeln!(
                    f,
                    "marginalize dim {} of {:?} -> aux {} ({})",
                    step.dim,
                    step.source,
                    step.output,
                    if self.aux_tables[step.output].is_sparse() {
                        "sparse"
                    } else {
                        "dense"
                    }
                )?,
                PlanStep::Output(step) => {
                    writeln!(f, "output edge {} from aux {}", step.edge, step.source)?
                }
            }
        }
        Ok(())
    }
}

// Per-factor update strategy cached by the graph's initialization phase
pub enum UpdateApproach {
    Normal,
    Optimized(UpdatePlan),
}

impl UpdateApproach {
    pub fn is_optimized(&self) -> bool {
        matches!(self, UpdateApproach::Optimized(_))
    }
}
