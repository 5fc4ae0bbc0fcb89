use log::debug;

use crate::{
    tables::{factor_table::FactorTable, indexing::JointIndexer},
    update::{
        options::UpdateOptions,
        plan::{
            AuxStorage, AuxTableShape, MarginalizationStep, OutputStep, PlanStep, TableRef,
            UpdateApproach, UpdatePlan,
        },
    },
};

use super::{
    costs::Costs,
    estimator::{comparison_total, TableShape},
};

// Decides, once per factor table, whether updates run on the normal engine
// or on a shared-work plan, and builds the plan in the latter case. The
// candidate plan recursively bisects the dimension list in sibling order:
// the outputs of each half are produced from an auxiliary chain that folds
// in and removes the opposite half's dimensions one step at a time, so every
// chain is shared by all outputs on its side and no edge's own message is
// ever folded into that edge's path.
pub struct UpdatePlanner {
    sparse_threshold: f64,
    max_message_size: Option<usize>,
}

impl UpdatePlanner {
    pub fn new(options: &UpdateOptions) -> Self {
        UpdatePlanner {
            sparse_threshold: options.sparse_threshold(),
            max_message_size: options.max_message_size(),
        }
    }

    // Estimated costs of the normal engine refreshing every edge of this
    // factor independently
    pub fn compute_costs(&self, table: &FactorTable) -> Costs {
        let shape = TableShape::from_table(table);
        let mut costs = Costs::new();
        for target in 0..shape.num_dimensions() {
            costs += &shape.normal_edge_costs(target);
        }
        costs
    }

    // Builds the shared-work plan if its estimate is strictly cheaper than
    // the normal engine's; ties favor the normal engine. The decision is
    // made once (at initialization) and cached by the caller; it is only
    // re-evaluated if the table is replaced.
    pub fn build_plan(&self, table: &FactorTable) -> Option<UpdatePlan> {
        if table.num_dimensions() < 2 {
            debug!(
                "In build_plan(): {} dimensions leave no sharing opportunity, keeping the normal engine",
                table.num_dimensions()
            );
            return None;
        }
        if self.max_message_size.is_some() {
            debug!("In build_plan(): k-best cap active, keeping the normal engine");
            return None;
        }

        let normal_costs = self.compute_costs(table);
        let mut builder = PlanBuilder::new(table, self.sparse_threshold);
        let root = builder.root_source();
        builder.expand(&root);
        let PlanBuilder {
            steps,
            aux_tables,
            costs,
            ..
        } = builder;

        if comparison_total(&costs) < comparison_total(&normal_costs) {
            debug!(
                "In build_plan(): selected optimized plan ({}) over normal ({})",
                costs, normal_costs
            );
            Some(UpdatePlan {
                steps,
                aux_tables,
                costs,
            })
        } else {
            debug!(
                "In build_plan(): optimized estimate ({}) not below normal ({}), keeping the normal engine",
                costs, normal_costs
            );
            None
        }
    }

    // Convenience wrapper caching the per-factor strategy decision
    pub fn choose(&self, table: &FactorTable) -> UpdateApproach {
        match self.build_plan(table) {
            Some(plan) => UpdateApproach::Optimized(plan),
            None => UpdateApproach::Normal,
        }
    }
}

// A source a marginalization step can read: the original table or an
// auxiliary table emitted earlier, together with its remaining dimensions,
// indexer, cost shape, and (for sparse sources) present joint indices
#[derive(Clone)]
struct SourceTable {
    table_ref: TableRef,
    dims: Vec<usize>,
    indexer: JointIndexer,
    shape: TableShape,
    joint_indices: Option<Vec<usize>>,
}

struct PlanBuilder<'a> {
    table: &'a FactorTable,
    sparse_threshold: f64,
    steps: Vec<PlanStep>,
    aux_tables: Vec<AuxTableShape>,
    costs: Costs,
}

impl<'a> PlanBuilder<'a> {
    fn new(table: &'a FactorTable, sparse_threshold: f64) -> Self {
        PlanBuilder {
            table,
            sparse_threshold,
            steps: Vec::new(),
            aux_tables: Vec::new(),
            costs: Costs::new(),
        }
    }

    fn root_source(&self) -> SourceTable {
        SourceTable {
            table_ref: TableRef::Original,
            dims: (0..self.table.num_dimensions()).collect(),
            indexer: self.table.indexer().clone(),
            shape: TableShape::from_table(self.table),
            joint_indices: match self.table.is_sparse() {
                true => Some(self.table.values_sparse().0),
                false => None,
            },
        }
    }

    // Emits the steps producing every output of `source`'s dimension set
    fn expand(&mut self, source: &SourceTable) {
        if source.dims.len() == 1 {
            let slot = match source.table_ref {
                TableRef::Aux(slot) => slot,
                TableRef::Original => {
                    unreachable!("A one-dimensional output source is always an auxiliary table")
                }
            };
            self.costs += &TableShape::output_costs(source.indexer.domain_size(0));
            self.steps.push(PlanStep::Output(OutputStep {
                source: slot,
                edge: source.dims[0],
            }));
            return;
        }

        let mid = (source.dims.len() + 1) / 2;
        let first = source.dims[..mid].to_vec();
        let second = source.dims[mid..].to_vec();

        let first_table = self.fold_away(source, &second);
        self.expand(&first_table);
        let second_table = self.fold_away(source, &first);
        self.expand(&second_table);
    }

    // Chains one marginalization step per dimension in `remove`, in sibling order
    fn fold_away(&mut self, source: &SourceTable, remove: &[usize]) -> SourceTable {
        let mut current = source.clone();
        for dim in remove {
            current = self.emit_marginalization(current, *dim);
        }
        current
    }

    // Emits a single step folding in and removing one dimension, deciding
    // the auxiliary table's storage from its estimated occupied fraction and
    // precomputing the sparse index structure the executor will reuse
    fn emit_marginalization(&mut self, source: SourceTable, dim: usize) -> SourceTable {
        let position = source
            .dims
            .iter()
            .position(|d| *d == dim)
            .expect("Marginalized dimension is present in the source table");
        let child_shape = source.shape.marginalized(position, self.sparse_threshold);
        let mut child_dims = source.dims.clone();
        child_dims.remove(position);
        let child_indexer = source.indexer.removed(position);

        self.costs += &source.shape.marginalization_costs(&child_shape);

        let (storage, child_joints, sparse_map) = match child_shape.is_sparse() {
            true => {
                let source_joints = source
                    .joint_indices
                    .as_ref()
                    .expect("A sparse auxiliary table always descends from a sparse source");
                let projected: Vec<usize> = source_joints
                    .iter()
                    .map(|joint| source.indexer.reduced_joint_index(*joint, position))
                    .collect();
                let mut unique = projected.clone();
                unique.sort_unstable();
                unique.dedup();
                let map = projected
                    .iter()
                    .map(|joint| {
                        unique
                            .binary_search(joint)
                            .expect("Every projected joint index is in the unique list")
                    })
                    .collect();
                (
                    AuxStorage::Sparse {
                        joint_indices: unique.clone(),
                    },
                    Some(unique),
                    Some(map),
                )
            }
            false => (AuxStorage::Dense, None, None),
        };

        let slot = self.aux_tables.len();
        self.aux_tables.push(AuxTableShape {
            dims: child_dims.clone(),
            indexer: child_indexer.clone(),
            storage,
        });
        self.steps.push(PlanStep::Marginalize(MarginalizationStep {
            source: source.table_ref,
            dim,
            source_dim_pos: position,
            output: slot,
            sparse_map,
        }));

        SourceTable {
            table_ref: TableRef::Aux(slot),
            dims: child_dims,
            indexer: child_indexer,
            shape: child_shape,
            joint_indices: child_joints,
        }
    }
}
