use log::debug;

use crate::{
    message::{edge::EdgeMessages, message::DiscreteMessage},
    tables::{factor_table::FactorTable, indexing::JointIndexer},
};

use super::{
    normal::{check_edges, finish_message},
    options::UpdateOptions,
    plan::{AuxStorage, MarginalizationStep, OutputStep, PlanStep, TableRef, UpdatePlan},
    rule::MarginalRule,
};

// Executes a previously built plan against live message data. The plan's
// step descriptors and sparse index structure are read-only; only the
// auxiliary value buffers are allocated per update.
pub struct OptimizedEngine<'a> {
    table: &'a FactorTable,
    plan: &'a UpdatePlan,
    rule: MarginalRule,
}

impl<'a> OptimizedEngine<'a> {
    pub fn new(table: &'a FactorTable, plan: &'a UpdatePlan, options: &UpdateOptions) -> Self {
        OptimizedEngine {
            table,
            plan,
            rule: options.rule(),
        }
    }

    // Refreshes the outgoing messages of every edge by interpreting the
    // plan's step list. Produces the same messages as the normal engine
    // updating each edge independently, up to floating-point ordering.
    pub fn update_all_edges(&self, edges: &mut [EdgeMessages]) {
        debug!(
            "In update_all_edges() interpreting a plan with {} steps and {} auxiliary tables",
            self.plan.num_steps(),
            self.plan.num_aux_tables()
        );
        check_edges(self.table, edges);

        let mut workspace: Vec<Vec<f64>> = self
            .plan
            .aux_tables
            .iter()
            .map(|aux| vec![self.rule.identity(); aux.buffer_len()])
            .collect();

        for step in self.plan.steps.iter() {
            match step {
                PlanStep::Marginalize(step) => {
                    self.apply_marginalization(step, &mut workspace, edges)
                }
                PlanStep::Output(step) => self.apply_output(step, &workspace, edges),
            }
        }
    }

    // Folds one entry of the source table into the output buffer
    fn combine_entry(
        &self,
        step: &MarginalizationStep,
        source_indexer: &JointIndexer,
        position: usize,
        joint_index: usize,
        value: f64,
        message: &DiscreteMessage,
        output: &mut [f64],
    ) {
        if value == f64::INFINITY {
            return;
        }
        let label = source_indexer.dimension_index(joint_index, step.source_dim_pos);
        let total = value + message.energy(label);
        if total == f64::INFINITY {
            return;
        }
        let output_position = match &step.sparse_map {
            Some(map) => map[position],
            None => source_indexer.reduced_joint_index(joint_index, step.source_dim_pos),
        };
        output[output_position] = self.rule.combine(output[output_position], total);
    }

    fn apply_marginalization(
        &self,
        step: &MarginalizationStep,
        workspace: &mut [Vec<f64>],
        edges: &[EdgeMessages],
    ) {
        let message = edges[step.dim].variable_to_factor();

        match step.source {
            TableRef::Original => {
                let indexer = self.table.indexer();
                let output = &mut workspace[step.output];
                for (position, (joint_index, value)) in self.table.entries().enumerate() {
                    self.combine_entry(step, indexer, position, joint_index, value, message, output);
                }
            }
            TableRef::Aux(slot) => {
                // Steps are emitted in dependency order, so a source slot
                // always precedes the slot it feeds
                debug_assert!(slot < step.output);
                let (before, after) = workspace.split_at_mut(step.output);
                let source_values = &before[slot];
                let output = &mut after[0];
                let shape = &self.plan.aux_tables[slot];
                match &shape.storage {
                    AuxStorage::Dense => {
                        for (joint_index, value) in source_values.iter().enumerate() {
                            self.combine_entry(
                                step,
                                &shape.indexer,
                                joint_index,
                                joint_index,
                                *value,
                                message,
                                output,
                            );
                        }
                    }
                    AuxStorage::Sparse { joint_indices } => {
                        for (position, (joint_index, value)) in
                            joint_indices.iter().zip(source_values.iter()).enumerate()
                        {
                            self.combine_entry(
                                step,
                                &shape.indexer,
                                position,
                                *joint_index,
                                *value,
                                message,
                                output,
                            );
                        }
                    }
                }
            }
        }
    }

    // Copies a finished one-dimensional auxiliary table into the edge's
    // outgoing message, then normalizes and damps it exactly as the normal
    // engine does
    fn apply_output(&self, step: &OutputStep, workspace: &[Vec<f64>], edges: &mut [EdgeMessages]) {
        let shape = &self.plan.aux_tables[step.source];
        debug_assert_eq!(shape.dims.len(), 1);
        let values = &workspace[step.source];

        let mut message = DiscreteMessage::new_infinite(self.table.domain_size(step.edge));
        match &shape.storage {
            AuxStorage::Dense => {
                for (index, value) in values.iter().enumerate() {
                    message.set_energy(index, *value);
                }
            }
            AuxStorage::Sparse { joint_indices } => {
                for (position, joint_index) in joint_indices.iter().enumerate() {
                    message.set_energy(*joint_index, values[position]);
                }
            }
        }

        finish_message(message, &mut edges[step.edge], self.rule);
    }
}
