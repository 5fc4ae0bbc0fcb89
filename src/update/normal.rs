use bitvec::prelude::LocalBits;
use bitvec::vec::BitVec;
use log::debug;

use crate::{
    message::{edge::EdgeMessages, message::DiscreteMessage},
    tables::factor_table::FactorTable,
};

use super::{options::UpdateOptions, rule::MarginalRule};

type AdmissibleMask = BitVec<usize, LocalBits>;

// Baseline per-edge update: combine the factor table with the incoming
// messages of all non-target dimensions, marginalize onto the target
// dimension, normalize, and damp. Every entry the table stores is visited
// once per updated edge.
pub struct NormalEngine<'a> {
    table: &'a FactorTable,
    rule: MarginalRule,
    max_message_size: Option<usize>,
}

impl<'a> NormalEngine<'a> {
    pub fn new(table: &'a FactorTable, options: &UpdateOptions) -> Self {
        NormalEngine {
            table,
            rule: options.rule(),
            max_message_size: options.max_message_size(),
        }
    }

    fn check_edges(&self, edges: &[EdgeMessages]) {
        check_edges(self.table, edges);
    }

    // Builds per-dimension admissible-index masks for k-best truncation:
    // only the k lowest-energy indices of each non-target incoming message
    // participate in accumulation. Returns None when no dimension is capped.
    fn admissible_masks(
        &self,
        edges: &[EdgeMessages],
        target: usize,
    ) -> Option<Vec<Option<AdmissibleMask>>> {
        let k = self.max_message_size?;
        let mut masks: Vec<Option<AdmissibleMask>> = vec![None; edges.len()];
        let mut any_capped = false;
        for (dimension, edge) in edges.iter().enumerate() {
            if dimension == target || k >= edge.domain_size() {
                continue;
            }
            let message = edge.variable_to_factor();
            let mut order: Vec<usize> = (0..edge.domain_size()).collect();
            order.sort_by(|&a, &b| message.energy(a).total_cmp(&message.energy(b)));
            let mut mask = AdmissibleMask::repeat(false, edge.domain_size());
            for &index in order.iter().take(k) {
                mask.set(index, true);
            }
            masks[dimension] = Some(mask);
            any_capped = true;
        }
        match any_capped {
            true => Some(masks),
            false => None,
        }
    }

    // Marginalizes the combined table onto the target dimension
    fn marginalize_edge(
        &self,
        edges: &[EdgeMessages],
        target: usize,
        masks: Option<&Vec<Option<AdmissibleMask>>>,
    ) -> DiscreteMessage {
        let indexer = self.table.indexer();
        let mut accumulator = vec![self.rule.identity(); self.table.domain_size(target)];

        'entries: for (joint_index, value) in self.table.entries() {
            if value == f64::INFINITY {
                continue;
            }
            let mut total = value;
            for (dimension, edge) in edges.iter().enumerate() {
                if dimension == target {
                    continue;
                }
                let index = indexer.dimension_index(joint_index, dimension);
                if let Some(Some(mask)) = masks.map(|masks| &masks[dimension]) {
                    if !mask[index] {
                        continue 'entries;
                    }
                }
                total += edge.variable_to_factor().energy(index);
            }
            if total == f64::INFINITY {
                continue;
            }
            let out_index = indexer.dimension_index(joint_index, target);
            accumulator[out_index] = self.rule.combine(accumulator[out_index], total);
        }

        DiscreteMessage::from(accumulator)
    }

    // Computes the outgoing message for a single edge
    pub fn update_edge(&self, edges: &mut [EdgeMessages], target: usize) {
        debug!(
            "In update_edge() for target dimension {} of a table with {} entries",
            target,
            self.table.entry_count()
        );
        self.check_edges(edges);
        assert!(
            target < edges.len(),
            "Target edge index out of range for this factor."
        );

        let masks = self.admissible_masks(edges, target);
        let accumulator = self.marginalize_edge(edges, target, masks.as_ref());
        finish_message(accumulator, &mut edges[target], self.rule);
    }

    // Refreshes the outgoing messages of every edge. When all incoming
    // messages are finite everywhere and no k-best cap is active, the
    // combined energy per entry is computed once and each edge subtracts its
    // own incoming contribution after binning; otherwise each edge falls
    // back to an independent per-edge scan (infinite entries would make the
    // subtraction ill-defined).
    pub fn update_all_edges(&self, edges: &mut [EdgeMessages]) {
        debug!(
            "In update_all_edges() for a table with {} dimensions and {} entries",
            self.table.num_dimensions(),
            self.table.entry_count()
        );
        self.check_edges(edges);

        let incoming_all_finite = edges.iter().all(|edge| {
            edge.variable_to_factor()
                .iter()
                .all(|energy| energy.is_finite())
        });
        if !incoming_all_finite || self.max_message_size.is_some() {
            for target in 0..edges.len() {
                self.update_edge(edges, target);
            }
            return;
        }

        let indexer = self.table.indexer();

        // One pass to combine the table with all incoming messages
        let mut combined = Vec::with_capacity(self.table.entry_count());
        for (joint_index, value) in self.table.entries() {
            let mut total = value;
            for (dimension, edge) in edges.iter().enumerate() {
                let index = indexer.dimension_index(joint_index, dimension);
                total += edge.variable_to_factor().energy(index);
            }
            combined.push(total);
        }

        // One pass per edge, removing that edge's own contribution. Each
        // output buffer is written only at the end of its own computation,
        // after the previous output has been captured for damping.
        for target in 0..edges.len() {
            let mut accumulator = vec![self.rule.identity(); self.table.domain_size(target)];
            for (position, (joint_index, _)) in self.table.entries().enumerate() {
                let total = combined[position];
                if total == f64::INFINITY {
                    continue;
                }
                let out_index = indexer.dimension_index(joint_index, target);
                let own = edges[target].variable_to_factor().energy(out_index);
                accumulator[out_index] = self.rule.combine(accumulator[out_index], total - own);
            }
            finish_message(
                DiscreteMessage::from(accumulator),
                &mut edges[target],
                self.rule,
            );
        }
    }
}

// Validates an edge list against a table's dimensions. Mismatches are fatal
// configuration errors.
pub(crate) fn check_edges(table: &FactorTable, edges: &[EdgeMessages]) {
    assert_eq!(
        edges.len(),
        table.num_dimensions(),
        "Edge count doesn't match the factor table's dimension count."
    );
    for (dimension, edge) in edges.iter().enumerate() {
        assert_eq!(
            edge.domain_size(),
            table.domain_size(dimension),
            "Message length doesn't match the variable's declared domain size."
        );
    }
}

// Normalizes a freshly marginalized message, damps it against the previous
// outgoing message (captured from the edge buffer before it is overwritten),
// and stores it as the edge's new factor-to-variable message. Shared by the
// normal and optimized engines so both finish identically.
pub(crate) fn finish_message(
    mut message: DiscreteMessage,
    edge: &mut EdgeMessages,
    rule: MarginalRule,
) {
    rule.normalize(&mut message);
    let damping = edge.damping();
    if damping > 0. {
        message.damp(edge.factor_to_variable(), damping);
    }
    edge.set_factor_to_variable(message);
}

#[cfg(test)]
mod tests {
    use super::*;

    // A binary equality factor: zero energy on the diagonal, 5 off it
    fn construct_equality_table() -> FactorTable {
        FactorTable::new_dense(vec![2, 2], vec![0., 5., 5., 0.])
    }

    fn construct_edges(domain_sizes: &[usize]) -> Vec<EdgeMessages> {
        domain_sizes
            .iter()
            .map(|size| EdgeMessages::new(*size))
            .collect()
    }

    #[test]
    fn equality_factor_with_uniform_incoming_is_uniform() {
        let table = construct_equality_table();
        let options = UpdateOptions::default();
        let engine = NormalEngine::new(&table, &options);
        let mut edges = construct_edges(&[2, 2]);

        engine.update_edge(&mut edges, 0);
        assert_eq!(edges[0].factor_to_variable().energies().to_vec(), vec![0., 0.]);
    }

    #[test]
    fn equality_factor_with_hard_evidence() {
        let table = construct_equality_table();
        let options = UpdateOptions::default();
        let engine = NormalEngine::new(&table, &options);
        let mut edges = construct_edges(&[2, 2]);
        edges[1].set_variable_to_factor(DiscreteMessage::from(vec![0., f64::INFINITY]));

        engine.update_edge(&mut edges, 0);
        // Weight ratio exp(0) : exp(-5) after min-normalization
        assert_eq!(edges[0].factor_to_variable().energies().to_vec(), vec![0., 5.]);
    }

    #[test]
    fn all_infinite_table_produces_all_infinite_messages() {
        let table = FactorTable::new_sparse(vec![2, 3, 2], vec![], vec![]);
        let options = UpdateOptions::default();
        let engine = NormalEngine::new(&table, &options);
        let mut edges = construct_edges(&[2, 3, 2]);

        engine.update_all_edges(&mut edges);
        for edge in edges.iter() {
            assert_eq!(edge.factor_to_variable().min(), f64::INFINITY);
        }
    }

    #[test]
    fn sum_product_equality_factor() {
        let table = construct_equality_table();
        let mut options = UpdateOptions::default();
        options.set_rule(MarginalRule::SumProduct);
        let engine = NormalEngine::new(&table, &options);
        let mut edges = construct_edges(&[2, 2]);

        engine.update_edge(&mut edges, 0);
        let message = edges[0].factor_to_variable();
        let weight_sum: f64 = message.weights().sum();
        assert!((weight_sum - 1.).abs() < 1e-12);
        // Both labels collect the same weight mass, so the message is uniform
        assert!((message.energy(0) - message.energy(1)).abs() < 1e-12);
    }

    #[test]
    fn bulk_mode_matches_per_edge_updates() {
        let table = FactorTable::new_dense(
            vec![2, 3],
            vec![0.5, 2., 1., 0., 3., 0.25],
        );
        let options = UpdateOptions::default();
        let engine = NormalEngine::new(&table, &options);

        let mut per_edge = construct_edges(&[2, 3]);
        per_edge[0].set_variable_to_factor(DiscreteMessage::from(vec![0.1, 0.7]));
        per_edge[1].set_variable_to_factor(DiscreteMessage::from(vec![0.3, 0., 1.2]));
        let mut bulk = construct_edges(&[2, 3]);
        bulk[0].set_variable_to_factor(DiscreteMessage::from(vec![0.1, 0.7]));
        bulk[1].set_variable_to_factor(DiscreteMessage::from(vec![0.3, 0., 1.2]));

        engine.update_edge(&mut per_edge, 0);
        engine.update_edge(&mut per_edge, 1);
        engine.update_all_edges(&mut bulk);

        for (a, b) in per_edge.iter().zip(bulk.iter()) {
            assert!(a.factor_to_variable().max_difference(b.factor_to_variable()) < 1e-9);
        }
    }

    #[test]
    fn bulk_mode_falls_back_on_infinite_incoming_messages() {
        let table = construct_equality_table();
        let options = UpdateOptions::default();
        let engine = NormalEngine::new(&table, &options);
        let mut edges = construct_edges(&[2, 2]);
        edges[1].set_variable_to_factor(DiscreteMessage::from(vec![0., f64::INFINITY]));

        engine.update_all_edges(&mut edges);
        assert_eq!(edges[0].factor_to_variable().energies().to_vec(), vec![0., 5.]);
    }

    #[test]
    fn k_best_equal_to_domain_size_matches_full_marginalization() {
        let table = FactorTable::new_dense(
            vec![3, 3],
            vec![0., 1., 2., 1., 0., 1., 2., 1., 0.],
        );
        let incoming = DiscreteMessage::from(vec![0.4, 0., 1.1]);

        let options = UpdateOptions::default();
        let full_engine = NormalEngine::new(&table, &options);
        let mut full = construct_edges(&[3, 3]);
        full[1].set_variable_to_factor(incoming.clone());
        full_engine.update_edge(&mut full, 0);

        let mut capped_options = UpdateOptions::default();
        capped_options.set_max_message_size(Some(3));
        let capped_engine = NormalEngine::new(&table, &capped_options);
        let mut capped = construct_edges(&[3, 3]);
        capped[1].set_variable_to_factor(incoming);
        capped_engine.update_edge(&mut capped, 0);

        assert_eq!(
            full[0].factor_to_variable().energies(),
            capped[0].factor_to_variable().energies()
        );
    }

    #[test]
    fn k_best_restricts_to_lowest_energy_entries() {
        let table = FactorTable::new_dense(vec![2, 3], vec![0.; 6]);
        let mut options = UpdateOptions::default();
        options.set_max_message_size(Some(1));
        let engine = NormalEngine::new(&table, &options);
        let mut edges = construct_edges(&[2, 3]);
        edges[1].set_variable_to_factor(DiscreteMessage::from(vec![2., 0.5, 3.]));

        engine.update_edge(&mut edges, 0);
        // Only index 1 of the incoming message participates, so the outgoing
        // message is its energy at every label, normalized to zero
        assert_eq!(edges[0].factor_to_variable().energies().to_vec(), vec![0., 0.]);
    }

    #[test]
    fn damping_blends_with_previous_output() {
        let table = construct_equality_table();
        let options = UpdateOptions::default();
        let engine = NormalEngine::new(&table, &options);
        let mut edges = construct_edges(&[2, 2]);
        edges[0].set_damping(0.5);
        edges[0].set_factor_to_variable(DiscreteMessage::from(vec![4., 0.]));
        edges[1].set_variable_to_factor(DiscreteMessage::from(vec![0., f64::INFINITY]));

        engine.update_edge(&mut edges, 0);
        // Undamped result is [0, 5]; blended with the previous [4, 0]
        assert_eq!(edges[0].factor_to_variable().energies().to_vec(), vec![2., 2.5]);
    }

    #[test]
    #[should_panic(expected = "Edge count")]
    fn dimension_count_mismatch_is_fatal() {
        let table = construct_equality_table();
        let options = UpdateOptions::default();
        let engine = NormalEngine::new(&table, &options);
        let mut edges = construct_edges(&[2]);
        engine.update_edge(&mut edges, 0);
    }
}
