use crate::tables::factor_table::FactorTable;

use super::costs::{CostType, Costs};

// Heuristic access multipliers. The exact values are tunable calibration
// constants; only the relative ordering of the normal and optimized
// estimates is relied upon. One combine visit reads a table value and a
// message entry and writes an accumulator slot.
const ACCESSES_PER_COMBINE: f64 = 3.;
const ACCESSES_PER_OUTPUT_VALUE: f64 = 2.;
const BYTES_PER_VALUE: f64 = 8.;
// Allocated bytes are traded against accesses at one access per value-sized word
const BYTES_PER_ACCESS: f64 = 8.;

// Scalarizes a cost vector for strategy comparison
pub fn comparison_total(costs: &Costs) -> f64 {
    costs.get(CostType::Accesses) + costs.get(CostType::AllocatedBytes) / BYTES_PER_ACCESS
}

// The shape of a (real or hypothetical) factor table: domain sizes of its
// remaining dimensions, storage kind, and how many entries a scan visits.
// Estimation never touches actual values, so planning can happen before any
// message exists.
#[derive(Clone, Debug)]
pub struct TableShape {
    sizes: Vec<usize>,
    entries: usize,
    sparse: bool,
}

impl TableShape {
    pub fn from_table(table: &FactorTable) -> Self {
        TableShape {
            sizes: table.indexer().domain_sizes().clone(),
            entries: table.entry_count(),
            sparse: table.is_sparse(),
        }
    }

    pub fn num_dimensions(&self) -> usize {
        self.sizes.len()
    }

    pub fn domain_size(&self, dimension: usize) -> usize {
        self.sizes[dimension]
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn is_sparse(&self) -> bool {
        self.sparse
    }

    pub fn cardinality(&self) -> usize {
        self.sizes.iter().product()
    }

    // Estimated occupied fraction: stored entries per joint index
    pub fn occupied_fraction(&self) -> f64 {
        self.entries as f64 / self.cardinality() as f64
    }

    // The shape produced by folding in and removing one dimension. A sparse
    // source keeps at most its own entry count (projection can only merge
    // entries); the result stays sparse while the estimated occupied
    // fraction is below the threshold. A dense source yields a dense child.
    pub fn marginalized(&self, dimension: usize, sparse_threshold: f64) -> TableShape {
        let mut sizes = self.sizes.clone();
        sizes.remove(dimension);
        let cardinality: usize = sizes.iter().product();
        if self.sparse {
            let entries = self.entries.min(cardinality);
            let occupied = entries as f64 / cardinality as f64;
            if occupied < sparse_threshold {
                return TableShape {
                    sizes,
                    entries,
                    sparse: true,
                };
            }
        }
        TableShape {
            sizes,
            entries: cardinality,
            sparse: false,
        }
    }

    // Estimated costs of one marginalization step producing `child`
    pub fn marginalization_costs(&self, child: &TableShape) -> Costs {
        let mut costs = Costs::new();
        costs.put(
            CostType::Accesses,
            self.entries as f64 * ACCESSES_PER_COMBINE,
        );
        costs.put(
            CostType::AllocatedBytes,
            child.entries as f64 * BYTES_PER_VALUE,
        );
        costs
    }

    // Estimated costs of writing and normalizing one outgoing message
    pub fn output_costs(domain_size: usize) -> Costs {
        let mut costs = Costs::new();
        costs.put(
            CostType::Accesses,
            domain_size as f64 * ACCESSES_PER_OUTPUT_VALUE,
        );
        costs
    }

    // Estimated costs of the normal engine updating one edge independently:
    // a full scan combining the table value with every non-target incoming
    // message, one accumulator allocation, and the output normalization
    pub fn normal_edge_costs(&self, target: usize) -> Costs {
        let accesses_per_entry = (self.num_dimensions() + 1) as f64;
        let domain_size = self.sizes[target];
        let mut costs = Costs::new();
        costs.put(
            CostType::Accesses,
            self.entries as f64 * accesses_per_entry
                + domain_size as f64 * ACCESSES_PER_OUTPUT_VALUE,
        );
        costs.put(
            CostType::AllocatedBytes,
            domain_size as f64 * BYTES_PER_VALUE,
        );
        costs
    }
}
