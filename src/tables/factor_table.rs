use std::fmt::Display;

use super::indexing::JointIndexer;

// Value storage of a factor table: either one value per joint index, or an
// explicit list of (joint index, value) entries sorted by joint index.
// Joint indices absent from the sparse representation read as +infinity.
pub enum TableValues {
    Dense(Vec<f64>),
    Sparse {
        joint_indices: Vec<usize>,
        values: Vec<f64>,
    },
}

// Stores a factor's joint energy values over the Cartesian product of the
// domains of its variables, in sibling order. Read-only during an iteration.
pub struct FactorTable {
    indexer: JointIndexer,
    values: TableValues,
}

impl FactorTable {
    // Creates a densely stored table from one value per joint index
    pub fn new_dense(domain_sizes: Vec<usize>, values: Vec<f64>) -> Self {
        let indexer = JointIndexer::new(domain_sizes);
        assert_eq!(
            values.len(),
            indexer.cardinality(),
            "Dense value vector length doesn't match the product of the domain sizes."
        );
        FactorTable {
            indexer,
            values: TableValues::Dense(values),
        }
    }

    // Creates a sparsely stored table from parallel joint index and value vectors.
    // An empty entry list is a valid table with every configuration impossible.
    pub fn new_sparse(domain_sizes: Vec<usize>, joint_indices: Vec<usize>, values: Vec<f64>) -> Self {
        let indexer = JointIndexer::new(domain_sizes);
        assert_eq!(
            joint_indices.len(),
            values.len(),
            "Sparse joint index and value vectors must have equal lengths."
        );
        assert!(
            joint_indices.windows(2).all(|w| w[0] < w[1]),
            "Sparse joint indices must be distinct and sorted in increasing order."
        );
        if let Some(last) = joint_indices.last() {
            assert!(
                *last < indexer.cardinality(),
                "Sparse joint index out of range for the given domain sizes."
            );
        }
        FactorTable {
            indexer,
            values: TableValues::Sparse {
                joint_indices,
                values,
            },
        }
    }

    // Creates a sparsely stored table from index tuples, one per entry
    pub fn new_sparse_from_tuples(
        domain_sizes: Vec<usize>,
        index_tuples: &[Vec<usize>],
        values: Vec<f64>,
    ) -> Self {
        let indexer = JointIndexer::new(domain_sizes.clone());
        let mut entries: Vec<(usize, f64)> = index_tuples
            .iter()
            .map(|tuple| indexer.joint_index(tuple))
            .zip(values)
            .collect();
        entries.sort_unstable_by_key(|(joint_index, _)| *joint_index);
        let (joint_indices, values) = entries.into_iter().unzip();
        FactorTable::new_sparse(domain_sizes, joint_indices, values)
    }

    pub fn indexer(&self) -> &JointIndexer {
        &self.indexer
    }

    pub fn num_dimensions(&self) -> usize {
        self.indexer.num_dimensions()
    }

    pub fn domain_size(&self, dimension: usize) -> usize {
        self.indexer.domain_size(dimension)
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self.values, TableValues::Sparse { .. })
    }

    // Returns the number of entries a full scan of this table visits
    pub fn entry_count(&self) -> usize {
        match &self.values {
            TableValues::Dense(values) => values.len(),
            TableValues::Sparse { values, .. } => values.len(),
        }
    }

    // Returns the energy at a joint index (+infinity for absent sparse entries)
    pub fn value_at(&self, joint_index: usize) -> f64 {
        match &self.values {
            TableValues::Dense(values) => values[joint_index],
            TableValues::Sparse {
                joint_indices,
                values,
            } => match joint_indices.binary_search(&joint_index) {
                Ok(position) => values[position],
                Err(_) => f64::INFINITY,
            },
        }
    }

    // Maps a sparse entry position to its joint index
    pub fn sparse_joint_index(&self, position: usize) -> usize {
        match &self.values {
            TableValues::Sparse { joint_indices, .. } => joint_indices[position],
            TableValues::Dense(_) => position,
        }
    }

    // Returns the sparse index and value vectors (dense tables enumerate all entries)
    pub fn values_sparse(&self) -> (Vec<usize>, Vec<f64>) {
        match &self.values {
            TableValues::Dense(values) => ((0..values.len()).collect(), values.clone()),
            TableValues::Sparse {
                joint_indices,
                values,
            } => (joint_indices.clone(), values.clone()),
        }
    }

    // Returns an iterator over (joint index, energy) for every stored entry
    pub fn entries(&self) -> TableEntries {
        match &self.values {
            TableValues::Dense(values) => TableEntries::Dense {
                values,
                joint_index: 0,
            },
            TableValues::Sparse {
                joint_indices,
                values,
            } => TableEntries::Sparse {
                joint_indices,
                values,
                position: 0,
            },
        }
    }

    // Returns the fraction of joint indices holding a finite energy
    pub fn occupied_fraction(&self) -> f64 {
        let finite_entries = match &self.values {
            TableValues::Dense(values) => values.iter().filter(|value| value.is_finite()).count(),
            TableValues::Sparse { values, .. } => values.len(),
        };
        finite_entries as f64 / self.indexer.cardinality() as f64
    }

    // Converts to dense storage, writing +infinity into absent slots
    pub fn to_dense(&self) -> FactorTable {
        let values = match &self.values {
            TableValues::Dense(values) => values.clone(),
            TableValues::Sparse {
                joint_indices,
                values,
            } => {
                let mut dense = vec![f64::INFINITY; self.indexer.cardinality()];
                for (joint_index, value) in joint_indices.iter().zip(values.iter()) {
                    dense[*joint_index] = *value;
                }
                dense
            }
        };
        FactorTable {
            indexer: self.indexer.clone(),
            values: TableValues::Dense(values),
        }
    }

    // Converts to sparse storage, omitting +infinity entries
    pub fn to_sparse(&self) -> FactorTable {
        let (joint_indices, values) = match &self.values {
            TableValues::Dense(values) => values
                .iter()
                .enumerate()
                .filter(|(_, value)| **value != f64::INFINITY)
                .map(|(joint_index, value)| (joint_index, *value))
                .unzip(),
            TableValues::Sparse {
                joint_indices,
                values,
            } => (joint_indices.clone(), values.clone()),
        };
        FactorTable {
            indexer: self.indexer.clone(),
            values: TableValues::Sparse {
                joint_indices,
                values,
            },
        }
    }
}

// Iterator over the stored entries of a factor table
pub enum TableEntries<'a> {
    Dense {
        values: &'a [f64],
        joint_index: usize,
    },
    Sparse {
        joint_indices: &'a [usize],
        values: &'a [f64],
        position: usize,
    },
}

impl Iterator for TableEntries<'_> {
    type Item = (usize, f64);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            TableEntries::Dense {
                values,
                joint_index,
            } => {
                if *joint_index < values.len() {
                    let entry = (*joint_index, values[*joint_index]);
                    *joint_index += 1;
                    Some(entry)
                } else {
                    None
                }
            }
            TableEntries::Sparse {
                joint_indices,
                values,
                position,
            } => {
                if *position < values.len() {
                    let entry = (joint_indices[*position], values[*position]);
                    *position += 1;
                    Some(entry)
                } else {
                    None
                }
            }
        }
    }
}

impl Display for FactorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.entries()
                .map(|(joint_index, value)| format!("{}:{}", joint_index, value))
                .collect::<Vec<String>>()
                .join(" ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_value_at() {
        let table = FactorTable::new_dense(vec![2, 3], (0..6).map(|v| v as f64).collect());
        for joint_index in 0..6 {
            assert_eq!(table.value_at(joint_index), joint_index as f64);
        }
        assert_eq!(table.entry_count(), 6);
        assert!(!table.is_sparse());
    }

    #[test]
    fn sparse_absent_entries_are_infinite() {
        let table = FactorTable::new_sparse(vec![2, 2], vec![0, 3], vec![0.5, 1.5]);
        assert_eq!(table.value_at(0), 0.5);
        assert_eq!(table.value_at(1), f64::INFINITY);
        assert_eq!(table.value_at(2), f64::INFINITY);
        assert_eq!(table.value_at(3), 1.5);
        assert_eq!(table.entry_count(), 2);
        assert_eq!(table.sparse_joint_index(0), 0);
        assert_eq!(table.sparse_joint_index(1), 3);
    }

    #[test]
    fn empty_sparse_table() {
        let table = FactorTable::new_sparse(vec![2, 3], vec![], vec![]);
        for joint_index in 0..6 {
            assert_eq!(table.value_at(joint_index), f64::INFINITY);
        }
        assert_eq!(table.occupied_fraction(), 0.);
    }

    #[test]
    fn conversions_agree_on_every_joint_index() {
        let sparse = FactorTable::new_sparse(vec![3, 2], vec![1, 2, 5], vec![0.25, 4., 2.5]);
        let dense = sparse.to_dense();
        let roundtrip = dense.to_sparse();
        for joint_index in 0..6 {
            assert_eq!(sparse.value_at(joint_index), dense.value_at(joint_index));
            assert_eq!(sparse.value_at(joint_index), roundtrip.value_at(joint_index));
        }
        assert_eq!(roundtrip.entry_count(), 3);
    }

    #[test]
    fn new_sparse_from_tuples_sorts_entries() {
        let table = FactorTable::new_sparse_from_tuples(
            vec![2, 2],
            &[vec![1, 1], vec![0, 0]],
            vec![7., 3.],
        );
        assert_eq!(table.value_at(0), 3.);
        assert_eq!(table.value_at(3), 7.);
    }

    #[test]
    fn entries_iterate_stored_values() {
        let sparse = FactorTable::new_sparse(vec![2, 2], vec![1, 2], vec![0.5, 1.5]);
        let collected: Vec<(usize, f64)> = sparse.entries().collect();
        assert_eq!(collected, vec![(1, 0.5), (2, 1.5)]);

        let dense = FactorTable::new_dense(vec![2], vec![4., 5.]);
        let collected: Vec<(usize, f64)> = dense.entries().collect();
        assert_eq!(collected, vec![(0, 4.), (1, 5.)]);
    }

    #[test]
    #[should_panic(expected = "Dense value vector length")]
    fn dense_length_mismatch_is_fatal() {
        FactorTable::new_dense(vec![2, 3], vec![0.; 5]);
    }

    #[test]
    #[should_panic(expected = "sorted in increasing order")]
    fn unsorted_sparse_indices_are_fatal() {
        FactorTable::new_sparse(vec![2, 2], vec![2, 1], vec![0., 0.]);
    }
}
