// Strided indexing over the Cartesian product of the domains of a factor's
// variables, in a fixed sibling order. Dimension 0 varies fastest: the joint
// index of a tuple is the sum of index_i * stride_i, where stride_i is the
// product of the domain sizes of all dimensions before i.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JointIndexer {
    domain_sizes: Vec<usize>,
    strides: Vec<usize>,
    cardinality: usize,
}

impl JointIndexer {
    // Creates an indexer over the given domain sizes
    pub fn new(domain_sizes: Vec<usize>) -> Self {
        assert!(
            domain_sizes.iter().all(|size| *size > 0),
            "Every dimension of a factor table must have a non-empty domain."
        );

        let mut strides = vec![1; domain_sizes.len()];
        for index in 1..domain_sizes.len() {
            strides[index] = strides[index - 1] * domain_sizes[index - 1];
        }
        let cardinality = match domain_sizes.last() {
            Some(last_size) => strides[domain_sizes.len() - 1] * last_size,
            None => 1,
        };

        JointIndexer {
            domain_sizes,
            strides,
            cardinality,
        }
    }

    // Returns the number of dimensions
    pub fn num_dimensions(&self) -> usize {
        self.domain_sizes.len()
    }

    // Returns the domain size of a dimension
    pub fn domain_size(&self, dimension: usize) -> usize {
        self.domain_sizes[dimension]
    }

    pub fn domain_sizes(&self) -> &Vec<usize> {
        &self.domain_sizes
    }

    // Returns the stride of a dimension
    pub fn stride(&self, dimension: usize) -> usize {
        self.strides[dimension]
    }

    // Returns the total number of joint indices
    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    // Computes the joint index of a tuple of per-dimension indices
    pub fn joint_index(&self, indices: &[usize]) -> usize {
        assert_eq!(
            indices.len(),
            self.domain_sizes.len(),
            "Index tuple length doesn't match the number of dimensions."
        );
        indices
            .iter()
            .zip(self.strides.iter())
            .map(|(index, stride)| index * stride)
            .sum()
    }

    // Recovers the tuple of per-dimension indices from a joint index
    pub fn indices(&self, joint_index: usize) -> Vec<usize> {
        debug_assert!(joint_index < self.cardinality);
        self.domain_sizes
            .iter()
            .zip(self.strides.iter())
            .map(|(size, stride)| (joint_index / stride) % size)
            .collect()
    }

    // Extracts the index of a single dimension from a joint index
    pub fn dimension_index(&self, joint_index: usize, dimension: usize) -> usize {
        (joint_index / self.strides[dimension]) % self.domain_sizes[dimension]
    }

    // Returns the indexer obtained by dropping one dimension
    pub fn removed(&self, dimension: usize) -> JointIndexer {
        assert!(
            dimension < self.domain_sizes.len(),
            "Cannot remove a dimension that the indexer doesn't have."
        );
        let mut remaining = self.domain_sizes.clone();
        remaining.remove(dimension);
        JointIndexer::new(remaining)
    }

    // Projects a joint index into the indexer with one dimension dropped,
    // i.e., computes the joint index of the same tuple without that dimension
    pub fn reduced_joint_index(&self, joint_index: usize, dimension: usize) -> usize {
        let stride = self.strides[dimension];
        let low = joint_index % stride;
        let high = joint_index / (stride * self.domain_sizes[dimension]);
        high * stride + low
    }
}
