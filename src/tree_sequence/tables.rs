/**
 * Parallel-array dump of an inferred tree sequence, laid out for an external
 * serializer. Ancestor nodes come first (ids matching the store), then one
 * node per sample. Edgeset intervals are reported in position space via the
 * input site positions.
 */
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeSequenceTables {
    // nodes
    pub flags: Vec<u32>,
    pub time: Vec<f64>,
    // edgesets
    pub left: Vec<f64>,
    pub right: Vec<f64>,
    pub parent: Vec<usize>,
    pub children: Vec<usize>,
    pub children_length: Vec<usize>,
    // mutations
    pub site: Vec<usize>,
    pub node: Vec<usize>,
    pub derived_state: Vec<i8>,
}

impl TreeSequenceTables {
    pub const NODE_IS_SAMPLE: u32 = 1;

    pub fn num_nodes(&self) -> usize {
        self.flags.len()
    }

    pub fn num_edgesets(&self) -> usize {
        self.parent.len()
    }

    pub fn num_mutations(&self) -> usize {
        self.site.len()
    }

    /// The children of edgeset `index` within the flattened array.
    pub fn edgeset_children(&self, index: usize) -> &[usize] {
        let offset: usize = self.children_length[..index].iter().sum();
        &self.children[offset..offset + self.children_length[index]]
    }
}
