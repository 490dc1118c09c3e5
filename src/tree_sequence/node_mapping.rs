use crate::model::segment::LiveSegment;
use crate::utils::errors::BrolgaError;
use crate::utils::object_pool::{ObjectPool, PoolHandle, NULL_HANDLE};

/// One link of a node's live-segment list. Links live in the shared pool
/// and chain through handles.
#[derive(Debug, Clone)]
struct MappingNode {
    segment: LiveSegment,
    next: PoolHandle,
}

impl Default for MappingNode {
    fn default() -> MappingNode {
        MappingNode {
            segment: LiveSegment::default(),
            next: NULL_HANDLE,
        }
    }
}

/**
 * Per-node live-segment lists backed by the object pool.
 *
 * For every node that has been attached to the partial tree this maps the
 * node to the sorted, disjoint site intervals over which it is the live
 * leaf of its lineage. Replacing a node's list returns its links to the
 * pool's free list before the new chain is carved out.
 */
#[derive(Debug)]
pub struct NodeMapping {
    pool: ObjectPool<MappingNode>,
    heads: Vec<PoolHandle>,
}

impl NodeMapping {
    pub fn new(num_nodes: usize, block_size: usize) -> Result<NodeMapping, BrolgaError> {
        Ok(NodeMapping {
            pool: ObjectPool::with_block_size(block_size)?,
            heads: vec![NULL_HANDLE; num_nodes],
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.heads.len()
    }

    /// Replace `node`'s live list with the given sorted disjoint intervals.
    pub fn set_live_segments(&mut self, node: usize, intervals: &[(usize, usize)]) {
        let mut handle = self.heads[node];
        while handle != NULL_HANDLE {
            let next = self.pool.get(handle).next;
            self.pool.free(handle);
            handle = next;
        }
        let mut head = NULL_HANDLE;
        for (left, right) in intervals.iter().rev() {
            let link = MappingNode {
                segment: LiveSegment::new(*left, *right, node),
                next: head,
            };
            head = self.pool.alloc(link);
        }
        self.heads[node] = head;
    }

    /// The node's live segments in increasing site order; empty when the
    /// node has not been attached yet.
    pub fn live_segments(&self, node: usize) -> Vec<LiveSegment> {
        let mut segments = Vec::new();
        let mut handle = self.heads[node];
        while handle != NULL_HANDLE {
            let link = self.pool.get(handle);
            segments.push(link.segment);
            handle = link.next;
        }
        segments
    }

    pub fn live_intervals(&self, node: usize) -> Vec<(usize, usize)> {
        self.live_segments(node)
            .iter()
            .map(|segment| (segment.left, segment.right))
            .collect()
    }

    /// Total live links held across all nodes.
    pub fn total_segments(&self) -> usize {
        self.pool.len()
    }
}
