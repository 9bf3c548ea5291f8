//! Partition planner (component H): pure arithmetic deciding which node
//! and which partition owns a given document hash.
//!
//! No single teacher module owns this concern — the teacher has no
//! cluster-partitioning layer — so it is shaped the way
//! `profiles/mod.rs::Bm25Params::score` is: a small, stateless, easily
//! tested pure function.

/// Whether partition `partition_id` (of `num_partitions` total) owns `h`.
pub fn owns_partition(h: u64, partition_id: u64, num_partitions: u64) -> bool {
    debug_assert!(num_partitions > 0);
    h % num_partitions == partition_id
}

/// Whether node `node_id` (of `nodes_in_cluster` total) owns `h` within
/// partition `partition_id`.
pub fn owns_node(h: u64, partition_id: u64, num_partitions: u64, node_id: u64, nodes_in_cluster: u64) -> bool {
    debug_assert!(num_partitions > 0);
    debug_assert!(nodes_in_cluster > 0);
    (h / num_partitions) % nodes_in_cluster == node_id
}

/// A planner bound to one cluster shape (`P` partitions, `K` nodes),
/// used by the indexer to decide whether it should index a given
/// document hash for its assigned `(partition_id, node_id)`.
#[derive(Debug, Clone, Copy)]
pub struct PartitionPlanner {
    pub num_partitions: u64,
    pub nodes_in_cluster: u64,
}

impl PartitionPlanner {
    pub fn new(num_partitions: u64, nodes_in_cluster: u64) -> Self {
        Self {
            num_partitions,
            nodes_in_cluster,
        }
    }

    /// Combined ownership check per §4.H: a node indexes `(h,
    /// partition_id)` iff it owns both the partition and the node slice.
    pub fn should_index(&self, h: u64, partition_id: u64, node_id: u64) -> bool {
        owns_partition(h, partition_id, self.num_partitions) && owns_node(h, partition_id, self.num_partitions, node_id, self.nodes_in_cluster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_and_partitions_the_full_range() {
        let num_partitions = 8u64;
        let nodes_in_cluster = 3u64;

        // Every partition id is owned by exactly one hash value mod P,
        // and disjoint from every other partition id for a fixed hash.
        for h in 0..64u64 {
            let owners: Vec<u64> = (0..num_partitions).filter(|&p| owns_partition(h, p, num_partitions)).collect();
            assert_eq!(owners.len(), 1);
        }

        // Every (partition, node) pair is disjoint across node ids for a
        // fixed hash-and-partition, and the union across all node ids
        // covers every hash assigned to that partition.
        for h in 0..(num_partitions * nodes_in_cluster * 4) {
            let p = h % num_partitions;
            let owning_nodes: Vec<u64> = (0..nodes_in_cluster).filter(|&k| owns_node(h, p, num_partitions, k, nodes_in_cluster)).collect();
            assert_eq!(owning_nodes.len(), 1);
        }
    }

    #[test]
    fn should_index_requires_both_partition_and_node_ownership() {
        let planner = PartitionPlanner::new(8, 3);
        let h = 42u64;
        let p = h % 8;
        let k = (h / 8) % 3;
        assert!(planner.should_index(h, p, k));
        assert!(!planner.should_index(h, (p + 1) % 8, k));
        assert!(!planner.should_index(h, p, (k + 1) % 3));
    }
}
