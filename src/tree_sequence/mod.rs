pub mod node_mapping;
pub mod tables;
pub mod tree_sequence_builder;
