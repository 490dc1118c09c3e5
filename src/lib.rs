#[macro_use]
extern crate log;

pub mod ancestors;
pub mod matching;
pub mod model;
pub mod processing;
pub mod tree_sequence;
pub mod utils;
