pub mod edgeset;
pub mod mutation;
pub mod segment;
pub mod site;
