pub mod graph;
pub mod pass;
pub mod shader_table;
pub mod target;
