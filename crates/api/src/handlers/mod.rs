pub mod environments;
pub mod execution;
