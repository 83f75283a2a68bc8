pub mod deployments;
pub mod master;
pub mod nodes;
pub mod runs;
