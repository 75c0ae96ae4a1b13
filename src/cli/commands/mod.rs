pub mod analyze;
pub mod batch;
pub mod check;
pub mod clean;
pub mod config;
pub mod estimate;
