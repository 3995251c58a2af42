pub mod job;
pub mod predict;
pub mod report;
