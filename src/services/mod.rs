pub mod inference;
pub mod paths;
pub mod queue;
pub mod storage;
pub mod worker;
