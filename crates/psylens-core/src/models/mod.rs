pub mod analysis;
pub mod phi;
pub mod result;
pub mod task;
