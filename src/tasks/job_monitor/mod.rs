pub mod feed_reader;
pub mod pipeline;
pub mod quota;
pub mod runner;

pub use pipeline::{run_once, RunSummary};
pub use runner::Scheduler;
