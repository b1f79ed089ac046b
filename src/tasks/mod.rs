pub mod email_sender;
pub mod job_monitor;
pub mod types;
