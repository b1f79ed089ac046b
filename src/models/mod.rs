pub mod job_alert;
pub mod user;
