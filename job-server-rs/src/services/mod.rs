pub mod job_janitor;
pub mod job_registry;
pub mod job_worker;
