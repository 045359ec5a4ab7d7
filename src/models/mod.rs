pub mod job;
pub mod remote;
