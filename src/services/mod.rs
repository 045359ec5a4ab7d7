pub mod clock;
pub mod poller;
pub mod progress;
pub mod registry;
pub mod results;
pub mod scheduler;
pub mod status;
pub mod store;
