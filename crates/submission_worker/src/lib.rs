pub mod domain;
pub mod nats;
pub mod submission_worker;

pub use domain::*;
pub use nats::*;
pub use submission_worker::*;
