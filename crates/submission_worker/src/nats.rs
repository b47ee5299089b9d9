mod conversions;
mod event_stream_producer;
mod submission_queue;

pub use event_stream_producer::*;
pub use submission_queue::*;
