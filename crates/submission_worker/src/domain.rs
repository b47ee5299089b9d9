pub mod codec;
mod error;
mod record_builder;
mod submission;
mod transport;
mod validation;

pub use codec::CodecError;
pub use error::*;
pub use record_builder::*;
pub use submission::*;
pub use transport::*;
pub use validation::{is_valid_event, is_valid_submission};
