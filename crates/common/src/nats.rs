mod client;
mod error;
mod trace_context;
mod traits;

pub use client::*;
pub use error::*;
pub use trace_context::*;
pub use traits::*;
