//! Vendor-neutral chat types

mod message;
mod params;
mod stream;
mod tool;

pub use message::*;
pub use params::*;
pub use stream::*;
pub use tool::*;
