//! Vendor wire formats

pub mod anthropic;
pub mod google;
pub mod openai;
pub mod responses;
