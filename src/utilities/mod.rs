//! Console utilities.

pub mod printer;
