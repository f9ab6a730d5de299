//! Wire protocol types.

mod messages;

pub use messages::*;
