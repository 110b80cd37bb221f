mod error;
mod ids;
mod pool;
mod worker;

pub use crate::error::*;
pub use crate::ids::*;
pub use crate::pool::*;
pub use crate::worker::*;
