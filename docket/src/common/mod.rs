//! Shared value types, constants and request throttling helpers.

mod constants;
mod retry;
mod throttle;
mod value;

pub use constants::*;
pub use retry::*;
pub use throttle::*;
pub use value::*;
