pub mod direction;
pub mod error;

pub use direction::Direction;
pub use error::{DriverError, Error, Result};
