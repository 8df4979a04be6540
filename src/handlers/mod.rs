pub mod health;
pub mod two_factor;

pub use health::health_check;
pub use two_factor::{two_factor, two_factor_status};
