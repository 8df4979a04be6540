pub mod attempt_tracker;
pub mod auth;
pub mod hotp;
pub mod hydra;
pub mod secret;
pub mod totp;
pub mod two_factor;

pub use attempt_tracker::{AttemptStore, InMemoryAttemptStore, LockoutPolicy};
pub use auth::AuthService;
pub use totp::TotpVerifier;
pub use two_factor::TwoFactorService;
