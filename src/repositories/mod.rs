pub mod security_settings;
pub mod two_factor_attempt;
pub mod user;

pub use security_settings::{SecuritySettingsRepository, SecuritySettingsStore};
pub use two_factor_attempt::TwoFactorAttemptRepository;
pub use user::UserRepository;
