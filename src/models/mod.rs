pub mod attempt_state;
pub mod security_settings;
pub mod shared_secret;
pub mod user;

pub use attempt_state::AttemptState;
pub use security_settings::{SecuritySettings, TwoFactorState};
pub use shared_secret::SharedSecret;
pub use user::User;
