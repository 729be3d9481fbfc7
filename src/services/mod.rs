pub mod jwt;
pub mod moderation;

pub use jwt::JwtService;
pub use moderation::ModerationService;
