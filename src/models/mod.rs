pub mod booking;
pub mod provider;
pub mod user;

pub use booking::*;
pub use provider::*;
pub use user::*;
