pub mod auth;
pub mod booking;
pub mod provider;
pub mod review;
