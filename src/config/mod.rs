use rocket::Config as RocketConfig;
use rocket::figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use std::env;

pub struct Config;

impl Config {
    fn figment() -> Figment {
        let profile = env::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string());

        Figment::from(RocketConfig::default())
            .merge(Toml::file("Rocket.toml").nested())
            .select(&profile)
            .merge(Env::prefixed("ROCKET_"))
    }

    pub fn mongodb_uri() -> String {
        Self::figment()
            .extract_inner("mongodb_uri")
            .unwrap_or_else(|_| "mongodb://localhost:27017/carbook".to_string())
    }

    pub fn jwt_secret() -> String {
        Self::figment()
            .extract_inner("jwt_secret")
            .unwrap_or_else(|_| "default-secret".to_string())
    }

    pub fn jwt_expiry() -> i64 {
        Self::figment().extract_inner("jwt_expiry").unwrap_or(86400)
    }

    pub fn openrouter_api_key() -> Option<String> {
        Self::figment()
            .extract_inner("openrouter_api_key")
            .ok()
            .or_else(|| env::var("OPENROUTER_API_KEY").ok())
    }

    pub fn moderation_model() -> String {
        Self::figment()
            .extract_inner("moderation_model")
            .unwrap_or_else(|_| "openai/gpt-4o-mini".to_string())
    }
}
