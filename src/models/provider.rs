use mongodb::bson::oid::ObjectId;
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const MAX_PROVIDER_NAME_LEN: usize = 50;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CarProvider {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub address: String,
    pub telephone: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateProviderDto {
    pub name: String,
    pub address: String,
    pub telephone: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateProviderDto {
    pub name: Option<String>,
    pub address: Option<String>,
    pub telephone: Option<String>,
}
