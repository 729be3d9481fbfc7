use mongodb::bson::{DateTime, oid::ObjectId};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Active,
    Completed,
}

/// Review subdocument embedded in a booking. A booking without a review
/// simply has no `review` field; deletion unsets the whole subdocument.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Review {
    pub rating: i32, // 1-5
    pub comment: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Booking {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub book_date: DateTime,
    pub user: ObjectId,
    pub car_provider: ObjectId,
    pub status: BookingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<Review>,
    pub created_at: DateTime,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateBookingDto {
    /// RFC 3339 timestamp of the reservation.
    pub book_date: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateBookingDto {
    pub book_date: Option<String>,
    pub status: Option<BookingStatus>,
}

/// Shared payload for review create and update. Creation requires both
/// fields; update treats each as optional.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReviewDto {
    pub rating: Option<i32>,
    pub comment: Option<String>,
}
