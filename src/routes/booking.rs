use log::error;
use mongodb::bson::{DateTime, Document, doc, oid::ObjectId, to_bson};
use rocket::State;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use serde_json::json;

use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{Booking, BookingStatus, CarProvider, CreateBookingDto, UpdateBookingDto};
use crate::utils::{ApiError, ApiResponse};

/// Non-admin users are limited to this many bookings.
const MAX_BOOKINGS_PER_USER: u64 = 3;

fn internal(fail: &'static str) -> impl Fn(mongodb::error::Error) -> ApiError {
    move |e| {
        error!("database error: {}", e);
        ApiError::internal_error(fail)
    }
}

fn parse_booking_id(id: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(id).map_err(|_| ApiError::bad_request("Invalid booking ID"))
}

fn parse_book_date(raw: &str) -> Result<DateTime, ApiError> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|d| DateTime::from_millis(d.timestamp_millis()))
        .map_err(|_| ApiError::bad_request("book_date must be an RFC 3339 timestamp"))
}

async fn find_booking(
    db: &DbConn,
    oid: ObjectId,
    raw_id: &str,
    fail: &'static str,
) -> Result<Booking, ApiError> {
    db.collection::<Booking>("bookings")
        .find_one(doc! { "_id": oid }, None)
        .await
        .map_err(internal(fail))?
        .ok_or_else(|| ApiError::not_found(format!("No booking with the id of {}", raw_id)))
}

fn authorize(booking: &Booking, auth: &AuthGuard, action: &str) -> Result<(), ApiError> {
    if booking.user != auth.user_id && !auth.is_admin() {
        return Err(ApiError::unauthorized(format!(
            "User {} is not authorized to {} this booking",
            auth.user_id.to_hex(),
            action
        )));
    }
    Ok(())
}

/// Booking serialized with its provider reference replaced by the
/// provider's public fields, mirroring a populated read.
async fn populate_provider(
    db: &DbConn,
    booking: &Booking,
    fail: &'static str,
) -> Result<serde_json::Value, ApiError> {
    let mut value = serde_json::to_value(booking).map_err(|e| {
        error!("serialization error: {}", e);
        ApiError::internal_error(fail)
    })?;

    let provider = db
        .collection::<CarProvider>("car_providers")
        .find_one(doc! { "_id": booking.car_provider }, None)
        .await
        .map_err(internal(fail))?;

    if let Some(provider) = provider {
        value["car_provider"] = json!({
            "id": provider.id.map(|id| id.to_hex()),
            "name": provider.name,
            "address": provider.address,
            "telephone": provider.telephone,
        });
    }

    Ok(value)
}

/// Admins see every booking; everyone else sees their own.
#[openapi(tag = "Bookings")]
#[get("/bookings")]
pub async fn get_bookings(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<serde_json::Value>, ApiError> {
    const FAIL: &str = "Cannot fetch bookings";

    let filter = if auth.is_admin() {
        None
    } else {
        Some(doc! { "user": auth.user_id })
    };

    let mut cursor = db
        .collection::<Booking>("bookings")
        .find(filter, None)
        .await
        .map_err(internal(FAIL))?;

    let mut bookings = Vec::new();
    while cursor.advance().await.map_err(internal(FAIL))? {
        let booking = cursor.deserialize_current().map_err(|e| {
            error!("deserialization error: {}", e);
            ApiError::internal_error(FAIL)
        })?;
        bookings.push(populate_provider(db, &booking, FAIL).await?);
    }

    Ok(Json(json!({
        "success": true,
        "count": bookings.len(),
        "data": bookings,
    })))
}

#[openapi(tag = "Bookings")]
#[get("/bookings/<id>")]
pub async fn get_booking(
    db: &State<DbConn>,
    auth: AuthGuard,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    const FAIL: &str = "Cannot fetch booking";

    let oid = parse_booking_id(&id)?;
    let booking = find_booking(db, oid, &id, FAIL).await?;
    authorize(&booking, &auth, "view")?;

    Ok(Json(ApiResponse::success(
        populate_provider(db, &booking, FAIL).await?,
    )))
}

#[openapi(tag = "Bookings")]
#[post("/car-providers/<provider_id>/bookings", data = "<dto>")]
pub async fn add_booking(
    db: &State<DbConn>,
    auth: AuthGuard,
    provider_id: String,
    dto: Json<CreateBookingDto>,
) -> Result<status::Created<Json<ApiResponse<serde_json::Value>>>, ApiError> {
    const FAIL: &str = "Cannot create booking";

    let provider_oid = ObjectId::parse_str(&provider_id)
        .map_err(|_| ApiError::bad_request("Invalid provider ID"))?;

    let provider = db
        .collection::<CarProvider>("car_providers")
        .find_one(doc! { "_id": provider_oid }, None)
        .await
        .map_err(internal(FAIL))?;
    if provider.is_none() {
        return Err(ApiError::not_found(format!(
            "No car provider with the id of {}",
            provider_id
        )));
    }

    let bookings = db.collection::<Booking>("bookings");

    if !auth.is_admin() {
        let existing = bookings
            .count_documents(doc! { "user": auth.user_id }, None)
            .await
            .map_err(internal(FAIL))?;
        if existing >= MAX_BOOKINGS_PER_USER {
            return Err(ApiError::bad_request(format!(
                "The user with ID {} has already made {} bookings",
                auth.user_id.to_hex(),
                MAX_BOOKINGS_PER_USER
            )));
        }
    }

    let mut booking = Booking {
        id: None,
        book_date: parse_book_date(&dto.book_date)?,
        user: auth.user_id,
        car_provider: provider_oid,
        status: BookingStatus::Active,
        review: None,
        created_at: DateTime::now(),
    };

    let result = bookings
        .insert_one(&booking, None)
        .await
        .map_err(internal(FAIL))?;
    booking.id = result.inserted_id.as_object_id();

    let location = booking
        .id
        .map(|id| format!("/api/v1/bookings/{}", id.to_hex()))
        .unwrap_or_else(|| "/api/v1/bookings".to_string());

    Ok(status::Created::new(location).body(Json(ApiResponse::success(json!(booking)))))
}

#[openapi(tag = "Bookings")]
#[put("/bookings/<id>", data = "<dto>")]
pub async fn update_booking(
    db: &State<DbConn>,
    auth: AuthGuard,
    id: String,
    dto: Json<UpdateBookingDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    const FAIL: &str = "Cannot update booking";

    let oid = parse_booking_id(&id)?;
    let booking = find_booking(db, oid, &id, FAIL).await?;
    authorize(&booking, &auth, "update")?;

    let mut set = Document::new();
    if let Some(raw) = &dto.book_date {
        set.insert("book_date", parse_book_date(raw)?);
    }
    if let Some(status) = dto.status {
        set.insert(
            "status",
            to_bson(&status).map_err(|e| {
                error!("serialization error: {}", e);
                ApiError::internal_error(FAIL)
            })?,
        );
    }

    if !set.is_empty() {
        db.collection::<Booking>("bookings")
            .update_one(doc! { "_id": oid }, doc! { "$set": set }, None)
            .await
            .map_err(internal(FAIL))?;
    }

    let updated = find_booking(db, oid, &id, FAIL).await?;

    Ok(Json(ApiResponse::success(json!(updated))))
}

#[openapi(tag = "Bookings")]
#[delete("/bookings/<id>")]
pub async fn delete_booking(
    db: &State<DbConn>,
    auth: AuthGuard,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    const FAIL: &str = "Cannot delete booking";

    let oid = parse_booking_id(&id)?;
    let booking = find_booking(db, oid, &id, FAIL).await?;
    authorize(&booking, &auth, "delete")?;

    db.collection::<Booking>("bookings")
        .delete_one(doc! { "_id": oid }, None)
        .await
        .map_err(internal(FAIL))?;

    Ok(Json(ApiResponse::success(json!({}))))
}
