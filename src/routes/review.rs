use log::error;
use mongodb::bson::{Bson, DateTime, doc, oid::ObjectId, to_bson};
use rocket::State;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use serde_json::json;

use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{Booking, BookingStatus, Review, ReviewDto};
use crate::services::moderation::{ModerationService, Verdict};
use crate::utils::{ApiError, ApiResponse};

// Review routes never leak the underlying failure: unexpected errors are
// logged and answered with one of these generic messages.
const SUBMIT_FAIL: &str = "Cannot submit review";
const UPDATE_FAIL: &str = "Cannot update review";
const DELETE_FAIL: &str = "Cannot delete review";

fn parse_booking_id(id: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(id).map_err(|_| ApiError::bad_request("Invalid booking ID"))
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
        .map_err(|e| {
            error!("database error: {}", e);
            ApiError::internal_error(fail)
        })?
        .ok_or_else(|| ApiError::not_found(format!("No booking with the id of {}", raw_id)))
}

/// Only the booking owner or an admin may touch its review.
fn authorize(booking: &Booking, auth: &AuthGuard, action: &str) -> Result<(), ApiError> {
    if booking.user != auth.user_id && !auth.is_admin() {
        return Err(ApiError::unauthorized(format!(
            "User {} is not authorized to {}",
            auth.user_id.to_hex(),
            action
        )));
    }
    Ok(())
}

/// Creation-side state checks: booking completed, no review yet.
fn ensure_reviewable(booking: &Booking) -> Result<(), ApiError> {
    if booking.status != BookingStatus::Completed {
        return Err(ApiError::bad_request(
            "You can only review a completed booking",
        ));
    }
    if booking.review.is_some() {
        return Err(ApiError::bad_request(
            "A review already exists for this booking",
        ));
    }
    Ok(())
}

fn validate_submission(dto: &ReviewDto) -> Result<(i32, String), ApiError> {
    match (dto.rating, dto.comment.as_deref()) {
        (Some(rating), Some(comment)) if (1..=5).contains(&rating) && !comment.is_empty() => {
            Ok((rating, comment.to_string()))
        }
        _ => Err(ApiError::bad_request(
            "Please provide both a rating (1-5) and a comment",
        )),
    }
}

/// Gate a comment through the moderation service. A REJECTED verdict is a
/// client error carrying the reason; a failed or malformed call is an
/// internal error, never a rejection.
async fn moderate_comment(comment: &str, fail: &'static str) -> Result<(), ApiError> {
    let moderation = ModerationService::moderate(comment).await.map_err(|e| {
        error!("moderation call failed: {}", e);
        ApiError::internal_error(fail)
    })?;

    if moderation.verdict == Verdict::Rejected {
        return Err(ApiError::bad_request(format!(
            "Your review was rejected because of the following reason: {}",
            moderation.reason
        )));
    }

    Ok(())
}

#[openapi(tag = "Reviews")]
#[post("/bookings/<booking_id>/review", data = "<dto>")]
pub async fn add_review(
    db: &State<DbConn>,
    auth: AuthGuard,
    booking_id: String,
    dto: Json<ReviewDto>,
) -> Result<status::Created<Json<ApiResponse<serde_json::Value>>>, ApiError> {
    let oid = parse_booking_id(&booking_id)?;
    let booking = find_booking(db, oid, &booking_id, SUBMIT_FAIL).await?;

    authorize(&booking, &auth, "review this booking")?;
    ensure_reviewable(&booking)?;
    let (rating, comment) = validate_submission(&dto)?;

    moderate_comment(&comment, SUBMIT_FAIL).await?;

    let now = DateTime::now();
    let review = Review {
        rating,
        comment,
        created_at: now,
        updated_at: now,
    };
    let review_bson = to_bson(&review).map_err(|e| {
        error!("serialization error: {}", e);
        ApiError::internal_error(SUBMIT_FAIL)
    })?;

    // Conditional on the review still being absent, so two racing
    // submissions cannot both land.
    let result = db
        .collection::<Booking>("bookings")
        .update_one(
            doc! { "_id": oid, "review.rating": Bson::Null },
            doc! { "$set": { "review": review_bson } },
            None,
        )
        .await
        .map_err(|e| {
            error!("database error: {}", e);
            ApiError::internal_error(SUBMIT_FAIL)
        })?;

    if result.matched_count == 0 {
        return Err(ApiError::bad_request(
            "A review already exists for this booking",
        ));
    }

    let updated = find_booking(db, oid, &booking_id, SUBMIT_FAIL).await?;

    Ok(
        status::Created::new(format!("/api/v1/bookings/{}/review", booking_id))
            .body(Json(ApiResponse::success(json!(updated)))),
    )
}

#[openapi(tag = "Reviews")]
#[put("/bookings/<booking_id>/review", data = "<dto>")]
pub async fn update_review(
    db: &State<DbConn>,
    auth: AuthGuard,
    booking_id: String,
    dto: Json<ReviewDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let oid = parse_booking_id(&booking_id)?;
    let booking = find_booking(db, oid, &booking_id, UPDATE_FAIL).await?;

    authorize(&booking, &auth, "update this review")?;

    if booking.review.is_none() {
        return Err(ApiError::not_found("No review found for this booking"));
    }

    if let Some(rating) = dto.rating {
        if !(1..=5).contains(&rating) {
            return Err(ApiError::bad_request("Rating must be between 1 and 5"));
        }
    }

    // Only a changed comment goes back through moderation.
    if let Some(comment) = &dto.comment {
        moderate_comment(comment, UPDATE_FAIL).await?;
    }

    let mut set = doc! { "review.updated_at": DateTime::now() };
    if let Some(rating) = dto.rating {
        set.insert("review.rating", rating);
    }
    if let Some(comment) = &dto.comment {
        set.insert("review.comment", comment.as_str());
    }

    db.collection::<Booking>("bookings")
        .update_one(doc! { "_id": oid }, doc! { "$set": set }, None)
        .await
        .map_err(|e| {
            error!("database error: {}", e);
            ApiError::internal_error(UPDATE_FAIL)
        })?;

    let updated = find_booking(db, oid, &booking_id, UPDATE_FAIL).await?;

    Ok(Json(ApiResponse::success(json!(updated))))
}

#[openapi(tag = "Reviews")]
#[delete("/bookings/<booking_id>/review")]
pub async fn delete_review(
    db: &State<DbConn>,
    auth: AuthGuard,
    booking_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let oid = parse_booking_id(&booking_id)?;
    let booking = find_booking(db, oid, &booking_id, DELETE_FAIL).await?;

    authorize(&booking, &auth, "delete this review")?;

    if booking.review.is_none() {
        return Err(ApiError::not_found("No review found for this booking"));
    }

    // Unset the whole subdocument rather than zeroing its fields.
    db.collection::<Booking>("bookings")
        .update_one(doc! { "_id": oid }, doc! { "$unset": { "review": "" } }, None)
        .await
        .map_err(|e| {
            error!("database error: {}", e);
            ApiError::internal_error(DELETE_FAIL)
        })?;

    Ok(Json(ApiResponse::success(json!({}))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use rocket::http::Status;

    fn booking(status: BookingStatus, review: Option<Review>) -> Booking {
        Booking {
            id: Some(ObjectId::new()),
            book_date: DateTime::now(),
            user: ObjectId::new(),
            car_provider: ObjectId::new(),
            status,
            review,
            created_at: DateTime::now(),
        }
    }

    fn review() -> Review {
        let now = DateTime::now();
        Review {
            rating: 4,
            comment: "Great service".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn owner_may_review() {
        let b = booking(BookingStatus::Completed, None);
        let auth = AuthGuard {
            user_id: b.user,
            role: Role::User,
        };
        assert!(authorize(&b, &auth, "review this booking").is_ok());
    }

    #[test]
    fn admin_may_review_any_booking() {
        let b = booking(BookingStatus::Completed, None);
        let auth = AuthGuard {
            user_id: ObjectId::new(),
            role: Role::Admin,
        };
        assert!(authorize(&b, &auth, "review this booking").is_ok());
    }

    #[test]
    fn stranger_is_unauthorized() {
        let b = booking(BookingStatus::Completed, None);
        let auth = AuthGuard {
            user_id: ObjectId::new(),
            role: Role::User,
        };
        let err = authorize(&b, &auth, "review this booking").unwrap_err();
        assert_eq!(err.status, Status::Unauthorized);
        assert!(err.message.contains("not authorized"));
    }

    #[test]
    fn active_booking_is_not_reviewable() {
        let b = booking(BookingStatus::Active, None);
        let err = ensure_reviewable(&b).unwrap_err();
        assert_eq!(err.status, Status::BadRequest);
        assert_eq!(err.message, "You can only review a completed booking");
    }

    #[test]
    fn second_review_is_a_conflict() {
        let b = booking(BookingStatus::Completed, Some(review()));
        let err = ensure_reviewable(&b).unwrap_err();
        assert_eq!(err.status, Status::BadRequest);
        assert_eq!(err.message, "A review already exists for this booking");
    }

    #[test]
    fn completed_unreviewed_booking_is_reviewable() {
        let b = booking(BookingStatus::Completed, None);
        assert!(ensure_reviewable(&b).is_ok());
    }

    #[test]
    fn submission_requires_rating_and_comment() {
        let missing_comment = ReviewDto {
            rating: Some(4),
            comment: None,
        };
        assert!(validate_submission(&missing_comment).is_err());

        let missing_rating = ReviewDto {
            rating: None,
            comment: Some("ok".to_string()),
        };
        assert!(validate_submission(&missing_rating).is_err());

        let empty_comment = ReviewDto {
            rating: Some(4),
            comment: Some(String::new()),
        };
        assert!(validate_submission(&empty_comment).is_err());
    }

    #[test]
    fn rating_outside_one_to_five_is_rejected() {
        for rating in [0, 6, -1] {
            let dto = ReviewDto {
                rating: Some(rating),
                comment: Some("ok".to_string()),
            };
            let err = validate_submission(&dto).unwrap_err();
            assert_eq!(err.status, Status::BadRequest);
        }
    }

    #[test]
    fn valid_submission_passes_through() {
        let dto = ReviewDto {
            rating: Some(4),
            comment: Some("Great service".to_string()),
        };
        let (rating, comment) = validate_submission(&dto).unwrap();
        assert_eq!(rating, 4);
        assert_eq!(comment, "Great service");
    }
}
