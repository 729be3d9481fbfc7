use log::error;
use mongodb::bson::{DateTime, doc};
use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{LoginDto, RegisterDto, Role, User, UserResponse};
use crate::services::JwtService;
use crate::utils::{ApiError, ApiResponse, validate_email, validate_telephone};

const MIN_PASSWORD_LEN: usize = 6;

fn token_response(user: &User) -> Result<serde_json::Value, ApiError> {
    let user_id = user
        .id
        .ok_or_else(|| ApiError::internal_error("User has no id"))?;

    let token = JwtService::generate_token(&user_id, user.role).map_err(|e| {
        error!("JWT signing failed: {}", e);
        ApiError::internal_error("Cannot issue token")
    })?;

    Ok(serde_json::json!({ "success": true, "token": token }))
}

#[openapi(tag = "Auth")]
#[post("/auth/register", data = "<dto>")]
pub async fn register(
    db: &State<DbConn>,
    dto: Json<RegisterDto>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if dto.name.trim().is_empty() {
        return Err(ApiError::bad_request("Please add a name"));
    }
    if !validate_email(&dto.email) {
        return Err(ApiError::bad_request("Please add a valid email"));
    }
    if !validate_telephone(&dto.telephone) {
        return Err(ApiError::bad_request("Please add a valid telephone number"));
    }
    if dto.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(
            "Password must be at least 6 characters",
        ));
    }

    let users = db.collection::<User>("users");

    let existing = users
        .find_one(doc! { "email": &dto.email }, None)
        .await
        .map_err(|e| {
            error!("database error: {}", e);
            ApiError::internal_error("Cannot register user")
        })?;
    if existing.is_some() {
        return Err(ApiError::bad_request("Email already registered"));
    }

    let hash = bcrypt::hash(&dto.password, bcrypt::DEFAULT_COST).map_err(|e| {
        error!("bcrypt failure: {}", e);
        ApiError::internal_error("Cannot register user")
    })?;

    let mut user = User {
        id: None,
        name: dto.name.trim().to_string(),
        email: dto.email.clone(),
        telephone: dto.telephone.clone(),
        role: Role::User,
        password: hash,
        created_at: DateTime::now(),
    };

    let result = users.insert_one(&user, None).await.map_err(|e| {
        error!("database error: {}", e);
        ApiError::internal_error("Cannot register user")
    })?;
    user.id = result.inserted_id.as_object_id();

    Ok(Json(token_response(&user)?))
}

#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<dto>")]
pub async fn login(
    db: &State<DbConn>,
    dto: Json<LoginDto>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if dto.email.is_empty() || dto.password.is_empty() {
        return Err(ApiError::bad_request(
            "Please provide an email and password",
        ));
    }

    let user = db
        .collection::<User>("users")
        .find_one(doc! { "email": &dto.email }, None)
        .await
        .map_err(|e| {
            error!("database error: {}", e);
            ApiError::internal_error("Cannot log in")
        })?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    let matches = bcrypt::verify(&dto.password, &user.password).map_err(|e| {
        error!("bcrypt failure: {}", e);
        ApiError::internal_error("Cannot log in")
    })?;
    if !matches {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    Ok(Json(token_response(&user)?))
}

#[openapi(tag = "Auth")]
#[get("/auth/me")]
pub async fn get_me(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let user = db
        .collection::<User>("users")
        .find_one(doc! { "_id": auth.user_id }, None)
        .await
        .map_err(|e| {
            error!("database error: {}", e);
            ApiError::internal_error("Cannot fetch profile")
        })?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(ApiResponse::success(user.into())))
}
