use mongodb::bson::{Document, doc, oid::ObjectId, to_bson};
use rocket::State;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use serde_json::json;

use crate::db::DbConn;
use crate::guards::AdminGuard;
use crate::models::{Booking, CarProvider, CreateProviderDto, MAX_PROVIDER_NAME_LEN, UpdateProviderDto};
use crate::query::{ListParams, ListQuery};
use crate::utils::{ApiError, ApiResponse, validate_telephone};

// Provider routes surface underlying error text with a 400, unlike the
// review routes which hide causes behind a generic 500.
fn db_error(e: impl ToString) -> ApiError {
    ApiError::bad_request(e.to_string())
}

fn parse_provider_id(id: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(id).map_err(|_| ApiError::bad_request("Invalid provider ID"))
}

async fn find_provider_bookings(
    db: &DbConn,
    provider_id: ObjectId,
) -> Result<Vec<Booking>, ApiError> {
    let mut cursor = db
        .collection::<Booking>("bookings")
        .find(doc! { "car_provider": provider_id }, None)
        .await
        .map_err(db_error)?;

    let mut bookings = Vec::new();
    while cursor.advance().await.map_err(db_error)? {
        bookings.push(cursor.deserialize_current().map_err(db_error)?);
    }
    Ok(bookings)
}

fn validate_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Please add a name"));
    }
    if name.chars().count() > MAX_PROVIDER_NAME_LEN {
        return Err(ApiError::bad_request(
            "Name can not be more than 50 characters",
        ));
    }
    Ok(name.to_string())
}

/// List car providers through the query pipeline. Each provider carries its
/// derived `bookings` relation, computed here rather than stored.
#[openapi(tag = "Car Providers")]
#[get("/car-providers")]
pub async fn get_providers(
    db: &State<DbConn>,
    params: ListParams,
) -> Result<Json<serde_json::Value>, ApiError> {
    let query = ListQuery::parse(&params.0).map_err(ApiError::bad_request)?;

    let collection = db.collection::<Document>("car_providers");

    // Whole-collection count; the filter is not applied here.
    let total = collection
        .count_documents(None, None)
        .await
        .map_err(db_error)?;

    let mut cursor = collection
        .find(query.filter.clone(), query.find_options())
        .await
        .map_err(db_error)?;

    let mut providers = Vec::new();
    while cursor.advance().await.map_err(db_error)? {
        let mut provider = cursor.deserialize_current().map_err(db_error)?;

        if let Ok(id) = provider.get_object_id("_id") {
            let bookings = find_provider_bookings(db, id).await?;
            provider.insert("bookings", to_bson(&bookings).map_err(db_error)?);
        }

        providers.push(provider);
    }

    Ok(Json(json!({
        "success": true,
        "count": providers.len(),
        "pagination": query.pagination(total),
        "data": providers,
    })))
}

#[openapi(tag = "Car Providers")]
#[get("/car-providers/<id>")]
pub async fn get_provider(
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let oid = parse_provider_id(&id)?;

    let provider = db
        .collection::<CarProvider>("car_providers")
        .find_one(doc! { "_id": oid }, None)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ApiError::not_found(format!("No car provider with the id of {}", id)))?;

    Ok(Json(ApiResponse::success(json!(provider))))
}

#[openapi(tag = "Car Providers")]
#[post("/car-providers", data = "<dto>")]
pub async fn create_provider(
    db: &State<DbConn>,
    _admin: AdminGuard,
    dto: Json<CreateProviderDto>,
) -> Result<status::Created<Json<ApiResponse<serde_json::Value>>>, ApiError> {
    let name = validate_name(&dto.name)?;
    if dto.address.trim().is_empty() {
        return Err(ApiError::bad_request("Please add an address"));
    }
    if !validate_telephone(&dto.telephone) {
        return Err(ApiError::bad_request("Please add a valid telephone number"));
    }

    let collection = db.collection::<CarProvider>("car_providers");

    // Name is unique across providers.
    let duplicate = collection
        .find_one(doc! { "name": &name }, None)
        .await
        .map_err(db_error)?;
    if duplicate.is_some() {
        return Err(ApiError::bad_request(format!(
            "Car provider with name '{}' already exists",
            name
        )));
    }

    let mut provider = CarProvider {
        id: None,
        name,
        address: dto.address.trim().to_string(),
        telephone: dto.telephone.clone(),
    };

    let result = collection.insert_one(&provider, None).await.map_err(db_error)?;
    provider.id = result.inserted_id.as_object_id();

    let location = provider
        .id
        .map(|id| format!("/api/v1/car-providers/{}", id.to_hex()))
        .unwrap_or_else(|| "/api/v1/car-providers".to_string());

    Ok(status::Created::new(location).body(Json(ApiResponse::success(json!(provider)))))
}

#[openapi(tag = "Car Providers")]
#[put("/car-providers/<id>", data = "<dto>")]
pub async fn update_provider(
    db: &State<DbConn>,
    _admin: AdminGuard,
    id: String,
    dto: Json<UpdateProviderDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let oid = parse_provider_id(&id)?;

    let mut set = Document::new();
    if let Some(name) = &dto.name {
        set.insert("name", validate_name(name)?);
    }
    if let Some(address) = &dto.address {
        if address.trim().is_empty() {
            return Err(ApiError::bad_request("Please add an address"));
        }
        set.insert("address", address.trim());
    }
    if let Some(telephone) = &dto.telephone {
        if !validate_telephone(telephone) {
            return Err(ApiError::bad_request("Please add a valid telephone number"));
        }
        set.insert("telephone", telephone.as_str());
    }

    let collection = db.collection::<CarProvider>("car_providers");

    if !set.is_empty() {
        collection
            .update_one(doc! { "_id": oid }, doc! { "$set": set }, None)
            .await
            .map_err(db_error)?;
    }

    let provider = collection
        .find_one(doc! { "_id": oid }, None)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ApiError::not_found(format!("No car provider with the id of {}", id)))?;

    Ok(Json(ApiResponse::success(json!(provider))))
}

/// Deletes a provider and its dependent bookings. Bookings go first so a
/// failure cannot leave bookings pointing at a missing provider.
#[openapi(tag = "Car Providers")]
#[delete("/car-providers/<id>")]
pub async fn delete_provider(
    db: &State<DbConn>,
    _admin: AdminGuard,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let oid = parse_provider_id(&id)?;

    let collection = db.collection::<CarProvider>("car_providers");

    let provider = collection
        .find_one(doc! { "_id": oid }, None)
        .await
        .map_err(db_error)?;
    if provider.is_none() {
        return Err(ApiError::not_found(format!(
            "No car provider with the id of {}",
            id
        )));
    }

    db.collection::<Booking>("bookings")
        .delete_many(doc! { "car_provider": oid }, None)
        .await
        .map_err(db_error)?;

    collection
        .delete_one(doc! { "_id": oid }, None)
        .await
        .map_err(db_error)?;

    Ok(Json(ApiResponse::success(json!({}))))
}
