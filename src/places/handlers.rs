use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{PlaceResponse, PlacesResponse, UpdatePlaceRequest};
use super::services::NewPlace;
use crate::{
    error::{AppError, MessageBody},
    extract::{JsonBody, MultipartForm, PathId},
    state::AppState,
    storage::{discard_object, place_image_key},
};

pub fn place_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/places",
            post(create_place).layer(DefaultBodyLimit::max(10 * 1024 * 1024)), // 10MB
        )
        .route(
            "/places/:pid",
            get(get_place).patch(update_place).delete(delete_place),
        )
        .route("/places/user/:uid", get(get_places_by_user))
}

#[instrument(skip(state))]
pub async fn get_place(
    State(state): State<AppState>,
    PathId(pid): PathId,
) -> Result<Json<PlaceResponse>, AppError> {
    let place = state.places.get_place(pid).await?;
    Ok(Json(PlaceResponse { place }))
}

#[instrument(skip(state))]
pub async fn get_places_by_user(
    State(state): State<AppState>,
    PathId(uid): PathId,
) -> Result<Json<PlacesResponse>, AppError> {
    let places = state.places.get_places_by_user(uid).await?;
    Ok(Json(PlacesResponse { places }))
}

struct ImageUpload {
    body: Bytes,
    content_type: String,
}

/// Text fields plus the image file of a create request.
#[derive(Default)]
struct CreateForm {
    title: String,
    description: String,
    address: String,
    creator: String,
    image: Option<ImageUpload>,
}

async fn read_create_form(mut mp: Multipart) -> Result<CreateForm, AppError> {
    let mut form = CreateForm::default();
    while let Some(field) = mp.next_field().await.map_err(|e| {
        warn!(error = %e, "malformed multipart body");
        AppError::invalid_inputs()
    })? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let body = field.bytes().await.map_err(|_| AppError::invalid_inputs())?;
            form.image = Some(ImageUpload { body, content_type });
            continue;
        }
        let value = field.text().await.map_err(|_| AppError::invalid_inputs())?;
        match name.as_str() {
            "title" => form.title = value,
            "description" => form.description = value,
            "address" => form.address = value,
            "creator" => form.creator = value,
            _ => {}
        }
    }
    Ok(form)
}

/// POST /places (multipart: title, description, address, creator, image)
///
/// The image is stored first. If the place cannot be created the stored
/// object is deleted again before the error is returned.
#[instrument(skip(state, mp))]
pub async fn create_place(
    State(state): State<AppState>,
    MultipartForm(mp): MultipartForm,
) -> Result<(StatusCode, Json<PlaceResponse>), AppError> {
    let form = read_create_form(mp).await?;
    let creator = Uuid::parse_str(form.creator.trim()).map_err(|_| AppError::invalid_inputs())?;
    let image = form
        .image
        .filter(|img| !img.body.is_empty())
        .ok_or_else(AppError::invalid_inputs)?;

    let key = place_image_key(&image.content_type);
    let new = NewPlace {
        title: form.title,
        description: form.description,
        address: form.address,
        image: key.clone(),
        creator,
    }
    .validated()?;

    state
        .storage
        .put_object(&key, image.body, &image.content_type)
        .await
        .map_err(|e| {
            warn!(error = %e, key = %key, "image upload failed");
            AppError::ExternalService("Uploading image failed, please try again.".into())
        })?;

    match state.places.create_place(new).await {
        Ok(place) => Ok((StatusCode::CREATED, Json(PlaceResponse { place }))),
        Err(e) => {
            info!(key = %key, "discarding image of failed create");
            discard_object(state.storage.as_ref(), &key).await;
            Err(e)
        }
    }
}

#[instrument(skip(state, body))]
pub async fn update_place(
    State(state): State<AppState>,
    PathId(pid): PathId,
    JsonBody(body): JsonBody<UpdatePlaceRequest>,
) -> Result<Json<PlaceResponse>, AppError> {
    let place = state
        .places
        .update_place(pid, body.title, body.description)
        .await?;
    Ok(Json(PlaceResponse { place }))
}

#[instrument(skip(state))]
pub async fn delete_place(
    State(state): State<AppState>,
    PathId(pid): PathId,
) -> Result<Json<MessageBody>, AppError> {
    let removed = state.places.delete_place(pid).await?;
    discard_object(state.storage.as_ref(), &removed.image).await;
    Ok(Json(MessageBody {
        message: "Deleted place.".into(),
    }))
}
