use serde::{Deserialize, Serialize};

use crate::store::Place;

#[derive(Debug, Serialize)]
pub struct PlaceResponse {
    pub place: Place,
}

#[derive(Debug, Serialize)]
pub struct PlacesResponse {
    pub places: Vec<Place>,
}

/// Missing fields decode as blank and fail validation like blank ones.
#[derive(Debug, Deserialize)]
pub struct UpdatePlaceRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}
