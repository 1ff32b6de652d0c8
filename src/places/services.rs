//! Place use-cases.
//!
//! Keeps `Place.creator` and `User.places` pointing at each other. Create and
//! delete touch both collections inside one store transaction; the transaction
//! is only opened after geocoding has succeeded, so a slow provider never holds
//! locks. Update touches the place record alone.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{AppError, Resource};
use crate::geocode::GeocodeResolver;
use crate::store::{EntityStore, Location, Place, StoreError, StoreTx};

/// Input for [`PlaceService::create_place`].
#[derive(Debug, Clone)]
pub struct NewPlace {
    pub title: String,
    pub description: String,
    pub address: String,
    pub image: String,
    pub creator: Uuid,
}

impl NewPlace {
    /// Trims every text field; any blank one is a validation error.
    pub fn validated(self) -> Result<Self, AppError> {
        Ok(Self {
            title: required(self.title)?,
            description: required(self.description)?,
            address: required(self.address)?,
            image: required(self.image)?,
            creator: self.creator,
        })
    }
}

fn required(value: String) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_inputs());
    }
    Ok(trimmed.to_string())
}

/// Logs a broken ownership link. Callers decide whether to continue.
fn report_violation(message: String) -> AppError {
    let violation = AppError::ConsistencyViolation(message);
    warn!(violation = %violation, "consistency violation");
    violation
}

#[derive(Clone)]
pub struct PlaceService {
    store: Arc<dyn EntityStore>,
    geocoder: Arc<dyn GeocodeResolver>,
    geocode_timeout: Duration,
}

impl PlaceService {
    pub fn new(
        store: Arc<dyn EntityStore>,
        geocoder: Arc<dyn GeocodeResolver>,
        geocode_timeout: Duration,
    ) -> Self {
        Self {
            store,
            geocoder,
            geocode_timeout,
        }
    }

    #[instrument(name = "places.get", skip(self))]
    pub async fn get_place(&self, id: Uuid) -> Result<Place, AppError> {
        self.store
            .find_place(id)
            .await
            .map_err(|e| AppError::persistence("Fetching place failed, please try again.", e))?
            .ok_or(AppError::NotFound(Resource::Place))
    }

    /// An unknown user and a user without places are both `NotFound`; the
    /// resource tag tells them apart.
    #[instrument(name = "places.by_user", skip(self))]
    pub async fn get_places_by_user(&self, user_id: Uuid) -> Result<Vec<Place>, AppError> {
        let (user, places) = self
            .store
            .user_with_places(user_id)
            .await
            .map_err(|e| AppError::persistence("Fetching places failed, please try again.", e))?
            .ok_or(AppError::NotFound(Resource::User))?;

        if places.len() != user.places.len() {
            return Err(report_violation(format!(
                "user {user_id} lists {} places but only {} exist",
                user.places.len(),
                places.len()
            )));
        }
        if let Some(stray) = places.iter().find(|p| p.creator != user_id) {
            return Err(report_violation(format!(
                "user {user_id} lists place {} created by {}",
                stray.id, stray.creator
            )));
        }
        if places.is_empty() {
            return Err(AppError::NotFound(Resource::Places));
        }
        Ok(places)
    }

    #[instrument(name = "places.create", skip(self, new), fields(creator = %new.creator))]
    pub async fn create_place(&self, new: NewPlace) -> Result<Place, AppError> {
        let new = new.validated()?;
        let location = self.locate(&new.address).await?;

        if self
            .store
            .find_user(new.creator)
            .await
            .map_err(|e| AppError::persistence("Creating place failed, please try again.", e))?
            .is_none()
        {
            return Err(AppError::NotFound(Resource::User));
        }

        let place = Place {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            address: new.address,
            location,
            image: new.image,
            creator: new.creator,
            created_at: OffsetDateTime::now_utc(),
        };

        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| AppError::persistence("Creating place failed, please try again.", e))?;

        match link(tx.as_mut(), &place).await {
            Ok(true) => {}
            Ok(false) => {
                rollback(tx).await;
                return Err(AppError::NotFound(Resource::User));
            }
            Err(e) => {
                rollback(tx).await;
                return Err(AppError::persistence(
                    "Creating place failed, please try again.",
                    e,
                ));
            }
        }
        tx.commit()
            .await
            .map_err(|e| AppError::persistence("Creating place failed, please try again.", e))?;

        info!(place_id = %place.id, "place created");
        Ok(place)
    }

    #[instrument(name = "places.update", skip(self, title, description))]
    pub async fn update_place(
        &self,
        id: Uuid,
        title: String,
        description: String,
    ) -> Result<Place, AppError> {
        let title = required(title)?;
        let description = required(description)?;

        let place = self
            .store
            .update_place_details(id, &title, &description)
            .await
            .map_err(|e| AppError::persistence("Updating place failed, please try again.", e))?
            .ok_or(AppError::NotFound(Resource::Place))?;
        info!(place_id = %id, "place updated");
        Ok(place)
    }

    /// Returns the removed record so the caller can release its image.
    #[instrument(name = "places.delete", skip(self))]
    pub async fn delete_place(&self, id: Uuid) -> Result<Place, AppError> {
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| AppError::persistence("Deleting place failed, please try again.", e))?;

        let place = match unlink(tx.as_mut(), id).await {
            Ok(Some(place)) => place,
            Ok(None) => {
                rollback(tx).await;
                return Err(AppError::NotFound(Resource::Place));
            }
            Err(e) => {
                rollback(tx).await;
                return Err(AppError::persistence(
                    "Deleting place failed, please try again.",
                    e,
                ));
            }
        };
        tx.commit()
            .await
            .map_err(|e| AppError::persistence("Deleting place failed, please try again.", e))?;

        info!(place_id = %id, creator = %place.creator, "place deleted");
        Ok(place)
    }

    async fn locate(&self, address: &str) -> Result<Location, AppError> {
        match tokio::time::timeout(self.geocode_timeout, self.geocoder.resolve(address)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = self.geocode_timeout.as_millis() as u64, "geocoding timed out");
                Err(AppError::ExternalService(
                    "Geocoding service timed out.".into(),
                ))
            }
        }
    }
}

/// Insert the place and list it on its creator. `Ok(false)` if the creator
/// is gone.
async fn link(tx: &mut dyn StoreTx, place: &Place) -> Result<bool, StoreError> {
    tx.insert_place(place).await?;
    tx.add_place_to_user(place.creator, place.id).await
}

/// Remove the place and unlist it from its owner. A dangling owner is
/// reported and the orphan is removed anyway. `Ok(None)` if the place is gone.
async fn unlink(tx: &mut dyn StoreTx, place_id: Uuid) -> Result<Option<Place>, StoreError> {
    let Some(place) = tx.place(place_id).await? else {
        return Ok(None);
    };

    match tx.user(place.creator).await? {
        Some(owner) => {
            if !owner.places.contains(&place.id) {
                report_violation(format!(
                    "place {} missing from its owner's list {}",
                    place.id, owner.id
                ));
            }
            tx.remove_place_from_user(owner.id, place.id).await?;
        }
        None => {
            report_violation(format!(
                "place {} references missing user {}",
                place.id, place.creator
            ));
        }
    }

    if !tx.delete_place(place.id).await? {
        return Ok(None);
    }
    Ok(Some(place))
}

async fn rollback(tx: Box<dyn StoreTx>) {
    if let Err(e) = tx.abort().await {
        warn!(error = %e, "rollback failed");
    } else {
        debug!("transaction rolled back");
    }
}
