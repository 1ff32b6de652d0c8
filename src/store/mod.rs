//! Transactional persistence over the `places` and `users` collections.
//!
//! Cross-collection writes only happen inside a [`StoreTx`]: everything
//! written between [`EntityStore::begin`] and [`StoreTx::commit`] becomes
//! visible together or not at all. A transaction dropped without commit is
//! rolled back.
//!
//! A user's place list is never overwritten wholesale. It is changed through
//! [`StoreTx::add_place_to_user`] / [`StoreTx::remove_place_from_user`], which
//! apply against the record as it stands when the write lands, so concurrent
//! transactions on the same owner don't lose each other's entries.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

mod memory;
mod postgres;
mod repo_types;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use repo_types::{Location, Place, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate value for {0}")]
    Duplicate(&'static str),

    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Open a transaction. Callers must not hold it across slow external calls.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;

    async fn find_place(&self, id: Uuid) -> StoreResult<Option<Place>>;
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn list_users(&self) -> StoreResult<Vec<User>>;

    /// The user and the places named in its list, in list order, read from
    /// one snapshot. Ids that do not resolve to a place are skipped. `None`
    /// if the user is absent.
    async fn user_with_places(&self, user_id: Uuid) -> StoreResult<Option<(User, Vec<Place>)>>;

    /// Single-record write. Fails with `Duplicate("email")` on a taken email.
    async fn insert_user(&self, user: &User) -> StoreResult<()>;

    /// Single-record write of the scalar fields. `None` if the place is absent.
    async fn update_place_details(
        &self,
        id: Uuid,
        title: &str,
        description: &str,
    ) -> StoreResult<Option<Place>>;
}

#[async_trait]
pub trait StoreTx: Send {
    /// Read a place inside the transaction's isolation scope.
    async fn place(&mut self, id: Uuid) -> StoreResult<Option<Place>>;
    async fn user(&mut self, id: Uuid) -> StoreResult<Option<User>>;

    async fn insert_place(&mut self, place: &Place) -> StoreResult<()>;
    /// Returns false if there was no such place.
    async fn delete_place(&mut self, id: Uuid) -> StoreResult<bool>;

    /// Append `place_id` to the user's list. Returns false if the user is absent.
    async fn add_place_to_user(&mut self, user_id: Uuid, place_id: Uuid) -> StoreResult<bool>;
    /// Drop `place_id` from the user's list. Returns false if the user is absent.
    async fn remove_place_from_user(&mut self, user_id: Uuid, place_id: Uuid)
        -> StoreResult<bool>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn abort(self: Box<Self>) -> StoreResult<()>;
}
