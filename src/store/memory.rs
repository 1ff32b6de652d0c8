use std::collections::{hash_map::Entry, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{EntityStore, Place, StoreError, StoreResult, StoreTx, User};

#[derive(Debug, Default)]
struct Collections {
    places: HashMap<Uuid, Place>,
    users: HashMap<Uuid, User>,
}

/// Process-local store. Used when no database is configured, and in tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn all_places(&self) -> Vec<Place> {
        self.inner.lock().places.values().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) fn put_place_unchecked(&self, place: Place) {
        self.inner.lock().places.insert(place.id, place);
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        Ok(Box::new(MemoryTx {
            inner: Arc::clone(&self.inner),
            writes: Vec::new(),
        }))
    }

    async fn find_place(&self, id: Uuid) -> StoreResult<Option<Place>> {
        Ok(self.inner.lock().places.get(&id).cloned())
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.inner.lock().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.inner.lock();
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let state = self.inner.lock();
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn user_with_places(&self, user_id: Uuid) -> StoreResult<Option<(User, Vec<Place>)>> {
        let state = self.inner.lock();
        let Some(user) = state.users.get(&user_id) else {
            return Ok(None);
        };
        let places = user
            .places
            .iter()
            .filter_map(|id| state.places.get(id).cloned())
            .collect();
        Ok(Some((user.clone(), places)))
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut state = self.inner.lock();
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate("email"));
        }
        if state.users.contains_key(&user.id) {
            return Err(StoreError::Duplicate("user id"));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_place_details(
        &self,
        id: Uuid,
        title: &str,
        description: &str,
    ) -> StoreResult<Option<Place>> {
        let mut state = self.inner.lock();
        Ok(state.places.get_mut(&id).map(|p| {
            p.title = title.to_string();
            p.description = description.to_string();
            p.clone()
        }))
    }
}

#[derive(Debug)]
enum Write {
    InsertPlace(Place),
    DeletePlace(Uuid),
    AddPlace { user_id: Uuid, place_id: Uuid },
    RemovePlace { user_id: Uuid, place_id: Uuid },
}

/// Buffers writes; nothing touches the shared collections before commit.
pub struct MemoryTx {
    inner: Arc<Mutex<Collections>>,
    writes: Vec<Write>,
}

impl MemoryTx {
    /// Committed place with this transaction's own writes replayed on top.
    fn current_place(&self, id: Uuid) -> Option<Place> {
        let mut place = self.inner.lock().places.get(&id).cloned();
        for w in &self.writes {
            match w {
                Write::InsertPlace(p) if p.id == id => place = Some(p.clone()),
                Write::DeletePlace(d) if *d == id => place = None,
                _ => {}
            }
        }
        place
    }

    fn current_user(&self, id: Uuid) -> Option<User> {
        let mut user = self.inner.lock().users.get(&id).cloned()?;
        for w in &self.writes {
            match w {
                Write::AddPlace { user_id, place_id } if *user_id == id => {
                    add_unique(&mut user.places, *place_id)
                }
                Write::RemovePlace { user_id, place_id } if *user_id == id => {
                    user.places.retain(|p| p != place_id)
                }
                _ => {}
            }
        }
        Some(user)
    }
}

fn add_unique(list: &mut Vec<Uuid>, id: Uuid) {
    if !list.contains(&id) {
        list.push(id);
    }
}

/// Re-validates every buffered write against the records as they are now,
/// staging the results on copies. The shared state is only touched once the
/// whole batch has validated.
fn apply(inner: &Mutex<Collections>, writes: Vec<Write>) -> StoreResult<()> {
    let mut state = inner.lock();
    let mut staged_places: HashMap<Uuid, Option<Place>> = HashMap::new();
    let mut staged_users: HashMap<Uuid, User> = HashMap::new();

    for w in writes {
        match w {
            Write::InsertPlace(place) => {
                let slot = staged_places
                    .entry(place.id)
                    .or_insert_with(|| state.places.get(&place.id).cloned());
                if slot.is_some() {
                    return Err(StoreError::Duplicate("place id"));
                }
                *slot = Some(place);
            }
            Write::DeletePlace(id) => {
                let slot = staged_places
                    .entry(id)
                    .or_insert_with(|| state.places.get(&id).cloned());
                if slot.take().is_none() {
                    return Err(StoreError::Conflict(format!("place {id} no longer exists")));
                }
            }
            Write::AddPlace { user_id, place_id } => {
                let user = match staged_users.entry(user_id) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => match state.users.get(&user_id) {
                        Some(u) => e.insert(u.clone()),
                        None => {
                            return Err(StoreError::Conflict(format!(
                                "user {user_id} no longer exists"
                            )))
                        }
                    },
                };
                add_unique(&mut user.places, place_id);
            }
            Write::RemovePlace { user_id, place_id } => {
                let user = match staged_users.entry(user_id) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => match state.users.get(&user_id) {
                        Some(u) => e.insert(u.clone()),
                        None => continue,
                    },
                };
                user.places.retain(|p| *p != place_id);
            }
        }
    }

    for (id, slot) in staged_places {
        match slot {
            Some(place) => {
                state.places.insert(id, place);
            }
            None => {
                state.places.remove(&id);
            }
        }
    }
    for (id, user) in staged_users {
        state.users.insert(id, user);
    }
    Ok(())
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn place(&mut self, id: Uuid) -> StoreResult<Option<Place>> {
        Ok(self.current_place(id))
    }

    async fn user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.current_user(id))
    }

    async fn insert_place(&mut self, place: &Place) -> StoreResult<()> {
        if self.current_place(place.id).is_some() {
            return Err(StoreError::Duplicate("place id"));
        }
        self.writes.push(Write::InsertPlace(place.clone()));
        Ok(())
    }

    async fn delete_place(&mut self, id: Uuid) -> StoreResult<bool> {
        if self.current_place(id).is_none() {
            return Ok(false);
        }
        self.writes.push(Write::DeletePlace(id));
        Ok(true)
    }

    async fn add_place_to_user(&mut self, user_id: Uuid, place_id: Uuid) -> StoreResult<bool> {
        if self.current_user(user_id).is_none() {
            return Ok(false);
        }
        self.writes.push(Write::AddPlace { user_id, place_id });
        Ok(true)
    }

    async fn remove_place_from_user(
        &mut self,
        user_id: Uuid,
        place_id: Uuid,
    ) -> StoreResult<bool> {
        if self.current_user(user_id).is_none() {
            return Ok(false);
        }
        self.writes.push(Write::RemovePlace { user_id, place_id });
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { inner, writes } = *self;
        debug!(writes = writes.len(), "memory tx commit");
        apply(&inner, writes)
    }

    async fn abort(self: Box<Self>) -> StoreResult<()> {
        debug!(discarded = self.writes.len(), "memory tx abort");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Location;
    use time::OffsetDateTime;

    fn user(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Max".into(),
            email: email.into(),
            password_hash: "hash".into(),
            places: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn place(creator: Uuid) -> Place {
        Place {
            id: Uuid::new_v4(),
            title: "Empire State".into(),
            description: "desc".into(),
            address: "20 W 34th St, New York, NY".into(),
            location: Location {
                lat: 40.7484474,
                lng: -73.9871516,
            },
            image: "places/a.jpg".into(),
            creator,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn writes_become_visible_together_on_commit() {
        let store = MemoryStore::new();
        let owner = user("a@test.com");
        store.insert_user(&owner).await.unwrap();
        let p = place(owner.id);

        let mut tx = store.begin().await.unwrap();
        tx.insert_place(&p).await.unwrap();
        assert!(tx.add_place_to_user(owner.id, p.id).await.unwrap());

        // own writes are visible inside, nothing outside
        assert!(tx.place(p.id).await.unwrap().is_some());
        assert_eq!(tx.user(owner.id).await.unwrap().unwrap().places, vec![p.id]);
        assert!(store.find_place(p.id).await.unwrap().is_none());
        assert!(store.find_user(owner.id).await.unwrap().unwrap().places.is_empty());

        tx.commit().await.unwrap();
        assert_eq!(store.find_place(p.id).await.unwrap(), Some(p.clone()));
        assert_eq!(
            store.find_user(owner.id).await.unwrap().unwrap().places,
            vec![p.id]
        );
    }

    #[tokio::test]
    async fn dropped_or_aborted_tx_leaves_no_trace() {
        let store = MemoryStore::new();
        let owner = user("a@test.com");
        store.insert_user(&owner).await.unwrap();

        let p = place(owner.id);
        let mut tx = store.begin().await.unwrap();
        tx.insert_place(&p).await.unwrap();
        tx.add_place_to_user(owner.id, p.id).await.unwrap();
        tx.abort().await.unwrap();

        let q = place(owner.id);
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_place(&q).await.unwrap();
        }

        assert!(store.all_places().is_empty());
        assert!(store.find_user(owner.id).await.unwrap().unwrap().places.is_empty());
    }

    #[tokio::test]
    async fn interleaved_appends_to_one_user_both_land() {
        let store = MemoryStore::new();
        let owner = user("a@test.com");
        store.insert_user(&owner).await.unwrap();
        let (p1, p2) = (place(owner.id), place(owner.id));

        let mut tx1 = store.begin().await.unwrap();
        let mut tx2 = store.begin().await.unwrap();
        tx1.insert_place(&p1).await.unwrap();
        tx2.insert_place(&p2).await.unwrap();
        tx1.add_place_to_user(owner.id, p1.id).await.unwrap();
        tx2.add_place_to_user(owner.id, p2.id).await.unwrap();
        tx2.commit().await.unwrap();
        tx1.commit().await.unwrap();

        let places = store.find_user(owner.id).await.unwrap().unwrap().places;
        assert_eq!(places, vec![p2.id, p1.id]);
    }

    #[tokio::test]
    async fn stale_delete_fails_whole_commit() {
        let store = MemoryStore::new();
        let owner = user("a@test.com");
        store.insert_user(&owner).await.unwrap();
        let p = place(owner.id);
        let mut tx = store.begin().await.unwrap();
        tx.insert_place(&p).await.unwrap();
        tx.add_place_to_user(owner.id, p.id).await.unwrap();
        tx.commit().await.unwrap();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        for tx in [&mut first, &mut second] {
            assert!(tx.remove_place_from_user(owner.id, p.id).await.unwrap());
            assert!(tx.delete_place(p.id).await.unwrap());
        }
        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        assert!(store.find_place(p.id).await.unwrap().is_none());
        assert!(store.find_user(owner.id).await.unwrap().unwrap().places.is_empty());
    }

    #[tokio::test]
    async fn add_to_missing_user_reports_false() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(!tx.add_place_to_user(Uuid::new_v4(), Uuid::new_v4()).await.unwrap());
        assert!(!tx
            .remove_place_from_user(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn insert_user_rejects_taken_email() {
        let store = MemoryStore::new();
        store.insert_user(&user("a@test.com")).await.unwrap();
        let err = store.insert_user(&user("a@test.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("email")));
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn user_with_places_follows_list_order() {
        let store = MemoryStore::new();
        let owner = user("a@test.com");
        store.insert_user(&owner).await.unwrap();
        let ps: Vec<Place> = (0..3).map(|_| place(owner.id)).collect();
        for p in &ps {
            let mut tx = store.begin().await.unwrap();
            tx.insert_place(p).await.unwrap();
            tx.add_place_to_user(owner.id, p.id).await.unwrap();
            tx.commit().await.unwrap();
        }
        let (listed, places) = store.user_with_places(owner.id).await.unwrap().unwrap();
        let ids: Vec<Uuid> = places.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, listed.places);
        assert_eq!(ids, ps.iter().map(|p| p.id).collect::<Vec<_>>());
        assert!(store.user_with_places(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_place_details_touches_only_scalars() {
        let store = MemoryStore::new();
        let owner = user("a@test.com");
        let p = place(owner.id);
        store.put_place_unchecked(p.clone());

        let updated = store
            .update_place_details(p.id, "New", "Changed")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "New");
        assert_eq!(updated.description, "Changed");
        assert_eq!(updated.location, p.location);
        assert_eq!(updated.creator, p.creator);
        assert!(store
            .update_place_details(Uuid::new_v4(), "a", "b")
            .await
            .unwrap()
            .is_none());
    }
}
