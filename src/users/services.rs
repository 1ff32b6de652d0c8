use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::password::{matches_stored, NewPassword};
use crate::error::AppError;
use crate::store::{EntityStore, StoreError, User};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn email_taken() -> AppError {
    AppError::validation("Could not create user, email already exists.")
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn EntityStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    #[instrument(name = "users.list", skip(self))]
    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        self.store
            .list_users()
            .await
            .map_err(|e| AppError::persistence("Fetching users failed, please try again.", e))
    }

    #[instrument(name = "users.signup", skip(self, name, password))]
    pub async fn signup(
        &self,
        name: String,
        email: String,
        password: String,
    ) -> Result<User, AppError> {
        let name = name.trim().to_string();
        let email = email.trim().to_lowercase();

        let password = match NewPassword::parse(password) {
            Ok(p) if !name.is_empty() && is_valid_email(&email) => p,
            _ => {
                warn!(email = %email, "signup rejected by validation");
                return Err(AppError::invalid_inputs());
            }
        };

        // cheap pre-check; the store enforces uniqueness on insert
        if self
            .store
            .find_user_by_email(&email)
            .await
            .map_err(|e| AppError::persistence("Signing up failed, please try again.", e))?
            .is_some()
        {
            warn!(email = %email, "email already registered");
            return Err(email_taken());
        }

        let password_hash = password.hash().map_err(|e| {
            warn!(error = %e, "hash_password failed");
            AppError::Persistence("Signing up failed, please try again.".into())
        })?;

        let user = User {
            id: Uuid::new_v4(),
            name,
            email,
            password_hash,
            places: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
        };
        match self.store.insert_user(&user).await {
            Ok(()) => {}
            Err(StoreError::Duplicate("email")) => return Err(email_taken()),
            Err(e) => {
                return Err(AppError::persistence(
                    "Signing up failed, please try again.",
                    e,
                ))
            }
        }

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Credential check only; no session is issued.
    #[instrument(name = "users.login", skip(self, password))]
    pub async fn login(&self, email: String, password: String) -> Result<User, AppError> {
        let email = email.trim().to_lowercase();
        let user = self
            .store
            .find_user_by_email(&email)
            .await
            .map_err(|e| AppError::persistence("Logging in failed, please try again.", e))?
            .ok_or_else(|| {
                warn!(email = %email, "login unknown email");
                AppError::InvalidCredentials
            })?;

        let ok = matches_stored(&password, &user.password_hash).map_err(|e| {
            warn!(error = %e, user_id = %user.id, "stored password hash unreadable");
            AppError::InvalidCredentials
        })?;
        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }

        info!(user_id = %user.id, "user logged in");
        Ok(user)
    }
}
