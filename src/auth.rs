//! Authentication module.

mod guard;
mod token;

pub use guard::{Identity, Owned, authorize, can_view, require_author, visible_book};
pub use token::{Claims, IssuedToken, TokenError, TokenIssuer, validate_claims};

use crate::db::{Author, Database, ROLE_ADMIN, ROLE_USER, RevokedToken, User, now_timestamp};
use crate::error::{AppError, Result};
use crate::validate;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use std::collections::BTreeMap;

/// Hash a password using Argon2.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Fields for a new account.
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    /// Username.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Plaintext password, hashed before storage.
    pub password: String,
    /// First name.
    pub first_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
    /// Biography.
    pub bio: Option<String>,
    /// Also create an author profile.
    pub is_author: bool,
}

/// A request that passed token verification.
#[derive(Debug, Clone)]
pub struct Session {
    /// Who is asking.
    pub identity: Identity,
    /// Claims of the presented token.
    pub claims: Claims,
}

/// Authentication service.
pub struct AuthService {
    db: Database,
    tokens: TokenIssuer,
    registration_enabled: bool,
}

impl AuthService {
    /// Create a new auth service.
    pub fn new(db: Database, tokens: TokenIssuer, registration_enabled: bool) -> Self {
        Self {
            db,
            tokens,
            registration_enabled,
        }
    }

    /// Register a new user through the public endpoint.
    pub fn register(&self, account: NewAccount) -> Result<User> {
        if !self.registration_enabled {
            return Err(AppError::Forbidden("Registration is disabled".to_string()));
        }

        self.create_user(account, ROLE_USER)
    }

    /// Create a new user (admin function).
    pub fn create_user(&self, account: NewAccount, role: &str) -> Result<User> {
        validate::username(&account.username)?;
        validate::email(&account.email)?;
        validate::password(&account.password)?;

        if role != ROLE_ADMIN && role != ROLE_USER {
            return Err(AppError::Validation(
                "Role must be 'admin' or 'user'".to_string(),
            ));
        }

        if self.db.get_user_by_username(&account.username)?.is_some() {
            return Err(AppError::Conflict("Username already taken".to_string()));
        }
        if self.db.get_user_by_email(&account.email)?.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let now = now_timestamp();
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: account.username,
            email: account.email,
            password_hash: hash_password(&account.password)?,
            first_name: account.first_name,
            last_name: account.last_name,
            bio: account.bio,
            is_author: account.is_author,
            is_active: true,
            role: role.to_string(),
            created_at: now,
            updated_at: now,
            last_login: None,
        };

        if account.is_author {
            let pen_name = user
                .first_name
                .clone()
                .unwrap_or_else(|| user.username.clone());
            let author = new_author(&user.id, pen_name, user.bio.clone(), now);
            self.db.create_user_with_author(&user, &author)?;
        } else {
            self.db.create_user(&user)?;
        }

        tracing::info!(
            user_id = %user.id,
            username = %user.username,
            is_author = user.is_author,
            "User created"
        );
        Ok(user)
    }

    /// Login by username or email and issue a token.
    pub fn login(&self, login: &str, password: &str, now: i64) -> Result<(User, IssuedToken)> {
        let invalid = || AppError::Unauthorized("Invalid username or password".to_string());

        let user = self.db.get_user_by_login(login)?.ok_or_else(invalid)?;

        if !verify_password(password, &user.password_hash)? {
            tracing::debug!(login = %login, "Rejected login");
            return Err(invalid());
        }

        if !user.is_active {
            return Err(AppError::Forbidden("Account is inactive".to_string()));
        }

        self.db.update_user_last_login(&user.id)?;
        let issued = self.issue_token(&user, now)?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok((user, issued))
    }

    /// Issue a token for an existing user.
    pub fn issue_token(&self, user: &User, now: i64) -> Result<IssuedToken> {
        Ok(self.tokens.issue_at(user, now)?)
    }

    /// Verify a bearer token and resolve the requester.
    pub fn verify_token(&self, token: &str, now: i64) -> Result<Session> {
        let claims = self.tokens.verify_at(token, now)?;

        if self.db.is_token_revoked(&claims.jti)? {
            return Err(TokenError::Revoked.into());
        }

        let user = self
            .db
            .get_user_by_id(&claims.sub)?
            .ok_or_else(|| AppError::Unauthorized("User no longer exists".to_string()))?;

        if !user.is_active {
            return Err(AppError::Forbidden("Account is inactive".to_string()));
        }

        let author_id = self.db.get_author_by_user(&user.id)?.map(|a| a.id);

        Ok(Session {
            identity: Identity {
                user_id: user.id,
                username: user.username,
                role: user.role,
                author_id,
            },
            claims,
        })
    }

    /// Logout by revoking the presented token.
    pub fn logout(&self, claims: &Claims) -> Result<()> {
        self.db.revoke_token(&RevokedToken {
            jti: claims.jti.clone(),
            user_id: claims.sub.clone(),
            expires_at: claims.exp,
        })?;
        tracing::info!(user_id = %claims.sub, "User logged out");
        Ok(())
    }

    /// Change own password after checking the current one.
    pub fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let user = self
            .db
            .get_user_by_id(user_id)?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if !verify_password(current_password, &user.password_hash)? {
            return Err(AppError::Unauthorized(
                "Current password is incorrect".to_string(),
            ));
        }

        validate::password(new_password)?;
        self.db
            .update_user_password(&user.id, &hash_password(new_password)?)?;
        Ok(())
    }

    /// Set a user's password (admin function).
    pub fn set_password(&self, username: &str, new_password: &str) -> Result<bool> {
        validate::password(new_password)?;

        match self.db.get_user_by_username(username)? {
            Some(user) => self
                .db
                .update_user_password(&user.id, &hash_password(new_password)?),
            None => Ok(false),
        }
    }

    /// Create an author profile for an existing user.
    pub fn become_author(
        &self,
        user_id: &str,
        pen_name: Option<String>,
        bio: Option<String>,
    ) -> Result<Author> {
        let user = self
            .db
            .get_user_by_id(user_id)?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if self.db.get_author_by_user(&user.id)?.is_some() {
            return Err(AppError::Conflict(
                "User already has an author profile".to_string(),
            ));
        }

        let pen_name = match pen_name {
            Some(name) => {
                validate::pen_name(&name)?;
                name.trim().to_string()
            }
            None => user.first_name.clone().unwrap_or(user.username.clone()),
        };

        let author = new_author(&user.id, pen_name, bio.or(user.bio), now_timestamp());
        self.db.create_author(&author)?;

        tracing::info!(user_id = %user.id, author_id = %author.id, "Author profile created");
        Ok(author)
    }

    /// Activate or deactivate a user.
    pub fn set_active(&self, username: &str, active: bool) -> Result<bool> {
        self.db.set_user_active(username, active)
    }

    /// Delete a user.
    pub fn delete_user(&self, username: &str) -> Result<bool> {
        self.db.delete_user(username)
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.db.list_users()
    }
}

fn new_author(user_id: &str, pen_name: String, bio: Option<String>, now: i64) -> Author {
    Author {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        pen_name,
        bio,
        profile_image_url: None,
        social_links: BTreeMap::new(),
        total_books: 0,
        total_reads: 0,
        created_at: now,
        updated_at: now,
    }
}
