use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::auth::jwt::JwtKeys;
use crate::auth::password::{hash_password, matches_password};
use crate::users::dto::{LoginRequest, SignupRequest, UserUpdate};
use crate::users::error::AccountError;
use crate::users::model::{NewUser, PublicUser};
use crate::users::repo::UserRepository;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// Register a new account. Duplicate emails are rejected by the storage
/// layer's uniqueness constraint rather than a pre-check, so concurrent
/// signups for the same email cannot both succeed.
pub async fn create_user(
    repo: &dyn UserRepository,
    keys: &JwtKeys,
    data: SignupRequest,
) -> Result<PublicUser, AccountError> {
    if is_blank(&data.username) {
        return Err(AccountError::Validation("username is blank"));
    }
    if is_blank(&data.email) {
        return Err(AccountError::Validation("email is blank"));
    }
    if is_blank(&data.password) {
        return Err(AccountError::Validation("password is blank"));
    }
    if !is_valid_email(&data.email) {
        warn!(email = %data.email, "invalid email");
        return Err(AccountError::Validation("email is invalid"));
    }

    let password_hash = hash_password(&data.password)?;
    let user = repo
        .insert(NewUser {
            email: data.email,
            username: data.username,
            password_hash,
        })
        .await?;

    let token = keys.sign(&user)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user.sanitize(Some(token)))
}

/// Authenticate by email and password, issuing a fresh session token.
pub async fn login_user(
    repo: &dyn UserRepository,
    keys: &JwtKeys,
    data: LoginRequest,
) -> Result<PublicUser, AccountError> {
    if is_blank(&data.email) {
        return Err(AccountError::Validation("email is blank"));
    }
    if is_blank(&data.password) {
        return Err(AccountError::Validation("password is blank"));
    }

    let user = repo
        .find_by_email(&data.email)
        .await?
        .ok_or_else(|| AccountError::NotFound(data.email.clone()))?;

    if !matches_password(&user.password_hash, &data.password)? {
        warn!(email = %user.email, "login invalid password");
        return Err(AccountError::Authentication);
    }

    let token = keys.sign(&user)?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(user.sanitize(Some(token)))
}

/// Fetch a profile by email. No token is attached since no
/// authentication happened.
pub async fn get_user_by_email(
    repo: &dyn UserRepository,
    email: &str,
) -> Result<PublicUser, AccountError> {
    let user = repo
        .find_by_email(email)
        .await?
        .ok_or_else(|| AccountError::NotFound(email.to_string()))?;
    Ok(user.sanitize(None))
}

/// Apply a presence-tagged patch to the record stored under `email`.
/// Absent fields stay untouched; an empty string clears `bio`/`image`
/// but is rejected for `username`/`password`.
pub async fn update_user_details(
    repo: &dyn UserRepository,
    data: UserUpdate,
    email: &str,
) -> Result<PublicUser, AccountError> {
    let mut user = repo
        .find_by_email(email)
        .await?
        .ok_or_else(|| AccountError::NotFound(email.to_string()))?;

    if let Some(username) = data.username {
        if is_blank(&username) {
            return Err(AccountError::Validation("username is blank"));
        }
        user.username = username;
    }
    if let Some(password) = data.password {
        if is_blank(&password) {
            return Err(AccountError::Validation("password is blank"));
        }
        user.password_hash = hash_password(&password)?;
    }
    if let Some(bio) = data.bio {
        user.bio = if bio.is_empty() { None } else { Some(bio) };
    }
    if let Some(image) = data.image {
        user.image = if image.is_empty() { None } else { Some(image) };
    }

    let updated = repo.update(&user).await?;
    info!(user_id = %updated.id, email = %updated.email, "user updated");
    Ok(updated.sanitize(None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::users::repo::InMemoryUserRepository;

    fn make_keys() -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: "test-secret".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 5,
        })
    }

    fn signup(username: &str, email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    fn login(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn signup_rejects_blank_fields_without_writing() {
        let repo = InMemoryUserRepository::new();
        let keys = make_keys();
        for data in [
            signup("", "a@x.com", "p"),
            signup("a", "", "p"),
            signup("a", "a@x.com", ""),
        ] {
            let err = create_user(&repo, &keys, data).await.unwrap_err();
            assert!(matches!(err, AccountError::Validation(_)));
        }
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn signup_rejects_malformed_email() {
        let repo = InMemoryUserRepository::new();
        let err = create_user(&repo, &make_keys(), signup("a", "not-an-email", "p"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Validation(_)));
    }

    #[tokio::test]
    async fn signup_duplicate_email_conflicts_without_second_write() {
        let repo = InMemoryUserRepository::new();
        let keys = make_keys();
        create_user(&repo, &keys, signup("a", "a@x.com", "p"))
            .await
            .expect("first signup");
        let err = create_user(&repo, &keys, signup("b", "a@x.com", "q"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Conflict(_)));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn signup_returns_token_and_strips_password() {
        let repo = InMemoryUserRepository::new();
        let public = create_user(&repo, &make_keys(), signup("a", "a@x.com", "p"))
            .await
            .expect("signup");
        assert!(!public.token.as_deref().unwrap_or("").is_empty());
        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains("password"));
    }

    #[tokio::test]
    async fn login_happy_path_issues_fresh_tokens() {
        let repo = InMemoryUserRepository::new();
        let keys = make_keys();
        create_user(&repo, &keys, signup("a", "a@x.com", "p"))
            .await
            .expect("signup");
        let first = login_user(&repo, &keys, login("a@x.com", "p"))
            .await
            .expect("first login");
        let second = login_user(&repo, &keys, login("a@x.com", "p"))
            .await
            .expect("second login");
        assert!(!first.token.as_deref().unwrap_or("").is_empty());
        assert!(!second.token.as_deref().unwrap_or("").is_empty());
    }

    #[tokio::test]
    async fn login_unknown_email_is_not_found() {
        let repo = InMemoryUserRepository::new();
        let err = login_user(&repo, &make_keys(), login("ghost@x.com", "p"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::NotFound(_)));
    }

    #[tokio::test]
    async fn login_wrong_password_is_authentication_error() {
        let repo = InMemoryUserRepository::new();
        let keys = make_keys();
        create_user(&repo, &keys, signup("a", "a@x.com", "p"))
            .await
            .expect("signup");
        let err = login_user(&repo, &keys, login("a@x.com", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Authentication));
    }

    #[tokio::test]
    async fn login_blank_input_is_validation_error() {
        let repo = InMemoryUserRepository::new();
        let keys = make_keys();
        for data in [login("", "p"), login("a@x.com", "")] {
            let err = login_user(&repo, &keys, data).await.unwrap_err();
            assert!(matches!(err, AccountError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn get_by_email_roundtrip_after_signup() {
        let repo = InMemoryUserRepository::new();
        create_user(&repo, &make_keys(), signup("a", "a@x.com", "p"))
            .await
            .expect("signup");
        let public = get_user_by_email(&repo, "a@x.com").await.expect("get");
        assert_eq!(public.username, "a");
        assert!(public.token.is_none());
        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains("password"));
    }

    #[tokio::test]
    async fn get_by_unknown_email_is_not_found() {
        let repo = InMemoryUserRepository::new();
        let err = get_user_by_email(&repo, "ghost@x.com").await.unwrap_err();
        assert!(matches!(err, AccountError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_with_empty_payload_changes_nothing() {
        let repo = InMemoryUserRepository::new();
        let keys = make_keys();
        create_user(&repo, &keys, signup("a", "a@x.com", "p"))
            .await
            .expect("signup");
        let public = update_user_details(&repo, UserUpdate::default(), "a@x.com")
            .await
            .expect("update");
        assert_eq!(public.username, "a");
        assert!(public.bio.is_none());
        assert!(public.token.is_none());
        // Old password still valid.
        login_user(&repo, &keys, login("a@x.com", "p"))
            .await
            .expect("login after no-op update");
    }

    #[tokio::test]
    async fn update_bio_only_leaves_other_fields_alone() {
        let repo = InMemoryUserRepository::new();
        let keys = make_keys();
        create_user(&repo, &keys, signup("a", "a@x.com", "p"))
            .await
            .expect("signup");
        let patch = UserUpdate {
            bio: Some("hello".into()),
            ..Default::default()
        };
        let public = update_user_details(&repo, patch, "a@x.com")
            .await
            .expect("update");
        assert_eq!(public.bio.as_deref(), Some("hello"));
        assert_eq!(public.username, "a");
        assert!(public.image.is_none());
        login_user(&repo, &keys, login("a@x.com", "p"))
            .await
            .expect("old password still works");
    }

    #[tokio::test]
    async fn update_password_rehashes() {
        let repo = InMemoryUserRepository::new();
        let keys = make_keys();
        create_user(&repo, &keys, signup("a", "a@x.com", "old"))
            .await
            .expect("signup");
        let patch = UserUpdate {
            password: Some("new".into()),
            ..Default::default()
        };
        update_user_details(&repo, patch, "a@x.com")
            .await
            .expect("update");
        let err = login_user(&repo, &keys, login("a@x.com", "old"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Authentication));
        login_user(&repo, &keys, login("a@x.com", "new"))
            .await
            .expect("new password works");
        let stored = repo.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_ne!(stored.password_hash, "new");
    }

    #[tokio::test]
    async fn update_empty_string_clears_bio_but_not_username() {
        let repo = InMemoryUserRepository::new();
        let keys = make_keys();
        create_user(&repo, &keys, signup("a", "a@x.com", "p"))
            .await
            .expect("signup");
        update_user_details(
            &repo,
            UserUpdate {
                bio: Some("something".into()),
                ..Default::default()
            },
            "a@x.com",
        )
        .await
        .expect("set bio");
        let cleared = update_user_details(
            &repo,
            UserUpdate {
                bio: Some("".into()),
                ..Default::default()
            },
            "a@x.com",
        )
        .await
        .expect("clear bio");
        assert!(cleared.bio.is_none());

        let err = update_user_details(
            &repo,
            UserUpdate {
                username: Some("".into()),
                ..Default::default()
            },
            "a@x.com",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AccountError::Validation(_)));
    }

    #[tokio::test]
    async fn update_unknown_email_is_not_found() {
        let repo = InMemoryUserRepository::new();
        let err = update_user_details(&repo, UserUpdate::default(), "ghost@x.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::NotFound(_)));
    }
}
