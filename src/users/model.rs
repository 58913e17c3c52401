use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database. Deliberately does not implement
/// `Serialize`: the hash must never reach a response body, so callers
/// go through [`PublicUser`].
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Fields needed to insert a new user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
}

/// Sanitized projection returned to callers. No password field exists
/// on this type; `token` is attached only after signup or login.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub email: String,
    pub username: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl User {
    /// Project the entity into its public view, optionally attaching a
    /// freshly signed session token.
    pub fn sanitize(self, token: Option<String>) -> PublicUser {
        PublicUser {
            email: self.email,
            username: self.username,
            bio: self.bio,
            image: self.image,
            token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "jake@jake.jake".into(),
            username: "jake".into(),
            password_hash: "$argon2id$fake".into(),
            bio: Some("I work at statefarm".into()),
            image: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn sanitize_never_exposes_password_hash() {
        let public = sample_user().sanitize(Some("tok".into()));
        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2"));
        assert!(json.contains("jake@jake.jake"));
    }

    #[test]
    fn token_is_omitted_when_absent() {
        let json = serde_json::to_string(&sample_user().sanitize(None)).unwrap();
        assert!(!json.contains("token"));
    }
}
