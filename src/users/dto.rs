use serde::Deserialize;

/// Request body for signup. All three fields are required and must be
/// non-blank.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Presence-tagged update payload. `None` leaves the stored value
/// untouched; `Some` overwrites it. An explicit empty string clears
/// `bio`/`image` but is rejected for `username`/`password`.
#[derive(Debug, Default, Deserialize)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub password: Option<String>,
    pub bio: Option<String>,
    pub image: Option<String>,
}
