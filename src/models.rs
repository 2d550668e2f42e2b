//! Wire types for the card quest backend API.
//!
//! Request and response bodies for the authentication and progress
//! endpoints. These mirror the server contract exactly; domain logic
//! lives in `auth` and `api`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct InitAuthRequest {
    pub phone_number: String,
}

/// Response to `POST /api/auth/init`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSessionResponse {
    pub session_id: String,
    /// Seconds until the login session expires on the server.
    pub expires_in: i64,
}

/// Token pair returned by the token-fetch and refresh endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_in: i64,
    pub refresh_expires_in: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Response to `GET /api/progress`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressResponse {
    /// Canonical field name is `solved_cards`; older server builds emit
    /// `completed_quests` for the same list.
    #[serde(alias = "completed_quests")]
    pub solved_cards: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompleteQuestRequest {
    pub quest_id: String,
}

/// Response to `POST /api/progress/complete`.
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteQuestResponse {
    pub success: bool,
    pub quest_id: String,
}
