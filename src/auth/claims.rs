use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::Role;

/// JWT payload carried by every authenticated request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: Uuid,  // users.id
    pub email: String,  // email at sign-in time
    pub role: Role,     // admin | user
    pub iat: usize,     // issued at (unix timestamp)
    pub exp: usize,     // expires at (unix timestamp)
    pub iss: String,    // issuer
    pub aud: String,    // audience
}
