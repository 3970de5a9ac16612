//! Claims carried by session tokens.
//!
//! The token is issued by the sign-in flow of the web app and only verified here. It
//! identifies the user; it grants nothing beyond "signed in".

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id.
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
}
