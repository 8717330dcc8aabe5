use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;

use crate::errors::ClientError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
    Other(String),
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "user" => Role::User,
            "admin" => Role::Admin,
            _ => Role::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Other(raw) => raw,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    exp: Option<i64>,
}

/// Who is signed in, as claimed by their bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub role: Role,
    pub token: String,
    pub expires_at: Option<i64>,
}

impl Identity {
    /// Reads the claims out of a JWT without checking its signature; the
    /// backend does that on every request.
    pub fn from_token(token: &str) -> Result<Self, ClientError> {
        let payload = token
            .split('.')
            .nth(1)
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| ClientError::InvalidToken { reason: "expected three segments".into() })?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| ClientError::InvalidToken { reason: e.to_string() })?;
        let claims: Claims = serde_json::from_slice(&bytes)
            .map_err(|e| ClientError::InvalidToken { reason: e.to_string() })?;

        if let Some(exp) = claims.exp {
            if exp <= Utc::now().timestamp() {
                return Err(ClientError::TokenExpired);
            }
        }

        Ok(Self {
            username: claims.sub,
            role: Role::parse(&claims.role),
            token: token.to_string(),
            expires_at: claims.exp,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_token(sub: &str, role: &str, exp: Option<i64>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let mut claims = serde_json::json!({ "sub": sub, "role": role });
    if let Some(exp) = exp {
        claims["exp"] = exp.into();
    }
    let body = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{body}.signature")
}
