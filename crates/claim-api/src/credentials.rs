//! Credential seam: turns a presented token into an authenticated identity.
//! Token issuance and verification live outside the engine; the engine trusts
//! whatever identity this layer hands it.

use std::fmt;
use std::sync::Arc;

use claim_core::ClaimEngine;
use contracts::Identity;

pub trait CredentialService: fmt::Debug + Send + Sync {
    /// `None` means unauthenticated.
    fn resolve(&self, token: &str) -> Option<Identity>;
}

/// Development resolver: the bearer token is the player id, as issued by an
/// upstream gateway that has already verified it.
#[derive(Debug, Clone)]
pub struct PlayerIdCredentials {
    engine: Arc<ClaimEngine>,
}

impl PlayerIdCredentials {
    pub fn new(engine: Arc<ClaimEngine>) -> Self {
        Self { engine }
    }
}

impl CredentialService for PlayerIdCredentials {
    fn resolve(&self, token: &str) -> Option<Identity> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        self.engine.identity_for(token)
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}
