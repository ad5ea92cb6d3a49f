//! Identity provider wiring. The real provider is an external
//! collaborator; local development trusts the bearer token as the
//! subject identifier, the way a facade environment would.

use async_trait::async_trait;
use pluto_core::auth::{AuthProviderT, AuthSubject};
use pluto_core::error::{Error, Result};

/// Development provider: the token itself is the external subject id.
pub struct LocalAuthProvider;

#[async_trait]
impl AuthProviderT for LocalAuthProvider {
    async fn verify_bearer(&self, token: &str) -> Result<AuthSubject> {
        if token.trim().is_empty() {
            return Err(Error::InvalidToken);
        }
        Ok(AuthSubject {
            external_id: token.to_string(),
        })
    }
}
