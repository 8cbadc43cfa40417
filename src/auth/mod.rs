//! Authentication mechanisms: none, bearer token, user/pass, NKey seed, and
//! JWT + NKey (either handed in directly or extracted from a credentials
//! file).

pub mod nkey;

use crate::error::{CredentialsError, NKeyError};
use crate::server_info::ConnectInfo;
use nkey::NKey;

/// The authentication mechanism to use during `CONNECT` negotiation.
#[derive(Clone, Debug)]
pub enum Auth {
    None,
    Token(String),
    UserPass(String, String),
    NKey(String),
    Jwt(String, String),
    /// Resolved at `apply` time by reading the credentials file.
    Credentials(std::path::PathBuf),
}

impl Default for Auth {
    fn default() -> Self {
        Auth::None
    }
}

impl Auth {
    /// Populates the auth-related fields of `connect_info`, signing `nonce`
    /// (if the server supplied one and the mechanism is nkey/jwt-based).
    pub fn apply(&self, connect_info: &mut ConnectInfo, nonce: Option<&str>) -> Result<(), AuthError> {
        match self {
            Auth::None => {}
            Auth::Token(token) => connect_info.auth_token = Some(token.clone()),
            Auth::UserPass(user, pass) => {
                connect_info.user = Some(user.clone());
                connect_info.pass = Some(pass.clone());
            }
            Auth::NKey(seed) => {
                let nkey = NKey::from_seed(seed)?;
                connect_info.nkey = Some(nkey.public_key());
                if let Some(nonce) = nonce {
                    connect_info.sig = Some(nkey.sign_nonce(nonce)?);
                }
            }
            Auth::Jwt(jwt, seed) => {
                let nkey = NKey::from_seed(seed)?;
                connect_info.jwt = Some(jwt.clone());
                connect_info.nkey = Some(nkey.public_key());
                if let Some(nonce) = nonce {
                    connect_info.sig = Some(nkey.sign_nonce(nonce)?);
                }
            }
            Auth::Credentials(path) => {
                let contents = std::fs::read_to_string(path).map_err(|err| {
                    if err.kind() == std::io::ErrorKind::NotFound {
                        CredentialsError::FileNotFound {
                            path: path.display().to_string(),
                        }
                    } else {
                        CredentialsError::ReadError {
                            reason: err.to_string(),
                        }
                    }
                })?;
                let (jwt, seed) = parse_credentials(&contents)?;
                let nkey = NKey::from_seed(&seed)?;
                connect_info.jwt = Some(jwt);
                connect_info.nkey = Some(nkey.public_key());
                if let Some(nonce) = nonce {
                    connect_info.sig = Some(nkey.sign_nonce(nonce)?);
                }
            }
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error(transparent)]
    NKey(#[from] NKeyError),
}

/// Extracts the JWT and seed PEM-style blocks from a credentials file's
/// contents. Both values are trimmed; order in the file does not matter.
fn parse_credentials(contents: &str) -> Result<(String, String), CredentialsError> {
    let jwt = extract_block(contents, "BEGIN NATS USER JWT", "END NATS USER JWT")
        .ok_or(CredentialsError::InvalidFormat)?;
    let seed = extract_block(contents, "BEGIN USER NKEY SEED", "END USER NKEY SEED")
        .ok_or(CredentialsError::InvalidFormat)?;
    Ok((jwt, seed))
}

fn extract_block(contents: &str, begin_marker: &str, end_marker: &str) -> Option<String> {
    let begin_idx = contents.find(begin_marker)?;
    let after_begin = &contents[begin_idx + begin_marker.len()..];
    let line_end = after_begin.find('\n').map(|i| i + 1).unwrap_or(0);
    let body_start = &after_begin[line_end..];
    let end_idx = body_start.find(end_marker)?;
    Some(body_start[..end_idx].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREDS: &str = "\
-----BEGIN NATS USER JWT-----
eyJhbGciOiJlZDI1NTE5In0.somejwt
------END NATS USER JWT------

-----BEGIN USER NKEY SEED-----
SUAIO3FHUX5BYBAWRNXM3BHICQNIO6RDOJCQAOQWZJPYHOXAER1FMRW6Y4
------END USER NKEY SEED------
";

    #[test]
    fn extracts_jwt_and_seed_in_either_order() {
        let (jwt, seed) = parse_credentials(CREDS).unwrap();
        assert_eq!(jwt, "eyJhbGciOiJlZDI1NTE5In0.somejwt");
        assert_eq!(seed, "SUAIO3FHUX5BYBAWRNXM3BHICQNIO6RDOJCQAOQWZJPYHOXAER1FMRW6Y4");
    }

    #[test]
    fn missing_block_is_invalid_format() {
        assert!(parse_credentials("nothing here").is_err());
    }
}
