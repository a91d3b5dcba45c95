//! HS256 JSON Web Tokens carrying `{id, iat, exp}`.

use crate::errors::AppError;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

pub const INVALID_TOKEN: &str = "Invalid token. Please log in again!";
pub const EXPIRED_TOKEN: &str = "Your token has expired! Please log in again.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Hex id of the user.
    pub id: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Lifetime strings such as `90d`, `12h`, `30m`, `45s`, or bare seconds.
pub fn parse_expires_in(raw: &str) -> Result<i64, AppError> {
    let raw = raw.trim();
    let bad = || AppError::Config(format!("invalid token lifetime '{raw}'"));
    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (num, unit) = raw.split_at(split);
    let n: i64 = num.parse().map_err(|_| bad())?;
    let mult = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86_400,
        "w" => 604_800,
        _ => return Err(bad()),
    };
    n.checked_mul(mult).ok_or_else(bad)
}

pub struct TokenSigner {
    secret: Zeroizing<Vec<u8>>,
    lifetime_secs: i64,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").field("lifetime_secs", &self.lifetime_secs).finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: &str, expires_in: &str) -> Result<Self, AppError> {
        if secret.is_empty() {
            return Err(AppError::Config("JWT secret must not be empty".into()));
        }
        Ok(Self { secret: Zeroizing::new(secret.as_bytes().to_vec()), lifetime_secs: parse_expires_in(expires_in)? })
    }

    fn mac(&self) -> Result<HmacSha256, AppError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| AppError::Internal(format!("hmac: {e}")))
    }

    pub fn sign(&self, user_id: &str) -> Result<String, AppError> {
        self.sign_at(user_id, chrono::Utc::now().timestamp())
    }

    pub fn sign_at(&self, user_id: &str, iat: i64) -> Result<String, AppError> {
        let header = Header { alg: "HS256".into(), typ: "JWT".into() };
        let claims = Claims { id: user_id.to_string(), iat, exp: iat.saturating_add(self.lifetime_secs) };
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
        );
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{signing_input}.{sig}"))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        self.verify_at(token, chrono::Utc::now().timestamp())
    }

    /// Checks shape, algorithm and signature, then expiry against `now`.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, AppError> {
        let invalid = || AppError::Auth(INVALID_TOKEN.into());
        let mut parts = token.split('.');
        let (Some(h), Some(c), Some(s), None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        let header: Header = URL_SAFE_NO_PAD
            .decode(h)
            .ok()
            .and_then(|b| serde_json::from_slice(&b).ok())
            .ok_or_else(invalid)?;
        if header.alg != "HS256" {
            return Err(invalid());
        }
        let sig = URL_SAFE_NO_PAD.decode(s).map_err(|_| invalid())?;
        let mut mac = self.mac()?;
        mac.update(h.as_bytes());
        mac.update(b".");
        mac.update(c.as_bytes());
        mac.verify_slice(&sig).map_err(|_| invalid())?;

        let claims: Claims = URL_SAFE_NO_PAD
            .decode(c)
            .ok()
            .and_then(|b| serde_json::from_slice(&b).ok())
            .ok_or_else(invalid)?;
        if now >= claims.exp {
            return Err(AppError::Auth(EXPIRED_TOKEN.into()));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifetimes() {
        assert_eq!(parse_expires_in("90d").unwrap(), 90 * 86_400);
        assert_eq!(parse_expires_in("15m").unwrap(), 900);
        assert_eq!(parse_expires_in("120").unwrap(), 120);
        assert!(parse_expires_in("soon").is_err());
        assert!(parse_expires_in("5y").is_err());
    }

    #[test]
    fn round_trip_and_tamper() {
        let s = TokenSigner::new("my-ultra-secure-secret", "1h").unwrap();
        let t = s.sign_at("abc", 1_000).unwrap();
        let c = s.verify_at(&t, 1_010).unwrap();
        assert_eq!(c, Claims { id: "abc".into(), iat: 1_000, exp: 4_600 });

        let other = TokenSigner::new("another-secret", "1h").unwrap();
        assert!(matches!(other.verify_at(&t, 1_010), Err(AppError::Auth(m)) if m == INVALID_TOKEN));
        assert!(matches!(s.verify_at("a.b", 1_010), Err(AppError::Auth(m)) if m == INVALID_TOKEN));
    }

    #[test]
    fn expired() {
        let s = TokenSigner::new("k", "10s").unwrap();
        let t = s.sign_at("abc", 0).unwrap();
        assert!(matches!(s.verify_at(&t, 10), Err(AppError::Auth(m)) if m == EXPIRED_TOKEN));
    }
}
