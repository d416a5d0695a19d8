use anyhow::{Context, Result, anyhow};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Subject every bridge token is issued for.
pub const BRIDGE_SUBJECT: &str = "wa-bridge";
/// Audience the ingest endpoint accepts.
pub const INGEST_AUDIENCE: &str = "ingest";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct IngestClaims {
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl IngestClaims {
    /// Build short-lived claims for the bridge role.
    ///
    /// ```
    /// use security::jwt::IngestClaims;
    /// use time::Duration;
    ///
    /// let claims = IngestClaims::bridge(Duration::seconds(120));
    /// assert_eq!(claims.sub, "wa-bridge");
    /// assert_eq!(claims.aud, "ingest");
    /// assert_eq!(claims.ttl_seconds(), 120);
    /// ```
    pub fn bridge(ttl: Duration) -> Self {
        Self::new(BRIDGE_SUBJECT, INGEST_AUDIENCE, ttl)
    }

    pub fn new(sub: impl Into<String>, aud: impl Into<String>, ttl: Duration) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            sub: sub.into(),
            aud: aud.into(),
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.exp.saturating_sub(self.iat).max(1) as u64
    }
}

/// Signs (and optionally verifies) bearer tokens.
///
/// HS256 uses one shared secret for both directions. RS256/ES256 sign with a
/// PEM private key; verification additionally needs the PEM public key.
#[derive(Clone)]
pub struct JwtSigner {
    alg: Algorithm,
    secret: Option<Vec<u8>>,
    private_key: Option<Vec<u8>>,
    public_key: Option<Vec<u8>>,
}

impl std::fmt::Debug for JwtSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSigner")
            .field("alg", &self.alg)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("public_key", &self.public_key.is_some())
            .finish()
    }
}

impl JwtSigner {
    pub fn hs256(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            alg: Algorithm::HS256,
            secret: Some(secret.into()),
            private_key: None,
            public_key: None,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads `JWT_ALG` (default HS256) plus the key material that algorithm needs.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let alg = non_empty("JWT_ALG")
            .unwrap_or_else(|| "HS256".to_string())
            .to_uppercase();
        match alg.as_str() {
            "HS256" => {
                let secret = non_empty("JWT_SECRET").context("JWT_SECRET required for HS256")?;
                Ok(Self::hs256(secret.into_bytes()))
            }
            "RS256" | "ES256" => {
                let private_key = non_empty("JWT_PRIVATE_KEY")
                    .with_context(|| format!("JWT_PRIVATE_KEY required for {alg}"))?;
                Ok(Self {
                    alg: if alg == "RS256" {
                        Algorithm::RS256
                    } else {
                        Algorithm::ES256
                    },
                    secret: None,
                    private_key: Some(private_key.into_bytes()),
                    public_key: non_empty("JWT_PUBLIC_KEY").map(String::into_bytes),
                })
            }
            other => Err(anyhow!("unsupported JWT algorithm {}", other)),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.alg
    }

    pub fn sign(&self, claims: &IngestClaims) -> Result<String> {
        let header = Header::new(self.alg);
        let encoding = self.encoding_key()?;
        Ok(encode(&header, claims, &encoding)?)
    }

    /// Verifies signature, expiry, audience, and subject.
    pub fn verify(&self, token: &str, audience: &str, subject: &str) -> Result<IngestClaims> {
        let decoding = self.decoding_key()?;
        let mut validation = Validation::new(self.alg);
        validation.leeway = 0;
        validation.set_audience(&[audience]);
        validation.sub = Some(subject.to_string());
        validation.set_required_spec_claims(&["exp", "aud", "sub"]);
        let data = decode::<IngestClaims>(token, &decoding, &validation)?;
        Ok(data.claims)
    }

    fn encoding_key(&self) -> Result<EncodingKey> {
        match self.alg {
            Algorithm::HS256 => {
                let secret = self.secret.as_ref().context("HS256 secret missing")?;
                Ok(EncodingKey::from_secret(secret))
            }
            Algorithm::RS256 => {
                let private = self
                    .private_key
                    .as_ref()
                    .context("RS256 private key missing")?;
                Ok(EncodingKey::from_rsa_pem(private)?)
            }
            Algorithm::ES256 => {
                let private = self
                    .private_key
                    .as_ref()
                    .context("ES256 private key missing")?;
                Ok(EncodingKey::from_ec_pem(private)?)
            }
            _ => Err(anyhow!("unsupported encoding algorithm {:?}", self.alg)),
        }
    }

    fn decoding_key(&self) -> Result<DecodingKey> {
        match self.alg {
            Algorithm::HS256 => {
                let secret = self.secret.as_ref().context("HS256 secret missing")?;
                Ok(DecodingKey::from_secret(secret))
            }
            Algorithm::RS256 => {
                let public = self
                    .public_key
                    .as_ref()
                    .context("RS256 public key missing")?;
                Ok(DecodingKey::from_rsa_pem(public)?)
            }
            Algorithm::ES256 => {
                let public = self
                    .public_key
                    .as_ref()
                    .context("ES256 public key missing")?;
                Ok(DecodingKey::from_ec_pem(public)?)
            }
            _ => Err(anyhow!("unsupported decoding algorithm {:?}", self.alg)),
        }
    }
}
