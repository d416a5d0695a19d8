//! Bearer credentials shared by the bridge (signing) and the ingest sink
//! (verification).
pub mod jwt;

pub use jwt::{BRIDGE_SUBJECT, INGEST_AUDIENCE, IngestClaims, JwtSigner};
