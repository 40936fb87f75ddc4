//! Voter identity resolution.
//!
//! A voter is identified by client IP. Forwarding headers are only believed
//! when the TCP peer is a trusted proxy. The IP is salted and hashed before
//! it is used as a `VoterId`, so raw addresses are never stored.

use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use ipnet::IpNet;
use sha2::{Digest, Sha256};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::api::ErrorBody;
use crate::types::VoterId;

const DEFAULT_SALT: &str = "choice-awards";
const DEFAULT_TRUSTED_PROXIES: &str = "127.0.0.1/32,::1/128";
/// Hex characters kept from the digest
const VOTER_ID_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Salt mixed into the voter hash
    pub salt: String,
    /// Peers allowed to set X-Forwarded-For / X-Real-IP
    pub trusted_proxies: Vec<IpNet>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            salt: DEFAULT_SALT.to_string(),
            trusted_proxies: parse_proxies(DEFAULT_TRUSTED_PROXIES),
        }
    }
}

impl IdentityConfig {
    /// Load from VOTER_ID_SALT and TRUSTED_PROXIES
    pub fn from_env() -> Self {
        let salt = match std::env::var("VOTER_ID_SALT")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
        {
            Some(salt) => salt,
            None => {
                tracing::warn!("VOTER_ID_SALT not set, using the built-in default salt");
                DEFAULT_SALT.to_string()
            }
        };

        let trusted_proxies = std::env::var("TRUSTED_PROXIES")
            .map(|v| parse_proxies(&v))
            .unwrap_or_else(|_| parse_proxies(DEFAULT_TRUSTED_PROXIES));

        tracing::info!(
            trusted_proxies = trusted_proxies.len(),
            "Identity config loaded"
        );

        Self {
            salt,
            trusted_proxies,
        }
    }

    pub fn is_trusted_proxy(&self, ip: IpAddr) -> bool {
        self.trusted_proxies.iter().any(|net| net.contains(&ip))
    }

    /// Determine the client address for a request from `peer`
    pub fn client_ip(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
        let peer = peer?;
        if !self.is_trusted_proxy(peer) {
            return Some(peer);
        }
        self.forwarded_ip(headers).or(Some(peer))
    }

    /// Nearest untrusted hop of X-Forwarded-For, falling back to X-Real-IP.
    ///
    /// Proxies append to the header, so everything left of the last
    /// untrusted hop is whatever the client chose to send.
    fn forwarded_ip(&self, headers: &HeaderMap) -> Option<IpAddr> {
        let chain: Vec<&str> = headers
            .get_all("x-forwarded-for")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
            .collect();

        for hop in chain.iter().rev() {
            match hop.parse::<IpAddr>() {
                Ok(ip) if self.is_trusted_proxy(ip) => continue,
                Ok(ip) => return Some(ip),
                Err(_) => break,
            }
        }

        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    /// Stable, salted voter id for a client address
    pub fn voter_id(&self, ip: IpAddr) -> VoterId {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(b":");
        hasher.update(ip.to_string().as_bytes());
        let mut id = hex::encode(hasher.finalize());
        id.truncate(VOTER_ID_LEN);
        id
    }
}

/// Parse a comma-separated list of CIDRs or bare addresses, skipping bad entries
fn parse_proxies(value: &str) -> Vec<IpNet> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            let parsed = s
                .parse::<IpNet>()
                .ok()
                .or_else(|| s.parse::<IpAddr>().ok().map(IpNet::from));
            if parsed.is_none() {
                tracing::warn!(entry = s, "Ignoring invalid TRUSTED_PROXIES entry");
            }
            parsed
        })
        .collect()
}

/// The resolved identity of the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voter(pub VoterId);

/// No usable client address on the request
#[derive(Debug)]
pub struct UnknownVoter;

impl IntoResponse for UnknownVoter {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                code: "UNKNOWN_VOTER".to_string(),
                msg: "Could not determine voter identity".to_string(),
            }),
        )
            .into_response()
    }
}

impl<S> FromRequestParts<S> for Voter
where
    S: Send + Sync,
    Arc<IdentityConfig>: FromRef<S>,
{
    type Rejection = UnknownVoter;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Arc::<IdentityConfig>::from_ref(state);
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        match config.client_ip(&parts.headers, peer) {
            Some(ip) => Ok(Voter(config.voter_id(ip))),
            None => {
                tracing::warn!("Request without a client address");
                Err(UnknownVoter)
            }
        }
    }
}
