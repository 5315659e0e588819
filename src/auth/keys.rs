// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing key material.
//!
//! [`KeyManager::resolve`] runs once during start-up, before the listener is
//! bound, and the resulting value is shared read-only (behind an `Arc`) by the
//! issuer, the verifier and the JWKS publisher. Nothing regenerates or swaps
//! the key afterwards, so every token signed by this process carries the
//! `kid` that the JWKS endpoint publishes.
//!
//! ## Key sources
//!
//! - `HS*`: the shared `SECRET_KEY`, no `kid`.
//! - `RS*` / `PS*` with `JWT_PRIVATE_KEY` + `JWT_PUBLIC_KEY`: the supplied PEM
//!   pair (PKCS#1 or PKCS#8 / SPKI), checked to belong together.
//! - `RS*` / `PS*` without keys: a fresh 2048-bit RSA pair. It is lost on
//!   restart and only meant for development.
//!
//! The `kid` is the unpadded URL-safe base64 of SHA-256 over the DER encoded
//! SubjectPublicKeyInfo of the public key.

use base64ct::{Base64UrlUnpadded, Encoding};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::TokenSettings;

/// Size of generated development keys.
pub const GENERATED_KEY_BITS: usize = 2048;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("unsupported token algorithm {0:?}; use HS256/384/512, RS256/384/512 or PS256/384/512")]
    UnsupportedAlgorithm(Algorithm),

    #[error("JWT_PRIVATE_KEY and JWT_PUBLIC_KEY must be set together")]
    IncompleteKeyPair,

    #[error("invalid {which} key: {reason}")]
    InvalidKey { which: &'static str, reason: String },

    #[error("JWT_PUBLIC_KEY does not belong to JWT_PRIVATE_KEY")]
    MismatchedKeyPair,

    #[error("RSA key generation failed: {0}")]
    Generation(#[from] rsa::Error),

    #[error("key encoding failed: {0}")]
    Encoding(String),
}

/// Algorithm family, derived from the configured algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Symmetric,
    Asymmetric,
}

impl KeyFamily {
    pub fn of(algorithm: Algorithm) -> Result<Self, KeyError> {
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(KeyFamily::Symmetric),
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Ok(KeyFamily::Asymmetric),
            other => Err(KeyError::UnsupportedAlgorithm(other)),
        }
    }
}

/// Public half of an RSA signing key, as published in the JWKS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicJwkParts {
    pub kid: String,
    /// Modulus, unpadded base64url big-endian
    pub n: String,
    /// Exponent, unpadded base64url big-endian
    pub e: String,
}

/// Borrowed view of the key in use.
pub struct ActiveKey<'a> {
    pub algorithm: Algorithm,
    pub signing: &'a EncodingKey,
    pub verifying: &'a DecodingKey,
    pub kid: Option<&'a str>,
}

/// Resolved, immutable key material for the life of the process.
pub struct KeyManager {
    algorithm: Algorithm,
    signing: EncodingKey,
    verifying: DecodingKey,
    public: Option<PublicJwkParts>,
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("algorithm", &self.algorithm)
            .field("kid", &self.kid())
            .finish_non_exhaustive()
    }
}

impl KeyManager {
    /// Resolve key material from token settings.
    pub fn resolve(settings: &TokenSettings) -> Result<Self, KeyError> {
        match KeyFamily::of(settings.algorithm)? {
            KeyFamily::Symmetric => Ok(Self::symmetric(
                settings.algorithm,
                settings.secret.as_bytes(),
            )),
            KeyFamily::Asymmetric => {
                let private_key = match (&settings.private_key_pem, &settings.public_key_pem) {
                    (Some(private_pem), Some(public_pem)) => {
                        let private_key = parse_private_key(private_pem)?;
                        let public_key = parse_public_key(public_pem)?;
                        if RsaPublicKey::from(&private_key) != public_key {
                            return Err(KeyError::MismatchedKeyPair);
                        }
                        private_key
                    }
                    (None, None) => {
                        warn!(
                            bits = GENERATED_KEY_BITS,
                            "No JWT key pair configured; generating an ephemeral RSA key. \
                             Tokens will not survive a restart"
                        );
                        generate_private_key()?
                    }
                    _ => return Err(KeyError::IncompleteKeyPair),
                };
                let manager = Self::asymmetric(settings.algorithm, &private_key)?;
                info!(algorithm = ?settings.algorithm, kid = ?manager.kid(), "Signing key resolved");
                Ok(manager)
            }
        }
    }

    fn symmetric(algorithm: Algorithm, secret: &[u8]) -> Self {
        Self {
            algorithm,
            signing: EncodingKey::from_secret(secret),
            verifying: DecodingKey::from_secret(secret),
            public: None,
        }
    }

    fn asymmetric(algorithm: Algorithm, private_key: &RsaPrivateKey) -> Result<Self, KeyError> {
        let public_key = RsaPublicKey::from(private_key);

        let private_der = private_key
            .to_pkcs1_der()
            .map_err(|e| KeyError::Encoding(e.to_string()))?;
        let public_der = public_key
            .to_pkcs1_der()
            .map_err(|e| KeyError::Encoding(e.to_string()))?;

        Ok(Self {
            algorithm,
            signing: EncodingKey::from_rsa_der(private_der.as_bytes()),
            verifying: DecodingKey::from_rsa_der(public_der.as_bytes()),
            public: Some(PublicJwkParts {
                kid: compute_kid(&public_key)?,
                n: Base64UrlUnpadded::encode_string(&public_key.n().to_bytes_be()),
                e: Base64UrlUnpadded::encode_string(&public_key.e().to_bytes_be()),
            }),
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn family(&self) -> KeyFamily {
        if self.public.is_some() {
            KeyFamily::Asymmetric
        } else {
            KeyFamily::Symmetric
        }
    }

    /// Key identifier; `None` for shared-secret algorithms.
    pub fn kid(&self) -> Option<&str> {
        self.public.as_ref().map(|p| p.kid.as_str())
    }

    /// Publishable public key parts; `None` for shared-secret algorithms.
    pub fn public_parts(&self) -> Option<&PublicJwkParts> {
        self.public.as_ref()
    }

    pub fn active_key(&self) -> ActiveKey<'_> {
        ActiveKey {
            algorithm: self.algorithm,
            signing: &self.signing,
            verifying: &self.verifying,
            kid: self.kid(),
        }
    }
}

fn generate_private_key() -> Result<RsaPrivateKey, KeyError> {
    let mut rng = rsa::rand_core::OsRng;
    Ok(RsaPrivateKey::new(&mut rng, GENERATED_KEY_BITS)?)
}

fn compute_kid(public_key: &RsaPublicKey) -> Result<String, KeyError> {
    let spki = public_key
        .to_public_key_der()
        .map_err(|e| KeyError::Encoding(e.to_string()))?;
    Ok(Base64UrlUnpadded::encode_string(&Sha256::digest(spki.as_bytes())))
}

fn parse_private_key(input: &str) -> Result<RsaPrivateKey, KeyError> {
    let invalid = |reason: String| KeyError::InvalidKey {
        which: "private",
        reason,
    };
    let block = pem::parse(input.trim()).map_err(|e| invalid(e.to_string()))?;
    match block.tag() {
        "RSA PRIVATE KEY" => {
            RsaPrivateKey::from_pkcs1_der(block.contents()).map_err(|e| invalid(e.to_string()))
        }
        "PRIVATE KEY" => {
            RsaPrivateKey::from_pkcs8_der(block.contents()).map_err(|e| invalid(e.to_string()))
        }
        other => Err(invalid(format!("unexpected PEM block {other:?}"))),
    }
}

fn parse_public_key(input: &str) -> Result<RsaPublicKey, KeyError> {
    let invalid = |reason: String| KeyError::InvalidKey {
        which: "public",
        reason,
    };
    let block = pem::parse(input.trim()).map_err(|e| invalid(e.to_string()))?;
    match block.tag() {
        "RSA PUBLIC KEY" => {
            RsaPublicKey::from_pkcs1_der(block.contents()).map_err(|e| invalid(e.to_string()))
        }
        "PUBLIC KEY" => RsaPublicKey::from_public_key_der(block.contents())
            .map_err(|e| invalid(e.to_string())),
        other => Err(invalid(format!("unexpected PEM block {other:?}"))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rsa::pkcs1::LineEnding;
    use rsa::pkcs8::EncodePrivateKey;
    use std::sync::OnceLock;

    /// One RSA key shared by all tests in the crate; generation is slow.
    pub(crate) fn test_rsa_key() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| generate_private_key().expect("generate test key"))
    }

    pub(crate) fn token_settings(algorithm: Algorithm) -> TokenSettings {
        TokenSettings {
            algorithm,
            secret: "test-secret-key-with-enough-entropy".to_string(),
            ttl_minutes: 60,
            issuer: None,
            audience: None,
            private_key_pem: None,
            public_key_pem: None,
        }
    }

    /// RS256 settings with the shared test key supplied as PEM.
    pub(crate) fn rsa_token_settings() -> TokenSettings {
        let key = test_rsa_key();
        let mut settings = token_settings(Algorithm::RS256);
        settings.private_key_pem = Some(key.to_pkcs1_pem(LineEnding::LF).unwrap().to_string());
        settings.public_key_pem = Some(
            RsaPublicKey::from(key)
                .to_pkcs1_pem(LineEnding::LF)
                .unwrap(),
        );
        settings
    }

    #[test]
    fn symmetric_has_no_kid() {
        let manager = KeyManager::resolve(&token_settings(Algorithm::HS256)).unwrap();
        assert_eq!(manager.family(), KeyFamily::Symmetric);
        assert!(manager.kid().is_none());
        assert!(manager.public_parts().is_none());
        assert!(manager.active_key().kid.is_none());
    }

    #[test]
    fn supplied_pair_is_adopted() {
        let manager = KeyManager::resolve(&rsa_token_settings()).unwrap();
        let expected_kid = compute_kid(&RsaPublicKey::from(test_rsa_key())).unwrap();

        assert_eq!(manager.family(), KeyFamily::Asymmetric);
        assert_eq!(manager.kid(), Some(expected_kid.as_str()));
        assert_eq!(manager.active_key().kid, manager.kid());
    }

    #[test]
    fn kid_is_stable_across_resolutions_and_encodings() {
        let key = test_rsa_key();
        let pkcs1 = KeyManager::resolve(&rsa_token_settings()).unwrap();

        let mut settings = token_settings(Algorithm::PS256);
        settings.private_key_pem = Some(key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string());
        settings.public_key_pem = Some(
            RsaPublicKey::from(key)
                .to_public_key_pem(LineEnding::LF)
                .unwrap(),
        );
        let pkcs8 = KeyManager::resolve(&settings).unwrap();

        assert_eq!(pkcs1.kid(), pkcs8.kid());
        // 32-byte digest, unpadded base64url
        assert_eq!(pkcs1.kid().map(str::len), Some(43));
    }

    #[test]
    fn escaped_newlines_are_accepted_via_config() {
        let settings = rsa_token_settings();
        let escaped = settings.private_key_pem.as_ref().unwrap().replace('\n', "\\n");
        let config = crate::config::Settings::from_lookup(|name| match name {
            "SECRET_KEY" => Some("s".to_string()),
            "TOKEN_ALGORITHM" => Some("RS256".to_string()),
            "JWT_PRIVATE_KEY" => Some(escaped.clone()),
            "JWT_PUBLIC_KEY" => settings.public_key_pem.clone(),
            _ => None,
        })
        .unwrap();
        assert!(KeyManager::resolve(&config.token).is_ok());
    }

    #[test]
    fn half_configured_pair_is_rejected() {
        let mut settings = rsa_token_settings();
        settings.public_key_pem = None;
        assert!(matches!(
            KeyManager::resolve(&settings),
            Err(KeyError::IncompleteKeyPair)
        ));
    }

    #[test]
    fn mismatched_pair_is_rejected() {
        let other = generate_private_key().unwrap();
        let mut settings = rsa_token_settings();
        settings.public_key_pem = Some(
            RsaPublicKey::from(&other)
                .to_pkcs1_pem(LineEnding::LF)
                .unwrap(),
        );
        assert!(matches!(
            KeyManager::resolve(&settings),
            Err(KeyError::MismatchedKeyPair)
        ));
    }

    #[test]
    fn garbage_pem_is_rejected() {
        let mut settings = rsa_token_settings();
        settings.private_key_pem = Some("not a key".to_string());
        assert!(matches!(
            KeyManager::resolve(&settings),
            Err(KeyError::InvalidKey { which: "private", .. })
        ));
    }

    #[test]
    fn ecdsa_algorithm_is_unsupported() {
        assert!(matches!(
            KeyManager::resolve(&token_settings(Algorithm::ES256)),
            Err(KeyError::UnsupportedAlgorithm(Algorithm::ES256))
        ));
    }

    #[test]
    fn missing_pair_generates_ephemeral_key() {
        let manager = KeyManager::resolve(&token_settings(Algorithm::RS256)).unwrap();
        let parts = manager.public_parts().expect("asymmetric key");
        assert!(!parts.n.is_empty());
        // 65537
        assert_eq!(parts.e, "AQAB");
    }
}
