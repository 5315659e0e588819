// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) publication.
//!
//! Shared-secret deployments publish an empty set. RSA deployments publish
//! exactly one key, built from the same [`KeyManager`] the issuer signs with.

use std::sync::Arc;

use jsonwebtoken::jwk::{
    AlgorithmParameters, CommonParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse,
    RSAKeyParameters, RSAKeyType,
};
use jsonwebtoken::Algorithm;

use super::keys::KeyManager;

#[derive(Debug, Clone)]
pub struct JwksPublisher {
    keys: Arc<KeyManager>,
}

impl JwksPublisher {
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &KeyManager {
        &self.keys
    }

    pub fn publish(&self) -> JwkSet {
        let Some(parts) = self.keys.public_parts() else {
            return JwkSet { keys: Vec::new() };
        };

        let jwk = Jwk {
            common: CommonParameters {
                public_key_use: Some(PublicKeyUse::Signature),
                key_algorithm: key_algorithm(self.keys.algorithm()),
                key_id: Some(parts.kid.clone()),
                ..Default::default()
            },
            algorithm: AlgorithmParameters::RSA(RSAKeyParameters {
                key_type: RSAKeyType::RSA,
                n: parts.n.clone(),
                e: parts.e.clone(),
            }),
        };
        JwkSet { keys: vec![jwk] }
    }
}

fn key_algorithm(algorithm: Algorithm) -> Option<KeyAlgorithm> {
    match algorithm {
        Algorithm::RS256 => Some(KeyAlgorithm::RS256),
        Algorithm::RS384 => Some(KeyAlgorithm::RS384),
        Algorithm::RS512 => Some(KeyAlgorithm::RS512),
        Algorithm::PS256 => Some(KeyAlgorithm::PS256),
        Algorithm::PS384 => Some(KeyAlgorithm::PS384),
        Algorithm::PS512 => Some(KeyAlgorithm::PS512),
        _ => None,
    }
}
