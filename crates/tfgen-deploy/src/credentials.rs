//! Deployment environments and credential sealing.
//!
//! Credentials are sealed at rest with a process-wide key loaded from the
//! environment at startup. The plaintext form exists only in the spawned
//! terraform process's environment; nothing is ever written to the working
//! directory or to logs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use tfgen_core::Platform;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("TFGEN_SECRET_KEY is not set")]
    MissingKey,

    #[error("sealed credentials are malformed")]
    Malformed,

    #[error("credentials JSON is invalid: {0}")]
    Codec(String),
}

/// Provider credentials as entered by an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum CloudCredentials {
    Aws {
        access_key_id: String,
        secret_access_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
    },
    Azure {
        subscription_id: String,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

impl CloudCredentials {
    pub fn platform(&self) -> Platform {
        match self {
            CloudCredentials::Aws { .. } => Platform::Aws,
            CloudCredentials::Azure { .. } => Platform::Azure,
        }
    }

    /// Environment variables for the terraform child process. These are
    /// attached to the `Command` only; the parent process environment is
    /// never mutated.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        match self {
            CloudCredentials::Aws {
                access_key_id,
                secret_access_key,
                region,
            } => {
                let mut vars = vec![
                    ("AWS_ACCESS_KEY_ID".to_string(), access_key_id.clone()),
                    (
                        "AWS_SECRET_ACCESS_KEY".to_string(),
                        secret_access_key.clone(),
                    ),
                ];
                if let Some(region) = region {
                    vars.push(("AWS_DEFAULT_REGION".to_string(), region.clone()));
                }
                vars
            }
            CloudCredentials::Azure {
                subscription_id,
                tenant_id,
                client_id,
                client_secret,
            } => vec![
                ("ARM_SUBSCRIPTION_ID".to_string(), subscription_id.clone()),
                // The generated provider block reads this variable.
                (
                    "TF_VAR_azure_subscription_id".to_string(),
                    subscription_id.clone(),
                ),
                ("ARM_TENANT_ID".to_string(), tenant_id.clone()),
                ("ARM_CLIENT_ID".to_string(), client_id.clone()),
                ("ARM_CLIENT_SECRET".to_string(), client_secret.clone()),
            ],
        }
    }
}

/// A named credential set deployments execute against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub credentials: CloudCredentials,
}

impl Environment {
    pub fn new(name: impl Into<String>, credentials: CloudCredentials) -> Self {
        Self {
            id: format!("env_{}", &Uuid::new_v4().simple().to_string()[..12]),
            name: name.into(),
            description: String::new(),
            credentials,
        }
    }

    pub fn platform(&self) -> Platform {
        self.credentials.platform()
    }
}

/// Symmetric sealing with a SHA-256 keystream over a random nonce.
///
/// Not an AEAD; it keeps credentials unreadable at rest and is confined to
/// this module so a stronger cipher is a drop-in change.
#[derive(Clone)]
pub struct SecretBox {
    key: [u8; 32],
}

impl SecretBox {
    /// Key material from `TFGEN_SECRET_KEY`, hashed to a fixed width.
    pub fn from_env() -> Result<Self, CredentialError> {
        let raw = std::env::var("TFGEN_SECRET_KEY").map_err(|_| CredentialError::MissingKey)?;
        Ok(Self::from_passphrase(&raw))
    }

    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(passphrase.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&hasher.finalize());
        Self { key }
    }

    pub fn seal_credentials(&self, credentials: &CloudCredentials) -> String {
        let plaintext =
            serde_json::to_vec(credentials).expect("credentials serialize to JSON");
        self.seal(&plaintext)
    }

    pub fn open_credentials(&self, sealed: &str) -> Result<CloudCredentials, CredentialError> {
        let plaintext = self.open(sealed)?;
        serde_json::from_slice(&plaintext).map_err(|e| CredentialError::Codec(e.to_string()))
    }

    pub fn seal(&self, plaintext: &[u8]) -> String {
        let nonce = *Uuid::new_v4().as_bytes();
        let mut body = plaintext.to_vec();
        self.apply_keystream(&nonce, &mut body);

        let mut envelope = Vec::with_capacity(16 + body.len());
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&body);
        base64_encode(&envelope)
    }

    pub fn open(&self, sealed: &str) -> Result<Vec<u8>, CredentialError> {
        let envelope = base64_decode(sealed).ok_or(CredentialError::Malformed)?;
        if envelope.len() < 16 {
            return Err(CredentialError::Malformed);
        }
        let mut nonce = [0u8; 16];
        nonce.copy_from_slice(&envelope[..16]);
        let mut body = envelope[16..].to_vec();
        self.apply_keystream(&nonce, &mut body);
        Ok(body)
    }

    fn apply_keystream(&self, nonce: &[u8; 16], data: &mut [u8]) {
        for (block_index, chunk) in data.chunks_mut(32).enumerate() {
            let mut hasher = Sha256::new();
            hasher.update(self.key);
            hasher.update(nonce);
            hasher.update((block_index as u64).to_le_bytes());
            let block = hasher.finalize();
            for (byte, key_byte) in chunk.iter_mut().zip(block.iter()) {
                *byte ^= key_byte;
            }
        }
    }
}

fn base64_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn base64_decode(data: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(data).ok()
}
