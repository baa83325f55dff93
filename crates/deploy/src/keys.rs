//! Private key material for the named roles of an experiment.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy_core::primitives::U256;
use alloy_signer_local::PrivateKeySigner;
use serde::{Deserialize, Serialize};

use crate::{
    config::ExperimentConfig,
    error::{DeployError, Result},
};

const PRIVATE_KEY_FILE: &str = "private_key_hex.txt";
const PASSWORD_FILE: &str = "password.txt";

/// Key material for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    /// The raw key as stored: `0x`-prefixed hex or decimal.
    pub private_key: String,
    /// Password protecting `key_file`.
    pub password: String,
    /// Encrypted key file consumed by the node binaries.
    pub key_file: PathBuf,
    /// Account address, for ECDSA keys only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Kind of key, each with its own directory under `secrets/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum KeyKind {
    #[strum(serialize = "ecdsa")]
    Ecdsa,
    #[strum(serialize = "bls")]
    Bls,
}

impl KeyKind {
    fn dir(&self, secrets: &Path) -> PathBuf {
        secrets.join(format!("{self}_keys"))
    }

    /// Key file of the `index`-th (zero based) key.
    fn key_file(&self, secrets: &Path, index: usize) -> PathBuf {
        self.dir(secrets)
            .join("keys")
            .join(format!("{}.{self}.key.json", index + 1))
    }
}

/// Role names that need keys, in the order keys are handed out.
pub fn role_names(config: &ExperimentConfig) -> Vec<String> {
    let counts = &config.services.counts;
    let mut names: Vec<String> = config.deployers.iter().map(|d| d.name.clone()).collect();
    names.extend((0..counts.num_operators).map(|i| format!("opr{i}")));
    names.extend((0..config.services.stakes.distribution.len()).map(|i| format!("staker{i}")));
    names.extend((0..counts.num_dispersers).map(|i| format!("dis{i}")));
    names.extend(["churner", "batcher0", "retriever0"].map(String::from));
    names
}

/// Keys of every role of an experiment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyStore {
    ecdsa: BTreeMap<String, KeyInfo>,
    bls: BTreeMap<String, KeyInfo>,
}

impl KeyStore {
    /// Load keys for `roles` from a secrets directory.
    ///
    /// The directory holds `ecdsa_keys/` and `bls_keys/`, each with a
    /// `private_key_hex.txt` and a `password.txt` (one entry per line) and
    /// the encrypted key files under `keys/`.
    pub fn load(secrets: &Path, roles: &[String]) -> Result<Self> {
        let ecdsa = Self::load_kind(secrets, KeyKind::Ecdsa, roles)?;
        let bls = Self::load_kind(secrets, KeyKind::Bls, roles)?;

        tracing::info!(
            roles = roles.len(),
            secrets = %secrets.display(),
            "Private keys loaded"
        );

        Ok(Self { ecdsa, bls })
    }

    /// Load the keys for an experiment, using [`role_names`].
    pub fn load_for(config: &ExperimentConfig) -> Result<Self> {
        Self::load(&config.secrets_dir(), &role_names(config))
    }

    fn load_kind(
        secrets: &Path,
        kind: KeyKind,
        roles: &[String],
    ) -> Result<BTreeMap<String, KeyInfo>> {
        let dir = kind.dir(secrets);
        let keys_path = dir.join(PRIVATE_KEY_FILE);
        let keys = read_lines(&keys_path)?;
        let passwords = read_lines(&dir.join(PASSWORD_FILE))?;

        if keys.len() < roles.len() {
            return Err(DeployError::NotEnoughKeys {
                path: keys_path,
                roles: roles.len(),
                keys: keys.len(),
            });
        }

        roles
            .iter()
            .zip(keys)
            .enumerate()
            .map(|(index, (role, private_key))| {
                let address = match kind {
                    KeyKind::Ecdsa => Some(ecdsa_address(role, &private_key)?),
                    KeyKind::Bls => None,
                };
                let info = KeyInfo {
                    private_key,
                    password: passwords.get(index).cloned().unwrap_or_default(),
                    key_file: kind.key_file(secrets, index),
                    address,
                };
                tracing::debug!(role, kind = %kind, address = ?info.address, "Assigned key");
                Ok((role.clone(), info))
            })
            .collect()
    }

    /// Register an ECDSA key for a role.
    pub fn insert_ecdsa(&mut self, role: impl Into<String>, info: KeyInfo) {
        self.ecdsa.insert(role.into(), info);
    }

    /// Register a BLS key for a role.
    pub fn insert_bls(&mut self, role: impl Into<String>, info: KeyInfo) {
        self.bls.insert(role.into(), info);
    }

    pub fn ecdsa(&self, role: &str) -> Result<&KeyInfo> {
        self.ecdsa.get(role).ok_or_else(|| DeployError::MissingKey {
            role: role.to_string(),
        })
    }

    pub fn bls(&self, role: &str) -> Result<&KeyInfo> {
        self.bls.get(role).ok_or_else(|| DeployError::MissingKey {
            role: role.to_string(),
        })
    }

    /// The ECDSA private key of `role` as a decimal integer string.
    pub fn key_string(&self, role: &str) -> Result<String> {
        let key = &self.ecdsa(role)?.private_key;
        parse_key_integer(key)
            .map(|value| value.to_string())
            .ok_or_else(|| DeployError::InvalidKey {
                role: role.to_string(),
            })
    }
}

/// Parse a key integer with radix detection: `0x` hex, otherwise decimal.
fn parse_key_integer(key: &str) -> Option<U256> {
    U256::from_str(key.trim()).ok()
}

fn ecdsa_address(role: &str, private_key: &str) -> Result<String> {
    let signer = PrivateKeySigner::from_str(private_key.trim()).map_err(|_| {
        DeployError::InvalidKey {
            role: role.to_string(),
        }
    })?;
    Ok(signer.address().to_string())
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| DeployError::io(path, e))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempdir::TempDir;

    /// First anvil development key and its address.
    pub(crate) const ANVIL_KEY_0: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const ANVIL_ADDRESS_0: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    /// Deterministic, valid secp256k1 key for index `i`.
    pub(crate) fn test_key(i: usize) -> String {
        format!("0x{:064x}", i + 1)
    }

    /// Write a secrets directory with `count` keys of each kind.
    pub(crate) fn write_secrets(secrets: &Path, count: usize) {
        for kind in [KeyKind::Ecdsa, KeyKind::Bls] {
            let dir = kind.dir(secrets);
            std::fs::create_dir_all(dir.join("keys")).unwrap();
            let keys: Vec<String> = (0..count).map(test_key).collect();
            let passwords: Vec<String> = (0..count).map(|i| format!("pass{i}")).collect();
            std::fs::write(dir.join(PRIVATE_KEY_FILE), keys.join("\n")).unwrap();
            std::fs::write(dir.join(PASSWORD_FILE), passwords.join("\n")).unwrap();
        }
    }

    /// A key store holding a key for every role of `config`.
    pub(crate) fn store_for(config: &ExperimentConfig) -> KeyStore {
        let mut store = KeyStore::default();
        for (i, role) in role_names(config).into_iter().enumerate() {
            let info = KeyInfo {
                private_key: test_key(i),
                password: format!("pass{i}"),
                key_file: PathBuf::from(format!("keys/{}.ecdsa.key.json", i + 1)),
                address: None,
            };
            store.insert_ecdsa(role.clone(), info.clone());
            store.insert_bls(
                role,
                KeyInfo {
                    key_file: PathBuf::from(format!("keys/{}.bls.key.json", i + 1)),
                    ..info
                },
            );
        }
        store
    }

    #[test]
    fn test_role_names_order() {
        let temp_dir = TempDir::new("inabox-test").unwrap();
        let config = crate::config::tests::sample_config(temp_dir.path());

        let names = role_names(&config);
        assert_eq!(
            names,
            vec![
                "default", "opr0", "opr1", "opr2", "staker0", "staker1", "staker2", "dis0",
                "churner", "batcher0", "retriever0",
            ]
        );
    }

    #[test]
    fn test_load_assigns_keys_in_order() {
        let temp_dir = TempDir::new("inabox-test").unwrap();
        let roles: Vec<String> = ["default", "opr0", "staker0"].map(String::from).to_vec();
        write_secrets(temp_dir.path(), 4);

        let store = KeyStore::load(temp_dir.path(), &roles).unwrap();

        let opr = store.ecdsa("opr0").unwrap();
        assert_eq!(opr.private_key, test_key(1));
        assert_eq!(opr.password, "pass1");
        assert_eq!(
            opr.key_file,
            temp_dir.path().join("ecdsa_keys/keys/2.ecdsa.key.json")
        );
        assert!(opr.address.is_some());

        let bls = store.bls("staker0").unwrap();
        assert_eq!(bls.key_file, temp_dir.path().join("bls_keys/keys/3.bls.key.json"));
        assert!(bls.address.is_none());
    }

    #[test]
    fn test_load_not_enough_keys() {
        let temp_dir = TempDir::new("inabox-test").unwrap();
        let roles: Vec<String> = (0..5).map(|i| format!("staker{i}")).collect();
        write_secrets(temp_dir.path(), 3);

        let err = KeyStore::load(temp_dir.path(), &roles).unwrap_err();
        assert!(matches!(err, DeployError::NotEnoughKeys { roles: 5, keys: 3, .. }));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_load_missing_directory() {
        let temp_dir = TempDir::new("inabox-test").unwrap();
        let roles = vec!["default".to_string()];

        let err = KeyStore::load(&temp_dir.path().join("absent"), &roles).unwrap_err();
        assert!(matches!(err, DeployError::Io { .. }));
    }

    #[test]
    fn test_ecdsa_address_derivation() {
        let address = ecdsa_address("deployer", ANVIL_KEY_0).unwrap();
        assert_eq!(address, ANVIL_ADDRESS_0);

        assert!(matches!(
            ecdsa_address("deployer", "not-a-key"),
            Err(DeployError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_key_string_radix_detection() {
        let mut store = KeyStore::default();
        let info = |key: &str| KeyInfo {
            private_key: key.to_string(),
            password: String::new(),
            key_file: PathBuf::new(),
            address: None,
        };
        store.insert_ecdsa("hex", info("0x10"));
        store.insert_ecdsa("dec", info("12345"));
        store.insert_ecdsa("bad", info("0xzz"));

        assert_eq!(store.key_string("hex").unwrap(), "16");
        assert_eq!(store.key_string("dec").unwrap(), "12345");
        assert!(matches!(
            store.key_string("bad"),
            Err(DeployError::InvalidKey { .. })
        ));
        assert!(matches!(
            store.key_string("staker7"),
            Err(DeployError::MissingKey { ref role }) if role == "staker7"
        ));
    }
}
