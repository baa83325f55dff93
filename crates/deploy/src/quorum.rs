//! Quorum security parameters and their on-chain content hash.

use alloy_core::primitives::{B256, keccak256};
use serde::{Deserialize, Serialize};

/// Security parameters of one quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityParam {
    pub quorum_id: u8,
    /// Percentage of stake assumed adversarial.
    pub adversary_threshold: u8,
    /// Percentage of stake required to confirm a blob.
    pub quorum_threshold: u8,
}

impl SecurityParam {
    /// Parameters of the single quorum used by the mock rollup.
    pub const DEFAULT: Self = Self {
        quorum_id: 0,
        adversary_threshold: 80,
        quorum_threshold: 100,
    };
}

/// keccak256 over the ABI encoding of `(uint8,uint8,uint8)[]`.
///
/// The encoding is the one produced when the array is the single argument
/// of a call: an offset word, the length word, then three words per quorum.
pub fn quorum_params_hash(params: &[SecurityParam]) -> B256 {
    let mut encoded = Vec::with_capacity(32 * (2 + 3 * params.len()));
    encoded.extend_from_slice(&word(32));
    encoded.extend_from_slice(&word(params.len() as u64));
    for param in params {
        encoded.extend_from_slice(&word(param.quorum_id.into()));
        encoded.extend_from_slice(&word(param.adversary_threshold.into()));
        encoded.extend_from_slice(&word(param.quorum_threshold.into()));
    }
    keccak256(&encoded)
}

/// The hash as lowercase hex without prefix, as passed to the rollup script.
pub fn quorum_params_hash_hex(params: &[SecurityParam]) -> String {
    hex::encode(quorum_params_hash(params))
}

fn word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}
