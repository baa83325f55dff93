//! Static contract artifacts.

use std::sync::LazyLock;

use alloy_core::primitives::{B256, keccak256};

/// ABI of the DA service manager contract.
pub const SERVICE_MANAGER_ABI: &str = include_str!("../abis/ZGDAServiceManager.json");

/// Canonical signature of the batch confirmation event.
pub const BATCH_CONFIRMED_EVENT: &str = "BatchConfirmed(bytes32,uint32,uint96)";

/// Topic hash of [`BATCH_CONFIRMED_EVENT`].
pub static BATCH_CONFIRMED_EVENT_SIG_HASH: LazyLock<B256> =
    LazyLock::new(|| keccak256(BATCH_CONFIRMED_EVENT.as_bytes()));
