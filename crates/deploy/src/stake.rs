//! Stake and operator configuration derived from experiment parameters.
//!
//! The derivation is pure apart from key store lookups: the same parameters
//! and keys always yield the same [`ZgdaDeployConfig`].

use alloy_core::primitives::{U256, Uint};
use serde::{Deserialize, Serialize};

use crate::{
    config::ExperimentConfig,
    error::{DeployError, Result},
    keys::KeyStore,
};

/// Number of staking strategies created by the deployment script.
pub const NUM_STRATEGIES: usize = 2;

/// Integer wide enough for any finite weight brought to a common binary
/// exponent (2098 bits), times a `u128` total, summed over `u32::MAX` stakers.
type Wide = Uint<2304, 36>;

/// Exponent of the smallest subnormal `f64` (`2^-1074`).
const MIN_EXPONENT: i32 = -1074;

/// Token amounts per strategy and staker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeAllocation {
    amounts: Vec<Vec<U256>>,
}

impl StakeAllocation {
    /// Split `total` across `weights` for each of `strategies` strategies.
    ///
    /// Each amount is `floor(w_i / sum(w) * total)`; the remainder lost to
    /// truncation is never redistributed.
    pub fn compute(weights: &[f64], total: f64, strategies: usize) -> Result<Self> {
        let parts = weights
            .iter()
            .enumerate()
            .map(|(index, &weight)| decompose(index, weight))
            .collect::<Result<Vec<_>>>()?;

        // Every weight is `m * 2^e`: shifting onto the smallest exponent in use
        // keeps the ratios exact, and the common factor cancels out.
        let base = parts
            .iter()
            .filter(|(mantissa, _)| *mantissa != 0)
            .map(|(_, exponent)| *exponent)
            .min();
        let Some(base) = base else {
            return Err(DeployError::ZeroStakeWeight);
        };
        let scaled: Vec<Wide> = parts
            .iter()
            .map(|&(mantissa, exponent)| {
                Wide::from(mantissa) << ((exponent - base) as usize)
            })
            .collect();
        let sum = scaled.iter().fold(Wide::ZERO, |acc, w| acc + *w);

        let total = total_amount(total)?;
        let row = scaled
            .iter()
            .map(|w| {
                // Bounded by `total`, which fits in a u128.
                let amount = *w * Wide::from(total) / sum;
                u128::try_from(&amount).map(U256::from).map_err(|_| {
                    DeployError::InvalidConfig {
                        field: "services.stakes.total",
                        reason: "stake amount overflows".to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            amounts: vec![row; strategies],
        })
    }

    pub fn strategies(&self) -> usize {
        self.amounts.len()
    }

    /// Amounts for strategy `index`, one per staker.
    pub fn strategy(&self, index: usize) -> Option<&[U256]> {
        self.amounts.get(index).map(Vec::as_slice)
    }

    /// Amounts rendered as decimal strings, as expected by the deploy script.
    pub fn to_strings(&self) -> Vec<Vec<String>> {
        self.amounts
            .iter()
            .map(|row| row.iter().map(U256::to_string).collect())
            .collect()
    }
}

/// Split a weight into an integer mantissa and a binary exponent.
fn decompose(index: usize, weight: f64) -> Result<(u64, i32)> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(DeployError::InvalidStakeWeight { index, weight });
    }
    let bits = weight.to_bits();
    let exponent = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & ((1 << 52) - 1);
    Ok(if exponent == 0 {
        (fraction, MIN_EXPONENT)
    } else {
        (fraction | (1 << 52), exponent - 1075)
    })
}

fn total_amount(total: f64) -> Result<u128> {
    if !total.is_finite() || total < 0.0 || total >= u128::MAX as f64 {
        return Err(DeployError::InvalidConfig {
            field: "services.stakes.total",
            reason: format!("{total} is not a valid token amount"),
        });
    }
    Ok(total.trunc() as u128)
}

/// Payload written to `script/zgda_deploy_config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZgdaDeployConfig {
    pub use_defaults: bool,
    pub num_strategies: usize,
    pub max_operator_count: u32,
    pub staker_private_keys: Vec<String>,
    pub staker_token_amounts: Vec<Vec<String>>,
    pub operator_private_keys: Vec<String>,
}

/// Build the contract deployment payload for an experiment.
///
/// Fails on a missing `staker{i}`/`opr{i}` key or a zero-sum distribution.
pub fn derive_deploy_config(config: &ExperimentConfig, keys: &KeyStore) -> Result<ZgdaDeployConfig> {
    let stakes = &config.services.stakes;
    let allocation = StakeAllocation::compute(&stakes.distribution, stakes.total, NUM_STRATEGIES)?;

    let stakers = (0..stakes.distribution.len())
        .map(|i| keys.key_string(&format!("staker{i}")))
        .collect::<Result<Vec<_>>>()?;
    let operators = (0..stakes.distribution.len())
        .map(|i| keys.key_string(&format!("opr{i}")))
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(
        stakers = stakers.len(),
        strategies = NUM_STRATEGIES,
        amounts = ?allocation.strategy(0),
        "Derived stake allocation"
    );

    Ok(ZgdaDeployConfig {
        use_defaults: true,
        num_strategies: NUM_STRATEGIES,
        max_operator_count: config.services.counts.num_max_operator_count,
        staker_private_keys: stakers,
        staker_token_amounts: allocation.to_strings(),
        operator_private_keys: operators,
    })
}
