//! Admin operations
//!
//! Coupon distribution to vault-token holders and the backend switches that
//! control early-withdraw pricing. These are operator tools, not part of the
//! user flows, so they report plain `anyhow` errors.

use anyhow::{Context, Result};
use ethereum_types::{Address, H256, U256};
use tracing::info;

use crate::amount::bps_of;
use crate::backend::{BackendClient, HolderList};
use crate::chains::{format_address, format_hash, ChainGateway};

/// Per-holder coupon amounts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CouponPlan {
    pub holders: Vec<Address>,
    pub amounts: Vec<U256>,
}

impl CouponPlan {
    pub fn total(&self) -> U256 {
        self.amounts.iter().fold(U256::zero(), |acc, a| acc.saturating_add(*a))
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }
}

/// Coupon for each holder: `balance × coupon_bps / 10000`.
pub fn plan_coupon(list: &HolderList, coupon_bps: u64) -> CouponPlan {
    CouponPlan {
        holders: list.holders.clone(),
        amounts: list.balances.iter().map(|b| bps_of(*b, coupon_bps)).collect(),
    }
}

/// Pays the current cycle's coupon to every holder of `vault`.
///
/// # Returns
///
/// * `Ok(Some(tx))` - Distribution mined
/// * `Ok(None)` - No holders, nothing sent
/// * `Err(anyhow::Error)` - Backend, contract or receipt failure
pub async fn distribute_coupon<C: ChainGateway>(
    chain: &C,
    backend: &BackendClient,
    chain_id: u64,
    vault: Address,
) -> Result<Option<H256>> {
    let list = backend
        .holder_list(&vault, chain_id)
        .await
        .context("Failed to fetch holder list")?;

    let rate = chain.coupon_rate(vault).await?;
    if rate > U256::from(u64::MAX) {
        anyhow::bail!("Coupon rate {} of {} is out of range", rate, format_address(&vault));
    }
    let plan = plan_coupon(&list, rate.as_u64());
    if plan.is_empty() {
        info!("No holders for {}; nothing to distribute", format_address(&vault));
        return Ok(None);
    }

    info!(
        "Distributing coupon ({} bps) to {} holder(s), total {}",
        rate,
        plan.holders.len(),
        plan.total()
    );
    let tx = chain.distribute_coupon(vault, &plan.holders, &plan.amounts).await?;
    let receipt = chain.wait_for_receipt(tx).await?;
    if !receipt.success {
        anyhow::bail!("Coupon distribution {} reverted", format_hash(&tx));
    }
    Ok(Some(tx))
}
