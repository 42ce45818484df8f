//! Treasury-counterparty rebalancing of the exchange and pool accounts.
//!
//! Unconditional apart from sufficient-balance checks on the debited side,
//! which the transfer engine enforces.

use super::ActionService;
use crate::error::LedgerError;
use crate::ledger::{ContextRefs, TransferSpec, record_transfer};
use crate::types::{AssetId, LedgerAction};
use rust_decimal::Decimal;
use sqlx::PgConnection;

/// Which system account is being rebalanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceTarget {
    Exchange,
    Pool,
}

impl ActionService {
    /// Treasury -> exchange.
    pub async fn fund_exchange(&self, asset: AssetId, amount: Decimal) -> Result<i64, LedgerError> {
        self.rebalance(RebalanceTarget::Exchange, asset, amount, true)
            .await
    }

    /// Exchange -> treasury.
    pub async fn withdraw_exchange(
        &self,
        asset: AssetId,
        amount: Decimal,
    ) -> Result<i64, LedgerError> {
        self.rebalance(RebalanceTarget::Exchange, asset, amount, false)
            .await
    }

    /// Treasury -> pool.
    pub async fn fund_pool(&self, asset: AssetId, amount: Decimal) -> Result<i64, LedgerError> {
        self.rebalance(RebalanceTarget::Pool, asset, amount, true).await
    }

    /// Pool -> treasury.
    pub async fn withdraw_pool(&self, asset: AssetId, amount: Decimal) -> Result<i64, LedgerError> {
        self.rebalance(RebalanceTarget::Pool, asset, amount, false)
            .await
    }

    async fn rebalance(
        &self,
        target: RebalanceTarget,
        asset: AssetId,
        amount: Decimal,
        funding: bool,
    ) -> Result<i64, LedgerError> {
        let mut tx = self.db().pool().begin().await?;
        let id = self
            .rebalance_in(&mut tx, target, asset, amount, funding)
            .await?;
        tx.commit().await?;
        Ok(id)
    }

    pub async fn rebalance_in(
        &self,
        conn: &mut PgConnection,
        target: RebalanceTarget,
        asset: AssetId,
        amount: Decimal,
        funding: bool,
    ) -> Result<i64, LedgerError> {
        let action = rebalance_action(target, asset, funding);
        let system = self.system_accounts();
        let counterparty = match target {
            RebalanceTarget::Exchange => system.exchange,
            RebalanceTarget::Pool => system.pool,
        };
        let (debit, credit) = if funding {
            (system.treasury, counterparty)
        } else {
            (counterparty, system.treasury)
        };

        let outcome = record_transfer(
            conn,
            TransferSpec::new(action, Some(debit), Some(credit), amount, ContextRefs::none()),
        )
        .await?;

        Ok(outcome.asset_ledger_id)
    }
}

fn rebalance_action(target: RebalanceTarget, asset: AssetId, funding: bool) -> LedgerAction {
    use LedgerAction::*;
    match (target, asset, funding) {
        (RebalanceTarget::Exchange, AssetId::Coin, true) => FundExchangeCoin,
        (RebalanceTarget::Exchange, AssetId::Egg, true) => FundExchangeEgg,
        (RebalanceTarget::Exchange, AssetId::Gem, true) => FundExchangeGem,
        (RebalanceTarget::Exchange, AssetId::Coin, false) => WithdrawExchangeCoin,
        (RebalanceTarget::Exchange, AssetId::Egg, false) => WithdrawExchangeEgg,
        (RebalanceTarget::Exchange, AssetId::Gem, false) => WithdrawExchangeGem,
        (RebalanceTarget::Pool, AssetId::Coin, true) => FundPoolCoin,
        (RebalanceTarget::Pool, AssetId::Egg, true) => FundPoolEgg,
        (RebalanceTarget::Pool, AssetId::Gem, true) => FundPoolGem,
        (RebalanceTarget::Pool, AssetId::Coin, false) => WithdrawPoolCoin,
        (RebalanceTarget::Pool, AssetId::Egg, false) => WithdrawPoolEgg,
        (RebalanceTarget::Pool, AssetId::Gem, false) => WithdrawPoolGem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebalance_action_mapping_is_asset_consistent() {
        for target in [RebalanceTarget::Exchange, RebalanceTarget::Pool] {
            for asset in [AssetId::Coin, AssetId::Egg, AssetId::Gem] {
                for funding in [true, false] {
                    let action = rebalance_action(target, asset, funding);
                    assert_eq!(action.asset(), asset, "{action} should move {asset}");
                }
            }
        }
    }
}
