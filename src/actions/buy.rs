//! Buy eggs: exchange -> user, tagged with the external transaction hash.
//!
//! The sparse unique index on `asset_ledger.transaction_hash` makes this the
//! exactly-once gate for external payments: a duplicate hash surfaces as
//! `DuplicateTransactionHash` ("transaction already processed").

use super::ActionService;
use crate::error::LedgerError;
use crate::ledger::{ContextRefs, TransferSpec, record_transfer};
use crate::types::LedgerAction;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use validator::Validate;

#[derive(Debug, Validate)]
pub struct BuyEggsParams {
    #[validate(range(min = 1))]
    pub num_eggs: i64,
    #[validate(length(min = 10, max = 128))]
    pub transaction_hash: String,
}

impl ActionService {
    pub async fn buy_eggs(
        &self,
        account_id: i64,
        params: BuyEggsParams,
    ) -> Result<i64, LedgerError> {
        let mut tx = self.db().pool().begin().await?;
        let id = self.buy_eggs_in(&mut tx, account_id, params).await?;
        tx.commit().await?;
        Ok(id)
    }

    pub async fn buy_eggs_in(
        &self,
        conn: &mut PgConnection,
        account_id: i64,
        params: BuyEggsParams,
    ) -> Result<i64, LedgerError> {
        params.validate()?;

        if self.system_accounts().contains(account_id) {
            return Err(LedgerError::SystemAccountForbidden(account_id));
        }

        let outcome = record_transfer(
            conn,
            TransferSpec::new(
                LedgerAction::BuyEgg,
                Some(self.system_accounts().exchange),
                Some(account_id),
                Decimal::from(params.num_eggs),
                ContextRefs::tx_hash(params.transaction_hash),
            ),
        )
        .await?;

        tracing::info!(
            account_id,
            num_eggs = params.num_eggs,
            ledger_id = outcome.asset_ledger_id,
            "Eggs credited for external payment"
        );

        Ok(outcome.asset_ledger_id)
    }
}
