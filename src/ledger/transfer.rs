//! Transfer Engine: the atomic double-entry primitive.
//!
//! `record_transfer` must be called on the connection of an open transaction.
//! It adjusts balances and appends the immutable ledger row(s) for exactly one
//! movement; any error aborts the caller's whole transaction, so balances and
//! ledger rows are never observed partially applied.

use super::types::{ContextRefs, TransferOutcome, TransferSpec};
use crate::db::schema::constraints;
use crate::error::{LedgerError, is_unique_violation};
use crate::types::{AssetId, RefKind};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sqlx::{PgConnection, Row};

/// Record one asset movement: mutate balances, append ledger row(s).
///
/// Coin transfers additionally write the parallel `ledger` row, cross-linked
/// through `nest_ledger_id`. Returns the created row ids.
pub async fn record_transfer(
    conn: &mut PgConnection,
    spec: TransferSpec,
) -> Result<TransferOutcome, LedgerError> {
    validate(&spec)?;

    match spec.asset {
        AssetId::Coin => {
            if let Some(debit) = spec.debit {
                debit_coin(conn, debit, spec.amount).await?;
            }
            if let Some(credit) = spec.credit {
                credit_coin(conn, credit, spec.amount).await?;
            }
        }
        AssetId::Egg => {
            // Validated whole above
            let eggs = spec.amount.to_i64().ok_or_else(|| {
                LedgerError::InvalidAmount(format!("egg amount out of range: {}", spec.amount))
            })?;
            if let Some(debit) = spec.debit {
                adjust_eggs(conn, debit, -eggs).await?;
            }
            if let Some(credit) = spec.credit {
                adjust_eggs(conn, credit, eggs).await?;
            }
        }
        AssetId::Gem => {
            if let Some(debit) = spec.debit {
                adjust_gems(conn, debit, -spec.amount).await?;
            }
            if let Some(credit) = spec.credit {
                adjust_gems(conn, credit, spec.amount).await?;
            }
        }
    }

    let asset_ledger_id = insert_asset_ledger(conn, &spec).await?;

    let coin_ledger_id = if spec.asset == AssetId::Coin {
        Some(insert_coin_ledger(conn, &spec, asset_ledger_id).await?)
    } else {
        None
    };

    tracing::debug!(
        action = %spec.action,
        asset = %spec.asset,
        amount = %spec.amount,
        debit = ?spec.debit,
        credit = ?spec.credit,
        asset_ledger_id,
        "Transfer recorded"
    );

    Ok(TransferOutcome {
        asset_ledger_id,
        coin_ledger_id,
    })
}

fn validate(spec: &TransferSpec) -> Result<(), LedgerError> {
    if spec.amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(format!(
            "amount must be positive, got {}",
            spec.amount
        )));
    }

    if spec.asset != spec.action.asset() {
        return Err(LedgerError::AssetMismatch {
            action: spec.action,
            expected: spec.action.asset(),
            got: spec.asset,
        });
    }

    if spec.debit.is_none() && spec.credit.is_none() {
        return Err(LedgerError::InvalidAmount(
            "transfer needs at least one account (mint or burn has one, transfers two)".into(),
        ));
    }

    match spec.asset {
        AssetId::Egg => {
            if spec.amount.fract() != Decimal::ZERO {
                return Err(LedgerError::InvalidAmount(format!(
                    "egg amounts must be whole numbers, got {}",
                    spec.amount
                )));
            }
        }
        AssetId::Gem => {
            if spec.amount.normalize().scale() > 2 {
                return Err(LedgerError::InvalidAmount(format!(
                    "gem amounts carry at most 2 decimal places, got {}",
                    spec.amount
                )));
            }
        }
        AssetId::Coin => {}
    }

    for required in spec.action.required_refs() {
        let present = match required {
            RefKind::TransactionHash => spec.refs.transaction_hash.is_some(),
            RefKind::NestInvestmentId => spec.refs.nest_investment_id.is_some(),
            RefKind::LinkedLedgerId => spec.refs.linked_ledger_id.is_some(),
            RefKind::UnlockNestId => spec.refs.unlock_nest_id.is_some(),
            RefKind::QuizAttemptId => spec.refs.quiz_attempt_id.is_some(),
        };
        if !present {
            return Err(LedgerError::MissingContextRef {
                action: spec.action,
                field: *required,
            });
        }
    }

    Ok(())
}

/// Conditional coin debit: the `balance >= amount` predicate doubles as the
/// compare-and-swap that prevents concurrent overdraw.
async fn debit_coin(
    conn: &mut PgConnection,
    account_id: i64,
    amount: Decimal,
) -> Result<(), LedgerError> {
    let result = sqlx::query(
        r#"UPDATE accounts SET balance = balance - $1
           WHERE id = $2 AND balance >= $1 AND archived_at IS NULL"#,
    )
    .bind(amount)
    .bind(account_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM accounts WHERE id = $1")
            .bind(account_id)
            .fetch_optional(&mut *conn)
            .await?;
        return Err(match exists {
            Some(_) => LedgerError::InsufficientBalance {
                account: account_id,
                asset: AssetId::Coin,
            },
            None => LedgerError::AccountNotFound(account_id),
        });
    }

    Ok(())
}

async fn credit_coin(
    conn: &mut PgConnection,
    account_id: i64,
    amount: Decimal,
) -> Result<(), LedgerError> {
    let result = sqlx::query(
        "UPDATE accounts SET balance = balance + $1 WHERE id = $2 AND archived_at IS NULL",
    )
    .bind(amount)
    .bind(account_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(LedgerError::AccountNotFound(account_id));
    }

    Ok(())
}

/// Egg balances are adjusted load-modify-save under the row lock.
async fn adjust_eggs(
    conn: &mut PgConnection,
    account_id: i64,
    delta: i64,
) -> Result<(), LedgerError> {
    let current = sqlx::query_scalar::<_, i64>(
        "SELECT eggs FROM nest_accounts WHERE account_id = $1 FOR UPDATE",
    )
    .bind(account_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(LedgerError::NestAccountNotFound(account_id))?;

    let next = current + delta;
    if next < 0 {
        return Err(LedgerError::InsufficientBalance {
            account: account_id,
            asset: AssetId::Egg,
        });
    }

    sqlx::query("UPDATE nest_accounts SET eggs = $1 WHERE account_id = $2")
        .bind(next)
        .bind(account_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

async fn adjust_gems(
    conn: &mut PgConnection,
    account_id: i64,
    delta: Decimal,
) -> Result<(), LedgerError> {
    let current = sqlx::query_scalar::<_, Decimal>(
        "SELECT gems FROM nest_accounts WHERE account_id = $1 FOR UPDATE",
    )
    .bind(account_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(LedgerError::NestAccountNotFound(account_id))?;

    let next = current + delta;
    if next < Decimal::ZERO {
        return Err(LedgerError::InsufficientBalance {
            account: account_id,
            asset: AssetId::Gem,
        });
    }

    sqlx::query("UPDATE nest_accounts SET gems = $1 WHERE account_id = $2")
        .bind(next)
        .bind(account_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

async fn insert_asset_ledger(
    conn: &mut PgConnection,
    spec: &TransferSpec,
) -> Result<i64, LedgerError> {
    let result = sqlx::query(
        r#"INSERT INTO asset_ledger
               (asset_id, action, debit_account, credit_account, amount,
                transaction_hash, nest_investment_id, linked_ledger_id,
                unlock_nest_id, quiz_attempt_id, status)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
           RETURNING id"#,
    )
    .bind(spec.asset.id())
    .bind(spec.action.as_str())
    .bind(spec.debit)
    .bind(spec.credit)
    .bind(spec.amount)
    .bind(&spec.refs.transaction_hash)
    .bind(spec.refs.nest_investment_id)
    .bind(spec.refs.linked_ledger_id)
    .bind(spec.refs.unlock_nest_id)
    .bind(spec.refs.quiz_attempt_id)
    .bind(spec.refs.status.map(|s| s.id()))
    .fetch_one(&mut *conn)
    .await;

    match result {
        Ok(row) => Ok(row.get("id")),
        Err(e) if is_unique_violation(&e, constraints::ASSET_LEDGER_TX_HASH) => {
            Err(LedgerError::DuplicateTransactionHash(
                spec.refs.transaction_hash.clone().unwrap_or_default(),
            ))
        }
        Err(e) => Err(e.into()),
    }
}

async fn insert_coin_ledger(
    conn: &mut PgConnection,
    spec: &TransferSpec,
    asset_ledger_id: i64,
) -> Result<i64, LedgerError> {
    let row = sqlx::query(
        r#"INSERT INTO ledger (debit_account, credit_account, amount, ledger_type, nest_ledger_id)
           VALUES ($1, $2, $3, $4, $5)
           RETURNING id"#,
    )
    .bind(spec.debit)
    .bind(spec.credit)
    .bind(spec.amount)
    .bind(spec.action.coin_ledger_type().as_str())
    .bind(asset_ledger_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.get("id"))
}

/// Convenience constructors used across the Action Library.
pub fn mint(action: crate::types::LedgerAction, credit: i64, amount: Decimal) -> TransferSpec {
    TransferSpec::new(action, None, Some(credit), amount, ContextRefs::none())
}

pub fn burn(action: crate::types::LedgerAction, debit: i64, amount: Decimal) -> TransferSpec {
    TransferSpec::new(action, Some(debit), None, amount, ContextRefs::none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LedgerAction;

    fn spec(action: LedgerAction, amount: Decimal) -> TransferSpec {
        TransferSpec::new(action, Some(1), Some(2), amount, ContextRefs::none())
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        let s = spec(LedgerAction::FundExchangeCoin, Decimal::ZERO);
        assert!(matches!(validate(&s), Err(LedgerError::InvalidAmount(_))));

        let s = spec(LedgerAction::FundExchangeCoin, Decimal::new(-5, 0));
        assert!(matches!(validate(&s), Err(LedgerError::InvalidAmount(_))));
    }

    #[test]
    fn test_rejects_fractional_eggs() {
        let s = spec(LedgerAction::FundExchangeEgg, Decimal::new(15, 1)); // 1.5
        assert!(matches!(validate(&s), Err(LedgerError::InvalidAmount(_))));

        let s = spec(LedgerAction::FundExchangeEgg, Decimal::new(2, 0));
        assert!(validate(&s).is_ok());
    }

    #[test]
    fn test_rejects_gems_beyond_two_decimals() {
        let s = spec(LedgerAction::FundExchangeGem, Decimal::new(1234, 3)); // 1.234
        assert!(matches!(validate(&s), Err(LedgerError::InvalidAmount(_))));

        let s = spec(LedgerAction::FundExchangeGem, Decimal::new(123, 2)); // 1.23
        assert!(validate(&s).is_ok());

        // Trailing zeros normalize away
        let s = spec(LedgerAction::FundExchangeGem, Decimal::new(12300, 4)); // 1.2300
        assert!(validate(&s).is_ok());
    }

    #[test]
    fn test_rejects_asset_mismatch() {
        let mut s = spec(LedgerAction::FundExchangeEgg, Decimal::new(2, 0));
        s.asset = AssetId::Gem;
        assert!(matches!(validate(&s), Err(LedgerError::AssetMismatch { .. })));
    }

    #[test]
    fn test_rejects_missing_required_ref() {
        let s = TransferSpec::new(
            LedgerAction::BuyEgg,
            Some(1),
            Some(2),
            Decimal::new(10, 0),
            ContextRefs::none(),
        );
        assert!(matches!(
            validate(&s),
            Err(LedgerError::MissingContextRef { field: RefKind::TransactionHash, .. })
        ));

        let s = TransferSpec::new(
            LedgerAction::BuyEgg,
            Some(1),
            Some(2),
            Decimal::new(10, 0),
            ContextRefs::tx_hash("0xabc"),
        );
        assert!(validate(&s).is_ok());
    }

    #[test]
    fn test_rejects_void_to_void() {
        let s = TransferSpec::new(
            LedgerAction::MintEgg,
            None,
            None,
            Decimal::new(1, 0),
            ContextRefs::none(),
        );
        assert!(matches!(validate(&s), Err(LedgerError::InvalidAmount(_))));
    }

    #[test]
    fn test_mint_burn_constructors() {
        let m = mint(LedgerAction::MintEgg, 7, Decimal::new(100, 0));
        assert!(m.debit.is_none());
        assert_eq!(m.credit, Some(7));
        assert!(validate(&m).is_ok());

        let b = burn(LedgerAction::BurnGem, 7, Decimal::new(25, 1));
        assert!(b.credit.is_none());
        assert!(validate(&b).is_ok());
    }
}
