//! Idempotent PostgreSQL schema for the ledger core.
//!
//! Applied at startup; every statement is IF NOT EXISTS so restarts are safe.

use sqlx::PgPool;

const CREATE_ACCOUNTS: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id              BIGSERIAL PRIMARY KEY,
    balance         NUMERIC(30, 8) NOT NULL DEFAULT 0 CHECK (balance >= 0),
    is_system       BOOLEAN NOT NULL DEFAULT FALSE,
    is_internal     BOOLEAN NOT NULL DEFAULT FALSE,
    wallet_id       TEXT,
    archived_at     TIMESTAMPTZ,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_NEST_ACCOUNTS: &str = r#"
CREATE TABLE IF NOT EXISTS nest_accounts (
    id              BIGSERIAL PRIMARY KEY,
    account_id      BIGINT NOT NULL REFERENCES accounts(id),
    eggs            BIGINT NOT NULL DEFAULT 0 CHECK (eggs >= 0),
    gems            NUMERIC(20, 2) NOT NULL DEFAULT 0 CHECK (gems >= 0),
    account_type    SMALLINT NOT NULL DEFAULT 3,
    signup_bonus_egg_addressed   BOOLEAN NOT NULL DEFAULT FALSE,
    signup_bonus_egg_ledger_id   BIGINT,
    signup_bonus_gem_addressed   BOOLEAN NOT NULL DEFAULT FALSE,
    signup_bonus_gem_ledger_id   BIGINT,
    signup_bonus_coin_addressed  BOOLEAN NOT NULL DEFAULT FALSE,
    signup_bonus_coin_ledger_id  BIGINT,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT nest_accounts_account_id_uq UNIQUE (account_id)
)
"#;

const CREATE_ASSET_LEDGER: &str = r#"
CREATE TABLE IF NOT EXISTS asset_ledger (
    id                  BIGSERIAL PRIMARY KEY,
    asset_id            SMALLINT NOT NULL,
    action              TEXT NOT NULL,
    debit_account       BIGINT REFERENCES accounts(id),
    credit_account      BIGINT REFERENCES accounts(id),
    amount              NUMERIC(30, 8) NOT NULL CHECK (amount > 0),
    transaction_hash    TEXT,
    nest_investment_id  BIGINT,
    linked_ledger_id    BIGINT,
    unlock_nest_id      BIGINT,
    quiz_attempt_id     BIGINT,
    status              SMALLINT,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_ASSET_LEDGER_HASH_IDX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS asset_ledger_tx_hash_uq
    ON asset_ledger (transaction_hash)
    WHERE transaction_hash IS NOT NULL
"#;

const CREATE_ASSET_LEDGER_LINK_IDX: &str = r#"
CREATE INDEX IF NOT EXISTS asset_ledger_linked_idx
    ON asset_ledger (linked_ledger_id)
    WHERE linked_ledger_id IS NOT NULL
"#;

const CREATE_COIN_LEDGER: &str = r#"
CREATE TABLE IF NOT EXISTS ledger (
    id              BIGSERIAL PRIMARY KEY,
    debit_account   BIGINT REFERENCES accounts(id),
    credit_account  BIGINT REFERENCES accounts(id),
    amount          NUMERIC(30, 8) NOT NULL CHECK (amount > 0),
    ledger_type     TEXT NOT NULL,
    nest_ledger_id  BIGINT REFERENCES asset_ledger(id),
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_PENDING_TRANSACTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS pending_transactions (
    id                  BIGSERIAL PRIMARY KEY,
    account_id          BIGINT NOT NULL REFERENCES accounts(id),
    transaction_hash    TEXT NOT NULL,
    chain               SMALLINT NOT NULL,
    num_eggs            BIGINT NOT NULL CHECK (num_eggs > 0),
    amount              NUMERIC(30, 8) NOT NULL,
    status              SMALLINT NOT NULL DEFAULT 0,
    attempts            INTEGER NOT NULL DEFAULT 0,
    last_attempt_at     TIMESTAMPTZ,
    completed_at        TIMESTAMPTZ,
    error_message       TEXT,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT pending_transactions_tx_hash_uq UNIQUE (transaction_hash)
)
"#;

const CREATE_DEAD_LETTER: &str = r#"
CREATE TABLE IF NOT EXISTS dead_letter_transactions (
    id                  BIGSERIAL PRIMARY KEY,
    pending_id          BIGINT NOT NULL REFERENCES pending_transactions(id),
    account_id          BIGINT NOT NULL,
    transaction_hash    TEXT NOT NULL,
    chain               SMALLINT NOT NULL,
    num_eggs            BIGINT NOT NULL,
    amount              NUMERIC(30, 8) NOT NULL,
    original_attempts   INTEGER NOT NULL,
    last_error          TEXT,
    needs_manual_review BOOLEAN NOT NULL DEFAULT TRUE,
    is_resolved         BOOLEAN NOT NULL DEFAULT FALSE,
    reviewed_by         TEXT,
    review_notes        TEXT,
    reviewed_at         TIMESTAMPTZ,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_NESTS: &str = r#"
CREATE TABLE IF NOT EXISTS nests (
    id                      BIGSERIAL PRIMARY KEY,
    name                    TEXT NOT NULL,
    egg_pool                BIGINT NOT NULL CHECK (egg_pool > 0),
    egg_limit_per_person    BIGINT NOT NULL CHECK (egg_limit_per_person > 0),
    unlock_coins            NUMERIC(30, 8) NOT NULL CHECK (unlock_coins >= 0),
    scheduled_launch_at     TIMESTAMPTZ NOT NULL,
    scheduled_nest_end      TIMESTAMPTZ NOT NULL,
    scheduled_cool_down_end TIMESTAMPTZ NOT NULL,
    gem_return_min_factor   NUMERIC(10, 4) NOT NULL,
    gem_return_max_factor   NUMERIC(10, 4) NOT NULL,
    gem_return_factor       NUMERIC(10, 4) NOT NULL,
    nest_risk               SMALLINT NOT NULL DEFAULT 0,
    is_launched             BOOLEAN NOT NULL DEFAULT FALSE,
    is_nest_ended           BOOLEAN NOT NULL DEFAULT FALSE,
    is_cool_down_ended      BOOLEAN NOT NULL DEFAULT FALSE,
    archived_at             TIMESTAMPTZ,
    created_at              TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_IN_NEST_ENTRIES: &str = r#"
CREATE TABLE IF NOT EXISTS in_nest_entries (
    id                      BIGSERIAL PRIMARY KEY,
    nest_id                 BIGINT NOT NULL REFERENCES nests(id),
    account_id              BIGINT NOT NULL REFERENCES accounts(id),
    egg_count               BIGINT NOT NULL CHECK (egg_count > 0),
    are_cooled              BIGINT,
    are_gems_distributed    BIGINT,
    got_cancelled           BIGINT,
    created_at              TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_USER_NEST_UNLOCKS: &str = r#"
CREATE TABLE IF NOT EXISTS user_nest_unlocks (
    id          BIGSERIAL PRIMARY KEY,
    nest_id     BIGINT NOT NULL REFERENCES nests(id),
    account_id  BIGINT NOT NULL REFERENCES accounts(id),
    ledger_id   BIGINT REFERENCES asset_ledger(id),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT user_nest_unlocks_nest_account_uq UNIQUE (nest_id, account_id)
)
"#;

const CREATE_TRANSACTION_ISSUES: &str = r#"
CREATE TABLE IF NOT EXISTS transaction_issues (
    id          BIGSERIAL PRIMARY KEY,
    account_id  BIGINT NOT NULL REFERENCES accounts(id),
    action      TEXT NOT NULL,
    asset_id    SMALLINT NOT NULL,
    amount      NUMERIC(30, 8) NOT NULL,
    reason      TEXT NOT NULL,
    is_resolved BOOLEAN NOT NULL DEFAULT FALSE,
    resolved_by TEXT,
    resolved_at TIMESTAMPTZ,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_NEST_ISSUES: &str = r#"
CREATE TABLE IF NOT EXISTS nest_issues (
    id          BIGSERIAL PRIMARY KEY,
    nest_id     BIGINT NOT NULL REFERENCES nests(id),
    phase       TEXT NOT NULL,
    asset_id    SMALLINT NOT NULL,
    shortfall   NUMERIC(30, 8) NOT NULL,
    is_resolved BOOLEAN NOT NULL DEFAULT FALSE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_ASSETS: &str = r#"
CREATE TABLE IF NOT EXISTS assets (
    asset_id     SMALLINT PRIMARY KEY,
    code         TEXT NOT NULL,
    rate_in_usdt NUMERIC(20, 8) NOT NULL
)
"#;

const SEED_ASSETS: &str = r#"
INSERT INTO assets (asset_id, code, rate_in_usdt) VALUES
    (1, 'COIN', 0.01),
    (2, 'EGG', 1.00),
    (3, 'GEM', 2.00)
ON CONFLICT (asset_id) DO NOTHING
"#;

/// Initialize the Postgres schema for the ledger database.
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Initializing ledger schema...");

    for ddl in [
        CREATE_ACCOUNTS,
        CREATE_NEST_ACCOUNTS,
        CREATE_ASSET_LEDGER,
        CREATE_ASSET_LEDGER_HASH_IDX,
        CREATE_ASSET_LEDGER_LINK_IDX,
        CREATE_COIN_LEDGER,
        CREATE_PENDING_TRANSACTIONS,
        CREATE_DEAD_LETTER,
        CREATE_NESTS,
        CREATE_IN_NEST_ENTRIES,
        CREATE_USER_NEST_UNLOCKS,
        CREATE_TRANSACTION_ISSUES,
        CREATE_NEST_ISSUES,
        CREATE_ASSETS,
        SEED_ASSETS,
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    tracing::info!("Ledger schema ready");
    Ok(())
}

/// Constraint names used to map unique violations to domain errors.
pub mod constraints {
    pub const ASSET_LEDGER_TX_HASH: &str = "asset_ledger_tx_hash_uq";
    pub const PENDING_TX_HASH: &str = "pending_transactions_tx_hash_uq";
    pub const NEST_UNLOCK: &str = "user_nest_unlocks_nest_account_uq";
}
