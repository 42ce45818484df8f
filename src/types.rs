//! Core type definitions shared across the ledger engine.
//!
//! Enum ids are designed for PostgreSQL storage as SMALLINT; action tags are
//! stored as TEXT codes so the audit log stays readable without a decoder.

use std::fmt;

/// The three fungible internal asset types.
///
/// Coin backs the primary `Account.balance`; eggs and gems live on the
/// one-to-one `NestAccount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum AssetId {
    Coin = 1,
    Egg = 2,
    Gem = 3,
}

impl AssetId {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(AssetId::Coin),
            2 => Some(AssetId::Egg),
            3 => Some(AssetId::Gem),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetId::Coin => "COIN",
            AssetId::Egg => "EGG",
            AssetId::Gem => "GEM",
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fixed system counterparty accounts plus ordinary users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum AccountType {
    Treasury = 0,
    Exchange = 1,
    Pool = 2,
    User = 3,
}

impl AccountType {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(AccountType::Treasury),
            1 => Some(AccountType::Exchange),
            2 => Some(AccountType::Pool),
            3 => Some(AccountType::User),
            _ => None,
        }
    }
}

/// Supported external chains for egg purchases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum Chain {
    Bsc = 1,
    Solana = 2,
}

impl Chain {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(Chain::Bsc),
            2 => Some(Chain::Solana),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Bsc => "bsc",
            Chain::Solana => "solana",
        }
    }
}

impl std::str::FromStr for Chain {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bsc" => Ok(Chain::Bsc),
            "solana" => Ok(Chain::Solana),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sell-gem intent resolution status.
///
/// Only intent rows carry a status; it transitions pending -> approved or
/// pending -> rejected exactly once (enforced by a CAS update).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum IntentStatus {
    Pending = 0,
    Approved = 1,
    Rejected = 2,
}

impl IntentStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(IntentStatus::Pending),
            1 => Some(IntentStatus::Approved),
            2 => Some(IntentStatus::Rejected),
            _ => None,
        }
    }
}

/// Coin-only parallel ledger classification. There is no coin mint or burn
/// action, so only the types actually written exist here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinLedgerType {
    Reward,
    Giveaway,
    NestCoin,
}

impl CoinLedgerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoinLedgerType::Reward => "REWARD",
            CoinLedgerType::Giveaway => "GIVEAWAY",
            CoinLedgerType::NestCoin => "NEST_COIN",
        }
    }
}

/// Contextual foreign key kinds an action may require on its ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    TransactionHash,
    NestInvestmentId,
    LinkedLedgerId,
    UnlockNestId,
    QuizAttemptId,
}

/// The enumerated operation tags written to `asset_ledger.action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerAction {
    MintEgg,
    MintGem,
    BurnEgg,
    BurnGem,
    BuyEgg,
    FundExchangeCoin,
    FundExchangeEgg,
    FundExchangeGem,
    WithdrawExchangeCoin,
    WithdrawExchangeEgg,
    WithdrawExchangeGem,
    FundPoolCoin,
    FundPoolEgg,
    FundPoolGem,
    WithdrawPoolCoin,
    WithdrawPoolEgg,
    WithdrawPoolGem,
    BreakEgg,
    BreakEggGem,
    ConvertGem,
    ConvertGemEgg,
    SellGemIntent,
    SellGemApprove,
    SellGemReject,
    UnlockNest,
    InNest,
    Egging,
    EggingGem,
    ReturnNestEgg,
    SignupBonusEgg,
    SignupBonusGem,
    SignupBonusCoin,
    GiveawayCoin,
    GiveawayEgg,
    GiveawayGem,
    QuizReward,
}

impl LedgerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerAction::MintEgg => "MINT_EGG",
            LedgerAction::MintGem => "MINT_GEM",
            LedgerAction::BurnEgg => "BURN_EGG",
            LedgerAction::BurnGem => "BURN_GEM",
            LedgerAction::BuyEgg => "BUY_EGG",
            LedgerAction::FundExchangeCoin => "FUND_EXCHANGE_COIN",
            LedgerAction::FundExchangeEgg => "FUND_EXCHANGE_EGG",
            LedgerAction::FundExchangeGem => "FUND_EXCHANGE_GEM",
            LedgerAction::WithdrawExchangeCoin => "WITHDRAW_EXCHANGE_COIN",
            LedgerAction::WithdrawExchangeEgg => "WITHDRAW_EXCHANGE_EGG",
            LedgerAction::WithdrawExchangeGem => "WITHDRAW_EXCHANGE_GEM",
            LedgerAction::FundPoolCoin => "FUND_POOL_COIN",
            LedgerAction::FundPoolEgg => "FUND_POOL_EGG",
            LedgerAction::FundPoolGem => "FUND_POOL_GEM",
            LedgerAction::WithdrawPoolCoin => "WITHDRAW_POOL_COIN",
            LedgerAction::WithdrawPoolEgg => "WITHDRAW_POOL_EGG",
            LedgerAction::WithdrawPoolGem => "WITHDRAW_POOL_GEM",
            LedgerAction::BreakEgg => "BREAK_EGG",
            LedgerAction::BreakEggGem => "BREAK_EGG_GEM",
            LedgerAction::ConvertGem => "CONVERT_GEM",
            LedgerAction::ConvertGemEgg => "CONVERT_GEM_EGG",
            LedgerAction::SellGemIntent => "SELL_GEM_INTENT",
            LedgerAction::SellGemApprove => "SELL_GEM_APPROVE",
            LedgerAction::SellGemReject => "SELL_GEM_REJECT",
            LedgerAction::UnlockNest => "UNLOCK_NEST",
            LedgerAction::InNest => "IN_NEST",
            LedgerAction::Egging => "EGGING",
            LedgerAction::EggingGem => "EGGING_GEM",
            LedgerAction::ReturnNestEgg => "RETURN_NEST_EGG",
            LedgerAction::SignupBonusEgg => "SIGNUP_BONUS_EGG",
            LedgerAction::SignupBonusGem => "SIGNUP_BONUS_GEM",
            LedgerAction::SignupBonusCoin => "SIGNUP_BONUS_COIN",
            LedgerAction::GiveawayCoin => "GIVEAWAY_COIN",
            LedgerAction::GiveawayEgg => "GIVEAWAY_EGG",
            LedgerAction::GiveawayGem => "GIVEAWAY_GEM",
            LedgerAction::QuizReward => "QUIZ_REWARD",
        }
    }

    /// The asset this action moves. Every action is asset-specific; the
    /// transfer engine rejects a mismatched `TransferSpec`.
    pub fn asset(&self) -> AssetId {
        use LedgerAction::*;
        match self {
            MintEgg | BurnEgg | BuyEgg | FundExchangeEgg | WithdrawExchangeEgg | FundPoolEgg
            | WithdrawPoolEgg | BreakEgg | ConvertGemEgg | InNest | Egging | ReturnNestEgg
            | SignupBonusEgg | GiveawayEgg | QuizReward => AssetId::Egg,
            MintGem | BurnGem | FundExchangeGem | WithdrawExchangeGem | FundPoolGem
            | WithdrawPoolGem | BreakEggGem | ConvertGem | SellGemIntent | SellGemApprove
            | SellGemReject | EggingGem | SignupBonusGem | GiveawayGem => AssetId::Gem,
            FundExchangeCoin | WithdrawExchangeCoin | FundPoolCoin | WithdrawPoolCoin
            | UnlockNest | SignupBonusCoin | GiveawayCoin => AssetId::Coin,
        }
    }

    /// Contextual FKs this action's ledger row must carry.
    ///
    /// Presence of additional refs is permitted (the source system's
    /// mutually-exclusive guard was disabled; kept permissive).
    pub fn required_refs(&self) -> &'static [RefKind] {
        use LedgerAction::*;
        match self {
            BuyEgg => &[RefKind::TransactionHash],
            SellGemApprove => &[RefKind::TransactionHash, RefKind::LinkedLedgerId],
            SellGemReject => &[RefKind::LinkedLedgerId],
            BreakEggGem | ConvertGemEgg => &[RefKind::LinkedLedgerId],
            InNest | Egging | EggingGem | ReturnNestEgg => &[RefKind::NestInvestmentId],
            UnlockNest => &[RefKind::UnlockNestId],
            QuizReward => &[RefKind::QuizAttemptId],
            _ => &[],
        }
    }

    /// Classification for the coin-only parallel `ledger` table.
    /// Only meaningful for coin actions.
    pub fn coin_ledger_type(&self) -> CoinLedgerType {
        use LedgerAction::*;
        match self {
            SignupBonusCoin => CoinLedgerType::Reward,
            GiveawayCoin => CoinLedgerType::Giveaway,
            _ => CoinLedgerType::NestCoin,
        }
    }
}

impl fmt::Display for LedgerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Settlement idempotency marker: either unpaid, or the id of the
/// `asset_ledger` row that proves the payout happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaidMarker {
    NotPaid,
    Paid(i64),
}

impl PaidMarker {
    #[inline]
    pub fn is_paid(&self) -> bool {
        matches!(self, PaidMarker::Paid(_))
    }

    pub fn ledger_id(&self) -> Option<i64> {
        match self {
            PaidMarker::NotPaid => None,
            PaidMarker::Paid(id) => Some(*id),
        }
    }

    pub fn from_column(value: Option<i64>) -> Self {
        match value {
            None => PaidMarker::NotPaid,
            Some(id) => PaidMarker::Paid(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_id_roundtrip() {
        for asset in [AssetId::Coin, AssetId::Egg, AssetId::Gem] {
            assert_eq!(AssetId::from_id(asset.id()), Some(asset));
        }
        assert_eq!(AssetId::from_id(99), None);
    }

    #[test]
    fn test_account_type_roundtrip() {
        for at in [
            AccountType::Treasury,
            AccountType::Exchange,
            AccountType::Pool,
            AccountType::User,
        ] {
            assert_eq!(AccountType::from_id(at.id()), Some(at));
        }
        assert_eq!(AccountType::from_id(-1), None);
    }

    #[test]
    fn test_chain_parse() {
        assert_eq!("bsc".parse::<Chain>(), Ok(Chain::Bsc));
        assert_eq!("solana".parse::<Chain>(), Ok(Chain::Solana));
        assert!("eth".parse::<Chain>().is_err());
        assert_eq!(Chain::from_id(Chain::Solana.id()), Some(Chain::Solana));
    }

    #[test]
    fn test_action_asset_consistency() {
        assert_eq!(LedgerAction::BuyEgg.asset(), AssetId::Egg);
        assert_eq!(LedgerAction::SellGemIntent.asset(), AssetId::Gem);
        assert_eq!(LedgerAction::UnlockNest.asset(), AssetId::Coin);
        assert_eq!(LedgerAction::BreakEgg.asset(), AssetId::Egg);
        assert_eq!(LedgerAction::BreakEggGem.asset(), AssetId::Gem);
    }

    #[test]
    fn test_required_refs() {
        assert_eq!(
            LedgerAction::BuyEgg.required_refs(),
            &[RefKind::TransactionHash]
        );
        assert!(
            LedgerAction::SellGemApprove
                .required_refs()
                .contains(&RefKind::LinkedLedgerId)
        );
        assert_eq!(
            LedgerAction::UnlockNest.required_refs(),
            &[RefKind::UnlockNestId]
        );
        assert!(LedgerAction::MintEgg.required_refs().is_empty());
    }

    #[test]
    fn test_coin_ledger_type() {
        assert_eq!(
            LedgerAction::SignupBonusCoin.coin_ledger_type(),
            CoinLedgerType::Reward
        );
        assert_eq!(
            LedgerAction::GiveawayCoin.coin_ledger_type(),
            CoinLedgerType::Giveaway
        );
        assert_eq!(
            LedgerAction::UnlockNest.coin_ledger_type(),
            CoinLedgerType::NestCoin
        );
    }

    #[test]
    fn test_intent_status_roundtrip() {
        for st in [
            IntentStatus::Pending,
            IntentStatus::Approved,
            IntentStatus::Rejected,
        ] {
            assert_eq!(IntentStatus::from_id(st.id()), Some(st));
        }
        assert_eq!(IntentStatus::from_id(7), None);
    }

    #[test]
    fn test_paid_marker() {
        assert!(!PaidMarker::NotPaid.is_paid());
        assert!(PaidMarker::Paid(42).is_paid());
        assert_eq!(PaidMarker::Paid(42).ledger_id(), Some(42));
        assert_eq!(PaidMarker::from_column(None), PaidMarker::NotPaid);
        assert_eq!(PaidMarker::from_column(Some(7)), PaidMarker::Paid(7));
    }
}
