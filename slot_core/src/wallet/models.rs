//! Wallet data models.

use super::errors::{WalletError, WalletResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// User ID type
pub type UserId = i64;

/// Wallet model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub balance: i64,
    pub frozen_balance: i64,
    pub total_deposit: i64,
    pub total_withdraw: i64,
    pub total_bet: i64,
    pub total_win: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Empty wallet for a user
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance: 0,
            frozen_balance: 0,
            total_deposit: 0,
            total_withdraw: 0,
            total_bet: 0,
            total_win: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Spendable balance (`balance - frozen_balance`)
    pub fn available(&self) -> i64 {
        self.balance - self.frozen_balance
    }

    /// Balance view of this wallet
    pub fn balance_view(&self) -> Balance {
        Balance {
            user_id: self.user_id,
            balance: self.balance,
            frozen_balance: self.frozen_balance,
            available: self.available(),
        }
    }

    /// Apply one ledger operation in place, returning `(before, after)` balances.
    ///
    /// Nothing is modified when an error is returned.
    pub fn apply_op(&mut self, op: &LedgerOp) -> WalletResult<(i64, i64)> {
        if op.amount <= 0 {
            return Err(WalletError::InvalidAmount(op.amount));
        }

        let before = self.balance;
        let after = match op.tx_type.direction() {
            EntryDirection::Credit => before
                .checked_add(op.amount)
                .ok_or(WalletError::BalanceOverflow)?,
            EntryDirection::Debit => {
                if op.amount > self.available() {
                    return Err(WalletError::InsufficientBalance {
                        user_id: self.user_id,
                        available: self.available(),
                        required: op.amount,
                    });
                }
                before - op.amount
            }
        };

        match op.tx_type {
            TransactionType::Deposit => self.total_deposit += op.amount,
            TransactionType::Withdraw => self.total_withdraw += op.amount,
            TransactionType::Bet => self.total_bet += op.amount,
            TransactionType::Win | TransactionType::Jackpot => self.total_win += op.amount,
            TransactionType::Refund => self.total_bet -= op.amount,
        }
        self.balance = after;
        self.updated_at = Utc::now();

        Ok((before, after))
    }
}

/// Balance summary returned by `get_balance`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: UserId,
    pub balance: i64,
    pub frozen_balance: i64,
    pub available: i64,
}

/// Entry direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    Debit,
    Credit,
}

impl std::fmt::Display for EntryDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryDirection::Debit => write!(f, "debit"),
            EntryDirection::Credit => write!(f, "credit"),
        }
    }
}

/// Transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdraw,
    Bet,
    Win,
    Jackpot,
    Refund,
}

impl TransactionType {
    /// Whether this type adds to or removes from the balance
    pub fn direction(&self) -> EntryDirection {
        match self {
            TransactionType::Withdraw | TransactionType::Bet => EntryDirection::Debit,
            TransactionType::Deposit
            | TransactionType::Win
            | TransactionType::Jackpot
            | TransactionType::Refund => EntryDirection::Credit,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdraw => "withdraw",
            TransactionType::Bet => "bet",
            TransactionType::Win => "win",
            TransactionType::Jackpot => "jackpot",
            TransactionType::Refund => "refund",
        }
    }

    fn order_prefix(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DP",
            TransactionType::Withdraw => "WD",
            TransactionType::Bet => "BT",
            TransactionType::Win => "WN",
            TransactionType::Jackpot => "JP",
            TransactionType::Refund => "RF",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionType::Deposit),
            "withdraw" => Ok(TransactionType::Withdraw),
            "bet" => Ok(TransactionType::Bet),
            "win" => Ok(TransactionType::Win),
            "jackpot" => Ok(TransactionType::Jackpot),
            "refund" => Ok(TransactionType::Refund),
            other => Err(WalletError::CorruptRow(format!(
                "unknown transaction type '{other}'"
            ))),
        }
    }
}

/// Transaction status. Rows are only written on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Completed => write!(f, "completed"),
        }
    }
}

/// What a transaction refers to (e.g. `game_session` / `<session id>`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRef {
    pub ref_type: Option<String>,
    pub ref_id: Option<String>,
}

impl TransactionRef {
    pub fn new(ref_type: impl Into<String>, ref_id: impl Into<String>) -> Self {
        Self {
            ref_type: Some(ref_type.into()),
            ref_id: Some(ref_id.into()),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// Reference to a game session
    pub fn session(session_id: &str) -> Self {
        Self::new("game_session", session_id)
    }
}

/// One credit or debit inside an atomic ledger unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerOp {
    pub tx_type: TransactionType,
    pub amount: i64,
    pub reference: TransactionRef,
}

impl LedgerOp {
    pub fn new(tx_type: TransactionType, amount: i64, reference: TransactionRef) -> Self {
        Self {
            tx_type,
            amount,
            reference,
        }
    }
}

/// Immutable audit row, one per balance mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: i64,
    pub order_no: String,
    pub user_id: UserId,
    pub tx_type: TransactionType,
    pub amount: i64,
    pub before_balance: i64,
    pub after_balance: i64,
    pub ref_type: Option<String>,
    pub ref_id: Option<String>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    /// Amount with the sign of its effect on the balance
    pub fn signed_amount(&self) -> i64 {
        match self.tx_type.direction() {
            EntryDirection::Credit => self.amount,
            EntryDirection::Debit => -self.amount,
        }
    }
}

/// Generate a unique order number, e.g. `BT20261018123000a1b2c3d4e5f6`
pub fn generate_order_no(tx_type: TransactionType) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}{}{}",
        tx_type.order_prefix(),
        Utc::now().format("%Y%m%d%H%M%S"),
        &suffix[..12]
    )
}

/// Result of a committed atomic unit
#[derive(Debug, Clone)]
pub struct LedgerCommit {
    pub wallet: Wallet,
    pub transactions: Vec<WalletTransaction>,
}

/// Filter for transaction history queries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionFilter {
    pub tx_type: Option<TransactionType>,
    pub ref_type: Option<String>,
    pub ref_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &WalletTransaction) -> bool {
        self.tx_type.is_none_or(|t| t == tx.tx_type)
            && self
                .ref_type
                .as_ref()
                .is_none_or(|r| tx.ref_type.as_ref() == Some(r))
            && self
                .ref_id
                .as_ref()
                .is_none_or(|r| tx.ref_id.as_ref() == Some(r))
            && self.since.is_none_or(|s| tx.created_at >= s)
            && self.until.is_none_or(|u| tx.created_at < u)
    }
}

/// Maximum page size for history queries
pub const MAX_PAGE_SIZE: u32 = 100;

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    pub fn validate(&self) -> WalletResult<()> {
        if self.page == 0 {
            return Err(WalletError::InvalidPage("page starts at 1".to_string()));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(WalletError::InvalidPage(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(())
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

/// One page of transactions, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionPage {
    pub items: Vec<WalletTransaction>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debit_beyond_available_leaves_wallet_untouched() {
        let mut wallet = Wallet::new(1);
        wallet.balance = 100;
        wallet.frozen_balance = 40;

        let op = LedgerOp::new(TransactionType::Bet, 70, TransactionRef::none());
        let err = wallet.apply_op(&op).unwrap_err();

        assert!(matches!(
            err,
            WalletError::InsufficientBalance {
                available: 60,
                required: 70,
                ..
            }
        ));
        assert_eq!(wallet.balance, 100);
        assert_eq!(wallet.total_bet, 0);
    }

    #[test]
    fn test_aggregates_follow_transaction_type() {
        let mut wallet = Wallet::new(1);
        let r = TransactionRef::none();
        wallet
            .apply_op(&LedgerOp::new(TransactionType::Deposit, 500, r.clone()))
            .unwrap();
        wallet
            .apply_op(&LedgerOp::new(TransactionType::Bet, 100, r.clone()))
            .unwrap();
        wallet
            .apply_op(&LedgerOp::new(TransactionType::Win, 40, r.clone()))
            .unwrap();
        wallet
            .apply_op(&LedgerOp::new(TransactionType::Jackpot, 10, r.clone()))
            .unwrap();
        wallet
            .apply_op(&LedgerOp::new(TransactionType::Withdraw, 50, r))
            .unwrap();

        assert_eq!(wallet.balance, 400);
        assert_eq!(wallet.total_deposit, 500);
        assert_eq!(wallet.total_bet, 100);
        assert_eq!(wallet.total_win, 50);
        assert_eq!(wallet.total_withdraw, 50);
    }

    #[test]
    fn test_zero_amount_rejected() {
        let mut wallet = Wallet::new(1);
        let op = LedgerOp::new(TransactionType::Deposit, 0, TransactionRef::none());
        assert!(matches!(
            wallet.apply_op(&op),
            Err(WalletError::InvalidAmount(0))
        ));
    }

    #[test]
    fn test_transaction_type_roundtrip_str() {
        for t in [
            TransactionType::Deposit,
            TransactionType::Withdraw,
            TransactionType::Bet,
            TransactionType::Win,
            TransactionType::Jackpot,
            TransactionType::Refund,
        ] {
            assert_eq!(t.as_str().parse::<TransactionType>().unwrap(), t);
        }
        assert!("bonus".parse::<TransactionType>().is_err());
    }

    #[test]
    fn test_order_numbers_are_unique() {
        let a = generate_order_no(TransactionType::Bet);
        let b = generate_order_no(TransactionType::Bet);
        assert!(a.starts_with("BT"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_page_request_validation() {
        assert!(PageRequest::new(0, 10).validate().is_err());
        assert!(PageRequest::new(1, 0).validate().is_err());
        assert!(PageRequest::new(1, 101).validate().is_err());
        assert_eq!(PageRequest::new(3, 20).offset(), 40);
    }
}
