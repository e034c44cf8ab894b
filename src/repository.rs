use async_trait::async_trait;

use crate::error::AppError;
use crate::models::account::{Account, HistoryEntry, ProfileHints, Role, Settings};
use crate::models::admin::{AdminStats, CreditAdjustment};
use crate::models::chat::ChatSession;

/// Outcome of the atomic reserve step that precedes a charged generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// One credit was taken; carries the balance left afterwards.
    Reserved(i64),
    /// The account exists with a zero balance. Nothing was written.
    Insufficient,
    /// The account is blocked. Nothing was written.
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetHandleOutcome {
    Assigned,
    AccountMissing,
    AlreadySet,
    Taken,
}

/// Account store keyed by identity key. Every method is a single atomic write
/// or read of one account (plus its owned history and chat rows).
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Upsert on identity sync. Clamps a negative balance and fills only
    /// display name / avatar values that are currently missing.
    async fn sync_account(&self, uid: &str, hints: &ProfileHints) -> Result<Account, AppError>;
    async fn find_account(&self, uid: &str) -> Result<Option<Account>, AppError>;
    /// Upsert that overwrites the provided profile fields.
    async fn update_profile(&self, uid: &str, update: &ProfileHints) -> Result<Account, AppError>;
    async fn update_settings(&self, uid: &str, settings: &Settings) -> Result<Option<Account>, AppError>;

    /// Conditional decrement; creates the account with `starting - 1` when absent.
    async fn reserve_credit(&self, uid: &str, starting: i64) -> Result<ReserveOutcome, AppError>;
    /// Conditional decrement of an existing account only. `None` when nothing was taken.
    async fn deduct_credit(&self, uid: &str) -> Result<Option<i64>, AppError>;
    async fn refund_credit(&self, uid: &str) -> Result<(), AppError>;
    /// Insert at the front of history and evict beyond `limit`. Returns the current balance.
    async fn push_history(&self, uid: &str, entry: &HistoryEntry, limit: i64) -> Result<i64, AppError>;
    async fn history(&self, uid: &str) -> Result<Vec<HistoryEntry>, AppError>;

    async fn set_handle(&self, uid: &str, handle: &str) -> Result<SetHandleOutcome, AppError>;
    async fn handle_taken(&self, handle: &str) -> Result<bool, AppError>;

    /// Replace or add a session, moving it to the front; evicts beyond `limit`.
    async fn save_chat_session(
        &self,
        uid: &str,
        session: &ChatSession,
        starting: i64,
        limit: i64,
    ) -> Result<Vec<ChatSession>, AppError>;
    /// `None` when the account does not exist.
    async fn delete_chat_session(
        &self,
        uid: &str,
        session_id: &str,
    ) -> Result<Option<Vec<ChatSession>>, AppError>;
    async fn chat_sessions(&self, uid: &str) -> Result<Vec<ChatSession>, AppError>;

    async fn list_accounts(&self) -> Result<Vec<Account>, AppError>;
    async fn set_blocked(&self, uid: &str, blocked: bool) -> Result<Option<bool>, AppError>;
    async fn delete_account(&self, uid: &str) -> Result<bool, AppError>;
    async fn adjust_credits(
        &self,
        uid: &str,
        adjustment: CreditAdjustment,
    ) -> Result<Option<i64>, AppError>;
    async fn set_role(&self, uid: &str, role: Role) -> Result<Option<Role>, AppError>;
    async fn stats(&self) -> Result<AdminStats, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}
