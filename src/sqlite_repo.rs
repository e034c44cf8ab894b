use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::AppError;
use crate::models::account::{Account, HistoryEntry, ProfileHints, Role, Settings};
use crate::models::admin::{AdminStats, CreditAdjustment};
use crate::models::chat::{ChatSession, ChatTurn};
use crate::repository::{AccountRepository, ReserveOutcome, SetHandleOutcome};
use crate::util::{now_millis, uid_prefix};

const SELECT_ACCOUNT: &str = "SELECT uid, display_name, avatar, handle, role, blocked, balance, \
     ai_training, notifications, created_at FROM accounts";

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    title: String,
    turns: Json<Vec<ChatTurn>>,
    updated_at: i64,
}

impl From<SessionRow> for ChatSession {
    fn from(row: SessionRow) -> Self {
        ChatSession {
            id: row.session_id,
            title: row.title,
            messages: row.turns.0,
            updated_at: row.updated_at,
        }
    }
}

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

async fn load_account(conn: &mut SqliteConnection, uid: &str) -> Result<Option<Account>, AppError> {
    let account = sqlx::query_as::<_, Account>(&format!("{SELECT_ACCOUNT} WHERE uid = ?"))
        .bind(uid)
        .fetch_optional(conn)
        .await?;
    Ok(account)
}

async fn load_sessions(conn: &mut SqliteConnection, uid: &str) -> Result<Vec<ChatSession>, AppError> {
    let rows: Vec<SessionRow> = sqlx::query_as(
        "SELECT session_id, title, turns, updated_at FROM chat_sessions \
         WHERE uid = ? ORDER BY seq DESC",
    )
    .bind(uid)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(ChatSession::from).collect())
}

#[async_trait]
impl AccountRepository for SqliteRepository {
    async fn sync_account(&self, uid: &str, hints: &ProfileHints) -> Result<Account, AppError> {
        tracing::debug!(uid = %uid_prefix(uid), "db: UPSERT account (sync)");

        let mut tx = self.pool.begin().await?;

        let clamped = sqlx::query("UPDATE accounts SET balance = 0 WHERE uid = ? AND balance < 0")
            .bind(uid)
            .execute(&mut *tx)
            .await?;
        if clamped.rows_affected() > 0 {
            tracing::warn!(uid = %uid_prefix(uid), "db: negative balance clamped to zero");
        }

        sqlx::query(
            "INSERT INTO accounts (uid, display_name, avatar, balance, created_at) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (uid) DO UPDATE SET \
               display_name = COALESCE(NULLIF(accounts.display_name, ''), excluded.display_name), \
               avatar = COALESCE(NULLIF(accounts.avatar, ''), excluded.avatar)",
        )
        .bind(uid)
        .bind(&hints.display_name)
        .bind(&hints.avatar)
        .bind(crate::models::account::STARTING_BALANCE)
        .bind(now_millis())
        .execute(&mut *tx)
        .await?;

        let account = load_account(&mut tx, uid)
            .await?
            .ok_or_else(|| AppError::NotFound("Account not found".into()))?;
        tx.commit().await?;

        tracing::debug!(uid = %uid_prefix(uid), balance = account.balance, "db: account synced");
        Ok(account)
    }

    async fn find_account(&self, uid: &str) -> Result<Option<Account>, AppError> {
        tracing::debug!(uid = %uid_prefix(uid), "db: SELECT account");
        let mut conn = self.pool.acquire().await?;
        let account = load_account(&mut conn, uid).await?;
        tracing::debug!(uid = %uid_prefix(uid), found = account.is_some(), "db: account lookup");
        Ok(account)
    }

    async fn update_profile(&self, uid: &str, update: &ProfileHints) -> Result<Account, AppError> {
        tracing::debug!(uid = %uid_prefix(uid), "db: UPSERT account profile");

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO accounts (uid, display_name, avatar, balance, created_at) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (uid) DO UPDATE SET \
               display_name = COALESCE(excluded.display_name, accounts.display_name), \
               avatar = COALESCE(excluded.avatar, accounts.avatar)",
        )
        .bind(uid)
        .bind(&update.display_name)
        .bind(&update.avatar)
        .bind(crate::models::account::STARTING_BALANCE)
        .bind(now_millis())
        .execute(&mut *tx)
        .await?;

        let account = load_account(&mut tx, uid)
            .await?
            .ok_or_else(|| AppError::NotFound("Account not found".into()))?;
        tx.commit().await?;
        Ok(account)
    }

    async fn update_settings(&self, uid: &str, settings: &Settings) -> Result<Option<Account>, AppError> {
        tracing::debug!(uid = %uid_prefix(uid), "db: UPDATE settings");

        let mut tx = self.pool.begin().await?;
        let result =
            sqlx::query("UPDATE accounts SET ai_training = ?, notifications = ? WHERE uid = ?")
                .bind(settings.ai_training)
                .bind(settings.notifications)
                .bind(uid)
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        let account = load_account(&mut tx, uid).await?;
        tx.commit().await?;
        Ok(account)
    }

    async fn reserve_credit(&self, uid: &str, starting: i64) -> Result<ReserveOutcome, AppError> {
        // A second pass covers a concurrent insert or refund landing between
        // the conditional decrement and the insert-if-absent.
        for attempt in 0..2 {
            tracing::debug!(uid = %uid_prefix(uid), attempt, "db: conditional decrement");

            let taken: Option<(i64,)> = sqlx::query_as(
                "UPDATE accounts SET balance = balance - 1 \
                 WHERE uid = ? AND balance > 0 AND blocked = 0 RETURNING balance",
            )
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;
            if let Some((balance,)) = taken {
                return Ok(ReserveOutcome::Reserved(balance));
            }

            let created: Option<(i64,)> = sqlx::query_as(
                "INSERT INTO accounts (uid, balance, created_at) VALUES (?, ?, ?) \
                 ON CONFLICT (uid) DO NOTHING RETURNING balance",
            )
            .bind(uid)
            .bind((starting - 1).max(0))
            .bind(now_millis())
            .fetch_optional(&self.pool)
            .await?;
            if let Some((balance,)) = created {
                tracing::debug!(uid = %uid_prefix(uid), balance, "db: account created by first generation");
                return Ok(ReserveOutcome::Reserved(balance));
            }

            let state: Option<(bool, i64)> =
                sqlx::query_as("SELECT blocked, balance FROM accounts WHERE uid = ?")
                    .bind(uid)
                    .fetch_optional(&self.pool)
                    .await?;
            match state {
                Some((true, _)) => return Ok(ReserveOutcome::Blocked),
                Some((false, balance)) if balance <= 0 => return Ok(ReserveOutcome::Insufficient),
                _ => continue,
            }
        }
        Ok(ReserveOutcome::Insufficient)
    }

    async fn deduct_credit(&self, uid: &str) -> Result<Option<i64>, AppError> {
        tracing::debug!(uid = %uid_prefix(uid), "db: conditional decrement (deduct)");
        let row: Option<(i64,)> = sqlx::query_as(
            "UPDATE accounts SET balance = balance - 1 WHERE uid = ? AND balance > 0 RETURNING balance",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(balance,)| balance))
    }

    async fn refund_credit(&self, uid: &str) -> Result<(), AppError> {
        tracing::debug!(uid = %uid_prefix(uid), "db: UPDATE balance + 1 (refund)");
        sqlx::query("UPDATE accounts SET balance = balance + 1 WHERE uid = ?")
            .bind(uid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn push_history(&self, uid: &str, entry: &HistoryEntry, limit: i64) -> Result<i64, AppError> {
        tracing::debug!(uid = %uid_prefix(uid), "db: INSERT history entry");

        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO history (uid, prompt, result_ref, created_at) VALUES (?, ?, ?, ?)")
            .bind(uid)
            .bind(&entry.prompt)
            .bind(&entry.result_ref)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await?;

        let evicted = sqlx::query(
            "DELETE FROM history WHERE uid = ? AND seq NOT IN \
             (SELECT seq FROM history WHERE uid = ? ORDER BY seq DESC LIMIT ?)",
        )
        .bind(uid)
        .bind(uid)
        .bind(limit)
        .execute(&mut *tx)
        .await?;

        let (balance,): (i64,) = sqlx::query_as("SELECT balance FROM accounts WHERE uid = ?")
            .bind(uid)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::debug!(
            uid = %uid_prefix(uid),
            evicted = evicted.rows_affected(),
            balance,
            "db: history entry committed"
        );
        Ok(balance.max(0))
    }

    async fn history(&self, uid: &str) -> Result<Vec<HistoryEntry>, AppError> {
        let rows = sqlx::query_as(
            "SELECT prompt, result_ref, created_at FROM history WHERE uid = ? ORDER BY seq DESC",
        )
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn set_handle(&self, uid: &str, handle: &str) -> Result<SetHandleOutcome, AppError> {
        tracing::debug!(uid = %uid_prefix(uid), handle, "db: UPDATE handle where unset");

        let result = sqlx::query("UPDATE accounts SET handle = ? WHERE uid = ? AND handle IS NULL")
            .bind(handle)
            .bind(uid)
            .execute(&self.pool)
            .await;

        match result {
            Ok(r) if r.rows_affected() > 0 => Ok(SetHandleOutcome::Assigned),
            Ok(_) => match self.find_account(uid).await? {
                Some(_) => Ok(SetHandleOutcome::AlreadySet),
                None => Ok(SetHandleOutcome::AccountMissing),
            },
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(SetHandleOutcome::Taken),
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_taken(&self, handle: &str) -> Result<bool, AppError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM accounts WHERE handle = ?")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn save_chat_session(
        &self,
        uid: &str,
        session: &ChatSession,
        starting: i64,
        limit: i64,
    ) -> Result<Vec<ChatSession>, AppError> {
        tracing::debug!(uid = %uid_prefix(uid), session_id = %session.id, "db: save chat session");

        let now = now_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO accounts (uid, balance, created_at) VALUES (?, ?, ?) ON CONFLICT (uid) DO NOTHING",
        )
        .bind(uid)
        .bind(starting)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // Re-inserting assigns a fresh seq, which moves the session to the front.
        sqlx::query("DELETE FROM chat_sessions WHERE uid = ? AND session_id = ?")
            .bind(uid)
            .bind(&session.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO chat_sessions (uid, session_id, title, turns, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uid)
        .bind(&session.id)
        .bind(&session.title)
        .bind(Json(&session.messages))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let evicted = sqlx::query(
            "DELETE FROM chat_sessions WHERE uid = ? AND seq NOT IN \
             (SELECT seq FROM chat_sessions WHERE uid = ? ORDER BY seq DESC LIMIT ?)",
        )
        .bind(uid)
        .bind(uid)
        .bind(limit)
        .execute(&mut *tx)
        .await?;

        let sessions = load_sessions(&mut tx, uid).await?;
        tx.commit().await?;

        tracing::debug!(
            uid = %uid_prefix(uid),
            sessions = sessions.len(),
            evicted = evicted.rows_affected(),
            "db: chat session saved"
        );
        Ok(sessions)
    }

    async fn delete_chat_session(
        &self,
        uid: &str,
        session_id: &str,
    ) -> Result<Option<Vec<ChatSession>>, AppError> {
        tracing::debug!(uid = %uid_prefix(uid), session_id, "db: DELETE chat session");

        // Write before reading: a deferred transaction that reads first cannot
        // upgrade to a writer once another connection has committed.
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chat_sessions WHERE uid = ? AND session_id = ?")
            .bind(uid)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        if load_account(&mut tx, uid).await?.is_none() {
            return Ok(None);
        }
        let sessions = load_sessions(&mut tx, uid).await?;
        tx.commit().await?;
        Ok(Some(sessions))
    }

    async fn chat_sessions(&self, uid: &str) -> Result<Vec<ChatSession>, AppError> {
        let mut conn = self.pool.acquire().await?;
        load_sessions(&mut conn, uid).await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        tracing::debug!("db: SELECT all accounts");
        let accounts = sqlx::query_as::<_, Account>(&format!(
            "{SELECT_ACCOUNT} ORDER BY created_at DESC, uid ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    async fn set_blocked(&self, uid: &str, blocked: bool) -> Result<Option<bool>, AppError> {
        tracing::debug!(uid = %uid_prefix(uid), blocked, "db: UPDATE blocked");
        let row: Option<(bool,)> =
            sqlx::query_as("UPDATE accounts SET blocked = ? WHERE uid = ? RETURNING blocked")
                .bind(blocked)
                .bind(uid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(b,)| b))
    }

    async fn delete_account(&self, uid: &str) -> Result<bool, AppError> {
        tracing::debug!(uid = %uid_prefix(uid), "db: DELETE account (cascade)");

        let result = sqlx::query("DELETE FROM accounts WHERE uid = ?")
            .bind(uid)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        tracing::debug!(uid = %uid_prefix(uid), deleted, "db: delete result");
        Ok(deleted)
    }

    async fn adjust_credits(
        &self,
        uid: &str,
        adjustment: CreditAdjustment,
    ) -> Result<Option<i64>, AppError> {
        tracing::debug!(uid = %uid_prefix(uid), ?adjustment, "db: UPDATE balance (admin)");

        let (sql, amount) = match adjustment {
            CreditAdjustment::Add(amount) => (
                "UPDATE accounts SET balance = MAX(0, balance + ?) WHERE uid = ? RETURNING balance",
                amount,
            ),
            CreditAdjustment::Set(amount) => (
                "UPDATE accounts SET balance = MAX(0, ?) WHERE uid = ? RETURNING balance",
                amount,
            ),
            CreditAdjustment::Reset => (
                "UPDATE accounts SET balance = MAX(0, ?) WHERE uid = ? RETURNING balance",
                0,
            ),
        };
        let row: Option<(i64,)> = sqlx::query_as(sql)
            .bind(amount)
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(balance,)| balance))
    }

    async fn set_role(&self, uid: &str, role: Role) -> Result<Option<Role>, AppError> {
        tracing::debug!(uid = %uid_prefix(uid), role = role.as_str(), "db: UPDATE role");
        let result = sqlx::query("UPDATE accounts SET role = ? WHERE uid = ?")
            .bind(role.as_str())
            .bind(uid)
            .execute(&self.pool)
            .await?;
        Ok((result.rows_affected() > 0).then_some(role))
    }

    async fn stats(&self) -> Result<AdminStats, AppError> {
        let (total_users, total_admins, blocked_users, total_credits_in_system): (i64, i64, i64, i64) =
            sqlx::query_as(
                "SELECT COUNT(*), \
                        COALESCE(SUM(role = 'administrator'), 0), \
                        COALESCE(SUM(blocked), 0), \
                        COALESCE(SUM(balance), 0) \
                 FROM accounts",
            )
            .fetch_one(&self.pool)
            .await?;

        tracing::debug!(total_users, total_admins, blocked_users, total_credits_in_system, "db: stats computed");

        Ok(AdminStats {
            total_users,
            total_admins,
            blocked_users,
            total_credits_in_system,
        })
    }

    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
