//! Credit ledger in front of the image provider.
//!
//! A charged generation takes its credit before the provider is called, using
//! a single conditional write (`balance > 0`), so concurrent requests on one
//! account cannot both spend the last credit. Every failure after that point
//! gives the credit back. The refund is a single best-effort write: if it
//! fails the account stays charged, which is logged and not retried.

use std::sync::Arc;

use crate::error::AppError;
use crate::models::account::{HistoryEntry, HISTORY_LIMIT, STARTING_BALANCE};
use crate::models::generation::GenerationRequest;
use crate::repository::{AccountRepository, ReserveOutcome};
use crate::upstream::{extract, ImageProvider};
use crate::util::{now_millis, uid_prefix};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub result_ref: String,
    /// Balance after the charge; `None` for anonymous calls.
    pub balance: Option<i64>,
}

#[derive(Clone)]
pub struct CreditLedger {
    repo: Arc<dyn AccountRepository>,
    provider: Arc<dyn ImageProvider>,
}

impl CreditLedger {
    pub fn new(repo: Arc<dyn AccountRepository>, provider: Arc<dyn ImageProvider>) -> Self {
        Self { repo, provider }
    }

    /// Run one generation, charging `uid` when present.
    pub async fn generate(
        &self,
        uid: Option<&str>,
        request: &GenerationRequest,
    ) -> Result<Generation, AppError> {
        request.validate().map_err(AppError::BadRequest)?;

        let Some(uid) = uid else {
            tracing::debug!("ledger: anonymous generation, no charge");
            let result_ref = self.invoke(request).await?;
            return Ok(Generation {
                result_ref,
                balance: None,
            });
        };

        match self.repo.reserve_credit(uid, STARTING_BALANCE).await? {
            ReserveOutcome::Reserved(left) => {
                tracing::info!(uid = %uid_prefix(uid), balance = left, "ledger: credit reserved");
            }
            ReserveOutcome::Insufficient => {
                tracing::info!(uid = %uid_prefix(uid), "ledger: rejected, no credits left");
                return Err(AppError::InsufficientCredits);
            }
            ReserveOutcome::Blocked => {
                tracing::warn!(uid = %uid_prefix(uid), "ledger: rejected, account blocked");
                return Err(AppError::Forbidden("Account is blocked".into()));
            }
        }

        let result_ref = match self.invoke(request).await {
            Ok(result_ref) => result_ref,
            Err(e) => {
                self.refund(uid, &e).await;
                return Err(e);
            }
        };

        let entry = HistoryEntry {
            prompt: request.prompt.clone(),
            result_ref: result_ref.clone(),
            created_at: now_millis(),
        };
        let balance = match self.repo.push_history(uid, &entry, HISTORY_LIMIT).await {
            Ok(balance) => balance,
            Err(e) => {
                self.refund(uid, &e).await;
                return Err(e);
            }
        };

        tracing::info!(uid = %uid_prefix(uid), balance, "ledger: generation committed");
        Ok(Generation {
            result_ref,
            balance: Some(balance.max(0)),
        })
    }

    /// Take one credit from an existing account without generating anything.
    pub async fn deduct(&self, uid: &str) -> Result<i64, AppError> {
        match self.repo.deduct_credit(uid).await? {
            Some(balance) => Ok(balance.max(0)),
            None => Err(AppError::InsufficientCredits),
        }
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<String, AppError> {
        let prompt = request.upstream_prompt();
        let payload = self
            .provider
            .generate_image(&prompt, request.model.as_deref().filter(|m| !m.is_empty()))
            .await?;
        extract::result_reference(&payload).ok_or_else(|| {
            tracing::error!(payload = %payload, "ledger: no result reference in provider response");
            AppError::NoResultExtracted
        })
    }

    async fn refund(&self, uid: &str, cause: &AppError) {
        match self.repo.refund_credit(uid).await {
            Ok(()) => {
                tracing::info!(uid = %uid_prefix(uid), cause = cause.kind(), "ledger: credit refunded");
            }
            Err(e) => {
                tracing::error!(
                    uid = %uid_prefix(uid),
                    cause = cause.kind(),
                    error = %e,
                    "ledger: refund failed, account remains charged"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::sqlite_repo::SqliteRepository;
    use crate::upstream::UpstreamError;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies with the same result every call and counts calls.
    struct ScriptedProvider {
        reply: Result<Value, UpstreamError>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(reply: Result<Value, UpstreamError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ImageProvider for ScriptedProvider {
        async fn generate_image(&self, _prompt: &str, _model: Option<&str>) -> Result<Value, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn image_payload(url: &str) -> Value {
        json!({ "choices": [{ "message": { "images": [{ "url": url }] } }] })
    }

    async fn setup(reply: Result<Value, UpstreamError>) -> (CreditLedger, Arc<SqliteRepository>, Arc<ScriptedProvider>) {
        let pool = db::init_pool("sqlite::memory:").await.unwrap();
        let repo = Arc::new(SqliteRepository::new(pool));
        let provider = ScriptedProvider::new(reply);
        let ledger = CreditLedger::new(repo.clone(), provider.clone());
        (ledger, repo, provider)
    }

    fn prompt(text: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: text.into(),
            ..Default::default()
        }
    }

    async fn balance(repo: &SqliteRepository, uid: &str) -> i64 {
        repo.find_account(uid).await.unwrap().unwrap().balance
    }

    #[tokio::test]
    async fn test_first_generation_creates_account_with_one_credit_spent() {
        let (ledger, repo, _) = setup(Ok(image_payload("https://cdn.test/1.png"))).await;

        let generation = ledger.generate(Some("new-user"), &prompt("a fox")).await.unwrap();
        assert_eq!(generation.result_ref, "https://cdn.test/1.png");
        assert_eq!(generation.balance, Some(STARTING_BALANCE - 1));
        assert_eq!(repo.history("new-user").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_balance_fails_without_calling_provider() {
        let (ledger, repo, provider) = setup(Ok(image_payload("https://cdn.test/1.png"))).await;
        repo.sync_account("broke", &Default::default()).await.unwrap();
        repo.adjust_credits("broke", crate::models::admin::CreditAdjustment::Reset)
            .await
            .unwrap();

        let err = ledger.generate(Some("broke"), &prompt("a fox")).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientCredits));
        assert_eq!(balance(&repo, "broke").await, 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_error_refunds() {
        let (ledger, repo, _) = setup(Err(UpstreamError::Api {
            code: Some(402),
            message: "no funds".into(),
        }))
        .await;
        repo.sync_account("u1", &Default::default()).await.unwrap();

        let err = ledger.generate(Some("u1"), &prompt("a fox")).await.unwrap_err();
        assert!(matches!(err, AppError::Upstream { code: Some(402), .. }));
        assert_eq!(balance(&repo, "u1").await, STARTING_BALANCE);
        assert!(repo.history("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_refunds() {
        let (ledger, repo, _) = setup(Err(UpstreamError::Transport("reset".into()))).await;
        repo.sync_account("u1", &Default::default()).await.unwrap();

        let err = ledger.generate(Some("u1"), &prompt("a fox")).await.unwrap_err();
        assert!(matches!(err, AppError::Transport(_)));
        assert_eq!(balance(&repo, "u1").await, STARTING_BALANCE);
    }

    #[tokio::test]
    async fn test_unextractable_response_refunds() {
        let (ledger, repo, _) =
            setup(Ok(json!({ "choices": [{ "message": { "content": "no image today" } }] }))).await;
        repo.sync_account("u1", &Default::default()).await.unwrap();

        let err = ledger.generate(Some("u1"), &prompt("a fox")).await.unwrap_err();
        assert!(matches!(err, AppError::NoResultExtracted));
        assert_eq!(balance(&repo, "u1").await, STARTING_BALANCE);
        assert!(repo.history("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refund_of_first_generation_keeps_created_account() {
        let (ledger, repo, _) = setup(Err(UpstreamError::Transport("down".into()))).await;

        assert!(ledger.generate(Some("fresh"), &prompt("a fox")).await.is_err());
        assert_eq!(balance(&repo, "fresh").await, STARTING_BALANCE);
    }

    #[tokio::test]
    async fn test_anonymous_generation_touches_no_account() {
        let (ledger, repo, provider) = setup(Ok(image_payload("https://cdn.test/a.png"))).await;

        let generation = ledger.generate(None, &prompt("a fox")).await.unwrap();
        assert_eq!(generation.balance, None);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(repo.stats().await.unwrap().total_users, 0);
    }

    #[tokio::test]
    async fn test_blocked_account_rejected_without_charge() {
        let (ledger, repo, provider) = setup(Ok(image_payload("https://cdn.test/a.png"))).await;
        repo.sync_account("bad", &Default::default()).await.unwrap();
        repo.set_blocked("bad", true).await.unwrap();

        let err = ledger.generate(Some("bad"), &prompt("a fox")).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(balance(&repo, "bad").await, STARTING_BALANCE);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_prompt_rejected_before_reserve() {
        let (ledger, repo, provider) = setup(Ok(image_payload("https://cdn.test/a.png"))).await;

        let err = ledger.generate(Some("u1"), &prompt("  ")).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(repo.find_account("u1").await.unwrap().is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_history_capped_newest_first() {
        let (ledger, repo, _) = setup(Ok(image_payload("https://cdn.test/x.png"))).await;
        repo.sync_account("heavy", &Default::default()).await.unwrap();
        repo.adjust_credits("heavy", crate::models::admin::CreditAdjustment::Set(100))
            .await
            .unwrap();

        for i in 0..21 {
            ledger
                .generate(Some("heavy"), &prompt(&format!("prompt {i}")))
                .await
                .unwrap();
        }

        let history = repo.history("heavy").await.unwrap();
        assert_eq!(history.len(), HISTORY_LIMIT as usize);
        assert_eq!(history[0].prompt, "prompt 20");
        assert_eq!(history[19].prompt, "prompt 1");
        assert!(history.iter().all(|h| h.prompt != "prompt 0"));
        assert_eq!(balance(&repo, "heavy").await, 100 - 21);
    }

    #[tokio::test]
    async fn test_deduct() {
        let (ledger, repo, _) = setup(Ok(image_payload("https://cdn.test/x.png"))).await;
        assert!(matches!(ledger.deduct("nobody").await, Err(AppError::InsufficientCredits)));

        repo.sync_account("u1", &Default::default()).await.unwrap();
        assert_eq!(ledger.deduct("u1").await.unwrap(), STARTING_BALANCE - 1);
    }
}
