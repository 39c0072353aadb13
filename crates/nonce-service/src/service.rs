//! Nonce 服务主模块
//!
//! 组合 token 生成器与存储后端，实现 nonce 的签发、校验、消费与查询。
//! 每个服务实例绑定一个存储，并在构造时启动一个过期清理任务。

use crate::config::{NonceServiceConfig, SweeperConfig};
use crate::error::{NonceError, NonceResult};
use crate::metrics::{NONCE_CHECKS, NONCES_CONSUMED, NONCES_ISSUED, record_outcome};
use crate::storage::NonceStorage;
use crate::sweeper::{self, ExpirySweeper};
use crate::token;
use crate::types::{Nonce, ServiceStats};
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Nonce 服务
///
/// Drop 时会取消后台清理任务；需要等待任务退出时使用
/// [`shutdown`](Self::shutdown) + [`wait_for_sweeper`](Self::wait_for_sweeper)。
#[derive(Debug)]
pub struct NonceService {
    storage: NonceStorage,
    sweeper: ExpirySweeper,
}

impl NonceService {
    /// 使用已初始化的存储创建服务，并启动清理任务
    ///
    /// 必须在 Tokio 运行时内调用
    pub fn new(storage: NonceStorage, sweeper: &SweeperConfig) -> Self {
        info!(
            "Initializing nonce service: backend={}, sweep interval={:?}",
            storage.backend_name(),
            sweeper.interval()
        );

        let sweeper = ExpirySweeper::spawn(storage.clone(), sweeper.interval());
        Self { storage, sweeper }
    }

    /// 从配置创建服务
    pub async fn from_config(config: &NonceServiceConfig) -> NonceResult<Self> {
        let storage = NonceStorage::from_config(&config.storage).await?;
        Ok(Self::new(storage, &config.sweeper))
    }

    /// 签发新的 nonce
    ///
    /// 先持久化新记录，再将同一 (action, user_id) 下其他仍有效的记录置为无效。
    /// 两步之间并发的读取可能短暂看到两条有效记录。
    pub async fn issue(
        &self,
        action: &str,
        user_id: Uuid,
        expires_in: Duration,
    ) -> NonceResult<Nonce> {
        let nonce = token::generate(action, user_id, expires_in)?;
        let nonce = self.storage.save(nonce).await?;

        let superseded = self.invalidate_others(&nonce).await?;

        NONCES_ISSUED
            .with_label_values(&[self.storage.backend_name()])
            .inc();
        debug!(
            "Issued nonce {} for action={}, user={} (superseded {})",
            nonce.id, action, user_id, superseded
        );

        Ok(nonce)
    }

    /// 校验 token 是否可用于指定的 (action, user_id)
    ///
    /// 不修改任何状态
    pub async fn check(&self, token: &str, action: &str, user_id: Uuid) -> NonceResult<()> {
        let result = self.verify(token, action, user_id).await;
        record_outcome(&NONCE_CHECKS, &result);
        result
    }

    /// 消费 token
    ///
    /// 不校验 action / user / 有效性 / 过期时间。并发消费同一 token 时
    /// 只有一个调用方成功，其余得到 [`NonceError::TokenUsed`]。
    pub async fn consume(&self, token: &str) -> NonceResult<Nonce> {
        let result = self.mark_used(token).await;
        record_outcome(&NONCES_CONSUMED, &result);
        result
    }

    /// 校验通过后消费 token，返回消费后的记录
    pub async fn check_then_consume(
        &self,
        token: &str,
        action: &str,
        user_id: Uuid,
    ) -> NonceResult<Nonce> {
        self.check(token, action, user_id).await?;
        self.consume(token).await
    }

    /// 获取 (action, user_id) 当前的 nonce
    ///
    /// 多条记录时取 `created_at` 最大者（同秒时优先有效记录）；
    /// 该记录已失效则视为不存在，不回退到更早的有效记录。
    pub async fn get(&self, action: &str, user_id: Uuid) -> NonceResult<Nonce> {
        let mut records = self.storage.list_by_action_and_user(action, user_id).await?;

        if records.len() <= 1 {
            return records.pop().ok_or(NonceError::TokenNotFound);
        }

        let newest = records
            .into_iter()
            .max_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then(a.is_valid.cmp(&b.is_valid))
            })
            .ok_or(NonceError::TokenNotFound)?;

        if newest.is_valid {
            Ok(newest)
        } else {
            Err(NonceError::TokenNotFound)
        }
    }

    /// 停止清理任务
    ///
    /// 可重复调用；之后不会再启动新的清理任务，服务其余操作仍可使用
    pub fn shutdown(&self) {
        if !self.sweeper.is_stopped() {
            info!(
                "Shutting down nonce service sweeper ({})",
                self.storage.backend_name()
            );
        }
        self.sweeper.stop();
    }

    /// 等待清理任务退出（需先调用 `shutdown`）
    pub async fn wait_for_sweeper(&self) {
        self.sweeper.join().await;
    }

    /// 立即执行一次过期清理，返回删除的记录数
    pub async fn purge_expired(&self) -> NonceResult<u64> {
        sweeper::sweep_once(&self.storage).await
    }

    /// 获取服务统计信息
    pub async fn stats(&self) -> NonceResult<ServiceStats> {
        Ok(ServiceStats {
            backend: self.storage.backend_name(),
            nonce_count: self.storage.count().await?,
        })
    }

    /// 获取存储引用
    pub fn storage(&self) -> &NonceStorage {
        &self.storage
    }

    async fn verify(&self, token: &str, action: &str, user_id: Uuid) -> NonceResult<()> {
        token::check_token_shape(token)?;

        let nonce = self
            .storage
            .get_by_token(token)
            .await?
            .ok_or(NonceError::TokenNotFound)?;

        if !nonce.is_valid || !nonce.belongs_to(action, user_id) {
            return Err(NonceError::InvalidToken);
        }
        if nonce.is_used {
            return Err(NonceError::TokenUsed);
        }
        if nonce.is_expired_at(Utc::now()) {
            return Err(NonceError::TokenExpired);
        }

        Ok(())
    }

    async fn mark_used(&self, token: &str) -> NonceResult<Nonce> {
        token::check_token_shape(token)?;

        let nonce = self
            .storage
            .get_by_token(token)
            .await?
            .ok_or(NonceError::TokenNotFound)?;
        if nonce.is_used {
            return Err(NonceError::TokenUsed);
        }

        if let Some(consumed) = self.storage.consume_if_unused(token).await? {
            debug!("Consumed nonce {}", consumed.id);
            return Ok(consumed);
        }

        // 查询与条件更新之间记录被其他调用方消费，或已被清理
        match self.storage.get_by_token(token).await? {
            Some(_) => {
                warn!("Nonce {} was consumed concurrently", nonce.id);
                Err(NonceError::TokenUsed)
            }
            None => Err(NonceError::TokenNotFound),
        }
    }

    async fn invalidate_others(&self, current: &Nonce) -> NonceResult<usize> {
        let records = self
            .storage
            .list_by_action_and_user(&current.action, current.user_id)
            .await?;

        let mut superseded = 0;
        for mut record in records {
            if record.id == current.id || !record.is_valid {
                continue;
            }
            record.is_valid = false;
            self.storage.save(record).await?;
            superseded += 1;
        }

        Ok(superseded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{SqliteBackend, SqliteConfig};
    use crate::types::TOKEN_LEN;
    use std::sync::Arc;
    use tempfile::{TempDir, tempdir};

    const MINUTE: Duration = Duration::from_secs(60);

    fn memory_service() -> NonceService {
        NonceService::new(NonceStorage::memory(), &SweeperConfig::default())
    }

    async fn sqlite_service() -> (NonceService, TempDir) {
        let temp_dir = tempdir().unwrap();
        let config = SqliteConfig {
            path: temp_dir.path().join("nonce.db").display().to_string(),
            ..Default::default()
        };
        let backend = SqliteBackend::connect(&config).await.unwrap();
        let service = NonceService::new(
            NonceStorage::Sqlite(Box::new(backend)),
            &SweeperConfig::default(),
        );
        (service, temp_dir)
    }

    #[tokio::test]
    async fn test_issue_returns_fresh_nonce() {
        let service = memory_service();
        let user = Uuid::new_v4();

        let nonce = service.issue("confirm-email", user, MINUTE).await.unwrap();
        assert_eq!(nonce.token.len(), TOKEN_LEN);
        assert!(!nonce.id.is_nil());
        assert!(!nonce.is_used);
        assert!(nonce.is_valid);
        assert_eq!(nonce.expires_at.timestamp(), nonce.created_at + 60);
    }

    #[tokio::test]
    async fn test_check_shape_errors_skip_storage() {
        let service = memory_service();
        let user = Uuid::new_v4();

        assert!(matches!(
            service.check("", "a", user).await,
            Err(NonceError::NoToken)
        ));
        assert!(matches!(
            service.check("   ", "a", user).await,
            Err(NonceError::NoToken)
        ));
        assert!(matches!(
            service.check("x", "a", user).await,
            Err(NonceError::InvalidToken)
        ));
        assert!(matches!(
            service.consume("x").await,
            Err(NonceError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_shape_errors_on_unprovisioned_sqlite() {
        // 没有 nonce 表，任何存储访问都会返回 Database 错误
        let temp_dir = tempdir().unwrap();
        let config = SqliteConfig {
            path: temp_dir.path().join("bare.db").display().to_string(),
            provision_schema: false,
            ..Default::default()
        };
        let backend = SqliteBackend::connect(&config).await.unwrap();
        let service = NonceService::new(
            NonceStorage::Sqlite(Box::new(backend)),
            &SweeperConfig::default(),
        );
        let user = Uuid::new_v4();

        assert!(matches!(
            service.check("", "a", user).await,
            Err(NonceError::NoToken)
        ));
        assert!(matches!(
            service.check("x", "a", user).await,
            Err(NonceError::InvalidToken)
        ));
        assert!(matches!(
            service.consume("x").await,
            Err(NonceError::InvalidToken)
        ));
        assert!(matches!(
            service.check_then_consume(" ", "a", user).await,
            Err(NonceError::NoToken)
        ));

        let well_formed = "A".repeat(TOKEN_LEN);
        assert!(matches!(
            service.check(&well_formed, "a", user).await,
            Err(NonceError::Database(_))
        ));

        service.shutdown();
    }

    #[tokio::test]
    async fn test_check_unknown_token() {
        let service = memory_service();
        let result = service.check(&"A".repeat(TOKEN_LEN), "a", Uuid::new_v4()).await;
        assert!(matches!(result, Err(NonceError::TokenNotFound)));
    }

    #[tokio::test]
    async fn test_check_mismatch_is_invalid() {
        let service = memory_service();
        let user = Uuid::new_v4();
        let nonce = service.issue("reset-password", user, MINUTE).await.unwrap();

        assert!(matches!(
            service.check(&nonce.token, "confirm-email", user).await,
            Err(NonceError::InvalidToken)
        ));
        assert!(matches!(
            service.check(&nonce.token, "reset-password", Uuid::new_v4()).await,
            Err(NonceError::InvalidToken)
        ));
        assert!(service.check(&nonce.token, "reset-password", user).await.is_ok());
    }

    #[tokio::test]
    async fn test_superseded_nonce_is_invalid() {
        let service = memory_service();
        let user = Uuid::new_v4();

        let first = service.issue("a", user, MINUTE).await.unwrap();
        let second = service.issue("a", user, MINUTE).await.unwrap();

        assert!(matches!(
            service.check(&first.token, "a", user).await,
            Err(NonceError::InvalidToken)
        ));
        assert!(service.check(&second.token, "a", user).await.is_ok());
        assert_eq!(service.get("a", user).await.unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_zero_expiry_is_expired() {
        let service = memory_service();
        let user = Uuid::new_v4();
        let nonce = service.issue("a", user, Duration::ZERO).await.unwrap();

        assert!(matches!(
            service.check(&nonce.token, "a", user).await,
            Err(NonceError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn test_invalid_takes_precedence_over_used() {
        let service = memory_service();
        let user = Uuid::new_v4();
        let first = service.issue("a", user, MINUTE).await.unwrap();
        service.consume(&first.token).await.unwrap();
        service.issue("a", user, MINUTE).await.unwrap();

        // 已使用的旧记录同时被取代：先报告无效
        assert!(matches!(
            service.check(&first.token, "a", user).await,
            Err(NonceError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_used_takes_precedence_over_expired() {
        let service = memory_service();
        let user = Uuid::new_v4();
        let nonce = service.issue("a", user, Duration::ZERO).await.unwrap();
        service.consume(&nonce.token).await.unwrap();

        assert!(matches!(
            service.check(&nonce.token, "a", user).await,
            Err(NonceError::TokenUsed)
        ));
    }

    #[tokio::test]
    async fn test_consume_twice() {
        let service = memory_service();
        let nonce = service.issue("a", Uuid::new_v4(), MINUTE).await.unwrap();

        let consumed = service.consume(&nonce.token).await.unwrap();
        assert!(consumed.is_used);
        assert_eq!(consumed.id, nonce.id);

        assert!(matches!(
            service.consume(&nonce.token).await,
            Err(NonceError::TokenUsed)
        ));
    }

    #[tokio::test]
    async fn test_consume_ignores_binding_and_expiry() {
        let service = memory_service();
        let user = Uuid::new_v4();
        let old = service.issue("a", user, Duration::ZERO).await.unwrap();
        service.issue("a", user, MINUTE).await.unwrap();

        // 已过期且已被取代，consume 仍然成功
        let consumed = service.consume(&old.token).await.unwrap();
        assert!(consumed.is_used);
        assert!(!consumed.is_valid);
    }

    #[tokio::test]
    async fn test_check_then_consume() {
        let service = memory_service();
        let user = Uuid::new_v4();
        let nonce = service.issue("a", user, MINUTE).await.unwrap();

        let consumed = service.check_then_consume(&nonce.token, "a", user).await.unwrap();
        assert!(consumed.is_used);

        assert!(matches!(
            service.check_then_consume(&nonce.token, "a", user).await,
            Err(NonceError::TokenUsed)
        ));
    }

    #[tokio::test]
    async fn test_check_then_consume_rejects_without_consuming() {
        let service = memory_service();
        let user = Uuid::new_v4();
        let nonce = service.issue("a", user, MINUTE).await.unwrap();

        assert!(matches!(
            service.check_then_consume(&nonce.token, "b", user).await,
            Err(NonceError::InvalidToken)
        ));
        let stored = service.storage().get_by_token(&nonce.token).await.unwrap().unwrap();
        assert!(!stored.is_used);
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let service = memory_service();
        assert!(matches!(
            service.get("a", Uuid::new_v4()).await,
            Err(NonceError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn test_get_is_idempotent() {
        let service = memory_service();
        let user = Uuid::new_v4();
        service.issue("a", user, MINUTE).await.unwrap();
        service.issue("a", user, MINUTE).await.unwrap();

        let first = service.get("a", user).await.unwrap();
        let second = service.get("a", user).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_get_does_not_fall_back_to_older_valid() {
        let service = memory_service();
        let user = Uuid::new_v4();

        // 直接写入：较早的有效记录 + 较新的失效记录
        let mut older = token::generate("a", user, MINUTE).unwrap();
        older.created_at -= 10;
        service.storage().save(older).await.unwrap();

        let mut newer = token::generate("a", user, MINUTE).unwrap();
        newer.is_valid = false;
        service.storage().save(newer).await.unwrap();

        assert!(matches!(
            service.get("a", user).await,
            Err(NonceError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn test_get_single_record_returned_as_is() {
        let service = memory_service();
        let user = Uuid::new_v4();
        let nonce = service.issue("a", user, MINUTE).await.unwrap();
        service.consume(&nonce.token).await.unwrap();

        let current = service.get("a", user).await.unwrap();
        assert_eq!(current.id, nonce.id);
        assert!(current.is_used);
    }

    #[tokio::test]
    async fn test_reset_password_scenario() {
        let service = memory_service();
        let user = Uuid::new_v4();

        let nonce = service.issue("reset-password", user, MINUTE).await.unwrap();
        assert_eq!(nonce.token.len(), 88);
        assert!(!nonce.is_used);
        assert!(nonce.is_valid);

        service.check(&nonce.token, "reset-password", user).await.unwrap();
        let consumed = service.consume(&nonce.token).await.unwrap();
        assert!(consumed.is_used);

        assert!(matches!(
            service.check(&nonce.token, "reset-password", user).await,
            Err(NonceError::TokenUsed)
        ));
    }

    #[tokio::test]
    async fn test_sqlite_supersede_and_consume() {
        let (service, _dir) = sqlite_service().await;
        let user = Uuid::new_v4();

        let first = service.issue("a", user, MINUTE).await.unwrap();
        let second = service.issue("a", user, MINUTE).await.unwrap();
        assert!(matches!(
            service.check(&first.token, "a", user).await,
            Err(NonceError::InvalidToken)
        ));
        assert_eq!(service.get("a", user).await.unwrap().id, second.id);

        let consumed = service.check_then_consume(&second.token, "a", user).await.unwrap();
        assert!(consumed.is_used);
        assert!(matches!(
            service.consume(&second.token).await,
            Err(NonceError::TokenUsed)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consume_single_winner() {
        let service = Arc::new(memory_service());
        let nonce = service.issue("a", Uuid::new_v4(), MINUTE).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let service = service.clone();
            let token = nonce.token.clone();
            handles.push(tokio::spawn(async move { service.consume(&token).await }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(NonceError::TokenUsed) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_stats_and_purge() {
        let service = memory_service();
        let user = Uuid::new_v4();
        service.issue("a", user, Duration::ZERO).await.unwrap();
        service.issue("b", user, MINUTE).await.unwrap();

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.backend, "Memory");
        assert_eq!(stats.nonce_count, 2);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(service.purge_expired().await.unwrap(), 1);
        assert_eq!(service.stats().await.unwrap().nonce_count, 1);
    }

    #[tokio::test]
    async fn test_shutdown_twice() {
        let service = memory_service();
        service.shutdown();
        service.shutdown();

        tokio::time::timeout(Duration::from_secs(1), service.wait_for_sweeper())
            .await
            .expect("sweeper should stop after shutdown");

        // 关闭清理任务后其余操作不受影响
        let nonce = service.issue("a", Uuid::new_v4(), MINUTE).await.unwrap();
        assert!(service.consume(&nonce.token).await.is_ok());
    }
}
