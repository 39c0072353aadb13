//! Nonce 存储后端抽象接口
//!
//! 定义了所有存储后端必须实现的统一异步接口

use crate::error::NonceResult;
use crate::types::Nonce;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Nonce 存储后端抽象接口
///
/// 所有存储后端（SQLite, PostgreSQL, 内存）都需要实现此 trait，
/// 并对外表现出完全一致的行为。
///
/// "未找到" 通过 `Ok(None)` / 空列表表达，与存储错误区分。
#[async_trait]
pub trait NonceStoreBackend: Send + Sync {
    /// 按 token 写入或更新 nonce
    ///
    /// - `id` 为 nil：视为插入，分配新 ID 并返回
    /// - 否则：仅更新可变字段 `is_used` / `is_valid`，其余字段插入后不可变
    async fn save(&self, nonce: Nonce) -> NonceResult<Nonce>;

    /// 根据 token 查询
    ///
    /// # Returns
    /// * `Ok(Some(nonce))` - 找到记录
    /// * `Ok(None)` - 记录不存在
    /// * `Err(...)` - 存储错误
    async fn get_by_token(&self, token: &str) -> NonceResult<Option<Nonce>>;

    /// 列出某个 (action, user_id) 下的所有记录
    async fn list_by_action_and_user(
        &self,
        action: &str,
        user_id: uuid::Uuid,
    ) -> NonceResult<Vec<Nonce>>;

    /// 原子地将未使用的 nonce 标记为已使用
    ///
    /// # Returns
    /// * `Ok(Some(nonce))` - 本次调用完成了标记，返回更新后的记录
    /// * `Ok(None)` - 记录不存在，或已被其他调用方抢先标记
    async fn consume_if_unused(&self, token: &str) -> NonceResult<Option<Nonce>>;

    /// 删除所有 `expires_at` 严格早于 `now` 的记录
    ///
    /// # Returns
    /// 被删除的记录数量
    async fn delete_expired(&self, now: DateTime<Utc>) -> NonceResult<u64>;

    /// 获取存储中的记录总数（包括已过期但尚未清理的）
    async fn count(&self) -> NonceResult<u64>;
}
