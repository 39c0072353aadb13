//! 内存存储后端实现
//!
//! 以 token 为键的 `HashMap`，由单个读写锁保护：读操作持共享锁，
//! 写操作持独占锁。记录只以克隆形式离开临界区。进程重启后数据丢失。

use crate::error::NonceResult;
use crate::storage::backend::NonceStoreBackend;
use crate::types::Nonce;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace};
use uuid::Uuid;

/// 内存存储后端
#[derive(Clone, Default)]
pub struct MemoryBackend {
    nonces: Arc<RwLock<HashMap<String, Nonce>>>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend").finish_non_exhaustive()
    }
}

impl MemoryBackend {
    /// 创建空的内存存储
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NonceStoreBackend for MemoryBackend {
    async fn save(&self, mut nonce: Nonce) -> NonceResult<Nonce> {
        let mut nonces = self.nonces.write().await;

        if nonce.is_unsaved() {
            nonce.id = Uuid::new_v4();
            nonces.insert(nonce.token.clone(), nonce.clone());
            trace!("Inserted nonce {} into memory store", nonce.id);
            return Ok(nonce);
        }

        // 已存在：只更新可变字段
        match nonces.get_mut(&nonce.token) {
            Some(stored) => {
                stored.is_used = nonce.is_used;
                stored.is_valid = nonce.is_valid;
                Ok(stored.clone())
            }
            // 记录已被清理任务删除，与 SQL UPDATE 未命中行为一致，不复活
            None => Ok(nonce),
        }
    }

    async fn get_by_token(&self, token: &str) -> NonceResult<Option<Nonce>> {
        let nonces = self.nonces.read().await;
        Ok(nonces.get(token).cloned())
    }

    async fn list_by_action_and_user(
        &self,
        action: &str,
        user_id: Uuid,
    ) -> NonceResult<Vec<Nonce>> {
        let nonces = self.nonces.read().await;
        Ok(nonces
            .values()
            .filter(|n| n.belongs_to(action, user_id))
            .cloned()
            .collect())
    }

    async fn consume_if_unused(&self, token: &str) -> NonceResult<Option<Nonce>> {
        let mut nonces = self.nonces.write().await;
        match nonces.get_mut(token) {
            Some(stored) if !stored.is_used => {
                stored.is_used = true;
                Ok(Some(stored.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> NonceResult<u64> {
        let mut nonces = self.nonces.write().await;
        let before = nonces.len();
        nonces.retain(|_, n| n.expires_at >= now);
        let deleted = (before - nonces.len()) as u64;

        if deleted > 0 {
            debug!("Removed {} expired nonces from memory store", deleted);
        }
        Ok(deleted)
    }

    async fn count(&self) -> NonceResult<u64> {
        Ok(self.nonces.read().await.len() as u64)
    }
}
