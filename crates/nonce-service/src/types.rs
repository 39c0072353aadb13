//! Nonce 数据类型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// token 固定长度（SHA-512 摘要的 URL-safe Base64 编码）
pub const TOKEN_LEN: usize = 88;

/// salt 固定长度（16 字节随机数的标准 Base64 编码）
pub const SALT_LEN: usize = 24;

/// 一次性、限时的安全令牌记录
///
/// 绑定到 (action, user_id)。`id` 为 nil 表示尚未持久化，
/// 由存储层在首次 `save` 时分配。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce {
    /// 记录 ID
    pub id: Uuid,
    /// 绑定的用户 ID
    pub user_id: Uuid,
    /// 88 字符 token，主查询键
    pub token: String,
    /// 授权的操作名称
    pub action: String,
    /// 派生 token 时使用的随机 salt，仅用于审计
    pub salt: String,
    /// 是否已被消费
    pub is_used: bool,
    /// 是否仍有效（被同一 (user, action) 的新 nonce 取代后为 false）
    pub is_valid: bool,
    /// 创建时间（Unix 秒）
    pub created_at: i64,
    /// 过期时间（截断到秒）
    pub expires_at: DateTime<Utc>,
}

impl Nonce {
    /// 是否尚未分配 ID
    pub fn is_unsaved(&self) -> bool {
        self.id.is_nil()
    }

    /// 在 `now` 时刻是否已过期（`expires_at` 不晚于 `now`）
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// 是否属于指定的 (action, user_id)
    pub fn belongs_to(&self, action: &str, user_id: Uuid) -> bool {
        self.action == action && self.user_id == user_id
    }
}

/// 服务统计信息
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    /// 存储后端名称
    pub backend: &'static str,
    /// 当前存储的 nonce 记录数（含已过期但尚未清理的）
    pub nonce_count: u64,
}
