//! Nonce Service - 一次性、限时安全令牌服务
//!
//! 为敏感的状态变更（邮箱确认、重置密码等）签发绑定到 (action, user) 的 nonce：
//! 1. 签发：生成 88 字符 token，并使同一 (action, user) 的旧 nonce 失效
//! 2. 校验与消费：防止重放以及跨 action / 跨用户复用
//! 3. 多存储后端支持：SQLite, PostgreSQL, 内存
//! 4. 后台任务定期清理过期记录

pub mod config;
pub mod error;
pub mod metrics;
pub mod service;
pub mod storage;
pub mod sweeper;
pub mod token;
pub mod types;

// Re-export commonly used items
pub use config::{DEFAULT_SWEEP_INTERVAL_SECS, NonceServiceConfig, SweeperConfig};
pub use error::{NonceError, NonceResult};
pub use metrics::{export_metrics, register_metrics};
pub use service::NonceService;
pub use storage::{NonceStorage, NonceStoreBackend, StorageBackend, StorageConfig};
pub use sweeper::ExpirySweeper;
pub use types::{Nonce, ServiceStats, TOKEN_LEN};
