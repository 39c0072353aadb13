//! 过期 nonce 清理任务
//!
//! 每个服务实例绑定一个后台任务：等待取消信号或清理间隔到期，
//! 到期时删除已过期的记录。清理失败只记录日志和指标，下个周期重试；
//! 收到取消信号后直接退出，不做最后一次清理。

use crate::error::NonceResult;
use crate::metrics::{NONCES_SWEPT, SWEEP_ERRORS};
use crate::storage::NonceStorage;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 后台过期清理任务句柄
#[derive(Debug)]
pub struct ExpirySweeper {
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ExpirySweeper {
    /// 启动清理任务（需在 Tokio 运行时内调用）
    pub fn spawn(storage: NonceStorage, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(storage, interval, cancel.clone()));

        Self {
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// 发送停止信号
    ///
    /// 可重复调用；任务已退出时调用同样安全
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// 是否已发送停止信号
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 等待后台任务退出
    ///
    /// 未调用 `stop` 时会一直等待；重复调用立即返回
    pub async fn join(&self) {
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!("Expiry sweeper task ended abnormally: {}", e);
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(storage: NonceStorage, interval: Duration, cancel: CancellationToken) {
    info!(
        "Expiry sweeper started: backend={}, interval={:?}",
        storage.backend_name(),
        interval
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {
                // 错误已在 sweep_once 中上报，这里继续下一轮
                let _ = sweep_once(&storage).await;
            }
        }
    }

    info!("Expiry sweeper stopped: backend={}", storage.backend_name());
}

/// 执行一次过期清理
pub(crate) async fn sweep_once(storage: &NonceStorage) -> NonceResult<u64> {
    let backend = storage.backend_name();
    match storage.delete_expired(Utc::now()).await {
        Ok(deleted) => {
            if deleted > 0 {
                info!("🧹 Removed {} expired nonces ({})", deleted, backend);
                NONCES_SWEPT.with_label_values(&[backend]).inc_by(deleted);
            } else {
                debug!("No expired nonces to remove ({})", backend);
            }
            Ok(deleted)
        }
        Err(e) => {
            error!("Error removing expired nonces ({}): {}", backend, e);
            SWEEP_ERRORS.with_label_values(&[backend]).inc();
            Err(e)
        }
    }
}
