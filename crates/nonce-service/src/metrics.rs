//! Prometheus 监控指标模块
//!
//! 提供 nonce 生命周期与清理任务的指标收集和导出功能

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::Once;

static METRICS_INIT: Once = Once::new();

lazy_static! {
    /// 全局 Prometheus Registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// nonce 签发次数
    pub static ref NONCES_ISSUED: IntCounterVec = IntCounterVec::new(
        Opts::new("issued_total", "Total number of nonces issued")
            .namespace("nonce"),
        &["backend"]
    ).unwrap();

    /// nonce 校验次数（按结果分组）
    pub static ref NONCE_CHECKS: IntCounterVec = IntCounterVec::new(
        Opts::new("checks_total", "Total number of nonce checks")
            .namespace("nonce"),
        &["result"]
    ).unwrap();

    /// nonce 消费次数（按结果分组）
    pub static ref NONCES_CONSUMED: IntCounterVec = IntCounterVec::new(
        Opts::new("consumed_total", "Total number of nonce consumption attempts")
            .namespace("nonce"),
        &["result"]
    ).unwrap();

    /// 清理任务删除的过期 nonce 数量
    pub static ref NONCES_SWEPT: IntCounterVec = IntCounterVec::new(
        Opts::new("swept_total", "Total number of expired nonces removed")
            .namespace("nonce"),
        &["backend"]
    ).unwrap();

    /// 清理任务失败次数
    pub static ref SWEEP_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("sweep_errors_total", "Total number of failed expiry sweeps")
            .namespace("nonce"),
        &["backend"]
    ).unwrap();
}

/// 注册所有指标到全局 Registry
///
/// This function is idempotent - calling it multiple times is safe.
/// Only the first call will actually register the metrics.
pub fn register_metrics() -> Result<(), prometheus::Error> {
    let mut result = Ok(());

    METRICS_INIT.call_once(|| {
        let register_result = (|| {
            REGISTRY.register(Box::new(NONCES_ISSUED.clone()))?;
            REGISTRY.register(Box::new(NONCE_CHECKS.clone()))?;
            REGISTRY.register(Box::new(NONCES_CONSUMED.clone()))?;
            REGISTRY.register(Box::new(NONCES_SWEPT.clone()))?;
            REGISTRY.register(Box::new(SWEEP_ERRORS.clone()))?;
            Ok::<(), prometheus::Error>(())
        })();

        if let Err(e) = register_result {
            result = Err(e);
        }
    });

    result
}

/// 记录一次操作结果
pub(crate) fn record_outcome<T>(
    counter: &IntCounterVec,
    result: &crate::error::NonceResult<T>,
) {
    let label = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    counter.with_label_values(&[label]).inc();
}

/// 导出 Prometheus 格式的指标
pub fn export_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}
