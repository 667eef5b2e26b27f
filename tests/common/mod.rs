//! 测试通用工具模块
//!
//! 提供测试中常用的工具函数和辅助结构。

use flowguard::{
    clock::ManualClock,
    cluster::ClusterCounter,
    config::FlowConfig,
    error::ClusterError,
    governor::Governor,
    node::MemoryNodeSource,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::Once;

/// 测试起始时间（毫秒），避开 0 附近的边界
pub const START_MILLIS: u64 = 1_000_000;

static TRACING: Once = Once::new();

/// 初始化测试日志，通过 RUST_LOG 控制输出
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// 测试环境：Governor 与其使用的节点源、手动时钟
pub struct TestEnv {
    pub governor: Governor,
    pub nodes: Arc<MemoryNodeSource>,
    pub clock: Arc<ManualClock>,
}

/// 创建使用默认配置的测试环境
pub fn create_test_env() -> TestEnv {
    create_test_env_with(FlowConfig::default(), None)
}

/// 创建测试环境，可指定配置与集群计数服务
pub fn create_test_env_with(
    config: FlowConfig,
    cluster_counter: Option<Arc<dyn ClusterCounter>>,
) -> TestEnv {
    init_tracing();

    let nodes = Arc::new(MemoryNodeSource::new());
    let clock = Arc::new(ManualClock::new(START_MILLIS));

    let mut builder = Governor::builder(nodes.clone())
        .config(config)
        .clock(clock.clone());
    if let Some(counter) = cluster_counter {
        builder = builder.cluster_counter(counter);
    }

    TestEnv {
        governor: builder.build().expect("valid test config"),
        nodes,
        clock,
    }
}

/// 可在测试中切换返回值的集群计数服务
pub struct MockClusterCounter {
    metric: Mutex<Result<f64, ClusterError>>,
    previous: Mutex<Option<f64>>,
    instances: Mutex<u32>,
}

impl MockClusterCounter {
    pub fn new(metric: f64, instances: u32) -> Self {
        Self {
            metric: Mutex::new(Ok(metric)),
            previous: Mutex::new(None),
            instances: Mutex::new(instances),
        }
    }

    pub fn set_metric(&self, metric: f64) {
        *self.metric.lock() = Ok(metric);
    }

    /// 设置上一窗口的聚合 QPS；未设置时沿用当前指标
    pub fn set_previous_metric(&self, previous: f64) {
        *self.previous.lock() = Some(previous);
    }

    pub fn set_instances(&self, instances: u32) {
        *self.instances.lock() = instances;
    }

    pub fn set_unavailable(&self) {
        *self.metric.lock() = Err(ClusterError::Unavailable("connection refused".to_string()));
    }
}

impl ClusterCounter for MockClusterCounter {
    fn cluster_metric(&self, _flow_id: u64) -> Result<f64, ClusterError> {
        self.metric.lock().clone()
    }

    fn previous_cluster_metric(&self, flow_id: u64) -> Result<f64, ClusterError> {
        match *self.previous.lock() {
            Some(previous) => Ok(previous),
            None => self.cluster_metric(flow_id),
        }
    }

    fn connected_count(&self, _flow_id: u64) -> Result<u32, ClusterError> {
        Ok(*self.instances.lock())
    }
}
