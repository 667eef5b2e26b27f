//! 集群模式集成测试

use crate::common::{create_test_env, create_test_env_with, MockClusterCounter};
use flowguard::cluster::ClusterCounter;
use flowguard::config::FlowConfig;
use flowguard::error::Decision;
use flowguard::rule::{ClusterFlowConfig, ClusterThresholdType, ControlBehavior, FlowRule};
use std::sync::Arc;
use std::time::Duration;

fn cluster_rule(threshold_type: ClusterThresholdType) -> FlowRule {
    FlowRule::new("api")
        .with_count(10.0)
        .with_cluster(ClusterFlowConfig::new(42).threshold_type(threshold_type))
}

fn env_with_counter(counter: Arc<MockClusterCounter>) -> crate::common::TestEnv {
    create_test_env_with(FlowConfig::default(), Some(counter as Arc<dyn ClusterCounter>))
}

/// 全局阈值直接使用集群聚合值
#[test]
fn test_global_threshold() {
    let counter = Arc::new(MockClusterCounter::new(9.0, 3));
    let env = env_with_counter(counter.clone());
    env.governor.install(vec![cluster_rule(ClusterThresholdType::Global)]);

    // 本地统计不参与判断
    env.nodes.resource("api").set_pass_qps(100.0);
    assert_eq!(env.governor.evaluate("api", "", "", 1).unwrap(), Decision::Allow);

    counter.set_metric(10.0);
    assert_eq!(env.governor.evaluate("api", "", "", 1).unwrap(), Decision::Reject);
}

/// 单机均摊阈值：聚合值除以实例数
#[test]
fn test_avg_local_threshold() {
    let counter = Arc::new(MockClusterCounter::new(30.0, 3));
    let env = env_with_counter(counter.clone());
    env.governor.install(vec![cluster_rule(ClusterThresholdType::AvgLocal)]);

    assert_eq!(env.governor.evaluate("api", "", "", 1).unwrap(), Decision::Reject);

    counter.set_instances(4);
    assert_eq!(env.governor.evaluate("api", "", "", 1).unwrap(), Decision::Allow);
}

/// 集群计数不可用时回退到本地限流，不会放开限制
#[test]
fn test_unavailable_counter_falls_back_to_local() {
    let counter = Arc::new(MockClusterCounter::new(0.0, 1));
    let env = env_with_counter(counter.clone());
    env.governor.install(vec![cluster_rule(ClusterThresholdType::Global)]);
    env.nodes.resource("api").set_pass_qps(10.0);

    assert_eq!(env.governor.evaluate("api", "", "", 1).unwrap(), Decision::Allow);

    counter.set_unavailable();
    assert_eq!(env.governor.evaluate("api", "", "", 1).unwrap(), Decision::Reject);

    env.nodes.resource("api").set_pass_qps(3.0);
    assert_eq!(env.governor.evaluate("api", "", "", 1).unwrap(), Decision::Allow);
}

/// 未配置集群计数服务时集群规则按本地规则执行
#[test]
fn test_no_counter_enforces_locally() {
    let env = create_test_env();
    env.governor.install(vec![cluster_rule(ClusterThresholdType::Global)]);
    env.nodes.resource("api").set_pass_qps(10.0);

    assert_eq!(env.governor.evaluate("api", "", "", 1).unwrap(), Decision::Reject);
}

/// 集群规则与本地规则同时生效，本地规则先评估
#[test]
fn test_local_rules_evaluated_before_cluster_rules() {
    let counter = Arc::new(MockClusterCounter::new(0.0, 1));
    let env = env_with_counter(counter);
    let report = env.governor.install(vec![
        cluster_rule(ClusterThresholdType::Global),
        FlowRule::new("api").with_count(2.0),
    ]);
    assert_eq!(report.installed, 2);

    let rules = env.governor.manager().rules_for("api");
    assert!(!rules[0].is_cluster_mode());
    assert!(rules[1].is_cluster_mode());

    env.nodes.resource("api").set_pass_qps(2.0);
    assert_eq!(env.governor.evaluate("api", "", "", 1).unwrap(), Decision::Reject);
}

/// 集群预热规则按集群上一窗口的 QPS 预热，而不是当前值
#[test]
fn test_warm_up_rule_uses_cluster_previous_window() {
    let counter = Arc::new(MockClusterCounter::new(2.0, 1));
    let env = env_with_counter(counter.clone());
    env.governor.install(vec![cluster_rule(ClusterThresholdType::Global)
        .with_control_behavior(ControlBehavior::WarmUp)
        .with_warm_up_period_sec(10)]);

    // 当前集群流量低，但上一窗口一直以满阈值通过
    counter.set_previous_metric(10.0);
    for _ in 0..10 {
        env.clock.advance(Duration::from_secs(1));
        env.governor.evaluate("api", "", "", 1).unwrap();
    }

    counter.set_metric(9.0);
    assert_eq!(env.governor.evaluate("api", "", "", 1).unwrap(), Decision::Allow);
}
