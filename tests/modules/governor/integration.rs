//! Governor 集成测试
//!
//! 测试规则安装、准入决策、异步等待与统计

use crate::common::{create_test_env, create_test_env_with};
use flowguard::config::FlowConfig;
use flowguard::error::{Decision, FlowGuardError};
use flowguard::resolver::InvocationContext;
use flowguard::rule::{ControlBehavior, FlowRule, Grade};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::time::Duration;

/// 没有规则的资源总是放行
#[test]
fn test_unruled_resource_is_allowed() {
    let env = create_test_env();
    env.governor.install(vec![FlowRule::new("other").with_count(0.0)]);

    for _ in 0..100 {
        assert_eq!(
            env.governor.evaluate("free", "", "", 1).unwrap(),
            Decision::Allow
        );
    }
}

/// QPS 阈值按 `<=` 判定，恰好达到阈值的请求放行
#[test]
fn test_qps_threshold_boundary() {
    let env = create_test_env();
    env.governor.install(vec![FlowRule::new("api").with_count(5.0)]);
    let node = env.nodes.resource("api");

    for _ in 0..5 {
        assert_eq!(env.governor.evaluate("api", "", "", 1).unwrap(), Decision::Allow);
        node.add_pass(1);
    }
    assert_eq!(env.governor.evaluate("api", "", "", 1).unwrap(), Decision::Reject);

    // 新窗口开始后恢复
    node.roll_window();
    assert_eq!(env.governor.evaluate("api", "", "", 1).unwrap(), Decision::Allow);
}

/// 批量许可超过剩余额度时拒绝
#[test]
fn test_batch_acquire() {
    let env = create_test_env();
    env.governor.install(vec![FlowRule::new("api").with_count(10.0)]);
    env.nodes.resource("api").set_pass_qps(7.0);

    assert_eq!(env.governor.evaluate("api", "", "", 3).unwrap(), Decision::Allow);
    assert_eq!(env.governor.evaluate("api", "", "", 4).unwrap(), Decision::Reject);
}

/// 并发线程数阈值
#[test]
fn test_thread_count_grade() {
    let env = create_test_env();
    env.governor.install(vec![FlowRule::new("db")
        .with_grade(Grade::ThreadCount)
        .with_count(2.0)]);
    let node = env.nodes.resource("db");

    node.increase_thread_num();
    assert_eq!(env.governor.evaluate("db", "", "", 1).unwrap(), Decision::Allow);
    node.increase_thread_num();
    assert_eq!(env.governor.evaluate("db", "", "", 1).unwrap(), Decision::Reject);
    node.decrease_thread_num();
    assert_eq!(env.governor.evaluate("db", "", "", 1).unwrap(), Decision::Allow);
}

/// 并发线程数阈值忽略整形配置
#[test]
fn test_thread_count_grade_ignores_shaping() {
    let env = create_test_env();
    env.governor.install(vec![FlowRule::new("db")
        .with_grade(Grade::ThreadCount)
        .with_count(1.0)
        .with_control_behavior(ControlBehavior::RateLimiter)]);
    env.nodes.resource("db").set_thread_num(1);

    assert_eq!(env.governor.evaluate("db", "", "", 1).unwrap(), Decision::Reject);
}

/// 优先请求可以借用下一个窗口，等待不超过占用超时
#[test]
fn test_prioritized_request_borrows_next_window() {
    let env = create_test_env();
    env.governor.install(vec![FlowRule::new("api").with_count(2.0)]);
    env.nodes.resource("api").set_pass_qps(2.0);
    let ctx = InvocationContext::new("api", "", "");

    // 窗口起点：到下一个窗口需要等待 1000ms，超过默认 500ms 的占用超时
    assert_eq!(env.governor.check(&ctx, 1, true).unwrap(), Decision::Reject);

    env.clock.advance(Duration::from_millis(600));
    assert_eq!(
        env.governor.check(&ctx, 1, true).unwrap(),
        Decision::AllowAfterWait(Duration::from_millis(400))
    );
    assert_eq!(
        env.governor.check(&ctx, 1, true).unwrap(),
        Decision::AllowAfterWait(Duration::from_millis(400))
    );
    // 下一个窗口的额度已借完
    assert_eq!(env.governor.check(&ctx, 1, true).unwrap(), Decision::Reject);
    // 非优先请求不借用
    assert_eq!(env.governor.check(&ctx, 1, false).unwrap(), Decision::Reject);

    // 借用的额度计入下一个窗口
    let node = env.nodes.resource("api");
    node.roll_window();
    assert_eq!(env.governor.evaluate("api", "", "", 1).unwrap(), Decision::Reject);
}

/// 占用超时可配置
#[test]
fn test_occupy_timeout_from_config() {
    let config = FlowConfig {
        occupy_timeout_ms: 1500,
        ..Default::default()
    };
    let env = create_test_env_with(config, None);
    env.governor.install(vec![FlowRule::new("api").with_count(1.0)]);
    env.nodes.resource("api").set_pass_qps(1.0);

    let ctx = InvocationContext::new("api", "", "");
    assert_eq!(
        env.governor.check(&ctx, 1, true).unwrap(),
        Decision::AllowAfterWait(Duration::from_millis(1000))
    );
}

/// 非法许可数返回错误且不消耗任何额度
#[test]
fn test_invalid_acquire_count_consumes_nothing() {
    let env = create_test_env();
    env.governor.install(vec![FlowRule::new("api")
        .with_count(10.0)
        .with_control_behavior(ControlBehavior::RateLimiter)]);

    assert!(matches!(
        env.governor.evaluate("api", "", "", 0),
        Err(FlowGuardError::InvalidAcquireCount(0))
    ));
    assert_eq!(env.governor.evaluate("api", "", "", 1).unwrap(), Decision::Allow);
}

/// 多条规则中一条拒绝即拒绝
#[test]
fn test_any_rule_rejects() {
    let env = create_test_env();
    env.governor.install(vec![
        FlowRule::new("api").with_count(100.0),
        FlowRule::new("api").with_count(3.0),
    ]);
    env.nodes.resource("api").set_pass_qps(3.0);

    assert_eq!(env.governor.evaluate("api", "", "", 1).unwrap(), Decision::Reject);
    assert_eq!(env.governor.stats().rejected, 1);
}

/// 异步 acquire 在排队时等待预留的时间
#[tokio::test(start_paused = true)]
async fn test_acquire_sleeps_for_queued_decision() {
    let env = create_test_env();
    env.governor.install(vec![FlowRule::new("api")
        .with_count(5.0)
        .with_control_behavior(ControlBehavior::RateLimiter)
        .with_max_queueing_time_ms(1000)]);

    let start = tokio::time::Instant::now();
    for i in 0..4u64 {
        let decision = env.governor.acquire("api", "", "", 1).await.unwrap();
        if i == 0 {
            assert_eq!(decision, Decision::Allow);
        } else {
            assert_eq!(decision, Decision::AllowAfterWait(Duration::from_millis(200 * i)));
        }
    }
    // 手动时钟不随 tokio 时间前进，所以每次等待都从同一时刻起算
    assert!(start.elapsed() >= Duration::from_millis(600));

    let stats = env.governor.stats();
    assert_eq!(stats.total_requests, 4);
    assert_eq!(stats.allowed, 1);
    assert_eq!(stats.queued, 3);
}

/// 被拒绝时 acquire 不等待
#[tokio::test(start_paused = true)]
async fn test_acquire_rejected_returns_immediately() {
    let env = create_test_env();
    env.governor.install(vec![FlowRule::new("api").with_count(0.0)]);

    let start = tokio::time::Instant::now();
    let decision = env.governor.acquire("api", "", "", 1).await.unwrap();
    assert_eq!(decision, Decision::Reject);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

/// 在同步代码中驱动 acquire
#[test]
fn test_acquire_from_blocking_context() {
    let env = create_test_env();
    env.governor.install(vec![FlowRule::new("api").with_count(1.0)]);

    let decision = tokio_test::assert_ok!(tokio_test::block_on(
        env.governor.acquire("api", "", "", 1)
    ));
    assert_eq!(decision, Decision::Allow);

    env.nodes.resource("api").add_pass(1);
    let decision = tokio_test::assert_ok!(tokio_test::block_on(
        env.governor.acquire("api", "", "", 1)
    ));
    assert_eq!(decision, Decision::Reject);
}

/// 并发调用匀速排队规则：只有一个立即放行，其余预留的位置互不重复
#[test]
fn test_concurrent_evaluate_on_rate_limiter() {
    let env = create_test_env();
    env.governor.install(vec![FlowRule::new("api")
        .with_count(10.0)
        .with_control_behavior(ControlBehavior::RateLimiter)
        .with_max_queueing_time_ms(10_000)]);

    let governor = Arc::new(env.governor);
    let threads = 32;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let governor = Arc::clone(&governor);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                governor.evaluate("api", "", "", 1).unwrap()
            })
        })
        .collect();

    let decisions: Vec<Decision> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(decisions.iter().filter(|d| **d == Decision::Allow).count(), 1);

    let waits: HashSet<Duration> = decisions.iter().filter_map(Decision::wait_time).collect();
    assert_eq!(waits.len(), threads);
    assert_eq!(waits.iter().max(), Some(&Duration::from_millis(3100)));
}
