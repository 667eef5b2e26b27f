//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! FlowGuard - Rule-driven Flow Control
//!
//! Admits or rejects invocations of named resources according to flow rules,
//! with immediate rejection, warm-up and virtual-queue traffic shaping.
//!
//! # API Layers
//!
//! ## Prelude (Quick Start)
//!
//! Use `use flowguard::prelude::*;` to import all commonly used types.
//!
//! ## Core API
//!
//! - [`Governor`] - Main entry point: install rules and evaluate invocations
//! - [`FlowRule`] - A single flow rule
//! - [`FlowConfig`] - Global tuning knobs
//! - [`Decision`] - Decision result of an evaluation
//! - [`FlowGuardError`] - Error types
//!
//! ## Traffic Shaping
//!
//! Controllers bound to each rule: default (reject), warm-up,
//! rate limiter (virtual queue) and warm-up rate limiter.
//!
//! ## Statistics
//!
//! The [`node::StatNode`] / [`node::NodeSource`] traits describe the metrics
//! the decision logic reads. [`node::MemoryNodeSource`] is an in-memory
//! implementation for embedding and tests.
//!
//! # Examples
//!
//! ```rust
//! use flowguard::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let nodes = Arc::new(MemoryNodeSource::new());
//!     let governor = Governor::new(nodes).unwrap();
//!
//!     governor.install(vec![FlowRule::new("checkout")
//!         .with_count(10.0)
//!         .with_control_behavior(ControlBehavior::RateLimiter)]);
//!
//!     // 超出速率的请求会排队等待，而不是立即拒绝
//!     let decision = governor.acquire("checkout", "", "", 1).await.unwrap();
//!     assert!(decision.is_admitted());
//! }
//! ```

pub mod prelude;

pub mod clock;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod error;
pub mod governor;
pub mod manager;
pub mod node;
pub mod resolver;
pub mod rule;
pub mod shaping;

pub use config::FlowConfig;
pub use error::{ClusterError, Decision, FlowGuardError};
pub use governor::{Governor, GovernorBuilder, GovernorStats};
pub use manager::{FlowRuleManager, InstallReport};
pub use rule::{ClusterFlowConfig, ClusterThresholdType, ControlBehavior, FlowRule, Grade, Strategy};
