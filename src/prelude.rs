//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Prelude module
//!
//! `use flowguard::prelude::*;` brings in the governor, rule builders,
//! the in-memory statistics nodes and the extension traits.

// Core types
pub use crate::config::FlowConfig;
pub use crate::error::{Decision, FlowGuardError};
pub use crate::governor::Governor;
pub use crate::resolver::InvocationContext;

// Rules
pub use crate::rule::{ClusterFlowConfig, ClusterThresholdType, ControlBehavior, FlowRule, Grade, Strategy};

// Statistics
pub use crate::node::{MemoryNode, MemoryNodeSource, NodeSource, StatNode};

// Extension points
pub use crate::clock::{Clock, ManualClock};
pub use crate::cluster::ClusterCounter;
pub use crate::shaping::TrafficShapingController;
