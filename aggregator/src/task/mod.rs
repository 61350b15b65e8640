//! A single aggregation task.
//!
//! A task is an actor created on the first response for a request. It records responses
//! (checking each against the operator-info provider and the operator's key) until its
//! deadline passes or it is asked to finalize, then computes the outcome once and delivers
//! it to every caller still waiting.

use crate::{
    aggregate::Snapshot,
    metrics::Metrics,
    registry::{Registry, Slot},
};
use std::time::SystemTime;

mod actor;
pub use actor::Actor;
mod ingress;
pub use ingress::{Mailbox, Message};

/// Configuration for a task [Actor].
pub struct Config<R> {
    pub reader: R,
    pub snapshot: Snapshot,

    /// When the task stops collecting.
    pub deadline: SystemTime,

    /// Registry the task removes itself from once finalized.
    pub registry: Registry,

    /// Lock the task retires under.
    pub slot: Slot,

    pub mailbox_size: usize,
    pub metrics: Metrics,
}
