//! Named alarms backed by Tokio timers.
//!
//! [`TokioScheduler`] implements [`Scheduler`]: each alarm is a spawned task
//! that pushes an [`Alarm`] onto a channel when it fires. The receiving end is
//! usually handed to [`Background::serve`](crate::service::Background::serve).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};

use crate::core::{Clock, Scheduler, SystemClock};

/// Shortest period accepted for a periodic alarm.
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Longest period accepted for a periodic alarm.
pub const MAX_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A fired alarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub name: String,
    /// Unix milliseconds at which the alarm fired.
    pub scheduled_time: i64,
}

/// How a registered alarm fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmKind {
    Periodic(Duration),
    OneShot { when_ms: i64 },
}

struct Registered {
    kind: AlarmKind,
    generation: u64,
    join: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    alarms: HashMap<String, Registered>,
    next_generation: u64,
}

/// Scheduler running each alarm as a Tokio task.
///
/// Scheduling methods spawn tasks and must be called from within a Tokio runtime.
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<Alarm>,
    registry: Arc<Mutex<Registry>>,
    clock: Arc<dyn Clock>,
}

impl TokioScheduler {
    /// Create a scheduler and the receiver its alarms are delivered on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Alarm>) {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new), resolving absolute times against `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> (Self, mpsc::UnboundedReceiver<Alarm>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                registry: Arc::new(Mutex::new(Registry::default())),
                clock,
            },
            rx,
        )
    }

    /// How `name` is currently scheduled, if at all.
    pub fn get(&self, name: &str) -> Option<AlarmKind> {
        let reg = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        reg.alarms.get(name).map(|r| r.kind)
    }

    /// Names of all pending alarms.
    pub fn names(&self) -> Vec<String> {
        let reg = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = reg.alarms.keys().cloned().collect();
        names.sort();
        names
    }

    fn register(&self, name: &str, kind: AlarmKind) {
        let mut reg = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = reg.next_generation;
        reg.next_generation += 1;

        let tx = self.tx.clone();
        let clock = self.clock.clone();
        let owned = name.to_string();
        let join = match kind {
            AlarmKind::Periodic(period) => tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let alarm = Alarm {
                        name: owned.clone(),
                        scheduled_time: clock.now_ms(),
                    };
                    if tx.send(alarm).is_err() {
                        break;
                    }
                }
            }),
            AlarmKind::OneShot { when_ms } => {
                let registry = Arc::clone(&self.registry);
                tokio::spawn(async move {
                    let wait = when_ms.saturating_sub(clock.now_ms()).max(0) as u64;
                    sleep(Duration::from_millis(wait)).await;
                    {
                        let mut reg = registry.lock().unwrap_or_else(PoisonError::into_inner);
                        if reg
                            .alarms
                            .get(&owned)
                            .is_some_and(|r| r.generation == generation)
                        {
                            reg.alarms.remove(&owned);
                        }
                    }
                    let _ = tx.send(Alarm {
                        name: owned,
                        scheduled_time: when_ms,
                    });
                })
            }
        };

        if let Some(prev) = reg.alarms.insert(
            name.to_string(),
            Registered {
                kind,
                generation,
                join,
            },
        ) {
            prev.join.abort();
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_periodic(&self, name: &str, period: Duration) {
        let period = period.clamp(MIN_PERIOD, MAX_PERIOD);
        tracing::info!(alarm = name, period_secs = period.as_secs(), "periodic alarm set");
        self.register(name, AlarmKind::Periodic(period));
    }

    fn schedule_at(&self, name: &str, when_ms: i64) {
        tracing::info!(alarm = name, when_ms, "one-shot alarm set");
        self.register(name, AlarmKind::OneShot { when_ms });
    }

    fn clear(&self, name: &str) -> bool {
        let mut reg = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        match reg.alarms.remove(name) {
            Some(prev) => {
                prev.join.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        let reg = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        for r in reg.alarms.values() {
            r.join.abort();
        }
    }
}
