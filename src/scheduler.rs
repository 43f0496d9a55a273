//! Drives the pipes: first cycle after a delay, then on an interval or on demand.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::pipe::{CycleOutcome, Pipe};

/// Requests sent to a running scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
  RefreshNow,
  Shutdown,
}

pub struct Scheduler {
  pipes: Vec<Arc<Pipe>>,
  initial_delay: Duration,
  interval: Duration,
}

impl Scheduler {
  pub fn new(pipes: Vec<Arc<Pipe>>, config: &SchedulerConfig) -> Self {
    Self::with_timing(pipes, config.initial_delay(), config.interval())
  }

  pub fn with_timing(pipes: Vec<Arc<Pipe>>, initial_delay: Duration, interval: Duration) -> Self {
    Self {
      pipes,
      initial_delay,
      interval,
    }
  }

  /// Run every pipe once, concurrently. Failures are logged per pipe.
  pub async fn run_cycle(&self) {
    let outcomes = join_all(self.pipes.iter().map(|pipe| pipe.run_cycle())).await;

    for (pipe, outcome) in self.pipes.iter().zip(outcomes) {
      match outcome {
        Ok(CycleOutcome::Completed(_)) => {}
        Ok(CycleOutcome::Skipped) => debug!(pipe = %pipe.name(), "cycle skipped"),
        Err(e) if e.is_authentication_missing() => error!(pipe = %pipe.name(), "{}", e),
        Err(e) => warn!(pipe = %pipe.name(), error = %e, "cycle failed, retrying on next tick"),
      }
    }
  }

  /// Start the loop; it stops on `Shutdown` or when every trigger sender is dropped.
  pub fn spawn(self) -> (mpsc::UnboundedSender<Trigger>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(self.run(rx));
    (tx, handle)
  }

  async fn run(self, mut triggers: mpsc::UnboundedReceiver<Trigger>) {
    info!(
      pipes = self.pipes.len(),
      initial_delay = ?self.initial_delay,
      interval = ?self.interval,
      "scheduler started"
    );

    let start = Instant::now() + self.initial_delay;
    let mut ticks = interval_at(start, self.interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        _ = ticks.tick() => {}
        trigger = triggers.recv() => match trigger {
          Some(Trigger::RefreshNow) => debug!("refresh requested"),
          Some(Trigger::Shutdown) | None => break,
        },
      }

      let cycle = self.run_cycle();
      tokio::pin!(cycle);
      loop {
        tokio::select! {
          _ = &mut cycle => break,
          trigger = triggers.recv() => match trigger {
            Some(Trigger::RefreshNow) => debug!("refresh ignored, cycle in progress"),
            Some(Trigger::Shutdown) | None => {
              info!("scheduler stopped during a cycle");
              return;
            }
          },
        }
      }
    }

    info!("scheduler stopped");
  }
}
