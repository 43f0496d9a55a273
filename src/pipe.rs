//! A pipe ties one configured source to its reconciler and display sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::entry::{Entry, EntryRegistry};
use crate::error::PipeResult;
use crate::reconcile::{DisplaySink, ReconcileSummary, Reconciler};
use crate::source::Source;

/// Result of one `run_cycle` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
  Completed(ReconcileSummary),
  /// Another cycle of this pipe was still running
  Skipped,
}

/// Resets the busy flag when the cycle ends, including on cancellation.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
  fn acquire(flag: &'a AtomicBool) -> Option<Self> {
    flag
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| Self(flag))
  }
}

impl Drop for BusyGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

pub struct Pipe {
  connection: SourceConfig,
  source: Arc<dyn Source>,
  reconciler: Mutex<Reconciler>,
  sink: Mutex<Box<dyn DisplaySink>>,
  busy: AtomicBool,
}

impl Pipe {
  /// The source name is the reconciler's anchor.
  pub fn new(connection: SourceConfig, source: Arc<dyn Source>, sink: Box<dyn DisplaySink>) -> Self {
    Self {
      reconciler: Mutex::new(Reconciler::new(connection.name.clone())),
      connection,
      source,
      sink: Mutex::new(sink),
      busy: AtomicBool::new(false),
    }
  }

  pub fn name(&self) -> &str {
    &self.connection.name
  }

  /// Pull, enrich and normalize without touching the display.
  pub async fn fetch_entries(&self) -> PipeResult<EntryRegistry> {
    EntryRegistry::build(self.source.as_ref(), &self.connection).await
  }

  /// One pull → reconcile pass.
  ///
  /// Rejected with `Skipped` while another cycle of this pipe is in flight. If
  /// the pull fails the live set and the display are left untouched.
  pub async fn run_cycle(&self) -> PipeResult<CycleOutcome> {
    let Some(_busy) = BusyGuard::acquire(&self.busy) else {
      debug!(pipe = %self.name(), "cycle already running, skipping");
      return Ok(CycleOutcome::Skipped);
    };

    let registry = self.fetch_entries().await?;

    let commands = self
      .reconciler
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .reconcile(&registry);

    let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
    for command in &commands {
      command.apply(sink.as_mut());
    }

    let summary = ReconcileSummary::from_commands(&commands);
    if summary.is_empty() {
      debug!(pipe = %self.name(), entries = registry.len(), "nothing changed");
    } else {
      info!(
        pipe = %self.name(),
        kind = self.source.kind(),
        inserted = summary.inserted,
        updated = summary.updated,
        removed = summary.removed,
        "display reconciled"
      );
    }
    Ok(CycleOutcome::Completed(summary))
  }

  /// Live entry for a displayed key.
  pub fn displayed(&self, key: &str) -> Option<Entry> {
    self
      .reconciler
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(key)
      .map(|item| item.entry.clone())
  }

  /// Run the source's activation for an entry.
  pub async fn activate(&self, entry: &Entry) -> PipeResult<()> {
    self.source.activate(&self.connection, entry).await
  }

  /// Fire-and-forget activation of a displayed item.
  pub fn on_item_activated(self: &Arc<Self>, key: &str) {
    let Some(entry) = self.displayed(key) else {
      warn!(pipe = %self.name(), key, "activated item is no longer displayed");
      return;
    };

    let pipe = Arc::clone(self);
    tokio::spawn(async move {
      if let Err(e) = pipe.activate(&entry).await {
        warn!(pipe = %pipe.name(), entry = %entry.name, error = %e, "activation failed");
      }
    });
  }
}
