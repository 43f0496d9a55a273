//! Mark-and-sweep reconciliation of a fresh registry against the live set.

use std::collections::HashMap;
use tracing::debug;

use crate::entry::{Entry, EntryRegistry};

/// Receiver of display commands.
///
/// The sink owns its rows; the reconciler only ever addresses them by key.
pub trait DisplaySink: Send {
  /// Place a new item immediately after `anchor`.
  fn insert_after(&mut self, anchor: &str, key: &str, entry: &Entry);
  fn update(&mut self, key: &str, entry: &Entry);
  fn remove(&mut self, key: &str);
}

/// One display mutation produced by a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCommand {
  InsertAfter {
    anchor: String,
    key: String,
    entry: Entry,
  },
  Update {
    key: String,
    entry: Entry,
  },
  Remove {
    key: String,
  },
}

impl SinkCommand {
  pub fn apply(&self, sink: &mut dyn DisplaySink) {
    match self {
      SinkCommand::InsertAfter { anchor, key, entry } => sink.insert_after(anchor, key, entry),
      SinkCommand::Update { key, entry } => sink.update(key, entry),
      SinkCommand::Remove { key } => sink.remove(key),
    }
  }

  pub fn key(&self) -> &str {
    match self {
      SinkCommand::InsertAfter { key, .. }
      | SinkCommand::Update { key, .. }
      | SinkCommand::Remove { key } => key,
    }
  }
}

/// Counts of the commands emitted by one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
  pub inserted: usize,
  pub updated: usize,
  pub removed: usize,
}

impl ReconcileSummary {
  pub fn from_commands(commands: &[SinkCommand]) -> Self {
    commands.iter().fold(Self::default(), |mut summary, command| {
      match command {
        SinkCommand::InsertAfter { .. } => summary.inserted += 1,
        SinkCommand::Update { .. } => summary.updated += 1,
        SinkCommand::Remove { .. } => summary.removed += 1,
      }
      summary
    })
  }

  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayedItem {
  pub entry: Entry,
  pub fresh: bool,
}

/// Live set of one source, in display order.
#[derive(Debug, Clone, Default)]
struct LiveSet {
  order: Vec<String>,
  items: HashMap<String, DisplayedItem>,
}

/// Keeps a displayed list in sync with successive pulls.
#[derive(Debug, Clone)]
pub struct Reconciler {
  anchor: String,
  live: LiveSet,
}

impl Reconciler {
  pub fn new(anchor: impl Into<String>) -> Self {
    Self {
      anchor: anchor.into(),
      live: LiveSet::default(),
    }
  }

  /// Live keys in display order.
  #[cfg(test)]
  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.live.order.iter().map(String::as_str)
  }

  pub fn get(&self, key: &str) -> Option<&DisplayedItem> {
    self.live.items.get(key)
  }

  #[cfg(test)]
  pub fn is_empty(&self) -> bool {
    self.live.order.is_empty()
  }

  /// Diff `registry` against the live set and return the display commands.
  ///
  /// The pass runs on a staged copy that replaces the live set only once the
  /// sweep is done.
  pub fn reconcile(&mut self, registry: &EntryRegistry) -> Vec<SinkCommand> {
    let mut staged = self.live.clone();
    let mut commands = Vec::new();

    // Mark
    for item in staged.items.values_mut() {
      item.fresh = false;
    }

    // Rebuild. Each new key lands right after the anchor, so the display
    // shows new entries in reverse registry order.
    let mut inserted = Vec::new();
    for entry in registry.iter() {
      match staged.items.get_mut(&entry.name) {
        Some(item) => {
          item.fresh = true;
          if item.entry != *entry {
            item.entry = entry.clone();
            commands.push(SinkCommand::Update {
              key: entry.name.clone(),
              entry: entry.clone(),
            });
          }
        }
        None => {
          staged.items.insert(
            entry.name.clone(),
            DisplayedItem {
              entry: entry.clone(),
              fresh: true,
            },
          );
          commands.push(SinkCommand::InsertAfter {
            anchor: self.anchor.clone(),
            key: entry.name.clone(),
            entry: entry.clone(),
          });
          inserted.push(entry.name.clone());
        }
      }
    }

    let mut order: Vec<String> = inserted.into_iter().rev().collect();
    order.append(&mut staged.order);

    // Sweep
    let stale: Vec<String> = order
      .iter()
      .filter(|key| staged.items.get(*key).is_some_and(|item| !item.fresh))
      .cloned()
      .collect();
    for key in &stale {
      staged.items.remove(key);
      commands.push(SinkCommand::Remove { key: key.clone() });
    }
    order.retain(|key| staged.items.contains_key(key));
    staged.order = order;

    debug!(
      anchor = %self.anchor,
      commands = commands.len(),
      live = staged.order.len(),
      "reconciled"
    );
    self.live = staged;
    commands
  }
}

/// A sink that records everything it receives.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSink {
  pub commands: Vec<SinkCommand>,
  /// Keys in display order, anchors included
  pub rows: Vec<String>,
}

#[cfg(test)]
impl DisplaySink for RecordingSink {
  fn insert_after(&mut self, anchor: &str, key: &str, entry: &Entry) {
    let position = self
      .rows
      .iter()
      .position(|row| row == anchor)
      .map(|p| p + 1)
      .unwrap_or(self.rows.len());
    self.rows.insert(position, key.to_string());
    self.commands.push(SinkCommand::InsertAfter {
      anchor: anchor.to_string(),
      key: key.to_string(),
      entry: entry.clone(),
    });
  }

  fn update(&mut self, key: &str, entry: &Entry) {
    self.commands.push(SinkCommand::Update {
      key: key.to_string(),
      entry: entry.clone(),
    });
  }

  fn remove(&mut self, key: &str) {
    self.rows.retain(|row| row != key);
    self.commands.push(SinkCommand::Remove {
      key: key.to_string(),
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn registry(names: &[&str]) -> EntryRegistry {
    names.iter().map(|n| Entry::new(*n)).collect()
  }

  fn keys(reconciler: &Reconciler) -> Vec<&str> {
    reconciler.keys().collect()
  }

  fn apply(commands: &[SinkCommand], sink: &mut RecordingSink) {
    for command in commands {
      command.apply(sink);
    }
  }

  #[test]
  fn test_reversed_registry_displays_in_declared_order() {
    let mut reconciler = Reconciler::new("Toggl");
    let mut sink = RecordingSink {
      rows: vec!["Toggl".into(), "Quit".into()],
      ..Default::default()
    };

    // Declared as A, B, C and processed in reverse.
    let commands = reconciler.reconcile(&registry(&["C", "B", "A"]));
    apply(&commands, &mut sink);

    assert_eq!(sink.rows, vec!["Toggl", "A", "B", "C", "Quit"]);
    assert_eq!(keys(&reconciler), vec!["A", "B", "C"]);
    assert!(commands
      .iter()
      .all(|c| matches!(c, SinkCommand::InsertAfter { anchor, .. } if anchor == "Toggl")));
  }

  #[test]
  fn test_unchanged_input_is_idempotent() {
    let mut reconciler = Reconciler::new("Toggl");
    let input = registry(&["A", "B"]);

    assert_eq!(reconciler.reconcile(&input).len(), 2);
    let before: Vec<String> = reconciler.keys().map(String::from).collect();

    assert!(reconciler.reconcile(&input).is_empty());
    assert_eq!(keys(&reconciler), before);
  }

  #[test]
  fn test_sweep_emits_exactly_one_remove() {
    let mut reconciler = Reconciler::new("Redmine");
    reconciler.reconcile(&registry(&["X", "Y"]));

    let commands = reconciler.reconcile(&registry(&["X"]));
    assert_eq!(commands, vec![SinkCommand::Remove { key: "Y".into() }]);
    assert_eq!(keys(&reconciler), vec!["X"]);
    assert!(reconciler.get("Y").is_none());
  }

  #[test]
  fn test_update_only_when_payload_changed() {
    let mut reconciler = Reconciler::new("Toggl");
    reconciler.reconcile(&registry(&["A", "B"]));

    let changed: EntryRegistry = vec![
      Entry {
        project: Some("Site".into()),
        ..Entry::new("A")
      },
      Entry::new("B"),
    ]
    .into_iter()
    .collect();

    let commands = reconciler.reconcile(&changed);
    assert_eq!(
      commands,
      vec![SinkCommand::Update {
        key: "A".into(),
        entry: changed.get("A").unwrap().clone(),
      }]
    );
    assert_eq!(reconciler.get("A").unwrap().entry.project.as_deref(), Some("Site"));
  }

  #[test]
  fn test_new_items_go_before_existing_ones() {
    let mut reconciler = Reconciler::new("Toggl");
    let mut sink = RecordingSink {
      rows: vec!["Toggl".into()],
      ..Default::default()
    };

    apply(&reconciler.reconcile(&registry(&["A"])), &mut sink);
    let commands = reconciler.reconcile(&registry(&["A", "N"]));
    apply(&commands, &mut sink);

    assert_eq!(ReconcileSummary::from_commands(&commands).inserted, 1);
    assert_eq!(sink.rows, vec!["Toggl", "N", "A"]);
    assert_eq!(keys(&reconciler), vec!["N", "A"]);
  }

  #[test]
  fn test_mixed_pass_summary() {
    let mut reconciler = Reconciler::new("Jira");
    reconciler.reconcile(&registry(&["keep", "change", "drop"]));

    let next: EntryRegistry = vec![
      Entry::new("keep"),
      Entry {
        due: Some("2024-01-01".into()),
        ..Entry::new("change")
      },
      Entry::new("new"),
    ]
    .into_iter()
    .collect();

    let summary = ReconcileSummary::from_commands(&reconciler.reconcile(&next));
    assert_eq!(
      summary,
      ReconcileSummary {
        inserted: 1,
        updated: 1,
        removed: 1
      }
    );
    assert_eq!(keys(&reconciler), vec!["new", "change", "keep"]);
    assert!(reconciler.keys().all(|k| reconciler.get(k).unwrap().fresh));
  }

  #[test]
  fn test_empty_registry_clears_live_set() {
    let mut reconciler = Reconciler::new("Toggl");
    reconciler.reconcile(&registry(&["A", "B"]));

    let commands = reconciler.reconcile(&EntryRegistry::new());
    assert_eq!(ReconcileSummary::from_commands(&commands).removed, 2);
    assert!(reconciler.is_empty());
  }
}
