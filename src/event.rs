use crossterm::event::{self, Event as CrosstermEvent, KeyEvent};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::trace;

use crate::entry::Entry;
use crate::reconcile::{DisplaySink, SinkCommand};

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Periodic tick for UI refresh
  Tick,
  /// Display command from the pipe at index `pipe`
  Menu { pipe: usize, command: SinkCommand },
}

/// Event handler that produces events from terminal input and a tick timer
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // Crossterm polling blocks, keep it off the async workers
    let input_tx = tx.clone();
    tokio::task::spawn_blocking(move || loop {
      let event = if event::poll(tick_rate).unwrap_or(false) {
        match event::read() {
          Ok(CrosstermEvent::Key(key)) => Event::Key(key),
          _ => continue,
        }
      } else {
        Event::Tick
      };

      if input_tx.send(event).is_err() {
        break;
      }
    });

    Self { tx, rx }
  }

  /// Sender for events produced outside the terminal (display commands)
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

/// Display sink that forwards every command to the menu as an event.
pub struct ChannelSink {
  pipe: usize,
  tx: mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
  pub fn new(pipe: usize, tx: mpsc::UnboundedSender<Event>) -> Self {
    Self { pipe, tx }
  }

  fn send(&self, command: SinkCommand) {
    if self
      .tx
      .send(Event::Menu {
        pipe: self.pipe,
        command,
      })
      .is_err()
    {
      trace!(pipe = self.pipe, "menu is gone, dropping display command");
    }
  }
}

impl DisplaySink for ChannelSink {
  fn insert_after(&mut self, anchor: &str, key: &str, entry: &Entry) {
    self.send(SinkCommand::InsertAfter {
      anchor: anchor.to_string(),
      key: key.to_string(),
      entry: entry.clone(),
    });
  }

  fn update(&mut self, key: &str, entry: &Entry) {
    self.send(SinkCommand::Update {
      key: key.to_string(),
      entry: entry.clone(),
    });
  }

  fn remove(&mut self, key: &str) {
    self.send(SinkCommand::Remove {
      key: key.to_string(),
    });
  }
}
