use crate::event::{Event, EventHandler};
use crate::pipe::Pipe;
use crate::scheduler::Trigger;
use crate::ui;
use crate::ui::menu::MenuModel;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// The terminal menu: displays what the pipes reconcile and triggers activations
pub struct App {
  menu: MenuModel,

  pipes: Vec<Arc<Pipe>>,

  /// Pipe names, in menu order
  source_names: Vec<String>,

  /// Requests to the scheduler
  triggers: mpsc::UnboundedSender<Trigger>,

  /// Last message shown in the status bar
  status: String,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(pipes: Vec<Arc<Pipe>>, triggers: mpsc::UnboundedSender<Trigger>) -> Self {
    let source_names: Vec<String> = pipes.iter().map(|p| p.name().to_string()).collect();

    Self {
      menu: MenuModel::new(source_names.clone()),
      pipes,
      source_names,
      triggers,
      status: "Waiting for the first pull...".to_string(),
      should_quit: false,
    }
  }

  pub async fn run(&mut self, mut events: EventHandler) -> Result<()> {
    let mut terminal = ui::init_terminal()?;

    let result = async {
      while !self.should_quit() {
        terminal.draw(|frame| ui::draw(frame, self))?;

        match events.next().await {
          Some(event) => self.handle_event(event),
          None => break,
        }
      }
      Ok::<_, color_eyre::Report>(())
    }
    .await;

    ui::restore_terminal()?;
    result
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => {} // UI refresh happens automatically
      Event::Menu { pipe, command } => {
        debug!(pipe, key = command.key(), "menu command");
        self.menu.apply(pipe, &command);
        self.status = format!("{} entries", self.menu.item_count());
      }
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.should_quit = true;
      }

      // Navigation
      KeyCode::Up | KeyCode::Char('k') => self.menu.move_selection(-1),
      KeyCode::Down | KeyCode::Char('j') => self.menu.move_selection(1),

      KeyCode::Enter => self.activate_selected(),
      KeyCode::Char('r') => {
        self.status = if self.triggers.send(Trigger::RefreshNow).is_ok() {
          "Refreshing...".to_string()
        } else {
          "Scheduler is not running".to_string()
        };
      }
      _ => {}
    }
  }

  fn activate_selected(&mut self) {
    let Some((pipe, key)) = self.menu.selected_item() else {
      return;
    };
    let key = key.to_string();

    match self.pipes.get(pipe) {
      Some(p) => {
        p.on_item_activated(&key);
        self.status = format!("Activated {}", key);
      }
      None => self.status = format!("No source for {}", key),
    }
  }

  // Accessors for UI rendering
  pub fn menu_mut(&mut self) -> &mut MenuModel {
    &mut self.menu
  }

  pub fn source_names(&self) -> &[String] {
    &self.source_names
  }

  pub fn status(&self) -> &str {
    &self.status
  }

  pub fn should_quit(&self) -> bool {
    self.should_quit
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entry::Entry;
  use crate::reconcile::{RecordingSink, SinkCommand};
  use crate::source::testing::StaticSource;
  use std::time::Duration;

  fn key(code: KeyCode) -> Event {
    Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
  }

  fn insert(key: &str) -> Event {
    Event::Menu {
      pipe: 0,
      command: SinkCommand::InsertAfter {
        anchor: "Static".into(),
        key: key.into(),
        entry: Entry::new(key),
      },
    }
  }

  fn app(source: &Arc<StaticSource>) -> (App, mpsc::UnboundedReceiver<Trigger>) {
    let pipe = Arc::new(Pipe::new(
      source.connection(),
      source.clone(),
      Box::new(RecordingSink::default()),
    ));
    let (tx, rx) = mpsc::unbounded_channel();
    (App::new(vec![pipe], tx), rx)
  }

  #[tokio::test]
  async fn test_menu_events_build_rows() {
    let (mut app, _rx) = app(&Arc::new(StaticSource::named(&[])));
    app.handle_event(insert("A"));
    app.handle_event(insert("B"));

    assert_eq!(app.menu.item_count(), 2);
    assert_eq!(app.status(), "2 entries");
  }

  #[tokio::test]
  async fn test_refresh_key_triggers_scheduler() {
    let (mut app, mut rx) = app(&Arc::new(StaticSource::named(&[])));
    app.handle_event(key(KeyCode::Char('r')));
    assert_eq!(rx.try_recv().unwrap(), Trigger::RefreshNow);

    drop(rx);
    app.handle_event(key(KeyCode::Char('r')));
    assert_eq!(app.status(), "Scheduler is not running");
  }

  #[tokio::test]
  async fn test_enter_activates_selected_item() {
    let source = Arc::new(StaticSource::named(&["A"]));
    let (mut app, _rx) = app(&source);
    app.pipes[0].run_cycle().await.unwrap();
    app.handle_event(insert("A"));

    app.handle_event(key(KeyCode::Char('j')));
    app.handle_event(key(KeyCode::Enter));
    assert_eq!(app.status(), "Activated A");

    for _ in 0..50 {
      if !source.activations().is_empty() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(source.activations(), vec!["A".to_string()]);
  }

  #[tokio::test]
  async fn test_quit_keys() {
    let (mut app, _rx) = app(&Arc::new(StaticSource::named(&[])));
    app.handle_event(key(KeyCode::Enter));
    assert!(!app.should_quit());

    app.handle_event(Event::Key(KeyEvent::new(
      KeyCode::Char('c'),
      KeyModifiers::CONTROL,
    )));
    assert!(app.should_quit());
  }
}
