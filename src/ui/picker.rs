use color_eyre::Result;
use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

use crate::ui::components::{InputResult, KeyResult, TextInput};
use crate::ui::fuzzy;
use crate::ui::renderfns::truncate;

/// What the picker reports to its caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerEvent {
  Chosen(String),
  Cancelled,
}

/// Fuzzy picker over a fixed list of candidates
pub struct Picker {
  input: TextInput,
  candidates: Vec<String>,
  list_state: ListState,
}

impl Picker {
  pub fn new(candidates: Vec<String>, query: &str) -> Self {
    let mut picker = Self {
      input: TextInput::with_value(query),
      candidates,
      list_state: ListState::default(),
    };
    picker.reset_selection();
    picker
  }

  /// Candidates matching the current query, best first
  pub fn matches(&self) -> Vec<&str> {
    let candidates: Vec<&str> = self.candidates.iter().map(String::as_str).collect();
    fuzzy::rank(self.input.value(), &candidates)
  }

  pub fn selected(&self) -> Option<&str> {
    let index = self.list_state.selected()?;
    self.matches().get(index).copied()
  }

  fn reset_selection(&mut self) {
    let selection = if self.matches().is_empty() { None } else { Some(0) };
    self.list_state.select(selection);
  }

  fn move_selection(&mut self, delta: i32) {
    let len = self.matches().len();
    if len > 0 {
      let current = self.list_state.selected().unwrap_or(0);
      let next = (current as i32 + delta).rem_euclid(len as i32) as usize;
      self.list_state.select(Some(next));
    }
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<PickerEvent> {
    match key.code {
      KeyCode::Up => {
        self.move_selection(-1);
        return KeyResult::Handled;
      }
      KeyCode::Down | KeyCode::Tab => {
        self.move_selection(1);
        return KeyResult::Handled;
      }
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        return KeyResult::Event(PickerEvent::Cancelled);
      }
      _ => {}
    }

    match self.input.handle_key(key) {
      InputResult::Consumed => {
        self.reset_selection();
        KeyResult::Handled
      }
      InputResult::Submitted(_) => match self.selected() {
        Some(choice) => KeyResult::Event(PickerEvent::Chosen(choice.to_string())),
        None => KeyResult::Handled,
      },
      InputResult::Cancelled => KeyResult::Event(PickerEvent::Cancelled),
      InputResult::NotHandled => KeyResult::NotHandled,
    }
  }

  pub fn render(&mut self, frame: &mut Frame, area: Rect) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Length(3), Constraint::Min(1)])
      .split(area);

    let prompt = Paragraph::new(format!("> {}", self.input.value())).block(
      Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Track "),
    );
    frame.render_widget(prompt, chunks[0]);
    frame.set_cursor_position((
      chunks[0].x + 3 + self.input.cursor_position() as u16,
      chunks[0].y + 1,
    ));

    let width = chunks[1].width.saturating_sub(4) as usize;
    let matches = self.matches();
    let total = self.candidates.len();
    let items: Vec<ListItem> = matches
      .iter()
      .map(|m| ListItem::new(truncate(m, width)))
      .collect();

    let list = List::new(items)
      .block(
        Block::default()
          .borders(Borders::ALL)
          .border_style(Style::default().fg(Color::Blue))
          .title(format!(" {}/{} ", matches.len(), total)),
      )
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, chunks[1], &mut self.list_state);
  }
}

/// Let the user choose one candidate on the terminal.
///
/// With `select_1`, a query matching exactly one candidate returns it without
/// showing anything. Blocks on terminal input; call it off the async workers.
pub fn pick(candidates: Vec<String>, query: &str, select_1: bool) -> Result<Option<String>> {
  let mut picker = Picker::new(candidates, query);

  if select_1 && !query.trim().is_empty() {
    if let [only] = picker.matches().as_slice() {
      return Ok(Some(only.to_string()));
    }
  }

  let mut terminal = super::init_terminal()?;
  let result = (|| -> Result<Option<String>> {
    loop {
      terminal.draw(|frame| {
        let area = frame.area();
        picker.render(frame, area);
      })?;

      if let CrosstermEvent::Key(key) = event::read()? {
        if let KeyResult::Event(picked) = picker.handle_key(key) {
          return Ok(match picked {
            PickerEvent::Chosen(choice) => Some(choice),
            PickerEvent::Cancelled => None,
          });
        }
      }
    }
  })();
  super::restore_terminal()?;

  result
}
