use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Outcome of a key press in a [`TextInput`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputResult {
  /// Edit or cursor move
  Consumed,
  /// Enter, with the current text
  Submitted(String),
  /// Esc
  Cancelled,
  NotHandled,
}

/// Single-line text field
///
/// The cursor counts characters, not bytes.
#[derive(Debug, Clone, Default)]
pub struct TextInput {
  buffer: String,
  cursor: usize,
}

impl TextInput {
  /// Input prefilled with `value`, cursor at the end
  pub fn with_value(value: &str) -> Self {
    Self {
      buffer: value.to_string(),
      cursor: value.chars().count(),
    }
  }

  fn len(&self) -> usize {
    self.buffer.chars().count()
  }

  /// Byte offset of a character position
  fn byte_index(&self, position: usize) -> usize {
    self
      .buffer
      .char_indices()
      .nth(position)
      .map(|(i, _)| i)
      .unwrap_or(self.buffer.len())
  }

  /// Get the current input value
  pub fn value(&self) -> &str {
    &self.buffer
  }

  /// Handle a key event, returning the result
  pub fn handle_key(&mut self, key: KeyEvent) -> InputResult {
    match key.code {
      KeyCode::Esc => InputResult::Cancelled,
      KeyCode::Enter => InputResult::Submitted(self.buffer.clone()),
      KeyCode::Backspace => {
        if self.cursor > 0 {
          self.cursor -= 1;
          let at = self.byte_index(self.cursor);
          self.buffer.remove(at);
        }
        InputResult::Consumed
      }
      KeyCode::Delete => {
        if self.cursor < self.len() {
          let at = self.byte_index(self.cursor);
          self.buffer.remove(at);
        }
        InputResult::Consumed
      }
      KeyCode::Left => {
        if self.cursor > 0 {
          self.cursor -= 1;
        }
        InputResult::Consumed
      }
      KeyCode::Right => {
        if self.cursor < self.len() {
          self.cursor += 1;
        }
        InputResult::Consumed
      }
      KeyCode::Home => {
        self.cursor = 0;
        InputResult::Consumed
      }
      KeyCode::End => {
        self.cursor = self.len();
        InputResult::Consumed
      }
      KeyCode::Char('a') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.cursor = 0;
        InputResult::Consumed
      }
      KeyCode::Char('e') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.cursor = self.len();
        InputResult::Consumed
      }
      KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        // Clear line before cursor
        self.buffer = self.buffer[self.byte_index(self.cursor)..].to_string();
        self.cursor = 0;
        InputResult::Consumed
      }
      KeyCode::Char('w') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        // Delete word before cursor
        if self.cursor > 0 {
          let end = self.byte_index(self.cursor);
          let before = &self.buffer[..end];
          let start = before.trim_end().rfind(' ').map(|i| i + 1).unwrap_or(0);
          self.cursor = self.buffer[..start].chars().count();
          self.buffer.replace_range(start..end, "");
        }
        InputResult::Consumed
      }
      KeyCode::Char(c) => {
        let at = self.byte_index(self.cursor);
        self.buffer.insert(at, c);
        self.cursor += 1;
        InputResult::Consumed
      }
      _ => InputResult::NotHandled,
    }
  }

  /// Get cursor position for rendering
  pub fn cursor_position(&self) -> usize {
    self.cursor
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn ctrl(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
  }

  fn typed(text: &str) -> TextInput {
    let mut input = TextInput::default();
    for c in text.chars() {
      input.handle_key(key(KeyCode::Char(c)));
    }
    input
  }

  #[test]
  fn test_typing_appends() {
    assert_eq!(TextInput::default().value(), "");
    assert_eq!(typed("deploy").value(), "deploy");
  }

  #[test]
  fn test_enter_submits_and_esc_cancels() {
    let mut input = typed("code review");
    assert_eq!(
      input.handle_key(key(KeyCode::Enter)),
      InputResult::Submitted("code review".to_string())
    );
    assert_eq!(input.handle_key(key(KeyCode::Esc)), InputResult::Cancelled);
  }

  #[test]
  fn test_insert_in_the_middle() {
    let mut input = typed("rading");
    input.handle_key(key(KeyCode::Home));
    input.handle_key(key(KeyCode::Right));
    input.handle_key(key(KeyCode::Char('e')));
    assert_eq!(input.value(), "reading");
    assert_eq!(input.cursor_position(), 2);
  }

  #[test]
  fn test_prefilled_value_edits_at_end() {
    let mut input = TextInput::with_value("dépl");
    assert_eq!(input.cursor_position(), 4);
    input.handle_key(key(KeyCode::Backspace));
    input.handle_key(key(KeyCode::Char('o')));
    assert_eq!(input.value(), "dépo");
  }

  #[test]
  fn test_delete_after_multibyte_char() {
    let mut input = TextInput::with_value("über");
    input.handle_key(key(KeyCode::Home));
    input.handle_key(key(KeyCode::Right));
    input.handle_key(key(KeyCode::Delete));
    assert_eq!(input.value(), "üer");
  }

  #[test]
  fn test_ctrl_a_and_ctrl_e_jump() {
    let mut input = TextInput::with_value("site");
    input.handle_key(ctrl('a'));
    input.handle_key(key(KeyCode::Char('>')));
    input.handle_key(ctrl('e'));
    input.handle_key(key(KeyCode::Char('!')));
    assert_eq!(input.value(), ">site!");
  }

  #[test]
  fn test_ctrl_w_deletes_word() {
    let mut input = TextInput::with_value("deploy the site");
    input.handle_key(ctrl('w'));
    assert_eq!(input.value(), "deploy the ");
  }

  #[test]
  fn test_ctrl_u_keeps_text_after_cursor() {
    let mut input = typed("email inbox");
    for _ in 0.."inbox".len() {
      input.handle_key(key(KeyCode::Left));
    }
    input.handle_key(ctrl('u'));
    assert_eq!(input.value(), "inbox");
    assert_eq!(input.cursor_position(), 0);
  }

  #[test]
  fn test_unbound_keys_pass_through() {
    assert_eq!(
      TextInput::default().handle_key(key(KeyCode::F(2))),
      InputResult::NotHandled
    );
  }
}
