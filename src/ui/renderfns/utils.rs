use chrono::NaiveDate;
use ratatui::prelude::Color;

/// Truncate a string to a maximum length in characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Get the display color for a due date (`YYYY-MM-DD`)
pub fn due_color(due: &str, today: NaiveDate) -> Color {
  match NaiveDate::parse_from_str(due, "%Y-%m-%d") {
    Ok(date) if date < today => Color::Red,
    Ok(date) if date == today => Color::Yellow,
    Ok(_) => Color::Green,
    Err(_) => Color::White,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
  }

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
  }

  #[test]
  fn test_truncate_exact_length() {
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
  }

  #[test]
  fn test_truncate_multibyte() {
    assert_eq!(truncate("Überprüfung", 6), "Übe...");
  }

  #[test]
  fn test_due_color_overdue() {
    assert_eq!(due_color("2024-03-09", today()), Color::Red);
  }

  #[test]
  fn test_due_color_today_and_later() {
    assert_eq!(due_color("2024-03-10", today()), Color::Yellow);
    assert_eq!(due_color("2024-04-01", today()), Color::Green);
  }

  #[test]
  fn test_due_color_unparseable() {
    assert_eq!(due_color("someday", today()), Color::White);
  }
}
