use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the header bar with logo, source names, and shortcuts
pub fn draw_header(frame: &mut Frame, area: Rect, sources: &[String]) {
  let mut spans = vec![
    Span::styled(" dontforget ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!(" {} ", source_summary(sources)),
      Style::default().fg(Color::White),
    ),
    Span::raw("  "),
  ];

  // Shortcuts - keys and brackets highlighted, descriptions dimmed
  for (key, label) in [("<enter>", "activate"), ("<r>", "refresh"), ("<q>", "quit")] {
    spans.push(Span::styled(key, Style::default().fg(Color::Cyan)));
    spans.push(Span::styled(
      format!(" {}", label),
      Style::default().fg(Color::DarkGray),
    ));
    spans.push(Span::raw("   "));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));

  frame.render_widget(paragraph, area);
}

fn source_summary(sources: &[String]) -> String {
  match sources.len() {
    0 => "no sources".to_string(),
    1..=3 => sources.join(", "),
    n => format!("{} sources", n),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_source_summary() {
    assert_eq!(source_summary(&[]), "no sources");
    assert_eq!(
      source_summary(&["Toggl".to_string(), "Redmine".to_string()]),
      "Toggl, Redmine"
    );
    let many: Vec<String> = (0..5).map(|i| i.to_string()).collect();
    assert_eq!(source_summary(&many), "5 sources");
  }
}
