use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the footer bar with the latest status message
pub fn draw_footer(frame: &mut Frame, area: Rect, status: &str) {
  let line = Line::from(vec![
    Span::raw(" "),
    Span::styled(status.to_string(), Style::default().fg(Color::DarkGray)),
  ]);
  let paragraph = Paragraph::new(line).style(Style::default().bg(Color::Black));

  frame.render_widget(paragraph, area);
}
