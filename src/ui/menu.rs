use chrono::{Local, NaiveDate};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState};

use crate::entry::Entry;
use crate::reconcile::{DisplaySink, SinkCommand};
use crate::ui::renderfns::{due_color, truncate};

/// One row of the menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuRow {
  /// Section header of a pipe; also the anchor its new items go after
  Header { anchor: String },
  Item {
    pipe: usize,
    key: String,
    entry: Entry,
  },
}

/// The menu's own rows. Pipes change them only through display commands.
#[derive(Debug, Default)]
pub struct MenuModel {
  rows: Vec<MenuRow>,
  list_state: ListState,
}

/// Applies one pipe's commands to the menu.
struct PipeRows<'a> {
  model: &'a mut MenuModel,
  pipe: usize,
}

impl PipeRows<'_> {
  fn position(&self, key: &str) -> Option<usize> {
    self.model.rows.iter().position(|row| {
      matches!(row, MenuRow::Item { pipe, key: k, .. } if *pipe == self.pipe && k == key)
    })
  }
}

impl DisplaySink for PipeRows<'_> {
  fn insert_after(&mut self, anchor: &str, key: &str, entry: &Entry) {
    let position = self
      .model
      .rows
      .iter()
      .position(|row| matches!(row, MenuRow::Header { anchor: a } if a == anchor))
      .map(|p| p + 1)
      .unwrap_or(self.model.rows.len());

    self.model.rows.insert(
      position,
      MenuRow::Item {
        pipe: self.pipe,
        key: key.to_string(),
        entry: entry.clone(),
      },
    );
  }

  fn update(&mut self, key: &str, entry: &Entry) {
    if let Some(position) = self.position(key) {
      if let MenuRow::Item { entry: current, .. } = &mut self.model.rows[position] {
        *current = entry.clone();
      }
    }
  }

  fn remove(&mut self, key: &str) {
    if let Some(position) = self.position(key) {
      self.model.rows.remove(position);
    }
  }
}

impl MenuModel {
  /// One header per pipe, in pipe order
  pub fn new(anchors: impl IntoIterator<Item = String>) -> Self {
    Self {
      rows: anchors
        .into_iter()
        .map(|anchor| MenuRow::Header { anchor })
        .collect(),
      list_state: ListState::default(),
    }
  }

  pub fn apply(&mut self, pipe: usize, command: &SinkCommand) {
    let selected_key = self.selected_item().map(|(p, k)| (p, k.to_string()));

    command.apply(&mut PipeRows { model: self, pipe });

    // Keep the cursor on the same item when rows move around it
    let reselect = selected_key.and_then(|(p, k)| {
      self.rows.iter().position(
        |row| matches!(row, MenuRow::Item { pipe, key, .. } if *pipe == p && *key == k),
      )
    });
    match reselect {
      Some(position) => self.list_state.select(Some(position)),
      None => self.clamp_selection(),
    }
  }

  #[cfg(test)]
  pub fn rows(&self) -> &[MenuRow] {
    &self.rows
  }

  /// `(pipe, key)` of the selected row, if it is an item
  pub fn selected_item(&self) -> Option<(usize, &str)> {
    match self.rows.get(self.list_state.selected()?)? {
      MenuRow::Item { pipe, key, .. } => Some((*pipe, key.as_str())),
      MenuRow::Header { .. } => None,
    }
  }

  /// Move to the next/previous item, skipping headers, wrapping around
  pub fn move_selection(&mut self, delta: i32) {
    let items: Vec<usize> = self
      .rows
      .iter()
      .enumerate()
      .filter(|(_, row)| matches!(row, MenuRow::Item { .. }))
      .map(|(i, _)| i)
      .collect();
    if items.is_empty() {
      self.list_state.select(None);
      return;
    }

    let current = self
      .list_state
      .selected()
      .and_then(|s| items.iter().position(|&i| i == s));
    let next = match current {
      Some(c) => (c as i32 + delta).rem_euclid(items.len() as i32) as usize,
      None if delta < 0 => items.len() - 1,
      None => 0,
    };
    self.list_state.select(Some(items[next]));
  }

  fn clamp_selection(&mut self) {
    match self.list_state.selected() {
      Some(_) if self.rows.is_empty() => self.list_state.select(None),
      Some(s) if s >= self.rows.len() => self.list_state.select(Some(self.rows.len() - 1)),
      _ => {}
    }
  }

  pub fn item_count(&self) -> usize {
    self
      .rows
      .iter()
      .filter(|row| matches!(row, MenuRow::Item { .. }))
      .count()
  }
}

fn item_line(entry: &Entry, today: NaiveDate) -> Line<'static> {
  let mut spans = vec![Span::raw("  "), Span::raw(truncate(&entry.label(), 60))];

  if let Some(due) = &entry.due {
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
      due.clone(),
      Style::default().fg(due_color(due, today)),
    ));
  }
  if let Some(reference) = &entry.reference {
    spans.push(Span::styled(
      format!("  {}", reference),
      Style::default().fg(Color::DarkGray),
    ));
  }
  Line::from(spans)
}

pub fn draw_menu(frame: &mut Frame, area: Rect, menu: &mut MenuModel) {
  let today = Local::now().date_naive();

  let items: Vec<ListItem> = menu
    .rows
    .iter()
    .map(|row| match row {
      MenuRow::Header { anchor } => ListItem::new(Line::from(Span::styled(
        anchor.clone(),
        Style::default().fg(Color::Yellow).bold(),
      ))),
      MenuRow::Item { entry, .. } => ListItem::new(item_line(entry, today)),
    })
    .collect();

  let block = Block::default()
    .title(format!(" Entries ({}) ", menu.item_count()))
    .title_alignment(Alignment::Center)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  let list = List::new(items)
    .block(block)
    .highlight_style(
      Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

  frame.render_stateful_widget(list, area, &mut menu.list_state);
}
