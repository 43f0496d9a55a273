/// What a widget did with a key press.
///
/// `T` is the widget's own event type, e.g. the picker's choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Consumed, nothing for the caller
  Handled,
  /// Consumed and produced an event
  Event(T),
  /// Not consumed; the caller may handle it
  NotHandled,
}
