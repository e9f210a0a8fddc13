//! Stack-frame layout for a single function.
//!
//! Every distinct variable name gets one machine word below `%rbp`, in the
//! order the names are first seen. There is no declaration syntax, so the
//! first occurrence of a name is what fixes its slot.

/// Size of one stack slot in bytes.
pub const SLOT_SIZE: i64 = 8;

/// A named slot in the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Local {
  pub name: String,
  pub offset: i64,
}

/// Mapping from variable name to its offset below the frame base.
///
/// Offsets are `8, 16, 24, ...`: strictly positive, dense and unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameMap {
  locals: Vec<Local>,
}

impl FrameMap {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build a frame from a sequence of identifier occurrences.
  pub fn from_occurrences<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let mut frame = Self::new();
    for name in names {
      frame.declare(name.as_ref());
    }
    frame
  }

  /// Return the slot for `name`, allocating the next one on first use.
  pub fn declare(&mut self, name: &str) -> i64 {
    if let Some(offset) = self.offset_of(name) {
      return offset;
    }
    let offset = (self.locals.len() as i64 + 1) * SLOT_SIZE;
    self.locals.push(Local {
      name: name.to_string(),
      offset,
    });
    offset
  }

  pub fn offset_of(&self, name: &str) -> Option<i64> {
    self
      .locals
      .iter()
      .find(|local| local.name == name)
      .map(|local| local.offset)
  }

  /// Bytes to reserve in the prologue: the largest offset handed out.
  pub fn stack_size(&self) -> i64 {
    self.locals.last().map_or(0, |local| local.offset)
  }

  pub fn len(&self) -> usize {
    self.locals.len()
  }

  pub fn is_empty(&self) -> bool {
    self.locals.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Local> {
    self.locals.iter()
  }
}
