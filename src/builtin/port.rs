/// Signal types for wiring modules together

/// A registered signal between two modules.
///
/// Every wire carries a `valid` strobe; a consumer must ignore `value`
/// whenever `valid` is low.
#[derive(Clone, Debug, PartialEq)]
pub struct Wire<T: Clone> {
  pub value: T,
  pub valid: bool,
}

impl<T: Clone> Wire<T> {
  pub fn new(value: T) -> Self {
    Self { value, valid: false }
  }

  /// Drive the wire with a value and raise the strobe.
  pub fn set(&mut self, value: T) {
    self.value = value;
    self.valid = true;
  }

  /// Drop the strobe, keep the last value on the bus.
  pub fn clear(&mut self) {
    self.valid = false;
  }

  pub fn get(&self) -> Option<&T> {
    if self.valid {
      Some(&self.value)
    } else {
      None
    }
  }

  /// Read the value and drop the strobe in one go.
  pub fn take(&mut self) -> Option<T> {
    if self.valid {
      self.valid = false;
      Some(self.value.clone())
    } else {
      None
    }
  }

  pub fn from_option(value: Option<T>) -> Self
  where
    T: Default,
  {
    match value {
      Some(v) => Self { value: v, valid: true },
      None => Self::default(),
    }
  }
}

impl<T: Clone + Default> Default for Wire<T> {
  fn default() -> Self {
    Self {
      value: T::default(),
      valid: false,
    }
  }
}
