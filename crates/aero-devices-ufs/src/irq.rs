//! Level-triggered interrupt output of the controller.

use std::cell::Cell;
use std::rc::Rc;

/// A single level-triggered interrupt line driven by the controller.
pub trait IrqLine {
    fn set_level(&self, high: bool);
}

/// Interrupt line that is not wired to anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIrq;

impl IrqLine for NoIrq {
    fn set_level(&self, _high: bool) {}
}

/// Shareable line that remembers its last level. Useful for platform glue that polls the
/// level, and for tests.
#[derive(Debug, Clone, Default)]
pub struct LevelIrqLine(Rc<Cell<bool>>);

impl LevelIrqLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> bool {
        self.0.get()
    }
}

impl IrqLine for LevelIrqLine {
    fn set_level(&self, high: bool) {
        self.0.set(high);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_line_clones_share_state() {
        let line = LevelIrqLine::new();
        let handle = line.clone();
        assert!(!handle.level());
        line.set_level(true);
        assert!(handle.level());
        line.set_level(false);
        assert!(!handle.level());
    }
}
