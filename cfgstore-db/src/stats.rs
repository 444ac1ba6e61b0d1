use std::fmt;

use serde::Serialize;

/// Open/close counters of one statement resource.
///
/// Counters only grow. Because opens and closes alternate, `open - close` is
/// always 0 or 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub open: u64,
    pub close: u64,
}

impl Stats {
    /// Whether a statement is materialized at the time of the snapshot
    pub fn is_open(&self) -> bool {
        self.open > self.close
    }

    pub(crate) fn record_open(&mut self) {
        debug_assert!(!self.is_open(), "statement opened twice");
        self.open += 1;
    }

    pub(crate) fn record_close(&mut self) {
        debug_assert!(self.is_open(), "statement closed twice");
        self.close += 1;
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "open={} close={}", self.open, self.close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_close_alternate() {
        let mut stats = Stats::default();
        assert!(!stats.is_open());
        stats.record_open();
        assert!(stats.is_open());
        stats.record_close();
        stats.record_open();
        assert_eq!(stats, Stats { open: 2, close: 1 });
        assert_eq!(stats.to_string(), "open=2 close=1");
    }
}
