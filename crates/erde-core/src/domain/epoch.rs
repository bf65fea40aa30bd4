use serde::{Deserialize, Serialize};

/// A reward window, indexed `w >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    pub number: u64,
    pub start_block: u64,
    pub end_block: u64,
    pub timestamp: i64,
}

impl Epoch {
    pub fn new(number: u64, start_block: u64, end_block: u64, timestamp: i64) -> Self {
        Self {
            number,
            start_block,
            end_block,
            timestamp,
        }
    }

    /// `endBlock >= startBlock`.
    pub fn is_valid(&self) -> bool {
        self.number >= 1 && self.end_block >= self.start_block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_block_range() {
        let epoch = Epoch::new(1, 200, 100, 0);
        assert!(!epoch.is_valid());
    }

    #[test]
    fn rejects_epoch_zero() {
        let epoch = Epoch::new(0, 100, 200, 0);
        assert!(!epoch.is_valid());
    }

    #[test]
    fn accepts_well_formed_epoch() {
        let epoch = Epoch::new(1, 100, 200, 0);
        assert!(epoch.is_valid());
    }
}
