//! Hard-fork (major version) upgrade voting detector (§4.4).
//!
//! Blocks vote for the next major version by setting their minor version
//! to [`BLOCK_MINOR_VERSION_1`] while still mining at the current major
//! version. Once [`UPGRADE_VOTING_THRESHOLD`] percent of the last
//! [`UPGRADE_VOTING_WINDOW`] blocks carry that vote, the upgrade height is
//! fixed and every block after it must carry the new major version.

use crate::constants::{
    BLOCK_MINOR_VERSION_1, MAX_UPGRADE_DISTANCE, UPGRADE_VOTING_THRESHOLD, UPGRADE_VOTING_WINDOW,
};

pub const UNDEFINED_HEIGHT: u32 = u32::MAX;

/// Read-only access to the chain of block versions the detector watches.
/// Mirrors what the reference detector pulls out of its blockchain
/// container template parameter.
pub trait BlockVersionSource {
    /// Number of blocks currently indexed (one past the highest height).
    fn chain_size(&self) -> u32;
    /// `(majorVersion, minorVersion)` of the block at `height`.
    fn version_at(&self, height: u32) -> (u8, u8);
}

/// One hard-coded upgrade height per target major version, looked up by
/// the caller (the fork schedule lives in [`crate::constants`]).
pub type HardcodedUpgradeHeight = Option<u32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeDetector {
    target_version: u8,
    hardcoded_height: HardcodedUpgradeHeight,
    voting_complete_height: u32,
}

impl UpgradeDetector {
    #[must_use]
    pub fn new(target_version: u8, hardcoded_height: HardcodedUpgradeHeight) -> Self {
        UpgradeDetector {
            target_version,
            hardcoded_height,
            voting_complete_height: UNDEFINED_HEIGHT,
        }
    }

    /// Reconstructs voting state from an already-populated chain, the way
    /// the reference detector's `init()` scans history on startup.
    pub fn init<S: BlockVersionSource>(&mut self, chain: &S) -> Result<(), &'static str> {
        if self.hardcoded_height.is_some() {
            return Ok(());
        }
        if chain.chain_size() == 0 {
            self.voting_complete_height = UNDEFINED_HEIGHT;
            return Ok(());
        }

        let last_height = chain.chain_size() - 1;
        let (last_major, _) = chain.version_at(last_height);

        if self.target_version.wrapping_sub(1) == last_major {
            self.voting_complete_height = self
                .find_voting_complete_height(chain, last_height)
                .ok_or("voting complete height isn't found")?;
        } else if self.target_version <= last_major {
            let upgrade_height = (0..=last_height)
                .find(|&h| chain.version_at(h).0 >= self.target_version)
                .ok_or("internal error: upgrade height isn't found")?;
            if chain.version_at(upgrade_height).0 != self.target_version {
                return Err("internal error: upgrade height isn't found");
            }
            self.voting_complete_height = self
                .find_voting_complete_height(chain, upgrade_height)
                .ok_or("voting complete height isn't found")?;
        } else {
            self.voting_complete_height = UNDEFINED_HEIGHT;
        }
        Ok(())
    }

    #[must_use]
    pub fn target_version(&self) -> u8 {
        self.target_version
    }

    #[must_use]
    pub fn voting_complete_height(&self) -> Option<u32> {
        (self.voting_complete_height != UNDEFINED_HEIGHT).then_some(self.voting_complete_height)
    }

    /// The height of the last block still allowed at the old major
    /// version; blocks at `upgradeHeight() + 1` onward must use
    /// `targetVersion`. `None` until an upgrade height is known.
    #[must_use]
    pub fn upgrade_height(&self) -> Option<u32> {
        if let Some(height) = self.hardcoded_height {
            return Some(height);
        }
        self.voting_complete_height()
            .map(|complete| self.calculate_upgrade_height(complete))
    }

    fn calculate_upgrade_height(&self, voting_complete_height: u32) -> u32 {
        voting_complete_height.saturating_add(UPGRADE_VOTING_WINDOW)
    }

    /// Call after a block is appended at the new chain tip (§4.4
    /// `pushBlock` postcondition: "upgrade detector state is updated").
    pub fn block_pushed<S: BlockVersionSource>(&mut self, chain: &S) {
        if self.hardcoded_height.is_some() {
            return;
        }
        if self.voting_complete_height != UNDEFINED_HEIGHT {
            return;
        }
        let last_height = chain.chain_size() - 1;
        if self.is_voting_complete(chain, last_height) {
            self.voting_complete_height = last_height;
        }
    }

    /// Call after a block is popped off the tip (§4.4 `split`
    /// postcondition): cancels a completed vote if the popped block was
    /// the one that had completed it.
    pub fn block_popped<S: BlockVersionSource>(&mut self, chain: &S) {
        if self.hardcoded_height.is_some() {
            return;
        }
        if self.voting_complete_height == UNDEFINED_HEIGHT {
            return;
        }
        if chain.chain_size() == self.voting_complete_height {
            self.voting_complete_height = UNDEFINED_HEIGHT;
        }
    }

    #[must_use]
    pub fn number_of_votes<S: BlockVersionSource>(&self, chain: &S, height: u32) -> usize {
        if height + 1 < UPGRADE_VOTING_WINDOW {
            return 0;
        }
        let start = height + 1 - UPGRADE_VOTING_WINDOW;
        (start..=height)
            .filter(|&h| {
                let (major, minor) = chain.version_at(h);
                major == self.target_version.wrapping_sub(1) && minor == BLOCK_MINOR_VERSION_1
            })
            .count()
    }

    fn is_voting_complete<S: BlockVersionSource>(&self, chain: &S, height: u32) -> bool {
        let votes = self.number_of_votes(chain, height);
        u64::from(UPGRADE_VOTING_THRESHOLD) * u64::from(UPGRADE_VOTING_WINDOW)
            <= 100 * votes as u64
    }

    fn find_voting_complete_height<S: BlockVersionSource>(
        &self,
        chain: &S,
        probable_upgrade_height: u32,
    ) -> Option<u32> {
        let start = probable_upgrade_height.saturating_sub(MAX_UPGRADE_DISTANCE);
        (start..=probable_upgrade_height).find(|&h| self.is_voting_complete(chain, h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedChain {
        versions: Vec<(u8, u8)>,
    }

    impl BlockVersionSource for FixedChain {
        fn chain_size(&self) -> u32 {
            self.versions.len() as u32
        }
        fn version_at(&self, height: u32) -> (u8, u8) {
            self.versions[height as usize]
        }
    }

    #[test]
    fn no_votes_before_window_fills() {
        let chain = FixedChain {
            versions: vec![(1, 0); 10],
        };
        let detector = UpgradeDetector::new(2, None);
        assert_eq!(detector.number_of_votes(&chain, 5), 0);
    }

    #[test]
    fn hardcoded_height_short_circuits_voting() {
        let detector = UpgradeDetector::new(5, Some(65_500));
        assert_eq!(detector.upgrade_height(), Some(65_500));
    }

    #[test]
    fn voting_completes_once_threshold_reached() {
        let window = UPGRADE_VOTING_WINDOW as usize;
        let mut versions = vec![(2, 0); window - 1];
        versions.extend(std::iter::repeat((1, BLOCK_MINOR_VERSION_1)).take(window));
        let chain = FixedChain { versions };
        let mut detector = UpgradeDetector::new(2, None);
        detector.block_pushed(&chain);
        assert!(detector.voting_complete_height().is_some());
    }
}
