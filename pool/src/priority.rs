//! Strict weak priority order on pool entries (§4.5 "Priority order").

use std::cmp::Ordering;

use crate::types::TxId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityKey {
    pub fee: u64,
    pub blob_size: usize,
    pub receive_time: u64,
    pub id: TxId,
}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityKey {
    /// Ascending iteration order is descending priority: higher
    /// `fee/blobSize` sorts first, compared by cross-multiplying in
    /// 128-bit arithmetic to avoid overflow; ties prefer the smaller
    /// blob, then the older `receiveTime`, then the id for a total order.
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = u128::from(self.fee) * other.blob_size as u128;
        let rhs = u128::from(other.fee) * self.blob_size as u128;
        rhs.cmp(&lhs)
            .then_with(|| self.blob_size.cmp(&other.blob_size))
            .then_with(|| self.receive_time.cmp(&other.receive_time))
            .then_with(|| self.id.cmp(&other.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_fee_per_byte_sorts_first() {
        let rich = PriorityKey { fee: 1000, blob_size: 100, receive_time: 0, id: [1u8; 32] };
        let poor = PriorityKey { fee: 10, blob_size: 100, receive_time: 0, id: [2u8; 32] };
        assert!(rich < poor);
    }

    #[test]
    fn ties_prefer_smaller_blob_then_older_receive_time() {
        let small = PriorityKey { fee: 100, blob_size: 50, receive_time: 5, id: [1u8; 32] };
        let big = PriorityKey { fee: 100, blob_size: 200, receive_time: 5, id: [2u8; 32] };
        assert!(small < big);

        let old = PriorityKey { fee: 100, blob_size: 50, receive_time: 1, id: [3u8; 32] };
        let new = PriorityKey { fee: 100, blob_size: 50, receive_time: 9, id: [4u8; 32] };
        assert!(old < new);
    }
}
