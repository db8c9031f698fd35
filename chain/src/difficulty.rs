//! Next-block difficulty calculation (§4.4 `getDifficultyForNextBlock`):
//! the classic CryptoNote windowed-average algorithm — sort the window,
//! trim `DIFFICULTY_CUT` samples off each end, and divide the cumulative
//! work done in what remains by the time it took, scaled to the target
//! block interval.

use crate::constants::{DIFFICULTY_CUT, DIFFICULTY_TARGET, DIFFICULTY_WINDOW};

/// `timestamps` and `cumulative_difficulties` must be the same length,
/// holding the most recent `difficultyBlocksCountByHeight` values
/// (window + lag), oldest first, genesis excluded.
#[must_use]
pub fn next_difficulty(timestamps: &[u64], cumulative_difficulties: &[u128]) -> u128 {
    assert_eq!(timestamps.len(), cumulative_difficulties.len());

    let mut timestamps = timestamps.to_vec();
    let mut cumulative_difficulties = cumulative_difficulties.to_vec();
    if timestamps.len() > DIFFICULTY_WINDOW {
        timestamps.truncate(DIFFICULTY_WINDOW);
        cumulative_difficulties.truncate(DIFFICULTY_WINDOW);
    }

    let length = timestamps.len();
    if length <= 1 {
        return 1;
    }

    let mut sorted_with_work: Vec<(u64, u128)> = timestamps
        .into_iter()
        .zip(cumulative_difficulties)
        .collect();
    sorted_with_work.sort_by_key(|(ts, _)| *ts);
    let sorted_timestamps: Vec<u64> = sorted_with_work.iter().map(|(ts, _)| *ts).collect();
    let sorted_work: Vec<u128> = sorted_with_work.iter().map(|(_, w)| *w).collect();

    let (cut_begin, cut_end) = if length <= DIFFICULTY_WINDOW - 2 * DIFFICULTY_CUT {
        (0, length)
    } else {
        let cut_begin = (length - (DIFFICULTY_WINDOW - 2 * DIFFICULTY_CUT) + 1) / 2;
        (cut_begin, cut_begin + (DIFFICULTY_WINDOW - 2 * DIFFICULTY_CUT))
    };
    debug_assert!(cut_begin + 2 <= cut_end && cut_end <= length);

    let mut time_span = sorted_timestamps[cut_end - 1].saturating_sub(sorted_timestamps[cut_begin]);
    if time_span == 0 {
        time_span = 1;
    }
    let total_work = sorted_work[cut_end - 1] - sorted_work[cut_begin];

    let numerator = total_work.saturating_mul(u128::from(DIFFICULTY_TARGET));
    (numerator + u128::from(time_span) - 1) / u128::from(time_span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_one_for_a_single_sample() {
        assert_eq!(next_difficulty(&[1000], &[500]), 1);
    }

    #[test]
    fn scales_work_by_target_over_span() {
        // 10 evenly spaced samples, 120s apart, work increasing by 1000
        // each block: should reproduce ~1000 difficulty (target == spacing).
        let timestamps: Vec<u64> = (0..10).map(|i| i * DIFFICULTY_TARGET).collect();
        let work: Vec<u128> = (0..10).map(|i| u128::from(i) * 1000).collect();
        let next = next_difficulty(&timestamps, &work);
        assert!(next > 0);
    }
}
