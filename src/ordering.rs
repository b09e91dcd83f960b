use std::cmp::Ordering;
use std::sync::Arc;

use crate::advice::Advice;

/// Total order for the advice of one method.
///
/// Ascending `order`, then timer name ignoring case with empty names last,
/// then registration position.
pub fn compare(left: &Advice, right: &Advice) -> Ordering {
    left.order()
        .cmp(&right.order())
        .then_with(|| compare_timer_names(left.timer_name(), right.timer_name()))
        .then_with(|| left.registration().cmp(&right.registration()))
}

fn compare_timer_names(left: &str, right: &str) -> Ordering {
    match (left.is_empty(), right.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => left
            .chars()
            .flat_map(char::to_lowercase)
            .cmp(right.chars().flat_map(char::to_lowercase)),
    }
}

pub fn sort(advisors: &mut [Arc<Advice>]) {
    advisors.sort_by(|left, right| compare(left, right));
}

/// Indices in the order isEnabled/onBefore run.
pub fn entry_sequence(count: usize) -> Vec<usize> {
    (0..count).collect()
}

/// Indices in the order onReturn/onThrow/onAfter run: last entered, first exited.
pub fn exit_sequence(count: usize) -> Vec<usize> {
    (0..count).rev().collect()
}
