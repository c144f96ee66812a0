//! Alliance selection state shared by the chart views.

use std::collections::BTreeSet;

/// Click on one alliance of a coalition.
///
/// - not selected: add it
/// - selected while everything is selected: isolate it against the other coalition
/// - the coalition's last selected alliance: reselect the whole coalition
/// - otherwise: remove it
pub fn toggle_alliance(
    allowed: &BTreeSet<i64>,
    coalitions: &[&[i64]],
    coalition_index: usize,
    alliance_id: i64,
) -> BTreeSet<i64> {
    if !allowed.contains(&alliance_id) {
        let mut next = allowed.clone();
        next.insert(alliance_id);
        return next;
    }
    let coalition = coalitions.get(coalition_index).copied();
    let other = coalitions.get(if coalition_index == 0 { 1 } else { 0 }).copied();
    let has_all = |ids: Option<&[i64]>| ids.is_some_and(|ids| ids.iter().all(|id| allowed.contains(id)));
    let selected_here = coalition.map_or(0, |ids| ids.iter().filter(|id| allowed.contains(id)).count());

    if has_all(coalition) && has_all(other) {
        let mut next: BTreeSet<i64> = other.unwrap_or_default().iter().copied().collect();
        next.insert(alliance_id);
        return next;
    }
    if selected_here == 1 {
        let mut next = allowed.clone();
        next.extend(coalition.unwrap_or_default().iter().copied());
        return next;
    }
    let mut next = allowed.clone();
    next.remove(&alliance_id);
    next
}

/// Splits a flat selection into per-coalition id lists, preserving coalition order.
pub fn per_coalition(allowed: &BTreeSet<i64>, coalitions: &[&[i64]]) -> Vec<Vec<i64>> {
    coalitions
        .iter()
        .map(|ids| ids.iter().copied().filter(|id| allowed.contains(id)).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &[i64] = &[1, 2, 3];
    const B: &[i64] = &[7, 8];

    fn set(ids: &[i64]) -> BTreeSet<i64> {
        ids.iter().copied().collect()
    }

    #[test]
    fn adds_unselected() {
        assert_eq!(toggle_alliance(&set(&[1]), &[A, B], 0, 2), set(&[1, 2]));
    }

    #[test]
    fn isolates_when_everything_selected() {
        let all = set(&[1, 2, 3, 7, 8]);
        assert_eq!(toggle_alliance(&all, &[A, B], 0, 2), set(&[2, 7, 8]));
        assert_eq!(toggle_alliance(&all, &[A, B], 1, 8), set(&[1, 2, 3, 8]));
    }

    #[test]
    fn last_alliance_restores_coalition() {
        assert_eq!(toggle_alliance(&set(&[2, 7]), &[A, B], 0, 2), set(&[1, 2, 3, 7]));
    }

    #[test]
    fn removes_otherwise() {
        assert_eq!(toggle_alliance(&set(&[1, 2, 7]), &[A, B], 0, 2), set(&[1, 7]));
    }

    #[test]
    fn splits_per_coalition() {
        assert_eq!(per_coalition(&set(&[3, 1, 8]), &[A, B]), vec![vec![1, 3], vec![8]]);
    }
}
