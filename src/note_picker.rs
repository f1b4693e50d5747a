//! NotePicker, spec.md §4.A.
//!
//! Holds the confirmed, non-nullified notes for one asset and answers
//! spend-selection queries against a caller-supplied set of excluded
//! (pending/in-flight) nullifiers.

use num_bigint::BigUint;

use crate::types::{Note, NullifierSet};

/// Per-asset spendable-note index.
#[derive(Debug, Clone, Default)]
pub struct NotePicker {
    /// Ascending by value — `pick_one` and `pick` both want the smallest
    /// note(s) that clear a target, so this ordering avoids a sort per call.
    notes: Vec<Note>,
}

/// Result of [`NotePicker::get_spendable_notes`].
#[derive(Debug, Clone)]
pub struct SpendableNotes {
    pub notes: Vec<Note>,
    pub sum: BigUint,
}

impl NotePicker {
    /// Builds a picker over `notes`, silently dropping any that are
    /// already nullified — a nullified note is never spendable (spec.md
    /// §3 Note invariants).
    pub fn new(notes: impl IntoIterator<Item = Note>) -> Self {
        let mut notes: Vec<Note> = notes.into_iter().filter(|n| !n.nullified).collect();
        notes.sort_by(|a, b| a.value.cmp(&b.value));
        Self { notes }
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    fn usable(&self, excluded: &NullifierSet) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(move |n| !excluded.contains(&n.nullifier))
    }

    /// Smallest single note with `value >= target`, excluding notes whose
    /// nullifier is in `excluded`.
    pub fn pick_one(&self, target: &BigUint, excluded: &NullifierSet) -> Option<Note> {
        // `notes` is sorted ascending, so the first candidate >= target is
        // the smallest one.
        self.usable(excluded)
            .find(|n| &n.value >= target)
            .cloned()
    }

    /// Up to two notes whose sum is `>= target`. Prefers fewer notes, then
    /// the combination minimizing excess change.
    pub fn pick(&self, target: &BigUint, excluded: &NullifierSet) -> Option<(Note, Option<Note>)> {
        if let Some(n) = self.pick_one(target, excluded) {
            return Some((n, None));
        }

        let candidates: Vec<&Note> = self.usable(excluded).collect();
        if candidates.len() < 2 {
            return None;
        }

        // Two-pointer scan over the ascending list: for each note taken as
        // the larger of the pair, find the smallest earlier note that
        // completes the sum, tracking the minimum total (== minimum
        // excess, since target is fixed).
        let mut best: Option<(usize, usize, BigUint)> = None;
        for j in 1..candidates.len() {
            let high = &candidates[j].value;
            // Smallest i < j such that candidates[i].value + high >= target.
            let mut lo = 0usize;
            let mut hi = j;
            while lo < hi {
                let mid = (lo + hi) / 2;
                if &candidates[mid].value + high >= *target {
                    hi = mid;
                } else {
                    lo = mid + 1;
                }
            }
            if lo < j {
                let total = &candidates[lo].value + high;
                let better = match &best {
                    None => true,
                    Some((_, _, best_total)) => total < *best_total,
                };
                if better {
                    best = Some((lo, j, total));
                }
            }
        }

        best.map(|(i, j, _)| (candidates[i].clone(), Some(candidates[j].clone())))
    }

    /// All non-excluded notes and their sum.
    pub fn get_spendable_notes(&self, excluded: &NullifierSet) -> SpendableNotes {
        let notes: Vec<Note> = self.usable(excluded).cloned().collect();
        let sum = notes.iter().fold(BigUint::from(0u32), |acc, n| acc + &n.value);
        SpendableNotes { notes, sum }
    }

    pub fn get_spendable_sum(&self, excluded: &NullifierSet) -> BigUint {
        self.usable(excluded)
            .fold(BigUint::from(0u32), |acc, n| acc + &n.value)
    }

    /// The largest sum achievable under the two-note rule: either the
    /// single largest note or the sum of the two largest, whichever is
    /// bigger (always the latter, since values are non-negative, unless
    /// fewer than two notes are available).
    pub fn get_max_spendable_value(&self, excluded: &NullifierSet) -> BigUint {
        let mut top_two_ = [None::<&BigUint>, None::<&BigUint>];
        for n in self.usable(excluded) {
            if top_two_is_smaller(top_two_[1], &n.value) {
                top_two_[0] = top_two_[1];
                top_two_[1] = Some(&n.value);
            } else if top_two_is_smaller(top_two_[0], &n.value) {
                top_two_[0] = Some(&n.value);
            }
        }
        match (top_two_[0], top_two_[1]) {
            (Some(a), Some(b)) => a + b,
            (None, Some(b)) => b.clone(),
            _ => BigUint::from(0u32),
        }
    }

    /// Sum of all non-nullified notes ignoring exclusions — the local
    /// balance.
    pub fn get_sum(&self) -> BigUint {
        self.notes.iter().fold(BigUint::from(0u32), |acc, n| acc + &n.value)
    }
}

fn top_two_is_smaller(current: Option<&BigUint>, candidate: &BigUint) -> bool {
    match current {
        None => true,
        Some(c) => c < candidate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountId;

    fn note(value: u64) -> Note {
        Note {
            asset_id: 0,
            value: BigUint::from(value),
            commitment: [value as u8; 32],
            secret: [0u8; 32],
            nullifier: [value as u8; 32],
            nullified: false,
            owner: AccountId::new([0u8; 32], 0),
            creator_pub_key: [0u8; 32],
            input_nullifier: [0u8; 32],
            index: 0,
            allow_chain: false,
            pending: false,
        }
    }

    #[test]
    fn pick_one_returns_smallest_sufficient_note() {
        let picker = NotePicker::new(vec![note(100), note(500), note(50)]);
        let picked = picker.pick_one(&BigUint::from(80u32), &Default::default()).unwrap();
        assert_eq!(picked.value, BigUint::from(100u32));
    }

    #[test]
    fn pick_prefers_single_note_over_pair() {
        let picker = NotePicker::new(vec![note(10), note(20), note(1000)]);
        let (a, b) = picker.pick(&BigUint::from(30u32), &Default::default()).unwrap();
        assert_eq!(a.value, BigUint::from(1000u32));
        assert!(b.is_none());
    }

    #[test]
    fn pick_falls_back_to_minimal_excess_pair() {
        let picker = NotePicker::new(vec![note(10), note(20), note(30)]);
        let (a, b) = picker.pick(&BigUint::from(35u32), &Default::default()).unwrap();
        let b = b.unwrap();
        let mut vals = vec![a.value.clone(), b.value.clone()];
        vals.sort();
        assert_eq!(vals, vec![BigUint::from(10u32), BigUint::from(30u32)]);
    }

    #[test]
    fn pick_returns_none_when_unreachable() {
        let picker = NotePicker::new(vec![note(1), note(2)]);
        assert!(picker.pick(&BigUint::from(100u32), &Default::default()).is_none());
    }

    #[test]
    fn excluded_nullifiers_are_skipped() {
        let n = note(100);
        let mut excluded = NullifierSet::default();
        excluded.insert(n.nullifier);
        let picker = NotePicker::new(vec![n, note(200)]);
        let picked = picker.pick_one(&BigUint::from(50u32), &excluded).unwrap();
        assert_eq!(picked.value, BigUint::from(200u32));
    }

    #[test]
    fn nullified_notes_are_never_spendable() {
        let mut n = note(100);
        n.nullified = true;
        let picker = NotePicker::new(vec![n]);
        assert!(picker.is_empty());
    }

    #[test]
    fn get_max_spendable_value_sums_two_largest() {
        let picker = NotePicker::new(vec![note(10), note(20), note(30)]);
        assert_eq!(
            picker.get_max_spendable_value(&Default::default()),
            BigUint::from(50u32)
        );
    }

    proptest::proptest! {
        /// spec.md §8: `getSpendableSum` never exceeds `getSum` — exclusions
        /// only ever remove notes from consideration, never add value.
        #[test]
        fn spendable_sum_never_exceeds_local_balance(values in proptest::collection::vec(1u64..10_000, 0..20)) {
            let picker = NotePicker::new(values.into_iter().map(note).collect::<Vec<_>>());
            let excluded = NullifierSet::default();
            proptest::prop_assert!(picker.get_spendable_sum(&excluded) <= picker.get_sum());
        }
    }
}
