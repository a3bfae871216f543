//! Voice partitioning: grouping P parts into N merged voices

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VoxmergeError};
use crate::score::{Event, Part, Score};

// ============================================================================
// Partition type
// ============================================================================

/// An unordered grouping of part indices into non-empty voices.
///
/// Always stored in canonical form: indices ascending within a group, groups
/// ordered by their smallest index. Two partitions inducing the same
/// set-of-sets therefore compare equal regardless of how they were labelled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoicePartition {
    groups: Vec<Vec<usize>>,
}

impl VoicePartition {
    /// Canonicalize an arbitrary grouping. Empty groups and repeated indices
    /// are discarded.
    pub fn from_groups(groups: Vec<Vec<usize>>) -> Self {
        let mut groups: Vec<Vec<usize>> = groups
            .into_iter()
            .map(|mut g| {
                g.sort_unstable();
                g.dedup();
                g
            })
            .filter(|g| !g.is_empty())
            .collect();
        groups.sort();
        Self { groups }
    }

    /// Build from a part-index to group-label mapping. Labels are arbitrary.
    pub fn from_assignment(assignment: &[usize]) -> Self {
        let labels = assignment.iter().copied().max().map_or(0, |m| m + 1);
        let mut groups = vec![Vec::new(); labels];
        for (part, label) in assignment.iter().enumerate() {
            groups[*label].push(part);
        }
        Self::from_groups(groups)
    }

    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    pub fn voice_count(&self) -> usize {
        self.groups.len()
    }

    pub fn part_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// Stable, filename-safe identifier such as `0.1_2_3`
    pub fn id(&self) -> String {
        self.groups
            .iter()
            .map(|g| g.iter().map(usize::to_string).collect::<Vec<_>>().join("."))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Build one output score whose parts are the merged groups.
    ///
    /// Each voice holds the union of its members' events, stably ordered by
    /// start time; tags are taken from the group's first part.
    pub fn merge(&self, score: &Score) -> Score {
        let parts = self.groups
            .iter()
            .filter_map(|members| merge_parts(score, members))
            .collect();
        score.with_parts(parts)
    }
}

impl fmt::Display for VoicePartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.groups)
    }
}

fn merge_parts(score: &Score, members: &[usize]) -> Option<Part> {
    let first = score.parts.get(*members.first()?)?;
    let sources: Vec<&Part> = members.iter().filter_map(|i| score.parts.get(*i)).collect();
    let name = sources.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(" + ");
    let events: Vec<Event> = sources.iter().flat_map(|p| p.events().iter().copied()).collect();
    Some(Part::new(name, first.instrument.clone(), first.clef).with_events(events))
}

// ============================================================================
// Counting and exhaustive enumeration
// ============================================================================

/// Stirling number of the second kind S(p, n), saturating at `u128::MAX`
pub fn stirling2(parts: usize, voices: usize) -> u128 {
    if voices > parts {
        return 0;
    }
    // row[k] = S(i, k) for the current i
    let mut row = vec![0u128; voices + 1];
    row[0] = 1;
    for i in 1..=parts {
        for k in (1..=voices.min(i)).rev() {
            row[k] = (k as u128).saturating_mul(row[k]).saturating_add(row[k - 1]);
        }
        row[0] = 0;
    }
    row[voices]
}

fn check_counts(parts: usize, voices: usize) -> Result<()> {
    if voices == 0 {
        return Err(VoxmergeError::Configuration("voice count must be at least 1".into()));
    }
    if voices > parts {
        return Err(VoxmergeError::InvalidVoiceCount { voices, parts });
    }
    Ok(())
}

/// Every partition of `parts` indices into exactly `voices` groups, in
/// canonical ascending order.
///
/// Generated as restricted growth strings, then keyed by their canonical
/// set-of-sets so label permutations can never appear twice.
pub fn enumerate_partitions(parts: usize, voices: usize) -> Result<Vec<VoicePartition>> {
    check_counts(parts, voices)?;

    let mut found = BTreeSet::new();
    let mut labels = vec![0usize; parts];
    grow(&mut labels, 1, 1, voices, &mut found);
    Ok(found.into_iter().collect())
}

fn grow(
    labels: &mut [usize],
    index: usize,
    used: usize,
    voices: usize,
    found: &mut BTreeSet<VoicePartition>,
) {
    if index == labels.len() {
        if used == voices {
            found.insert(VoicePartition::from_assignment(labels));
        }
        return;
    }
    // Not enough parts left to open the missing groups
    if voices - used > labels.len() - index {
        return;
    }
    let max_label = used.min(voices - 1);
    for label in 0..=max_label {
        labels[index] = label;
        grow(labels, index + 1, used.max(label + 1), voices, found);
    }
}

// ============================================================================
// Bounded sampling
// ============================================================================

/// Per-voice share of alternative groupings to keep, each in (0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceDistribution(Vec<f64>);

impl VoiceDistribution {
    pub fn new(fractions: Vec<f64>) -> Result<Self> {
        if fractions.is_empty() {
            return Err(VoxmergeError::Configuration("voice distribution is empty".into()));
        }
        if let Some(bad) = fractions.iter().find(|f| !(f.is_finite() && **f > 0.0 && **f <= 1.0)) {
            return Err(VoxmergeError::Configuration(format!(
                "voice distribution value {bad} must be greater than 0.0 and at most 1.0"
            )));
        }
        Ok(Self(fractions))
    }

    /// Keep everything for every voice
    pub fn exhaustive(voices: usize) -> Self {
        Self(vec![1.0; voices])
    }

    pub fn fractions(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `ceil(fraction * candidates)`, at least one for a positive fraction and
/// never more than `candidates`
pub fn retained_count(candidates: u128, fraction: f64) -> u128 {
    if candidates == 0 || fraction.is_nan() || fraction <= 0.0 {
        return 0;
    }
    if fraction >= 1.0 {
        return candidates;
    }
    // Small slack so 0.1 * 10 does not round up to 2
    let raw = (fraction * candidates as f64 - 1e-9).ceil().max(1.0);
    (raw as u128).min(candidates)
}

/// Deterministic selection: the lexicographically smallest
/// `ceil(fraction * C)` distinct candidates.
pub fn sample_candidates<T: Ord + Clone>(candidates: &[T], fraction: f64) -> Vec<T> {
    let mut sorted = candidates.to_vec();
    sorted.sort();
    sorted.dedup();
    let keep = retained_count(sorted.len() as u128, fraction);
    sorted.truncate(usize::try_from(keep).unwrap_or(usize::MAX));
    sorted
}

/// `n choose k`, saturating at `u128::MAX`
fn binomial(n: usize, k: usize) -> u128 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut result: u128 = 1;
    for i in 0..k {
        // Exact at every step: the running value is C(n, i + 1)
        result = match result.checked_mul((n - i) as u128) {
            Some(v) => v / (i as u128 + 1),
            None => return u128::MAX,
        };
    }
    result
}

/// Subsets of `pool` elements holding at most `budget` of them
fn subsets_up_to(pool: usize, budget: usize) -> u128 {
    (0..=budget.min(pool)).fold(0u128, |acc, j| acc.saturating_add(binomial(pool, j)))
}

/// Groups able to fill the next of `slots_left` slots from `remaining` parts:
/// the smallest remaining index plus any subset of the others that still
/// leaves one part per later slot. The last slot takes everything.
fn candidate_count(remaining: usize, slots_left: usize) -> u128 {
    if slots_left <= 1 {
        return 1;
    }
    subsets_up_to(remaining - 1, remaining - slots_left)
}

/// How many of the first `keep` groups (in lexicographic order) add each
/// number of extra members, for a pool of `pool` extras and at most
/// `max_extra` of them. Whole subtrees are counted rather than visited.
fn leading_sizes(pool: usize, max_extra: usize, mut keep: u128) -> Vec<u128> {
    let mut sizes = vec![0u128; max_extra + 1];
    let mut depth = 0;
    let mut from = 0;
    while keep > 0 {
        sizes[depth] += 1;
        keep -= 1;
        if depth == max_extra {
            break;
        }
        let mut descended = false;
        for next in from..pool {
            if keep == 0 {
                break;
            }
            let after = pool - next - 1;
            let budget = max_extra - depth - 1;
            let subtree = subsets_up_to(after, budget);
            if subtree <= keep {
                for j in 0..=budget.min(after) {
                    sizes[depth + 1 + j] = sizes[depth + 1 + j].saturating_add(binomial(after, j));
                }
                keep -= subtree;
            } else {
                depth += 1;
                from = next + 1;
                descended = true;
                break;
            }
        }
        if !descended {
            break;
        }
    }
    sizes
}

/// The retained groups for one voice slot, produced lazily in lexicographic
/// order and never more than the slot keeps.
#[derive(Debug)]
struct SlotGroups {
    remaining: Vec<usize>,
    /// Positions in `remaining` of the members after the first
    extra: Vec<usize>,
    max_extra: usize,
    left: u128,
    whole: bool,
    started: bool,
}

impl SlotGroups {
    fn new(remaining: Vec<usize>, slots_left: usize, fraction: f64) -> Self {
        let whole = slots_left <= 1;
        let left = if whole {
            1
        } else {
            retained_count(candidate_count(remaining.len(), slots_left), fraction)
        };
        let max_extra = remaining.len().saturating_sub(slots_left.max(1));
        Self {
            remaining,
            extra: Vec::new(),
            max_extra,
            left,
            whole,
            started: false,
        }
    }

    /// Step to the next subset in lexicographic preorder
    fn advance(&mut self) -> bool {
        let pool = self.remaining.len();
        let next = self.extra.last().map_or(1, |i| i + 1);
        if self.extra.len() < self.max_extra && next < pool {
            self.extra.push(next);
            return true;
        }
        while let Some(i) = self.extra.pop() {
            if i + 1 < pool {
                self.extra.push(i + 1);
                return true;
            }
        }
        false
    }
}

impl Iterator for SlotGroups {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.left == 0 || self.remaining.is_empty() {
            return None;
        }
        if self.whole {
            self.left = 0;
            return Some(self.remaining.clone());
        }
        if self.started {
            if !self.advance() {
                self.left = 0;
                return None;
            }
        } else {
            self.started = true;
        }
        self.left -= 1;
        let mut group = Vec::with_capacity(self.extra.len() + 1);
        group.push(self.remaining[0]);
        group.extend(self.extra.iter().map(|i| self.remaining[*i]));
        Some(group)
    }
}

/// Sampled partitions, generated depth first in canonical order.
///
/// Every partial partition keeps, for its next voice slot, the
/// lexicographically smallest `ceil(fraction * C)` of its `C` candidate
/// groups. Only one path of partial partitions is held at a time.
#[derive(Debug)]
pub struct SampledPartitions {
    fractions: Vec<f64>,
    frames: Vec<SlotGroups>,
    chosen: Vec<Vec<usize>>,
}

impl SampledPartitions {
    /// Callers have already checked the part and voice counts
    pub(crate) fn new(parts: usize, distribution: &VoiceDistribution) -> Self {
        let fractions = distribution.fractions().to_vec();
        let frames = match fractions.first() {
            Some(first) => vec![SlotGroups::new((0..parts).collect(), fractions.len(), *first)],
            None => Vec::new(),
        };
        Self {
            fractions,
            frames,
            chosen: Vec::new(),
        }
    }
}

impl Iterator for SampledPartitions {
    type Item = VoicePartition;

    fn next(&mut self) -> Option<VoicePartition> {
        loop {
            let slot = self.frames.len().checked_sub(1)?;
            let Some(group) = self.frames[slot].next() else {
                self.frames.pop();
                self.chosen.pop();
                continue;
            };
            if slot + 1 == self.fractions.len() {
                let mut groups = self.chosen.clone();
                groups.push(group);
                // Each group holds the smallest index left, so this is canonical
                return Some(VoicePartition { groups });
            }
            let remaining: Vec<usize> = self.frames[slot]
                .remaining
                .iter()
                .copied()
                .filter(|idx| group.binary_search(idx).is_err())
                .collect();
            let slots_left = self.fractions.len() - slot - 1;
            self.frames.push(SlotGroups::new(remaining, slots_left, self.fractions[slot + 1]));
            self.chosen.push(group);
        }
    }
}

/// Partitions of `parts` indices into `distribution.len()` voices, pruned
/// voice slot by voice slot and produced lazily.
///
/// With every fraction at 1.0 this yields exactly [`enumerate_partitions`].
pub fn sampled_partitions(parts: usize, distribution: &VoiceDistribution) -> Result<SampledPartitions> {
    check_counts(parts, distribution.len())?;
    Ok(SampledPartitions::new(parts, distribution))
}

/// Number of partitions [`sampled_partitions`] yields, without generating
/// them. Saturates at `u128::MAX`.
pub fn sampled_partition_count(parts: usize, distribution: &VoiceDistribution) -> Result<u128> {
    check_counts(parts, distribution.len())?;
    let mut memo = HashMap::new();
    Ok(count_from(parts, 0, distribution.fractions(), &mut memo))
}

fn count_from(
    remaining: usize,
    slot: usize,
    fractions: &[f64],
    memo: &mut HashMap<(usize, usize), u128>,
) -> u128 {
    let slots_left = fractions.len() - slot;
    if slots_left <= 1 {
        return 1;
    }
    if let Some(count) = memo.get(&(remaining, slot)) {
        return *count;
    }
    let keep = retained_count(candidate_count(remaining, slots_left), fractions[slot]);
    let sizes = leading_sizes(remaining - 1, remaining - slots_left, keep);
    let mut total: u128 = 0;
    for (extra, groups) in sizes.into_iter().enumerate() {
        if groups == 0 {
            continue;
        }
        let below = count_from(remaining - 1 - extra, slot + 1, fractions, memo);
        total = total.saturating_add(groups.saturating_mul(below));
    }
    debug!(
        "Voice slot {}: {} part(s) left, {} group(s) kept, {} partition(s) below",
        slot, remaining, keep, total
    );
    memo.insert((remaining, slot), total);
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{Clef, Instrument};
    use crate::time::Time;

    fn four_part_score() -> Score {
        let parts = (0..4u8)
            .map(|i| {
                let events = (0..=i)
                    .map(|k| {
                        Event::new(60 + i, Time::from_quarters(k as u64), Time::from_quarters(1), 80)
                    })
                    .collect();
                Part::new(format!("part{i}"), Instrument::default(), Clef::Treble).with_events(events)
            })
            .collect();
        Score::new(parts)
    }

    fn sorted_events(events: impl Iterator<Item = Event>) -> Vec<(u8, Time, Time, u8)> {
        let mut v: Vec<_> = events.map(|e| (e.pitch(), e.start(), e.duration(), e.velocity())).collect();
        v.sort();
        v
    }

    #[test]
    fn test_stirling_numbers() {
        assert_eq!(stirling2(4, 2), 7);
        assert_eq!(stirling2(5, 3), 25);
        assert_eq!(stirling2(6, 6), 1);
        assert_eq!(stirling2(3, 4), 0);
        assert_eq!(stirling2(10, 5), 42525);
    }

    #[test]
    fn test_four_into_two_is_complete() {
        let partitions = enumerate_partitions(4, 2).unwrap();
        assert_eq!(partitions.len(), 7);
        let unique: BTreeSet<_> = partitions.iter().cloned().collect();
        assert_eq!(unique.len(), 7);
        assert!(partitions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(partitions[0].groups(), &[vec![0], vec![1, 2, 3]]);
    }

    #[test]
    fn test_enumeration_matches_stirling() {
        for p in 1..=7 {
            for n in 1..=p {
                let partitions = enumerate_partitions(p, n).unwrap();
                assert_eq!(partitions.len() as u128, stirling2(p, n), "S({p}, {n})");
                assert!(partitions.iter().all(|x| x.voice_count() == n && x.part_count() == p));
            }
        }
    }

    #[test]
    fn test_labels_are_irrelevant() {
        let a = VoicePartition::from_assignment(&[0, 0, 1, 1]);
        let b = VoicePartition::from_assignment(&[1, 1, 0, 0]);
        let c = VoicePartition::from_groups(vec![vec![3, 2], vec![1, 0]]);
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.id(), "0.1_2.3");
    }

    #[test]
    fn test_full_distribution_is_exhaustive() {
        for p in 1..=6 {
            for n in 1..=p {
                let sampled: Vec<_> = sampled_partitions(p, &VoiceDistribution::exhaustive(n)).unwrap().collect();
                assert_eq!(sampled, enumerate_partitions(p, n).unwrap());
            }
        }
    }

    #[test]
    fn test_half_distribution_is_reduced_and_stable() {
        let dist = VoiceDistribution::new(vec![0.5, 1.0]).unwrap();
        let first: Vec<_> = sampled_partitions(4, &dist).unwrap().collect();
        let second: Vec<_> = sampled_partitions(4, &dist).unwrap().collect();
        assert_eq!(first, second);
        // Seven candidates for the first voice, ceil(3.5) survive
        assert_eq!(first.len(), 4);
        let groups: Vec<&[usize]> = first.iter().map(|p| p.groups()[0].as_slice()).collect();
        assert_eq!(groups, vec![&[0][..], &[0, 1], &[0, 1, 2], &[0, 1, 3]]);
        assert_eq!(sampled_partition_count(4, &dist).unwrap(), 4);
    }

    #[test]
    fn test_sampling_never_empties() {
        // 120 first-voice candidates keep 2; every later slot keeps 1
        let dist = VoiceDistribution::new(vec![0.01, 0.01, 0.01]).unwrap();
        let partitions: Vec<_> = sampled_partitions(8, &dist).unwrap().collect();
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].groups(), &[vec![0], vec![1], vec![2, 3, 4, 5, 6, 7]]);
        assert_eq!(partitions[1].groups(), &[vec![0, 1], vec![2], vec![3, 4, 5, 6, 7]]);
    }

    /// Every group able to fill the next slot, built the slow way
    fn all_slot_groups(remaining: &[usize], slots_left: usize) -> Vec<Vec<usize>> {
        if slots_left <= 1 {
            return vec![remaining.to_vec()];
        }
        let rest = &remaining[1..];
        let max_extra = remaining.len() - slots_left;
        (0u32..1 << rest.len())
            .filter(|mask| mask.count_ones() as usize <= max_extra)
            .map(|mask| {
                let mut group = vec![remaining[0]];
                group.extend(rest.iter().enumerate().filter(|(i, _)| mask & (1 << i) != 0).map(|(_, v)| *v));
                group
            })
            .collect()
    }

    #[test]
    fn test_lazy_groups_match_selection_rule() {
        for m in 1..=8usize {
            let remaining: Vec<usize> = (0..m).map(|i| i * 2 + 1).collect();
            for slots_left in 1..=m {
                let all = all_slot_groups(&remaining, slots_left);
                assert_eq!(candidate_count(m, slots_left), all.len() as u128);
                for fraction in [0.05, 0.2, 0.35, 0.5, 0.9, 1.0] {
                    let lazy: Vec<_> = SlotGroups::new(remaining.clone(), slots_left, fraction).collect();
                    assert_eq!(lazy, sample_candidates(&all, fraction), "m={m} slots={slots_left} f={fraction}");
                }
            }
        }
    }

    #[test]
    fn test_count_matches_generation() {
        let fractions = [0.3, 0.6, 0.5, 1.0];
        for p in 1..=9 {
            for n in 1..=p.min(4) {
                let dist = VoiceDistribution::new(fractions[..n].to_vec()).unwrap();
                let generated: Vec<_> = sampled_partitions(p, &dist).unwrap().collect();
                assert_eq!(sampled_partition_count(p, &dist).unwrap(), generated.len() as u128);
                assert!(generated.windows(2).all(|w| w[0] < w[1]));
                assert!(generated.iter().all(|x| x.voice_count() == n && x.part_count() == p));
            }
        }
        assert_eq!(
            sampled_partition_count(7, &VoiceDistribution::exhaustive(3)).unwrap(),
            stirling2(7, 3)
        );
    }

    #[test]
    fn test_wide_score_stays_bounded() {
        let dist = VoiceDistribution::new(vec![0.1, 0.2, 0.3, 0.2, 0.2]).unwrap();
        let count = sampled_partition_count(24, &dist).unwrap();
        assert!(count > 0);
        assert!(count < stirling2(24, 5));

        let leading: Vec<_> = sampled_partitions(24, &dist).unwrap().take(500).collect();
        assert_eq!(leading.len(), 500);
        assert!(leading.windows(2).all(|w| w[0] < w[1]));
        assert!(leading.iter().all(|x| x.voice_count() == 5 && x.part_count() == 24));
    }

    #[test]
    fn test_sample_candidates() {
        let c = vec![5, 3, 3, 1, 4];
        assert_eq!(sample_candidates(&c, 1.0), vec![1, 3, 4, 5]);
        assert_eq!(sample_candidates(&c, 0.5), vec![1, 3]);
        assert_eq!(sample_candidates(&c, 0.3), vec![1, 3]);
        assert!(sample_candidates(&c, 0.0).is_empty());
        assert_eq!(retained_count(10, 0.1), 1);
        assert_eq!(retained_count(1000, 1e-12), 1);
        assert_eq!(binomial(23, 11), 1_352_078);
        assert_eq!(binomial(200, 100), u128::MAX);
    }

    #[test]
    fn test_rejects_bad_counts() {
        assert!(matches!(
            enumerate_partitions(3, 4),
            Err(VoxmergeError::InvalidVoiceCount { voices: 4, parts: 3 })
        ));
        assert!(matches!(enumerate_partitions(3, 0), Err(VoxmergeError::Configuration(_))));
        assert!(VoiceDistribution::new(vec![0.0, 1.0]).is_err());
        assert!(VoiceDistribution::new(vec![1.5]).is_err());
    }

    #[test]
    fn test_merge_preserves_events() {
        let score = four_part_score();
        let original = sorted_events(score.events().copied());
        for partition in enumerate_partitions(4, 2).unwrap() {
            let merged = partition.merge(&score);
            assert_eq!(merged.parts.len(), 2);
            assert_eq!(sorted_events(merged.events().copied()), original);
            for part in &merged.parts {
                assert!(part.events().windows(2).all(|w| w[0].start() <= w[1].start()));
            }
        }
    }

    #[test]
    fn test_merge_names_and_order() {
        let score = four_part_score();
        let merged = VoicePartition::from_groups(vec![vec![0, 3], vec![1, 2]]).merge(&score);
        assert_eq!(merged.parts[0].name, "part0 + part3");
        // part0 has one event at 0, part3 has four starting at 0: stable order keeps part0 first
        let first = merged.parts[0].events()[0];
        assert_eq!(first.pitch(), 60);
        assert_eq!(merged.parts[0].note_count(), 5);
    }
}
