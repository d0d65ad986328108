use serde::{Deserialize, Serialize};

use crate::model::{BinType, HistoryItem, UnixTimeMs};

/// Recency-ordered classification history. Most recent first,
/// deduplicated by item name, evicted only by the cap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SortingHistory {
    entries: Vec<HistoryItem>,
}

impl SortingHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful classification. A duplicate item name (compared
    /// case-insensitively) moves to the front instead of creating a second
    /// entry; the list is then truncated to `cap`.
    pub fn record(&mut self, item_name: &str, bin: BinType, at: UnixTimeMs, cap: usize) {
        self.entries
            .retain(|e| !e.item_name.eq_ignore_ascii_case(item_name));
        self.entries.insert(0, HistoryItem::new(item_name, bin, at));
        self.entries.truncate(cap);
    }

    #[must_use]
    pub fn entries(&self) -> &[HistoryItem] {
        &self.entries
    }

    #[must_use]
    pub fn find(&self, id: &str) -> Option<&HistoryItem> {
        self.entries.iter().find(|e| e.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Monotonically increasing points counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsTally(u64);

impl PointsTally {
    #[must_use]
    pub const fn new(points: u64) -> Self {
        Self(points)
    }

    pub fn add(&mut self, points: u64) {
        self.0 = self.0.saturating_add(points);
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// One step of the level progression table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelThreshold {
    pub min_points: u64,
    pub label: String,
    pub icon: String,
}

impl LevelThreshold {
    #[must_use]
    pub fn new(min_points: u64, label: &str, icon: &str) -> Self {
        Self {
            min_points,
            label: label.into(),
            icon: icon.into(),
        }
    }
}

/// Derived level for a points total: the highest threshold reached, plus
/// progress toward the next one. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub label: String,
    pub icon: String,
    pub progress_pct: u8,
}

/// Step function over `table` (which must be sorted ascending by
/// `min_points` and non-empty; the `Tunables` default guarantees both).
#[must_use]
pub fn grade_for(points: u64, table: &[LevelThreshold]) -> Grade {
    let current = table
        .iter()
        .rev()
        .find(|t| points >= t.min_points)
        .or_else(|| table.first());

    let Some(current) = current else {
        return Grade {
            label: String::new(),
            icon: String::new(),
            progress_pct: 100,
        };
    };

    let next = table.iter().find(|t| t.min_points > current.min_points);

    let progress_pct = match next {
        None => 100,
        Some(next) => {
            let span = next.min_points - current.min_points;
            let into = points.saturating_sub(current.min_points).min(span);
            ((into * 100) / span.max(1)) as u8
        }
    };

    Grade {
        label: current.label.clone(),
        icon: current.icon.clone(),
        progress_pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tunables;

    const CAP: usize = 5;

    fn record(history: &mut SortingHistory, name: &str) {
        history.record(name, BinType::Yellow, UnixTimeMs(1_000), CAP);
    }

    #[test]
    fn test_history_caps_at_limit() {
        let mut history = SortingHistory::new();
        for name in ["a", "b", "c", "d", "e", "f", "g"] {
            record(&mut history, name);
        }
        assert_eq!(history.len(), CAP);
        assert_eq!(history.entries()[0].item_name, "g");
        // Oldest entries were evicted.
        assert!(history.find("a").is_none());
    }

    #[test]
    fn test_history_dedupes_by_name_moving_to_front() {
        let mut history = SortingHistory::new();
        record(&mut history, "bottle");
        record(&mut history, "carton");
        record(&mut history, "Bottle");

        assert_eq!(history.len(), 2);
        assert_eq!(history.entries()[0].item_name, "Bottle");
        assert_eq!(history.entries()[1].item_name, "carton");
    }

    #[test]
    fn test_history_survives_json_round_trip() {
        let mut history = SortingHistory::new();
        record(&mut history, "jar");
        let json = serde_json::to_string(&history).unwrap();
        let back: SortingHistory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, history);
    }

    #[test]
    fn test_points_tally_is_monotonic() {
        let mut tally = PointsTally::default();
        tally.add(10);
        tally.add(10);
        assert_eq!(tally.value(), 20);
        tally.add(u64::MAX);
        assert_eq!(tally.value(), u64::MAX);
    }

    #[test]
    fn test_grade_step_function() {
        let table = Tunables::default().levels;

        let start = grade_for(0, &table);
        assert_eq!(start.progress_pct, 0);

        let mid = grade_for(25, &table);
        assert_eq!(mid.label, start.label);
        assert_eq!(mid.progress_pct, 50);

        let top = grade_for(1_000_000, &table);
        assert_eq!(top.progress_pct, 100);
        assert_eq!(top.label, table.last().unwrap().label);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // History never exceeds the cap and never holds two entries
            // with the same item name.
            #[test]
            fn history_cap_and_uniqueness(names in proptest::collection::vec("[a-e]{1,2}", 0..40)) {
                let mut history = SortingHistory::new();
                for name in &names {
                    history.record(name, BinType::General, UnixTimeMs(0), CAP);
                }
                prop_assert!(history.len() <= CAP);
                let mut seen: Vec<String> = history
                    .entries()
                    .iter()
                    .map(|e| e.item_name.to_ascii_lowercase())
                    .collect();
                seen.sort();
                seen.dedup();
                prop_assert_eq!(seen.len(), history.len());
            }
        }
    }
}
