//! Timetable parsing and schedule-conflict detection.
//!
//! The portal describes a section's meeting times as free-form text such as
//! `"Thứ 2 (1-3)"` or `"T2 (1-3), T4 (6-8), phòng: A101"`. Parsing is total:
//! a fragment holding only a `phòng:` room is folded into the slot before it,
//! and fragments that do not look like a day/period spec are silently
//! skipped, so an unparseable schedule yields zero slots and therefore zero
//! conflicts.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

// Day digit 2-8 (Monday=2 .. Sunday=8) with an optional "Thứ"/"T" prefix and
// an optional "(start-end)" period range. Anchored to the fragment start so
// digits elsewhere (room numbers, codes) are never read as days.
static SLOT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:thứ|t)?\s*([2-8])\b\s*(?:\(\s*(\d{1,2})\s*-\s*(\d{1,2})\s*\))?").unwrap()
});

static ROOM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)phòng\s*:\s*([^\s,;]+)").unwrap());

/// A single meeting block: one day of the week plus an inclusive period range.
///
/// Days follow the local academic convention: Monday=2 through Sunday=8.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
    pub day: u8,
    pub start_period: u32,
    pub end_period: u32,
    pub room: Option<String>,
}

/// A class schedule parsed from its raw portal text.
///
/// Transient: built fresh for every conflict check, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedSchedule {
    pub class_code: String,
    pub course_name: String,
    pub slots: Vec<TimeSlot>,
    pub raw: String,
}

impl ParsedSchedule {
    /// Parses the raw schedule text of a class into structured slots.
    pub fn from_text(class_code: &str, course_name: &str, raw: &str) -> Self {
        Self {
            class_code: class_code.to_string(),
            course_name: course_name.to_string(),
            slots: parse_schedule_string(raw),
            raw: raw.to_string(),
        }
    }
}

/// One overlapping slot pair: the shared day and the overlapping periods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictGroup {
    pub day: u8,
    pub periods: Vec<u32>,
}

/// A conflict between two class schedules.
///
/// One [`ConflictGroup`] is emitted per conflicting slot pair; groups sharing
/// a day are intentionally not merged or deduplicated.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleConflict {
    pub first_class: String,
    pub second_class: String,
    pub groups: Vec<ConflictGroup>,
}

/// Parses free-form schedule text into time slots.
///
/// The text is split on commas/semicolons into independent fragments. Each
/// fragment must start with a day digit (2-8), optionally prefixed by "Thứ"
/// or "T", optionally followed by a parenthesized `start-end` period range.
/// A missing range defaults to period 1 only. A `phòng: X` token in the
/// fragment becomes the slot's room; a fragment carrying only a room names
/// the location of the slot before it. Anything else produces no slot rather
/// than an error.
pub fn parse_schedule_string(text: &str) -> Vec<TimeSlot> {
    let mut slots: Vec<TimeSlot> = Vec::new();
    for fragment in text.split([',', ';']) {
        let fragment = fragment.trim();
        let room = ROOM_REGEX.captures(fragment).map(|c| c[1].to_string());
        let Some(caps) = SLOT_REGEX.captures(fragment) else {
            if let (Some(room), Some(last)) = (room, slots.last_mut()) {
                last.room.get_or_insert(room);
            }
            continue;
        };
        let Ok(day) = caps[1].parse() else { continue };
        let start: u32 = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(1);
        let end: u32 = caps
            .get(3)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(start);
        slots.push(TimeSlot {
            day,
            start_period: start,
            end_period: end,
            room,
        });
    }
    slots
}

/// Returns true iff the two slots share a day and their inclusive period
/// ranges overlap.
pub fn time_slots_conflict(a: &TimeSlot, b: &TimeSlot) -> bool {
    a.day == b.day && !(a.end_period < b.start_period || b.end_period < a.start_period)
}

/// Returns the periods shared by both slots, in ascending order.
///
/// Empty when the slots are on different days or do not overlap.
pub fn conflicting_periods(a: &TimeSlot, b: &TimeSlot) -> Vec<u32> {
    if a.day != b.day {
        return Vec::new();
    }
    let start = a.start_period.max(b.start_period);
    let end = a.end_period.min(b.end_period);
    (start..=end).collect()
}

/// Cartesian-compares every slot pair across the two schedules.
///
/// Returns `None` when no slot pair conflicts, otherwise a conflict record
/// with one group per conflicting pair.
pub fn schedules_conflict(s1: &ParsedSchedule, s2: &ParsedSchedule) -> Option<ScheduleConflict> {
    let mut groups = Vec::new();
    for a in &s1.slots {
        for b in &s2.slots {
            if time_slots_conflict(a, b) {
                groups.push(ConflictGroup {
                    day: a.day,
                    periods: conflicting_periods(a, b),
                });
            }
        }
    }
    if groups.is_empty() {
        None
    } else {
        Some(ScheduleConflict {
            first_class: s1.class_code.clone(),
            second_class: s2.class_code.clone(),
            groups,
        })
    }
}

/// Checks a candidate schedule against every existing schedule.
///
/// Returns one conflict record per existing schedule that overlaps the
/// candidate, preserving the input order of `existing`.
pub fn find_schedule_conflicts(
    candidate: &ParsedSchedule,
    existing: &[ParsedSchedule],
) -> Vec<ScheduleConflict> {
    existing
        .iter()
        .filter_map(|other| schedules_conflict(candidate, other))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(day: u8, start: u32, end: u32) -> TimeSlot {
        TimeSlot {
            day,
            start_period: start,
            end_period: end,
            room: None,
        }
    }

    #[test]
    fn test_parse_full_prefix() {
        let slots = parse_schedule_string("Thứ 2 (1-3)");
        assert_eq!(slots, vec![slot(2, 1, 3)]);
    }

    #[test]
    fn test_parse_short_prefix_multiple_fragments() {
        let slots = parse_schedule_string("T2 (1-3), T4 (6-8)");
        assert_eq!(slots, vec![slot(2, 1, 3), slot(4, 6, 8)]);
    }

    #[test]
    fn test_parse_bare_day_digit() {
        let slots = parse_schedule_string("2 (1-3)");
        assert_eq!(slots, vec![slot(2, 1, 3)]);
    }

    #[test]
    fn test_parse_missing_range_defaults_to_first_period() {
        let slots = parse_schedule_string("Thứ 5");
        assert_eq!(slots, vec![slot(5, 1, 1)]);
    }

    #[test]
    fn test_parse_empty_string() {
        assert!(parse_schedule_string("").is_empty());
    }

    #[test]
    fn test_parse_garbage_is_skipped() {
        assert!(parse_schedule_string("online only").is_empty());
        // One malformed fragment does not poison the rest.
        let slots = parse_schedule_string("xxx, T3 (4-6)");
        assert_eq!(slots, vec![slot(3, 4, 6)]);
    }

    #[test]
    fn test_parse_room_token() {
        let slots = parse_schedule_string("Thứ 2 (1-3) phòng: A101");
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].room.as_deref(), Some("A101"));
    }

    #[test]
    fn test_room_only_fragment_attaches_to_preceding_slot() {
        // The digit in the room number must not become a day of its own.
        let slots = parse_schedule_string("T2 (1-3), T4 (6-8), phòng: B205");
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0], slot(2, 1, 3));
        assert_eq!(slots[1].day, 4);
        assert_eq!(slots[1].room.as_deref(), Some("B205"));
    }

    #[test]
    fn test_room_without_any_slot_is_dropped() {
        assert!(parse_schedule_string("phòng: B205").is_empty());
        // No phantom Monday slot, so nothing to conflict with.
        let candidate = ParsedSchedule::from_text("NEW", "New", "phòng: 304");
        let existing = vec![ParsedSchedule::from_text("X", "X", "Thứ 2 (1-2)")];
        assert!(find_schedule_conflicts(&candidate, &existing).is_empty());
    }

    #[test]
    fn test_day_digit_must_lead_the_fragment() {
        // Digits buried in arbitrary text are not day specs.
        assert!(parse_schedule_string("nhóm 2").is_empty());
        assert!(parse_schedule_string("LT-304").is_empty());
    }

    #[test]
    fn test_different_days_never_conflict() {
        for a in 2..=8u8 {
            for b in 2..=8u8 {
                if a != b {
                    assert!(!time_slots_conflict(&slot(a, 1, 12), &slot(b, 1, 12)));
                }
            }
        }
    }

    #[test]
    fn test_disjoint_ranges_do_not_conflict() {
        assert!(!time_slots_conflict(&slot(2, 1, 3), &slot(2, 4, 6)));
        assert!(!time_slots_conflict(&slot(2, 7, 9), &slot(2, 4, 6)));
    }

    #[test]
    fn test_overlapping_ranges_conflict() {
        assert!(time_slots_conflict(&slot(2, 1, 3), &slot(2, 3, 5)));
        assert!(time_slots_conflict(&slot(2, 2, 8), &slot(2, 4, 5)));
        // Inclusive boundary: slot touching at a shared period overlaps.
        assert!(time_slots_conflict(&slot(2, 1, 1), &slot(2, 1, 1)));
    }

    #[test]
    fn test_conflicting_periods_exact_range() {
        assert_eq!(conflicting_periods(&slot(2, 1, 5), &slot(2, 3, 8)), vec![3, 4, 5]);
        assert_eq!(conflicting_periods(&slot(2, 1, 3), &slot(3, 1, 3)), Vec::<u32>::new());
        assert_eq!(conflicting_periods(&slot(2, 1, 3), &slot(2, 4, 6)), Vec::<u32>::new());
    }

    #[test]
    fn test_schedules_conflict_none() {
        let s1 = ParsedSchedule::from_text("CSE101.1", "Intro", "T2 (1-3)");
        let s2 = ParsedSchedule::from_text("CSE102.1", "Data", "T2 (4-6), T5 (1-3)");
        assert!(schedules_conflict(&s1, &s2).is_none());
    }

    #[test]
    fn test_schedules_conflict_one_group_per_pair() {
        // Two slots of s1 overlap the same slot of s2 on the same day: two
        // groups, not merged.
        let s1 = ParsedSchedule::from_text("A", "A", "T2 (1-3), T2 (5-6)");
        let s2 = ParsedSchedule::from_text("B", "B", "T2 (2-5)");
        let conflict = schedules_conflict(&s1, &s2).unwrap();
        assert_eq!(conflict.first_class, "A");
        assert_eq!(conflict.second_class, "B");
        assert_eq!(
            conflict.groups,
            vec![
                ConflictGroup { day: 2, periods: vec![2, 3] },
                ConflictGroup { day: 2, periods: vec![5] },
            ]
        );
    }

    #[test]
    fn test_find_schedule_conflicts_preserves_input_order() {
        let candidate = ParsedSchedule::from_text("NEW", "New", "T3 (1-4)");
        let existing = vec![
            ParsedSchedule::from_text("X", "X", "T3 (3-6)"),
            ParsedSchedule::from_text("Y", "Y", "T5 (1-4)"),
            ParsedSchedule::from_text("Z", "Z", "T3 (4-5)"),
        ];
        let conflicts = find_schedule_conflicts(&candidate, &existing);
        assert_eq!(conflicts.len(), 2);
        assert_eq!(conflicts[0].second_class, "X");
        assert_eq!(conflicts[1].second_class, "Z");
    }

    #[test]
    fn test_unparseable_schedule_is_conflict_free() {
        // Known edge case: a class whose schedule text cannot be parsed has
        // zero slots and is treated as conflict-free.
        let candidate = ParsedSchedule::from_text("NEW", "New", "TBA");
        let existing = vec![ParsedSchedule::from_text("X", "X", "T2 (1-12)")];
        assert!(find_schedule_conflicts(&candidate, &existing).is_empty());
    }
}
