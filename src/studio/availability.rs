//! Open time slots for a day

use super::types::{Shoot, ShootStatus, UserId};
use chrono::{NaiveDate, NaiveTime, Timelike};

const FIRST_SLOT_HOUR: u32 = 9;
const LAST_SLOT_HOUR: u32 = 17;
const SLOT_STEP_HOURS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTime {
    pub time: NaiveTime,
    /// e.g. "9:00 AM"
    pub display: String,
}

/// Two-hourly slots from 9 AM to 5 PM minus those taken by a booked shoot
///
/// With a photographer only their shoots count; without one any shoot on the
/// day takes the slot. A blocked day has no slots.
pub fn open_slots(
    date: NaiveDate,
    photographer_id: Option<UserId>,
    shoots: &[Shoot],
    blocked: bool,
) -> Vec<SlotTime> {
    if blocked {
        return Vec::new();
    }
    let booked: Vec<(u32, u32)> = shoots
        .iter()
        .filter(|s| s.status != ShootStatus::Cancelled)
        .filter(|s| photographer_id.is_none() || s.photographer_id == photographer_id)
        .filter_map(|s| s.scheduled_at)
        .filter(|at| at.date_naive() == date)
        .map(|at| (at.hour(), at.minute()))
        .collect();

    (FIRST_SLOT_HOUR..=LAST_SLOT_HOUR)
        .step_by(SLOT_STEP_HOURS)
        .filter(|hour| !booked.contains(&(*hour, 0)))
        .filter_map(|hour| NaiveTime::from_hms_opt(hour, 0, 0))
        .map(|time| SlotTime {
            time,
            display: time.format("%-I:%M %p").to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::studio::testing::fixed_now;
    use crate::studio::{at_hour, StudioData};

    #[test]
    fn test_full_day_has_five_slots() {
        let date = fixed_now().date_naive();
        let slots = open_slots(date, None, &[], false);
        let displays: Vec<_> = slots.iter().map(|s| s.display.as_str()).collect();
        assert_eq!(
            displays,
            vec!["9:00 AM", "11:00 AM", "1:00 PM", "3:00 PM", "5:00 PM"]
        );
    }

    #[test]
    fn test_booked_slot_removed_for_that_photographer_only() {
        let data = StudioData::demo(fixed_now());
        let shoot = data.shoots.iter().find(|s| s.id == 101).unwrap().clone();
        let date = shoot.scheduled_date().unwrap();
        assert_eq!(shoot.scheduled_at, Some(at_hour(date, 11)));

        let mine = open_slots(date, Some(10), &data.shoots, false);
        assert!(!mine.iter().any(|s| s.display == "11:00 AM"));
        assert_eq!(mine.len(), 4);

        let other = open_slots(date, Some(11), &data.shoots, false);
        assert_eq!(other.len(), 5);

        let anyone = open_slots(date, None, &data.shoots, false);
        assert_eq!(anyone.len(), 4);
    }

    #[test]
    fn test_cancelled_shoot_frees_slot() {
        let mut data = StudioData::demo(fixed_now());
        let date = data.shoots[0].scheduled_date().unwrap();
        data.shoots[0].status = ShootStatus::Cancelled;
        assert_eq!(open_slots(date, Some(10), &data.shoots, false).len(), 5);
    }

    #[test]
    fn test_blocked_day_has_no_slots() {
        assert!(open_slots(fixed_now().date_naive(), Some(10), &[], true).is_empty());
    }
}
