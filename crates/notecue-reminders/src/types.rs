use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ReminderError, Result},
    recurrence::next_trigger,
};

/// Day-of-month selector for monthly reminders.
///
/// Serialises as a plain integer: `1..=31`, or `-1` for the last day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum MonthDay {
    /// A fixed day; clamped to the month's length when the month is shorter.
    Day(u8),
    /// Whatever the last day of the target month is.
    Last,
}

impl MonthDay {
    pub const LAST_SENTINEL: i32 = -1;

    /// Resolve against a month with `days_in_month` days.
    pub fn resolve(self, days_in_month: u32) -> u32 {
        match self {
            MonthDay::Day(d) => (d as u32).min(days_in_month),
            MonthDay::Last => days_in_month,
        }
    }
}

impl From<MonthDay> for i32 {
    fn from(day: MonthDay) -> i32 {
        match day {
            MonthDay::Day(d) => d as i32,
            MonthDay::Last => MonthDay::LAST_SENTINEL,
        }
    }
}

impl TryFrom<i32> for MonthDay {
    type Error = String;

    fn try_from(value: i32) -> std::result::Result<Self, Self::Error> {
        match value {
            MonthDay::LAST_SENTINEL => Ok(MonthDay::Last),
            1..=31 => Ok(MonthDay::Day(value as u8)),
            other => Err(format!(
                "day_of_month must be 1..=31 or -1 (last day), got {other}"
            )),
        }
    }
}

/// How a reminder repeats after it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "repeat_type", rename_all = "snake_case")]
pub enum RepeatRule {
    Once,
    Daily,
    /// Weekday indices, 0 = Sunday … 6 = Saturday.
    Weekly { days: Vec<u8> },
    Monthly { day: MonthDay },
}

/// Discriminant of [`RepeatRule`], as stored in the `repeat_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatType {
    Once,
    Daily,
    Weekly,
    Monthly,
}

impl std::fmt::Display for RepeatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RepeatType::Once => "once",
            RepeatType::Daily => "daily",
            RepeatType::Weekly => "weekly",
            RepeatType::Monthly => "monthly",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RepeatType {
    type Err = ReminderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "once" => Ok(RepeatType::Once),
            "daily" => Ok(RepeatType::Daily),
            "weekly" => Ok(RepeatType::Weekly),
            "monthly" => Ok(RepeatType::Monthly),
            other => Err(ReminderError::InvalidRepeatType(other.to_string())),
        }
    }
}

/// Loose, wire-shaped repeat configuration (the `repeat_config` JSON column).
///
/// Only the field matching the repeat type is consulted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<Vec<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<i32>,
}

impl RepeatRule {
    /// Build a validated rule from its stored/wire representation.
    pub fn from_parts(repeat_type: &str, config: &RepeatConfig) -> Result<Self> {
        match repeat_type.parse::<RepeatType>()? {
            RepeatType::Once => Ok(RepeatRule::Once),
            RepeatType::Daily => Ok(RepeatRule::Daily),
            RepeatType::Weekly => {
                let raw = config.days.as_deref().unwrap_or_default();
                let mut days = Vec::with_capacity(raw.len());
                for &d in raw {
                    if !(0..=6).contains(&d) {
                        return Err(ReminderError::InvalidRepeatConfig(format!(
                            "weekday must be 0..=6 (0 = Sunday), got {d}"
                        )));
                    }
                    days.push(d as u8);
                }
                let rule = RepeatRule::weekly(days);
                rule.validate()?;
                Ok(rule)
            }
            RepeatType::Monthly => {
                let raw = config.day_of_month.ok_or_else(|| {
                    ReminderError::InvalidRepeatConfig(
                        "monthly reminders require day_of_month".to_string(),
                    )
                })?;
                let day = MonthDay::try_from(raw).map_err(ReminderError::InvalidRepeatConfig)?;
                Ok(RepeatRule::Monthly { day })
            }
        }
    }

    /// Weekly rule with the weekday list sorted and de-duplicated.
    pub fn weekly(mut days: Vec<u8>) -> Self {
        days.sort_unstable();
        days.dedup();
        RepeatRule::Weekly { days }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            RepeatRule::Once | RepeatRule::Daily => Ok(()),
            RepeatRule::Weekly { days } => {
                if days.is_empty() {
                    return Err(ReminderError::InvalidRepeatConfig(
                        "weekly reminders need at least one weekday".to_string(),
                    ));
                }
                if let Some(bad) = days.iter().find(|d| **d > 6) {
                    return Err(ReminderError::InvalidRepeatConfig(format!(
                        "weekday must be 0..=6 (0 = Sunday), got {bad}"
                    )));
                }
                Ok(())
            }
            RepeatRule::Monthly { day } => match day {
                MonthDay::Day(d) if !(1..=31).contains(d) => {
                    Err(ReminderError::InvalidRepeatConfig(format!(
                        "day_of_month must be 1..=31 or -1 (last day), got {d}"
                    )))
                }
                _ => Ok(()),
            },
        }
    }

    pub fn repeat_type(&self) -> RepeatType {
        match self {
            RepeatRule::Once => RepeatType::Once,
            RepeatRule::Daily => RepeatType::Daily,
            RepeatRule::Weekly { .. } => RepeatType::Weekly,
            RepeatRule::Monthly { .. } => RepeatType::Monthly,
        }
    }

    pub fn to_config(&self) -> RepeatConfig {
        match self {
            RepeatRule::Once | RepeatRule::Daily => RepeatConfig::default(),
            RepeatRule::Weekly { days } => RepeatConfig {
                days: Some(days.iter().map(|d| *d as i32).collect()),
                day_of_month: None,
            },
            RepeatRule::Monthly { day } => RepeatConfig {
                days: None,
                day_of_month: Some((*day).into()),
            },
        }
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self, RepeatRule::Once)
    }
}

/// Scheduling state derived from enablement and `next_trigger_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderState {
    /// Enabled, fires at `next_trigger_at` in the future.
    EnabledPending,
    /// Enabled and due, waiting for a poll cycle to pick it up.
    EnabledOverdue,
    /// Excluded from scheduling.
    Disabled,
}

/// What [`Reminder::advance_after_trigger`] did to the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Recurring reminder moved to its next occurrence.
    Rescheduled(DateTime<Utc>),
    /// One-shot reminder fired and is now disabled.
    Completed,
    /// The next occurrence falls after `repeat_end_at`; disabled.
    Exhausted(DateTime<Utc>),
}

/// Input for [`Reminder::new`].
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub note_id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub scheduled_at: DateTime<Utc>,
    pub repeat: RepeatRule,
    pub repeat_end_at: Option<DateTime<Utc>>,
}

impl NewReminder {
    /// One-shot reminder with no message body.
    pub fn once(
        note_id: impl Into<String>,
        user_id: impl Into<String>,
        title: impl Into<String>,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            note_id: note_id.into(),
            user_id: user_id.into(),
            title: title.into(),
            message: String::new(),
            scheduled_at,
            repeat: RepeatRule::Once,
            repeat_end_at: None,
        }
    }
}

/// A schedulable, optionally recurring trigger attached to a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    /// UUIDv7 string — primary key.
    pub id: String,
    pub note_id: String,
    pub user_id: String,
    /// Notification title.
    pub title: String,
    /// Notification body; a default text is sent when empty.
    pub message: String,
    /// Original target instant. Its time of day anchors every recurrence.
    pub scheduled_at: DateTime<Utc>,
    pub next_trigger_at: DateTime<Utc>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    /// Number of times the reminder has fired. Never decremented.
    pub trigger_count: u32,
    pub repeat: RepeatRule,
    /// No occurrence after this instant is scheduled.
    pub repeat_end_at: Option<DateTime<Utc>>,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reminder {
    /// Create a reminder scheduled strictly after `now`.
    pub fn new(input: NewReminder, now: DateTime<Utc>) -> Result<Self> {
        if input.scheduled_at <= now {
            return Err(ReminderError::InvalidScheduleTime(format!(
                "scheduled_at {} is not after {}",
                input.scheduled_at.to_rfc3339(),
                now.to_rfc3339()
            )));
        }

        let mut reminder = Reminder {
            id: notecue_core::types::new_id(),
            note_id: input.note_id,
            user_id: input.user_id,
            title: input.title,
            message: input.message,
            scheduled_at: input.scheduled_at,
            next_trigger_at: input.scheduled_at,
            last_triggered_at: None,
            trigger_count: 0,
            repeat: RepeatRule::Once,
            repeat_end_at: None,
            is_enabled: true,
            created_at: now,
            updated_at: now,
        };
        reminder.set_repeat_rule(input.repeat, input.repeat_end_at)?;
        Ok(reminder)
    }

    /// Set the recurrence from its wire form (`"weekly"` + `{"days": [1, 3]}` …).
    pub fn set_recurrence(
        &mut self,
        repeat_type: &str,
        config: &RepeatConfig,
        end_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let rule = RepeatRule::from_parts(repeat_type, config)?;
        self.set_repeat_rule(rule, end_at)
    }

    /// Set an already-typed recurrence rule. Validates before mutating.
    pub fn set_repeat_rule(&mut self, rule: RepeatRule, end_at: Option<DateTime<Utc>>) -> Result<()> {
        rule.validate()?;
        if let Some(end) = end_at {
            if end < self.scheduled_at {
                return Err(ReminderError::InvalidRepeatConfig(format!(
                    "repeat_end_at {} is before scheduled_at {}",
                    end.to_rfc3339(),
                    self.scheduled_at.to_rfc3339()
                )));
            }
        }
        self.repeat = rule;
        self.repeat_end_at = end_at;
        Ok(())
    }

    /// Record a fire at `now` and move the schedule forward.
    ///
    /// One-shot reminders disable themselves. Recurring reminders compute
    /// their next occurrence; when it lies past `repeat_end_at` they are
    /// disabled but keep that computed `next_trigger_at` for auditing.
    pub fn advance_after_trigger(&mut self, now: DateTime<Utc>) -> AdvanceOutcome {
        self.last_triggered_at = Some(now);
        self.trigger_count = self.trigger_count.saturating_add(1);
        self.updated_at = now;

        if !self.repeat.is_recurring() {
            self.is_enabled = false;
            return AdvanceOutcome::Completed;
        }

        let next = next_trigger(&self.repeat, self.scheduled_at, now);
        self.next_trigger_at = next;

        match self.repeat_end_at {
            Some(end) if next > end => {
                self.is_enabled = false;
                AdvanceOutcome::Exhausted(next)
            }
            _ => AdvanceOutcome::Rescheduled(next),
        }
    }

    /// Defer the next fire to `now + duration`, whatever the recurrence.
    pub fn snooze(&mut self, duration: Duration, now: DateTime<Utc>) -> Result<()> {
        if duration <= Duration::zero() {
            return Err(ReminderError::InvalidSnoozeDuration(format!(
                "snooze must be positive, got {}s",
                duration.num_seconds()
            )));
        }
        self.next_trigger_at = now + duration;
        self.updated_at = now;
        Ok(())
    }

    pub fn enable(&mut self) {
        self.is_enabled = true;
    }

    pub fn disable(&mut self) {
        self.is_enabled = false;
    }

    pub fn toggle(&mut self) {
        self.is_enabled = !self.is_enabled;
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_enabled && self.next_trigger_at <= now
    }

    pub fn state(&self, now: DateTime<Utc>) -> ReminderState {
        if !self.is_enabled {
            ReminderState::Disabled
        } else if self.next_trigger_at <= now {
            ReminderState::EnabledOverdue
        } else {
            ReminderState::EnabledPending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn new_reminder(repeat: RepeatRule, scheduled_at: DateTime<Utc>) -> Reminder {
        let mut input = NewReminder::once("note-1", "user-1", "Standup", scheduled_at);
        input.repeat = repeat;
        Reminder::new(input, scheduled_at - Duration::hours(1)).unwrap()
    }

    #[test]
    fn create_initialises_schedule() {
        let when = at(2024, 1, 1, 9, 0);
        let r = new_reminder(RepeatRule::Daily, when);
        assert_eq!(r.next_trigger_at, when);
        assert!(r.is_enabled);
        assert_eq!(r.trigger_count, 0);
        assert!(r.last_triggered_at.is_none());
    }

    #[test]
    fn create_rejects_past_and_present() {
        let now = at(2024, 1, 1, 9, 0);
        let past = Reminder::new(NewReminder::once("n", "u", "t", now - Duration::minutes(1)), now);
        assert!(matches!(past, Err(ReminderError::InvalidScheduleTime(_))));
        let same = Reminder::new(NewReminder::once("n", "u", "t", now), now);
        assert!(matches!(same, Err(ReminderError::InvalidScheduleTime(_))));
    }

    #[test]
    fn set_recurrence_validates_type_and_config() {
        let mut r = new_reminder(RepeatRule::Once, at(2024, 1, 1, 9, 0));

        let err = r.set_recurrence("hourly", &RepeatConfig::default(), None).unwrap_err();
        assert!(matches!(err, ReminderError::InvalidRepeatType(_)));

        let empty = RepeatConfig { days: Some(vec![]), day_of_month: None };
        let err = r.set_recurrence("weekly", &empty, None).unwrap_err();
        assert!(matches!(err, ReminderError::InvalidRepeatConfig(_)));

        let bad_day = RepeatConfig { days: Some(vec![1, 7]), day_of_month: None };
        assert!(r.set_recurrence("weekly", &bad_day, None).is_err());

        for bad in [0, 32, -2] {
            let cfg = RepeatConfig { days: None, day_of_month: Some(bad) };
            assert!(r.set_recurrence("monthly", &cfg, None).is_err(), "day {bad}");
        }
        assert!(r.set_recurrence("monthly", &RepeatConfig::default(), None).is_err());

        // Failed calls leave the previous rule in place.
        assert_eq!(r.repeat, RepeatRule::Once);

        let ok = RepeatConfig { days: Some(vec![3, 1, 3]), day_of_month: None };
        r.set_recurrence("weekly", &ok, None).unwrap();
        assert_eq!(r.repeat, RepeatRule::Weekly { days: vec![1, 3] });

        let last = RepeatConfig { days: None, day_of_month: Some(-1) };
        r.set_recurrence("monthly", &last, None).unwrap();
        assert_eq!(r.repeat, RepeatRule::Monthly { day: MonthDay::Last });
    }

    #[test]
    fn end_before_schedule_is_rejected() {
        let when = at(2024, 1, 1, 9, 0);
        let mut r = new_reminder(RepeatRule::Once, when);
        let err = r
            .set_repeat_rule(RepeatRule::Daily, Some(when - Duration::days(1)))
            .unwrap_err();
        assert!(matches!(err, ReminderError::InvalidRepeatConfig(_)));
    }

    #[test]
    fn once_disables_after_single_advance() {
        let when = at(2024, 1, 1, 9, 0);
        let mut r = new_reminder(RepeatRule::Once, when);
        // Recurrence fields that are irrelevant to a one-shot must not matter.
        r.repeat_end_at = Some(when + Duration::days(30));

        let outcome = r.advance_after_trigger(when);
        assert_eq!(outcome, AdvanceOutcome::Completed);
        assert!(!r.is_enabled);
        assert_eq!(r.trigger_count, 1);
        assert_eq!(r.last_triggered_at, Some(when));
        assert_eq!(r.state(when), ReminderState::Disabled);
    }

    #[test]
    fn weekly_weekend_scenario() {
        // 2024-01-01 is a Monday; weekend-only reminder.
        let when = at(2024, 1, 1, 9, 0);
        let mut r = new_reminder(RepeatRule::weekly(vec![0, 6]), when);
        let outcome = r.advance_after_trigger(when);
        assert_eq!(outcome, AdvanceOutcome::Rescheduled(at(2024, 1, 6, 9, 0)));
        assert_eq!(r.next_trigger_at, at(2024, 1, 6, 9, 0));
        assert!(r.is_enabled);
    }

    #[test]
    fn recurring_past_end_is_exhausted() {
        let when = at(2024, 1, 1, 9, 0);
        let mut r = new_reminder(RepeatRule::Daily, when);
        r.set_repeat_rule(RepeatRule::Daily, Some(at(2024, 1, 1, 23, 0)))
            .unwrap();

        let outcome = r.advance_after_trigger(when);
        assert_eq!(outcome, AdvanceOutcome::Exhausted(at(2024, 1, 2, 9, 0)));
        assert!(!r.is_enabled);
        // The computed occurrence is kept for audit.
        assert_eq!(r.next_trigger_at, at(2024, 1, 2, 9, 0));
    }

    #[test]
    fn recurring_within_end_stays_enabled() {
        let when = at(2024, 1, 1, 9, 0);
        let mut r = new_reminder(RepeatRule::Daily, when);
        r.set_repeat_rule(RepeatRule::Daily, Some(at(2024, 1, 2, 9, 0)))
            .unwrap();
        assert_eq!(
            r.advance_after_trigger(when),
            AdvanceOutcome::Rescheduled(at(2024, 1, 2, 9, 0))
        );
        assert!(r.is_enabled);
    }

    #[test]
    fn snooze_defers_without_touching_counters() {
        let when = at(2024, 1, 1, 9, 0);
        let mut r = new_reminder(RepeatRule::weekly(vec![1]), when);
        r.advance_after_trigger(when);
        let now = at(2024, 1, 1, 9, 5);

        r.snooze(Duration::minutes(10), now).unwrap();
        assert_eq!(r.next_trigger_at, now + Duration::minutes(10));
        assert_eq!(r.trigger_count, 1);
        assert_eq!(r.repeat.repeat_type(), RepeatType::Weekly);
        assert!(r.is_enabled);

        assert!(r.snooze(Duration::zero(), now).is_err());
    }

    #[test]
    fn snooze_keeps_disabled_reminders_disabled() {
        let when = at(2024, 1, 1, 9, 0);
        let mut r = new_reminder(RepeatRule::Once, when);
        r.disable();
        r.snooze(Duration::minutes(5), when).unwrap();
        assert!(!r.is_enabled);
    }

    #[test]
    fn toggles_and_state() {
        let when = at(2024, 1, 1, 9, 0);
        let mut r = new_reminder(RepeatRule::Daily, when);
        assert_eq!(r.state(when - Duration::seconds(1)), ReminderState::EnabledPending);
        assert_eq!(r.state(when), ReminderState::EnabledOverdue);
        assert!(r.is_due(when));

        r.toggle();
        assert!(!r.is_enabled);
        assert!(!r.is_due(when));
        r.toggle();
        assert!(r.is_enabled);
        r.disable();
        r.disable();
        assert!(!r.is_enabled);
        r.enable();
        assert!(r.is_enabled);
    }

    #[test]
    fn rule_serialises_with_repeat_type_tag() {
        let rule = RepeatRule::Monthly { day: MonthDay::Last };
        let json = serde_json::to_string(&rule).unwrap();
        assert_eq!(json, r#"{"repeat_type":"monthly","day":-1}"#);

        let parsed: RepeatRule =
            serde_json::from_str(r#"{"repeat_type":"weekly","days":[0,6]}"#).unwrap();
        assert_eq!(parsed, RepeatRule::Weekly { days: vec![0, 6] });

        assert!(serde_json::from_str::<RepeatRule>(r#"{"repeat_type":"monthly","day":0}"#).is_err());
    }

    #[test]
    fn config_round_trips_through_rule() {
        for rule in [
            RepeatRule::Once,
            RepeatRule::Daily,
            RepeatRule::weekly(vec![2, 5]),
            RepeatRule::Monthly { day: MonthDay::Day(31) },
        ] {
            let rebuilt =
                RepeatRule::from_parts(&rule.repeat_type().to_string(), &rule.to_config()).unwrap();
            assert_eq!(rebuilt, rule);
        }
    }
}
