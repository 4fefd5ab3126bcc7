//! Calendar bucketing in Korea Standard Time.
//!
//! - week view: 5 days starting today (KST), today's past events hidden
//! - overview: 21 days starting right after the week view, top 3 by volume per day
//! - day drill-down: every event expiring on a given KST date

use std::collections::HashMap;

use chrono::{DateTime, Days, NaiveDate, Timelike, Utc};
use chrono_tz::Asia::Seoul;
use serde::{Deserialize, Serialize};

use crate::event::MarketEvent;
use crate::filters::parse_end_date;

pub const WEEK_VIEW_DAYS: u64 = 5;
pub const OVERVIEW_DAYS: u64 = 21;
pub const OVERVIEW_TOP_EVENTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Dawn,
    Day,
    Night,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbabilityBand {
    Low,
    Mid,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayBucket {
    pub date_key: String,
    pub is_today: bool,
    pub events: Vec<MarketEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewDay {
    pub date_key: String,
    pub is_today: bool,
    pub event_count: usize,
    pub top_events: Vec<MarketEvent>,
}

impl OverviewDay {
    pub fn hidden_count(&self) -> usize {
        self.event_count.saturating_sub(self.top_events.len())
    }
}

pub fn kst_date(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&Seoul).date_naive()
}

pub fn kst_date_key(end_date: &str) -> Option<String> {
    parse_end_date(end_date).map(|dt| date_key(kst_date(dt)))
}

pub fn kst_time_label(end_date: &str) -> Option<String> {
    parse_end_date(end_date).map(|dt| dt.with_timezone(&Seoul).format("%H:%M").to_string())
}

pub fn time_of_day(end_date: &str) -> Option<TimeOfDay> {
    let hour = parse_end_date(end_date)?.with_timezone(&Seoul).hour();
    Some(match hour {
        0..=5 => TimeOfDay::Dawn,
        6..=17 => TimeOfDay::Day,
        _ => TimeOfDay::Night,
    })
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn main_probability_pct(event: &MarketEvent) -> u32 {
    (event.yes_probability().clamp(0.0, 1.0) * 100.0).round() as u32
}

pub fn probability_band(pct: u32) -> ProbabilityBand {
    match pct {
        0..=29 => ProbabilityBand::Low,
        30..=69 => ProbabilityBand::Mid,
        _ => ProbabilityBand::High,
    }
}

pub fn format_compact_volume(volume: f64) -> String {
    if volume >= 1_000_000_000.0 {
        format!("{:.1}B", volume / 1_000_000_000.0)
    } else if volume >= 1_000_000.0 {
        format!("{:.0}M", volume / 1_000_000.0)
    } else if volume >= 1_000.0 {
        format!("{:.0}K", volume / 1_000.0)
    } else {
        format!("{:.0}", volume.max(0.0))
    }
}

pub fn week_view(events: &[MarketEvent], now: DateTime<Utc>) -> Vec<DayBucket> {
    let today = kst_date(now);
    let dates = consecutive_dates(today, WEEK_VIEW_DAYS);
    let mut by_date = bucket_by_date(events, &dates, |_, end| kst_date(end) != today || end > now);

    dates
        .iter()
        .map(|date| {
            let mut day_events = by_date.remove(date).unwrap_or_default();
            day_events.sort_by_key(|(end, _)| *end);
            DayBucket {
                date_key: date_key(*date),
                is_today: *date == today,
                events: day_events.into_iter().map(|(_, e)| e.clone()).collect(),
            }
        })
        .collect()
}

pub fn calendar_overview(
    events: &[MarketEvent],
    now: DateTime<Utc>,
    start_week: u32,
) -> Vec<OverviewDay> {
    let today = kst_date(now);
    let offset = WEEK_VIEW_DAYS + 7 * u64::from(start_week);
    let Some(start) = today.checked_add_days(Days::new(offset)) else {
        return Vec::new();
    };
    let dates = consecutive_dates(start, OVERVIEW_DAYS);
    let mut by_date = bucket_by_date(events, &dates, |_, _| true);

    dates
        .iter()
        .map(|date| {
            let mut day_events = by_date.remove(date).unwrap_or_default();
            let event_count = day_events.len();
            day_events.sort_by(|a, b| b.1.display_volume().total_cmp(&a.1.display_volume()));
            OverviewDay {
                date_key: date_key(*date),
                is_today: *date == today,
                event_count,
                top_events: day_events
                    .into_iter()
                    .take(OVERVIEW_TOP_EVENTS)
                    .map(|(_, e)| e.clone())
                    .collect(),
            }
        })
        .collect()
}

pub fn day_events(events: &[MarketEvent], date_key: &str) -> Vec<MarketEvent> {
    events
        .iter()
        .filter(|event| kst_date_key(&event.end_date).as_deref() == Some(date_key))
        .cloned()
        .collect()
}

fn consecutive_dates(start: NaiveDate, count: u64) -> Vec<NaiveDate> {
    (0..count)
        .filter_map(|offset| start.checked_add_days(Days::new(offset)))
        .collect()
}

fn bucket_by_date<'a, F>(
    events: &'a [MarketEvent],
    dates: &[NaiveDate],
    keep: F,
) -> HashMap<NaiveDate, Vec<(DateTime<Utc>, &'a MarketEvent)>>
where
    F: Fn(&MarketEvent, DateTime<Utc>) -> bool,
{
    let mut by_date: HashMap<NaiveDate, Vec<(DateTime<Utc>, &MarketEvent)>> = HashMap::new();
    for event in events {
        let Some(end) = parse_end_date(&event.end_date) else {
            continue;
        };
        let date = kst_date(end);
        if dates.contains(&date) && keep(event, end) {
            by_date.entry(date).or_default().push((end, event));
        }
    }
    by_date
}
