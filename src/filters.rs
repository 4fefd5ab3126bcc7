//! Calendar filter pipeline and tag/category tallies.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::event::MarketEvent;

pub const DEFAULT_MIN_VOLUME: f64 = 10_000.0;
pub const DEFAULT_EXCLUDED_CATEGORIES: [&str; 1] = ["Sports"];
/// Liquidity is approximated as a fixed share of traded volume.
pub const LIQUIDITY_SHARE_OF_VOLUME: f64 = 0.1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRemaining {
    #[default]
    All,
    Days(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFilters {
    pub tags: Vec<String>,
    pub excluded_categories: Vec<String>,
    pub time_remaining: TimeRemaining,
    pub min_volume: f64,
    pub min_liquidity: f64,
}

impl Default for EventFilters {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            excluded_categories: DEFAULT_EXCLUDED_CATEGORIES
                .iter()
                .map(|c| (*c).to_string())
                .collect(),
            time_remaining: TimeRemaining::All,
            min_volume: DEFAULT_MIN_VOLUME,
            min_liquidity: 0.0,
        }
    }
}

impl EventFilters {
    /// No filtering beyond the always-on open-market check.
    pub fn permissive() -> Self {
        Self {
            tags: Vec::new(),
            excluded_categories: Vec::new(),
            time_remaining: TimeRemaining::All,
            min_volume: 0.0,
            min_liquidity: 0.0,
        }
    }

    pub fn is_category_excluded(&self, category: &str) -> bool {
        self.excluded_categories.iter().any(|c| c == category)
    }

    pub fn matches(&self, event: &MarketEvent, search: &str, now: DateTime<Utc>) -> bool {
        if !self.tags.is_empty() && !self.tags.iter().any(|tag| event.tags.contains(tag)) {
            return false;
        }

        if self.is_category_excluded(event.category_label()) {
            return false;
        }

        let Some(end) = parse_end_date(&event.end_date) else {
            return false;
        };
        if end < now || event.closed {
            return false;
        }

        if let TimeRemaining::Days(days) = self.time_remaining {
            if end > now + ChronoDuration::days(i64::from(days)) {
                return false;
            }
        }

        if self.min_volume > 0.0 && event.volume < self.min_volume {
            return false;
        }

        if self.min_liquidity > 0.0
            && event.volume * LIQUIDITY_SHARE_OF_VOLUME < self.min_liquidity
        {
            return false;
        }

        matches_search(event, search)
    }
}

pub fn apply_filters(
    events: &[MarketEvent],
    filters: &EventFilters,
    search: &str,
    now: DateTime<Utc>,
) -> Vec<MarketEvent> {
    events
        .iter()
        .filter(|event| filters.matches(event, search, now))
        .cloned()
        .collect()
}

pub fn parse_end_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn matches_search(event: &MarketEvent, search: &str) -> bool {
    let needle = search.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }

    event.title.to_lowercase().contains(&needle)
        || event
            .title_ko
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains(&needle))
        || event.category_label().to_lowercase().contains(&needle)
}

pub fn tag_counts(events: &[MarketEvent]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tag in events.iter().flat_map(|e| e.tags.iter()) {
        *counts.entry(tag.as_str()).or_insert(0) += 1;
    }
    sorted_counts(counts)
}

pub fn category_counts(events: &[MarketEvent]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for event in events {
        *counts.entry(event.category_label()).or_insert(0) += 1;
    }
    sorted_counts(counts)
}

fn sorted_counts(counts: HashMap<&str, usize>) -> Vec<(String, usize)> {
    let mut out: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(label, count)| (label.to_string(), count))
        .collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    fn ev(id: &str, end: &str, volume: f64, category: &str) -> MarketEvent {
        MarketEvent::new(id, format!("Title {id}"), end)
            .with_volume(volume)
            .with_category(category)
    }

    #[test]
    fn defaults_exclude_sports_and_small_markets() {
        let events = vec![
            ev("sports", "2026-03-02T00:00:00Z", 50_000.0, "Sports"),
            ev("small", "2026-03-02T00:00:00Z", 9_999.0, "Politics"),
            ev("kept", "2026-03-02T00:00:00Z", 10_000.0, "Politics"),
        ];

        let out = apply_filters(&events, &EventFilters::default(), "", now());
        let ids: Vec<&str> = out.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["kept"]);
    }

    #[test]
    fn past_closed_and_undated_events_are_always_dropped() {
        let mut closed = ev("closed", "2026-03-05T00:00:00Z", 1.0, "Crypto");
        closed.closed = true;
        let events = vec![
            ev("past", "2026-02-28T23:59:59Z", 1.0, "Crypto"),
            closed,
            ev("undated", "soon", 1.0, "Crypto"),
            ev("open", "2026-03-05T00:00:00Z", 1.0, "Crypto"),
        ];

        let out = apply_filters(&events, &EventFilters::permissive(), "", now());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "open");
    }

    #[test]
    fn time_window_and_liquidity_bounds_apply() {
        let filters = EventFilters {
            time_remaining: TimeRemaining::Days(3),
            min_liquidity: 500.0,
            ..EventFilters::permissive()
        };
        let events = vec![
            ev("near", "2026-03-03T00:00:00Z", 5_000.0, "Crypto"),
            ev("far", "2026-03-10T00:00:00Z", 5_000.0, "Crypto"),
            ev("thin", "2026-03-02T00:00:00Z", 4_999.0, "Crypto"),
        ];

        let out = apply_filters(&events, &filters, "", now());
        let ids: Vec<&str> = out.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["near"]);
    }

    #[test]
    fn tag_filter_and_search_are_case_insensitive_where_textual() {
        let events = vec![
            ev("a", "2026-03-02T00:00:00Z", 1.0, "Crypto").with_tags(["Bitcoin"]),
            ev("b", "2026-03-02T00:00:00Z", 1.0, "Politics").with_tags(["Trump"]),
            ev("c", "2026-03-02T00:00:00Z", 1.0, "Politics"),
        ];

        let tagged = EventFilters {
            tags: vec!["Trump".to_string()],
            ..EventFilters::permissive()
        };
        assert_eq!(apply_filters(&events, &tagged, "", now()).len(), 1);

        let searched = apply_filters(&events, &EventFilters::permissive(), "POLIT", now());
        let ids: Vec<&str> = searched.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn tallies_sort_by_count_then_label() {
        let events = vec![
            ev("a", "x", 1.0, "Crypto").with_tags(["btc", "macro"]),
            ev("b", "x", 1.0, "Crypto").with_tags(["btc"]),
            ev("c", "x", 1.0, "").with_tags(["alpha"]),
        ];

        assert_eq!(
            category_counts(&events),
            vec![("Crypto".to_string(), 2), ("Uncategorized".to_string(), 1)]
        );
        assert_eq!(
            tag_counts(&events),
            vec![
                ("btc".to_string(), 2),
                ("alpha".to_string(), 1),
                ("macro".to_string(), 1)
            ]
        );
    }
}
