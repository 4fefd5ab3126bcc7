//! Event grouping: collapse outcome-variants of one underlying event into a
//! single representative row.
//!
//! Two key strategies are supported:
//! - image + expiry: `{image_url}|{end_date}`; rows without an image are singletons
//! - title normalization: thresholds, amounts, percentages and dates erased from the title;
//!   blank titles are singletons
//!
//! Within a group the representative is cloned and receives `aggregate_volume`
//! and `group_size`. Input rows are never modified.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::event::{coerce_volume, MarketEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingStrategy {
    #[default]
    ImageExpiry,
    TitleNormalization,
}

impl GroupingStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ImageExpiry => "image_expiry",
            Self::TitleNormalization => "title_normalization",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupingStrategyError {
    #[error("unknown grouping strategy: {0}")]
    Unknown(String),
}

pub fn parse_grouping_strategy(input: &str) -> Result<GroupingStrategy, GroupingStrategyError> {
    match input.trim().to_ascii_lowercase().as_str() {
        "image" | "image_expiry" => Ok(GroupingStrategy::ImageExpiry),
        "title" | "title_normalization" => Ok(GroupingStrategy::TitleNormalization),
        other => Err(GroupingStrategyError::Unknown(other.to_string())),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingReport {
    pub input_events: usize,
    pub output_events: usize,
    pub collapsed_groups: usize,
}

pub fn group_events(events: &[MarketEvent], strategy: GroupingStrategy) -> Vec<MarketEvent> {
    group_events_with_report(events, strategy).0
}

pub fn group_events_with_report(
    events: &[MarketEvent],
    strategy: GroupingStrategy,
) -> (Vec<MarketEvent>, GroupingReport) {
    let groups = partition_by_key(events, strategy);
    let mut output = Vec::with_capacity(groups.len());
    let mut collapsed_groups = 0;

    for members in &groups {
        let Some((first, rest)) = members.split_first() else {
            continue;
        };

        if rest.is_empty() {
            output.push((*first).clone());
            continue;
        }

        collapsed_groups += 1;
        let representative = pick_representative(first, rest, strategy);
        let total_volume: f64 = members.iter().map(|e| coerce_volume(e.volume)).sum();

        let mut merged = representative.clone();
        merged.volume = coerce_volume(merged.volume);
        merged.aggregate_volume = Some(total_volume);
        merged.group_size = Some(members.len());
        output.push(merged);
    }

    let report = GroupingReport {
        input_events: events.len(),
        output_events: output.len(),
        collapsed_groups,
    };

    if collapsed_groups > 0 {
        debug!(
            component = "grouping",
            event = "grouping.collapsed",
            strategy = strategy.as_str(),
            input_events = report.input_events,
            output_events = report.output_events,
            collapsed_groups
        );
    }

    (output, report)
}

/// Key deciding which rows stand for the same underlying event.
pub fn group_key(event: &MarketEvent, strategy: GroupingStrategy) -> String {
    match strategy {
        GroupingStrategy::ImageExpiry => match event.image_key() {
            Some(image) => format!("{image}|{}", event.end_date),
            None => format!("no-image-{}", event.id),
        },
        GroupingStrategy::TitleNormalization => {
            let normalized = normalize_title(&event.title);
            if normalized.is_empty() {
                format!("no-title-{}", event.id)
            } else {
                normalized
            }
        }
    }
}

/// Erases quantitative variation from a market title.
///
/// `"Will BTC reach $100K?"` and `"Will BTC reach $250K?"` both become
/// `"will btc reach $x?"`. Digits and word boundaries are ASCII-only, so
/// digits glued to Hangul still normalize and non-ASCII numerals do not.
pub fn normalize_title(title: &str) -> String {
    if title.is_empty() {
        return String::new();
    }

    let rules = title_rules();
    let mut normalized = title.to_string();
    for (pattern, replacement) in rules {
        normalized = pattern.replace_all(&normalized, *replacement).into_owned();
    }

    normalized.trim().to_lowercase()
}

fn title_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"(?i)at least [0-9]+(\.[0-9]+)?", "at least X"),
            (
                r"(?i)(over|under|above|below|more than|less than)\s*[0-9]+(\.[0-9]+)?",
                "${1} X",
            ),
            (r"(?i)\$[0-9,]+(\.[0-9]+)?[KMB]?", "$$X"),
            (r"[0-9]+(\.[0-9]+)?%", "X%"),
            (r"[0-9]{1,2}/[0-9]{1,2}(/[0-9]{2,4})?", "DATE"),
            (r"(?-u:\b)[0-9]+(\.[0-9]+)?(?-u:\b)", "X"),
        ]
        .into_iter()
        .map(|(pattern, replacement)| {
            (
                Regex::new(pattern).expect("title normalization pattern should compile"),
                replacement,
            )
        })
        .collect()
    })
}

fn partition_by_key(events: &[MarketEvent], strategy: GroupingStrategy) -> Vec<Vec<&MarketEvent>> {
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(events.len());
    let mut groups: Vec<Vec<&MarketEvent>> = Vec::with_capacity(events.len());

    for event in events {
        let slot = *slots.entry(group_key(event, strategy)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(event);
    }

    groups
}

// Strictly-greater comparison keeps the earliest member on ties.
fn pick_representative<'a>(
    first: &'a MarketEvent,
    rest: &[&'a MarketEvent],
    strategy: GroupingStrategy,
) -> &'a MarketEvent {
    let score = |event: &MarketEvent| match strategy {
        GroupingStrategy::ImageExpiry => event.yes_probability(),
        GroupingStrategy::TitleNormalization => coerce_volume(event.volume),
    };

    let mut best = first;
    let mut best_score = score(first);
    for candidate in rest {
        let candidate_score = score(candidate);
        if candidate_score > best_score {
            best = candidate;
            best_score = candidate_score;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAN_1: &str = "2026-01-01T00:00:00Z";
    const JAN_2: &str = "2026-01-02T00:00:00Z";

    fn market(id: &str, image: Option<&str>, end: &str, prob: f64, volume: f64) -> MarketEvent {
        let event = MarketEvent::new(id, format!("Market {id}"), end)
            .with_yes_probability(prob)
            .with_volume(volume);
        match image {
            Some(url) => event.with_image_url(url),
            None => event,
        }
    }

    #[test]
    fn shared_image_and_expiry_collapse_to_most_likely_outcome() {
        let input = vec![
            market("low", Some("img1"), JAN_1, 0.3, 100.0),
            market("high", Some("img1"), JAN_1, 0.7, 200.0),
        ];

        let out = group_events(&input, GroupingStrategy::ImageExpiry);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "high");
        assert_eq!(out[0].aggregate_volume, Some(300.0));
        assert_eq!(out[0].group_size, Some(2));
    }

    #[test]
    fn same_image_on_different_days_stays_separate() {
        let input = vec![
            market("a", Some("img1"), JAN_1, 0.3, 100.0),
            market("b", Some("img1"), JAN_2, 0.7, 200.0),
        ];

        let out = group_events(&input, GroupingStrategy::ImageExpiry);

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| e.aggregate_volume.is_none()));
        assert!(out.iter().all(|e| e.group_size.is_none()));
    }

    #[test]
    fn rows_without_image_are_always_singletons() {
        let input = vec![
            market("a", None, JAN_1, 0.5, 10.0),
            market("b", None, JAN_1, 0.5, 10.0),
            market("c", Some(""), JAN_1, 0.5, 10.0),
        ];

        let out = group_events(&input, GroupingStrategy::ImageExpiry);
        assert_eq!(out, input);
    }

    #[test]
    fn title_strategy_groups_threshold_variants_by_volume() {
        let input = vec![
            MarketEvent::new("100k", "Will BTC reach $100K?", JAN_1).with_volume(50.0),
            MarketEvent::new("250k", "Will BTC reach $250K?", JAN_1).with_volume(80.0),
        ];

        assert_eq!(normalize_title(&input[0].title), "will btc reach $x?");
        assert_eq!(normalize_title(&input[1].title), "will btc reach $x?");

        let out = group_events(&input, GroupingStrategy::TitleNormalization);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "250k");
        assert_eq!(out[0].aggregate_volume, Some(130.0));
        assert_eq!(out[0].group_size, Some(2));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(group_events(&[], GroupingStrategy::ImageExpiry).is_empty());
        assert!(group_events(&[], GroupingStrategy::TitleNormalization).is_empty());
    }

    #[test]
    fn ties_keep_first_encountered_member() {
        let input = vec![
            market("first", Some("img"), JAN_1, 0.6, 1.0),
            market("second", Some("img"), JAN_1, 0.6, 1.0),
        ];
        let out = group_events(&input, GroupingStrategy::ImageExpiry);
        assert_eq!(out[0].id, "first");

        let titled = vec![
            MarketEvent::new("first", "Over 10 goals", JAN_1).with_volume(5.0),
            MarketEvent::new("second", "Over 12 goals", JAN_1).with_volume(5.0),
        ];
        let out = group_events(&titled, GroupingStrategy::TitleNormalization);
        assert_eq!(out[0].id, "first");
    }

    #[test]
    fn missing_probability_ranks_as_even_odds() {
        let mut unknown = market("unknown", Some("img"), JAN_1, 0.0, 1.0);
        unknown.probs.clear();
        let input = vec![market("unlikely", Some("img"), JAN_1, 0.2, 1.0), unknown];

        let out = group_events(&input, GroupingStrategy::ImageExpiry);
        assert_eq!(out[0].id, "unknown");
    }

    #[test]
    fn input_rows_are_not_mutated() {
        let input = vec![
            market("a", Some("img"), JAN_1, 0.1, 1.0),
            market("b", Some("img"), JAN_1, 0.9, 2.0),
            market("c", None, JAN_1, 0.9, 2.0),
        ];
        let before = input.clone();

        let out = group_events(&input, GroupingStrategy::ImageExpiry);

        assert_eq!(input, before);
        assert!(input.iter().all(|e| e.group_size.is_none()));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn groups_partition_the_input_and_conserve_volume() {
        let mut input = Vec::new();
        for i in 0..30 {
            let image = format!("img{}", i % 7);
            let end = if i % 2 == 0 { JAN_1 } else { JAN_2 };
            let image = if i % 5 == 0 { None } else { Some(image.as_str()) };
            input.push(market(&format!("m{i}"), image, end, (i as f64) / 30.0, i as f64));
        }

        let (out, report) = group_events_with_report(&input, GroupingStrategy::ImageExpiry);

        let covered: usize = out.iter().map(|e| e.group_size.unwrap_or(1)).sum();
        assert_eq!(covered, input.len());
        assert_eq!(report.input_events, input.len());
        assert_eq!(report.output_events, out.len());
        assert!(out.len() < input.len());

        for rep in out.iter().filter(|e| e.is_grouped()) {
            let key = group_key(rep, GroupingStrategy::ImageExpiry);
            let expected: f64 = input
                .iter()
                .filter(|e| group_key(e, GroupingStrategy::ImageExpiry) == key)
                .map(|e| e.volume)
                .sum();
            assert_eq!(rep.aggregate_volume, Some(expected));
            assert!(rep.aggregate_volume.unwrap_or_default() >= rep.volume);
        }
    }

    #[test]
    fn regrouping_stripped_representatives_is_stable() {
        let input = vec![
            market("a", Some("img1"), JAN_1, 0.2, 10.0),
            market("b", Some("img1"), JAN_1, 0.8, 20.0),
            market("c", Some("img2"), JAN_1, 0.5, 30.0),
            market("d", None, JAN_2, 0.5, 40.0),
        ];

        let stripped: Vec<MarketEvent> = group_events(&input, GroupingStrategy::ImageExpiry)
            .iter()
            .map(MarketEvent::without_aggregates)
            .collect();
        let regrouped = group_events(&stripped, GroupingStrategy::ImageExpiry);

        assert_eq!(regrouped, stripped);
    }

    #[test]
    fn normalization_erases_quantities_dates_and_numbers() {
        let cases = [
            ("Will LeBron score at least 25 points?", "will lebron score at least x points?"),
            ("Over 2.5 goals in the final", "over x goals in the final"),
            ("Tesla below 300 by Friday", "tesla below x by friday"),
            ("Will ETH hit $1,250.50?", "will eth hit $x?"),
            ("Inflation above 3.2%?", "inflation above x%?"),
            ("CPI print 3.4% in March", "cpi print x% in march"),
            ("Fed decision on 1/27", "fed decision on date"),
            ("Election result 01/27/2026", "election result date"),
            ("Who wins round 5?", "who wins round x?"),
            ("  Padded Title  ", "padded title"),
        ];

        for (title, expected) in cases {
            assert_eq!(normalize_title(title), expected, "title: {title}");
        }
        assert_eq!(normalize_title(""), "");
    }

    #[test]
    fn garbage_volume_contributes_zero() {
        let mut broken = market("broken", Some("img"), JAN_1, 0.9, 0.0);
        broken.volume = f64::NAN;
        let input = vec![broken, market("ok", Some("img"), JAN_1, 0.1, 75.0)];

        let out = group_events(&input, GroupingStrategy::ImageExpiry);
        assert_eq!(out[0].id, "broken");
        assert_eq!(out[0].aggregate_volume, Some(75.0));
        assert_eq!(out[0].volume, 0.0);
        assert!(out[0].aggregate_volume.unwrap_or_default() >= out[0].volume);
    }

    #[test]
    fn digit_classes_are_ascii_only() {
        assert_eq!(normalize_title("라운드5 결과"), "라운드x 결과");
        assert_eq!(normalize_title("Round ٣"), "round ٣");
        assert_eq!(normalize_title("득표율 40% 이상"), "득표율 x% 이상");
    }

    #[test]
    fn blank_titles_never_merge_under_title_strategy() {
        let input = vec![
            MarketEvent::new("a", "", JAN_1).with_volume(5.0),
            MarketEvent::new("b", "   ", "2026-02-01T00:00:00Z").with_volume(9.0),
        ];

        assert_eq!(group_key(&input[0], GroupingStrategy::TitleNormalization), "no-title-a");
        let out = group_events(&input, GroupingStrategy::TitleNormalization);
        assert_eq!(out, input);
    }

    #[test]
    fn strategy_names_parse() {
        assert_eq!(parse_grouping_strategy("image"), Ok(GroupingStrategy::ImageExpiry));
        assert_eq!(
            parse_grouping_strategy("Title_Normalization"),
            Ok(GroupingStrategy::TitleNormalization)
        );
        assert_eq!(
            parse_grouping_strategy("random"),
            Err(GroupingStrategyError::Unknown("random".to_string()))
        );
    }
}
