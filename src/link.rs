//! Deep links into polymarket.com for calendar rows.
//!
//! Resolution order:
//! - `event_slug` when present: the group event page
//! - `slug` passed through [`LINK_RULES`], first match wins
//! - unmatched slugs link to their own event page
//!
//! The rules mirror polymarket.com's current slug scheme and break silently
//! when it changes; `tests::known_slugs_resolve_through_expected_rules` pins
//! them against real slugs.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::event::MarketEvent;

pub const EVENT_BASE_URL: &str = "https://polymarket.com/event";
pub const SEARCH_BASE_URL: &str = "https://polymarket.com/markets";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MarketLink {
    Event { slug: String, url: String },
    Search { query: String, url: String },
}

impl MarketLink {
    pub fn event(slug: impl Into<String>) -> Self {
        let slug = slug.into();
        let url = format!("{EVENT_BASE_URL}/{slug}");
        Self::Event { slug, url }
    }

    pub fn search(query: impl Into<String>) -> Self {
        let query = query.into();
        let encoded: String = form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let url = format!("{SEARCH_BASE_URL}?_q={encoded}");
        Self::Search { query, url }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Event { url, .. } | Self::Search { url, .. } => url,
        }
    }
}

#[derive(Clone, Copy)]
pub enum LinkAction {
    /// Replace matches of `pattern` (the rule's matcher when `None`).
    Rewrite {
        pattern: Option<&'static str>,
        replacement: &'static str,
    },
    /// Send the user to the markets search page.
    Search(fn(&Captures<'_>) -> String),
}

#[derive(Clone, Copy)]
pub struct LinkRule {
    pub name: &'static str,
    pub matcher: &'static str,
    pub action: LinkAction,
}

pub const LINK_RULES: &[LinkRule] = &[
    LinkRule {
        name: "temperature_range",
        matcher: r"-(\d{4})-(?:neg-)?\d+-?\d*[cf](?:orhigher|orbelow)?$",
        action: LinkAction::Rewrite {
            pattern: None,
            replacement: "-${1}",
        },
    },
    LinkRule {
        name: "price_above_below",
        matcher: r"-(above|below)-\d+(?:pt\d+)?k?-on-",
        action: LinkAction::Rewrite {
            pattern: None,
            replacement: "-${1}-on-",
        },
    },
    LinkRule {
        name: "price_between",
        matcher: r"-be-between-\d+(?:pt\d+)?-\d+(?:pt\d+)?-on-",
        action: LinkAction::Rewrite {
            pattern: Some(r"will-the-price-of-([^-]+)-be-between-\d+(?:pt\d+)?-\d+(?:pt\d+)?-on-(.+)"),
            replacement: "${1}-price-on-${2}",
        },
    },
    LinkRule {
        name: "price_greater_less_than",
        matcher: r"^will-the-price-of-([^-]+)-be-(?:greater-than|less-than)-\d+(?:pt\d+)?-on-(.+)$",
        action: LinkAction::Rewrite {
            pattern: None,
            replacement: "${1}-price-on-${2}",
        },
    },
    LinkRule {
        name: "reach_or_dip",
        matcher: r"^will-([^-]+)-(?:reach|dip-to)-\d+(?:pt\d+)?k?-((?:in|on|by)-.+?)(?:-\d{3}-\d{3}-\d{3})?$",
        action: LinkAction::Search(reach_or_dip_query),
    },
    LinkRule {
        name: "trump_say_this_week",
        matcher: r"^will-trump-say-.+-this-week-(.+)$",
        action: LinkAction::Rewrite {
            pattern: None,
            replacement: "what-will-trump-say-this-week-${1}",
        },
    },
    LinkRule {
        name: "robot_dancers",
        matcher: r"^will-[^-]+-have-robot-dancers-at-(.+)$",
        action: LinkAction::Search(robot_dancers_query),
    },
    LinkRule {
        name: "stock_close",
        matcher: r"^will-([a-z]+)-close-(?:above|between)-\d+(?:-and-\d+)?-week-(.+)$",
        action: LinkAction::Search(stock_close_query),
    },
    LinkRule {
        name: "exactly_n",
        matcher: r"^will-there-be-exactly-\d+-(.+)$",
        action: LinkAction::Search(exactly_n_query),
    },
    LinkRule {
        name: "plus_suffix",
        matcher: r"-\d+plus$",
        action: LinkAction::Rewrite {
            pattern: None,
            replacement: "",
        },
    },
    LinkRule {
        name: "numeric_range",
        matcher: r"-(\d{3,}-\d{2,})$",
        action: LinkAction::Rewrite {
            pattern: None,
            replacement: "",
        },
    },
];

pub fn resolve_market_link(event: &MarketEvent) -> Option<MarketLink> {
    if let Some(event_slug) = non_blank(event.event_slug.as_deref()) {
        return Some(MarketLink::event(event_slug));
    }
    non_blank(event.slug.as_deref()).map(resolve_slug)
}

pub fn resolve_slug(slug: &str) -> MarketLink {
    match first_matching_rule(slug) {
        Some((rule, captures)) => apply_rule(rule, slug, &captures),
        None => MarketLink::event(slug),
    }
}

/// Name of the rule that handles `slug`, if any.
pub fn matching_rule_name(slug: &str) -> Option<&'static str> {
    first_matching_rule(slug).map(|(rule, _)| rule.rule.name)
}

struct CompiledRule {
    rule: &'static LinkRule,
    matcher: Regex,
    rewrite: Option<Regex>,
}

fn compiled_rules() -> &'static [CompiledRule] {
    static RULES: OnceLock<Vec<CompiledRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        LINK_RULES
            .iter()
            .map(|rule| CompiledRule {
                rule,
                matcher: Regex::new(rule.matcher).expect("link rule matcher should compile"),
                rewrite: match rule.action {
                    LinkAction::Rewrite {
                        pattern: Some(pattern),
                        ..
                    } => Some(Regex::new(pattern).expect("link rewrite pattern should compile")),
                    _ => None,
                },
            })
            .collect()
    })
}

fn first_matching_rule(slug: &str) -> Option<(&'static CompiledRule, Captures<'_>)> {
    compiled_rules()
        .iter()
        .find_map(|compiled| compiled.matcher.captures(slug).map(|caps| (compiled, caps)))
}

fn apply_rule(compiled: &CompiledRule, slug: &str, captures: &Captures<'_>) -> MarketLink {
    match compiled.rule.action {
        LinkAction::Rewrite { replacement, .. } => {
            let pattern = compiled.rewrite.as_ref().unwrap_or(&compiled.matcher);
            MarketLink::event(pattern.replace(slug, replacement).into_owned())
        }
        LinkAction::Search(build_query) => MarketLink::search(build_query(captures)),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn capture(captures: &Captures<'_>, index: usize) -> String {
    captures
        .get(index)
        .map(|m| m.as_str().replace('-', " "))
        .unwrap_or_default()
}

fn reach_or_dip_query(captures: &Captures<'_>) -> String {
    format!("{} {}", capture(captures, 1), capture(captures, 2))
}

fn robot_dancers_query(captures: &Captures<'_>) -> String {
    format!("robot dancers {}", capture(captures, 1))
}

fn stock_close_query(captures: &Captures<'_>) -> String {
    format!("{} close {}", capture(captures, 1), capture(captures, 2))
}

fn exactly_n_query(captures: &Captures<'_>) -> String {
    static DECIMAL: OnceLock<Regex> = OnceLock::new();
    let decimal = DECIMAL.get_or_init(|| Regex::new(r"(\d)pt(\d)").expect("decimal pattern should compile"));
    decimal
        .replace_all(&capture(captures, 1), "${1}.${2}")
        .into_owned()
}
