//! Calendar HTTP routes: HTML page, filtered JSON snapshot, day drill-down.

use std::sync::Arc;

use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use url::form_urlencoded;

use crate::calendar::{
    calendar_overview, day_events, format_compact_volume, kst_time_label, main_probability_pct,
    probability_band, week_view, ProbabilityBand,
};
use crate::event::MarketEvent;
use crate::filters::{apply_filters, EventFilters, TimeRemaining};
use crate::link::{resolve_market_link, MarketLink};
use crate::source::{CalendarSnapshot, CalendarSnapshotSource};
use crate::view::{active_filter_chips, parse_language, FilterChip, Language};

/// Filters, search text and language decoded from a request query string.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarQuery {
    pub filters: EventFilters,
    pub search: String,
    pub language: Language,
}

impl Default for CalendarQuery {
    fn default() -> Self {
        Self {
            filters: EventFilters::default(),
            search: String::new(),
            language: Language::default(),
        }
    }
}

/// Repeated `tag` and `exclude_category` keys accumulate. Without any
/// `exclude_category` key the default exclusions apply; an empty value
/// clears them. Malformed numbers keep their defaults.
pub fn parse_calendar_query(raw: Option<&str>) -> CalendarQuery {
    let mut query = CalendarQuery::default();
    let Some(raw) = raw else {
        return query;
    };

    let mut excluded: Option<Vec<String>> = None;

    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        let value = value.trim();
        match key.as_ref() {
            "tag" if !value.is_empty() => {
                if !query.filters.tags.iter().any(|t| t == value) {
                    query.filters.tags.push(value.to_string());
                }
            }
            "exclude_category" => {
                let entries = excluded.get_or_insert_with(Vec::new);
                if !value.is_empty() && !entries.iter().any(|c| c == value) {
                    entries.push(value.to_string());
                }
            }
            "days" => {
                if value.eq_ignore_ascii_case("all") {
                    query.filters.time_remaining = TimeRemaining::All;
                } else if let Ok(days) = value.parse::<u32>() {
                    query.filters.time_remaining = TimeRemaining::Days(days);
                }
            }
            "min_volume" => {
                if let Some(parsed) = parse_non_negative(value) {
                    query.filters.min_volume = parsed;
                }
            }
            "min_liquidity" => {
                if let Some(parsed) = parse_non_negative(value) {
                    query.filters.min_liquidity = parsed;
                }
            }
            "q" => query.search = value.to_string(),
            "lang" => {
                if let Some(language) = parse_language(value) {
                    query.language = language;
                }
            }
            _ => {}
        }
    }

    if let Some(excluded) = excluded {
        query.filters.excluded_categories = excluded;
    }

    query
}

fn parse_non_negative(raw: &str) -> Option<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayEventView {
    pub event: MarketEvent,
    pub link: Option<MarketLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayResponse {
    pub date_key: String,
    pub events: Vec<DayEventView>,
}

pub const CALENDAR_ROUTES: [&str; 3] = [
    "/calendar",
    "/calendar/snapshot",
    "/calendar/day/{date_key}",
];

pub fn calendar_router(source: Arc<dyn CalendarSnapshotSource>) -> Router {
    let [page, snapshot, day] = CALENDAR_ROUTES;
    Router::new()
        .route(page, get(get_calendar_html))
        .route(snapshot, get(get_calendar_snapshot))
        .route(day, get(get_calendar_day))
        .with_state(CalendarAppState { source })
}

struct Labels {
    title: &'static str,
    week: &'static str,
    overview: &'static str,
    filters: &'static str,
    no_filters: &'static str,
    empty_day: &'static str,
    more: &'static str,
    generated: &'static str,
    shown: &'static str,
}

fn labels(language: Language) -> Labels {
    match language {
        Language::Ko => Labels {
            title: "폴리마켓 캘린더",
            week: "이번 주",
            overview: "3주 전망",
            filters: "필터",
            no_filters: "필터 없음",
            empty_day: "마감 예정 없음",
            more: "개 더",
            generated: "생성",
            shown: "표시",
        },
        Language::En => Labels {
            title: "Polymarket Calendar",
            week: "This week",
            overview: "3-week overview",
            filters: "Filters",
            no_filters: "No filters",
            empty_day: "Nothing expiring",
            more: " more",
            generated: "Generated",
            shown: "Shown",
        },
    }
}

pub fn render_calendar_html(
    snapshot: &CalendarSnapshot,
    query: &CalendarQuery,
    now: DateTime<Utc>,
) -> String {
    let language = query.language;
    let text = labels(language);
    let visible = apply_filters(&snapshot.events, &query.filters, &query.search, now);
    let generated = Utc
        .timestamp_millis_opt(snapshot.generated_at_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string());

    let mut out = String::new();
    out.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">\n");
    out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    out.push_str(&format!("<title>{}</title>\n", escape_html(text.title)));
    out.push_str("<style>:root{--bg:#f4f6f8;--card:#fff;--ink:#182026;--muted:#5f6a73;--line:#d7dce1;--head:#14343f;--low:#c0392b;--mid:#b7950b;--high:#1e8449}*{box-sizing:border-box}body{margin:0;color:var(--ink);font-family:\"Pretendard\",\"Segoe UI\",sans-serif;background:var(--bg)}.shell{max-width:1400px;margin:0 auto;padding:20px 16px}.hero{background:linear-gradient(135deg,#102f3a 0%,#24576b 100%);color:#f7fbfc;border-radius:14px;padding:16px 18px}.hero h1{margin:0 0 6px;font-size:1.5rem}.hero-meta{display:flex;gap:14px;flex-wrap:wrap;font-size:.9rem;color:#dcebf0}.chips{margin-top:12px;display:flex;gap:6px;flex-wrap:wrap;font-size:.8rem}.chip{background:#e3edf1;border-radius:999px;padding:3px 10px}.section-title{margin:18px 0 8px;font-size:1.05rem}.week{display:grid;grid-template-columns:repeat(5,1fr);gap:10px}.overview{display:grid;grid-template-columns:repeat(7,1fr);gap:8px}.day{background:var(--card);border:1px solid var(--line);border-radius:12px;padding:10px;min-height:120px}.day.today{border-color:var(--head);box-shadow:0 0 0 2px rgba(20,52,63,.2)}.day h3{margin:0 0 8px;font-size:.85rem;color:var(--muted)}.event{display:block;text-decoration:none;color:inherit;border-top:1px solid var(--line);padding:6px 0;font-size:.82rem}.event .time{font-family:monospace;color:var(--muted);margin-right:6px}.prob{font-weight:700;margin-left:6px}.prob-low{color:var(--low)}.prob-mid{color:var(--mid)}.prob-high{color:var(--high)}.vol{color:var(--muted);margin-left:6px}.badge{display:inline-block;background:var(--head);color:#fff;border-radius:6px;padding:0 5px;font-size:.7rem;margin-left:6px}.more,.empty{font-size:.75rem;color:var(--muted)}@media (max-width:900px){.week,.overview{grid-template-columns:1fr 1fr}}</style>\n");
    out.push_str("</head><body><main class=\"shell\">\n");

    out.push_str(&format!(
        "<section class=\"hero\"><h1>{}</h1><div class=\"hero-meta\">",
        escape_html(text.title)
    ));
    out.push_str(&format!(
        "<span>{}: {}</span>",
        escape_html(text.shown),
        visible.len()
    ));
    out.push_str(&format!(
        "<span>{}: {}</span>",
        escape_html(text.generated),
        escape_html(&generated)
    ));
    out.push_str(&format!(
        "<span>{}</span>",
        escape_html(snapshot.strategy.as_str())
    ));
    out.push_str("</div></section>\n");

    out.push_str(&format!(
        "<section class=\"chips\" id=\"filter-chips\"><b>{}</b>",
        escape_html(text.filters)
    ));
    let chips = active_filter_chips(&query.filters);
    if chips.is_empty() {
        out.push_str(&format!(
            "<span class=\"chip\">{}</span>",
            escape_html(text.no_filters)
        ));
    }
    for chip in &chips {
        out.push_str(&format!(
            "<span class=\"chip\">{}</span>",
            escape_html(&chip_label(chip, &query.filters))
        ));
    }
    out.push_str("</section>\n");

    out.push_str(&format!(
        "<h2 class=\"section-title\">{}</h2><section class=\"week\" id=\"week-view\">\n",
        escape_html(text.week)
    ));
    for bucket in week_view(&visible, now) {
        push_day_open(&mut out, &bucket.date_key, bucket.is_today);
        if bucket.events.is_empty() {
            out.push_str(&format!(
                "<span class=\"empty\">{}</span>",
                escape_html(text.empty_day)
            ));
        }
        for event in &bucket.events {
            push_event(&mut out, event, language);
        }
        out.push_str("</div>\n");
    }
    out.push_str("</section>\n");

    out.push_str(&format!(
        "<h2 class=\"section-title\">{}</h2><section class=\"overview\" id=\"overview\">\n",
        escape_html(text.overview)
    ));
    for day in calendar_overview(&visible, now, 0) {
        push_day_open(&mut out, &day.date_key, day.is_today);
        for event in &day.top_events {
            push_event(&mut out, event, language);
        }
        if day.hidden_count() > 0 {
            out.push_str(&format!(
                "<span class=\"more\">+{}{}</span>",
                day.hidden_count(),
                escape_html(text.more)
            ));
        }
        out.push_str("</div>\n");
    }
    out.push_str("</section>\n");

    out.push_str("</main></body></html>\n");
    out
}

fn push_day_open(out: &mut String, date_key: &str, is_today: bool) {
    let class = if is_today { "day today" } else { "day" };
    out.push_str(&format!(
        "<div class=\"{class}\" data-date=\"{key}\"><h3>{key}</h3>",
        key = escape_html(date_key)
    ));
}

fn push_event(out: &mut String, event: &MarketEvent, language: Language) {
    let href = resolve_market_link(event)
        .map(|link| link.url().to_string())
        .unwrap_or_else(|| "#".to_string());
    let pct = main_probability_pct(event);
    let band = match probability_band(pct) {
        ProbabilityBand::Low => "prob-low",
        ProbabilityBand::Mid => "prob-mid",
        ProbabilityBand::High => "prob-high",
    };

    out.push_str(&format!(
        "<a class=\"event\" target=\"_blank\" rel=\"noopener noreferrer\" href=\"{}\">",
        escape_html(&href)
    ));
    if let Some(time) = kst_time_label(&event.end_date) {
        out.push_str(&format!("<span class=\"time\">{}</span>", escape_html(&time)));
    }
    out.push_str(&escape_html(event.display_title(language)));
    out.push_str(&format!("<span class=\"prob {band}\">{pct}%</span>"));
    out.push_str(&format!(
        "<span class=\"vol\">${}</span>",
        escape_html(&format_compact_volume(event.display_volume()))
    ));
    if let Some(size) = event.group_size.filter(|size| *size > 1) {
        out.push_str(&format!("<span class=\"badge\">×{size}</span>"));
    }
    out.push_str("</a>");
}

fn chip_label(chip: &FilterChip, filters: &EventFilters) -> String {
    match chip {
        FilterChip::Tag(tag) => format!("#{tag}"),
        FilterChip::ExcludedCategory(category) => format!("-{category}"),
        FilterChip::TimeRemaining => match filters.time_remaining {
            TimeRemaining::Days(days) => format!("≤{days}d"),
            TimeRemaining::All => "all".to_string(),
        },
        FilterChip::MinVolume => format!("vol ≥ ${}", format_compact_volume(filters.min_volume)),
        FilterChip::MinLiquidity => {
            format!("liq ≥ ${}", format_compact_volume(filters.min_liquidity))
        }
    }
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[derive(Clone)]
struct CalendarAppState {
    source: Arc<dyn CalendarSnapshotSource>,
}

impl CalendarAppState {
    /// Sources read files and SQLite, so snapshots are taken on the blocking pool.
    async fn snapshot(&self) -> Result<CalendarSnapshot, Response> {
        let source = Arc::clone(&self.source);
        tokio::task::spawn_blocking(move || source.snapshot())
            .await
            .map_err(|err| {
                error!(component = "dashboard", event = "http.snapshot.error", error = %err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "calendar snapshot unavailable" })),
                )
                    .into_response()
            })
    }
}

async fn get_calendar_html(
    State(state): State<CalendarAppState>,
    RawQuery(raw): RawQuery,
) -> Response {
    let query = parse_calendar_query(raw.as_deref());
    let snapshot = match state.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(response) => return response,
    };
    info!(
        component = "dashboard",
        event = "http.calendar.request",
        events = snapshot.events.len(),
        language = query.language.locale()
    );
    Html(render_calendar_html(&snapshot, &query, Utc::now())).into_response()
}

async fn get_calendar_snapshot(
    State(state): State<CalendarAppState>,
    RawQuery(raw): RawQuery,
) -> Response {
    let query = parse_calendar_query(raw.as_deref());
    let snapshot = match state.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(response) => return response,
    };
    let events = apply_filters(&snapshot.events, &query.filters, &query.search, Utc::now());
    info!(
        component = "dashboard",
        event = "http.snapshot.request",
        total_events = snapshot.events.len(),
        returned_events = events.len(),
        strategy = snapshot.strategy.as_str()
    );

    Json(CalendarSnapshot { events, ..snapshot }).into_response()
}

async fn get_calendar_day(
    State(state): State<CalendarAppState>,
    Path(date_key): Path<String>,
    RawQuery(raw): RawQuery,
) -> Response {
    if NaiveDate::parse_from_str(&date_key, "%Y-%m-%d").is_err() {
        info!(
            component = "dashboard",
            event = "http.day.request",
            date_key = %date_key,
            status = 400
        );
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "date_key must be YYYY-MM-DD" })),
        )
            .into_response();
    }

    let query = parse_calendar_query(raw.as_deref());
    let snapshot = match state.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(response) => return response,
    };
    let visible = apply_filters(&snapshot.events, &query.filters, &query.search, Utc::now());
    let events: Vec<DayEventView> = day_events(&visible, &date_key)
        .into_iter()
        .map(|event| DayEventView {
            link: resolve_market_link(&event),
            event,
        })
        .collect();
    info!(
        component = "dashboard",
        event = "http.day.request",
        date_key = %date_key,
        status = 200,
        events = events.len()
    );

    Json(DayResponse { date_key, events }).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::GroupingStrategy;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn missing_query_uses_default_filters() {
        let query = parse_calendar_query(None);
        assert_eq!(query, CalendarQuery::default());
        assert!(query.filters.is_category_excluded("Sports"));
        assert_eq!(query.language, Language::Ko);
    }

    #[test]
    fn repeated_keys_accumulate_and_bad_numbers_are_ignored() {
        let query = parse_calendar_query(Some(
            "tag=Crypto&tag=Trump&tag=Crypto&exclude_category=Politics&days=7&min_volume=abc&min_liquidity=500&q=bitcoin+price&lang=en",
        ));

        assert_eq!(query.filters.tags, vec!["Crypto", "Trump"]);
        assert_eq!(query.filters.excluded_categories, vec!["Politics"]);
        assert_eq!(query.filters.time_remaining, TimeRemaining::Days(7));
        assert_eq!(query.filters.min_volume, crate::filters::DEFAULT_MIN_VOLUME);
        assert_eq!(query.filters.min_liquidity, 500.0);
        assert_eq!(query.search, "bitcoin price");
        assert_eq!(query.language, Language::En);
    }

    #[test]
    fn empty_exclude_category_clears_defaults() {
        let query = parse_calendar_query(Some("exclude_category=&min_volume=0"));
        assert!(query.filters.excluded_categories.is_empty());
        assert_eq!(query.filters.min_volume, 0.0);
    }

    #[test]
    fn rendered_page_shows_group_badges_and_escapes_titles() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 3, 0, 0).unwrap();
        let mut grouped = MarketEvent::new(
            "g",
            "Will <BTC> hit $100k?",
            (now + ChronoDuration::hours(2)).to_rfc3339(),
        )
        .with_volume(50_000.0)
        .with_yes_probability(0.8)
        .with_slug("will-btc-hit-100k");
        grouped.aggregate_volume = Some(120_000.0);
        grouped.group_size = Some(3);

        let snapshot = CalendarSnapshot {
            generated_at_ms: now.timestamp_millis(),
            strategy: GroupingStrategy::ImageExpiry,
            events: vec![grouped],
        };
        let query = CalendarQuery {
            language: Language::En,
            ..CalendarQuery::default()
        };

        let html = render_calendar_html(&snapshot, &query, now);
        assert!(html.contains("id=\"week-view\""));
        assert!(html.contains("id=\"overview\""));
        assert!(html.contains("×3"));
        assert!(html.contains("Will &lt;BTC&gt; hit $100k?"));
        assert!(html.contains("prob-high"));
        assert!(html.contains("$120K"));
        assert!(html.contains("https://polymarket.com/event/will-btc-hit-100k"));
        assert!(html.contains("-Sports"));
    }
}
