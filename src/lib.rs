//! Polymarket expiry calendar.
//!
//! Current implemented scope:
//! - grouping of outcome-variant markets into one representative row
//! - filtering, KST calendar bucketing and UI view state
//! - deep-link resolution for market slugs
//! - SQLite snapshot cache and the axum calendar server

mod cache;
mod calendar;
mod config;
mod dashboard;
mod event;
mod filters;
mod grouping;
mod link;
mod observability;
mod source;
mod view;

pub use cache::{CacheError, CachedSnapshot, SnapshotCache, DEFAULT_CACHE_TTL_MS};
pub use calendar::{
    calendar_overview, date_key, day_events, format_compact_volume, kst_date, kst_date_key,
    kst_time_label, main_probability_pct, probability_band, time_of_day, week_view, DayBucket,
    OverviewDay, ProbabilityBand, TimeOfDay, OVERVIEW_DAYS, OVERVIEW_TOP_EVENTS, WEEK_VIEW_DAYS,
};
pub use config::{
    server_config_from_env, server_config_from_lookup, ServerConfig, ServerConfigError,
    DEFAULT_ADDR, DEFAULT_CACHE_PATH,
};
pub use dashboard::{
    calendar_router, parse_calendar_query, render_calendar_html, CalendarQuery, DayEventView,
    DayResponse, CALENDAR_ROUTES,
};
pub use event::{
    coerce_f64, coerce_volume, MarketEvent, DEFAULT_YES_PROBABILITY, UNCATEGORIZED,
};
pub use filters::{
    apply_filters, category_counts, parse_end_date, tag_counts, EventFilters, TimeRemaining,
    DEFAULT_EXCLUDED_CATEGORIES, DEFAULT_MIN_VOLUME, LIQUIDITY_SHARE_OF_VOLUME,
};
pub use grouping::{
    group_events, group_events_with_report, group_key, normalize_title, parse_grouping_strategy,
    GroupingReport, GroupingStrategy, GroupingStrategyError,
};
pub use link::{
    matching_rule_name, resolve_market_link, resolve_slug, LinkAction, LinkRule, MarketLink,
    EVENT_BASE_URL, LINK_RULES, SEARCH_BASE_URL,
};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_source_selected, logging_config_from_env,
    logging_config_from_lookup, LogFormat, LoggingConfig, LoggingInitError,
};
pub use source::{
    demo_events, CachedCalendarSource, CachedSourceConfig, CalendarSnapshot,
    CalendarSnapshotSource, DemoFetcher, EventFetcher, InMemoryCalendarSource, JsonFileFetcher,
    SourceError,
};
pub use view::{
    active_filter_chips, parse_language, reduce, Command, Density, FilterChip, Language, Theme,
    ViewState,
};
