//! Calendar UI state as a single immutable value plus a command reducer.
//!
//! Frontends translate raw input into [`Command`]s, call [`reduce`], and
//! re-render from the returned state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::MarketEvent;
use crate::filters::{apply_filters, EventFilters, TimeRemaining};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    Ko,
    En,
}

impl Language {
    pub fn locale(self) -> &'static str {
        match self {
            Self::Ko => "ko-KR",
            Self::En => "en-US",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Ko => Self::En,
            Self::En => Self::Ko,
        }
    }
}

pub fn parse_language(raw: &str) -> Option<Language> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "ko" | "ko-kr" => Some(Language::Ko),
        "en" | "en-us" => Some(Language::En),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Density {
    #[default]
    Comfortable,
    Compact,
}

/// One removable entry in the active-filter summary row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum FilterChip {
    Tag(String),
    ExcludedCategory(String),
    TimeRemaining,
    MinVolume,
    MinLiquidity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub language: Language,
    pub theme: Theme,
    pub density: Density,
    pub filters: EventFilters,
    pub draft_filters: EventFilters,
    pub search: String,
    pub open_day: Option<String>,
    pub overview_start_week: u32,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            language: Language::default(),
            theme: Theme::default(),
            density: Density::default(),
            filters: EventFilters::default(),
            draft_filters: EventFilters::default(),
            search: String::new(),
            open_day: None,
            overview_start_week: 0,
        }
    }
}

impl ViewState {
    pub fn visible_events(&self, events: &[MarketEvent], now: DateTime<Utc>) -> Vec<MarketEvent> {
        apply_filters(events, &self.filters, &self.search, now)
    }

    pub fn active_filter_chips(&self) -> Vec<FilterChip> {
        active_filter_chips(&self.filters)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    ToggleCategory(String),
    OpenFilterEditor,
    ToggleDraftTag(String),
    ToggleDraftCategory(String),
    ApplyFilters(EventFilters),
    ResetDraft,
    ClearAllFilters,
    RemoveFilterChip(FilterChip),
    SetSearch(String),
    OpenDay(String),
    CloseDay,
    ShiftOverview(i32),
    ToggleLanguage,
    ToggleTheme,
    ToggleDensity,
}

pub fn reduce(state: &ViewState, command: Command) -> ViewState {
    let mut next = state.clone();

    match command {
        Command::ToggleCategory(category) => {
            toggle_entry(&mut next.filters.excluded_categories, category);
        }
        Command::OpenFilterEditor => {
            next.draft_filters = next.filters.clone();
        }
        Command::ToggleDraftTag(tag) => {
            toggle_entry(&mut next.draft_filters.tags, tag);
        }
        Command::ToggleDraftCategory(category) => {
            toggle_entry(&mut next.draft_filters.excluded_categories, category);
        }
        Command::ApplyFilters(draft) => {
            next.filters = draft.clone();
            next.draft_filters = draft;
        }
        Command::ResetDraft => {
            next.draft_filters = EventFilters::default();
        }
        Command::ClearAllFilters => {
            next.filters = EventFilters::default();
        }
        Command::RemoveFilterChip(chip) => remove_chip(&mut next.filters, chip),
        Command::SetSearch(text) => {
            next.search = text;
        }
        Command::OpenDay(date_key) => {
            next.open_day = Some(date_key);
        }
        Command::CloseDay => {
            next.open_day = None;
        }
        Command::ShiftOverview(delta) => {
            next.overview_start_week = next.overview_start_week.saturating_add_signed(delta);
        }
        Command::ToggleLanguage => {
            next.language = next.language.toggled();
        }
        Command::ToggleTheme => {
            next.theme = match next.theme {
                Theme::Light => Theme::Dark,
                Theme::Dark => Theme::Light,
            };
        }
        Command::ToggleDensity => {
            next.density = match next.density {
                Density::Comfortable => Density::Compact,
                Density::Compact => Density::Comfortable,
            };
        }
    }

    next
}

pub fn active_filter_chips(filters: &EventFilters) -> Vec<FilterChip> {
    let mut chips: Vec<FilterChip> = filters.tags.iter().cloned().map(FilterChip::Tag).collect();
    chips.extend(
        filters
            .excluded_categories
            .iter()
            .cloned()
            .map(FilterChip::ExcludedCategory),
    );
    if filters.time_remaining != TimeRemaining::All {
        chips.push(FilterChip::TimeRemaining);
    }
    if filters.min_volume > 0.0 {
        chips.push(FilterChip::MinVolume);
    }
    if filters.min_liquidity > 0.0 {
        chips.push(FilterChip::MinLiquidity);
    }
    chips
}

fn remove_chip(filters: &mut EventFilters, chip: FilterChip) {
    match chip {
        FilterChip::Tag(tag) => filters.tags.retain(|t| *t != tag),
        FilterChip::ExcludedCategory(category) => {
            filters.excluded_categories.retain(|c| *c != category)
        }
        FilterChip::TimeRemaining => filters.time_remaining = TimeRemaining::All,
        FilterChip::MinVolume => filters.min_volume = 0.0,
        FilterChip::MinLiquidity => filters.min_liquidity = 0.0,
    }
}

fn toggle_entry(entries: &mut Vec<String>, value: String) {
    if let Some(index) = entries.iter().position(|entry| *entry == value) {
        entries.remove(index);
    } else {
        entries.push(value);
    }
}
