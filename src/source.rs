//! Event sources: raw fetchers and the grouped snapshot sources the HTTP
//! layer reads from.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::cache::{SnapshotCache, DEFAULT_CACHE_TTL_MS};
use crate::event::MarketEvent;
use crate::grouping::{group_events_with_report, GroupingStrategy};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read events file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("events file {path} is not a JSON array of rows: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Supplies raw, already server-filtered event rows.
pub trait EventFetcher: Send + Sync + 'static {
    fn fetch(&self) -> Result<Vec<MarketEvent>, SourceError>;

    /// Time of the last upstream change, used to invalidate cached snapshots.
    fn last_modified_ms(&self) -> Option<i64> {
        None
    }

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone)]
pub struct JsonFileFetcher {
    path: PathBuf,
}

impl JsonFileFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventFetcher for JsonFileFetcher {
    fn fetch(&self) -> Result<Vec<MarketEvent>, SourceError> {
        let bytes = fs::read(&self.path).map_err(|source| SourceError::Read {
            path: self.path.clone(),
            source,
        })?;
        let rows: Vec<MarketEvent> =
            serde_json::from_slice(&bytes).map_err(|source| SourceError::Parse {
                path: self.path.clone(),
                source,
            })?;

        Ok(rows.into_iter().filter(|row| !row.hidden).collect())
    }

    fn last_modified_ms(&self) -> Option<i64> {
        let modified = fs::metadata(&self.path).ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(modified).timestamp_millis())
    }

    fn name(&self) -> &'static str {
        "json_file"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DemoFetcher;

impl EventFetcher for DemoFetcher {
    fn fetch(&self) -> Result<Vec<MarketEvent>, SourceError> {
        Ok(demo_events(Utc::now()))
    }

    fn name(&self) -> &'static str {
        "demo"
    }
}

const DEMO_CATEGORIES: [&str; 6] = [
    "Sports",
    "Crypto",
    "Politics",
    "Pop Culture",
    "Science",
    "Business",
];
const DEMO_TAGS: [&str; 5] = ["Games", "Soccer", "Crypto", "Trump", "Elections"];
const DEMO_GROUPS: usize = 20;

/// Deterministic demo rows relative to `now`. Groups of one to three outcome
/// rows share an image and expiry; every fifth group has no image.
pub fn demo_events(now: DateTime<Utc>) -> Vec<MarketEvent> {
    let mut rows = Vec::new();

    for group in 0..DEMO_GROUPS {
        let hours_ahead = 1 + (group as i64 * 31) % (26 * 24);
        let end_date = (now + ChronoDuration::hours(hours_ahead))
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let members = 1 + group % 3;

        for member in 0..members {
            let seed = group * 7 + member * 13;
            let probability = ((seed * 37) % 100) as f64 / 100.0;
            let mut row = MarketEvent::new(
                format!("demo-{group}-{member}"),
                format!("Demo market {}: outcome {}", group + 1, member + 1),
                end_date.clone(),
            )
            .with_volume(((seed * 7_919) % 1_000 + 10) as f64 * 1_000.0)
            .with_yes_probability(probability)
            .with_category(DEMO_CATEGORIES[group % DEMO_CATEGORIES.len()])
            .with_tags([DEMO_TAGS[seed % DEMO_TAGS.len()]])
            .with_slug(format!("demo-market-{}-{}", group + 1, member + 1));

            if group % 5 != 0 {
                row = row.with_image_url(format!("https://example.invalid/demo/{group}.png"));
            }
            rows.push(row);
        }
    }

    rows
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarSnapshot {
    pub generated_at_ms: i64,
    pub strategy: GroupingStrategy,
    pub events: Vec<MarketEvent>,
}

impl CalendarSnapshot {
    pub fn from_raw(raw: &[MarketEvent], strategy: GroupingStrategy, generated_at_ms: i64) -> Self {
        let (events, _) = group_events_with_report(raw, strategy);
        Self {
            generated_at_ms,
            strategy,
            events,
        }
    }
}

pub trait CalendarSnapshotSource: Send + Sync + 'static {
    fn snapshot(&self) -> CalendarSnapshot;
}

#[derive(Clone)]
pub struct InMemoryCalendarSource {
    strategy: GroupingStrategy,
    inner: Arc<RwLock<CalendarSnapshot>>,
}

impl InMemoryCalendarSource {
    pub fn new(raw: &[MarketEvent], strategy: GroupingStrategy) -> Self {
        let snapshot = CalendarSnapshot::from_raw(raw, strategy, Utc::now().timestamp_millis());
        Self {
            strategy,
            inner: Arc::new(RwLock::new(snapshot)),
        }
    }

    pub fn demo() -> Self {
        Self::new(&demo_events(Utc::now()), GroupingStrategy::default())
    }

    pub fn replace_events(&self, raw: &[MarketEvent]) {
        let snapshot =
            CalendarSnapshot::from_raw(raw, self.strategy, Utc::now().timestamp_millis());
        let mut guard = self
            .inner
            .write()
            .expect("in-memory snapshot lock should not be poisoned");
        *guard = snapshot;
    }
}

impl CalendarSnapshotSource for InMemoryCalendarSource {
    fn snapshot(&self) -> CalendarSnapshot {
        self.inner
            .read()
            .expect("in-memory snapshot lock should not be poisoned")
            .clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedSourceConfig {
    pub ttl_ms: i64,
    pub strategy: GroupingStrategy,
}

impl Default for CachedSourceConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_CACHE_TTL_MS,
            strategy: GroupingStrategy::default(),
        }
    }
}

/// Fetch, group and cache. Falls back to grouped demo rows when the fetcher
/// fails; runs uncached when the cache is unavailable.
pub struct CachedCalendarSource<F: EventFetcher> {
    fetcher: F,
    cache: Option<Mutex<SnapshotCache>>,
    cfg: CachedSourceConfig,
}

impl<F: EventFetcher> CachedCalendarSource<F> {
    pub fn new(fetcher: F, cache: Option<SnapshotCache>, cfg: CachedSourceConfig) -> Self {
        Self {
            fetcher,
            cache: cache.map(Mutex::new),
            cfg,
        }
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> CalendarSnapshot {
        let now_ms = now.timestamp_millis();

        if let Some(hit) = self.cached(now_ms) {
            return hit;
        }

        let raw = match self.fetcher.fetch() {
            Ok(rows) => rows,
            Err(err) => {
                warn!(
                    component = "source",
                    event = "source.fetch.error",
                    source = self.fetcher.name(),
                    error = %err
                );
                return CalendarSnapshot::from_raw(&demo_events(now), self.cfg.strategy, now_ms);
            }
        };

        let (events, report) = group_events_with_report(&raw, self.cfg.strategy);
        info!(
            component = "source",
            event = "cache.miss",
            source = self.fetcher.name(),
            input_events = report.input_events,
            output_events = report.output_events,
            collapsed_groups = report.collapsed_groups
        );

        self.store(&events, now_ms);

        CalendarSnapshot {
            generated_at_ms: now_ms,
            strategy: self.cfg.strategy,
            events,
        }
    }

    fn cached(&self, now_ms: i64) -> Option<CalendarSnapshot> {
        let cache = self.lock_cache("load")?;
        match cache.load_fresh(
            now_ms,
            self.cfg.ttl_ms,
            self.cfg.strategy,
            self.fetcher.last_modified_ms(),
        ) {
            Ok(Some(hit)) => {
                info!(
                    component = "source",
                    event = "cache.hit",
                    age_ms = now_ms.saturating_sub(hit.saved_at_ms),
                    events = hit.events.len()
                );
                Some(CalendarSnapshot {
                    generated_at_ms: hit.saved_at_ms,
                    strategy: hit.strategy,
                    events: hit.events,
                })
            }
            Ok(None) => None,
            Err(err) => {
                warn!(component = "source", event = "cache.error", op = "load", error = %err);
                None
            }
        }
    }

    fn store(&self, events: &[MarketEvent], now_ms: i64) {
        let Some(cache) = self.lock_cache("store") else {
            return;
        };
        if let Err(err) = cache.store(events, self.cfg.strategy, now_ms) {
            warn!(component = "source", event = "cache.error", op = "store", error = %err);
        }
    }

    // A panic while holding the connection leaves it in an unknown state;
    // skip the cache rather than touch it again.
    fn lock_cache(&self, op: &'static str) -> Option<MutexGuard<'_, SnapshotCache>> {
        match self.cache.as_ref()?.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                warn!(
                    component = "source",
                    event = "cache.error",
                    op,
                    error = "cache lock poisoned"
                );
                None
            }
        }
    }
}

impl<F: EventFetcher> CalendarSnapshotSource for CachedCalendarSource<F> {
    fn snapshot(&self) -> CalendarSnapshot {
        self.snapshot_at(Utc::now())
    }
}
