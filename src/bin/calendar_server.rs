use std::sync::Arc;

use polycal::{
    calendar_router, init_logging, log_app_bind, log_app_start, log_source_selected,
    logging_config_from_env, server_config_from_env, CachedCalendarSource, CachedSourceConfig,
    CalendarSnapshotSource, DemoFetcher, EventFetcher, JsonFileFetcher, ServerConfig,
    SnapshotCache, CALENDAR_ROUTES,
};
use tracing::warn;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;

    let server_cfg = server_config_from_env()?;
    log_app_start(&logging_cfg, &server_cfg);

    let source = source_from_config(&server_cfg);
    let app = calendar_router(source);
    let listener = tokio::net::TcpListener::bind(server_cfg.addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr, &CALENDAR_ROUTES);
    axum::serve(listener, app).await?;

    Ok(())
}

fn source_from_config(cfg: &ServerConfig) -> Arc<dyn CalendarSnapshotSource> {
    match &cfg.events_file {
        Some(path) => cached_source(JsonFileFetcher::new(path), cfg),
        None => cached_source(DemoFetcher, cfg),
    }
}

fn cached_source<F: EventFetcher>(fetcher: F, cfg: &ServerConfig) -> Arc<dyn CalendarSnapshotSource> {
    let cache = cfg.cache_path.as_deref().and_then(|path| {
        SnapshotCache::open(path)
            .map_err(|err| {
                warn!(
                    component = "calendar_server",
                    event = "cache.error",
                    op = "open",
                    path = %path.display(),
                    error = %err
                );
            })
            .ok()
    });

    let ttl = cache.as_ref().map(|_| cfg.cache_ttl_ms);
    log_source_selected(fetcher.name(), cfg.grouping, ttl);

    Arc::new(CachedCalendarSource::new(
        fetcher,
        cache,
        CachedSourceConfig {
            ttl_ms: cfg.cache_ttl_ms,
            strategy: cfg.grouping,
        },
    ))
}
