use chrono::Local;
use snapcal_schema::ExtractionContext;

/// Snapshot the host timezone and local clock. Call once per extraction;
/// the pipeline itself never reads the clock.
pub fn capture_context() -> ExtractionContext {
    let timezone = iana_time_zone::get_timezone().unwrap_or_else(|err| {
        tracing::warn!("could not detect local timezone, using UTC: {err}");
        "UTC".to_string()
    });
    ExtractionContext::new(timezone, Local::now().fixed_offset())
}
