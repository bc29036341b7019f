//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose the entry list/edit and backup/restore use cases to Dart via FRB.
//! - Translate core errors into response envelopes with readable messages.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Destructive calls do nothing unless the caller passes `confirmed=true`.
//! - Every call opens the store, runs one use case, and closes it again.
//! - At most one weather lookup is in flight per process.

use chrono::Local;
use heartnotes_core::config::StoreConfig;
use heartnotes_core::enrich::{summarize_open_weather, WEATHER_UNAVAILABLE};
use heartnotes_core::service::backup_service::{
    export_database_to_dir, export_text_to_dir, replace_database_from_path,
    restore_text_from_path,
};
use heartnotes_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    BackupError, CancelToken, Confirmation, DateZone, EnrichmentHandle, EnrichmentOutcome,
    EnrichmentSlot, Entry, EntryFilter, EntryListQuery, EntryService, EntryStore, RepoResult,
    SortOrder, SqliteEntryRepository, WeatherSource,
};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

const STAGING_DIR_NAME: &str = "heartnotes-staging";
/// Upper bound on how long a lookup waits for Dart to deliver a response.
const WEATHER_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);
static STORE_CONFIG: OnceLock<StoreConfig> = OnceLock::new();
static WEATHER_LANE: OnceLock<WeatherLane> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Entry row projected for the list screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryItem {
    pub id: i64,
    /// Epoch milliseconds of the observation.
    pub observed_at_ms: i64,
    /// Epoch milliseconds of the last store write.
    pub modified_at_ms: i64,
    pub count: i64,
    pub total: i64,
    pub edited: bool,
    pub comment: String,
}

/// List response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryListResponse {
    pub ok: bool,
    pub items: Vec<EntryItem>,
    /// Human-readable response message for diagnostics.
    pub message: String,
    /// Effective filter name after normalization.
    pub applied_filter: String,
    /// Effective sort name after normalization.
    pub applied_sort: String,
}

/// Generic action response envelope for entry edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryActionResponse {
    pub ok: bool,
    /// Created or affected entry ID.
    pub entry_id: Option<i64>,
    pub message: String,
}

impl EntryActionResponse {
    fn success(message: impl Into<String>, entry_id: i64) -> Self {
        Self {
            ok: true,
            entry_id: Some(entry_id),
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            entry_id: None,
            message: message.into(),
        }
    }
}

/// Response envelope for backup and restore calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupResponse {
    pub ok: bool,
    /// File written by an export.
    pub path: Option<String>,
    /// Rows written, restored or copied.
    pub rows: u64,
    /// Lines consumed by a text restore, including the failing one.
    pub lines_read: u64,
    pub message: String,
}

impl BackupResponse {
    fn success(message: impl Into<String>, rows: u64) -> Self {
        Self {
            ok: true,
            path: None,
            rows,
            lines_read: 0,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            path: None,
            rows: 0,
            lines_read: 0,
            message: message.into(),
        }
    }

    fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.display().to_string());
        self
    }
}

/// Lists entries with a named filter and sort order.
///
/// Input semantics:
/// - `filter`: `none|nonzero|countEqualsTotal`; unknown names fall back to `none`.
/// - `sort`: `asc|desc`; unknown names fall back to `desc`.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn entry_list(filter: String, sort: String) -> EntryListResponse {
    let query = normalize_query(&filter, &sort);
    let respond = |ok: bool, items: Vec<EntryItem>, message: String| EntryListResponse {
        ok,
        items,
        message,
        applied_filter: query.filter.name().to_string(),
        applied_sort: query.sort.name().to_string(),
    };

    match with_entry_service(|service| service.list_entries(&query)) {
        Ok(entries) => {
            let items = entries.into_iter().map(to_entry_item).collect::<Vec<_>>();
            let message = if items.is_empty() {
                "No entries.".to_string()
            } else {
                format!("Found {} entries.", items.len())
            };
            respond(true, items, message)
        }
        Err(err) => respond(false, Vec::new(), format!("entry_list failed: {err}")),
    }
}

/// Creates a new, unedited entry.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
/// - Negative count, total or timestamp is rejected with `ok=false`.
#[flutter_rust_bridge::frb(sync)]
pub fn entry_create(
    observed_at_ms: i64,
    count: i64,
    total: i64,
    comment: String,
) -> EntryActionResponse {
    match with_entry_service(|service| service.record(observed_at_ms, count, total, comment)) {
        Ok(id) => EntryActionResponse::success("Entry created.", id),
        Err(err) => EntryActionResponse::failure(format!("entry_create failed: {err}")),
    }
}

/// Rewrites an existing entry from the edit screen and flags it edited.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
/// - Unknown `id` returns `ok=false` without touching other rows.
#[flutter_rust_bridge::frb(sync)]
pub fn entry_update(
    id: i64,
    observed_at_ms: i64,
    count: i64,
    total: i64,
    comment: String,
) -> EntryActionResponse {
    match with_entry_service(|service| service.revise(id, observed_at_ms, count, total, comment))
    {
        Ok(true) => EntryActionResponse::success("Entry updated.", id),
        Ok(false) => EntryActionResponse::failure(format!("entry_update failed: no entry {id}")),
        Err(err) => EntryActionResponse::failure(format!("entry_update failed: {err}")),
    }
}

/// Deletes one entry.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn entry_delete(id: i64) -> EntryActionResponse {
    match with_entry_service(|service| service.delete_entry(id)) {
        Ok(true) => EntryActionResponse::success("Entry deleted.", id),
        Ok(false) => EntryActionResponse::failure(format!("entry_delete failed: no entry {id}")),
        Err(err) => EntryActionResponse::failure(format!("entry_delete failed: {err}")),
    }
}

/// Writes a text backup into `dir` using the list screen's filter and sort.
///
/// # FFI contract
/// - Sync call; performs file I/O proportional to the entry count.
/// - Read-only on the store.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn backup_export_text(dir: String, filter: String, sort: String) -> BackupResponse {
    let query = normalize_query(&filter, &sort);
    let result = with_store(|store| {
        let repo = store.repository().map_err(BackupError::from)?;
        export_text_to_dir(
            &repo,
            &query,
            Path::new(dir.trim()),
            DateZone::Local,
            &Local::now(),
        )
    });

    match result {
        Ok(report) => {
            let response = BackupResponse::success(
                format!("Wrote {} entries.", report.entries_written),
                report.entries_written as u64,
            );
            match report.path {
                Some(path) => response.with_path(&path),
                None => response,
            }
        }
        Err(err) => BackupResponse::failure(format!("backup_export_text failed: {err}")),
    }
}

/// Replaces every entry with the contents of a text backup.
///
/// # FFI contract
/// - Destructive; refused unless `confirmed` is true.
/// - On a mid-file failure, `rows` and `lines_read` report what was salvaged.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn backup_restore_text(path: String, confirmed: bool) -> BackupResponse {
    if !confirmed {
        return BackupResponse::failure("backup_restore_text refused: confirmation required");
    }
    let source = PathBuf::from(path.trim());
    let result = with_store(|store| {
        let repo = store.repository().map_err(BackupError::from)?;
        restore_text_from_path(&repo, &source, Confirmation::confirmed_by_user())
    });

    match result {
        Ok(report) => BackupResponse {
            lines_read: report.lines_read as u64,
            ..BackupResponse::success(report.to_string(), report.rows_restored as u64)
        },
        Err(BackupError::Restore {
            rows_restored,
            lines_read,
            cause,
        }) => BackupResponse {
            rows: rows_restored as u64,
            lines_read: lines_read as u64,
            ..BackupResponse::failure(format!(
                "backup_restore_text stopped after {rows_restored} entries: {cause}"
            ))
        },
        Err(err) => BackupResponse::failure(format!("backup_restore_text failed: {err}")),
    }
}

/// Writes a byte-exact database snapshot into `dir`.
///
/// # FFI contract
/// - Briefly closes and reopens the store file.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn backup_export_database(dir: String) -> BackupResponse {
    let result = with_store(|store| {
        export_database_to_dir(store, Path::new(dir.trim()), &Local::now())
    });
    match result {
        Ok(path) => BackupResponse::success("Database saved.", 0).with_path(&path),
        Err(err) => BackupResponse::failure(format!("backup_export_database failed: {err}")),
    }
}

/// Replaces every entry with the rows of another HeartNotes database.
///
/// # FFI contract
/// - Destructive; refused unless `confirmed` is true.
/// - The source is staged locally before the live table is touched.
/// - A failure after staging may leave the store empty.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn backup_replace_database(path: String, confirmed: bool) -> BackupResponse {
    if !confirmed {
        return BackupResponse::failure("backup_replace_database refused: confirmation required");
    }
    let source = PathBuf::from(path.trim());
    let result = with_store(|store| {
        replace_database_from_path(
            store,
            &source,
            &staging_dir(),
            Confirmation::confirmed_by_user(),
        )
    });
    match result {
        Ok(report) => BackupResponse::success(
            format!("Replaced with {} entries.", report.rows_copied),
            report.rows_copied,
        ),
        Err(err) => {
            warn!("event=ffi_replace module=ffi status=error");
            BackupResponse::failure(format!("backup_replace_database failed: {err}"))
        }
    }
}

/// Renders an OpenWeather one-call JSON body as comment text.
///
/// # FFI contract
/// - Pure function; never touches the store.
/// - Never panics; malformed input yields a readable failure sentence.
#[flutter_rust_bridge::frb(sync)]
pub fn weather_summarize(json: String) -> String {
    summarize_open_weather(&json, DateZone::Local)
}

/// Starts the weather lookup for the edit screen.
///
/// Dart owns the network call: after `true` it fetches the OpenWeather body
/// and hands it over with [`weather_deliver`], then collects the comment
/// text with [`weather_wait`].
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Returns `false` and does nothing while another lookup is in flight.
#[flutter_rust_bridge::frb(sync)]
pub fn weather_request() -> bool {
    let lane = weather_lane();
    let Ok(mut pending) = lane.pending.lock() else {
        return false;
    };
    if !lane.slot.is_in_flight() {
        lane.slot.source().discard_stale();
    }
    match lane.slot.request() {
        Some(handle) => {
            *pending = Some(PendingLookup {
                token: handle.cancel_token(),
                handle: Some(handle),
            });
            true
        }
        None => false,
    }
}

/// Hands the fetched OpenWeather body to the running lookup.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Returns `false` when no lookup is waiting for a response.
#[flutter_rust_bridge::frb(sync)]
pub fn weather_deliver(json: String) -> bool {
    let lane = weather_lane();
    if !lane.slot.is_in_flight() {
        return false;
    }
    match lane.feed.lock() {
        Ok(feed) => feed.send(Some(json)).is_ok(),
        Err(_) => false,
    }
}

/// Cancels the current lookup; its result is discarded.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Safe to call repeatedly, with nothing pending, or after completion.
#[flutter_rust_bridge::frb(sync)]
pub fn weather_cancel() {
    let lane = weather_lane();
    if let Ok(mut pending) = lane.pending.lock() {
        if let Some(lookup) = pending.take() {
            lookup.token.cancel();
        }
    }
    if lane.slot.is_in_flight() {
        if let Ok(feed) = lane.feed.lock() {
            let _ = feed.send(None);
        }
    }
    info!("event=weather_cancel module=ffi status=ok");
}

/// Waits at most `timeout_ms` for the lookup and returns the text to append.
///
/// Returns `None` when nothing is pending, the lookup was cancelled, or the
/// wait elapsed; after a timeout the lookup stays pending. A lookup that ran
/// but produced nothing yields `Weather NA.`.
pub fn weather_wait(timeout_ms: u64) -> Option<String> {
    let lane = weather_lane();
    let mut handle = {
        let mut pending = lane.pending.lock().ok()?;
        pending.as_mut()?.handle.take()?
    };

    let outcome = handle.wait(Duration::from_millis(timeout_ms));
    let mut pending = lane.pending.lock().ok()?;
    match outcome {
        EnrichmentOutcome::Ready(text) => {
            pending.take();
            Some(text)
        }
        EnrichmentOutcome::Unavailable => {
            pending.take();
            Some(WEATHER_UNAVAILABLE.to_string())
        }
        EnrichmentOutcome::TimedOut => {
            if let Some(lookup) = pending.as_mut() {
                if lookup.handle.is_none() {
                    lookup.handle = Some(handle);
                }
            }
            None
        }
        EnrichmentOutcome::Cancelled => None,
    }
}

/// Weather source fed by Dart through [`weather_deliver`].
struct DeliveredWeather {
    feed: Mutex<Receiver<Option<String>>>,
}

impl DeliveredWeather {
    /// Drops responses left over from a cancelled or finished lookup.
    fn discard_stale(&self) {
        if let Ok(feed) = self.feed.lock() {
            while feed.try_recv().is_ok() {}
        }
    }
}

impl WeatherSource for DeliveredWeather {
    fn current_conditions(&self) -> Option<String> {
        let feed = self.feed.lock().ok()?;
        match feed.recv_timeout(WEATHER_DELIVERY_TIMEOUT) {
            Ok(Some(json)) => Some(summarize_open_weather(&json, DateZone::Local)),
            _ => None,
        }
    }
}

struct PendingLookup {
    token: CancelToken,
    /// Taken while a caller is blocked in [`weather_wait`].
    handle: Option<EnrichmentHandle>,
}

struct WeatherLane {
    slot: EnrichmentSlot<DeliveredWeather>,
    feed: Mutex<Sender<Option<String>>>,
    pending: Mutex<Option<PendingLookup>>,
}

fn weather_lane() -> &'static WeatherLane {
    WEATHER_LANE.get_or_init(|| {
        let (sender, receiver) = mpsc::channel();
        WeatherLane {
            slot: EnrichmentSlot::new(DeliveredWeather {
                feed: Mutex::new(receiver),
            }),
            feed: Mutex::new(sender),
            pending: Mutex::new(None),
        }
    })
}

fn normalize_query(filter: &str, sort: &str) -> EntryListQuery {
    EntryListQuery::new(
        EntryFilter::from_name(filter.trim()).unwrap_or_default(),
        SortOrder::from_name(sort.trim()).unwrap_or_default(),
    )
}

fn store_config() -> &'static StoreConfig {
    STORE_CONFIG.get_or_init(StoreConfig::from_env)
}

fn staging_dir() -> PathBuf {
    std::env::temp_dir().join(STAGING_DIR_NAME)
}

fn with_store<T>(
    f: impl FnOnce(&mut EntryStore) -> Result<T, BackupError>,
) -> Result<T, String> {
    let mut store = EntryStore::open(store_config().clone())
        .map_err(|err| format!("entry DB open failed: {err}"))?;
    let result = f(&mut store).map_err(|err| err.to_string());
    if let Err(err) = store.close() {
        warn!("event=ffi_store_close module=ffi status=error error={err}");
    }
    result
}

fn with_entry_service<T>(
    f: impl FnOnce(&EntryService<SqliteEntryRepository<'_>>) -> RepoResult<T>,
) -> Result<T, String> {
    with_store(|store| {
        let repo = store.repository()?;
        let service = EntryService::new(repo);
        Ok(f(&service)?)
    })
}

fn to_entry_item(entry: Entry) -> EntryItem {
    EntryItem {
        id: entry.id,
        observed_at_ms: entry.observed_at,
        modified_at_ms: entry.modified_at,
        count: entry.count,
        total: entry.total,
        edited: entry.edited,
        comment: entry.comment,
    }
}
