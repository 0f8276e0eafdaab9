//! Reconciliation passes
//!
//! `run_sync` is the mapping-based bidirectional engine; `run_full_rewrite`
//! is the older authoritative calendar rewrite kept for the admin surface;
//! `reconcile_pages` serves webhook-targeted updates.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value};

use notidav_caldav::{CalDavClient, RemoteEvent};
use notidav_core::ics::{build_event, parse_event, EventInput};
use notidav_core::overdue::status_for_task;
use notidav_core::{canonical_task_hash, event_url, resolve_date_only_tz, Task};
use notidav_notion::client::DataSource;
use notidav_notion::{is_task_schema, parse_page, NotionClient};
use notidav_store::settings::DEFAULT_CALENDAR_COLOR;
use notidav_store::{MappingRecord, Settings, StateStore};

use crate::decide::{decide, pick_newer, SyncAction};
use crate::error::{EngineError, EngineResult};
use crate::gate::SyncGate;
use crate::report::SyncReport;

/// Direction flags and token usage for one pass
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub allow_notion_writes: bool,
    pub allow_caldav_writes: bool,
    /// Use the stored sync tokens; deletions are suppressed on such passes
    pub incremental: bool,
}

impl SyncOptions {
    /// Bidirectional pass, incremental or authoritative
    pub fn bidirectional(incremental: bool) -> Self {
        Self { allow_notion_writes: true, allow_caldav_writes: true, incremental }
    }

    /// Authoritative pass writing only toward Notion
    pub fn caldav_to_notion() -> Self {
        Self { allow_notion_writes: true, allow_caldav_writes: false, incremental: false }
    }
}

/// Whether the periodic authoritative pass is due
pub fn full_sync_due(settings: &Settings, now: DateTime<Utc>) -> bool {
    let Some(last) = settings.last_full_sync.as_deref() else {
        return true;
    };
    let Ok(last) = DateTime::parse_from_rfc3339(last) else {
        return true;
    };
    let interval = chrono::Duration::minutes(settings.full_sync_interval_minutes() as i64);
    now - last.with_timezone(&Utc) >= interval
}

/// The reconciliation engine for one account
pub struct SyncEngine {
    store: StateStore,
    caldav: CalDavClient,
    notion: NotionClient,
    gate: SyncGate,
}

struct PassSettings {
    calendar_href: String,
    calendar_color: String,
    date_only_tz: Tz,
}

impl SyncEngine {
    pub fn new(store: StateStore, caldav: CalDavClient, notion: NotionClient) -> Self {
        Self { store, caldav, notion, gate: SyncGate::new() }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn gate(&self) -> &SyncGate {
        &self.gate
    }

    async fn pass_settings(&self) -> EngineResult<(Settings, PassSettings)> {
        let settings = self.store.load_settings().await;
        let calendar_href = settings
            .calendar_href
            .clone()
            .ok_or(EngineError::CalendarNotConfigured)?;
        let pass = PassSettings {
            calendar_href,
            calendar_color: settings
                .calendar_color
                .clone()
                .unwrap_or_else(|| DEFAULT_CALENDAR_COLOR.to_string()),
            date_only_tz: resolve_date_only_tz(
                settings.date_only_timezone.as_deref(),
                settings.calendar_timezone.as_deref(),
            ),
        };
        Ok((settings, pass))
    }

    fn build_ics(&self, task: &Task, pass: &PassSettings) -> EngineResult<String> {
        let status_name = status_for_task(task, pass.date_only_tz, Utc::now());
        let ics = build_event(&EventInput {
            notion_id: &task.notion_id,
            title: &task.title,
            status_name: &status_name,
            start: task.start_date.as_deref(),
            end: task.end_date.as_deref(),
            reminder: task.reminder.as_deref(),
            description: task.description.as_deref(),
            category: task.category.as_deref(),
            color: Some(&pass.calendar_color),
            url: task.url.as_deref(),
        })?;
        Ok(ics)
    }

    /// Data sources whose schema marks them as task-bearing
    async fn task_data_sources(&self) -> EngineResult<Vec<DataSource>> {
        let mut retained = Vec::new();
        for source in self.notion.list_data_sources().await? {
            match self.notion.data_source_properties(&source.id).await {
                Ok(meta) => {
                    let properties = meta.get("properties").cloned().unwrap_or(Value::Null);
                    if is_task_schema(&properties) {
                        retained.push(source);
                    }
                }
                Err(err) => {
                    tracing::warn!("skipping data source {}: {err}", source.id);
                }
            }
        }
        Ok(retained)
    }

    async fn gather_notion(
        &self,
        changed_since: Option<&str>,
    ) -> EngineResult<(HashMap<String, Task>, Option<String>)> {
        let sources = self.task_data_sources().await?;
        let default_ds = sources.first().map(|source| source.id.clone());
        let mut tasks = HashMap::new();
        for source in sources {
            let pages = self.notion.query_pages(&source.id, changed_since).await?;
            for page in pages {
                let mut task = parse_page(&page);
                if task.notion_id.is_empty() {
                    continue;
                }
                task.database_name = source.title.clone();
                if task.database_id.is_none() {
                    task.database_id = Some(source.id.clone());
                }
                tasks.insert(task.notion_id.clone(), task);
            }
        }
        Ok((tasks, default_ds))
    }

    fn remote_event_to_task(event: &RemoteEvent, report: &mut SyncReport) -> Option<Task> {
        let parsed = match parse_event(&event.ics) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!("unparseable event at {}: {err}", event.href);
                report.errors += 1;
                return None;
            }
        };
        let notion_id = parsed
            .notion_id
            .clone()
            .or_else(|| notidav_caldav::client::notion_id_from_href(&event.href))?;
        Some(Task {
            notion_id,
            title: parsed.title,
            status: Some(parsed.status.unwrap_or_else(|| "Todo".to_string())),
            start_date: parsed.start_date,
            end_date: parsed.end_date,
            reminder: parsed.reminder,
            category: parsed.category,
            description: parsed.description,
            url: None,
            database_id: None,
            database_name: "CalDAV".to_string(),
            last_edited_time: parsed.last_modified,
        })
    }

    /// One reconciliation pass
    pub async fn run_sync(&self, options: SyncOptions) -> EngineResult<SyncReport> {
        let _guard = self.gate.try_acquire().ok_or(EngineError::Busy)?;
        self.run_sync_locked(options).await
    }

    async fn run_sync_locked(&self, options: SyncOptions) -> EngineResult<SyncReport> {
        let (_, pass) = self.pass_settings().await?;
        let mut report = SyncReport::default();

        // Gather: Notion side, optionally filtered by the stored cursor
        let notion_token = if options.incremental {
            self.store.load_notion_sync_token().await
        } else {
            None
        };
        let (notion_tasks, default_ds) = self.gather_notion(notion_token.as_deref()).await?;

        // Gather: CalDAV side via the delta protocol
        let caldav_token = if options.incremental {
            self.store.load_caldav_sync_token().await
        } else {
            None
        };
        let delta = self
            .caldav
            .list_events_delta(&pass.calendar_href, caldav_token.as_deref())
            .await?;

        let mut caldav_tasks: HashMap<String, Task> = HashMap::new();
        let mut caldav_etags: HashMap<String, String> = HashMap::new();
        for event in &delta.changed {
            let Some(task) = Self::remote_event_to_task(event, &mut report) else {
                continue;
            };
            if let Some(etag) = &event.etag {
                caldav_etags.insert(task.notion_id.clone(), etag.clone());
            }
            caldav_tasks.insert(task.notion_id.clone(), task);
        }

        // Tombstones drop their mapping; the Notion page stays untouched
        for href in &delta.deleted_hrefs {
            let Some(notion_id) = notidav_caldav::client::notion_id_from_href(href) else {
                continue;
            };
            if let Some(record) = self.store.mapping_by_notion(&notion_id).await {
                tracing::info!("event {notion_id} deleted on calendar; dropping mapping");
                self.store.delete_mapping(&record).await;
            }
        }

        // Decide and apply over the union of both key sets
        let keys: BTreeSet<String> = notion_tasks
            .keys()
            .chain(caldav_tasks.keys())
            .cloned()
            .collect();
        report.synced = keys.len();

        for key in &keys {
            let notion_task = notion_tasks.get(key);
            let caldav_task = caldav_tasks.get(key);
            let mapping = self.store.mapping_by_notion(key).await;
            let decision = decide(mapping.as_ref(), notion_task, caldav_task);
            tracing::debug!("{key}: {:?} ({})", decision.action, decision.detail);

            self.apply_decision(
                decision.action,
                key,
                notion_task,
                caldav_task,
                mapping,
                caldav_etags.get(key).map(String::as_str),
                default_ds.as_deref(),
                &pass,
                options,
                notion_token.is_some(),
                &mut report,
            )
            .await;
        }

        // Commit cursors only after the apply phase
        let mut latest_edit: Option<&str> = None;
        for task in notion_tasks.values() {
            latest_edit = pick_newer(latest_edit, task.last_edited_time.as_deref());
        }
        if let Some(latest) = latest_edit {
            self.store.persist_notion_sync_token(Some(latest)).await;
        }
        if let Some(next_token) = delta.next_token.as_deref() {
            self.store.persist_caldav_sync_token(Some(next_token)).await;
        }

        tracing::info!("sync pass finished: {report}");
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_decision(
        &self,
        action: SyncAction,
        key: &str,
        notion_task: Option<&Task>,
        caldav_task: Option<&Task>,
        mapping: Option<MappingRecord>,
        caldav_etag: Option<&str>,
        default_ds: Option<&str>,
        pass: &PassSettings,
        options: SyncOptions,
        notion_incremental: bool,
        report: &mut SyncReport,
    ) {
        match action {
            SyncAction::Noop => report.noop += 1,
            SyncAction::Recalibrate => {
                let Some(mut record) = mapping else {
                    report.noop += 1;
                    return;
                };
                let Some(task) = notion_task else {
                    report.noop += 1;
                    return;
                };
                let hash = canonical_task_hash(task);
                record.notion_hash = Some(hash.clone());
                record.caldav_hash = Some(hash);
                record.notion_last_edited = task.last_edited_time.clone();
                record.touch();
                self.store.save_mapping(&record).await;
                report.recalibrate += 1;
            }
            SyncAction::CreateCalDav | SyncAction::UpdateCalDav => {
                if !options.allow_caldav_writes {
                    report.skipped += 1;
                    return;
                }
                let Some(task) = notion_task else {
                    report.noop += 1;
                    return;
                };
                match self.write_event(task, mapping, caldav_etag, pass).await {
                    Ok(()) => {
                        if action == SyncAction::CreateCalDav {
                            report.create_caldav += 1;
                        } else {
                            report.update_caldav += 1;
                        }
                    }
                    Err(err) => {
                        tracing::warn!("write to calendar failed for {key}: {err}");
                        report.errors += 1;
                    }
                }
            }
            SyncAction::DeleteCalDav => {
                if !options.allow_caldav_writes {
                    report.skipped += 1;
                    return;
                }
                // Absence from an incremental result set does not prove
                // deletion
                if notion_incremental {
                    report.skipped += 1;
                    return;
                }
                let Some(record) = mapping else {
                    report.noop += 1;
                    return;
                };
                let url = event_url(&pass.calendar_href, &record.notion_page_id);
                match self.caldav.delete_event(&url).await {
                    Ok(()) => {
                        self.store.delete_mapping(&record).await;
                        report.delete_caldav += 1;
                    }
                    Err(err) => {
                        tracing::warn!("delete failed for {key}: {err}");
                        report.errors += 1;
                    }
                }
            }
            SyncAction::CreateNotion | SyncAction::UpdateNotion => {
                if !options.allow_notion_writes {
                    report.skipped += 1;
                    return;
                }
                let Some(task) = caldav_task else {
                    report.noop += 1;
                    return;
                };
                let result = if action == SyncAction::CreateNotion {
                    let Some(ds_id) = task.database_id.as_deref().or(default_ds) else {
                        tracing::warn!("no task data source to create {key} in; skipping");
                        report.skipped += 1;
                        return;
                    };
                    self.notion.create_page(ds_id, task).await
                } else {
                    self.notion.update_page(&task.notion_id, task).await
                };
                match result {
                    Ok(_) => {
                        let hash = canonical_task_hash(task);
                        let mut record =
                            mapping.unwrap_or_else(|| MappingRecord::new(&task.notion_id));
                        record.notion_hash = Some(hash.clone());
                        record.caldav_hash = Some(hash);
                        record.notion_last_edited = task.last_edited_time.clone();
                        if let Some(etag) = caldav_etag {
                            record.caldav_etag = Some(etag.to_string());
                        }
                        record.touch();
                        self.store.save_mapping(&record).await;
                        if action == SyncAction::CreateNotion {
                            report.create_notion += 1;
                        } else {
                            report.update_notion += 1;
                        }
                    }
                    Err(err) => {
                        tracing::warn!("write to notion failed for {key}: {err}");
                        report.errors += 1;
                    }
                }
            }
        }
    }

    /// PUT an event for a task and persist the mapping with equal hashes
    async fn write_event(
        &self,
        task: &Task,
        mapping: Option<MappingRecord>,
        fallback_etag: Option<&str>,
        pass: &PassSettings,
    ) -> EngineResult<()> {
        let ics = self.build_ics(task, pass)?;
        let url = event_url(&pass.calendar_href, &task.notion_id);
        let known_etag = mapping
            .as_ref()
            .and_then(|record| record.caldav_etag.as_deref())
            .or(fallback_etag);
        let new_etag = self.caldav.put_event(&url, &ics, known_etag).await?;

        let hash = canonical_task_hash(task);
        let mut record = mapping.unwrap_or_else(|| MappingRecord::new(&task.notion_id));
        if let Some(etag) = new_etag {
            record.caldav_etag = Some(etag);
        }
        record.notion_hash = Some(hash.clone());
        record.caldav_hash = Some(hash);
        record.notion_last_edited = task.last_edited_time.clone();
        record.touch();
        self.store.save_mapping(&record).await;
        Ok(())
    }

    /// Authoritative Notion → CalDAV rewrite (admin `notion_to_caldav`).
    ///
    /// Writes every dated task and removes calendar events no task claims.
    pub async fn run_full_rewrite(&self) -> EngineResult<SyncReport> {
        let _guard = self.gate.try_acquire().ok_or(EngineError::Busy)?;
        let (_, pass) = self.pass_settings().await?;
        let mut report = SyncReport::default();

        let existing = self.caldav.list_events(&pass.calendar_href).await?;
        let (tasks, _) = self.gather_notion(None).await?;
        report.synced = tasks.len();

        let mut kept: BTreeSet<String> = BTreeSet::new();
        for task in tasks.values() {
            if !task.has_start() {
                report.noop += 1;
                continue;
            }
            match self.write_event(task, self.store.mapping_by_notion(&task.notion_id).await, None, &pass).await {
                Ok(()) => {
                    kept.insert(task.notion_id.clone());
                    report.update_caldav += 1;
                }
                Err(err) => {
                    tracing::warn!("rewrite failed for {}: {err}", task.notion_id);
                    report.errors += 1;
                }
            }
        }

        for event in existing {
            let Some(notion_id) = event.notion_id else {
                continue;
            };
            if kept.contains(&notion_id) {
                continue;
            }
            match self.caldav.delete_event(&event.href).await {
                Ok(()) => {
                    if let Some(record) = self.store.mapping_by_notion(&notion_id).await {
                        self.store.delete_mapping(&record).await;
                    }
                    report.delete_caldav += 1;
                }
                Err(err) => {
                    tracing::warn!("cleanup delete failed for {notion_id}: {err}");
                    report.errors += 1;
                }
            }
        }

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        self.store
            .update_settings(&[("last_full_sync", Some(json!(now)))])
            .await;
        tracing::info!("full rewrite finished: {report}");
        Ok(report)
    }

    /// Targeted reconciliation for webhook-reported pages
    pub async fn reconcile_pages(&self, page_ids: &[String]) -> EngineResult<Vec<String>> {
        if page_ids.is_empty() {
            return Ok(Vec::new());
        }
        let (_, pass) = self.pass_settings().await?;
        for page_id in page_ids {
            if let Err(err) = self.reconcile_page(page_id, &pass).await {
                tracing::warn!("webhook reconcile failed for {page_id}: {err}");
            }
        }
        Ok(page_ids.to_vec())
    }

    async fn reconcile_page(&self, page_id: &str, pass: &PassSettings) -> EngineResult<()> {
        let url = event_url(&pass.calendar_href, page_id);
        let Some(page) = self.notion.get_page(page_id).await? else {
            self.caldav.delete_event(&url).await?;
            tracing::info!("deleted event for {page_id} (page missing)");
            return Ok(());
        };

        let archived = page.get("archived").and_then(Value::as_bool).unwrap_or(false);
        let mut task = parse_page(&page);
        if archived || !task.has_start() || task.database_id.is_none() {
            self.caldav.delete_event(&url).await?;
            tracing::info!("deleted event for {page_id}");
            return Ok(());
        }

        if let Some(ds_id) = task.database_id.clone() {
            task.database_name = self.notion.data_source_title(&ds_id).await;
        }
        let mapping = self.store.mapping_by_notion(&task.notion_id).await;
        self.write_event(&task, mapping, None, pass).await?;
        tracing::info!("wrote event for {page_id}");
        Ok(())
    }

    /// Directional pass used by the admin surface
    pub async fn run_caldav_to_notion(&self) -> EngineResult<SyncReport> {
        self.run_sync(SyncOptions::caldav_to_notion()).await
    }

    /// Can we reach the Notion API with the configured credentials?
    pub async fn check_notion(&self) -> bool {
        self.notion.list_data_sources().await.is_ok()
    }

    /// Can we reach the calendar collection?
    pub async fn check_caldav(&self) -> bool {
        let settings = self.store.load_settings().await;
        let Some(href) = settings.calendar_href.as_deref() else {
            return false;
        };
        self.caldav.ping(href).await.is_ok()
    }

    /// Persist admin settings updates, normalizing and enforcing the
    /// calendar color and refreshing remote calendar properties.
    pub async fn apply_settings(&self, updates: &[(&str, Option<Value>)]) -> Settings {
        let mut normalized: Vec<(&str, Option<Value>)> = Vec::with_capacity(updates.len());
        for (field, value) in updates {
            if *field == "calendar_color" {
                let color = value
                    .as_ref()
                    .and_then(Value::as_str)
                    .and_then(notidav_caldav::normalize_calendar_color);
                normalized.push((*field, color.map(Value::String)));
            } else {
                normalized.push((*field, value.clone()));
            }
        }
        let settings = self.store.update_settings(&normalized).await;

        if let (Some(href), Some(color)) =
            (settings.calendar_href.as_deref(), settings.calendar_color.as_deref())
        {
            if let Err(err) = self.caldav.apply_calendar_color(href, color).await {
                tracing::warn!("failed to enforce calendar color: {err}");
            }
            match self.caldav.fetch_calendar_properties(href).await {
                Ok((_, Some(timezone))) => {
                    let mut followups: Vec<(&str, Option<Value>)> = Vec::new();
                    if settings.calendar_timezone.as_deref() != Some(timezone.as_str()) {
                        followups.push(("calendar_timezone", Some(json!(timezone))));
                    }
                    if settings.date_only_timezone.is_none() {
                        followups.push(("date_only_timezone", Some(json!(timezone))));
                    }
                    if !followups.is_empty() {
                        return self.store.update_settings(&followups).await;
                    }
                }
                Ok((_, None)) => {}
                Err(err) => tracing::warn!("calendar property probe failed: {err}"),
            }
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_full_sync_due_without_record() {
        assert!(full_sync_due(&Settings::default(), at(12)));
    }

    #[test]
    fn test_full_sync_due_respects_interval() {
        let mut settings = Settings::default();
        settings.full_sync_interval_minutes = Some(60);
        settings.last_full_sync = Some("2025-06-01T11:30:00Z".into());
        assert!(!full_sync_due(&settings, at(12)));

        settings.last_full_sync = Some("2025-06-01T10:59:00Z".into());
        assert!(full_sync_due(&settings, at(12)));
    }

    #[test]
    fn test_full_sync_due_on_unparseable_record() {
        let mut settings = Settings::default();
        settings.last_full_sync = Some("not a timestamp".into());
        assert!(full_sync_due(&settings, at(12)));
    }

    #[test]
    fn test_sync_option_presets() {
        let bidirectional = SyncOptions::bidirectional(true);
        assert!(bidirectional.allow_notion_writes);
        assert!(bidirectional.allow_caldav_writes);
        assert!(bidirectional.incremental);

        let directional = SyncOptions::caldav_to_notion();
        assert!(directional.allow_notion_writes);
        assert!(!directional.allow_caldav_writes);
        assert!(!directional.incremental);
    }
}
