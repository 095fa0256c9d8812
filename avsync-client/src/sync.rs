//! Synchronization of one attribute view with its remote source.
//!
//! [`TableSync`] owns the current [`Table`] and is the only thing that
//! replaces it. Readers take an `Arc<Table>` snapshot, which stays valid
//! even when a reload swaps the table between await points.
//!
//! Load cycle: `Idle -> Loading -> Ready | Error`. A failed load keeps the
//! previous table and records the message.

use crate::config::{SourceConfig, SyncConfig};
use crate::error::{PreconditionError, SyncError, SyncResult};
use crate::notifications::{Notification, Notifier};
use crate::polling::{poll_until, PollOutcome, PollPolicy};
use avsync_core::construction::{is_truthy, scalar_string};
use avsync_core::projection::format_ymd;
use avsync_core::shape::{field, id_string};
use avsync_core::{
    build_columns, build_table, build_value, build_views, created_unit_id, AttachSource,
    ColumnType, DetachedField, FieldRoles, FieldUpdate, FieldWrite, NewColumn, RelationEncoding,
    ReportRange, ReportSummary, RoleColumn, RowFilter, RowQuery, Table, Task, TaskPatch,
    Transport, TransportError, ValidationError, ViewInfo,
};
use chrono::{Local, NaiveDate, TimeDelta};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

const DEFAULT_TASK_TEXT: &str = "New task";

// ============================================================================
// CONTEXT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub poll: PollPolicy,
    pub reload_after_write: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            poll: PollPolicy::from(config),
            reload_after_write: config.reload_after_write,
        }
    }
}

/// Everything a [`TableSync`] needs from its owning session.
#[derive(Clone)]
pub struct SyncContext {
    pub transport: Arc<dyn Transport>,
    pub notifier: Arc<dyn Notifier>,
    pub source: SourceConfig,
    pub settings: SyncSettings,
}

impl SyncContext {
    pub fn new(
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn Notifier>,
        source: SourceConfig,
    ) -> Self {
        Self {
            transport,
            notifier,
            source,
            settings: SyncSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }
}

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    pub phase: LoadPhase,
    pub busy: bool,
    pub last_error: Option<String>,
}

// ============================================================================
// TABLE SYNC
// ============================================================================

pub struct TableSync {
    ctx: SyncContext,
    table: RwLock<Arc<Table>>,
    state: RwLock<SyncState>,
}

impl TableSync {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            ctx,
            table: RwLock::new(Arc::new(Table::default())),
            state: RwLock::new(SyncState::default()),
        }
    }

    pub fn source(&self) -> &SourceConfig {
        &self.ctx.source
    }

    pub fn roles(&self) -> &FieldRoles {
        &self.ctx.source.roles
    }

    pub async fn snapshot(&self) -> Arc<Table> {
        self.table.read().await.clone()
    }

    pub async fn state(&self) -> SyncState {
        self.state.read().await.clone()
    }

    fn source_id(&self) -> SyncResult<&str> {
        let av_id = self.ctx.source.av_id.trim();
        if av_id.is_empty() {
            return Err(PreconditionError::MissingSource(None).into());
        }
        Ok(av_id)
    }

    fn notify_failure(&self, summary: &str, err: &SyncError) {
        self.ctx
            .notifier
            .notify(Notification::failure(summary, err.user_message()));
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// First load of the configured source.
    ///
    /// A role pointing at a column the source does not have fails the call,
    /// but the loaded table stays available.
    pub async fn init(&self) -> SyncResult<()> {
        let table = self.reload().await?;
        if let Err(err) = self.roles().validate(&table.columns) {
            tracing::warn!(
                source_id = %self.ctx.source.av_id,
                error = %err,
                "Field role references an unknown column"
            );
            return Err(err.into());
        }
        Ok(())
    }

    /// Drop the table and return to `Idle`.
    pub async fn teardown(&self) {
        *self.table.write().await = Arc::new(Table::default());
        *self.state.write().await = SyncState::default();
        tracing::debug!(source_id = %self.ctx.source.av_id, "Table sync torn down");
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Fetch columns and rows of `source_id` and replace the table.
    ///
    /// On failure the previous table stays in place and the error is
    /// recorded in the state before being returned.
    pub async fn load(&self, source_id: &str, view_id: Option<&str>) -> SyncResult<Arc<Table>> {
        {
            let mut state = self.state.write().await;
            state.phase = LoadPhase::Loading;
            state.busy = true;
            state.last_error = None;
        }
        tracing::debug!(source_id = %source_id, view_id = ?view_id, "Loading table");

        match self.fetch_table(source_id, view_id).await {
            Ok(table) => {
                let table = Arc::new(table);
                *self.table.write().await = table.clone();
                let mut state = self.state.write().await;
                state.phase = LoadPhase::Ready;
                state.busy = false;
                tracing::info!(
                    source_id = %source_id,
                    columns = table.columns.len(),
                    rows = table.rows.len(),
                    "Table loaded"
                );
                Ok(table)
            }
            Err(err) => {
                let mut state = self.state.write().await;
                state.phase = LoadPhase::Error;
                state.busy = false;
                state.last_error = Some(err.to_string());
                tracing::error!(source_id = %source_id, error = %err, "Table load failed");
                Err(err.into())
            }
        }
    }

    /// Reload the configured source and view.
    pub async fn reload(&self) -> SyncResult<Arc<Table>> {
        let source_id = self.source_id()?;
        self.load(source_id, self.ctx.source.view_id.as_deref())
            .await
    }

    async fn fetch_table(
        &self,
        source_id: &str,
        view_id: Option<&str>,
    ) -> Result<Table, TransportError> {
        let keys = self.ctx.transport.fetch_columns(source_id).await?;
        let columns = build_columns(&keys);
        let query = RowQuery::all(view_id.map(str::to_string));
        let rows = self.ctx.transport.fetch_rows(source_id, &query).await?;
        Ok(build_table(&rows, columns))
    }

    /// Views of the configured source.
    pub async fn list_views(&self) -> SyncResult<Vec<ViewInfo>> {
        let source_id = self.source_id()?;
        let response = self.ctx.transport.fetch_views(source_id).await?;
        Ok(build_views(&response))
    }

    /// Give every task role a column on the configured source.
    ///
    /// A role already pointing at an existing column is kept. Otherwise a
    /// column named like the role default is reused, or created. Returns the
    /// resulting roles for the caller to persist; a column that cannot be
    /// created is reported and leaves its role unchanged.
    pub async fn ensure_role_columns(&self) -> SyncResult<FieldRoles> {
        let source_id = self.source_id()?;
        let keys = self.ctx.transport.fetch_columns(source_id).await?;
        let columns = build_columns(&keys);
        let mut roles = self.roles().clone();

        for spec in RoleColumn::DEFAULTS {
            let configured = roles
                .get(spec.role)
                .is_some_and(|key_id| columns.iter().any(|c| c.key_id == key_id));
            if configured {
                continue;
            }
            if let Some(existing) = spec.find_in(&columns) {
                roles.set(spec.role, existing.key_id.clone());
                continue;
            }

            let column = NewColumn {
                key_id: generate_item_id(),
                name: spec.name.to_string(),
                column_type: spec.column_type.clone(),
                options: spec.declared_options(),
            };
            let summary = format!("Create column {} failed", spec.name);
            match self.ctx.transport.add_column(source_id, &column).await {
                Ok(response) if response.is_success() => {
                    let key_id = response
                        .data
                        .as_ref()
                        .and_then(|data| field(data, "id"))
                        .and_then(id_string)
                        .unwrap_or(column.key_id);
                    tracing::info!(
                        source_id = %source_id,
                        key_id = %key_id,
                        name = spec.name,
                        "Role column created"
                    );
                    self.ctx
                        .notifier
                        .notify(Notification::info(format!("Created column {}", spec.name)));
                    roles.set(spec.role, key_id);
                }
                Ok(response) => self.notify_failure(&summary, &SyncError::rejected(response)),
                Err(err) => self.notify_failure(&summary, &SyncError::from(err)),
            }
        }

        self.reload().await?;
        Ok(roles)
    }

    // ------------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------------

    pub async fn task(&self, item_id: &str) -> Option<Task> {
        self.snapshot().await.task(item_id, self.roles())
    }

    pub async fn tasks(&self) -> Vec<Task> {
        self.snapshot().await.tasks(self.roles())
    }

    pub async fn report(&self, filter: &RowFilter, range: &ReportRange) -> ReportSummary {
        let table = self.snapshot().await;
        ReportSummary::build(&table, self.roles(), filter, range)
    }

    // ------------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------------

    /// Write `updates` to one row, reloading per the configured default.
    pub async fn batch_update(&self, item_id: &str, updates: Vec<FieldUpdate>) -> SyncResult<()> {
        self.batch_update_with_reload(item_id, updates, self.ctx.settings.reload_after_write)
            .await
    }

    /// Write `updates` to one row as a single batch.
    ///
    /// A rejected batch that touches a relation field is retried once per
    /// [`RelationEncoding::RETRY_ORDER`] entry, substituting only the
    /// relation values. The first accepted batch wins.
    pub async fn batch_update_with_reload(
        &self,
        item_id: &str,
        updates: Vec<FieldUpdate>,
        reload: bool,
    ) -> SyncResult<()> {
        let source_id = self.source_id()?;
        if updates.is_empty() {
            return Ok(());
        }

        let result = self.write_updates(source_id, item_id, &updates, reload).await;
        if let Err(err) = &result {
            self.notify_failure("Batch update failed", err);
        }
        result
    }

    async fn write_updates(
        &self,
        source_id: &str,
        item_id: &str,
        updates: &[FieldUpdate],
        reload: bool,
    ) -> SyncResult<()> {
        self.write_with_relation_retry(source_id, item_id, updates).await?;
        if reload {
            self.reload().await?;
        }
        Ok(())
    }

    async fn write_with_relation_retry(
        &self,
        source_id: &str,
        item_id: &str,
        updates: &[FieldUpdate],
    ) -> SyncResult<()> {
        let table = self.snapshot().await;
        let typed: Vec<(&FieldUpdate, ColumnType)> = updates
            .iter()
            .map(|update| {
                let column_type = update
                    .column_type
                    .clone()
                    .or_else(|| table.column_type(&update.key_id).cloned())
                    .unwrap_or_default();
                (update, column_type)
            })
            .collect();

        let writes = encode_writes(item_id, &typed, RelationEncoding::Content);
        tracing::info!(
            source_id = %source_id,
            item_id = %item_id,
            fields = writes.len(),
            "Writing fields"
        );
        let response = self.ctx.transport.write_fields(source_id, &writes).await?;
        if response.is_success() {
            return Ok(());
        }
        tracing::warn!(
            item_id = %item_id,
            code = response.code,
            message = %response.msg,
            "Batch write rejected"
        );

        let has_relation = typed
            .iter()
            .any(|(update, ty)| *ty == ColumnType::Relation && is_truthy(&update.value));
        if has_relation {
            for encoding in RelationEncoding::RETRY_ORDER {
                tracing::info!(item_id = %item_id, encoding = %encoding, "Retrying relation write");
                let writes = encode_writes(item_id, &typed, encoding);
                let retry = self.ctx.transport.write_fields(source_id, &writes).await?;
                if retry.is_success() {
                    tracing::info!(item_id = %item_id, encoding = %encoding, "Relation retry accepted");
                    return Ok(());
                }
            }
        }

        Err(SyncError::rejected(response))
    }

    /// Apply a scheduler edit through the configured roles.
    ///
    /// A patch that maps to no field only reloads.
    pub async fn update_task_fields(&self, item_id: &str, patch: TaskPatch) -> SyncResult<()> {
        let updates = patch.to_updates(self.roles());
        if updates.is_empty() {
            return self.reload().await.map(|_| ());
        }
        self.batch_update_with_reload(item_id, updates, true).await
    }

    /// [`Self::update_task_fields`] without the failure notification.
    async fn apply_patch(&self, source_id: &str, item_id: &str, patch: &TaskPatch) -> SyncResult<()> {
        let updates = patch.to_updates(self.roles());
        if updates.is_empty() {
            return self.reload().await.map(|_| ());
        }
        self.write_updates(source_id, item_id, &updates, true).await
    }

    /// Write already encoded wire values, then reload.
    pub async fn write_raw_fields(
        &self,
        item_id: &str,
        fields: Vec<(String, Value)>,
    ) -> SyncResult<()> {
        let source_id = self.source_id()?;
        if fields.is_empty() {
            return Ok(());
        }
        let writes: Vec<FieldWrite> = fields
            .into_iter()
            .map(|(key_id, value)| FieldWrite {
                key_id,
                item_id: item_id.to_string(),
                value,
            })
            .collect();

        let result: SyncResult<()> = async {
            let response = self.ctx.transport.write_fields(source_id, &writes).await?;
            if !response.is_success() {
                return Err(SyncError::rejected(response));
            }
            self.reload().await.map(|_| ())
        }
        .await;
        if let Err(err) = &result {
            self.notify_failure("Field update failed", err);
        }
        result
    }

    // ------------------------------------------------------------------------
    // Creating and deleting
    // ------------------------------------------------------------------------

    /// Create a content-backed task and return its item id.
    ///
    /// `parent_ref` may be a row anchor or a raw content unit id. Without
    /// it the task becomes a sibling of the first row, which requires the
    /// table to have at least one row.
    pub async fn create_task(
        &self,
        text: &str,
        parent_ref: Option<&str>,
        start: NaiveDate,
        duration_days: i64,
    ) -> SyncResult<String> {
        let source_id = self.source_id()?;
        let span = task_span(start, duration_days)?;
        let parent_ref = parent_ref.filter(|p| !p.is_empty());
        let parent_id = self.resolve_parent(parent_ref).await?;

        let result = self
            .create_task_under(source_id, text, &parent_id, parent_ref, span)
            .await;
        if let Err(err) = &result {
            self.notify_failure("Create task failed", err);
        }
        result
    }

    async fn resolve_parent(&self, parent_ref: Option<&str>) -> SyncResult<String> {
        let table = self.snapshot().await;
        if let Some(reference) = parent_ref {
            let resolved = table
                .row_by_anchor(reference)
                .map(|row| row.anchor_id().to_string())
                .unwrap_or_else(|| reference.to_string());
            return Ok(resolved);
        }

        let anchor = table.rows.first().ok_or(PreconditionError::EmptyTable)?;
        let unit = self
            .ctx
            .transport
            .fetch_content_unit(anchor.anchor_id())
            .await?;
        Ok(unit
            .and_then(|unit| unit.parent_id)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| anchor.item_id.clone()))
    }

    async fn create_task_under(
        &self,
        source_id: &str,
        text: &str,
        parent_id: &str,
        parent_ref: Option<&str>,
        (start, end): (String, String),
    ) -> SyncResult<String> {
        let body = if text.trim().is_empty() {
            DEFAULT_TASK_TEXT
        } else {
            text
        };
        let created = self
            .ctx
            .transport
            .create_content_unit(body, parent_id)
            .await?;
        if created.as_array().map_or(true, |ops| ops.is_empty()) {
            return Err(PreconditionError::ContentUnitCreationFailed.into());
        }
        let block_id = created_unit_id(&created).ok_or(PreconditionError::MissingNewBlockId)?;
        let item_id = generate_item_id();

        tracing::info!(
            source_id = %source_id,
            item_id = %item_id,
            block_id = %block_id,
            "Attaching new task"
        );
        let attach = AttachSource {
            id: block_id.clone(),
            is_detached: false,
            item_id: Some(item_id.clone()),
        };
        self.ctx.transport.attach_rows(source_id, &[attach]).await?;

        let (item_ref, block_ref) = (item_id.as_str(), block_id.as_str());
        let outcome = poll_until(self.ctx.settings.poll, move |attempt| async move {
            let table = self.reload().await?;
            let found = table.contains_created(item_ref, block_ref);
            if !found {
                tracing::debug!(item_id = %item_ref, attempt, "Waiting for new row");
            }
            Ok::<_, SyncError>(found)
        })
        .await?;
        match outcome {
            PollOutcome::Found { attempt } => {
                tracing::info!(item_id = %item_id, attempt, "New row visible");
            }
            PollOutcome::TimedOut => {
                tracing::warn!(
                    item_id = %item_id,
                    attempts = self.ctx.settings.poll.attempts,
                    "New row not visible before polling gave up; writing fields anyway"
                );
            }
        }

        let patch = TaskPatch {
            start: Some(start),
            end: Some(end),
            progress: None,
            parent_id: Some(parent_ref.unwrap_or_default().to_string()),
        };
        self.apply_patch(source_id, &item_id, &patch).await?;
        Ok(item_id)
    }

    /// Append a row not backed by a content unit, then reload.
    ///
    /// Only fields whose column exists in the current table are written.
    /// `text` fills the block column and the dates fill the start and end
    /// roles unless `fields` already sets them.
    pub async fn create_detached_record(
        &self,
        text: &str,
        start: NaiveDate,
        duration_days: i64,
        fields: Vec<(String, Value)>,
    ) -> SyncResult<()> {
        let source_id = self.source_id()?;
        let span = task_span(start, duration_days)?;
        let table = self.snapshot().await;
        let row = detached_row(&table, self.roles(), text, span, fields);

        tracing::info!(source_id = %source_id, fields = row.len(), "Appending detached row");
        let result: SyncResult<()> = async {
            self.ctx
                .transport
                .append_detached_rows(source_id, &[row])
                .await?;
            self.reload().await.map(|_| ())
        }
        .await;
        if let Err(err) = &result {
            self.notify_failure("Create record failed", err);
        }
        result
    }

    /// Remove a row, then reload.
    pub async fn delete_task(&self, item_id: &str) -> SyncResult<()> {
        let source_id = self.source_id()?;
        tracing::info!(source_id = %source_id, item_id = %item_id, "Deleting row");
        let result: SyncResult<()> = async {
            self.ctx
                .transport
                .remove_rows(source_id, &[item_id.to_string()])
                .await?;
            self.reload().await.map(|_| ())
        }
        .await;
        match &result {
            Ok(()) => self.ctx.notifier.notify(Notification::info("Task deleted")),
            Err(err) => self.notify_failure("Delete failed", err),
        }
        result
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn encode_writes(
    item_id: &str,
    typed: &[(&FieldUpdate, ColumnType)],
    relation: RelationEncoding,
) -> Vec<FieldWrite> {
    typed
        .iter()
        .map(|(update, column_type)| {
            let value = if *column_type == ColumnType::Relation && is_truthy(&update.value) {
                relation.encode(&scalar_string(&update.value))
            } else {
                build_value(column_type, &update.value, true)
            };
            FieldWrite {
                key_id: update.key_id.clone(),
                item_id: item_id.to_string(),
                value,
            }
        })
        .collect()
}

/// Start and inclusive end dates, `YYYY-MM-DD`. Durations below one day
/// count as one day.
pub fn task_span(start: NaiveDate, duration_days: i64) -> Result<(String, String), ValidationError> {
    let end = TimeDelta::try_days(duration_days.max(1) - 1)
        .and_then(|span| start.checked_add_signed(span))
        .ok_or_else(|| ValidationError::InvalidValue {
            field: "duration_days".to_string(),
            reason: format!("{} days from {} is out of range", duration_days, format_ymd(start)),
        })?;
    Ok((format_ymd(start), format_ymd(end)))
}

fn detached_row(
    table: &Table,
    roles: &FieldRoles,
    text: &str,
    (start, end): (String, String),
    fields: Vec<(String, Value)>,
) -> Vec<DetachedField> {
    fn has(fields: &[(String, Value)], key: &str) -> bool {
        fields.iter().any(|(k, _)| k == key)
    }

    let mut fields = fields;

    if let Some(block) = table.block_column() {
        if !text.is_empty() && !has(&fields, &block.key_id) {
            fields.push((block.key_id.clone(), Value::from(text)));
        }
    }
    for (key, date) in [(roles.start(), start), (roles.end(), end)] {
        if let Some(key) = key {
            if !has(&fields, key) {
                fields.push((key.to_string(), Value::from(date)));
            }
        }
    }

    fields
        .into_iter()
        .filter_map(|(key_id, value)| {
            let column_type = table.column_type(&key_id)?;
            // Date fields keep their time of day.
            let date_has_no_time = *column_type != ColumnType::Date;
            let wire = build_value(column_type, &value, date_has_no_time);
            Some(DetachedField::new(key_id, wire))
        })
        .collect()
}

/// `YYYYMMDDhhmmss-` followed by seven random lowercase alphanumerics.
pub fn generate_item_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(7)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}-{}", Local::now().format("%Y%m%d%H%M%S"), suffix)
}
