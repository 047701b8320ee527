//! Distribution of desktop client builds: upload, version checks, downloads
//! and the registry of connected clients.

pub mod jar;
pub mod storage;
pub mod versioning;

use crate::{
    config::UpdatesConfig,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{application_version, connected_client, update_download, DownloadStatus},
    services::normalize_optional,
};
use chrono::{Duration as ChronoDuration, Utc};
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use storage::{checksum, sanitize_relative_path, ArtifactStore};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;
use versioning::{compare_versions, is_newer, is_valid_version};

#[derive(Debug, Clone, Default)]
pub struct UploadVersionInput {
    pub version: String,
    pub release_notes: Option<String>,
    pub is_mandatory: bool,
    pub min_supported_version: Option<String>,
    pub file_name: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UpdateCheck {
    pub current_version: String,
    pub update_available: bool,
    pub mandatory: bool,
    pub latest: Option<application_version::Model>,
}

#[derive(Debug, Clone)]
pub struct DownloadArtifact {
    pub version: application_version::Model,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VersionDownloads {
    pub version_id: Uuid,
    pub version: String,
    pub download_count: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DownloadStats {
    pub total_sessions: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_progress: u64,
    pub bytes_transferred: i64,
    pub per_version: Vec<VersionDownloads>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct HeartbeatInput {
    #[validate(length(min = 1, max = 128))]
    pub client_id: String,
    #[validate(length(max = 255))]
    pub hostname: Option<String>,
    #[validate(length(max = 32))]
    pub app_version: Option<String>,
    #[validate(length(max = 255))]
    pub os_info: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClientStats {
    pub total_clients: u64,
    pub active_clients: u64,
    /// Active clients per reported application version
    pub by_version: BTreeMap<String, u64>,
}

fn newest_first(a: &application_version::Model, b: &application_version::Model) -> Ordering {
    compare_versions(&b.version, &a.version)
}

/// Whether a client on `current` has to move to a newer build.
pub fn evaluate_update(
    current: &str,
    versions: &[application_version::Model],
) -> (Option<application_version::Model>, bool) {
    let mut newer: Vec<&application_version::Model> = versions
        .iter()
        .filter(|v| v.is_active && is_newer(&v.version, current))
        .collect();
    newer.sort_by(|a, b| newest_first(a, b));
    let Some(latest) = newer.first() else {
        return (None, false);
    };
    let below_minimum = latest
        .min_supported_version
        .as_deref()
        .map_or(false, |min| is_newer(min, current));
    let mandatory = below_minimum || newer.iter().any(|v| v.is_mandatory);
    (Some((*latest).clone()), mandatory)
}

#[derive(Clone)]
pub struct UpdateService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    store: ArtifactStore,
    max_upload_bytes: usize,
    client_timeout: Duration,
}

impl UpdateService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: &UpdatesConfig,
    ) -> Self {
        Self {
            db,
            event_sender,
            store: ArtifactStore::new(config.storage_dir.clone()),
            max_upload_bytes: config.max_upload_bytes,
            client_timeout: Duration::from_secs(config.client_timeout_secs),
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Validates and stores a new build. The file is written first and
    /// removed again if the version row cannot be inserted.
    #[instrument(skip(self, input, bytes), fields(version = %input.version, size = bytes.len()))]
    pub async fn upload_version(
        &self,
        input: UploadVersionInput,
        bytes: &[u8],
    ) -> Result<application_version::Model, ServiceError> {
        let version = input.version.trim().to_string();
        if !is_valid_version(&version) {
            return Err(ServiceError::ValidationError(format!(
                "invalid version {:?}; expected digits such as 1.2.3",
                version
            )));
        }
        let min_supported_version = normalize_optional(input.min_supported_version);
        if let Some(min) = &min_supported_version {
            if !is_valid_version(min) {
                return Err(ServiceError::ValidationError(format!(
                    "invalid min_supported_version {:?}",
                    min
                )));
            }
            if is_newer(min, &version) {
                return Err(ServiceError::ValidationError(
                    "min_supported_version cannot be newer than the version itself".into(),
                ));
            }
        }

        let file_name = input.file_name.trim().to_string();
        jar::validate_file_name(&file_name)?;
        jar::validate_content_type(input.content_type.as_deref())?;
        jar::validate_archive(bytes, self.max_upload_bytes)?;

        // `1.2` and `1.2.0` name the same release.
        let existing = application_version::Entity::find().all(&*self.db).await?;
        if let Some(clash) = existing
            .iter()
            .find(|v| compare_versions(&v.version, &version) == Ordering::Equal)
        {
            return Err(ServiceError::DataIntegrity(format!(
                "version {} already exists as {}",
                version, clash.version
            )));
        }

        let relative = ArtifactStore::relative_path(&version, &file_name);
        self.store.write(&relative, bytes).await?;

        let now = Utc::now();
        let row = application_version::ActiveModel {
            id: Set(Uuid::new_v4()),
            version: Set(version.clone()),
            file_name: Set(file_name),
            file_path: Set(relative.clone()),
            file_size: Set(bytes.len() as i64),
            checksum: Set(checksum(bytes)),
            release_notes: Set(normalize_optional(input.release_notes)),
            is_mandatory: Set(input.is_mandatory),
            min_supported_version: Set(min_supported_version),
            is_active: Set(true),
            download_count: Set(0),
            uploaded_at: Set(now),
            updated_at: Set(now),
        };
        let model = match row.insert(&*self.db).await {
            Ok(model) => model,
            Err(e) => {
                error!(error = %e, "Failed to record version; removing stored file");
                if let Err(cleanup) = self.store.remove(&relative).await {
                    warn!(error = %cleanup, path = %relative, "Failed to remove orphaned artifact");
                }
                return Err(e.into());
            }
        };

        counter!("sales_api_versions_uploaded_total", 1);
        self.event_sender
            .send_or_log(Event::VersionUploaded {
                version_id: model.id,
                version: model.version.clone(),
            })
            .await;
        info!(version_id = %model.id, version = %model.version, "Uploaded client version");
        Ok(model)
    }

    /// Versions ordered newest first.
    #[instrument(skip(self))]
    pub async fn list_versions(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<application_version::Model>, ServiceError> {
        let mut query = application_version::Entity::find();
        if !include_inactive {
            query = query.filter(application_version::Column::IsActive.eq(true));
        }
        let mut versions = query.all(&*self.db).await?;
        versions.sort_by(newest_first);
        Ok(versions)
    }

    #[instrument(skip(self))]
    pub async fn get_version(&self, id: Uuid) -> Result<application_version::Model, ServiceError> {
        application_version::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Version", id))
    }

    #[instrument(skip(self))]
    pub async fn latest_version(&self) -> Result<Option<application_version::Model>, ServiceError> {
        Ok(self.list_versions(false).await?.into_iter().next())
    }

    #[instrument(skip(self))]
    pub async fn check_for_update(&self, current_version: &str) -> Result<UpdateCheck, ServiceError> {
        let current = current_version.trim();
        if !is_valid_version(current) {
            return Err(ServiceError::ValidationError(format!(
                "invalid current version {:?}",
                current
            )));
        }
        let versions = self.list_versions(false).await?;
        let (latest, mandatory) = evaluate_update(current, &versions);
        Ok(UpdateCheck {
            current_version: current.to_string(),
            update_available: latest.is_some(),
            mandatory,
            latest,
        })
    }

    #[instrument(skip(self))]
    pub async fn set_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<application_version::Model, ServiceError> {
        let existing = self.get_version(id).await?;
        let mut model: application_version::ActiveModel = existing.into();
        model.is_active = Set(active);
        model.updated_at = Set(Utc::now());
        let updated = model.update(&*self.db).await?;
        info!(version_id = %id, active, "Changed version availability");
        Ok(updated)
    }

    /// Removes the version row, its download history and the stored file.
    #[instrument(skip(self))]
    pub async fn delete_version(&self, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.get_version(id).await?;
        let relative = existing.file_path.clone();

        let txn = self.db.begin().await?;
        update_download::Entity::delete_many()
            .filter(update_download::Column::VersionId.eq(id))
            .exec(&txn)
            .await?;
        existing.delete(&txn).await?;
        txn.commit().await?;

        if let Err(e) = self.store.remove(&relative).await {
            warn!(error = %e, path = %relative, "Version deleted but file removal failed");
        }
        info!(version_id = %id, "Deleted client version");
        Ok(())
    }

    /// Looks up an active version by its storage path and loads the file.
    #[instrument(skip(self))]
    pub async fn resolve_download(&self, raw_path: &str) -> Result<DownloadArtifact, ServiceError> {
        let relative = sanitize_relative_path(raw_path)?;
        let version = application_version::Entity::find()
            .filter(application_version::Column::FilePath.eq(relative.as_str()))
            .filter(application_version::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no active build at {}", relative)))?;

        let bytes = self.store.read(&relative).await?;
        if checksum(&bytes) != version.checksum {
            error!(version = %version.version, "Stored artifact checksum mismatch");
            return Err(ServiceError::DataIntegrity(format!(
                "stored file for version {} is corrupt",
                version.version
            )));
        }
        Ok(DownloadArtifact { version, bytes })
    }

    #[instrument(skip(self))]
    pub async fn start_download(
        &self,
        version_id: Uuid,
        client_id: Option<String>,
        ip_address: Option<String>,
    ) -> Result<update_download::Model, ServiceError> {
        let version = self.get_version(version_id).await?;
        if !version.is_active {
            return Err(ServiceError::BusinessLogic(format!(
                "version {} is not available for download",
                version.version
            )));
        }
        let session = update_download::ActiveModel {
            id: Set(Uuid::new_v4()),
            version_id: Set(version_id),
            client_id: Set(normalize_optional(client_id)),
            ip_address: Set(normalize_optional(ip_address)),
            status: Set(DownloadStatus::Started),
            bytes_transferred: Set(0),
            error_message: Set(None),
            started_at: Set(Utc::now()),
            completed_at: Set(None),
        }
        .insert(&*self.db)
        .await?;
        Ok(session)
    }

    /// Closes a started session and counts the download on its version.
    /// Without a reported byte count the full file size is recorded.
    #[instrument(skip(self))]
    pub async fn complete_download(
        &self,
        session_id: Uuid,
        bytes_transferred: Option<i64>,
    ) -> Result<update_download::Model, ServiceError> {
        if bytes_transferred.map_or(false, |bytes| bytes < 0) {
            return Err(ServiceError::ValidationError(
                "bytes_transferred must not be negative".into(),
            ));
        }
        let now = Utc::now();
        let txn = self.db.begin().await?;
        let session = update_download::Entity::find_by_id(session_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Download session", session_id))?;
        let bytes_transferred = match bytes_transferred {
            Some(bytes) => bytes,
            None => {
                application_version::Entity::find_by_id(session.version_id)
                    .one(&txn)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Version", session.version_id))?
                    .file_size
            }
        };

        let closed = update_download::Entity::update_many()
            .col_expr(update_download::Column::Status, Expr::value(DownloadStatus::Completed))
            .col_expr(update_download::Column::BytesTransferred, Expr::value(bytes_transferred))
            .col_expr(update_download::Column::CompletedAt, Expr::value(Some(now)))
            .filter(update_download::Column::Id.eq(session_id))
            .filter(update_download::Column::Status.eq(DownloadStatus::Started))
            .exec(&txn)
            .await?;
        if closed.rows_affected == 0 {
            return Err(ServiceError::BusinessLogic(format!(
                "download session {} is already {:?}",
                session_id, session.status
            )));
        }

        application_version::Entity::update_many()
            .col_expr(
                application_version::Column::DownloadCount,
                Expr::col(application_version::Column::DownloadCount).add(1),
            )
            .filter(application_version::Column::Id.eq(session.version_id))
            .exec(&txn)
            .await?;

        let updated = update_download::Entity::find_by_id(session_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Download session", session_id))?;
        txn.commit().await?;

        counter!("sales_api_downloads_completed_total", 1);
        self.event_sender
            .send_or_log(Event::DownloadCompleted {
                version_id: updated.version_id,
                session_id,
            })
            .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn fail_download(
        &self,
        session_id: Uuid,
        error_message: String,
    ) -> Result<update_download::Model, ServiceError> {
        let session = update_download::Entity::find_by_id(session_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Download session", session_id))?;
        if session.status != DownloadStatus::Started {
            return Err(ServiceError::BusinessLogic(format!(
                "download session {} is already {:?}",
                session_id, session.status
            )));
        }
        let mut active: update_download::ActiveModel = session.into();
        active.status = Set(DownloadStatus::Failed);
        active.error_message = Set(Some(error_message.chars().take(1000).collect()));
        active.completed_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;
        counter!("sales_api_downloads_failed_total", 1);
        warn!(%session_id, "Download failed");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn download_stats(&self) -> Result<DownloadStats, ServiceError> {
        let sessions = update_download::Entity::find().all(&*self.db).await?;
        let mut stats = DownloadStats {
            total_sessions: sessions.len() as u64,
            completed: 0,
            failed: 0,
            in_progress: 0,
            bytes_transferred: 0,
            per_version: Vec::new(),
        };
        for session in &sessions {
            match session.status {
                DownloadStatus::Completed => {
                    stats.completed += 1;
                    stats.bytes_transferred += session.bytes_transferred;
                }
                DownloadStatus::Failed => stats.failed += 1,
                DownloadStatus::Started => stats.in_progress += 1,
            }
        }
        stats.per_version = self
            .list_versions(true)
            .await?
            .into_iter()
            .map(|v| VersionDownloads {
                version_id: v.id,
                version: v.version,
                download_count: v.download_count,
            })
            .collect();
        Ok(stats)
    }

    /// Records that a client is alive, creating it on first contact.
    #[instrument(skip(self, input), fields(client_id = %input.client_id))]
    pub async fn heartbeat(
        &self,
        input: HeartbeatInput,
        ip_address: Option<String>,
    ) -> Result<connected_client::Model, ServiceError> {
        input.validate()?;
        let now = Utc::now();
        let client_id = input.client_id.trim().to_string();
        let existing = connected_client::Entity::find()
            .filter(connected_client::Column::ClientId.eq(client_id.as_str()))
            .one(&*self.db)
            .await?;

        let model = match existing {
            Some(client) => {
                let mut active: connected_client::ActiveModel = client.into();
                if input.hostname.is_some() {
                    active.hostname = Set(normalize_optional(input.hostname));
                }
                if input.app_version.is_some() {
                    active.app_version = Set(normalize_optional(input.app_version));
                }
                if input.os_info.is_some() {
                    active.os_info = Set(normalize_optional(input.os_info));
                }
                if ip_address.is_some() {
                    active.ip_address = Set(ip_address);
                }
                active.last_seen = Set(now);
                active.is_active = Set(true);
                active.update(&*self.db).await?
            }
            None => {
                info!(%client_id, "New client connected");
                connected_client::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    client_id: Set(client_id),
                    hostname: Set(normalize_optional(input.hostname)),
                    ip_address: Set(ip_address),
                    app_version: Set(normalize_optional(input.app_version)),
                    os_info: Set(normalize_optional(input.os_info)),
                    first_seen: Set(now),
                    last_seen: Set(now),
                    is_active: Set(true),
                }
                .insert(&*self.db)
                .await?
            }
        };
        Ok(model)
    }

    #[instrument(skip(self))]
    pub async fn list_clients(
        &self,
        active_only: bool,
    ) -> Result<Vec<connected_client::Model>, ServiceError> {
        let mut query = connected_client::Entity::find();
        if active_only {
            query = query.filter(connected_client::Column::IsActive.eq(true));
        }
        Ok(query
            .order_by_desc(connected_client::Column::LastSeen)
            .all(&*self.db)
            .await?)
    }

    /// Fails sessions that were started but never reported back within the
    /// client timeout.
    #[instrument(skip(self))]
    pub async fn fail_stale_downloads(&self) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - self.client_timeout_chrono()?;
        let result = update_download::Entity::update_many()
            .col_expr(update_download::Column::Status, Expr::value(DownloadStatus::Failed))
            .col_expr(
                update_download::Column::ErrorMessage,
                Expr::value(Some("client did not confirm the download".to_string())),
            )
            .col_expr(update_download::Column::CompletedAt, Expr::value(Some(Utc::now())))
            .filter(update_download::Column::Status.eq(DownloadStatus::Started))
            .filter(update_download::Column::StartedAt.lt(cutoff))
            .exec(&*self.db)
            .await?;
        if result.rows_affected > 0 {
            counter!("sales_api_downloads_failed_total", result.rows_affected);
            warn!(count = result.rows_affected, "Expired unconfirmed download sessions");
        }
        Ok(result.rows_affected)
    }

    fn client_timeout_chrono(&self) -> Result<ChronoDuration, ServiceError> {
        ChronoDuration::from_std(self.client_timeout)
            .map_err(|e| ServiceError::InternalError(format!("invalid client timeout: {}", e)))
    }

    /// Deactivates clients whose last heartbeat is older than the timeout.
    #[instrument(skip(self))]
    pub async fn mark_stale_clients(&self) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - self.client_timeout_chrono()?;
        let result = connected_client::Entity::update_many()
            .col_expr(connected_client::Column::IsActive, Expr::value(false))
            .filter(connected_client::Column::IsActive.eq(true))
            .filter(connected_client::Column::LastSeen.lt(cutoff))
            .exec(&*self.db)
            .await?;
        if result.rows_affected > 0 {
            info!(count = result.rows_affected, "Marked stale clients inactive");
        }
        Ok(result.rows_affected)
    }

    #[instrument(skip(self))]
    pub async fn client_stats(&self) -> Result<ClientStats, ServiceError> {
        let clients = connected_client::Entity::find().all(&*self.db).await?;
        let mut stats = ClientStats {
            total_clients: clients.len() as u64,
            active_clients: 0,
            by_version: BTreeMap::new(),
        };
        for client in clients.iter().filter(|c| c.is_active) {
            stats.active_clients += 1;
            let version = client
                .app_version
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            *stats.by_version.entry(version).or_default() += 1;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(v: &str, active: bool, mandatory: bool, min: Option<&str>) -> application_version::Model {
        let now = Utc::now();
        application_version::Model {
            id: Uuid::new_v4(),
            version: v.into(),
            file_name: "client.jar".into(),
            file_path: format!("{}/client.jar", v),
            file_size: 10,
            checksum: String::new(),
            release_notes: None,
            is_mandatory: mandatory,
            min_supported_version: min.map(str::to_string),
            is_active: active,
            download_count: 0,
            uploaded_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn up_to_date_client_gets_nothing() {
        let versions = vec![version("1.0.0", true, false, None)];
        let (latest, mandatory) = evaluate_update("1.0.0", &versions);
        assert!(latest.is_none());
        assert!(!mandatory);
    }

    #[test]
    fn latest_active_wins_and_inactive_is_ignored() {
        let versions = vec![
            version("1.1.0", true, false, None),
            version("1.10.0", true, false, None),
            version("2.0.0", false, true, None),
        ];
        let (latest, mandatory) = evaluate_update("1.0.0", &versions);
        assert_eq!(latest.unwrap().version, "1.10.0");
        assert!(!mandatory);
    }

    #[test]
    fn skipped_mandatory_release_forces_update() {
        let versions = vec![
            version("1.1.0", true, true, None),
            version("1.2.0", true, false, None),
        ];
        let (_, mandatory) = evaluate_update("1.0.0", &versions);
        assert!(mandatory);
        let (_, mandatory) = evaluate_update("1.1.0", &versions);
        assert!(!mandatory);
    }

    #[test]
    fn below_minimum_supported_forces_update() {
        let versions = vec![version("3.0.0", true, false, Some("2.0"))];
        assert!(evaluate_update("1.9.9", &versions).1);
        assert!(!evaluate_update("2.0.0", &versions).1);
    }
}
