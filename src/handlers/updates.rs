//! Desktop client distribution: build uploads, update checks, downloads and
//! client heartbeats.

use super::common::{client_id, created_response, forwarded_ip, no_content_response};
use crate::{
    errors::{ErrorResponse, ServiceError},
    models::{application_version, connected_client, update_download},
    services::updates::{ClientStats, DownloadStats, HeartbeatInput, UpdateCheck, UploadVersionInput},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct VersionListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct UpdateCheckQuery {
    /// Version the client is running, e.g. `1.4.2`
    pub current_version: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ClientListQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FailDownloadRequest {
    pub error_message: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CompleteDownloadRequest {
    /// Bytes the client received; defaults to the full file size
    pub bytes_transferred: Option<i64>,
}

/// Multipart form accepted by the upload endpoint.
#[derive(Debug, Default, ToSchema)]
pub struct UploadVersionForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Option<Vec<u8>>,
    pub version: Option<String>,
    pub release_notes: Option<String>,
    /// `true`/`false`
    pub mandatory: Option<String>,
    pub min_supported_version: Option<String>,
    #[schema(ignore)]
    file_name: Option<String>,
    #[schema(ignore)]
    content_type: Option<String>,
}

fn parse_flag(raw: &str) -> Result<bool, ServiceError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "0" | "no" | "off" => Ok(false),
        "true" | "1" | "yes" | "on" => Ok(true),
        other => Err(ServiceError::BadRequest(format!(
            "mandatory must be true or false, got '{}'",
            other
        ))),
    }
}

impl UploadVersionForm {
    fn into_parts(self) -> Result<(UploadVersionInput, Vec<u8>), ServiceError> {
        let bytes = self
            .file
            .ok_or_else(|| ServiceError::FileUpload("multipart field 'file' is required".into()))?;
        let version = self
            .version
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ServiceError::BadRequest("multipart field 'version' is required".into()))?;
        let is_mandatory = match self.mandatory.as_deref() {
            Some(raw) => parse_flag(raw)?,
            None => false,
        };
        let input = UploadVersionInput {
            version,
            release_notes: self.release_notes,
            is_mandatory,
            min_supported_version: self.min_supported_version,
            file_name: self.file_name.unwrap_or_default(),
            content_type: self.content_type,
        };
        Ok((input, bytes))
    }
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ServiceError {
    ServiceError::FileUpload(format!("malformed multipart body: {}", err))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/updates/versions",
            get(list_versions)
                .post(upload_version)
                // The file field is size-checked while it streams in.
                .layer(DefaultBodyLimit::disable()),
        )
        .route("/updates/versions/:id", get(get_version).delete(delete_version))
        .route("/updates/versions/:id/activate", post(activate_version))
        .route("/updates/versions/:id/deactivate", post(deactivate_version))
        .route("/updates/latest", get(latest_version))
        .route("/updates/check", get(check_for_update))
        .route("/updates/download/*path", get(download))
        .route("/updates/downloads/stats", get(download_stats))
        .route("/updates/downloads/:id/complete", post(complete_download))
        .route("/updates/downloads/:id/fail", post(fail_download))
        .route("/updates/clients", get(list_clients))
        .route("/updates/clients/heartbeat", post(heartbeat))
        .route("/updates/clients/stats", get(client_stats))
}

#[utoipa::path(
    get,
    path = "/api/v1/updates/versions",
    params(VersionListQuery),
    responses((status = 200, description = "Builds, newest first", body = ApiResponse<Vec<application_version::Model>>)),
    tag = "updates"
)]
pub async fn list_versions(
    State(state): State<AppState>,
    Query(query): Query<VersionListQuery>,
) -> ApiResult<Vec<application_version::Model>> {
    let versions = state
        .services
        .updates
        .list_versions(query.include_inactive)
        .await?;
    Ok(Json(ApiResponse::success(versions)))
}

/// Uploads a new client build as a JAR.
#[utoipa::path(
    post,
    path = "/api/v1/updates/versions",
    request_body(content = UploadVersionForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Build stored", body = ApiResponse<application_version::Model>),
        (status = 400, description = "Rejected file or form", body = ErrorResponse),
        (status = 409, description = "Version already exists", body = ErrorResponse)
    ),
    tag = "updates"
)]
pub async fn upload_version(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    let max_bytes = state.services.updates.max_upload_bytes();
    let mut form = UploadVersionForm::default();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                form.file_name = field.file_name().map(str::to_string);
                form.content_type = field.content_type().map(str::to_string);
                let mut bytes = Vec::new();
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    if bytes.len() + chunk.len() > max_bytes {
                        return Err(ServiceError::FileUpload(format!(
                            "uploaded file exceeds the limit of {} bytes",
                            max_bytes
                        )));
                    }
                    bytes.extend_from_slice(&chunk);
                }
                form.file = Some(bytes);
            }
            "version" => form.version = Some(field.text().await.map_err(multipart_error)?),
            "release_notes" => {
                form.release_notes = Some(field.text().await.map_err(multipart_error)?)
            }
            "mandatory" => form.mandatory = Some(field.text().await.map_err(multipart_error)?),
            "min_supported_version" => {
                form.min_supported_version = Some(field.text().await.map_err(multipart_error)?)
            }
            other => debug!(field = other, "Ignoring unknown upload field"),
        }
    }

    let (input, bytes) = form.into_parts()?;
    let version = state.services.updates.upload_version(input, &bytes).await?;
    Ok(created_response(version))
}

#[utoipa::path(
    get,
    path = "/api/v1/updates/versions/{id}",
    params(("id" = Uuid, Path, description = "Version id")),
    responses(
        (status = 200, description = "Build metadata", body = ApiResponse<application_version::Model>),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "updates"
)]
pub async fn get_version(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<application_version::Model> {
    let version = state.services.updates.get_version(id).await?;
    Ok(Json(ApiResponse::success(version)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/updates/versions/{id}",
    params(("id" = Uuid, Path, description = "Version id")),
    responses(
        (status = 204, description = "Build and its file removed"),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "updates"
)]
pub async fn delete_version(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.updates.delete_version(id).await?;
    Ok(no_content_response())
}

#[utoipa::path(
    post,
    path = "/api/v1/updates/versions/{id}/activate",
    params(("id" = Uuid, Path, description = "Version id")),
    responses((status = 200, description = "Build offered to clients", body = ApiResponse<application_version::Model>)),
    tag = "updates"
)]
pub async fn activate_version(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<application_version::Model> {
    let version = state.services.updates.set_active(id, true).await?;
    Ok(Json(ApiResponse::success(version)))
}

#[utoipa::path(
    post,
    path = "/api/v1/updates/versions/{id}/deactivate",
    params(("id" = Uuid, Path, description = "Version id")),
    responses((status = 200, description = "Build withdrawn", body = ApiResponse<application_version::Model>)),
    tag = "updates"
)]
pub async fn deactivate_version(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<application_version::Model> {
    let version = state.services.updates.set_active(id, false).await?;
    Ok(Json(ApiResponse::success(version)))
}

#[utoipa::path(
    get,
    path = "/api/v1/updates/latest",
    responses(
        (status = 200, description = "Newest active build", body = ApiResponse<application_version::Model>),
        (status = 404, description = "No active build", body = ErrorResponse)
    ),
    tag = "updates"
)]
pub async fn latest_version(State(state): State<AppState>) -> ApiResult<application_version::Model> {
    let latest = state
        .services
        .updates
        .latest_version()
        .await?
        .ok_or_else(|| ServiceError::NotFound("no active version has been published".into()))?;
    Ok(Json(ApiResponse::success(latest)))
}

#[utoipa::path(
    get,
    path = "/api/v1/updates/check",
    params(UpdateCheckQuery),
    responses(
        (status = 200, description = "Whether a newer build exists", body = ApiResponse<UpdateCheck>),
        (status = 400, description = "Malformed version", body = ErrorResponse)
    ),
    tag = "updates"
)]
pub async fn check_for_update(
    State(state): State<AppState>,
    Query(query): Query<UpdateCheckQuery>,
) -> ApiResult<UpdateCheck> {
    let check = state
        .services
        .updates
        .check_for_update(&query.current_version)
        .await?;
    Ok(Json(ApiResponse::success(check)))
}

/// Serves a stored JAR by its relative path. The download session stays
/// open until the client confirms or fails it.
#[utoipa::path(
    get,
    path = "/api/v1/updates/download/{path}",
    params(("path" = String, Path, description = "Relative path such as `1.4.2/client.jar`")),
    responses(
        (status = 200, description = "JAR bytes", content_type = "application/java-archive",
            headers(
                ("X-Checksum-Sha256" = String, description = "Hex SHA-256 of the body"),
                ("X-Download-Session" = String, description = "Download session id"),
            )
        ),
        (status = 400, description = "Invalid path", body = ErrorResponse),
        (status = 404, description = "No such build", body = ErrorResponse)
    ),
    tag = "updates"
)]
pub async fn download(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ServiceError> {
    let updates = &state.services.updates;
    let artifact = updates.resolve_download(&path).await?;
    let session = updates
        .start_download(artifact.version.id, client_id(&headers), forwarded_ip(&headers))
        .await?;
    let size = artifact.bytes.len();
    info!(version = %artifact.version.version, size, session_id = %session.id, "Serving client build");

    let disposition = format!("attachment; filename=\"{}\"", artifact.version.file_name);
    let mut response = (StatusCode::OK, Body::from(artifact.bytes)).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/java-archive"),
    );
    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response_headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Ok(value) = HeaderValue::from_str(&artifact.version.checksum) {
        response_headers.insert("X-Checksum-Sha256", value);
    }
    if let Ok(value) = HeaderValue::from_str(&session.id.to_string()) {
        response_headers.insert("X-Download-Session", value);
    }
    Ok(response)
}

#[utoipa::path(
    post,
    path = "/api/v1/updates/downloads/{id}/complete",
    params(("id" = Uuid, Path, description = "Download session id")),
    request_body = CompleteDownloadRequest,
    responses(
        (status = 200, description = "Session completed", body = ApiResponse<update_download::Model>),
        (status = 404, description = "Unknown session", body = ErrorResponse),
        (status = 422, description = "Session already closed", body = ErrorResponse)
    ),
    tag = "updates"
)]
pub async fn complete_download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    request: Option<Json<CompleteDownloadRequest>>,
) -> ApiResult<update_download::Model> {
    let Json(request) = request.unwrap_or_default();
    let session = state
        .services
        .updates
        .complete_download(id, request.bytes_transferred)
        .await?;
    Ok(Json(ApiResponse::success(session)))
}

#[utoipa::path(
    post,
    path = "/api/v1/updates/downloads/{id}/fail",
    params(("id" = Uuid, Path, description = "Download session id")),
    request_body = FailDownloadRequest,
    responses(
        (status = 200, description = "Session marked failed", body = ApiResponse<update_download::Model>),
        (status = 422, description = "Session already closed", body = ErrorResponse)
    ),
    tag = "updates"
)]
pub async fn fail_download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<FailDownloadRequest>,
) -> ApiResult<update_download::Model> {
    let session = state
        .services
        .updates
        .fail_download(id, request.error_message)
        .await?;
    Ok(Json(ApiResponse::success(session)))
}

#[utoipa::path(
    get,
    path = "/api/v1/updates/downloads/stats",
    responses((status = 200, description = "Download session statistics", body = ApiResponse<DownloadStats>)),
    tag = "updates"
)]
pub async fn download_stats(State(state): State<AppState>) -> ApiResult<DownloadStats> {
    let stats = state.services.updates.download_stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

#[utoipa::path(
    get,
    path = "/api/v1/updates/clients",
    params(ClientListQuery),
    responses((status = 200, description = "Known desktop clients", body = ApiResponse<Vec<connected_client::Model>>)),
    tag = "updates"
)]
pub async fn list_clients(
    State(state): State<AppState>,
    Query(query): Query<ClientListQuery>,
) -> ApiResult<Vec<connected_client::Model>> {
    let clients = state.services.updates.list_clients(query.active_only).await?;
    Ok(Json(ApiResponse::success(clients)))
}

#[utoipa::path(
    post,
    path = "/api/v1/updates/clients/heartbeat",
    request_body = HeartbeatInput,
    responses(
        (status = 200, description = "Client registered or refreshed", body = ApiResponse<connected_client::Model>),
        (status = 400, description = "Invalid input", body = ErrorResponse)
    ),
    tag = "updates"
)]
pub async fn heartbeat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<HeartbeatInput>,
) -> ApiResult<connected_client::Model> {
    let client = state
        .services
        .updates
        .heartbeat(input, forwarded_ip(&headers))
        .await?;
    Ok(Json(ApiResponse::success(client)))
}

#[utoipa::path(
    get,
    path = "/api/v1/updates/clients/stats",
    responses((status = 200, description = "Active clients per version", body = ApiResponse<ClientStats>)),
    tag = "updates"
)]
pub async fn client_stats(State(state): State<AppState>) -> ApiResult<ClientStats> {
    let stats = state.services.updates.client_stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[rstest]
    #[case("true", true)]
    #[case(" YES ", true)]
    #[case("1", true)]
    #[case("false", false)]
    #[case("", false)]
    fn mandatory_flag(#[case] raw: &str, #[case] expected: bool) {
        assert_eq!(parse_flag(raw).unwrap(), expected);
    }

    #[test]
    fn form_requires_file_and_version() {
        let missing_file = UploadVersionForm {
            version: Some("1.0".into()),
            ..Default::default()
        };
        assert_matches!(missing_file.into_parts(), Err(ServiceError::FileUpload(_)));

        let blank_version = UploadVersionForm {
            file: Some(vec![1]),
            version: Some("  ".into()),
            ..Default::default()
        };
        assert_matches!(blank_version.into_parts(), Err(ServiceError::BadRequest(_)));

        let bad_flag = UploadVersionForm {
            file: Some(vec![1]),
            version: Some("1.0".into()),
            mandatory: Some("maybe".into()),
            ..Default::default()
        };
        assert_matches!(bad_flag.into_parts(), Err(ServiceError::BadRequest(_)));
    }

    #[test]
    fn form_maps_onto_upload_input() {
        let form = UploadVersionForm {
            file: Some(vec![0x50, 0x4b]),
            version: Some(" 2.1.0 ".into()),
            mandatory: Some("true".into()),
            file_name: Some("client.jar".into()),
            content_type: Some("application/java-archive".into()),
            ..Default::default()
        };
        let (input, bytes) = form.into_parts().unwrap();
        assert_eq!(input.version, "2.1.0");
        assert!(input.is_mandatory);
        assert_eq!(input.file_name, "client.jar");
        assert_eq!(bytes, vec![0x50, 0x4b]);
    }
}
