use crate::{
    services::{DEFAULT_LIMIT, MAX_LIMIT},
    ApiResponse, PaginatedResponse,
};
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

/// Standard no content response
pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Pagination parameters for list operations
#[derive(Debug, Clone, Copy, Deserialize, Serialize, IntoParams)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    DEFAULT_LIMIT
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PaginationParams {
    pub fn new(page: Option<u64>, per_page: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or_else(default_page),
            per_page: per_page.unwrap_or_else(default_per_page),
        }
    }

    /// The page size the services will actually apply.
    pub fn effective_per_page(&self) -> u64 {
        match self.per_page {
            0 => DEFAULT_LIMIT,
            n => n.min(MAX_LIMIT),
        }
    }

    pub fn effective_page(&self) -> u64 {
        self.page.max(1)
    }
}

pub fn paginate<T>(items: Vec<T>, total: u64, params: PaginationParams) -> PaginatedResponse<T> {
    let per_page = params.effective_per_page();
    PaginatedResponse {
        items,
        total,
        page: params.effective_page(),
        per_page,
        total_pages: total.div_ceil(per_page),
    }
}

/// Caller address as reported by a fronting proxy.
pub fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    forwarded.or_else(real_ip).map(str::to_string)
}

/// Desktop clients identify themselves with `X-Client-Id`.
pub fn client_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(crate::rate_limiter::CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn pagination_meta_is_derived_from_clamped_params() {
        let page = paginate(vec![1, 2, 3], 41, PaginationParams::new(Some(2), Some(20)));
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page, 2);

        let clamped = paginate(Vec::<u8>::new(), 0, PaginationParams::new(Some(0), Some(5000)));
        assert_eq!(clamped.per_page, MAX_LIMIT);
        assert_eq!(clamped.page, 1);
        assert_eq!(clamped.total_pages, 0);
    }

    #[test]
    fn forwarded_ip_prefers_first_hop() {
        let mut headers = HeaderMap::new();
        assert_eq!(forwarded_ip(&headers), None);
        headers.insert("x-real-ip", HeaderValue::from_static("10.1.1.1"));
        assert_eq!(forwarded_ip(&headers).as_deref(), Some("10.1.1.1"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("192.168.0.9, 10.0.0.1"));
        assert_eq!(forwarded_ip(&headers).as_deref(), Some("192.168.0.9"));
    }
}
