use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use leadflow_core::ids::TenantId;
use leadflow_core::CrmError;

use crate::error::ApiError;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// Tenant context extractor. Every data route requires the header; a
/// request without one is rejected before any query runs. There is no
/// fallback scope.
#[derive(Debug)]
pub struct Tenant(pub TenantId);

impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Tenant(TenantId::from_raw(s)))
            .ok_or(ApiError(CrmError::TenantRequired))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(req: Request<()>) -> Result<Tenant, ApiError> {
        let (mut parts, _) = req.into_parts();
        Tenant::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn header_present() {
        let req = Request::builder()
            .header(TENANT_HEADER, "tnt_a")
            .body(())
            .unwrap();
        let tenant = extract(req).await.unwrap();
        assert_eq!(tenant.0.as_str(), "tnt_a");
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        let req = Request::builder().body(()).unwrap();
        let err = extract(req).await.unwrap_err();
        assert_eq!(err.0.error_kind(), "TENANT_REQUIRED");
    }

    #[tokio::test]
    async fn blank_header_is_rejected() {
        let req = Request::builder()
            .header(TENANT_HEADER, "  ")
            .body(())
            .unwrap();
        let err = extract(req).await.unwrap_err();
        assert_eq!(err.0.error_kind(), "TENANT_REQUIRED");
    }
}
