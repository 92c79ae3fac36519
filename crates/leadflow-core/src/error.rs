/// Service-level error taxonomy. Callers branch on the kind, so the
/// classification strings are a stable contract.
#[derive(Clone, Debug, thiserror::Error)]
pub enum CrmError {
    /// Request carried no resolvable tenant. Never defaulted to a global
    /// scope.
    #[error("tenant context required")]
    TenantRequired,

    /// Missing or unusable required input. Optional filter parameters are
    /// coerced leniently and never produce this.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Duplicate natural key (phone within a tenant).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl CrmError {
    /// Stable classification string for the wire and for logs.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::TenantRequired => "TENANT_REQUIRED",
            Self::Validation(_) => "VALIDATION",
            Self::Conflict(_) => "CONFLICT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Storage(_) => "INTERNAL",
        }
    }

    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}
