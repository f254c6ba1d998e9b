use serde::Serialize;
use validator::ValidationErrors;

/// Failures returned by every core operation.
///
/// `PreconditionFailed` and `ValidationError` are raised before any write, so the
/// caller can fix the named field and retry. Ledger batches never return `NotFound`
/// for a single line; those are reported as [`LineWarning`]s instead.
///
/// [`LineWarning`]: crate::services::inventory::LineWarning
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ServiceError {
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// Machine-readable code for the failure category
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::PreconditionFailed(_) => "precondition_failed",
            ServiceError::ValidationError(_) => "validation_error",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::InvalidOperation(_) => "invalid_operation",
            ServiceError::InternalError(_) => "internal_error",
        }
    }

    /// True when the caller can correct its request and retry
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ServiceError::InternalError(_))
    }

    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        ServiceError::NotFound(format!("{} {} not found", entity, id))
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .iter()
            .map(|(field, errs)| {
                let detail = errs
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}: {}", field, detail)
            })
            .collect();
        fields.sort();
        ServiceError::ValidationError(fields.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Probe {
        #[validate(length(min = 1, message = "must not be empty"))]
        name: String,
    }

    #[test]
    fn validation_errors_name_the_field() {
        let err: ServiceError = Probe { name: String::new() }.validate().unwrap_err().into();
        assert_eq!(
            err,
            ServiceError::ValidationError("name: must not be empty".to_string())
        );
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(ServiceError::NotFound("stock item 7".into())).unwrap();
        assert_eq!(json["kind"], "not_found");
        assert_eq!(json["message"], "stock item 7");
    }

    #[test]
    fn only_internal_errors_are_unrecoverable() {
        assert!(ServiceError::PreconditionFailed("x".into()).is_recoverable());
        assert!(!ServiceError::InternalError("x".into()).is_recoverable());
    }
}
