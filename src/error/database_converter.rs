use crate::error::AppError;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// Utility for converting database errors to structured AppError variants.
pub struct DatabaseErrorConverter;

impl DatabaseErrorConverter {
    /// Converts a Diesel error to an appropriate AppError variant.
    ///
    /// # Arguments
    /// * `error` - The Diesel error to convert
    /// * `operation` - Description of the database operation that failed
    pub fn convert_diesel_error(error: DieselError, operation: &str) -> AppError {
        match error {
            DieselError::DatabaseError(kind, info) => {
                Self::convert_database_error(kind, info, operation)
            }
            DieselError::NotFound => AppError::NotFound {
                entity: "resource".to_string(),
                field: "id".to_string(),
                value: "unknown".to_string(),
            },
            other => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::from(other),
            },
        }
    }

    fn convert_database_error(
        kind: DatabaseErrorKind,
        info: Box<dyn diesel::result::DatabaseErrorInformation + Send + Sync>,
        operation: &str,
    ) -> AppError {
        let message = info.message().to_string();
        let table = info.table_name().unwrap_or("resource").to_string();
        let column = info.column_name().unwrap_or("value").to_string();

        match kind {
            DatabaseErrorKind::UniqueViolation => AppError::Duplicate {
                entity: table,
                field: column,
                value: info
                    .details()
                    .and_then(extract_key_value)
                    .unwrap_or_else(|| "unknown".to_string()),
            },
            DatabaseErrorKind::ForeignKeyViolation => AppError::Validation {
                field: column,
                reason: format!("Invalid reference from {}: {}", table, message),
            },
            DatabaseErrorKind::NotNullViolation => AppError::Validation {
                field: column,
                reason: format!("Field is required for {}", table),
            },
            DatabaseErrorKind::CheckViolation => AppError::Validation {
                field: info.constraint_name().unwrap_or("check").to_string(),
                reason: format!("Check constraint failed for {}", table),
            },
            DatabaseErrorKind::ClosedConnection => AppError::ConnectionPool {
                source: anyhow::Error::msg(message),
            },
            _ => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::msg(message),
            },
        }
    }
}

/// Pulls `value` out of a Postgres detail such as `Key (id)=(abc) already exists.`
fn extract_key_value(details: &str) -> Option<String> {
    let start = details.find(")=(")? + 3;
    let end = details[start..].find(')')? + start;
    Some(details[start..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockInfo {
        message: String,
        details: Option<String>,
        table: Option<String>,
        column: Option<String>,
        constraint: Option<String>,
    }

    impl diesel::result::DatabaseErrorInformation for MockInfo {
        fn message(&self) -> &str {
            &self.message
        }

        fn details(&self) -> Option<&str> {
            self.details.as_deref()
        }

        fn hint(&self) -> Option<&str> {
            None
        }

        fn table_name(&self) -> Option<&str> {
            self.table.as_deref()
        }

        fn column_name(&self) -> Option<&str> {
            self.column.as_deref()
        }

        fn constraint_name(&self) -> Option<&str> {
            self.constraint.as_deref()
        }

        fn statement_position(&self) -> Option<i32> {
            None
        }
    }

    fn info(kind_details: Option<&str>) -> Box<MockInfo> {
        Box::new(MockInfo {
            message: "boom".to_string(),
            details: kind_details.map(String::from),
            table: Some("jobs".to_string()),
            column: Some("id".to_string()),
            constraint: Some("jobs_priority_check".to_string()),
        })
    }

    #[test]
    fn test_convert_not_found_error() {
        let err = DatabaseErrorConverter::convert_diesel_error(DieselError::NotFound, "select");
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[test]
    fn test_convert_unique_violation() {
        let err = DatabaseErrorConverter::convert_diesel_error(
            DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                info(Some("Key (id)=(42) already exists.")),
            ),
            "insert job",
        );
        match err {
            AppError::Duplicate { entity, field, value } => {
                assert_eq!(entity, "jobs");
                assert_eq!(field, "id");
                assert_eq!(value, "42");
            }
            other => panic!("expected Duplicate, got {:?}", other),
        }
    }

    #[test]
    fn test_convert_check_violation() {
        let err = DatabaseErrorConverter::convert_diesel_error(
            DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, info(None)),
            "insert job",
        );
        assert!(
            matches!(err, AppError::Validation { field, .. } if field == "jobs_priority_check")
        );
    }

    #[test]
    fn test_closed_connection_maps_to_pool_error() {
        let err = DatabaseErrorConverter::convert_diesel_error(
            DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, info(None)),
            "update job",
        );
        assert!(err.is_persistence());
        assert!(matches!(err, AppError::ConnectionPool { .. }));
    }

    #[test]
    fn test_extract_key_value() {
        assert_eq!(
            extract_key_value("Key (owner_id)=(abc) already exists."),
            Some("abc".to_string())
        );
        assert_eq!(extract_key_value("no key here"), None);
    }
}
