use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;

/// Youngest audit records the retention cleanup may delete.
pub const MIN_RETENTION_DAYS: u32 = 30;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::BadRequest(format!("Validation failed: {errors}")))
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCleanupInput {
    #[validate(range(min = MIN_RETENTION_DAYS, message = "olderThanDays must be at least 30"))]
    pub older_than_days: u32,
}

#[cfg(test)]
mod tests {
    use super::{validate_input, ActivityCleanupInput, MIN_RETENTION_DAYS};
    use crate::error::AppError;

    #[test]
    fn cleanup_floor_is_thirty_days() {
        let input = ActivityCleanupInput {
            older_than_days: MIN_RETENTION_DAYS - 1,
        };
        assert!(matches!(validate_input(&input), Err(AppError::BadRequest(_))));

        let input = ActivityCleanupInput {
            older_than_days: MIN_RETENTION_DAYS,
        };
        assert!(validate_input(&input).is_ok());

        let input = ActivityCleanupInput {
            older_than_days: 4000,
        };
        assert!(validate_input(&input).is_ok());
    }

    #[test]
    fn body_uses_camel_case() {
        let input: ActivityCleanupInput =
            serde_json::from_str(r#"{"olderThanDays": 90}"#).expect("body");
        assert_eq!(input.older_than_days, 90);
    }
}
