//! Admin action log: one structured `admin_action` event per admin write.

use crate::error::AppResult;
use crate::middleware::SessionContext;
use serde_json::Value;

pub const TARGET: &str = "admin_action";

/// Emits one log line. Logging cannot fail the request it describes.
pub fn log(actor: &str, action: &str, details: Option<&Value>, success: bool, error: Option<&str>) {
    let details = details.map(Value::to_string).unwrap_or_default();
    if success {
        tracing::info!(
            target: TARGET,
            actor = %actor,
            action = %action,
            details = %details,
            success = true,
            "admin action"
        );
    } else {
        tracing::warn!(
            target: TARGET,
            actor = %actor,
            action = %action,
            details = %details,
            success = false,
            error = %error.unwrap_or_default(),
            "admin action failed"
        );
    }
}

/// Logs the outcome of an admin operation and hands the result back.
pub fn record<T>(
    session: &SessionContext,
    action: &str,
    details: Value,
    result: AppResult<T>,
) -> AppResult<T> {
    match &result {
        Ok(_) => log(&session.actor(), action, Some(&details), true, None),
        Err(err) => {
            let message = err.to_string();
            log(&session.actor(), action, Some(&details), false, Some(&message));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use serde_json::json;

    #[test]
    fn record_passes_results_through() {
        let ctx = SessionContext::anonymous();
        let ok: AppResult<i32> = record(&ctx, "ban_user", json!({"user_id": 3}), Ok(3));
        assert_eq!(ok.unwrap(), 3);

        let err: AppResult<i32> = record(
            &ctx,
            "ban_user",
            json!({"user_id": 3}),
            Err(AppError::NotFound("x".into())),
        );
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }
}
