use crate::error::{AppError, AppResult};
use validator::Validate;

/// Runs the DTO's field rules and reports the first failing field's
/// message as a 400.
pub fn validate_payload<T: Validate>(payload: &T) -> AppResult<()> {
    let Err(errors) = payload.validate() else {
        return Ok(());
    };

    let mut fields: Vec<(String, String)> = errors
        .field_errors()
        .iter()
        .filter_map(|(field, errs)| {
            let err = errs.first()?;
            let message = err
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("Trường {} không hợp lệ", field));
            Some((field.to_string(), message))
        })
        .collect();
    fields.sort();

    let message = fields
        .into_iter()
        .next()
        .map(|(_, message)| message)
        .unwrap_or_else(|| "Dữ liệu không hợp lệ".to_string());

    Err(AppError::Validation(message))
}

/// Rejects blank required text after trimming.
pub fn require_text(value: Option<&str>, message: &str) -> AppResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AppError::Validation(message.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Probe {
        #[validate(email(message = "Email không hợp lệ"))]
        email: String,
        #[validate(length(min = 3))]
        name: String,
    }

    #[test]
    fn first_message_wins() {
        let err = validate_payload(&Probe {
            email: "nope".into(),
            name: "okay".into(),
        })
        .unwrap_err();
        assert_eq!(err.client_message(), "Email không hợp lệ");
    }

    #[test]
    fn missing_message_falls_back_to_field_name() {
        let err = validate_payload(&Probe {
            email: "a@b.co".into(),
            name: "x".into(),
        })
        .unwrap_err();
        assert!(err.client_message().contains("name"));
    }

    #[test]
    fn blank_required_text_is_rejected() {
        assert!(require_text(Some("   "), "Thiếu").is_err());
        assert!(require_text(None, "Thiếu").is_err());
        assert_eq!(require_text(Some(" T "), "Thiếu").unwrap(), "T");
    }
}
