use crate::server::response::ApiError;

const MAX_BARCODE_LEN: usize = 64;
const MAX_STATUS_LEN: usize = 32;

fn is_valid_barcode_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

pub fn validate_barcode(barcode: &str) -> Result<(), ApiError> {
    if barcode.is_empty() {
        return Err(ApiError::bad_request("Barcode cannot be empty"));
    }
    if barcode.len() > MAX_BARCODE_LEN {
        return Err(ApiError::bad_request(format!(
            "Barcode cannot exceed {MAX_BARCODE_LEN} characters"
        )));
    }
    if !barcode.chars().all(is_valid_barcode_char) {
        return Err(ApiError::bad_request(
            "Barcode can only contain alphanumeric characters, hyphens, and underscores",
        ));
    }
    Ok(())
}

pub fn validate_status(status: &str) -> Result<(), ApiError> {
    if status.is_empty() {
        return Err(ApiError::bad_request("Status cannot be empty"));
    }
    if status.len() > MAX_STATUS_LEN {
        return Err(ApiError::bad_request(format!(
            "Status cannot exceed {MAX_STATUS_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barcode_validation() {
        assert!(validate_barcode("KIT-2026_0001").is_ok());
        assert!(validate_barcode("").is_err());
        assert!(validate_barcode("has spaces").is_err());
        assert!(validate_barcode(&"X".repeat(65)).is_err());
    }

    #[test]
    fn test_status_validation() {
        assert!(validate_status("ready_to_ship").is_ok());
        assert!(validate_status("").is_err());
        assert!(validate_status(&"x".repeat(33)).is_err());
    }
}
