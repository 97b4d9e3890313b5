//! Status-text tables for gateway responses.

/// Status code used for failures raised locally rather than by the gateway.
pub const STATUS_CODE_INTERNAL_ERROR: u16 = 999;

/// Text used for status codes missing from the tables.
pub const UNKNOWN_STATUS_TEXT: &str = "None (unknown)";

static BINARY_STATUS_TEXT: &[(u16, &str)] = &[
    (0, "No errors encountered"),
    (1, "Processing error"),
    (2, "Missing device token"),
    (3, "Missing topic"),
    (4, "Missing payload"),
    (5, "Invalid token size"),
    (6, "Invalid topic size"),
    (7, "Invalid payload size"),
    (8, "Invalid token"),
    (STATUS_CODE_INTERNAL_ERROR, "Internal error"),
];

static HTTP_STATUS_TEXT: &[(u16, &str)] = &[
    (200, "Success"),
    (400, "Bad request"),
    (403, "There was an error with the certificate"),
    (
        405,
        "The request used a bad :method value. Only POST requests are supported",
    ),
    (410, "The device token is no longer active for the topic"),
    (413, "The notification payload was too large"),
    (
        429,
        "The server received too many requests for the same device token",
    ),
    (500, "Internal server error"),
    (503, "The server is shutting down and unavailable"),
    (STATUS_CODE_INTERNAL_ERROR, "Internal error"),
];

fn lookup(table: &'static [(u16, &'static str)], code: u16) -> &'static str {
    table
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, text)| *text)
        .unwrap_or(UNKNOWN_STATUS_TEXT)
}

/// Text for a status reported in a binary error-response frame.
pub fn binary_status_text(code: u16) -> &'static str {
    lookup(BINARY_STATUS_TEXT, code)
}

/// Text for an HTTP gateway response status.
pub fn http_status_text(code: u16) -> &'static str {
    lookup(HTTP_STATUS_TEXT, code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_table() {
        assert_eq!(binary_status_text(0), "No errors encountered");
        assert_eq!(binary_status_text(8), "Invalid token");
        assert_eq!(binary_status_text(STATUS_CODE_INTERNAL_ERROR), "Internal error");
        assert_eq!(binary_status_text(10), UNKNOWN_STATUS_TEXT);
    }

    #[test]
    fn test_http_table() {
        assert_eq!(http_status_text(200), "Success");
        assert_eq!(
            http_status_text(410),
            "The device token is no longer active for the topic"
        );
        assert_eq!(http_status_text(418), UNKNOWN_STATUS_TEXT);
    }
}
