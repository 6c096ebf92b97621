//! Transport security limits.

/// Maximum body preview size for error messages (8KB).
///
/// Non-2xx responses carry a preview of the body in [`crate::HttpError::HttpStatus`];
/// only this many bytes are read for it.
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;
