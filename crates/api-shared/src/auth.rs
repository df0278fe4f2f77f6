/// Why a hook call was refused before any work was done.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("authorization header not found")]
    MissingHeader,
}

/// Checks that an `Authorization` header was supplied.
///
/// Token validation itself is delegated to the identity provider in front of this service; here
/// the header only has to be present and non-blank.
///
/// # Returns
/// The trimmed header value.
///
/// # Errors
/// Returns [`AuthError::MissingHeader`] if the header is absent or blank.
pub fn require_authorization(header: Option<&str>) -> Result<&str, AuthError> {
    match header.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(AuthError::MissingHeader),
    }
}
