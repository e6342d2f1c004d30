use crate::errors::DbError;

const MAX_NAME_LEN: usize = 64;

/// Validates a collection name at the public boundary.
///
/// Allowed: 1-64 characters from `[A-Za-z0-9_-]`, first character alphabetic.
/// The character set rules out path separators, dots, whitespace and shell
/// metacharacters, so a valid name is always safe as a file stem.
///
/// # Errors
/// Returns `DbError::InvalidName` when the name violates the grammar.
pub fn validate_collection_name(name: &str) -> Result<(), DbError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(DbError::InvalidName(format!(
            "{name:?} must be 1-{MAX_NAME_LEN} characters"
        )));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('\0');
    if !first.is_ascii_alphabetic() {
        return Err(DbError::InvalidName(format!("{name:?} must start with a letter")));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(DbError::InvalidName(format!(
            "{name:?} may only contain letters, digits, '_' and '-'"
        )));
    }
    Ok(())
}
