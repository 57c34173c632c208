/// Utility function to sanitize SQL identifiers
pub fn sanitize_identifier(identifier: &str) -> String {
    // Only allow alphanumerics and underscores in identifiers
    let safe_id: String = identifier.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    if safe_id.is_empty() {
        return "_invalid".to_string();
    }

    // Prevent identifiers starting with a digit
    if safe_id.chars().next().map_or(false, |c| c.is_ascii_digit()) {
        return format!("_{}", safe_id);
    }

    safe_id
}

/// True when the identifier survives sanitizing unchanged.
pub fn is_safe_identifier(identifier: &str) -> bool {
    sanitize_identifier(identifier) == identifier
}

/// Wraps an already-safe identifier in double quotes for SQLite.
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", sanitize_identifier(identifier))
}
