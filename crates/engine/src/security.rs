//! Identifier sanitization for generated statements
//!
//! Values always travel as bound parameters. Table and column names cannot,
//! so they are validated once when configuration is loaded and sanitized
//! again every time they are interpolated into a statement.

use crate::backends::SqlDialect;
use crate::error::ConfigError;

/// Maximum identifier length accepted at configuration time (MySQL limit)
const MAX_IDENTIFIER_LEN: usize = 64;

/// Characters that can terminate or confuse identifier quoting
const FORBIDDEN_IDENTIFIER_CHARS: &[char] = &['`', '"', '\'', '[', ']', ';', '\\'];

fn is_forbidden(c: char) -> bool {
    FORBIDDEN_IDENTIFIER_CHARS.contains(&c) || c.is_control()
}

/// Strip every character that could break identifier quoting.
///
/// # Examples
/// ```
/// use relabel_engine::security::sanitize_identifier;
///
/// assert_eq!(sanitize_identifier("customer_name"), "customer_name");
/// assert_eq!(sanitize_identifier("name`; DROP TABLE x"), "name DROP TABLE x");
/// assert_eq!(sanitize_identifier(""), "");
/// ```
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier.chars().filter(|c| !is_forbidden(*c)).collect()
}

/// Sanitize an identifier and wrap it in the dialect's quote character
pub fn quote_identifier(dialect: SqlDialect, identifier: &str) -> String {
    let quote = dialect.identifier_quote();
    format!("{}{}{}", quote, sanitize_identifier(identifier), quote)
}

/// Validate that an identifier is safe for use in SQL
///
/// `field` names the configuration entry for error reporting.
pub fn validate_identifier(field: &str, identifier: &str) -> Result<(), ConfigError> {
    if identifier.trim().is_empty() {
        return Err(ConfigError::missing_required(
            field,
            "Identifiers cannot be empty",
        ));
    }

    if identifier.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(ConfigError::invalid_value(
            field,
            identifier,
            format!("at most {} characters", MAX_IDENTIFIER_LEN),
        ));
    }

    if let Some(c) = identifier.chars().find(|c| is_forbidden(*c)) {
        return Err(ConfigError::invalid_value(
            field,
            identifier,
            format!("an identifier without quoting characters (found {:?})", c),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("customers"), "customers");
        assert_eq!(sanitize_identifier("cust\"omers"), "customers");
        assert_eq!(sanitize_identifier("[dbo]"), "dbo");
        assert_eq!(sanitize_identifier("a\nb\0c"), "abc");
        assert_eq!(sanitize_identifier("客户名称"), "客户名称");
        assert_eq!(sanitize_identifier("`;'\\"), "");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier(SqlDialect::MySQL, "name"), "`name`");
        assert_eq!(quote_identifier(SqlDialect::PostgreSQL, "na\"me"), "\"name\"");
        assert_eq!(quote_identifier(SqlDialect::SQLite, "x`y"), "\"xy\"");
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("target.table", "customers").is_ok());
        assert!(validate_identifier("target.table", "客户表").is_ok());
        assert!(validate_identifier("target.table", "customer table").is_ok());

        assert!(matches!(
            validate_identifier("target.table", "  "),
            Err(ConfigError::MissingRequired { .. })
        ));
        assert!(validate_identifier("target.table", "x`; DROP TABLE y").is_err());
        assert!(validate_identifier("target.table", &"a".repeat(65)).is_err());
    }
}
