//! SQL identifier quoting and sanitization utilities.

/// Quote a SQL identifier using ANSI double-quoting.
///
/// Embedded double-quotes are escaped by doubling them (`"` → `""`).
///
/// # Examples
///
/// ```
/// use sqlbulk_core::quote_ident;
///
/// assert_eq!(quote_ident("users"), "\"users\"");
/// assert_eq!(quote_ident("user\"name"), "\"user\"\"name\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a SQL identifier using SQL Server bracket quoting.
///
/// Embedded closing brackets are escaped by doubling them (`]` → `]]`).
///
/// # Examples
///
/// ```
/// use sqlbulk_core::quote_ident_bracket;
///
/// assert_eq!(quote_ident_bracket("users"), "[users]");
/// assert_eq!(quote_ident_bracket("a]b"), "[a]]b]");
/// ```
#[inline]
pub fn quote_ident_bracket(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Sanitize a SQL identifier by removing non-alphanumeric/underscore characters.
///
/// Used for generated object names (temp tables, table types) that embed a
/// user-supplied table name.
///
/// # Examples
///
/// ```
/// use sqlbulk_core::sanitize_identifier;
///
/// assert_eq!(sanitize_identifier("order items"), "orderitems");
/// assert_eq!(sanitize_identifier("user;DROP TABLE--"), "userDROPTABLE");
/// ```
#[inline]
pub fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}
