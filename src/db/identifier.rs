// Identifier validation
// Object names cannot be bound as parameters, so they are allow-listed
// before being spliced into SQL text.

/// True when `name` is non-empty and made only of ASCII letters, digits and `_`.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Bracket-quote a validated identifier.
pub fn quote(name: &str) -> String {
    format!("[{}]", name)
}

/// `[schema].[table]`, or `[table]` when the schema is empty.
pub fn qualified_table(schema: &str, table: &str) -> String {
    if schema.is_empty() {
        quote(table)
    } else {
        format!("{}.{}", quote(schema), quote(table))
    }
}
