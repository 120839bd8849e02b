//! Query preprocessing applied before parsing.
//!
//! Two rewrites make bare queries work from the CLI:
//!
//! 1. A query that does not start with `@` gets the active source's handle
//!    prepended: `.person` becomes `@active | .person`.
//! 2. An empty invocation with piped stdin becomes a selector for the pipe
//!    source's first table, e.g. `@stdin.data`. That rewrite needs driver
//!    metadata, so it lives with the engine; this module provides the
//!    string-level pieces.

use crate::error::{Error, Result};
use crate::source::validate_handle;

/// Ensures `query` begins with a handle, prepending `active` when it does
/// not. The output for a non-`@` query is exactly `"{active} | {query}"`.
///
/// # Errors
///
/// - [`Error::EmptyQuery`] when `query` is blank.
/// - [`Error::NoActiveSource`] when a rewrite is needed but there is no
///   active source.
/// - [`Error::InvalidHandle`] when the query starts with a malformed handle.
pub fn ensure_handle(query: &str, active: Option<&str>) -> Result<String> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyQuery);
    }

    if !trimmed.starts_with('@') {
        let active = active.ok_or(Error::NoActiveSource)?;
        return Ok(format!("{active} | {query}"));
    }

    // Starts with a handle; check it's well-formed before parsing proper.
    let handle = leading_handle(trimmed)
        .ok_or_else(|| Error::InvalidHandle(first_token(trimmed).to_string()))?;
    validate_handle(&handle)?;
    Ok(query.to_string())
}

/// The `@handle` part of the query's first token, without any `.table`
/// suffix. `None` if the query doesn't start with `@`.
pub fn leading_handle(query: &str) -> Option<String> {
    let tok = first_token(query.trim_start());
    if !tok.starts_with('@') {
        return None;
    }
    Some(tok.split('.').next().unwrap_or(tok).to_string())
}

fn first_token(s: &str) -> &str {
    s.split_whitespace().next().unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepends_active_handle_verbatim() {
        // The rewrite is exactly "@a | " + input.
        for input in [".person", ".person | .uid", ".person | .[1:3]"] {
            let got = ensure_handle(input, Some("@a")).unwrap();
            assert_eq!(got, format!("@a | {input}"));
        }
    }

    #[test]
    fn passes_handle_queries_through() {
        let q = "@my1 | .person";
        assert_eq!(ensure_handle(q, Some("@other")).unwrap(), q);
        assert_eq!(ensure_handle(q, None).unwrap(), q);
    }

    #[test]
    fn requires_active_source_for_bare_queries() {
        assert!(matches!(
            ensure_handle(".person", None),
            Err(Error::NoActiveSource)
        ));
    }

    #[test]
    fn rejects_blank_and_malformed() {
        assert!(matches!(ensure_handle("  ", Some("@a")), Err(Error::EmptyQuery)));
        assert!(ensure_handle("@X | .t", Some("@a")).is_err());
    }

    #[test]
    fn extracts_leading_handle() {
        assert_eq!(leading_handle("@my1.person | .uid"), Some("@my1".to_string()));
        assert_eq!(leading_handle("@my1 | .t"), Some("@my1".to_string()));
        assert_eq!(leading_handle(".person"), None);
    }
}
