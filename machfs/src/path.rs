//! Colon-separated HFS path parsing (Apple TN1041).
//!
//! A leading colon makes the path volume-relative; an empty interior
//! component steps up to the parent; a trailing colon is decoration.

use crate::error::{HfsError, Result};

/// Split a colon path into components.
///
/// The leading empty component of a relative path is preserved so the
/// caller can tell `:Foo` from `Foo`. Interior empty components (parent
/// pops) are validated against the traversal depth and dropped; popping
/// with nothing left to pop is a syntax error.
pub fn parse(path: &str) -> Result<Vec<String>> {
    if path.is_empty() {
        return Err(HfsError::PathSyntax("empty path".into()));
    }

    let mut raw: Vec<&str> = path.split(':').collect();
    // Trailing colon is ignored
    if raw.len() > 1 && raw.last() == Some(&"") {
        raw.pop();
    }

    let mut out = Vec::with_capacity(raw.len());
    let relative = raw.first() == Some(&"");
    let mut rest = raw.into_iter();
    if relative {
        rest.next();
        out.push(String::new());
    }

    let mut depth: usize = 0;
    for component in rest {
        if component.is_empty() {
            depth = depth.checked_sub(1).ok_or_else(|| {
                HfsError::PathSyntax(format!("too many parent pops in {path:?}"))
            })?;
        } else {
            depth += 1;
            out.push(component.to_string());
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_with_trailing_colon() {
        assert_eq!(parse(":Foo:Bar:").unwrap(), ["", "Foo", "Bar"]);
    }

    #[test]
    fn interior_pop_is_validated() {
        assert_eq!(parse("Vol:Foo::Baz").unwrap(), ["Vol", "Foo", "Baz"]);
    }

    #[test]
    fn underflowing_pops_fail() {
        assert!(matches!(parse(":::"), Err(HfsError::PathSyntax(_))));
    }

    #[test]
    fn bare_name() {
        assert_eq!(parse("System").unwrap(), ["System"]);
    }

    #[test]
    fn lone_colon_is_volume_root() {
        assert_eq!(parse(":").unwrap(), [""]);
    }

    #[test]
    fn empty_is_an_error() {
        assert!(matches!(parse(""), Err(HfsError::PathSyntax(_))));
    }
}
