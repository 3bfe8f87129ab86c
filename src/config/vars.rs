//! Environment variable interpolation for config files.
//!
//! Supported forms:
//! - `$VAR` or `${VAR}` - substitute, error if missing
//! - `${VAR:-default}` - default when VAR is unset OR empty
//! - `${VAR-default}` - default only when VAR is unset
//! - `$$` - literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                                            # literal dollar
        |
        \$\{
            (?P<braced>[A-Za-z_][A-Za-z0-9_]*)          # ${VAR...}
            (?:
                (?P<sep>:?-)                            # :- or -
                (?P<default>[^}]*)
            )?
        \}
        |
        \$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)              # $VAR
        ",
    )
    .expect("interpolation pattern must compile")
});

/// Expand environment references in `input`.
///
/// Missing variables are accumulated and reported together, so the
/// operator sees every unset name in one pass.
pub fn expand(input: &str) -> Result<String, String> {
    let mut missing = Vec::new();

    let expanded = VAR_PATTERN
        .replace_all(input, |caps: &Captures| substitute(caps, &mut missing))
        .into_owned();

    if missing.is_empty() {
        Ok(expanded)
    } else {
        Err(missing.join("\n"))
    }
}

fn substitute(caps: &Captures, missing: &mut Vec<String>) -> String {
    if &caps[0] == "$$" {
        return "$".to_string();
    }

    let name = caps
        .name("braced")
        .or_else(|| caps.name("bare"))
        .map(|m| m.as_str())
        .unwrap_or_default();
    let default = caps.name("default").map(|m| m.as_str());
    let treat_empty_as_unset = caps.name("sep").map(|m| m.as_str()) == Some(":-");

    match env::var(name) {
        Ok(value) if value.is_empty() && treat_empty_as_unset => {
            default.unwrap_or_default().to_string()
        }
        Ok(value) => value,
        Err(_) => match default {
            Some(default) => default.to_string(),
            None => {
                missing.push(format!("environment variable '{name}' is not set"));
                caps[0].to_string()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own variable names so they can run in parallel.

    #[test]
    fn test_braced_and_bare_substitution() {
        env::set_var("MILLRACE_TEST_BUCKET", "cdc-exports");
        let out = expand("s3://${MILLRACE_TEST_BUCKET}/x and $MILLRACE_TEST_BUCKET").unwrap();
        assert_eq!(out, "s3://cdc-exports/x and cdc-exports");
    }

    #[test]
    fn test_default_applies_when_unset() {
        let out = expand("${MILLRACE_TEST_NOT_SET_1:-fallback}").unwrap();
        assert_eq!(out, "fallback");
    }

    #[test]
    fn test_colon_dash_applies_to_empty_value() {
        env::set_var("MILLRACE_TEST_EMPTY", "");
        assert_eq!(expand("${MILLRACE_TEST_EMPTY:-x}").unwrap(), "x");
        // Plain dash keeps the empty value.
        assert_eq!(expand("${MILLRACE_TEST_EMPTY-y}").unwrap(), "");
    }

    #[test]
    fn test_dollar_escape() {
        assert_eq!(expand("cost: $$5").unwrap(), "cost: $5");
    }

    #[test]
    fn test_missing_variables_are_all_reported() {
        let err = expand("${MILLRACE_TEST_NOT_SET_2} ${MILLRACE_TEST_NOT_SET_3}").unwrap_err();
        assert!(err.contains("MILLRACE_TEST_NOT_SET_2"));
        assert!(err.contains("MILLRACE_TEST_NOT_SET_3"));
    }
}
