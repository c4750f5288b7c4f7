use regex::{Regex, RegexBuilder};

use crate::error::{DrError, Result};

/// Turns vendor-CLI text into predicates and extracted tokens.
///
/// Patterns come from [`crate::constants::patterns`].
pub struct OutputMatcher;

impl OutputMatcher {
    fn compile(pattern: &str, case_insensitive: bool) -> Result<Regex> {
        RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| DrError::parse(format!("pattern {}", pattern), e.to_string()))
    }

    /// True if `pattern` matches anywhere in `text`.
    pub fn contains(pattern: &str, text: &str, case_insensitive: bool) -> Result<bool> {
        Ok(Self::compile(pattern, case_insensitive)?.is_match(text))
    }

    /// First capture group of the first match, trimmed.
    pub fn extract(pattern: &str, text: &str) -> Result<Option<String>> {
        let re = Self::compile(pattern, false)?;
        Ok(re
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string()))
    }

    /// Like [`extract`](Self::extract) but a missing match is a parse error.
    pub fn require(pattern: &str, text: &str, what: &str) -> Result<String> {
        Self::extract(pattern, text)?.ok_or_else(|| {
            DrError::parse(
                what,
                format!("no match for /{}/ in output: {}", pattern, tail(text, 5)),
            )
        })
    }

    /// Every `(group1, group2)` pair, in order.
    pub fn extract_pairs(pattern: &str, text: &str) -> Result<Vec<(String, String)>> {
        let re = Self::compile(pattern, false)?;
        Ok(re
            .captures_iter(text)
            .filter_map(|c| {
                let a = c.get(1)?.as_str().trim().to_string();
                let b = c.get(2).map(|m| m.as_str().trim().to_string())?;
                Some((a, b))
            })
            .collect())
    }

    /// Every first capture group, in order.
    pub fn extract_all(pattern: &str, text: &str) -> Result<Vec<String>> {
        let re = Self::compile(pattern, false)?;
        Ok(re
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
            .collect())
    }

    /// The last non-empty line of `text`.
    pub fn last_line(text: &str) -> &str {
        text.lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
    }
}

/// Last `n` non-empty lines, for error messages.
pub fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::patterns;

    const BROKER_OUTPUT: &str = "\
Configuration - orcl_dg

  Protection Mode: MaxPerformance
  Members:
  ORCL_prim - Primary database
    ORCL_stby - Physical standby database

Fast-Start Failover:  Disabled

Configuration Status:
WARNING   (status updated 12 seconds ago)
";

    #[test]
    fn test_extract_configuration_status_across_newline() {
        let status = OutputMatcher::extract(patterns::DG_CONFIGURATION_STATUS, BROKER_OUTPUT)
            .unwrap()
            .unwrap();
        assert_eq!(status, "WARNING");
    }

    #[test]
    fn test_member_role_is_case_insensitive() {
        let p = patterns::dg_member_role("orcl_stby", patterns::ROLE_PHYSICAL_STANDBY);
        assert!(OutputMatcher::contains(&p, BROKER_OUTPUT, false).unwrap());
        let p = patterns::dg_member_role("orcl_stby", patterns::ROLE_PRIMARY);
        assert!(!OutputMatcher::contains(&p, BROKER_OUTPUT, false).unwrap());
    }

    #[test]
    fn test_require_reports_missing_match() {
        let err = OutputMatcher::require(patterns::ADMIN_SERVER_STATUS, "nothing here", "admin status")
            .unwrap_err();
        assert!(err.to_string().contains("admin status"));
    }

    #[test]
    fn test_last_line_skips_blank_tail() {
        assert_eq!(OutputMatcher::last_line("a\nb\n\n  \n"), "b");
        assert_eq!(OutputMatcher::last_line(""), "");
    }

    #[test]
    fn test_switchover_pattern_escapes_name() {
        let p = patterns::dg_switchover_succeeded("db.1");
        assert!(OutputMatcher::contains(&p, r#"Switchover succeeded, new primary is "DB.1""#, false).unwrap());
        assert!(!OutputMatcher::contains(&p, r#"Switchover succeeded, new primary is "dbx1""#, false).unwrap());
    }
}
