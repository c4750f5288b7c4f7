use crate::config::JdbcConfig;
use crate::constants::patterns;
use crate::error::{DrError, Result};

pub const TNSNAMES_FILE: &str = "tnsnames.ora";

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Replace whole-token, case-insensitive occurrences of `from`.
fn replace_token(text: &str, from: &str, to: &str) -> Result<(String, usize)> {
    let re = regex::Regex::new(&patterns::tns_token(from))
        .map_err(|e| DrError::parse("tnsnames token", e.to_string()))?;
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut count = 0;
    for m in re.find_iter(text) {
        let before = text[..m.start()].chars().next_back();
        let after = text[m.end()..].chars().next();
        if before.is_some_and(is_token_char) || after.is_some_and(is_token_char) {
            continue;
        }
        out.push_str(&text[last..m.start()]);
        out.push_str(to);
        last = m.end();
        count += 1;
    }
    out.push_str(&text[last..]);
    Ok((out, count))
}

/// Point the primary's alias file at the cloud database: the premises
/// service name and scan address become the cloud ones. Returns the new
/// text and how many tokens changed.
pub fn rewrite(text: &str, jdbc: &JdbcConfig) -> Result<(String, usize)> {
    let mut out = text.to_string();
    let mut replaced = 0;
    for (from, to) in [
        (&jdbc.prem_service_name, &jdbc.oci_service_name),
        (&jdbc.prem_scan_address, &jdbc.oci_scan_address),
    ] {
        if from.is_empty() || from == to {
            continue;
        }
        let (next, n) = replace_token(&out, from, to)?;
        out = next;
        replaced += n;
    }
    Ok((out, replaced))
}
