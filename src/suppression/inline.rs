//! Inline suppression annotations.
//!
//! ```solidity
//! // sentinel-disable-next-line reentrancy-external-call until 2025-06-30: audited
//! (bool ok, ) = msg.sender.call{value: amount}("");
//!
//! require(tx.origin == owner); // sentinel-disable-line tx-origin-auth,tx-origin-use
//! ```
//!
//! Vyper sources use `#` instead of `//`.

use super::{Suppression, SuppressionOrigin, SuppressionScope};
use crate::analysis::SourceLocation;
use chrono::NaiveDate;
use regex::Regex;

/// Parses every annotation in `source`, a file reported as `file`.
///
/// Malformed annotations are skipped with a warning.
pub fn parse_inline(file: &str, source: &str) -> Vec<Suppression> {
    let pattern = match Regex::new(r"(?://|#)\s*sentinel-disable-(next-line|line)\b(.*)$") {
        Ok(re) => re,
        Err(e) => {
            log::warn!("Inline suppression pattern failed to compile: {}", e);
            return Vec::new();
        }
    };

    let mut suppressions = Vec::new();
    for (index, text) in source.lines().enumerate() {
        let Some(captures) = pattern.captures(text) else {
            continue;
        };
        let line = index + 1;
        let target = if &captures[1] == "next-line" {
            line + 1
        } else {
            line
        };
        let annotation = SourceLocation::new(file, line, 0);

        match parse_body(&captures[2]) {
            Ok((rules, expires, reason)) => {
                suppressions.extend(rules.into_iter().map(|rule| Suppression {
                    rule,
                    scope: SuppressionScope::File {
                        file: file.to_string(),
                        lines: Some((target, target)),
                    },
                    reason: reason.clone(),
                    expires,
                    origin: SuppressionOrigin::Inline(annotation.clone()),
                }));
            }
            Err(message) => log::warn!("Ignoring annotation at {}: {}", annotation, message),
        }
    }
    suppressions
}

type Body = (Vec<String>, Option<NaiveDate>, Option<String>);

/// Parses `<rule>[,<rule>] [until YYYY-MM-DD] [: reason]`.
fn parse_body(body: &str) -> Result<Body, String> {
    let (head, reason) = match body.split_once(':') {
        Some((head, reason)) => {
            let reason = reason.trim();
            (head, (!reason.is_empty()).then(|| reason.to_string()))
        }
        None => (body, None),
    };

    let tokens: Vec<&str> = head.split_whitespace().collect();
    let (rule_tokens, expires) = match tokens.iter().position(|t| *t == "until") {
        Some(at) => {
            let date = tokens
                .get(at + 1)
                .ok_or_else(|| "`until` without a date".to_string())?;
            if at + 2 != tokens.len() {
                return Err("unexpected text after the expiry date".to_string());
            }
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|e| format!("invalid expiry date `{}`: {}", date, e))?;
            (&tokens[..at], Some(date))
        }
        None => (&tokens[..], None),
    };

    let rules: Vec<String> = rule_tokens
        .join("")
        .split(',')
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect();
    if rules.is_empty() {
        return Err("no rule id given".to_string());
    }

    Ok((rules, expires, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_line_annotation_with_expiry_and_reason() {
        let source = "contract Bank {\n    // sentinel-disable-next-line reentrancy-external-call until 2025-06-30: audited by ops\n    (bool ok, ) = msg.sender.call{value: amount}(\"\");\n}\n";
        let parsed = parse_inline("Bank.sol", source);

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].rule, "reentrancy-external-call");
        assert_eq!(
            parsed[0].scope,
            SuppressionScope::File {
                file: "Bank.sol".to_string(),
                lines: Some((3, 3))
            }
        );
        assert_eq!(parsed[0].reason.as_deref(), Some("audited by ops"));
        assert_eq!(parsed[0].expires, NaiveDate::from_ymd_opt(2025, 6, 30));
    }

    #[test]
    fn test_same_line_annotation_with_several_rules() {
        let source = "require(tx.origin == owner); // sentinel-disable-line tx-origin-auth, tx-origin-use\n";
        let parsed = parse_inline("W.sol", source);

        let rules: Vec<_> = parsed.iter().map(|s| s.rule.as_str()).collect();
        assert_eq!(rules, vec!["tx-origin-auth", "tx-origin-use"]);
        assert!(parsed.iter().all(|s| s.expires.is_none() && s.reason.is_none()));
    }

    #[test]
    fn test_malformed_annotations_are_skipped() {
        let source = "# sentinel-disable-line\n# sentinel-disable-line x until tomorrow\n# sentinel-disable-line unbounded-loop\n";
        let parsed = parse_inline("V.vy", source);

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].rule, "unbounded-loop");
    }
}
