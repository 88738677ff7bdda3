//! Stateless payload scanners.
//!
//! All matching is done on the lowercased payload, so scanners are
//! case-insensitive.

use crate::events::ThreatKind;

pub const SQL_INJECTION_WEIGHT: f64 = 0.8;
pub const XSS_WEIGHT: f64 = 0.6;
pub const TRAVERSAL_WEIGHT: f64 = 0.4;

/// Any one of these is an injection on its own.
pub const SQL_INJECTION_PATTERNS: [&str; 5] = [
    "' or '1'='1",
    "' or 1=1",
    "'; drop table",
    "union select",
    "admin'--",
];

/// Two or more of these (as whole words) flag SQL injection.
pub const SQL_KEYWORDS: [&str; 10] = [
    "select", "union", "insert", "update", "delete", "drop", "create", "alter", "exec", "truncate",
];

/// Comment and statement markers counted alongside [`SQL_KEYWORDS`].
pub const SQL_MARKERS: [&str; 2] = ["--", "/*"];

pub const XSS_PATTERNS: [&str; 4] = ["<script", "javascript:", "onerror=", "onload="];

pub const PATH_TRAVERSAL_PATTERNS: [&str; 2] = ["../", "/etc/passwd"];

pub const COMMAND_INJECTION_PATTERNS: [&str; 3] = ["cmd.exe", "exec(", "eval("];

/// Combined signature result for one payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureMatch {
    pub score: f64,
    pub indicators: Vec<ThreatKind>,
}

fn sql_keyword_hits(lower: &str) -> usize {
    let words = lower
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| SQL_KEYWORDS.contains(w))
        .count();
    let markers = SQL_MARKERS.iter().filter(|m| lower.contains(*m)).count();
    words + markers
}

pub fn is_sql_injection(lower: &str) -> bool {
    SQL_INJECTION_PATTERNS.iter().any(|p| lower.contains(p)) || sql_keyword_hits(lower) >= 2
}

pub fn is_xss(lower: &str) -> bool {
    XSS_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Scan a payload. Families add up; the total is clamped to 1.0.
pub fn scan_payload(payload: &str) -> SignatureMatch {
    if payload.is_empty() {
        return SignatureMatch::default();
    }

    let lower = payload.to_lowercase();
    let mut result = SignatureMatch::default();

    if is_sql_injection(&lower) {
        result.score += SQL_INJECTION_WEIGHT;
        result.indicators.push(ThreatKind::SqlInjection);
    }
    if is_xss(&lower) {
        result.score += XSS_WEIGHT;
        result.indicators.push(ThreatKind::CrossSiteScripting);
    }

    // Traversal and command injection share one weight.
    let traversal = PATH_TRAVERSAL_PATTERNS.iter().any(|p| lower.contains(p));
    let command = COMMAND_INJECTION_PATTERNS.iter().any(|p| lower.contains(p));
    if traversal {
        result.indicators.push(ThreatKind::PathTraversal);
    }
    if command {
        result.indicators.push(ThreatKind::CommandInjection);
    }
    if traversal || command {
        result.score += TRAVERSAL_WEIGHT;
    }

    result.score = result.score.min(1.0);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_sql_injection() {
        let m = scan_payload("'; DROP TABLE users; --");
        assert_eq!(m.score, SQL_INJECTION_WEIGHT);
        assert_eq!(m.indicators, vec![ThreatKind::SqlInjection]);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(scan_payload("' OR 1=1").score, scan_payload("' or 1=1").score);
        assert_eq!(scan_payload("' OR 1=1").score, SQL_INJECTION_WEIGHT);
        assert_eq!(scan_payload("<SCRIPT>alert(1)</SCRIPT>").score, XSS_WEIGHT);
    }

    #[test]
    fn test_keyword_threshold() {
        // One keyword is not enough.
        assert!(!is_sql_injection("please select a size"));
        // Two are.
        assert!(is_sql_injection("select name from t; delete from t"));
        assert!(is_sql_injection("select * from users -- comment"));
        // Keywords only count as whole words.
        assert!(!is_sql_injection(r#"{"created_at": 1, "updated_at": 2}"#));
    }

    #[test]
    fn test_traversal_and_command_share_weight() {
        let m = scan_payload("../../etc/passwd && cmd.exe");
        assert_eq!(m.score, TRAVERSAL_WEIGHT);
        assert_eq!(m.indicators, vec![ThreatKind::PathTraversal, ThreatKind::CommandInjection]);
    }

    #[test]
    fn test_families_add_and_clamp() {
        let m = scan_payload("<script>eval(x)</script>");
        assert!((m.score - (XSS_WEIGHT + TRAVERSAL_WEIGHT)).abs() < 1e-9);

        let m = scan_payload("' or 1=1 <script> ../");
        assert_eq!(m.score, 1.0);
        assert_eq!(m.indicators.len(), 3);
    }

    #[test]
    fn test_clean_payload() {
        assert_eq!(scan_payload(""), SignatureMatch::default());
        assert_eq!(scan_payload(r#"{"name": "widget", "qty": 3}"#).score, 0.0);
    }
}
