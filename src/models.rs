use serde::{Deserialize, Serialize};

/// Risk tier derived from accumulated rule points
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl Tier {
    /// Tier is a pure function of points: <=9 low, 10-18 medium, >18 high
    pub fn from_points(points: u32) -> Self {
        if points <= 9 {
            Tier::Low
        } else if points <= 18 {
            Tier::Medium
        } else {
            Tier::High
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Low => write!(f, "LOW"),
            Tier::Medium => write!(f, "MEDIUM"),
            Tier::High => write!(f, "HIGH"),
        }
    }
}

/// One parsed access-log line
///
/// Built from a header-indexed column mapping, so a missing or reordered
/// column degrades to an empty value instead of failing the parse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub ip: String,
    /// Source port; unparseable values become None rather than aborting the record
    pub port: Option<u16>,
    pub method: String,
    pub uri: String,
    pub referer: String,
    pub user_agent: String,
    /// Two-letter country code
    pub country: String,
    /// Kept as the raw column value; integer-coerced at rule-evaluation time
    pub asn: String,
    pub device: String,
    pub scheme: String,
}

/// Outcome of scoring one record against the rule set
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    pub points: u32,
    /// Reasons in rule-evaluation order
    pub reasons: Vec<&'static str>,
    pub tier: Tier,
}

impl ScoreResult {
    /// Joined reason string for display and persistence, None when clean
    pub fn reason(&self) -> Option<String> {
        if self.reasons.is_empty() {
            None
        } else {
            Some(self.reasons.join(", "))
        }
    }
}

/// A record together with its classification, as handed to the sink
#[derive(Debug, Clone)]
pub struct Classified {
    pub record: Record,
    pub score: ScoreResult,
    /// Processing-time timestamp captured when the record was scored
    pub classified_at_ms: i64,
}

/// Allowlist entry, deduplicated by ip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllowEntry {
    pub ip: String,
    pub method: String,
    pub scheme: String,
    pub uri: String,
}

impl AllowEntry {
    pub fn from_record(record: &Record) -> Self {
        Self {
            ip: record.ip.clone(),
            method: record.method.clone(),
            scheme: record.scheme.clone(),
            uri: record.uri.clone(),
        }
    }
}

/// Blocklist entry: one violation event
///
/// An IP may accrue many of these; "currently blocked" is a read-time
/// predicate over the stored timestamps, never a stored flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockEntry {
    pub ip: String,
    pub port: Option<u16>,
    pub method: String,
    pub uri: String,
    pub referer: String,
    pub user_agent: String,
    pub country: String,
    pub asn: String,
    pub device: String,
    pub scheme: String,
    /// Epoch milliseconds captured at classification time
    pub timestamp: i64,
    pub reason: Option<String>,
    pub points: u32,
}

impl BlockEntry {
    pub fn new(record: &Record, score: &ScoreResult, now_ms: i64) -> Self {
        Self {
            ip: record.ip.clone(),
            port: record.port,
            method: record.method.clone(),
            uri: record.uri.clone(),
            referer: record.referer.clone(),
            user_agent: record.user_agent.clone(),
            country: record.country.clone(),
            asn: record.asn.clone(),
            device: record.device.clone(),
            scheme: record.scheme.clone(),
            timestamp: now_ms,
            reason: score.reason(),
            points: score.points,
        }
    }

    /// Whether this block event still counts against the TTL at `now_ms`
    pub fn is_active(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms - self.timestamp < ttl_ms
    }

    /// Remaining block time in milliseconds, clamped at zero
    pub fn remaining_ms(&self, now_ms: i64, ttl_ms: i64) -> i64 {
        (ttl_ms - (now_ms - self.timestamp)).max(0)
    }

    pub fn tier(&self) -> Tier {
        Tier::from_points(self.points)
    }
}

/// Which persisted list an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Allow,
    Block,
}

impl ListKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Allow => "allowlist",
            ListKind::Block => "blocklist",
        }
    }
}

impl std::str::FromStr for ListKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" | "allowlist" => Ok(ListKind::Allow),
            "block" | "blocklist" => Ok(ListKind::Block),
            other => Err(format!("Unknown list: {}", other)),
        }
    }
}

impl std::fmt::Display for ListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Row for the periodic blocklist view: a block event plus remaining TTL
#[derive(Debug, Clone)]
pub struct BlockStatusRow {
    pub entry: BlockEntry,
    pub remaining_ms: i64,
}

impl BlockStatusRow {
    /// Remaining time as `XhYmZs`, the way the blocklist view renders it
    pub fn remaining_display(&self) -> String {
        let total_secs = self.remaining_ms / 1000;
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;
        format!("{}h {}m {}s", hours, minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        Record {
            ip: "1.2.3.4".to_string(),
            port: Some(443),
            method: "GET".to_string(),
            uri: "/".to_string(),
            referer: String::new(),
            user_agent: String::new(),
            country: "US".to_string(),
            asn: "13335".to_string(),
            device: "desktop".to_string(),
            scheme: "https".to_string(),
        }
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(Tier::from_points(0), Tier::Low);
        assert_eq!(Tier::from_points(9), Tier::Low);
        assert_eq!(Tier::from_points(10), Tier::Medium);
        assert_eq!(Tier::from_points(18), Tier::Medium);
        assert_eq!(Tier::from_points(19), Tier::High);
    }

    #[test]
    fn test_block_entry_expiry() {
        let score = ScoreResult {
            points: 21,
            reasons: vec!["País Suspeito"],
            tier: Tier::High,
        };
        let ttl = 12 * 60 * 60 * 1000;

        let entry = BlockEntry::new(&sample_record(), &score, 1_000_000);
        assert!(entry.is_active(1_000_000, ttl));
        assert!(entry.is_active(1_000_000 + ttl - 1, ttl));
        assert!(!entry.is_active(1_000_000 + ttl, ttl));
        assert_eq!(entry.remaining_ms(1_000_000 + ttl + 5, ttl), 0);
    }

    #[test]
    fn test_reason_joining() {
        let clean = ScoreResult {
            points: 0,
            reasons: vec![],
            tier: Tier::Low,
        };
        assert_eq!(clean.reason(), None);

        let scored = ScoreResult {
            points: 14,
            reasons: vec!["País Suspeito", "Protocolo HTTP Inseguro"],
            tier: Tier::Medium,
        };
        assert_eq!(
            scored.reason().unwrap(),
            "País Suspeito, Protocolo HTTP Inseguro"
        );
    }

    #[test]
    fn test_remaining_display() {
        let score = ScoreResult {
            points: 0,
            reasons: vec![],
            tier: Tier::Low,
        };
        let row = BlockStatusRow {
            entry: BlockEntry::new(&sample_record(), &score, 0),
            remaining_ms: (2 * 3600 + 15 * 60 + 42) * 1000,
        };
        assert_eq!(row.remaining_display(), "2h 15m 42s");
    }
}
