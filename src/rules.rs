//! Rule-based scoring engine
//!
//! Evaluates seven independent rules against a record, each contributing
//! fixed points and a human-readable reason when triggered. Rules do not
//! interact; points sum and the tier falls out of the total. The only
//! mutable state is the rate limiter consulted by the first rule.

use std::collections::HashSet;

use aho_corasick::AhoCorasick;
use anyhow::Result;

use crate::config::{LimiterConfig, RuleWeights, RulesConfig};
use crate::models::{Record, ScoreResult, Tier};
use crate::rate_limit::RateLimiter;

pub const REASON_RATE_LIMIT: &str = "Rate Limiting Exceeded";
pub const REASON_COUNTRY: &str = "País Suspeito";
pub const REASON_ASN: &str = "ASN Suspeito";
pub const REASON_DEVICE: &str = "Dispositivo Suspeito";
pub const REASON_REFERER: &str = "Referer Suspeito";
pub const REASON_URI: &str = "URI Suspeita";
pub const REASON_SCHEME: &str = "Protocolo HTTP Inseguro";

/// Classification engine: static rule sets plus the stateful rate limiter
pub struct ClassificationEngine {
    weights: RuleWeights,
    countries: HashSet<String>,
    devices: HashSet<String>,
    /// Multi-substring matcher over the configured referer fragments
    referers: AhoCorasick,
    uri_keywords: HashSet<String>,
    suspicious_asns: HashSet<i64>,
    limiter: RateLimiter,
}

impl ClassificationEngine {
    /// Build the engine from rule configuration and the externally supplied
    /// suspicious-ASN set. An empty ASN set simply means the ASN rule never
    /// matches.
    pub fn new(
        rules: &RulesConfig,
        limiter: &LimiterConfig,
        suspicious_asns: HashSet<i64>,
    ) -> Result<Self> {
        let referers = AhoCorasick::new(&rules.referers)?;

        Ok(Self {
            weights: rules.weights.clone(),
            countries: rules.countries.iter().cloned().collect(),
            devices: rules.devices.iter().map(|d| d.to_lowercase()).collect(),
            referers,
            uri_keywords: rules.uri_keywords.iter().map(|k| k.to_lowercase()).collect(),
            suspicious_asns,
            limiter: RateLimiter::new(limiter),
        })
    }

    /// Score one record. Deterministic given identical prior limiter state;
    /// the limiter mutation from the first rule is the only side effect.
    pub fn classify(&mut self, record: &Record, now_ms: i64) -> ScoreResult {
        let mut points = 0;
        let mut reasons = Vec::new();

        if self.limiter.check(&record.ip, now_ms) {
            points += self.weights.rate_limit_exceeded;
            reasons.push(REASON_RATE_LIMIT);
        }

        if self.countries.contains(&record.country) {
            points += self.weights.suspicious_country;
            reasons.push(REASON_COUNTRY);
        }

        if let Ok(asn) = record.asn.trim().parse::<i64>() {
            if self.suspicious_asns.contains(&asn) {
                points += self.weights.suspicious_asn;
                reasons.push(REASON_ASN);
            }
        }

        if self.devices.contains(&record.device.to_lowercase()) {
            points += self.weights.suspicious_device;
            reasons.push(REASON_DEVICE);
        }

        if self.referers.is_match(&record.referer) {
            points += self.weights.suspicious_referer;
            reasons.push(REASON_REFERER);
        }

        if record
            .uri
            .split('/')
            .any(|segment| self.uri_keywords.contains(&segment.to_lowercase()))
        {
            points += self.weights.suspicious_uri;
            reasons.push(REASON_URI);
        }

        if record.scheme == "http" {
            points += self.weights.insecure_scheme;
            reasons.push(REASON_SCHEME);
        }

        ScoreResult {
            points,
            reasons,
            tier: Tier::from_points(points),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_asns(asns: &[i64]) -> ClassificationEngine {
        ClassificationEngine::new(
            &RulesConfig::default(),
            &LimiterConfig::default(),
            asns.iter().copied().collect(),
        )
        .unwrap()
    }

    fn clean_record() -> Record {
        Record {
            ip: "1.1.1.1".to_string(),
            port: Some(443),
            method: "GET".to_string(),
            uri: "/index.html".to_string(),
            referer: "https://example.com/".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            country: "US".to_string(),
            asn: "13335".to_string(),
            device: "desktop".to_string(),
            scheme: "https".to_string(),
        }
    }

    #[test]
    fn test_clean_record_is_low() {
        let mut engine = engine_with_asns(&[]);
        let result = engine.classify(&clean_record(), 0);
        assert_eq!(result.points, 0);
        assert!(result.reasons.is_empty());
        assert_eq!(result.tier, Tier::Low);
    }

    #[test]
    fn test_country_scheme_uri_stack_to_high() {
        let mut engine = engine_with_asns(&[]);
        let mut record = clean_record();
        record.country = "CN".to_string();
        record.scheme = "http".to_string();
        record.uri = "/admin/panel".to_string();

        let result = engine.classify(&record, 0);
        assert_eq!(result.points, 10 + 4 + 7);
        assert_eq!(result.tier, Tier::High);
        assert_eq!(
            result.reasons,
            vec![REASON_COUNTRY, REASON_URI, REASON_SCHEME]
        );
    }

    #[test]
    fn test_single_weak_signal_stays_low() {
        let mut engine = engine_with_asns(&[]);
        let mut record = clean_record();
        record.device = "Mobile".to_string();

        let result = engine.classify(&record, 0);
        assert_eq!(result.points, 5);
        assert_eq!(result.tier, Tier::Low);
        assert_eq!(result.reasons, vec![REASON_DEVICE]);
    }

    #[test]
    fn test_asn_rule_integer_coercion() {
        let mut engine = engine_with_asns(&[4134]);
        let mut record = clean_record();
        record.asn = "4134".to_string();
        let result = engine.classify(&record, 0);
        assert_eq!(result.reasons, vec![REASON_ASN]);

        // Surrounding whitespace still matches
        record.asn = " 4134 ".to_string();
        let result = engine.classify(&record, 0);
        assert_eq!(result.reasons, vec![REASON_ASN]);

        // Unparseable ASN is a non-matching sentinel, not an error
        record.asn = "not-a-number".to_string();
        let result = engine.classify(&record, 0);
        assert!(result.reasons.is_empty());
    }

    #[test]
    fn test_referer_substring_match() {
        let mut engine = engine_with_asns(&[]);
        let mut record = clean_record();
        record.referer = "see http://untrustedsite.com/page?q=1".to_string();
        let result = engine.classify(&record, 0);
        assert_eq!(result.reasons, vec![REASON_REFERER]);
    }

    #[test]
    fn test_uri_segment_must_match_exactly() {
        let mut engine = engine_with_asns(&[]);
        let mut record = clean_record();

        // "administration" is not the segment "admin"
        record.uri = "/administration/home".to_string();
        assert!(engine.classify(&record, 0).reasons.is_empty());

        record.uri = "/wp-login".to_string();
        assert_eq!(engine.classify(&record, 0).reasons, vec![REASON_URI]);

        // Segment matching is case-insensitive
        record.uri = "/ADMIN/x".to_string();
        assert_eq!(engine.classify(&record, 0).reasons, vec![REASON_URI]);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let mut a = engine_with_asns(&[4134]);
        let mut b = engine_with_asns(&[4134]);

        let mut record = clean_record();
        record.country = "CN".to_string();
        record.asn = "4134".to_string();
        record.scheme = "http".to_string();

        // Identical limiter state in both engines at every step, so the
        // same record sequence must score identically
        for i in 0..5 {
            let now_ms = i * 100;
            assert_eq!(a.classify(&record, now_ms), b.classify(&record, now_ms));
        }
    }

    #[test]
    fn test_rate_limit_rule() {
        let mut engine = ClassificationEngine::new(
            &RulesConfig::default(),
            &LimiterConfig {
                max_requests: 3,
                window_ms: 60_000,
            },
            HashSet::new(),
        )
        .unwrap();

        let record = clean_record();
        for _ in 0..3 {
            assert!(engine.classify(&record, 100).reasons.is_empty());
        }
        let result = engine.classify(&record, 200);
        assert_eq!(result.reasons, vec![REASON_RATE_LIMIT]);
        assert_eq!(result.points, 15);
        assert_eq!(result.tier, Tier::Medium);
    }
}
