//! Matching engine configuration.

use hireflow_core::{defaults, Error, Result};

/// Immutable settings for one [`crate::MatchingEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct MatchingConfig {
    /// Re-score borderline candidates with enriched context.
    pub multi_pass_enabled: bool,
    /// Ask the model which enrichment sources to fetch before re-matching.
    pub source_selection_enabled: bool,
    /// Lower bound of the borderline band (inclusive).
    pub borderline_min: f64,
    /// Upper bound of the borderline band (inclusive).
    pub borderline_max: f64,
    /// Days a cached external profile stays fresh.
    pub staleness_ttl_days: i64,
    /// Candidates scored concurrently; 1 scores them one after another.
    pub max_concurrency: usize,
    /// Token estimate charged per model call in the run audit.
    pub tokens_per_call: i64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            multi_pass_enabled: true,
            source_selection_enabled: false,
            borderline_min: defaults::BORDERLINE_MIN,
            borderline_max: defaults::BORDERLINE_MAX,
            staleness_ttl_days: defaults::STALENESS_TTL_DAYS,
            max_concurrency: defaults::MATCH_MAX_CONCURRENCY,
            tokens_per_call: defaults::TOKENS_PER_SCORING_CALL,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        })
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl MatchingConfig {
    /// Load configuration from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `MATCH_MULTI_PASS_ENABLED` | `true` | Borderline re-match pass |
    /// | `MATCH_SOURCE_SELECTION_ENABLED` | `false` | Model picks enrichment sources |
    /// | `MATCH_BORDERLINE_MIN` | `50` | Band lower bound |
    /// | `MATCH_BORDERLINE_MAX` | `75` | Band upper bound |
    /// | `ENRICHMENT_STALENESS_TTL_DAYS` | `7` | Profile cache freshness |
    /// | `MATCH_MAX_CONCURRENCY` | `1` | Candidates scored at once |
    /// | `MATCH_TOKENS_PER_CALL` | `1500` | Audit token estimate per call |
    ///
    /// Fails when the resulting band is invalid.
    pub fn from_env() -> Result<Self> {
        let base = Self::default();
        let config = Self {
            multi_pass_enabled: env_flag("MATCH_MULTI_PASS_ENABLED", base.multi_pass_enabled),
            source_selection_enabled: env_flag(
                "MATCH_SOURCE_SELECTION_ENABLED",
                base.source_selection_enabled,
            ),
            borderline_min: env_parse("MATCH_BORDERLINE_MIN").unwrap_or(base.borderline_min),
            borderline_max: env_parse("MATCH_BORDERLINE_MAX").unwrap_or(base.borderline_max),
            staleness_ttl_days: env_parse::<i64>("ENRICHMENT_STALENESS_TTL_DAYS")
                .unwrap_or(base.staleness_ttl_days)
                .max(0),
            max_concurrency: env_parse::<usize>("MATCH_MAX_CONCURRENCY")
                .unwrap_or(base.max_concurrency)
                .max(1),
            tokens_per_call: env_parse::<i64>("MATCH_TOKENS_PER_CALL")
                .unwrap_or(base.tokens_per_call)
                .max(0),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_multi_pass(mut self, enabled: bool) -> Self {
        self.multi_pass_enabled = enabled;
        self
    }

    pub fn with_source_selection(mut self, enabled: bool) -> Self {
        self.source_selection_enabled = enabled;
        self
    }

    pub fn with_borderline(mut self, min: f64, max: f64) -> Self {
        self.borderline_min = min;
        self.borderline_max = max;
        self
    }

    pub fn with_staleness_ttl_days(mut self, days: i64) -> Self {
        self.staleness_ttl_days = days.max(0);
        self
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    pub fn with_tokens_per_call(mut self, tokens: i64) -> Self {
        self.tokens_per_call = tokens.max(0);
        self
    }

    /// Whether a first-pass score falls inside the borderline band.
    pub fn in_borderline(&self, score: f64) -> bool {
        score >= self.borderline_min && score <= self.borderline_max
    }

    /// Check that the band is ordered and within the score range.
    pub fn validate(&self) -> Result<()> {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        if !in_range(self.borderline_min) || !in_range(self.borderline_max) {
            return Err(Error::Config(format!(
                "Borderline band [{}, {}] must lie within 0..=100",
                self.borderline_min, self.borderline_max
            )));
        }
        if self.borderline_min > self.borderline_max {
            return Err(Error::Config(format!(
                "Borderline min {} exceeds max {}",
                self.borderline_min, self.borderline_max
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_band_is_inclusive() {
        let config = MatchingConfig::default();
        assert!(config.in_borderline(50.0));
        assert!(config.in_borderline(75.0));
        assert!(!config.in_borderline(76.0));
        assert!(!config.in_borderline(49.9));
    }

    #[test]
    fn test_validate_rejects_inverted_or_out_of_range_band() {
        assert!(MatchingConfig::default().validate().is_ok());
        let inverted = MatchingConfig::default().with_borderline(80.0, 60.0);
        assert!(matches!(inverted.validate(), Err(Error::Config(_))));
        let out_of_range = MatchingConfig::default().with_borderline(50.0, 120.0);
        assert!(matches!(out_of_range.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_builders_clamp() {
        let config = MatchingConfig::default()
            .with_max_concurrency(0)
            .with_staleness_ttl_days(-3)
            .with_tokens_per_call(-1);
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.staleness_ttl_days, 0);
        assert_eq!(config.tokens_per_call, 0);
    }
}
