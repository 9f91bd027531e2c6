use crate::error::{ErrorKind, Result};
use time::Duration;

/// Retention thresholds, already resolved from configuration.
///
/// Every limit is optional; a policy with no limits deletes nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionPolicy {
    /// Records captured longer ago than this are deleted.
    pub max_age: Option<Duration>,
    /// Upper bound on the bytes occupied by the upload tree.
    pub max_total_size: Option<u64>,
    /// Upper bound on volume usage, as `used / (used + free)` in percent.
    pub max_usage_percent: Option<f64>,
    /// Lower bound on free bytes on the volume.
    pub min_free_space: Option<u64>,
    /// Extra bytes to free once `min_free_space` has been breached.
    pub free_space_headroom: u64,
    /// Files modified more recently than this are never touched.
    pub grace_period: Duration,
    /// Whether unrecognized files count toward `max_total_size`.
    pub count_unrecognized: bool,
}
impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: None,
            max_total_size: None,
            max_usage_percent: None,
            min_free_space: None,
            free_space_headroom: 0,
            grace_period: Duration::ZERO,
            count_unrecognized: true,
        }
    }
}
impl RetentionPolicy {
    /// Rejects contradictory or out of range thresholds.
    pub fn validate(&self) -> Result<()> {
        if let Some(age) = self.max_age
            && age <= Duration::ZERO
        {
            exn::bail!(ErrorKind::Policy("maximum age must be positive".to_string()));
        }
        if let Some(percent) = self.max_usage_percent
            && !(percent.is_finite() && percent > 0.0 && percent <= 100.0)
        {
            exn::bail!(ErrorKind::Policy(format!("maximum usage of {percent}% is not within (0, 100]")));
        }
        if self.grace_period < Duration::ZERO {
            exn::bail!(ErrorKind::Policy("grace period must not be negative".to_string()));
        }
        if self.free_space_headroom > 0 && self.min_free_space.is_none() {
            exn::bail!(ErrorKind::Policy("free space headroom requires a minimum free space".to_string()));
        }
        Ok(())
    }

    /// Whether any rule that reads volume figures is configured.
    pub fn needs_probe(&self) -> bool {
        self.max_usage_percent.is_some() || self.min_free_space.is_some()
    }

    /// Whether any rule remains usable without volume figures.
    pub fn usable_without_probe(&self) -> bool {
        self.max_age.is_some() || self.max_total_size.is_some()
    }

    /// Whether the policy limits anything at all.
    pub fn is_empty(&self) -> bool {
        !self.needs_probe() && !self.usable_without_probe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_is_valid_and_empty() {
        let policy = RetentionPolicy::default();
        assert!(policy.validate().is_ok());
        assert!(policy.is_empty());
        assert!(policy.count_unrecognized);
    }

    #[rstest]
    #[case(RetentionPolicy { max_age: Some(Duration::ZERO), ..Default::default() })]
    #[case(RetentionPolicy { max_age: Some(Duration::days(-1)), ..Default::default() })]
    #[case(RetentionPolicy { max_usage_percent: Some(0.0), ..Default::default() })]
    #[case(RetentionPolicy { max_usage_percent: Some(100.5), ..Default::default() })]
    #[case(RetentionPolicy { max_usage_percent: Some(f64::NAN), ..Default::default() })]
    #[case(RetentionPolicy { grace_period: Duration::seconds(-1), ..Default::default() })]
    #[case(RetentionPolicy { free_space_headroom: 10, ..Default::default() })]
    fn test_rejects(#[case] policy: RetentionPolicy) {
        let err = policy.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Policy(_)));
    }

    #[test]
    fn test_probe_requirements() {
        let age_only = RetentionPolicy { max_age: Some(Duration::days(30)), ..Default::default() };
        assert!(!age_only.needs_probe());
        assert!(age_only.usable_without_probe());
        let percent = RetentionPolicy { max_usage_percent: Some(100.0), ..Default::default() };
        assert!(percent.validate().is_ok());
        assert!(percent.needs_probe());
        assert!(!percent.usable_without_probe());
        assert!(!percent.is_empty());
    }
}
