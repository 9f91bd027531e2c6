use crate::record::RecordedFile;
use crate::retention::RetentionPolicy;
use crate::scan::Inventory;
use camkeep_storage::DiskUsage;
use derive_more::Display;
use serde::Serialize;
use std::path::PathBuf;
use time::OffsetDateTime;
use tracing::instrument;

/// Which rule marked a record for deletion.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    #[display("age")]
    Age,
    #[display("quota")]
    Quota,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub record: RecordedFile,
    pub reason: Reason,
}

/// A limit the plan knowingly leaves unmet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// The recording qualified for deletion but was modified within the
    /// grace period.
    GraceProtected { path: PathBuf, reason: Reason },
    /// Every eligible recording was marked and the quota is still exceeded
    /// by `shortfall` bytes.
    QuotaUnsatisfied { shortfall: u64 },
}

/// The outcome of [`evaluate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    /// Records to delete, in the order they were marked.
    pub deletions: Vec<Deletion>,
    pub violations: Vec<Violation>,
}
impl RetentionPlan {
    /// Total size of every record marked for deletion.
    pub fn bytes(&self) -> u64 {
        self.deletions.iter().map(|d| d.record.size).sum()
    }
}

/// Computes the set of records to delete.
///
/// Records (eligible and grace-protected alike) are ordered oldest capture
/// first, ties broken by path. The age rule marks everything captured before
/// `now - max_age`. The quota rule then continues from the oldest unmarked
/// record, stopping as soon as the bytes marked in total cover what every
/// configured limit requires. Grace-protected records are never marked;
/// wherever one would have been, a [`Violation::GraceProtected`] is recorded
/// and evaluation moves on to the next record.
///
/// Limits that read volume figures are skipped when `usage` is `None`.
#[instrument(skip_all, fields(records = inventory.records.len(), protected = inventory.protected.len()))]
pub fn evaluate(
    inventory: &Inventory,
    policy: &RetentionPolicy,
    usage: Option<&DiskUsage>,
    now: OffsetDateTime,
) -> RetentionPlan {
    let mut candidates: Vec<(&RecordedFile, bool)> = inventory
        .records
        .iter()
        .map(|r| (r, false))
        .chain(inventory.protected.iter().map(|r| (r, true)))
        .collect();
    candidates.sort_by(|(a, _), (b, _)| a.captured.cmp(&b.captured).then_with(|| a.path.cmp(&b.path)));

    let mut plan = RetentionPlan::default();
    let mut marked = vec![false; candidates.len()];
    let mut flagged = vec![false; candidates.len()];
    let mut removed = 0u64;

    if let Some(max_age) = policy.max_age {
        let cutoff = now - max_age;
        for (i, (record, protected)) in candidates.iter().enumerate() {
            if record.captured >= cutoff {
                continue;
            }
            if *protected {
                flagged[i] = true;
                plan.violations.push(Violation::GraceProtected { path: record.path.clone(), reason: Reason::Age });
                continue;
            }
            marked[i] = true;
            removed += record.size;
            plan.deletions.push(Deletion { record: (*record).clone(), reason: Reason::Age });
        }
    }

    let required = required_bytes(inventory, policy, usage);
    if removed < required {
        for (i, (record, protected)) in candidates.iter().enumerate() {
            if removed >= required {
                break;
            }
            if marked[i] {
                continue;
            }
            if *protected {
                if !flagged[i] {
                    flagged[i] = true;
                    plan.violations.push(Violation::GraceProtected { path: record.path.clone(), reason: Reason::Quota });
                }
                continue;
            }
            marked[i] = true;
            removed += record.size;
            plan.deletions.push(Deletion { record: (*record).clone(), reason: Reason::Quota });
        }
        if removed < required {
            plan.violations.push(Violation::QuotaUnsatisfied { shortfall: required - removed });
        }
    }

    tracing::debug!(
        deletions = plan.deletions.len(),
        bytes = plan.bytes(),
        required,
        violations = plan.violations.len(),
        "Retention evaluated"
    );
    plan
}

/// Bytes that must be released to satisfy every configured size limit at
/// once. Deleting exactly this much (or more) satisfies all of them, and
/// deleting less leaves at least one unmet.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn required_bytes(inventory: &Inventory, policy: &RetentionPolicy, usage: Option<&DiskUsage>) -> u64 {
    let mut required = 0;
    if let Some(max_total) = policy.max_total_size {
        required = required.max(inventory.tree_bytes(policy.count_unrecognized).saturating_sub(max_total));
    }
    let Some(usage) = usage else {
        return required;
    };
    if let Some(percent) = policy.max_usage_percent {
        let usable = usage.used_bytes.saturating_add(usage.free_bytes);
        let allowed = (usable as f64 * percent / 100.0).floor() as u64;
        required = required.max(usage.used_bytes.saturating_sub(allowed));
    }
    if let Some(min_free) = policy.min_free_space {
        // Once breached, free past the threshold so the next run does not
        // trigger again right away.
        let target = if usage.free_bytes < min_free { min_free.saturating_add(policy.free_space_headroom) } else { min_free };
        required = required.max(target.saturating_sub(usage.free_bytes));
    }
    required
}
