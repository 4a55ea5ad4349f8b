//! Retention engine: decides which stored artifacts to evict and deletes them.
//!
//! Three independent rules select entries, and the selections are unioned by
//! path (first rule to pick an entry names the reason):
//!
//! 1. **max-age**: everything written before `now - max_age`
//! 2. **max-files**: the oldest `count - max_files` entries
//! 3. **max-size**: oldest-first, entries not already selected, until the
//!    total of the entries that survive fits the budget
//!
//! Deletion is best-effort: one failed delete is logged and the run goes on.

use crate::provider::{ListingEntry, StorageProvider};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{error, info};
use turbocache_core::{Result, RetentionPolicy};

/// Which rule selected an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetentionReason {
    /// Older than the age budget
    MaxAge,
    /// Beyond the file-count budget
    MaxFiles,
    /// Needed to fit the size budget
    MaxSize,
}

impl fmt::Display for RetentionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MaxAge => "max-age",
            Self::MaxFiles => "max-files",
            Self::MaxSize => "max-size",
        })
    }
}

/// One entry selected for eviction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionDecision {
    /// The entry to delete
    pub entry: ListingEntry,
    /// The rule that selected it
    pub reason: RetentionReason,
}

/// What a retention run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    /// Entries the provider listed
    pub listed: usize,
    /// Entries deleted
    pub deleted: usize,
    /// Deletes that failed
    pub failed: usize,
    /// The run did nothing: no budget, or the provider cannot list
    pub skipped: bool,
}

/// Select the entries that break `policy` at time `now`.
///
/// Pure; the result is ordered by rule, then oldest first.
#[must_use]
pub fn plan(
    entries: &[ListingEntry],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Vec<RetentionDecision> {
    let mut selected: Vec<RetentionDecision> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    let mut by_age: Vec<&ListingEntry> = entries.iter().collect();
    by_age.sort_by_key(|e| e.created_at);

    // An age too large to subtract from `now` selects nothing
    if let Some(max_age) = policy.max_age
        && let Ok(max_age) = chrono::Duration::from_std(max_age)
        && let Some(cutoff) = now.checked_sub_signed(max_age)
    {
        for entry in by_age.iter().filter(|e| e.created_at < cutoff) {
            select(entry, RetentionReason::MaxAge, &mut seen, &mut selected);
        }
    }

    if let Some(max_files) = policy.max_files
        && by_age.len() > max_files
    {
        let excess = by_age.len() - max_files;
        for entry in by_age.iter().take(excess) {
            select(entry, RetentionReason::MaxFiles, &mut seen, &mut selected);
        }
    }

    if let Some(max_size) = policy.max_size {
        // Entries already on their way out no longer count toward the total
        let mut total: u64 = entries
            .iter()
            .filter(|e| !seen.contains(e.path.as_str()))
            .map(|e| e.size)
            .sum();
        for entry in &by_age {
            if total <= max_size {
                break;
            }
            if select(entry, RetentionReason::MaxSize, &mut seen, &mut selected) {
                total = total.saturating_sub(entry.size);
            }
        }
    }

    selected
}

/// Record `entry` unless an earlier rule already picked it.
fn select<'a>(
    entry: &'a ListingEntry,
    reason: RetentionReason,
    seen: &mut HashSet<&'a str>,
    selected: &mut Vec<RetentionDecision>,
) -> bool {
    if !seen.insert(entry.path.as_str()) {
        return false;
    }
    selected.push(RetentionDecision {
        entry: entry.clone(),
        reason,
    });
    true
}

/// Apply `policy` to everything `provider` stores.
///
/// # Errors
///
/// Returns the listing error, except for the unsupported-operation error
/// which is logged and reported as a skipped run. Delete failures never
/// fail the run.
pub async fn run<P>(provider: &P, policy: &RetentionPolicy) -> Result<RetentionReport>
where
    P: StorageProvider + ?Sized,
{
    if policy.is_empty() {
        info!("No cleanup options provided, skipping cleanup");
        return Ok(RetentionReport {
            skipped: true,
            ..RetentionReport::default()
        });
    }

    let entries = match provider.list().await {
        Ok(entries) => entries,
        Err(err) if err.is_unsupported() => {
            info!(provider = provider.name(), "Provider cannot list entries, skipping cleanup");
            return Ok(RetentionReport {
                skipped: true,
                ..RetentionReport::default()
            });
        }
        Err(err) => return Err(err),
    };
    info!(count = entries.len(), "Found files in cache");

    let decisions = plan(&entries, policy, Utc::now());
    let mut report = RetentionReport {
        listed: entries.len(),
        ..RetentionReport::default()
    };
    if decisions.is_empty() {
        info!("No files to clean up");
        return Ok(report);
    }

    info!(count = decisions.len(), "Cleaning up files");
    for decision in &decisions {
        match provider.delete(&decision.entry.path).await {
            Ok(()) => {
                report.deleted += 1;
                info!(path = %decision.entry.path, reason = %decision.reason, "Deleted");
            }
            Err(err) => {
                report.failed += 1;
                error!(path = %decision.entry.path, error = %err, "Failed to delete");
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Artifact, ByteStream};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use std::time::Duration;
    use turbocache_core::Error;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, minute, 0).unwrap()
    }

    fn entry(path: &str, minute: u32, size: u64) -> ListingEntry {
        ListingEntry {
            path: path.to_string(),
            created_at: at(minute),
            size,
        }
    }

    fn paths(decisions: &[RetentionDecision]) -> Vec<&str> {
        decisions.iter().map(|d| d.entry.path.as_str()).collect()
    }

    #[test]
    fn test_max_files_evicts_oldest_excess() {
        let entries = vec![
            entry("c", 3, 1),
            entry("a", 1, 1),
            entry("e", 5, 1),
            entry("b", 2, 1),
            entry("d", 4, 1),
        ];
        let policy = RetentionPolicy {
            max_files: Some(2),
            ..RetentionPolicy::default()
        };
        let decisions = plan(&entries, &policy, at(10));
        assert_eq!(paths(&decisions), vec!["a", "b", "c"]);
        assert!(decisions.iter().all(|d| d.reason == RetentionReason::MaxFiles));
    }

    #[test]
    fn test_max_size_evicts_minimal_oldest_set() {
        let entries = vec![entry("a", 1, 40), entry("b", 2, 30), entry("c", 3, 30)];
        let policy = RetentionPolicy {
            max_size: Some(65),
            ..RetentionPolicy::default()
        };
        assert_eq!(paths(&plan(&entries, &policy, at(10))), vec!["a"]);

        let within = RetentionPolicy {
            max_size: Some(100),
            ..RetentionPolicy::default()
        };
        assert!(plan(&entries, &within, at(10)).is_empty());
    }

    #[test]
    fn test_max_age_selects_old_entries() {
        let entries = vec![entry("old", 0, 1), entry("new", 9, 1)];
        let policy = RetentionPolicy {
            max_age: Some(Duration::from_secs(5 * 60)),
            ..RetentionPolicy::default()
        };
        let decisions = plan(&entries, &policy, at(10));
        assert_eq!(paths(&decisions), vec!["old"]);
        assert_eq!(decisions[0].reason, RetentionReason::MaxAge);
    }

    #[test]
    fn test_max_age_beyond_calendar_range_selects_nothing() {
        let entries = vec![entry("a", 0, 1), entry("b", 1, 1)];
        let policy = RetentionPolicy::parse(Some("1000000y"), None, None).unwrap();
        assert!(plan(&entries, &policy, at(10)).is_empty());

        let policy = RetentionPolicy {
            max_files: Some(1),
            ..policy
        };
        assert_eq!(paths(&plan(&entries, &policy, at(10))), vec!["a"]);
    }

    #[test]
    fn test_rules_union_by_path() {
        let entries = vec![entry("a", 0, 50), entry("b", 1, 50), entry("c", 9, 50)];
        let policy = RetentionPolicy {
            max_age: Some(Duration::from_secs(5 * 60)),
            max_files: Some(1),
            max_size: Some(60),
        };
        let decisions = plan(&entries, &policy, at(10));
        assert_eq!(paths(&decisions), vec!["a", "b"]);
        assert_eq!(decisions[0].reason, RetentionReason::MaxAge);
    }

    #[test]
    fn test_size_rule_skips_entries_already_selected() {
        // "a" goes by age, so only "b" and "c" count against the size budget
        let entries = vec![entry("a", 0, 10), entry("b", 8, 10), entry("c", 9, 10)];
        let policy = RetentionPolicy {
            max_age: Some(Duration::from_secs(5 * 60)),
            max_size: Some(15),
            ..RetentionPolicy::default()
        };
        let decisions = plan(&entries, &policy, at(10));
        assert_eq!(paths(&decisions), vec!["a", "b"]);
        assert_eq!(decisions[1].reason, RetentionReason::MaxSize);
    }

    #[derive(Default)]
    struct RecordingProvider {
        entries: Vec<ListingEntry>,
        list_calls: Mutex<usize>,
        deleted: Mutex<Vec<String>>,
        fail_on: Option<String>,
        unsupported: bool,
    }

    #[async_trait]
    impl StorageProvider for RecordingProvider {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn entry_path(&self, hash: &str, _tag: Option<&str>) -> String {
            hash.to_string()
        }

        async fn save(&self, _hash: &str, _tag: Option<&str>, _body: ByteStream) -> Result<()> {
            Ok(())
        }

        async fn get(&self, _hash: &str) -> Result<Option<Artifact>> {
            Ok(None)
        }

        async fn delete(&self, path: &str) -> Result<()> {
            if self.fail_on.as_deref() == Some(path) {
                return Err(Error::backend("recording", "delete", "denied", Some(403)));
            }
            self.deleted.lock().unwrap().push(path.to_string());
            Ok(())
        }

        async fn list(&self) -> Result<Vec<ListingEntry>> {
            *self.list_calls.lock().unwrap() += 1;
            if self.unsupported {
                return Err(Error::unsupported("recording", "list"));
            }
            Ok(self.entries.clone())
        }
    }

    fn ancient(path: &str, size: u64) -> ListingEntry {
        ListingEntry {
            path: path.to_string(),
            created_at: Utc::now() - chrono::Duration::days(30),
            size,
        }
    }

    #[tokio::test]
    async fn test_empty_policy_touches_nothing() {
        let provider = RecordingProvider {
            entries: vec![ancient("a", 1)],
            ..RecordingProvider::default()
        };
        let report = run(&provider, &RetentionPolicy::default()).await.unwrap();
        assert!(report.skipped);
        assert_eq!(*provider.list_calls.lock().unwrap(), 0);
        assert!(provider.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_listing_is_skipped() {
        let provider = RecordingProvider {
            unsupported: true,
            ..RecordingProvider::default()
        };
        let policy = RetentionPolicy {
            max_files: Some(1),
            ..RetentionPolicy::default()
        };
        let report = run(&provider, &policy).await.unwrap();
        assert!(report.skipped);
        assert_eq!(report.deleted, 0);
    }

    #[tokio::test]
    async fn test_failed_delete_does_not_stop_run() {
        let provider = RecordingProvider {
            entries: vec![ancient("a", 1), ancient("b", 1), ancient("c", 1)],
            fail_on: Some("b".to_string()),
            ..RecordingProvider::default()
        };
        let policy = RetentionPolicy {
            max_age: Some(Duration::from_secs(86_400)),
            ..RetentionPolicy::default()
        };
        let report = run(&provider, &policy).await.unwrap();
        assert_eq!(report.listed, 3);
        assert_eq!(report.deleted, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(provider.deleted.lock().unwrap().len(), 2);
    }
}
