//! Reconciliation outcome types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::asset::AssetType;

/// Where an absorbed failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueScope {
    /// An account whose sync failed as a whole (provider-wide runs only)
    Account,
    /// A region, or one asset type inside a region
    Region,
    /// Removing stale instances from the store
    Delete,
    /// Writing a single instance
    Instance,
}

/// A non-fatal failure recorded during reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncIssue {
    pub scope: IssueScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<AssetType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    pub message: String,
}

impl SyncIssue {
    pub fn new(scope: IssueScope, message: impl Into<String>) -> Self {
        Self {
            scope,
            account_id: None,
            region: None,
            asset_type: None,
            asset_id: None,
            message: message.into(),
        }
    }

    pub fn account(mut self, account_id: i64) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn asset_type(mut self, asset_type: AssetType) -> Self {
        self.asset_type = Some(asset_type);
        self
    }

    pub fn asset_id(mut self, asset_id: impl Into<String>) -> Self {
        self.asset_id = Some(asset_id.into());
        self
    }
}

/// Outcome of one reconciliation pass.
///
/// Region results merge into account results, which merge into provider
/// results. Counters and maps add field by field, so any merge order
/// yields the same totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Instances successfully written to the store
    pub total_synced: usize,

    /// Written instances that had no previous record
    pub created: usize,

    /// Written instances that replaced a previous record
    pub updated: usize,

    /// Stale records removed from the store
    pub deleted: usize,

    /// Absorbed failures; non-zero means the store has not fully converged
    pub failed: usize,

    pub by_asset_type: HashMap<AssetType, usize>,

    pub by_region: HashMap<String, usize>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<SyncIssue>,

    pub start_time: DateTime<Utc>,

    pub end_time: DateTime<Utc>,

    pub duration_ms: i64,
}

impl SyncResult {
    /// An empty result whose clock starts now
    pub fn started() -> Self {
        let now = Utc::now();
        Self {
            total_synced: 0,
            created: 0,
            updated: 0,
            deleted: 0,
            failed: 0,
            by_asset_type: HashMap::new(),
            by_region: HashMap::new(),
            issues: Vec::new(),
            start_time: now,
            end_time: now,
            duration_ms: 0,
        }
    }

    /// Record an absorbed failure
    pub fn fail(&mut self, issue: SyncIssue) {
        self.failed += 1;
        self.issues.push(issue);
    }

    /// Add `other` into `self` field by field.
    ///
    /// The time window widens to cover both results.
    pub fn merge(&mut self, other: SyncResult) {
        self.total_synced += other.total_synced;
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.failed += other.failed;

        for (asset_type, count) in other.by_asset_type {
            *self.by_asset_type.entry(asset_type).or_default() += count;
        }
        for (region, count) in other.by_region {
            *self.by_region.entry(region).or_default() += count;
        }
        self.issues.extend(other.issues);

        self.start_time = self.start_time.min(other.start_time);
        self.end_time = self.end_time.max(other.end_time);
        self.duration_ms = (self.end_time - self.start_time).num_milliseconds();
    }

    /// Stop the clock
    pub fn finish(mut self) -> Self {
        self.end_time = Utc::now();
        self.duration_ms = (self.end_time - self.start_time).num_milliseconds();
        self
    }

    /// Whether every region, type and instance was reconciled
    pub fn is_converged(&self) -> bool {
        self.failed == 0
    }
}

impl Default for SyncResult {
    fn default() -> Self {
        Self::started()
    }
}

impl std::fmt::Display for SyncResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} synced ({} created, {} updated), {} deleted, {} failed",
            self.total_synced, self.created, self.updated, self.deleted, self.failed
        )
    }
}
