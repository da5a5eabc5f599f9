//! Region diff between stored and live asset ids

use camflow_cloud::CloudInstance;
use std::collections::HashSet;

/// How a live instance relates to the stored set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Absent locally
    Create,
    /// Present locally and remotely
    Update,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Create => write!(f, "create"),
            ChangeKind::Update => write!(f, "update"),
        }
    }
}

/// Operations that bring one (account, model, region) slice of the store
/// in line with the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionPlan<'a> {
    /// Stored ids no longer reported live, in stored order
    pub to_delete: Vec<String>,
    /// Every live instance, once per asset id, in provider order
    pub upserts: Vec<(ChangeKind, &'a CloudInstance)>,
}

impl<'a> RegionPlan<'a> {
    /// Diff `existing` ids against `live` instances.
    ///
    /// Both sides go through hash sets, so the cost is linear in the two
    /// inputs. When the provider reports an id twice the first record wins.
    pub fn compute(existing: &[String], live: &'a [CloudInstance]) -> Self {
        let live_ids: HashSet<&str> = live.iter().map(|i| i.asset_id.as_str()).collect();
        let stored: HashSet<&str> = existing.iter().map(String::as_str).collect();

        let mut seen = HashSet::with_capacity(live.len());
        let to_delete = existing
            .iter()
            .filter(|id| !live_ids.contains(id.as_str()))
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        let mut seen = HashSet::with_capacity(live.len());
        let upserts = live
            .iter()
            .filter(|i| seen.insert(i.asset_id.as_str()))
            .map(|i| {
                let kind = if stored.contains(i.asset_id.as_str()) {
                    ChangeKind::Update
                } else {
                    ChangeKind::Create
                };
                (kind, i)
            })
            .collect();

        Self { to_delete, upserts }
    }

    pub fn creates(&self) -> usize {
        self.count(ChangeKind::Create)
    }

    pub fn updates(&self) -> usize {
        self.count(ChangeKind::Update)
    }

    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.upserts.is_empty()
    }

    fn count(&self, kind: ChangeKind) -> usize {
        self.upserts.iter().filter(|(k, _)| *k == kind).count()
    }
}
