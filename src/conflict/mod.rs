use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::warn;

use crate::config::DEFAULT_MAX_KEEP_BOTH_ATTEMPTS;
use crate::path_safety::exists_nofollow;

mod channel;

pub use channel::{ChannelResolver, ConflictRequest, ConflictSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictDecision {
    Replace,
    Skip,
    KeepBoth,
    Cancel,
}

/// Asked once per colliding destination. Called on the worker thread, which waits for the
/// answer before touching anything else.
pub trait ConflictResolver {
    fn resolve(&self, source: &Path, destination: &Path, is_dir: bool) -> ConflictDecision;
}

impl<F> ConflictResolver for F
where
    F: Fn(&Path, &Path, bool) -> ConflictDecision,
{
    fn resolve(&self, source: &Path, destination: &Path, is_dir: bool) -> ConflictDecision {
        self(source, destination, is_dir)
    }
}

/// Answers every conflict the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedResolver(pub ConflictDecision);

impl ConflictResolver for FixedResolver {
    fn resolve(&self, _source: &Path, _destination: &Path, _is_dir: bool) -> ConflictDecision {
        self.0
    }
}

pub fn unique_keep_both_path(destination: &Path) -> PathBuf {
    unique_keep_both_path_with(destination, DEFAULT_MAX_KEEP_BOTH_ATTEMPTS, exists_nofollow)
}

/// Sibling of `destination` named "<base> (copy)<suffix>", then "<base> (copy N)<suffix>".
/// Files split base and suffix at the first dot; directories keep the whole name as base.
/// Falls back to a millisecond timestamp once `max_attempts` candidates are taken.
pub fn unique_keep_both_path_with<F>(destination: &Path, max_attempts: u32, is_taken: F) -> PathBuf
where
    F: Fn(&Path) -> bool,
{
    let parent = destination.parent().unwrap_or_else(|| Path::new("."));
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "item".to_string());
    let is_dir = fs::symlink_metadata(destination)
        .map(|m| m.is_dir())
        .unwrap_or(false);
    let (base, suffix) = if is_dir {
        (name.as_str(), "")
    } else {
        split_first_dot(&name)
    };

    for idx in 1..=max_attempts.max(1) {
        let candidate_name = if idx == 1 {
            format!("{base} (copy){suffix}")
        } else {
            format!("{base} (copy {idx}){suffix}")
        };
        let candidate = parent.join(candidate_name);
        if !is_taken(&candidate) {
            return candidate;
        }
    }

    let mut stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    warn!(
        destination = %destination.display(),
        max_attempts,
        "keep-both names exhausted; using timestamp"
    );
    loop {
        let candidate = parent.join(format!("{base} ({stamp}){suffix}"));
        if !is_taken(&candidate) {
            return candidate;
        }
        stamp += 1;
    }
}

fn split_first_dot(name: &str) -> (&str, &str) {
    match name.char_indices().skip(1).find(|(_, c)| *c == '.') {
        Some((idx, _)) => (&name[..idx], &name[idx..]),
        None => (name, ""),
    }
}
