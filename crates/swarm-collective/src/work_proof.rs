//! Tamper-evident certification of completed work.
//!
//! Work is certified in two phases. [`WorkProofSystem::commit`] snapshots the
//! target files before anything is touched; [`WorkProofSystem::prove`]
//! snapshots them again, gathers version control evidence and seals the
//! comparison with a hash. Because the "before" state is captured up front, a
//! proof cannot be fabricated after the fact.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use swarm_config::WorkProofConfig;
use swarm_store::{Namespace, RecordStore, RecordStoreExt};
use tracing::{debug, info, warn};

use crate::types::{lock, new_id, AgentId, CollectiveError, CommitmentId, Result};
use crate::vcs::{DiffStats, VersionControl};

const COMMITMENTS_NS: &str = "proofs/commitments";
const BY_AGENT_NS: &str = "proofs/by_agent";

/// State of one file at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileSnapshot {
    pub path: String,
    pub exists: bool,
    pub size: u64,
    /// blake3 hex digest of the contents; empty when the file is absent.
    pub content_hash: String,
    pub modified_at: Option<DateTime<Utc>>,
}

impl FileSnapshot {
    fn absent(path: &str) -> Self {
        Self {
            path: path.to_string(),
            exists: false,
            size: 0,
            content_hash: String::new(),
            modified_at: None,
        }
    }

    fn take(path: &str, resolved: &Path) -> Result<Self> {
        match fs::read(resolved) {
            Ok(bytes) => {
                let modified_at = fs::metadata(resolved)
                    .and_then(|m| m.modified())
                    .ok()
                    .map(DateTime::<Utc>::from);
                Ok(Self {
                    path: path.to_string(),
                    exists: true,
                    size: bytes.len() as u64,
                    content_hash: blake3::hash(&bytes).to_hex().to_string(),
                    modified_at,
                })
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(Self::absent(path)),
            Err(e) => Err(CollectiveError::InvalidArgument(format!(
                "cannot snapshot {}: {}",
                path, e
            ))),
        }
    }
}

/// Pre-registered intent to do verifiable work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkCommitment {
    pub id: CommitmentId,
    pub agent: AgentId,
    pub task: String,
    pub files: Vec<String>,
    /// Hash of agent, task and sorted files.
    pub commitment_hash: String,
    pub before: BTreeMap<String, FileSnapshot>,
    pub created_at: DateTime<Utc>,
}

/// Certified evidence that committed work was done.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkProof {
    pub commitment_id: CommitmentId,
    pub agent: AgentId,
    pub task: String,
    /// When the commitment was made.
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Absent before, present after.
    pub files_created: Vec<String>,
    /// Present on both sides with different contents.
    pub files_modified: Vec<String>,
    /// Present before, absent after.
    pub files_deleted: Vec<String>,
    /// Version control commits made since the commitment, newest first.
    pub commits: Vec<String>,
    /// Line counts for the changed files; `None` without version control.
    pub diff_stats: Option<DiffStats>,
    /// Content hash per committed file at commit time, empty when absent.
    pub before_hashes: BTreeMap<String, String>,
    /// Content hash per committed file at proof time, empty when absent.
    pub after_hashes: BTreeMap<String, String>,
    /// blake3 over the commitment id, both hash maps and the sorted commits.
    pub proof_hash: String,
    /// At least one committed file changed.
    pub valid: bool,
    /// Human-readable observations such as a very short duration.
    pub notes: Vec<String>,
}

impl WorkProof {
    pub fn files_changed(&self) -> usize {
        self.files_created.len() + self.files_modified.len() + self.files_deleted.len()
    }

    pub fn duration(&self) -> Duration {
        self.completed_at - self.started_at
    }
}

/// Outcome of independently re-checking a proof.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verification {
    pub valid: bool,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProofSettings {
    /// Relative commitment paths resolve against this directory.
    pub repo_path: PathBuf,
    pub short_duration: Duration,
}

impl Default for ProofSettings {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("."),
            short_duration: Duration::seconds(60),
        }
    }
}

impl From<&WorkProofConfig> for ProofSettings {
    fn from(config: &WorkProofConfig) -> Self {
        Self {
            repo_path: config.repo_path.clone(),
            short_duration: Duration::seconds(config.short_duration_secs as i64),
        }
    }
}

pub struct WorkProofSystem {
    store: Arc<dyn RecordStore>,
    vcs: Arc<dyn VersionControl>,
    settings: ProofSettings,
    commitments_ns: Namespace,
    by_agent_ns: Namespace,
    commitments: Mutex<BTreeMap<CommitmentId, WorkCommitment>>,
}

impl WorkProofSystem {
    pub fn open(
        store: Arc<dyn RecordStore>,
        vcs: Arc<dyn VersionControl>,
        settings: ProofSettings,
    ) -> Result<Self> {
        let commitments_ns = Namespace::new(COMMITMENTS_NS);
        let by_agent_ns = Namespace::new(BY_AGENT_NS);
        let mut commitments = BTreeMap::new();
        for commitment in store.list_records::<WorkCommitment>(&commitments_ns)? {
            let proven = store
                .get(&by_agent_ns.child(&commitment.agent), &commitment.id)?
                .is_some();
            if proven {
                // left behind by a failed delete after proving
                debug!("Dropping already proven commitment {}", commitment.id);
                if let Err(e) = store.delete(&commitments_ns, &commitment.id) {
                    warn!("Could not remove proven commitment {}: {}", commitment.id, e);
                }
                continue;
            }
            commitments.insert(commitment.id.clone(), commitment);
        }
        debug!("Loaded {} open commitments", commitments.len());

        Ok(Self {
            store,
            vcs,
            settings,
            commitments_ns,
            by_agent_ns,
            commitments: Mutex::new(commitments),
        })
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.settings.repo_path.join(path)
        }
    }

    fn snapshot(&self, path: &str) -> Result<FileSnapshot> {
        FileSnapshot::take(path, &self.resolve_path(path))
    }

    /// Register intended work and capture the "before" state of its files.
    pub fn commit<I, S>(&self, agent: &str, task: &str, files: I) -> Result<WorkCommitment>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let files: Vec<String> = files
            .into_iter()
            .map(|f| f.as_ref().trim().to_string())
            .filter(|f| !f.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if files.is_empty() {
            return Err(CollectiveError::InvalidArgument(
                "a commitment needs at least one file".to_string(),
            ));
        }

        let mut before = BTreeMap::new();
        for file in &files {
            before.insert(file.clone(), self.snapshot(file)?);
        }

        let commitment = WorkCommitment {
            id: new_id(),
            agent: agent.to_string(),
            task: task.to_string(),
            commitment_hash: hash_hex(&format!("{}|{}|{}", agent, task, files.join(","))),
            files,
            before,
            created_at: Utc::now(),
        };

        let mut commitments = lock(&self.commitments);
        self.store
            .put_record(&self.commitments_ns, &commitment.id, &commitment)?;
        commitments.insert(commitment.id.clone(), commitment.clone());

        info!(
            "{} committed to '{}' over {} files",
            commitment.agent,
            commitment.task,
            commitment.files.len()
        );
        Ok(commitment)
    }

    /// Consume a commitment and produce its proof.
    ///
    /// The commitment is claimed before any evidence is gathered, so of two
    /// concurrent calls only one can succeed.
    pub async fn prove(&self, commitment_id: &str) -> Result<WorkProof> {
        let commitment = lock(&self.commitments)
            .remove(commitment_id)
            .ok_or_else(|| CollectiveError::CommitmentNotFound(commitment_id.to_string()))?;

        match self.build_proof(&commitment).await {
            Ok(proof) => Ok(proof),
            Err(e) => {
                lock(&self.commitments).insert(commitment.id.clone(), commitment);
                Err(e)
            }
        }
    }

    async fn build_proof(&self, commitment: &WorkCommitment) -> Result<WorkProof> {
        let mut after = BTreeMap::new();
        for file in &commitment.files {
            after.insert(file.clone(), self.snapshot(file)?);
        }

        let before_hashes = content_hashes(&commitment.before);
        let after_hashes = content_hashes(&after);
        let FileChanges {
            created: files_created,
            modified: files_modified,
            deleted: files_deleted,
        } = FileChanges::between(&before_hashes, &after_hashes);

        let mut notes = Vec::new();
        let (commits, vcs_reachable) = match self.vcs.commits_since(commitment.created_at).await {
            Ok(commits) => {
                if commits.is_empty() {
                    notes.push("No version control commits found".to_string());
                } else {
                    notes.push(format!("Version control commits found: {}", commits.len()));
                }
                (commits, true)
            }
            Err(e) => {
                warn!("Commit evidence unavailable: {}", e);
                notes.push("Version control unavailable, commit evidence skipped".to_string());
                (Vec::new(), false)
            }
        };

        let touched: Vec<String> = files_created
            .iter()
            .chain(&files_modified)
            .chain(&files_deleted)
            .cloned()
            .collect();
        let diff_stats = if touched.is_empty() || !vcs_reachable {
            None
        } else {
            // Diff from before the oldest new commit, or against HEAD for
            // uncommitted work.
            let base = commits
                .last()
                .map(|oldest| format!("{}^", oldest))
                .unwrap_or_else(|| "HEAD".to_string());
            match self.vcs.diff_stats(&touched, &base).await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    debug!("Diff stats unavailable: {}", e);
                    None
                }
            }
        };

        let proof_hash = proof_hash(&commitment.id, &before_hashes, &after_hashes, &commits)?;

        let completed_at = Utc::now();
        let valid = !touched.is_empty();
        if !valid {
            notes.insert(0, "No file changes detected".to_string());
        }
        if completed_at - commitment.created_at < self.settings.short_duration {
            notes.push(format!(
                "Very short duration (<{}s)",
                self.settings.short_duration.num_seconds()
            ));
        }

        let proof = WorkProof {
            commitment_id: commitment.id.clone(),
            agent: commitment.agent.clone(),
            task: commitment.task.clone(),
            started_at: commitment.created_at,
            completed_at,
            files_created,
            files_modified,
            files_deleted,
            commits,
            diff_stats,
            before_hashes,
            after_hashes,
            proof_hash,
            valid,
            notes,
        };

        self.store.put_record(
            &self.by_agent_ns.child(&proof.agent),
            &proof.commitment_id,
            &proof,
        )?;
        // The proof is durable from here on; a stale commitment is dropped
        // on the next open.
        if let Err(e) = self.store.delete(&self.commitments_ns, &commitment.id) {
            warn!("Could not remove proven commitment {}: {}", commitment.id, e);
        }

        info!(
            "Proof for {} by {}: valid={} ({} files changed)",
            proof.commitment_id,
            proof.agent,
            proof.valid,
            proof.files_changed()
        );
        Ok(proof)
    }

    /// Re-check a proof from its own recorded data.
    ///
    /// The file lists and the verdict are derived again from the recorded
    /// hashes, so neither can be edited on its own. Commit checks are skipped
    /// when version control cannot be reached.
    pub async fn verify(&self, proof: &WorkProof) -> Result<Verification> {
        let mut issues = Vec::new();

        let expected = proof_hash(
            &proof.commitment_id,
            &proof.before_hashes,
            &proof.after_hashes,
            &proof.commits,
        )?;
        if expected != proof.proof_hash {
            issues.push("Proof hash mismatch, data may be tampered".to_string());
        }

        let derived = FileChanges::between(&proof.before_hashes, &proof.after_hashes);
        let claimed = [
            ("created", &proof.files_created, &derived.created),
            ("modified", &proof.files_modified, &derived.modified),
            ("deleted", &proof.files_deleted, &derived.deleted),
        ];
        for (kind, claimed, recorded) in claimed {
            let claimed: BTreeSet<&String> = claimed.iter().collect();
            let recorded: BTreeSet<&String> = recorded.iter().collect();
            for file in claimed.difference(&recorded) {
                issues.push(format!("File claimed {} but hashes disagree: {}", kind, file));
            }
            for file in recorded.difference(&claimed) {
                issues.push(format!("File {} per hashes but not listed: {}", kind, file));
            }
        }
        if derived.is_empty() {
            issues.push("No file changes recorded".to_string());
        }

        for commit in &proof.commits {
            match self.vcs.commit_exists(commit).await {
                Ok(true) => {}
                Ok(false) => issues.push(format!("Commit not found: {}", commit)),
                Err(e) => {
                    debug!("Skipping commit checks: {}", e);
                    break;
                }
            }
        }

        Ok(Verification {
            valid: issues.is_empty(),
            issues,
        })
    }

    /// Every proof an agent has produced, oldest first.
    pub fn agent_proofs(&self, agent: &str) -> Result<Vec<WorkProof>> {
        let mut proofs: Vec<WorkProof> = self.store.list_records(&self.by_agent_ns.child(agent))?;
        proofs.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
        Ok(proofs)
    }

    pub fn proof(&self, agent: &str, commitment_id: &str) -> Result<Option<WorkProof>> {
        Ok(self
            .store
            .get_record(&self.by_agent_ns.child(agent), commitment_id)?)
    }

    pub fn commitment(&self, commitment_id: &str) -> Option<WorkCommitment> {
        lock(&self.commitments).get(commitment_id).cloned()
    }

    /// Commitments not yet proven, optionally for one agent.
    pub fn open_commitments(&self, agent: Option<&str>) -> Vec<WorkCommitment> {
        let mut open: Vec<WorkCommitment> = lock(&self.commitments)
            .values()
            .filter(|c| agent.map(|a| c.agent == a).unwrap_or(true))
            .cloned()
            .collect();
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        open
    }
}

/// Files sorted by what happened to them between two hash maps. An empty
/// hash means the file was absent.
#[derive(Debug, Default, PartialEq)]
struct FileChanges {
    created: Vec<String>,
    modified: Vec<String>,
    deleted: Vec<String>,
}

impl FileChanges {
    fn between(before: &BTreeMap<String, String>, after: &BTreeMap<String, String>) -> Self {
        let mut changes = Self::default();
        let files: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
        for file in files {
            let was = before.get(file).map(String::as_str).unwrap_or("");
            let now = after.get(file).map(String::as_str).unwrap_or("");
            match (was.is_empty(), now.is_empty()) {
                (true, false) => changes.created.push(file.clone()),
                (false, true) => changes.deleted.push(file.clone()),
                (false, false) if was != now => changes.modified.push(file.clone()),
                _ => {}
            }
        }
        changes
    }

    fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

fn content_hashes(snapshots: &BTreeMap<String, FileSnapshot>) -> BTreeMap<String, String> {
    snapshots
        .iter()
        .map(|(path, snap)| (path.clone(), snap.content_hash.clone()))
        .collect()
}

fn hash_hex(data: &str) -> String {
    blake3::hash(data.as_bytes()).to_hex().to_string()
}

fn proof_hash(
    commitment_id: &str,
    before: &BTreeMap<String, String>,
    after: &BTreeMap<String, String>,
    commits: &[String],
) -> Result<String> {
    let mut sorted = commits.to_vec();
    sorted.sort();
    let before = serde_json::to_string(before).map_err(anyhow::Error::from)?;
    let after = serde_json::to_string(after).map_err(anyhow::Error::from)?;
    Ok(hash_hex(&format!(
        "{}|{}|{}|{}",
        commitment_id,
        before,
        after,
        sorted.join(",")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::NoVcs;
    use async_trait::async_trait;
    use serde_json::Value;
    use swarm_store::{MemoryStore, StoreError};
    use tempfile::{tempdir, TempDir};

    struct FakeVcs {
        commits: Vec<String>,
    }

    #[async_trait]
    impl VersionControl for FakeVcs {
        async fn commits_since(&self, _since: DateTime<Utc>) -> Result<Vec<String>> {
            Ok(self.commits.clone())
        }

        async fn diff_stats(&self, files: &[String], _base_ref: &str) -> Result<DiffStats> {
            Ok(DiffStats {
                insertions: 4,
                deletions: 1,
                files_changed: files.len() as u64,
            })
        }

        async fn commit_exists(&self, commit: &str) -> Result<bool> {
            Ok(self.commits.iter().any(|c| c == commit))
        }
    }

    fn system(vcs: Arc<dyn VersionControl>) -> (TempDir, WorkProofSystem) {
        let dir = tempdir().expect("tempdir");
        let settings = ProofSettings {
            repo_path: dir.path().to_path_buf(),
            ..ProofSettings::default()
        };
        let system = WorkProofSystem::open(Arc::new(MemoryStore::new()), vcs, settings).unwrap();
        (dir, system)
    }

    #[tokio::test]
    async fn test_modified_file_proof_and_single_use() {
        let (dir, proofs) = system(Arc::new(NoVcs));
        fs::write(dir.path().join("x.py"), "print('bug')\n").unwrap();

        let commitment = proofs.commit("a1", "fix bug", ["x.py"]).unwrap();
        assert!(commitment.before["x.py"].exists);

        fs::write(dir.path().join("x.py"), "print('fixed')\n").unwrap();
        let proof = proofs.prove(&commitment.id).await.unwrap();

        assert_eq!(proof.files_modified, vec!["x.py"]);
        assert!(proof.valid);
        assert!(proof.commits.is_empty());
        assert!(proof
            .notes
            .iter()
            .any(|n| n.starts_with("Version control unavailable")));
        assert!(proof.notes.iter().any(|n| n.starts_with("Very short duration")));

        let again = proofs.prove(&commitment.id).await.unwrap_err();
        assert!(matches!(again, CollectiveError::CommitmentNotFound(_)));
        assert!(proofs.commitment(&commitment.id).is_none());
        assert_eq!(proofs.agent_proofs("a1").unwrap(), vec![proof]);
    }

    #[tokio::test]
    async fn test_no_changes_is_invalid() {
        let (dir, proofs) = system(Arc::new(NoVcs));
        fs::write(dir.path().join("same.rs"), "fn main() {}\n").unwrap();

        let commitment = proofs.commit("a1", "nothing", ["same.rs"]).unwrap();
        let proof = proofs.prove(&commitment.id).await.unwrap();
        assert!(!proof.valid);
        assert_eq!(proof.notes[0], "No file changes detected");

        let check = proofs.verify(&proof).await.unwrap();
        assert!(!check.valid);
        assert_eq!(check.issues, vec!["No file changes recorded"]);

        // flipping the flag and the lists without touching the hashes
        let mut forged = proof.clone();
        forged.valid = true;
        forged.files_created = vec!["same.rs".to_string()];
        forged.proof_hash = proof_hash(
            &forged.commitment_id,
            &forged.before_hashes,
            &forged.after_hashes,
            &forged.commits,
        )
        .unwrap();
        let check = proofs.verify(&forged).await.unwrap();
        assert!(!check.valid);
        assert!(check
            .issues
            .contains(&"File claimed created but hashes disagree: same.rs".to_string()));
    }

    #[tokio::test]
    async fn test_verify_rederives_file_lists() {
        let (dir, proofs) = system(Arc::new(NoVcs));
        fs::write(dir.path().join("a.rs"), "a").unwrap();
        let commitment = proofs.commit("a1", "edit", ["a.rs", "b.rs"]).unwrap();
        fs::write(dir.path().join("a.rs"), "b").unwrap();
        let proof = proofs.prove(&commitment.id).await.unwrap();
        assert_eq!(proof.files_modified, vec!["a.rs"]);

        let mut hidden = proof.clone();
        hidden.files_modified.clear();
        hidden.files_created.push("b.rs".to_string());
        let check = proofs.verify(&hidden).await.unwrap();
        assert!(!check.valid);
        assert!(check
            .issues
            .contains(&"File modified per hashes but not listed: a.rs".to_string()));
        assert!(check
            .issues
            .contains(&"File claimed created but hashes disagree: b.rs".to_string()));
    }

    #[tokio::test]
    async fn test_created_and_deleted_files() {
        let (dir, proofs) = system(Arc::new(NoVcs));
        fs::write(dir.path().join("old.rs"), "old").unwrap();

        let commitment = proofs.commit("a1", "rename", ["old.rs", "new.rs"]).unwrap();
        fs::remove_file(dir.path().join("old.rs")).unwrap();
        fs::write(dir.path().join("new.rs"), "new").unwrap();

        let proof = proofs.prove(&commitment.id).await.unwrap();
        assert_eq!(proof.files_created, vec!["new.rs"]);
        assert_eq!(proof.files_deleted, vec!["old.rs"]);
        assert_eq!(proof.after_hashes["old.rs"], "");
    }

    #[tokio::test]
    async fn test_verify_detects_tampering() {
        let (dir, proofs) = system(Arc::new(NoVcs));
        fs::write(dir.path().join("a.rs"), "a").unwrap();
        let commitment = proofs.commit("a1", "edit", ["a.rs"]).unwrap();
        fs::write(dir.path().join("a.rs"), "b").unwrap();
        let proof = proofs.prove(&commitment.id).await.unwrap();

        let first = proofs.verify(&proof).await.unwrap();
        let second = proofs.verify(&proof).await.unwrap();
        assert!(first.valid);
        assert_eq!(first, second);

        let mut tampered = proof.clone();
        let hash = tampered.before_hashes.get_mut("a.rs").unwrap();
        let flipped = if hash.starts_with('0') { "1" } else { "0" };
        hash.replace_range(0..1, flipped);
        let check = proofs.verify(&tampered).await.unwrap();
        assert!(!check.valid);
        assert!(check.issues[0].starts_with("Proof hash mismatch"));
    }

    #[tokio::test]
    async fn test_commit_evidence_is_checked() {
        let vcs = Arc::new(FakeVcs {
            commits: vec!["c2".to_string(), "c1".to_string()],
        });
        let (dir, proofs) = system(vcs);
        let commitment = proofs.commit("a1", "feature", ["lib.rs"]).unwrap();
        fs::write(dir.path().join("lib.rs"), "pub fn f() {}").unwrap();

        let proof = proofs.prove(&commitment.id).await.unwrap();
        assert_eq!(proof.commits, vec!["c2", "c1"]);
        assert_eq!(proof.diff_stats.as_ref().map(|d| d.files_changed), Some(1));
        assert!(proof.notes.contains(&"Version control commits found: 2".to_string()));
        assert!(proofs.verify(&proof).await.unwrap().valid);

        let mut forged = proof.clone();
        forged.commits.push("c9".to_string());
        let check = proofs.verify(&forged).await.unwrap();
        assert!(check.issues.iter().any(|i| i == "Commit not found: c9"));
    }

    #[tokio::test]
    async fn test_commit_checks_skipped_without_vcs() {
        let vcs = Arc::new(FakeVcs {
            commits: vec!["c1".to_string()],
        });
        let (dir, proofs) = system(vcs);
        let commitment = proofs.commit("a1", "feature", ["lib.rs"]).unwrap();
        fs::write(dir.path().join("lib.rs"), "pub fn f() {}").unwrap();
        let proof = proofs.prove(&commitment.id).await.unwrap();
        assert_eq!(proof.commits, vec!["c1"]);

        let (_other, offline) = system(Arc::new(NoVcs));
        let check = offline.verify(&proof).await.unwrap();
        assert!(check.valid);
        assert!(check.issues.is_empty());
    }

    /// Store whose deletes always fail.
    struct StickyStore {
        inner: MemoryStore,
    }

    impl RecordStore for StickyStore {
        fn put(&self, namespace: &Namespace, id: &str, record: &Value) -> swarm_store::Result<()> {
            self.inner.put(namespace, id, record)
        }

        fn get(&self, namespace: &Namespace, id: &str) -> swarm_store::Result<Option<Value>> {
            self.inner.get(namespace, id)
        }

        fn delete(&self, _namespace: &Namespace, id: &str) -> swarm_store::Result<bool> {
            Err(StoreError::Io {
                path: PathBuf::from(id),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        }

        fn scan(&self, namespace: &Namespace) -> swarm_store::Result<Vec<swarm_store::Result<Value>>> {
            self.inner.scan(namespace)
        }

        fn children(&self, namespace: &Namespace) -> swarm_store::Result<Vec<String>> {
            self.inner.children(namespace)
        }
    }

    #[tokio::test]
    async fn test_proof_stands_when_commitment_cleanup_fails() {
        let dir = tempdir().unwrap();
        let settings = ProofSettings {
            repo_path: dir.path().to_path_buf(),
            ..ProofSettings::default()
        };
        let store: Arc<dyn RecordStore> = Arc::new(StickyStore {
            inner: MemoryStore::new(),
        });
        let proofs =
            WorkProofSystem::open(store.clone(), Arc::new(NoVcs), settings.clone()).unwrap();

        let commitment = proofs.commit("a1", "write", ["out.txt"]).unwrap();
        fs::write(dir.path().join("out.txt"), "done").unwrap();
        let proof = proofs.prove(&commitment.id).await.unwrap();
        assert!(proof.valid);

        assert!(proofs.open_commitments(None).is_empty());
        assert!(matches!(
            proofs.prove(&commitment.id).await,
            Err(CollectiveError::CommitmentNotFound(_))
        ));
        assert_eq!(proofs.proof("a1", &commitment.id).unwrap(), Some(proof));

        let reopened = WorkProofSystem::open(store, Arc::new(NoVcs), settings).unwrap();
        assert!(reopened.commitment(&commitment.id).is_none());
    }

    #[test]
    fn test_commit_requires_files() {
        let (_dir, proofs) = system(Arc::new(NoVcs));
        assert!(matches!(
            proofs.commit("a1", "x", Vec::<String>::new()),
            Err(CollectiveError::InvalidArgument(_))
        ));
        proofs.commit("a1", "x", ["a.rs", "a.rs"]).unwrap();
        let open = proofs.open_commitments(Some("a1"));
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].files, vec!["a.rs"]);
        assert!(proofs.open_commitments(Some("a2")).is_empty());
    }
}
