//! End-to-end coordination flows through the JSON command surface.

use std::fs;
use std::path::Path;

use serde_json::{json, Value};
use swarm_collective::{Collective, Command, ErrorKind};
use swarm_config::{SwarmConfig, VcsKind};
use tempfile::{tempdir, TempDir};

struct Swarm {
    collective: Collective,
    repo: TempDir,
    _data: TempDir,
}

impl Swarm {
    fn new() -> Self {
        let data = tempdir().unwrap();
        let repo = tempdir().unwrap();
        let collective = Collective::open(&config(data.path(), repo.path())).unwrap();
        Self {
            collective,
            repo,
            _data: data,
        }
    }

    async fn run(&self, request: Value) -> Value {
        self.try_run(request).await.unwrap()
    }

    async fn try_run(&self, request: Value) -> swarm_collective::Result<Value> {
        let command: Command = serde_json::from_value(request).unwrap();
        self.collective.execute(command).await
    }
}

fn config(data: &Path, repo: &Path) -> SwarmConfig {
    let mut config = SwarmConfig::default();
    config.storage.root = Some(data.to_path_buf());
    config.work_proof.repo_path = repo.to_path_buf();
    config.work_proof.vcs = VcsKind::None;
    config
}

#[tokio::test]
async fn test_overlapping_function_blocks_second_agent() {
    let swarm = Swarm::new();
    let first = swarm
        .run(json!({
            "op": "declare_intent",
            "agent": "a1",
            "description": "Harden login",
            "files": ["auth.py"],
            "functions": ["login", "logout"]
        }))
        .await;
    assert_eq!(first["conflicts"], json!([]));

    let second = swarm
        .run(json!({
            "op": "declare_intent",
            "agent": "a2",
            "description": "Add MFA to login",
            "files": ["auth.py"],
            "functions": ["login"]
        }))
        .await;
    let conflicts = second["conflicts"].as_array().unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0]["severity"], "blocking");
    assert_eq!(conflicts[0]["other_agent"], "a1");

    let blocked = swarm.run(json!({"op": "blocked_files"})).await;
    assert!(blocked.get("auth.py").is_some());
}

#[tokio::test]
async fn test_majority_proposal_passes_two_of_three() {
    let swarm = Swarm::new();
    let proposal = swarm
        .run(json!({
            "op": "propose",
            "proposer": "a1",
            "title": "Adopt tokio",
            "rule": "majority"
        }))
        .await;
    let id = proposal["id"].as_str().unwrap().to_string();

    for (agent, choice) in [("a1", "approve"), ("a2", "approve"), ("a3", "reject")] {
        swarm
            .run(json!({"op": "vote", "proposal_id": id, "agent": agent, "choice": choice}))
            .await;
    }
    // changing a vote replaces it
    let revote = swarm
        .run(json!({"op": "vote", "proposal_id": id, "agent": "a3", "choice": "reject"}))
        .await;
    assert_eq!(revote["tally"]["total_votes"], 3);

    let resolution = swarm
        .run(json!({"op": "resolve", "proposal_id": id}))
        .await;
    assert_eq!(resolution["passed"], true);
    assert!(resolution["reason"].as_str().unwrap().contains("2/3 approved"));

    let err = swarm
        .try_run(json!({"op": "vote", "proposal_id": id, "agent": "a4", "choice": "approve"}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn test_repeated_success_becomes_strength() {
    let swarm = Swarm::new();
    for _ in 0..3 {
        swarm
            .run(json!({
                "op": "record_task",
                "agent": "a1",
                "category": "debugging",
                "description": "Fix flaky test",
                "success": true,
                "quality": 0.9
            }))
            .await;
    }

    let profile = swarm.run(json!({"op": "get_profile", "agent": "a1"})).await;
    let score = profile["categories"]["debugging"]["score"].as_f64().unwrap();
    assert!((score - 0.9).abs() < 1e-9);
    assert_eq!(profile["success_rate"], 1.0);
    assert!(profile["strengths"]
        .as_array()
        .unwrap()
        .contains(&json!("debugging")));
}

#[tokio::test]
async fn test_proof_consumes_commitment() {
    let swarm = Swarm::new();
    let file = swarm.repo.path().join("x.py");
    fs::write(&file, "def bug():\n    return 1\n").unwrap();

    let commitment = swarm
        .run(json!({"op": "commit_work", "agent": "a1", "task": "fix bug", "files": ["x.py"]}))
        .await;
    let id = commitment["id"].as_str().unwrap().to_string();

    fs::write(&file, "def bug():\n    return 2\n").unwrap();

    let proof = swarm.run(json!({"op": "prove_work", "commitment_id": id})).await;
    assert_eq!(proof["files_modified"], json!(["x.py"]));
    assert_eq!(proof["valid"], true);

    let err = swarm
        .try_run(json!({"op": "prove_work", "commitment_id": id}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let verification = swarm
        .run(json!({"op": "verify_proof", "agent": "a1", "commitment_id": id}))
        .await;
    assert_eq!(verification["valid"], true);
    let again = swarm
        .run(json!({"op": "verify_proof", "agent": "a1", "commitment_id": id}))
        .await;
    assert_eq!(verification, again);
}

#[tokio::test]
async fn test_successful_pairing_is_suggested() {
    let swarm = Swarm::new();
    for _ in 0..5 {
        swarm
            .run(json!({
                "op": "record_event",
                "event_type": "task_complete",
                "agents": ["a1", "a2"],
                "context": {"category": "infra"},
                "outcome": "success",
                "quality": 0.9
            }))
            .await;
    }

    let suggestions = swarm.run(json!({"op": "suggest", "category": "infra"})).await;
    let pairing = suggestions
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["pattern_type"] == "pairing")
        .expect("pairing suggestion");
    assert!(pairing["confidence"].as_f64().unwrap() > 0.5);
    let name = pairing["pattern_name"].as_str().unwrap();
    assert!(name.contains("a1") && name.contains("a2"));
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let data = tempdir().unwrap();
    let repo = tempdir().unwrap();
    let config = config(data.path(), repo.path());

    let lore_id = {
        let collective = Collective::open(&config).unwrap();
        let command: Command = serde_json::from_value(json!({
            "op": "share_lore",
            "agent": "scout",
            "category": "debugging",
            "title": "Circular imports",
            "wisdom": "Check the import graph first"
        }))
        .unwrap();
        let lore = collective.execute(command).await.unwrap();
        lore["id"].as_str().unwrap().to_string()
    };

    let reopened = Collective::open(&config).unwrap();
    let command: Command =
        serde_json::from_value(json!({"op": "recall", "query": "circular"})).unwrap();
    let found = reopened.execute(command).await.unwrap();
    assert_eq!(found[0]["id"], lore_id.as_str());
}
