//! End-to-end tests: config text → validated graph → started hierarchy.

use std::path::Path;

use swarm::test_support::{ScriptedRunner, deterministic_env};
use swarm::{CommandResult, SwarmOrchestrator};

fn fixture_path() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/dev_team.yml"))
}

/// Leader `L` with two direct reports, no deeper levels.
const FLAT: &str = r#"
version: 2
swarm:
  name: flat
  leader: L
  agents:
    L:
      description: leader
      provider: anthropic
      model: m
      reports: [C1, C2]
    C1:
      description: first
      provider: anthropic
      model: m
    C2:
      description: second
      provider: anthropic
      model: m
"#;

#[test]
fn leader_with_two_reports_builds_three_agents() {
    let mut o = SwarmOrchestrator::from_yaml_str(FLAT).with_env(deterministic_env());
    assert!(o.is_valid(), "{:?}", o.errors());
    assert!(o.start_with(&ScriptedRunner::succeeding()));

    assert_eq!(o.active_count(), 3);
    let leader = o.leader().expect("leader");
    assert_eq!(leader.child_ids().len(), 2);

    let tree = o.agent_tree().expect("tree");
    assert_eq!(tree.name, "L");
    let names: Vec<&str> = tree.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["C1", "C2"]);
    assert!(tree.children.iter().all(|c| c.children.is_empty()));
}

#[test]
fn agent_tree_is_idempotent() {
    let mut o = SwarmOrchestrator::from_yaml_str(FLAT);
    assert!(o.start_with(&ScriptedRunner::succeeding()));
    assert_eq!(o.agent_tree(), o.agent_tree());
}

#[test]
fn depth_matches_ancestor_hops() {
    let mut o = SwarmOrchestrator::from_path(fixture_path()).with_env(deterministic_env());
    assert!(o.start_with(&ScriptedRunner::succeeding()));

    for agent in o.agents() {
        let record = o.record(agent.id()).expect("record");
        let hops = o.hierarchy().ancestors(agent.id()).len();
        assert_eq!(record.depth, hops, "agent {}", agent.name());
        if agent.is_root() {
            assert_eq!(record.depth, 0);
        }
    }
}

#[test]
fn fixture_loads_and_runs_real_before_commands() {
    let mut o = SwarmOrchestrator::from_path(fixture_path());
    assert!(o.is_valid(), "{:?}", o.errors());
    assert!(o.start());

    assert_eq!(o.active_count(), 4);
    let leader = o.leader().expect("leader");
    assert_eq!(leader.name(), "lead");

    let role = leader.role();
    assert!(role.can_use_tool("Bash"));
    assert!(role.can_use_tool("Edit"));
    assert!(role.can_use_tool("Read"));
    assert!(!role.can_use_tool("WebFetch"));
    assert_eq!(role.mcp_servers()[0].name, "files");

    let session = leader.session_id().to_string();
    assert!(o.agents().all(|a| a.session_id() == session));
    assert_eq!(
        o.role("backend").expect("backend").directory(),
        "services/api"
    );
}

#[test]
fn failing_real_before_command_leaves_no_hierarchy() {
    let yaml = FLAT.replace("  leader: L\n", "  leader: L\n  before:\n    - \"exit 7\"\n    - \"echo never\"\n");
    let mut o = SwarmOrchestrator::from_yaml_str(&yaml);
    assert!(o.is_valid(), "{:?}", o.errors());
    assert!(!o.start());
    assert_eq!(o.active_count(), 0);
    assert!(o.agent_tree().is_none());
    assert_eq!(o.errors().len(), 1);
    assert!(o.errors()[0].starts_with("Failed to start swarm: Before command failed: exit 7"));
}

#[test]
fn runner_results_are_checked_in_order() {
    let mut o = SwarmOrchestrator::from_path(fixture_path());
    let runner = ScriptedRunner::new(vec![Ok(CommandResult::failed("", "killed"))]);
    assert!(!o.start_with(&runner));
    assert_eq!(runner.commands(), ["true"]);
    assert!(o.errors()[0].contains("(exit status -1): killed"));
}

#[test]
fn mutual_reports_are_circular() {
    let yaml = r#"
version: 2
swarm:
  name: loop
  leader: A
  agents:
    A:
      description: a
      provider: anthropic
      model: m
      reports: [B]
    B:
      description: b
      provider: anthropic
      model: m
      reports: [C]
    C:
      description: c
      provider: anthropic
      model: m
      reports: [A]
"#;
    let mut o = SwarmOrchestrator::from_yaml_str(yaml);
    assert!(!o.is_valid());
    assert!(
        o.errors()
            .iter()
            .any(|e| e.starts_with("Circular dependency detected for agent '"))
    );
    assert!(!o.start_with(&ScriptedRunner::succeeding()));
    assert_eq!(o.active_count(), 0);
}

#[test]
fn conversation_log_and_context_are_per_agent() {
    let mut o = SwarmOrchestrator::from_yaml_str(FLAT).with_env(deterministic_env());
    assert!(o.start_with(&ScriptedRunner::succeeding()));
    let leader_id = o.leader().expect("leader").id().to_string();

    let leader = o.find_agent_mut(&leader_id).expect("leader");
    leader.add_message("user", "ship it");
    leader.set_context("phase", serde_json::json!("planning"));

    let leader = o.find_agent(&leader_id).expect("leader");
    assert_eq!(leader.messages().len(), 1);
    assert_eq!(leader.context("phase"), Some(&serde_json::json!("planning")));

    let child = o.hierarchy().children(&leader_id)[0];
    assert!(child.messages().is_empty());
}

#[test]
fn missing_config_file_is_reported_not_raised() {
    let o = SwarmOrchestrator::from_path(Path::new("/definitely/not/here.yml"));
    assert!(!o.is_valid());
    assert_eq!(o.errors().len(), 3);
    assert!(o.errors()[0].starts_with("YAML syntax error: "));
    assert_eq!(o.errors()[1..], ["version is required", "swarm.name is required"]);
}
