//! Integration tests for saved roadmaps and the student roster.

mod common;

use common::{TestEnv, graph};
use roadmap::{Roster, RosterError, StudentSkill};
use serde_json::json;

// =============================================================================
// Saved roadmaps
// =============================================================================

#[test]
fn test_saved_graph_reads_back_unchanged() {
    let mut env = TestEnv::new();
    let tasks = json!({"tasks": [
        {"id": 1, "name_of_the_task": "Read", "description": "Chapter 1", "dependencies": [], "estimated_duration": 30},
        {"id": 2, "name_of_the_task": "Write", "description": "Summary", "dependencies": [1, 42], "estimated_duration": 45}
    ]});
    let saved = env.save("Study plan", tasks.clone());

    let env = env.reopen();
    let loaded = env.store.get(&saved.id).unwrap().unwrap();
    assert_eq!(loaded.graph, graph(tasks.clone()));

    // Same `{tasks: [...]}` shape on the way out.
    let document = serde_json::to_value(&loaded.graph).unwrap();
    assert_eq!(document["tasks"].as_array().unwrap().len(), 2);
    assert_eq!(document["tasks"][1]["dependencies"], json!([1, 42]));
    assert_eq!(document["tasks"][1]["name_of_the_task"], "Write");
}

#[test]
fn test_list_newest_first() {
    let mut env = TestEnv::new();
    let first = env.save("First", json!({"tasks": [{"id": 1}]}));
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = env.save("Second", json!({"tasks": [{"id": 1}]}));

    let ids: Vec<String> = env.store.list().unwrap().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
}

#[test]
fn test_rename_and_delete_survive_reopen() {
    let mut env = TestEnv::new();
    let keep = env.save("Keep", json!({"tasks": [{"id": 1}]}));
    let gone = env.save("Drop", json!({"tasks": [{"id": 1}]}));

    env.store.rename(&keep.id, "  Kept  ").unwrap();
    env.store.delete(&gone.id).unwrap();

    let env = env.reopen();
    assert_eq!(env.roadmap_count(), 1);
    assert_eq!(env.store.get(&keep.id).unwrap().unwrap().title, "Kept");
    assert!(env.store.get(&gone.id).unwrap().is_none());
}

#[test]
fn test_rename_rejects_bad_titles() {
    let mut env = TestEnv::new();
    let saved = env.save("Title", json!({"tasks": []}));

    assert!(env.store.rename(&saved.id, "").is_err());
    assert!(env.store.rename(&saved.id, &"t".repeat(201)).is_err());
    assert_eq!(env.store.get(&saved.id).unwrap().unwrap().title, "Title");
}

#[test]
fn test_missing_roadmap() {
    let mut env = TestEnv::new();
    assert!(env.store.get("rm-0000000000").unwrap().is_none());
    assert!(env.store.delete("rm-0000000000").is_err());
}

// =============================================================================
// Roster
// =============================================================================

#[test]
fn test_roster_round_trip() {
    let mut env = TestEnv::new();
    let mut roster = Roster::new();
    roster.add("Ada").unwrap();
    roster.add("Grace").unwrap();
    roster.get_mut("S2").unwrap().set("availableHours", 12.0);
    env.store.save_roster(&roster).unwrap();

    let env = env.reopen();
    let loaded = env.store.roster().unwrap();
    assert_eq!(loaded, roster);
    assert_eq!(loaded.students()[1].available_hours, 12.0);
}

#[test]
fn test_roster_limits() {
    let mut roster = Roster::new();
    for i in 1..=10 {
        roster.add(&format!("Student {}", i)).unwrap();
    }
    assert_eq!(roster.add("Eleven").unwrap_err(), RosterError::Full);

    let mut single = Roster::new();
    single.add("Only").unwrap();
    assert_eq!(single.remove(0).unwrap_err(), RosterError::AtMinimum);
}

#[test]
fn test_removal_renumbers_stored_ids() {
    let mut env = TestEnv::new();
    let mut roster = Roster::new();
    for name in ["Ada", "Bob", "Cy"] {
        roster.add(name).unwrap();
    }
    env.store.save_roster(&roster).unwrap();

    roster.remove(1).unwrap();
    env.store.save_roster(&roster).unwrap();

    let stored: Vec<(String, String)> = env
        .store
        .list_students()
        .unwrap()
        .into_iter()
        .map(|s| (s.student_id, s.name))
        .collect();
    assert_eq!(
        stored,
        vec![("S1".to_string(), "Ada".to_string()), ("S2".to_string(), "Cy".to_string())]
    );
}

#[test]
fn test_upsert_single_student() {
    let mut env = TestEnv::new();
    let mut student = StudentSkill::new("S1", "Ada");
    env.store.upsert_student(&student).unwrap();

    student.set("cognitivePower", 0.95);
    env.store.upsert_student(&student).unwrap();

    let loaded = env.store.get_student("S1").unwrap().unwrap();
    assert_eq!(loaded.cognitive_power, 0.95);
    assert_eq!(env.store.list_students().unwrap().len(), 1);
}
