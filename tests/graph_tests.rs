//! Integration tests from raw service payloads to positioned graphs.

mod common;

use common::graph;
use roadmap::{
    CompletionSet, Direction, ErrorKind, TaskGraph, layout, layout_with_completion, normalize, normalize_dependencies,
};
use serde_json::json;

// =============================================================================
// Normalization
// =============================================================================

#[test]
fn test_two_task_chain() {
    let result = json!({"text": r#"{"tasks":[{"id":1,"name_of_the_task":"A","dependencies":[],"estimated_duration":5},{"id":2,"name_of_the_task":"B","dependencies":[1],"estimated_duration":3}]}"#});
    let graph = normalize(Some(&result)).unwrap();

    let keys: Vec<&str> = graph.keys().collect();
    assert_eq!(keys, vec!["1", "2"]);
    assert!(graph.get("1").unwrap().dependencies.is_empty());
    assert_eq!(graph.get("2").unwrap().dependencies, vec![1]);

    let positioned = layout(&graph, Direction::TopToBottom);
    assert_eq!(positioned.node("1").unwrap().rank, 0);
    assert_eq!(positioned.node("2").unwrap().rank, 1);
    assert_eq!(positioned.edges.len(), 1);
    assert_eq!(positioned.edges[0].from_id, "1");
    assert_eq!(positioned.edges[0].to_id, "2");
}

#[test]
fn test_dependency_shapes() {
    assert_eq!(normalize_dependencies(Some(&json!("2"))), vec![2]);
    assert_eq!(normalize_dependencies(Some(&json!(""))), Vec::<i64>::new());
    assert_eq!(normalize_dependencies(Some(&json!(3))), vec![3]);
    assert_eq!(normalize_dependencies(Some(&json!("[1, 2]"))), vec![1, 2]);
    assert_eq!(normalize_dependencies(None), Vec::<i64>::new());
}

#[test]
fn test_dependency_normalization_is_idempotent() {
    for raw in [json!([3, 1, 2]), json!("[4,5]"), json!(7), json!("8"), json!([1, "x", 2.5, 3])] {
        let once = normalize_dependencies(Some(&raw));
        let twice = normalize_dependencies(Some(&json!(once)));
        assert_eq!(once, twice, "not idempotent for {}", raw);
    }
}

#[test]
fn test_key_set_matches_synthesized_ids() {
    let graph = graph(json!({"tasks": [
        {"name_of_the_task": "no id"},
        {"id": 5},
        {"id": "7"},
        {"name_of_the_task": "also no id"}
    ]}));

    let keys: Vec<&str> = graph.keys().collect();
    assert_eq!(keys, vec!["1", "4", "5", "7"]);
    for key in keys {
        assert_eq!(graph.get(key).unwrap().key(), key);
    }
}

#[test]
fn test_duplicate_ids_last_write_wins() {
    let graph = graph(json!({"tasks": [
        {"id": 1, "name_of_the_task": "first"},
        {"id": 1, "name_of_the_task": "second"}
    ]}));
    assert_eq!(graph.len(), 1);
    assert_eq!(graph.get("1").unwrap().name, "second");
}

#[test]
fn test_refusal_text() {
    let result = json!({"text": "Sorry, I cannot assist with that request."});
    assert_eq!(
        normalize(Some(&result)).unwrap_err(),
        ErrorKind::ServerRefused("Sorry, I cannot assist with that request.".to_string())
    );
}

#[test]
fn test_error_classification() {
    assert_eq!(normalize(None).unwrap_err(), ErrorKind::EmptyResponse);
    assert_eq!(normalize(Some(&json!({}))).unwrap_err(), ErrorKind::EmptyResponse);
    assert!(matches!(
        normalize(Some(&json!({"text": "{not json"}))).unwrap_err(),
        ErrorKind::MalformedPayload(_)
    ));
    assert!(matches!(
        normalize(Some(&json!({"content": {"steps": []}}))).unwrap_err(),
        ErrorKind::InvalidShape(_)
    ));
}

#[test]
fn test_double_encoded_content() {
    let inner = json!({"tasks": [{"id": 1, "name_of_the_task": "Deep"}]}).to_string();
    let twice = serde_json::to_string(&inner).unwrap();
    let graph = normalize(Some(&json!({"content": twice}))).unwrap();
    assert_eq!(graph.get("1").unwrap().name, "Deep");
}

// =============================================================================
// Layout
// =============================================================================

#[test]
fn test_dangling_dependency_is_not_an_edge() {
    let graph = graph(json!({"tasks": [
        {"id": 1, "dependencies": []},
        {"id": 2, "dependencies": [1, 99]}
    ]}));

    let positioned = layout(&graph, Direction::LeftToRight);
    assert_eq!(positioned.nodes.len(), 2);
    assert!(positioned.edges.iter().all(|e| e.from_id != "99" && e.to_id != "99"));
    assert_eq!(positioned.edges.len(), 1);
}

#[test]
fn test_cycles_terminate_with_every_node_placed() {
    let graph = graph(json!({"tasks": [
        {"id": 1, "dependencies": [3]},
        {"id": 2, "dependencies": [1]},
        {"id": 3, "dependencies": [2]},
        {"id": 4, "dependencies": [4, 3]}
    ]}));

    let positioned = layout(&graph, Direction::TopToBottom);
    let mut ids: Vec<&str> = positioned.nodes.iter().map(|n| n.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["1", "2", "3", "4"]);
    assert_eq!(positioned.edges.len(), 4);
}

#[test]
fn test_layout_covers_every_task() {
    let tasks: Vec<_> = (1..=30)
        .map(|id| json!({"id": id, "dependencies": [id / 2, id - 3]}))
        .collect();
    let graph = graph(json!({ "tasks": tasks }));

    let positioned = layout(&graph, Direction::TopToBottom);
    assert_eq!(positioned.nodes.len(), graph.len());
    for edge in &positioned.edges {
        let from = positioned.node(&edge.from_id).unwrap();
        let to = positioned.node(&edge.to_id).unwrap();
        assert!(from.rank < to.rank, "edge {} -> {} does not descend", edge.from_id, edge.to_id);
    }
}

#[test]
fn test_direction_and_completion_recompute() {
    let graph = graph(json!({"tasks": [{"id": 1}, {"id": 2, "dependencies": [1]}]}));
    let mut done = CompletionSet::new();
    done.toggle("2");

    let tb = layout_with_completion(&graph, Direction::TopToBottom, &done);
    let lr = layout_with_completion(&graph, Direction::LeftToRight, &done);
    assert!(tb.node("2").unwrap().completed);
    assert!(!tb.node("1").unwrap().completed);

    // Same ranks, transposed axis.
    assert_eq!(tb.node("2").unwrap().rank, lr.node("2").unwrap().rank);
    assert!(tb.node("2").unwrap().y > tb.node("1").unwrap().y);
    assert!(lr.node("2").unwrap().x > lr.node("1").unwrap().x);
}

#[test]
fn test_empty_graph() {
    let positioned = layout(&TaskGraph::default(), Direction::TopToBottom);
    assert!(positioned.nodes.is_empty());
    assert!(positioned.edges.is_empty());
    assert_eq!(positioned.rank_count(), 0);
}
