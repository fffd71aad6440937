use std::path::PathBuf;

use binary_pipeline::commands::{parse_binding, parse_goal};
use binary_pipeline::sha256_bytes;
use pipeline_core::context::PipelineContext;

#[test]
fn bindings_split_into_step_container_path() {
    let binding = parse_binding("FirstStep:Strings1:/tmp/in.txt").expect("binding");
    assert_eq!(binding.step, "FirstStep");
    assert_eq!(binding.container, "Strings1");
    assert_eq!(binding.path, PathBuf::from("/tmp/in.txt"));
}

#[test]
fn binding_path_may_contain_colons() {
    let binding = parse_binding("Step:c:C:/data/in.txt").expect("binding");
    assert_eq!(binding.path, PathBuf::from("C:/data/in.txt"));
}

#[test]
fn malformed_bindings_are_rejected() {
    assert!(parse_binding("only-two:fields").is_err());
    assert!(parse_binding(":container:path").is_err());
    assert!(parse_binding("step::path").is_err());
}

#[test]
fn goals_resolve_kind_and_path() {
    let ctx = PipelineContext::with_defaults().expect("context");
    let goal = parse_goal("FirstStep:Strings2:*:StringKind", &ctx).expect("goal");
    assert_eq!(goal.step, "FirstStep");
    assert_eq!(goal.container, "Strings2");
    assert!(!goal.target.is_concrete());
    assert_eq!(goal.target.kind().name(), "StringKind");
}

#[test]
fn goals_with_unknown_kinds_are_rejected() {
    let ctx = PipelineContext::with_defaults().expect("context");
    assert!(parse_goal("FirstStep:Strings2:*:NoSuchKind", &ctx).is_err());
}

#[test]
fn goals_with_wrong_arity_are_rejected() {
    let ctx = PipelineContext::with_defaults().expect("context");
    // StringKind sits at the root rank: exactly one path component.
    assert!(parse_goal("FirstStep:Strings2:a/b:StringKind", &ctx).is_err());
}

#[test]
fn sha256_matches_known_vector() {
    assert_eq!(
        sha256_bytes(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}
