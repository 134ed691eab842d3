//! End-to-end handler scenarios against the scripted mock API

use crate::driver::drive;
use crate::testing::{init_test_tracing, ApiOp, ClusterHandler, DbCluster, MockApi, ARN};
use crate::{
    BackoffPolicy, HandlerConfig, HandlerErrorCode, HandlerRequest, OperationState, Outcome,
    RemoteError, ResourceHandler, TagSet,
};
use std::sync::Arc;
use std::time::Duration;

fn config(probing_enabled: bool) -> HandlerConfig {
    HandlerConfig {
        probing_enabled,
        backoff: BackoffPolicy::new(Duration::from_secs(5), Duration::from_secs(600)).unwrap(),
    }
}

fn tagging_denied() -> RemoteError {
    RemoteError::service(
        "AccessDeniedException",
        "User: arn:aws:iam::123:user/dev is not authorized to perform: rds:AddTagsToResource",
    )
}

fn existing_cluster(api: &MockApi) -> DbCluster {
    let cluster = DbCluster {
        arn: Some("arn:mock:cluster:orders".into()),
        status: Some("available".into()),
        ..DbCluster::new("orders", "15.4")
    };
    api.insert(cluster.clone());
    cluster
}

#[tokio::test(start_paused = true)]
async fn test_create_waits_for_two_confirmations() {
    init_test_tracing();
    let api = Arc::new(MockApi::new());
    let handler = ClusterHandler::new(api.clone(), config(true)).with_confirmations(2);
    let request = HandlerRequest::new(
        DbCluster::new("orders", "15.4"),
        TagSet::new().with_system("aws:cloudformation:stack-name", "shop"),
    );

    let outcome = drive(&handler.config.backoff, |state| {
        handler.create(request.clone(), state)
    })
    .await;

    match outcome {
        Outcome::Success { resource, message } => {
            assert_eq!(resource.arn.as_deref(), Some("arn:mock:cluster:orders"));
            assert_eq!(message, None);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(api.calls(ApiOp::Create), 1);
    assert!(api.calls(ApiOp::Describe) >= 2);
    assert_eq!(handler.stats.snapshot().calls_skipped, 1);
}

#[test]
fn test_create_flapping_status_resets_confirmation() {
    let api = Arc::new(MockApi::new());
    let handler = ClusterHandler::new(api.clone(), config(true)).with_confirmations(2);
    api.script_statuses(&["available", "creating", "available", "available"]);
    let request = HandlerRequest::new(DbCluster::new("orders", "15.4"), TagSet::new());

    let mut state = None;
    let mut invocations = 0;
    let outcome = loop {
        invocations += 1;
        match handler.create(request.clone(), state.take()) {
            Outcome::InProgress { state: next, .. } => state = Some(next),
            terminal => break terminal,
        }
    };

    assert!(matches!(outcome, Outcome::Success { .. }));
    assert_eq!(invocations, 4);
    assert_eq!(api.calls(ApiOp::Create), 1);
}

#[test]
fn test_create_tagging_denied_with_resource_tags_fails() {
    let api = Arc::new(MockApi::new());
    let handler = ClusterHandler::new(api.clone(), config(false));
    api.script(ApiOp::Create, Some(tagging_denied()));
    let tags = TagSet::new()
        .with_system("aws:cloudformation:stack-name", "shop")
        .with_resource("env", "prod");

    let outcome = handler.create(HandlerRequest::new(DbCluster::new("orders", "15.4"), tags), None);

    assert_eq!(outcome.code(), Some(HandlerErrorCode::AccessDenied));
    assert_eq!(api.calls(ApiOp::Create), 1);
    assert_eq!(api.calls(ApiOp::AddTags), 0);
}

#[test]
fn test_create_tagging_denied_falls_back_to_system_tags() {
    let api = Arc::new(MockApi::new());
    let handler = ClusterHandler::new(api.clone(), config(false));
    api.script(ApiOp::Create, Some(tagging_denied()));
    api.script(ApiOp::AddTags, Some(tagging_denied()));
    let tags = TagSet::new()
        .with_system("aws:cloudformation:stack-name", "shop")
        .with_stack("team", "payments");

    let request = HandlerRequest::new(DbCluster::new("orders", "15.4"), tags.clone());
    let outcome = handler.create(request, None);

    match outcome {
        Outcome::Success { message, .. } => {
            assert_eq!(message.as_deref(), Some("tags partially applied"))
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(api.calls(ApiOp::Create), 2);
    assert_eq!(api.calls(ApiOp::AddTags), 1);

    let sent = api.create_tags();
    assert_eq!(sent[0], tags.flatten());
    assert_eq!(sent[1], tags.system_only().flatten());
    assert_eq!(handler.stats.snapshot().tagging_soft_fails, 2);
}

#[test]
fn test_fallback_follow_up_tags_applied() {
    let api = Arc::new(MockApi::new());
    let handler = ClusterHandler::new(api.clone(), config(false));
    api.script(ApiOp::Create, Some(tagging_denied()));
    let tags = TagSet::new()
        .with_system("aws:cloudformation:stack-name", "shop")
        .with_stack("team", "payments");

    let outcome = handler.create(HandlerRequest::new(DbCluster::new("orders", "15.4"), tags), None);

    assert_eq!(
        outcome,
        Outcome::Success {
            resource: DbCluster {
                arn: Some("arn:mock:cluster:orders".into()),
                ..DbCluster::new("orders", "15.4")
            },
            message: None,
        }
    );
    let applied = api.tags_of("arn:mock:cluster:orders");
    assert_eq!(applied.get("team").map(String::as_str), Some("payments"));
}

#[test]
fn test_create_resumed_after_fallback_does_not_retag() {
    let api = Arc::new(MockApi::new());
    let handler = ClusterHandler::new(api.clone(), config(false));
    api.script(ApiOp::Create, Some(tagging_denied()));
    api.script(ApiOp::AddTags, Some(tagging_denied()));
    api.script_statuses(&["creating"]);
    let request = HandlerRequest::new(
        DbCluster::new("orders", "15.4"),
        TagSet::new().with_system("s", "1").with_stack("team", "payments"),
    );

    let state = match handler.create(request.clone(), None) {
        Outcome::InProgress { state, .. } => state,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(state.identifier(ARN), Some("arn:mock:cluster:orders"));

    let outcome = handler.create(request, Some(state));
    assert!(matches!(outcome, Outcome::Success { .. }));
    assert_eq!(api.calls(ApiOp::Create), 2);
    assert_eq!(api.calls(ApiOp::AddTags), 1);
}

#[test]
fn test_update_without_tag_changes_makes_no_tag_calls() {
    let api = Arc::new(MockApi::new());
    let handler = ClusterHandler::new(api.clone(), config(false));
    let previous = existing_cluster(&api);
    let tags = TagSet::new().with_stack("team", "payments").with_resource("env", "prod");
    let desired = DbCluster {
        engine_version: "16.1".into(),
        ..previous.clone()
    };

    let request = HandlerRequest::new(desired, tags.clone()).with_previous(previous, tags);
    let outcome = handler.update(request, None);

    assert!(matches!(outcome, Outcome::Success { .. }));
    assert_eq!(api.calls(ApiOp::Modify), 1);
    assert_eq!(api.calls(ApiOp::AddTags), 0);
    assert_eq!(api.calls(ApiOp::RemoveTags), 0);
}

#[test]
fn test_update_replay_does_not_repeat_modify() {
    let api = Arc::new(MockApi::new());
    let handler = ClusterHandler::new(api.clone(), config(false));
    let previous = existing_cluster(&api);
    api.script_statuses(&["modifying", "modifying"]);
    let request = HandlerRequest::new(previous.clone(), TagSet::new().with_resource("env", "prod"))
        .with_previous(
            previous,
            TagSet::new().with_resource("env", "dev").with_resource("old", "x"),
        );

    let mut state: Option<OperationState> = None;
    for _ in 0..2 {
        match handler.update(request.clone(), state.take()) {
            Outcome::InProgress { state: next, .. } => state = Some(next),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    let outcome = handler.update(request, state);

    assert!(matches!(outcome, Outcome::Success { .. }));
    assert_eq!(api.calls(ApiOp::Modify), 1);
    assert_eq!(api.calls(ApiOp::Describe), 3);
    assert_eq!(api.calls(ApiOp::RemoveTags), 1);
    assert_eq!(api.calls(ApiOp::AddTags), 1);
    let applied = api.tags_of("arn:mock:cluster:orders");
    assert_eq!(applied.get("env").map(String::as_str), Some("prod"));
}

#[test]
fn test_update_system_tag_denied_is_unauthorized_tagging() {
    let api = Arc::new(MockApi::new());
    let handler = ClusterHandler::new(api.clone(), config(false));
    let previous = existing_cluster(&api);
    api.script(ApiOp::AddTags, Some(RemoteError::service("AccessDenied", "denied")));
    let desired_tags = TagSet::new().with_system("aws:cloudformation:stack-id", "2");
    let request = HandlerRequest::new(previous.clone(), desired_tags)
        .with_previous(previous, TagSet::new());

    let outcome = handler.update(request, None);
    assert_eq!(outcome.code(), Some(HandlerErrorCode::UnauthorizedTaggingOperation));
}

#[test]
fn test_delete_missing_cluster_succeeds() {
    let api = Arc::new(MockApi::new());
    let handler = ClusterHandler::new(api.clone(), config(false));

    let outcome = handler.delete(DbCluster::new("ghost", "15.4"), None);
    assert!(matches!(outcome, Outcome::Success { .. }));
    assert_eq!(api.calls(ApiOp::Describe), 0);
}

#[test]
fn test_delete_waits_until_gone() {
    let api = Arc::new(MockApi::new());
    let handler = ClusterHandler::new(api.clone(), config(false));
    let cluster = existing_cluster(&api);

    let outcome = handler.delete(cluster, None);
    assert!(matches!(outcome, Outcome::Success { .. }));
    assert_eq!(api.calls(ApiOp::Delete), 1);
    assert_eq!(api.calls(ApiOp::Describe), 1);
}

#[test]
fn test_read_not_found() {
    let api = Arc::new(MockApi::new());
    let handler = ClusterHandler::new(api, config(false));
    let outcome = handler.read(DbCluster::new("ghost", "15.4"));
    assert_eq!(outcome.code(), Some(HandlerErrorCode::NotFound));
}

#[test]
fn test_read_returns_remote_model() {
    let api = Arc::new(MockApi::new());
    let handler = ClusterHandler::new(api.clone(), config(false));
    existing_cluster(&api);

    match handler.read(DbCluster::new("orders", "")) {
        Outcome::Success { resource, .. } => {
            assert_eq!(resource.engine_version, "15.4");
            assert_eq!(resource.status.as_deref(), Some("available"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_list_pages_through_clusters() {
    let api = Arc::new(MockApi::new());
    let handler = ClusterHandler::new(api.clone(), config(false));
    for name in ["a", "b", "c"] {
        api.insert(DbCluster::new(name, "15.4"));
    }

    let first = match handler.list(None) {
        Outcome::Success { resource, .. } => resource,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(first.resources.len(), 2);
    assert_eq!(first.next_page_token.as_deref(), Some("2"));

    let second = match handler.list(first.next_page_token) {
        Outcome::Success { resource, .. } => resource,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(second.resources[0].name, "c");
    assert_eq!(second.next_page_token, None);

    let bad = handler.list(Some("x".into()));
    assert_eq!(bad.code(), Some(HandlerErrorCode::InvalidRequest));
}
