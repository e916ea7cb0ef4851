mod support;

use std::sync::Arc;

use connect_build_core::commands::{
    BuildCommand, ListOptions, LogFormat, LogsOptions, RemoveOptions,
};
use connect_build_core::content::{ContentGuidWithBundle, ContentItem};
use connect_build_core::error::BuildError;
use connect_build_core::remote::ContentFilter;
use connect_build_core::types::BuildStatus;
use filetime::{FileTime, set_file_mtime};
use tempfile::TempDir;

use support::{ScriptedClient, context, seed};

fn published(guid: &str, bundle: &str) -> ContentItem {
    ContentItem::new(guid, Some(bundle.to_string())).with_title(format!("Report {}", guid))
}

fn target(spec: &str) -> ContentGuidWithBundle {
    spec.parse().unwrap()
}

#[tokio::test]
async fn add_single_item_fetches_by_guid() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(ScriptedClient::new().with_content(published("a1", "7")));
    let cmd = BuildCommand::new(context(temp.path(), Arc::clone(&client)));

    let added = cmd.add(&[target("a1")]).await.unwrap();

    assert_eq!(added.len(), 1);
    assert_eq!(added[0].bundle_id.as_deref(), Some("7"));
    assert_eq!(added[0].title.as_deref(), Some("Report a1"));
    assert_eq!(added[0].status(), Some(BuildStatus::NeedsBuild));
    assert_eq!(client.fetches(), vec![ContentFilter::Guid("a1".to_string())]);
}

#[tokio::test]
async fn add_many_filters_one_listing_and_prefers_explicit_bundle() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(
        ScriptedClient::new()
            .with_content(published("a1", "7"))
            .with_content(published("b2", "8"))
            .with_content(published("c3", "9")),
    );
    let cmd = BuildCommand::new(context(temp.path(), Arc::clone(&client)));

    let added = cmd.add(&[target("a1"), target("b2,42")]).await.unwrap();

    assert_eq!(client.fetches(), vec![ContentFilter::All]);
    let bundles: Vec<_> = added
        .iter()
        .map(|item| (item.guid.as_str(), item.bundle_id.as_deref()))
        .collect();
    assert_eq!(bundles, vec![("a1", Some("7")), ("b2", Some("42"))]);
    assert!(cmd.context().store().get_item("c3").is_err());
}

#[tokio::test]
async fn add_rejects_unpublished_content() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(ScriptedClient::new().with_content(ContentItem::new("a1", None)));
    let cmd = BuildCommand::new(context(temp.path(), Arc::clone(&client)));

    let err = cmd.add(&[target("a1")]).await.unwrap_err();

    assert!(matches!(err, BuildError::InvalidArgument(_)));
    assert!(err.to_string().contains("never been published"));
    assert!(cmd.context().store().get_items(None).is_empty());
}

#[tokio::test]
async fn add_accepts_bundle_for_unpublished_content() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(ScriptedClient::new().with_content(ContentItem::new("a1", None)));
    let cmd = BuildCommand::new(context(temp.path(), Arc::clone(&client)));

    let added = cmd.add(&[target("a1,3")]).await.unwrap();

    assert_eq!(added[0].bundle_id.as_deref(), Some("3"));
}

#[tokio::test]
async fn add_reports_unknown_guid() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(ScriptedClient::new().with_content(published("a1", "7")));
    let cmd = BuildCommand::new(context(temp.path(), Arc::clone(&client)));

    let err = cmd.add(&[target("a1"), target("ff")]).await.unwrap_err();

    assert!(matches!(err, BuildError::NotFound { ref guid } if guid == "ff"));
    assert!(cmd.context().store().get_items(None).is_empty());
}

#[tokio::test]
async fn add_keeps_build_history_of_tracked_item() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(ScriptedClient::new().with_content(published("a1", "7")));
    let ctx = context(temp.path(), Arc::clone(&client));
    seed(&ctx, &[("a1", BuildStatus::Error)]);
    ctx.store().touch_last_build_time("a1").unwrap();

    BuildCommand::new(ctx.clone()).add(&[target("a1")]).await.unwrap();

    let item = ctx.store().get_item("a1").unwrap();
    assert_eq!(item.status(), Some(BuildStatus::NeedsBuild));
    assert!(item.last_build_time.is_some());
    assert_eq!(item.bundle_id.as_deref(), Some("7"));
}

#[tokio::test]
async fn add_and_remove_are_refused_during_a_build() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(ScriptedClient::new().with_content(published("a1", "7")));
    let ctx = context(temp.path(), Arc::clone(&client));
    seed(&ctx, &[("b2", BuildStatus::Running)]);
    ctx.store().set_running(true).unwrap();
    let cmd = BuildCommand::new(ctx.clone());

    let add = cmd.add(&[target("a1")]).await.unwrap_err();
    let rm = cmd.remove(&RemoveOptions::all()).unwrap_err();

    assert!(matches!(add, BuildError::AlreadyRunning { .. }));
    assert!(matches!(rm, BuildError::AlreadyRunning { .. }));
    assert!(client.fetches().is_empty());
    assert_eq!(ctx.store().get_items(None).len(), 1);
}

#[test]
fn remove_requires_exactly_one_selector() {
    let temp = TempDir::new().unwrap();
    let cmd = BuildCommand::new(context(temp.path(), Arc::new(ScriptedClient::new())));

    let neither = cmd.remove(&RemoveOptions::default()).unwrap_err();
    let both = cmd
        .remove(&RemoveOptions {
            guid: Some("a".to_string()),
            all: true,
            purge: false,
        })
        .unwrap_err();

    assert!(matches!(neither, BuildError::InvalidArgument(_)));
    assert!(matches!(both, BuildError::InvalidArgument(_)));
}

#[test]
fn remove_with_purge_deletes_logs() {
    let temp = TempDir::new().unwrap();
    let ctx = context(temp.path(), Arc::new(ScriptedClient::new()));
    seed(&ctx, &[("a", BuildStatus::Complete), ("b", BuildStatus::Error)]);
    let a_logs = ctx.logs().ensure_dir("a").unwrap();
    std::fs::write(a_logs.join("t1.log"), "done\n").unwrap();
    let b_logs = ctx.logs().ensure_dir("b").unwrap();
    let cmd = BuildCommand::new(ctx.clone());

    let removed = cmd.remove(&RemoveOptions::guid("a").with_purge(true)).unwrap();

    assert_eq!(removed, vec!["a".to_string()]);
    assert!(!a_logs.exists());
    assert!(b_logs.exists());

    let removed = cmd.remove(&RemoveOptions::all()).unwrap();
    assert_eq!(removed, vec!["b".to_string()]);
    assert!(b_logs.exists());
    assert!(ctx.store().get_items(None).is_empty());
}

#[test]
fn purge_never_touches_paths_outside_the_log_root() {
    let temp = TempDir::new().unwrap();
    let ctx = context(temp.path(), Arc::new(ScriptedClient::new()));
    seed(&ctx, &[("a", BuildStatus::Complete)]);
    ctx.logs().ensure_dir("a").unwrap();
    let victim = temp.path().join("victim");
    std::fs::create_dir_all(&victim).unwrap();
    std::fs::write(victim.join("precious.txt"), "keep").unwrap();
    let cmd = BuildCommand::new(ctx.clone());

    for guid in ["../../../victim", "../../victim", ".."] {
        let removed = cmd.remove(&RemoveOptions::guid(guid).with_purge(true)).unwrap();
        assert!(removed.is_empty(), "{}", guid);
    }

    assert!(victim.join("precious.txt").is_file());
    assert!(ctx.logs().dir("a").unwrap().is_dir());
    assert_eq!(ctx.store().get_items(None).len(), 1);
}

#[test]
fn logs_reject_task_ids_that_leave_the_item_directory() {
    let temp = TempDir::new().unwrap();
    let ctx = context(temp.path(), Arc::new(ScriptedClient::new()));
    seed(&ctx, &[("a", BuildStatus::Complete)]);
    ctx.logs().ensure_dir("a").unwrap();
    let cmd = BuildCommand::new(ctx);

    let err = cmd
        .logs(&LogsOptions::new("a").with_task_id("../../../connect_example_com"))
        .unwrap_err();

    assert!(matches!(err, BuildError::InvalidArgument(_)));
    assert!(err.to_string().contains("invalid task id"));
}

#[test]
fn list_by_status_and_guid() {
    let temp = TempDir::new().unwrap();
    let ctx = context(temp.path(), Arc::new(ScriptedClient::new()));
    seed(
        &ctx,
        &[
            ("a", BuildStatus::Complete),
            ("b", BuildStatus::Error),
            ("c", BuildStatus::Error),
        ],
    );
    let cmd = BuildCommand::new(ctx);

    let errors = cmd
        .list(&ListOptions::new().with_status(BuildStatus::Error))
        .unwrap();
    assert_eq!(errors.iter().map(|i| i.guid.as_str()).collect::<Vec<_>>(), vec!["b", "c"]);

    let picked = cmd
        .list(&ListOptions::new().with_guids(vec!["c".to_string(), "a".to_string()]))
        .unwrap();
    assert_eq!(picked[0].guid, "c");
    assert_eq!(picked[1].status(), Some(BuildStatus::Complete));

    assert_eq!(cmd.list(&ListOptions::new()).unwrap().len(), 3);

    let missing = cmd
        .list(&ListOptions::new().with_guids(vec!["zz".to_string()]))
        .unwrap_err();
    assert!(matches!(missing, BuildError::NotFound { .. }));
}

#[test]
fn history_orders_attempts_oldest_first() {
    let temp = TempDir::new().unwrap();
    let ctx = context(temp.path(), Arc::new(ScriptedClient::new()));
    seed(&ctx, &[("a", BuildStatus::Complete)]);
    let dir = ctx.logs().ensure_dir("a").unwrap();
    for (task_id, secs) in [("late", 2_000_000_000), ("early", 1_000_000_000)] {
        let path = dir.join(format!("{}.log", task_id));
        std::fs::write(&path, "line\n").unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(secs, 0)).unwrap();
    }
    std::fs::write(dir.join("notes.txt"), "ignored").unwrap();
    let cmd = BuildCommand::new(ctx);

    let history = cmd.history("a").unwrap();

    let ids: Vec<_> = history.iter().map(|h| h.task_id.as_str()).collect();
    assert_eq!(ids, vec!["early", "late"]);
    assert_eq!(history[0].time.timestamp(), 1_000_000_000);
    assert!(cmd.history("never-built").unwrap().is_empty());
}

#[tokio::test]
async fn logs_render_last_attempt_as_text_or_json() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(ScriptedClient::new());
    let ctx = context(temp.path(), Arc::clone(&client));
    seed(&ctx, &[("a", BuildStatus::NeedsBuild)]);
    let cmd = BuildCommand::new(ctx);
    cmd.run(&connect_build_core::build::RunOptions::new())
        .await
        .unwrap();

    let text = cmd.logs(&LogsOptions::new("a")).unwrap();
    assert_eq!(text, vec!["built a".to_string()]);

    let json = cmd
        .logs(&LogsOptions::new("a").with_format(LogFormat::Json))
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json[0]).unwrap();
    assert_eq!(parsed["message"], "built a");

    let by_task = cmd
        .logs(&LogsOptions::new("a").with_task_id("task-a-1"))
        .unwrap();
    assert_eq!(by_task, text);
}

#[test]
fn logs_without_any_attempt_is_an_error() {
    let temp = TempDir::new().unwrap();
    let ctx = context(temp.path(), Arc::new(ScriptedClient::new()));
    seed(&ctx, &[("a", BuildStatus::NeedsBuild)]);
    let cmd = BuildCommand::new(ctx);

    let err = cmd.logs(&LogsOptions::new("a")).unwrap_err();
    assert!(err.to_string().contains("log file not found"));

    let err = cmd
        .logs(&LogsOptions::new("a").with_task_id("nope"))
        .unwrap_err();
    assert!(matches!(err, BuildError::InvalidArgument(_)));

    assert!(matches!(
        cmd.logs(&LogsOptions::new("ghost")).unwrap_err(),
        BuildError::NotFound { .. }
    ));
}

#[test]
fn log_format_parses_case_insensitively() {
    assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
    assert!("xml".parse::<LogFormat>().is_err());
}

