use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use recmd::catalog::CommandStore;
use recmd::catalog::model::command_hash;
use recmd::catalog::store::HISTORY_FILE;
use recmd::gateway::request::encode;
use recmd::gateway::{self, AppState, Secret};
use recmd::scheduler::SchedulerConfig;

const SECRET: &str = "abcdefghijklmnopqrstABCDEFGHIJKLMNOP1234";

struct TestApp {
    app: Router,
    state: AppState,
    dir: tempfile::TempDir,
}

impl TestApp {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CommandStore::open(dir.path().join(HISTORY_FILE)).expect("store");
        let cfg = SchedulerConfig {
            vacuum_delay: Duration::from_millis(300),
            ..SchedulerConfig::default()
        };
        let state = AppState::start(store, cfg, Secret::new(SECRET.to_owned()));
        Self {
            app: gateway::router(state.clone()),
            state,
            dir,
        }
    }

    fn workdir(&self) -> String {
        self.dir.path().to_string_lossy().to_string()
    }

    async fn call(&self, method: Method, uri: &str) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    async fn add(&self, command: &str, description: &str) -> (StatusCode, Value) {
        let uri = format!(
            "/secret/{}/add/command/{}/description/{}/workingDirectory/{}",
            encode(SECRET),
            encode(command),
            encode(description),
            encode(&self.workdir())
        );
        self.call(Method::POST, &uri).await
    }

    async fn get(&self, route: &str) -> (StatusCode, Value) {
        self.call(Method::GET, &format!("/secret/{}/{route}", encode(SECRET)))
            .await
    }

    async fn post(&self, route: &str) -> (StatusCode, Value) {
        self.call(Method::POST, &format!("/secret/{}/{route}", encode(SECRET)))
            .await
    }
}

#[tokio::test]
async fn add_then_list_returns_the_command() {
    let t = TestApp::new();
    let (status, body) = t.add("ls -ltr /", "list files").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Bool(true));

    let (status, body) = t.get("list").await;
    assert_eq!(status, StatusCode::OK);
    let cmds = body.as_array().unwrap();
    assert_eq!(cmds.len(), 1);
    assert_eq!(cmds[0]["commandString"], "ls -ltr /");
    assert_eq!(cmds[0]["description"], "list files");
    assert_eq!(cmds[0]["commandHash"], command_hash("ls -ltr /"));
    assert_eq!(cmds[0]["duration"], -1);
}

#[tokio::test]
async fn duplicate_add_is_a_conflict() {
    let t = TestApp::new();
    assert_eq!(t.add("uptime", "one").await.0, StatusCode::OK);

    let (status, body) = t.add("uptime", "two").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already exists"));
    assert_eq!(t.state.store.list().unwrap().len(), 1);
}

#[tokio::test]
async fn bad_secret_is_rejected_before_the_store() {
    let t = TestApp::new();
    let uri = format!(
        "/secret/{}/add/command/{}/description/{}/workingDirectory/{}",
        encode("wrong"),
        encode("true"),
        encode("noop"),
        encode(&t.workdir())
    );
    let (status, _) = t.call(Method::POST, &uri).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(t.state.store.list().unwrap().is_empty());

    let (status, _) = t
        .call(Method::GET, &format!("/secret/{}/list", encode("wrong")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn undecodable_segment_is_a_bad_request() {
    let t = TestApp::new();
    let (status, body) = t.get("select/cmdHash/***").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("cmdHash"));
}

#[tokio::test]
async fn add_rejects_missing_working_directory() {
    let t = TestApp::new();
    let missing = t.dir.path().join("missing");
    let uri = format!(
        "/secret/{}/add/command/{}/description/{}/workingDirectory/{}",
        encode(SECRET),
        encode("true"),
        encode("noop"),
        encode(&missing.to_string_lossy())
    );
    let (status, _) = t.call(Method::POST, &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(t.state.store.list().unwrap().is_empty());
}

#[tokio::test]
async fn search_matches_case_insensitively() {
    let t = TestApp::new();
    for i in 0..10 {
        assert_eq!(
            t.add(&format!("echo {i}"), "Dummy description").await.0,
            StatusCode::OK
        );
    }

    let (_, lower) = t.get(&format!("search/description/{}", encode("dummy"))).await;
    let (_, upper) = t.get(&format!("search/description/{}", encode("DUMMY"))).await;
    assert_eq!(lower.as_array().unwrap().len(), 10);
    assert_eq!(lower, upper);

    let (status, none) = t.get(&format!("search/description/{}", encode("zzz"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(none.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn select_by_prefix_and_unknown_hash() {
    let t = TestApp::new();
    t.add("date", "clock").await;
    let hash = command_hash("date");

    let (status, body) = t
        .get(&format!("select/cmdHash/{}", encode(&hash[..8])))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["commandHash"], hash);

    let (status, _) = t.get(&format!("select/cmdHash/{}", encode("zzzz"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_nine_of_ten_leaves_one() {
    let t = TestApp::new();
    let texts: Vec<String> = (0..10).map(|i| format!("echo {i}")).collect();
    for text in &texts {
        t.add(text, "Dummy description").await;
    }

    for text in &texts[1..] {
        let (status, body) = t
            .post(&format!("delete/cmdHash/{}", encode(&command_hash(text))))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    let (_, body) = t.get("list").await;
    let cmds = body.as_array().unwrap();
    assert_eq!(cmds.len(), 1);
    assert_eq!(cmds[0]["commandString"], "echo 0");

    let (status, body) = t
        .post(&format!("delete/cmdHash/{}", encode("zzzz")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn run_records_duration_and_shows_in_status() {
    let t = TestApp::new();
    t.add("echo hello", "greeting").await;
    let hash = command_hash("echo hello");

    let (status, body) = t.post(&format!("run/cmdHash/{}", encode(&hash))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Completed");
    assert_eq!(body["coutput"], "hello\n");
    assert_eq!(body["exitStatus"], 0);
    assert!(body["duration"].as_i64().unwrap() >= 0);

    let stored = t.state.store.select_by_hash_prefix(&hash).unwrap().unwrap();
    assert!(stored.duration >= 0);

    let (status, jobs) = t.get("status").await;
    assert_eq!(status, StatusCode::OK);
    let jobs = jobs.as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["commandHash"], hash);
    assert_eq!(jobs[0]["status"], "Completed");

    tokio::time::sleep(Duration::from_millis(800)).await;
    let (_, jobs) = t.get("queue").await;
    assert!(jobs.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn failed_run_keeps_never_run_duration() {
    let t = TestApp::new();
    t.add("false", "always fails").await;
    let hash = command_hash("false");

    let (status, body) = t.post(&format!("run/cmdHash/{}", encode(&hash))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Failed");

    let stored = t.state.store.select_by_hash_prefix(&hash).unwrap().unwrap();
    assert_eq!(stored.duration, -1);
}

#[tokio::test]
async fn run_with_removed_working_directory_is_not_scheduled() {
    let t = TestApp::new();
    let doomed = t.dir.path().join("doomed");
    std::fs::create_dir(&doomed).unwrap();
    let uri = format!(
        "/secret/{}/add/command/{}/description/{}/workingDirectory/{}",
        encode(SECRET),
        encode("true"),
        encode("noop"),
        encode(&doomed.to_string_lossy())
    );
    assert_eq!(t.call(Method::POST, &uri).await.0, StatusCode::OK);
    std::fs::remove_dir(&doomed).unwrap();

    let (status, _) = t
        .post(&format!("run/cmdHash/{}", encode(&command_hash("true"))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(t.state.scheduler.status().is_empty());
}

#[tokio::test]
async fn show_returns_script_contents() {
    let t = TestApp::new();
    std::fs::write(t.dir.path().join("backup.sh"), "tar czf /tmp/b.tgz .\n").unwrap();
    t.add("sh backup.sh", "backup").await;

    let (status, body) = t
        .get(&format!("show/cmdHash/{}", encode(&command_hash("sh backup.sh"))))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("tar czf /tmp/b.tgz .\n".to_owned()));
}

#[tokio::test]
async fn abandoned_run_still_records_and_vacuums() {
    let t = TestApp::new();
    t.add("sleep 0.3", "slow").await;
    let hash = command_hash("sleep 0.3");

    let route = format!("run/cmdHash/{}", encode(&hash));
    let request = t.post(&route);
    assert!(
        tokio::time::timeout(Duration::from_millis(100), request)
            .await
            .is_err()
    );
    assert_eq!(t.state.scheduler.status().len(), 1);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(t.state.scheduler.status().is_empty());
    let stored = t.state.store.select_by_hash_prefix(&hash).unwrap().unwrap();
    assert!(stored.duration >= 0);
}
