//! End-to-end pipeline tests against an in-process stub cluster.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Router;
use gatehouse_db::{create_pool, DbConfig};
use gatehouse_executor::db::{schema, JobStore};
use gatehouse_executor::Pipeline;
use gatehouse_protocol::{
    ClusterConfigPayload, CreateJobRequest, JobMode, JobState, OperationPayload, StepState,
};
use gatehouse_security::SecretBox;
use serde_json::json;

const KEY: &str = "0123456789abcdef0123456789abcdef";

#[derive(Clone)]
struct StubState {
    hits: Arc<AtomicUsize>,
}

/// Accepts any statement; rejects password changes the way a cluster with a
/// broken auth backend would.
async fn stub_handler(State(state): State<StubState>, body: String) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if body.contains("ALTER USER") {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Code: 516. Authentication failed".to_string(),
        )
    } else {
        (StatusCode::OK, String::new())
    }
}

async fn spawn_stub_cluster() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .fallback(axum::routing::any(stub_handler))
        .with_state(StubState { hits: hits.clone() });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hits)
}

async fn setup_pipeline() -> Pipeline {
    let pool = create_pool(DbConfig::sqlite_memory()).await.unwrap();
    schema::ensure_schema(&pool).await.unwrap();
    Pipeline::new(JobStore::new(pool), SecretBox::from_hex_key(KEY).unwrap())
}

fn request_for(
    addr: Option<SocketAddr>,
    correlation_id: &str,
    mode: JobMode,
    operations: Vec<OperationPayload>,
) -> CreateJobRequest {
    let secrets = SecretBox::from_hex_key(KEY).unwrap();
    let (host, port) = match addr {
        Some(a) => (a.ip().to_string(), a.port()),
        None => ("127.0.0.1".to_string(), 1),
    };
    CreateJobRequest {
        proposal_id: 7,
        cluster_id: 1,
        actor_user_id: 3,
        correlation_id: correlation_id.to_string(),
        mode,
        cluster_config: ClusterConfigPayload {
            host,
            port,
            protocol: "http".to_string(),
            username: "default".to_string(),
            password_encrypted: secrets.encrypt("cluster-pw").unwrap(),
        },
        operations,
    }
}

fn op(order_index: i64, operation_type: &str, params: serde_json::Value) -> OperationPayload {
    OperationPayload {
        order_index,
        operation_type: operation_type.to_string(),
        params,
    }
}

#[tokio::test]
async fn test_dry_run_validates_without_cluster_io() {
    let pipeline = setup_pipeline().await;
    // Port 1: any actual connection attempt would fail loudly.
    let request = request_for(
        None,
        "dryrun-7-aaaa0001",
        JobMode::DryRun,
        vec![
            op(0, "create_role", json!({"role_name": "readers"})),
            op(
                1,
                "grant_privilege",
                json!({"privilege": "SELECT", "database": "analytics", "table": "events",
                       "target_type": "role", "target_name": "readers"}),
            ),
        ],
    );

    let view = pipeline.run_job(request).await.unwrap();
    assert_eq!(view.status, JobState::Completed);
    assert_eq!(view.steps.len(), 2);
    for step in &view.steps {
        assert_eq!(step.status, StepState::DryRunOk);
        assert_eq!(step.result_message.as_deref(), Some("Validation passed"));
    }
    assert_eq!(
        view.steps[1].sql_statement,
        "GRANT SELECT ON `analytics`.`events` TO `readers`"
    );
    assert_eq!(
        view.steps[1].compensation_sql.as_deref(),
        Some("REVOKE SELECT ON `analytics`.`events` FROM `readers`")
    );
}

#[tokio::test]
async fn test_template_failure_mid_job_skips_remaining() {
    let (addr, hits) = spawn_stub_cluster().await;
    let pipeline = setup_pipeline().await;
    let request = request_for(
        Some(addr),
        "exec-7-aaaa0002",
        JobMode::Apply,
        vec![
            op(0, "create_user", json!({"username": "svc", "password": "pw"})),
            op(1, "create_role", json!({"role_name": ""})),
            op(
                2,
                "grant_role",
                json!({"role_name": "readers", "target_type": "user", "target_name": "svc"}),
            ),
        ],
    );

    let view = pipeline.run_job(request).await.unwrap();
    assert_eq!(view.status, JobState::Failed);
    assert_eq!(
        view.error.as_deref(),
        Some("Template error at step 1: Missing required parameter: role_name")
    );

    assert_eq!(view.steps.len(), 3);
    // Step 0 ran before the template error was discovered.
    assert_eq!(view.steps[0].status, StepState::Success);
    assert_eq!(view.steps[1].status, StepState::Error);
    assert_eq!(
        view.steps[1].result_message.as_deref(),
        Some("Missing required parameter: role_name")
    );
    assert_eq!(view.steps[2].status, StepState::Skipped);
    assert_eq!(
        view.steps[2].result_message.as_deref(),
        Some("Skipped due to earlier error")
    );
    // The skipped step still shows what it would have run.
    assert_eq!(view.steps[2].sql_statement, "GRANT `readers` TO `svc`");
    // Only step 0 reached the cluster.
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dry_run_template_failure() {
    let pipeline = setup_pipeline().await;
    let request = request_for(
        None,
        "dryrun-7-aaaa0003",
        JobMode::DryRun,
        vec![
            op(0, "create_role", json!({"role_name": "readers"})),
            op(1, "create_role", json!({"role_name": "bad name"})),
        ],
    );

    let view = pipeline.run_job(request).await.unwrap();
    assert_eq!(view.status, JobState::Failed);
    assert_eq!(view.steps[0].status, StepState::DryRunOk);
    assert_eq!(view.steps[1].status, StepState::Error);
    assert!(view.steps[1].sql_statement.starts_with("-- TEMPLATE ERROR:"));
}

#[tokio::test]
async fn test_apply_mode_partial_failure() {
    let (addr, hits) = spawn_stub_cluster().await;
    let pipeline = setup_pipeline().await;
    let request = request_for(
        Some(addr),
        "exec-7-bbbb0001",
        JobMode::Apply,
        vec![
            op(0, "create_user", json!({"username": "svc", "password": "pw"})),
            op(
                1,
                "alter_user_password",
                json!({"username": "svc", "password": "pw2"}),
            ),
            op(
                2,
                "grant_role",
                json!({"role_name": "readers", "target_type": "user", "target_name": "svc"}),
            ),
        ],
    );

    let view = pipeline.run_job(request).await.unwrap();
    assert_eq!(view.status, JobState::PartialFailure);
    assert_eq!(view.error.as_deref(), Some("Failed at step(s): [1]"));

    assert_eq!(view.steps[0].status, StepState::Success);
    assert_eq!(view.steps[0].result_message.as_deref(), Some("OK"));
    assert_eq!(view.steps[1].status, StepState::Error);
    assert_eq!(
        view.steps[1].result_message.as_deref(),
        Some("Code: 516. Authentication failed")
    );
    assert_eq!(view.steps[2].status, StepState::Skipped);
    assert_eq!(
        view.steps[2].result_message.as_deref(),
        Some("Skipped due to earlier failure")
    );
    // Steps 0 and 1 hit the cluster; step 2 must not.
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_apply_mode_all_success() {
    let (addr, _) = spawn_stub_cluster().await;
    let pipeline = setup_pipeline().await;
    let request = request_for(
        Some(addr),
        "exec-7-bbbb0002",
        JobMode::Apply,
        vec![op(
            0,
            "grant_privilege",
            json!({"privilege": "SELECT", "database": "analytics", "table": "events",
                   "target_type": "user", "target_name": "readonly_user"}),
        )],
    );

    let view = pipeline.run_job(request).await.unwrap();
    assert_eq!(view.status, JobState::Completed);
    assert!(view.error.is_none());
    assert_eq!(view.steps[0].status, StepState::Success);
    assert_eq!(
        view.steps[0].sql_statement,
        "GRANT SELECT ON `analytics`.`events` TO `readonly_user`"
    );
}

#[tokio::test]
async fn test_resubmission_is_idempotent() {
    let (addr, hits) = spawn_stub_cluster().await;
    let pipeline = setup_pipeline().await;
    let make = || {
        request_for(
            Some(addr),
            "exec-7-cccc0001",
            JobMode::Apply,
            vec![op(0, "create_role", json!({"role_name": "readers"}))],
        )
    };

    let first = pipeline.run_job(make()).await.unwrap();
    let io_after_first = hits.load(Ordering::SeqCst);
    let second = pipeline.run_job(make()).await.unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.steps.len(), first.steps.len());
    assert_eq!(second.status, first.status);
    // No further cluster I/O on the duplicate submission.
    assert_eq!(hits.load(Ordering::SeqCst), io_after_first);
}

#[tokio::test]
async fn test_unreachable_cluster_fails_job() {
    let pipeline = setup_pipeline().await;
    let request = request_for(
        None, // port 1, nothing listening
        "exec-7-dddd0001",
        JobMode::Apply,
        vec![op(0, "create_role", json!({"role_name": "readers"}))],
    );

    let view = pipeline.run_job(request).await.unwrap();
    assert_eq!(view.status, JobState::Failed);
    assert_eq!(view.steps[0].status, StepState::Error);
    assert!(view.steps[0].result_message.is_some());
}

#[tokio::test]
async fn test_undecryptable_secret_rejects_submission() {
    let pipeline = setup_pipeline().await;
    let mut request = request_for(
        None,
        "exec-7-eeee0001",
        JobMode::DryRun,
        vec![op(0, "create_role", json!({"role_name": "r"}))],
    );
    request.cluster_config.password_encrypted = "AAAAAAAAAAAAAAAAAAAAAAAAAAAA".to_string();

    let err = pipeline.run_job(request).await.unwrap_err();
    assert!(err.to_string().contains("decrypt"));
    // Nothing was admitted.
    assert!(pipeline
        .store()
        .find_by_correlation("exec-7-eeee0001")
        .await
        .unwrap()
        .is_none());
}
