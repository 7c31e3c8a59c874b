//! End-to-end alignment passes against in-memory and HTTP runner services.
//!
//! Run with:
//!   cargo test -p fleet-control --test alignment_pass

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleet_control::{ControlConfig, ControlError, PoolAligner, PoolPolicy, PoolTarget};
use fleet_core::{PoolId, ProviderStatus, Runner, RunnerId, RunnerName, ServiceStatus};
use fleet_session::{
    CallContext, HttpRunnerService, MockRunnerService, ServiceError, SessionConfig, SessionManager,
};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const POOL: &str = "pool-a";

fn pool_id() -> PoolId {
    PoolId::new(POOL).unwrap()
}

fn name(value: &str) -> RunnerName {
    RunnerName::new(value).unwrap()
}

fn runner(
    runner_name: &str,
    provider: ProviderStatus,
    service: ServiceStatus,
    idle_for: chrono::Duration,
) -> Runner {
    Runner {
        id: RunnerId::new(format!("id-{runner_name}")).unwrap(),
        name: name(runner_name),
        pool_id: Some(pool_id()),
        provider_status: provider,
        service_status: service,
        updated_at: Utc::now() - idle_for,
    }
}

fn old_idle(runner_name: &str) -> Runner {
    runner(
        runner_name,
        ProviderStatus::Running,
        ServiceStatus::Idle,
        chrono::Duration::hours(2),
    )
}

fn target(min_idle: u32) -> PoolTarget {
    PoolTarget {
        pool_id: pool_id(),
        policy: PoolPolicy::new(min_idle, Duration::from_secs(600)),
    }
}

fn mock_aligner(mock: &Arc<MockRunnerService>) -> PoolAligner<Arc<MockRunnerService>> {
    let session = SessionManager::new(
        Arc::clone(mock),
        SessionConfig::new("http://runner-service.test", "admin", "s3cret"),
    );
    PoolAligner::new(
        Arc::new(session),
        ControlConfig {
            pools: vec![target(1)],
            ..ControlConfig::default()
        },
    )
}

// =============================================================================
// In-memory runner service
// =============================================================================

#[tokio::test]
async fn mixed_pool_converges_to_policy() {
    let mock = Arc::new(MockRunnerService::new());
    mock.set_pool(
        pool_id(),
        vec![
            old_idle("r-1"),
            runner(
                "r-busy",
                ProviderStatus::Running,
                ServiceStatus::Active,
                chrono::Duration::hours(2),
            ),
            runner(
                "r-fresh",
                ProviderStatus::Running,
                ServiceStatus::Idle,
                chrono::Duration::seconds(30),
            ),
            runner(
                "r-provisioning",
                ProviderStatus::PendingCreate,
                ServiceStatus::Idle,
                chrono::Duration::hours(2),
            ),
            old_idle("r-2"),
            old_idle("r-3"),
        ],
    );
    let aligner = mock_aligner(&mock);

    let outcome = aligner
        .align_pool(&CallContext::new(), &target(1))
        .await
        .unwrap();

    assert_eq!(outcome.observed, 6);
    assert_eq!(outcome.idle, 5);
    assert_eq!(outcome.candidates, 3);
    assert!(outcome.report.is_complete());
    assert_eq!(outcome.report.deleted, vec![name("r-1"), name("r-2")]);

    let remaining: Vec<_> = mock
        .pool_runners(&pool_id())
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(
        remaining,
        vec![name("r-busy"), name("r-fresh"), name("r-provisioning"), name("r-3")]
    );

    // A second pass finds nothing more to do.
    let again = aligner
        .align_pool(&CallContext::new(), &target(1))
        .await
        .unwrap();
    assert_eq!(again.report.attempted(), 0);
}

#[tokio::test]
async fn partial_failure_is_reported_per_runner() {
    let mock = Arc::new(MockRunnerService::new());
    mock.set_pool(
        pool_id(),
        vec![old_idle("r-1"), old_idle("r-2"), old_idle("r-3"), old_idle("r-4")],
    );
    mock.fail_delete(name("r-2"), ServiceError::status(409, "instance is busy"));
    let aligner = mock_aligner(&mock);

    let outcome = aligner
        .align_pool(&CallContext::new(), &target(1))
        .await
        .unwrap();

    assert!(!outcome.report.is_complete());
    assert_eq!(outcome.report.deleted, vec![name("r-1"), name("r-3")]);
    assert_eq!(outcome.report.failed.len(), 1);
    assert_eq!(outcome.report.failed[0].runner, name("r-2"));
    assert!(!outcome.report.failed[0].error.is_retriable());
}

#[tokio::test]
async fn pass_without_login_fails_as_a_whole() {
    let mock = Arc::new(MockRunnerService::new());
    mock.set_pool(pool_id(), vec![old_idle("r-1"), old_idle("r-2")]);
    mock.set_login_failure(Some(ServiceError::Authentication(
        "invalid credentials".into(),
    )));
    let aligner = mock_aligner(&mock);

    let err = aligner
        .align_pool(&CallContext::new(), &target(0))
        .await
        .unwrap_err();

    assert!(err.is_authentication());
    assert!(matches!(
        err,
        ControlError::Snapshot {
            source: ServiceError::Authentication(_),
            ..
        }
    ));
    assert_eq!(mock.list_calls(), 0);
    assert_eq!(mock.pool_runners(&pool_id()).len(), 2);
}

#[tokio::test]
async fn token_expiry_mid_pass_is_absorbed() {
    let mock = Arc::new(MockRunnerService::new());
    mock.set_pool(
        pool_id(),
        vec![old_idle("r-1"), old_idle("r-2"), old_idle("r-3")],
    );
    let aligner = mock_aligner(&mock);
    let ctx = CallContext::new();

    // Log in and leave the pool alone on the first pass.
    aligner.align_pool(&ctx, &target(3)).await.unwrap();
    assert_eq!(mock.login_calls(), 1);

    mock.expire_tokens();
    let outcome = aligner.align_pool(&ctx, &target(1)).await.unwrap();

    assert!(outcome.report.is_complete());
    assert_eq!(outcome.report.deleted, vec![name("r-1"), name("r-2")]);
    assert_eq!(mock.login_calls(), 2);
    assert_eq!(aligner.session().generation(), 2);
}

// =============================================================================
// HTTP runner service
// =============================================================================

fn instance_json(runner_name: &str, status: &str, runner_status: &str) -> serde_json::Value {
    json!({
        "id": format!("id-{runner_name}"),
        "name": runner_name,
        "pool_id": POOL,
        "status": status,
        "runner_status": runner_status,
        "updated_at": "2024-05-01T12:00:00Z",
    })
}

#[tokio::test]
async fn http_pass_logs_in_lists_and_deletes() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/first-run"))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "tok-1" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/api/v1/pools/{POOL}/instances")))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            instance_json("r-1", "running", "idle"),
            instance_json("r-2", "running", "active"),
            instance_json("r-3", "error", "idle"),
            instance_json("r-4", "deleting", "idle"),
            instance_json("r-5", "running", "idle"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/api/v1/instances/r-1"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/api/v1/instances/r-3"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "Not Found",
            "details": "instance not found",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = SessionConfig::new(server.uri(), "admin", "s3cret");
    let client = HttpRunnerService::new(config.clone()).unwrap();
    let session = Arc::new(SessionManager::new(client, config));
    let aligner = PoolAligner::new(session, ControlConfig::default());

    let outcome = aligner
        .align_pool(&CallContext::new(), &target(1))
        .await
        .unwrap();

    assert_eq!(outcome.observed, 5);
    assert_eq!(outcome.idle, 4);
    assert_eq!(outcome.candidates, 3);
    assert_eq!(outcome.report.deleted, vec![name("r-1"), name("r-3")]);
    assert!(outcome.report.is_complete());
}

#[tokio::test]
async fn http_rejected_token_triggers_one_relogin() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/first-run"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "tok-1" })))
        .expect(2)
        .mount(&server)
        .await;

    // The first list is rejected; the retry after login succeeds.
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/pools/{POOL}/instances")))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/api/v1/pools/{POOL}/instances")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            instance_json("r-1", "running", "idle"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = SessionConfig::new(server.uri(), "admin", "s3cret");
    let client = HttpRunnerService::new(config.clone()).unwrap();
    let session = Arc::new(SessionManager::new(client, config));
    let aligner = PoolAligner::new(session, ControlConfig::default());

    let outcome = aligner
        .align_pool(&CallContext::new(), &target(1))
        .await
        .unwrap();

    assert_eq!(outcome.observed, 1);
    assert_eq!(outcome.report.attempted(), 0);
}
