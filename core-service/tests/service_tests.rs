//! End-to-end tests through the service façade with the real provider
//! registry and a scripted HTTP transport.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::time::FixedClock;
use core_directory::{
    ApiConnectionConfig, ConnectionStatus, IdentityRepository, ProviderKind, SyncRunRepository,
    SyncRunStatus,
};
use core_runtime::events::{CoreEvent, CorrelationEvent, SyncEvent};
use core_runtime::CoreConfig;
use core_service::{CoreError, CoreService};
use core_sync::SyncError;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

const NOW: i64 = 1_700_000_000;

/// Fake Okta org: two user pages linked through the `Link` header.
#[derive(Default)]
struct FakeOkta {
    requests: Mutex<Vec<HttpRequest>>,
}

#[async_trait]
impl HttpClient for FakeOkta {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let url = request.url.clone();
        self.requests.lock().await.push(request);

        let response = if url.ends_with("/api/v1/users/me") {
            HttpResponse::new(200, json!({"profile": {"email": "svc@corp.example"}}).to_string())
        } else if url.contains("after=page2") {
            HttpResponse::new(
                200,
                json!([
                    {"id": "00u3", "status": "SUSPENDED", "profile": {"email": "carol@corp.example", "firstName": "Carol", "lastName": "Diaz"}}
                ])
                .to_string(),
            )
        } else if url.contains("/api/v1/users?") {
            HttpResponse::new(
                200,
                json!([
                    {"id": "00u1", "status": "ACTIVE", "profile": {"email": "alice@corp.example", "firstName": "Alice", "lastName": "Ng", "department": "Engineering"}},
                    {"id": "00u2", "status": "ACTIVE", "profile": {"email": "bob@corp.example", "firstName": "Bob", "lastName": "Stone"}}
                ])
                .to_string(),
            )
            .with_header(
                "Link",
                r#"<https://corp.okta.test/api/v1/users?after=page2&limit=200>; rel="next""#,
            )
        } else {
            HttpResponse::new(404, "not found")
        };
        Ok(response)
    }
}

async fn service() -> (CoreService, Arc<FakeOkta>) {
    let http = Arc::new(FakeOkta::default());
    let config = CoreConfig::builder()
        .in_memory()
        .http_client(Arc::clone(&http) as Arc<dyn HttpClient>)
        .clock(Arc::new(FixedClock::at_unix(NOW)))
        .build()
        .unwrap();

    (CoreService::new(config).await.unwrap(), http)
}

fn okta_connection() -> ApiConnectionConfig {
    let mut connection = ApiConnectionConfig::new("Okta", ProviderKind::Okta, "https://corp.okta.test", NOW);
    connection.credentials = Some(r#"{"api_token": "00secret"}"#.to_string());
    connection.supports_users = true;
    connection
}

#[tokio::test]
async fn test_okta_sync_through_registry() {
    let (core, http) = service().await;
    let connection = okta_connection();
    core.add_connection(&connection).await.unwrap();

    let report = core.sync_all_connections(false).await.unwrap();

    assert_eq!(report.connections_processed, 1);
    assert_eq!(report.successful, 1);
    assert_eq!(report.users_processed, 3);

    let requests = http.requests.lock().await;
    assert_eq!(requests.len(), 2);
    assert!(requests
        .iter()
        .all(|r| r.headers.get("Authorization").map(String::as_str) == Some("SSWS 00secret")));
    drop(requests);

    let identity = core
        .store()
        .find_identity_by_email("carol@corp.example")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identity.full_name, "Carol Diaz");

    let status = core.get_sync_status().await.unwrap();
    assert_eq!(status.total_connections, 1);
    assert_eq!(status.connected, 1);
    assert_eq!(status.health_percentage, 100.0);
    assert_eq!(status.recent_runs.len(), 1);
    assert_eq!(status.recent_runs[0].status, SyncRunStatus::Success);
}

#[tokio::test]
async fn test_unimplemented_provider_is_reported() {
    let (core, _) = service().await;
    let mut connection = ApiConnectionConfig::new("Falcon", ProviderKind::CrowdStrike, "https://api.crowdstrike.test", NOW);
    connection.supports_devices = true;
    core.add_connection(&connection).await.unwrap();

    let result = core.sync_connection(&connection.id).await.unwrap();

    assert_eq!(result.status, SyncRunStatus::Error);
    assert_eq!(result.error.as_deref(), Some("Connector for CROWDSTRIKE not implemented yet"));

    let stored = core
        .list_connections()
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.id == connection.id)
        .unwrap();
    assert_eq!(stored.status, ConnectionStatus::Error);
}

#[tokio::test]
async fn test_trigger_sync_parses_kind() {
    let (core, _) = service().await;
    let connection = okta_connection();
    core.add_connection(&connection).await.unwrap();

    let err = core.trigger_sync(&connection.id, "nightly").await.unwrap_err();
    assert!(matches!(err, CoreError::Sync(SyncError::InvalidKind(ref kind)) if kind == "nightly"));

    let result = core.trigger_sync(&connection.id, "incremental").await.unwrap();
    let run = core.store().find_sync_run(&result.run_id).await.unwrap().unwrap();
    assert_eq!(run.kind.as_str(), "incremental");
}

#[tokio::test]
async fn test_connection_probe() {
    let (core, _) = service().await;
    let connection = okta_connection();
    core.add_connection(&connection).await.unwrap();

    let result = core.test_connection(&connection.id).await.unwrap();

    assert!(result.success);
    assert_eq!(result.message, "Connected to Okta as svc@corp.example");
}

#[tokio::test]
async fn test_events_and_pushed_records() {
    let (core, _) = service().await;
    let mut events = core.subscribe_events();

    let user = core
        .correlate_user(&json!({"email": "dana@corp.example", "full_name": "Dana Kim"}), "Workday")
        .await
        .unwrap();
    core.correlate_device(&json!({"name": "MBP-7", "owner_email": "dana@corp.example"}), "Jamf")
        .await
        .unwrap();

    let mut identity_created = false;
    let mut owner_inferred = false;
    while let Ok(event) = events.try_recv() {
        match event {
            CoreEvent::Correlation(CorrelationEvent::IdentityCreated { identity_id, .. }) => {
                identity_created = identity_id == user.identity.id;
            }
            CoreEvent::Correlation(CorrelationEvent::OwnerInferred { identity_id, .. }) => {
                owner_inferred = identity_id == user.identity.id;
            }
            CoreEvent::Sync(SyncEvent::Started { .. }) => panic!("no sync was requested"),
            _ => {}
        }
    }

    assert!(identity_created);
    assert!(owner_inferred);

    let report = core.detect_orphaned_resources().await.unwrap();
    assert!(report.devices_without_owner.is_empty());
}

#[tokio::test]
async fn test_scheduler_handle_stops() {
    let (core, _) = service().await;
    let handle = core.start_scheduler();
    handle.stop().await;
}
