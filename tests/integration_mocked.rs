/// Integration tests with mocked external APIs
/// Drives the complete relay (Firestore lookup, OAuth, Google Ads REST)
/// against wiremock servers instead of Google endpoints.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tentacles_connector::config_store::{ConfigStore, FirestoreConfigStore, TokenSource};
use tentacles_connector::dispatcher::{DispatchOutcome, Dispatcher, HandlerRegistry};
use tentacles_connector::errors::AppError;
use tentacles_connector::google_ads_client::{
    AdsClientFactory, GoogleAdsClientFactory, UserListService,
};
use tentacles_connector::google_ads_models::{AdsCredentials, MemberRecord, UserListSummary};
use tentacles_connector::pubsub_models::PubsubMessage;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONFIG_PATH: &str =
    "/v1/projects/test-project/databases/(default)/documents/tentacles/ApiConfig/AC/default";
const CUSTOMER_PATH: &str = "/v17/customers/1234567890";

fn firestore_store(uri: &str) -> FirestoreConfigStore {
    FirestoreConfigStore::new(
        uri.to_string(),
        "test-project".to_string(),
        "(default)".to_string(),
        TokenSource::Static("owner".to_string()),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn ads_factory(uri: &str) -> GoogleAdsClientFactory {
    GoogleAdsClientFactory::new(
        uri.to_string(),
        "v17".to_string(),
        format!("{}/token", uri),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn firestore_document() -> Value {
    json!({
        "name": "projects/test-project/databases/(default)/documents/tentacles/ApiConfig/AC/default",
        "fields": {
            "clientCustomerId": {"stringValue": "123-456-7890"},
            "developerToken": {"stringValue": "dev-token"},
            "clientId": {"stringValue": "client-id"},
            "clientSecret": {"stringValue": "client-secret"},
            "refreshToken": {"stringValue": "refresh-token"},
            "userListName": {"stringValue": "TestList"}
        }
    })
}

fn message(body: &str, api: &str) -> PubsubMessage {
    PubsubMessage::new(
        body.as_bytes(),
        HashMap::from([
            ("api".to_string(), api.to_string()),
            ("config".to_string(), "default".to_string()),
        ]),
        "1234",
    )
}

async fn mount_firestore(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .and(header("authorization", "Bearer owner"))
        .respond_with(ResponseTemplate::new(200).set_body_json(firestore_document()))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_oauth(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.test",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_member_upload(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("{}/offlineUserDataJobs:create", CUSTOMER_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resourceName": "customers/1234567890/offlineUserDataJobs/555"
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!(
            "{}/offlineUserDataJobs/555:addOperations",
            CUSTOMER_PATH
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{}/offlineUserDataJobs/555:run", CUSTOMER_PATH)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"name": "customers/1234567890/operations/1"})),
        )
        .expect(1)
        .mount(server)
        .await;
}

/// Bodies of all requests received on `path_suffix`.
async fn request_bodies(server: &MockServer, path_suffix: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path().ends_with(path_suffix))
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_new_list_is_created_then_members_added() {
    let server = MockServer::start().await;
    mount_firestore(&server).await;
    mount_oauth(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("{}/googleAds:search", CUSTOMER_PATH)))
        .and(header("authorization", "Bearer ya29.test"))
        .and(header("developer-token", "dev-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{}/userLists:mutate", CUSTOMER_PATH)))
        .and(body_partial_json(json!({
            "operations": [{
                "create": {
                    "name": "TestList",
                    "membershipLifeSpan": "10000",
                    "crmBasedUserList": {"uploadKeyType": "CONTACT_INFO"}
                }
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"resourceName": "customers/1234567890/userLists/777"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    mount_member_upload(&server).await;

    let dispatcher = Dispatcher::new(
        Arc::new(firestore_store(&server.uri())),
        HandlerRegistry::with_defaults(Arc::new(ads_factory(&server.uri()))),
    );

    let body = "{\"hashedEmail\":\"abc123\"}\n{\"hashedEmail\":\"def456\"}";
    let outcome = dispatcher.dispatch(&message(body, "AC")).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Handled);

    let search = request_bodies(&server, "googleAds:search").await;
    assert_eq!(
        search[0]["query"],
        "SELECT user_list.id, user_list.name FROM user_list WHERE user_list.name = 'TestList'"
    );

    let job = request_bodies(&server, "offlineUserDataJobs:create").await;
    assert_eq!(
        job[0]["job"]["customerMatchUserListMetadata"]["userList"],
        "customers/1234567890/userLists/777"
    );

    let adds = request_bodies(&server, ":addOperations").await;
    assert_eq!(adds.len(), 1);
    assert_eq!(
        adds[0]["operations"],
        json!([
            {"create": {"userIdentifiers": [{"hashedEmail": "abc123"}]}},
            {"create": {"userIdentifiers": [{"hashedEmail": "def456"}]}}
        ])
    );
}

#[tokio::test]
async fn test_existing_list_is_not_recreated() {
    let server = MockServer::start().await;
    mount_firestore(&server).await;
    mount_oauth(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("{}/googleAds:search", CUSTOMER_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"userList": {"resourceName": "customers/1234567890/userLists/42", "id": "42", "name": "TestList"}},
                {"userList": {"resourceName": "customers/1234567890/userLists/43", "id": "43", "name": "TestList"}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{}/userLists:mutate", CUSTOMER_PATH)))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    mount_member_upload(&server).await;

    let dispatcher = Dispatcher::new(
        Arc::new(firestore_store(&server.uri())),
        HandlerRegistry::with_defaults(Arc::new(ads_factory(&server.uri()))),
    );

    dispatcher
        .dispatch(&message("{\"hashedEmail\":\"abc123\"}", "AC"))
        .await
        .unwrap();

    let job = request_bodies(&server, "offlineUserDataJobs:create").await;
    assert_eq!(
        job[0]["job"]["customerMatchUserListMetadata"]["userList"],
        "customers/1234567890/userLists/42"
    );
}

#[tokio::test]
async fn test_search_follows_page_tokens() {
    let server = MockServer::start().await;
    mount_oauth(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("{}/googleAds:search", CUSTOMER_PATH)))
        .and(body_partial_json(json!({"pageToken": "page-2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"userList": {"id": "2", "name": "TestList"}}]
        })))
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{}/googleAds:search", CUSTOMER_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"userList": {"resourceName": "customers/1234567890/userLists/1", "name": "TestList"}}],
            "nextPageToken": "page-2"
        })))
        .with_priority(2)
        .mount(&server)
        .await;

    let credentials = AdsCredentials::new(
        "1234567890",
        "dev-token",
        "client-id",
        "client-secret",
        "refresh-token",
    );
    let service = ads_factory(&server.uri())
        .connect(&credentials)
        .await
        .unwrap();

    let lists = service.get_by_name("TestList").await.unwrap();
    let ids: Vec<&str> = lists.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
}

#[tokio::test]
async fn test_login_customer_id_header_sent() {
    let server = MockServer::start().await;
    mount_oauth(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("{}/googleAds:search", CUSTOMER_PATH)))
        .and(header("login-customer-id", "1112223333"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = AdsCredentials::new(
        "123-456-7890",
        "dev-token",
        "client-id",
        "client-secret",
        "refresh-token",
    )
    .with_login_customer_id(Some("111-222-3333".to_string()));

    let service = ads_factory(&server.uri())
        .connect(&credentials)
        .await
        .unwrap();
    assert!(service.get_by_name("TestList").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_add_members_reports_upload_job() {
    let server = MockServer::start().await;
    mount_oauth(&server).await;
    mount_member_upload(&server).await;

    let credentials = AdsCredentials::new(
        "123-456-7890",
        "dev-token",
        "client-id",
        "client-secret",
        "refresh-token",
    );
    let service = ads_factory(&server.uri())
        .connect(&credentials)
        .await
        .unwrap();

    let list = UserListSummary {
        id: "777".to_string(),
        name: "TestList".to_string(),
    };
    let member = MemberRecord {
        hashed_email: Some("abc123".to_string()),
        ..Default::default()
    };

    let result = service.add_members(&list, &[member]).await.unwrap();
    assert_eq!(result.user_list_id, "777");
    assert_eq!(result.member_count, 1);
    assert_eq!(
        result.job_resource_name.as_deref(),
        Some("customers/1234567890/offlineUserDataJobs/555")
    );
}

#[tokio::test]
async fn test_rejected_refresh_token_is_unauthorized() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .mount(&server)
        .await;

    let credentials = AdsCredentials::new("1", "dev", "id", "secret", "revoked");
    let result = ads_factory(&server.uri()).connect(&credentials).await;

    match result {
        Err(AppError::Unauthorized(msg)) => assert!(msg.contains("invalid_grant")),
        Err(other) => panic!("expected Unauthorized, got {}", other),
        Ok(_) => panic!("expected Unauthorized, got a client"),
    }
}

#[tokio::test]
async fn test_ads_api_error_propagates() {
    let server = MockServer::start().await;
    mount_firestore(&server).await;
    mount_oauth(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("{}/googleAds:search", CUSTOMER_PATH)))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "status": "PERMISSION_DENIED"}
        })))
        .mount(&server)
        .await;

    let dispatcher = Dispatcher::new(
        Arc::new(firestore_store(&server.uri())),
        HandlerRegistry::with_defaults(Arc::new(ads_factory(&server.uri()))),
    );

    let err = dispatcher
        .dispatch(&message("{\"hashedEmail\":\"abc123\"}", "AC"))
        .await
        .unwrap_err();
    assert!(matches!(err.root(), AppError::ExternalApiError(m) if m.contains("PERMISSION_DENIED")));
}

#[tokio::test]
async fn test_missing_config_document_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "status": "NOT_FOUND"}
        })))
        .mount(&server)
        .await;

    let result = firestore_store(&server.uri())
        .fetch("AC", "default")
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_firestore_error_propagates() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let result = firestore_store(&server.uri()).fetch("AC", "default").await;
    assert!(matches!(result, Err(AppError::ExternalApiError(_))));
}

#[tokio::test]
async fn test_metadata_token_source() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/computeMetadata/v1/instance/service-accounts/default/token"))
        .and(header("metadata-flavor", "Google"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "metadata-token",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .and(header("authorization", "Bearer metadata-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(firestore_document()))
        .expect(1)
        .mount(&server)
        .await;

    let store = FirestoreConfigStore::new(
        server.uri(),
        "test-project".to_string(),
        "(default)".to_string(),
        TokenSource::Metadata {
            url: format!(
                "{}/computeMetadata/v1/instance/service-accounts/default/token",
                server.uri()
            ),
        },
        Duration::from_secs(5),
    )
    .unwrap();

    let document = store.fetch("AC", "default").await.unwrap().unwrap();
    assert_eq!(document.into_value()["userListName"], "TestList");
}
