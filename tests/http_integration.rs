//! Integration tests for the API client using wiremock
//!
//! These tests verify request dispatch, error translation, cancellation and
//! watch decoding against mocked API server endpoints.

use std::time::Duration;

use kubewire::api::discovery::{ApiGroup, ApiGroupList, ApiResource, ApiResourceList, GroupVersionForDiscovery};
use kubewire::api::meta::{Object, ObjectList, ObjectMeta, Status, TypeMeta, Unknown};
use kubewire::api::watch::{EventType, WireEvent};
use kubewire::codec::{encode_envelope, Codec, ProtobufCodec};
use kubewire::watch::{encode_frame, Framing};
use kubewire::{Client, Credentials, Error, ErrorKind, ListOptions, ValidationError};
use prost::Message;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{any, bearer_token, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROTOBUF: &str = "application/vnd.kubernetes.protobuf";
const TPR_PATH: &str = "/apis/metrics.example.com/v1/namespaces/default/metrics";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Metric {
    #[serde(flatten)]
    type_meta: TypeMeta,
    metadata: Option<ObjectMeta>,
    value: i64,
}

impl Object for Metric {
    fn metadata(&self) -> Option<&ObjectMeta> {
        self.metadata.as_ref()
    }
}

fn metric(name: &str, value: i64) -> Metric {
    Metric {
        type_meta: TypeMeta::new("metrics.example.com/v1", "Metric"),
        metadata: Some(ObjectMeta::named(name)),
        value,
    }
}

fn client(server: &MockServer) -> Client {
    Client::new(&server.uri(), Credentials::token("test-token")).expect("valid endpoint")
}

fn status_body(code: i32, reason: &str, message: &str) -> serde_json::Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
}

/// Test module for discovery requests
mod discovery_tests {
    use super::*;

    /// Test version is fetched as JSON
    #[tokio::test]
    async fn test_version_uses_json() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/version"))
            .and(bearer_token("test-token"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "major": "1",
                "minor": "29",
                "gitVersion": "v1.29.2",
                "platform": "linux/amd64"
            })))
            .mount(&server)
            .await;

        let version = client(&server)
            .discovery()
            .version(&CancellationToken::new())
            .await
            .expect("Request should succeed");

        assert_eq!(version.minor, "29");
        assert_eq!(version.git_version, "v1.29.2");
    }

    /// Test group lists are decoded from protobuf envelopes
    #[tokio::test]
    async fn test_api_groups_uses_protobuf() {
        let server = MockServer::start().await;

        let groups = ApiGroupList {
            groups: vec![ApiGroup {
                name: Some("apps".to_string()),
                versions: vec![GroupVersionForDiscovery {
                    group_version: Some("apps/v1".to_string()),
                    version: Some("v1".to_string()),
                }],
                preferred_version: None,
            }],
        };
        let body = ProtobufCodec.encode(&groups).unwrap();

        Mock::given(method("GET"))
            .and(path("/apis"))
            .and(header("accept", PROTOBUF))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, PROTOBUF))
            .mount(&server)
            .await;

        let decoded = client(&server)
            .discovery()
            .api_groups(&CancellationToken::new())
            .await
            .expect("Request should succeed");

        assert_eq!(decoded, groups);
        assert_eq!(decoded.groups[0].name(), "apps");
    }

    /// Test the core group is served under /api
    #[tokio::test]
    async fn test_api_resources_core_group() {
        let server = MockServer::start().await;

        let list = ApiResourceList {
            group_version: Some("v1".to_string()),
            resources: vec![ApiResource {
                name: Some("pods".to_string()),
                namespaced: Some(true),
                kind: Some("Pod".to_string()),
                ..ApiResource::default()
            }],
        };

        Mock::given(method("GET"))
            .and(path("/api/v1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(ProtobufCodec.encode(&list).unwrap(), PROTOBUF),
            )
            .mount(&server)
            .await;

        let decoded = client(&server)
            .discovery()
            .api_resources(&CancellationToken::new(), "", "v1")
            .await
            .expect("Request should succeed");

        assert_eq!(decoded.resources.len(), 1);
        assert_eq!(decoded.resources[0].kind.as_deref(), Some("Pod"));
    }

    /// Test a JSON body under a protobuf request is a decode error
    #[tokio::test]
    async fn test_wrong_body_format_is_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/apis/apps"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{\"name\":\"apps\"}", PROTOBUF))
            .mount(&server)
            .await;

        let err = client(&server)
            .discovery()
            .api_group(&CancellationToken::new(), "apps")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Decode);
    }
}

/// Test module for third party resource requests
mod third_party_tests {
    use super::*;

    /// Test create POSTs the JSON object to the collection URL
    #[tokio::test]
    async fn test_create_posts_json() {
        let server = MockServer::start().await;
        let foo = metric("foo", 42);

        Mock::given(method("POST"))
            .and(path(TPR_PATH))
            .and(header("content-type", "application/json"))
            .and(body_json(&foo))
            .respond_with(ResponseTemplate::new(201).set_body_json(&foo))
            .expect(1)
            .mount(&server)
            .await;

        let created = client(&server)
            .third_party_resources("metrics.example.com", "v1")
            .create(&CancellationToken::new(), "metrics", "default", &foo)
            .await
            .expect("Request should succeed");

        assert_eq!(created, foo);
    }

    /// Test update PUTs to the named object URL
    #[tokio::test]
    async fn test_update_puts_to_object_url() {
        let server = MockServer::start().await;
        let foo = metric("foo", 43);

        Mock::given(method("PUT"))
            .and(path(format!("{}/foo", TPR_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(&foo))
            .expect(1)
            .mount(&server)
            .await;

        let updated = client(&server)
            .third_party_resources("metrics.example.com", "v1")
            .update(&CancellationToken::new(), "metrics", "default", &foo)
            .await
            .expect("Request should succeed");

        assert_eq!(updated.value, 43);
    }

    /// Test 409 AlreadyExists is reported as a conflict
    #[tokio::test]
    async fn test_create_conflict() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TPR_PATH))
            .respond_with(ResponseTemplate::new(409).set_body_json(status_body(
                409,
                "AlreadyExists",
                "metrics \"foo\" already exists",
            )))
            .mount(&server)
            .await;

        let err = client(&server)
            .third_party_resources("metrics.example.com", "v1")
            .create(&CancellationToken::new(), "metrics", "default", &metric("foo", 1))
            .await
            .unwrap_err();

        match err {
            Error::Api(err) => {
                assert!(err.is_conflict());
                assert_eq!(err.reason.as_deref(), Some("AlreadyExists"));
                assert_eq!(err.status.as_deref(), Some("Failure"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Test 404 response for non-existent resources
    #[tokio::test]
    async fn test_get_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{}/missing", TPR_PATH)))
            .respond_with(ResponseTemplate::new(404).set_body_json(status_body(
                404,
                "NotFound",
                "metrics \"missing\" not found",
            )))
            .mount(&server)
            .await;

        let err = client(&server)
            .third_party_resources("metrics.example.com", "v1")
            .get::<Metric>(&CancellationToken::new(), "metrics", "default", "missing")
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(404));
        assert_eq!(
            err.to_string(),
            "api error 404 (NotFound): metrics \"missing\" not found"
        );
    }

    /// Test a body that is not a Status still yields an API error
    #[tokio::test]
    async fn test_non_status_error_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{}/foo", TPR_PATH)))
            .respond_with(ResponseTemplate::new(502).set_body_string("upstream connect error"))
            .mount(&server)
            .await;

        let err = client(&server)
            .third_party_resources("metrics.example.com", "v1")
            .get::<Metric>(&CancellationToken::new(), "metrics", "default", "foo")
            .await
            .unwrap_err();

        match err {
            Error::Api(err) => {
                assert_eq!(err.code, 502);
                assert_eq!(err.reason, None);
                assert_eq!(err.message, "upstream connect error");
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Test delete succeeds without decoding the body
    #[tokio::test]
    async fn test_delete() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path(format!("{}/foo", TPR_PATH)))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "Status",
                "status": "Success"
            })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .third_party_resources("metrics.example.com", "v1")
            .delete(&CancellationToken::new(), "metrics", "default", "foo")
            .await
            .expect("Request should succeed");
    }

    /// Test list options are sent as query parameters
    #[tokio::test]
    async fn test_list_with_selector() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(TPR_PATH))
            .and(query_param("labelSelector", "app=web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "MetricList",
                "apiVersion": "metrics.example.com/v1",
                "metadata": {"resourceVersion": "1234"},
                "items": [metric("a", 1), metric("b", 2)]
            })))
            .mount(&server)
            .await;

        let options = ListOptions {
            label_selector: Some("app=web".to_string()),
            ..ListOptions::default()
        };
        let list: ObjectList<Metric> = client(&server)
            .third_party_resources("metrics.example.com", "v1")
            .list(&CancellationToken::new(), "metrics", "default", &options)
            .await
            .expect("Request should succeed");

        assert_eq!(list.type_meta.kind.as_deref(), Some("MetricList"));
        assert_eq!(list.metadata.resource_version.as_deref(), Some("1234"));
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.items[1].value, 2);
    }

    /// Test invalid identities are rejected before any request is sent
    #[tokio::test]
    async fn test_validation_happens_before_network() {
        let server = MockServer::start().await;

        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let tpr = client(&server).third_party_resources("metrics.example.com", "v1");
        let ctx = CancellationToken::new();

        let err = tpr.get::<Metric>(&ctx, "metrics", "", "foo").await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::MissingNamespace)));

        let err = tpr.delete(&ctx, "", "default", "foo").await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::MissingResource)));

        let err = tpr
            .watch(&ctx, "metrics", "", &ListOptions::default())
            .await
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let missing_version = client(&server).third_party_resources("metrics.example.com", "");
        let err = missing_version
            .create(&ctx, "metrics", "default", &metric("foo", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::MissingApiVersion)));
    }
}

/// Test module for cancellation and timeouts
mod cancellation_tests {
    use super::*;

    /// Test cancelling the context aborts a slow request promptly
    #[tokio::test]
    async fn test_cancel_in_flight_request() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/version"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"major": "1"}))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let ctx = CancellationToken::new();
        let cancel = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let discovery = client(&server).discovery();
        let result = tokio::time::timeout(Duration::from_secs(5), discovery.version(&ctx))
            .await
            .expect("cancellation should be prompt");

        assert!(matches!(result, Err(Error::Cancelled)));
    }

    /// Test an already cancelled context never reaches the server
    #[tokio::test]
    async fn test_cancelled_before_send() {
        let server = MockServer::start().await;

        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let ctx = CancellationToken::new();
        ctx.cancel();

        let err = client(&server).discovery().api_groups(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    /// Test the configured request timeout surfaces as a transport timeout
    #[tokio::test]
    async fn test_request_timeout() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/version"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"major": "1"}))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let client = client(&server).with_request_timeout(Duration::from_millis(100));
        let err = client
            .discovery()
            .version(&CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::Transport(err) => assert!(err.is_timeout()),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

/// Test module for watch requests
mod watch_tests {
    use super::*;

    fn pod_frame(event_type: EventType, name: &str) -> Vec<u8> {
        let unknown = Unknown {
            type_meta: Some(TypeMeta::new("v1", "Pod")),
            raw: Some(name.as_bytes().to_vec()),
            ..Unknown::default()
        };
        encode_frame(&WireEvent::new(event_type, encode_envelope(&unknown)).encode_to_vec())
    }

    /// Test ADDED/MODIFIED/DELETED pod-a arrive in order, then the stream ends
    #[tokio::test]
    async fn test_binary_watch_yields_events_in_order() {
        let server = MockServer::start().await;

        let mut body = pod_frame(EventType::Added, "pod-a");
        body.extend(pod_frame(EventType::Modified, "pod-a"));
        body.extend(pod_frame(EventType::Deleted, "pod-a"));

        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/default/pods"))
            .and(query_param("watch", "true"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(body, "application/vnd.kubernetes.protobuf;stream=watch"),
            )
            .mount(&server)
            .await;

        let client = client(&server);
        let url = client
            .url_for("", "v1", Some("default"), "pods", None)
            .unwrap();
        let mut watcher = client
            .watch(&CancellationToken::new(), &ProtobufCodec, &url)
            .await
            .expect("watch should open");
        assert_eq!(watcher.framing(), Framing::Binary);

        for expected in [EventType::Added, EventType::Modified, EventType::Deleted] {
            let (event, unknown) = watcher.next().await.expect("event");
            assert_eq!(event.event_type, expected);
            assert_eq!(unknown.raw(), b"pod-a");
            assert_eq!(unknown.kind(), Some("Pod"));
        }
        assert!(watcher.next().await.unwrap_err().is_end_of_stream());
    }

    /// Test the discovery watch decodes API resources
    #[tokio::test]
    async fn test_api_watch_is_typed() {
        let server = MockServer::start().await;

        let resource = ApiResource {
            name: Some("deployments".to_string()),
            kind: Some("Deployment".to_string()),
            namespaced: Some(true),
            ..ApiResource::default()
        };
        let unknown = Unknown {
            raw: Some(resource.encode_to_vec()),
            ..Unknown::default()
        };
        let body = encode_frame(
            &WireEvent::new(EventType::Added, encode_envelope(&unknown)).encode_to_vec(),
        );

        Mock::given(method("GET"))
            .and(path("/apis/apps/v1"))
            .and(query_param("watch", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, PROTOBUF))
            .mount(&server)
            .await;

        let mut watcher = client(&server)
            .discovery()
            .api_watch(&CancellationToken::new(), "apps", "v1")
            .await
            .expect("watch should open");

        let (event_type, decoded) = watcher.next().await.expect("event");
        assert_eq!(event_type, EventType::Added);
        assert_eq!(decoded, resource);
        assert!(watcher.next().await.unwrap_err().is_end_of_stream());
    }

    /// Test a discovery watch answered with JSON fails instead of yielding
    /// undecodable events, while the raw watcher still reads the JSON body
    #[tokio::test]
    async fn test_api_watch_rejects_json_response() {
        let server = MockServer::start().await;

        let body = format!(
            "{}\n",
            json!({"type": "ADDED", "object": {"name": "deployments", "kind": "Deployment"}})
        );
        Mock::given(method("GET"))
            .and(path("/apis/apps/v1"))
            .and(query_param("watch", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
            .mount(&server)
            .await;

        let client = client(&server);
        let err = client
            .discovery()
            .api_watch(&CancellationToken::new(), "apps", "v1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);

        let url = client.url_for_path("/apis/apps/v1").unwrap();
        let mut watcher = client
            .watch(&CancellationToken::new(), &ProtobufCodec, &url)
            .await
            .expect("watch should open");
        assert_eq!(watcher.framing(), Framing::Text);
        let (event, unknown) = watcher.next().await.expect("event");
        assert_eq!(event.event_type, EventType::Added);
        assert_eq!(unknown.kind(), Some("Deployment"));
    }

    /// Test JSON watches of third party resources
    #[tokio::test]
    async fn test_third_party_watch_typed() {
        let server = MockServer::start().await;

        let body = format!(
            "{}\n{}\n{}\n",
            json!({"type": "ADDED", "object": metric("foo", 1)}),
            json!({"type": "ERROR", "object": status_body(410, "Expired", "too old resource version")}),
            json!({"type": "DELETED", "object": metric("foo", 2)}),
        );

        Mock::given(method("GET"))
            .and(path(TPR_PATH))
            .and(query_param("watch", "true"))
            .and(query_param("resourceVersion", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
            .mount(&server)
            .await;

        let options = ListOptions {
            resource_version: Some("10".to_string()),
            ..ListOptions::default()
        };
        let mut watcher = client(&server)
            .third_party_resources("metrics.example.com", "v1")
            .watch_typed::<Metric>(&CancellationToken::new(), "metrics", "default", &options)
            .await
            .expect("watch should open");

        let (event_type, added) = watcher.next().await.expect("event");
        assert_eq!(event_type, EventType::Added);
        assert_eq!(added, metric("foo", 1));

        match watcher.next().await.unwrap_err() {
            Error::Api(err) => {
                assert_eq!(err.code, 410);
                assert_eq!(err.reason.as_deref(), Some("Expired"));
            },
            other => panic!("unexpected error: {other:?}"),
        }

        let (event_type, deleted) = watcher.next().await.expect("event");
        assert_eq!(event_type, EventType::Deleted);
        assert_eq!(deleted.value, 2);
        assert!(watcher.next().await.unwrap_err().is_end_of_stream());
    }

    /// Test a watch that is refused reports the server's Status
    #[tokio::test]
    async fn test_watch_refused() {
        let server = MockServer::start().await;

        let status = Status {
            status: Some("Failure".to_string()),
            message: Some("forbidden".to_string()),
            reason: Some("Forbidden".to_string()),
            code: Some(403),
        };

        Mock::given(method("GET"))
            .and(path("/apis/apps/v1"))
            .respond_with(
                ResponseTemplate::new(403).set_body_raw(ProtobufCodec.encode(&status).unwrap(), PROTOBUF),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .discovery()
            .api_watch(&CancellationToken::new(), "apps", "v1")
            .await
            .map(|_| ())
            .unwrap_err();

        match err {
            Error::Api(err) => {
                assert_eq!(err.code, 403);
                assert_eq!(err.message, "forbidden");
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
