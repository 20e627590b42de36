use std::collections::HashMap;
use std::time::Duration;

use vision_rest_client::{
    extract_attribute, AssetId, ClientError, Step, TagId, VisionClient, VisionClientConfig,
    Workflow, WorkflowError,
};
use wiremock::matchers::{any, body_string, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CREDENTIALS: &str = r#"<login username="admin" password="secret"/>"#;

const ASSET_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<asset type="generic">
  <property name="name" value="template"/>
</asset>"#;

const TAGS: &str = r#"<tags>
  <tag serialnumber="301B-1021-28815" tagid="105463705742"/>
  <tag serialnumber="301B-1038-33668" tagid="105463710595" assetId="4e0846a81776272b088428d4"/>
</tags>"#;

fn client_for(server: &MockServer) -> VisionClient {
    VisionClient::new(VisionClientConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(5),
        ..Default::default()
    })
    .unwrap()
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(header("X-Vision-REST-Method", "PUT"))
        .and(header("Content-Type", "application/xml"))
        .and(body_string(CREDENTIALS))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "X=Y; Path=/")
                .set_body_string("<user name=\"admin\"/>"),
        )
        .mount(server)
        .await;
}

async fn logged_in(server: &MockServer) -> VisionClient {
    mount_login(server).await;
    let mut client = client_for(server);
    client.login("/login", CREDENTIALS).await.unwrap();
    client
}

#[tokio::test]
async fn login_captures_cookie_pair() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let mut client = client_for(&server);
    let session = client.login("/login", CREDENTIALS).await.unwrap();

    assert_eq!(session.cookie(), "X=Y");
    assert!(client.is_authenticated());
    assert_eq!(client.session(), Some(&session));
}

#[tokio::test]
async fn login_without_cookie_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<ok/>"))
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    let err = client.login("/login", CREDENTIALS).await.unwrap_err();

    assert!(matches!(err, ClientError::Auth(_)), "{err}");
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn rejected_login_reports_status_and_clears_session() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/relogin"))
        .respond_with(ResponseTemplate::new(401).set_body_string("<error reason=\"bad password\"/>"))
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    client.login("/login", CREDENTIALS).await.unwrap();
    let err = client.login("/relogin", CREDENTIALS).await.unwrap_err();

    match err {
        ClientError::Request { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("bad password"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn unauthenticated_request_never_reaches_server() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);

    assert!(matches!(client.get("/tags").await, Err(ClientError::Auth(_))));
    assert!(matches!(
        client.post("/assets", "<asset/>").await,
        Err(ClientError::Auth(_))
    ));
}

#[tokio::test]
async fn authenticated_get_sends_cookie() {
    let server = MockServer::start().await;
    let client = logged_in(&server).await;
    Mock::given(method("GET"))
        .and(path("/tags"))
        .and(header("Cookie", "X=Y"))
        .and(header("Content-Type", "application/xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TAGS))
        .expect(1)
        .mount(&server)
        .await;

    let body = client.list_tags().await.unwrap();
    assert_eq!(body, TAGS);
}

#[tokio::test]
async fn put_travels_as_post_with_override() {
    let server = MockServer::start().await;
    let client = logged_in(&server).await;
    Mock::given(method("POST"))
        .and(path("/assetTypes/7"))
        .and(header("X-Vision-REST-Method", "PUT"))
        .and(header("Cookie", "X=Y"))
        .and(body_string("<assetType/>"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<assetType id=\"7\"/>"))
        .expect(1)
        .mount(&server)
        .await;

    let body = client.put("/assetTypes/7", "<assetType/>").await.unwrap();
    assert_eq!(extract_attribute(&body, "assetType", "id").unwrap(), "7");
}

#[tokio::test]
async fn configured_referer_is_sent() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    let config = VisionClientConfig {
        base_url: server.uri(),
        ..Default::default()
    }
    .with_console_referer();
    let referer = config.referer.clone().unwrap();
    Mock::given(method("GET"))
        .and(path("/eventRules"))
        .and(header("Referer", referer.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string("<eventRules/>"))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = VisionClient::new(config).unwrap();
    client.login("/login", CREDENTIALS).await.unwrap();
    assert_eq!(client.list_event_rules().await.unwrap(), "<eventRules/>");
}

#[tokio::test]
async fn server_error_carries_status_and_body() {
    let server = MockServer::start().await;
    let client = logged_in(&server).await;
    Mock::given(method("POST"))
        .and(path("/eventRules"))
        .respond_with(ResponseTemplate::new(500).set_body_string("rule store unavailable"))
        .mount(&server)
        .await;

    let err = client.create_event_rule("<rule/>").await.unwrap_err();
    match err {
        ClientError::Request { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "rule store unavailable");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn connection_failure_is_transport_error() {
    let mut client = VisionClient::new(VisionClientConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        timeout: Duration::from_secs(2),
        ..Default::default()
    })
    .unwrap();

    let err = client.login("/login", CREDENTIALS).await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)), "{err}");
}

#[tokio::test]
async fn search_without_match_is_parse_error() {
    let server = MockServer::start().await;
    let client = logged_in(&server).await;
    Mock::given(method("POST"))
        .and(path("/tags/search"))
        .and(body_string(r#"<search text="missing"/>"#))
        .respond_with(ResponseTemplate::new(200).set_body_string("<tags/>"))
        .mount(&server)
        .await;

    let err = client.search_tag("missing").await.unwrap_err();
    assert!(matches!(err, ClientError::Parse(_)), "{err}");
}

#[tokio::test]
async fn create_asset_then_bind_tag() {
    let server = MockServer::start().await;
    let client = logged_in(&server).await;
    Mock::given(method("POST"))
        .and(path("/assets"))
        .and(header("Cookie", "X=Y"))
        .and(body_string_contains(r#"value="morebadass0""#))
        .respond_with(
            ResponseTemplate::new(201).set_body_string(r#"<asset id="4e451c0638fa582c9c6654cf"/>"#),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/assets/4e451c0638fa582c9c6654cf/tag"))
        .and(header("Cookie", "X=Y"))
        .and(body_string(r#"<tag _method="PUT" id="105463710595"/>"#))
        .respond_with(ResponseTemplate::new(200).set_body_string("<ok/>"))
        .expect(1)
        .mount(&server)
        .await;

    let asset = client
        .create_asset(ASSET_TEMPLATE, "morebadass0")
        .await
        .unwrap();
    assert_eq!(asset, AssetId("4e451c0638fa582c9c6654cf".to_string()));

    let tag = TagId("105463710595".to_string());
    assert_eq!(client.bind_tag(&asset, &tag).await.unwrap(), "<ok/>");
}

#[tokio::test]
async fn workflow_binds_free_tag_to_new_asset() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TAGS))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/assets"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"<asset id="a1"/>"#))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tags/search"))
        .and(body_string(r#"<search text="301B-1021-28815"/>"#))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<tags><tag serialnumber="301B-1021-28815" tagid="105463705742"/></tags>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/assets/a1/tag"))
        .and(body_string(r#"<tag _method="PUT" id="105463705742"/>"#))
        .respond_with(ResponseTemplate::new(200).set_body_string("<bound/>"))
        .expect(1)
        .mount(&server)
        .await;

    let workflow: Workflow = serde_json::from_str(
        r#"[
            {"step": "login", "credentials": "post"},
            {"step": "list_free_tags"},
            {"step": "create_asset", "template": "asset", "name": "kasset"},
            {"step": "bind_free_tag", "serial": "301B-1021-28815"}
        ]"#,
    )
    .unwrap();
    let templates = HashMap::from([
        ("post".to_string(), CREDENTIALS.to_string()),
        ("asset".to_string(), ASSET_TEMPLATE.to_string()),
    ]);

    let mut client = client_for(&server);
    let ctx = workflow.run(&mut client, &templates).await.unwrap();

    assert_eq!(ctx.free_tags, Some(vec!["301B-1021-28815".to_string()]));
    assert_eq!(ctx.asset_id, Some(AssetId("a1".to_string())));
    assert_eq!(ctx.tag_id, Some(TagId("105463705742".to_string())));
    assert_eq!(ctx.last_response.as_deref(), Some("<bound/>"));
}

#[tokio::test]
async fn workflow_stops_when_a_value_is_missing() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/eventRules"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let workflow = Workflow::new(vec![
        Step::Login {
            credentials: "post".to_string(),
            path: "/login".to_string(),
        },
        Step::BindTag {
            asset_id: None,
            tag_id: Some("105463710595".to_string()),
        },
        Step::ListRules,
    ]);
    let templates = HashMap::from([("post".to_string(), CREDENTIALS.to_string())]);

    let mut client = client_for(&server);
    let err = workflow.run(&mut client, &templates).await.unwrap_err();

    match err {
        WorkflowError::Step { index, step, source } => {
            assert_eq!(index, 1);
            assert_eq!(step, "bind_tag");
            assert!(matches!(*source, WorkflowError::MissingValue("asset_id")));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn workflow_refuses_bound_serial() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TAGS))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/assets"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"<asset id="a1"/>"#))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tags/search"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let workflow = Workflow::new(vec![
        Step::Login {
            credentials: "post".to_string(),
            path: "/login".to_string(),
        },
        Step::ListFreeTags,
        Step::CreateAsset {
            template: "asset".to_string(),
            name: "kasset".to_string(),
        },
        Step::BindFreeTag {
            serial: "301B-1038-33668".to_string(),
        },
    ]);
    let templates = HashMap::from([
        ("post".to_string(), CREDENTIALS.to_string()),
        ("asset".to_string(), ASSET_TEMPLATE.to_string()),
    ]);

    let mut client = client_for(&server);
    let err = workflow.run(&mut client, &templates).await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Step { source, .. } if matches!(*source, WorkflowError::TagNotFree(_))
    ));
}

#[tokio::test]
async fn workflow_bind_free_tag_needs_a_listing() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/assets"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"<asset id="a1"/>"#))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tags/search"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let workflow = Workflow::new(vec![
        Step::Login {
            credentials: "post".to_string(),
            path: "/login".to_string(),
        },
        Step::CreateAsset {
            template: "asset".to_string(),
            name: "kasset".to_string(),
        },
        Step::BindFreeTag {
            serial: "301B-1021-28815".to_string(),
        },
    ]);
    let templates = HashMap::from([
        ("post".to_string(), CREDENTIALS.to_string()),
        ("asset".to_string(), ASSET_TEMPLATE.to_string()),
    ]);

    let mut client = client_for(&server);
    let err = workflow.run(&mut client, &templates).await.unwrap_err();

    match err {
        WorkflowError::Step { index, step, source } => {
            assert_eq!(index, 2);
            assert_eq!(step, "bind_free_tag");
            assert!(matches!(*source, WorkflowError::MissingValue("free_tags")));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn delete_travels_as_post_with_override() {
    let server = MockServer::start().await;
    let client = logged_in(&server).await;
    Mock::given(method("POST"))
        .and(path("/eventRules/4e4ce7c217763988d2c3dd03"))
        .and(header("X-Vision-REST-Method", "DELETE"))
        .and(header("Cookie", "X=Y"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<deleted/>"))
        .expect(1)
        .mount(&server)
        .await;

    let body = client
        .delete("/eventRules/4e4ce7c217763988d2c3dd03")
        .await
        .unwrap();
    assert_eq!(body, "<deleted/>");
}

#[tokio::test]
async fn user_agent_is_sent_on_authenticated_posts() {
    let server = MockServer::start().await;
    let client = logged_in(&server).await;
    Mock::given(method("POST"))
        .and(path("/assets/tagMessages"))
        .and(header("User-Agent", "Mozilla/4.0"))
        .and(body_string("<message/>"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<ok/>"))
        .expect(1)
        .mount(&server)
        .await;

    let body = client
        .send_message("/assets/tagMessages", "<message/>")
        .await
        .unwrap();
    assert_eq!(body, "<ok/>");
}
