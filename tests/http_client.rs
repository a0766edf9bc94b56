//! HttpClient against a mockito server.

use mockito::{Matcher, Server};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use rpcall::codec::{Codec, ServerFrame};
use rpcall::{
    ApiError, ApiReturn, ApiSpec, CallOptions, CallOutcome, ClientConfig, ErrorKind, HttpClient,
    ServiceDef, ServiceProto,
};

fn proto() -> ServiceProto {
    ServiceProto::new(vec![
        ServiceDef::api(0, "user/Login"),
        ServiceDef::api(1, "user/Logout").with_path("/v2/logout"),
        ServiceDef::msg(2, "user/Ping"),
    ])
}

#[derive(Serialize)]
struct LoginReq {
    name: String,
    nickname: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
struct LoginRes {
    token: String,
}

struct Login;

impl ApiSpec for Login {
    const NAME: &'static str = "user/Login";
    type Req = LoginReq;
    type Res = LoginRes;
}

fn settled<T>(outcome: CallOutcome<T>) -> ApiReturn<T> {
    outcome.into_return().expect("call was aborted")
}

#[tokio::test]
async fn json_mode_posts_to_api_path_and_prunes_nulls() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/user/Login")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({"name": "alice"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"isSucc":true,"res":{"token":"t-1"}}"#)
        .create_async()
        .await;

    let client = HttpClient::new(proto(), ClientConfig::new(server.url()).json(true)).unwrap();
    let req = LoginReq {
        name: "alice".into(),
        nickname: None,
    };
    let ret = settled(client.call::<Login>(&req, CallOptions::new()).await);

    assert_eq!(
        ret,
        ApiReturn::Succ(LoginRes {
            token: "t-1".into()
        })
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn json_mode_keeps_nulls_when_pruning_disabled() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v2/logout")
        .match_body(Matcher::Json(json!({"reason": null})))
        .with_status(200)
        .with_body(r#"{"isSucc":true}"#)
        .create_async()
        .await;

    let config = ClientConfig::new(server.url()).json(true).json_prune(false);
    let client = HttpClient::new(proto(), config).unwrap();
    let ret = settled(
        client
            .call_api::<_, Value>("user/Logout", &json!({"reason": null}), CallOptions::new())
            .await,
    );
    assert_eq!(ret, ApiReturn::Succ(Value::Null));
    mock.assert_async().await;
}

#[tokio::test]
async fn business_error_is_returned_not_raised() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/user/Login")
        .with_status(200)
        .with_body(r#"{"isSucc":false,"err":{"type":"business","message":"wrong password","code":"BAD_PASS"}}"#)
        .create_async()
        .await;

    let client = HttpClient::new(proto(), ClientConfig::new(server.url()).json(true)).unwrap();
    let ret = settled(
        client
            .call_api::<_, Value>("user/Login", &json!({"name": "bob"}), CallOptions::new())
            .await,
    );
    let err = ret.err().cloned().unwrap();
    assert_eq!(err.kind, ErrorKind::Business);
    assert_eq!(err.message, "wrong password");
    assert_eq!(err.code.as_deref(), Some("BAD_PASS"));
}

#[tokio::test]
async fn bad_gateway_becomes_network_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/user/Login")
        .with_status(502)
        .with_body("<html>Bad Gateway</html>")
        .create_async()
        .await;

    let client = HttpClient::new(proto(), ClientConfig::new(server.url()).json(true)).unwrap();
    let ret = settled(
        client
            .call_api::<_, Value>("user/Login", &json!({}), CallOptions::new())
            .await,
    );
    let err = ret.err().cloned().unwrap();
    assert_eq!(err.kind, ErrorKind::Network);
    assert_eq!(err.code.as_deref(), Some("HTTP_502"));
}

#[tokio::test]
async fn msgpack_mode_posts_frame_to_server_root() {
    let mut server = Server::new_async().await;
    let body = Codec::MsgPack
        .encode(&ServerFrame::response(1, ApiReturn::Succ(json!({"token": "bin"}))))
        .unwrap();
    let mock = server
        .mock("POST", "/")
        .match_header("content-type", "application/msgpack")
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let client = HttpClient::new(proto(), ClientConfig::new(server.url())).unwrap();
    let call = client.call_api::<_, LoginRes>("user/Login", &json!({"name": "c"}), CallOptions::new());
    assert_eq!(call.sn(), 1);
    assert_eq!(
        settled(call.await),
        ApiReturn::Succ(LoginRes {
            token: "bin".into()
        })
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn msgpack_error_frame_keeps_error_kind() {
    let mut server = Server::new_async().await;
    let body = Codec::MsgPack
        .encode(&ServerFrame::response(
            1,
            ApiReturn::Err(ApiError::internal("db down").with_code("DB")),
        ))
        .unwrap();
    server
        .mock("POST", "/")
        .with_status(500)
        .with_body(body)
        .create_async()
        .await;

    let client = HttpClient::new(proto(), ClientConfig::new(server.url())).unwrap();
    let ret = settled(
        client
            .call_api::<_, Value>("user/Login", &json!({}), CallOptions::new())
            .await,
    );
    let err = ret.err().cloned().unwrap();
    assert_eq!(err.kind, ErrorKind::Internal);
    assert_eq!(err.code.as_deref(), Some("DB"));
}

#[tokio::test]
async fn unresponsive_server_times_out() {
    // Accepts connections but never answers.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let config = ClientConfig::new(format!("http://{}", addr)).json(true).timeout_ms(100);
    let client = HttpClient::new(proto(), config).unwrap();
    let ret = settled(
        client
            .call_api::<_, Value>("user/Login", &json!({}), CallOptions::new())
            .await,
    );
    let err = ret.err().cloned().unwrap();
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(err.message, "Request timeout (100ms)");

    // Per-call timeout overrides the configured one.
    let ret = settled(
        client
            .call_api::<_, Value>(
                "user/Login",
                &json!({}),
                CallOptions::new().timeout(Duration::from_millis(30)),
            )
            .await,
    );
    assert_eq!(ret.err().map(|e| e.message.as_str()), Some("Request timeout (30ms)"));
}

#[tokio::test]
async fn refused_connection_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpClient::new(proto(), ClientConfig::new(format!("http://{}", addr)).json(true)).unwrap();
    let ret = settled(
        client
            .call_api::<_, Value>("user/Login", &json!({}), CallOptions::new())
            .await,
    );
    assert_eq!(ret.err().map(|e| e.kind), Some(ErrorKind::Network));
}

#[tokio::test]
async fn send_msg_posts_message_json() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/user/Ping")
        .match_body(Matcher::Json(json!({"at": 1})))
        .with_status(204)
        .create_async()
        .await;

    let client = HttpClient::new(proto(), ClientConfig::new(server.url()).json(true)).unwrap();
    client.send_msg("user/Ping", &json!({"at": 1})).await.unwrap();
    mock.assert_async().await;
}
