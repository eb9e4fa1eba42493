//! End-to-end proxy tests over real TCP upstreams.

use std::net::SocketAddr;

use axum::http::Method;
use bytes::Bytes;
use stream_relay::config::parse_config;
use stream_relay::conn::{body, Connection, UriParts};
use stream_relay::{ProxyError, ProxyOrchestrator, Settlement};

mod common;

fn connection(method: Method, url: &str) -> Connection {
    Connection::new(method, UriParts::parse(url).unwrap())
}

fn target_for(addr: SocketAddr) -> UriParts {
    UriParts::parse(&format!("http://{}/", addr)).unwrap()
}

#[tokio::test]
async fn socket_backend_streams_a_chunked_response() {
    let backend_addr: SocketAddr = "127.0.0.1:28611".parse().unwrap();
    common::start_streaming_backend(backend_addr, &["hel", "lo"]).await;

    let orchestrator = ProxyOrchestrator::socket();
    let conn = connection(Method::GET, "http://in.example/a?x=1");

    let settled = orchestrator
        .proxy(conn, &target_for(backend_addr))
        .await
        .unwrap();
    let mut conn = match settled {
        Settlement::Resolved(conn) => conn,
        Settlement::Aborted => panic!("unexpected abort"),
    };

    assert_eq!(conn.status, 200);
    assert_eq!(
        conn.response.headers.get("content-type").unwrap(),
        "text/plain"
    );

    let body = conn.response.body.take().unwrap();
    assert_eq!(body.collect().await.unwrap().as_ref(), b"hello");
}

#[tokio::test]
async fn polling_backend_delivers_headers_and_full_body() {
    let backend_addr: SocketAddr = "127.0.0.1:28612".parse().unwrap();
    common::start_streaming_backend(backend_addr, &["hel", "lo"]).await;

    // Backend selection the way an embedding server would do it.
    let config = parse_config(
        &format!(
            r#"
            [upstream]
            url = "http://{}/"

            [transport]
            backend = "polling"
            "#,
            backend_addr
        ),
    )
    .unwrap();
    stream_relay::observability::init_logging(&config.observability);
    let orchestrator = ProxyOrchestrator::from_config(&config);
    let target = UriParts::parse(&config.upstream.url).unwrap();

    let conn = connection(Method::GET, "http://in.example/a?x=1");
    let settled = orchestrator.proxy(conn, &target).await.unwrap();
    let mut conn = settled.into_value().expect("resolved with connection");

    assert_eq!(conn.status, 200);
    let body = conn.response.body.take().unwrap();
    assert_eq!(body.collect().await.unwrap().as_ref(), b"hello");
}

#[tokio::test]
async fn refused_connection_rejects_the_promise() {
    // Nothing listens here.
    let target = UriParts::parse("http://127.0.0.1:28613/").unwrap();

    let orchestrator = ProxyOrchestrator::socket();
    let conn = connection(Method::GET, "http://in.example/a");

    match orchestrator.proxy(conn, &target).await {
        Err(ProxyError::Transport(_)) => {}
        other => panic!("expected transport rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn abort_before_response_resolves_empty() {
    let backend_addr: SocketAddr = "127.0.0.1:28614".parse().unwrap();
    common::start_silent_backend(backend_addr).await;

    let orchestrator = ProxyOrchestrator::socket();
    let conn = connection(Method::GET, "http://in.example/a");

    let promise = orchestrator.proxy(conn, &target_for(backend_addr));
    promise.abort();

    assert!(promise.await.unwrap().is_aborted());
}

#[tokio::test]
async fn request_body_streams_through_to_the_upstream() {
    let backend_addr: SocketAddr = "127.0.0.1:28615".parse().unwrap();
    common::start_echo_backend(backend_addr).await;

    let orchestrator = ProxyOrchestrator::socket();
    let mut conn = connection(Method::POST, "http://in.example/upload");
    conn.request
        .headers
        .insert("content-length", "4".parse().unwrap());

    let (sink, stream) = body::channel(4);
    conn.request.body = Some(stream);
    tokio::spawn(async move {
        sink.write(Bytes::from_static(b"ab")).await.unwrap();
        sink.write(Bytes::from_static(b"cd")).await.unwrap();
        sink.close();
    });

    let settled = orchestrator
        .proxy(conn, &target_for(backend_addr))
        .await
        .unwrap();
    let mut conn = settled.into_value().expect("resolved with connection");

    assert_eq!(conn.status, 200);
    let body = conn.response.body.take().unwrap();
    assert_eq!(body.collect().await.unwrap().as_ref(), b"abcd");
}
