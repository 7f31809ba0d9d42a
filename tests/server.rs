//! Tests against a real listener: request IDs, body limits, graceful shutdown.

use std::net::SocketAddr;
use std::time::Duration;

use switchyard::demo::hono;
use switchyard::{App, Context, ServerConfig};

mod common;

#[tokio::test]
async fn test_serves_demo_over_tcp() {
    let addr: SocketAddr = "127.0.0.1:28381".parse().unwrap();
    let shutdown = common::start_server(hono::app(), hono::config(), addr).await;

    let res = common::client()
        .get(format!("http://{}/", addr))
        .send()
        .await
        .expect("server unreachable");

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-debug"], "Debug message");
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "Hello Hono!");

    shutdown.trigger();
}

#[tokio::test]
async fn test_request_id_round_trip() {
    let addr: SocketAddr = "127.0.0.1:28382".parse().unwrap();
    let app = App::new().get("/id", |ctx: Context| async move {
        ctx.request_id().unwrap_or("-").to_string()
    });
    let shutdown = common::start_server(app, ServerConfig::default(), addr).await;

    let res = common::client()
        .get(format!("http://{}/id", addr))
        .header("x-request-id", "trace-me-123")
        .send()
        .await
        .unwrap();

    assert_eq!(res.headers()["x-request-id"], "trace-me-123");
    assert_eq!(res.text().await.unwrap(), "trace-me-123");

    shutdown.trigger();
}

#[tokio::test]
async fn test_body_limit() {
    let addr: SocketAddr = "127.0.0.1:28383".parse().unwrap();
    let app = App::new().post("/upload", |ctx: Context| async move {
        format!("{} bytes", ctx.body().len())
    });
    let mut config = ServerConfig::default();
    config.listener.max_body_bytes = 16;
    let shutdown = common::start_server(app, config, addr).await;
    let client = common::client();

    let small = client
        .post(format!("http://{}/upload", addr))
        .body("tiny")
        .send()
        .await
        .unwrap();
    assert_eq!(small.text().await.unwrap(), "4 bytes");

    let large = client
        .post(format!("http://{}/upload", addr))
        .body("x".repeat(1024))
        .send()
        .await
        .unwrap();
    assert_eq!(large.status(), 413);

    shutdown.trigger();
}

#[tokio::test]
async fn test_graceful_shutdown_stops_accepting() {
    let addr: SocketAddr = "127.0.0.1:28384".parse().unwrap();
    let shutdown = common::start_server(hono::app(), hono::config(), addr).await;
    let client = common::client();

    let before = client.get(format!("http://{}/say", addr)).send().await;
    assert!(before.is_ok());

    shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let after = client
        .get(format!("http://{}/say", addr))
        .timeout(Duration::from_secs(1))
        .send()
        .await;
    assert!(after.is_err(), "server should refuse connections after shutdown");
}
