use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;

use bbs_common::database::ConnectMode;
use bbs_common::health::HealthRegistry;
use bbs_common::shutdown::{ShutdownReason, ShutdownSignal};
use bbs_common::test_utils::MemoryDatabase;
use bbs_server::handlers::{self, AppState};
use bbs_server::server::{Server, ServerOptions, ServerState};

fn slow_router(delay: Duration) -> Router {
    Router::new().route(
        "/slow",
        get(move || async move {
            tokio::time::sleep(delay).await;
            "done"
        }),
    )
}

async fn start(router: Router, shutdown_timeout: Duration) -> (Arc<Server>, ShutdownSignal) {
    let server = Arc::new(Server::new(
        ServerOptions {
            addr: "127.0.0.1:0".to_owned(),
            shutdown_timeout,
        },
        router,
    ));
    let shutdown = ShutdownSignal::new();
    {
        let server = server.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { server.run(&shutdown).await });
    }
    assert!(server.has_started().await);
    (server, shutdown)
}

fn sigterm() -> ShutdownReason {
    ShutdownReason::Signal("SIGTERM".to_owned())
}

#[tokio::test]
async fn in_flight_requests_finish_within_the_deadline() {
    let (server, shutdown) = start(
        slow_router(Duration::from_millis(300)),
        Duration::from_secs(5),
    )
    .await;
    let url = format!("http://{}/slow", server.local_addr().unwrap());

    let request = tokio::spawn(async move { reqwest::get(url).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.trigger(sigterm());

    let response = request.await.unwrap().unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "done");

    tokio::time::timeout(Duration::from_secs(2), server.has_stopped())
        .await
        .expect("server did not stop");
    assert_eq!(server.state(), ServerState::Stopped);
}

#[tokio::test]
async fn requests_past_the_deadline_are_closed() {
    let (server, shutdown) = start(
        slow_router(Duration::from_secs(30)),
        Duration::from_millis(200),
    )
    .await;
    let url = format!("http://{}/slow", server.local_addr().unwrap());

    let request = tokio::spawn(async move { reqwest::get(url).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.trigger(sigterm());

    tokio::time::timeout(Duration::from_secs(2), server.has_stopped())
        .await
        .expect("server did not force close");
    assert!(request.await.unwrap().is_err());
}

#[tokio::test]
async fn not_ready_until_the_store_connects() {
    let db = Arc::new(
        MemoryDatabase::new(ConnectMode::Supervised).with_probe_delay(Duration::from_secs(30)),
    );
    let shutdown = ShutdownSignal::new();
    let router = handlers::router(AppState::new(
        db.clone(),
        HealthRegistry::new("liveness"),
        shutdown.clone(),
    ));
    let (server, server_shutdown) = start(router, Duration::from_secs(1)).await;

    let connecting = {
        let db = db.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            use bbs_common::database::Database;
            db.connect(&shutdown).await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let url = format!("http://{}/_readiness", server.local_addr().unwrap());
    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    shutdown.trigger(sigterm());
    server_shutdown.trigger(sigterm());
    assert!(connecting.await.unwrap().unwrap_err().is_cancelled());
}
