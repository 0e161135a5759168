//! Join coordinator: ask an existing member to admit this node.

use common::transport::{self, TransportError};
use common::Member;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pause between attempts while the target is unreachable.
pub const JOIN_BACKOFF: Duration = Duration::from_millis(10);

/// POST `member` to the `/join` route of the node listening on `target`.
///
/// Transport failures are retried every `backoff`, indefinitely. Any HTTP
/// response, whatever its status, ends the loop. The only error is a target
/// address that cannot be encoded.
pub async fn join_cluster(
    client: &reqwest::Client,
    target: &str,
    member: &Member,
    backoff: Duration,
) -> Result<(), TransportError> {
    let url = format!("{}/join", transport::encode(target)?);
    info!(%url, %member, "attempting to join cluster");

    let mut attempts = 0u64;
    loop {
        attempts += 1;
        match client.post(&url).json(member).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    info!(%url, attempts, "joined cluster");
                } else {
                    let body = response.text().await.unwrap_or_default();
                    warn!(%url, %status, body = body.trim(), "join request refused");
                }
                return Ok(());
            }
            Err(e) => {
                debug!(%url, attempts, error = %e, "join target unreachable, retrying");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn invalid_target_is_an_error() {
        let client = reqwest::Client::new();
        let member = Member::new("node1", "http://127.0.0.1:4002");

        let err = join_cluster(&client, "not-an-address", &member, JOIN_BACKOFF)
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn retries_until_target_comes_up() {
        // Reserve a port, then release it so the first attempts fail.
        let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = reserved.local_addr().unwrap();
        drop(reserved);

        let received: Arc<Mutex<Vec<Member>>> = Arc::default();
        let sink = received.clone();
        let app = Router::new().route(
            "/join",
            post(move |Json(member): Json<Member>| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(member);
                }
            }),
        );

        let server = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let listener = TcpListener::bind(addr).await.unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        let client = reqwest::Client::new();
        let member = Member::new("node1", "http://127.0.0.1:4002");
        tokio::time::timeout(
            Duration::from_secs(5),
            join_cluster(&client, &addr.to_string(), &member, JOIN_BACKOFF),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(received.lock().unwrap().clone(), vec![member]);
        server.abort();
    }

    #[tokio::test]
    async fn refused_join_still_ends_the_loop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/join",
            post(|| async { (axum::http::StatusCode::BAD_REQUEST, "not leader\n") }),
        );
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = reqwest::Client::new();
        let member = Member::new("node2", "http://127.0.0.1:4003");
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            join_cluster(&client, &addr.to_string(), &member, JOIN_BACKOFF),
        )
        .await
        .unwrap();

        assert!(result.is_ok());
        server.abort();
    }
}
