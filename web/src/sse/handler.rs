use crate::extractors::authenticated_user::AuthenticatedUser;
use crate::{AppState, Error};
use async_stream::stream;
use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONNECTION};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use log::*;
use std::convert::Infallible;

/// GET a live stream of status updates for a test run
#[utoipa::path(
    get,
    path = "/status-stream/{test_id}",
    params(
        ("test_id" = String, Path, description = "Test run to follow"),
    ),
    responses(
        (status = 200, description = "Server-Sent Events: `status` events carrying the compute service's JSON, a final `error` event if the subscription fails", content_type = "text/event-stream", body = String),
        (status = 400, description = "Blank test id"),
        (status = 401, description = "Unauthorized"),
    ),
    security(
        ("bearer_auth" = []),
        ("cookie_auth" = [])
    )
)]
pub(crate) async fn status_stream(
    AuthenticatedUser(user): AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let mut relay = app_state.relay_manager_ref().open_relay(&test_id)?;
    info!(
        "User {} following test {test_id} on relay {}",
        user.sub,
        relay.id()
    );

    // Ends when the relay closes the stream. If the client leaves first, axum drops this
    // stream and with it the relay handle, which tears the relay session down.
    let stream = stream! {
        while let Some(frame) = relay.recv().await {
            yield Ok::<Event, Infallible>(frame.into_event());
        }
        debug!("Relay {} closed its stream", relay.id());
    };

    let keep_alive = KeepAlive::new()
        .interval(app_state.config.sse_keep_alive_interval())
        .text("ping");

    Ok((
        [
            (CACHE_CONTROL, "no-cache, no-transform"),
            (CONNECTION, "keep-alive"),
        ],
        Sse::new(stream).keep_alive(keep_alive),
    ))
}

#[cfg(test)]
mod tests {
    use crate::router::define_routes;
    use crate::AppState;
    use axum::body::{Body, BodyDataStream};
    use axum::http::{Request, StatusCode};
    use chrono::Duration;
    use futures::StreamExt;
    use service::config::Config;
    use sse::pubsub::memory::{Failures, MemoryBroker};
    use sse::Manager;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app_state(broker: &MemoryBroker) -> AppState {
        let config = Config::default().set_session_secret("stream-secret".to_string());
        let manager = Arc::new(Manager::new(
            Arc::new(broker.clone()),
            config.relay_settings(),
        ));
        AppState::new(config, &manager)
    }

    fn request(app_state: &AppState, uri: &str) -> Request<Body> {
        let token = domain::jwt::issue_session_token(
            &app_state.config,
            "user-1",
            None,
            Duration::hours(1),
        )
        .unwrap();
        Request::builder()
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn wait_for_subscribers(broker: &MemoryBroker, expected: usize) {
        for _ in 0..1_000 {
            if broker.active_subscriptions() == expected {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        panic!("expected {expected} active subscriptions");
    }

    /// Reads body chunks until `needle` shows up and returns everything read.
    async fn read_until(body: &mut BodyDataStream, needle: &str) -> String {
        let mut seen = String::new();
        while !seen.contains(needle) {
            let chunk = tokio::time::timeout(std::time::Duration::from_secs(5), body.next())
                .await
                .expect("timed out waiting for stream data")
                .expect("stream ended early")
                .unwrap();
            seen.push_str(std::str::from_utf8(&chunk).unwrap());
        }
        seen
    }

    #[tokio::test]
    async fn stream_starts_with_ping_and_forwards_status_events() {
        let broker = MemoryBroker::new();
        let app_state = app_state(&broker);
        let response = define_routes(app_state.clone())
            .oneshot(request(&app_state, "/status-stream/t-42"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["content-type"], "text/event-stream");
        assert_eq!(headers["cache-control"], "no-cache, no-transform");
        assert_eq!(headers["connection"], "keep-alive");

        let mut body = response.into_body().into_data_stream();
        assert!(read_until(&mut body, ": ping").await.starts_with(": ping\n"));

        wait_for_subscribers(&broker, 1).await;
        broker.publish("test_status:t-42", r#"{"status":"running","progress":40}"#);
        broker.publish("test_status:t-43", r#"{"status":"queued"}"#);
        broker.publish("test_status:t-42", r#"{"status":"completed","progress":100}"#);

        let seen = read_until(&mut body, "completed").await;
        let running = seen
            .find("event: status\ndata: {\"status\":\"running\",\"progress\":40}\n\n")
            .expect("running event");
        let completed = seen
            .find("event: status\ndata: {\"status\":\"completed\",\"progress\":100}\n\n")
            .expect("completed event");
        assert!(running < completed);
        assert!(!seen.contains("queued"));
    }

    #[tokio::test]
    async fn carriage_returns_in_status_body_arrive_as_line_feeds() {
        let broker = MemoryBroker::new();
        let app_state = app_state(&broker);
        let response = define_routes(app_state.clone())
            .oneshot(request(&app_state, "/status-stream/t-crlf"))
            .await
            .unwrap();
        let mut body = response.into_body().into_data_stream();
        read_until(&mut body, ": ping").await;
        wait_for_subscribers(&broker, 1).await;

        broker.publish("test_status:t-crlf", "{\"status\":\r\n\"running\"}\rend");

        let seen = read_until(&mut body, "data: end\n\n").await;
        assert!(seen.contains(
            "event: status\ndata: {\"status\":\ndata: \"running\"}\ndata: end\n\n"
        ));
        assert!(!seen.contains('\r'));
    }

    #[tokio::test]
    async fn dropping_the_response_releases_the_subscription() {
        let broker = MemoryBroker::new();
        let app_state = app_state(&broker);
        let response = define_routes(app_state.clone())
            .oneshot(request(&app_state, "/status-stream/t-1"))
            .await
            .unwrap();
        let mut body = response.into_body().into_data_stream();
        read_until(&mut body, ": ping").await;
        wait_for_subscribers(&broker, 1).await;

        drop(body);

        wait_for_subscribers(&broker, 0).await;
        let stats = broker.stats();
        assert_eq!(stats.unsubscribes, 1);
        assert_eq!(stats.closes, 1);
    }

    #[tokio::test]
    async fn failed_subscription_ends_stream_with_error_event() {
        let broker = MemoryBroker::new();
        broker.fail_on(Failures {
            subscribe: true,
            ..Failures::default()
        });
        let app_state = app_state(&broker);
        let response = define_routes(app_state.clone())
            .oneshot(request(&app_state, "/status-stream/t-9"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut body = response.into_body().into_data_stream();
        read_until(
            &mut body,
            "event: error\ndata: {\"error\":\"failed to subscribe to status channel\"}\n\n",
        )
        .await;
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_requires_a_session() {
        let broker = MemoryBroker::new();
        let response = define_routes(app_state(&broker))
            .oneshot(
                Request::builder()
                    .uri("/status-stream/t-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(broker.stats().connects, 0);
    }

    #[tokio::test]
    async fn blank_test_id_is_rejected() {
        let broker = MemoryBroker::new();
        let app_state = app_state(&broker);
        let response = define_routes(app_state.clone())
            .oneshot(request(&app_state, "/status-stream/%20"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(broker.stats().connects, 0);
    }
}
