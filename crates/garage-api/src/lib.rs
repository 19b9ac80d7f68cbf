//! Garage door HTTP and WebSocket API
//!
//! Command routes pulse a door actuator and answer `"OK"`; status routes read
//! the sensors. Everything except `/alive` and the WebSocket channel
//! requires a bearer token.

pub mod auth;
mod websocket;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use garage_bus::NotificationBus;
use garage_core::{DoorId, DoorState};
use garage_doors::{Ack, ActuatorError, GarageController};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub use auth::{AuthError, AuthSetupError, TokenVerifier};
pub use websocket::{GarageSnapshotEvent, GarageStateEvent, IncomingMessage, OutgoingMessage};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub controller: GarageController,
    pub bus: NotificationBus,
    pub verifier: Arc<TokenVerifier>,
    /// Expose `/NotifyLeft`
    pub debug_routes: bool,
}

/// `/info` response
#[derive(Serialize)]
struct InfoResponse {
    message: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal_error(message: String) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { message }))
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut protected = Router::new()
        .route("/info", get(info_handler))
        .route("/GetGarageDoorStatuses", get(get_garage_door_statuses))
        .route("/OpenRightGarageDoor", post(open_right_door))
        .route("/CloseRightGarageDoor", post(close_right_door))
        .route("/SwitchRightDoor", post(switch_right_door))
        .route("/OpenLeftGarageDoor", post(open_left_door))
        .route("/CloseLeftGarageDoor", post(close_left_door))
        .route("/SwitchLeftDoor", post(switch_left_door))
        .route("/OpenDoors", post(open_doors))
        .route("/CloseDoors", post(close_doors));

    if state.debug_routes {
        protected = protected.route("/NotifyLeft", post(notify_left));
    }

    let protected = protected.route_layer(middleware::from_fn_with_state(
        state.verifier.clone(),
        auth::require_token,
    ));

    Router::new()
        .route("/alive", get(alive))
        .route("/ws", get(websocket::ws_handler))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server, stopping gracefully once `shutdown` resolves
pub async fn start_server(
    state: AppState,
    addr: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

// ==================== Handlers ====================

/// GET /alive
async fn alive() -> &'static str {
    "Success!"
}

/// GET /info - board identifier
async fn info_handler(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        message: state.controller.info(),
    })
}

/// GET /GetGarageDoorStatuses - `[left, right]`
async fn get_garage_door_statuses(
    State(state): State<AppState>,
) -> Result<Json<[DoorState; 2]>, ApiError> {
    state
        .controller
        .sensors()
        .garage_door_statuses()
        .map(Json)
        .map_err(|e| {
            error!(error = %e, "Failed to read door sensors");
            internal_error(e.to_string())
        })
}

fn acknowledge(result: Result<Ack, ActuatorError>) -> Result<&'static str, ApiError> {
    result.map(|ack| ack.as_str()).map_err(|e| {
        error!(error = %e, "Door command failed");
        internal_error(e.to_string())
    })
}

async fn open_right_door(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    acknowledge(state.controller.open_right_door().await)
}

async fn close_right_door(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    acknowledge(state.controller.close_right_door().await)
}

async fn switch_right_door(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    acknowledge(state.controller.switch_right_door().await)
}

async fn open_left_door(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    acknowledge(state.controller.open_left_door().await)
}

async fn close_left_door(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    acknowledge(state.controller.close_left_door().await)
}

async fn switch_left_door(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    acknowledge(state.controller.switch_left_door().await)
}

async fn open_doors(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    acknowledge(state.controller.open_doors().await)
}

async fn close_doors(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    acknowledge(state.controller.close_doors().await)
}

/// POST /NotifyLeft - push a Moving notification for the left door
async fn notify_left(State(state): State<AppState>) -> &'static str {
    state.bus.notify_garage(DoorState::Moving, DoorId::Left);
    "OK"
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use crate::auth::tests::{auth_config, mint, token_with};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use garage_config::{DoorsConfig, GarageConfig, GpioConfig, ServerConfig};
    use garage_core::{DoorPins, Level, PinId};
    use garage_gpio::{PinWrite, SimulatedGpio};
    use serde_json::json;
    use tokio::sync::watch;
    use tower::ServiceExt;

    fn test_config() -> GarageConfig {
        GarageConfig {
            server: ServerConfig::default(),
            board_id: None,
            gpio: GpioConfig::default(),
            pin_move_delay: 500,
            doors: DoorsConfig {
                left: DoorPins {
                    actuator: PinId(17),
                    open_sensor: PinId(22),
                    closed_sensor: PinId(27),
                },
                right: DoorPins {
                    actuator: PinId(18),
                    open_sensor: PinId(23),
                    closed_sensor: PinId(24),
                },
            },
            mqtt: None,
            auth: auth_config(),
        }
    }

    pub struct TestApp {
        pub gpio: Arc<SimulatedGpio>,
        pub state: AppState,
        _shutdown: watch::Sender<bool>,
    }

    pub fn create_test_app(debug_routes: bool) -> TestApp {
        let config = test_config();
        let gpio = Arc::new(SimulatedGpio::with_board_id("test board"));
        let (shutdown, rx) = watch::channel(false);
        let controller = GarageController::new(gpio.clone(), &config, rx);
        controller.setup_pins().unwrap();
        let bus = NotificationBus::new(controller.sensors().clone());
        let state = AppState {
            controller,
            bus,
            verifier: Arc::new(TokenVerifier::from_config(&config.auth).unwrap()),
            debug_routes,
        };
        TestApp {
            gpio,
            state,
            _shutdown: shutdown,
        }
    }

    fn authorized(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", token_with(&["garage"])),
            )
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    fn write(pin: u8, level: Level) -> PinWrite {
        PinWrite {
            pin: PinId(pin),
            level,
        }
    }

    #[tokio::test]
    async fn test_alive_needs_no_token() {
        let app = create_test_app(false);
        let response = create_router(app.state)
            .oneshot(Request::builder().uri("/alive").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "Success!");
    }

    #[tokio::test]
    async fn test_unauthenticated_command_writes_nothing() {
        let app = create_test_app(false);
        let response = create_router(app.state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/OpenRightGarageDoor")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(app.gpio.writes().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_token_is_unauthorized() {
        let app = create_test_app(false);
        let response = create_router(app.state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/OpenLeftGarageDoor")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(app.gpio.writes().is_empty());
    }

    #[tokio::test]
    async fn test_missing_claim_is_forbidden() {
        let app = create_test_app(false);
        let response = create_router(app.state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/OpenLeftGarageDoor")
                    .header(
                        header::AUTHORIZATION,
                        format!("Bearer {}", token_with(&["kitchen"])),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(app.gpio.writes().is_empty());
    }

    #[tokio::test]
    async fn test_token_from_query_parameter() {
        let app = create_test_app(false);
        let uri = format!("/info?access_token={}", token_with(&["garage"]));
        let response = create_router(app.state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_token_query_is_unauthorized() {
        let app = create_test_app(false);
        let router = create_router(app.state);
        let token = token_with(&["garage"]);

        for uri in [
            format!("/info?access_token={}&access_token={}", token, token),
            "/info?access_token=%ZZ".to_string(),
        ] {
            let response = router
                .clone()
                .oneshot(Request::builder().uri(uri.as_str()).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_bearer_header_wins_over_malformed_query() {
        let app = create_test_app(false);
        let request = authorized("GET", "/info?access_token=a&access_token=b");

        let response = create_router(app.state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_info_reports_board_id() {
        let app = create_test_app(false);
        let response = create_router(app.state)
            .oneshot(authorized("GET", "/info"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json, json!({ "message": "test board" }));
    }

    #[tokio::test]
    async fn test_get_garage_door_statuses() {
        let app = create_test_app(false);
        app.gpio.set_input(PinId(27), Level::High);
        app.gpio.set_input(PinId(23), Level::High);

        let response = create_router(app.state)
            .oneshot(authorized("GET", "/GetGarageDoorStatuses"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json, json!(["Closed", "Open"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_left_door() {
        let app = create_test_app(false);
        app.gpio.set_input(PinId(27), Level::High);

        let start = tokio::time::Instant::now();
        let response = create_router(app.state)
            .oneshot(authorized("POST", "/SwitchLeftDoor"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "OK");
        assert_eq!(start.elapsed(), std::time::Duration::from_millis(500));
        assert_eq!(
            app.gpio.writes(),
            vec![write(17, Level::High), write(17, Level::Low)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_door_commands() {
        let app = create_test_app(false);
        let router = create_router(app.state);

        for (uri, pin) in [
            ("/OpenRightGarageDoor", 18),
            ("/CloseRightGarageDoor", 18),
            ("/SwitchRightDoor", 18),
            ("/OpenLeftGarageDoor", 17),
            ("/CloseLeftGarageDoor", 17),
            ("/SwitchLeftDoor", 17),
        ] {
            app.gpio.clear_writes();
            let response = router.clone().oneshot(authorized("POST", uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);
            assert_eq!(
                app.gpio.writes(),
                vec![write(pin, Level::High), write(pin, Level::Low)],
                "{}",
                uri
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_doors_right_first() {
        let app = create_test_app(false);
        let router = create_router(app.state);
        let expected = vec![
            write(18, Level::High),
            write(18, Level::Low),
            write(17, Level::High),
            write(17, Level::Low),
        ];

        for uri in ["/OpenDoors", "/CloseDoors"] {
            app.gpio.clear_writes();
            let response = router.clone().oneshot(authorized("POST", uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_string(response).await, "OK");
            assert_eq!(app.gpio.writes(), expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_actuator_failure_is_internal_error() {
        let app = create_test_app(false);
        app.gpio.fail_writes(PinId(18), Level::High);

        let response = create_router(app.state)
            .oneshot(authorized("POST", "/OpenRightGarageDoor"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.gpio.level(PinId(18)), Level::Low);
    }

    #[tokio::test]
    async fn test_debug_route_disabled_by_default() {
        let app = create_test_app(false);
        let response = create_router(app.state)
            .oneshot(authorized("POST", "/NotifyLeft"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_debug_route_notifies_left_moving() {
        let app = create_test_app(true);
        let mut facts = app.state.bus.subscribe();

        let response = create_router(app.state.clone())
            .oneshot(authorized("POST", "/NotifyLeft"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let fact = facts.recv().await.unwrap();
        assert_eq!((fact.door, fact.state), (DoorId::Left, DoorState::Moving));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let app = create_test_app(false);
        let token = mint(json!({
            "iss": crate::auth::tests::ISSUER,
            "aud": crate::auth::tests::AUDIENCE,
            "exp": 1_000,
            "claims": ["garage"],
        }));
        let response = create_router(app.state)
            .oneshot(
                Request::builder()
                    .uri("/GetGarageDoorStatuses")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
