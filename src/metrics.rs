use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, TextEncoder};

pub static WS_CONNECTED_CLIENTS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "chat_service_ws_connected_clients",
        "Currently open websocket connections",
    )
    .expect("failed to create chat_service_ws_connected_clients");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register chat_service_ws_connected_clients");
    gauge
});

pub static MESSAGES_SENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "chat_service_messages_sent_total",
            "Messages accepted for delivery",
        ),
        &["kind"],
    )
    .expect("failed to create chat_service_messages_sent_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_service_messages_sent_total");
    counter
});

pub static EVENTS_FANNED_OUT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "chat_service_events_fanned_out_total",
            "Events emitted to live connections",
        ),
        &["event"],
    )
    .expect("failed to create chat_service_events_fanned_out_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_service_events_fanned_out_total");
    counter
});

pub static PUSH_ATTEMPTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "chat_service_push_attempts_total",
            "Push notification attempts by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create chat_service_push_attempts_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_service_push_attempts_total");
    counter
});

pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, encoder.format_type())
        .body(buffer.into())
        .unwrap_or_else(|err| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(err.to_string().into())
                .expect("failed to build metrics error response")
        })
}
