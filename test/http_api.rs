//! HTTP API tests over a real socket.

use campus_parking::server::{build_router, AppState};
use campus_parking::registry::Booking;
use campus_parking::{ArtifactError, NoArtifacts, QrTicketWriter, Registry, TicketArtifacts};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl Reply {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn json(&self) -> Value {
        serde_json::from_str(&self.body)
            .unwrap_or_else(|e| panic!("invalid JSON body {:?}: {}", self.body, e))
    }
}

async fn start(artifacts: Arc<dyn TicketArtifacts>) -> SocketAddr {
    let registry = Arc::new(Registry::in_memory(&["A1", "A2", "B1"]).unwrap());
    let state = AppState::new(registry, artifacts)
        .with_cors_origins(vec!["http://localhost:3000".to_string()]);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });
    addr
}

async fn send(
    addr: SocketAddr,
    method: &str,
    path: &str,
    body: Option<Value>,
    extra: &[(&str, &str)],
) -> Reply {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let payload = body.map(|b| b.to_string()).unwrap_or_default();
    let mut request = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\nContent-Length: {}\r\n",
        method,
        path,
        addr,
        payload.len()
    );
    if !payload.is_empty() {
        request.push_str("Content-Type: application/json\r\n");
    }
    for (k, v) in extra {
        request.push_str(&format!("{}: {}\r\n", k, v));
    }
    request.push_str("\r\n");
    request.push_str(&payload);
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let text = String::from_utf8_lossy(&raw).to_string();
    let (head, body) = text.split_once("\r\n\r\n").unwrap_or((text.as_str(), ""));
    let mut lines = head.lines();
    let status = lines
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
        .unwrap();
    let headers = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    Reply {
        status,
        headers,
        body: body.to_string(),
    }
}

async fn get(addr: SocketAddr, path: &str) -> Reply {
    send(addr, "GET", path, None, &[]).await
}

async fn post(addr: SocketAddr, path: &str, body: Value) -> Reply {
    send(addr, "POST", path, Some(body), &[]).await
}

#[tokio::test]
async fn test_health_and_listing() {
    let addr = start(Arc::new(NoArtifacts)).await;

    let health = get(addr, "/health").await;
    assert_eq!(health.status, 200);
    assert_eq!(health.json()["status"], "ok");

    let slots = get(addr, "/api/slots").await;
    assert_eq!(slots.status, 200);
    let slots = slots.json();
    let ids: Vec<_> = slots
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["slot_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["A1", "A2", "B1"]);
    assert!(slots
        .as_array()
        .unwrap()
        .iter()
        .all(|s| s["state"] == "free" && s["booking_id"].is_null()));
}

#[tokio::test]
async fn test_book_release_cycle() {
    let addr = start(Arc::new(NoArtifacts)).await;

    let booked = post(addr, "/api/book", json!({ "slot_id": "A1" })).await;
    assert_eq!(booked.status, 201);
    let booked = booked.json();
    let booking_id = booked["booking_id"].as_str().unwrap().to_string();
    assert_eq!(booking_id.len(), 8);
    assert!(booked.get("ticket_url").is_none());

    let again = post(addr, "/api/book", json!({ "slot_id": "A1" })).await;
    assert_eq!(again.status, 400);
    assert_eq!(again.json()["kind"], "already_booked");

    let slot = get(addr, "/api/slots/A1").await.json();
    assert_eq!(slot["state"], "booked");
    assert_eq!(slot["booking_id"], booking_id.as_str());

    let occupancy = get(addr, "/api/occupancy").await.json();
    assert_eq!(occupancy, json!({ "total": 3, "booked": 1, "free": 2 }));

    let released = post(addr, "/api/release", json!({ "slot_id": "A1" })).await;
    assert_eq!(released.status, 200);
    assert_eq!(released.json()["released"], true);

    let twice = post(addr, "/api/release", json!({ "slot_id": "A1" })).await;
    assert_eq!(twice.status, 400);
    assert_eq!(twice.json()["kind"], "not_booked");
}

#[tokio::test]
async fn test_unknown_slot() {
    let addr = start(Arc::new(NoArtifacts)).await;

    let lookup = get(addr, "/api/slots/Z9").await;
    assert_eq!(lookup.status, 404);

    let book = post(addr, "/api/book", json!({ "slot_id": "Z9" })).await;
    assert_eq!(book.status, 400);
    assert_eq!(book.json()["kind"], "slot_not_found");
}

#[tokio::test]
async fn test_validate_ticket() {
    let addr = start(Arc::new(NoArtifacts)).await;
    let booking = post(addr, "/api/book", json!({ "slot_id": "B1" })).await.json();
    let id = booking["booking_id"].as_str().unwrap();

    let ok = post(
        addr,
        "/api/validate",
        json!({ "slot_id": "B1", "booking_id": id }),
    )
    .await;
    assert_eq!(ok.status, 200);
    assert_eq!(
        ok.json(),
        json!({ "status": "Success", "message": "Valid Ticket" })
    );

    for (slot, token) in [("B1", "00000000"), ("A2", id), ("nope", id)] {
        let bad = post(
            addr,
            "/api/validate",
            json!({ "slot_id": slot, "booking_id": token }),
        )
        .await;
        assert_eq!(bad.status, 200);
        assert_eq!(bad.json()["status"], "Failed");
    }
}

#[tokio::test]
async fn test_qr_ticket_served() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start(Arc::new(QrTicketWriter::new(dir.path()))).await;

    let booking = post(addr, "/api/book", json!({ "slot_id": "A2" })).await.json();
    let url = booking["ticket_url"].as_str().unwrap().to_string();
    let id = booking["booking_id"].as_str().unwrap();
    assert_eq!(url, format!("/qr/{}", id));
    assert!(dir.path().join(format!("{}.svg", id)).exists());

    let image = get(addr, &url).await;
    assert_eq!(image.status, 200);
    assert_eq!(image.header("content-type"), Some("image/svg+xml"));
    assert!(image.body.contains("<svg"));

    let missing = get(addr, "/qr/deadbeef").await;
    assert_eq!(missing.status, 404);
}

/// Ticket writer that always fails, as on a full disk.
struct BrokenArtifacts;

impl TicketArtifacts for BrokenArtifacts {
    fn render(&self, _booking: &Booking) -> Result<PathBuf, ArtifactError> {
        Err(ArtifactError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "no space left on device",
        )))
    }

    fn locate(&self, _booking_id: &str) -> Option<PathBuf> {
        None
    }
}

#[tokio::test]
async fn test_ticket_failure_keeps_booking() {
    let addr = start(Arc::new(BrokenArtifacts)).await;

    let booked = post(addr, "/api/book", json!({ "slot_id": "A1" })).await;
    assert_eq!(booked.status, 201);
    let booked = booked.json();
    assert!(booked.get("ticket_url").is_none());
    let id = booked["booking_id"].as_str().unwrap();

    let slot = get(addr, "/api/slots/A1").await.json();
    assert_eq!(slot["state"], "booked");
    assert_eq!(slot["booking_id"], id);

    let redirect = get(addr, "/book/A2").await;
    assert_eq!(redirect.status, 303);
    assert!(redirect
        .header("location")
        .unwrap()
        .starts_with("/?booked="));
}

#[tokio::test]
async fn test_html_flow() {
    let addr = start(Arc::new(NoArtifacts)).await;

    let home = get(addr, "/").await;
    assert_eq!(home.status, 200);
    assert!(home.body.contains("href=\"/book/A1\""));

    let redirect = get(addr, "/book/A1").await;
    assert_eq!(redirect.status, 303);
    let location = redirect.header("location").unwrap();
    assert!(location.starts_with("/?booked="));
    assert!(location.ends_with("&slot=A1"));

    let conflict = get(addr, "/book/A1").await;
    assert_eq!(conflict.status, 303);
    assert_eq!(
        conflict.header("location"),
        Some("/?error=already_booked&slot=A1")
    );

    let flashed = get(addr, "/?error=already_booked&slot=A1").await;
    assert!(flashed.body.contains("Slot A1 is already booked."));

    let admin = get(addr, "/admin").await;
    assert!(admin.body.contains("Active bookings: <strong>1</strong>"));

    let released = get(addr, "/release/A1").await;
    assert_eq!(released.status, 303);
    assert_eq!(released.header("location"), Some("/"));
}

#[tokio::test]
async fn test_cors() {
    let addr = start(Arc::new(NoArtifacts)).await;

    let preflight = send(
        addr,
        "OPTIONS",
        "/api/book",
        None,
        &[("Origin", "http://localhost:3000")],
    )
    .await;
    assert_eq!(preflight.status, 204);
    assert_eq!(
        preflight.header("access-control-allow-origin"),
        Some("http://localhost:3000")
    );

    let foreign = send(
        addr,
        "GET",
        "/api/slots",
        None,
        &[("Origin", "http://evil.example")],
    )
    .await;
    assert_eq!(foreign.status, 200);
    assert!(foreign.header("access-control-allow-origin").is_none());
}
