// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use reqboard_relay::{ForwardMode, MethodPolicy, Relay, RelayPolicy};
use reqboard_source::Forwarder;
use std::io::Read;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};
use tiny_http::{Response, Server};

struct Captured {
    content_type: Option<String>,
    body: Vec<u8>,
}

fn mock_downstream(status: u16) -> Result<(String, thread::JoinHandle<Captured>)> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}/exec", server.server_addr());
    let handle = thread::spawn(move || {
        let mut request = server.recv().expect("request expected");
        let content_type = request
            .headers()
            .iter()
            .find(|header| header.field.equiv("Content-Type"))
            .map(|header| header.value.as_str().to_owned());
        let mut body = Vec::new();
        request
            .as_reader()
            .read_to_end(&mut body)
            .expect("body should read");
        request
            .respond(Response::from_string("done").with_status_code(status))
            .expect("response should succeed");
        Captured { content_type, body }
    });
    Ok((addr, handle))
}

fn start_relay(downstream: &str, policy: RelayPolicy) -> Result<(String, thread::JoinHandle<()>)> {
    let forwarder = Forwarder::new(downstream, Duration::from_secs(2))?;
    let relay = Relay::bind("127.0.0.1:0", forwarder, policy)?;
    let url = relay.url();
    let handle = thread::spawn(move || {
        relay.handle_next().expect("relay should serve one request");
    });
    Ok((url, handle))
}

fn client() -> Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?)
}

#[test]
fn await_mode_forwards_body_verbatim_and_reports_forwarded() -> Result<()> {
    let (downstream, downstream_handle) = mock_downstream(200)?;
    let (relay_url, relay_handle) = start_relay(&downstream, RelayPolicy::default())?;
    let payload = r#"{"event_name":"user_send_text","sender":{"id":"42"},"message":{"text":"Phòng 12 hỏng đèn"}}"#;

    let response = client()?
        .post(&relay_url)
        .header("Content-Type", "application/json")
        .body(payload)
        .send()?;
    assert_eq!(response.status().as_u16(), 200);
    let reply: serde_json::Value = response.json()?;
    assert_eq!(reply["status"], "forwarded");

    relay_handle.join().expect("relay thread should join");
    let captured = downstream_handle.join().expect("downstream thread should join");
    assert_eq!(captured.body, payload.as_bytes());
    assert_eq!(captured.content_type.as_deref(), Some("application/json"));
    Ok(())
}

#[test]
fn await_mode_answers_ok_when_downstream_returns_error_status() -> Result<()> {
    let (downstream, downstream_handle) = mock_downstream(500)?;
    let (relay_url, relay_handle) = start_relay(&downstream, RelayPolicy::default())?;

    let response = client()?.post(&relay_url).body(r#"{"ok":true}"#).send()?;
    assert_eq!(response.status().as_u16(), 200);
    let reply: serde_json::Value = response.json()?;
    assert_eq!(reply["status"], "forwarded");

    relay_handle.join().expect("relay thread should join");
    let captured = downstream_handle.join().expect("downstream thread should join");
    assert_eq!(captured.body, br#"{"ok":true}"#.to_vec());
    Ok(())
}

#[test]
fn await_mode_reports_unreachable_downstream_as_server_error() -> Result<()> {
    let (relay_url, relay_handle) =
        start_relay("http://127.0.0.1:1/exec", RelayPolicy::default())?;

    let response = client()?.post(&relay_url).body(r#"{"ok":true}"#).send()?;
    assert_eq!(response.status().as_u16(), 500);
    let reply: serde_json::Value = response.json()?;
    assert!(
        reply["error"]
            .as_str()
            .is_some_and(|message| message.contains("cannot reach downstream"))
    );

    relay_handle.join().expect("relay thread should join");
    Ok(())
}

#[test]
fn run_serves_concurrent_callers_in_parallel() -> Result<()> {
    const CALLERS: usize = 4;
    const DOWNSTREAM_DELAY: Duration = Duration::from_millis(1500);

    let server = Arc::new(
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?,
    );
    let downstream = format!("http://{}/exec", server.server_addr());
    let mut downstream_workers = Vec::new();
    for _ in 0..CALLERS {
        let server = Arc::clone(&server);
        downstream_workers.push(thread::spawn(move || {
            let request = server.recv().expect("request expected");
            thread::sleep(DOWNSTREAM_DELAY);
            request
                .respond(Response::from_string("done").with_status_code(200))
                .expect("response should succeed");
        }));
    }

    let forwarder = Forwarder::new(&downstream, Duration::from_secs(5))?;
    let relay = Relay::bind("127.0.0.1:0", forwarder, RelayPolicy::default())?;
    let relay_url = relay.url();
    // Serves until the test process exits.
    let _relay_thread = thread::spawn(move || relay.run());

    let started = Instant::now();
    let callers = (0..CALLERS)
        .map(|index| {
            let relay_url = relay_url.clone();
            thread::spawn(move || -> Result<(u16, Duration)> {
                let response = client()?
                    .post(&relay_url)
                    .body(format!(r#"{{"n":{index}}}"#))
                    .send()?;
                Ok((response.status().as_u16(), started.elapsed()))
            })
        })
        .collect::<Vec<_>>();

    let mut slowest = Duration::ZERO;
    for caller in callers {
        let (status, elapsed) = caller.join().expect("caller thread should join")?;
        assert_eq!(status, 200);
        slowest = slowest.max(elapsed);
    }
    for worker in downstream_workers {
        worker.join().expect("downstream thread should join");
    }

    assert!(
        slowest < DOWNSTREAM_DELAY * 2,
        "slowest caller waited {slowest:?}; callers were served one at a time"
    );
    Ok(())
}

#[test]
fn empty_and_invalid_bodies_are_rejected_without_forwarding() -> Result<()> {
    for body in ["", "not json"] {
        // Nothing listens on port 1, so a forward attempt would surface as 500.
        let (relay_url, relay_handle) =
            start_relay("http://127.0.0.1:1/exec", RelayPolicy::default())?;
        let response = client()?.post(&relay_url).body(body).send()?;
        assert_eq!(response.status().as_u16(), 400, "body {body:?}");
        let reply: serde_json::Value = response.json()?;
        assert!(reply["error"].is_string());
        relay_handle.join().expect("relay thread should join");
    }
    Ok(())
}

#[test]
fn background_mode_answers_before_downstream_responds() -> Result<()> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let downstream = format!("http://{}/exec", server.server_addr());
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (seen_tx, seen_rx) = mpsc::channel::<Vec<u8>>();
    let downstream_handle = thread::spawn(move || {
        let mut request = server.recv().expect("request expected");
        let mut body = Vec::new();
        request
            .as_reader()
            .read_to_end(&mut body)
            .expect("body should read");
        seen_tx.send(body).expect("test should be listening");
        release_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("test should release downstream");
        request
            .respond(Response::from_string("late").with_status_code(200))
            .expect("response should succeed");
    });

    let policy = RelayPolicy {
        mode: ForwardMode::Background,
        ..RelayPolicy::default()
    };
    let (relay_url, relay_handle) = start_relay(&downstream, policy)?;

    let response = client()?.post(&relay_url).body(r#"{"n":1}"#).send()?;
    assert_eq!(response.status().as_u16(), 200);
    let reply: serde_json::Value = response.json()?;
    assert_eq!(reply["status"], "accepted");

    let forwarded = seen_rx.recv_timeout(Duration::from_secs(5))?;
    assert_eq!(forwarded, br#"{"n":1}"#.to_vec());
    release_tx.send(())?;

    relay_handle.join().expect("relay thread should join");
    downstream_handle.join().expect("downstream thread should join");
    Ok(())
}

#[test]
fn non_post_methods_follow_policy() -> Result<()> {
    let (relay_url, relay_handle) =
        start_relay("http://127.0.0.1:1/exec", RelayPolicy::default())?;
    let response = client()?.get(&relay_url).send()?;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text()?, "OK");
    relay_handle.join().expect("relay thread should join");

    let reject = RelayPolicy {
        other_methods: MethodPolicy::Reject,
        ..RelayPolicy::default()
    };
    let (relay_url, relay_handle) = start_relay("http://127.0.0.1:1/exec", reject)?;
    let response = client()?.get(&relay_url).send()?;
    assert_eq!(response.status().as_u16(), 405);
    let reply: serde_json::Value = response.json()?;
    assert_eq!(reply["message"], "Method not allowed");
    relay_handle.join().expect("relay thread should join");
    Ok(())
}
