// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use reqboard_source::Forwarder;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::{Cursor, Read};
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, Server};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8787";
pub const DEFAULT_DOWNSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// What the relay does with a valid payload before answering the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardMode {
    /// Wait for the downstream and report its outcome.
    #[default]
    Await,
    /// Answer at once and forward on a worker thread.
    Background,
}

/// How the relay answers anything that is not a POST.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodPolicy {
    /// `200 OK`, for webhook providers that probe the URL with GET.
    #[default]
    Acknowledge,
    Reject,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayPolicy {
    pub mode: ForwardMode,
    pub other_methods: MethodPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReply {
    pub status: u16,
    pub body: String,
    pub json: bool,
}

impl RelayReply {
    fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: body.to_string(),
            json: true,
        }
    }

    fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_owned(),
            json: false,
        }
    }

    fn into_response(self) -> Result<Response<Cursor<Vec<u8>>>> {
        let content_type = if self.json {
            "application/json"
        } else {
            "text/plain; charset=utf-8"
        };
        let header = Header::from_bytes("Content-Type", content_type)
            .map_err(|()| anyhow!("invalid content type header {content_type:?}"))?;
        Ok(Response::from_string(self.body)
            .with_status_code(self.status)
            .with_header(header))
    }
}

pub struct Relay {
    server: Server,
    forwarder: Forwarder,
    policy: RelayPolicy,
}

impl Relay {
    pub fn bind(addr: &str, forwarder: Forwarder, policy: RelayPolicy) -> Result<Self> {
        let server = Server::http(addr).map_err(|error| anyhow!("bind relay on {addr}: {error}"))?;
        tracing::info!(
            listen = %server.server_addr(),
            downstream = forwarder.url(),
            mode = ?policy.mode,
            "relay listening"
        );
        Ok(Self {
            server,
            forwarder,
            policy,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.server.server_addr())
    }

    pub const fn policy(&self) -> RelayPolicy {
        self.policy
    }

    /// Serves until the listener closes. Each request runs on its own worker
    /// thread.
    pub fn run(&self) -> Result<()> {
        for request in self.server.incoming_requests() {
            let forwarder = self.forwarder.clone();
            let policy = self.policy;
            let spawned = thread::Builder::new()
                .name("reqboard-relay".to_owned())
                .spawn(move || {
                    if let Err(error) = handle_request(&forwarder, policy, request) {
                        tracing::warn!(error = %format!("{error:#}"), "relay request failed");
                    }
                });
            if let Err(error) = spawned {
                tracing::warn!(error = %error, "cannot spawn relay worker; request dropped");
            }
        }
        Ok(())
    }

    /// Serves exactly one request on the calling thread.
    pub fn handle_next(&self) -> Result<()> {
        let request = self.server.recv().context("receive relay request")?;
        handle_request(&self.forwarder, self.policy, request)
    }
}

fn handle_request(forwarder: &Forwarder, policy: RelayPolicy, mut request: Request) -> Result<()> {
    let method = request.method().clone();
    let reply = if method == Method::Post {
        let mut body = Vec::new();
        request
            .as_reader()
            .read_to_end(&mut body)
            .context("read relay request body")?;
        relay_payload(forwarder, policy.mode, body)
    } else {
        method_reply(policy.other_methods)
    };

    tracing::debug!(
        method = %method,
        url = request.url(),
        status = reply.status,
        "relay reply"
    );
    request
        .respond(reply.into_response()?)
        .context("send relay response")
}

fn relay_payload(forwarder: &Forwarder, mode: ForwardMode, body: Vec<u8>) -> RelayReply {
    if let Err(reason) = check_payload(&body) {
        return RelayReply::json(400, json!({ "error": reason }));
    }

    match mode {
        ForwardMode::Await => match forwarder.forward(&body) {
            Ok(receipt) => {
                // Any downstream answer counts as delivered.
                if receipt.accepted() {
                    tracing::debug!(status = receipt.status, "payload forwarded");
                } else {
                    tracing::warn!(
                        status = receipt.status,
                        body = %receipt.body_snippet(),
                        "downstream rejected forwarded payload"
                    );
                }
                RelayReply::json(200, json!({ "status": "forwarded" }))
            }
            Err(error) => {
                let message = format!("{error:#}");
                tracing::warn!(error = %message, "forward failed");
                RelayReply::json(500, json!({ "error": message }))
            }
        },
        ForwardMode::Background => {
            let forwarder = forwarder.clone();
            thread::spawn(move || match forwarder.forward(&body) {
                Ok(receipt) if !receipt.accepted() => {
                    tracing::warn!(
                        status = receipt.status,
                        body = %receipt.body_snippet(),
                        "downstream rejected forwarded payload"
                    );
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(error = %format!("{error:#}"), "background forward failed");
                }
            });
            RelayReply::json(200, json!({ "status": "accepted" }))
        }
    }
}

pub fn method_reply(policy: MethodPolicy) -> RelayReply {
    match policy {
        MethodPolicy::Acknowledge => RelayReply::text(200, "OK"),
        MethodPolicy::Reject => RelayReply::json(405, json!({ "message": "Method not allowed" })),
    }
}

/// Emptiness and JSON syntax only; the payload shape belongs to the
/// downstream script.
pub fn check_payload(body: &[u8]) -> Result<(), String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err("request body is empty".to_owned());
    }
    serde_json::from_slice::<serde::de::IgnoredAny>(body)
        .map(|_| ())
        .map_err(|error| format!("request body is not valid JSON: {error}"))
}
