#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::Value;

use catalog_api_rust::api::opaque_id::{encode_product_id, encode_shop_id};
use catalog_api_rust::auth::{generate_jwt, Claims, Grant, ARCHIVE_ACTION};

pub const JWT_SECRET: &str = "integration-test-secret";
pub const MAX_REQUEST_SIZE_BYTES: usize = 16 * 1024;

static SERVER: OnceLock<TestServer> = OnceLock::new();

// Statics are never dropped, so the child is parked here and killed on exit
static SERVER_PROCESS: Mutex<Option<Child>> = Mutex::new(None);

#[ctor::dtor]
fn stop_server() {
    if let Ok(mut guard) = SERVER_PROCESS.lock() {
        if let Some(mut child) = guard.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);
        let fixture = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/catalog.yaml");

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_catalog-api-rust"));
        cmd.args(["serve", "--port", &port.to_string(), "--backend", "memory", "--fixture", fixture])
            .env("APP_ENV", "development")
            .env("SECURITY_JWT_SECRET", JWT_SECRET)
            .env("API_MAX_REQUEST_SIZE_BYTES", MAX_REQUEST_SIZE_BYTES.to_string())
            .env("RUST_LOG", "warn")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().context("failed to spawn server binary")?;
        if let Ok(mut guard) = SERVER_PROCESS.lock() {
            *guard = Some(child);
        }

        Ok(Self { port, base_url })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline { break; }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// Whether the spawned server is parked for the exit hook and still running
pub fn server_process_running() -> bool {
    match SERVER_PROCESS.lock() {
        Ok(mut guard) => guard.as_mut().map_or(false, |child| matches!(child.try_wait(), Ok(None))),
        Err(_) => false,
    }
}

/// Token granting `actions` on `resource` inside `shop`
pub fn token_for(shop: &str, resource: &str, actions: &[&str]) -> String {
    let claims = Claims::new("integration-tests", vec![Grant::new(shop, resource, actions.iter().copied())], 1);
    generate_jwt(&claims, JWT_SECRET).expect("failed to sign test token")
}

/// Token allowed to archive any product in `shop`
pub fn archive_token(shop: &str) -> String {
    token_for(shop, "catalog:products:*", &[ARCHIVE_ACTION])
}

pub fn product(id: &str) -> String {
    encode_product_id(id)
}

pub fn shop(id: &str) -> String {
    encode_shop_id(id)
}

/// POST /api/catalog/unarchive and return status plus parsed body
pub async fn post_unarchive(token: Option<&str>, body: &Value) -> Result<(StatusCode, Value)> {
    let server = ensure_server().await?;
    let client = reqwest::Client::new();

    let mut req = client.post(format!("{}/api/catalog/unarchive", server.base_url)).json(body);
    if let Some(token) = token {
        req = req.bearer_auth(token);
    }

    let res = req.send().await?;
    let status = res.status();
    let body = res.json::<Value>().await?;
    Ok((status, body))
}
