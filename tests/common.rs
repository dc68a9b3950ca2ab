//! Shared harness for integration tests.
//!
//! `TestHost` runs the real share router on an ephemeral local port over a
//! scratch upload directory and drives it with `reqwest`.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ephemera::relay::{Relay, RelayConfig};
use ephemera::storage::BlobStore;
use reqwest::multipart::{Form, Part};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct TestHostBuilder {
    max_upload_size: u64,
    ttl: Duration,
    upload_dir: Option<PathBuf>,
}

impl TestHostBuilder {
    pub fn with_max_upload_size(mut self, bytes: u64) -> Self {
        self.max_upload_size = bytes;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Serve from an existing directory instead of a fresh temp dir.
    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = Some(dir.into());
        self
    }

    pub async fn start(self) -> anyhow::Result<TestHost> {
        let temp = TempDir::new()?;
        let upload_dir = self
            .upload_dir
            .unwrap_or_else(|| temp.path().join("uploads"));

        let store = BlobStore::file(&upload_dir)?;
        let relay = Relay::new(
            store,
            RelayConfig {
                max_upload_size: self.max_upload_size,
                ttl: self.ttl,
                ..RelayConfig::default()
            },
        );

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (stop, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(ephemera::http::serve(listener, relay.clone(), async move {
            let _ = stopped.await;
        }));

        Ok(TestHost {
            addr,
            relay,
            upload_dir,
            client: reqwest::Client::new(),
            stop: Some(stop),
            server,
            _temp: temp,
        })
    }
}

pub struct TestHost {
    addr: SocketAddr,
    relay: Relay,
    upload_dir: PathBuf,
    client: reqwest::Client,
    stop: Option<oneshot::Sender<()>>,
    server: JoinHandle<anyhow::Result<()>>,
    _temp: TempDir,
}

impl TestHost {
    pub fn builder() -> TestHostBuilder {
        TestHostBuilder {
            max_upload_size: 1024 * 1024,
            ttl: Duration::from_secs(60),
            upload_dir: None,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client.get(self.url(path)).send().await
    }

    /// Uploads `content` as the `file` field with the given file name.
    pub async fn upload(&self, filename: &str, content: Vec<u8>) -> reqwest::Result<reqwest::Response> {
        let part = Part::bytes(content).file_name(filename.to_string());
        self.post_form(Form::new().part("file", part)).await
    }

    pub async fn post_form(&self, form: Form) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(self.url("/share"))
            .multipart(form)
            .send()
            .await
    }

    /// Files currently in the upload directory, by name.
    pub fn stored_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.upload_dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Polls until `name` is gone from the upload directory.
    pub async fn wait_until_deleted(&self, name: &str, timeout: Duration) -> bool {
        let path = self.upload_dir.join(name);
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if !path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        !path.exists()
    }

    /// Stops the server and waits for it to drain.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        (&mut self.server).await?
    }
}

impl Drop for TestHost {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}
