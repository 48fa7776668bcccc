use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use tempfile::TempDir;

/// A labtrack server running against a throwaway data directory. The
/// process is killed when the handle drops.
pub struct TestServer {
    #[allow(dead_code)]
    temp_dir: TempDir,
    pub base_url: String,
    pub admin_token: String,
    process: Option<Child>,
}

static BINARY: LazyLock<PathBuf> = LazyLock::new(|| {
    let status = Command::new("cargo")
        .args(["build", "--release"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("run cargo build");
    assert!(status.success(), "release build failed");
    Path::new(env!("CARGO_MANIFEST_DIR")).join("target/release/labtrack")
});

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

impl TestServer {
    pub async fn start() -> Self {
        let binary = LazyLock::force(&BINARY);
        let temp_dir = TempDir::new().expect("create temp dir");

        let init = Command::new(binary)
            .arg("admin")
            .arg("init")
            .arg("--non-interactive")
            .arg("--data-dir")
            .arg(temp_dir.path())
            .output()
            .expect("run admin init");
        assert!(
            init.status.success(),
            "admin init failed: {}",
            String::from_utf8_lossy(&init.stderr)
        );

        let admin_token = std::fs::read_to_string(temp_dir.path().join(".admin_token"))
            .expect("read admin token")
            .trim()
            .to_string();

        let port = free_port();
        let base_url = format!("http://127.0.0.1:{port}");
        let process = Command::new(binary)
            .arg("serve")
            .arg("--host")
            .arg("127.0.0.1")
            .arg("--port")
            .arg(port.to_string())
            .arg("--data-dir")
            .arg(temp_dir.path())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn server");

        let server = Self {
            temp_dir,
            base_url,
            admin_token,
            process: Some(process),
        };
        server.wait_until_healthy().await;
        server
    }

    async fn wait_until_healthy(&self) {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        let url = format!("{}/health", self.base_url);
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return,
                _ if Instant::now() > deadline => {
                    panic!("server at {} never became healthy", self.base_url)
                }
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(mut process) = self.process.take() {
            let _ = process.kill();
            let _ = process.wait();
        }
    }
}
