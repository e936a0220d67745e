//! Playwright browser automation
//!
//! Each session runs `node` on an embedded driver script that owns one
//! Playwright browser context. Rust and the driver exchange one JSON object
//! per line over stdin/stdout:
//!
//! ```text
//! -> {"id":3,"op":"navigate","url":"https://…","waitUntil":"networkidle","timeoutMs":30000}
//! <- {"id":3,"ok":true,"result":200}
//! <- {"id":4,"ok":false,"error":"Timeout 30000ms exceeded.","kind":"timeout"}
//! ```

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tracing::{debug, warn};

use sitediff_common::{BrowserKind, SiteDiffError, SiteDiffResult};

use crate::browser::{BrowserService, BrowserSession, ScreenshotOptions, WaitCondition};

/// Slack added on top of the page-level timeout before the Rust side gives
/// up on the driver.
const DRIVER_GRACE: Duration = Duration::from_secs(10);

/// Deadline for operations without their own timeout
const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(60);

/// Deadline for the driver to acknowledge a close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

const DRIVER_SCRIPT: &str = r#"
const readline = require('readline');
const playwright = require('playwright');

const browserName = process.env.SITEDIFF_BROWSER || 'chromium';
const headless = process.env.SITEDIFF_HEADLESS !== '0';

let browser;
let context;
let page;

async function ensurePage(viewport) {
  if (!browser) {
    browser = await playwright[browserName].launch({ headless });
  }
  if (!context) {
    context = await browser.newContext({ viewport: viewport || { width: 1280, height: 720 } });
    page = await context.newPage();
  }
  return page;
}

const handlers = {
  async setViewport(req) {
    const viewport = { width: req.width, height: req.height };
    if (page) {
      await page.setViewportSize(viewport);
    } else {
      await ensurePage(viewport);
    }
    return null;
  },
  async navigate(req) {
    const p = await ensurePage();
    const response = await p.goto(req.url, { waitUntil: req.waitUntil, timeout: req.timeoutMs });
    if (response && response.status() >= 400) {
      const error = new Error(`HTTP ${response.status()} for ${req.url}`);
      error.kind = 'http';
      throw error;
    }
    return response ? response.status() : null;
  },
  async evaluate(req) {
    const p = await ensurePage();
    return await p.evaluate(req.script);
  },
  async screenshot(req) {
    const p = await ensurePage();
    const buffer = await p.screenshot({
      type: 'png',
      fullPage: req.fullPage,
      animations: req.disableAnimations ? 'disabled' : 'allow',
    });
    return buffer.toString('base64');
  },
  async close() {
    if (browser) {
      await browser.close();
    }
    browser = context = page = undefined;
    return null;
  },
};

const rl = readline.createInterface({ input: process.stdin });
let queue = Promise.resolve();

rl.on('line', (line) => {
  queue = queue.then(async () => {
    let req;
    try {
      req = JSON.parse(line);
    } catch (error) {
      return;
    }
    const reply = { id: req.id };
    try {
      const handler = handlers[req.op];
      if (!handler) {
        throw new Error(`unknown op '${req.op}'`);
      }
      reply.result = await handler(req);
      reply.ok = true;
    } catch (error) {
      reply.ok = false;
      reply.error = error.message;
      reply.kind = error.name === 'TimeoutError' ? 'timeout' : (error.kind || 'error');
    }
    process.stdout.write(JSON.stringify(reply) + '\n');
    if (req.op === 'close') {
      process.exit(0);
    }
  });
});

rl.on('close', async () => {
  if (browser) {
    await browser.close();
  }
  process.exit(0);
});
"#;

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: BrowserKind,
    pub headless: bool,

    /// Node.js executable
    pub node_binary: PathBuf,

    /// Directory containing the `playwright` package
    /// (defaults to `./node_modules`)
    pub node_modules: Option<PathBuf>,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: BrowserKind::Chromium,
            headless: true,
            node_binary: PathBuf::from("node"),
            node_modules: None,
        }
    }
}

/// Browser automation service backed by Playwright
pub struct PlaywrightService {
    config: PlaywrightConfig,
    script_dir: TempDir,
}

impl PlaywrightService {
    /// Create the service after verifying Playwright is installed
    pub fn new(config: PlaywrightConfig) -> SiteDiffResult<Self> {
        Self::check_playwright_installed()?;
        Self::without_check(config)
    }

    /// Create the service without probing for `npx playwright`
    pub fn without_check(config: PlaywrightConfig) -> SiteDiffResult<Self> {
        let script_dir = tempfile::tempdir()?;
        std::fs::write(script_dir.path().join("driver.js"), DRIVER_SCRIPT)?;
        Ok(Self { config, script_dir })
    }

    /// Check if Playwright is installed
    fn check_playwright_installed() -> SiteDiffResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(SiteDiffError::BrowserNotFound),
        }
    }

    fn node_modules(&self) -> SiteDiffResult<PathBuf> {
        match &self.config.node_modules {
            Some(dir) => Ok(dir.clone()),
            None => Ok(std::env::current_dir()?.join("node_modules")),
        }
    }
}

#[async_trait]
impl BrowserService for PlaywrightService {
    async fn open_session(&self) -> SiteDiffResult<Box<dyn BrowserSession>> {
        let script_path = self.script_dir.path().join("driver.js");

        let mut child = TokioCommand::new(&self.config.node_binary)
            .arg(&script_path)
            .env("NODE_PATH", self.node_modules()?)
            .env("SITEDIFF_BROWSER", self.config.browser.as_str())
            .env("SITEDIFF_HEADLESS", if self.config.headless { "1" } else { "0" })
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SiteDiffError::Browser(format!(
                    "failed to spawn {}: {}",
                    self.config.node_binary.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SiteDiffError::Browser("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SiteDiffError::Browser("driver stdout unavailable".to_string()))?;

        debug!("Spawned Playwright driver (pid {:?})", child.id());

        Ok(Box::new(PlaywrightSession {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
        }))
    }

    fn name(&self) -> &str {
        self.config.browser.as_str()
    }
}

#[derive(Debug, Deserialize)]
struct DriverResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    kind: Option<String>,
}

impl DriverResponse {
    fn failure(&self) -> String {
        self.error.clone().unwrap_or_else(|| "unknown driver error".to_string())
    }

    fn into_result(self, op: &str) -> SiteDiffResult<Value> {
        if self.ok {
            Ok(self.result)
        } else {
            Err(SiteDiffError::Browser(format!("{} failed: {}", op, self.failure())))
        }
    }
}

/// One Playwright browser context living in a `node` child process
pub struct PlaywrightSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl PlaywrightSession {
    async fn call(
        &mut self,
        op: &str,
        params: Value,
        deadline: Duration,
    ) -> SiteDiffResult<DriverResponse> {
        self.next_id += 1;
        let id = self.next_id;

        let mut request = json!({ "id": id, "op": op });
        if let (Value::Object(map), Value::Object(extra)) = (&mut request, params) {
            map.extend(extra);
        }
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        debug!(op, id, "playwright request");
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        match tokio::time::timeout(deadline, self.read_response(id)).await {
            Ok(response) => response,
            Err(_) => Err(SiteDiffError::Browser(format!(
                "driver did not answer '{}' within {:?}",
                op, deadline
            ))),
        }
    }

    async fn read_response(&mut self, id: u64) -> SiteDiffResult<DriverResponse> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or_else(|| SiteDiffError::Browser("driver exited unexpectedly".to_string()))?;

            match serde_json::from_str::<DriverResponse>(&line) {
                Ok(response) if response.id == id => return Ok(response),
                Ok(response) => debug!("Ignoring stale driver response {}", response.id),
                Err(_) => debug!("driver: {}", line),
            }
        }
    }
}

#[async_trait]
impl BrowserSession for PlaywrightSession {
    async fn set_viewport(&mut self, width: u32, height: u32) -> SiteDiffResult<()> {
        self.call(
            "setViewport",
            json!({ "width": width, "height": height }),
            DEFAULT_OP_TIMEOUT,
        )
        .await?
        .into_result("setViewport")?;
        Ok(())
    }

    async fn navigate(
        &mut self,
        url: &str,
        wait: WaitCondition,
        timeout: Duration,
    ) -> SiteDiffResult<()> {
        let timeout_ms = timeout.as_millis() as u64;
        let params = json!({
            "url": url,
            "waitUntil": wait.as_playwright(),
            "timeoutMs": timeout_ms,
        });

        let response = match self.call("navigate", params, timeout + DRIVER_GRACE).await {
            Ok(response) => response,
            Err(SiteDiffError::Browser(reason)) if reason.starts_with("driver did not answer") => {
                return Err(SiteDiffError::NavigationTimeout {
                    url: url.to_string(),
                    timeout_ms,
                })
            }
            Err(e) => return Err(e),
        };

        if response.ok {
            return Ok(());
        }
        match response.kind.as_deref() {
            Some("timeout") => Err(SiteDiffError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms,
            }),
            _ => Err(SiteDiffError::Navigation {
                url: url.to_string(),
                reason: response.failure(),
            }),
        }
    }

    async fn evaluate(&mut self, script: &str) -> SiteDiffResult<Value> {
        self.call("evaluate", json!({ "script": script }), DEFAULT_OP_TIMEOUT)
            .await?
            .into_result("evaluate")
    }

    async fn screenshot(&mut self, options: ScreenshotOptions) -> SiteDiffResult<Vec<u8>> {
        let params = json!({
            "fullPage": options.full_page,
            "disableAnimations": options.disable_animations,
        });
        let result = self
            .call("screenshot", params, DEFAULT_OP_TIMEOUT)
            .await?
            .into_result("screenshot")
            .map_err(|e| SiteDiffError::CaptureFailure(e.to_string()))?;

        let encoded = result.as_str().ok_or_else(|| {
            SiteDiffError::CaptureFailure("screenshot result is not a base64 string".to_string())
        })?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| {
                SiteDiffError::CaptureFailure(format!("invalid screenshot payload: {}", e))
            })
    }

    async fn close(mut self: Box<Self>) -> SiteDiffResult<()> {
        if let Err(e) = self.call("close", json!({}), CLOSE_TIMEOUT).await {
            warn!("Playwright driver did not close cleanly: {}", e);
        }
        match tokio::time::timeout(CLOSE_TIMEOUT, self.child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                warn!("Killing unresponsive Playwright driver");
                self.child.kill().await?;
            }
        }
        Ok(())
    }
}
