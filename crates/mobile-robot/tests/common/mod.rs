#![allow(dead_code)]

use async_trait::async_trait;
use mobile_robot::command::{CommandOutput, CommandRequest, CommandRunner};
use mobile_robot::{Result, RobotConfig, RobotError};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::process::Child;
use warp::Filter;
use warp::http::{Method, StatusCode};
use warp::hyper::body::Bytes;

#[derive(Clone)]
enum Outcome {
    Stdout(Vec<u8>),
    Fail(String),
}

struct Rule {
    pattern: String,
    outcomes: VecDeque<Outcome>,
}

/// Command runner double. Each rule matches a substring of
/// `"<program> <args...>"`; a rule with several outcomes plays them in order
/// and then repeats the last one. Unmatched commands succeed silently.
/// Detached spawns fail unless a stand-in process is set with `spawning`.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
    stand_in: Option<Vec<String>>,
    spawned: Mutex<Vec<u32>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, pattern: &str, stdout: impl Into<Vec<u8>>) -> Self {
        self.push(pattern, vec![Outcome::Stdout(stdout.into())])
    }

    pub fn on_sequence(self, pattern: &str, outputs: &[&str]) -> Self {
        let outcomes = outputs
            .iter()
            .map(|s| Outcome::Stdout(s.as_bytes().to_vec()))
            .collect();
        self.push(pattern, outcomes)
    }

    pub fn fail(self, pattern: &str, output: &str) -> Self {
        self.push(pattern, vec![Outcome::Fail(output.to_string())])
    }

    /// Runs `command` on the host in place of every detached spawn.
    pub fn spawning(mut self, command: &[&str]) -> Self {
        self.stand_in = Some(command.iter().map(|s| s.to_string()).collect());
        self
    }

    fn push(self, pattern: &str, outcomes: Vec<Outcome>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            outcomes: outcomes.into(),
        });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.calls().iter().filter(|call| call.contains(needle)).count()
    }

    /// Process ids of the stand-in processes started so far.
    pub fn spawned(&self) -> Vec<u32> {
        self.spawned.lock().unwrap().clone()
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, request: CommandRequest) -> Result<CommandOutput> {
        let line = format!("{} {}", request.program, request.args.join(" "));
        self.calls.lock().unwrap().push(line.clone());

        let outcome = {
            let mut rules = self.rules.lock().unwrap();
            rules
                .iter_mut()
                .find(|rule| line.contains(&rule.pattern))
                .and_then(|rule| {
                    if rule.outcomes.len() > 1 {
                        rule.outcomes.pop_front()
                    } else {
                        rule.outcomes.front().cloned()
                    }
                })
        };

        match outcome {
            Some(Outcome::Fail(output)) => Err(RobotError::Command {
                program: request.program,
                args: request.args,
                code: Some(1),
                output,
            }),
            Some(Outcome::Stdout(stdout)) => Ok(CommandOutput {
                stdout,
                stderr: Vec::new(),
            }),
            None => Ok(CommandOutput::default()),
        }
    }

    fn spawn_detached(&self, program: &str, args: &[String]) -> Result<Child> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", program, args.join(" ")));
        let Some((stand_in, stand_in_args)) = self.stand_in.as_ref().and_then(|c| c.split_first()) else {
            return Err(RobotError::Spawn {
                program: program.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted runner cannot spawn"),
            });
        };
        let child = tokio::process::Command::new(stand_in)
            .args(stand_in_args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RobotError::Spawn {
                program: stand_in.clone(),
                source: e,
            })?;
        if let Some(pid) = child.id() {
            self.spawned.lock().unwrap().push(pid);
        }
        Ok(child)
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub body: Value,
}

#[derive(Default)]
struct AgentState {
    requests: Mutex<Vec<Recorded>>,
    failing: Mutex<Vec<String>>,
    responses: Mutex<Vec<(String, String, Value)>>,
    stalls: Mutex<Vec<(String, String, Duration)>>,
    unready: AtomicBool,
    sessions: AtomicUsize,
}

impl AgentState {
    fn stall_for(&self, method: &str, path: &str) -> Option<Duration> {
        self.stalls
            .lock()
            .unwrap()
            .iter()
            .find(|(m, suffix, _)| m == method && path.ends_with(suffix.as_str()))
            .map(|(_, _, delay)| *delay)
    }

    fn respond(&self, method: &str, path: &str) -> (StatusCode, Value) {
        if self.failing.lock().unwrap().iter().any(|suffix| path.ends_with(suffix.as_str())) {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"value": {"error": "unknown error", "message": "induced failure"}}),
            );
        }
        let canned = self
            .responses
            .lock()
            .unwrap()
            .iter()
            .find(|(m, suffix, _)| m == method && path.ends_with(suffix.as_str()))
            .map(|(_, _, body)| body.clone());
        if let Some(body) = canned {
            return (StatusCode::OK, body);
        }
        match (method, path) {
            ("POST", "/session") => {
                let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
                (
                    StatusCode::OK,
                    json!({"value": {"sessionId": format!("session-{}", n), "capabilities": {}}}),
                )
            }
            ("GET", "/status") if self.unready.load(Ordering::SeqCst) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"value": {"ready": false}}),
            ),
            ("GET", "/status") => (StatusCode::OK, json!({"value": {"ready": true}})),
            _ => (StatusCode::OK, json!({"value": null})),
        }
    }
}

/// WebDriver-style HTTP agent on an ephemeral localhost port. Every request
/// is recorded; sessions are numbered `session-1`, `session-2`, ...
pub struct FakeAgent {
    pub port: u16,
    state: Arc<AgentState>,
}

impl FakeAgent {
    pub async fn start() -> Self {
        let state = Arc::new(AgentState::default());
        let handler_state = state.clone();
        let routes = warp::method()
            .and(warp::path::full())
            .and(warp::body::bytes())
            .and_then(move |method: Method, path: warp::path::FullPath, body: Bytes| {
                let state = handler_state.clone();
                async move {
                    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
                    state.requests.lock().unwrap().push(Recorded {
                        method: method.to_string(),
                        path: path.as_str().to_string(),
                        body,
                    });
                    if let Some(delay) = state.stall_for(method.as_str(), path.as_str()) {
                        tokio::time::sleep(delay).await;
                    }
                    let (status, reply) = state.respond(method.as_str(), path.as_str());
                    Ok::<_, warp::Rejection>(warp::reply::with_status(warp::reply::json(&reply), status))
                }
            });

        let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        Self {
            port: addr.port(),
            state,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Requests whose path ends with `suffix` get a 500.
    pub fn fail(&self, suffix: &str) {
        self.state.failing.lock().unwrap().push(suffix.to_string());
    }

    /// Canned 200 body for `method` on paths ending with `suffix`.
    pub fn respond(&self, method: &str, suffix: &str, body: Value) {
        self.state
            .responses
            .lock()
            .unwrap()
            .push((method.to_string(), suffix.to_string(), body));
    }

    /// Holds `method` requests on paths ending with `suffix` for `delay`
    /// before answering. They are recorded on arrival.
    pub fn stall(&self, method: &str, suffix: &str, delay: Duration) {
        self.state
            .stalls
            .lock()
            .unwrap()
            .push((method.to_string(), suffix.to_string(), delay));
    }

    /// `/status` answers 503 while not ready.
    pub fn set_ready(&self, ready: bool) {
        self.state.unready.store(!ready, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    /// Requests after the readiness probes, as `"METHOD /path"`.
    pub fn calls(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter(|r| r.path != "/status")
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }
}

/// Whether a process with `pid` still exists.
#[cfg(target_os = "linux")]
pub fn process_alive(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{}", pid)).exists()
}

/// A port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn test_config() -> RobotConfig {
    RobotConfig {
        wda_host: "127.0.0.1".to_string(),
        wda_port: closed_port(),
        ios_tunnel_port: closed_port(),
        uia2_host_port: closed_port(),
        command_timeout: Duration::from_secs(5),
        ..RobotConfig::default()
    }
}

/// A PNG header declaring `width` x `height`.
pub fn png_header(width: u32, height: u32) -> Vec<u8> {
    let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    png.extend_from_slice(&13u32.to_be_bytes());
    png.extend_from_slice(b"IHDR");
    png.extend_from_slice(&width.to_be_bytes());
    png.extend_from_slice(&height.to_be_bytes());
    png.extend_from_slice(&[8, 6, 0, 0, 0]);
    png.extend_from_slice(&[0, 0, 0, 0]);
    png
}
