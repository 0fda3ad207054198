//! Sandboxed trial execution of inline scripts.
//!
//! The process sandbox hands every inline script to an external JavaScript
//! runtime started under its permission model. The host program creates a
//! fresh `vm` context holding only stubs for the browser globals, the timers
//! and the input SDK, then runs each script inside it with a per-script
//! timeout. The scripts never see `require` or `process`. Caught and uncaught
//! errors are written to stderr as marker lines and translated into findings.

use artguard_core::{Category, Finding, Severity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

const ERROR_MARKER: &str = "__ARTGUARD_ERROR__";
const DONE_MARKER: &str = "__ARTGUARD_DONE__";

/// Error raised by a script during the trial run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeError {
    /// Index into the scripts passed to the sandbox
    pub script_index: usize,

    /// `Name: message` as reported by the runtime
    pub message: String,
}

/// Result of a trial run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxOutcome {
    /// All scripts ran; these errors were raised
    Completed(Vec<RuntimeError>),

    /// No runtime could be used
    Unavailable(String),
}

/// Time-bounded isolated execution of script code.
///
/// The detector runs the trial on its own task and aborts it when the time
/// limit expires; implementors must release their resources on drop.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Run the scripts in order in one shared global scope.
    async fn trial_run(&self, scripts: &[String]) -> SandboxOutcome;
}

/// Sandbox that never runs anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSandbox;

#[async_trait]
impl Sandbox for NoopSandbox {
    fn name(&self) -> &str {
        "noop"
    }

    async fn trial_run(&self, _scripts: &[String]) -> SandboxOutcome {
        SandboxOutcome::Unavailable("sandbox disabled".to_string())
    }
}

/// Process sandbox settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Runtime executable
    pub runtime: String,

    /// Arguments making the runtime read the program from stdin
    pub args: Vec<String>,

    /// Globals replaced by inert stubs
    pub stub_globals: Vec<String>,

    /// Execution limit for each script inside the runtime
    pub script_timeout_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runtime: "node".to_string(),
            // no file system, child process or worker access for the trial
            args: vec!["--experimental-permission".to_string(), "-".to_string()],
            stub_globals: vec!["InputBridge".to_string()],
            script_timeout_ms: 200,
        }
    }
}

/// Sandbox backed by an external JavaScript runtime process.
#[derive(Debug, Clone, Default)]
pub struct ProcessSandbox {
    config: SandboxConfig,
}

impl ProcessSandbox {
    /// Create a process sandbox.
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// The program fed to the runtime.
    pub fn program(&self, scripts: &[String]) -> String {
        let mut globals = String::from(CONTEXT_PRELUDE);
        for global in &self.config.stub_globals {
            globals.push_str(&format!("globalThis[{}] = __stub();\n", js_string(global)));
        }

        let mut program = String::from(HOST_PRELUDE);
        program.push_str(&format!(
            "__vm.runInContext({}, __ctx, {{ filename: 'prelude.js' }});\n",
            js_string(&globals)
        ));
        for (i, script) in scripts.iter().enumerate() {
            program.push_str(&format!(
                "try {{ __vm.runInContext({}, __ctx, {{ filename: 'script-{}.js', timeout: {} }}); }} catch (e) {{ __report({}, e); }}\n",
                js_string(script),
                i,
                self.config.script_timeout_ms.max(1),
                i
            ));
        }
        program.push_str(&format!("process.stderr.write('{}\\n');\n", DONE_MARKER));
        program
    }
}

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    fn name(&self) -> &str {
        &self.config.runtime
    }

    async fn trial_run(&self, scripts: &[String]) -> SandboxOutcome {
        let mut cmd = Command::new(&self.config.runtime);
        cmd.args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return SandboxOutcome::Unavailable(format!(
                    "cannot start '{}': {}",
                    self.config.runtime, e
                ))
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            let program = self.program(scripts);
            if let Err(e) = stdin.write_all(program.as_bytes()).await {
                return SandboxOutcome::Unavailable(format!("cannot feed runtime: {}", e));
            }
        }

        let output = match child.wait_with_output().await {
            Ok(output) => output,
            Err(e) => return SandboxOutcome::Unavailable(format!("runtime failed: {}", e)),
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);
        if !stderr.lines().any(|line| line == DONE_MARKER) {
            let detail = stderr
                .lines()
                .find(|line| !line.trim().is_empty() && !line.starts_with(ERROR_MARKER))
                .unwrap_or("no output");
            return SandboxOutcome::Unavailable(format!(
                "runtime exited early with code {}: {}",
                exit_code, detail
            ));
        }

        let errors = parse_errors(&stderr);
        debug!(
            runtime = %self.config.runtime,
            exit_code,
            errors = errors.len(),
            "trial run finished"
        );
        SandboxOutcome::Completed(errors)
    }
}

// Runs in the host realm. Nothing defined here is reachable from the scripts.
const HOST_PRELUDE: &str = r#"'use strict';
const __vm = require('vm');
const __report = (i, e) => {
  const m = (e && e.name && e.message) ? e.name + ': ' + e.message : String(e);
  process.stderr.write('__ARTGUARD_ERROR__\t' + i + '\t' + JSON.stringify(m) + '\n');
};
process.on('uncaughtException', (e) => __report(-1, e));
const __ctx = __vm.createContext(Object.create(null), {
  name: 'artguard-trial',
  codeGeneration: { strings: false, wasm: false },
  microtaskMode: 'afterEvaluate',
});
"#;

// Runs inside the trial context, so every stub belongs to that realm.
const CONTEXT_PRELUDE: &str = r#"'use strict';
const __stub = () => new Proxy(function () {}, {
  get: (t, k) => (k === 'then' ? undefined : k === Symbol.toPrimitive ? () => 0 : __stub()),
  set: () => true,
  apply: () => __stub(),
  construct: () => __stub(),
});
globalThis.window = globalThis;
globalThis.self = globalThis;
globalThis.console = __stub();
globalThis.document = __stub();
globalThis.navigator = __stub();
globalThis.localStorage = __stub();
globalThis.location = __stub();
globalThis.Image = function () { return __stub(); };
globalThis.Audio = function () { return __stub(); };
globalThis.addEventListener = () => {};
globalThis.removeEventListener = () => {};
globalThis.requestAnimationFrame = () => 0;
globalThis.cancelAnimationFrame = () => {};
globalThis.setInterval = () => 0;
globalThis.setTimeout = () => 0;
globalThis.clearInterval = () => {};
globalThis.clearTimeout = () => {};
globalThis.alert = () => {};
"#;

/// Parse marker lines written by the prelude.
pub fn parse_errors(stderr: &str) -> Vec<RuntimeError> {
    stderr
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix(ERROR_MARKER)?.strip_prefix('\t')?;
            let (index, message) = rest.split_once('\t')?;
            let message: String = serde_json::from_str(message).ok()?;
            // uncaught errors carry index -1 and are attributed to the first script
            let script_index = index.parse::<i64>().ok()?.max(0) as usize;
            Some(RuntimeError {
                script_index,
                message,
            })
        })
        .collect()
}

/// Translate a runtime error into a finding.
pub fn translate_error(error: &RuntimeError) -> Finding {
    let message = error.message.as_str();
    let (kind, severity, category) = if message.starts_with("SyntaxError") {
        ("script-syntax-error", Severity::Critical, Category::Syntax)
    } else if message.contains("Script execution timed out") {
        ("script-timeout", Severity::High, Category::Performance)
    } else if message.contains("Maximum call stack size exceeded") {
        ("runaway-recursion", Severity::Critical, Category::Performance)
    } else if message.contains("is not defined") {
        ("undefined-reference", Severity::High, Category::RuntimeSafety)
    } else if message.contains("Cannot read properties of undefined")
        || message.contains("Cannot read properties of null")
        || message.contains("Cannot set properties of undefined")
        || message.contains("Cannot set properties of null")
    {
        ("null-property-access", Severity::High, Category::RuntimeSafety)
    } else if message.contains("is not a function") {
        ("not-a-function", Severity::High, Category::RuntimeSafety)
    } else {
        ("runtime-error", Severity::Medium, Category::RuntimeSafety)
    };
    Finding::new(kind, severity, category, message)
}

/// Recommendation for a finding kind produced by [`translate_error`].
pub fn runtime_advice(kind: &str) -> Option<&'static str> {
    Some(match kind {
        "script-syntax-error" => "fix the script syntax error; the script does not run at all",
        "runaway-recursion" => "add a base case to the recursive function",
        "script-timeout" => "the script does not finish loading; look for a loop that never ends",
        "undefined-reference" => "declare the variable or function before using it",
        "null-property-access" => "guard property reads on values that may be missing",
        "not-a-function" => "check the called name and that the API exists",
        "runtime-error" => "the script throws while loading; check the reported error",
        _ => return None,
    })
}
