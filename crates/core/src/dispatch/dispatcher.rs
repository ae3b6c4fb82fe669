//! Interpreter fallback chain.
//!
//! For each request the [`Dispatcher`]:
//! 1. Rejects a missing or empty transcript before anything is spawned.
//! 2. Selects the script once (debug variant if present, else primary).
//! 3. Tries each interpreter candidate in order, strictly one at a time.
//!    Candidate N+1 is launched only after candidate N has fully finished
//!    and its failure was classified as retryable by the [`FallbackPolicy`].
//! 4. Returns the first parseable prediction, or the last terminal error.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::attempt::{self, AttemptError};
use super::launcher::ProcessLauncher;
use super::locator::{ScriptLocator, ScriptPaths};
use super::types::{PredictionResponse, ScriptPayload};
use crate::error::DispatchError;

/// Interpreter commands tried when none are configured.
pub const DEFAULT_INTERPRETERS: [&str; 3] = ["python3", "python", "py"];

/// Default bound on a single interpreter attempt.
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Which failures move on to the next interpreter candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Every per-attempt failure is retryable; only the last candidate's
    /// failure is returned.
    #[default]
    Consistent,
    /// Only spawn failures, non-zero exits and timeouts are retryable.
    /// A zero exit with empty or non-JSON stdout ends the chain at once.
    Legacy,
}

impl FallbackPolicy {
    pub fn from_retry_on_bad_output(retry: bool) -> Self {
        if retry {
            Self::Consistent
        } else {
            Self::Legacy
        }
    }

    fn is_retryable(self, err: &DispatchError) -> bool {
        match err {
            DispatchError::Spawn { .. }
            | DispatchError::ScriptExecution { .. }
            | DispatchError::TimedOut { .. } => true,
            DispatchError::EmptyOutput { .. } | DispatchError::MalformedOutput { .. } => {
                self == Self::Consistent
            }
            DispatchError::Validation(_) | DispatchError::NoInterpreters => false,
        }
    }
}

/// Static dispatch settings, fixed at start-up.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub paths: ScriptPaths,
    pub interpreters: Vec<String>,
    pub timeout: Duration,
    pub policy: FallbackPolicy,
}

impl DispatchConfig {
    /// Defaults for the given script root.
    pub fn new(paths: ScriptPaths) -> Self {
        Self {
            paths,
            interpreters: DEFAULT_INTERPRETERS.iter().map(|s| s.to_string()).collect(),
            timeout: DEFAULT_SCRIPT_TIMEOUT,
            policy: FallbackPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_interpreters<I, S>(mut self, interpreters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interpreters = interpreters.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Upper bound on one [`Dispatcher::predict`] call: every candidate
    /// runs into the timeout and is killed.
    pub fn max_chain_duration(&self) -> Duration {
        let per_attempt = self.timeout.saturating_add(attempt::DRAIN_AFTER_KILL);
        let attempts = u32::try_from(self.interpreters.len()).unwrap_or(u32::MAX);
        per_attempt.saturating_mul(attempts.max(1))
    }
}

/// Runs transcripts through the external inference script.
///
/// Cheap to share behind an `Arc`; each call is independent and holds no
/// state across requests.
pub struct Dispatcher {
    launcher: Arc<dyn ProcessLauncher>,
    locator: Arc<dyn ScriptLocator>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        locator: Arc<dyn ScriptLocator>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            launcher,
            locator,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn locator(&self) -> &dyn ScriptLocator {
        self.locator.as_ref()
    }

    /// Produce a prediction for `transcript`.
    pub async fn predict(&self, transcript: &str) -> Result<PredictionResponse, DispatchError> {
        if transcript.is_empty() {
            return Err(DispatchError::transcript_required());
        }
        tracing::info!(transcript_len = transcript.len(), "Received prediction request");

        let selection = self.config.paths.select(self.locator.as_ref());
        tracing::info!(
            script = %selection.path.display(),
            debug = selection.is_debug,
            exists = selection.is_debug || self.locator.exists(&selection.path),
            "Selected inference script"
        );

        let payload = serde_json::to_vec(&ScriptPayload { transcript }).unwrap_or_default();

        let mut candidates = self.config.interpreters.iter().peekable();
        while let Some(command) = candidates.next() {
            let err = match self.attempt(command, &selection.path, &payload).await {
                Ok(response) => {
                    tracing::info!(python_command = %command, "Prediction succeeded");
                    return Ok(response);
                }
                Err(err) => err,
            };

            if candidates.peek().is_none() || !self.config.policy.is_retryable(&err) {
                tracing::error!(
                    python_command = %command,
                    kind = err.kind(),
                    error = %err,
                    "Prediction failed"
                );
                return Err(err);
            }
            tracing::warn!(
                python_command = %command,
                kind = err.kind(),
                error = %err,
                "Interpreter attempt failed, trying next candidate"
            );
        }

        Err(DispatchError::NoInterpreters)
    }

    /// Run one interpreter against `script` and interpret its outcome.
    async fn attempt(
        &self,
        command: &str,
        script: &Path,
        payload: &[u8],
    ) -> Result<PredictionResponse, DispatchError> {
        tracing::info!(python_command = %command, "Trying interpreter");

        let process =
            self.launcher
                .launch(command, script)
                .map_err(|source| DispatchError::Spawn {
                    python_command: command.to_string(),
                    source,
                })?;

        let result = attempt::run_attempt(process, payload, self.config.timeout)
            .await
            .map_err(|e| match e {
                AttemptError::TimedOut {
                    elapsed_ms, stderr, ..
                } => DispatchError::TimedOut {
                    python_command: command.to_string(),
                    script_path: script.to_path_buf(),
                    elapsed_ms,
                    stderr,
                },
                AttemptError::Wait(source) => DispatchError::Spawn {
                    python_command: command.to_string(),
                    source,
                },
            })?;

        tracing::info!(python_command = %command, exit_code = ?result.exit_code, "Interpreter exited");
        if !result.stderr.is_empty() {
            tracing::debug!(python_command = %command, stderr = %result.stderr, "Script stderr");
        }

        if !result.success() {
            return Err(DispatchError::ScriptExecution {
                python_command: command.to_string(),
                script_path: script.to_path_buf(),
                exit_code: result.exit_code.unwrap_or(-1),
                stderr: result.stderr,
            });
        }

        let stdout = result.stdout.trim();
        if stdout.is_empty() {
            return Err(DispatchError::EmptyOutput {
                python_command: command.to_string(),
                stderr: result.stderr,
            });
        }

        match serde_json::from_str::<serde_json::Value>(stdout) {
            Ok(parsed) => {
                tracing::debug!(python_command = %command, "Parsed script output");
                Ok(PredictionResponse::from_script_output(&parsed, command))
            }
            Err(e) => Err(DispatchError::MalformedOutput {
                python_command: command.to_string(),
                reason: e.to_string(),
                output: result.stdout,
                stderr: result.stderr,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::mock::{MockBehavior, MockLauncher, MockLocator};

    fn paths() -> ScriptPaths {
        ScriptPaths::from_root("scripts")
    }

    fn dispatcher(launcher: &MockLauncher, policy: FallbackPolicy) -> Dispatcher {
        dispatcher_with_locator(launcher, MockLocator::empty(), policy)
    }

    fn dispatcher_with_locator(
        launcher: &MockLauncher,
        locator: MockLocator,
        policy: FallbackPolicy,
    ) -> Dispatcher {
        Dispatcher::new(
            Arc::new(launcher.clone()),
            Arc::new(locator),
            DispatchConfig::new(paths())
                .with_timeout(Duration::from_millis(200))
                .with_policy(policy),
        )
    }

    #[tokio::test]
    async fn empty_transcript_spawns_nothing() {
        let launcher = MockLauncher::new().on("python3", MockBehavior::succeeds("{}"));
        let result = dispatcher(&launcher, FallbackPolicy::Consistent)
            .predict("")
            .await;
        assert_matches!(result, Err(DispatchError::Validation(_)));
        assert!(launcher.launches().is_empty());
    }

    #[tokio::test]
    async fn first_candidate_success_is_relayed() {
        let launcher = MockLauncher::new().on(
            "python3",
            MockBehavior::succeeds(r#"{"prediction": 62.5, "debug_info": {"chunks": 4}}"#),
        );
        let resp = dispatcher(&launcher, FallbackPolicy::Consistent)
            .predict("First point. Second point.")
            .await
            .expect("prediction");

        assert_eq!(resp.prediction, Some(json!(62.5)));
        assert_eq!(resp.debug_info, Some(json!({"chunks": 4})));
        assert_eq!(resp.python_command, "python3");
        assert_eq!(launcher.launched_programs(), vec!["python3"]);
    }

    #[tokio::test]
    async fn stdin_carries_transcript_json() {
        let launcher =
            MockLauncher::new().on("python3", MockBehavior::succeeds(r#"{"prediction": 1}"#));
        dispatcher(&launcher, FallbackPolicy::Consistent)
            .predict("say \"hi\"")
            .await
            .expect("prediction");

        let payloads = launcher.stdin_payloads().await;
        assert_eq!(payloads.len(), 1);
        let sent: serde_json::Value = serde_json::from_str(&payloads[0]).unwrap();
        assert_eq!(sent, json!({"transcript": "say \"hi\""}));
    }

    #[tokio::test]
    async fn spawn_failure_falls_through_to_next_candidate() {
        let launcher = MockLauncher::new()
            .on("python3", MockBehavior::SpawnFails)
            .on("python", MockBehavior::succeeds(r#"{"prediction": 10}"#));
        let resp = dispatcher(&launcher, FallbackPolicy::Legacy)
            .predict("text")
            .await
            .expect("prediction");

        assert_eq!(resp.python_command, "python");
        assert_eq!(launcher.launched_programs(), vec!["python3", "python"]);
    }

    #[tokio::test]
    async fn all_nonzero_exits_report_last_candidate() {
        let launcher = MockLauncher::new()
            .on("python3", MockBehavior::exits(1, "", "first"))
            .on("python", MockBehavior::exits(2, "", "second"))
            .on("py", MockBehavior::exits(9009, "", "not installed"));
        let result = dispatcher(&launcher, FallbackPolicy::Legacy)
            .predict("text")
            .await;

        assert_matches!(
            result,
            Err(DispatchError::ScriptExecution { python_command, exit_code: 9009, stderr, script_path })
                if python_command == "py"
                    && stderr == "not installed"
                    && script_path == PathBuf::from("scripts/predict.py")
        );
        assert_eq!(launcher.launched_programs(), vec!["python3", "python", "py"]);
    }

    #[tokio::test]
    async fn last_candidate_spawn_failure_is_spawn_error() {
        let launcher = MockLauncher::new().on("python3", MockBehavior::exits(1, "", "boom"));
        let result = dispatcher(&launcher, FallbackPolicy::Consistent)
            .predict("text")
            .await;
        // python and py are unconfigured and fail to spawn.
        assert_matches!(
            result,
            Err(DispatchError::Spawn { python_command, .. }) if python_command == "py"
        );
    }

    #[tokio::test]
    async fn signal_exit_counts_as_failure() {
        let launcher = MockLauncher::new()
            .on("python3", MockBehavior::killed("Killed"))
            .on("python", MockBehavior::succeeds(r#"{"prediction": 3}"#));
        let resp = dispatcher(&launcher, FallbackPolicy::Legacy)
            .predict("text")
            .await
            .expect("prediction");
        assert_eq!(resp.python_command, "python");
    }

    #[tokio::test]
    async fn legacy_empty_output_is_terminal() {
        let launcher = MockLauncher::new()
            .on("python3", MockBehavior::exits(0, "  \n", "model missing"))
            .on("python", MockBehavior::succeeds(r#"{"prediction": 1}"#));
        let result = dispatcher(&launcher, FallbackPolicy::Legacy)
            .predict("text")
            .await;

        assert_matches!(
            result,
            Err(DispatchError::EmptyOutput { python_command, stderr })
                if python_command == "python3" && stderr == "model missing"
        );
        assert_eq!(launcher.launched_programs(), vec!["python3"]);
    }

    #[tokio::test]
    async fn legacy_malformed_output_is_terminal() {
        let launcher = MockLauncher::new()
            .on("python3", MockBehavior::exits(0, "not json", "warn"))
            .on("python", MockBehavior::succeeds(r#"{"prediction": 1}"#));
        let result = dispatcher(&launcher, FallbackPolicy::Legacy)
            .predict("text")
            .await;

        assert_matches!(
            result,
            Err(DispatchError::MalformedOutput { python_command, output, stderr, .. })
                if python_command == "python3" && output == "not json" && stderr == "warn"
        );
        assert_eq!(launcher.launched_programs(), vec!["python3"]);
    }

    #[tokio::test]
    async fn consistent_policy_retries_bad_output() {
        let launcher = MockLauncher::new()
            .on("python3", MockBehavior::succeeds(""))
            .on("python", MockBehavior::succeeds("not json"))
            .on("py", MockBehavior::succeeds(r#"{"prediction": 55}"#));
        let resp = dispatcher(&launcher, FallbackPolicy::Consistent)
            .predict("text")
            .await
            .expect("prediction");

        assert_eq!(resp.python_command, "py");
        assert_eq!(resp.prediction, Some(json!(55)));
    }

    #[tokio::test]
    async fn consistent_policy_returns_last_bad_output() {
        let launcher = MockLauncher::new()
            .on("python3", MockBehavior::succeeds("not json"))
            .on("python", MockBehavior::succeeds("not json"))
            .on("py", MockBehavior::succeeds("still not json"));
        let result = dispatcher(&launcher, FallbackPolicy::Consistent)
            .predict("text")
            .await;

        assert_matches!(
            result,
            Err(DispatchError::MalformedOutput { python_command, output, .. })
                if python_command == "py" && output == "still not json"
        );
    }

    #[tokio::test]
    async fn timeout_kills_and_moves_on() {
        let launcher = MockLauncher::new()
            .on(
                "python3",
                MockBehavior::Hangs {
                    stderr: "loading".to_string(),
                },
            )
            .on("python", MockBehavior::succeeds(r#"{"prediction": 5}"#));
        let resp = dispatcher(&launcher, FallbackPolicy::Legacy)
            .predict("text")
            .await
            .expect("prediction");

        assert_eq!(resp.python_command, "python");
        assert_eq!(launcher.kill_count(), 1);
    }

    #[tokio::test]
    async fn timeout_on_last_candidate_is_reported() {
        let launcher = MockLauncher::new().on(
            "py",
            MockBehavior::Hangs {
                stderr: "stuck".to_string(),
            },
        );
        let d = Dispatcher::new(
            Arc::new(launcher.clone()),
            Arc::new(MockLocator::empty()),
            DispatchConfig::new(paths())
                .with_interpreters(["py"])
                .with_timeout(Duration::from_millis(50)),
        );
        let result = d.predict("text").await;
        assert_matches!(
            result,
            Err(DispatchError::TimedOut { python_command, stderr, .. })
                if python_command == "py" && stderr == "stuck"
        );
    }

    #[tokio::test]
    async fn debug_script_is_passed_to_launcher() {
        let launcher =
            MockLauncher::new().on("python3", MockBehavior::succeeds(r#"{"prediction": 1}"#));
        let locator = MockLocator::with_paths([paths().debug]);
        dispatcher_with_locator(&launcher, locator, FallbackPolicy::Consistent)
            .predict("text")
            .await
            .expect("prediction");

        let launches = launcher.launches();
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].script, PathBuf::from("scripts/debug_predict.py"));
    }

    #[tokio::test]
    async fn script_selected_once_for_all_candidates() {
        let launcher = MockLauncher::new()
            .on("python3", MockBehavior::exits(1, "", ""))
            .on("python", MockBehavior::succeeds(r#"{"prediction": 1}"#));
        dispatcher(&launcher, FallbackPolicy::Consistent)
            .predict("text")
            .await
            .expect("prediction");

        let scripts: Vec<_> = launcher.launches().into_iter().map(|l| l.script).collect();
        assert_eq!(scripts, vec![paths().primary, paths().primary]);
    }

    #[tokio::test]
    async fn empty_interpreter_list_is_configuration_error() {
        let launcher = MockLauncher::new();
        let d = Dispatcher::new(
            Arc::new(launcher),
            Arc::new(MockLocator::empty()),
            DispatchConfig::new(paths()).with_interpreters(Vec::<String>::new()),
        );
        assert_matches!(d.predict("text").await, Err(DispatchError::NoInterpreters));
    }

    #[tokio::test]
    async fn repeated_requests_are_identical() {
        let launcher = MockLauncher::new().on(
            "python3",
            MockBehavior::succeeds(r#"{"prediction": 33.3, "debug_info": null}"#),
        );
        let d = dispatcher(&launcher, FallbackPolicy::Consistent);
        let first = serde_json::to_vec(&d.predict("same").await.expect("first")).unwrap();
        let second = serde_json::to_vec(&d.predict("same").await.expect("second")).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn every_candidate_timing_out_stays_within_chain_bound() {
        let hang = || MockBehavior::Hangs {
            stderr: "stuck".to_string(),
        };
        let launcher = MockLauncher::new()
            .on("python3", hang())
            .on("python", hang())
            .on("py", hang());
        let config = DispatchConfig::new(paths()).with_timeout(Duration::from_millis(100));
        let bound = config.max_chain_duration();
        let d = Dispatcher::new(
            Arc::new(launcher.clone()),
            Arc::new(MockLocator::empty()),
            config,
        );

        let start = std::time::Instant::now();
        let result = d.predict("text").await;

        assert!(start.elapsed() < bound);
        assert_matches!(
            result,
            Err(DispatchError::TimedOut { python_command, .. }) if python_command == "py"
        );
        assert_eq!(launcher.kill_count(), 3);
    }

    #[test]
    fn chain_bound_covers_every_candidate() {
        let config = DispatchConfig::new(paths()).with_timeout(Duration::from_secs(120));
        assert_eq!(config.max_chain_duration(), Duration::from_secs(3 * 121));

        let single = config.with_interpreters(["python3"]);
        assert_eq!(single.max_chain_duration(), Duration::from_secs(121));
    }

    #[test]
    fn policy_from_flag() {
        assert_eq!(
            FallbackPolicy::from_retry_on_bad_output(true),
            FallbackPolicy::Consistent
        );
        assert_eq!(
            FallbackPolicy::from_retry_on_bad_output(false),
            FallbackPolicy::Legacy
        );
    }
}
