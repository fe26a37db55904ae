//! Bootstrap orchestrator: the ordered checklist that prepares and launches
//! the app.
//!
//! Each step returns a tri-state-plus-skip [`StepOutcome`]; the run loop
//! writes exactly one log line per outcome and applies the step's failure
//! policy: continue, warn and continue, or halt with a diagnostic and a
//! console acknowledgment. The interpreter chosen early in the run is used
//! for every later invocation, and the activation overlay is threaded
//! through explicitly instead of mutating the process environment.

pub mod codemod;
pub mod launch;
pub mod python;

use crate::config::LaunchConfig;
use crate::console::Acknowledge;
use crate::process::{Captured, Invocation, ProcessRunner};
use crate::runlog::RunLog;
use anyhow::{Result, bail};
use log::debug;
use python::{Interpreter, InterpreterSource};
use std::path::PathBuf;
use thiserror::Error;

/// The conditions that abort a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    #[error("Python interpreter not found or not runnable: {path}")]
    InterpreterUnusable { path: PathBuf },

    #[error("failed to install {package}")]
    InstallFailed { package: String },

    #[error(
        "entry file {entry} not found in {dir} \
         (edit streamboot.toml to change the entry filename)"
    )]
    MissingEntry { entry: String, dir: PathBuf },
}

/// Outcome of a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step completed; continue.
    Success(String),
    /// Step did not apply; continue.
    Skipped(String),
    /// Step failed but the run continues.
    Advisory(String),
    /// Step failed and the run must stop.
    Fatal(FatalError),
}

/// Final result of a run.
#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    /// All steps ran; the app exited and the run ended normally.
    Completed,
    /// A fatal step halted the run.
    Aborted(FatalError),
}

impl Verdict {
    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Completed => 0,
            Verdict::Aborted(_) => 1,
        }
    }
}

type StepFn = fn(&mut Orchestrator) -> Result<StepOutcome>;

/// The ordered step table. Order is the contract: a fatal outcome stops
/// iteration; everything else proceeds to the next entry.
const STEPS: &[(&str, StepFn)] = &[
    ("interpreter", Orchestrator::resolve_interpreter),
    ("health-check", Orchestrator::health_check),
    ("activate", Orchestrator::activate),
    ("dependency-probe", Orchestrator::dependency_probe),
    ("dependency-install", Orchestrator::dependency_install),
    ("codemod-select", Orchestrator::select_codemod),
    ("codemod", Orchestrator::run_codemod),
    ("entry-check", Orchestrator::verify_entry),
    ("launch", Orchestrator::launch_app),
];

pub struct Orchestrator {
    config: LaunchConfig,
    app_dir: PathBuf,
    runner: Box<dyn ProcessRunner>,
    ack: Box<dyn Acknowledge>,
    log: RunLog,
    interpreter: Option<Interpreter>,
    env_overlay: Vec<(String, String)>,
    codemod_script: Option<PathBuf>,
    needs_install: bool,
}

impl Orchestrator {
    pub fn new(
        config: LaunchConfig,
        app_dir: PathBuf,
        runner: Box<dyn ProcessRunner>,
        ack: Box<dyn Acknowledge>,
        log: RunLog,
    ) -> Self {
        Self {
            config,
            app_dir,
            runner,
            ack,
            log,
            interpreter: None,
            env_overlay: Vec::new(),
            codemod_script: None,
            needs_install: false,
        }
    }

    /// Run every step in order, applying each step's failure policy.
    pub fn run(&mut self) -> Result<Verdict> {
        self.log
            .step("app-dir", "ok", &self.app_dir.display().to_string())?;

        for (name, step) in STEPS {
            debug!("running step {name}");
            match step(self)? {
                StepOutcome::Success(detail) => {
                    self.log.step(name, "ok", &detail)?;
                }
                StepOutcome::Skipped(detail) => {
                    self.log.step(name, "skipped", &detail)?;
                }
                StepOutcome::Advisory(detail) => {
                    self.log.step(name, "warning", &detail)?;
                    eprintln!("warning: {detail}");
                }
                StepOutcome::Fatal(err) => {
                    self.log.step(name, "fatal", &err.to_string())?;
                    eprintln!("error: {err}");
                    eprintln!("see {} for details", self.log.path().display());
                    self.ack.pause("The launcher cannot continue.")?;
                    return Ok(Verdict::Aborted(err));
                }
            }
        }

        self.ack.pause("The app exited or was closed.")?;
        Ok(Verdict::Completed)
    }

    fn interpreter(&self) -> Result<&Interpreter> {
        match self.interpreter {
            Some(ref interp) => Ok(interp),
            None => bail!("interpreter step has not run"),
        }
    }

    /// Run a captured invocation under the current overlay, mirroring the
    /// command line and its output into the run log.
    fn run_logged(&mut self, inv: Invocation) -> Result<Captured> {
        let inv = inv.envs(&self.env_overlay);
        self.log.line("exec", &inv.display())?;
        let captured = self.runner.run_captured(&inv, self.config.step_timeout())?;
        self.log.output_block("out", &captured.stdout)?;
        self.log.output_block("err", &captured.stderr)?;
        Ok(captured)
    }

    fn resolve_interpreter(&mut self) -> Result<StepOutcome> {
        let interp = python::resolve_interpreter(&self.app_dir, &self.config.venv_dir);
        let detail = match interp.source {
            InterpreterSource::VirtualEnv => {
                format!("virtual environment interpreter {}", interp.path.display())
            }
            InterpreterSource::System => {
                format!("system interpreter {}", interp.path.display())
            }
        };
        self.interpreter = Some(interp);
        Ok(StepOutcome::Success(detail))
    }

    fn health_check(&mut self) -> Result<StepOutcome> {
        let py = self.interpreter()?.path.clone();
        let captured = self.run_logged(python::version_probe(&py))?;
        if captured.success {
            // python2 printed the version banner on stderr
            let banner = first_line(&captured.stdout, &captured.stderr);
            Ok(StepOutcome::Success(format!(
                "{banner} at {}",
                py.display()
            )))
        } else {
            Ok(StepOutcome::Fatal(FatalError::InterpreterUnusable {
                path: py,
            }))
        }
    }

    fn activate(&mut self) -> Result<StepOutcome> {
        let venv = self.app_dir.join(&self.config.venv_dir);
        let hook = python::activation_hook(&venv);
        if !hook.is_file() {
            return Ok(StepOutcome::Skipped(format!(
                "no activation hook at {}",
                hook.display()
            )));
        }

        self.env_overlay = python::activation_overlay(&venv);
        Ok(StepOutcome::Success(format!(
            "environment overlay from {}",
            hook.display()
        )))
    }

    fn dependency_probe(&mut self) -> Result<StepOutcome> {
        let py = self.interpreter()?.path.clone();
        let package = self.config.package.clone();
        let captured = self.run_logged(python::import_probe(&py, &package))?;
        if captured.success {
            self.needs_install = false;
            Ok(StepOutcome::Success(format!(
                "{package} {}",
                captured.stdout.trim()
            )))
        } else {
            self.needs_install = true;
            Ok(StepOutcome::Advisory(format!(
                "{package} is not importable; installing"
            )))
        }
    }

    fn dependency_install(&mut self) -> Result<StepOutcome> {
        if !self.needs_install {
            return Ok(StepOutcome::Skipped("dependency already present".into()));
        }

        let py = self.interpreter()?.path.clone();
        let package = self.config.package.clone();

        let upgrade = self.run_logged(python::pip_upgrade(&py))?;
        if !upgrade.success {
            // an old pip can still install; the real failure surfaces below
            self.log
                .line("launcher", "pip self-upgrade failed, attempting install anyway")?;
        }

        let install = self.run_logged(python::pip_install(&py, &package))?;
        if !install.success {
            return Ok(StepOutcome::Fatal(FatalError::InstallFailed { package }));
        }

        let probe = self.run_logged(python::import_probe(&py, &package))?;
        if probe.success {
            Ok(StepOutcome::Success(format!(
                "installed {package} {}",
                probe.stdout.trim()
            )))
        } else {
            Ok(StepOutcome::Fatal(FatalError::InstallFailed { package }))
        }
    }

    fn select_codemod(&mut self) -> Result<StepOutcome> {
        if self.config.codemod_candidates.is_empty() {
            return Ok(StepOutcome::Skipped("codemod disabled".into()));
        }

        match codemod::select_script(&self.app_dir, &self.config.codemod_candidates) {
            Some(path) => {
                let detail = format!("selected {}", path.display());
                self.codemod_script = Some(path);
                Ok(StepOutcome::Success(detail))
            }
            None => Ok(StepOutcome::Advisory(format!(
                "no codemod script found (looked for {})",
                self.config.codemod_candidates.join(", ")
            ))),
        }
    }

    fn run_codemod(&mut self) -> Result<StepOutcome> {
        let Some(script) = self.codemod_script.clone() else {
            return Ok(StepOutcome::Skipped("no codemod script selected".into()));
        };

        let py = self.interpreter()?.path.clone();
        let captured = self.run_logged(codemod::run_invocation(&py, &script, &self.app_dir))?;
        if captured.success {
            Ok(StepOutcome::Success(format!("applied {}", script.display())))
        } else {
            self.ack.pause(&format!(
                "Codemod {} failed; continuing to launch anyway.",
                script.display()
            ))?;
            Ok(StepOutcome::Advisory(format!(
                "codemod {} failed",
                script.display()
            )))
        }
    }

    fn verify_entry(&mut self) -> Result<StepOutcome> {
        let entry = launch::entry_path(&self.app_dir, &self.config.entry);
        if entry.is_file() {
            Ok(StepOutcome::Success(entry.display().to_string()))
        } else {
            Ok(StepOutcome::Fatal(FatalError::MissingEntry {
                entry: self.config.entry.clone(),
                dir: self.app_dir.clone(),
            }))
        }
    }

    fn launch_app(&mut self) -> Result<StepOutcome> {
        let py = self.interpreter()?.path.clone();
        let inv = launch::launch_invocation(
            &py,
            &self.app_dir,
            &self.config.package,
            &self.config.entry,
            self.config.port,
        )
        .envs(&self.env_overlay);

        self.log.line("exec", &inv.display())?;
        eprintln!(
            "Launching {} on port {}...",
            self.config.entry, self.config.port
        );

        // Foreground: the app owns the console until it exits or the user
        // interrupts it. Either way the run ends normally.
        let exit = self.runner.run_foreground(&inv, self.config.step_timeout())?;
        let detail = if exit.timed_out {
            "app stopped after the configured timeout".to_string()
        } else {
            match exit.exit_code {
                Some(code) => format!("app exited with code {code}"),
                None => "app terminated by signal".to_string(),
            }
        };
        Ok(StepOutcome::Success(detail))
    }
}

fn first_line<'a>(stdout: &'a str, stderr: &'a str) -> &'a str {
    stdout
        .lines()
        .chain(stderr.lines())
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::AutoAck;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::rc::Rc;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Scripted process double: classifies invocations by shape, fails the
    /// configured kinds a configured number of times, and records everything.
    #[derive(Clone, Default)]
    struct ScriptedRunner {
        state: Rc<RunnerState>,
    }

    #[derive(Default)]
    struct RunnerState {
        fail_counts: RefCell<HashMap<String, usize>>,
        invocations: RefCell<Vec<Invocation>>,
    }

    impl ScriptedRunner {
        fn ok() -> Self {
            Self::default()
        }

        /// Fail `kind` the first `times` invocations, then succeed.
        /// `usize::MAX` means always fail.
        fn failing(kind: &str, times: usize) -> Self {
            let runner = Self::default();
            runner
                .state
                .fail_counts
                .borrow_mut()
                .insert(kind.to_string(), times);
            runner
        }

        fn kind(inv: &Invocation) -> String {
            let args: Vec<&str> = inv.args.iter().map(String::as_str).collect();
            match args.as_slice() {
                ["--version"] => "version".into(),
                ["-c", ..] => "import".into(),
                ["-m", "pip", "install", "--upgrade", "pip"] => "pip-upgrade".into(),
                ["-m", "pip", "install", ..] => "pip-install".into(),
                ["-m", _, "run", ..] => "launch".into(),
                [first, ..] if first.ends_with(".py") => "codemod".into(),
                _ => "other".into(),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.state
                .invocations
                .borrow()
                .iter()
                .map(Self::kind)
                .collect()
        }

        fn last_invocation(&self) -> Invocation {
            self.state.invocations.borrow().last().unwrap().clone()
        }

        fn respond(&self, inv: &Invocation) -> Captured {
            let kind = Self::kind(inv);
            self.state.invocations.borrow_mut().push(inv.clone());

            let mut counts = self.state.fail_counts.borrow_mut();
            let fail = match counts.get_mut(&kind) {
                Some(n) if *n > 0 => {
                    if *n != usize::MAX {
                        *n -= 1;
                    }
                    true
                }
                _ => false,
            };

            if fail {
                Captured {
                    success: false,
                    exit_code: Some(1),
                    stdout: String::new(),
                    stderr: format!("{kind} failed"),
                    timed_out: false,
                }
            } else {
                Captured {
                    success: true,
                    exit_code: Some(0),
                    stdout: format!("{kind} ok"),
                    stderr: String::new(),
                    timed_out: false,
                }
            }
        }
    }

    impl ProcessRunner for ScriptedRunner {
        fn run_captured(&self, inv: &Invocation, _timeout: Option<Duration>) -> Result<Captured> {
            Ok(self.respond(inv))
        }

        fn run_foreground(&self, inv: &Invocation, _timeout: Option<Duration>) -> Result<Captured> {
            Ok(self.respond(inv))
        }
    }

    /// Acknowledge double that records every pause.
    #[derive(Clone, Default)]
    struct RecordingAck {
        pauses: Rc<RefCell<Vec<String>>>,
    }

    impl Acknowledge for RecordingAck {
        fn pause(&self, message: &str) -> Result<()> {
            self.pauses.borrow_mut().push(message.to_string());
            Ok(())
        }
    }

    struct AppDir {
        dir: TempDir,
    }

    impl AppDir {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
            }
        }

        fn with_venv(self) -> Self {
            let venv = self.dir.path().join(".venv");
            let py = python::venv_python(&venv);
            fs::create_dir_all(py.parent().unwrap()).unwrap();
            fs::write(&py, "").unwrap();
            fs::write(python::activation_hook(&venv), "").unwrap();
            self
        }

        fn with_codemod(self) -> Self {
            fs::write(
                self.dir.path().join("apply_export_preview_and_inputs.py"),
                "",
            )
            .unwrap();
            self
        }

        fn with_entry(self) -> Self {
            fs::write(self.dir.path().join("Home.py"), "").unwrap();
            self
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }
    }

    fn orchestrator(
        app: &AppDir,
        runner: ScriptedRunner,
        ack: impl Acknowledge + 'static,
    ) -> (Orchestrator, PathBuf) {
        let log = RunLog::create(app.path()).unwrap();
        let log_path = log.path().to_path_buf();
        let orch = Orchestrator::new(
            LaunchConfig::default(),
            app.path().to_path_buf(),
            Box::new(runner),
            Box::new(ack),
            log,
        );
        (orch, log_path)
    }

    #[test]
    fn test_scenario_a_system_python_dep_present() {
        // fresh checkout: no venv, dependency on system python, codemod and
        // entry present
        let app = AppDir::new().with_codemod().with_entry();
        let runner = ScriptedRunner::ok();
        let (mut orch, _) = orchestrator(&app, runner.clone(), AutoAck);

        let verdict = orch.run().unwrap();
        assert_eq!(verdict, Verdict::Completed);
        assert_eq!(verdict.exit_code(), 0);
        assert_eq!(runner.calls(), vec!["version", "import", "codemod", "launch"]);

        let launch = runner.last_invocation();
        assert_eq!(launch.args[..3], ["-m", "streamlit", "run"]);
        assert!(launch.args.contains(&"Home.py".to_string()));
        assert!(launch.args.contains(&"8501".to_string()));
    }

    #[test]
    fn test_scenario_b_venv_with_missing_dep() {
        let app = AppDir::new().with_venv().with_codemod().with_entry();
        let runner = ScriptedRunner::failing("import", 1);
        let (mut orch, _) = orchestrator(&app, runner.clone(), AutoAck);

        let verdict = orch.run().unwrap();
        assert_eq!(verdict, Verdict::Completed);
        assert_eq!(
            runner.calls(),
            vec![
                "version",
                "import",
                "pip-upgrade",
                "pip-install",
                "import",
                "codemod",
                "launch"
            ]
        );

        // venv interpreter chosen and activation overlay threaded through
        let launch = runner.last_invocation();
        assert!(launch.program.starts_with(app.path()));
        assert!(launch.env.iter().any(|(k, _)| k == "VIRTUAL_ENV"));
    }

    #[test]
    fn test_scenario_c_missing_entry_is_fatal() {
        let app = AppDir::new().with_codemod();
        let runner = ScriptedRunner::ok();
        let ack = RecordingAck::default();
        let (mut orch, _) = orchestrator(&app, runner.clone(), ack.clone());

        let verdict = orch.run().unwrap();
        assert!(matches!(
            verdict,
            Verdict::Aborted(FatalError::MissingEntry { .. })
        ));
        assert_eq!(verdict.exit_code(), 1);
        assert!(!runner.calls().contains(&"launch".to_string()));
        // the fatal path blocked for acknowledgment exactly once
        assert_eq!(ack.pauses.borrow().len(), 1);
    }

    #[test]
    fn test_health_check_failure_stops_everything() {
        let app = AppDir::new().with_codemod().with_entry();
        let runner = ScriptedRunner::failing("version", usize::MAX);
        let (mut orch, _) = orchestrator(&app, runner.clone(), AutoAck);

        let verdict = orch.run().unwrap();
        assert!(matches!(
            verdict,
            Verdict::Aborted(FatalError::InterpreterUnusable { .. })
        ));
        // nothing after the health check ran
        assert_eq!(runner.calls(), vec!["version"]);
    }

    #[test]
    fn test_no_install_when_dependency_present() {
        let app = AppDir::new().with_entry();
        let runner = ScriptedRunner::ok();
        let (mut orch, _) = orchestrator(&app, runner.clone(), AutoAck);

        orch.run().unwrap();
        let calls = runner.calls();
        assert!(!calls.contains(&"pip-upgrade".to_string()));
        assert!(!calls.contains(&"pip-install".to_string()));
    }

    #[test]
    fn test_install_failure_is_fatal() {
        let app = AppDir::new().with_entry();
        let runner = ScriptedRunner::failing("import", usize::MAX);
        let (mut orch, _) = orchestrator(&app, runner.clone(), AutoAck);

        let verdict = orch.run().unwrap();
        assert!(matches!(
            verdict,
            Verdict::Aborted(FatalError::InstallFailed { .. })
        ));
        assert!(!runner.calls().contains(&"launch".to_string()));
    }

    #[test]
    fn test_launch_without_codemod_scripts() {
        let app = AppDir::new().with_entry();
        let runner = ScriptedRunner::ok();
        let (mut orch, log_path) = orchestrator(&app, runner.clone(), AutoAck);

        let verdict = orch.run().unwrap();
        assert_eq!(verdict, Verdict::Completed);
        assert!(runner.calls().contains(&"launch".to_string()));
        assert!(!runner.calls().contains(&"codemod".to_string()));

        let log = fs::read_to_string(log_path).unwrap();
        assert!(log.contains("step codemod-select: warning"));
        assert!(log.contains("step codemod: skipped"));
    }

    #[test]
    fn test_codemod_failure_is_advisory() {
        let app = AppDir::new().with_codemod().with_entry();
        let runner = ScriptedRunner::failing("codemod", usize::MAX);
        let ack = RecordingAck::default();
        let (mut orch, _) = orchestrator(&app, runner.clone(), ack.clone());

        let verdict = orch.run().unwrap();
        assert_eq!(verdict, Verdict::Completed);
        assert!(runner.calls().contains(&"launch".to_string()));
        // user acknowledged the codemod failure, then the normal app exit
        assert_eq!(ack.pauses.borrow().len(), 2);
        assert!(ack.pauses.borrow()[0].contains("Codemod"));
    }

    #[test]
    fn test_one_log_line_per_step() {
        let app = AppDir::new().with_venv().with_codemod().with_entry();
        let runner = ScriptedRunner::ok();
        let (mut orch, log_path) = orchestrator(&app, runner, AutoAck);

        orch.run().unwrap();
        let log = fs::read_to_string(log_path).unwrap();

        let step_names = [
            "app-dir",
            "interpreter",
            "health-check",
            "activate",
            "dependency-probe",
            "dependency-install",
            "codemod-select",
            "codemod",
            "entry-check",
            "launch",
        ];
        for name in step_names {
            let marker = format!("step {name}:");
            let count = log.lines().filter(|l| l.contains(&marker)).count();
            assert_eq!(count, 1, "expected one log line for step {name}");
        }
    }
}
