//! Mapping resolution and detached command launching.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::config::{RepoMapping, RepoTable};
use crate::error::{HookError, Result};
use crate::webhook::RepoTarget;

/// Command run when a mapping declares a path but no actions.
pub const DEFAULT_COMMAND: [&str; 4] = ["git", "pull", "origin", "master"];

/// Finds the mapping for a push: the branch-qualified key wins over the bare repository key.
pub fn resolve<'a>(table: &'a RepoTable, target: &RepoTarget) -> Option<(String, &'a RepoMapping)> {
    if let Some(key) = target.branch_key() {
        if let Some(mapping) = table.get(&key) {
            return Some((key, mapping));
        }
    }
    let key = target.repo_key();
    table.get(&key).map(|mapping| (key, mapping))
}

/// Everything needed to start one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Overrides layered on top of the service's own environment.
    pub env: HashMap<String, String>,
}

impl fmt::Display for LaunchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// The processes a mapping asks for, in declaration order.
///
/// Empty when the mapping has no path.
pub fn plan(mapping: &RepoMapping) -> Vec<LaunchSpec> {
    let Some(cwd) = &mapping.path else {
        return Vec::new();
    };

    let make = |program: &str, args: &[String]| LaunchSpec {
        program: program.to_string(),
        args: args.to_vec(),
        cwd: cwd.clone(),
        env: mapping.env.clone(),
    };

    match mapping.commands() {
        Some(commands) => commands
            .iter()
            .filter_map(|cmd| cmd.program().map(|program| make(program, cmd.args())))
            .collect(),
        None => {
            let args: Vec<String> = DEFAULT_COMMAND[1..].iter().map(|a| a.to_string()).collect();
            vec![make(DEFAULT_COMMAND[0], &args)]
        }
    }
}

/// Starts processes without waiting on them.
pub trait ProcessLauncher: Send + Sync {
    /// Start `spec` and return as soon as the process exists. Exit status is not reported back.
    fn launch(&self, spec: &LaunchSpec) -> Result<()>;
}

/// Launches real OS processes through `tokio::process`.
///
/// Each child is reaped by a background task that only logs its exit status.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<()> {
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| HookError::Spawn {
                program: spec.program.clone(),
                cwd: spec.cwd.clone(),
                source,
            })?;

        let label = spec.to_string();
        let pid = child.id();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!("'{}' (pid {:?}) exited with {}", label, pid, status),
                Err(e) => warn!("Could not wait on '{}' (pid {:?}): {}", label, pid, e),
            }
        });
        Ok(())
    }
}

/// Launch every process the mapping asks for and return how many started.
///
/// A failed launch is logged and does not stop the remaining commands.
pub fn dispatch(mapping: &RepoMapping, launcher: &dyn ProcessLauncher, delivery: &str) -> usize {
    let specs = plan(mapping);
    if specs.is_empty() {
        info!("[{}] Mapping has no path, nothing to run", delivery);
        return 0;
    }

    let mut started = 0;
    for spec in &specs {
        info!("[{}] Running (cwd = {:?}): {}", delivery, spec.cwd, spec);
        match launcher.launch(spec) {
            Ok(()) => started += 1,
            Err(e) => error!("[{}] {}", delivery, e),
        }
    }
    started
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommandLine;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        launched: Mutex<Vec<LaunchSpec>>,
        fail_program: Option<&'static str>,
    }

    impl ProcessLauncher for Recorder {
        fn launch(&self, spec: &LaunchSpec) -> Result<()> {
            if self.fail_program == Some(spec.program.as_str()) {
                return Err(HookError::Spawn {
                    program: spec.program.clone(),
                    cwd: spec.cwd.clone(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            self.launched.lock().unwrap().push(spec.clone());
            Ok(())
        }
    }

    fn target(branch: Option<&str>) -> RepoTarget {
        RepoTarget {
            owner: "o".into(),
            name: "r".into(),
            branch: branch.map(String::from),
        }
    }

    fn table(json: &str) -> RepoTable {
        RepoTable::from_json(std::path::Path::new("repos.json"), json).unwrap()
    }

    fn argv(args: &[&str]) -> CommandLine {
        CommandLine(args.iter().map(|a| a.to_string()).collect())
    }

    #[test]
    fn branch_key_takes_precedence() {
        let table = table(r#"{"o/r": {"path": "/repo"}, "o/r/branch:main": {"path": "/main"}}"#);
        let (key, mapping) = resolve(&table, &target(Some("main"))).unwrap();
        assert_eq!(key, "o/r/branch:main");
        assert_eq!(mapping.path, Some(PathBuf::from("/main")));
    }

    #[test]
    fn falls_back_to_repo_key() {
        let table = table(r#"{"o/r": {"path": "/repo"}, "o/r/branch:dev": {"path": "/dev"}}"#);
        let (key, _) = resolve(&table, &target(Some("main"))).unwrap();
        assert_eq!(key, "o/r");

        let (key, _) = resolve(&table, &target(None)).unwrap();
        assert_eq!(key, "o/r");
    }

    #[test]
    fn miss_resolves_to_none() {
        let table = table(r#"{"x/y": {"path": "/y"}}"#);
        assert!(resolve(&table, &target(Some("main"))).is_none());
    }

    #[test]
    fn no_path_plans_nothing() {
        let mapping = RepoMapping {
            action: Some(vec![argv(&["make"])]),
            ..Default::default()
        };
        assert!(plan(&mapping).is_empty());

        let recorder = Recorder::default();
        assert_eq!(dispatch(&mapping, &recorder, "test"), 0);
        assert!(recorder.launched.lock().unwrap().is_empty());
    }

    #[test]
    fn default_command_is_git_pull() {
        let mapping = RepoMapping {
            path: Some(PathBuf::from("/srv/r")),
            ..Default::default()
        };
        let specs = plan(&mapping);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].program, "git");
        assert_eq!(specs[0].args, ["pull", "origin", "master"]);
        assert_eq!(specs[0].cwd, PathBuf::from("/srv/r"));
        assert_eq!(specs[0].to_string(), "git pull origin master");
    }

    #[test]
    fn custom_actions_keep_order_cwd_and_env() {
        let mapping = RepoMapping {
            path: Some(PathBuf::from("/srv/r")),
            action: Some(vec![argv(&["make", "build"]), argv(&["./deploy.sh", "--fast"])]),
            env: HashMap::from([("STAGE".to_string(), "prod".to_string())]),
        };

        let recorder = Recorder::default();
        assert_eq!(dispatch(&mapping, &recorder, "test"), 2);

        let launched = recorder.launched.lock().unwrap();
        assert_eq!(launched[0].program, "make");
        assert_eq!(launched[0].args, ["build"]);
        assert_eq!(launched[1].program, "./deploy.sh");
        assert_eq!(launched[1].args, ["--fast"]);
        for spec in launched.iter() {
            assert_eq!(spec.cwd, PathBuf::from("/srv/r"));
            assert_eq!(spec.env.get("STAGE").map(String::as_str), Some("prod"));
        }
    }

    #[test]
    fn failed_launch_does_not_stop_the_rest() {
        let mapping = RepoMapping {
            path: Some(PathBuf::from("/srv/r")),
            action: Some(vec![argv(&["missing-tool"]), argv(&["make"])]),
            ..Default::default()
        };
        let recorder = Recorder {
            fail_program: Some("missing-tool"),
            ..Default::default()
        };
        assert_eq!(dispatch(&mapping, &recorder, "test"), 1);
        assert_eq!(recorder.launched.lock().unwrap()[0].program, "make");
    }

    #[tokio::test]
    async fn system_launcher_runs_in_cwd_with_env_overlay() {
        let dir = tempfile::TempDir::new().unwrap();
        let spec = LaunchSpec {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                "printf '%s:%s' \"$HOOK_TEST_VAR\" \"${PATH:+has-path}\" > out.txt".into(),
            ],
            cwd: dir.path().to_path_buf(),
            env: HashMap::from([("HOOK_TEST_VAR".to_string(), "overlaid".to_string())]),
        };
        SystemLauncher.launch(&spec).unwrap();

        let out = dir.path().join("out.txt");
        let mut contents = String::new();
        for _ in 0..100 {
            if let Ok(text) = std::fs::read_to_string(&out) {
                if text.contains(':') {
                    contents = text;
                    break;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(contents, "overlaid:has-path");
    }

    #[tokio::test]
    async fn system_launcher_reports_missing_program() {
        let spec = LaunchSpec {
            program: "/definitely/not/a/program".into(),
            args: Vec::new(),
            cwd: std::env::temp_dir(),
            env: HashMap::new(),
        };
        assert!(matches!(
            SystemLauncher.launch(&spec),
            Err(HookError::Spawn { .. })
        ));
    }
}
