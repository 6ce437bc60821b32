use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::external::{
    Collaborators, CommandOutput, CommandRunner, ProjectScanner, ProjectSnapshot, QueryClient,
};

pub(crate) struct FixedScanner(pub(crate) Option<ProjectSnapshot>);

impl ProjectScanner for FixedScanner {
    fn scan(&self) -> Result<ProjectSnapshot> {
        self.0
            .clone()
            .ok_or_else(|| anyhow!("project root is not readable"))
    }
}

pub(crate) struct FixedQuery(pub(crate) Option<&'static str>);

impl QueryClient for FixedQuery {
    fn graph_query(&self, _query: &str) -> Result<String> {
        self.0
            .map(ToOwned::to_owned)
            .ok_or_else(|| anyhow!("connection refused"))
    }
}

pub(crate) struct FixedShell(pub(crate) Option<CommandOutput>);

impl CommandRunner for FixedShell {
    fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        self.0.clone().ok_or_else(|| {
            anyhow!(
                "baseline command timed out after {} ms: {command}",
                timeout.as_millis()
            )
        })
    }
}

pub(crate) fn demo_snapshot() -> ProjectSnapshot {
    ProjectSnapshot {
        name: "demo".to_string(),
        docs_md_files: 4,
        src_files: 12,
        readme_head: "# Demo project".to_string(),
    }
}

pub(crate) fn healthy_collaborators() -> Collaborators {
    Collaborators {
        scanner: Box::new(FixedScanner(Some(demo_snapshot()))),
        query: Box::new(FixedQuery(Some("modules: engine, store"))),
        shell: Box::new(FixedShell(Some(CommandOutput {
            stdout: "abc123 initial commit\n".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        }))),
    }
}

pub(crate) fn failing_collaborators() -> Collaborators {
    Collaborators {
        scanner: Box::new(FixedScanner(None)),
        query: Box::new(FixedQuery(None)),
        shell: Box::new(FixedShell(None)),
    }
}
