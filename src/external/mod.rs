mod project;
mod query;
mod shell;

#[cfg(test)]
pub use project::ProjectSnapshot;
pub use project::{DiskProjectScanner, ProjectScanner, render_project_digest};
pub use query::{HttpQueryClient, QueryClient};
#[cfg(test)]
pub use shell::CommandOutput;
pub use shell::{CommandRunner, ShellCommandRunner};

use crate::config::BenchConfig;

/// External systems a phase may consult. Every call may fail; callers degrade.
pub struct Collaborators {
    pub scanner: Box<dyn ProjectScanner>,
    pub query: Box<dyn QueryClient>,
    pub shell: Box<dyn CommandRunner>,
}

impl Collaborators {
    pub fn from_config(config: &BenchConfig) -> Self {
        Self {
            scanner: Box::new(DiskProjectScanner::new(config.project_root.clone())),
            query: Box::new(HttpQueryClient::new(
                &config.query_endpoint,
                config.query_timeout(),
            )),
            shell: Box::new(ShellCommandRunner::new(config.project_root.clone())),
        }
    }
}
