use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    PreSummary,
    FeaturePlan,
    DocsStepUpdate,
    Implementation,
    Tests,
    DocsPostImpl,
    RevertAndCleanup,
    PostSummary,
}

impl PhaseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreSummary => "pre_summary",
            Self::FeaturePlan => "feature_plan",
            Self::DocsStepUpdate => "docs_step_update",
            Self::Implementation => "implementation",
            Self::Tests => "tests",
            Self::DocsPostImpl => "docs_post_impl",
            Self::RevertAndCleanup => "revert_and_cleanup",
            Self::PostSummary => "post_summary",
        }
    }

    /// Short prompt used to seed the bounded context of each phase.
    pub fn context_template(self) -> &'static str {
        match self {
            Self::PreSummary => "Summarize repository state from docs+code only.",
            Self::FeaturePlan => "Create minimal feature plan from current state and constraints.",
            Self::DocsStepUpdate => "Update step docs using plan deltas only.",
            Self::Implementation => "Apply minimal implementation according to plan.",
            Self::Tests => "Run scoped tests and return compact evidence.",
            Self::DocsPostImpl => "Update implementation/test docs with final evidence.",
            Self::RevertAndCleanup => "Revert synthetic changes and verify clean state.",
            Self::PostSummary => "Summarize repository again using docs+code only.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Phase {
    pub order: u32,
    pub kind: PhaseKind,
    pub objective: &'static str,
    pub context_boundary: &'static str,
    pub expected_artifacts: &'static [&'static str],
    pub documentation_targets: &'static [&'static str],
    pub requires_revert: bool,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn artifact_stem(&self) -> String {
        format!("{:02}_{}", self.order, self.name())
    }
}

pub fn build_phase_catalog() -> Vec<Phase> {
    vec![
        Phase {
            order: 1,
            kind: PhaseKind::PreSummary,
            objective: "Summarize current project state by reading documentation and codebase only. \
                        Do not use pending local changes as evidence.",
            context_boundary: "Fresh context: docs + codebase only.",
            expected_artifacts: &["project_state_summary"],
            documentation_targets: &["docs/AGENT_MODE_BENCHMARK.md"],
            requires_revert: false,
        },
        Phase {
            order: 2,
            kind: PhaseKind::FeaturePlan,
            objective: "Plan one feature with explicit tasks, checkpoints, and validation criteria; \
                        save plan in graph objects (graph method) and markdown artifacts (baseline method).",
            context_boundary: "Use only phase 1 summary + live code/docs.",
            expected_artifacts: &["feature_plan", "acceptance_criteria"],
            documentation_targets: &["graph://plan/*", "docs/agent-mode-baseline-plan.md"],
            requires_revert: false,
        },
        Phase {
            order: 3,
            kind: PhaseKind::DocsStepUpdate,
            objective: "Update documentation for planning step before coding. \
                        Graph method records plan context in graph; baseline updates markdown files.",
            context_boundary: "Use only plan artifacts and repository docs.",
            expected_artifacts: &["plan_doc_update"],
            documentation_targets: &[
                "graph://docs/plan-context",
                "docs/agent-mode-baseline-plan.md",
            ],
            requires_revert: false,
        },
        Phase {
            order: 4,
            kind: PhaseKind::Implementation,
            objective: "Implement planned feature with minimal scope and update context links to \
                        changed files for traceability.",
            context_boundary: "Use plan + current code only; no hidden assumptions.",
            expected_artifacts: &["code_changes", "change_trace_links"],
            documentation_targets: &[
                "graph://changes/*",
                "docs/agent-mode-baseline-implementation.md",
            ],
            requires_revert: false,
        },
        Phase {
            order: 5,
            kind: PhaseKind::Tests,
            objective: "Execute tests for the planned feature scope, record pass/fail, and map test \
                        evidence to the plan.",
            context_boundary: "Use changed files + nearest tests only.",
            expected_artifacts: &["test_results", "plan_to_test_mapping"],
            documentation_targets: &["graph://tests/*", "docs/agent-mode-baseline-tests.md"],
            requires_revert: false,
        },
        Phase {
            order: 6,
            kind: PhaseKind::DocsPostImpl,
            objective: "Update implementation and test documentation for this step. \
                        Keep traceability from objective -> files -> tests.",
            context_boundary: "Use only verified implementation + test outputs.",
            expected_artifacts: &["implementation_doc_update", "test_doc_update"],
            documentation_targets: &[
                "graph://docs/post-implementation",
                "docs/agent-mode-baseline-implementation.md",
                "docs/agent-mode-baseline-tests.md",
            ],
            requires_revert: false,
        },
        Phase {
            order: 7,
            kind: PhaseKind::RevertAndCleanup,
            objective: "Revert synthetic feature changes after execution to restore repository state. \
                        Do not keep synthetic implementation diffs.",
            context_boundary: "Use VCS state and execution manifest only.",
            expected_artifacts: &["revert_log", "clean_worktree_confirmation"],
            documentation_targets: &["graph://revert/*", "docs/agent-mode-baseline-revert.md"],
            requires_revert: true,
        },
        Phase {
            order: 8,
            kind: PhaseKind::PostSummary,
            objective: "Re-summarize project state from documentation and codebase only (excluding \
                        reverted synthetic diffs) to compare retention quality across methods.",
            context_boundary: "Fresh context reset: docs + codebase only, no execution diffs.",
            expected_artifacts: &["post_execution_project_summary", "retention_comparison"],
            documentation_targets: &[
                "graph://summary/post",
                "docs/agent-mode-baseline-post-summary.md",
            ],
            requires_revert: false,
        },
    ]
}
