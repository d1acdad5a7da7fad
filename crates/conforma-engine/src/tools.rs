//! Builtin compliance tool catalog.
//!
//! Maps the known external collaborators to their argv invocations. The
//! catalog is convenience for common definitions; custom argv tasks are
//! first-class and the orchestrator treats both identically.

use serde::{Deserialize, Serialize};

use crate::definition::TaskSpec;

/// Builtin compliance tools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinTool {
    /// terraform fmt -check -recursive
    TerraformFmt,

    /// terraform validate -no-color
    TerraformValidate,

    /// tfsec . --format json
    Tfsec,

    /// checkov -d . --compact
    Checkov,

    /// opa eval against a named policy bundle over the rendered plan
    OpaEval { bundle: String },

    /// terraform plan -out tfplan.bin
    TerraformPlan,

    /// terraform apply tfplan.bin (deploy stage only)
    TerraformApply,
}

impl BuiltinTool {
    /// Get the tool name as a string.
    pub fn name(&self) -> String {
        match self {
            BuiltinTool::TerraformFmt => "terraform_fmt".to_string(),
            BuiltinTool::TerraformValidate => "terraform_validate".to_string(),
            BuiltinTool::Tfsec => "tfsec".to_string(),
            BuiltinTool::Checkov => "checkov".to_string(),
            BuiltinTool::OpaEval { bundle } => format!("opa_{}", bundle),
            BuiltinTool::TerraformPlan => "terraform_plan".to_string(),
            BuiltinTool::TerraformApply => "terraform_apply".to_string(),
        }
    }

    /// Get the tool's invocation.
    pub fn command(&self) -> Vec<String> {
        match self {
            BuiltinTool::TerraformFmt => vec![
                "terraform".to_string(),
                "fmt".to_string(),
                "-check".to_string(),
                "-recursive".to_string(),
            ],
            BuiltinTool::TerraformValidate => vec![
                "terraform".to_string(),
                "validate".to_string(),
                "-no-color".to_string(),
            ],
            BuiltinTool::Tfsec => vec![
                "tfsec".to_string(),
                ".".to_string(),
                "--format".to_string(),
                "json".to_string(),
            ],
            BuiltinTool::Checkov => vec![
                "checkov".to_string(),
                "-d".to_string(),
                ".".to_string(),
                "--compact".to_string(),
            ],
            BuiltinTool::OpaEval { bundle } => vec![
                "opa".to_string(),
                "eval".to_string(),
                "--data".to_string(),
                bundle.clone(),
                "--input".to_string(),
                "tfplan.json".to_string(),
                "--fail-defined".to_string(),
                "data.main.deny".to_string(),
            ],
            BuiltinTool::TerraformPlan => vec![
                "terraform".to_string(),
                "plan".to_string(),
                "-input=false".to_string(),
                "-out".to_string(),
                "tfplan.bin".to_string(),
            ],
            BuiltinTool::TerraformApply => vec![
                "terraform".to_string(),
                "apply".to_string(),
                "-input=false".to_string(),
                "tfplan.bin".to_string(),
            ],
        }
    }

    /// Build a task spec invoking this tool.
    pub fn task(&self) -> TaskSpec {
        TaskSpec::new(self.name(), self.command())
    }

    /// One-line descriptions of the fixed catalog entries, for CLI listing.
    pub fn catalog() -> Vec<(&'static str, &'static str)> {
        vec![
            ("terraform_fmt", "formatter check over the IaC file set"),
            ("terraform_validate", "syntax and reference validation"),
            ("tfsec", "static security scanner"),
            ("checkov", "best-practice security scanner"),
            ("opa_<bundle>", "policy evaluation against a named bundle"),
            ("terraform_plan", "renders the infrastructure plan artifact"),
            ("terraform_apply", "applies the plan; approval-gated stages only"),
        ]
    }
}

/// Whether an argv invokes an apply-class tool (mutates infrastructure).
pub fn is_apply_command(command: &[String]) -> bool {
    command.len() >= 2 && command[0] == "terraform" && command[1] == "apply"
}
