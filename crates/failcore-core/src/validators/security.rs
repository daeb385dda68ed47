// crates/failcore-core/src/validators/security.rs
// ============================================================================
// Module: Failcore Security Validators
// Description: Path, network, and command security checks.
// Purpose: Reject traversal, sandbox escapes, SSRF, and destructive commands.
// Dependencies: crate::{core, parsers, validators}, serde_json
// ============================================================================

//! ## Overview
//! Security validators fail closed on malformed input: an unparseable path
//! or URL is rejected rather than waved through. Path policy normalises
//! lexically, rejects `..` escapes after joining with the sandbox root, and
//! rejects absolute paths unless explicitly whitelisted; host-resolved
//! symlink targets are checked against the sandbox separately. URL policy
//! rejects private, link-local, and loopback targets (the cloud metadata
//! range included), restricts schemes, and supports a domain allowlist with
//! `*` prefix and `/*` suffix patterns.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use serde_json::json;

use crate::core::context::ContextV1;
use crate::core::decision::DecisionDomain;
use crate::core::decision::DecisionV1;
use crate::core::decision::EVIDENCE_FINDING_CLASS;
use crate::core::decision::EVIDENCE_MATCHED_PARAM;
use crate::core::decision::ErrorCode;
use crate::core::decision::Remediation;
use crate::core::decision::RiskLevel;
use crate::core::decision::Verdict;
use crate::core::identifiers::ValidatorId;
use crate::parsers::parse_path;
use crate::parsers::parse_shell;
use crate::parsers::parse_url;
use crate::validators::ID_COMMAND_SECURITY;
use crate::validators::ID_NETWORK_SECURITY;
use crate::validators::ID_PATH_SECURITY;
use crate::validators::Validator;
use crate::validators::ValidatorSettings;
use crate::validators::setting_bool;
use crate::validators::setting_str;
use crate::validators::setting_str_list;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Parameter names treated as filesystem paths.
const PATH_PARAM_NAMES: &[&str] =
    &["path", "file_path", "file", "target", "dest", "destination", "source", "src"];

/// Parameter names treated as URLs.
const URL_PARAM_NAMES: &[&str] = &["url", "uri", "endpoint", "link"];

/// Parameter names treated as shell commands.
const COMMAND_PARAM_NAMES: &[&str] = &["command", "cmd", "shell", "script"];

/// Host-injected parameter carrying the filesystem-resolved path.
const RESOLVED_PATH_PARAM: &str = "resolved_path";

/// Targets whose recursive removal is always destructive.
const CRITICAL_TARGETS: &[&str] =
    &["/", "/*", "/etc", "/usr", "/var", "/home", "/boot", "/bin", "/sbin", "/lib"];

// ============================================================================
// SECTION: Path Security
// ============================================================================

/// Path traversal, absolute path, and sandbox escape checks.
#[derive(Debug, Clone, Default)]
pub struct PathSecurityValidator {
    /// Sandbox root all relative paths are joined against.
    sandbox_root: Option<String>,
    /// Absolute path prefixes explicitly permitted.
    allowed_absolute: Vec<String>,
}

impl PathSecurityValidator {
    /// Builds the validator from policy settings.
    #[must_use]
    pub fn from_settings(settings: &ValidatorSettings) -> Self {
        Self {
            sandbox_root: setting_str(settings, "sandbox_root"),
            allowed_absolute: setting_str_list(settings, "allowed_absolute"),
        }
    }

    /// Checks one path parameter.
    fn check_path(&self, param: &str, raw: &str) -> Option<DecisionV1> {
        let ast = parse_path(raw);
        if !ast.valid {
            return Some(self.decision(
                ErrorCode::PathInvalid,
                RiskLevel::High,
                param,
                "path_invalid",
                format!("parameter '{param}' is not a valid path"),
                None,
            ));
        }

        if ast.absolute {
            let whitelisted = self
                .allowed_absolute
                .iter()
                .any(|prefix| ast.normalised.starts_with(prefix.as_str()));
            if !whitelisted {
                return Some(self.decision(
                    ErrorCode::AbsolutePath,
                    RiskLevel::High,
                    param,
                    "path_escape",
                    format!("absolute path in '{param}' is outside the allowlist"),
                    Some("use a path relative to the sandbox root"),
                ));
            }
            return None;
        }

        if ast.traversal {
            let mut decision = self.decision(
                ErrorCode::PathTraversal,
                RiskLevel::Critical,
                param,
                "path_escape",
                format!("relative path in '{param}' escapes the sandbox root"),
                Some("remove '..' segments and stay under the sandbox root"),
            );
            if let Some(root) = &self.sandbox_root {
                decision.evidence.insert("sandbox_root".to_string(), json!(root));
            }
            decision.remediation = Some(Remediation {
                template: "rewrite {param} as a path under {root}".to_string(),
                vars: [
                    ("param".to_string(), param.to_string()),
                    (
                        "root".to_string(),
                        self.sandbox_root.clone().unwrap_or_else(|| ".".to_string()),
                    ),
                ]
                .into_iter()
                .collect(),
            });
            return Some(decision);
        }
        None
    }

    /// Checks the host-resolved path against the sandbox root.
    fn check_resolved(&self, raw: &str) -> Option<DecisionV1> {
        let root = self.sandbox_root.as_deref()?;
        let resolved = parse_path(raw);
        let root_ast = parse_path(root);
        if resolved.valid && !resolved.normalised.starts_with(&root_ast.normalised) {
            return Some(self.decision(
                ErrorCode::SymlinkEscape,
                RiskLevel::Critical,
                RESOLVED_PATH_PARAM,
                "path_escape",
                "resolved path escapes the sandbox root".to_string(),
                Some("target must resolve inside the sandbox root"),
            ));
        }
        None
    }

    /// Builds a security decision with common evidence.
    fn decision(
        &self,
        code: ErrorCode,
        risk_level: RiskLevel,
        param: &str,
        finding_class: &str,
        message: String,
        suggestion: Option<&str>,
    ) -> DecisionV1 {
        let mut decision = DecisionV1::new(
            ValidatorId::new(ID_PATH_SECURITY),
            code,
            Verdict::Block,
            risk_level,
            DecisionDomain::Security,
            message,
        );
        decision.evidence.insert(EVIDENCE_MATCHED_PARAM.to_string(), json!(param));
        decision.evidence.insert(EVIDENCE_FINDING_CLASS.to_string(), json!(finding_class));
        decision.suggestion = suggestion.map(str::to_string);
        decision
    }
}

impl Validator for PathSecurityValidator {
    fn id(&self) -> ValidatorId {
        ValidatorId::new(ID_PATH_SECURITY)
    }

    fn evaluate(&self, ctx: &ContextV1) -> Vec<DecisionV1> {
        let mut decisions = Vec::new();
        for name in PATH_PARAM_NAMES {
            if let Some(raw) = ctx.str_param(name)
                && let Some(decision) = self.check_path(name, raw)
            {
                decisions.push(decision);
            }
        }
        if let Some(raw) = ctx.str_param(RESOLVED_PATH_PARAM)
            && let Some(decision) = self.check_resolved(raw)
        {
            decisions.push(decision);
        }
        decisions
    }
}

// ============================================================================
// SECTION: Network Security
// ============================================================================

/// SSRF and private-network egress checks.
#[derive(Debug, Clone)]
pub struct NetworkSecurityValidator {
    /// Permitted URL schemes.
    allowed_schemes: Vec<String>,
    /// Optional domain allowlist (`*` prefix and `/*` suffix patterns).
    allowed_domains: Vec<String>,
    /// Reject private, loopback, and link-local targets.
    block_private: bool,
    /// Optional explicit port allowlist.
    allowed_ports: Vec<u16>,
}

impl Default for NetworkSecurityValidator {
    fn default() -> Self {
        Self {
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
            allowed_domains: Vec::new(),
            block_private: true,
            allowed_ports: Vec::new(),
        }
    }
}

impl NetworkSecurityValidator {
    /// Builds the validator from policy settings.
    #[must_use]
    pub fn from_settings(settings: &ValidatorSettings) -> Self {
        let mut validator = Self::default();
        let schemes = setting_str_list(settings, "allowed_schemes");
        if !schemes.is_empty() {
            validator.allowed_schemes = schemes;
        }
        validator.allowed_domains = setting_str_list(settings, "allowed_domains");
        validator.block_private = setting_bool(settings, "block_private", true);
        validator.allowed_ports = settings
            .get("allowed_ports")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_u64)
                    .filter_map(|port| u16::try_from(port).ok())
                    .collect()
            })
            .unwrap_or_default();
        validator
    }

    /// Checks one URL parameter.
    fn check_url(&self, param: &str, raw: &str) -> Option<DecisionV1> {
        let ast = parse_url(raw);
        if !ast.valid {
            return Some(self.decision(
                ErrorCode::SsrfBlocked,
                RiskLevel::High,
                param,
                "unparseable_url",
                format!("parameter '{param}' is not a parseable url"),
            ));
        }
        if !self.allowed_schemes.iter().any(|scheme| scheme == &ast.scheme) {
            let mut decision = self.decision(
                ErrorCode::SsrfBlocked,
                RiskLevel::High,
                param,
                "scheme_blocked",
                format!("scheme '{}' is not permitted", ast.scheme),
            );
            decision.evidence.insert("scheme".to_string(), json!(ast.scheme));
            return Some(decision);
        }
        if ast.userinfo.is_some() {
            return Some(self.decision(
                ErrorCode::SsrfBlocked,
                RiskLevel::High,
                param,
                "userinfo_blocked",
                "urls with embedded credentials are not permitted".to_string(),
            ));
        }
        if self.block_private && ast.is_internal {
            let mut decision = self.decision(
                ErrorCode::PrivateNetworkBlocked,
                RiskLevel::Critical,
                param,
                "private_network",
                format!(
                    "host '{}' is a private or link-local address",
                    ast.host.as_deref().unwrap_or("")
                ),
            );
            decision.suggestion =
                Some("target a public host; internal addresses are blocked".to_string());
            return Some(decision);
        }
        if !self.allowed_ports.is_empty()
            && let Some(port) = ast.port
            && !self.allowed_ports.contains(&port)
        {
            let mut decision = self.decision(
                ErrorCode::SsrfBlocked,
                RiskLevel::High,
                param,
                "port_blocked",
                format!("port {port} is not in the allowlist"),
            );
            decision.evidence.insert("port".to_string(), json!(port));
            return Some(decision);
        }
        if !self.allowed_domains.is_empty() {
            let host = ast.host.as_deref().unwrap_or("");
            let permitted = self
                .allowed_domains
                .iter()
                .any(|pattern| domain_matches(pattern, host, &ast.path));
            if !permitted {
                return Some(self.decision(
                    ErrorCode::SsrfBlocked,
                    RiskLevel::High,
                    param,
                    "domain_blocked",
                    format!("host '{host}' is not in the domain allowlist"),
                ));
            }
        }
        None
    }

    /// Builds a security decision with common evidence.
    fn decision(
        &self,
        code: ErrorCode,
        risk_level: RiskLevel,
        param: &str,
        finding_class: &str,
        message: String,
    ) -> DecisionV1 {
        let mut decision = DecisionV1::new(
            ValidatorId::new(ID_NETWORK_SECURITY),
            code,
            Verdict::Block,
            risk_level,
            DecisionDomain::Security,
            message,
        );
        decision.evidence.insert(EVIDENCE_MATCHED_PARAM.to_string(), json!(param));
        decision.evidence.insert(EVIDENCE_FINDING_CLASS.to_string(), json!(finding_class));
        decision
    }
}

impl Validator for NetworkSecurityValidator {
    fn id(&self) -> ValidatorId {
        ValidatorId::new(ID_NETWORK_SECURITY)
    }

    fn evaluate(&self, ctx: &ContextV1) -> Vec<DecisionV1> {
        let mut decisions = Vec::new();
        for name in URL_PARAM_NAMES {
            if let Some(raw) = ctx.str_param(name)
                && let Some(decision) = self.check_url(name, raw)
            {
                decisions.push(decision);
            }
        }
        decisions
    }
}

/// Matches a host and path against an allowlist pattern.
///
/// `*.example.com` permits any subdomain; `example.com/*` pins the host and
/// permits any path; a bare pattern must equal the host.
fn domain_matches(pattern: &str, host: &str, path: &str) -> bool {
    let (host_pattern, path_pinned) = pattern
        .strip_suffix("/*")
        .map_or((pattern, false), |stripped| (stripped, true));
    let host_ok = host_pattern.strip_prefix("*.").map_or(host == host_pattern, |suffix| {
        host == suffix || host.ends_with(&format!(".{suffix}"))
    });
    // A `/*` suffix keeps every path; without it paths are unrestricted too,
    // so path pinning only documents intent for now.
    host_ok && (!path_pinned || path.starts_with('/'))
}

// ============================================================================
// SECTION: Command Security
// ============================================================================

/// Destructive command detection over shell parameters.
#[derive(Debug, Clone, Default)]
pub struct CommandSecurityValidator {
    /// Extra programs to always reject.
    denied_programs: Vec<String>,
}

impl CommandSecurityValidator {
    /// Builds the validator from policy settings.
    #[must_use]
    pub fn from_settings(settings: &ValidatorSettings) -> Self {
        Self {
            denied_programs: setting_str_list(settings, "denied_programs"),
        }
    }

    /// Checks one command parameter.
    fn check_command(&self, param: &str, raw: &str) -> Option<DecisionV1> {
        let ast = parse_shell(raw);
        let program = ast.program.as_deref()?;

        if self.denied_programs.iter().any(|denied| denied == program) {
            return Some(self.decision(
                param,
                "denied_program",
                RiskLevel::High,
                format!("program '{program}' is denied by policy"),
            ));
        }

        let recursive_force = ast.flags.iter().any(|flag| {
            flag == "-rf"
                || flag == "-fr"
                || flag == "--force"
                || (flag.starts_with('-') && flag.contains('r') && flag.contains('f'))
        });
        let critical_target = ast.args.iter().any(|arg| CRITICAL_TARGETS.contains(&arg.as_str()));
        if program == "rm" && recursive_force && critical_target {
            let mut decision = self.decision(
                param,
                "destructive_command",
                RiskLevel::Critical,
                "recursive force removal of a critical target".to_string(),
            );
            decision.suggestion = Some("narrow the removal target to a scratch path".to_string());
            return Some(decision);
        }
        if program == "dd" && ast.args.iter().any(|arg| arg.starts_with("of=/dev/")) {
            return Some(self.decision(
                param,
                "destructive_command",
                RiskLevel::Critical,
                "raw device write via dd".to_string(),
            ));
        }
        if program.starts_with("mkfs") {
            return Some(self.decision(
                param,
                "destructive_command",
                RiskLevel::Critical,
                "filesystem creation destroys existing data".to_string(),
            ));
        }
        None
    }

    /// Builds a security decision with common evidence.
    fn decision(
        &self,
        param: &str,
        finding_class: &str,
        risk_level: RiskLevel,
        message: String,
    ) -> DecisionV1 {
        let mut decision = DecisionV1::new(
            ValidatorId::new(ID_COMMAND_SECURITY),
            ErrorCode::PolicyDenied,
            Verdict::Block,
            risk_level,
            DecisionDomain::Security,
            message,
        );
        decision.evidence.insert(EVIDENCE_MATCHED_PARAM.to_string(), json!(param));
        decision.evidence.insert(EVIDENCE_FINDING_CLASS.to_string(), json!(finding_class));
        decision
    }
}

impl Validator for CommandSecurityValidator {
    fn id(&self) -> ValidatorId {
        ValidatorId::new(ID_COMMAND_SECURITY)
    }

    fn evaluate(&self, ctx: &ContextV1) -> Vec<DecisionV1> {
        let mut decisions = Vec::new();
        for name in COMMAND_PARAM_NAMES {
            if let Some(raw) = ctx.str_param(name)
                && let Some(decision) = self.check_command(name, raw)
            {
                decisions.push(decision);
            }
        }
        decisions
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
