//! CSP CLI
//!
//! Compile Content-Security-Policy headers and check loads against them.

mod host;
mod transport;

use std::rc::Rc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use csp_core::{
    Directive, DirectiveName, DirectivePayload, DirectiveRegistry, EngineConfig, HeaderType,
    ReflectedXssDisposition, ReportingStatus, SourceLocation,
};
use csp_engine::ContentSecurityPolicy;

use crate::host::{sandbox_flag_names, CliHost};
use crate::transport::{Delivery, ReportSink};

#[derive(Parser)]
#[command(name = "csp-cli")]
#[command(about = "Content-Security-Policy compiler and checker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Document and headers shared by every command.
#[derive(clap::Args)]
struct PolicyArgs {
    /// URL of the protected document
    #[arg(short, long)]
    origin: String,

    /// Content-Security-Policy header value (repeatable)
    #[arg(short, long)]
    policy: Vec<String>,

    /// Content-Security-Policy-Report-Only header value (repeatable)
    #[arg(long)]
    report_only_policy: Vec<String>,

    /// Enable experimental features
    #[arg(long)]
    experimental: bool,

    /// Referrer of the protected document
    #[arg(long)]
    referrer: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile headers and print the parsed policies as JSON
    Parse {
        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Ask whether an action is allowed and print the decision and reports
    Check {
        #[command(flatten)]
        policy: PolicyArgs,

        /// What is being checked
        #[arg(short, long, value_enum)]
        kind: CheckKind,

        /// URL being loaded (fetch, form, base and plugin checks)
        #[arg(short, long)]
        url: Option<String>,

        /// Script URL at the call site (inline and eval checks)
        #[arg(long)]
        source_file: Option<String>,

        /// Line number at the call site
        #[arg(long, default_value_t = 1)]
        line: u32,

        /// Plugin media type
        #[arg(long)]
        media_type: Option<String>,

        /// Declared `type` attribute of the plugin element
        #[arg(long, default_value = "")]
        declared_type: String,

        /// POST generated reports to their report-uri endpoints
        #[arg(long)]
        deliver: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CheckKind {
    Script,
    Style,
    Image,
    Font,
    Media,
    Object,
    Frame,
    Connect,
    FormAction,
    BaseUri,
    InlineScript,
    InlineStyle,
    EventHandler,
    JavascriptUrl,
    Eval,
    Plugin,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse { policy } => cmd_parse(&policy),
        Commands::Check {
            policy,
            kind,
            url,
            source_file,
            line,
            media_type,
            declared_type,
            deliver,
        } => {
            let target = CheckTarget {
                kind,
                url,
                source_file,
                line,
                media_type,
                declared_type,
            };
            cmd_check(&policy, &target, deliver)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

// =============================================================================
// Output
// =============================================================================

#[derive(Serialize)]
struct DirectiveSummary {
    name: DirectiveName,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sources: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_types: Option<Vec<String>>,
}

#[derive(Serialize)]
struct PolicySummary {
    header: String,
    report_only: bool,
    directives: Vec<DirectiveSummary>,
    report_uris: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sandbox: Option<Vec<String>>,
    reflected_xss: ReflectedXssDisposition,
    #[serde(skip_serializing_if = "Option::is_none")]
    eval_disabled_message: Option<String>,
}

#[derive(Serialize)]
struct ParseOutput {
    policies: Vec<PolicySummary>,
    diagnostics: Vec<String>,
}

#[derive(Serialize)]
struct ReportOutput {
    endpoint: String,
    body: Value,
}

#[derive(Serialize)]
struct CheckOutput {
    allowed: bool,
    console: Vec<String>,
    reports: Vec<ReportOutput>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    deliveries: Vec<Delivery>,
}

fn summarize_directive(directive: &Directive) -> DirectiveSummary {
    let (sources, media_types) = match directive.payload() {
        DirectivePayload::Sources(list) => {
            let mut sources: Vec<String> = Vec::new();
            if list.allows_star() {
                sources.push("*".to_string());
            }
            if list.allows_inline() {
                sources.push("'unsafe-inline'".to_string());
            }
            if list.allows_eval() {
                sources.push("'unsafe-eval'".to_string());
            }
            sources.extend(list.matchers().iter().map(ToString::to_string));
            (Some(sources), None)
        }
        DirectivePayload::MediaTypes(list) => {
            (None, Some(list.accepted_types().map(str::to_string).collect()))
        }
    };

    DirectiveSummary {
        name: directive.kind(),
        text: directive.text().to_string(),
        sources,
        media_types,
    }
}

fn summarize_policy(registry: &DirectiveRegistry) -> PolicySummary {
    PolicySummary {
        header: registry.header().to_string(),
        report_only: registry.is_report_only(),
        directives: registry.directives().map(summarize_directive).collect(),
        report_uris: registry.report_uris().iter().map(Url::to_string).collect(),
        sandbox: registry.sandbox_flags().map(sandbox_flag_names),
        reflected_xss: registry.reflected_xss(),
        eval_disabled_message: registry.eval_disabled_message().map(str::to_string),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| format!("Failed to serialize output: {}", e))?;
    println!("{json}");
    Ok(())
}

// =============================================================================
// Commands
// =============================================================================

fn build_policy(args: &PolicyArgs, host: Rc<CliHost>, sink: Rc<ReportSink>) -> Result<ContentSecurityPolicy, String> {
    if args.policy.is_empty() && args.report_only_policy.is_empty() {
        return Err("No policy specified".to_string());
    }

    let config = EngineConfig {
        experimental_features: args.experimental,
        ..EngineConfig::default()
    };
    let mut csp = ContentSecurityPolicy::new(host).with_transport(sink).with_config(config);

    for header in &args.policy {
        csp.did_receive_header(header, HeaderType::Enforce);
    }
    for header in &args.report_only_policy {
        csp.did_receive_header(header, HeaderType::Report);
    }

    Ok(csp)
}

fn cmd_parse(args: &PolicyArgs) -> Result<(), String> {
    let host = Rc::new(CliHost::new(&args.origin, args.referrer.as_deref())?);
    let sink = Rc::new(ReportSink::recording());
    let csp = build_policy(args, host.clone(), sink)?;

    if let Some(flags) = host.sandbox_flags() {
        log::debug!("sandbox enforced: {:?}", sandbox_flag_names(flags));
    }
    if let Some(message) = host.eval_disabled() {
        log::debug!("eval disabled: {message}");
    }

    print_json(&ParseOutput {
        policies: csp.policies().iter().map(summarize_policy).collect(),
        diagnostics: host.take_console(),
    })
}

struct CheckTarget {
    kind: CheckKind,
    url: Option<String>,
    source_file: Option<String>,
    line: u32,
    media_type: Option<String>,
    declared_type: String,
}

struct CallSite(Option<SourceLocation>);

impl csp_core::ScriptExecutionContext for CallSite {
    fn current_source_location(&self) -> Option<SourceLocation> {
        self.0.clone()
    }
}

/// Reports are only POSTed with `--deliver`; otherwise no runtime is started.
fn delivery_runtime(deliver: bool) -> Result<Option<tokio::runtime::Runtime>, String> {
    if !deliver {
        return Ok(None);
    }
    tokio::runtime::Runtime::new()
        .map(Some)
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))
}

fn cmd_check(args: &PolicyArgs, target: &CheckTarget, deliver: bool) -> Result<(), String> {
    let runtime = delivery_runtime(deliver)?;

    let host = Rc::new(CliHost::new(&args.origin, args.referrer.as_deref())?);
    let sink = Rc::new(match &runtime {
        Some(runtime) => ReportSink::delivering(runtime.handle().clone())?,
        None => ReportSink::recording(),
    });
    let csp = build_policy(args, host.clone(), sink.clone())?;

    // Parse diagnostics are not part of the check result.
    host.take_console();

    let allowed = run_check(&csp, target)?;

    let reports = sink
        .reports()?
        .into_iter()
        .map(|(endpoint, body)| ReportOutput { endpoint, body })
        .collect();
    let deliveries = match &runtime {
        Some(runtime) => runtime.block_on(sink.finish()),
        None => Vec::new(),
    };

    print_json(&CheckOutput {
        allowed,
        console: host.take_console(),
        reports,
        deliveries,
    })
}

fn run_check(csp: &ContentSecurityPolicy, target: &CheckTarget) -> Result<bool, String> {
    let status = ReportingStatus::SendReport;

    let location = match &target.source_file {
        Some(file) => Some(SourceLocation {
            url: parse_url(file)?,
            line: target.line,
        }),
        None => None,
    };
    let call_site = CallSite(location.clone());

    let allowed = match target.kind {
        CheckKind::Script => csp.allow_script_from_source(&target_url(target)?, status),
        CheckKind::Style => csp.allow_style_from_source(&target_url(target)?, status),
        CheckKind::Image => csp.allow_image_from_source(&target_url(target)?, status),
        CheckKind::Font => csp.allow_font_from_source(&target_url(target)?, status),
        CheckKind::Media => csp.allow_media_from_source(&target_url(target)?, status),
        CheckKind::Object => csp.allow_object_from_source(&target_url(target)?, status),
        CheckKind::Frame => csp.allow_child_frame_from_source(&target_url(target)?, status),
        CheckKind::Connect => csp.allow_connect_to_source(&target_url(target)?, status),
        CheckKind::FormAction => csp.allow_form_action(&target_url(target)?, status),
        CheckKind::BaseUri => csp.allow_base_uri(&target_url(target)?, status),
        CheckKind::InlineScript => csp.allow_inline_script(location.as_ref(), status),
        CheckKind::InlineStyle => csp.allow_inline_style(location.as_ref(), status),
        CheckKind::EventHandler => csp.allow_inline_event_handlers(location.as_ref(), status),
        CheckKind::JavascriptUrl => csp.allow_javascript_urls(location.as_ref(), status),
        CheckKind::Eval => csp.allow_eval(Some(&call_site), status),
        CheckKind::Plugin => {
            let media_type = target
                .media_type
                .as_deref()
                .ok_or_else(|| "--media-type is required for plugin checks".to_string())?;
            let url = target_url(target)?;
            csp.allow_plugin_type(media_type, &target.declared_type, &url, Some(&call_site), status)
        }
    };

    Ok(allowed)
}

fn target_url(target: &CheckTarget) -> Result<Url, String> {
    let url = target
        .url
        .as_deref()
        .ok_or_else(|| format!("--url is required for {:?} checks", target.kind))?;
    parse_url(url)
}

fn parse_url(value: &str) -> Result<Url, String> {
    Url::parse(value).map_err(|e| format!("Invalid URL '{}': {}", value, e))
}
