//! Gateway operator CLI: run the server, inspect and validate MCP server configs.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use gateway_cli::{default_mcp_config_path, load_and_validate, parse_webhook_spec, sanitized};
use gateway_config::AppConfig;
use gateway_core::EchoSdk;

#[derive(Parser, Debug)]
#[command(name = "gateway")]
#[command(about = "Gateway operator CLI: run the server, manage MCP configs")]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP/WS gateway server.
    Serve(ServeArgs),
    /// Inspect or validate MCP server configs (process-wide file tier).
    #[command(subcommand)]
    Mcp(McpCommand),
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Listen address (default 127.0.0.1:8080, or $GATEWAY_ADDR).
    #[arg(long, value_name = "ADDR")]
    addr: Option<String>,

    /// Fire a webhook POST to URL whenever a tool name matches PATTERN. Repeatable.
    #[arg(long = "webhook", value_name = "URL=PATTERN")]
    webhooks: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum McpCommand {
    /// List configured MCP servers with their validation status.
    List(McpFileArgs),
    /// Validate the MCP config file and exit nonzero on any violation.
    Validate(McpFileArgs),
    /// Show one server's sanitized config.
    Show(McpShowArgs),
}

#[derive(clap::Args, Debug)]
struct McpFileArgs {
    /// Path to the MCP config file (default: $GATEWAY_MCP_CONFIG_FILE or mcp.toml).
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct McpShowArgs {
    /// Server name as it appears in the config file.
    name: String,
    #[command(flatten)]
    file: McpFileArgs,
}

fn resolve_mcp_path(args: &McpFileArgs) -> String {
    args.file
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(default_mcp_config_path)
}

fn run_mcp_list(args: &McpFileArgs) -> Result<(), Box<dyn std::error::Error>> {
    let path = resolve_mcp_path(args);
    let (reports, diagnostics) = load_and_validate(&path);
    if diagnostics.parse_failed {
        eprintln!("warning: {path} failed to parse; treating it as empty");
    }
    for placeholder in &diagnostics.unresolved_placeholders {
        eprintln!("warning: unresolved placeholder ${{{placeholder}}}");
    }
    if reports.is_empty() {
        println!("(no servers configured in {path})");
        return Ok(());
    }
    for report in &reports {
        let entry = sanitized(report);
        let status = match &report.violation {
            Some(v) => format!("INVALID ({:?}: {})", v.kind, v.reason),
            None => "ok".to_string(),
        };
        println!(
            "{:<20} enabled={:<5} {status:<40} {}",
            report.name,
            entry.enabled(),
            serde_json::to_string(&entry).unwrap_or_default()
        );
    }
    Ok(())
}

fn run_mcp_validate(args: &McpFileArgs) -> Result<(), Box<dyn std::error::Error>> {
    let path = resolve_mcp_path(args);
    let (reports, diagnostics) = load_and_validate(&path);
    if diagnostics.parse_failed {
        eprintln!("{path}: failed to parse");
        std::process::exit(1);
    }
    let violations: Vec<_> = reports.iter().filter(|r| r.violation.is_some()).collect();
    if violations.is_empty() {
        println!("{path}: {} server(s), all valid", reports.len());
        return Ok(());
    }
    for report in &violations {
        let v = report.violation.as_ref().unwrap();
        eprintln!("{}: {:?} at {}: {}", report.name, v.kind, v.field_path, v.reason);
    }
    std::process::exit(1);
}

fn run_mcp_show(args: &McpShowArgs) -> Result<(), Box<dyn std::error::Error>> {
    let path = resolve_mcp_path(&args.file);
    let (reports, _) = load_and_validate(&path);
    let report = reports
        .into_iter()
        .find(|r| r.name == args.name)
        .ok_or_else(|| format!("no server named {:?} in {path}", args.name))?;
    let entry = sanitized(&report);
    println!("{}", serde_json::to_string_pretty(&entry)?);
    if let Some(v) = &report.violation {
        eprintln!("warning: {:?} at {}: {}", v.kind, v.field_path, v.reason);
    }
    Ok(())
}

async fn run_serve(args: &ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let webhooks = args
        .webhooks
        .iter()
        .map(|spec| parse_webhook_spec(spec, config.webhook_regex_budget))
        .collect::<Result<Vec<_>, _>>()?;

    let addr = args.addr.clone().or_else(|| std::env::var("GATEWAY_ADDR").ok());
    gateway_server::run_serve(addr.as_deref(), Arc::new(EchoSdk), webhooks)
        .await
        .map_err(|e| e.to_string().into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    gateway_config::load_and_apply("gateway", None::<&std::path::Path>).ok();
    gateway_cli::logging::init()?;

    let args = Args::parse();
    match args.cmd {
        Command::Serve(serve_args) => run_serve(&serve_args).await,
        Command::Mcp(McpCommand::List(file_args)) => run_mcp_list(&file_args),
        Command::Mcp(McpCommand::Validate(file_args)) => run_mcp_validate(&file_args),
        Command::Mcp(McpCommand::Show(show_args)) => run_mcp_show(&show_args),
    }
}
