use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use atty::Stream;
use clap::{value_parser, ArgAction, Args, Parser, Subcommand};
use color_eyre::Result;
use hub_core::{
    deploy_error_outcome, format_status_message, promote, resolve_hub_home, to_json_response,
    CommandStatus, DeclaredExtensions, DeployService, ExecutionOutcome, Hub, HubLocation,
};
use hub_domain::{PluginChannel, PluginNode};
use serde_json::{json, Value};

mod style;

use style::Style;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = HubCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let command = cli.command.name();
    let outcome = run_command(&cli);
    let code = emit_output(&cli, command, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("hub={level},hub_cli={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn run_command(cli: &HubCli) -> ExecutionOutcome {
    match dispatch(cli) {
        Ok(outcome) => outcome,
        Err(err) => {
            ExecutionOutcome::failure(format!("{err:#}"), json!({ "reason": "internal" }))
        }
    }
}

fn dispatch(cli: &HubCli) -> anyhow::Result<ExecutionOutcome> {
    let home = resolve_home(cli)?;
    tracing::debug!("hub home {} (from {})", home.path.display(), home.source);
    let hub = Hub::open(&home.path)?;

    Ok(match &cli.command {
        HubCommand::DeployPlatform(args) => deploy_platform(&hub, args),
        HubCommand::DeployPlugin(args) => deploy_plugin(&hub, args),
        HubCommand::Promote(args) => promote_channels(&hub, args),
        HubCommand::Select(args) => select_node(&hub, args),
        HubCommand::List(args) => list_channel(&hub, args),
    })
}

fn resolve_home(cli: &HubCli) -> anyhow::Result<HubLocation> {
    if let Some(path) = &cli.home {
        return Ok(HubLocation {
            path: path.clone(),
            source: "--home",
        });
    }
    resolve_hub_home()
}

fn deploy_platform(hub: &Hub, args: &DeployPlatformArgs) -> ExecutionOutcome {
    let Some(channel) = PluginChannel::parse(&args.channel) else {
        return unknown_channel(&args.channel);
    };
    let mut archive = match File::open(&args.archive) {
        Ok(file) => file,
        Err(err) => return missing_archive(&args.archive, &err),
    };

    let service = DeployService::new(hub, &DeclaredExtensions);
    match service.deploy_platform(channel, args.platform_version, &args.id, &mut archive) {
        Ok(node) => ExecutionOutcome::success(
            format!("deployed {} {} to {channel}", node.id, node.version),
            node_details(&node, channel),
        ),
        Err(err) => deploy_error_outcome(&err),
    }
}

fn deploy_plugin(hub: &Hub, args: &DeployPluginArgs) -> ExecutionOutcome {
    let Some(channel) = PluginChannel::parse(&args.channel) else {
        return unknown_channel(&args.channel);
    };
    if let Err(err) = File::open(&args.archive) {
        return missing_archive(&args.archive, &err);
    }

    let service = DeployService::new(hub, &DeclaredExtensions);
    match service.deploy_plugin(channel, || File::open(&args.archive)) {
        Ok(node) => ExecutionOutcome::success(
            format!("deployed {} {} to {channel}", node.id, node.version),
            node_details(&node, channel),
        ),
        Err(err) => deploy_error_outcome(&err),
    }
}

fn promote_channels(hub: &Hub, args: &PromoteArgs) -> ExecutionOutcome {
    let Some(source) = PluginChannel::parse(&args.from) else {
        return unknown_channel(&args.from);
    };
    let Some(dest) = PluginChannel::parse(&args.to) else {
        return unknown_channel(&args.to);
    };

    match promote(hub, source, dest) {
        Ok(summary) => ExecutionOutcome::success(
            format!(
                "promoted {} of {} nodes from {source} to {dest}",
                summary.promoted, summary.examined
            ),
            json!({
                "from": source.dir_name(),
                "to": dest.dir_name(),
                "summary": summary,
            }),
        ),
        Err(err) => deploy_error_outcome(&err),
    }
}

fn select_node(hub: &Hub, args: &SelectArgs) -> ExecutionOutcome {
    let Some(channel) = PluginChannel::parse(&args.channel) else {
        return unknown_channel(&args.channel);
    };

    match hub
        .repository(channel)
        .select(&args.platform_version, &args.id, args.unapproved)
    {
        Some(node) => ExecutionOutcome::success(
            format!("{} {} on {channel}", node.id, node.version),
            node_details(&node, channel),
        ),
        None => ExecutionOutcome::user_error(
            format!(
                "no plugin {} for platform {} on {channel}",
                args.id, args.platform_version
            ),
            json!({ "reason": "not_found" }),
        ),
    }
}

fn list_channel(hub: &Hub, args: &ListArgs) -> ExecutionOutcome {
    let Some(channel) = PluginChannel::parse(&args.channel) else {
        return unknown_channel(&args.channel);
    };

    let nodes = hub.repository(channel).nodes();
    ExecutionOutcome::success(
        format!("{} nodes on {channel}", nodes.len()),
        json!({
            "channel": channel.dir_name(),
            "nodes": nodes,
        }),
    )
}

fn unknown_channel(name: &str) -> ExecutionOutcome {
    ExecutionOutcome::user_error(
        format!("unknown channel {name:?}"),
        json!({
            "reason": "unknown_channel",
            "hint": "Channels: nightly, alpha, beta, stable.",
        }),
    )
}

fn missing_archive(path: &Path, err: &io::Error) -> ExecutionOutcome {
    ExecutionOutcome::user_error(
        format!("cannot read {}: {err}", path.display()),
        json!({ "reason": "missing_archive" }),
    )
}

fn node_details(node: &PluginNode, channel: PluginChannel) -> Value {
    json!({
        "channel": channel.dir_name(),
        "node": node,
    })
}

fn emit_output(cli: &HubCli, command: &str, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = match outcome.status {
        CommandStatus::Ok => 0,
        CommandStatus::UserError => 1,
        CommandStatus::Failure => 2,
    };

    let style = Style::new(cli.no_color, atty::is(Stream::Stdout));

    if cli.json {
        let payload = to_json_response(command, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if !cli.quiet {
        let message = format_status_message(command, &outcome.message);
        println!("{}", style.status(&outcome.status, &message));
        if let Some(hint) = hint_from_details(&outcome.details) {
            let hint_line = format!("Hint: {}", hint);
            println!("{}", style.info(&hint_line));
        }
        if let Some(table) = render_node_table(&style, command, &outcome.details) {
            println!("{table}");
        }
    }

    Ok(code)
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

fn render_node_table(style: &Style, command: &str, details: &Value) -> Option<String> {
    if command != "list" {
        return None;
    }
    let nodes = details.get("nodes")?.as_array()?;
    if nodes.is_empty() {
        return None;
    }

    let mut rows = Vec::new();
    for node in nodes {
        let obj = node.as_object()?;
        let approved = if obj.get("approved")?.as_bool()? {
            "yes"
        } else {
            "no"
        };
        rows.push(NodeRow {
            id: obj.get("id")?.as_str()?.to_string(),
            version: obj.get("version")?.as_str()?.to_string(),
            platform: obj.get("platform_version")?.as_str()?.to_string(),
            approved: approved.to_string(),
        });
    }

    Some(format_node_table(style, &rows))
}

struct NodeRow {
    id: String,
    version: String,
    platform: String,
    approved: String,
}

fn format_node_table(style: &Style, rows: &[NodeRow]) -> String {
    let headers = ["Plugin", "Version", "Platform", "Approved"];
    let mut widths = [
        headers[0].len(),
        headers[1].len(),
        headers[2].len(),
        headers[3].len(),
    ];

    for row in rows {
        widths[0] = widths[0].max(row.id.len());
        widths[1] = widths[1].max(row.version.len());
        widths[2] = widths[2].max(row.platform.len());
        widths[3] = widths[3].max(row.approved.len());
    }

    let header_line = format!(
        "{:<width0$}  {:<width1$}  {:<width2$}  {:<width3$}",
        headers[0],
        headers[1],
        headers[2],
        headers[3],
        width0 = widths[0],
        width1 = widths[1],
        width2 = widths[2],
        width3 = widths[3],
    );

    let mut lines = Vec::new();
    lines.push(style.table_header(&header_line));
    lines.push(format!(
        "{:-<width0$}  {:-<width1$}  {:-<width2$}  {:-<width3$}",
        "",
        "",
        "",
        "",
        width0 = widths[0],
        width1 = widths[1],
        width2 = widths[2],
        width3 = widths[3],
    ));

    for row in rows {
        lines.push(format!(
            "{:<width0$}  {:<width1$}  {:<width2$}  {:<width3$}",
            row.id,
            row.version,
            row.platform,
            row.approved,
            width0 = widths[0],
            width1 = widths[1],
            width2 = widths[2],
            width3 = widths[3],
        ));
    }

    lines.join("\n")
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Channelled plugin repository",
    long_about = "Deploys platform and plugin archives onto release channels, promotes them \
                  between channels, and answers lookups against the stored indexes.",
    after_help = "Examples:\n  hub deploy-plugin --channel nightly build/com.intellij.xml.zip\n  hub promote --from nightly --to alpha\n  hub --json select --channel alpha --platform-version 1554 --id com.intellij.xml\n"
)]
struct HubCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)"
    )]
    quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)")]
    verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q")]
    trace: bool,
    #[arg(long, help = "Emit {status,message,details} JSON envelopes")]
    json: bool,
    #[arg(long, help = "Disable colored human output")]
    no_color: bool,
    #[arg(long, value_parser = value_parser!(PathBuf), help = "Hub home directory (overrides HUB_HOME and ~/.hub)")]
    home: Option<PathBuf>,
    #[command(subcommand)]
    command: HubCommand,
}

#[derive(Subcommand, Debug)]
enum HubCommand {
    #[command(
        name = "deploy-platform",
        about = "Store a platform archive on a channel.",
        override_usage = "hub deploy-platform --channel CHANNEL --platform-version N --id ID <ARCHIVE>",
        after_help = "Examples:\n  hub deploy-platform --channel nightly --platform-version 1554 --id consulo-win-no-jre consulo-win-no-jre.tar.gz\n"
    )]
    DeployPlatform(DeployPlatformArgs),
    #[command(
        name = "deploy-plugin",
        about = "Validate, repackage, and store a plugin archive.",
        override_usage = "hub deploy-plugin --channel CHANNEL <ARCHIVE>",
        after_help = "Examples:\n  hub deploy-plugin --channel nightly build/com.intellij.xml.zip\n"
    )]
    DeployPlugin(DeployPluginArgs),
    #[command(about = "Copy artifacts a destination channel is missing from a source channel.")]
    Promote(PromoteArgs),
    #[command(about = "Look up the stored plugin for an id and platform version.")]
    Select(SelectArgs),
    #[command(about = "List every node stored on a channel.")]
    List(ListArgs),
}

impl HubCommand {
    fn name(&self) -> &'static str {
        match self {
            HubCommand::DeployPlatform(_) => "deploy-platform",
            HubCommand::DeployPlugin(_) => "deploy-plugin",
            HubCommand::Promote(_) => "promote",
            HubCommand::Select(_) => "select",
            HubCommand::List(_) => "list",
        }
    }
}

#[derive(Args, Debug)]
struct DeployPlatformArgs {
    #[arg(
        long,
        value_name = "CHANNEL",
        help = "Destination channel (nightly, alpha, beta, stable)"
    )]
    channel: String,
    #[arg(long, value_name = "N", help = "Platform generation the archive belongs to")]
    platform_version: u32,
    #[arg(long, value_name = "ID", help = "Identity recorded for the platform artifact")]
    id: String,
    #[arg(value_name = "ARCHIVE", value_parser = value_parser!(PathBuf), help = "Archive file, stored verbatim")]
    archive: PathBuf,
}

#[derive(Args, Debug)]
struct DeployPluginArgs {
    #[arg(
        long,
        value_name = "CHANNEL",
        help = "Destination channel (nightly, alpha, beta, stable)"
    )]
    channel: String,
    #[arg(value_name = "ARCHIVE", value_parser = value_parser!(PathBuf), help = "Plugin zip carrying exactly one plugin.toml")]
    archive: PathBuf,
}

#[derive(Args, Debug)]
struct PromoteArgs {
    #[arg(long, value_name = "CHANNEL", help = "Channel promoted from")]
    from: String,
    #[arg(long, value_name = "CHANNEL", help = "Channel promoted into")]
    to: String,
}

#[derive(Args, Debug)]
struct SelectArgs {
    #[arg(long, value_name = "CHANNEL", help = "Channel queried")]
    channel: String,
    #[arg(long, value_name = "N", help = "Platform generation to match")]
    platform_version: String,
    #[arg(long, value_name = "ID", help = "Plugin id to look up")]
    id: String,
    #[arg(long, help = "Include nodes not yet approved for listing")]
    unapproved: bool,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long, value_name = "CHANNEL", help = "Channel listed")]
    channel: String,
}
