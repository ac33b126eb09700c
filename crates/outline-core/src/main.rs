//! `outline` command-line interface

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use outline_core::{
    pump_fragments, BreakdownSession, ByteStream, ChatRequest, CompletionTransport, HttpTransport,
    OutlineConfig, PumpEnd, ReplayTransport,
};
use outline_tree::{Message, NodeId, TopicTree};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let config = Arg::new("config")
        .long("config")
        .value_parser(value_parser!(PathBuf))
        .help("TOML config file");
    let replay = Arg::new("replay")
        .long("replay")
        .value_parser(value_parser!(PathBuf))
        .help("Replay a recorded SSE response instead of calling the endpoint");
    let chunk_size = Arg::new("chunk-size")
        .long("chunk-size")
        .default_value("64")
        .value_parser(value_parser!(usize))
        .help("Bytes per chunk when replaying");

    Command::new("outline")
        .version(outline_core::VERSION)
        .about("Stream topic breakdowns and per-topic chat")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Debug logging"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log as JSON lines"),
        )
        .subcommand(
            Command::new("roadmap")
                .about("Stream a topic breakdown and print the tree")
                .arg(Arg::new("topic").required(true).help("Topic to break down"))
                .arg(config.clone())
                .arg(replay.clone())
                .arg(chunk_size.clone())
                .arg(
                    Arg::new("out")
                        .long("out")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the tree snapshot to this file"),
                ),
        )
        .subcommand(
            Command::new("chat")
                .about("Stream one reply about a topic chain")
                .arg(
                    Arg::new("chain")
                        .required(true)
                        .help("Topic chain, e.g. \"Calculus -> Limits\""),
                )
                .arg(Arg::new("message").required(true).help("Question to ask"))
                .arg(config)
                .arg(replay)
                .arg(chunk_size),
        )
        .subcommand(
            Command::new("show")
                .about("Print a saved tree snapshot")
                .arg(
                    Arg::new("snapshot")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Snapshot JSON file"),
                )
                .arg(
                    Arg::new("select")
                        .long("select")
                        .num_args(1..)
                        .help("Subtopic labels from the root to select"),
                ),
        )
}

fn init_tracing(args: &ArgMatches) {
    let default = if args.get_flag("verbose") { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if args.get_flag("json-logs") {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &ArgMatches) -> Result<OutlineConfig> {
    match args.get_one::<PathBuf>("config") {
        Some(path) => OutlineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(OutlineConfig::default()),
    }
}

fn transport(args: &ArgMatches, config: &OutlineConfig) -> Result<Arc<dyn CompletionTransport>> {
    if let Some(path) = args.get_one::<PathBuf>("replay") {
        let chunk_size = args.get_one::<usize>("chunk-size").copied().unwrap_or(64);
        return Ok(Arc::new(ReplayTransport::new(path).with_chunk_size(chunk_size)));
    }
    Ok(Arc::new(HttpTransport::from_config(config)?))
}

/// Cancel `token` on Ctrl-C
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted");
            token.cancel();
        }
    });
}

fn render(tree: &TopicTree, id: NodeId, depth: usize, collapsed: bool, out: &mut String) {
    let Some(node) = tree.get(id) else {
        return;
    };
    let marker = match (node.is_leaf(), node.is_expanded() || !collapsed) {
        (true, _) => "  ",
        (false, true) => "- ",
        (false, false) => "+ ",
    };
    let read = if node.is_read() { " (read)" } else { "" };
    out.push_str(&format!("{}{marker}{}{read}\n", "  ".repeat(depth), node.label()));
    if collapsed && !node.is_expanded() {
        return;
    }
    for child in node.children() {
        render(tree, *child, depth + 1, collapsed, out);
    }
}

fn outline(tree: &TopicTree, honor_collapse: bool) -> String {
    let mut out = String::new();
    if let Some(root) = tree.root_id() {
        render(tree, root, 0, honor_collapse, &mut out);
    }
    out
}

async fn run_roadmap(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;
    let transport = transport(args, &config)?;
    let topic = args
        .get_one::<String>("topic")
        .context("topic is required")?;

    let session = BreakdownSession::new(config, transport);
    let handle = session.start_roadmap(topic)?;
    let interrupt = CancellationToken::new();
    cancel_on_interrupt(interrupt.clone());

    let summary = tokio::select! {
        summary = handle.wait() => summary?,
        () = interrupt.cancelled() => {
            session.stop_roadmap();
            session.flush().await?;
            print!("{}", outline(&session.tree(), false));
            bail!("breakdown interrupted");
        }
    };

    let tree = session.tree();
    if tree.is_empty() {
        bail!("the response contained no breakdown records");
    }
    print!("{}", outline(&tree, false));
    tracing::info!(
        records = summary.records,
        dropped = summary.dropped,
        nodes = tree.len(),
        "breakdown complete"
    );

    if let Some(path) = args.get_one::<PathBuf>("out") {
        let json = session.export_snapshot().await?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("writing snapshot to {}", path.display()))?;
        tracing::info!(path = %path.display(), "snapshot written");
    }
    Ok(())
}

async fn run_chat(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;
    let transport = transport(args, &config)?;
    let chain = args.get_one::<String>("chain").context("chain is required")?;
    let message = args
        .get_one::<String>("message")
        .context("message is required")?;

    let history = [Message::developer(chain), Message::user(message)];
    let request = ChatRequest::chat(&config, &history);
    let stream = transport.open(&request).await?;

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let mut stdout = std::io::stdout().lock();
    let end = echo_reply(stream, &cancel, &mut stdout).await?;
    writeln!(stdout)?;

    if end == PumpEnd::Cancelled {
        bail!("reply interrupted");
    }
    Ok(())
}

/// Copy reply fragments to `out` as they arrive
///
/// The first write error stops the stream and is returned.
async fn echo_reply<W: Write>(
    stream: ByteStream,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<PumpEnd> {
    let mut write_error = None;
    let end = pump_fragments(stream, cancel, |fragment| {
        if write_error.is_some() {
            return;
        }
        if let Err(e) = out.write_all(fragment.as_bytes()).and_then(|()| out.flush()) {
            write_error = Some(e);
            cancel.cancel();
        }
    })
    .await?;
    if let Some(e) = write_error {
        return Err(e).context("writing reply to stdout");
    }
    Ok(end)
}

fn run_show(args: &ArgMatches) -> Result<()> {
    let path = args
        .get_one::<PathBuf>("snapshot")
        .context("snapshot is required")?;
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    let mut tree = TopicTree::from_json(&json)?;

    if let Some(labels) = args.get_many::<String>("select") {
        let labels: Vec<&String> = labels.collect();
        let Some(target) = tree.resolve_labels(&labels) else {
            bail!("no subtopic matches {labels:?}");
        };
        tree.select(target)?;
        if let Some(node) = tree.get(target) {
            println!("selected: {}", node.chain());
            if let Some(notes) = node.notes() {
                println!("notes: {notes}");
            }
            println!("messages: {}", node.messages().len());
            println!();
        }
    }

    print!("{}", outline(&tree, true));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(&matches);

    match matches.subcommand() {
        Some(("roadmap", args)) => run_roadmap(args).await,
        Some(("chat", args)) => run_chat(args).await,
        Some(("show", args)) => run_show(args),
        _ => unreachable!("subcommand_required"),
    }
}
