//! Hive 命令行入口
//!
//! 用法：
//!   hive "<query>" [--context <text>] [--collection <name>]... [--config <path>] [--json]
//!   hive --health [--config <path>]

use std::path::PathBuf;

use anyhow::{bail, Context};
use hive::config::load_config;
use hive::{ExecutionContext, Orchestrator};

const USAGE: &str = "usage: hive \"<query>\" [--context <text>] [--collection <name>]... [--config <path>] [--json]\n       hive --health [--config <path>]";

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    query: Option<String>,
    context: Option<String>,
    collections: Vec<String>,
    config: Option<PathBuf>,
    json: bool,
    health: bool,
    help: bool,
}

fn parse_args<I>(args: I) -> anyhow::Result<CliArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut out = CliArgs::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--context" => out.context = Some(args.next().context("--context needs a value")?),
            "--collection" => out
                .collections
                .push(args.next().context("--collection needs a value")?),
            "--config" => {
                out.config = Some(PathBuf::from(args.next().context("--config needs a value")?))
            }
            "--json" => out.json = true,
            "--health" => out.health = true,
            "-h" | "--help" => out.help = true,
            flag if flag.starts_with("--") => bail!("unknown option {flag}"),
            _ if out.query.is_some() => bail!("unexpected extra argument {arg:?}"),
            _ => out.query = Some(arg.clone()),
        }
    }
    Ok(out)
}

impl CliArgs {
    fn execution_context(&self) -> Option<ExecutionContext> {
        if self.context.is_none() && self.collections.is_empty() {
            return None;
        }
        let mut ctx = ExecutionContext::new();
        if let Some(text) = &self.context {
            ctx = ctx.with_text(text.clone());
        }
        if !self.collections.is_empty() {
            ctx = ctx.with_collections(self.collections.iter().cloned());
        }
        Some(ctx)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let args = parse_args(std::env::args().skip(1)).context("Invalid arguments")?;
    if args.help {
        println!("{USAGE}");
        return Ok(());
    }

    let cfg = load_config(args.config.clone()).context("Failed to load config")?;
    let orchestrator = Orchestrator::from_config(&cfg);

    if args.health {
        let health = orchestrator.health().await;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&health)?);
        } else {
            println!("inference:     {}", health.inference);
            println!("vector_search: {}", health.vector_search);
            println!("cache:         {}", health.cache);
        }
        return Ok(());
    }

    let Some(query) = args.query.as_deref() else {
        bail!("missing query\n{USAGE}");
    };

    let outcome = orchestrator
        .run(query, args.execution_context())
        .await
        .context("Orchestration failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.final_report);
        println!("Completed in {:.2}s ({:?})", outcome.duration_secs, outcome.status);
    }
    Ok(())
}
