//! sqltpl - compile and expand SQL template files
//!
//! # Usage
//!
//! ```bash
//! # List the queries of a file
//! sqltpl check queries.sql
//!
//! # Show the bound statement
//! sqltpl expand queries.sql get_server -p hostname='"localhost"'
//!
//! # Execute it
//! sqltpl run queries.sql get_servers --in hostnames='["a","b"]' --database-url postgres://localhost/app
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use sqltpl::config::{Config, Format};
use sqltpl::engine::{Database, Outcome, Rows};
use sqltpl::lexer::tokenize;
use sqltpl::prelude::*;

#[derive(Parser)]
#[command(name = "sqltpl")]
#[command(version)]
#[command(about = "Compile SQL template files into positional statements", long_about = None)]
#[command(after_help = "EXAMPLES:
    sqltpl check queries.sql
    sqltpl expand queries.sql get_server -p hostname='\"localhost\"'
    sqltpl expand queries.sql get_servers --in hostnames=a,b --start 3
    sqltpl run queries.sql get_server -p hostname='\"localhost\"' --dry-run")]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a file and list its queries
    Check {
        /// The template file
        file: PathBuf,
    },
    /// Print the token stream of a file
    Tokens {
        /// The template file
        file: PathBuf,
    },
    /// Expand a query and print the statement and arguments
    Expand(ExpandArgs),
    /// Expand a query and execute it
    Run {
        #[command(flatten)]
        expand: ExpandArgs,

        /// Database connection URL
        #[arg(long, env = "SQLTPL_DATABASE_URL")]
        database_url: Option<String>,

        /// Don't execute, just show the statement
        #[arg(short, long)]
        dry_run: bool,
    },
}

#[derive(Args)]
struct ExpandArgs {
    /// The template file
    file: PathBuf,

    /// The query to expand
    query: String,

    /// Parameter as name=JSON (bare text is taken as a string)
    #[arg(short = 'p', long = "param", value_parser = parse_binding)]
    params: Vec<(String, serde_json::Value)>,

    /// List parameter as name=JSON_ARRAY or name=a,b,c
    #[arg(long = "in", value_parser = parse_list)]
    lists: Vec<(String, Vec<serde_json::Value>)>,

    /// First placeholder number
    #[arg(long)]
    start: Option<u32>,

    /// Deepest composition nesting
    #[arg(long)]
    max_depth: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
        }
    }
}

fn parse_json_or_text(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn parse_binding(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))?;
    Ok((name.trim().to_string(), parse_json_or_text(value)))
}

fn parse_list(raw: &str) -> Result<(String, Vec<serde_json::Value>), String> {
    let (name, value) = parse_binding(raw)?;
    let values = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::String(text) => text.split(',').map(|s| parse_json_or_text(s.trim())).collect(),
        other => vec![other],
    };
    Ok((name, values))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    match execute(&cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config = Config::load()?;

    match &cli.command {
        Commands::Check { file } => {
            let Some(set) = load(file)? else {
                return Ok(ExitCode::FAILURE);
            };
            show_set(&set);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Tokens { file } => {
            let source = read(file)?;
            match tokenize(&source) {
                Ok(tokens) => {
                    for token in tokens {
                        println!(
                            "{:>7}  {:<16} {}",
                            token.span.to_string().dimmed(),
                            token.kind.to_string().cyan(),
                            format!("{:?}", token.value).white()
                        );
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprint!("{}", CompileError::from(e).render(&source, should_color()));
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Expand(args) => {
            let Some(set) = load(&args.file)? else {
                return Ok(ExitCode::FAILURE);
            };
            let options = options(&config, args).execute(false);
            let format = args.format.unwrap_or_else(|| config.format.into());
            let result = set.expand(&args.query, &params(args), &options);
            Ok(show_expansion(result, options.index, format))
        }
        Commands::Run {
            expand,
            database_url,
            dry_run,
        } => {
            let Some(set) = load(&expand.file)? else {
                return Ok(ExitCode::FAILURE);
            };
            let url = database_url.clone().or_else(|| config.database_url.clone());
            let format = expand.format.unwrap_or_else(|| config.format.into());
            let params = params(expand);
            let options = options(&config, expand);

            // Dry run or no database URL - just show the statement
            let Some(url) = url.filter(|_| !dry_run) else {
                let result = set.expand(&expand.query, &params, &options);
                let code = show_expansion(result, options.index, format);
                if !dry_run {
                    println!();
                    println!(
                        "{}",
                        "⚠ No database URL. Use --database-url or set SQLTPL_DATABASE_URL".yellow()
                    );
                }
                return Ok(code);
            };

            if cli.verbose {
                println!("{} {}", "Connecting to:".dimmed(), url);
            }
            let db = Database::connect(&url).await?;
            match db.call(&set, &expand.query, &params, &options).await {
                Ok(Outcome::Rows(rows)) => {
                    show_rows(rows, format)?;
                    Ok(ExitCode::SUCCESS)
                }
                Ok(Outcome::Query(query)) => Ok(show_expansion(Ok(query), options.index, format)),
                Err(RunError::Unbound(unbound)) => Ok(show_expansion(Err(unbound), options.index, format)),
                Err(e) => Err(e.into()),
            }
        }
    }
}

fn read(file: &Path) -> anyhow::Result<String> {
    fs::read_to_string(file).with_context(|| format!("cannot read {}", file.display()))
}

/// Compile `file`, printing a source snippet on failure.
fn load(file: &Path) -> anyhow::Result<Option<QuerySet>> {
    let source = read(file)?;
    match QuerySet::parse(&source) {
        Ok(set) => Ok(Some(set)),
        Err(e) => {
            eprint!("{}", e.render(&source, should_color()));
            eprintln!("{}", format!("  in {}", file.display()).dimmed());
            Ok(None)
        }
    }
}

fn should_color() -> bool {
    colored::control::SHOULD_COLORIZE.should_colorize()
}

fn options(config: &Config, args: &ExpandArgs) -> Options {
    let mut options = config.options();
    if let Some(start) = args.start {
        options = options.index(start);
    }
    if let Some(max_depth) = args.max_depth {
        options = options.max_depth(max_depth);
    }
    options
}

fn params(args: &ExpandArgs) -> Params {
    let mut params = Params::new();
    for (name, value) in &args.params {
        params.insert(name.as_str(), value.clone());
    }
    for (name, values) in &args.lists {
        params.insert(name.as_str(), Value::in_list(values.iter().cloned()));
    }
    params
}

fn show_set(set: &QuerySet) {
    println!("{} {} queries", "✓".green(), set.len().to_string().cyan());
    for query in set.iter() {
        let Some(name) = query.name() else {
            continue;
        };
        println!();
        println!("{} {}", name.cyan().bold(), format!("({})", query.span()).dimmed());
        if let Some(docs) = query.docs() {
            println!("  {}", docs.white());
        }
        let params = set.params(name).unwrap_or_default();
        if !params.is_empty() {
            let shown: Vec<String> = params
                .iter()
                .map(|p| {
                    if p.starts_with('_') {
                        format!(":{}", p).dimmed().to_string()
                    } else {
                        format!(":{}", p).yellow().to_string()
                    }
                })
                .collect();
            println!("  {} {}", "Params:".dimmed(), shown.join(" "));
        }
        let composes = set.compositions(name).unwrap_or_default();
        if !composes.is_empty() {
            println!("  {} {}", "Composes:".dimmed(), composes.join(", ").green());
        }
    }
}

fn show_expansion(result: Result<Query, Unbound>, start: u32, format: OutputFormat) -> ExitCode {
    match (result, format) {
        (Ok(query), OutputFormat::Json) => {
            println!("{}", serde_json::to_string_pretty(&query).unwrap_or_default());
            ExitCode::SUCCESS
        }
        (Ok(query), OutputFormat::Text) => {
            println!("{}", "Statement:".green().bold());
            println!("  {}", query.statement.white());
            if !query.arguments.is_empty() {
                println!();
                println!("{}", "Arguments:".cyan());
                for (label, arg) in argument_labels(start, query.arguments.len()).zip(&query.arguments) {
                    println!("  {} = {}", label, arg.to_string().yellow());
                }
            }
            ExitCode::SUCCESS
        }
        (Err(unbound), OutputFormat::Json) => {
            let errors: Vec<serde_json::Value> = unbound
                .errors
                .iter()
                .map(|e| serde_json::json!({ "name": e.name, "error": format!("{:?}", e.kind) }))
                .collect();
            let report = serde_json::json!({
                "statement": unbound.statement,
                "arguments": unbound.arguments,
                "errors": errors,
            });
            println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
            ExitCode::from(2)
        }
        (Err(unbound), OutputFormat::Text) => {
            eprintln!("{}", "Unbound query:".red().bold());
            eprintln!("  {}", unbound.statement.white());
            eprintln!();
            for error in &unbound.errors {
                eprintln!("  {} {}", "✗".red(), error);
            }
            ExitCode::from(2)
        }
    }
}

/// Placeholder names for `count` arguments numbered from `start`.
fn argument_labels(start: u32, count: usize) -> impl Iterator<Item = String> {
    (0..count as u64).map(move |i| format!("${}", u64::from(start) + i))
}

fn show_rows(rows: Rows, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rows.into_maps())?);
        }
        OutputFormat::Text => {
            if rows.rows.is_empty() {
                println!("{}", "(0 rows)".dimmed());
                return Ok(());
            }
            println!("{}", rows.columns.join(" | ").white().bold());
            println!("{}", "─".repeat(rows.columns.join(" | ").len()).dimmed());
            for row in &rows.rows {
                let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                println!("{}", cells.join(" | "));
            }
            println!("{}", format!("({} rows)", rows.rows.len()).dimmed());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_labels_follow_start_index() {
        assert_eq!(argument_labels(1, 2).collect::<Vec<_>>(), vec!["$1", "$2"]);
        assert_eq!(argument_labels(3, 2).collect::<Vec<_>>(), vec!["$3", "$4"]);
        assert_eq!(argument_labels(7, 0).count(), 0);
    }

    #[test]
    fn test_start_flag_reaches_options() {
        let cli = Cli::parse_from(["sqltpl", "expand", "q.sql", "get", "--start", "3"]);
        let Commands::Expand(args) = &cli.command else {
            panic!("expected expand");
        };
        assert_eq!(options(&Config::default(), args).index, 3);
    }

    #[test]
    fn test_parse_list_forms() {
        let (name, values) = parse_list("ids=[1,2]").unwrap();
        assert_eq!(name, "ids");
        assert_eq!(values, vec![serde_json::json!(1), serde_json::json!(2)]);
        let (_, values) = parse_list("hosts=a,b").unwrap();
        assert_eq!(values, vec![serde_json::json!("a"), serde_json::json!("b")]);
    }
}
