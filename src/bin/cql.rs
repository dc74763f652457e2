//! cql: command-line client for Cassandra over Thrift
//!
//! # Usage
//!
//! ```bash
//! # Run a query against a cluster
//! cql "SELECT * FROM users WHERE KEY = ?" --hosts 10.0.0.1,10.0.0.2 --keyspace app --bind ada
//!
//! # Show the bound statement without connecting
//! cql bind "UPDATE users SET name = ? WHERE KEY = ?" --bind "O'Brien",ada
//!
//! # Print the schema a connection learns
//! cql schema --hosts 10.0.0.1 --keyspace app
//! ```
//!
//! Cluster settings are read from `cql.toml` (working directory, then
//! `~/.config/cql/`) and overridden by flags.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use tracing_subscriber::EnvFilter;

use cassandra_cql::pool::parse_host;
use cassandra_cql::prelude::*;

#[derive(Parser)]
#[command(name = "cql")]
#[command(version)]
#[command(about = "Run CQL against a Cassandra cluster over Thrift", long_about = None)]
#[command(after_help = "EXAMPLES:
    cql 'SELECT * FROM users' --hosts db1,db2:9161 --keyspace app
    cql 'SELECT COUNT(*) FROM users WHERE KEY = ?' --bind ada --format json
    cql bind 'INSERT INTO users (KEY, name) VALUES (?, ?)' --bind ada,Ada")]
struct Cli {
    /// The CQL statement to execute
    query: Option<String>,

    /// Placeholder values, in order
    #[arg(short, long, value_delimiter = ',', global = true)]
    bind: Vec<String>,

    /// Nodes as host[:port]
    #[arg(long, value_delimiter = ',', env = "CQL_HOSTS", global = true)]
    hosts: Vec<String>,

    #[arg(short, long, env = "CQL_KEYSPACE", global = true)]
    keyspace: Option<String>,

    #[arg(short, long, env = "CQL_USER", global = true)]
    user: Option<String>,

    #[arg(short, long, env = "CQL_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Path to a cql.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Connect and query timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Decode integer types as arbitrary precision
    #[arg(long, global = true)]
    bigints: bool,

    /// Log query timings
    #[arg(long, global = true)]
    log_time: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Bind placeholders and print the statement without connecting
    Bind {
        /// The CQL template
        query: String,
    },
    /// Connect to the first node and print the keyspace schema
    Schema,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let result = match &cli.command {
        Some(Commands::Bind { query }) => bind_query(query, &cli),
        Some(Commands::Schema) => show_schema(&cli).await,
        None => match &cli.query {
            Some(query) => execute_query(query, &cli).await,
            None => {
                println!("{}", "cql: Cassandra over Thrift".cyan().bold());
                println!();
                println!("Usage: cql <QUERY> [OPTIONS]");
                println!();
                println!("Try: cql --help");
                Ok(())
            }
        },
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    let default = if cli.verbose || cli.log_time {
        "cassandra_cql=trace"
    } else {
        "cassandra_cql=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Numbers and booleans keep their type; anything else binds as text.
fn params(cli: &Cli) -> Vec<Param> {
    cli.bind
        .iter()
        .map(|b| {
            if let Ok(n) = b.parse::<i64>() {
                Param::from(n)
            } else if let Ok(f) = b.parse::<f64>() {
                Param::from(f)
            } else if b == "true" || b == "false" {
                Param::from(b == "true")
            } else {
                Param::from(b.as_str())
            }
        })
        .collect()
}

fn cluster_config(cli: &Cli) -> Result<ClusterConfig> {
    let mut cluster = match &cli.config {
        Some(path) => ClusterConfig::load(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => match ClusterConfig::discover()? {
            Some((path, config)) => {
                if cli.verbose {
                    println!("{} {}", "Config:".dimmed(), path.display());
                }
                config
            }
            None => ClusterConfig::default(),
        },
    };

    if !cli.hosts.is_empty() {
        cluster.hosts = cli.hosts.clone();
    }
    if let Some(keyspace) = &cli.keyspace {
        cluster.keyspace = keyspace.clone();
    }
    if cli.user.is_some() {
        cluster.user = cli.user.clone();
    }
    if cli.password.is_some() {
        cluster.password = cli.password.clone();
    }
    if cli.timeout_ms.is_some() {
        cluster.timeout_ms = cli.timeout_ms;
    }
    cluster.use_bigints |= cli.bigints;
    cluster.log_time |= cli.log_time;
    Ok(cluster)
}

fn bind_query(query: &str, cli: &Cli) -> Result<()> {
    let bound = bind(query, &params(cli))?;
    println!("{}", "Bound CQL:".green().bold());
    println!("{}", bound.white());

    let statement = Statement::parse(&bound)?;
    println!();
    println!("  {} {:?}", "Kind:".dimmed(), statement.kind);
    if let Some(table) = &statement.table {
        println!("  {} {}", "Target:".dimmed(), table.cyan());
    }
    if let Some(projection) = &statement.projection {
        println!("  {} {:?}", "Projection:".dimmed(), projection);
    }
    Ok(())
}

async fn execute_query(query: &str, cli: &Cli) -> Result<()> {
    if cli.verbose {
        println!("{} {}", "Input:".dimmed(), query.yellow());
    }

    let config = cluster_config(cli)?.into_pool_config()?;
    if cli.verbose {
        println!("{} {}", "Hosts:".dimmed(), config.hosts.join(", "));
    }

    let pool = ConnectionPool::new(config)?;
    let result = pool.execute(query, &params(cli)).await;
    pool.shutdown().await;

    format_output(&result?, &cli.format);
    Ok(())
}

async fn show_schema(cli: &Cli) -> Result<()> {
    let cluster = cluster_config(cli)?;
    let Some((host, port)) = cluster.hosts.iter().find_map(|h| parse_host(h)) else {
        bail!("no usable host; use --hosts or set hosts in cql.toml");
    };
    if cluster.keyspace.is_empty() {
        bail!("no keyspace; use --keyspace or set keyspace in cql.toml");
    }

    let mut target = ConnectionTarget::new(host, port, cluster.keyspace.clone());
    if cluster.user.is_some() || cluster.password.is_some() {
        target = target.credentials(
            cluster.user.clone().unwrap_or_default(),
            cluster.password.clone().unwrap_or_default(),
        );
    }
    if let Some(ms) = cluster.timeout_ms {
        target = target.timeout(Duration::from_millis(ms));
    }

    let mut conn = Connection::new(target);
    conn.connect().await?;

    if let Some(schema) = conn.schema() {
        println!("{} {}", "Keyspace:".green().bold(), schema.keyspace().cyan());
        for name in schema.names() {
            let Some(family) = schema.get(name) else {
                continue;
            };
            println!();
            println!("{}", name.white().bold());
            println!("  {} {:?}", "key:".dimmed(), family.key);
            println!("  {} {:?}", "comparator:".dimmed(), family.comparator);
            println!("  {} {:?}", "default:".dimmed(), family.default_validator);
            for (column, validator) in &family.column_validators {
                println!(
                    "    • {} {:?}",
                    String::from_utf8_lossy(column).yellow(),
                    validator
                );
            }
        }
    }

    conn.close().await;
    Ok(())
}

fn format_output(result: &QueryResult, format: &OutputFormat) {
    match result {
        QueryResult::Void => println!("{}", "✓ done".green()),
        QueryResult::Count(n) => match format {
            OutputFormat::Json => println!("{}", serde_json::json!({ "count": n })),
            OutputFormat::Table => println!("{} {}", "count:".dimmed(), n.to_string().cyan()),
        },
        QueryResult::Rows(rows) => format_rows(rows, format),
    }
}

fn format_rows(rows: &Rows, format: &OutputFormat) {
    if rows.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(rows).unwrap_or_default());
        }
        OutputFormat::Table => {
            // Columns in order of first appearance; rows may differ in shape
            let mut columns: Vec<String> = vec!["KEY".to_string()];
            for row in rows {
                for col in row.columns() {
                    let name = col.name.to_string();
                    if !columns.contains(&name) {
                        columns.push(name);
                    }
                }
            }

            let cells: Vec<Vec<String>> = rows
                .iter()
                .map(|row| {
                    columns
                        .iter()
                        .enumerate()
                        .map(|(i, c)| match i {
                            0 => row.key().to_string(),
                            _ => row.get(c).map(ToString::to_string).unwrap_or_default(),
                        })
                        .collect()
                })
                .collect();

            let widths: Vec<usize> = columns
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    cells
                        .iter()
                        .map(|r| r[i].chars().count())
                        .fold(c.chars().count(), usize::max)
                })
                .collect();

            let header: Vec<String> = columns
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:width$}", c, width = *w))
                .collect();
            println!("{}", header.join(" │ ").white().bold());

            let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
            println!("{}", sep.join("─┼─").dimmed());

            for row in &cells {
                let line: Vec<String> = row
                    .iter()
                    .zip(&widths)
                    .map(|(v, w)| format!("{:width$}", v, width = *w))
                    .collect();
                println!("{}", line.join(" │ "));
            }

            println!();
            println!("{} row(s) returned", rows.row_count().to_string().cyan());
        }
    }
}
