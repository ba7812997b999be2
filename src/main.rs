use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use relpersist::dialect::{Limit, LockOptions, TemporalUnit};
use relpersist::{DatabaseFamily, DatabaseVersion, Dialect, JdbcType, Size};

#[derive(Parser)]
#[command(name = "relpersist")]
#[command(about = "Inspect the SQL dialect capability model")]
struct Cli {
    /// postgresql, cockroachdb, mysql or informix
    #[arg(long, default_value = "postgresql")]
    family: String,

    /// major[.minor[.micro]]
    #[arg(long)]
    version: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the capability flags of the dialect
    Capabilities,
    /// Render the DDL type for a JDBC type code
    Type {
        name: String,
        #[arg(long)]
        length: Option<u64>,
        #[arg(long)]
        precision: Option<u32>,
        #[arg(long)]
        scale: Option<u32>,
    },
    /// Apply a row window to a select statement
    Limit {
        sql: String,
        #[arg(long)]
        offset: Option<u64>,
        #[arg(long)]
        max_rows: Option<u64>,
    },
    /// Translate a generic datetime pattern to the native format
    Format { pattern: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let family: DatabaseFamily = cli.family.parse().map_err(|e| anyhow!("{e}"))?;
    let version = match &cli.version {
        Some(version) => {
            DatabaseVersion::parse(version).with_context(|| format!("invalid version '{version}'"))?
        }
        None => family.minimum_version(),
    };
    let dialect = Dialect::resolve(family, version);

    match cli.command {
        Command::Capabilities => print_capabilities(&dialect),
        Command::Type {
            name,
            length,
            precision,
            scale,
        } => {
            let code = JdbcType::from_name(&name).ok_or_else(|| anyhow!("unknown JDBC type '{name}'"))?;
            let size = Size {
                length,
                precision,
                scale,
            };
            println!("{}", dialect.type_name(code, size));
        }
        Command::Limit {
            sql,
            offset,
            max_rows,
        } => {
            let limit = Limit {
                first_row: offset,
                max_rows,
            };
            let limited = dialect.limit_handler().apply(&sql, &limit)?;
            println!("{}", limited.sql);
            for value in limited.leading_parameters.iter().chain(&limited.trailing_parameters) {
                println!("  bind {value:?}");
            }
        }
        Command::Format { pattern } => println!("{}", dialect.datetime_format(&pattern)),
    }

    Ok(())
}

fn print_capabilities(dialect: &Dialect) {
    println!("{dialect}");
    let flag = |name: &str, enabled: bool| println!("  {name:<24} {}", if enabled { "yes" } else { "no" });
    flag("window functions", dialect.supports_window_functions());
    flag("lateral", dialect.supports_lateral());
    flag("order by in subquery", dialect.supports_order_by_in_subquery());
    flag("filter clause", dialect.supports_filter_clause());
    flag("skip locked", dialect.supports_skip_locked());
    flag("nowait", dialect.supports_nowait());
    flag("upsert", dialect.supports_upsert());
    flag(
        "identity columns",
        dialect.identity_column_support().supports_identity_columns(),
    );
    println!("  {:<24} {:?}", "limit handler", dialect.limit_handler());
    println!("  {:<24} {}", "max varchar length", dialect.max_varchar_length());
    println!("  {:<24} {}", "row id column", dialect.row_id_column().unwrap_or("-"));
    println!("  {:<24} {}", "for update", dialect.for_update_string(&LockOptions::write()));
    println!(
        "  {:<24} {}",
        "extract(year)",
        dialect.render_extract(TemporalUnit::Year, "created_at")
    );
    match dialect.sequence_support().next_value_string("order_seq") {
        Some(sql) => println!("  {:<24} {sql}", "next sequence value"),
        None => println!("  {:<24} -", "next sequence value"),
    }
}
