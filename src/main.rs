use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use sqlblocks::{config, parser, Dialect, Language, Session, SessionConfig};

/// sqlblocks - translate queries between SQL, Cypher, MongoDB and dataframe code
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Query text; read from stdin when omitted
    query: Option<String>,

    /// Output language: sql, mongodb, neo4j, pipe, pandas or spark
    #[arg(long, default_value = "sql")]
    to: Language,

    /// SQL dialect, overriding SQLBLOCKS_DIALECT and the config file
    #[arg(long)]
    dialect: Option<Dialect>,

    /// Run the optimization rules before rendering
    #[arg(long)]
    optimize: bool,

    /// Render on a single line
    #[arg(long)]
    single_line: bool,

    /// YAML session configuration
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> Result<SessionConfig, config::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::from_yaml_file(path)?,
        None => SessionConfig::from_env()?,
    };
    if let Some(dialect) = cli.dialect {
        config.dialect = dialect;
    }
    if cli.single_line {
        config.break_lines = false;
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    let session = Session::new(config);

    let text = match &cli.query {
        Some(text) => text.clone(),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("reading query from stdin")?;
            buffer
        }
    };

    let mut query = parser::merge_all(sqlblocks::detect(&text, &session)?, &session)?;
    if cli.optimize {
        query.optimize(None, &session)?;
    }
    println!("{}", query.translate_to(cli.to, &session)?);
    Ok(())
}
