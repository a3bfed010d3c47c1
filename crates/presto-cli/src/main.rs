use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use presto_config::{ConfigParser, DashboardPersistence, DataSourceConfig};
use presto_data::{PrestoDatasource, VariableMap};
use presto_local_storage::{FileStorage, LocalDashboardStore};
use presto_shared::{AnnotationDefinition, QueryOptions, QueryTarget, RawTimeRange};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOCAL_DASHBOARDS: &str = "dashboards.json";

#[derive(Parser)]
#[command(name = "presto-cli")]
#[command(about = "Query a Presto engine the way the dashboard datasource does", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Datasource config file (yaml, json or toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Dashboard variable, `name=value`, may be repeated
    #[arg(long = "var", value_name = "NAME=VALUE", global = true)]
    vars: Vec<String>,
}

#[derive(Args)]
struct RangeArgs {
    /// Range start: `now-<n><unit>`, a date or epoch milliseconds
    #[arg(long, default_value = "now-1h")]
    from: String,

    /// Range end
    #[arg(long, default_value = "now")]
    to: String,
}

impl RangeArgs {
    fn range(&self) -> RawTimeRange {
        RawTimeRange::new(self.from.clone(), self.to.clone())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run one panel target and print the resulting series
    Query {
        /// Table to read
        #[arg(long, required_unless_present = "raw")]
        series: Option<String>,
        /// Column to aggregate
        #[arg(long, required_unless_present = "raw")]
        column: Option<String>,
        /// Aggregate function (defaults to mean)
        #[arg(long)]
        function: Option<String>,
        /// Extra predicate
        #[arg(long)]
        condition: Option<String>,
        /// Hand-written query instead of series/column
        #[arg(long)]
        raw: Option<String>,
        #[arg(long)]
        group_by: Option<String>,
        #[arg(long)]
        alias: Option<String>,
        /// Bucket width such as 10s, 1m, 1h
        #[arg(long, default_value = "1m")]
        interval: String,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Run an annotation query
    Annotations {
        query: String,
        #[arg(long)]
        title_column: Option<String>,
        #[arg(long)]
        tags_column: Option<String>,
        #[arg(long)]
        text_column: Option<String>,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Run a metric lookup query
    Metrics { query: String },
    /// List tables
    Series,
    /// List the columns of a table
    Columns { series: String },
    /// Dashboard storage
    Dashboard {
        #[command(subcommand)]
        action: DashboardAction,
    },
}

#[derive(Subcommand)]
enum DashboardAction {
    /// Print a stored dashboard
    Get {
        id: String,
        #[arg(long)]
        temp: bool,
    },
    /// Save the dashboard JSON in FILE
    Save { file: PathBuf },
    /// Delete a dashboard
    Delete { id: String },
    /// Search by `tags!:<q>`, `title:<q>` or plain text
    Search { query: String },
}

fn parse_vars(vars: &[String]) -> Result<VariableMap> {
    let mut map = VariableMap::new();
    for var in vars {
        let Some((name, value)) = var.split_once('=') else {
            bail!("variable '{}' is not in name=value form", var);
        };
        map.insert(name.trim(), value);
    }
    Ok(map)
}

fn load_config(path: Option<&PathBuf>) -> Result<DataSourceConfig> {
    match path {
        Some(path) => ConfigParser::parse_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(DataSourceConfig::default()),
    }
}

fn build_datasource(config: DataSourceConfig, vars: VariableMap) -> Result<PrestoDatasource> {
    let local = match config.dashboards {
        DashboardPersistence::Local => {
            let path = config
                .local_storage_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCAL_DASHBOARDS));
            info!("Dashboards stored locally in {}", path.display());
            Some(LocalDashboardStore::new(FileStorage::new(path)).with_temp_ttl(config.temp_ttl()?))
        }
        DashboardPersistence::Engine => None,
    };

    let mut datasource = PrestoDatasource::connect(config)?.with_templates(Arc::new(vars));
    if let Some(store) = local {
        datasource = datasource.with_dashboard_store(Arc::new(store));
    }
    Ok(datasource)
}

async fn run(datasource: &PrestoDatasource, command: Commands) -> Result<Value> {
    let output = match command {
        Commands::Query {
            series,
            column,
            function,
            condition,
            raw,
            group_by,
            alias,
            interval,
            range,
        } => {
            let target = QueryTarget {
                series,
                column,
                function,
                condition,
                raw_query: raw.is_some(),
                query: raw,
                group_by_field: group_by,
                alias,
                ..Default::default()
            };
            let options = QueryOptions {
                range: range.range(),
                interval,
                targets: vec![target],
            };
            serde_json::to_value(datasource.query(&options).await?)?
        }
        Commands::Annotations {
            query,
            title_column,
            tags_column,
            text_column,
            range,
        } => {
            let definition = AnnotationDefinition {
                name: "cli".to_string(),
                query,
                title_column,
                tags_column,
                text_column,
            };
            serde_json::to_value(datasource.annotation_query(&definition, &range.range()).await?)?
        }
        Commands::Metrics { query } => {
            serde_json::to_value(datasource.metric_find_query(&query).await?)?
        }
        Commands::Series => serde_json::to_value(datasource.list_series().await?)?,
        Commands::Columns { series } => {
            serde_json::to_value(datasource.list_columns(&series).await?)?
        }
        Commands::Dashboard { action } => match action {
            DashboardAction::Get { id, temp } => datasource.get_dashboard(&id, temp).await?,
            DashboardAction::Save { file } => {
                let content = std::fs::read_to_string(&file)
                    .with_context(|| format!("reading {}", file.display()))?;
                let dashboard: Value = serde_json::from_str(&content)?;
                serde_json::to_value(datasource.save_dashboard(dashboard).await?)?
            }
            DashboardAction::Delete { id } => {
                Value::String(datasource.delete_dashboard(&id).await?)
            }
            DashboardAction::Search { query } => {
                serde_json::to_value(datasource.search_dashboards(&query).await?)?
            }
        },
    };

    Ok(output)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(cli.config.as_ref())?;
    let datasource = build_datasource(config, parse_vars(&cli.vars)?)?;

    // Requests retry until they succeed, so Ctrl-C is the way out
    let output = tokio::select! {
        result = run(&datasource, cli.command) => result?,
        _ = signal::ctrl_c() => {
            warn!("Interrupted, cancelling outstanding requests");
            datasource.shutdown();
            bail!("interrupted");
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use presto_data::TemplateSrv;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_query_command() {
        let cli = Cli::try_parse_from([
            "presto-cli",
            "--debug",
            "query",
            "--series",
            "cpu",
            "--column",
            "load",
            "--from",
            "now-6h",
            "--var",
            "dc=east",
        ])
        .unwrap();

        assert!(cli.debug);
        assert_eq!(cli.vars, vec!["dc=east"]);
        match cli.command {
            Commands::Query { series, range, .. } => {
                assert_eq!(series.as_deref(), Some("cpu"));
                assert_eq!(range.range(), RawTimeRange::last("6h"));
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn test_query_needs_series_or_raw() {
        assert!(Cli::try_parse_from(["presto-cli", "query"]).is_err());
        assert!(Cli::try_parse_from(["presto-cli", "query", "--raw", "select 1"]).is_ok());
    }

    #[test]
    fn test_parse_vars() {
        let vars = parse_vars(&["dc=east".to_string(), "q=a=b".to_string()]).unwrap();
        assert_eq!(vars.replace("$dc $q"), "east a=b");
        assert!(parse_vars(&["nope".to_string()]).is_err());
    }

    #[test]
    fn test_local_dashboards_wired_from_config() {
        let dir = std::env::temp_dir().join("presto-cli-test-dashboards.json");
        let config = DataSourceConfig {
            dashboards: DashboardPersistence::Local,
            local_storage_path: Some(dir),
            ..Default::default()
        };
        assert!(build_datasource(config, VariableMap::new()).is_ok());

        let config = DataSourceConfig {
            urls: Vec::new(),
            ..Default::default()
        };
        assert!(build_datasource(config, VariableMap::new()).is_err());
    }
}
