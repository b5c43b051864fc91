use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stockwise_core::analytics::price::{self, PriceQuery};
use stockwise_core::analytics::recommend::{self, ComparisonRequest};
use stockwise_core::domain::period::parse_period;
use stockwise_core::ingest::file::JsonFileSource;
use stockwise_core::ingest::source::{period_rows_for_store, PgTransactionSource, TransactionSource};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod render;

#[derive(Debug, Parser)]
#[command(name = "stockwise_worker")]
struct Args {
    /// Read sales rows from a JSON file instead of DATABASE_URL.
    #[arg(long, global = true)]
    input: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compare a store's category sales with its peer cluster and the network.
    Recommend {
        #[arg(long)]
        store_id: String,

        #[arg(long)]
        category: String,

        /// Transaction month (YYYY-MM).
        #[arg(long)]
        period: String,

        /// Number of products per list. Defaults to DEFAULT_TOP_N or 5.
        #[arg(long)]
        top_n: Option<usize>,
    },

    /// Estimate the revenue-maximizing price for one product.
    Price {
        #[arg(long)]
        description: String,

        #[arg(long)]
        cluster: Option<i64>,

        /// Transaction month (YYYY-MM).
        #[arg(long)]
        period: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = stockwise_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(args, &settings).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "worker run failed");
        return Err(err);
    }
    Ok(())
}

async fn run(args: Args, settings: &stockwise_core::config::Settings) -> anyhow::Result<()> {
    let source = open_source(args.input, settings).await?;
    tracing::info!(source = source.source_name(), "sales source ready");

    match args.command {
        Command::Recommend {
            store_id,
            category,
            period,
            top_n,
        } => {
            let period = parse_period(&period)?;
            let (rows, directory) =
                period_rows_for_store(source.as_ref(), &period, &store_id).await?;
            let req = ComparisonRequest {
                store_id: &store_id,
                category: &category,
                period: &period,
                top_n: top_n.unwrap_or(settings.default_top_n),
            };
            let result = recommend::compare_with_directory(&req, &rows, directory.as_ref())
                .with_context(|| format!("recommendation for store {store_id} failed"))?;
            print!("{}", render::comparison(&result));
        }
        Command::Price {
            description,
            cluster,
            period,
        } => {
            let period = period.as_deref().map(parse_period).transpose()?;
            let rows = source.rows_for_description(&description).await?;
            let query = PriceQuery {
                description: &description,
                peer_cluster: cluster,
                period: period.as_deref(),
            };
            let analysis = price::analyze(&rows, &query)
                .with_context(|| format!("price estimate for {description:?} failed"))?;
            print!("{}", render::price_analysis(&description, &analysis));
        }
    }
    Ok(())
}

async fn open_source(
    input: Option<PathBuf>,
    settings: &stockwise_core::config::Settings,
) -> anyhow::Result<Box<dyn TransactionSource>> {
    if let Some(path) = input {
        return Ok(Box::new(JsonFileSource::new(path)));
    }

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;
    stockwise_core::storage::migrate(&pool).await?;
    Ok(Box::new(PgTransactionSource::new(pool)))
}

fn init_sentry(settings: &stockwise_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recommend_subcommand() {
        let args = Args::parse_from([
            "stockwise_worker",
            "recommend",
            "--store-id",
            "SPICC",
            "--category",
            "Beverage: Soda",
            "--period",
            "2019-09",
            "--input",
            "sales.json",
        ]);
        assert_eq!(args.input, Some(PathBuf::from("sales.json")));
        match args.command {
            Command::Recommend { store_id, top_n, .. } => {
                assert_eq!(store_id, "SPICC");
                assert_eq!(top_n, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_price_subcommand_with_filters() {
        let args = Args::parse_from([
            "stockwise_worker",
            "price",
            "--description",
            "Cola 12pk",
            "--cluster",
            "0",
        ]);
        match args.command {
            Command::Price {
                cluster, period, ..
            } => {
                assert_eq!(cluster, Some(0));
                assert_eq!(period, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
