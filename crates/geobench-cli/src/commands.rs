//! Subcommands and their execution.

use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use geobench::config::{
    DEFAULT_DB_HOST, DEFAULT_DB_NAME, DEFAULT_DB_PASSWORD, DEFAULT_DB_PORT, DEFAULT_DB_USER,
    DEFAULT_ES_HOST, DEFAULT_ES_PORT, DEFAULT_POOL_SIZE,
};
use geobench::readiness::{DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS};
use geobench::seed::DEFAULT_BATCH_SIZE;
use geobench::workload::DEFAULT_ITERATIONS;
use geobench::{
    generate, seed_stores, wait_for_services, BenchmarkReport, DatasetConfig, DocumentConfig,
    ElasticsearchAdapter, ParameterSampler, PostgresAdapter, QueryKind, RelationalConfig, Result,
    RetryPolicy, Scale, SeedOptions, SeedOutcome, Seeder, StoreAdapter, WorkloadConfig,
    WorkloadDriver,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::formatter::{create_formatter, OutputFormat};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate the dataset and load it into both stores
    Seed(SeedArgs),
    /// Wait for the stores, seed them if empty, then run the query workload
    Benchmark(BenchmarkArgs),
}

/// Store connection settings.
#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// PostgreSQL host
    #[arg(long, env = "DB_HOST", default_value = DEFAULT_DB_HOST)]
    pub db_host: String,

    /// PostgreSQL port
    #[arg(long, env = "DB_PORT", default_value_t = DEFAULT_DB_PORT)]
    pub db_port: u16,

    /// PostgreSQL database name
    #[arg(long, env = "DB_NAME", default_value = DEFAULT_DB_NAME)]
    pub db_name: String,

    /// PostgreSQL user
    #[arg(long, env = "DB_USER", default_value = DEFAULT_DB_USER)]
    pub db_user: String,

    /// PostgreSQL password
    #[arg(
        long,
        env = "DB_PASSWORD",
        default_value = DEFAULT_DB_PASSWORD,
        hide_env_values = true
    )]
    pub db_password: String,

    /// PostgreSQL connection pool size
    #[arg(long, default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: u32,

    /// Elasticsearch host
    #[arg(long, env = "ES_HOST", default_value = DEFAULT_ES_HOST)]
    pub es_host: String,

    /// Elasticsearch port
    #[arg(long, env = "ES_PORT", default_value_t = DEFAULT_ES_PORT)]
    pub es_port: u16,

    /// Readiness polling attempts before giving up
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Seconds between readiness attempts
    #[arg(long, default_value_t = DEFAULT_BACKOFF.as_secs())]
    pub retry_interval: u64,
}

impl ConnectionArgs {
    fn relational(&self) -> RelationalConfig {
        RelationalConfig::new(&self.db_host, self.db_port)
            .with_database(&self.db_name)
            .with_credentials(&self.db_user, &self.db_password)
            .with_pool_size(self.pool_size)
    }

    fn document(&self) -> DocumentConfig {
        DocumentConfig::new(&self.es_host, self.es_port)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.retry_interval))
    }

    /// Build both adapters and wait until they answer.
    fn connect(&self) -> Result<(PostgresAdapter, ElasticsearchAdapter)> {
        let mut relational = PostgresAdapter::new(&self.relational())?;
        let mut document = ElasticsearchAdapter::new(&self.document())?;

        info!(
            postgres = %self.relational().display_target(),
            elasticsearch = %self.document().base_url(),
            "waiting for services"
        );
        let mut adapters: [&mut dyn StoreAdapter; 2] = [&mut relational, &mut document];
        wait_for_services(&mut adapters, self.retry_policy())?;

        Ok((relational, document))
    }
}

/// Dataset size preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScaleArg {
    /// 3 entities x 5 samples
    Tiny,
    /// 10 entities x 100 samples
    Small,
    /// 100 entities x 1,000 samples
    Medium,
    /// 100 entities x 10,000 samples
    Full,
}

impl From<ScaleArg> for Scale {
    fn from(arg: ScaleArg) -> Self {
        match arg {
            ScaleArg::Tiny => Scale::Tiny,
            ScaleArg::Small => Scale::Small,
            ScaleArg::Medium => Scale::Medium,
            ScaleArg::Full => Scale::Full,
        }
    }
}

/// Dataset shape and seeding behaviour.
#[derive(Args, Debug)]
pub struct DatasetArgs {
    /// Dataset size preset
    #[arg(long, value_enum, default_value = "full")]
    pub scale: ScaleArg,

    /// Override the preset's entity count
    #[arg(long)]
    pub entities: Option<usize>,

    /// Override the preset's samples per entity
    #[arg(long)]
    pub samples: Option<usize>,

    /// RNG seed for data generation and query parameters (random if omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Records per write batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Seed both stores at the same time
    #[arg(long)]
    pub parallel_seed: bool,
}

impl DatasetArgs {
    fn dataset(&self) -> DatasetConfig {
        let mut config = DatasetConfig::with_scale(self.scale.into());
        if let Some(entities) = self.entities {
            config = config.with_entity_count(entities);
        }
        if let Some(samples) = self.samples {
            config = config.with_samples_per_entity(samples);
        }
        config
    }

    /// The configured seed, or a fresh one. Logged either way.
    fn resolve_seed(&self) -> u64 {
        let seed = self.seed.unwrap_or_else(rand::random);
        info!(seed, "using RNG seed");
        seed
    }
}

#[derive(Args, Debug)]
pub struct SeedArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Reseed stores that already hold samples
    #[arg(long)]
    pub force: bool,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,
}

/// Query kind selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QueryKindArg {
    /// One entity's samples in a time window
    EntityTimeRange,
    /// Samples inside a bounding box
    BoundingBox,
    /// Several entities' samples in a time window
    EntitySetTimeRange,
}

impl From<QueryKindArg> for QueryKind {
    fn from(arg: QueryKindArg) -> Self {
        match arg {
            QueryKindArg::EntityTimeRange => QueryKind::ByEntityTimeRange,
            QueryKindArg::BoundingBox => QueryKind::ByBoundingBox,
            QueryKindArg::EntitySetTimeRange => QueryKind::ByEntitySetTimeRange,
        }
    }
}

#[derive(Args, Debug)]
pub struct BenchmarkArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Iterations per query kind
    #[arg(short = 'n', long, default_value_t = DEFAULT_ITERATIONS)]
    pub iterations: usize,

    /// Fixed bounding-box half-width in degrees (jittered per iteration if omitted)
    #[arg(long)]
    pub bbox_half_width: Option<f64>,

    /// Query kinds to run (repeatable; all if omitted)
    #[arg(long = "query", value_enum)]
    pub queries: Vec<QueryKindArg>,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,
}

pub fn run(command: Command) -> Result<()> {
    match command {
        Command::Seed(args) => run_seed(args),
        Command::Benchmark(args) => run_benchmark(args),
    }
}

fn seed(
    relational: &mut PostgresAdapter,
    document: &mut ElasticsearchAdapter,
    dataset: &DatasetArgs,
    force: bool,
    seed: u64,
) -> Result<SeedOutcome> {
    let config = dataset.dataset();
    let seeder = Seeder::new().with_batch_size(dataset.batch_size);
    let options = SeedOptions::default()
        .with_force(force)
        .with_parallel(dataset.parallel_seed);

    info!(
        entities = config.entity_count,
        samples_per_entity = config.samples_per_entity,
        "preparing dataset"
    );
    seed_stores(relational, document, &seeder, options, || {
        generate(&config, &mut StdRng::seed_from_u64(seed))
    })
}

fn run_seed(args: SeedArgs) -> Result<()> {
    let (mut relational, mut document) = args.connection.connect()?;
    let seed_value = args.dataset.resolve_seed();

    let outcome = seed(
        &mut relational,
        &mut document,
        &args.dataset,
        args.force,
        seed_value,
    )?;
    println!("{}", create_formatter(args.format).format_seed(&outcome));
    Ok(())
}

fn run_benchmark(args: BenchmarkArgs) -> Result<()> {
    let (mut relational, mut document) = args.connection.connect()?;
    let seed_value = args.dataset.resolve_seed();

    let outcome = seed(&mut relational, &mut document, &args.dataset, false, seed_value)?;
    for report in outcome.reports() {
        info!("{}", report);
    }

    let mut config = WorkloadConfig::new(args.iterations);
    if let Some(half_width) = args.bbox_half_width {
        config = config.with_bbox_half_width(half_width);
    }
    if !args.queries.is_empty() {
        config = config.with_kinds(args.queries.iter().map(|&q| q.into()).collect());
    }

    let mut sampler =
        ParameterSampler::new(args.dataset.dataset(), config.bbox_half_width, seed_value);
    info!(
        iterations = config.iterations,
        kinds = config.kinds.len(),
        "starting benchmark"
    );
    let results = WorkloadDriver::new(&mut relational, &mut document, config).run(&mut sampler)?;

    let report = BenchmarkReport::from_outcome(&results, args.iterations, seed_value);
    println!("{}", create_formatter(args.format).format_report(&report)?);
    Ok(())
}
