use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;
use async_trait::async_trait;
use clap::{Parser, Subcommand};

use feedforge::{
    CompositionEngine, Dispatcher, FeedforgeResult, FontResolver, FsObjectStore,
    HttpFontProvider, HttpImageFetcher, JobStore as _, LayoutDocument, NullFontProvider,
    PgCatalogStore, PgJobStore, QueueMessage, QueueSink, StaticTokenValidator, WorkerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "feedforge", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a layout document to a PNG without any job machinery.
    Render(RenderArgs),
    /// Handle one queue message body against the configured stores.
    Handle(HandleArgs),
    /// Print the generation status summary for one outfeed.
    Status(StatusArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input layout document JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Durable font store root (object keys `fonts/<family>-<variant>.ttf`).
    #[arg(long, env = "FEEDFORGE_FONT_STORE_ROOT", default_value = ".")]
    fonts_root: PathBuf,

    /// Bundled fallback font path.
    #[arg(long, env = "FEEDFORGE_BUNDLED_FONT")]
    bundled_font: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct HandleArgs {
    /// File holding one queue message body; `-` reads stdin.
    #[arg(long)]
    message: PathBuf,

    #[command(flatten)]
    worker: WorkerArgs,

    /// Static `token=subject` pairs accepted for process messages.
    #[arg(long = "token-subject", value_name = "TOKEN=SUBJECT")]
    token_subjects: Vec<String>,
}

#[derive(Parser, Debug)]
struct StatusArgs {
    /// Outfeed to summarize.
    #[arg(long)]
    outfeed: String,

    #[arg(long, env = "FEEDFORGE_DATABASE_URL")]
    database_url: String,
}

#[derive(clap::Args, Debug)]
struct WorkerArgs {
    #[arg(long, env = "FEEDFORGE_DATABASE_URL")]
    database_url: String,

    /// Object store root for rendered outputs.
    #[arg(long, env = "FEEDFORGE_OUTPUT_STORE_ROOT")]
    output_root: PathBuf,

    /// Object store root for the durable font cache.
    #[arg(long, env = "FEEDFORGE_FONT_STORE_ROOT")]
    fonts_root: PathBuf,

    #[arg(long, env = "FEEDFORGE_BUNDLED_FONT")]
    bundled_font: Option<PathBuf>,

    /// Remote font provider endpoint; requires the API key.
    #[arg(long, env = "FEEDFORGE_FONT_PROVIDER_URL")]
    font_provider_url: Option<String>,

    #[arg(long, env = "FEEDFORGE_FONT_PROVIDER_KEY")]
    font_provider_key: Option<String>,
}

impl WorkerArgs {
    fn into_config(self) -> WorkerConfig {
        WorkerConfig {
            database_url: self.database_url,
            output_store_root: self.output_root,
            font_store_root: self.fonts_root,
            bundled_font_path: self.bundled_font,
            font_provider_url: self.font_provider_url,
            font_provider_key: self.font_provider_key,
        }
    }
}

/// Emits follow-up messages on stdout; the real queue transport lives
/// outside this binary.
struct StdoutQueueSink;

#[async_trait]
impl QueueSink for StdoutQueueSink {
    async fn send(&self, message: &QueueMessage) -> FeedforgeResult<()> {
        println!(
            "{}",
            serde_json::to_string(message)
                .map_err(|e| feedforge::FeedforgeError::serde(e.to_string()))?
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args).await,
        Command::Handle(args) => cmd_handle(args).await,
        Command::Status(args) => cmd_status(args).await,
    }
}

fn font_resolver(
    fonts_root: &Path,
    bundled_font: Option<PathBuf>,
    provider: Option<(String, String)>,
) -> FontResolver {
    let store = Arc::new(FsObjectStore::new(fonts_root));
    match provider {
        Some((url, key)) => FontResolver::new(
            store,
            Arc::new(HttpFontProvider::new(url, key)),
            bundled_font,
        ),
        None => FontResolver::new(store, Arc::new(NullFontProvider), bundled_font),
    }
}

async fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&args.in_path)
        .with_context(|| format!("open document '{}'", args.in_path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| "parse document JSON")?;
    let document = LayoutDocument::from_json(value)?;
    document.validate()?;

    let resolver = font_resolver(&args.fonts_root, args.bundled_font, None);
    let engine = CompositionEngine::new(Arc::new(resolver), Arc::new(HttpImageFetcher::new()));

    let rendered = engine.render(&document).await?;
    for diagnostic in &rendered.diagnostics {
        eprintln!("skipped {diagnostic}");
    }

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        rendered.image.as_raw(),
        rendered.image.width(),
        rendered.image.height(),
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

async fn cmd_handle(args: HandleArgs) -> anyhow::Result<()> {
    let raw = if args.message.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("read message from stdin")?
    } else {
        std::fs::read_to_string(&args.message)
            .with_context(|| format!("open message '{}'", args.message.display()))?
    };

    let mut validator = StaticTokenValidator::new();
    for pair in &args.token_subjects {
        let (token, subject) = pair
            .split_once('=')
            .with_context(|| format!("invalid --token-subject '{pair}', expected TOKEN=SUBJECT"))?;
        validator = validator.with_token(token, subject);
    }

    let config = args.worker.into_config();
    let pool = sqlx::PgPool::connect(&config.database_url)
        .await
        .context("connect to database")?;

    let provider = config
        .font_provider_url
        .clone()
        .zip(config.font_provider_key.clone());
    let resolver = font_resolver(
        &config.font_store_root,
        config.bundled_font_path.clone(),
        provider,
    );
    let engine = CompositionEngine::new(Arc::new(resolver), Arc::new(HttpImageFetcher::new()));
    let dispatcher = Dispatcher::new(
        Arc::new(PgCatalogStore::new(pool.clone())),
        Arc::new(PgJobStore::new(pool)),
        Arc::new(FsObjectStore::new(config.output_store_root.clone())),
        Arc::new(StdoutQueueSink),
        Arc::new(validator),
        engine,
    );

    let outcome = dispatcher.handle(&raw).await?;
    eprintln!("{outcome:?}");
    Ok(())
}

async fn cmd_status(args: StatusArgs) -> anyhow::Result<()> {
    let pool = sqlx::PgPool::connect(&args.database_url)
        .await
        .context("connect to database")?;
    let jobs = PgJobStore::new(pool);

    match jobs.status_summary(&args.outfeed).await? {
        Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
        None => {
            eprintln!("outfeed '{}' has no jobs", args.outfeed);
            std::process::exit(1);
        }
    }
    Ok(())
}
