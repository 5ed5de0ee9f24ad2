use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand};

use rust_http_bench::config::{BenchConfig, ReportConfig};
use rust_http_bench::harness::{BenchmarkRun, Harness};
use rust_http_bench::load_generator::Dispatcher;
use rust_http_bench::persist::RunFiles;
use rust_http_bench::probe::{ContainerProbe, ProcessProbe, ResourceProbe};
use rust_http_bench::target::DockerCli;
use rust_http_bench::{logging, persist, report};

/// Load-test an HTTP endpoint while sampling the memory of the process behind it
#[derive(Parser)]
#[command(name = "rust-http-bench", version)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one benchmark and write its series files
    Run(RunArgs),

    /// Summarise a directory of series files
    Report(ReportConfig),
}

#[derive(clap::Args)]
#[command(group(ArgGroup::new("target").required(true).args(["pid", "container", "image"])))]
struct RunArgs {
    #[command(flatten)]
    bench: BenchConfig,

    /// Sample a local process by PID
    #[arg(long)]
    pid: Option<u32>,

    /// Sample an already running docker container
    #[arg(long)]
    container: Option<String>,

    /// Build this image, run it as a container of the same name, and sample it
    #[arg(long, requires = "build_dir")]
    image: Option<String>,

    /// Docker build context for --image
    #[arg(long)]
    build_dir: Option<PathBuf>,

    /// Port published by the container started for --image
    #[arg(long, default_value_t = 8081)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Report(config) => report_cmd(config),
    }
}

async fn run(args: RunArgs) -> Result<()> {
    println!();
    println!("╔══════════════════════════════════════════════════╗");
    println!("║   🔬  HTTP LOAD + MEMORY HARNESS                 ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();

    let config = args.bench;
    config.validate()?;

    // ── 1. Everything that can fail before a container exists ───
    let dispatcher = Dispatcher::http(config.request_timeout())?;
    let docker = DockerCli::default();

    // ── 2. Pick what to sample ───────────────────────────────────
    let probe: Arc<dyn ResourceProbe> = match (args.pid, args.container.or(args.image.clone())) {
        (Some(pid), _) => Arc::new(ProcessProbe::new(pid)),
        (None, Some(name)) => Arc::new(ContainerProbe::new(docker.clone(), name)),
        (None, None) => bail!("one of --pid, --container or --image is required"),
    };

    // ── 3. Run, inside the container lifecycle if we own it ──────
    let (bench_run, files) = match (&args.image, &args.build_dir) {
        (Some(image), Some(dir)) => {
            docker
                .with_container(image, dir, args.port, || measure(&config, dispatcher, probe))
                .await?
        }
        _ => measure(&config, dispatcher, probe).await?,
    };

    let summary = bench_run.latency_summary();
    println!();
    println!("   requests   {:>8}  (timeouts {})", bench_run.requests().len(), summary.timeouts);
    println!("   samples    {:>8}", bench_run.resources().len());
    if summary.has_data() {
        println!(
            "   latency    p50 {}μs  p95 {}μs  p99 {}μs  max {}μs",
            summary.p50, summary.p95, summary.p99, summary.max
        );
    }
    println!("   wrote      {}", files.requests.display());
    println!("              {}", files.resources.display());
    println!();

    if let rust_http_bench::RunStatus::Failed(reason) = bench_run.status() {
        bail!("benchmark run failed: {reason}");
    }
    Ok(())
}

/// Run the harness and persist whatever it produced, even for a failed run.
async fn measure(
    config: &BenchConfig,
    dispatcher: Dispatcher<reqwest::Client>,
    probe: Arc<dyn ResourceProbe>,
) -> Result<(BenchmarkRun, RunFiles)> {
    let mut harness = Harness::new(dispatcher, probe);
    let bench_run = harness.run(config).await;

    let files = persist::write_run(&config.output_dir, &bench_run)
        .with_context(|| format!("writing results to {}", config.output_dir.display()))?;
    Ok((bench_run, files))
}

fn report_cmd(config: ReportConfig) -> Result<()> {
    let summaries = report::run(&config)
        .with_context(|| format!("summarising {}", config.input_dir.display()))?;

    if summaries.is_empty() {
        println!("no series files found in {}", config.input_dir.display());
        return Ok(());
    }
    for group in &summaries {
        println!("{}", report::render_line(group));
    }
    Ok(())
}
