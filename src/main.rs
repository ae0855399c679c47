mod cli;

use ffpipe::config;
use ffpipe::template::{CommandTemplate, TemplateContext};
use ffpipe_av::{FfmpegCommand, Outcome, StreamPipeSink, StreamPipeSource, ToolRegistry};
use ffpipe_core::FfmpegConfig;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, RunArgs};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Number of trailing diagnostic lines printed for a failed run.
const DIAGNOSTIC_TAIL: usize = 10;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            // Verbose mode: every ffmpeg diagnostic line as well
            "ffpipe=trace,ffpipe_av=trace,ffpipe_core=debug,ffmpeg=trace".to_string()
        } else {
            "ffpipe=info,ffpipe_av=info,ffpipe_core=info".to_string()
        }
    });

    // stdout may carry media, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run(config, args))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
    }
}

async fn run(config: FfmpegConfig, opts: RunArgs) -> Result<()> {
    if opts.input_format.is_some() && !opts.stdin {
        anyhow::bail!("--input-format requires --stdin");
    }
    if opts.output_format.is_some() && !opts.stdout {
        anyhow::bail!("--output-format requires --stdout");
    }

    let mut ctx = TemplateContext::new();
    for assignment in &opts.vars {
        let (key, value) = TemplateContext::parse_assignment(assignment)?;
        ctx.set(&key, &value);
    }

    let input = opts.stdin.then(|| {
        let source = StreamPipeSource::new(tokio::io::stdin());
        match &opts.input_format {
            Some(format) => source.with_format(format),
            None => source,
        }
    });
    let output = opts.stdout.then(|| {
        let sink = StreamPipeSink::new(tokio::io::stdout());
        match &opts.output_format {
            Some(format) => sink.with_format(format),
            None => sink,
        }
    });

    let template = CommandTemplate::new(opts.args.iter().cloned());
    let arguments = template
        .assemble(&ctx, input, output, &config.pipe_dir())
        .context("Failed to assemble ffmpeg arguments")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted; cancelling");
            on_interrupt.cancel();
        }
    });

    let mut command = FfmpegCommand::new(&config, arguments)
        .cancellable(cancel)
        .on_time_progress(|processed| tracing::debug!("Processed {:.2}s", processed.as_secs_f64()));
    if let Some(secs) = opts.duration {
        if !secs.is_finite() || secs <= 0.0 {
            anyhow::bail!("--duration must be a positive number of seconds");
        }
        command = command
            .duration(Duration::from_secs_f64(secs))
            .on_percent_progress(|pct| tracing::info!("Progress: {:.2}%", pct));
    }
    if let Some(secs) = opts.timeout {
        command = command.timeout(Duration::from_secs(secs));
    }

    match command.run().await {
        Outcome::Success => Ok(()),
        Outcome::Cancelled => anyhow::bail!("ffmpeg run cancelled"),
        Outcome::Failure(failure) => {
            let skip = failure.diagnostics.len().saturating_sub(DIAGNOSTIC_TAIL);
            for line in &failure.diagnostics[skip..] {
                eprintln!("  {}", line);
            }
            Err(ffpipe_core::Error::from(failure).into())
        }
    }
}

fn check_tools(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg or set binary_folder in the config.");
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            let config = config::load_config_or_default(None)?;
            println!("No config file specified, using defaults");
            config
        }
    };

    let describe = |p: &Option<std::path::PathBuf>, fallback: &str| {
        p.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| fallback.to_string())
    };
    println!("  Binary folder: {}", describe(&config.binary_folder, "(PATH)"));
    println!(
        "  Working directory: {}",
        describe(&config.working_directory, "(inherited)")
    );
    println!("  Pipe directory: {}", config.pipe_dir().display());
    println!(
        "  Log level: {}",
        config.log_level.as_deref().unwrap_or("(ffmpeg default)")
    );
    println!("  Diagnostic capacity: {}", config.diagnostic_capacity);
    println!("  Cancel grace: {}s", config.cancel_grace_secs);

    for warning in config.validate() {
        println!("  ! {}", warning);
    }

    Ok(())
}
