use clap::Parser;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn report(err: &anyhow::Error) {
    if let Some(lookup_err) = err.downcast_ref::<emis_lookup::error::LookupError>() {
        eprintln!("Error: {lookup_err}");
    } else {
        eprintln!("Error: {err}");
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();

    let cli = emis_lookup::cli::Cli::parse();
    match cli.command {
        emis_lookup::cli::Commands::Watch {
            resource,
            page_size,
            debounce_ms,
        } => {
            match emis_lookup::cli::run_watch(
                resource,
                page_size,
                debounce_ms,
                cli.base.as_deref(),
                cli.json,
            )
            .await
            {
                Ok(()) => std::process::ExitCode::SUCCESS,
                Err(err) => {
                    report(&err);
                    std::process::ExitCode::from(1)
                }
            }
        }
        _ => match emis_lookup::cli::run(cli).await {
            Ok(output) => {
                println!("{output}");
                std::process::ExitCode::SUCCESS
            }
            Err(err) => {
                report(&err);
                std::process::ExitCode::from(1)
            }
        },
    }
}
