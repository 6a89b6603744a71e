//! `kernel run --config <path>` boots the artifact-ecology kernel.
//! `kernel inspect <checkpoint-path>` prints a checkpoint summary.

fn main() {
    let exit_code = match kernel_cli::cli::parse(std::env::args().skip(1)) {
        Ok(command) => dispatch(command),
        Err(usage) => {
            eprintln!("{usage}");
            3
        }
    };
    std::process::exit(exit_code);
}

fn dispatch(command: kernel_cli::cli::Command) -> i32 {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    match command {
        kernel_cli::cli::Command::Inspect { path } => kernel_cli::run::inspect(&path),
        kernel_cli::cli::Command::Run { config } => {
            let rt = tokio::runtime::Runtime::new().expect("failed to start the tokio runtime");
            rt.block_on(kernel_cli::run::run(&config))
        }
    }
}
