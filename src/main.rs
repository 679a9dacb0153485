use clap::Parser;
use pdk::cli::{self, Args, Outcome};
use pdk::core::{AppError, DefaultErrorReporter, ErrorReporter};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match cli::run(args).await {
        Ok(Outcome::Passed) => ExitCode::SUCCESS,
        Ok(Outcome::Failed) => ExitCode::from(1),
        Err(err) => {
            match err.downcast_ref::<AppError>() {
                Some(app_error) => DefaultErrorReporter::new().report_error(app_error),
                None => eprintln!("Error: {:#}", err),
            }
            ExitCode::from(2)
        }
    }
}
