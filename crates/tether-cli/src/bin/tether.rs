use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    match tether_cli::cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}
