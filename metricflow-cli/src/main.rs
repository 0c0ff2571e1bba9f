#[tokio::main]
async fn main() {
    let code = match metricflow_cli::run(std::env::args_os()).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e:#}");
            metricflow_cli::exit_code(&e)
        }
    };
    std::process::exit(code);
}
