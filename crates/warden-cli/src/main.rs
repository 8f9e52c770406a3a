//! `warden` binary entrypoint.

#[tokio::main]
async fn main() {
    let code = warden_cli::run().await;
    std::process::exit(code);
}
