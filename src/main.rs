#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init(); // Log to stderr (if you run with `RUST_LOG=debug`).
    dawplayer_lib::run().await
}
