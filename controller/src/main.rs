mod host;
mod pumps;
mod sim;
mod store;
mod tasks;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
