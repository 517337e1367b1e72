#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cryptosheets::run().await
}
