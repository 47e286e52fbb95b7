#[tokio::main]
async fn main() {
    startupops_backend::run().await;
}
