#[tokio::main]
async fn main() {
    mdf_market::start_server().await;
}
