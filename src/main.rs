#[tokio::main]
async fn main() {
    if let Err(e) = issy_lib::run().await {
        eprintln!("issy-pass: {}", e);
        std::process::exit(1);
    }
}
