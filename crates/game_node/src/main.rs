#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    lib_game_node::init().await
}
