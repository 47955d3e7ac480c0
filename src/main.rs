mod app;
mod auth;
mod breaker;
mod broadcast;
mod bus;
mod core;
mod envelope;
mod events;
mod hub;
mod ratelimit;
mod registry;
mod rooms;
mod router;
mod supervisor;
mod utils;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::App::run().await
}
