pub mod auth;
pub mod config;
pub mod dashboard;
pub mod profile;
pub mod sessions;
pub mod stats;
pub mod task;
pub mod timer;

/// Single-threaded runtime for the commands that talk to the network or
/// run the tick loop.
pub fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}
