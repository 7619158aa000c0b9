mod routes;
mod static_files;
mod stream_ws;
mod ws;

pub use routes::create_router;
// StaticAssets is only available in release mode (embedded assets)
#[cfg(not(debug_assertions))]
pub use static_files::StaticAssets;
pub use stream_ws::stream_ws_handler;
pub use ws::ws_handler;
