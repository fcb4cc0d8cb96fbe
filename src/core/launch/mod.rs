pub mod task;

pub use task::{launch, start_server, validate_player_name, LaunchedGame, LaunchedServer};
