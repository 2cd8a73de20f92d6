pub mod filesystem;
pub mod organizer;

pub use filesystem::{ensure_directory, move_file, place_file, reserve_path};
pub use organizer::FileOrganizer;
