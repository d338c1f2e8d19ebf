pub mod file_loader;

pub use file_loader::{load_source_file, load_source_files, mime_type_for};
