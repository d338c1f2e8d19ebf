pub mod batch_state;
pub mod loaders;
pub mod upload_item;

pub use batch_state::{BatchState, BatchStats, BatchStatus, DEFAULT_MAX_CONCURRENT_UPLOADS};
pub use loaders::{load_source_file, load_source_files};
pub use upload_item::{
    ItemLogEntry, ItemStatus, ProcessingStage, SourceFile, SourceHandle, UploadItem,
};
