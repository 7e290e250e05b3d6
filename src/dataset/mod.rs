pub mod archive;
pub mod inspect;
pub mod manifest;
pub mod resolver;
pub mod tile_dataset;
pub mod yolo;

pub use archive::{extract_archive, ArchiveKind};
pub use inspect::{inspect, ClassReport, DatasetReport};
pub use manifest::{
    prepare_dataset, write_class_mapping, write_split_csv, DatasetManifest, PreparedDataset,
};
pub use resolver::{resolve, DatasetResolver, SearchStrategy, ResolveError, ResolverConfig};
pub use tile_dataset::{TileDataset, TileSample};
pub use yolo::{
    detect_splits, fix_data_yaml_path, locate_data_yaml, read_data_config, DataConfig, YoloSplit,
};
