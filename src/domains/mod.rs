pub mod core;
pub mod registry;
pub mod import;
pub mod archive;
pub mod manifest;
pub mod tracker;
pub mod transfer;

pub use registry::ExportRegistry;
pub use transfer::TransferService;
