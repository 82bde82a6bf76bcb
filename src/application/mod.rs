pub mod catalog;
pub mod generator;
pub mod service;

pub use catalog::{CatalogRules, ModelCatalog};
pub use generator::BatchGenerator;
pub use service::AppService;
