pub mod loader;
pub mod schema;

pub use loader::{DataLoadError, FarmData, load_farm_data};
