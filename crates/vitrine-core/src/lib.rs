pub mod assets;
pub mod catalog;
pub mod config;
pub mod error;
pub mod slug;
pub mod storage;
pub mod uploads;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;

pub use assets::*;
pub use catalog::*;
pub use config::*;
pub use error::*;
pub use slug::*;
pub use storage::*;
pub use uploads::*;
pub use vitrine_types::{NewProject, Project, ProjectPatch};
