pub mod config;
pub mod error;
pub mod events;
pub mod fetch;
pub mod model;
pub mod render;
pub mod rotation;
pub mod slides;
pub mod tasks {
    pub mod loader;
    pub mod rotation;
    pub mod viewer;
}
