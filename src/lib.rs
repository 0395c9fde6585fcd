pub mod config;
pub mod detect;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod store;
pub mod table;
