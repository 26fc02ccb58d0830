pub mod config;
pub mod io;
pub mod model;
pub mod store;
