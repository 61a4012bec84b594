pub mod manager;
pub mod mux;
pub mod preroll;
pub mod recording;
pub mod registry;
pub mod restart;
