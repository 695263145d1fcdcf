pub mod error;
pub mod io;
pub mod region;
pub mod utils;
