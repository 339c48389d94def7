pub mod run;

pub use run::{RunOptions, handle_run};
