pub mod table;

pub use table::{format_pids, render_grid, titled_grid};
