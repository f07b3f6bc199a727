pub mod icons;
pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{error, header, info, section, success, warn};
pub use progress::IngestProgress;
pub use table::{TableBuilder, report_table, stats_table};
pub use theme::{theme, Theme};
