pub mod ascii;
pub mod escape;
pub mod line_index;

pub use ascii::{contains_ignore_ascii_case, starts_with_ignore_ascii_case_at};
pub use escape::escape_html;
pub use line_index::{LineCol, LineIndex};
