//! Excel refresh support: Power Query templates

pub mod power_query;

pub use power_query::{build_template_workbook, generate_m_code, setup_steps, PowerQueryKind, PowerQueryParams};
