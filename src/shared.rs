pub mod ids;
pub mod logging;

pub use ids::{generate_message_id, random_base36, validate_identifier_value};
pub use logging::{append_dispatch_log_line, dispatch_log_path};
