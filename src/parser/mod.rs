pub mod fields;
pub mod listing;
pub mod profile;

pub use listing::{csrf_token, has_login_form, profile_urls};
pub use profile::parse_profile;
