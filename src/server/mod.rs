mod app;
mod middleware;
mod state;

pub use app::create_app;
pub use middleware::{acting_user, api_key_auth, API_KEY_HEADER, USER_ID_HEADER};
pub use state::AppState;
