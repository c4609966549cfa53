mod directory;
mod edit;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub use directory::{get_mentor, list_mentors, MentorDetails, MentorFilter, MentorView};
pub use edit::{load_availability, load_skills, save, upload_avatar, ProfileDetails, ProfileForm, WindowForm};

/// The caller's own profile.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(edit::get).put(edit::put))
        .route("/avatar", post(edit::avatar))
}

/// The public mentor directory.
pub fn mentors_router() -> Router<AppState> {
    Router::new()
        .route("/", get(directory::list))
        .route("/{id}", get(directory::one))
}
