pub mod config;
pub mod types;

pub use config::Config;
pub use types::{
    Credential, Event, EventCandidate, NewCredential, NewEvent, NewPost, Organization, Post,
    PostStatus,
};
