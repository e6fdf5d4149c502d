//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `ArticleState`: lifecycle of a single article (queued, working, ready)
//! - `RunStatus`: outcome of one crawl process run

mod article_state;
mod run_status;

pub use article_state::ArticleState;
pub use run_status::RunStatus;
