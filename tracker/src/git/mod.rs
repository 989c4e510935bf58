//! Version control for the tracked working copy
//!
//! [`VersionControl`] is the command surface a reconciliation cycle drives;
//! [`Git2Backend`] implements it on top of libgit2.
//!
//! ```no_run
//! use tracker::git::*;
//!
//! # async fn demo() -> Result<(), VcsError> {
//! let (handle, _) = initialize_working_copy(
//!     "/tmp/code-tracking",
//!     "origin",
//!     "https://github.com/octocat/code-tracking.git",
//!     "master",
//! )?;
//! let vcs = Git2Backend::new(handle);
//! vcs.fetch("origin").await?;
//! let branch = vcs.current_branch().await?.unwrap_or_else(|| "master".to_string());
//! let outcome = vcs.pull_rebase("origin", &branch).await?;
//! println!("{}: {}", branch, outcome);
//! # Ok(())
//! # }
//! ```

pub mod libgit;
pub mod operations;
pub mod types;

pub use libgit::Git2Backend;
pub use operations::*;
pub use types::*;
