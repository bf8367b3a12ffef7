//! Turning a configured launch command into something spawnable.
//!
//! [`CommandResolver`] applies variable expansion, launcher aliases and
//! interpreter lookup on top of the lower-level [`resolve_executable`]
//! search, which records every candidate it checked:
//!
//! ```rust,no_run
//! use toolbridge_mcp::resolver::resolve_executable;
//!
//! match resolve_executable("uvx", &[]) {
//!     Ok(found) => println!("{} via {}", found.resolved_path.display(), found.source),
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```

mod command;
mod env;
mod fs;
mod resolve;
mod search;
mod types;

pub use command::{CommandResolver, INTERPRETERS, ResolvedCommand};
pub use env::{EnvProvider, SystemEnv};
pub use fs::{FsProvider, SystemFs};
pub use resolve::{resolve_executable, resolve_executable_with_deps, resolve_runtime_with_deps};
pub use search::ExecutableSearcher;
pub use types::{Attempt, AttemptOutcome, ResolveError, ResolveResult, SearchSource};

#[cfg(test)]
pub use env::MockEnv;
#[cfg(test)]
pub use fs::MockFs;
