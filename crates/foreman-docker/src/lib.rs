//! Docker-backed execution and container lifecycle for Foreman.
//!
//! This crate layers the execution engine over the docker CLI:
//! - Validate and sanitize container names
//! - Query container state by parsing docker's tab-separated output
//! - Drive the container lifecycle (start/stop/kill/remove), each operation
//!   a short-lived Exec whose error text is classified into a closed set of
//!   failure kinds
//! - Run container-backed processes ([`DockerExec`]) with the same
//!   lifecycle, ledger, and termination guarantees as bare OS processes
//!
//! # Example
//!
//! ```no_run
//! use foreman_docker::{DockerCli, DockerExec, DockerRun};
//!
//! let cli = DockerCli::new().expect("docker not found");
//!
//! let run = DockerRun::image("busybox")
//!     .auto_remove(true)
//!     .command("echo")
//!     .arg("hello");
//!
//! let exec = DockerExec::spawn(&cli, run).unwrap();
//! let state = exec.wait_for().unwrap();
//! assert!(state.successful());
//!
//! // The container is independently queryable.
//! let state = exec.container().state().unwrap();
//! println!("container is {state}");
//! ```
//!
//! # Checking docker availability
//!
//! ```
//! use foreman_docker::DockerCli;
//!
//! if DockerCli::is_available() {
//!     println!("docker is available");
//! } else {
//!     println!("docker not found, container runs disabled");
//! }
//! ```

pub mod cli;
pub mod container;
pub mod error;
pub mod name;
pub mod run;
pub mod state;

pub use cli::DockerCli;
pub use container::Container;
pub use error::{DockerError, DockerFailure, Result};
pub use name::{ContainerName, MAX_NAME_LEN};
pub use run::{DockerExec, DockerExitHandler, DockerRun};
pub use state::ContainerState;
