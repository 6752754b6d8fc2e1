//! Inspect and change the package state of a Debian-family host, and manage
//! the APT sources and signing keys those packages come from.
//!
//! All process execution goes through [`executor::CommandRunner`], so every
//! component can be driven from captured tool output in tests.

#[macro_use]
pub mod cli;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod package;
pub mod repo;
pub mod types;

pub use cache::PackageCache;
pub use config::Config;
pub use error::{Error, Result};
pub use package::{Package, PackageState};
pub use repo::{Repository, RepositoryMapping};
pub use types::PkgVersion;
