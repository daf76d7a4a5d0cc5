//! Grade-book MCP server.
//!
//! Exposes a rapor CRUD backend (subjects, students and grades) as MCP
//! tools, resources and a prompt:
//!
//! - [`client`]: the [`GradesApi`] trait and its `reqwest` implementation
//! - [`models`]: backend records
//! - [`tools`]: registration of the MCP surface on a server builder
//!
//! The `rapor-mcp` binary wires these together.

#![forbid(unsafe_code)]

pub mod client;
pub mod models;
pub mod tools;

pub use client::{DEFAULT_API_URL, GradesApi, GradesError, HttpGradesClient};
pub use models::{Mapel, NewMapel, NewNilai, Nilai, Siswa};
pub use tools::register;

#[cfg(test)]
pub(crate) mod fake;
