//! Interactive Entra ID app role assignment over Microsoft Graph
//!
//! The binary walks an operator through picking a resource application, a
//! target application or managed identity, and one of the resource's app
//! roles, then creates the assignment. Candidate lists are narrowed with a
//! type-to-filter fuzzy selector (`tui::selector`).

pub mod cmd;
pub mod config;
pub mod error;
pub mod graph;
pub mod tui;
