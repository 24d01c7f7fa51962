//! sandbox-grader library
//!
//! Grades untrusted source code against hidden tests by running it inside a
//! resource-capped, network-isolated container:
//! - Workspace lifecycle for each submission
//! - Sandbox invocation building and execution
//! - Summarizing test output into pass/fail counts
//! - HTTP and MCP front ends over the grading service

pub mod catalog;
pub mod config;
pub mod error;
pub mod grading;
pub mod http;
pub mod mcp;
pub mod sandbox;
pub mod submission;
pub mod summary;
pub mod workspace;
