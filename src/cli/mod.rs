//! CLI helpers that are more than argument plumbing.

pub mod init;
