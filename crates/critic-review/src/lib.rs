//! Review-generation pipeline for critic.
//!
//! Fetches a pull request's changed files, builds the review prompt, asks the
//! text-generation backend for a review, splits the answer into comments and
//! posts them back. Also provides the template-based demo reviewer used when
//! no model is available.

pub mod demo;
pub mod fetcher;
pub mod github;
pub mod host;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod publish;
pub mod segment;

#[cfg(test)]
pub(crate) mod fakes;
