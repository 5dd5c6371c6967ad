//! Iterative code repair driven by a language-model policy.
//!
//! A policy proposes one directive per turn (run the tests, inspect the last
//! failure, replace the program, or declare a final answer). The repair loop
//! executes the directive, records the observation in the transcript, and stops
//! when the tests pass, the policy gives a final answer, or the step budget is
//! spent. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (directive parsing, episode state,
//!   prompt assembly). No I/O.
//! - **[`io`]**: Side-effecting operations (sandboxed execution, completion
//!   provider processes, config and episode logs).
//!
//! Orchestration modules ([`tools`], [`step`], [`looping`]) combine the two to
//! run turns and whole episodes.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
