//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the session manager
//! against a particular roaster backend.  All tests run on the host with
//! no real hardware required.

mod backend_tests;
mod mock_hw;
mod session_tests;
