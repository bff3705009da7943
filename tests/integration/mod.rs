//! Integration test suite
//!
//! Exercises the full update pipeline against a loopback HTTP server: real
//! version check client, real streaming download engine, real worker and
//! coordinator, with scripted frontend and recorded host collaborators.

mod cli_smoke;
mod end_to_end;
