//! Test helper modules for hrr-relay integration tests
//!
//! - TestServer: router + broadcast + scheduler over a temp folder
//! - StubAcquirer: acquisition without network or yt-dlp
//! - Fixture writers for recognizable audio files

#![allow(dead_code)]

pub mod test_server;

pub use test_server::{
    resident_fixture, write_fixture, StubAcquirer, TestServer, FIXTURE_BITRATE,
};
