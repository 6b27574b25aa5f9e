//! Builds the gRPC client and server code for `starfriends.proto` using
//! `tonic-prost-build`.
//!
//! A vendored `protoc` (and its bundled well-known types) is used so that
//! neither contributors nor CI need a system installation.
//!
//! # Byte Field Optimization
//!
//! The archive and tokenizer payloads are explicitly marked with `.bytes(...)`
//! so they are deserialized as `Bytes` (from the `bytes` crate) instead of
//! `Vec<u8>`, which lets handlers hand payload slices around without copying.
//!
//! # Files and Paths
//!
//! - Proto file: `proto/starfriends.proto`
//! - Includes: `proto/` and the vendored `google/protobuf` directory
//!
//! # Output
//!
//! Generated code will be accessible in Rust via:
//!
//! ```rust
//! pub mod proto {
//!     tonic::include_proto!("starfriends");
//! }
//! ```

use std::env;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let descriptor_path = out_dir.join("starfriends_descriptor.bin");

    let protoc = protoc_bin_vendored::protoc_bin_path().expect("failed to find vendored protoc");
    let well_known =
        protoc_bin_vendored::include_path().expect("failed to find vendored protoc includes");

    let mut config = tonic_prost_build::Config::new();
    config
        .protoc_executable(protoc)
        .bytes([
            ".starfriends.ZipRequest.contents",
            ".starfriends.ZipResponse.zipped_contents",
            ".starfriends.TokenizeRequest.file_contents",
        ])
        .file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(
            config,
            &[PathBuf::from("proto/starfriends.proto")],
            &[PathBuf::from("proto"), well_known],
        )
        .expect("failed to compile starfriends.proto");

    println!("cargo:rerun-if-changed=proto/starfriends.proto");
}
