//! # kwbex
//!
//! `kwbex` is a library for extracting audio from Koei Tecmo XWS sound-bank
//! containers and repacking them after editing. Only `KWB2` banks are
//! interpreted; the MS ADPCM streams they hold are passed through
//! byte-for-byte inside standalone WAV wrappers, never decoded.
//!
//! The workflow has two passes bridged by a JSON [`Manifest`]:
//! [`extract_to_dir`] writes one folder of numbered WAV files per bank, and
//! [`rebuild_to_file`] reassembles a loadable container from the (possibly
//! edited) files, deduplicating identical streams.

#![warn(clippy::pedantic, future_incompatible)]
#![deny(
    let_underscore_drop,
    macro_use_extern_crate,
    meta_variable_misuse,
    missing_abi,
    missing_debug_implementations,
    missing_docs,
    non_ascii_idents,
    nonstandard_style,
    noop_method_call,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unsafe_op_in_unsafe_fn,
    unused,
    unused_crate_dependencies,
    unused_import_braces,
    unused_lifetimes,
    unused_macro_rules,
    unused_qualifications,
    unused_results
)]

mod bank;
mod blob;
mod container;
mod extract;
mod manifest;
mod read;
mod rebuild;
mod wav;
mod write;

pub use extract::{extract_to_dir, ExtractError};
pub use manifest::{BankManifest, Manifest, ManifestError, SoundEntry, Subsound};
pub use rebuild::{rebuild_to_file, RebuildError};
