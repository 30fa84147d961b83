//! `.mrpack` bundle handling: manifest model and installer.

pub mod manifest;
pub mod processor;

pub use manifest::{BundleEntry, BundleManifest, Side, Support, BUNDLE_EXTENSION};
pub use processor::{read_manifest, BundleProcessor, ProcessingResult};
