// ─── modforge core ───
// Mod acquisition, reconciliation and packaging.
//
// Architecture:
//   core/
//     version/    Filename version comparator + base identity classifier
//     registry/   Modrinth and CurseForge clients behind one trait
//     resolver/   Required-dependency walk with a visited set
//     bundle/     .mrpack manifest model and installer
//     reconcile/  Duplicate pruning and denylist filtering
//     downloader/ Cache-aware, SHA-1 validated downloads
//     cache/      Flat filename-keyed artifact cache
//     http/       Transport trait + reqwest implementation
//     profile/    `[role] filename` mod lists
//     progress/   Per-category completion record
//     packager/   Client pack zip builder
//     config/     JSON configuration with env overrides

pub mod bundle;
pub mod cache;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod packager;
pub mod profile;
pub mod progress;
pub mod reconcile;
pub mod registry;
pub mod resolver;
pub mod version;
